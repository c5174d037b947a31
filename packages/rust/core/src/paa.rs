//! PAA pipeline: discovered questions become bilingual FAQ pages,
//! optionally grounded on live search results.

use tracing::{info, instrument, warn};

use presswork_gateway::SearchClient;
use presswork_shared::{Result, WorkItemKind};

use crate::pipeline::{BacklogJob, ProgressReporter, RunContext, run_backlog_batch};
use crate::report::RunSummary;
use crate::selector::{SelectOptions, select_batch};

/// Search results attached to each question.
pub const GROUNDING_RESULTS: usize = 5;

/// Run the PAA pipeline. Without a search client the questions are written
/// from the generator's own knowledge.
#[instrument(skip_all, fields(grounded = search.is_some()))]
pub async fn run_paa(
    ctx: &mut RunContext<'_>,
    search: Option<&SearchClient>,
    limit: Option<usize>,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let stage = ctx.stage(&ctx.config.stages.write)?;
    let opts = SelectOptions::from_config(&ctx.config.selector, limit);

    progress.phase("Selecting questions");
    let items = select_batch(ctx.storage, WorkItemKind::Paa, &opts).await?;
    let mut jobs: Vec<BacklogJob> = items.iter().filter_map(BacklogJob::from_item).collect();
    info!(selected = jobs.len(), "PAA batch selected");

    if let (Some(client), false) = (search, ctx.dry_run) {
        progress.phase("Grounding");
        for job in &mut jobs {
            match client.search(&job.label, GROUNDING_RESULTS).await {
                Ok(response) => job.grounding = response.results,
                Err(e) => warn!(question = %job.label, error = %e, "grounding search failed"),
            }
        }
    }

    progress.phase("Writing");
    Ok(run_backlog_batch(ctx, &stage, jobs, progress).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::test_support::{ScriptedGenerator, test_config, test_storage};
    use chrono::NaiveDate;
    use presswork_gateway::GatewaySet;
    use presswork_shared::{NewPaaQuestion, NewWorkItem, Status};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn question(text: &str, result_count: i64) -> NewWorkItem {
        NewWorkItem::Paa(NewPaaQuestion {
            question: text.into(),
            question_zh: None,
            source_keyword: Some("rag".into()),
            source_query: None,
            result_count,
        })
    }

    #[tokio::test]
    async fn questions_become_grounded_faq_pairs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "web": {
                    "totalResults": 1200,
                    "results": [
                        {"url": "https://arxiv.org/abs/1", "title": "RAG survey", "description": "A <b>survey</b>"}
                    ]
                }
            })))
            .mount(&server)
            .await;
        let search = SearchClient::new(server.uri(), "key", Duration::from_secs(5)).unwrap();

        let storage = test_storage().await;
        let tree = tempfile::tempdir().unwrap();
        let config = test_config(tree.path());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = seen.clone();
        let generator = ScriptedGenerator::new(move |prompt| {
            seen_in.lock().unwrap().push(prompt.to_string());
            Ok(ScriptedGenerator::reply_for(prompt))
        });
        let gateways = GatewaySet::single(generator.clone());
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();

        let id = storage
            .upsert_work_item(&question("What is retrieval augmented generation?", 40))
            .await
            .unwrap()
            .unwrap();

        let mut ctx = RunContext::new(&storage, &config, &gateways, date, false).await.unwrap();
        let summary = run_paa(&mut ctx, Some(&search), None, &SilentProgress).await.unwrap();

        assert_eq!(summary.committed, 1);
        assert_eq!(generator.calls(), 2);
        assert!(seen.lock().unwrap()[0].contains("https://arxiv.org/abs/1"));
        assert_eq!(
            storage.current_status(WorkItemKind::Paa, id).await.unwrap(),
            Some(Status::Published)
        );
        assert!(
            tree.path()
                .join("content/faq/zh/what-is-retrieval-augmented-generation.md")
                .exists()
        );
    }

    #[tokio::test]
    async fn search_failure_still_writes_ungrounded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let search = SearchClient::new(server.uri(), "key", Duration::from_secs(5)).unwrap();

        let storage = test_storage().await;
        let tree = tempfile::tempdir().unwrap();
        let config = test_config(tree.path());
        let generator = ScriptedGenerator::documents();
        let gateways = GatewaySet::single(generator.clone());
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();

        storage
            .upsert_work_item(&question("How do embeddings work?", 10))
            .await
            .unwrap();

        let mut ctx = RunContext::new(&storage, &config, &gateways, date, false).await.unwrap();
        let summary = run_paa(&mut ctx, Some(&search), None, &SilentProgress).await.unwrap();
        assert_eq!(summary.committed, 1);
    }
}
