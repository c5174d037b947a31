//! Core pipeline orchestration and domain logic for Presswork.
//!
//! This crate ties the store, the generation gateway, and the Markdown
//! helpers together into the publishing pipelines: topic articles, the
//! keyword and PAA backlogs, freshness updates, and demand enrichment.

pub mod committer;
pub mod dedup;
pub mod enrich;
pub mod freshness;
pub mod ingest;
pub mod keywords;
pub mod paa;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod selector;
pub mod topic;
pub mod validate;

pub use dedup::DedupIndex;
pub use pipeline::{ItemOutcome, ProgressReporter, RunContext, SilentProgress};
pub use report::{RunSummary, write_report};
pub use selector::{SelectOptions, select_batch};
pub use validate::{ExpectedArtifact, Rejection, Verdict, validate};

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use uuid::Uuid;

    use presswork_gateway::{GenerateOptions, Generator};
    use presswork_shared::{
        AppConfig, ContentKind, GatewayError, GatewayMode, Language, NewKeyword,
    };
    use presswork_storage::Storage;

    type Responder = dyn Fn(&str) -> Result<String, GatewayError> + Send + Sync;

    /// Create a temp file storage for testing.
    pub(crate) async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("pw_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    /// Config rooted in a temp directory.
    pub(crate) fn test_config(root: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.paths.content_dir = root.join("content");
        config.paths.output_dir = root.join("output");
        config.paths.database = root.join("presswork.db");
        config.paths.temp_dir = Some(root.to_path_buf());
        config.stages.retry_backoff_secs = 0;
        config.search.dispatch_delay_ms = 1;
        config
    }

    /// An English glossary keyword.
    pub(crate) fn keyword(text: &str, category: Option<&str>, score: f64) -> NewKeyword {
        NewKeyword {
            keyword: text.into(),
            keyword_zh: None,
            language: Language::En,
            content_type: ContentKind::Glossary,
            category: category.map(str::to_string),
            score,
            search_intent: None,
            parent_research_id: None,
            extraction_batch: None,
        }
    }

    /// Pull `key: "value"` out of the metadata template in a prompt.
    fn template_value(prompt: &str, key: &str) -> Option<String> {
        let prefix = format!("{key}: \"");
        prompt
            .lines()
            .find_map(|l| l.strip_prefix(prefix.as_str()))
            .and_then(|rest| rest.strip_suffix('"'))
            .map(str::to_string)
    }

    const ZH_SENTENCE: &str = "这一段用中文介绍该主题的背景、原理以及在实际工程中的应用方式。";

    /// A document that satisfies the gate for whatever the prompt asked for.
    pub(crate) fn document_reply(prompt: &str, en_body: &str) -> String {
        let slug = template_value(prompt, "slug").unwrap_or_else(|| "untitled".into());
        let lang = template_value(prompt, "lang").unwrap_or_else(|| "en".into());
        let date = template_value(prompt, "date").unwrap_or_else(|| "2026-03-01".into());
        let title = prompt
            .lines()
            .find_map(|l| l.strip_prefix("Subject: ").or_else(|| l.strip_prefix("Title: ")))
            .unwrap_or(slug.as_str())
            .to_string();

        let body = if lang == "zh" {
            ZH_SENTENCE.repeat((en_body.chars().count() / 20).max(3))
        } else {
            en_body.to_string()
        };

        let mut out = format!(
            "```markdown\n---\nslug: \"{slug}\"\ntitle: \"{title}\"\ndescription: \"About {title}\"\ndate: \"{date}\"\nlang: \"{lang}\"\n"
        );
        if prompt.contains("keywords: [") {
            out.push_str("keywords: [\"ai\", \"agents\"]\n");
        }
        out.push_str(&format!("---\n\n# {title}\n\n{body}\n```\n"));
        out
    }

    /// In-test generator driven by a closure over the prompt.
    pub(crate) struct ScriptedGenerator {
        respond: Box<Responder>,
        calls: AtomicUsize,
    }

    impl ScriptedGenerator {
        pub(crate) fn new(
            respond: impl Fn(&str) -> Result<String, GatewayError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                respond: Box::new(respond),
                calls: AtomicUsize::new(0),
            })
        }

        /// Answers every document prompt with a valid document.
        pub(crate) fn documents() -> Arc<Self> {
            Self::new(|prompt| Ok(Self::reply_for(prompt)))
        }

        pub(crate) fn reply_for(prompt: &str) -> String {
            let body = "This paragraph explains the subject in plain English for practitioners. "
                .repeat(10);
            document_reply(prompt, body.trim())
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(
            &self,
            prompt: &str,
            _opts: &GenerateOptions,
        ) -> Result<String, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.respond)(prompt)
        }

        fn mode(&self) -> GatewayMode {
            GatewayMode::Subprocess
        }
    }
}
