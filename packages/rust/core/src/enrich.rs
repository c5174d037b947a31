//! Demand enrichment: fill search volume and difficulty estimates for
//! keywords that lack them, from web-search results.

use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use url::Url;

use presswork_gateway::{SearchClient, SearchResult};
use presswork_shared::Result;
use presswork_storage::Storage;

/// Results requested per keyword.
pub const RESULTS_PER_QUERY: usize = 10;

/// Domains whose presence in the top results signals an entrenched SERP.
const AUTHORITATIVE_DOMAINS: &[&str] = &[
    "wikipedia.org",
    "docs.anthropic.com",
    "platform.openai.com",
    "cloud.google.com",
    "ai.google.dev",
    "huggingface.co",
    "github.com",
    "arxiv.org",
    "microsoft.com",
    "developer.mozilla.org",
    "aws.amazon.com",
    "docs.github.com",
    "stackoverflow.com",
];

/// Counts from one enrichment run.
#[derive(Debug, Clone, Default)]
pub struct EnrichSummary {
    pub candidates: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Volume estimate 0-100 from the engine's total-results count.
pub fn volume_estimate(total_results: u64) -> i64 {
    if total_results == 0 {
        return 0;
    }
    let scaled = ((total_results as f64).log10() * 15.0).round() as i64;
    scaled.clamp(0, 100)
}

/// Difficulty estimate 0-100: 20 points per authoritative result.
pub fn difficulty_estimate(results: &[SearchResult]) -> i64 {
    let hits = results.iter().filter(|r| is_authoritative(&r.url)).count() as i64;
    (hits * 20).min(100)
}

fn is_authoritative(url: &str) -> bool {
    let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_lowercase)) else {
        return false;
    };
    AUTHORITATIVE_DOMAINS
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")))
}

/// Look up demand for up to `limit` keywords and store the estimates.
///
/// Lookups run concurrently, each dispatched `delay` after the previous one.
/// A failed lookup leaves its keyword untouched.
#[instrument(skip_all, fields(limit = limit, dry_run = dry_run))]
pub async fn run_enrich(
    storage: &Storage,
    search: &SearchClient,
    limit: usize,
    delay: Duration,
    dry_run: bool,
) -> Result<EnrichSummary> {
    let keywords = storage.keywords_missing_demand(limit).await?;
    let mut summary = EnrichSummary {
        candidates: keywords.len(),
        ..Default::default()
    };
    if keywords.is_empty() {
        info!("no keywords need demand data");
        return Ok(summary);
    }
    if dry_run {
        for keyword in &keywords {
            info!(dry_run = true, keyword = %keyword.keyword, "would look up demand");
        }
        return Ok(summary);
    }

    let mut lookups = JoinSet::new();
    for (i, keyword) in keywords.into_iter().enumerate() {
        let client = search.clone();
        let wait = delay * i as u32;
        lookups.spawn(async move {
            tokio::time::sleep(wait).await;
            let response = client.search(&keyword.keyword, RESULTS_PER_QUERY).await;
            (keyword, response)
        });
    }

    while let Some(joined) = lookups.join_next().await {
        let (keyword, response) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "demand lookup task failed");
                summary.failed += 1;
                continue;
            }
        };
        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(keyword = %keyword.keyword, error = %e, "demand lookup failed");
                summary.failed += 1;
                continue;
            }
        };

        let volume = volume_estimate(response.total_results);
        let difficulty = difficulty_estimate(&response.results);
        debug!(keyword = %keyword.keyword, volume, difficulty, "demand estimated");
        match storage.set_keyword_demand(keyword.id, volume, difficulty).await {
            Ok(()) => summary.updated += 1,
            Err(e) => {
                warn!(keyword = %keyword.keyword, error = %e, "failed to store demand");
                summary.failed += 1;
            }
        }
    }

    info!(
        candidates = summary.candidates,
        updated = summary.updated,
        failed = summary.failed,
        "demand enrichment complete"
    );
    Ok(summary)
}
