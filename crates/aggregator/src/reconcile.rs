//! Episode reconciliation.
//!
//! The provider numbers episodes per session (roughly per season) while the
//! metadata sources number them continuously and hand out titles in buckets
//! of [`BUCKET_SIZE`]. This module assigns every provider episode a global
//! number and a title.
//!
//! [`BUCKET_SIZE`]: crate::metadata::BUCKET_SIZE

use crate::metadata::{bucket_of, MetadataClients, MetadataSource, TitleBucket};
use futures::future::join_all;
use shared::{EpisodePage, ReconciledEpisode};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Whether the batch's numbering has to be rebased onto the page totals
///
/// A batch whose first episode equals `total - (from - 1)` already carries
/// continuous numbers. Anything else restarted per session. This is an
/// arithmetic heuristic and can misjudge a short final season whose
/// numbers happen to line up.
pub fn needs_rebase(page: &EpisodePage) -> bool {
    let Some(first) = page.list.first() else {
        return false;
    };
    let continuous_start = i64::from(page.total) - (i64::from(page.from) - 1);
    i64::from(first.episode) != continuous_start
}

/// Global episode number for every entry, in batch order
pub fn global_numbers(page: &EpisodePage) -> Vec<u32> {
    if needs_rebase(page) {
        (0..page.list.len())
            .map(|index| {
                let index = u32::try_from(index).unwrap_or(u32::MAX);
                page.total.saturating_sub(index)
            })
            .collect()
    } else {
        page.list.iter().map(|ep| ep.episode).collect()
    }
}

/// Title buckets the numbers fall into. Episode 0 has no bucket.
pub fn required_buckets(numbers: &[u32]) -> BTreeSet<u32> {
    numbers
        .iter()
        .map(|&n| bucket_of(n))
        .filter(|&bucket| bucket > 0)
        .collect()
}

/// Merge a provider batch with whatever title buckets were fetched
///
/// Missing buckets and missing episodes fall back to `"Episode {n}"`.
/// Output order is the batch order.
pub fn reconcile(page: &EpisodePage, buckets: &BTreeMap<u32, TitleBucket>) -> Vec<ReconciledEpisode> {
    page.list
        .iter()
        .zip(global_numbers(page))
        .map(|(raw, number)| {
            let title = buckets
                .get(&bucket_of(number))
                .and_then(|bucket| bucket.titles.get(&number))
                .cloned()
                .unwrap_or_else(|| format!("Episode {}", number));

            ReconciledEpisode {
                id: raw.id.clone(),
                title,
                episode: number,
                preview: raw.preview.clone(),
                streaming_link: raw.url.clone(),
            }
        })
        .collect()
}

/// Fetch the given buckets concurrently
///
/// A bucket that fails is left out of the result so its episodes get
/// placeholder titles.
pub async fn fetch_buckets(
    metadata: &MetadataClients,
    source: MetadataSource,
    id: u64,
    buckets: &BTreeSet<u32>,
) -> BTreeMap<u32, TitleBucket> {
    let results = join_all(
        buckets
            .iter()
            .map(|&bucket| metadata.fetch_episode_titles(source, id, bucket)),
    )
    .await;

    buckets
        .iter()
        .zip(results)
        .filter_map(|(&bucket, result)| match result {
            Ok(titles) => Some((bucket, titles)),
            Err(e) => {
                warn!(
                    source = %source,
                    id = id,
                    bucket = bucket,
                    error = %e,
                    "Title bucket unavailable, using placeholder titles"
                );
                None
            }
        })
        .collect()
}

/// Renumber a batch and title it from `source`
pub async fn reconcile_from_source(
    metadata: &MetadataClients,
    source: MetadataSource,
    id: u64,
    page: &EpisodePage,
) -> Vec<ReconciledEpisode> {
    let numbers = global_numbers(page);
    let needed = required_buckets(&numbers);
    debug!(
        source = %source,
        id = id,
        episodes = numbers.len(),
        buckets = ?needed,
        rebased = needs_rebase(page),
        "Reconciling episodes"
    );

    let buckets = fetch_buckets(metadata, source, id, &needed).await;
    reconcile(page, &buckets)
}
