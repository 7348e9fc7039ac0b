//! Mapping a MyAnimeList entry onto a provider's own anime id.
//!
//! Providers are searched by title. A result counts only when its year,
//! season and format agree with the MAL entry, and the survivors are
//! ranked by how close their title is to any of the entry's titles.

use crate::metadata::types::AnimeDetails;
use serde::{Deserialize, Serialize};
use shared::SearchResult;

/// Lowest normalized title similarity accepted as the same anime
pub const SIMILARITY_THRESHOLD: f64 = 0.9;

/// What a provider search result has to agree with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchTarget {
    pub mal_id: u64,
    /// Term sent to the provider's search
    pub query: String,
    pub titles: Vec<String>,
    pub year: Option<u32>,
    pub season: Option<String>,
    pub kind: Option<String>,
}

impl From<&AnimeDetails> for MatchTarget {
    fn from(details: &AnimeDetails) -> Self {
        let non_empty = |title: &Option<String>| {
            title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        };

        let query = non_empty(&details.title_japanese)
            .or_else(|| non_empty(&details.title_english))
            .or_else(|| {
                details
                    .title_synonyms
                    .iter()
                    .map(|t| t.trim())
                    .find(|t| !t.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| details.title.trim().to_string());

        let mut titles: Vec<String> = details.titles.iter().map(|t| t.title.clone()).collect();
        if titles.is_empty() {
            titles.push(details.title.clone());
            titles.extend(non_empty(&details.title_english));
            titles.extend(non_empty(&details.title_japanese));
            titles.extend(details.title_synonyms.iter().cloned());
        }
        titles.retain(|t| !t.trim().is_empty());

        Self {
            mal_id: details.mal_id,
            query,
            titles,
            year: details.year,
            season: details.season.clone(),
            kind: details.anime_type.clone(),
        }
    }
}

/// Normalized Levenshtein similarity in `[0, 1]`, ignoring case
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.trim().to_lowercase(), &b.trim().to_lowercase())
}

/// Missing values compare as empty, so two unknowns agree
fn same_text(a: Option<&str>, b: Option<&str>) -> bool {
    a.unwrap_or_default()
        .trim()
        .eq_ignore_ascii_case(b.unwrap_or_default().trim())
}

fn agrees(target: &MatchTarget, candidate: &SearchResult) -> bool {
    candidate.year == target.year
        && same_text(candidate.season.as_deref(), target.season.as_deref())
        && same_text(candidate.kind.as_deref(), target.kind.as_deref())
}

/// The candidate's closest title score against the target
fn score(target: &MatchTarget, candidate: &SearchResult) -> f64 {
    target
        .titles
        .iter()
        .map(|title| similarity(title, &candidate.title))
        .fold(0.0, f64::max)
}

/// Highest scoring candidate that agrees with the target and clears the
/// threshold. Ties go to the earlier result.
pub fn best_match<'a>(
    target: &MatchTarget,
    candidates: &'a [SearchResult],
) -> Option<&'a SearchResult> {
    let mut best: Option<(&'a SearchResult, f64)> = None;
    for candidate in candidates.iter().filter(|c| agrees(target, c)) {
        let closeness = score(target, candidate);
        if closeness >= SIMILARITY_THRESHOLD && best.map_or(true, |(_, top)| closeness > top) {
            best = Some((candidate, closeness));
        }
    }
    best.map(|(candidate, _)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> MatchTarget {
        MatchTarget {
            mal_id: 999,
            query: "君の歌".to_string(),
            titles: vec![
                "Kimi no Uta".to_string(),
                "Your Song".to_string(),
                "君の歌".to_string(),
            ],
            year: Some(2019),
            season: Some("Spring".to_string()),
            kind: Some("TV".to_string()),
        }
    }

    fn result(session: &str, title: &str, year: u32, season: &str, kind: &str) -> SearchResult {
        SearchResult {
            id: session.to_string(),
            title: title.to_string(),
            poster: None,
            kind: Some(kind.to_string()),
            episodes: Some(12),
            year: Some(year),
            season: Some(season.to_string()),
            status: None,
            score: None,
        }
    }

    #[test]
    fn test_similarity_is_normalized() {
        assert_eq!(similarity("Kimi no Uta", "kimi no uta"), 1.0);
        assert!(similarity("Kimi no Uta", "Kimi no Uta!") < 1.0);
        assert!(similarity("Kimi no Uta", "Kimi no Uta!") >= SIMILARITY_THRESHOLD);
        assert!(similarity("Kimi no Uta", "Kimi no Uta 2") < SIMILARITY_THRESHOLD);
        assert!(similarity("Kimi no Uta", "Boku no Hero") < SIMILARITY_THRESHOLD);
    }

    #[test]
    fn test_year_season_and_format_filter() {
        let target = target();
        let candidates = vec![
            result("wrong-year", "Kimi no Uta", 2020, "Spring", "TV"),
            result("wrong-season", "Kimi no Uta", 2019, "Fall", "TV"),
            result("wrong-format", "Kimi no Uta", 2019, "Spring", "Movie"),
            result("right", "Kimi no Uta", 2019, "spring", "tv"),
        ];

        assert_eq!(best_match(&target, &candidates).map(|c| c.id.as_str()), Some("right"));
        assert!(best_match(&target, &candidates[..3]).is_none());
    }

    #[test]
    fn test_below_threshold_is_rejected() {
        let target = target();
        let candidates = vec![result("other", "Kimi ni Todoke", 2019, "Spring", "TV")];
        assert!(best_match(&target, &candidates).is_none());
    }

    #[test]
    fn test_closest_title_wins() {
        let target = target();
        let candidates = vec![
            result("near", "Kimi no Uta!", 2019, "Spring", "TV"),
            result("exact", "Your Song", 2019, "Spring", "TV"),
        ];
        assert_eq!(best_match(&target, &candidates).map(|c| c.id.as_str()), Some("exact"));
    }

    #[test]
    fn test_unknown_season_matches_unknown() {
        let mut target = target();
        target.season = None;
        let mut candidate = result("a", "Kimi no Uta", 2019, "", "TV");
        candidate.season = None;
        assert!(best_match(&target, &[candidate]).is_some());
    }

    #[test]
    fn test_target_from_details() {
        let details: AnimeDetails = serde_json::from_str(
            r#"{
                "mal_id": 999,
                "images": {"jpg": {"image_url": null, "small_image_url": null, "large_image_url": null}},
                "title": "Kimi no Uta",
                "title_english": "Your Song",
                "title_japanese": "  ",
                "title_synonyms": ["", "Kimiuta"],
                "type": "TV",
                "year": 2019,
                "season": "spring",
                "rating": null, "score": null, "synopsis": null, "trailer": null
            }"#,
        )
        .unwrap();

        let target = MatchTarget::from(&details);
        assert_eq!(target.query, "Your Song");
        assert_eq!(target.titles, vec!["Kimi no Uta", "Your Song", "Kimiuta"]);
        assert_eq!(target.season.as_deref(), Some("spring"));
        assert_eq!(target.kind.as_deref(), Some("TV"));
    }
}
