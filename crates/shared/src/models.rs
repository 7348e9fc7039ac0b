//! Data models shared between the aggregator components.
//!
//! All of these are plain value types. They are what the cache stores
//! and what the CLI prints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A link from a provider page to an external anime database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLink {
    /// Label shown on the page ("AniList", "MAL", "AniDB", ...)
    #[serde(rename = "type")]
    pub label: String,
    /// Absolute URL
    pub url: String,
}

impl ExternalLink {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }

    /// The foreign ID carried by the link: its last non-empty path segment
    pub fn foreign_id(&self) -> Option<&str> {
        let without_fragment = self.url.split('#').next().unwrap_or_default();
        let without_query = without_fragment.split('?').next().unwrap_or_default();
        let authority_and_path = without_query
            .split_once("://")
            .map_or(without_query, |(_, rest)| rest);
        let (_, path) = authority_and_path.split_once('/')?;
        path.rsplit('/')
            .map(str::trim)
            .find(|segment| !segment.is_empty())
    }
}

/// The parts of a provider anime page the aggregator uses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimePage {
    #[serde(rename = "externalLinks")]
    pub external_links: Vec<ExternalLink>,
}

/// One provider-listed episode before reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRaw {
    /// Composite `{anime_id}/{session}`
    pub id: String,
    /// Snapshot image URL
    pub preview: String,
    /// Provider-assigned number, may restart per session
    pub episode: u32,
    /// Play page URL on the provider
    pub url: String,
}

/// One page of a provider episode listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodePage {
    pub total: u32,
    pub from: u32,
    pub to: u32,
    #[serde(rename = "hasNextPage")]
    pub has_next_page: bool,
    pub list: Vec<EpisodeRaw>,
}

/// Provider page plus the requested episode page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimeListing {
    pub page: AnimePage,
    pub episodes: EpisodePage,
}

/// An episode with a global number and a resolved title
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledEpisode {
    pub id: String,
    pub title: String,
    pub episode: u32,
    pub preview: String,
    pub streaming_link: String,
}

/// A playable stream at one resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSource {
    pub resolution: String,
    pub link: String,
}

/// Streams grouped by audio language tag
pub type StreamMap = BTreeMap<String, Vec<StreamSource>>;

/// A provider search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Provider anime id (the anime session)
    pub id: String,
    pub title: String,
    pub poster: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub episodes: Option<u32>,
    pub year: Option<u32>,
    pub season: Option<String>,
    pub status: Option<String>,
    pub score: Option<f64>,
}

/// Canonical identity pair used for metadata enrichment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalIds {
    pub mal: Option<u64>,
    pub anilist: Option<u64>,
}

/// Multi-locale titles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Titles {
    pub english: Option<String>,
    pub romaji: Option<String>,
    pub native: Option<String>,
}

/// Trailer descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trailer {
    pub id: String,
    pub platform: String,
}

/// Normalized anime metadata from either metadata source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimeMeta {
    /// Id in the source that produced this record
    pub id: u64,
    /// Accent color (AniList only)
    pub color: Option<String>,
    pub poster: Option<String>,
    pub background: Option<String>,
    pub title: Titles,
    pub description: Option<String>,
    pub year: Option<u32>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub rating: Option<f64>,
    pub genres: Vec<String>,
    pub studios: Vec<String>,
    pub is_nsfw: bool,
    pub trailer: Option<Trailer>,
}

/// Reconciled episode page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeDetails {
    #[serde(rename = "hasNextPage")]
    pub has_next_page: bool,
    pub episodes: Vec<ReconciledEpisode>,
}

/// Metadata plus reconciled episodes for one provider anime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimeInfo {
    pub ids: CanonicalIds,
    pub meta: AnimeMeta,
    pub details: EpisodeDetails,
}
