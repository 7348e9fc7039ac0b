//! Metadata sources.
//!
//! Two sources provide the same capability pair (anime metadata and
//! per-bucket episode titles). Callers pick one with [`MetadataSource`].

pub mod anilist;
pub mod jikan;
pub mod rate_limiter;
pub mod types;

pub use anilist::AniListClient;
pub use jikan::JikanClient;
pub use rate_limiter::RateLimiter;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use shared::AnimeMeta;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Episodes per metadata title page
pub const BUCKET_SIZE: u32 = 100;

/// Bucket holding `episode`. Episode 0 falls outside every bucket.
pub fn bucket_of(episode: u32) -> u32 {
    episode.div_ceil(BUCKET_SIZE)
}

/// Episode titles for one bucket of 100 episode numbers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleBucket {
    pub bucket: u32,
    pub titles: BTreeMap<u32, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataSource {
    AniList,
    Mal,
}

impl MetadataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataSource::AniList => "anilist",
            MetadataSource::Mal => "mal",
        }
    }
}

impl fmt::Display for MetadataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anilist" => Ok(MetadataSource::AniList),
            "mal" | "myanimelist" => Ok(MetadataSource::Mal),
            other => Err(format!("unknown metadata source: {other}")),
        }
    }
}

/// Both metadata clients, dispatched by [`MetadataSource`]
pub struct MetadataClients {
    pub anilist: AniListClient,
    pub jikan: JikanClient,
}

impl MetadataClients {
    pub fn new(anilist: AniListClient, jikan: JikanClient) -> Self {
        Self { anilist, jikan }
    }

    pub async fn fetch_meta(&self, source: MetadataSource, id: u64) -> Result<AnimeMeta> {
        match source {
            MetadataSource::AniList => self.anilist.fetch_meta(id).await,
            MetadataSource::Mal => self.jikan.fetch_meta(id).await,
        }
    }

    pub async fn fetch_episode_titles(
        &self,
        source: MetadataSource,
        id: u64,
        bucket: u32,
    ) -> Result<TitleBucket> {
        match source {
            MetadataSource::AniList => self.anilist.fetch_episode_titles(id, bucket).await,
            MetadataSource::Mal => self.jikan.fetch_episode_titles(id, bucket).await,
        }
    }
}
