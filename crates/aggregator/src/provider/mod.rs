//! Content providers.
//!
//! Only AnimePahe exists today. Providers are a closed set selected by
//! [`ProviderKind`] and dispatched by [`Providers`].

pub mod animepahe;
pub mod matching;
pub mod types;

pub use animepahe::{AnimePahe, ProviderTtls};
pub use matching::MatchTarget;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use shared::{AnimeListing, AnimePage, EpisodePage, SearchResult, StreamMap};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    AnimePahe,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::AnimePahe => "animepahe",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "animepahe" | "pahe" => Ok(ProviderKind::AnimePahe),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Episode listing order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeSort {
    #[default]
    #[serde(rename = "episode_asc")]
    Ascending,
    #[serde(rename = "episode_desc")]
    Descending,
}

impl EpisodeSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeSort::Ascending => "episode_asc",
            EpisodeSort::Descending => "episode_desc",
        }
    }
}

impl fmt::Display for EpisodeSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EpisodeSort {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "episode_asc" | "asc" => Ok(EpisodeSort::Ascending),
            "episode_desc" | "desc" => Ok(EpisodeSort::Descending),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

/// Every provider client, dispatched by [`ProviderKind`]
pub struct Providers {
    pub animepahe: AnimePahe,
}

impl Providers {
    pub fn new(animepahe: AnimePahe) -> Self {
        Self { animepahe }
    }

    pub async fn get_anime(&self, kind: ProviderKind, id: &str, page: u32) -> Result<AnimeListing> {
        match kind {
            ProviderKind::AnimePahe => self.animepahe.get_anime(id, page).await,
        }
    }

    pub async fn get_anime_page(&self, kind: ProviderKind, id: &str) -> Result<AnimePage> {
        match kind {
            ProviderKind::AnimePahe => self.animepahe.get_anime_page(id).await,
        }
    }

    pub async fn get_episodes(
        &self,
        kind: ProviderKind,
        id: &str,
        sort: EpisodeSort,
        page: u32,
    ) -> Result<EpisodePage> {
        match kind {
            ProviderKind::AnimePahe => self.animepahe.get_episodes(id, sort, page).await,
        }
    }

    pub async fn search(&self, kind: ProviderKind, query: &str) -> Result<Vec<SearchResult>> {
        match kind {
            ProviderKind::AnimePahe => self.animepahe.search(query).await,
        }
    }

    pub async fn match_session(&self, kind: ProviderKind, target: &MatchTarget) -> Result<String> {
        match kind {
            ProviderKind::AnimePahe => self.animepahe.match_session(target).await,
        }
    }

    pub async fn get_episode_streams(
        &self,
        kind: ProviderKind,
        id: &str,
        session: &str,
    ) -> Result<StreamMap> {
        match kind {
            ProviderKind::AnimePahe => self.animepahe.get_episode_streams(id, session).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_from_str() {
        assert_eq!("AnimePahe".parse::<ProviderKind>(), Ok(ProviderKind::AnimePahe));
        assert!("gogo".parse::<ProviderKind>().is_err());
        assert_eq!(ProviderKind::default().to_string(), "animepahe");
    }

    #[test]
    fn test_sort_round_trip_names() {
        assert_eq!("desc".parse::<EpisodeSort>(), Ok(EpisodeSort::Descending));
        assert_eq!(EpisodeSort::Descending.to_string(), "episode_desc");
        assert_eq!(EpisodeSort::default(), EpisodeSort::Ascending);
    }
}
