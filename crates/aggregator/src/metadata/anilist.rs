//! AniList GraphQL client.

use super::types::*;
use super::{bucket_of, TitleBucket};
use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::http::HttpClient;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::json;
use shared::{AnimeMeta, Titles, Trailer};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const MEDIA_QUERY: &str = r#"
query Media($mediaId: Int, $type: MediaType) {
  Media(id: $mediaId, type: $type) {
    id
    coverImage { color large }
    bannerImage
    title { english romaji native }
    description
    seasonYear
    format
    meanScore
    genres
    studios { nodes { name } }
    trailer { id site }
    isAdult
  }
}
"#;

const STREAMING_EPISODES_QUERY: &str = r#"
query Media($mediaId: Int, $type: MediaType) {
  Media(id: $mediaId, type: $type) {
    streamingEpisodes { title }
  }
}
"#;

/// "Episode 12 - Title" as listed by AniList streaming partners
static EPISODE_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*Episode\s+(\d+)\s*[-:–]\s*(.+?)\s*$").unwrap());

pub struct AniListClient {
    http: HttpClient,
    cache: Arc<Cache>,
    endpoint: Url,
    ttl: Duration,
}

impl AniListClient {
    pub fn new(http: HttpClient, cache: Arc<Cache>, endpoint: Url, ttl: Duration) -> Self {
        Self {
            http,
            cache,
            endpoint,
            ttl,
        }
    }

    async fn query<T: DeserializeOwned>(&self, query: &str, id: u64) -> Result<T> {
        let body = json!({
            "query": query,
            "variables": { "mediaId": id, "type": "ANIME" },
        });

        let response: GraphQlResponse<MediaData<T>> =
            self.http.post_json(self.endpoint.clone(), &body).await?;

        if let Some(error) = response.errors.first() {
            if error.status == Some(404) {
                return Err(Error::NotFound(format!("AniList media {id}")));
            }
            return Err(Error::fetch(self.endpoint.as_str(), &error.message));
        }

        response
            .data
            .and_then(|d| d.media)
            .ok_or_else(|| Error::NotFound(format!("AniList media {id}")))
    }

    pub async fn get_media(&self, id: u64) -> Result<AnilistMedia> {
        let key = format!("anilist:media:{}", id);
        self.cache
            .remember(&key, self.ttl, || async {
                debug!(anilist_id = id, "Fetching AniList media");
                self.query(MEDIA_QUERY, id).await
            })
            .await
    }

    /// All titled streaming episodes, keyed by episode number
    pub async fn get_episode_titles(&self, id: u64) -> Result<BTreeMap<u32, String>> {
        let key = format!("anilist:episodes:{}", id);
        self.cache
            .remember(&key, self.ttl, || async {
                debug!(anilist_id = id, "Fetching AniList streaming episodes");
                let media: AnilistStreamingEpisodes =
                    self.query(STREAMING_EPISODES_QUERY, id).await?;
                Ok(parse_streaming_titles(&media.streaming_episodes))
            })
            .await
    }

    pub async fn fetch_meta(&self, id: u64) -> Result<AnimeMeta> {
        Ok(self.get_media(id).await?.into_meta())
    }

    pub async fn fetch_episode_titles(&self, id: u64, bucket: u32) -> Result<TitleBucket> {
        let titles = self
            .get_episode_titles(id)
            .await?
            .into_iter()
            .filter(|(episode, _)| bucket_of(*episode) == bucket)
            .collect();

        Ok(TitleBucket { bucket, titles })
    }
}

fn parse_streaming_titles(episodes: &[StreamingEpisode]) -> BTreeMap<u32, String> {
    episodes
        .iter()
        .filter_map(|ep| {
            let caps = EPISODE_TITLE.captures(ep.title.as_deref()?)?;
            let number = caps[1].parse().ok()?;
            Some((number, caps[2].to_string()))
        })
        .collect()
}

impl AnilistMedia {
    pub fn into_meta(self) -> AnimeMeta {
        let (color, poster) = match self.cover_image {
            Some(cover) => (cover.color, cover.large),
            None => (None, None),
        };

        AnimeMeta {
            id: self.id,
            color,
            poster,
            background: self.banner_image,
            title: Titles {
                english: self.title.english,
                romaji: self.title.romaji,
                native: self.title.native,
            },
            description: self.description,
            year: self.season_year,
            kind: self.format,
            rating: self.mean_score,
            genres: self.genres,
            studios: self
                .studios
                .map(|s| s.nodes.into_iter().map(|n| n.name).collect())
                .unwrap_or_default(),
            is_nsfw: self.is_adult,
            trailer: self.trailer.and_then(|t| {
                Some(Trailer {
                    id: t.id?,
                    platform: t.site?,
                })
            }),
        }
    }
}
