//! Jikan API v4 client (MyAnimeList metadata).

use super::rate_limiter::RateLimiter;
use super::types::*;
use super::TitleBucket;
use crate::cache::Cache;
use crate::error::Result;
use crate::http::{HttpClient, HttpRequest};
use shared::config::MetadataConfig;
use shared::{AnimeMeta, Titles, Trailer};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Jikan API v4 client
pub struct JikanClient {
    http: HttpClient,
    cache: Arc<Cache>,
    /// Base URL for Jikan API
    base_url: String,
    rate_limiter: RateLimiter,
    ttl: Duration,
}

impl JikanClient {
    /// Create a new Jikan client
    pub fn new(http: HttpClient, cache: Arc<Cache>, config: &MetadataConfig, ttl: Duration) -> Self {
        Self {
            http,
            cache,
            base_url: config.jikan_url.trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::new(
                config.rate_limit.requests_per_second,
                config.rate_limit.requests_per_minute,
            ),
            ttl,
        }
    }

    /// Make a rate-limited GET request
    async fn get<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = Url::parse(&format!("{}{}", self.base_url, endpoint))?;

        self.rate_limiter.acquire().await;
        debug!(url = %url, "Making Jikan request");

        self.http.get_json(HttpRequest::get(url)).await
    }

    /// Fetch full anime details by MAL ID
    pub async fn get_anime_details(&self, mal_id: u64) -> Result<AnimeDetails> {
        let key = format!("jikan:anime:{}", mal_id);
        self.cache
            .remember(&key, self.ttl, || async {
                debug!(mal_id = mal_id, "Fetching anime details");
                let response: AnimeDetailsResponse =
                    self.get(&format!("/anime/{}", mal_id)).await?;
                Ok(response.data)
            })
            .await
    }

    /// Fetch one page of episode records (100 per page)
    pub async fn get_episodes(&self, mal_id: u64, page: u32) -> Result<EpisodesResponse> {
        let key = format!("jikan:episodes:{}:page_{}", mal_id, page);
        self.cache
            .remember(&key, self.ttl, || async {
                debug!(mal_id = mal_id, page = page, "Fetching episode titles");
                self.get(&format!("/anime/{}/episodes?page={}", mal_id, page))
                    .await
            })
            .await
    }

    pub async fn fetch_meta(&self, mal_id: u64) -> Result<AnimeMeta> {
        let details = self.get_anime_details(mal_id).await?;
        Ok(details.into_meta())
    }

    /// Episode titles for one bucket; Jikan pages line up with buckets
    pub async fn fetch_episode_titles(&self, mal_id: u64, bucket: u32) -> Result<TitleBucket> {
        let response = self.get_episodes(mal_id, bucket).await?;

        let titles = response
            .data
            .into_iter()
            .filter_map(|ep| {
                let title = ep.title?.trim().to_string();
                (!title.is_empty()).then_some((ep.mal_id, title))
            })
            .collect();

        Ok(TitleBucket { bucket, titles })
    }
}

impl AnimeDetails {
    /// Normalize into the shared metadata shape
    pub fn into_meta(self) -> AnimeMeta {
        let poster = self
            .images
            .jpg
            .large_image_url
            .clone()
            .or_else(|| self.images.jpg.image_url.clone());

        AnimeMeta {
            id: self.mal_id,
            color: None,
            poster,
            background: None,
            title: Titles {
                english: self.title_english,
                romaji: Some(self.title),
                native: self.title_japanese,
            },
            description: self.synopsis,
            year: self.year,
            kind: self.anime_type,
            rating: self.score,
            genres: self.genres.into_iter().map(|g| g.name).collect(),
            studios: self.studios.into_iter().map(|s| s.name).collect(),
            is_nsfw: self.rating.as_deref().is_some_and(|r| r.starts_with('R')),
            // MAL only links YouTube trailers
            trailer: self
                .trailer
                .and_then(|t| t.youtube_id)
                .map(|id| Trailer {
                    id,
                    platform: "youtube".to_string(),
                }),
        }
    }
}
