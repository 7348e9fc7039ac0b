//! Orchestration.
//!
//! [`AnimeService`] owns one instance of every component and exposes the
//! operations the CLI (or any other thin front end) calls.

use crate::cache::Cache;
use crate::crosswalk::{CrosswalkResolver, CrosswalkRow, Scheme};
use crate::error::{Error, Result};
use crate::extractor::StreamExtractor;
use crate::http::{HttpClient, HttpFetch, ReqwestFetcher};
use crate::metadata::{AniListClient, JikanClient, MetadataClients, MetadataSource};
use crate::provider::{AnimePahe, EpisodeSort, MatchTarget, ProviderKind, ProviderTtls, Providers};
use crate::reconcile;
use shared::{
    AnimeInfo, AnimeMeta, AnimePage, CanonicalIds, Config, EpisodeDetails, EpisodePage,
    SearchResult, StreamMap,
};
use std::sync::Arc;
use tracing::info;
use url::Url;

pub struct AnimeService {
    providers: Providers,
    crosswalk: CrosswalkResolver,
    metadata: MetadataClients,
    extractor: StreamExtractor,
    cache: Arc<Cache>,
}

impl AnimeService {
    /// Build the service with a real HTTP transport and the configured cache
    pub fn new(config: &Config) -> Result<Self> {
        let fetcher = Arc::new(ReqwestFetcher::new(&config.http)?);
        let cache = Arc::new(Cache::new(config.cache_dir(), config.cache.enabled));
        Self::with_fetcher(config, fetcher, cache)
    }

    /// Build the service over any transport
    pub fn with_fetcher(
        config: &Config,
        fetcher: Arc<dyn HttpFetch>,
        cache: Arc<Cache>,
    ) -> Result<Self> {
        let http = HttpClient::new(fetcher);
        let metadata_ttl = config.cache.metadata_ttl();

        let extractor = StreamExtractor::new(http.clone(), &config.extractor);
        let animepahe = AnimePahe::new(
            http.clone(),
            cache.clone(),
            extractor.clone(),
            &config.provider,
            ProviderTtls::from(&config.cache),
        )?;

        let crosswalk = CrosswalkResolver::new(
            http.clone(),
            cache.clone(),
            Url::parse(&config.crosswalk.source_url)?,
            config.cache.crosswalk_ttl(),
        );

        let anilist = AniListClient::new(
            http.clone(),
            cache.clone(),
            Url::parse(&config.metadata.anilist_url)?,
            metadata_ttl,
        );
        let jikan = JikanClient::new(http, cache.clone(), &config.metadata, metadata_ttl);

        Ok(Self {
            providers: Providers::new(animepahe),
            crosswalk,
            metadata: MetadataClients::new(anilist, jikan),
            extractor,
            cache,
        })
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Metadata plus one reconciled page of episodes for a provider anime
    pub async fn info(&self, provider: ProviderKind, id: &str, page: u32) -> Result<AnimeInfo> {
        info!(provider = %provider, id = id, page = page, "Building anime info");

        let listing = self.providers.get_anime(provider, id, page).await?;
        let ids = self
            .crosswalk
            .resolve_links(&listing.page.external_links)
            .await?;

        let (meta_source, meta_id) = pick(ids, MetadataSource::AniList)
            .ok_or(Error::IdentityUnresolved {
                links: listing.page.external_links.len(),
            })?;
        let meta = self.metadata.fetch_meta(meta_source, meta_id).await?;

        // MAL pages line up with title buckets, so it is preferred for titles
        let episodes = match pick(ids, MetadataSource::Mal) {
            Some((source, title_id)) => {
                reconcile::reconcile_from_source(&self.metadata, source, title_id, &listing.episodes)
                    .await
            }
            None => Vec::new(),
        };

        Ok(AnimeInfo {
            ids,
            meta,
            details: EpisodeDetails {
                has_next_page: listing.episodes.has_next_page,
                episodes,
            },
        })
    }

    /// Provider id for a MyAnimeList entry
    pub async fn match_mal(&self, provider: ProviderKind, mal_id: u64) -> Result<String> {
        let details = self.metadata.jikan.get_anime_details(mal_id).await?;
        self.providers
            .match_session(provider, &MatchTarget::from(&details))
            .await
    }

    /// [`info`](Self::info) keyed by MyAnimeList id
    pub async fn info_by_mal(
        &self,
        provider: ProviderKind,
        mal_id: u64,
        page: u32,
    ) -> Result<AnimeInfo> {
        let id = self.match_mal(provider, mal_id).await?;
        info!(mal_id = mal_id, provider = %provider, id = %id, "Resolved MAL entry");
        self.info(provider, &id, page).await
    }

    pub async fn meta(&self, source: MetadataSource, id: u64) -> Result<AnimeMeta> {
        self.metadata.fetch_meta(source, id).await
    }

    pub async fn search(&self, provider: ProviderKind, query: &str) -> Result<Vec<SearchResult>> {
        self.providers.search(provider, query).await
    }

    pub async fn streams(&self, provider: ProviderKind, id: &str, session: &str) -> Result<StreamMap> {
        self.providers.get_episode_streams(provider, id, session).await
    }

    pub async fn resolve_identity(&self, scheme: Scheme, id: &str) -> Result<CrosswalkRow> {
        self.crosswalk.resolve(scheme, id).await
    }

    pub async fn anime_page(&self, provider: ProviderKind, id: &str) -> Result<AnimePage> {
        self.providers.get_anime_page(provider, id).await
    }

    pub async fn episodes(
        &self,
        provider: ProviderKind,
        id: &str,
        sort: EpisodeSort,
        page: u32,
    ) -> Result<EpisodePage> {
        self.providers.get_episodes(provider, id, sort, page).await
    }

    pub async fn extract_stream(&self, embed_url: &str) -> Result<String> {
        self.extractor.extract(embed_url).await
    }
}

/// The preferred source when its id is known, otherwise the other one
fn pick(ids: CanonicalIds, preferred: MetadataSource) -> Option<(MetadataSource, u64)> {
    let anilist = ids.anilist.map(|id| (MetadataSource::AniList, id));
    let mal = ids.mal.map(|id| (MetadataSource::Mal, id));
    match preferred {
        MetadataSource::AniList => anilist.or(mal),
        MetadataSource::Mal => mal.or(anilist),
    }
}
