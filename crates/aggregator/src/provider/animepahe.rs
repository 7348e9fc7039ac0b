//! AnimePahe client.
//!
//! The site has no public API contract: anime and play pages are scraped
//! as HTML and the episode listing comes from the JSON endpoint the site's
//! own frontend calls.

use super::matching::{best_match, MatchTarget};
use super::types::{Paginated, ReleaseEntry, SearchEntry};
use super::EpisodeSort;
use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::extractor::StreamExtractor;
use crate::http::{HttpClient, HttpRequest};
use futures::future::join_all;
use scraper::{Html, Selector};
use shared::config::{CacheConfig, ProviderConfig};
use shared::{
    AnimeListing, AnimePage, EpisodePage, EpisodeRaw, ExternalLink, SearchResult, StreamMap,
    StreamSource,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Per-resource cache lifetimes
#[derive(Debug, Clone, Copy)]
pub struct ProviderTtls {
    pub anime_page: Duration,
    pub episodes: Duration,
    pub streams: Duration,
}

impl From<&CacheConfig> for ProviderTtls {
    fn from(config: &CacheConfig) -> Self {
        Self {
            anime_page: config.anime_page_ttl(),
            episodes: config.episodes_ttl(),
            streams: config.streams_ttl(),
        }
    }
}

/// A resolution button on a play page
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolutionButton {
    src: String,
    resolution: String,
    audio: String,
}

pub struct AnimePahe {
    http: HttpClient,
    cache: Arc<Cache>,
    base_url: Url,
    extractor: StreamExtractor,
    ttls: ProviderTtls,
}

impl AnimePahe {
    pub fn new(
        http: HttpClient,
        cache: Arc<Cache>,
        extractor: StreamExtractor,
        config: &ProviderConfig,
        ttls: ProviderTtls,
    ) -> Result<Self> {
        let base = format!("{}/", config.base_url.trim_end_matches('/'));
        Ok(Self {
            http,
            cache,
            base_url: Url::parse(&base)?,
            extractor,
            ttls,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Browser-like headers; the referer points at the anime page when known
    fn request(&self, url: Url, anime_id: Option<&str>) -> HttpRequest {
        let base = self.base_url.as_str().trim_end_matches('/');
        let referer = match anime_id {
            Some(id) => format!("{base}/anime/{id}"),
            None => base.to_string(),
        };

        HttpRequest::get(url).headers([
            (
                "accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
            ),
            ("accept-language", "en-US,en;q=0.9".to_string()),
            ("cookie", "__ddg2_=;".to_string()),
            ("dnt", "1".to_string()),
            ("referer", referer),
            ("sec-fetch-dest", "empty".to_string()),
            ("sec-fetch-mode", "cors".to_string()),
            ("sec-fetch-site", "same-origin".to_string()),
            ("x-requested-with", "XMLHttpRequest".to_string()),
        ])
    }

    /// External links from the anime page
    pub async fn get_anime_page(&self, id: &str) -> Result<AnimePage> {
        let key = format!("animepahe:page:{}", id);
        self.cache
            .remember(&key, self.ttls.anime_page, || async {
                let url = self.url(&format!("anime/{id}"))?;
                debug!(anime_id = id, "Fetching anime page");
                let html = self.http.get_text(self.request(url, Some(id))).await?;
                parse_anime_page(&html)
            })
            .await
    }

    /// One page of the episode listing
    pub async fn get_episodes(&self, id: &str, sort: EpisodeSort, page: u32) -> Result<EpisodePage> {
        let key = format!("animepahe:episodes:{}:page_{}:sort_{}", id, page, sort);
        self.cache
            .remember(&key, self.ttls.episodes, || async {
                let mut url = self.url("api")?;
                url.query_pairs_mut()
                    .append_pair("m", "release")
                    .append_pair("id", id)
                    .append_pair("sort", sort.as_str())
                    .append_pair("page", &page.to_string());

                debug!(anime_id = id, page = page, sort = %sort, "Fetching episodes");
                let response: Paginated<ReleaseEntry> =
                    self.http.get_json(self.request(url, Some(id))).await?;
                self.to_episode_page(id, response)
            })
            .await
    }

    fn to_episode_page(&self, id: &str, response: Paginated<ReleaseEntry>) -> Result<EpisodePage> {
        let list = response
            .data
            .into_iter()
            .map(|entry| {
                let url = self.url(&format!("play/{}/{}", id, entry.session))?;
                Ok(EpisodeRaw {
                    id: format!("{}/{}", id, entry.session),
                    preview: entry.snapshot,
                    episode: entry.episode,
                    url: url.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(EpisodePage {
            total: response.total,
            from: response.from,
            to: response.to,
            has_next_page: response.current_page < response.last_page,
            list,
        })
    }

    /// Anime page plus one page of episodes, newest first
    ///
    /// Either failure fails the whole call.
    pub async fn get_anime(&self, id: &str, page: u32) -> Result<AnimeListing> {
        let anime_page = self.get_anime_page(id).await?;
        let episodes = self.get_episodes(id, EpisodeSort::Descending, page).await?;

        Ok(AnimeListing {
            page: anime_page,
            episodes,
        })
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let mut url = self.url("api")?;
        url.query_pairs_mut()
            .append_pair("m", "search")
            .append_pair("q", query);

        info!(query = query, "Searching provider");
        let response: Paginated<SearchEntry> = self.http.get_json(self.request(url, None)).await?;

        Ok(response
            .data
            .into_iter()
            .map(|entry| SearchResult {
                id: entry.session,
                title: entry.title,
                poster: entry.poster,
                kind: entry.kind,
                episodes: entry.episodes,
                year: entry.year,
                season: entry.season,
                status: entry.status,
                score: entry.score,
            })
            .collect())
    }

    /// Provider session for a MAL entry, cached per MAL id
    ///
    /// A search that comes back empty or without an acceptable match is
    /// `NotFound` and is not cached.
    pub async fn match_session(&self, target: &MatchTarget) -> Result<String> {
        let key = format!("animepahe:session:{}", target.mal_id);
        self.cache
            .remember(&key, self.ttls.anime_page, || async {
                let results = self.search(&target.query).await?;
                if results.is_empty() {
                    return Err(Error::NotFound(format!(
                        "no search results for {}",
                        target.query
                    )));
                }

                let matched = best_match(target, &results).ok_or_else(|| {
                    warn!(
                        mal_id = target.mal_id,
                        candidates = results.len(),
                        "No search result matched"
                    );
                    Error::NotFound(format!("no provider match for MAL {}", target.mal_id))
                })?;

                info!(
                    mal_id = target.mal_id,
                    session = %matched.id,
                    title = %matched.title,
                    "Matched provider session"
                );
                Ok(matched.id.clone())
            })
            .await
    }

    /// Stream links for one episode, grouped by audio language
    ///
    /// Buttons are resolved concurrently. A button whose extraction fails
    /// is left out; if every button fails the first error is returned.
    /// Results with missing buttons are not cached.
    pub async fn get_episode_streams(&self, id: &str, session: &str) -> Result<StreamMap> {
        let key = format!("animepahe:streams:{}:{}", id, session);
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let url = self.url(&format!("play/{id}/{session}"))?;
        debug!(anime_id = id, session = session, "Fetching play page");
        let html = self.http.get_text(self.request(url, Some(id))).await?;
        let buttons = parse_resolution_menu(&html)?;

        let results = join_all(
            buttons
                .iter()
                .map(|button| self.extractor.extract(&button.src)),
        )
        .await;

        let mut streams = StreamMap::new();
        let mut first_error = None;
        let mut failed = 0;
        for (button, result) in buttons.into_iter().zip(results) {
            match result {
                Ok(link) => streams.entry(button.audio).or_default().push(StreamSource {
                    resolution: button.resolution,
                    link,
                }),
                Err(e) => {
                    warn!(
                        src = %button.src,
                        resolution = %button.resolution,
                        error = %e,
                        "Stream extraction failed"
                    );
                    failed += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        if streams.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        if failed == 0 {
            self.cache.set(&key, &streams, self.ttls.streams).await;
        }
        Ok(streams)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::parse(format!("invalid selector {css}: {e}")))
}

/// Upstream hrefs are often `//host/path`; make them absolute https URLs
fn normalize_href(href: &str) -> Option<String> {
    let href = href.trim();
    if href.starts_with("https://") || href.starts_with("http://") {
        return Some(href.to_string());
    }
    let stripped = href.trim_start_matches('/');
    (!stripped.is_empty()).then(|| format!("https://{stripped}"))
}

fn parse_anime_page(html: &str) -> Result<AnimePage> {
    let document = Html::parse_document(html);
    let container = selector(".external-links")?;
    let anchor = selector(".external-links > a")?;

    if document.select(&container).next().is_none() {
        return Err(Error::parse("anime page has no external links block"));
    }

    let external_links = document
        .select(&anchor)
        .filter_map(|a| {
            let url = normalize_href(a.value().attr("href")?)?;
            let label = a.text().collect::<String>().trim().to_string();
            Some(ExternalLink { label, url })
        })
        .collect();

    Ok(AnimePage { external_links })
}

fn parse_resolution_menu(html: &str) -> Result<Vec<ResolutionButton>> {
    let document = Html::parse_document(html);
    let menu = selector("#resolutionMenu")?;
    let button = selector("#resolutionMenu > button")?;

    if document.select(&menu).next().is_none() {
        return Err(Error::parse("play page has no resolution menu"));
    }

    Ok(document
        .select(&button)
        .filter_map(|b| {
            let element = b.value();
            let attr = |name: &str| element.attr(name).map(str::trim).unwrap_or_default().to_string();
            let src = attr("data-src");
            if src.is_empty() {
                return None;
            }
            Some(ResolutionButton {
                src,
                resolution: attr("data-resolution"),
                audio: attr("data-audio"),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::sandbox::testing::InlineEval;
    use crate::http::testing::StubFetcher;
    use tempfile::TempDir;

    const BASE: &str = "https://animepahe.test";
    const ANIME_HTML: &str = include_str!("../../fixtures/animepahe_anime.html");
    const PLAY_HTML: &str = include_str!("../../fixtures/animepahe_play.html");
    const EMBED: &str = include_str!("../../fixtures/kwik_embed.html");

    const RELEASES: &str = r#"{
        "total": 3, "per_page": 30, "current_page": 1, "last_page": 2,
        "from": 1, "to": 3,
        "data": [
            {"id": 3, "anime_id": 77, "episode": 3, "snapshot": "https://i.test/3.jpg", "session": "s3"},
            {"id": 2, "anime_id": 77, "episode": 2, "snapshot": "https://i.test/2.jpg", "session": "s2"},
            {"id": 1, "anime_id": 77, "episode": 1, "snapshot": "https://i.test/1.jpg", "session": "s1"}
        ]
    }"#;

    fn client_with(stub: &Arc<StubFetcher>, cache: Cache) -> AnimePahe {
        let config = ProviderConfig {
            base_url: BASE.to_string(),
        };
        let extractor = StreamExtractor::with_sandbox(
            stub.client(),
            "https://animepahe.ru/".to_string(),
            Arc::new(InlineEval),
        );
        AnimePahe::new(
            stub.client(),
            Arc::new(cache),
            extractor,
            &config,
            ProviderTtls::from(&CacheConfig::default()),
        )
        .unwrap()
    }

    fn client(stub: &Arc<StubFetcher>) -> AnimePahe {
        client_with(stub, Cache::disabled())
    }

    #[test]
    fn test_normalize_href() {
        assert_eq!(
            normalize_href("//anilist.co/anime/1").as_deref(),
            Some("https://anilist.co/anime/1")
        );
        assert_eq!(
            normalize_href(" https://myanimelist.net/anime/1 ").as_deref(),
            Some("https://myanimelist.net/anime/1")
        );
        assert_eq!(normalize_href("   "), None);
        assert_eq!(normalize_href("//"), None);
    }

    #[test]
    fn test_parse_anime_page() {
        let page = parse_anime_page(ANIME_HTML).unwrap();
        assert_eq!(
            page.external_links,
            vec![
                ExternalLink::new("AniList", "https://anilist.co/anime/12345"),
                ExternalLink::new("AniDB", "https://anidb.net/anime/4000"),
                ExternalLink::new("MyAnimeList", "https://myanimelist.net/anime/999"),
                ExternalLink::new("Kitsu", "https://kitsu.app/anime/kimi-no-uta"),
            ]
        );
    }

    #[test]
    fn test_parse_anime_page_without_links_block() {
        let err = parse_anime_page("<html><body><h1>Maintenance</h1></body></html>").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_parse_resolution_menu() {
        let buttons = parse_resolution_menu(PLAY_HTML).unwrap();
        assert_eq!(buttons.len(), 3);
        assert_eq!(
            buttons[2],
            ResolutionButton {
                src: "https://kwik.test/e/bbb720".to_string(),
                resolution: "720".to_string(),
                audio: "eng".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_get_anime_page_sends_referer() {
        let stub = StubFetcher::new();
        stub.respond("https://animepahe.test/anime/abc", ANIME_HTML);

        let page = client(&stub).get_anime_page("abc").await.unwrap();
        assert_eq!(page.external_links.len(), 4);

        let request = &stub.requests()[0];
        assert_eq!(
            request.header_value("referer"),
            Some("https://animepahe.test/anime/abc")
        );
        assert_eq!(request.header_value("cookie"), Some("__ddg2_=;"));
    }

    #[tokio::test]
    async fn test_get_episodes_maps_rows() {
        let stub = StubFetcher::new();
        stub.respond(
            "https://animepahe.test/api?m=release&id=abc&sort=episode_asc&page=1",
            RELEASES,
        );

        let page = client(&stub)
            .get_episodes("abc", EpisodeSort::Ascending, 1)
            .await
            .unwrap();

        assert!(page.has_next_page);
        assert_eq!((page.total, page.from, page.to), (3, 1, 3));
        assert_eq!(
            page.list[0],
            EpisodeRaw {
                id: "abc/s3".to_string(),
                preview: "https://i.test/3.jpg".to_string(),
                episode: 3,
                url: "https://animepahe.test/play/abc/s3".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_get_episodes_cached_per_tuple() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let stub = StubFetcher::new();
        let url = "https://animepahe.test/api?m=release&id=abc&sort=episode_desc&page=1";
        stub.respond(url, RELEASES);
        let client = client_with(&stub, Cache::new(temp_dir.path(), true));

        let first = client.get_episodes("abc", EpisodeSort::Descending, 1).await?;
        let second = client.get_episodes("abc", EpisodeSort::Descending, 1).await?;
        assert_eq!(first, second);
        assert_eq!(stub.hits(url), 1);

        // A different sort is a different cache entry
        let err = client
            .get_episodes("abc", EpisodeSort::Ascending, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));

        Ok(())
    }

    #[tokio::test]
    async fn test_get_anime_fails_whole_on_episode_error() {
        let stub = StubFetcher::new();
        stub.respond("https://animepahe.test/anime/abc", ANIME_HTML);
        stub.fail(
            "https://animepahe.test/api?m=release&id=abc&sort=episode_desc&page=1",
            500,
        );

        let err = client(&stub).get_anime("abc", 1).await.unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_search() {
        let stub = StubFetcher::new();
        stub.respond(
            "https://animepahe.test/api?m=search&q=kimi+no+uta",
            r#"{"total": 1, "per_page": 8, "current_page": 1, "last_page": 1, "from": 1, "to": 1,
                "data": [{"id": 77, "title": "Kimi no Uta", "type": "TV", "episodes": 24,
                          "status": "Finished Airing", "season": "Spring", "year": 2019,
                          "score": 8.1, "poster": "https://i.test/p.jpg", "session": "abc"}]}"#,
        );
        stub.respond(
            "https://animepahe.test/api?m=search&q=nothing",
            r#"{"total": 0}"#,
        );

        let client = client(&stub);
        let results = client.search("kimi no uta").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "abc");
        assert_eq!(results[0].kind.as_deref(), Some("TV"));

        assert!(client.search("nothing").await.unwrap().is_empty());
    }

    fn kimi_no_uta() -> MatchTarget {
        MatchTarget {
            mal_id: 999,
            query: "Kimi no Uta".to_string(),
            titles: vec!["Kimi no Uta".to_string(), "Your Song".to_string()],
            year: Some(2019),
            season: Some("spring".to_string()),
            kind: Some("TV".to_string()),
        }
    }

    const KIMI_SEARCH: &str = "https://animepahe.test/api?m=search&q=Kimi+no+Uta";

    #[tokio::test]
    async fn test_match_session_is_cached() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let stub = StubFetcher::new();
        stub.respond(
            KIMI_SEARCH,
            r#"{"total": 3, "current_page": 1, "last_page": 1, "from": 1, "to": 3,
                "data": [
                    {"title": "Kimi no Uta", "type": "Movie", "year": 2019, "season": "Spring", "session": "movie"},
                    {"title": "Kimi no Uta 2nd Season", "type": "TV", "year": 2021, "season": "Fall", "session": "sequel"},
                    {"title": "Kimi no Uta", "type": "TV", "year": 2019, "season": "Spring", "session": "tv"}
                ]}"#,
        );

        let client = client_with(&stub, Cache::new(temp_dir.path(), true));
        assert_eq!(client.match_session(&kimi_no_uta()).await?, "tv");
        assert_eq!(client.match_session(&kimi_no_uta()).await?, "tv");
        assert_eq!(stub.hits(KIMI_SEARCH), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_match_session_without_match_is_not_found() {
        let stub = StubFetcher::new();
        stub.respond(
            KIMI_SEARCH,
            r#"{"total": 1, "data": [{"title": "Kimi ni Todoke", "type": "TV", "year": 2019,
                "season": "Spring", "session": "other"}]}"#,
        );
        let client = client(&stub);

        let err = client.match_session(&kimi_no_uta()).await.unwrap_err();
        assert!(err.is_not_found());

        stub.respond(KIMI_SEARCH, r#"{"total": 0}"#);
        let err = client.match_session(&kimi_no_uta()).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(stub.hits(KIMI_SEARCH), 2);
    }

    #[tokio::test]
    async fn test_episode_streams_grouped_by_audio() {
        let stub = StubFetcher::new();
        stub.respond("https://animepahe.test/play/abc/s3", PLAY_HTML);
        stub.respond("https://kwik.test/e/aaa360", EMBED);
        stub.respond("https://kwik.test/e/aaa1080", EMBED);
        stub.respond("https://kwik.test/e/bbb720", EMBED);

        let streams = client(&stub).get_episode_streams("abc", "s3").await.unwrap();

        let keys: Vec<&str> = streams.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["eng", "jpn"]);
        let jpn: Vec<&str> = streams["jpn"].iter().map(|s| s.resolution.as_str()).collect();
        assert_eq!(jpn, vec!["360", "1080"]);
        assert_eq!(streams["eng"][0].link, "https://cdn.example/stream.m3u8");
    }

    #[tokio::test]
    async fn test_episode_streams_skip_failed_button() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let stub = StubFetcher::new();
        stub.respond("https://animepahe.test/play/abc/s3", PLAY_HTML);
        stub.respond("https://kwik.test/e/aaa360", EMBED);
        stub.fail("https://kwik.test/e/aaa1080", 403);
        stub.respond("https://kwik.test/e/bbb720", EMBED);
        let client = client_with(&stub, Cache::new(temp_dir.path(), true));

        let streams = client.get_episode_streams("abc", "s3").await?;
        assert_eq!(streams["jpn"].len(), 1);
        assert_eq!(streams["jpn"][0].resolution, "360");

        // Partial results are not cached
        client.get_episode_streams("abc", "s3").await?;
        assert_eq!(stub.hits("https://animepahe.test/play/abc/s3"), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_episode_streams_all_failed() {
        let stub = StubFetcher::new();
        stub.respond("https://animepahe.test/play/abc/s3", PLAY_HTML);

        let err = client(&stub).get_episode_streams("abc", "s3").await.unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
    }
}
