//! Cross-database identity resolution.
//!
//! A single bulk table maps each anime across a dozen ID schemes. The whole
//! table is downloaded, cached for a day and searched linearly; lookup
//! volume is low next to the cost of loading it.

use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpRequest};
use serde::{Deserialize, Serialize};
use shared::{CanonicalIds, ExternalLink};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

const TABLE_CACHE_KEY: &str = "crosswalk:table";

/// The ID schemes carried by the crosswalk table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    LiveChart,
    AnimePlanet,
    AniSearch,
    AniDb,
    Kitsu,
    Mal,
    AniList,
    NotifyMoe,
    TheTvdb,
    Imdb,
    TheMovieDb,
    AnimeCountdown,
}

impl Scheme {
    pub const ALL: [Scheme; 12] = [
        Scheme::LiveChart,
        Scheme::AnimePlanet,
        Scheme::AniSearch,
        Scheme::AniDb,
        Scheme::Kitsu,
        Scheme::Mal,
        Scheme::AniList,
        Scheme::NotifyMoe,
        Scheme::TheTvdb,
        Scheme::Imdb,
        Scheme::TheMovieDb,
        Scheme::AnimeCountdown,
    ];

    /// Column name in the crosswalk table
    pub fn column(&self) -> &'static str {
        match self {
            Scheme::LiveChart => "livechart_id",
            Scheme::AnimePlanet => "anime-planet_id",
            Scheme::AniSearch => "anisearch_id",
            Scheme::AniDb => "anidb_id",
            Scheme::Kitsu => "kitsu_id",
            Scheme::Mal => "mal_id",
            Scheme::AniList => "anilist_id",
            Scheme::NotifyMoe => "notify.moe_id",
            Scheme::TheTvdb => "thetvdb_id",
            Scheme::Imdb => "imdb_id",
            Scheme::TheMovieDb => "themoviedb_id",
            Scheme::AnimeCountdown => "animecountdown_id",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::LiveChart => "livechart",
            Scheme::AnimePlanet => "anime-planet",
            Scheme::AniSearch => "anisearch",
            Scheme::AniDb => "anidb",
            Scheme::Kitsu => "kitsu",
            Scheme::Mal => "mal",
            Scheme::AniList => "anilist",
            Scheme::NotifyMoe => "notify.moe",
            Scheme::TheTvdb => "thetvdb",
            Scheme::Imdb => "imdb",
            Scheme::TheMovieDb => "themoviedb",
            Scheme::AnimeCountdown => "animecountdown",
        }
    }

    /// Scheme behind a provider external-link label, when it is one we map from
    pub fn from_link_label(label: &str) -> Option<Scheme> {
        match label.trim() {
            "AniList" => Some(Scheme::AniList),
            "MAL" | "MyAnimeList" => Some(Scheme::Mal),
            "AniDB" => Some(Scheme::AniDb),
            _ => None,
        }
    }

    /// Render a table value the same way for every row of this scheme
    pub fn normalize(&self, value: &SchemeId) -> String {
        match value {
            SchemeId::Numeric(n) => n.to_string(),
            SchemeId::Text(s) => s.trim().to_string(),
            SchemeId::Other(v) => match integral(v) {
                Some(n) => n.to_string(),
                None => v.to_string(),
            },
        }
    }
}

/// Float cells that hold a whole number, such as `1.0`
fn integral(value: &serde_json::Value) -> Option<i64> {
    let f = value.as_f64()?;
    (f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64)
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Scheme::ALL
            .into_iter()
            .find(|scheme| scheme.as_str() == wanted || scheme.column() == wanted)
            .ok_or_else(|| format!("unknown id scheme: {s}"))
    }
}

/// A table cell. Schemes differ in whether they use numbers or strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemeId {
    Numeric(i64),
    Text(String),
    Other(serde_json::Value),
}

impl SchemeId {
    fn as_u64(&self) -> Option<u64> {
        match self {
            SchemeId::Numeric(n) => u64::try_from(*n).ok(),
            SchemeId::Text(s) => s.trim().parse().ok(),
            SchemeId::Other(v) => integral(v).and_then(|n| u64::try_from(n).ok()),
        }
    }
}

/// One anime's identifiers across every scheme
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrosswalkRow {
    #[serde(rename = "livechart_id", default, skip_serializing_if = "Option::is_none")]
    pub livechart: Option<SchemeId>,
    #[serde(rename = "anime-planet_id", default, skip_serializing_if = "Option::is_none")]
    pub anime_planet: Option<SchemeId>,
    #[serde(rename = "anisearch_id", default, skip_serializing_if = "Option::is_none")]
    pub anisearch: Option<SchemeId>,
    #[serde(rename = "anidb_id", default, skip_serializing_if = "Option::is_none")]
    pub anidb: Option<SchemeId>,
    #[serde(rename = "kitsu_id", default, skip_serializing_if = "Option::is_none")]
    pub kitsu: Option<SchemeId>,
    #[serde(rename = "mal_id", default, skip_serializing_if = "Option::is_none")]
    pub mal: Option<SchemeId>,
    #[serde(rename = "anilist_id", default, skip_serializing_if = "Option::is_none")]
    pub anilist: Option<SchemeId>,
    #[serde(rename = "notify.moe_id", default, skip_serializing_if = "Option::is_none")]
    pub notify_moe: Option<SchemeId>,
    #[serde(rename = "thetvdb_id", default, skip_serializing_if = "Option::is_none")]
    pub thetvdb: Option<SchemeId>,
    #[serde(rename = "imdb_id", default, skip_serializing_if = "Option::is_none")]
    pub imdb: Option<SchemeId>,
    #[serde(rename = "themoviedb_id", default, skip_serializing_if = "Option::is_none")]
    pub themoviedb: Option<SchemeId>,
    #[serde(rename = "animecountdown_id", default, skip_serializing_if = "Option::is_none")]
    pub animecountdown: Option<SchemeId>,
}

impl CrosswalkRow {
    pub fn get(&self, scheme: Scheme) -> Option<&SchemeId> {
        match scheme {
            Scheme::LiveChart => self.livechart.as_ref(),
            Scheme::AnimePlanet => self.anime_planet.as_ref(),
            Scheme::AniSearch => self.anisearch.as_ref(),
            Scheme::AniDb => self.anidb.as_ref(),
            Scheme::Kitsu => self.kitsu.as_ref(),
            Scheme::Mal => self.mal.as_ref(),
            Scheme::AniList => self.anilist.as_ref(),
            Scheme::NotifyMoe => self.notify_moe.as_ref(),
            Scheme::TheTvdb => self.thetvdb.as_ref(),
            Scheme::Imdb => self.imdb.as_ref(),
            Scheme::TheMovieDb => self.themoviedb.as_ref(),
            Scheme::AnimeCountdown => self.animecountdown.as_ref(),
        }
    }

    /// The scheme's value in its normalized string form
    pub fn normalized(&self, scheme: Scheme) -> Option<String> {
        self.get(scheme).map(|value| scheme.normalize(value))
    }

    pub fn canonical_ids(&self) -> CanonicalIds {
        CanonicalIds {
            mal: self.mal.as_ref().and_then(SchemeId::as_u64),
            anilist: self.anilist.as_ref().and_then(SchemeId::as_u64),
        }
    }
}

/// First row whose `scheme` column stringifies equal to `id`
pub fn find_row<'a>(table: &'a [CrosswalkRow], scheme: Scheme, id: &str) -> Option<&'a CrosswalkRow> {
    let id = id.trim();
    table
        .iter()
        .find(|row| row.normalized(scheme).as_deref() == Some(id))
}

struct LoadedTable {
    rows: Arc<Vec<CrosswalkRow>>,
    expires_at: Instant,
}

impl LoadedTable {
    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Resolves ids between schemes using the bulk crosswalk table
pub struct CrosswalkResolver {
    http: HttpClient,
    cache: Arc<Cache>,
    source_url: Url,
    ttl: Duration,
    /// In-process snapshot, replaced wholesale once its source entry expires
    loaded: RwLock<Option<LoadedTable>>,
}

impl CrosswalkResolver {
    pub fn new(http: HttpClient, cache: Arc<Cache>, source_url: Url, ttl: Duration) -> Self {
        Self {
            http,
            cache,
            source_url,
            ttl,
            loaded: RwLock::new(None),
        }
    }

    /// The full table, from memory, the cache, or the network in that order
    pub async fn fetch_table(&self) -> Result<Arc<Vec<CrosswalkRow>>> {
        if let Some(rows) = self.snapshot().await {
            return Ok(rows);
        }

        let mut loaded = self.loaded.write().await;
        // Another caller may have loaded it while we waited for the lock
        if let Some(table) = loaded.as_ref().filter(|table| table.is_live()) {
            return Ok(table.rows.clone());
        }

        // A snapshot never outlives the entry it was read from
        let (rows, lifetime) = match self.cache.get_with_ttl(TABLE_CACHE_KEY).await {
            Some((rows, remaining)) => (rows, remaining.min(self.ttl)),
            None => {
                info!(url = %self.source_url, "Downloading crosswalk table");
                let rows: Vec<CrosswalkRow> = self
                    .http
                    .get_json(HttpRequest::get(self.source_url.clone()))
                    .await?;
                self.cache.set(TABLE_CACHE_KEY, &rows, self.ttl).await;
                (rows, self.ttl)
            }
        };

        info!(
            rows = rows.len(),
            lifetime_secs = lifetime.as_secs(),
            "Crosswalk table loaded"
        );
        let rows = Arc::new(rows);
        *loaded = Some(LoadedTable {
            rows: rows.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(rows)
    }

    async fn snapshot(&self) -> Option<Arc<Vec<CrosswalkRow>>> {
        let loaded = self.loaded.read().await;
        loaded
            .as_ref()
            .filter(|table| table.is_live())
            .map(|table| table.rows.clone())
    }

    /// Row whose `scheme` id equals `id`
    pub async fn resolve(&self, scheme: Scheme, id: &str) -> Result<CrosswalkRow> {
        let table = self.fetch_table().await?;
        find_row(&table, scheme, id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no ids found for {scheme}: {id}")))
    }

    /// Map a provider page's external links to a canonical (MAL, AniList) pair
    ///
    /// The first recognized link that resolves wins; later links are not
    /// consulted. A link that fails to resolve is skipped.
    pub async fn resolve_links(&self, links: &[ExternalLink]) -> Result<CanonicalIds> {
        for link in links {
            let Some(scheme) = Scheme::from_link_label(&link.label) else {
                debug!(label = %link.label, "Skipping unrecognized external link");
                continue;
            };
            let Some(id) = link.foreign_id() else {
                warn!(url = %link.url, "External link carries no id");
                continue;
            };

            match self.resolve(scheme, id).await {
                Ok(row) => {
                    let ids = row.canonical_ids();
                    debug!(
                        scheme = %scheme,
                        id = id,
                        mal = ?ids.mal,
                        anilist = ?ids.anilist,
                        "Resolved canonical ids"
                    );
                    return Ok(ids);
                }
                Err(e) => {
                    warn!(scheme = %scheme, id = id, error = %e, "External link did not resolve");
                }
            }
        }

        Err(Error::IdentityUnresolved { links: links.len() })
    }
}
