//! Response types for the Jikan REST API and the AniList GraphQL API.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Jikan
// ---------------------------------------------------------------------------

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub last_visible_page: u32,
    pub has_next_page: bool,
    #[serde(default)]
    pub current_page: Option<u32>,
}

/// `/anime/{id}` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimeDetailsResponse {
    pub data: AnimeDetails,
}

/// The anime fields the aggregator maps into metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimeDetails {
    pub mal_id: u64,
    pub images: AnimeImages,

    // Titles
    pub title: String,
    pub title_english: Option<String>,
    pub title_japanese: Option<String>,
    #[serde(default)]
    pub title_synonyms: Vec<String>,
    /// Every known title, default and synonyms included
    #[serde(default)]
    pub titles: Vec<JikanTitle>,

    #[serde(rename = "type")]
    pub anime_type: Option<String>,
    pub year: Option<u32>,
    #[serde(default)]
    pub season: Option<String>,
    pub rating: Option<String>,
    pub score: Option<f64>,
    pub synopsis: Option<String>,
    pub trailer: Option<JikanTrailer>,

    #[serde(default)]
    pub genres: Vec<MalEntity>,
    #[serde(default)]
    pub studios: Vec<MalEntity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JikanTitle {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
}

/// Anime images
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimeImages {
    pub jpg: ImageSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSet {
    pub image_url: Option<String>,
    pub small_image_url: Option<String>,
    pub large_image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JikanTrailer {
    pub youtube_id: Option<String>,
}

/// MAL entity (genre, studio, producer, etc.)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MalEntity {
    pub mal_id: u64,
    pub name: String,
}

/// `/anime/{id}/episodes` response, one page of up to 100 episodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodesResponse {
    pub pagination: Pagination,
    #[serde(default)]
    pub data: Vec<JikanEpisode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JikanEpisode {
    /// The episode number
    pub mal_id: u32,
    pub title: Option<String>,
    #[serde(default)]
    pub filler: bool,
    #[serde(default)]
    pub recap: bool,
}

// ---------------------------------------------------------------------------
// AniList
// ---------------------------------------------------------------------------

/// GraphQL envelope
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    pub status: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaData<T> {
    #[serde(rename = "Media")]
    pub media: Option<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnilistMedia {
    pub id: u64,
    pub cover_image: Option<CoverImage>,
    pub banner_image: Option<String>,
    pub title: AnilistTitle,
    pub description: Option<String>,
    pub season_year: Option<u32>,
    pub format: Option<String>,
    pub mean_score: Option<f64>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub studios: Option<StudioConnection>,
    pub trailer: Option<AnilistTrailer>,
    #[serde(default)]
    pub is_adult: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverImage {
    pub color: Option<String>,
    pub large: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnilistTitle {
    pub english: Option<String>,
    pub romaji: Option<String>,
    pub native: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudioConnection {
    #[serde(default)]
    pub nodes: Vec<Studio>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Studio {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnilistTrailer {
    pub id: Option<String>,
    pub site: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnilistStreamingEpisodes {
    #[serde(default)]
    pub streaming_episodes: Vec<StreamingEpisode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingEpisode {
    pub title: Option<String>,
}
