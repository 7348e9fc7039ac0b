//! AnimePahe JSON API response types.

use serde::{Deserialize, Deserializer};

/// Paginated envelope shared by the release and search endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct Paginated<T> {
    #[serde(default)]
    pub total: u32,
    #[serde(default = "first_page")]
    pub current_page: u32,
    #[serde(default = "first_page")]
    pub last_page: u32,
    /// Null on empty pages
    #[serde(default, deserialize_with = "null_as_zero")]
    pub from: u32,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub to: u32,
    /// Absent entirely when nothing matched
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

fn first_page() -> u32 {
    1
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or_default())
}

/// One row of `/api?m=release`
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseEntry {
    #[serde(deserialize_with = "episode_number")]
    pub episode: u32,
    #[serde(default)]
    pub snapshot: String,
    pub session: String,
}

/// One row of `/api?m=search`
#[derive(Debug, Clone, Deserialize)]
pub struct SearchEntry {
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub episodes: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub poster: Option<String>,
    pub session: String,
}

/// Episode numbers show up as integers, floats ("12.5" specials) or strings
fn episode_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u32),
        Float(f64),
        Text(String),
    }

    let number = match Raw::deserialize(deserializer)? {
        Raw::Int(n) => return Ok(n),
        Raw::Float(f) => f,
        Raw::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid episode number: {s}")))?,
    };

    if !number.is_finite() || number < 0.0 {
        return Err(serde::de::Error::custom(format!(
            "invalid episode number: {number}"
        )));
    }
    Ok(number.trunc() as u32)
}
