//! Anime aggregator library.
//!
//! Resolves one anime across metadata databases, reconciles a provider's
//! episode listing against metadata episode titles and extracts playable
//! stream links from packed embed pages.

pub mod cache;
pub mod crosswalk;
pub mod error;
pub mod extractor;
pub mod http;
pub mod metadata;
pub mod provider;
pub mod reconcile;
pub mod service;

pub use cache::{Cache, CacheStats};
pub use crosswalk::{CrosswalkResolver, CrosswalkRow, Scheme, SchemeId};
pub use error::{Error, Result};
pub use extractor::{Sandbox, SandboxLimits, ScriptEval, StreamExtractor};
pub use http::{HttpClient, HttpFetch, HttpRequest, ReqwestFetcher};
pub use metadata::{MetadataClients, MetadataSource, TitleBucket};
pub use provider::{EpisodeSort, ProviderKind, Providers};
pub use service::AnimeService;
