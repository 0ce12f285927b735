//! Keyword crawling: the per-keyword workflow and its upstream collaborators.

pub mod autocomplete;
pub mod extract;
pub mod matching;
pub mod processor;
pub mod volume;

pub use extract::{BlockItem, DetailInfo, KinExtractor, PageExtractor, ResultPage};
pub use matching::{MatchTrace, UrlMatcher};
pub use processor::KeywordProcessor;
pub use volume::{
    AdApiCredentials, NullVolumeLookup, SearchAdClient, SearchVolume, VolumeError, VolumeLookup,
};

use crate::http_client::FetchError;
use crate::repository::DieselError;

/// Errors that abort a single keyword.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Volume(#[from] VolumeError),
    #[error("malformed autocomplete payload: {0}")]
    Autocomplete(String),
    #[error("invalid pattern: {0}")]
    Selector(String),
    #[error("database error: {0}")]
    Database(#[from] DieselError),
    #[error("keyword {0} not found")]
    UnknownKeyword(i32),
}
