//! Pure, deterministic logic: classification, parsing and formatting.
//! No I/O lives here.

pub mod classifier;
pub mod error;
pub mod numstat;
pub mod summary;
pub mod transcript;
pub mod types;
