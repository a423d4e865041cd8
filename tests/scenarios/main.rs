//! Cross-crate scenarios
//!
//! Each module drives the public facade the way a service would: config
//! from TOML, a DAO over the in-memory backends, compaction against the
//! consistency watermark, parallel split export and the expiration janitor.

mod common;

mod document_lifecycle;
mod min_split_size;
mod parallel_export;
