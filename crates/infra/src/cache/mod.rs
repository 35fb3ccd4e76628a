//! In-process caches backing core ports

mod token_cache;

pub use token_cache::MokaTokenCache;
