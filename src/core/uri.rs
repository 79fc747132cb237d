//! WAMP URI type.
//!
//! Re-exported from [`battler_wamp_uri`], which also owns the `prefix`/`wildcard` pattern types
//! and the token-trie used by the broker's wildcard subscription index.
pub use battler_wamp_uri::{
    validate_strict_uri,
    validate_uri_tokens,
    InvalidUri,
    Uri,
};
