//! URI types and the pattern-matching engine used for WAMP pub/sub and RPC routing.
//!
//! A WAMP URI is a dot-separated sequence of tokens. [`Uri`] is a validated, exact-match URI.
//! [`WildcardUri`] is a pattern URI that may contain empty tokens, used together with
//! [`MatchPolicy`] to describe `prefix` and `wildcard` subscriptions. [`TokenTrie`] is the ordered,
//! token-keyed trie that backs wildcard subscription storage.

mod trie;
mod uri;
mod wildcard;

pub use trie::{
    TokenTrie,
    TokenTrieCursor,
    WildcardMatcher,
};
pub use uri::{
    validate_uri_tokens,
    InvalidUri,
    Uri,
};
pub use wildcard::{
    MatchPolicy,
    WildcardUri,
};
