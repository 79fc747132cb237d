//! Wire-level value types shared by all WAMP messages.
//!
//! These are re-exports of [`battler_wamp_values`], kept under `core::types` so the
//! rest of the crate can depend on a single stable import path regardless of which
//! crate actually owns the definitions.
pub use battler_wamp_values::{
    Dictionary,
    Integer,
    List,
    Value,
};
