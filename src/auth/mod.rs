pub mod auth_method;
pub mod authenticator;
pub mod channel_binding;
pub mod identity;
pub mod key_derivation_function;
pub mod message;
pub mod scram;
pub mod undisputed;

pub use identity::Identity;
