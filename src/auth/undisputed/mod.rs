pub mod authenticator;
pub mod message;
pub mod user;

pub use authenticator::{
    ClientAuthenticator,
    ServerAuthenticator,
};
pub use user::UserData;
