pub mod authenticator;
pub mod core;
pub mod message;
pub mod user;

pub use authenticator::{
    ClientAuthenticator,
    ServerAuthenticator,
};
pub use user::{
    UserData,
    UserDatabase,
    UserDatabaseFactory,
    new_user,
};
