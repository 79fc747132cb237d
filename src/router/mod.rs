mod acceptor;
mod app;
mod broker;
mod connection;
mod context;
mod dealer;
mod disclosure;
mod realm;
mod router;
pub mod session;
mod web_socket_router;

pub use app::{
    pub_sub::{
        EmptyPubSubPolicies,
        PubSubPolicies,
    },
    rpc::{
        EmptyRpcPolicies,
        RpcPolicies,
    },
};
pub use realm::RealmConfig;
pub use router::{
    Router,
    RouterConfig,
    RouterHandle,
};
pub use web_socket_router::{
    WebSocketRouter,
    new_web_socket_router,
};
