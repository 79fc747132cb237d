mod connector;
mod peer;
mod session;
mod web_socket_peer;

pub use peer::{
    CalleeConfig,
    Peer,
    PeerConfig,
    PeerNotConnectedError,
    Procedure,
    ProcedureOptions,
    ProgressivePendingRpc,
    RpcCall,
    RpcResult,
    SimplePendingRpc,
    Subscription,
    SubscriptionOptions,
    SupportedAuthMethod,
    WebSocketConfig,
};
pub use session::{
    Interrupt,
    Invocation,
    ProcedureMessage,
    ProgressiveResultNotSupportedError,
    PublishedEvent,
    ReceivedEvent,
    RpcYield,
};
pub use web_socket_peer::{
    WebSocketPeer,
    new_web_socket_peer,
};
