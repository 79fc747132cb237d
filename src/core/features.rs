use battler_wamp_values::WampDictionary;

/// Advanced features for WAMP routers and peers, related to pub/sub.
#[derive(Debug, Default, Clone, WampDictionary)]
pub struct PubSubFeatures {}

/// Advanced features for WAMP routers and peers, related to RPCs.
#[derive(Debug, Default, Clone, WampDictionary)]
pub struct RpcFeatures {
    /// The callee may receive an `INTERRUPT` for an actively cancelled procedure call.
    pub callee_cancelling: bool,
    /// Procedures may produce progressive results.
    pub progressive_call_results: bool,
    /// The peer can enforce call timeouts.
    pub call_timeout: bool,
}

/// Advanced features advertised by a router acting as a broker.
#[derive(Debug, Default, Clone, WampDictionary)]
pub struct BrokerFeatures {}

/// Advanced features advertised by a router acting as a dealer.
#[derive(Debug, Default, Clone, WampDictionary)]
pub struct DealerFeatures {
    /// The dealer supports `CANCEL`/`INTERRUPT` for in-flight invocations.
    pub call_canceling: bool,
}
