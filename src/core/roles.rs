#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PeerRole {
    // Calls RPC endpoints.
    Caller,
    // Registers RPC endpoints.
    Callee,
    // Publishes events to topics.
    Publisher,
    // Subscribes to events for topics.
    Subscriber,
}

impl PeerRole {
    pub fn key_for_details(&self) -> &str {
        match self {
            Self::Caller => "caller",
            Self::Callee => "callee",
            Self::Publisher => "publisher",
            Self::Subscriber => "subscriber",
        }
    }
}

use battler_wamp_values::{
    Dictionary,
    Value,
    WampSerialize,
    WampSerializeError,
};

use crate::core::features::{
    BrokerFeatures,
    DealerFeatures,
    PubSubFeatures,
    RpcFeatures,
};

/// The set of roles and advertised features a peer presents in its `HELLO.details.roles`.
///
/// `caller`/`callee` roles advertise [`RpcFeatures`]; `publisher`/`subscriber` roles advertise
/// [`PubSubFeatures`].
pub struct PeerRoles {
    roles: Vec<PeerRole>,
    pub_sub_features: PubSubFeatures,
    rpc_features: RpcFeatures,
}

impl PeerRoles {
    pub fn new(
        roles: impl IntoIterator<Item = PeerRole>,
        pub_sub_features: PubSubFeatures,
        rpc_features: RpcFeatures,
    ) -> Self {
        Self {
            roles: roles.into_iter().collect(),
            pub_sub_features,
            rpc_features,
        }
    }

    /// Serializes the roles into the `roles` dictionary expected in `HELLO`/`WELCOME` details.
    pub fn wamp_serialize(self) -> Result<Value, WampSerializeError> {
        let mut dict = Dictionary::default();
        for role in self.roles {
            let features = match role {
                PeerRole::Caller | PeerRole::Callee => self.rpc_features.clone().wamp_serialize()?,
                PeerRole::Publisher | PeerRole::Subscriber => {
                    self.pub_sub_features.clone().wamp_serialize()?
                }
            };
            let mut role_details = Dictionary::default();
            role_details.insert("features".to_owned(), features);
            dict.insert(
                role.key_for_details().to_owned(),
                Value::Dictionary(role_details),
            );
        }
        Ok(Value::Dictionary(dict))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouterRole {
    // Supports RPC calls.
    Dealer,
    // Supports pub/sub.
    Broker,
}

impl RouterRole {
    pub fn key_for_details(&self) -> &str {
        match self {
            Self::Dealer => "dealer",
            Self::Broker => "broker",
        }
    }
}
