use std::time::Duration;

use anyhow::{
    Error,
    Result,
};
use futures_util::{
    future::join_all,
    lock::Mutex,
};

use crate::{
    auth::authenticator::GenericServerAuthenticator,
    core::{
        close::CloseReason,
        hash::HashMap,
        id::{
            CryptoSeededSequentialIdAllocator,
            Id,
        },
        uri::Uri,
    },
    router::{
        broker::Broker,
        dealer::{
            Dealer,
            RemovedSessionInvocations,
        },
        disclosure::DisclosureRules,
        session::SessionHandle,
    },
};

/// Authentication requirements advertised by a realm.
#[derive(Default)]
pub struct RealmAuthenticationConfig {
    /// Whether a peer must authenticate to join this realm. When `false`, peers that offer no
    /// `HELLO.details.authmethods` are let in with an empty [`crate::auth::identity::Identity`].
    pub required: bool,
    /// The authentication methods the realm is willing to challenge a peer with, tried in order
    /// against the peer's advertised `authmethods`.
    pub methods: Vec<Box<dyn GenericServerAuthenticator + Send + Sync>>,
}

#[derive(Clone)]
pub struct RealmConfig {
    pub name: String,
    pub uri: Uri,
    pub authentication: std::sync::Arc<RealmAuthenticationConfig>,
    pub disclosure: DisclosureRules,
}

impl Default for RealmConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            uri: Uri::from_known("realm"),
            authentication: std::sync::Arc::new(RealmAuthenticationConfig::default()),
            disclosure: DisclosureRules::default(),
        }
    }
}

/// The realm-scoped ID allocators for subscription, registration, publication, and invocation
/// request IDs.
///
/// Each of these is independently seeded: the WAMP global ID scope only requires that IDs be
/// unpredictable and non-colliding *within their own namespace*, not across namespaces.
#[derive(Default)]
pub struct RealmIdAllocators {
    pub subscription: CryptoSeededSequentialIdAllocator,
    pub registration: CryptoSeededSequentialIdAllocator,
    pub publication: CryptoSeededSequentialIdAllocator,
    pub invocation: CryptoSeededSequentialIdAllocator,
}

pub struct Realm {
    pub config: RealmConfig,
    pub sessions: Mutex<HashMap<Id, SessionHandle>>,
    pub broker: Mutex<Broker>,
    pub dealer: Mutex<Dealer>,
    pub id_allocators: RealmIdAllocators,
    /// Woken whenever a new invocation deadline is armed that is earlier than the one the
    /// deadline sweep task is currently sleeping on, so the sweep does not have to poll.
    pub deadline_notify: tokio::sync::Notify,
}

impl Realm {
    pub fn new(config: RealmConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::default()),
            broker: Mutex::new(Broker::new()),
            dealer: Mutex::new(Dealer::new()),
            id_allocators: RealmIdAllocators::default(),
            deadline_notify: tokio::sync::Notify::new(),
        }
    }

    pub fn uri(&self) -> &Uri {
        &self.config.uri
    }

    pub async fn shut_down(&self, close_reason: CloseReason) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let mut futures = Vec::default();
        for (_, session) in &mut *sessions {
            session.close(close_reason)?;
            futures.push(session.closed_session_rx_mut().recv());
        }

        tokio::select! {
            _ = join_all(futures) => {},
            _ = tokio::time::sleep(Duration::from_secs(2)) => {
                return Err(Error::msg("timed out waiting for sessions to close cleanly"));
            }
        }

        Ok(())
    }

    /// Removes every trace of `session` from this realm's broker and dealer, e.g. on session
    /// departure.
    ///
    /// Returns the caller- and callee-side invocations orphaned by the departure, so the realm's
    /// session loop can notify the remaining half of each affected job.
    pub async fn remove_session(&self, session: Id) -> RemovedSessionInvocations {
        self.broker.lock().await.remove_session(session);
        let removed = self.dealer.lock().await.remove_session(session);
        self.deadline_notify.notify_one();
        removed
    }
}

#[derive(Default)]
pub struct RealmManager {
    realms: HashMap<Uri, Realm>,
}

impl RealmManager {
    pub fn get(&self, uri: &Uri) -> Option<&Realm> {
        self.realms.get(uri)
    }

    pub fn insert(&mut self, realm: Realm) {
        let uri = realm.uri().clone();
        self.realms.insert(uri, realm);
    }

    pub fn remove(&mut self, uri: &Uri) -> Option<Realm> {
        self.realms.remove(uri)
    }

    pub fn uris(&self) -> impl Iterator<Item = &Uri> {
        self.realms.keys()
    }
}
