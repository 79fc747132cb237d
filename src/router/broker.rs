use battler_wamp_uri::{
    MatchPolicy,
    TokenTrie,
    Uri,
    WildcardUri,
};

use crate::{
    auth::identity::Identity,
    core::{
        error::InteractionError,
        hash::HashMap,
        id::{
            Id,
            IdAllocator,
        },
        publish_options::PublishOptions,
    },
};

/// A single subscribed session on a [`Subscription`].
#[derive(Debug, Clone)]
pub struct SubscriberInfo {
    /// The subscribing session.
    pub session: Id,
    /// The identity of the subscribing session, used to evaluate publisher eligibility lists.
    pub identity: Identity,
}

/// A single subscription entry shared by every session subscribed to the same topic pattern under
/// the same match policy.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: Id,
    pub topic: WildcardUri,
    pub policy: MatchPolicy,
    pub subscribers: HashMap<Id, SubscriberInfo>,
}

/// A single subscriber to be delivered an event for a publication.
pub struct Recipient {
    pub session: Id,
    pub subscription: Id,
    /// The actual published topic, present only when the subscription matched via prefix or
    /// wildcard policy. Exact matches carry no topic detail, since it would be redundant with the
    /// topic the subscriber asked for.
    pub topic_detail: Option<Uri>,
}

/// The pub/sub routing core for a single realm.
///
/// Subscriptions are stored in three independent pattern indices, one per [`MatchPolicy`], so a
/// publication only ever has to consult the index it can possibly match: exact lookups are O(1)
/// against a hash map, while prefix and wildcard lookups walk a [`TokenTrie`] keyed by the
/// dot-separated tokens of the topic URI.
#[derive(Default)]
pub struct Broker {
    exact: HashMap<String, Subscription>,
    prefix: TokenTrie<Subscription>,
    wildcard: TokenTrie<Subscription>,
    subscription_locations: HashMap<Id, (WildcardUri, MatchPolicy)>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `session` to `topic` under `policy`, returning the (possibly shared)
    /// subscription ID.
    pub async fn subscribe(
        &mut self,
        session: Id,
        identity: Identity,
        topic: WildcardUri,
        policy: MatchPolicy,
        id_allocator: &dyn IdAllocator,
    ) -> Id {
        let id = match policy {
            MatchPolicy::Exact => {
                if let Some(existing) = self.exact.get(topic.as_str()) {
                    let id = existing.id;
                    self.exact
                        .get_mut(topic.as_str())
                        .expect("just looked up")
                        .subscribers
                        .insert(session, SubscriberInfo { session, identity });
                    id
                } else {
                    let id = id_allocator.generate_id().await;
                    let mut subscribers = HashMap::default();
                    subscribers.insert(session, SubscriberInfo { session, identity });
                    self.exact.insert(
                        topic.as_str().to_owned(),
                        Subscription {
                            id,
                            topic: topic.clone(),
                            policy,
                            subscribers,
                        },
                    );
                    id
                }
            }
            MatchPolicy::Prefix | MatchPolicy::Wildcard => {
                let trie = match policy {
                    MatchPolicy::Prefix => &mut self.prefix,
                    MatchPolicy::Wildcard => &mut self.wildcard,
                    MatchPolicy::Exact => unreachable!(),
                };
                if let Some(existing) = trie.get_mut(topic.tokens()) {
                    existing
                        .subscribers
                        .insert(session, SubscriberInfo { session, identity });
                    existing.id
                } else {
                    let id = id_allocator.generate_id().await;
                    let mut subscribers = HashMap::default();
                    subscribers.insert(session, SubscriberInfo { session, identity });
                    trie.insert(
                        topic.tokens(),
                        Subscription {
                            id,
                            topic: topic.clone(),
                            policy,
                            subscribers,
                        },
                    );
                    id
                }
            }
        };
        self.subscription_locations.insert(id, (topic, policy));
        id
    }

    /// Unsubscribes `session` from the subscription identified by `id`, returning the URI of the
    /// (possibly now-removed) subscription.
    ///
    /// Per the unified `UNSUBSCRIBE` contract, this always returns the subscription's URI, whether
    /// or not the subscription itself was removed as a result: it is removed only once its last
    /// subscriber leaves.
    pub fn unsubscribe(&mut self, session: Id, id: Id) -> Result<WildcardUri, InteractionError> {
        let (topic, policy) = self
            .subscription_locations
            .get(&id)
            .cloned()
            .ok_or(InteractionError::NoSuchSubscription)?;
        let removed_entirely = match policy {
            MatchPolicy::Exact => {
                let entry = self
                    .exact
                    .get_mut(topic.as_str())
                    .ok_or(InteractionError::NoSuchSubscription)?;
                if entry.subscribers.remove(&session).is_none() {
                    return Err(InteractionError::NoSuchSubscription);
                }
                let empty = entry.subscribers.is_empty();
                if empty {
                    self.exact.remove(topic.as_str());
                }
                empty
            }
            MatchPolicy::Prefix | MatchPolicy::Wildcard => {
                let trie = match policy {
                    MatchPolicy::Prefix => &mut self.prefix,
                    MatchPolicy::Wildcard => &mut self.wildcard,
                    MatchPolicy::Exact => unreachable!(),
                };
                let entry = trie
                    .get_mut(topic.tokens())
                    .ok_or(InteractionError::NoSuchSubscription)?;
                if entry.subscribers.remove(&session).is_none() {
                    return Err(InteractionError::NoSuchSubscription);
                }
                let empty = entry.subscribers.is_empty();
                if empty {
                    trie.remove(topic.tokens());
                }
                empty
            }
        };
        if removed_entirely {
            self.subscription_locations.remove(&id);
        }
        Ok(topic)
    }

    /// Removes every subscription held by `session`, e.g. on session departure.
    pub fn remove_session(&mut self, session: Id) {
        let ids: Vec<Id> = self.subscription_locations.keys().copied().collect();
        for id in ids {
            // `unsubscribe` errors for IDs that don't include this session; safe to ignore here.
            let _ = self.unsubscribe(session, id);
        }
    }

    /// Resolves the set of recipients for a publication to `topic`, applying the eligibility
    /// filters from `options`.
    pub fn publish(&self, publisher: Id, topic: &Uri, options: &PublishOptions) -> Vec<Recipient> {
        let tokens: Vec<&str> = topic.tokens().collect();
        let mut recipients = Vec::new();

        if let Some(subscription) = self.exact.get(topic.as_ref()) {
            self.collect_eligible(publisher, subscription, options, None, &mut recipients);
        }

        let mut prefix_cursor = self.prefix.cursor();
        for token in &tokens {
            if !prefix_cursor.skip_to(*token) {
                break;
            }
            if let Some(subscription) = prefix_cursor.value() {
                self.collect_eligible(
                    publisher,
                    subscription,
                    options,
                    Some(topic.clone()),
                    &mut recipients,
                );
            }
        }

        let mut matcher = self.wildcard.wildcard_matcher(&tokens);
        while !matcher.done() {
            if let Some(subscription) = matcher.value() {
                self.collect_eligible(
                    publisher,
                    subscription,
                    options,
                    Some(topic.clone()),
                    &mut recipients,
                );
            }
            matcher.next();
        }

        recipients
    }

    fn collect_eligible(
        &self,
        publisher: Id,
        subscription: &Subscription,
        options: &PublishOptions,
        topic_detail: Option<Uri>,
        out: &mut Vec<Recipient>,
    ) {
        for subscriber in subscription.subscribers.values() {
            if options.exclude_me && subscriber.session == publisher {
                continue;
            }
            if let Some(exclude) = &options.exclude {
                if exclude.contains(&subscriber.session) {
                    continue;
                }
            }
            if let Some(exclude_authid) = &options.exclude_authid {
                if exclude_authid.contains(&subscriber.identity.id) {
                    continue;
                }
            }
            if let Some(exclude_authrole) = &options.exclude_authrole {
                if exclude_authrole.contains(&subscriber.identity.role) {
                    continue;
                }
            }
            if let Some(eligible) = &options.eligible {
                if !eligible.contains(&subscriber.session) {
                    continue;
                }
            }
            if let Some(eligible_authid) = &options.eligible_authid {
                if !eligible_authid.contains(&subscriber.identity.id) {
                    continue;
                }
            }
            if let Some(eligible_authrole) = &options.eligible_authrole {
                // WAMP's intent is to filter by the subscriber's `authrole`, not its `authid`.
                if !eligible_authrole.contains(&subscriber.identity.role) {
                    continue;
                }
            }
            out.push(Recipient {
                session: subscriber.session,
                subscription: subscription.id,
                topic_detail: topic_detail.clone(),
            });
        }
    }
}

#[cfg(test)]
mod broker_test {
    use battler_wamp_uri::{
        MatchPolicy,
        Uri,
        WildcardUri,
    };

    use super::Broker;
    use crate::{
        auth::identity::Identity,
        core::{
            id::{
                Id,
                SequentialIdAllocator,
            },
            publish_options::PublishOptions,
        },
    };

    fn identity() -> Identity {
        Identity::default()
    }

    fn id(value: u64) -> Id {
        Id::try_from(value).unwrap()
    }

    #[tokio::test]
    async fn exact_subscription_receives_exact_publish_only() {
        let mut broker = Broker::new();
        let id_allocator = SequentialIdAllocator::default();
        let topic = WildcardUri::new("com.example.topic", MatchPolicy::Exact).unwrap();
        broker
            .subscribe(id(1), identity(), topic, MatchPolicy::Exact, &id_allocator)
            .await;

        let recipients = broker.publish(
            id(99),
            &Uri::try_from("com.example.topic").unwrap(),
            &PublishOptions::default(),
        );
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].session, id(1));
        assert!(recipients[0].topic_detail.is_none());

        let recipients = broker.publish(
            id(99),
            &Uri::try_from("com.example.other").unwrap(),
            &PublishOptions::default(),
        );
        assert!(recipients.is_empty());
    }

    #[tokio::test]
    async fn wildcard_matcher_set_matches_spec_scenario() {
        let mut broker = Broker::new();
        let id_allocator = SequentialIdAllocator::default();
        let patterns = [
            "", ".", "a..c", "a.b.", "a..", ".b.", "..", "x..", ".x.", "..x", "x..x", "x.x.",
            ".x.x", "x.x.x",
        ];
        for pattern in patterns {
            let topic = WildcardUri::new(pattern, MatchPolicy::Wildcard).unwrap();
            broker
                .subscribe(id(1), identity(), topic, MatchPolicy::Wildcard, &id_allocator)
                .await;
        }

        let recipients = broker.publish(
            id(99),
            &Uri::try_from("a.b.c").unwrap(),
            &PublishOptions::default(),
        );
        assert_eq!(recipients.len(), 5);
    }

    #[tokio::test]
    async fn unsubscribe_removes_entry_only_after_last_subscriber() {
        let mut broker = Broker::new();
        let id_allocator = SequentialIdAllocator::default();
        let topic = WildcardUri::new("com.example.topic", MatchPolicy::Exact).unwrap();
        let subscription_id = broker
            .subscribe(id(1), identity(), topic.clone(), MatchPolicy::Exact, &id_allocator)
            .await;
        broker
            .subscribe(id(2), identity(), topic, MatchPolicy::Exact, &id_allocator)
            .await;

        assert_eq!(
            broker.unsubscribe(id(1), subscription_id).unwrap().as_str(),
            "com.example.topic"
        );
        let recipients = broker.publish(
            id(99),
            &Uri::try_from("com.example.topic").unwrap(),
            &PublishOptions::default(),
        );
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].session, id(2));

        broker.unsubscribe(id(2), subscription_id).unwrap();
        assert!(broker.unsubscribe(id(2), subscription_id).is_err());
    }

    #[tokio::test]
    async fn eligible_authrole_filters_by_authrole_not_authid() {
        let mut broker = Broker::new();
        let id_allocator = SequentialIdAllocator::default();
        let topic = WildcardUri::new("com.example.topic", MatchPolicy::Exact).unwrap();
        broker
            .subscribe(
                id(1),
                Identity {
                    id: "alice".to_owned(),
                    role: "admin".to_owned(),
                },
                topic.clone(),
                MatchPolicy::Exact,
                &id_allocator,
            )
            .await;
        broker
            .subscribe(
                id(2),
                Identity {
                    id: "admin".to_owned(),
                    role: "guest".to_owned(),
                },
                topic,
                MatchPolicy::Exact,
                &id_allocator,
            )
            .await;

        let mut options = PublishOptions::default();
        options.eligible_authrole = Some(crate::core::hash::HashSet::from_iter([
            "admin".to_owned(),
        ]));
        let recipients = broker.publish(
            id(99),
            &Uri::try_from("com.example.topic").unwrap(),
            &options,
        );
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].session, id(1));
    }
}
