use anyhow::{
    Error,
    Result,
};
use battler_wamp_uri::{
    MatchPolicy,
    WildcardUri,
};
use battler_wamp_values::WampSerialize;
use log::{
    info,
    trace,
    warn,
};
use tokio::sync::{
    broadcast,
    mpsc::UnboundedSender,
};

use crate::{
    auth::{
        authenticator::GenericServerAuthenticator,
        identity::Identity,
    },
    core::{
        cancel::CallCancelMode,
        close::CloseReason,
        error::{
            BasicError,
            InteractionError,
        },
        id::{
            Id,
            IdAllocator,
        },
        publish_options::PublishOptions,
        types::{
            Dictionary,
            Value,
        },
        uri::Uri,
    },
    message::{
        common::{
            abort_message_for_error,
            goodbye_and_out,
            goodbye_with_close_reason,
        },
        message::{
            ChallengeMessage,
            ErrorMessage,
            EventMessage,
            InterruptMessage,
            InvocationMessage,
            Message,
            PublishedMessage,
            RegisteredMessage,
            ResultMessage,
            SubscribedMessage,
            UnregisteredMessage,
            UnsubscribedMessage,
            WelcomeMessage,
        },
    },
    router::context::{
        RealmContext,
        RouterContext,
    },
};

/// A session in the middle of a challenge/response authentication exchange.
#[derive(Debug, Clone)]
struct AuthenticatingSessionState {
    realm: Uri,
    method_index: usize,
    /// Whether `HELLO.details.roles.callee.features.callee_cancelling` was set, carried across
    /// the challenge/response exchange to [`Session::establish_session`].
    callee_cancelling: bool,
}

/// A session that has completed `HELLO`/`WELCOME` and joined a realm.
#[derive(Debug, Clone)]
struct EstablishedSessionState {
    realm: Uri,
    identity: Identity,
}

#[derive(Debug, Clone, Default)]
enum SessionState {
    #[default]
    Closed,
    Authenticating(AuthenticatingSessionState),
    Established(EstablishedSessionState),
    Closing,
}

impl SessionState {
    fn allowed_state_transition(&self, next: &Self) -> bool {
        match (self, next) {
            (Self::Closed, Self::Authenticating(_)) => true,
            (Self::Closed, Self::Established(_)) => true,
            (Self::Authenticating(_), Self::Established(_)) => true,
            (Self::Authenticating(_), Self::Closed) => true,
            (Self::Established(_), Self::Closing) => true,
            (Self::Established(_), Self::Closed) => true,
            (Self::Closing, Self::Closed) => true,
            _ => false,
        }
    }

    fn same_kind(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

pub struct SessionHandle {
    message_tx: UnboundedSender<Message>,
    closed_session_rx: broadcast::Receiver<()>,
    /// Whether this session advertised `roles.callee.features.callee_cancelling` in its `HELLO`.
    /// Consulted by the dealer's cancel/departure logic to decide whether `INTERRUPT` is
    /// meaningful to send this session.
    callee_cancelling: bool,
}

impl SessionHandle {
    /// Sends a message directly to this session, bypassing its own outbound state transitions.
    ///
    /// Used for routing traffic (`EVENT`, `INVOCATION`, `RESULT`, ...) originated by other
    /// sessions in the same realm.
    pub fn send_message(&self, message: Message) -> Result<()> {
        self.message_tx.send(message).map_err(Error::new)
    }

    pub fn close(&self, close_reason: CloseReason) -> Result<()> {
        self.send_message(goodbye_with_close_reason(close_reason))
    }

    pub fn closed_session_rx_mut(&mut self) -> &mut broadcast::Receiver<()> {
        &mut self.closed_session_rx
    }

    pub fn callee_cancelling(&self) -> bool {
        self.callee_cancelling
    }
}

pub struct Session {
    id: Id,
    message_tx: UnboundedSender<Message>,
    service_message_tx: UnboundedSender<Message>,
    state: SessionState,

    closed_session_tx: broadcast::Sender<()>,
}

impl Session {
    pub fn new(
        id: Id,
        message_tx: UnboundedSender<Message>,
        service_message_tx: UnboundedSender<Message>,
    ) -> Self {
        let (closed_session_tx, _) = broadcast::channel(16);
        Self {
            id,
            message_tx,
            service_message_tx,
            state: SessionState::default(),

            closed_session_tx,
        }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn closed(&self) -> bool {
        matches!(self.state, SessionState::Closed)
    }

    pub fn session_handle(&self, callee_cancelling: bool) -> SessionHandle {
        SessionHandle {
            message_tx: self.message_tx.clone(),
            closed_session_rx: self.closed_session_tx.subscribe(),
            callee_cancelling,
        }
    }

    fn established_session_state(&self) -> Result<&EstablishedSessionState> {
        match &self.state {
            SessionState::Established(state) => Ok(state),
            _ => Err(Error::msg("session is not in the established state")),
        }
    }

    pub fn send_message(&mut self, message: Message) -> Result<()> {
        self.transition_state_from_sending_message(&message)?;
        self.service_message_tx.send(message).map_err(Error::new)
    }

    fn transition_state_from_sending_message(&mut self, message: &Message) -> Result<()> {
        let next_state = match message {
            Message::Abort(_) => SessionState::Closed,
            Message::Goodbye(_) => match self.state {
                SessionState::Closing => SessionState::Closed,
                _ => SessionState::Closing,
            },
            _ => return Ok(()),
        };
        self.transition_state(next_state)
    }

    pub async fn handle_message<S>(
        &mut self,
        context: &RouterContext<S>,
        message: Message,
    ) -> Result<()> {
        trace!("Received message for session {}: {message:?}", self.id);
        if let Err(err) = self.handle_message_on_state_machine(context, message).await {
            self.send_message(abort_message_for_error(&err))?;
            return Err(err);
        }
        Ok(())
    }

    async fn handle_message_on_state_machine<S>(
        &mut self,
        context: &RouterContext<S>,
        message: Message,
    ) -> Result<()> {
        match self.state {
            SessionState::Closed => self.handle_closed(context, message).await,
            SessionState::Authenticating(_) => self.handle_authenticating(context, message).await,
            SessionState::Established(_) => self.handle_established(context, message).await,
            SessionState::Closing => self.handle_closing(context, message).await,
        }
    }

    async fn handle_closed<S>(
        &mut self,
        context: &RouterContext<S>,
        message: Message,
    ) -> Result<()> {
        match message {
            Message::Hello(message) => {
                let realm_context = context.realm_context(&message.realm)?;
                let auth_config = realm_context.realm().config.authentication.clone();

                let offered_methods = message
                    .details
                    .get("authmethods")
                    .and_then(|value| value.list())
                    .map(|list| {
                        list.iter()
                            .filter_map(|value| value.string())
                            .filter_map(|raw| crate::auth::auth_method::AuthMethod::try_from(raw).ok())
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();

                let matched = auth_config
                    .methods
                    .iter()
                    .position(|authenticator| offered_methods.contains(&authenticator.auth_method()));

                let callee_cancelling = message
                    .details
                    .get("roles")
                    .and_then(|value| value.dictionary())
                    .and_then(|roles| roles.get("callee"))
                    .and_then(|value| value.dictionary())
                    .and_then(|callee| callee.get("features"))
                    .and_then(|value| value.dictionary())
                    .and_then(|features| features.get("callee_cancelling"))
                    .and_then(|value| value.bool())
                    .unwrap_or(false);

                match matched {
                    Some(method_index) => {
                        let authenticator = &auth_config.methods[method_index];
                        let challenge = authenticator.challenge(&message).await?;
                        self.send_message(Message::Challenge(ChallengeMessage {
                            auth_method: challenge.auth_method,
                            extra: challenge.extra,
                        }))?;
                        self.transition_state(SessionState::Authenticating(
                            AuthenticatingSessionState {
                                realm: message.realm.clone(),
                                method_index,
                                callee_cancelling,
                            },
                        ))?;
                        Ok(())
                    }
                    None if auth_config.required => {
                        Err(InteractionError::AuthenticationRequired.into())
                    }
                    None => {
                        let welcome = self.base_welcome_message(context);
                        self.establish_session(
                            context,
                            &message.realm,
                            Identity::default(),
                            welcome,
                            callee_cancelling,
                        )
                        .await
                    }
                }
            }
            _ => Err(InteractionError::ProtocolViolation(format!(
                "received {} message on a closed session",
                message.message_name()
            ))
            .into()),
        }
    }

    async fn handle_authenticating<S>(
        &mut self,
        context: &RouterContext<S>,
        message: Message,
    ) -> Result<()> {
        let state = match &self.state {
            SessionState::Authenticating(state) => state.clone(),
            _ => unreachable!(),
        };
        match message {
            Message::Authenticate(message) => {
                let realm_context = context.realm_context(&state.realm)?;
                let auth_config = realm_context.realm().config.authentication.clone();
                let authenticator = auth_config
                    .methods
                    .get(state.method_index)
                    .ok_or(InteractionError::NoSuchAuthMethod)?;
                let server_final = authenticator.authenticate(&message).await?;
                let identity = server_final.identity.clone();
                let mut welcome = self.base_welcome_message(context);
                server_final.embed_into_welcome_message(&mut welcome)?;
                self.establish_session(
                    context,
                    &state.realm,
                    identity,
                    welcome,
                    state.callee_cancelling,
                )
                .await
            }
            Message::Abort(_) => self.transition_state(SessionState::Closed),
            _ => Err(InteractionError::ProtocolViolation(format!(
                "received {} message while authenticating",
                message.message_name()
            ))
            .into()),
        }
    }

    fn base_welcome_message<S>(&self, context: &RouterContext<S>) -> WelcomeMessage {
        let mut details = Dictionary::default();
        details.insert(
            "agent".to_owned(),
            Value::String(context.router().config.agent.clone()),
        );
        details.insert(
            "roles".to_owned(),
            Value::Dictionary(
                context
                    .router()
                    .config
                    .roles
                    .iter()
                    .map(|role| {
                        (
                            role.key_for_details().to_owned(),
                            Value::Dictionary(Dictionary::default()),
                        )
                    })
                    .collect(),
            ),
        );
        WelcomeMessage {
            session: self.id,
            details,
        }
    }

    async fn establish_session<S>(
        &mut self,
        context: &RouterContext<S>,
        realm: &Uri,
        identity: Identity,
        welcome: WelcomeMessage,
        callee_cancelling: bool,
    ) -> Result<()> {
        let realm_context = context.realm_context(realm)?;
        realm_context
            .realm()
            .sessions
            .lock()
            .await
            .insert(self.id, self.session_handle(callee_cancelling));
        info!("Session {} joined realm {realm}", self.id);

        self.send_message(Message::Welcome(welcome))?;

        self.transition_state(SessionState::Established(EstablishedSessionState {
            realm: realm.clone(),
            identity,
        }))
    }

    async fn handle_established<S>(
        &mut self,
        context: &RouterContext<S>,
        message: Message,
    ) -> Result<()> {
        match message {
            Message::Abort(_) => {
                warn!("Router session {} aborted by peer: {message:?}", self.id);
                self.transition_state(SessionState::Closed)
            }
            Message::Goodbye(_) => self.send_message(goodbye_and_out()),
            Message::Subscribe(inner) => {
                let request = inner.request;
                match self.do_subscribe(context, inner).await {
                    Ok(subscription_id) => self.send_message(Message::Subscribed(SubscribedMessage {
                        subscribe_request: request,
                        subscription: subscription_id,
                    })),
                    Err(err) => self.send_message(Message::Error(ErrorMessage {
                        request_type: 32,
                        request,
                        error: crate::core::error::error_uri(&err),
                        details: Dictionary::from_iter([(
                            "message".to_owned(),
                            Value::String(err.to_string()),
                        )]),
                        ..Default::default()
                    })),
                }
            }
            Message::Unsubscribe(inner) => {
                let request = inner.request;
                match self.do_unsubscribe(context, inner).await {
                    Ok(()) => self.send_message(Message::Unsubscribed(UnsubscribedMessage {
                        unsubscribe_request: request,
                    })),
                    Err(err) => self.send_message(Message::Error(ErrorMessage {
                        request_type: 34,
                        request,
                        error: crate::core::error::error_uri(&err),
                        details: Dictionary::from_iter([(
                            "message".to_owned(),
                            Value::String(err.to_string()),
                        )]),
                        ..Default::default()
                    })),
                }
            }
            Message::Publish(inner) => {
                let request = inner.request;
                let acknowledge = inner
                    .options
                    .get("acknowledge")
                    .and_then(|value| value.bool())
                    .unwrap_or(false);
                match self.do_publish(context, inner).await {
                    Ok(publication_id) => {
                        if acknowledge {
                            self.send_message(Message::Published(PublishedMessage {
                                publish_request: request,
                                publication: publication_id,
                            }))
                        } else {
                            Ok(())
                        }
                    }
                    Err(err) => {
                        if acknowledge {
                            self.send_message(Message::Error(ErrorMessage {
                                request_type: 16,
                                request,
                                error: crate::core::error::error_uri(&err),
                                details: Dictionary::from_iter([(
                                    "message".to_owned(),
                                    Value::String(err.to_string()),
                                )]),
                                ..Default::default()
                            }))
                        } else {
                            warn!("Session {} publish failed: {err}", self.id);
                            Ok(())
                        }
                    }
                }
            }
            Message::Register(inner) => {
                let request = inner.request;
                match self.do_register(context, inner).await {
                    Ok(registration_id) => self.send_message(Message::Registered(RegisteredMessage {
                        register_request: request,
                        registration: registration_id,
                    })),
                    Err(err) => self.send_message(Message::Error(ErrorMessage {
                        request_type: 64,
                        request,
                        error: crate::core::error::error_uri(&err),
                        details: Dictionary::from_iter([(
                            "message".to_owned(),
                            Value::String(err.to_string()),
                        )]),
                        ..Default::default()
                    })),
                }
            }
            Message::Unregister(inner) => {
                let request = inner.request;
                match self.do_unregister(context, inner).await {
                    Ok(()) => self.send_message(Message::Unregistered(UnregisteredMessage {
                        unregister_request: request,
                    })),
                    Err(err) => self.send_message(Message::Error(ErrorMessage {
                        request_type: 66,
                        request,
                        error: crate::core::error::error_uri(&err),
                        details: Dictionary::from_iter([(
                            "message".to_owned(),
                            Value::String(err.to_string()),
                        )]),
                        ..Default::default()
                    })),
                }
            }
            Message::Call(inner) => {
                let request = inner.request;
                if let Err(err) = self.do_call(context, inner).await {
                    self.send_message(Message::Error(ErrorMessage {
                        request_type: 48,
                        request,
                        error: crate::core::error::error_uri(&err),
                        details: Dictionary::from_iter([(
                            "message".to_owned(),
                            Value::String(err.to_string()),
                        )]),
                        ..Default::default()
                    }))
                } else {
                    Ok(())
                }
            }
            Message::Cancel(inner) => self.do_cancel(context, inner).await,
            Message::Yield(inner) => self.do_yield(context, inner).await,
            Message::Error(inner) if inner.request_type == 68 => {
                self.do_invocation_error(context, inner).await
            }
            _ => Err(InteractionError::ProtocolViolation(format!(
                "received {} message on an established session",
                message.message_name()
            ))
            .into()),
        }
    }

    async fn realm_context<'router, S>(
        &self,
        context: &'router RouterContext<S>,
    ) -> Result<RealmContext<'router, S>> {
        let realm = self.established_session_state()?.realm.clone();
        context.realm_context(&realm)
    }

    async fn do_subscribe<S>(
        &mut self,
        context: &RouterContext<S>,
        message: crate::message::message::SubscribeMessage,
    ) -> Result<Id> {
        let policy = match message.options.get("match").and_then(|value| value.string()) {
            Some(raw) => MatchPolicy::try_from(raw)?,
            None => MatchPolicy::Exact,
        };
        let topic = WildcardUri::new(message.topic.as_ref(), policy)?;

        let realm_context = self.realm_context(context).await?;
        context
            .router()
            .pub_sub_policies
            .validate_subscription(&realm_context, self.id, &message.topic)
            .await?;

        let identity = self.established_session_state()?.identity.clone();
        let subscription_id = {
            let allocator = &realm_context.realm().id_allocators.subscription;
            let mut broker = realm_context.realm().broker.lock().await;
            broker.subscribe(self.id, identity, topic, policy, allocator).await
        };
        Ok(subscription_id)
    }

    async fn do_unsubscribe<S>(
        &mut self,
        context: &RouterContext<S>,
        message: crate::message::message::UnsubscribeMessage,
    ) -> Result<()> {
        let realm_context = self.realm_context(context).await?;
        let mut broker = realm_context.realm().broker.lock().await;
        broker.unsubscribe(self.id, message.subscribed_subscription)?;
        Ok(())
    }

    async fn do_publish<S>(
        &mut self,
        context: &RouterContext<S>,
        message: crate::message::message::PublishMessage,
    ) -> Result<Id> {
        let realm_context = self.realm_context(context).await?;
        context
            .router()
            .pub_sub_policies
            .validate_publication(&realm_context, self.id, &message.topic)
            .await?;

        let options = PublishOptions::try_from(&message)?;
        let disclose_me = message
            .options
            .get("disclose_me")
            .and_then(|value| value.bool());
        let disclosed = realm_context
            .realm()
            .config
            .disclosure
            .publish
            .effective_disclosure(disclose_me)?;

        let identity = self.established_session_state()?.identity.clone();
        let publication_id = realm_context
            .realm()
            .id_allocators
            .publication
            .generate_id()
            .await;

        let recipients = {
            let broker = realm_context.realm().broker.lock().await;
            broker.publish(self.id, &message.topic, &options)
        };

        for recipient in recipients {
            let mut details = Dictionary::default();
            if let Some(topic_detail) = &recipient.topic_detail {
                details.insert("topic".to_owned(), Value::String(topic_detail.to_string()));
            }
            if disclosed {
                details.insert("publisher".to_owned(), self.id.wamp_serialize()?);
                details.insert("publisher_authid".to_owned(), Value::String(identity.id.clone()));
                details.insert(
                    "publisher_authrole".to_owned(),
                    Value::String(identity.role.clone()),
                );
            }
            let event = Message::Event(EventMessage {
                subscribed_subscription: recipient.subscription,
                published_publication: publication_id,
                details,
                publish_arguments: message.arguments.clone(),
                publish_arguments_keyword: message.arguments_keyword.clone(),
            });
            if let Err(err) = realm_context.send_to_session(recipient.session, event).await {
                warn!(
                    "Failed to deliver event to session {}: {err}",
                    recipient.session
                );
            }
        }

        Ok(publication_id)
    }

    async fn do_register<S>(
        &mut self,
        context: &RouterContext<S>,
        message: crate::message::message::RegisterMessage,
    ) -> Result<Id> {
        if message.options.get("match").is_some() {
            return Err(InteractionError::OptionNotAllowed(
                "registrations only support exact-match procedures".to_owned(),
            )
            .into());
        }

        let realm_context = self.realm_context(context).await?;
        context
            .router()
            .rpc_policies
            .validate_registration(&realm_context, self.id, &message.procedure)
            .await?;

        let registration_id = realm_context
            .realm()
            .id_allocators
            .registration
            .generate_id()
            .await;
        let mut dealer = realm_context.realm().dealer.lock().await;
        let registration_id = dealer.register(self.id, message.procedure, registration_id)?;
        Ok(registration_id)
    }

    async fn do_unregister<S>(
        &mut self,
        context: &RouterContext<S>,
        message: crate::message::message::UnregisterMessage,
    ) -> Result<()> {
        let realm_context = self.realm_context(context).await?;
        let mut dealer = realm_context.realm().dealer.lock().await;
        dealer.unregister(self.id, message.registered_registration)?;
        Ok(())
    }

    async fn do_call<S>(
        &mut self,
        context: &RouterContext<S>,
        message: crate::message::message::CallMessage,
    ) -> Result<()> {
        let realm_context = self.realm_context(context).await?;
        let disclose_me = message
            .options
            .get("disclose_me")
            .and_then(|value| value.bool());
        let disclosed = realm_context
            .realm()
            .config
            .disclosure
            .call
            .effective_disclosure(disclose_me)?;
        let identity = self.established_session_state()?.identity.clone();
        let timeout = message
            .options
            .get("timeout")
            .and_then(|value| value.integer())
            .map(std::time::Duration::from_millis);

        let registration = {
            let dealer = realm_context.realm().dealer.lock().await;
            dealer
                .registration_for(&message.procedure)
                .cloned()
                .ok_or(InteractionError::NoSuchProcedure)?
        };

        let invocation_id = realm_context.realm().id_allocators.invocation.generate_id().await;
        {
            let mut dealer = realm_context.realm().dealer.lock().await;
            dealer.invoke(self.id, message.request, &registration, invocation_id, timeout);
        }
        realm_context.realm().deadline_notify.notify_one();

        let mut details = Dictionary::default();
        if disclosed {
            details.insert("caller".to_owned(), self.id.wamp_serialize()?);
            details.insert("caller_authid".to_owned(), Value::String(identity.id.clone()));
            details.insert("caller_authrole".to_owned(), Value::String(identity.role.clone()));
        }

        let invocation = Message::Invocation(InvocationMessage {
            request: invocation_id,
            registered_registration: registration.id,
            details,
            call_arguments: message.arguments,
            call_arguments_keyword: message.arguments_keyword,
        });
        if let Err(err) = realm_context.send_to_session(registration.callee, invocation).await {
            // The callee departed between registration lookup and delivery. The job was never
            // seen by anyone, so abandon it rather than leaving it to leak or double-complete via
            // the deadline sweep.
            let mut dealer = realm_context.realm().dealer.lock().await;
            dealer.abandon_invocation(invocation_id);
            return Err(err);
        }
        Ok(())
    }

    async fn do_cancel<S>(
        &mut self,
        context: &RouterContext<S>,
        message: crate::message::message::CancelMessage,
    ) -> Result<()> {
        let realm_context = self.realm_context(context).await?;
        // An absent `mode` option cancels as `killNoWait`, matching the WAMP basic profile's
        // default of not waiting around for a callee's response.
        let requested_mode = match message.options.get("mode").and_then(|value| value.string()) {
            Some(raw) => CallCancelMode::try_from(raw)?,
            None => CallCancelMode::KillNoWait,
        };

        let outcome = {
            let dealer = realm_context.realm().dealer.lock().await;
            let callee = match dealer.callee_for_caller_request(self.id, message.call_request) {
                Some(callee) => callee,
                None => return Ok(()),
            };
            drop(dealer);
            let callee_supports_cancellation = realm_context
                .realm()
                .sessions
                .lock()
                .await
                .get(&callee)
                .map(|handle| handle.callee_cancelling())
                .unwrap_or(false);
            let mut dealer = realm_context.realm().dealer.lock().await;
            dealer.cancel(
                self.id,
                message.call_request,
                requested_mode,
                callee_supports_cancellation,
            )
        };

        let outcome = match outcome {
            Some(outcome) => outcome,
            None => return Ok(()),
        };

        if outcome.send_interrupt {
            let interrupt = Message::Interrupt(InterruptMessage {
                invocation_request: outcome.invocation_id,
                options: Dictionary::from_iter([(
                    "mode".to_owned(),
                    Value::String(outcome.mode.to_string()),
                )]),
            });
            if let Err(err) = realm_context.send_to_session(outcome.callee, interrupt).await {
                warn!(
                    "Failed to deliver interrupt to callee {}: {err}",
                    outcome.callee
                );
            }
        }

        if outcome.complete_caller_now {
            self.send_message(Message::Error(ErrorMessage {
                request_type: 48,
                request: message.call_request,
                error: Uri::from_known("wamp.error.canceled"),
                ..Default::default()
            }))?;
        }

        Ok(())
    }

    async fn do_yield<S>(
        &mut self,
        context: &RouterContext<S>,
        message: crate::message::message::YieldMessage,
    ) -> Result<()> {
        let realm_context = self.realm_context(context).await?;
        let completion = {
            let mut dealer = realm_context.realm().dealer.lock().await;
            dealer.complete_invocation(self.id, message.invocation_request)
        };
        let (caller, caller_request) = match completion {
            Some(crate::router::dealer::InvocationCompletion::Deliver {
                caller,
                caller_request,
            }) => (caller, caller_request),
            Some(crate::router::dealer::InvocationCompletion::Discarded) | None => return Ok(()),
        };
        let result = Message::Result(ResultMessage {
            call_request: caller_request,
            details: Dictionary::default(),
            yield_arguments: message.arguments,
            yield_arguments_keyword: message.arguments_keyword,
        });
        realm_context.send_to_session(caller, result).await
    }

    async fn do_invocation_error<S>(
        &mut self,
        context: &RouterContext<S>,
        message: crate::message::message::ErrorMessage,
    ) -> Result<()> {
        let realm_context = self.realm_context(context).await?;
        let completion = {
            let mut dealer = realm_context.realm().dealer.lock().await;
            dealer.complete_invocation(self.id, message.request)
        };
        let (caller, caller_request) = match completion {
            Some(crate::router::dealer::InvocationCompletion::Deliver {
                caller,
                caller_request,
            }) => (caller, caller_request),
            Some(crate::router::dealer::InvocationCompletion::Discarded) | None => return Ok(()),
        };
        let error = Message::Error(ErrorMessage {
            request_type: 48,
            request: caller_request,
            details: message.details,
            error: message.error,
            arguments: message.arguments,
            arguments_keyword: message.arguments_keyword,
        });
        realm_context.send_to_session(caller, error).await
    }

    async fn handle_closing<S>(&mut self, _: &RouterContext<S>, message: Message) -> Result<()> {
        match message {
            Message::Goodbye(_) => self.transition_state(SessionState::Closed),
            _ => Ok(()),
        }
    }

    fn transition_state(&mut self, state: SessionState) -> Result<()> {
        if state.same_kind(&self.state)
            && matches!(state, SessionState::Closed | SessionState::Closing)
        {
            return Ok(());
        }

        if !self.state.allowed_state_transition(&state) {
            return Err(BasicError::Internal(format!(
                "invalid state transition from {:?} to {state:?}",
                self.state
            ))
            .into());
        }

        trace!(
            "Router session {} transitioned from {:?} to {state:?}",
            self.id,
            self.state
        );
        self.state = state;

        match self.state {
            SessionState::Closed => {
                self.closed_session_tx.send(())?;
            }
            _ => (),
        }

        Ok(())
    }

    pub async fn destroy<S>(self, context: &RouterContext<S>) {
        if let Ok(state) = self.established_session_state() {
            let realm_uri = state.realm.clone();
            if let Ok(realm_context) = context.realm_context(&realm_uri) {
                realm_context.realm().sessions.lock().await.remove(&self.id);
                let removed = realm_context.realm().remove_session(self.id).await;
                for (caller, caller_request) in removed.notify_caller {
                    let error = Message::Error(ErrorMessage {
                        request_type: 48,
                        request: caller_request,
                        error: Uri::from_known("wamp.error.canceled"),
                        ..Default::default()
                    });
                    if let Err(err) = realm_context.send_to_session(caller, error).await {
                        warn!("Failed to notify caller {caller} of canceled call: {err}");
                    }
                }
                for (callee, invocation_id) in removed.notify_callee {
                    let supports_interrupt = realm_context
                        .realm()
                        .sessions
                        .lock()
                        .await
                        .get(&callee)
                        .map(|handle| handle.callee_cancelling())
                        .unwrap_or(false);
                    if !supports_interrupt {
                        continue;
                    }
                    let interrupt = Message::Interrupt(InterruptMessage {
                        invocation_request: invocation_id,
                        options: Dictionary::from_iter([(
                            "mode".to_owned(),
                            Value::String(CallCancelMode::KillNoWait.to_string()),
                        )]),
                    });
                    if let Err(err) = realm_context.send_to_session(callee, interrupt).await {
                        warn!("Failed to interrupt callee {callee} of departed caller: {err}");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod session_test {
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;
    use crate::{
        core::id::Id,
        message::message::HelloMessage,
        router::{
            EmptyPubSubPolicies,
            EmptyRpcPolicies,
            RealmConfig,
        },
    };

    fn router_context() -> RouterContext<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>>
    {
        let mut config = crate::router::RouterConfig::default();
        let mut realm_config = RealmConfig::default();
        realm_config.name = "test".to_owned();
        realm_config.uri = Uri::try_from("com.test.realm").unwrap();
        config.realms.push(realm_config);
        let router = crate::router::new_web_socket_router(
            config,
            Box::new(EmptyPubSubPolicies::default()),
            Box::new(EmptyRpcPolicies::default()),
        )
        .unwrap();
        RouterContext::new(router)
    }

    #[tokio::test]
    async fn protocol_violation_on_established_session_aborts_and_closes() {
        let context = router_context();

        let (message_tx, _message_rx) = unbounded_channel();
        let (service_message_tx, mut service_message_rx) = unbounded_channel();
        let mut session = Session::new(Id::try_from(1).unwrap(), message_tx, service_message_tx);
        session.state = SessionState::Established(EstablishedSessionState {
            realm: Uri::try_from("com.test.realm").unwrap(),
            identity: Identity::default(),
        });
        // Keep a subscriber alive so the eventual `Closed` transition's broadcast send succeeds.
        let _session_handle = session.session_handle(false);

        // A second HELLO on an already-established session is a protocol violation: the session
        // must abort and close rather than silently ignoring or re-processing it.
        let result = session
            .handle_message(
                &context,
                Message::Hello(HelloMessage {
                    realm: Uri::try_from("com.test.realm").unwrap(),
                    details: Dictionary::default(),
                }),
            )
            .await;

        assert!(result.is_err());
        assert!(session.closed());
        let sent = service_message_rx.try_recv().unwrap();
        assert!(matches!(sent, Message::Abort(_)));
    }
}
