use anyhow::Error;
use battler_wamp_uri::InvalidUri;
use thiserror::Error;

use crate::{
    core::{
        id::Id,
        types::Value,
        uri::Uri,
    },
    message::message::Message,
};

/// A basic error that occurs while processing a WAMP message.
#[derive(Debug, Error)]
pub enum BasicError {
    /// A generic resource was not found.
    ///
    /// WAMP defines standard URIs for not finding specific resource types. This error should only
    /// be used when the standard URI cannot be used.
    #[error("{0}")]
    NotFound(String),
    /// An invalid argument was passed.
    #[error("{0}")]
    InvalidArgument(String),
    /// The operation is not allowed based on process configuration.
    #[error("{0}")]
    NotAllowed(String),
    /// The operation is not allowed based on user permissions.
    #[error("{0}")]
    PermissionDenied(String),
    /// Some internal error occurred.
    ///
    /// Should only be used when there is no other error variant that describes the error, since
    /// the message is very vague and not very useful for debugging.
    #[error("{0}")]
    Internal(String),
}

impl BasicError {
    /// The trailing URI component for the error.
    pub fn uri_component(&self) -> &str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotAllowed(_) => "not_allowed",
            Self::PermissionDenied(_) => "permission_denied",
            Self::Internal(_) => "internal",
        }
    }
}

/// An interaction error that occurs while processing a WAMP message.
///
/// Interaction errors are clearly defined in the WAMP standard and are reserved for errors that
/// peers must be able to parse easily.
#[derive(Debug, Error)]
pub enum InteractionError {
    /// The incoming message violates the WAMP protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// The procedure being called does not exist.
    #[error("no such procedure")]
    NoSuchProcedure,
    /// The procedure being registered already exists.
    #[error("procedure already exists")]
    ProcedureAlreadyExists,
    /// The registration being referenced does not exist.
    #[error("no such registration")]
    NoSuchRegistration,
    /// The subscription being referenced does not exist.
    #[error("no such subscription")]
    NoSuchSubscription,
    /// The realm being referenced does not exist.
    #[error("no such realm")]
    NoSuchRealm,
    /// The role being referenced does not exist.
    #[error("no such role")]
    NoSuchRole,
    /// A call was cancelled, by the caller or by a deadline.
    #[error("call was cancelled")]
    Canceled,
    /// A URI failed validation.
    #[error("invalid uri: {0}")]
    InvalidUri(String),
    /// A message option is not allowed in the current configuration.
    #[error("{0}")]
    OptionNotAllowed(String),
    /// The operation was denied by an authorization check.
    #[error("{0}")]
    AuthorizationDenied(String),
    /// A message payload exceeded the configured size limit.
    #[error("payload size exceeded")]
    PayloadSizeExceeded,
    /// `disclose_me` was set explicitly under a disclosure rule that forbids it.
    #[error("disclose_me is not allowed by the realm's disclosure rule")]
    DiscloseMeDisallowed,
    /// The realm requires authentication, but the peer attempted to join without it.
    #[error("authentication is required to join this realm")]
    AuthenticationRequired,
    /// No authentication method advertised by the peer is supported by the realm.
    #[error("no supported authentication method was offered")]
    NoSuchAuthMethod,
    /// No principal exists for the identity claimed during authentication.
    #[error("no such principal")]
    NoSuchPrincipal,
    /// Authentication was attempted but the credentials did not check out.
    #[error("{0}")]
    AuthenticationDenied(String),
    /// Authentication could not proceed due to missing or inconsistent state.
    #[error("{0}")]
    AuthenticationFailed(String),
}

impl InteractionError {
    /// The trailing URI component for the error.
    pub fn uri_component(&self) -> &str {
        match self {
            Self::ProtocolViolation(_) => "protocol_violation",
            Self::NoSuchProcedure => "no_such_procedure",
            Self::ProcedureAlreadyExists => "procedure_already_exists",
            Self::NoSuchRegistration => "no_such_registration",
            Self::NoSuchSubscription => "no_such_subscription",
            Self::NoSuchRealm => "no_such_realm",
            Self::NoSuchRole => "no_such_role",
            Self::Canceled => "canceled",
            Self::InvalidUri(_) => "invalid_uri",
            Self::OptionNotAllowed(_) => "option_not_allowed",
            Self::AuthorizationDenied(_) => "authorization_denied",
            Self::PayloadSizeExceeded => "payload_size_exceeded",
            Self::DiscloseMeDisallowed => "disclose_me_disallowed",
            Self::AuthenticationRequired => "authentication_required",
            Self::NoSuchAuthMethod => "no_such_auth_method",
            Self::NoSuchPrincipal => "no_such_principal",
            Self::AuthenticationDenied(_) => "authentication_denied",
            Self::AuthenticationFailed(_) => "authentication_failed",
        }
    }
}

/// The error URI for an error, for use as the `reason`/`error` field of an `ABORT` or `ERROR`
/// message.
pub fn error_uri(error: &Error) -> Uri {
    if error.is::<InvalidUri>() {
        Uri::from_known("wamp.error.invalid_uri")
    } else if let Some(error) = error.downcast_ref::<BasicError>() {
        Uri::from_known(format!("wamp.error.{}", error.uri_component()))
    } else if let Some(error) = error.downcast_ref::<InteractionError>() {
        Uri::from_known(format!("wamp.error.{}", error.uri_component()))
    } else {
        Uri::from_known("wamp.error.unknown_error")
    }
}

/// Creates an [`struct@Error`] from a URI error reason and message.
pub fn error_from_uri_reason_and_message(reason: Uri, message: String) -> Error {
    match reason.as_ref() {
        "wamp.error.not_found" => BasicError::NotFound(message).into(),
        "wamp.error.invalid_argument" => BasicError::InvalidArgument(message).into(),
        "wamp.error.not_allowed" => BasicError::NotAllowed(message).into(),
        "wamp.error.permission_denied" => BasicError::PermissionDenied(message).into(),
        "wamp.error.protocol_violation" => InteractionError::ProtocolViolation(message).into(),
        "wamp.error.no_such_procedure" => InteractionError::NoSuchProcedure.into(),
        "wamp.error.procedure_already_exists" => InteractionError::ProcedureAlreadyExists.into(),
        "wamp.error.no_such_registration" => InteractionError::NoSuchRegistration.into(),
        "wamp.error.no_such_subscription" => InteractionError::NoSuchSubscription.into(),
        "wamp.error.no_such_realm" => InteractionError::NoSuchRealm.into(),
        "wamp.error.no_such_role" => InteractionError::NoSuchRole.into(),
        "wamp.error.canceled" => InteractionError::Canceled.into(),
        "wamp.error.invalid_uri" => InteractionError::InvalidUri(message).into(),
        "wamp.error.option_not_allowed" => InteractionError::OptionNotAllowed(message).into(),
        "wamp.error.authorization_denied" => InteractionError::AuthorizationDenied(message).into(),
        "wamp.error.payload_size_exceeded" => InteractionError::PayloadSizeExceeded.into(),
        "wamp.error.disclose_me_disallowed" => InteractionError::DiscloseMeDisallowed.into(),
        "wamp.error.authentication_required" => InteractionError::AuthenticationRequired.into(),
        "wamp.error.no_such_auth_method" => InteractionError::NoSuchAuthMethod.into(),
        "wamp.error.no_such_principal" => InteractionError::NoSuchPrincipal.into(),
        "wamp.error.authentication_denied" => InteractionError::AuthenticationDenied(message).into(),
        "wamp.error.authentication_failed" => InteractionError::AuthenticationFailed(message).into(),
        _ => BasicError::Internal(message).into(),
    }
}

/// Extracts a URI error reason and message from a WAMP message.
pub fn extract_error_uri_reason_and_message(message: &Message) -> Result<(&Uri, &str), Error> {
    let reason = match message.reason() {
        Some(reason) => reason,
        None => return Err(Error::msg("message does not contain a reason uri")),
    };
    let message = match message
        .details()
        .map(|details| details.get("message"))
        .flatten()
    {
        Some(Value::String(message)) => message.as_str(),
        _ => "unknown error",
    };
    Ok((reason, message))
}

/// Constructs an [`struct@Error`] from a WAMP message.
///
/// Fails if the message does not describe any error.
pub fn error_from_message(message: &Message) -> Result<Error, Error> {
    let (uri, message) = extract_error_uri_reason_and_message(message)?;
    Ok(error_from_uri_reason_and_message(
        uri.clone(),
        message.to_owned(),
    ))
}

/// An error that can be transmitted over channels.
#[derive(Debug, Clone)]
pub struct ChannelTransmittableError {
    pub reason: Uri,
    pub message: String,
    pub request_id: Option<Id>,
}

impl ChannelTransmittableError {
    /// Converts the error into a real Error object that can be returned out.
    pub fn into_error(self) -> anyhow::Error {
        error_from_uri_reason_and_message(self.reason, self.message)
    }
}

impl TryFrom<&Message> for ChannelTransmittableError {
    type Error = anyhow::Error;
    fn try_from(value: &Message) -> std::result::Result<Self, Self::Error> {
        let (reason, message) = extract_error_uri_reason_and_message(&value)?;
        Ok(Self {
            reason: reason.to_owned(),
            message: message.to_owned(),
            request_id: value.request_id(),
        })
    }
}

impl From<&anyhow::Error> for ChannelTransmittableError {
    fn from(value: &anyhow::Error) -> Self {
        Self {
            reason: error_uri(value),
            message: value.to_string(),
            request_id: None,
        }
    }
}

impl From<anyhow::Error> for ChannelTransmittableError {
    fn from(value: anyhow::Error) -> Self {
        Self::from(&value)
    }
}

/// Type alias for a channel-transmittable result.
///
/// Assumes `T` is channel-transmittable.
pub type ChannelTransmittableResult<T> = Result<T, ChannelTransmittableError>;
