use std::{
    fmt::Display,
    sync::LazyLock,
};

use regex::Regex;
use serde::{
    de::{
        Unexpected,
        Visitor,
    },
    Deserialize,
    Serialize,
};
use thiserror::Error;

/// A URI failed validation.
#[derive(Debug, Error)]
#[error("invalid URI")]
pub struct InvalidUri;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-z_]+$").unwrap());

/// Validates a sequence of URI tokens.
///
/// `allow_empty_tokens` permits empty tokens, which stand for a wildcard (`prefix`/`wildcard`
/// match policies). An exact-match URI never allows empty tokens. At least one token is always
/// required; an empty string still tokenizes to a single empty token, which is itself a valid
/// (wholly wildcard) pattern when `allow_empty_tokens` is set.
pub fn validate_uri_tokens<S>(tokens: &[S], allow_empty_tokens: bool) -> Result<(), InvalidUri>
where
    S: AsRef<str>,
{
    if tokens.is_empty() {
        return Err(InvalidUri);
    }
    for token in tokens {
        let token = token.as_ref();
        if token.is_empty() {
            if !allow_empty_tokens {
                return Err(InvalidUri);
            }
        } else if !TOKEN_RE.is_match(token) {
            return Err(InvalidUri);
        }
    }
    Ok(())
}

/// Validates a strict (exact-match) URI: dot-separated, lowercase alphanumeric-and-underscore
/// tokens, none of them empty.
pub fn validate_strict_uri<S>(uri: S) -> Result<(), InvalidUri>
where
    S: AsRef<str>,
{
    let tokens = uri.as_ref().split('.').collect::<Vec<_>>();
    validate_uri_tokens(&tokens, false)
}

/// A validated, exact-match WAMP URI.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Uri(String);

impl Uri {
    /// Constructs a URI known in advance to be valid, skipping validation.
    ///
    /// Intended for URIs defined by this library itself (error reasons, close reasons), never for
    /// peer-supplied input.
    pub fn from_known<S>(value: S) -> Self
    where
        S: Into<String>,
    {
        Self(value.into())
    }

    /// The dot-separated tokens making up this URI.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl Display for Uri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for Uri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Uri {
    type Error = InvalidUri;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_strict_uri(&value)?;
        Ok(Self(value))
    }
}

impl TryFrom<&str> for Uri {
    type Error = InvalidUri;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate_strict_uri(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl Into<String> for Uri {
    fn into(self) -> String {
        self.0
    }
}

struct UriVisitor;

impl<'de> Visitor<'de> for UriVisitor {
    type Value = Uri;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "a URI")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Uri::try_from(v.to_owned()).map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
    }
}

impl<'de> Deserialize<'de> for Uri {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(UriVisitor)
    }
}

#[cfg(test)]
mod uri_test {
    use crate::uri::{
        validate_strict_uri,
        Uri,
    };

    #[test]
    fn validates_strict_uris() {
        assert_matches::assert_matches!(validate_strict_uri("com"), Ok(()));
        assert_matches::assert_matches!(validate_strict_uri("com123"), Ok(()));
        assert_matches::assert_matches!(validate_strict_uri("com.battler.topic"), Ok(()));
        assert_matches::assert_matches!(validate_strict_uri("com.battler.TOPIC"), Err(_));
        assert_matches::assert_matches!(validate_strict_uri("com.battler.topic_123-@!!"), Err(_));
        assert_matches::assert_matches!(validate_strict_uri("com.1"), Ok(()));
        assert_matches::assert_matches!(validate_strict_uri("."), Err(_));
        assert_matches::assert_matches!(validate_strict_uri(".."), Err(_));
        assert_matches::assert_matches!(validate_strict_uri(".com.battler.topic1"), Err(_));
        assert_matches::assert_matches!(validate_strict_uri("com.battler#"), Err(_));
    }

    #[test]
    fn fails_deserialization_invalid_uri() {
        assert_matches::assert_matches!(serde_json::from_str::<Uri>(r#""com.battler.TOPIC""#), Err(err) => {
            assert!(err.to_string().contains("expected a URI"));
        });
    }

    #[test]
    fn tokenizes_uri() {
        let uri = Uri::try_from("com.battler.topic").unwrap();
        assert_eq!(uri.tokens().collect::<Vec<_>>(), vec!["com", "battler", "topic"]);
    }
}
