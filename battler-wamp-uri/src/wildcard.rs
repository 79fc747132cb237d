use crate::uri::{
    validate_uri_tokens,
    InvalidUri,
};

/// How a subscription or registration URI should be matched against published/called URIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchPolicy {
    /// Must equal the published/called URI character-for-character.
    Exact,
    /// The pattern's tokens must be a prefix of the topic's tokens.
    Prefix,
    /// Same token count as the topic; each empty token in the pattern matches any token.
    Wildcard,
}

impl TryFrom<&str> for MatchPolicy {
    type Error = anyhow::Error;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "exact" => Ok(Self::Exact),
            "prefix" => Ok(Self::Prefix),
            "wildcard" => Ok(Self::Wildcard),
            _ => Err(Self::Error::msg(format!("invalid match policy: {value}"))),
        }
    }
}

impl Into<&'static str> for MatchPolicy {
    fn into(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Prefix => "prefix",
            Self::Wildcard => "wildcard",
        }
    }
}

impl Into<String> for MatchPolicy {
    fn into(self) -> String {
        Into::<&'static str>::into(self).to_owned()
    }
}

impl ToString for MatchPolicy {
    fn to_string(&self) -> String {
        (*self).into()
    }
}

/// A URI pattern: a dot-separated sequence of tokens that may contain empty (wildcard) tokens,
/// used together with a [`MatchPolicy`] to describe `prefix` and `wildcard` subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WildcardUri {
    raw: String,
    tokens: Vec<String>,
}

impl WildcardUri {
    /// Parses and validates a pattern URI for the given match policy.
    ///
    /// `exact` patterns never allow empty tokens; `prefix` and `wildcard` patterns do.
    pub fn new<S>(raw: S, policy: MatchPolicy) -> Result<Self, InvalidUri>
    where
        S: Into<String>,
    {
        let raw = raw.into();
        let tokens = raw.split('.').map(str::to_owned).collect::<Vec<_>>();
        validate_uri_tokens(&tokens, policy != MatchPolicy::Exact)?;
        Ok(Self { raw, tokens })
    }

    /// The original pattern string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The pattern's tokens, in order. An empty string denotes a wildcard token.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

#[cfg(test)]
mod wildcard_test {
    use super::{
        MatchPolicy,
        WildcardUri,
    };

    #[test]
    fn rejects_empty_tokens_for_exact_policy() {
        assert_matches::assert_matches!(WildcardUri::new("a..c", MatchPolicy::Exact), Err(_));
        assert_matches::assert_matches!(WildcardUri::new("a.b.c", MatchPolicy::Exact), Ok(_));
    }

    #[test]
    fn allows_empty_tokens_for_prefix_and_wildcard_policies() {
        assert_matches::assert_matches!(WildcardUri::new("a..c", MatchPolicy::Prefix), Ok(_));
        assert_matches::assert_matches!(WildcardUri::new("a..c", MatchPolicy::Wildcard), Ok(_));
    }
}
