//! Disclosure rule engine.
//!
//! Controls whether a publisher's or caller's identity is revealed to subscribers/callees on
//! `EVENT`/`INVOCATION` messages.

use crate::core::error::InteractionError;

/// A rule governing whether an originator's identity is disclosed to the recipient of an
/// operation (`PUBLISH` to subscribers, `CALL` to a callee).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DisclosureRule {
    /// Defer to the realm's rule for this operation kind. Only meaningful as a per-session
    /// override; a realm-level rule of `Preset` behaves like [`Self::Originator`].
    #[default]
    Preset,
    /// Disclosure follows the `disclose_me` option on the message itself.
    Originator,
    /// Always disclose, regardless of `disclose_me`.
    Reveal,
    /// Never disclose, regardless of `disclose_me`.
    Conceal,
    /// Always disclose; an explicit `disclose_me` option is a protocol error.
    StrictReveal,
    /// Never disclose; an explicit `disclose_me` option is a protocol error.
    StrictConceal,
}

impl DisclosureRule {
    /// Resolves the effective rule given an optional per-session override.
    ///
    /// A [`Self::Preset`] override defers to the realm's rule; any other override wins outright.
    pub fn resolve(realm_rule: Self, session_override: Option<Self>) -> Self {
        match session_override {
            Some(Self::Preset) | None => realm_rule,
            Some(rule) => rule,
        }
    }

    /// Determines whether the originator's identity should be disclosed, given whether the
    /// message carried an explicit `disclose_me` option.
    ///
    /// Fails with [`InteractionError::DiscloseMeDisallowed`] if the rule is strict and
    /// `disclose_me` was set explicitly.
    pub fn effective_disclosure(&self, disclose_me: Option<bool>) -> Result<bool, InteractionError> {
        match self {
            Self::Preset => Ok(disclose_me.unwrap_or(false)),
            Self::Originator => Ok(disclose_me.unwrap_or(false)),
            Self::Reveal => Ok(true),
            Self::Conceal => Ok(false),
            Self::StrictReveal => {
                if disclose_me.is_some() {
                    Err(InteractionError::DiscloseMeDisallowed)
                } else {
                    Ok(true)
                }
            }
            Self::StrictConceal => {
                if disclose_me.is_some() {
                    Err(InteractionError::DiscloseMeDisallowed)
                } else {
                    Ok(false)
                }
            }
        }
    }
}

impl TryFrom<&str> for DisclosureRule {
    type Error = anyhow::Error;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "preset" => Ok(Self::Preset),
            "originator" => Ok(Self::Originator),
            "reveal" => Ok(Self::Reveal),
            "conceal" => Ok(Self::Conceal),
            "strict_reveal" => Ok(Self::StrictReveal),
            "strict_conceal" => Ok(Self::StrictConceal),
            _ => Err(Self::Error::msg(format!("invalid disclosure rule: {value}"))),
        }
    }
}

impl Into<&'static str> for DisclosureRule {
    fn into(self) -> &'static str {
        match self {
            Self::Preset => "preset",
            Self::Originator => "originator",
            Self::Reveal => "reveal",
            Self::Conceal => "conceal",
            Self::StrictReveal => "strict_reveal",
            Self::StrictConceal => "strict_conceal",
        }
    }
}

impl Into<String> for DisclosureRule {
    fn into(self) -> String {
        Into::<&'static str>::into(self).to_owned()
    }
}

impl ToString for DisclosureRule {
    fn to_string(&self) -> String {
        (*self).into()
    }
}

/// One [`DisclosureRule`] per operation kind a realm disambiguates disclosure for.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisclosureRules {
    /// Rule applied to `PUBLISH` (publisher identity on `EVENT`).
    pub publish: DisclosureRule,
    /// Rule applied to `CALL` (caller identity on `INVOCATION`).
    pub call: DisclosureRule,
}

#[cfg(test)]
mod disclosure_test {
    use assert_matches::assert_matches;

    use crate::{
        core::error::InteractionError,
        router::disclosure::DisclosureRule,
    };

    #[test]
    fn originator_passes_through_disclose_me() {
        assert_eq!(
            DisclosureRule::Originator.effective_disclosure(Some(true)).unwrap(),
            true
        );
        assert_eq!(
            DisclosureRule::Originator.effective_disclosure(None).unwrap(),
            false
        );
    }

    #[test]
    fn strict_rules_reject_explicit_disclose_me() {
        assert_matches!(
            DisclosureRule::StrictReveal.effective_disclosure(Some(true)),
            Err(InteractionError::DiscloseMeDisallowed)
        );
        assert_matches!(
            DisclosureRule::StrictConceal.effective_disclosure(Some(false)),
            Err(InteractionError::DiscloseMeDisallowed)
        );
        assert_eq!(
            DisclosureRule::StrictReveal.effective_disclosure(None).unwrap(),
            true
        );
    }

    #[test]
    fn session_override_of_preset_defers_to_realm() {
        assert_eq!(
            DisclosureRule::resolve(DisclosureRule::Reveal, Some(DisclosureRule::Preset)),
            DisclosureRule::Reveal
        );
        assert_eq!(
            DisclosureRule::resolve(DisclosureRule::Reveal, Some(DisclosureRule::Conceal)),
            DisclosureRule::Conceal
        );
        assert_eq!(
            DisclosureRule::resolve(DisclosureRule::Reveal, None),
            DisclosureRule::Reveal
        );
    }
}
