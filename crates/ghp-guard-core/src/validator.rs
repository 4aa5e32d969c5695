//! Blocklist validation for controller→server messages.
//!
//! The GHP endpoint is known to crash on a handful of malformed messages.
//! [`Validator::validate`] checks a chunk of controller text against an
//! ordered list of rules; the first matching rule decides. This is not a
//! parser: new crash signatures are added as new rules in [`Validator::validate`],
//! in order.
//!
//! # Rule order
//!
//! | # | Condition                                      | Reason                     |
//! |---|------------------------------------------------|----------------------------|
//! | 1 | empty or ASCII whitespace only                 | [`RejectReason::Empty`]          |
//! | 2 | more than `max_tokens` comma-separated tokens  | [`RejectReason::TooManyTokens`]  |
//! | 3 | command `PING` with `<UnitCheckin` in payload  | [`RejectReason::PingUnitCheckin`]|
//! | 4 | payload has `<` but no `/>`                    | [`RejectReason::MissingClose`]   |
//! | 5 | payload has `<`, `/>` and `=<`                 | [`RejectReason::UnquotedAttribute`] |

use std::fmt;

/// Maximum number of comma-separated tokens the GHP endpoint accepts.
pub const DEFAULT_MAX_TOKENS: usize = 5;

/// Why a message was blocked. `Display` yields the exact text used in the
/// event log and in the reply sent to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Empty,
    TooManyTokens,
    PingUnitCheckin,
    MissingClose,
    UnquotedAttribute,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Empty => "Empty message.",
            RejectReason::TooManyTokens => "Too many tokens.",
            RejectReason::PingUnitCheckin => {
                "PING message contains unexpected UnitCheckin payload."
            }
            RejectReason::MissingClose => "Missing closing '/>' in payload.",
            RejectReason::UnquotedAttribute => "Attribute missing quotes.",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of validating one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accept,
    Reject(RejectReason),
}

impl ValidationOutcome {
    pub fn is_accept(&self) -> bool {
        matches!(self, ValidationOutcome::Accept)
    }
}

/// Stateless rule checker. Cheap to copy; one instance can be shared by all
/// sessions.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    max_tokens: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl Validator {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Check decoded controller text against the rules, in order.
    pub fn validate(&self, raw: &str) -> ValidationOutcome {
        if is_blank(raw) {
            return ValidationOutcome::Reject(RejectReason::Empty);
        }

        let trimmed = raw.trim_matches(|c| c == '\u{02}' || c == '\u{03}');
        let tokens: Vec<&str> = trimmed.split(',').collect();

        if tokens.len() > self.max_tokens {
            return ValidationOutcome::Reject(RejectReason::TooManyTokens);
        }

        // split always yields at least one token
        let command = tokens[0];
        let payload = tokens[tokens.len() - 1];

        if command == "PING" && payload.contains("<UnitCheckin") {
            return ValidationOutcome::Reject(RejectReason::PingUnitCheckin);
        }

        if payload.contains('<') {
            if !payload.contains("/>") {
                return ValidationOutcome::Reject(RejectReason::MissingClose);
            }
            if payload.contains("=<") {
                return ValidationOutcome::Reject(RejectReason::UnquotedAttribute);
            }
        }

        ValidationOutcome::Accept
    }
}

/// Empty, or only ASCII whitespace (tab, LF, VT, FF, CR, space). Non-ASCII
/// characters never count as whitespace.
fn is_blank(raw: &str) -> bool {
    raw.chars().all(|c| c.is_ascii_whitespace() || c == '\u{0B}')
}

/// Validate with the default token limit.
pub fn validate(raw: &str) -> ValidationOutcome {
    Validator::default().validate(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reject(reason: RejectReason) -> ValidationOutcome {
        ValidationOutcome::Reject(reason)
    }

    #[test]
    fn empty_and_whitespace_rejected() {
        assert_eq!(validate(""), reject(RejectReason::Empty));
        assert_eq!(validate("   "), reject(RejectReason::Empty));
        assert_eq!(validate("\r\n\t"), reject(RejectReason::Empty));
    }

    #[test]
    fn vertical_tab_and_form_feed_are_whitespace() {
        assert_eq!(validate("\u{0B}\u{0C} "), reject(RejectReason::Empty));
    }

    #[test]
    fn unicode_spaces_are_not_empty() {
        assert_eq!(validate("\u{A0}"), ValidationOutcome::Accept);
        assert_eq!(validate("\u{85}"), ValidationOutcome::Accept);
        assert_eq!(validate("\u{3000}"), ValidationOutcome::Accept);
    }

    #[test]
    fn decoded_non_breaking_space_accepted() {
        let text = crate::wire::decode_ascii(b"\xc2\xa0");
        assert_eq!(validate(&text), ValidationOutcome::Accept);
    }

    #[test]
    fn bare_delimiters_are_not_whitespace() {
        assert_eq!(validate("\u{02}\u{03}"), ValidationOutcome::Accept);
    }

    #[test]
    fn five_tokens_accepted() {
        assert_eq!(validate("\u{02}CMD,A,B,C,D\u{03}"), ValidationOutcome::Accept);
    }

    #[test]
    fn six_tokens_rejected() {
        assert_eq!(
            validate("\u{02}CMD,A,B,C,D,E\u{03}"),
            reject(RejectReason::TooManyTokens)
        );
    }

    #[test]
    fn ping_with_unit_checkin_rejected() {
        assert_eq!(
            validate("\u{02}PING,1,2,3,<UnitCheckin/>\u{03}"),
            reject(RejectReason::PingUnitCheckin)
        );
        // single token: command and payload are the same element
        assert_eq!(
            validate("PING<UnitCheckin/>"),
            ValidationOutcome::Accept,
            "command must equal PING exactly"
        );
    }

    #[test]
    fn ping_checked_before_tag_rules() {
        // would also fail the missing-close rule
        assert_eq!(
            validate("PING,<UnitCheckin"),
            reject(RejectReason::PingUnitCheckin)
        );
    }

    #[test]
    fn ping_with_too_many_tokens_still_rejected() {
        // token count is checked before the PING rule
        assert_eq!(
            validate("PING,1,2,3,4,5,<UnitCheckin/>"),
            reject(RejectReason::TooManyTokens)
        );
    }

    #[test]
    fn other_command_with_unit_checkin_accepted() {
        assert_eq!(validate("STATUS,<UnitCheckin/>"), ValidationOutcome::Accept);
    }

    #[test]
    fn tag_without_close_rejected() {
        assert_eq!(
            validate("\u{02}CMD,<X>\u{03}"),
            reject(RejectReason::MissingClose)
        );
    }

    #[test]
    fn self_closing_tag_accepted() {
        assert_eq!(validate("\u{02}CMD,<X/>\u{03}"), ValidationOutcome::Accept);
        assert_eq!(
            validate("\u{02}CMD,<X a=\"b\"/>\u{03}"),
            ValidationOutcome::Accept
        );
    }

    #[test]
    fn unquoted_attribute_rejected() {
        assert_eq!(
            validate("\u{02}CMD,<X a=<b/>\u{03}"),
            reject(RejectReason::UnquotedAttribute)
        );
    }

    #[test]
    fn only_payload_is_inspected_for_tags() {
        assert_eq!(validate("CMD,<X,plain"), ValidationOutcome::Accept);
    }

    #[test]
    fn custom_token_limit() {
        let validator = Validator::new(2);
        assert_eq!(validator.validate("A,B"), ValidationOutcome::Accept);
        assert_eq!(
            validator.validate("A,B,C"),
            reject(RejectReason::TooManyTokens)
        );
    }

    #[test]
    fn reason_text_matches_reply_wording() {
        assert_eq!(RejectReason::Empty.to_string(), "Empty message.");
        assert_eq!(RejectReason::TooManyTokens.to_string(), "Too many tokens.");
        assert_eq!(
            RejectReason::MissingClose.to_string(),
            "Missing closing '/>' in payload."
        );
        assert_eq!(
            RejectReason::UnquotedAttribute.to_string(),
            "Attribute missing quotes."
        );
    }
}
