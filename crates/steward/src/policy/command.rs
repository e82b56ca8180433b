//! Shell command authorization.

use std::collections::BTreeSet;

use super::PolicyDecision;
use crate::error::GatewayError;

/// Decides whether a shell command line may run.
///
/// Only the leading whitespace-separated token is compared, by exact match,
/// against the allow-listed command set. Arguments are not inspected.
#[derive(Clone, Debug, Default)]
pub struct CommandAuthority {
    allowed: BTreeSet<String>,
}

impl CommandAuthority {
    /// Build an authority over the given command tokens.
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: commands.into_iter().map(Into::into).collect(),
        }
    }

    /// The allow-listed command tokens, sorted.
    pub fn allowed(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }

    /// Check a command line against the allow-list.
    pub fn check(&self, command_line: &str) -> PolicyDecision {
        match command_line.split_whitespace().next() {
            Some(program) if self.allowed.contains(program) => PolicyDecision::Allow,
            Some(program) => PolicyDecision::Deny(format!("'{program}' is not an allowed command")),
            None => PolicyDecision::Deny("empty command".to_string()),
        }
    }

    /// Returns true iff the leading token of `command_line` is allow-listed.
    pub fn authorize(&self, command_line: &str) -> bool {
        self.ensure(command_line).is_ok()
    }

    /// Like [`CommandAuthority::authorize`], but reports a denial as an error.
    pub fn ensure(&self, command_line: &str) -> Result<(), GatewayError> {
        match self.check(command_line) {
            PolicyDecision::Allow => Ok(()),
            PolicyDecision::Deny(reason) => {
                tracing::warn!(command = %command_line, reason = %reason, "command blocked");
                Err(GatewayError::CommandDenied {
                    command: command_line.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn authority() -> CommandAuthority {
        CommandAuthority::new(["ls", "echo", "whoami"])
    }

    #[test]
    fn test_allowed_leading_token() {
        let authority = authority();
        assert!(authority.authorize("ls"));
        assert!(authority.authorize("echo hello world"));
        assert!(authority.authorize("  whoami  "));
    }

    #[test]
    fn test_disallowed_leading_token() {
        let authority = authority();
        assert!(!authority.authorize("rm -rf /"));
        assert!(!authority.authorize("cat /etc/passwd"));
    }

    #[test]
    fn test_later_allowed_tokens_do_not_help() {
        let authority = authority();
        assert!(!authority.authorize("rm ls echo"));
        assert!(!authority.authorize("sudo echo hi"));
    }

    #[test]
    fn test_exact_match_only() {
        let authority = authority();
        assert!(!authority.authorize("lsblk"));
        assert!(!authority.authorize("LS"));
        assert!(!authority.authorize("/bin/ls"));
    }

    #[test]
    fn test_empty_command_is_denied() {
        let authority = authority();
        assert!(!authority.authorize(""));
        assert!(!authority.authorize("   "));
        assert_eq!(authority.check("").denial_reason(), Some("empty command"));
    }

    #[test]
    fn test_arguments_are_not_inspected() {
        // Only the program is gated; chained commands ride along.
        let authority = authority();
        assert!(authority.authorize("echo hi; rm -rf /tmp/x"));
    }

    #[test]
    fn test_ensure_reports_command_denied() {
        let err = authority().ensure("curl evil").unwrap_err();
        assert!(matches!(err, GatewayError::CommandDenied { .. }));
    }
}
