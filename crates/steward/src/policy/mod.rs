//! Allow-list enforcement for host operations.
//!
//! Two authorities gate everything the gateway does to the host:
//!
//! - [`PathAuthority`] decides whether a filesystem path lies inside one of
//!   the allow-listed roots. Paths are canonicalized before comparison, so
//!   `..` segments cannot climb out of a root.
//! - [`CommandAuthority`] decides whether a shell command may run, by exact
//!   match of its leading token against the allow-listed command set.
//!
//! Both are built once from configuration and never change afterwards. A
//! denial is logged and reported as a [`PolicyDecision::Deny`]; it never
//! escalates into a panic or an error crossing the dispatcher.
//!
//! ## Known gap
//!
//! [`CommandAuthority`] only looks at the program name. Arguments and shell
//! metacharacters (`;`, `|`, `&&`) are not inspected, so `echo hi; rm -rf x`
//! is authorized whenever `echo` is.

mod command;
mod path;

pub use command::CommandAuthority;
pub use path::{PathAuthority, resolve_path};

/// The result of a policy check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyDecision {
    /// The operation is allowed.
    Allow,
    /// The operation is denied with a reason.
    Deny(String),
}

impl PolicyDecision {
    /// Returns true if the operation is allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyDecision::Allow)
    }

    /// Returns the denial reason if denied, None if allowed.
    pub fn denial_reason(&self) -> Option<&str> {
        match self {
            PolicyDecision::Allow => None,
            PolicyDecision::Deny(reason) => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_accessors() {
        assert!(PolicyDecision::Allow.is_allowed());
        assert!(PolicyDecision::Allow.denial_reason().is_none());

        let deny = PolicyDecision::Deny("outside roots".to_string());
        assert!(!deny.is_allowed());
        assert_eq!(deny.denial_reason(), Some("outside roots"));
    }
}
