//! Authorized host operations.
//!
//! [`FileOperations`] and [`ProcessOperations`] are the only places where the
//! gateway touches the host. Every file operation resolves its path through a
//! [`PathAuthority`](crate::policy::PathAuthority) and every shell invocation
//! passes a [`CommandAuthority`](crate::policy::CommandAuthority) check before
//! anything happens. The one exception is [`ProcessOperations::launch`], which
//! starts an executable without any allow-list check.

mod files;
mod process;

pub use files::FileOperations;
pub use process::{ProcessOperations, ShellConfig};
