//! Steward: a permission-gated local command gateway
//!
//! Steward accepts free-text commands and structured tasks, routes each one to
//! exactly one named handler, and for the built-in handler interprets the
//! command against a small grammar of filesystem, process and history
//! operations. Every filesystem path and every shell command is checked
//! against static allow-lists before anything touches the host.

pub mod config;
mod dispatcher;
mod envelope;
mod error;
pub mod explainer;
pub mod history;
pub mod interpreter;
mod limits;
pub mod ops;
pub mod policy;
mod registry;

pub use config::{Applications, ConfigError, ExplainerConfig, GatewayConfig};
pub use dispatcher::{BUILTIN_HANDLER, Dispatcher};
pub use envelope::{Envelope, Task};
pub use error::{ErrorKind, GatewayError};
pub use explainer::{EXPLAINER_NAME, ExplainerHandler, ExplanationBackend, GeminiBackend};
pub use history::{
    HistoryError, HistoryRecord, HistoryStore, MemoryHistoryStore, SqliteHistoryStore,
};
pub use interpreter::{Directive, Interpreter};
pub use limits::{ExecutionLimits, LimitedBuffer};
pub use registry::{FnHandler, Handler, HandlerInfo, HandlerRegistry};
