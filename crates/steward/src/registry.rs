//! Handlers and the registry that names them.
//!
//! A [`Handler`] is anything that can execute a [`Task`]. Handlers are
//! registered by name into a [`HandlerRegistry`] at startup; the registry is
//! then handed to the [`Dispatcher`](crate::Dispatcher), which only reads it.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::envelope::{Envelope, Task};

/// Identity of a handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerInfo {
    /// Generated unique id. Informational only; lookup is by name.
    pub id: String,
    /// Unique name used for routing.
    pub name: String,
    /// Human-readable description.
    pub description: String,
}

impl HandlerInfo {
    /// Create handler info with a freshly generated id.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A named unit that executes tasks.
///
/// Returning `Err` (or panicking) is allowed: the dispatcher converts either
/// into an error envelope carrying the message.
///
/// # Example
///
/// ```rust
/// use steward::{Envelope, Handler, HandlerInfo, Task};
///
/// struct Echo {
///     info: HandlerInfo,
/// }
///
/// #[async_trait::async_trait]
/// impl Handler for Echo {
///     fn info(&self) -> &HandlerInfo {
///         &self.info
///     }
///
///     async fn execute(&self, task: Task) -> anyhow::Result<Envelope> {
///         Ok(Envelope::success(task.str_field("text").unwrap_or_default()))
///     }
/// }
/// ```
#[async_trait]
pub trait Handler: Send + Sync {
    /// Name, description and id.
    fn info(&self) -> &HandlerInfo;

    /// Execute a task.
    async fn execute(&self, task: Task) -> anyhow::Result<Envelope>;

    /// Routing name, shorthand for `info().name`.
    fn name(&self) -> &str {
        &self.info().name
    }
}

/// A handler backed by an async closure.
///
/// ```rust,ignore
/// let upper = FnHandler::new("Upper", "Uppercases text", |task: Task| async move {
///     let text = task.str_field("text").unwrap_or_default().to_uppercase();
///     Ok::<_, anyhow::Error>(Envelope::success(text))
/// });
/// ```
pub struct FnHandler<F> {
    info: HandlerInfo,
    f: F,
}

impl<F> FnHandler<F> {
    /// Wrap a closure as a handler.
    pub fn new(name: impl Into<String>, description: impl Into<String>, f: F) -> Self {
        Self {
            info: HandlerInfo::new(name, description),
            f,
        }
    }
}

impl<F> std::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Task) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Envelope>> + Send,
{
    fn info(&self) -> &HandlerInfo {
        &self.info
    }

    async fn execute(&self, task: Task) -> anyhow::Result<Envelope> {
        (self.f)(task).await
    }
}

/// Name-keyed collection of handlers, in registration order.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn Handler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its name.
    ///
    /// A handler already registered under the same name is replaced in
    /// place and returned.
    pub fn register(&mut self, handler: Arc<dyn Handler>) -> Option<Arc<dyn Handler>> {
        tracing::info!(handler = %handler.name(), "registered handler");
        match self.handlers.iter_mut().find(|h| h.name() == handler.name()) {
            Some(slot) => Some(std::mem::replace(slot, handler)),
            None => {
                self.handlers.push(handler);
                None
            }
        }
    }

    /// Builder-style [`HandlerRegistry::register`].
    pub fn with(mut self, handler: Arc<dyn Handler>) -> Self {
        self.register(handler);
        self
    }

    /// Find a handler by name.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.iter().find(|h| h.name() == name).cloned()
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.name().to_string()).collect()
    }

    /// Info for every registered handler, in registration order.
    pub fn summaries(&self) -> Vec<HandlerInfo> {
        self.handlers.iter().map(|h| h.info().clone()).collect()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
