//! Task routing.
//!
//! The [`Dispatcher`] resolves every task to exactly one handler. The
//! built-in [`BUILTIN_HANDLER`] name always goes to the [`Interpreter`];
//! anything else is looked up in the [`HandlerRegistry`]. Handler failures,
//! whether returned or raised as a panic, are turned into
//! [`Envelope::Error`] here and nowhere else.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::config::GatewayConfig;
use crate::envelope::{Envelope, Task};
use crate::history::HistoryStore;
use crate::interpreter::Interpreter;
use crate::registry::HandlerRegistry;

/// Name of the built-in command interpreter.
pub const BUILTIN_HANDLER: &str = "MainAgent";

/// Routes tasks to the interpreter or a registered handler.
///
/// Cloning is cheap; clones share the same interpreter and registry.
#[derive(Clone)]
pub struct Dispatcher {
    interpreter: Arc<Interpreter>,
    registry: Arc<HandlerRegistry>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("interpreter", &self.interpreter)
            .field("handlers", &self.registry.names())
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher over a finished registry.
    pub fn new(interpreter: Interpreter, registry: HandlerRegistry) -> Self {
        if registry.lookup(BUILTIN_HANDLER).is_some() {
            tracing::warn!(
                handler = BUILTIN_HANDLER,
                "registered handler is shadowed by the built-in interpreter"
            );
        }
        Self {
            interpreter: Arc::new(interpreter),
            registry: Arc::new(registry),
        }
    }

    /// Build the interpreter from config and wrap it with `registry`.
    pub fn from_config(
        config: &GatewayConfig,
        history: Arc<dyn HistoryStore>,
        registry: HandlerRegistry,
    ) -> Self {
        Self::new(Interpreter::from_config(config, history), registry)
    }

    /// The registered handlers.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// The built-in interpreter.
    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Route a task and return its envelope. Never fails.
    pub async fn route(&self, task: Task) -> Envelope {
        let Some(target) = task.target().map(str::to_string) else {
            tracing::warn!("task has no target handler");
            return Envelope::error("No target_handler specified");
        };

        if target == BUILTIN_HANDLER {
            let command = task.str_field("command").unwrap_or_default();
            tracing::info!(handler = %target, command = %command, "routing command");
            return Envelope::success(self.interpreter.interpret(command).await);
        }

        let Some(handler) = self.registry.lookup(&target) else {
            tracing::warn!(handler = %target, "unknown handler");
            return Envelope::error(format!("Handler '{target}' not found"));
        };

        tracing::info!(handler = %target, "routing task");
        match AssertUnwindSafe(handler.execute(task)).catch_unwind().await {
            Ok(Ok(envelope)) => envelope,
            Ok(Err(e)) => {
                tracing::error!(handler = %target, error = %e, "handler failed");
                Envelope::error(e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(handler = %target, error = %message, "handler panicked");
                Envelope::error(message)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::history::MemoryHistoryStore;
    use crate::registry::FnHandler;

    fn dispatcher(registry: HandlerRegistry) -> Dispatcher {
        let config = GatewayConfig::default().sandboxed(std::env::temp_dir());
        Dispatcher::from_config(&config, Arc::new(MemoryHistoryStore::new()), registry)
    }

    #[tokio::test]
    async fn test_missing_target() {
        let envelope = dispatcher(HandlerRegistry::new())
            .route(Task::untargeted().with_field("command", "history"))
            .await;
        assert_eq!(envelope, Envelope::error("No target_handler specified"));
    }

    #[tokio::test]
    async fn test_unknown_handler() {
        let envelope = dispatcher(HandlerRegistry::new())
            .route(Task::new("Unknown"))
            .await;
        assert_eq!(envelope, Envelope::error("Handler 'Unknown' not found"));
    }

    #[tokio::test]
    async fn test_builtin_without_command_gets_guidance() {
        let envelope = dispatcher(HandlerRegistry::new())
            .route(Task::new(BUILTIN_HANDLER))
            .await;
        assert!(envelope.is_success());
        assert_eq!(
            envelope.payload().and_then(|p| p.as_str()),
            Some(crate::interpreter::UNRECOGNIZED)
        );
    }

    #[tokio::test]
    async fn test_registered_handler_receives_task() {
        let echo = FnHandler::new("Echo", "echoes text", |task: Task| async move {
            let text = task.str_field("text").unwrap_or_default().to_string();
            Ok::<_, anyhow::Error>(Envelope::success(text))
        });
        let d = dispatcher(HandlerRegistry::new().with(Arc::new(echo)));
        let envelope = d.route(Task::new("Echo").with_field("text", "hi")).await;
        assert_eq!(envelope, Envelope::success("hi"));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_envelope() {
        let failing = FnHandler::new("Failing", "always fails", |_task: Task| async move {
            Err::<Envelope, _>(anyhow::anyhow!("backend unavailable"))
        });
        let d = dispatcher(HandlerRegistry::new().with(Arc::new(failing)));
        let envelope = d.route(Task::new("Failing")).await;
        assert_eq!(envelope, Envelope::error("backend unavailable"));
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_envelope() {
        let panicking = FnHandler::new("Panicky", "always panics", |_task: Task| async move {
            if true {
                panic!("boom");
            }
            Ok::<_, anyhow::Error>(Envelope::success("unreachable"))
        });
        let d = dispatcher(HandlerRegistry::new().with(Arc::new(panicking)));
        let envelope = d.route(Task::new("Panicky")).await;
        assert_eq!(envelope, Envelope::error("boom"));
    }

    #[tokio::test]
    async fn test_builtin_name_is_not_overridable() {
        let impostor = FnHandler::new(BUILTIN_HANDLER, "impostor", |_task: Task| async move {
            Ok::<_, anyhow::Error>(Envelope::success("impostor"))
        });
        let d = dispatcher(HandlerRegistry::new().with(Arc::new(impostor)));
        let envelope = d
            .route(Task::new(BUILTIN_HANDLER).with_field("command", "history"))
            .await;
        assert_ne!(envelope, Envelope::success("impostor"));
        assert_eq!(
            envelope.payload().and_then(|p| p.as_str()),
            Some(crate::interpreter::NO_HISTORY)
        );
    }

    #[test]
    fn test_panic_message_formats() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn Any + Send> = Box::new(7_u32);
        assert_eq!(panic_message(other.as_ref()), "handler panicked");
    }
}
