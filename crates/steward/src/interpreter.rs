//! The built-in command grammar.
//!
//! Free text is trimmed, lowercased and matched against an ordered list of
//! rules. The first rule that matches decides the [`Directive`]; later rules
//! are never consulted. Order matters: `open folder <path>` has to be seen
//! by the `open` rule before the application-name mapping applies.
//!
//! | Pattern                  | Directive                          |
//! |--------------------------|------------------------------------|
//! | `open folder <path>`     | [`Directive::OpenFolder`]          |
//! | `open <name>`            | [`Directive::OpenApp`]             |
//! | `create folder <path>`   | [`Directive::CreateFolder`]        |
//! | `delete folder <path>`   | [`Directive::DeleteFolder`]        |
//! | `run <cmd>`              | [`Directive::Run`]                 |
//! | `history`                | [`Directive::History`]             |
//! | anything else            | [`Directive::Unrecognized`]        |
//!
//! Relative paths are rooted under the sandbox directory; absolute paths pass
//! through unchanged and are left to the [`PathAuthority`] to accept or deny.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};

use crate::config::{Applications, GatewayConfig};
use crate::dispatcher::BUILTIN_HANDLER;
use crate::error::GatewayError;
use crate::history::HistoryStore;
use crate::ops::{FileOperations, ProcessOperations};
use crate::policy::{CommandAuthority, PathAuthority};

/// Number of records shown by the `history` command.
pub const HISTORY_LIMIT: usize = 5;

/// Reply for `history` when nothing has been recorded.
pub const NO_HISTORY: &str = "No history found.";

/// Reply when no rule matches.
pub const UNRECOGNIZED: &str =
    "Command not recognized. Try 'open notepad', 'create folder foo', 'run dir', or 'history'.";

/// What a command line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Open a directory in the folder opener.
    OpenFolder(String),
    /// Launch one of the known applications.
    OpenApp(String),
    /// Create a directory.
    CreateFolder(String),
    /// Recursively delete a directory.
    DeleteFolder(String),
    /// Run a shell command.
    Run(String),
    /// Show recent built-in commands.
    History,
    /// No rule matched.
    Unrecognized,
}

struct Rule {
    pattern: Regex,
    build: fn(&Captures<'_>) -> Directive,
}

#[allow(clippy::expect_used)] // literal patterns
fn rule(pattern: &str, build: fn(&Captures<'_>) -> Directive) -> Rule {
    Rule {
        pattern: Regex::new(pattern).expect("grammar pattern must compile"),
        build,
    }
}

fn capture(caps: &Captures<'_>) -> String {
    caps.get(1).map_or("", |m| m.as_str()).trim().to_string()
}

static GRAMMAR: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(r"^open\s+(.+)", |caps| {
            let name = capture(caps);
            match name.strip_prefix("folder ") {
                Some(path) => Directive::OpenFolder(path.trim().to_string()),
                None => Directive::OpenApp(name),
            }
        }),
        rule(r"^create folder\s+(.+)", |caps| {
            Directive::CreateFolder(capture(caps))
        }),
        rule(r"^delete folder\s+(.+)", |caps| {
            Directive::DeleteFolder(capture(caps))
        }),
        rule(r"^run\s+(.+)", |caps| Directive::Run(capture(caps))),
        rule(r"^history$", |_| Directive::History),
    ]
});

/// Parse a command line into a [`Directive`] without executing anything.
pub fn parse(command: &str) -> Directive {
    let normalized = command.trim().to_lowercase();
    GRAMMAR
        .iter()
        .find_map(|rule| rule.pattern.captures(&normalized).map(|caps| (rule.build)(&caps)))
        .unwrap_or(Directive::Unrecognized)
}

/// Executes built-in commands against the authorized host operations.
pub struct Interpreter {
    files: FileOperations,
    processes: ProcessOperations,
    history: Arc<dyn HistoryStore>,
    sandbox_root: PathBuf,
    applications: Applications,
    folder_opener: String,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("files", &self.files)
            .field("processes", &self.processes)
            .field("sandbox_root", &self.sandbox_root)
            .field("applications", &self.applications)
            .field("folder_opener", &self.folder_opener)
            .finish_non_exhaustive()
    }
}

impl Interpreter {
    /// Build an interpreter, its authorities and operations from config.
    pub fn from_config(config: &GatewayConfig, history: Arc<dyn HistoryStore>) -> Self {
        let paths = Arc::new(PathAuthority::new(&config.allowed_roots));
        let commands = Arc::new(CommandAuthority::new(config.allowed_commands.iter().cloned()));
        Self {
            files: FileOperations::new(paths),
            processes: ProcessOperations::new(commands, config.limits.clone()),
            history,
            sandbox_root: config.sandbox_root.clone(),
            applications: config.applications.clone(),
            folder_opener: config.folder_opener.clone(),
        }
    }

    /// The file operations used by this interpreter.
    pub fn files(&self) -> &FileOperations {
        &self.files
    }

    /// The process operations used by this interpreter.
    pub fn processes(&self) -> &ProcessOperations {
        &self.processes
    }

    /// Root a user-supplied path: absolute paths are kept, relative ones are
    /// joined under the sandbox.
    pub fn sandboxed(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.sandbox_root.join(path)
        }
    }

    /// Parse and execute a command line, returning the reply text.
    pub async fn interpret(&self, command: &str) -> String {
        let directive = parse(command);
        tracing::debug!(command = %command, directive = ?directive, "parsed command");
        self.execute(directive).await
    }

    /// Execute an already-parsed directive.
    pub async fn execute(&self, directive: Directive) -> String {
        match directive {
            Directive::OpenFolder(path) => {
                let target = self.sandboxed(&path);
                let command = format!("{} \"{}\"", self.folder_opener, target.display());
                match self.processes.run_shell(&command).await {
                    Ok(output) if output.trim().is_empty() => {
                        format!("Opened: {}", target.display())
                    }
                    other => render(other),
                }
            }
            Directive::OpenApp(name) => match self.applications.resolve(&name) {
                Some(executable) => render(self.processes.launch(executable).await),
                None => format!(
                    "Unknown app '{name}'. Try 'notepad', 'calc', 'explorer', or 'open folder [name]'."
                ),
            },
            Directive::CreateFolder(path) => {
                let marker = self.sandboxed(&path).join(".keep");
                render(self.files.write(&marker, "").await.map(|written| {
                    let folder = written.parent().unwrap_or(&written);
                    format!("Success: Folder created: {}", folder.display())
                }))
            }
            Directive::DeleteFolder(path) => render(
                self.files
                    .delete_tree(self.sandboxed(&path))
                    .await
                    .map(|deleted| format!("Success: Folder deleted: {}", deleted.display())),
            ),
            Directive::Run(command) => render(self.processes.run_shell(&command).await),
            Directive::History => self.recent_history().await,
            Directive::Unrecognized => UNRECOGNIZED.to_string(),
        }
    }

    async fn recent_history(&self) -> String {
        let history = self.history.clone();
        let fetched =
            tokio::task::spawn_blocking(move || history.fetch(Some(BUILTIN_HANDLER), HISTORY_LIMIT))
                .await;
        let records = match fetched {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "failed to read history");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "history task failed");
                Vec::new()
            }
        };
        if records.is_empty() {
            return NO_HISTORY.to_string();
        }
        let mut out = String::from("Recent Commands:\n");
        for record in records {
            out.push_str(&format!("- {} ({})\n", record.input_text, record.timestamp));
        }
        out
    }
}

fn render(result: Result<String, GatewayError>) -> String {
    match result {
        Ok(output) => output,
        Err(e) => format!("Error: {e}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_open_app() {
        assert_eq!(parse("open notepad"), Directive::OpenApp("notepad".into()));
        assert_eq!(parse("  OPEN   Calc  "), Directive::OpenApp("calc".into()));
    }

    #[test]
    fn test_parse_open_folder_takes_precedence() {
        assert_eq!(
            parse("open folder projects/demo"),
            Directive::OpenFolder("projects/demo".into())
        );
        assert_eq!(
            parse("Open Folder /tmp/x"),
            Directive::OpenFolder("/tmp/x".into())
        );
    }

    #[test]
    fn test_parse_open_folder_without_path_is_an_app_name() {
        assert_eq!(parse("open folder"), Directive::OpenApp("folder".into()));
    }

    #[test]
    fn test_parse_create_and_delete_folder() {
        assert_eq!(
            parse("create folder demo"),
            Directive::CreateFolder("demo".into())
        );
        assert_eq!(
            parse("delete folder a/b"),
            Directive::DeleteFolder("a/b".into())
        );
    }

    #[test]
    fn test_parse_run_keeps_command_verbatim_after_lowercasing() {
        assert_eq!(
            parse("run echo Hello  World"),
            Directive::Run("echo hello  world".into())
        );
    }

    #[test]
    fn test_parse_history_is_exact() {
        assert_eq!(parse("history"), Directive::History);
        assert_eq!(parse("  HISTORY "), Directive::History);
        assert_eq!(parse("history please"), Directive::Unrecognized);
    }

    #[test]
    fn test_parse_rules_are_anchored() {
        assert_eq!(parse("please open notepad"), Directive::Unrecognized);
        assert_eq!(parse("create a folder"), Directive::Unrecognized);
        assert_eq!(parse("running"), Directive::Unrecognized);
        assert_eq!(parse(""), Directive::Unrecognized);
    }

    #[test]
    fn test_parse_stops_at_first_line() {
        assert_eq!(
            parse("run echo a\nrm -rf /"),
            Directive::Run("echo a".into())
        );
    }
}
