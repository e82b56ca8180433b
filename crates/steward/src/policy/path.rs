//! Filesystem path authorization.

use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path, PathBuf};

use super::PolicyDecision;
use crate::error::GatewayError;

/// Resolve `path` to a canonical absolute path.
///
/// Relative paths are taken against the current working directory, `.` and
/// `..` are removed lexically, and then the longest existing ancestor is
/// canonicalized (resolving symlinks) with the not-yet-existing remainder
/// appended. This lets a path that is about to be created be resolved the
/// same way as one that already exists.
pub fn resolve_path(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let normalized = normalize_lexically(&absolute);

    let mut existing: &Path = &normalized;
    let mut missing: Vec<&OsStr> = Vec::new();
    loop {
        match std::fs::canonicalize(existing) {
            Ok(mut resolved) => {
                for part in missing.iter().rev() {
                    resolved.push(part);
                }
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                match (existing.parent(), existing.file_name()) {
                    (Some(parent), Some(name)) => {
                        missing.push(name);
                        existing = parent;
                    }
                    _ => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            // Popping past the root leaves the root in place.
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Decides whether a path lies inside one of the allow-listed roots.
///
/// Roots are resolved once at construction. A path is authorized when its
/// resolved form equals a root or is nested under one, compared component by
/// component (`/srv/sandbox-old` is not under `/srv/sandbox`).
#[derive(Clone, Debug, Default)]
pub struct PathAuthority {
    roots: Vec<PathBuf>,
}

impl PathAuthority {
    /// Build an authority over the given roots.
    ///
    /// Roots that cannot be resolved are skipped with a warning.
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let roots = roots
            .into_iter()
            .filter_map(|root| {
                let root = root.as_ref();
                match resolve_path(root) {
                    Ok(resolved) => Some(resolved),
                    Err(e) => {
                        tracing::warn!(root = %root.display(), error = %e, "skipping unresolvable root");
                        None
                    }
                }
            })
            .collect();
        Self { roots }
    }

    /// The resolved allow-listed roots.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Check a path against the allow-list.
    pub fn check(&self, path: &Path) -> PolicyDecision {
        match resolve_path(path) {
            Ok(resolved) => self.check_resolved(&resolved),
            Err(e) => PolicyDecision::Deny(format!("cannot resolve {}: {e}", path.display())),
        }
    }

    /// Returns true iff `path` resolves inside an allow-listed root.
    pub fn authorize(&self, path: impl AsRef<Path>) -> bool {
        self.resolve_authorized(path.as_ref()).is_ok()
    }

    /// Resolve `path` and return the resolved form if it is authorized.
    ///
    /// Callers should operate on the returned path, not the input, so the
    /// path that was checked is the path that gets touched.
    pub fn resolve_authorized(&self, path: &Path) -> Result<PathBuf, GatewayError> {
        let decision = match resolve_path(path) {
            Ok(resolved) => match self.check_resolved(&resolved) {
                PolicyDecision::Allow => return Ok(resolved),
                deny => deny,
            },
            Err(e) => PolicyDecision::Deny(format!("cannot resolve: {e}")),
        };
        tracing::warn!(
            path = %path.display(),
            reason = decision.denial_reason().unwrap_or_default(),
            "access denied to path"
        );
        Err(GatewayError::AccessDenied {
            path: path.display().to_string(),
        })
    }

    fn check_resolved(&self, resolved: &Path) -> PolicyDecision {
        if self.roots.iter().any(|root| resolved.starts_with(root)) {
            PolicyDecision::Allow
        } else {
            PolicyDecision::Deny(format!(
                "{} is outside every allowed root",
                resolved.display()
            ))
        }
    }
}
