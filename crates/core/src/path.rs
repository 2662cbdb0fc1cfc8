//! Remote reference parsing and normalization
//!
//! A RemoteRef is a backend-agnostic object key in forward-slash,
//! backend-relative form. Adapters translate it to native path syntax
//! (e.g., prepending the configured root directory) internally.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A reference to one remote object, plus an optional revision marker.
///
/// The revision marker is used by the API backend for optimistic
/// concurrency and ignored by the SSH backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRef {
    /// Normalized object path, relative to the backend root, no leading
    /// or trailing slash
    path: String,
    /// Backend-supplied version tag, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl RemoteRef {
    /// Parse and normalize a path into a RemoteRef.
    ///
    /// Backslashes are accepted and converted, redundant separators and
    /// `.` segments are collapsed, and `..` segments are rejected so a
    /// reference can never escape the backend root.
    pub fn new(path: impl AsRef<str>) -> Result<Self> {
        let raw = path.as_ref().replace('\\', "/");

        let mut segments = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(Error::InvalidPath(format!(
                        "Path must not contain '..': {raw}"
                    )));
                }
                s => segments.push(s),
            }
        }

        if segments.is_empty() {
            return Err(Error::InvalidPath("Path cannot be empty".into()));
        }

        Ok(Self {
            path: segments.join("/"),
            revision: None,
        })
    }

    /// Attach a revision marker
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// The normalized path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Final path component
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Get the parent reference (one level up), None at the root
    pub fn parent(&self) -> Option<Self> {
        self.path.rfind('/').map(|pos| Self {
            path: self.path[..pos].to_string(),
            revision: None,
        })
    }

    /// Join a child path component
    pub fn join(&self, child: &str) -> Result<Self> {
        Self::new(format!("{}/{}", self.path, child))
    }

    /// All ancestor paths from the top down, excluding self.
    ///
    /// For `a/b/c.txt` this yields `a`, then `a/b`. Used by adapters that
    /// must create parent directories before writing.
    pub fn ancestors(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut end = 0;
        while let Some(pos) = self.path[end..].find('/') {
            end += pos;
            out.push(self.path[..end].to_string());
            end += 1;
        }
        out
    }
}

impl std::fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl std::str::FromStr for RemoteRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Strip a base prefix from a full backend path, yielding the relative
/// part. Adapters use this when mapping native listings back to refs.
pub fn relative_path<'a>(full_path: &'a str, base_path: &str) -> Result<&'a str> {
    let base = base_path.trim_end_matches('/');
    if base.is_empty() {
        return Ok(full_path.trim_start_matches('/'));
    }
    full_path
        .strip_prefix(base)
        .map(|rest| rest.trim_start_matches('/'))
        .ok_or_else(|| {
            Error::InvalidPath(format!(
                "Path '{full_path}' does not start with base '{base_path}'"
            ))
        })
}
