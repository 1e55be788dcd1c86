//! Locators and namespaces
//!
//! A locator is the user-facing string naming a node in one of the two
//! namespaces. Remote catalog locators carry an `i:` or `irods:` prefix;
//! anything else is a local filesystem path.
//!
//! ## Design Notes
//!
//! - Paths inside both namespaces are POSIX-style strings. The helpers at
//!   the bottom of this module operate on those strings directly so the
//!   same mapping code serves catalog collections and local directories.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Locator prefixes that designate the remote catalog
const REMOTE_PREFIXES: &[&str] = &["irods:", "i:"];

// ============================================================================
// Namespace
// ============================================================================

/// One of the two storage backends the engine moves data between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Local POSIX filesystem
    LocalFilesystem,
    /// Remote managed-repository catalog
    RemoteCatalog,
}

impl Display for Namespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::LocalFilesystem => write!(f, "local"),
            Namespace::RemoteCatalog => write!(f, "catalog"),
        }
    }
}

// ============================================================================
// Locator
// ============================================================================

/// A parsed locator: the namespace plus the namespace-local path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    namespace: Namespace,
    path: String,
}

impl Locator {
    /// Parse a locator string
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidLocator`] if no path remains after the
    /// namespace prefix is removed.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let raw = raw.trim();
        let (namespace, rest) = REMOTE_PREFIXES
            .iter()
            .find_map(|prefix| raw.strip_prefix(prefix))
            .map(|rest| (Namespace::RemoteCatalog, rest))
            .unwrap_or((Namespace::LocalFilesystem, raw));

        let path = trim_trailing_slash(rest);
        if path.is_empty() {
            return Err(DomainError::InvalidLocator(format!(
                "empty path in locator {raw:?}"
            )));
        }

        Ok(Self {
            namespace,
            path: path.to_string(),
        })
    }

    /// Build a locator from already-separated parts
    #[must_use]
    pub fn new(namespace: Namespace, path: impl Into<String>) -> Self {
        Self {
            namespace,
            path: path.into(),
        }
    }

    /// The namespace this locator addresses
    #[must_use]
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Namespace-local path, without any prefix
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Display for Locator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.namespace {
            Namespace::LocalFilesystem => write!(f, "{}", self.path),
            Namespace::RemoteCatalog => write!(f, "i:{}", self.path),
        }
    }
}

impl FromStr for Locator {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ============================================================================
// Path helpers
// ============================================================================

fn trim_trailing_slash(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

/// Join a relative path onto a base path
///
/// An empty `relative` yields the base itself.
#[must_use]
pub fn join_path(base: &str, relative: &str) -> String {
    let relative = relative.trim_start_matches('/');
    if relative.is_empty() {
        return base.to_string();
    }
    if base.ends_with('/') {
        format!("{base}{relative}")
    } else {
        format!("{base}/{relative}")
    }
}

/// Parent of a path (`/` for top-level entries, `.` for bare names)
#[must_use]
pub fn parent_path(path: &str) -> &str {
    let path = trim_trailing_slash(path);
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => ".",
    }
}

/// Last segment of a path
#[must_use]
pub fn base_name(path: &str) -> &str {
    let path = trim_trailing_slash(path);
    path.rsplit('/').next().unwrap_or(path)
}

/// Path of `path` relative to `base`, without a leading separator
///
/// Returns `path` unchanged (minus leading separators) when it does not
/// live under `base`.
#[must_use]
pub fn relative_path<'a>(path: &'a str, base: &str) -> &'a str {
    let base = trim_trailing_slash(base);
    let stripped = if base == "/" {
        Some(path)
    } else {
        path.strip_prefix(base)
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
    };
    stripped.unwrap_or(path).trim_start_matches('/')
}
