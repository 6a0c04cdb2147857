//! Surface tokens and their two spellings.

use core::fmt;
use core::str::FromStr;
use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Errors raised by strict-mode normalization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    /// The token is not part of either vocabulary.
    #[error("unknown surface type: '{0}'")]
    UnknownSurface(String),
    /// A scope-touches record carried a key outside both vocabularies.
    #[error("unknown scope-touches key: '{0}'")]
    UnknownScopeKey(String),
    /// A scope-touches record spelled the same surface two ways.
    #[error("scope-touches record has both '{first}' and '{second}' for surface '{surface}'")]
    ConflictingScopeKey {
        /// Canonical name of the surface.
        surface: String,
        /// First spelling encountered.
        first: String,
        /// Second spelling encountered.
        second: String,
    },
}

/// The system layer a node touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Surface {
    /// Browser-facing application code.
    Frontend,
    /// Server-side application code.
    Backend,
    /// Schemas, migrations and data.
    Database,
    /// Deployment and cloud resources.
    Infrastructure,
    /// Shared API contracts.
    Contracts,
    /// Shared UI components.
    Ui,
    /// Shared library packages.
    Packages,
}

impl Surface {
    /// Every surface, in declaration order.
    pub const ALL: [Surface; 7] = [
        Surface::Frontend,
        Surface::Backend,
        Surface::Database,
        Surface::Infrastructure,
        Surface::Contracts,
        Surface::Ui,
        Surface::Packages,
    ];

    /// Returns the canonical (internal) spelling.
    #[must_use]
    pub fn canonical(&self) -> &'static str {
        match self {
            Surface::Frontend => "frontend",
            Surface::Backend => "backend",
            Surface::Database => "database",
            Surface::Infrastructure => "infrastructure",
            Surface::Contracts => "contracts",
            Surface::Ui => "ui",
            Surface::Packages => "packages",
        }
    }

    /// Returns the compact (external) spelling.
    #[must_use]
    pub fn compact(&self) -> &'static str {
        match self {
            Surface::Database => "db",
            Surface::Infrastructure => "infra",
            other => other.canonical(),
        }
    }

    /// Parses either spelling, ignoring ASCII case.
    #[must_use]
    pub fn parse(token: &str) -> Option<Surface> {
        let token = token.trim();
        Surface::ALL.into_iter().find(|s| {
            token.eq_ignore_ascii_case(s.canonical()) || token.eq_ignore_ascii_case(s.compact())
        })
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical())
    }
}

impl FromStr for Surface {
    type Err = SurfaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Surface::parse(s).ok_or_else(|| SurfaceError::UnknownSurface(s.to_string()))
    }
}

impl TryFrom<String> for Surface {
    type Error = SurfaceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Surface> for String {
    fn from(surface: Surface) -> Self {
        surface.canonical().to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Token functions
// ─────────────────────────────────────────────────────────────────────────────

/// Converts a token to its canonical spelling.
///
/// Recognized tokens come back lowercase and canonical. Unrecognized tokens
/// are rejected when `strict` is set and returned unchanged otherwise.
pub fn normalize_surface_type(token: &str, strict: bool) -> Result<Cow<'_, str>, SurfaceError> {
    match Surface::parse(token) {
        Some(surface) => Ok(Cow::Borrowed(surface.canonical())),
        None if strict => Err(SurfaceError::UnknownSurface(token.to_string())),
        None => {
            tracing::debug!(token, "passing through unrecognized surface token");
            Ok(Cow::Borrowed(token))
        }
    }
}

/// Converts a canonical token to its compact spelling.
///
/// Only `database` and `infrastructure` change; every other token is
/// returned as given.
#[must_use]
pub fn denormalize_surface_type(token: &str) -> Cow<'_, str> {
    if token.eq_ignore_ascii_case(Surface::Database.canonical()) {
        Cow::Borrowed(Surface::Database.compact())
    } else if token.eq_ignore_ascii_case(Surface::Infrastructure.canonical()) {
        Cow::Borrowed(Surface::Infrastructure.compact())
    } else {
        Cow::Borrowed(token)
    }
}

/// Normalizes a list of tokens. Fails on the first unknown token in strict mode.
pub fn normalize_surfaces<S: AsRef<str>>(
    tokens: &[S],
    strict: bool,
) -> Result<Vec<String>, SurfaceError> {
    tokens
        .iter()
        .map(|t| normalize_surface_type(t.as_ref(), strict).map(Cow::into_owned))
        .collect()
}

/// Denormalizes a list of tokens.
#[must_use]
pub fn denormalize_surfaces<S: AsRef<str>>(tokens: &[S]) -> Vec<String> {
    tokens
        .iter()
        .map(|t| denormalize_surface_type(t.as_ref()).into_owned())
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// SurfaceNormalizer
// ─────────────────────────────────────────────────────────────────────────────

/// Direction-aware normalizer used at plan load/persist boundaries.
///
/// Reads translate compact → canonical, writes translate canonical →
/// compact. Either direction can be switched off to pass legacy data through
/// untouched.
///
/// # Example
///
/// ```
/// use meridian_surface::SurfaceNormalizer;
///
/// let normalizer = SurfaceNormalizer::default();
/// assert_eq!(normalizer.read_surface("db").unwrap(), "database");
/// assert_eq!(normalizer.write_surface("database"), "db");
///
/// let legacy = SurfaceNormalizer::default().with_normalize_on_read(false);
/// assert_eq!(legacy.read_surface("db").unwrap(), "db");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceNormalizer {
    /// Translate compact → canonical when reading.
    pub normalize_on_read: bool,
    /// Translate canonical → compact when writing.
    pub denormalize_on_write: bool,
    /// Reject unknown tokens and keys instead of passing them through.
    pub strict_mode: bool,
}

impl Default for SurfaceNormalizer {
    fn default() -> Self {
        Self {
            normalize_on_read: true,
            denormalize_on_write: true,
            strict_mode: false,
        }
    }
}

impl SurfaceNormalizer {
    /// Creates a normalizer with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables read-side normalization.
    #[must_use]
    pub fn with_normalize_on_read(mut self, enabled: bool) -> Self {
        self.normalize_on_read = enabled;
        self
    }

    /// Enables or disables write-side denormalization.
    #[must_use]
    pub fn with_denormalize_on_write(mut self, enabled: bool) -> Self {
        self.denormalize_on_write = enabled;
        self
    }

    /// Enables or disables strict mode.
    #[must_use]
    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    /// Normalizes a token read from external data.
    pub fn read_surface(&self, token: &str) -> Result<String, SurfaceError> {
        if !self.normalize_on_read {
            return Ok(token.to_string());
        }
        normalize_surface_type(token, self.strict_mode).map(Cow::into_owned)
    }

    /// Denormalizes a token about to be written.
    #[must_use]
    pub fn write_surface(&self, token: &str) -> String {
        if !self.denormalize_on_write {
            return token.to_string();
        }
        denormalize_surface_type(token).into_owned()
    }

    /// Normalizes a list of tokens read from external data.
    pub fn read_surfaces<S: AsRef<str>>(&self, tokens: &[S]) -> Result<Vec<String>, SurfaceError> {
        tokens.iter().map(|t| self.read_surface(t.as_ref())).collect()
    }

    /// Denormalizes a list of tokens about to be written.
    #[must_use]
    pub fn write_surfaces<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<String> {
        tokens.iter().map(|t| self.write_surface(t.as_ref())).collect()
    }

    /// Renames the aliased keys of an untyped scope-touches record read from
    /// external data (`db` → `database`, `infra` → `infrastructure`).
    ///
    /// A record that spells one surface both ways (`db` and `database`) is
    /// rejected in strict mode. In lenient mode the two flags are OR-ed: the
    /// surface counts as touched if either spelling says so.
    pub fn read_scope_record(
        &self,
        record: &BTreeMap<String, bool>,
    ) -> Result<BTreeMap<String, bool>, SurfaceError> {
        if !self.normalize_on_read {
            return Ok(record.clone());
        }
        let mut out = BTreeMap::new();
        let mut spelled: BTreeMap<&'static str, &str> = BTreeMap::new();
        for (key, value) in record {
            let Some(surface) = Surface::parse(key) else {
                if self.strict_mode {
                    return Err(SurfaceError::UnknownScopeKey(key.clone()));
                }
                out.insert(key.clone(), *value);
                continue;
            };
            let canonical = surface.canonical();
            if let Some(first) = spelled.insert(canonical, key) {
                if self.strict_mode {
                    return Err(SurfaceError::ConflictingScopeKey {
                        surface: canonical.to_string(),
                        first: first.to_string(),
                        second: key.clone(),
                    });
                }
                tracing::warn!(
                    surface = canonical,
                    first,
                    second = %key,
                    "merging duplicate scope-touches keys"
                );
            }
            *out.entry(canonical.to_string()).or_insert(false) |= *value;
        }
        Ok(out)
    }

    /// Renames the aliased keys of an untyped scope-touches record about to
    /// be written (`database` → `db`, `infrastructure` → `infra`). Flags of
    /// a surface spelled both ways are OR-ed.
    #[must_use]
    pub fn write_scope_record(&self, record: &BTreeMap<String, bool>) -> BTreeMap<String, bool> {
        if !self.denormalize_on_write {
            return record.clone();
        }
        let mut out = BTreeMap::new();
        for (key, value) in record {
            *out.entry(denormalize_surface_type(key).into_owned()).or_insert(false) |= *value;
        }
        out
    }
}
