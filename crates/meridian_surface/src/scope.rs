//! Scope-touches records.
//!
//! A scope-touches record flags, per surface, whether a node's change affects
//! that layer. [`ScopeTouches`] uses the canonical keys and
//! [`CompactScopeTouches`] the compact ones; they differ only in the
//! `database`/`db` and `infrastructure`/`infra` fields, so conversion in
//! either direction is lossless.

use serde::{Deserialize, Serialize};

use crate::surface::Surface;

/// Scope touches keyed by canonical surface names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeTouches {
    /// Touches server-side code.
    pub backend: bool,
    /// Touches browser-facing code.
    pub frontend: bool,
    /// Touches shared packages.
    pub packages: bool,
    /// Touches schemas or data.
    pub database: bool,
    /// Touches API contracts.
    pub contracts: bool,
    /// Touches shared UI components.
    pub ui: bool,
    /// Touches deployment resources.
    pub infrastructure: bool,
}

/// Scope touches keyed by compact surface names (`db`, `infra`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactScopeTouches {
    /// Touches server-side code.
    pub backend: bool,
    /// Touches browser-facing code.
    pub frontend: bool,
    /// Touches shared packages.
    pub packages: bool,
    /// Touches schemas or data.
    pub db: bool,
    /// Touches API contracts.
    pub contracts: bool,
    /// Touches shared UI components.
    pub ui: bool,
    /// Touches deployment resources.
    pub infra: bool,
}

impl ScopeTouches {
    /// Returns whether the given surface is touched.
    #[must_use]
    pub fn touches(&self, surface: Surface) -> bool {
        match surface {
            Surface::Frontend => self.frontend,
            Surface::Backend => self.backend,
            Surface::Database => self.database,
            Surface::Infrastructure => self.infrastructure,
            Surface::Contracts => self.contracts,
            Surface::Ui => self.ui,
            Surface::Packages => self.packages,
        }
    }

    /// Sets the flag for one surface.
    pub fn set(&mut self, surface: Surface, touched: bool) {
        let field = match surface {
            Surface::Frontend => &mut self.frontend,
            Surface::Backend => &mut self.backend,
            Surface::Database => &mut self.database,
            Surface::Infrastructure => &mut self.infrastructure,
            Surface::Contracts => &mut self.contracts,
            Surface::Ui => &mut self.ui,
            Surface::Packages => &mut self.packages,
        };
        *field = touched;
    }

    /// Builds a record touching exactly the given surfaces.
    #[must_use]
    pub fn from_surfaces(surfaces: impl IntoIterator<Item = Surface>) -> Self {
        let mut touches = Self::default();
        for surface in surfaces {
            touches.set(surface, true);
        }
        touches
    }

    /// Returns the touched surfaces in declaration order.
    pub fn surfaces(&self) -> impl Iterator<Item = Surface> + '_ {
        Surface::ALL.into_iter().filter(|s| self.touches(*s))
    }
}

/// Converts a compact record to canonical keys.
#[must_use]
pub fn normalize_scope_touches(compact: &CompactScopeTouches) -> ScopeTouches {
    ScopeTouches {
        backend: compact.backend,
        frontend: compact.frontend,
        packages: compact.packages,
        database: compact.db,
        contracts: compact.contracts,
        ui: compact.ui,
        infrastructure: compact.infra,
    }
}

/// Converts a canonical record to compact keys.
#[must_use]
pub fn denormalize_scope_touches(canonical: &ScopeTouches) -> CompactScopeTouches {
    CompactScopeTouches {
        backend: canonical.backend,
        frontend: canonical.frontend,
        packages: canonical.packages,
        db: canonical.database,
        contracts: canonical.contracts,
        ui: canonical.ui,
        infra: canonical.infrastructure,
    }
}

impl From<CompactScopeTouches> for ScopeTouches {
    fn from(compact: CompactScopeTouches) -> Self {
        normalize_scope_touches(&compact)
    }
}

impl From<ScopeTouches> for CompactScopeTouches {
    fn from(canonical: ScopeTouches) -> Self {
        denormalize_scope_touches(&canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_moves_only_aliased_fields() {
        let compact = CompactScopeTouches {
            backend: true,
            db: true,
            infra: false,
            ui: true,
            ..Default::default()
        };
        let canonical = normalize_scope_touches(&compact);

        assert!(canonical.backend);
        assert!(canonical.database);
        assert!(!canonical.infrastructure);
        assert!(canonical.ui);
        assert!(!canonical.frontend);
        assert!(!canonical.packages);
        assert!(!canonical.contracts);
    }

    #[test]
    fn surfaces_lists_touched_layers() {
        let touches = ScopeTouches::from_surfaces([Surface::Database, Surface::Frontend]);
        let listed: Vec<_> = touches.surfaces().collect();
        assert_eq!(listed, vec![Surface::Frontend, Surface::Database]);
        assert!(touches.touches(Surface::Database));
        assert!(!touches.touches(Surface::Infrastructure));
    }

    #[test]
    fn json_keys_follow_each_vocabulary() {
        let canonical = ScopeTouches::from_surfaces([Surface::Infrastructure]);
        let json = serde_json::to_value(denormalize_scope_touches(&canonical)).unwrap();
        assert_eq!(json["infra"], true);
        assert!(json.get("infrastructure").is_none());

        let parsed: CompactScopeTouches = serde_json::from_str(r#"{"db": true}"#).unwrap();
        assert!(ScopeTouches::from(parsed).database);
    }
}
