//! Surface vocabulary normalization.
//!
//! Plan nodes declare which system layer ("surface") they touch. External
//! documents use a compact vocabulary (`db`, `infra`) while the canonical
//! internal vocabulary spells those two out (`database`, `infrastructure`).
//! This crate translates between the two.
//!
//! # Example
//!
//! ```
//! use meridian_surface::{denormalize_surface_type, normalize_surface_type};
//!
//! assert_eq!(normalize_surface_type("INFRA", true).unwrap(), "infrastructure");
//! assert_eq!(denormalize_surface_type("database"), "db");
//! ```

/// Surface tokens and the normalizer.
pub mod surface;

/// Scope-touches records in both vocabularies.
pub mod scope;

pub use scope::{
    CompactScopeTouches, ScopeTouches, denormalize_scope_touches, normalize_scope_touches,
};
pub use surface::{
    Surface, SurfaceError, SurfaceNormalizer, denormalize_surface_type, denormalize_surfaces,
    normalize_surface_type, normalize_surfaces,
};
