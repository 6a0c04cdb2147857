//! Round-trip properties between the compact and canonical vocabularies.

use meridian_surface::{
    CompactScopeTouches, ScopeTouches, Surface, SurfaceNormalizer, denormalize_scope_touches,
    denormalize_surface_type, normalize_scope_touches, normalize_surface_type,
};
use proptest::prelude::*;

fn arb_compact() -> impl Strategy<Value = CompactScopeTouches> {
    any::<[bool; 7]>().prop_map(|b| CompactScopeTouches {
        backend: b[0],
        frontend: b[1],
        packages: b[2],
        db: b[3],
        contracts: b[4],
        ui: b[5],
        infra: b[6],
    })
}

fn arb_canonical() -> impl Strategy<Value = ScopeTouches> {
    arb_compact().prop_map(ScopeTouches::from)
}

#[test]
fn every_compact_token_round_trips() {
    for surface in Surface::ALL {
        let token = surface.compact();
        let canonical = normalize_surface_type(token, true).unwrap();
        assert_eq!(denormalize_surface_type(&canonical), token);
    }
}

proptest! {
    #[test]
    fn compact_records_round_trip(compact in arb_compact()) {
        prop_assert_eq!(denormalize_scope_touches(&normalize_scope_touches(&compact)), compact);
    }

    #[test]
    fn canonical_records_round_trip(canonical in arb_canonical()) {
        prop_assert_eq!(normalize_scope_touches(&denormalize_scope_touches(&canonical)), canonical);
    }

    #[test]
    fn normalization_preserves_every_flag(compact in arb_compact()) {
        let canonical = normalize_scope_touches(&compact);
        prop_assert_eq!(canonical.backend, compact.backend);
        prop_assert_eq!(canonical.frontend, compact.frontend);
        prop_assert_eq!(canonical.packages, compact.packages);
        prop_assert_eq!(canonical.contracts, compact.contracts);
        prop_assert_eq!(canonical.ui, compact.ui);
        prop_assert_eq!(canonical.database, compact.db);
        prop_assert_eq!(canonical.infrastructure, compact.infra);
    }

    #[test]
    fn json_round_trip_through_untyped_records(compact in arb_compact()) {
        let normalizer = SurfaceNormalizer::default();
        let raw: std::collections::BTreeMap<String, bool> =
            serde_json::from_value(serde_json::to_value(compact).unwrap()).unwrap();

        let read = normalizer.read_scope_record(&raw).unwrap();
        let typed: ScopeTouches =
            serde_json::from_value(serde_json::to_value(&read).unwrap()).unwrap();
        prop_assert_eq!(typed, normalize_scope_touches(&compact));
        prop_assert_eq!(normalizer.write_scope_record(&read), raw);
    }

    #[test]
    fn lenient_mode_never_rejects(token in "[a-zA-Z-]{0,16}") {
        prop_assert!(normalize_surface_type(&token, false).is_ok());
    }

    #[test]
    fn case_does_not_matter(idx in 0_usize..7, upper in any::<bool>()) {
        let surface = Surface::ALL[idx];
        let token = if upper {
            surface.compact().to_uppercase()
        } else {
            surface.compact().to_string()
        };
        prop_assert_eq!(normalize_surface_type(&token, true).unwrap(), surface.canonical());
    }
}
