//! Property-based tests for sdk-watch crate.
//!
//! These tests verify universal properties across all inputs using proptest.

use std::path::PathBuf;
use std::time::Duration;

use proptest::prelude::*;
use sdk_watch::{KeyResolver, KeyStrategy, KeyValueStore, MemoryStore, RateLimiter};
use test_utils::generators::{extension, path_segment, relative_segments};

fn any_strategy() -> impl Strategy<Value = KeyStrategy> {
    prop_oneof![
        Just(KeyStrategy::NameNoExtension),
        Just(KeyStrategy::NameWithExtension),
        Just(KeyStrategy::PathRelativeToRoot),
        Just(KeyStrategy::FullPath),
    ]
}

// Key resolution is a pure function of strategy, roots and path.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_resolution_deterministic(
        strategy in any_strategy(),
        ext in extension(),
        segments in relative_segments(),
    ) {
        let root = PathBuf::from("/srv/keys");
        let path = segments.iter().fold(root.clone(), |p, s| p.join(s));
        let first = KeyResolver::new(strategy, Some(ext.as_str()), vec![root.clone()]);
        let second = KeyResolver::new(strategy, Some(ext.as_str()), vec![root]);

        prop_assert_eq!(first.resolve(&path), second.resolve(&path));
        prop_assert_eq!(first.resolve(&path), first.resolve(&path));
    }

    #[test]
    fn prop_name_no_extension_strips_suffix(stem in path_segment(), ext in extension()) {
        let resolver = KeyResolver::new(KeyStrategy::NameNoExtension, Some(ext.as_str()), Vec::new());
        let with_ext = PathBuf::from("/srv").join(format!("{stem}.{ext}"));
        let without = PathBuf::from("/srv").join(format!("{stem}.{ext}x"));

        prop_assert_eq!(resolver.resolve(&with_ext), Some(stem));
        prop_assert_eq!(resolver.resolve(&without), None);
    }

    #[test]
    fn prop_relative_key_has_single_leading_slash(segments in relative_segments()) {
        let root = PathBuf::from("/srv/keys");
        let path = segments.iter().fold(root.clone(), |p, s| p.join(s));
        let resolver = KeyResolver::new(KeyStrategy::PathRelativeToRoot, None, vec![root]);

        let key = resolver.resolve(&path).unwrap();
        prop_assert!(key.starts_with('/'));
        prop_assert!(!key.starts_with("//"));
        prop_assert_eq!(key, format!("/{}", segments.join("/")));
    }
}

// The store keeps exactly one entry per key with the latest value.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_store_last_write_wins(writes in prop::collection::vec((0u8..8, any::<u32>()), 1..50)) {
        let store = MemoryStore::new();
        let mut expected = std::collections::HashMap::new();
        for (key, value) in &writes {
            store.store(*key, *value);
            expected.insert(*key, *value);
        }

        prop_assert_eq!(store.len(), expected.len());
        for (key, value) in expected {
            prop_assert_eq!(store.get(&key), Some(value));
        }
    }

    #[test]
    fn prop_limiter_grants_at_most_burst(burst in 0u32..20, attempts in 0usize..100) {
        let limiter = RateLimiter::new(Duration::from_secs(3600), burst);
        let granted = (0..attempts).filter(|_| limiter.try_acquire()).count();
        prop_assert!(granted <= burst as usize);
        prop_assert_eq!(granted, attempts.min(burst as usize));
    }
}
