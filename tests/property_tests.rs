//! Property-Based Tests for drivermgr
//!
//! These tests verify:
//! - Enum string round-trips (parse → to_string → parse)
//! - Catalog partition invariants for arbitrary package indexes
//! - Recommendation determinism
//! - Status labels derived from flags

use proptest::prelude::*;
use std::collections::HashSet;

use drivermgr::catalog::categorize;
use drivermgr::catalog::default_rules;
use drivermgr::{Action, Catalog, Category, Package, recommend};

// =============================================================================
// Enum Property Tests
// =============================================================================

fn category_strategy() -> impl Strategy<Value = Category> {
    prop_oneof![
        Just(Category::Graphics),
        Just(Category::Network),
        Just(Category::Audio),
        Just(Category::Printing),
        Just(Category::Storage),
        Just(Category::Other),
    ]
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![Just(Action::Install), Just(Action::Remove)]
}

proptest! {
    /// Category: to_string → parse round-trip is identity
    #[test]
    fn category_roundtrip(category in category_strategy()) {
        let s = category.to_string();
        let parsed: Category = s.parse().expect("Should parse");
        prop_assert_eq!(category, parsed);
    }

    /// Category: parsing ignores case
    #[test]
    fn category_parse_is_case_insensitive(category in category_strategy()) {
        let upper = category.to_string().to_uppercase();
        let parsed: Category = upper.parse().expect("Should parse");
        prop_assert_eq!(category, parsed);
    }

    /// Action: to_string → parse round-trip is identity
    #[test]
    fn action_roundtrip(action in action_strategy()) {
        let s = action.to_string();
        let parsed: Action = s.parse().expect("Should parse");
        prop_assert_eq!(action, parsed);
    }
}

// =============================================================================
// Catalog Property Tests
// =============================================================================

/// Package-like names, mixing driver keywords into random stems
fn package_name_strategy() -> impl Strategy<Value = String> {
    let keyword = prop_oneof![
        Just(""),
        Just("nvidia"),
        Just("net"),
        Just("alsa"),
        Just("cups"),
        Just("nvme"),
        Just("firmware"),
        Just("Intel"),
    ];
    ("[a-z0-9]{0,6}", keyword, "[a-z0-9-]{0,6}")
        .prop_map(|(prefix, keyword, suffix)| format!("{}{}{}", prefix, keyword, suffix))
}

fn package_index_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(package_name_strategy(), 0..40)
}

proptest! {
    /// Building twice from the same index gives the same catalog
    #[test]
    fn catalog_is_deterministic(names in package_index_strategy()) {
        prop_assert_eq!(Catalog::build(&names), Catalog::build(&names));
    }

    /// Every cataloged name appears in exactly one category
    #[test]
    fn catalog_has_no_duplicates(names in package_index_strategy()) {
        let catalog = Catalog::build(&names);
        let mut seen = HashSet::new();
        for (_, name) in catalog.iter() {
            prop_assert!(seen.insert(name.to_string()), "{} listed twice", name);
        }
        prop_assert_eq!(seen.len(), catalog.len());
    }

    /// No category is present without packages
    #[test]
    fn catalog_has_no_empty_categories(names in package_index_strategy()) {
        let catalog = Catalog::build(&names);
        for category in catalog.categories() {
            prop_assert!(!catalog.packages(category).is_empty());
        }
    }

    /// A name is cataloged iff some rule matches it, under the first matching rule
    #[test]
    fn catalog_follows_rule_priority(names in package_index_strategy()) {
        let catalog = Catalog::build(&names);
        let rules = default_rules();
        for name in &names {
            prop_assert_eq!(catalog.category_of(name), categorize(name, &rules));
        }
    }

    /// Within a category, packages keep their index order
    #[test]
    fn catalog_preserves_index_order(names in package_index_strategy()) {
        let catalog = Catalog::build(&names);
        for category in catalog.categories() {
            let positions: Vec<usize> = catalog
                .packages(category)
                .iter()
                .map(|p| names.iter().position(|n| n == p).expect("cataloged name comes from index"))
                .collect();
            prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }
    }
}

// =============================================================================
// Recommendation Property Tests
// =============================================================================

fn lspci_line_strategy() -> impl Strategy<Value = String> {
    let class = prop_oneof![
        Just("VGA compatible controller"),
        Just("3D controller"),
        Just("Ethernet controller"),
        Just("Network controller"),
        Just("Audio device"),
        Just("USB controller"),
    ];
    let vendor = prop_oneof![
        Just("NVIDIA Corporation"),
        Just("Intel Corporation"),
        Just("Advanced Micro Devices, Inc. [AMD/ATI]"),
        Just("Realtek Semiconductor Co., Ltd."),
        Just("Broadcom Inc."),
    ];
    (class, vendor).prop_map(|(class, vendor)| format!("00:02.0 {} [0300]: {} Device", class, vendor))
}

proptest! {
    /// Line order never changes the recommendation set
    #[test]
    fn recommend_ignores_line_order(lines in prop::collection::vec(lspci_line_strategy(), 0..10)) {
        let mut reversed = lines.clone();
        reversed.reverse();
        prop_assert_eq!(recommend(&lines), recommend(&reversed));
    }

    /// Repeating a line never changes the recommendation set
    #[test]
    fn recommend_ignores_duplicates(lines in prop::collection::vec(lspci_line_strategy(), 0..10)) {
        let mut doubled = lines.clone();
        doubled.extend(lines.iter().cloned());
        prop_assert_eq!(recommend(&lines), recommend(&doubled));
    }
}

// =============================================================================
// Package Label Property Tests
// =============================================================================

proptest! {
    /// The label reflects the flags and always contains the name
    #[test]
    fn status_label_reflects_flags(
        name in "[a-z][a-z0-9-]{0,20}",
        category in category_strategy(),
        installed in any::<bool>(),
        recommended in any::<bool>(),
    ) {
        let package = Package { name: name.clone(), category, installed, recommended };
        let label = package.status_label();
        prop_assert!(label.contains(&name));
        prop_assert_eq!(label.starts_with('★'), recommended);
        prop_assert_eq!(label.ends_with("(Installed)"), installed);
    }
}
