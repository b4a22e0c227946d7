//! Package Catalog Builder
//!
//! Partitions the package manager's index into driver categories using an
//! ordered keyword rule table.
//!
//! # Rules
//!
//! | Priority | Category | Keywords (substring of lower-cased name) |
//! |----------|----------|------------------------------------------|
//! | 1 | Graphics | nvidia, intel, radeon, graphics, video, mesa, xserver |
//! | 2 | Network  | network, net, wifi, ethernet, iwlwifi, realtek |
//! | 3 | Audio    | audio, alsa, pulseaudio, pipewire, sound |
//! | 4 | Printing | printer, cups, hplip |
//! | 5 | Storage  | storage, mdadm, nvme, ata, scsi, disk |
//! | 6 | Other    | driver, firmware |
//!
//! The first matching rule wins. Names matching no rule are not driver
//! packages and are dropped. Building is pure: the same input always yields
//! the same catalog.

use crate::types::Category;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Built-in rule table, in priority order.
pub const DEFAULT_RULES: &[(Category, &[&str])] = &[
    (
        Category::Graphics,
        &["nvidia", "intel", "radeon", "graphics", "video", "mesa", "xserver"],
    ),
    (
        Category::Network,
        &["network", "net", "wifi", "ethernet", "iwlwifi", "realtek"],
    ),
    (
        Category::Audio,
        &["audio", "alsa", "pulseaudio", "pipewire", "sound"],
    ),
    (Category::Printing, &["printer", "cups", "hplip"]),
    (
        Category::Storage,
        &["storage", "mdadm", "nvme", "ata", "scsi", "disk"],
    ),
    (Category::Other, &["driver", "firmware"]),
];

/// One categorization rule: a package belongs to `category` if its
/// lower-cased name contains any of `keywords`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category: Category,
    pub keywords: Vec<String>,
}

impl CategoryRule {
    fn matches(&self, lowercase_name: &str) -> bool {
        self.keywords
            .iter()
            .any(|keyword| lowercase_name.contains(keyword.as_str()))
    }
}

/// Owned copy of `DEFAULT_RULES`.
pub fn default_rules() -> Vec<CategoryRule> {
    DEFAULT_RULES
        .iter()
        .map(|(category, keywords)| CategoryRule {
            category: *category,
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
        })
        .collect()
}

/// Category of `name` under `rules`, or `None` if no rule matches.
pub fn categorize(name: &str, rules: &[CategoryRule]) -> Option<Category> {
    let lowercase = name.to_lowercase();
    rules
        .iter()
        .find(|rule| rule.matches(&lowercase))
        .map(|rule| rule.category)
}

/// Category → package-name mapping.
///
/// Categories iterate in their fixed order; packages within a category keep
/// the order they had in the input index. Empty categories are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Catalog {
    categories: BTreeMap<Category, Vec<String>>,
    #[serde(skip)]
    index: HashMap<String, Category>,
}

impl Catalog {
    /// Build a catalog with the built-in rule table.
    pub fn build<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::build_with_rules(names, &default_rules())
    }

    /// Build a catalog with an explicit rule table.
    ///
    /// A name listed more than once is cataloged at its first occurrence.
    pub fn build_with_rules<I, S>(names: I, rules: &[CategoryRule]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut catalog = Self::default();
        let mut dropped = 0usize;

        for name in names {
            let name = name.as_ref();
            if catalog.index.contains_key(name) {
                continue;
            }
            match categorize(name, rules) {
                Some(category) => {
                    catalog.index.insert(name.to_string(), category);
                    catalog
                        .categories
                        .entry(category)
                        .or_default()
                        .push(name.to_string());
                }
                None => dropped += 1,
            }
        }

        debug!(
            "Catalog built: {} packages in {} categories ({} names dropped)",
            catalog.index.len(),
            catalog.categories.len(),
            dropped
        );

        catalog
    }

    /// Non-empty categories in display order.
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.categories.keys().copied()
    }

    /// Packages of `category`, empty if the category is absent.
    pub fn packages(&self, category: Category) -> &[String] {
        self.categories
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Category the package was placed in, if cataloged.
    pub fn category_of(&self, name: &str) -> Option<Category> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All cataloged packages, category by category.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &str)> + '_ {
        self.categories
            .iter()
            .flat_map(|(category, names)| names.iter().map(move |n| (*category, n.as_str())))
    }

    /// Number of cataloged packages.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_partition() {
        let catalog = Catalog::build(["nvidia-driver", "alsa-base", "cups-filters"]);

        assert_eq!(
            catalog.categories().collect::<Vec<_>>(),
            vec![Category::Graphics, Category::Audio, Category::Printing]
        );
        assert_eq!(catalog.packages(Category::Graphics), ["nvidia-driver"]);
        assert_eq!(catalog.packages(Category::Audio), ["alsa-base"]);
        assert_eq!(catalog.packages(Category::Printing), ["cups-filters"]);
        assert!(catalog.packages(Category::Network).is_empty());
    }

    #[test]
    fn test_first_matching_rule_wins() {
        // "intel" (Graphics) beats "firmware" (Other)
        assert_eq!(
            categorize("intel-microcode-firmware", &default_rules()),
            Some(Category::Graphics)
        );
        // "net" (Network) beats "driver" (Other)
        assert_eq!(
            categorize("netdriver-utils", &default_rules()),
            Some(Category::Network)
        );
        // "realtek" is Network even though firmware-realtek mentions firmware
        assert_eq!(
            categorize("firmware-realtek", &default_rules()),
            Some(Category::Network)
        );
    }

    #[test]
    fn test_matching_is_case_insensitive_on_name() {
        assert_eq!(
            categorize("NVIDIA-Settings", &default_rules()),
            Some(Category::Graphics)
        );
    }

    #[test]
    fn test_unmatched_names_are_dropped_not_other() {
        let catalog = Catalog::build(["bash", "coreutils", "linux-firmware"]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.category_of("linux-firmware"), Some(Category::Other));
        assert!(!catalog.contains("bash"));
    }

    #[test]
    fn test_empty_input_yields_empty_catalog() {
        let catalog = Catalog::build(Vec::<String>::new());
        assert!(catalog.is_empty());
        assert_eq!(catalog.categories().count(), 0);
    }

    #[test]
    fn test_duplicates_cataloged_once() {
        let catalog = Catalog::build(["mesa-utils", "mesa-utils", "hplip"]);
        assert_eq!(catalog.packages(Category::Graphics), ["mesa-utils"]);
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_insertion_order_preserved_within_category() {
        let catalog = Catalog::build(["xserver-xorg-video-intel", "mesa-utils", "nvidia-driver"]);
        assert_eq!(
            catalog.packages(Category::Graphics),
            ["xserver-xorg-video-intel", "mesa-utils", "nvidia-driver"]
        );
    }

    #[test]
    fn test_custom_rules() {
        let rules = vec![CategoryRule {
            category: Category::Storage,
            keywords: vec!["zfs".to_string()],
        }];
        let catalog = Catalog::build_with_rules(["zfsutils-linux", "nvidia-driver"], &rules);
        assert_eq!(catalog.packages(Category::Storage), ["zfsutils-linux"]);
        assert!(!catalog.contains("nvidia-driver"));
    }

    #[test]
    fn test_iter_visits_every_package_once() {
        let catalog = Catalog::build(["alsa-base", "nvidia-driver", "cups"]);
        let all: Vec<(Category, &str)> = catalog.iter().collect();
        assert_eq!(
            all,
            vec![
                (Category::Graphics, "nvidia-driver"),
                (Category::Audio, "alsa-base"),
                (Category::Printing, "cups"),
            ]
        );
    }
}
