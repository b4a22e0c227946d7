//! Shared domain types
//!
//! Categories, actions and filters are proper enums rather than strings so
//! that matching is exhaustive and parsing happens once at the edges.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Driver package category.
///
/// Declaration order is the display order and the priority order used by the
/// catalog rules, so `Ord` is derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum Category {
    Graphics,
    Network,
    Audio,
    Printing,
    Storage,
    Other,
}

/// Package manager action requested for a single package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    Install,
    Remove,
}

impl Action {
    /// Present participle used in progress messages ("Installing nvidia-driver...")
    pub const fn progressive(self) -> &'static str {
        match self {
            Self::Install => "Installing",
            Self::Remove => "Removing",
        }
    }

    /// Past tense used in success messages ("Successfully installed nvidia-driver")
    pub const fn past_tense(self) -> &'static str {
        match self {
            Self::Install => "installed",
            Self::Remove => "removed",
        }
    }
}

/// Filter applied to the visible package list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum Filter {
    #[default]
    #[strum(serialize = "all")]
    All,
    #[strum(serialize = "recommended")]
    RecommendedOnly,
}

/// A cataloged package with its last known flags.
///
/// Flags are the source of truth; any label shown to the user is derived from
/// them via `status_label`, never parsed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub category: Category,
    pub installed: bool,
    pub recommended: bool,
}

impl Package {
    /// Human-readable list entry, e.g. `★ ✓ nvidia-driver (Installed)` or `○ cups`
    pub fn status_label(&self) -> String {
        let star = if self.recommended { "★ " } else { "" };
        if self.installed {
            format!("{}✓ {} (Installed)", star, self.name)
        } else {
            format!("{}○ {}", star, self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_category_order_matches_priority() {
        let order: Vec<Category> = Category::iter().collect();
        assert_eq!(
            order,
            vec![
                Category::Graphics,
                Category::Network,
                Category::Audio,
                Category::Printing,
                Category::Storage,
                Category::Other,
            ]
        );
        assert!(Category::Graphics < Category::Other);
    }

    #[test]
    fn test_category_parse_is_case_insensitive() {
        assert_eq!("graphics".parse::<Category>().unwrap(), Category::Graphics);
        assert_eq!("AUDIO".parse::<Category>().unwrap(), Category::Audio);
        assert!("video".parse::<Category>().is_err());
    }

    #[test]
    fn test_action_wording() {
        assert_eq!(Action::Install.to_string(), "install");
        assert_eq!(Action::Remove.progressive(), "Removing");
        assert_eq!(Action::Install.past_tense(), "installed");
    }

    #[test]
    fn test_filter_parse() {
        assert_eq!("recommended".parse::<Filter>().unwrap(), Filter::RecommendedOnly);
        assert_eq!(Filter::default(), Filter::All);
    }

    #[test]
    fn test_status_label_derived_from_flags() {
        let mut pkg = Package {
            name: "nvidia-driver".to_string(),
            category: Category::Graphics,
            installed: false,
            recommended: false,
        };
        assert_eq!(pkg.status_label(), "○ nvidia-driver");

        pkg.recommended = true;
        assert_eq!(pkg.status_label(), "★ ○ nvidia-driver");

        pkg.installed = true;
        assert_eq!(pkg.status_label(), "★ ✓ nvidia-driver (Installed)");
    }
}
