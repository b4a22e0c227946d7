//! Installed-State Tracker
//!
//! Asks the package database, package by package, which cataloged packages
//! are installed. A failing query marks only that package as not installed;
//! the failure is kept for diagnostics and the scan carries on.

use crate::backend::InstalledQuery;
use crate::catalog::Catalog;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Result of one installed-state scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledScan {
    /// Cataloged packages currently installed
    pub installed: BTreeSet<String>,
    /// Packages whose query failed, with the error text
    pub failures: Vec<(String, String)>,
}

impl InstalledScan {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Scan `catalog` against `query`. Read-only; safe to repeat.
pub fn scan_installed<Q>(catalog: &Catalog, query: &Q) -> InstalledScan
where
    Q: InstalledQuery + ?Sized,
{
    let mut scan = InstalledScan::default();

    for (_, name) in catalog.iter() {
        match query.is_installed(name) {
            Ok(true) => {
                scan.installed.insert(name.to_string());
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Installed-state query failed for {}: {}", name, e);
                scan.failures.push((name.to_string(), e.to_string()));
            }
        }
    }

    debug!(
        "Installed-state scan: {} of {} packages installed, {} query failures",
        scan.installed.len(),
        catalog.len(),
        scan.failures.len()
    );

    scan
}
