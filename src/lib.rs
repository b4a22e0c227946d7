//! drivermgr library
//!
//! Core engine for managing hardware driver packages on Debian-based
//! systems: catalog construction, installed-state tracking, hardware-based
//! recommendation and the install/remove operation lifecycle.

pub mod backend;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod hardware;
pub mod installed;
pub mod operation;
pub mod process_guard;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use backend::{
    AptBackend, CommandOutput, HardwareProbe, InstalledQuery, LspciProbe, PackageBackend,
    PackageCommand,
};
pub use catalog::{Catalog, CategoryRule};
pub use config::DriverManagerConfig;
pub use error::{DriverManagerError, Result};
pub use executor::{OperationEvent, OperationRequest};
pub use hardware::{DeviceClass, HardwareDevice, Vendor, recommend};
pub use installed::{InstalledScan, scan_installed};
pub use operation::{CleanupReport, Operation, OperationId, OperationResult, OperationState};
pub use session::{Permissions, RequestRejection, Session};
pub use types::{Action, Category, Filter, Package};
