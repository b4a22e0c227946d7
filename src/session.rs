//! Session Orchestrator
//!
//! `Session` is the single owner of everything a front end renders: the
//! catalog, the installed and recommendation sets, the current selection and
//! filter, the in-flight operation and the status log. Front ends borrow
//! state through accessors and change it only through the request methods.
//!
//! # Operation cycle
//!
//! ```text
//! request_install / request_remove
//!     ↓  (rejected synchronously if busy or inconsistent)
//! executor thread ── Progress* ── Terminal ── [Cleanup] ──▶ channel
//!     ↓
//! poll_events / wait_for_operation
//!     ↓
//! on_operation_terminal → refresh installed set → idle
//! ```
//!
//! The catalog itself is cached between operations and only rebuilt by
//! `refresh()`.

use crate::backend::{AptBackend, HardwareProbe, LspciProbe, PackageBackend};
use crate::catalog::{Catalog, CategoryRule, default_rules};
use crate::config::DriverManagerConfig;
use crate::executor::{OperationEvent, OperationRequest, spawn_operation};
use crate::hardware::detect_recommendations;
use crate::installed::scan_installed;
use crate::operation::{Operation, OperationId, OperationResult, OperationTransitionError};
use crate::types::{Action, Category, Filter, Package};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Why a request was refused before any operation was created
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestRejection {
    /// Another operation (or its cleanup) is still running
    #[error("Another operation is in progress")]
    Busy,

    #[error("Package {0} is not in the driver catalog")]
    UnknownPackage(String),

    #[error("Package {0} is already installed")]
    AlreadyInstalled(String),

    #[error("Package {0} is not installed")]
    NotInstalled(String),
}

/// Actions currently permitted for the selected package.
///
/// `install` and `remove` are never both true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Permissions {
    pub install: bool,
    pub remove: bool,
}

/// Background worker of the in-flight operation
struct Worker {
    id: OperationId,
    events: Receiver<OperationEvent>,
    handle: Option<JoinHandle<()>>,
}

/// Driver management session state and actions
pub struct Session {
    backend: Arc<dyn PackageBackend>,
    probe: Arc<dyn HardwareProbe>,
    rules: Vec<CategoryRule>,

    catalog: Catalog,
    installed: BTreeSet<String>,
    recommended: BTreeSet<String>,
    query_failures: Vec<(String, String)>,

    selected_category: Option<Category>,
    selected_package: Option<String>,
    filter: Filter,
    visible: Vec<Package>,

    operation: Option<Operation>,
    worker: Option<Worker>,
    next_operation_id: OperationId,

    status_log: Vec<String>,
}

impl Session {
    /// Create an empty session. Call `refresh()` to load the catalog.
    pub fn new(backend: Arc<dyn PackageBackend>, probe: Arc<dyn HardwareProbe>) -> Self {
        Self::with_rules(backend, probe, default_rules())
    }

    /// Create an empty session categorizing with `rules`.
    pub fn with_rules(
        backend: Arc<dyn PackageBackend>,
        probe: Arc<dyn HardwareProbe>,
        rules: Vec<CategoryRule>,
    ) -> Self {
        Self {
            backend,
            probe,
            rules,
            catalog: Catalog::default(),
            installed: BTreeSet::new(),
            recommended: BTreeSet::new(),
            query_failures: Vec::new(),
            selected_category: None,
            selected_package: None,
            filter: Filter::All,
            visible: Vec::new(),
            operation: None,
            worker: None,
            next_operation_id: 1,
            status_log: Vec::new(),
        }
    }

    /// Session over apt/dpkg/lspci as configured, already refreshed.
    pub fn from_config(config: &DriverManagerConfig) -> Self {
        let mut session = Self::with_rules(
            Arc::new(AptBackend::new(config)),
            Arc::new(LspciProbe::new(config)),
            config.rules(),
        );
        // A fresh session has no operation, so refresh cannot be rejected
        let _ = session.refresh();
        session
    }

    // ========================================================================
    // Read-only state
    // ========================================================================

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn installed(&self) -> &BTreeSet<String> {
        &self.installed
    }

    /// Raw recommendation set; may name packages absent from the catalog.
    pub fn recommended(&self) -> &BTreeSet<String> {
        &self.recommended
    }

    /// Packages whose installed-state query failed during the last scan
    pub fn query_failures(&self) -> &[(String, String)] {
        &self.query_failures
    }

    pub fn selected_category(&self) -> Option<Category> {
        self.selected_category
    }

    pub fn selected_package(&self) -> Option<&str> {
        self.selected_package.as_deref()
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    /// Packages of the selected category after filtering
    pub fn visible_packages(&self) -> &[Package] {
        &self.visible
    }

    /// Current or last operation
    pub fn current_operation(&self) -> Option<&Operation> {
        self.operation.as_ref()
    }

    /// Human-readable history of this session, oldest first
    pub fn status_log(&self) -> &[String] {
        &self.status_log
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.installed.contains(name)
    }

    /// Recommended for display: in the recommendation set and in the catalog.
    pub fn is_recommended(&self, name: &str) -> bool {
        self.catalog.contains(name) && self.recommended.contains(name)
    }

    /// Full package entry for a cataloged name
    pub fn package(&self, name: &str) -> Option<Package> {
        self.catalog.category_of(name).map(|category| Package {
            name: name.to_string(),
            category,
            installed: self.is_installed(name),
            recommended: self.is_recommended(name),
        })
    }

    /// True while an operation is non-terminal or its worker is still running
    /// post-removal cleanup.
    pub fn is_busy(&self) -> bool {
        self.operation.as_ref().is_some_and(|op| !op.is_terminal()) || self.worker.is_some()
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Select a category and derive its visible package list.
    pub fn select_category(&mut self, category: Category) -> &[Package] {
        self.selected_category = Some(category);
        self.rebuild_visible();
        self.select_first_if_hidden();
        &self.visible
    }

    /// Change the filter and re-derive the visible list.
    pub fn set_filter(&mut self, filter: Filter) -> &[Package] {
        self.filter = filter;
        self.rebuild_visible();
        self.select_first_if_hidden();
        &self.visible
    }

    /// Select a cataloged package and report which actions it permits.
    pub fn select_package(&mut self, name: &str) -> Result<Permissions, RequestRejection> {
        if !self.catalog.contains(name) {
            return Err(RequestRejection::UnknownPackage(name.to_string()));
        }
        self.selected_package = Some(name.to_string());
        Ok(self.permissions_for(name))
    }

    /// Permissions for the current selection (nothing when nothing is selected).
    pub fn permissions(&self) -> Permissions {
        match &self.selected_package {
            Some(name) => self.permissions_for(name),
            None => Permissions::default(),
        }
    }

    /// Install iff idle and not installed; remove iff idle and installed.
    pub fn permissions_for(&self, name: &str) -> Permissions {
        if self.is_busy() || !self.catalog.contains(name) {
            return Permissions::default();
        }
        let installed = self.is_installed(name);
        Permissions {
            install: !installed,
            remove: installed,
        }
    }

    fn rebuild_visible(&mut self) {
        self.visible = match self.selected_category {
            Some(category) => self
                .catalog
                .packages(category)
                .iter()
                .filter(|name| match self.filter {
                    Filter::All => true,
                    Filter::RecommendedOnly => self.recommended.contains(name.as_str()),
                })
                .map(|name| Package {
                    name: name.clone(),
                    category,
                    installed: self.installed.contains(name.as_str()),
                    recommended: self.recommended.contains(name.as_str()),
                })
                .collect(),
            None => Vec::new(),
        };
    }

    /// Keep the selection if still visible, otherwise fall back to the first row.
    fn select_first_if_hidden(&mut self) {
        let still_visible = self
            .selected_package
            .as_deref()
            .is_some_and(|name| self.visible.iter().any(|p| p.name == name));
        if !still_visible {
            self.selected_package = self.visible.first().map(|p| p.name.clone());
        }
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Rebuild catalog, installed set and recommendation set from scratch.
    pub fn refresh(&mut self) -> Result<(), RequestRejection> {
        if self.is_busy() {
            return Err(RequestRejection::Busy);
        }

        self.log("Refreshing driver list...");

        self.catalog = match self.backend.all_package_names() {
            Ok(names) => Catalog::build_with_rules(&names, &self.rules),
            Err(e) => {
                error!("Failed to read package index: {}", e);
                self.log(format!("Error loading package index: {}", e));
                Catalog::default()
            }
        };

        if self
            .selected_category
            .is_some_and(|c| self.catalog.packages(c).is_empty())
        {
            self.selected_category = None;
        }
        if self
            .selected_package
            .as_deref()
            .is_some_and(|name| !self.catalog.contains(name))
        {
            self.selected_package = None;
        }

        self.refresh_recommendations();
        self.refresh_installed();

        info!(
            "Catalog refreshed: {} packages, {} installed, {} recommended",
            self.catalog.len(),
            self.installed.len(),
            self.recommended.len()
        );
        self.log("Driver list refreshed.");
        Ok(())
    }

    /// Re-query installed state for the cached catalog.
    pub fn refresh_installed(&mut self) {
        let scan = scan_installed(&self.catalog, self.backend.as_ref());
        for (name, err) in &scan.failures {
            self.status_log
                .push(format!("Error loading installed drivers: {}: {}", name, err));
        }
        self.installed = scan.installed;
        self.query_failures = scan.failures;
        self.rebuild_visible();
    }

    /// Re-run hardware detection.
    pub fn refresh_recommendations(&mut self) {
        self.recommended = detect_recommendations(self.probe.as_ref());
        self.rebuild_visible();
    }

    // ========================================================================
    // Operations
    // ========================================================================

    pub fn request_install(&mut self, name: &str) -> Result<OperationId, RequestRejection> {
        self.request(name, Action::Install)
    }

    pub fn request_remove(&mut self, name: &str) -> Result<OperationId, RequestRejection> {
        self.request(name, Action::Remove)
    }

    fn request(&mut self, name: &str, action: Action) -> Result<OperationId, RequestRejection> {
        if self.is_busy() {
            debug!("Rejecting {} {}: busy", action, name);
            return Err(RequestRejection::Busy);
        }
        if !self.catalog.contains(name) {
            return Err(RequestRejection::UnknownPackage(name.to_string()));
        }
        match (action, self.is_installed(name)) {
            (Action::Install, true) => {
                return Err(RequestRejection::AlreadyInstalled(name.to_string()));
            }
            (Action::Remove, false) => {
                return Err(RequestRejection::NotInstalled(name.to_string()));
            }
            _ => {}
        }

        let id = self.next_operation_id;
        self.next_operation_id += 1;

        let mut operation = Operation::new(id, name, action);
        let request = OperationRequest {
            id,
            target: name.to_string(),
            action,
        };
        let (tx, rx) = mpsc::channel();

        // Pending → Running cannot fail on a fresh operation
        let _ = operation.start();
        info!("Starting operation {}: {} {}", id, action, name);

        match spawn_operation(Arc::clone(&self.backend), request, tx) {
            Ok(handle) => {
                self.operation = Some(operation);
                self.worker = Some(Worker {
                    id,
                    events: rx,
                    handle: Some(handle),
                });
            }
            Err(e) => {
                error!("Failed to spawn operation worker: {}", e);
                self.operation = Some(operation);
                let result = OperationResult::Failed(format!("Error: {}", e));
                if let Err(e) = self.on_operation_terminal(result) {
                    warn!("Could not record spawn failure: {}", e);
                }
            }
        }

        Ok(id)
    }

    /// Record a terminal result, refresh the installed set and return to idle.
    pub fn on_operation_terminal(
        &mut self,
        result: OperationResult,
    ) -> Result<(), OperationTransitionError> {
        if let Some(operation) = self.operation.as_mut() {
            operation.finish(&result)?;
        }
        self.log(result.message().trim_end());
        self.refresh_installed();
        Ok(())
    }

    /// Drain pending events without blocking and return them in order.
    pub fn poll_events(&mut self) -> Vec<OperationEvent> {
        let mut drained = Vec::new();
        loop {
            let next = match &self.worker {
                Some(worker) => worker.events.try_recv(),
                None => break,
            };
            match next {
                Ok(event) => {
                    self.handle_event(&event);
                    drained.push(event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.finish_worker();
                    break;
                }
            }
        }
        drained
    }

    /// Block until the in-flight operation and its cleanup are done, passing
    /// each event to `on_event` as it arrives.
    pub fn wait_for_operation(&mut self, mut on_event: impl FnMut(&OperationEvent)) {
        loop {
            let next = match &self.worker {
                Some(worker) => worker.events.recv(),
                None => return,
            };
            match next {
                Ok(event) => {
                    self.handle_event(&event);
                    on_event(&event);
                }
                Err(_) => {
                    self.finish_worker();
                    return;
                }
            }
        }
    }

    fn handle_event(&mut self, event: &OperationEvent) {
        let current = self.worker.as_ref().map(|w| w.id);
        if current != Some(event.id()) {
            warn!("Ignoring event for stale operation {}", event.id());
            return;
        }

        match event {
            OperationEvent::Progress { line, .. } => {
                if let Some(op) = self.operation.as_mut() {
                    op.record_progress(line.clone());
                }
                self.log(line.clone());
            }
            OperationEvent::Terminal { result, .. } => {
                if let Err(e) = self.on_operation_terminal(result.clone()) {
                    warn!("Unexpected terminal event: {}", e);
                }
            }
            OperationEvent::CleanupStarted { .. } => {
                self.log("Running apt-get autoremove --purge...");
            }
            OperationEvent::Cleanup { report, .. } => {
                if let Some(op) = self.operation.as_mut() {
                    op.record_cleanup(report.clone());
                }
                self.log(report.message.clone());
            }
        }
    }

    /// Join the finished worker; a worker that died before reporting a
    /// terminal result fails the operation.
    fn finish_worker(&mut self) {
        let Some(mut worker) = self.worker.take() else {
            return;
        };
        if let Some(handle) = worker.handle.take() {
            if handle.join().is_err() {
                error!("Operation worker {} panicked", worker.id);
            }
        }

        // Autoremove may have purged cataloged packages after the terminal refresh
        if self.operation.as_ref().is_some_and(|op| op.cleanup().is_some()) {
            self.refresh_installed();
        }

        let unfinished = self.operation.as_ref().is_some_and(|op| !op.is_terminal());
        if unfinished {
            let result =
                OperationResult::Failed("Error: operation worker exited unexpectedly".to_string());
            if let Err(e) = self.on_operation_terminal(result) {
                warn!("Could not record worker failure: {}", e);
            }
        }
        debug!("Operation {} complete, session idle", worker.id);
    }

    fn log(&mut self, line: impl Into<String>) {
        self.status_log.push(line.into());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Never abandon a running package manager
        if let Some(worker) = self.worker.take() {
            if let Some(handle) = worker.handle {
                let _ = handle.join();
            }
        }
    }
}
