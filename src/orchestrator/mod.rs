//! Session orchestration for the backup subsystem.
//!
//! [`Orchestrator::handle`] is a pure transition over owned state: it maps
//! one event to a new [`SessionState`] plus a list of [`Effect`]s and never
//! performs I/O itself. Blocking work is described by [`Task`] values; the
//! host runs each one on a background worker via [`BackupWorker::execute`]
//! and feeds the returned completion event back in. There is no concurrent
//! execution within one task, and destructive operations are single-flight.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tracing::debug;

use crate::{
    backup::{
        BackupCatalog, BackupDeleter, BackupItem, BackupWriter, DeleteOutcome, RestoreExecutor,
    },
    database::DatabaseHandle,
    errors::BackupError,
    permissions::{
        EnsureOutcome, PendingAction, Permission, PermissionCoordinator, PermissionGate,
        ResolveOutcome,
    },
    storage::{ConsentIntent, StorageProvider},
};

/// Where the session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    BackingUp,
    Listing,
    AwaitingSelection,
    AwaitingRestoreConfirmation,
    Restoring,
    AwaitingPostRestore,
}

/// Snapshot of the orchestrator's state, republished to the UI after every
/// event.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub phase: Phase,
    /// `None` until the first listing completes; an empty `Some` is a valid
    /// terminal listing result.
    pub available_backups: Option<Vec<BackupItem>>,
    /// Set only from the restore-confirmation phase onward.
    pub selected: Option<BackupItem>,
    pub pending_permissions: Vec<Permission>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            available_backups: None,
            selected: None,
            pending_permissions: Vec::new(),
        }
    }
}

/// User intents and worker completions driving the session.
#[derive(Debug)]
pub enum BackupEvent {
    CreateBackup,
    ViewBackups,
    Select(BackupItem),
    Delete(BackupItem),
    ConfirmRestore,
    CancelRestore,
    DismissSelection,
    DismissPostRestore,
    PermissionsResult(HashMap<Permission, bool>),
    PermissionsDismissed,
    ConsentResult {
        intent: ConsentIntent,
        item: BackupItem,
        granted: bool,
    },
    BackupFinished(Result<BackupItem, BackupError>),
    BackupsLoaded(Vec<BackupItem>),
    RestoreFinished(Result<(), BackupError>),
    DeleteFinished {
        item: BackupItem,
        outcome: Result<DeleteOutcome, BackupError>,
    },
    ConsentDeleteFinished {
        item: BackupItem,
        result: Result<(), BackupError>,
    },
}

/// One discrete background task; each runs to completion on a worker and
/// reports back as a single event.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    Backup,
    LoadBackups,
    Restore(BackupItem),
    Delete(BackupItem),
    FinishConsentDelete {
        intent: ConsentIntent,
        item: BackupItem,
    },
}

/// One-shot side effects for the host to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Transient toast/snackbar-style message.
    ShowMessage(String),
    /// Surface the platform's permission-request UI for these permissions.
    RequestPermissions(Vec<Permission>),
    /// Launch the system delete-consent UI; the outcome returns as
    /// [`BackupEvent::ConsentResult`].
    LaunchConsent {
        intent: ConsentIntent,
        item: BackupItem,
    },
    /// Run this task on a background worker and feed the completion event
    /// back in.
    Spawn(Task),
}

/// Sequences the backup components in response to user intents.
pub struct Orchestrator {
    state: SessionState,
    coordinator: PermissionCoordinator,
    gate: Arc<dyn PermissionGate>,
}

impl Orchestrator {
    pub fn new(gate: Arc<dyn PermissionGate>, require_legacy_permissions: bool) -> Self {
        Self {
            state: SessionState::default(),
            coordinator: PermissionCoordinator::new(require_legacy_permissions),
            gate,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Applies one event and returns the effects the host must execute.
    pub fn handle(&mut self, event: BackupEvent) -> Vec<Effect> {
        match event {
            BackupEvent::CreateBackup => self.on_create_backup(),
            BackupEvent::ViewBackups => self.on_view_backups(),
            BackupEvent::Select(item) => self.on_select(item),
            BackupEvent::Delete(item) => vec![Effect::Spawn(Task::Delete(item))],
            BackupEvent::ConfirmRestore => self.on_confirm_restore(),
            BackupEvent::CancelRestore => self.on_cancel_restore(),
            BackupEvent::DismissSelection => {
                if self.state.phase == Phase::AwaitingSelection {
                    self.state.phase = Phase::Idle;
                }
                Vec::new()
            }
            BackupEvent::DismissPostRestore => {
                if self.state.phase == Phase::AwaitingPostRestore {
                    self.state.phase = Phase::Idle;
                }
                Vec::new()
            }
            BackupEvent::PermissionsResult(grants) => self.on_permissions_result(&grants),
            BackupEvent::PermissionsDismissed => {
                self.coordinator.dismiss();
                self.state.pending_permissions.clear();
                vec![Effect::ShowMessage("Permissions required to proceed.".into())]
            }
            BackupEvent::ConsentResult {
                intent,
                item,
                granted,
            } => {
                if granted {
                    vec![Effect::Spawn(Task::FinishConsentDelete { intent, item })]
                } else {
                    vec![Effect::ShowMessage(format!(
                        "Could not delete '{}'.",
                        item.name
                    ))]
                }
            }
            BackupEvent::BackupFinished(result) => self.on_backup_finished(result),
            BackupEvent::BackupsLoaded(items) => self.on_backups_loaded(items),
            BackupEvent::RestoreFinished(result) => self.on_restore_finished(result),
            BackupEvent::DeleteFinished { item, outcome } => {
                self.on_delete_finished(item, outcome)
            }
            BackupEvent::ConsentDeleteFinished { item, result } => {
                match result {
                    Ok(()) => self.remove_listed(&item),
                    Err(err) => {
                        debug!(%err, "consent-mediated delete failed");
                        vec![Effect::ShowMessage(format!(
                            "Could not delete '{}'.",
                            item.name
                        ))]
                    }
                }
            }
        }
    }

    fn destructive_operation_in_flight(&self) -> bool {
        matches!(self.state.phase, Phase::BackingUp | Phase::Restoring)
    }

    fn on_create_backup(&mut self) -> Vec<Effect> {
        // Single-flight: a second CreateBackup while one is running is
        // ignored without touching state.
        if self.destructive_operation_in_flight() {
            debug!("ignoring CreateBackup while an operation is in flight");
            return Vec::new();
        }
        match self.coordinator.ensure(
            self.gate.as_ref(),
            &[Permission::WriteSharedStorage],
            PendingAction::CreateBackup,
        ) {
            EnsureOutcome::Proceed => self.start_backup(),
            EnsureOutcome::Requested(permissions) => {
                self.state.pending_permissions = permissions.clone();
                vec![Effect::RequestPermissions(permissions)]
            }
        }
    }

    fn on_view_backups(&mut self) -> Vec<Effect> {
        if self.destructive_operation_in_flight() {
            debug!("ignoring ViewBackups while an operation is in flight");
            return Vec::new();
        }
        match self.coordinator.ensure(
            self.gate.as_ref(),
            &[Permission::ReadSharedStorage],
            PendingAction::ListBackups,
        ) {
            EnsureOutcome::Proceed => self.start_listing(),
            EnsureOutcome::Requested(permissions) => {
                self.state.pending_permissions = permissions.clone();
                vec![Effect::RequestPermissions(permissions)]
            }
        }
    }

    fn start_backup(&mut self) -> Vec<Effect> {
        self.state.phase = Phase::BackingUp;
        vec![Effect::Spawn(Task::Backup)]
    }

    fn start_listing(&mut self) -> Vec<Effect> {
        self.state.phase = Phase::Listing;
        vec![Effect::Spawn(Task::LoadBackups)]
    }

    fn on_select(&mut self, item: BackupItem) -> Vec<Effect> {
        if self.destructive_operation_in_flight() {
            return Vec::new();
        }
        self.state.selected = Some(item);
        self.state.phase = Phase::AwaitingRestoreConfirmation;
        Vec::new()
    }

    fn on_confirm_restore(&mut self) -> Vec<Effect> {
        if self.state.phase != Phase::AwaitingRestoreConfirmation {
            debug!("ignoring ConfirmRestore outside the confirmation phase");
            return Vec::new();
        }
        let item = match self.state.selected.clone() {
            Some(item) => item,
            None => return Vec::new(),
        };
        self.state.phase = Phase::Restoring;
        vec![Effect::Spawn(Task::Restore(item))]
    }

    fn on_cancel_restore(&mut self) -> Vec<Effect> {
        if self.state.phase != Phase::AwaitingRestoreConfirmation {
            return Vec::new();
        }
        self.state.selected = None;
        self.state.phase = match &self.state.available_backups {
            Some(items) if !items.is_empty() => Phase::AwaitingSelection,
            _ => Phase::Idle,
        };
        Vec::new()
    }

    fn on_permissions_result(&mut self, grants: &HashMap<Permission, bool>) -> Vec<Effect> {
        self.state.pending_permissions.clear();
        match self.coordinator.on_result(grants) {
            ResolveOutcome::Resume(PendingAction::CreateBackup) => self.start_backup(),
            ResolveOutcome::Resume(PendingAction::ListBackups) => self.start_listing(),
            ResolveOutcome::Denied => vec![Effect::ShowMessage(
                "Required permissions were not granted.".into(),
            )],
            ResolveOutcome::NothingPending => Vec::new(),
        }
    }

    fn on_backup_finished(&mut self, result: Result<BackupItem, BackupError>) -> Vec<Effect> {
        self.state.phase = Phase::Idle;
        match result {
            Ok(item) => {
                debug!(name = %item.name, "backup task finished");
                vec![Effect::ShowMessage("Backup created successfully.".into())]
            }
            Err(err) => vec![Effect::ShowMessage(format!("Backup failed: {err}"))],
        }
    }

    fn on_backups_loaded(&mut self, items: Vec<BackupItem>) -> Vec<Effect> {
        let empty = items.is_empty();
        self.state.available_backups = Some(items);
        if empty {
            self.state.phase = Phase::Idle;
            vec![Effect::ShowMessage("No backups found.".into())]
        } else {
            self.state.phase = Phase::AwaitingSelection;
            Vec::new()
        }
    }

    fn on_restore_finished(&mut self, result: Result<(), BackupError>) -> Vec<Effect> {
        self.state.selected = None;
        match result {
            Ok(()) => {
                self.state.phase = Phase::AwaitingPostRestore;
                vec![Effect::ShowMessage(
                    "Database restored. Restart the application before resuming use.".into(),
                )]
            }
            Err(err) => {
                self.state.phase = Phase::Idle;
                vec![Effect::ShowMessage(format!("Database restore failed: {err}"))]
            }
        }
    }

    fn on_delete_finished(
        &mut self,
        item: BackupItem,
        outcome: Result<DeleteOutcome, BackupError>,
    ) -> Vec<Effect> {
        match outcome {
            Ok(DeleteOutcome::Deleted) => self.remove_listed(&item),
            Ok(DeleteOutcome::ConsentRequired(intent)) => {
                vec![Effect::LaunchConsent { intent, item }]
            }
            Err(err) => vec![Effect::ShowMessage(format!("Error deleting backup: {err}"))],
        }
    }

    /// Drops a deleted item from the listing and collapses the selection
    /// phase if the list just emptied.
    fn remove_listed(&mut self, item: &BackupItem) -> Vec<Effect> {
        if let Some(items) = &mut self.state.available_backups {
            items.retain(|listed| listed.handle != item.handle);
            if items.is_empty() && self.state.phase == Phase::AwaitingSelection {
                self.state.phase = Phase::Idle;
            }
        }
        vec![Effect::ShowMessage(format!(
            "Backup '{}' deleted.",
            item.name
        ))]
    }
}

/// Executes one [`Task`] at a time against the real components.
///
/// Intended to run on a background worker thread; every call blocks on file
/// or database I/O and returns the completion event for the orchestrator.
pub struct BackupWorker {
    writer: BackupWriter,
    catalog: BackupCatalog,
    deleter: BackupDeleter,
    restorer: RestoreExecutor,
    database: Arc<Mutex<Box<dyn DatabaseHandle>>>,
}

impl BackupWorker {
    pub fn new(
        provider: Arc<dyn StorageProvider>,
        database: Arc<Mutex<Box<dyn DatabaseHandle>>>,
        database_name: &str,
    ) -> Self {
        Self {
            writer: BackupWriter::new(provider.clone(), database_name),
            catalog: BackupCatalog::new(provider.clone(), database_name),
            deleter: BackupDeleter::new(provider.clone()),
            restorer: RestoreExecutor::new(provider),
            database,
        }
    }

    pub fn execute(&self, task: Task) -> BackupEvent {
        match task {
            Task::Backup => {
                let db = self.database.lock().expect("database lock poisoned");
                BackupEvent::BackupFinished(self.writer.create_backup(&**db))
            }
            Task::LoadBackups => BackupEvent::BackupsLoaded(self.catalog.list_backups()),
            Task::Restore(item) => {
                let mut db = self.database.lock().expect("database lock poisoned");
                BackupEvent::RestoreFinished(self.restorer.restore(&mut **db, &item))
            }
            Task::Delete(item) => {
                let outcome = self.deleter.delete(&item);
                BackupEvent::DeleteFinished { item, outcome }
            }
            Task::FinishConsentDelete { intent, item } => {
                let result = self.deleter.resolve_consent(&intent, true);
                BackupEvent::ConsentDeleteFinished { item, result }
            }
        }
    }
}
