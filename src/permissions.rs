use std::collections::HashMap;

use tracing::debug;

/// Permissions the legacy storage model needs before touching the shared folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ReadSharedStorage,
    WriteSharedStorage,
}

/// Platform permission surface, owned by the hosting application.
pub trait PermissionGate: Send + Sync {
    fn is_granted(&self, permission: Permission) -> bool;
}

/// The logical operation suspended while a permission request is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    CreateBackup,
    ListBackups,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// All required permissions are held (or the platform does not require
    /// them); run the action now.
    Proceed,
    /// The listed permissions were queued; the caller must surface the
    /// platform's request UI and report back via
    /// [`PermissionCoordinator::on_result`].
    Requested(Vec<Permission>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Every queued permission was granted; re-invoke the suspended action.
    Resume(PendingAction),
    /// At least one permission was denied. The queue is cleared and there is
    /// no automatic retry.
    Denied,
    /// No request was in flight.
    NothingPending,
}

/// Queues required permissions, suspends the requested operation until the
/// user resolves them, and resumes or aborts it based on the result.
#[derive(Debug, Default)]
pub struct PermissionCoordinator {
    require_legacy_permissions: bool,
    queue: Vec<Permission>,
    pending: Option<PendingAction>,
}

impl PermissionCoordinator {
    pub fn new(require_legacy_permissions: bool) -> Self {
        Self {
            require_legacy_permissions,
            queue: Vec::new(),
            pending: None,
        }
    }

    pub fn pending_permissions(&self) -> &[Permission] {
        &self.queue
    }

    /// Decides whether `action` can run now or must wait on a grant.
    ///
    /// Scoped-storage platforms access the app's own shared objects without
    /// explicit permissions, so the action proceeds immediately there. While
    /// a request is already in flight, further calls keep the first suspended
    /// action and re-surface the outstanding queue.
    pub fn ensure(
        &mut self,
        gate: &dyn PermissionGate,
        permissions: &[Permission],
        action: PendingAction,
    ) -> EnsureOutcome {
        if !self.require_legacy_permissions {
            return EnsureOutcome::Proceed;
        }
        if let Some(pending) = self.pending {
            debug!(?pending, ?action, "permission request already in flight");
            return EnsureOutcome::Requested(self.queue.clone());
        }
        let missing: Vec<Permission> = permissions
            .iter()
            .copied()
            .filter(|permission| !gate.is_granted(*permission))
            .collect();
        if missing.is_empty() {
            return EnsureOutcome::Proceed;
        }
        debug!(?missing, ?action, "queueing permission request");
        self.queue = missing.clone();
        self.pending = Some(action);
        EnsureOutcome::Requested(missing)
    }

    /// Applies the platform's grant results to the queued request.
    pub fn on_result(&mut self, grants: &HashMap<Permission, bool>) -> ResolveOutcome {
        // The queue is cleared regardless of the outcome.
        let queue = std::mem::take(&mut self.queue);
        let pending = self.pending.take();
        if queue.is_empty() {
            return ResolveOutcome::NothingPending;
        }
        let all_granted = queue
            .iter()
            .all(|permission| grants.get(permission).copied().unwrap_or(false));
        match (all_granted, pending) {
            (true, Some(action)) => ResolveOutcome::Resume(action),
            _ => ResolveOutcome::Denied,
        }
    }

    /// Drops any queued request, e.g. when the user dismissed the prompt.
    pub fn dismiss(&mut self) {
        self.queue.clear();
        self.pending = None;
    }
}
