mod common;

use std::{
    collections::HashMap,
    fs,
    path::Path,
    sync::{Arc, Mutex},
};

use backup_core::{
    database::DatabaseHandle,
    orchestrator::{BackupEvent, BackupWorker, Effect, Orchestrator, Phase, Task},
    permissions::Permission,
    storage::{ManagedStorage, StorageProvider},
};

use common::{setup_test_dir, FakeDatabase, StaticGate};

struct Harness {
    orchestrator: Orchestrator,
    worker: BackupWorker,
}

impl Harness {
    fn new(shared_dir: &Path, db: FakeDatabase, legacy: bool, gate: StaticGate) -> Self {
        let provider: Arc<dyn StorageProvider> = Arc::new(
            ManagedStorage::new(shared_dir.to_path_buf(), "bookkeeper", true)
                .expect("create managed storage"),
        );
        let database: Arc<Mutex<Box<dyn DatabaseHandle>>> = Arc::new(Mutex::new(Box::new(db)));
        Self {
            orchestrator: Orchestrator::new(Arc::new(gate), legacy),
            worker: BackupWorker::new(provider, database, "accounts.db"),
        }
    }

    /// Feeds one event through the orchestrator, executing spawned tasks on
    /// the worker and feeding their completions back in until quiescent.
    /// Returns every non-task effect in order.
    fn drive(&mut self, event: BackupEvent) -> Vec<Effect> {
        let mut surfaced = Vec::new();
        let mut queue = vec![event];
        while let Some(next) = queue.pop() {
            for effect in self.orchestrator.handle(next) {
                match effect {
                    Effect::Spawn(task) => queue.push(self.worker.execute(task)),
                    other => surfaced.push(other),
                }
            }
        }
        surfaced
    }

    fn messages(&mut self, event: BackupEvent) -> Vec<String> {
        self.drive(event)
            .into_iter()
            .filter_map(|effect| match effect {
                Effect::ShowMessage(message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

#[test]
fn full_backup_list_restore_flow() {
    let data_dir = setup_test_dir();
    let shared_dir = setup_test_dir();
    let db = FakeDatabase::create(&data_dir, "accounts.db", b"entries-v1");
    let primary = data_dir.join("accounts.db");
    let mut harness = Harness::new(&shared_dir, db, false, StaticGate::denying_all());

    let messages = harness.messages(BackupEvent::CreateBackup);
    assert_eq!(messages, vec!["Backup created successfully.".to_string()]);
    assert_eq!(harness.orchestrator.state().phase, Phase::Idle);

    // Mutate the live database, then restore the earlier snapshot.
    fs::write(&primary, b"entries-v2").expect("mutate primary");

    harness.drive(BackupEvent::ViewBackups);
    let state = harness.orchestrator.state();
    assert_eq!(state.phase, Phase::AwaitingSelection);
    let listed = state
        .available_backups
        .clone()
        .expect("backups were loaded");
    assert_eq!(listed.len(), 1);

    harness.drive(BackupEvent::Select(listed[0].clone()));
    let messages = harness.messages(BackupEvent::ConfirmRestore);
    assert_eq!(
        messages,
        vec!["Database restored. Restart the application before resuming use.".to_string()]
    );
    assert_eq!(harness.orchestrator.state().phase, Phase::AwaitingPostRestore);
    assert_eq!(fs::read(&primary).expect("read primary"), b"entries-v1");
}

#[test]
fn create_backup_is_ignored_while_backing_up() {
    let data_dir = setup_test_dir();
    let shared_dir = setup_test_dir();
    let db = FakeDatabase::create(&data_dir, "accounts.db", b"entries");
    let mut harness = Harness::new(&shared_dir, db, false, StaticGate::denying_all());

    // Enter the backing-up phase without running the spawned task yet.
    let effects = harness.orchestrator.handle(BackupEvent::CreateBackup);
    assert_eq!(effects, vec![Effect::Spawn(Task::Backup)]);
    assert_eq!(harness.orchestrator.state().phase, Phase::BackingUp);

    // A second intent spawns nothing and changes nothing.
    let effects = harness.orchestrator.handle(BackupEvent::CreateBackup);
    assert!(effects.is_empty());
    assert_eq!(harness.orchestrator.state().phase, Phase::BackingUp);
}

#[test]
fn legacy_platform_suspends_backup_until_permissions_granted() {
    let data_dir = setup_test_dir();
    let shared_dir = setup_test_dir();
    let db = FakeDatabase::create(&data_dir, "accounts.db", b"entries");
    let mut harness = Harness::new(&shared_dir, db, true, StaticGate::denying_all());

    let effects = harness.drive(BackupEvent::CreateBackup);
    assert_eq!(
        effects,
        vec![Effect::RequestPermissions(vec![
            Permission::WriteSharedStorage
        ])]
    );
    let state = harness.orchestrator.state();
    assert_eq!(state.phase, Phase::Idle);
    assert_eq!(
        state.pending_permissions,
        vec![Permission::WriteSharedStorage]
    );

    let grants = HashMap::from([(Permission::WriteSharedStorage, true)]);
    let messages = harness.messages(BackupEvent::PermissionsResult(grants));
    assert_eq!(messages, vec!["Backup created successfully.".to_string()]);
    assert!(harness
        .orchestrator
        .state()
        .pending_permissions
        .is_empty());
}

#[test]
fn legacy_platform_with_granted_permissions_proceeds_immediately() {
    let data_dir = setup_test_dir();
    let shared_dir = setup_test_dir();
    let db = FakeDatabase::create(&data_dir, "accounts.db", b"entries");
    let gate = StaticGate::allowing(vec![Permission::WriteSharedStorage]);
    let mut harness = Harness::new(&shared_dir, db, true, gate);

    let messages = harness.messages(BackupEvent::CreateBackup);
    assert_eq!(messages, vec!["Backup created successfully.".to_string()]);
    assert!(harness
        .orchestrator
        .state()
        .pending_permissions
        .is_empty());
}

#[test]
fn denied_permissions_abort_without_retry() {
    let data_dir = setup_test_dir();
    let shared_dir = setup_test_dir();
    let db = FakeDatabase::create(&data_dir, "accounts.db", b"entries");
    let mut harness = Harness::new(&shared_dir, db, true, StaticGate::denying_all());

    harness.drive(BackupEvent::ViewBackups);
    let grants = HashMap::from([(Permission::ReadSharedStorage, false)]);
    let messages = harness.messages(BackupEvent::PermissionsResult(grants));
    assert_eq!(
        messages,
        vec!["Required permissions were not granted.".to_string()]
    );
    assert_eq!(harness.orchestrator.state().phase, Phase::Idle);
    assert!(harness.orchestrator.state().available_backups.is_none());
}

#[test]
fn empty_listing_reports_no_backups() {
    let data_dir = setup_test_dir();
    let shared_dir = setup_test_dir();
    let db = FakeDatabase::create(&data_dir, "accounts.db", b"entries");
    let mut harness = Harness::new(&shared_dir, db, false, StaticGate::denying_all());

    let messages = harness.messages(BackupEvent::ViewBackups);
    assert_eq!(messages, vec!["No backups found.".to_string()]);
    let state = harness.orchestrator.state();
    assert_eq!(state.phase, Phase::Idle);
    assert_eq!(state.available_backups, Some(Vec::new()));
}

#[test]
fn deleting_a_foreign_backup_goes_through_consent() {
    let data_dir = setup_test_dir();
    let shared_dir = setup_test_dir();

    // Seed a backup owned by another identity so deletion is consent-mediated.
    {
        let foreign = ManagedStorage::new(shared_dir.clone(), "other-app", true)
            .expect("foreign storage");
        foreign
            .insert(
                "backup_accounts.db_20240101_080000.db",
                "application/octet-stream",
            )
            .expect("insert foreign backup");
    }

    let db = FakeDatabase::create(&data_dir, "accounts.db", b"entries");
    let mut harness = Harness::new(&shared_dir, db, false, StaticGate::denying_all());

    harness.drive(BackupEvent::ViewBackups);
    let item = harness
        .orchestrator
        .state()
        .available_backups
        .clone()
        .expect("backups were loaded")
        .remove(0);

    // Consent is requested before any direct-delete attempt.
    let effects = harness.drive(BackupEvent::Delete(item.clone()));
    let (intent, item) = match effects.as_slice() {
        [Effect::LaunchConsent { intent, item }] => (intent.clone(), item.clone()),
        other => panic!("expected a consent launch, got {other:?}"),
    };

    let messages = harness.messages(BackupEvent::ConsentResult {
        intent,
        item: item.clone(),
        granted: true,
    });
    assert_eq!(messages, vec![format!("Backup '{}' deleted.", item.name)]);
    assert_eq!(
        harness.orchestrator.state().available_backups,
        Some(Vec::new())
    );
    // The selection phase collapsed once the list emptied.
    assert_eq!(harness.orchestrator.state().phase, Phase::Idle);
}
