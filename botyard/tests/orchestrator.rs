//! Orchestrator behaviour against the SQLite store and an in-memory runtime.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use botyard::runtime::{ContainerSpec, LogStream};
use botyard::{
    BotMessage, BotPayload, BotyardError, BotyardResult, ContainerRecord, ContainerState,
    ContainersRepository, Database, DispatchOutcome, ExecutorSettings, MessageKind,
    NewContainerRecord, Orchestrator, OwnerKey, RuntimeClient, RuntimeStatus,
    SqliteContainersRepository,
};

/// Runtime double: containers live in a map, every call is recorded.
#[derive(Default)]
struct FakeRuntime {
    calls: Mutex<Vec<String>>,
    containers: Mutex<HashMap<String, bool>>,
    specs: Mutex<Vec<ContainerSpec>>,
    failing_stops: Mutex<HashSet<String>>,
    failing_starts: Mutex<HashSet<String>>,
    next_id: AtomicUsize,
    create_delay: Option<Duration>,
}

impl FakeRuntime {
    fn with_create_delay(delay: Duration) -> Self {
        Self {
            create_delay: Some(delay),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn count(&self, op: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.starts_with(op)).count()
    }

    fn is_running(&self, id: &str) -> bool {
        self.containers.lock().get(id).copied().unwrap_or(false)
    }

    /// Simulate the container being removed out of band.
    fn forget(&self, id: &str) {
        self.containers.lock().remove(id);
    }

    fn fail_stop(&self, id: &str) {
        self.failing_stops.lock().insert(id.to_string());
    }

    fn fail_start(&self, id: &str) {
        self.failing_starts.lock().insert(id.to_string());
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl RuntimeClient for FakeRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> BotyardResult<String> {
        self.record(format!("create {}", spec.name));
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        let id = format!("ctr-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.containers.lock().insert(id.clone(), false);
        self.specs.lock().push(spec.clone());
        Ok(id)
    }

    async fn start_container(&self, runtime_id: &str) -> BotyardResult<()> {
        self.record(format!("start {}", runtime_id));
        if self.failing_starts.lock().contains(runtime_id) {
            return Err(BotyardError::Runtime(format!("start {} refused", runtime_id)));
        }
        match self.containers.lock().get_mut(runtime_id) {
            Some(running) => {
                *running = true;
                Ok(())
            }
            None => Err(BotyardError::NoSuchContainer(runtime_id.to_string())),
        }
    }

    async fn stop_container(&self, runtime_id: &str, _timeout: Duration) -> BotyardResult<()> {
        self.record(format!("stop {}", runtime_id));
        if self.failing_stops.lock().contains(runtime_id) {
            return Err(BotyardError::Runtime(format!("stop {} refused", runtime_id)));
        }
        match self.containers.lock().get_mut(runtime_id) {
            Some(running) => {
                *running = false;
                Ok(())
            }
            None => Err(BotyardError::NoSuchContainer(runtime_id.to_string())),
        }
    }

    async fn inspect_container(&self, runtime_id: &str) -> BotyardResult<RuntimeStatus> {
        let running = self
            .containers
            .lock()
            .get(runtime_id)
            .copied()
            .ok_or_else(|| BotyardError::NoSuchContainer(runtime_id.to_string()))?;
        Ok(RuntimeStatus {
            id: runtime_id.to_string(),
            status: if running { "running" } else { "exited" }.to_string(),
            running,
        })
    }

    async fn stream_logs(&self, runtime_id: &str) -> BotyardResult<LogStream> {
        self.record(format!("logs {}", runtime_id));
        let line = format!("[{}] bot online\n", runtime_id).into_bytes();
        Ok(futures::stream::iter(vec![Ok(line)]).boxed())
    }

    async fn pull_image(&self, image: &str) -> BotyardResult<()> {
        self.record(format!("pull {}", image));
        Ok(())
    }
}

/// Store decorator that logs every call before delegating to SQLite.
struct RecordingRepo {
    inner: SqliteContainersRepository,
    calls: Mutex<Vec<String>>,
}

impl RecordingRepo {
    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ContainersRepository for RecordingRepo {
    async fn find_by_id(&self, id: i64) -> BotyardResult<ContainerRecord> {
        self.record(format!("find_by_id {}", id));
        self.inner.find_by_id(id).await
    }

    async fn find_by_runtime_id(&self, runtime_id: &str) -> BotyardResult<ContainerRecord> {
        self.record(format!("find_by_runtime_id {}", runtime_id));
        self.inner.find_by_runtime_id(runtime_id).await
    }

    async fn find_by_owner_key(&self, owner: &OwnerKey) -> BotyardResult<ContainerRecord> {
        self.record(format!("find_by_owner_key {}", owner));
        self.inner.find_by_owner_key(owner).await
    }

    async fn list_all(&self) -> BotyardResult<Vec<ContainerRecord>> {
        self.record("list_all".to_string());
        self.inner.list_all().await
    }

    async fn create(&self, record: &NewContainerRecord) -> BotyardResult<i64> {
        self.record(format!("create {}", record.runtime_container_id));
        self.inner.create(record).await
    }

    async fn set_state(&self, state: ContainerState, id: i64) -> BotyardResult<()> {
        self.record(format!("set_state {} {}", state, id));
        self.inner.set_state(state, id).await
    }

    async fn stop_state(&self, id: i64, bot_id: i64) -> BotyardResult<()> {
        self.record(format!("stop_state {} {}", id, bot_id));
        self.inner.stop_state(id, bot_id).await
    }

    async fn delete_by_id(&self, id: i64) -> BotyardResult<()> {
        self.record(format!("delete_by_id {}", id));
        self.inner.delete_by_id(id).await
    }

    async fn delete_by_owner_key(&self, owner: &OwnerKey) -> BotyardResult<()> {
        self.record(format!("delete_by_owner_key {}", owner));
        self.inner.delete_by_owner_key(owner).await
    }

    async fn delete_by_runtime_id(&self, runtime_id: &str) -> BotyardResult<()> {
        self.record(format!("delete_by_runtime_id {}", runtime_id));
        self.inner.delete_by_runtime_id(runtime_id).await
    }
}

struct Harness {
    orchestrator: Orchestrator,
    runtime: Arc<FakeRuntime>,
    repo: Arc<SqliteContainersRepository>,
    _temp_dir: TempDir,
}

fn settings() -> ExecutorSettings {
    let mut settings = ExecutorSettings::default();
    settings.docker.image_name = "tg-bot:test".to_string();
    settings
}

fn harness_with(settings: ExecutorSettings, runtime: FakeRuntime) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(&temp_dir.path().join("botyard.db")).unwrap();
    let repo = Arc::new(SqliteContainersRepository::new(db));
    let runtime = Arc::new(runtime);
    let orchestrator = Orchestrator::new(Arc::new(settings), repo.clone(), runtime.clone());
    Harness {
        orchestrator,
        runtime,
        repo,
        _temp_dir: temp_dir,
    }
}

fn harness() -> Harness {
    harness_with(settings(), FakeRuntime::default())
}

fn message(kind: MessageKind, owner: OwnerKey, name: &str) -> BotMessage {
    BotMessage {
        kind,
        payload: BotPayload {
            bot_id: owner.bot_id,
            project_id: owner.project_id,
            user_id: owner.owner_id,
            name: name.to_string(),
            description: "answers questions".to_string(),
            icon: "bot.png".to_string(),
            api_token: "42:token".to_string(),
        },
        timestamp: 1_704_067_200,
    }
}

fn run(owner: OwnerKey) -> BotMessage {
    message(MessageKind::Run, owner, "Support Bot")
}

fn stop(owner: OwnerKey) -> BotMessage {
    message(MessageKind::Stop, owner, "")
}

#[tokio::test]
async fn test_first_run_provisions_and_starts() {
    let h = harness();
    let owner = OwnerKey::new(1, 1, 1);
    let token = CancellationToken::new();

    let outcome = h.orchestrator.dispatch(&run(owner), &token).await.unwrap();
    let record = match outcome {
        DispatchOutcome::Created(record) => record,
        other => panic!("expected Created, got {:?}", other),
    };

    assert_eq!(record.state, ContainerState::Running);
    assert_eq!(record.owner, owner);
    assert!(record.container_name.starts_with("tg-supportbot"));
    assert_ne!(record.port, 0);
    assert!(h.runtime.is_running(&record.runtime_container_id));

    let calls = h.runtime.calls();
    assert!(calls[0].starts_with("create tg-supportbot"), "{:?}", calls);
    assert_eq!(calls[1], format!("start {}", record.runtime_container_id));
    assert_eq!(calls[2], format!("logs {}", record.runtime_container_id));

    let specs = h.runtime.specs.lock().clone();
    assert_eq!(specs[0].image, "tg-bot:test");
    assert!(specs[0].env.contains(&format!("CONTAINER_PORT={}", record.port)));
    assert!(specs[0].env.contains(&"TELEGRAM_BOT_TOKEN=42:token".to_string()));
}

#[tokio::test]
async fn test_repeated_run_reuses_container() {
    let h = harness();
    let owner = OwnerKey::new(1, 1, 1);
    let token = CancellationToken::new();

    let first = h.orchestrator.dispatch(&run(owner), &token).await.unwrap();
    let second = h.orchestrator.dispatch(&run(owner), &token).await.unwrap();

    assert!(matches!(second, DispatchOutcome::Reused(_)));
    assert_eq!(first.record().id, second.record().id);
    assert_eq!(
        first.record().runtime_container_id,
        second.record().runtime_container_id
    );
    assert_eq!(h.runtime.count("create"), 1);
    assert_eq!(h.repo.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_run_keeps_recorded_metadata() {
    let h = harness();
    let owner = OwnerKey::new(1, 1, 1);
    let token = CancellationToken::new();

    let first = h.orchestrator.dispatch(&run(owner), &token).await.unwrap();
    let renamed = message(MessageKind::Run, owner, "Sales Bot");
    let outcome = h.orchestrator.dispatch(&renamed, &token).await.unwrap();

    assert!(matches!(outcome, DispatchOutcome::Reused(_)));
    assert_eq!(outcome.record().metadata.name, "Support Bot");
    let stored = h.repo.find_by_owner_key(&owner).await.unwrap();
    assert_eq!(stored.metadata, first.record().metadata);
    assert_eq!(stored.updated_at, first.record().updated_at);

    let specs = h.runtime.specs.lock().clone();
    assert_eq!(specs.len(), 1);
    assert!(specs[0].env.contains(&"CONTAINER_NAME=Support Bot".to_string()));
}

#[tokio::test]
async fn test_run_recreates_container_lost_by_runtime() {
    let h = harness();
    let owner = OwnerKey::new(1, 1, 1);
    let token = CancellationToken::new();

    let first = h.orchestrator.dispatch(&run(owner), &token).await.unwrap();
    let stale = first.record().clone();
    h.runtime.forget(&stale.runtime_container_id);

    let outcome = h.orchestrator.dispatch(&run(owner), &token).await.unwrap();
    let (stale_id, fresh) = match outcome {
        DispatchOutcome::Recreated { stale_id, record } => (stale_id, record),
        other => panic!("expected Recreated, got {:?}", other),
    };

    assert_eq!(stale_id, stale.id);
    assert_ne!(fresh.id, stale.id);
    assert_ne!(fresh.runtime_container_id, stale.runtime_container_id);
    assert_eq!(fresh.state, ContainerState::Running);

    assert!(h.repo.find_by_id(stale.id).await.unwrap_err().is_not_found());
    let live = h.repo.find_by_owner_key(&owner).await.unwrap();
    assert_eq!(live.id, fresh.id);
    assert_eq!(h.runtime.count("create"), 2);
}

#[tokio::test]
async fn test_stop_without_record_touches_nothing() {
    let h = harness();
    let token = CancellationToken::new();

    let err = h
        .orchestrator
        .dispatch(&stop(OwnerKey::new(9, 9, 9)), &token)
        .await
        .unwrap_err();

    assert!(err.is_not_found(), "{}", err);
    assert!(h.runtime.calls().is_empty());
}

#[tokio::test]
async fn test_run_stop_run_lifecycle() {
    let h = harness();
    let owner = OwnerKey::new(1, 1, 1);
    let token = CancellationToken::new();

    let created = h.orchestrator.dispatch(&run(owner), &token).await.unwrap();
    let runtime_id = created.record().runtime_container_id.clone();

    let stopped = h.orchestrator.dispatch(&stop(owner), &token).await.unwrap();
    assert!(matches!(stopped, DispatchOutcome::Stopped(_)));
    assert!(!h.runtime.is_running(&runtime_id));
    let stored = h.repo.find_by_owner_key(&owner).await.unwrap();
    assert_eq!(stored.state, ContainerState::Stopped);

    let restarted = h.orchestrator.dispatch(&run(owner), &token).await.unwrap();
    assert!(matches!(restarted, DispatchOutcome::Reused(_)));
    assert_eq!(restarted.record().runtime_container_id, runtime_id);
    assert_eq!(restarted.record().state, ContainerState::Running);
    assert!(h.runtime.is_running(&runtime_id));
    assert_eq!(h.runtime.count("create"), 1);
}

#[tokio::test]
async fn test_failed_runtime_stop_keeps_state() {
    let h = harness();
    let owner = OwnerKey::new(1, 1, 1);
    let token = CancellationToken::new();

    let created = h.orchestrator.dispatch(&run(owner), &token).await.unwrap();
    h.runtime.fail_stop(&created.record().runtime_container_id);

    let err = h.orchestrator.dispatch(&stop(owner), &token).await.unwrap_err();
    assert!(matches!(err, BotyardError::Runtime(_)), "{}", err);
    let stored = h.repo.find_by_owner_key(&owner).await.unwrap();
    assert_eq!(stored.state, ContainerState::Running);
}

#[tokio::test]
async fn test_pull_image_precedes_create() {
    let mut settings = settings();
    settings.docker.pull_image = true;
    let h = harness_with(settings, FakeRuntime::default());
    let token = CancellationToken::new();

    h.orchestrator
        .dispatch(&run(OwnerKey::new(1, 1, 1)), &token)
        .await
        .unwrap();

    let calls = h.runtime.calls();
    assert_eq!(calls[0], "pull tg-bot:test");
    assert!(calls[1].starts_with("create "), "{:?}", calls);
}

#[tokio::test]
async fn test_stop_all_continues_past_failures() {
    let h = harness();
    let token = CancellationToken::new();
    let owners = [
        OwnerKey::new(1, 1, 1),
        OwnerKey::new(2, 1, 1),
        OwnerKey::new(3, 1, 1),
    ];
    let mut ids = Vec::new();
    for owner in owners {
        let outcome = h.orchestrator.dispatch(&run(owner), &token).await.unwrap();
        ids.push(outcome.record().clone());
    }
    h.runtime.fail_stop(&ids[1].runtime_container_id);

    let report = h.orchestrator.stop_all(&token).await.unwrap();

    assert_eq!(report.stopped, vec![ids[0].id, ids[2].id]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].record_id, ids[1].id);
    assert!(!report.is_complete());

    for (record, expected) in ids.iter().zip([
        ContainerState::Stopped,
        ContainerState::Running,
        ContainerState::Stopped,
    ]) {
        let stored = h.repo.find_by_id(record.id).await.unwrap();
        assert_eq!(stored.state, expected, "record {}", record.id);
    }
    assert!(report.into_result().is_err());
}

#[tokio::test]
async fn test_stop_all_on_empty_store() {
    let h = harness();
    let report = h
        .orchestrator
        .stop_all(&CancellationToken::new())
        .await
        .unwrap();
    assert!(report.is_complete());
    assert!(report.stopped.is_empty());
    assert!(h.runtime.calls().is_empty());
}

#[tokio::test]
async fn test_cancelled_dispatch_does_nothing() {
    let h = harness();
    let token = CancellationToken::new();
    token.cancel();

    let err = h
        .orchestrator
        .dispatch(&run(OwnerKey::new(1, 1, 1)), &token)
        .await
        .unwrap_err();

    assert!(err.is_cancelled(), "{}", err);
    assert!(h.runtime.calls().is_empty());
    assert!(h.repo.list_all().await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_cancel_during_create_still_records_container() {
    let h = harness_with(
        settings(),
        FakeRuntime::with_create_delay(Duration::from_millis(200)),
    );
    let owner = OwnerKey::new(1, 1, 1);
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = h
        .orchestrator
        .dispatch(&run(owner), &token)
        .await
        .unwrap_err();
    assert!(err.is_cancelled(), "{}", err);

    let stored = h.repo.find_by_owner_key(&owner).await.unwrap();
    assert_eq!(stored.runtime_container_id, "ctr-1");
    assert_eq!(stored.state, ContainerState::Running);
    assert_eq!(h.runtime.count("start"), 0);

    // The next run picks the recorded container up instead of creating one.
    let outcome = h
        .orchestrator
        .dispatch(&run(owner), &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, DispatchOutcome::Reused(_)));
    assert_eq!(outcome.record().runtime_container_id, "ctr-1");
    assert_eq!(h.runtime.count("create"), 1);
    assert!(h.runtime.is_running("ctr-1"));
}

#[tokio::test]
async fn test_cancelled_sweep_stops_nothing() {
    let h = harness();
    let live = CancellationToken::new();
    for bot in 1..=2 {
        h.orchestrator
            .dispatch(&run(OwnerKey::new(bot, 1, 1)), &live)
            .await
            .unwrap();
    }

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let err = h.orchestrator.stop_all(&cancelled).await.unwrap_err();
    assert!(err.is_cancelled(), "{}", err);
    assert_eq!(h.runtime.count("stop"), 0);
}

#[tokio::test]
async fn test_concurrent_runs_for_one_owner_create_once() {
    let h = harness_with(
        settings(),
        FakeRuntime::with_create_delay(Duration::from_millis(30)),
    );
    let owner = OwnerKey::new(5, 5, 5);
    let token = CancellationToken::new();

    let msg = run(owner);
    let (a, b) = tokio::join!(
        h.orchestrator.dispatch(&msg, &token),
        h.orchestrator.dispatch(&msg, &token),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(h.runtime.count("create"), 1);
    assert_eq!(a.record().id, b.record().id);
    let created = [&a, &b]
        .iter()
        .filter(|o| matches!(o, DispatchOutcome::Created(_)))
        .count();
    assert_eq!(created, 1);
}

#[tokio::test]
async fn test_different_owners_get_separate_containers() {
    let h = harness();
    let token = CancellationToken::new();

    let a = h
        .orchestrator
        .dispatch(&run(OwnerKey::new(1, 1, 1)), &token)
        .await
        .unwrap();
    let b = h
        .orchestrator
        .dispatch(&run(OwnerKey::new(1, 1, 2)), &token)
        .await
        .unwrap();

    assert_ne!(a.record().id, b.record().id);
    assert_ne!(
        a.record().runtime_container_id,
        b.record().runtime_container_id
    );
    assert_eq!(h.repo.list_all().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_start_failure_on_found_record_changes_nothing() {
    let h = harness();
    let owner = OwnerKey::new(1, 1, 1);
    let token = CancellationToken::new();

    let created = h.orchestrator.dispatch(&run(owner), &token).await.unwrap();
    h.orchestrator.dispatch(&stop(owner), &token).await.unwrap();
    let before = h.repo.find_by_owner_key(&owner).await.unwrap();
    h.runtime.fail_start(&created.record().runtime_container_id);

    let err = h.orchestrator.dispatch(&run(owner), &token).await.unwrap_err();

    assert!(matches!(err, BotyardError::Runtime(_)), "{}", err);
    let after = h.repo.find_by_owner_key(&owner).await.unwrap();
    assert_eq!(after, before);
    assert_eq!(after.state, ContainerState::Stopped);
    assert_eq!(h.runtime.count("create"), 1);
    assert_eq!(h.repo.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_run_then_stop_store_calls() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(&temp_dir.path().join("botyard.db")).unwrap();
    let repo = Arc::new(RecordingRepo {
        inner: SqliteContainersRepository::new(db),
        calls: Mutex::new(Vec::new()),
    });
    let runtime = Arc::new(FakeRuntime::default());
    let orchestrator = Orchestrator::new(Arc::new(settings()), repo.clone(), runtime.clone());
    let owner = OwnerKey::new(1, 2, 3);
    let token = CancellationToken::new();

    let created = orchestrator.dispatch(&run(owner), &token).await.unwrap();
    orchestrator.dispatch(&stop(owner), &token).await.unwrap();

    let id = created.record().id;
    let runtime_id = &created.record().runtime_container_id;
    assert_eq!(
        repo.calls(),
        vec![
            format!("find_by_owner_key {}", owner),
            format!("create {}", runtime_id),
            format!("set_state running {}", id),
            format!("find_by_id {}", id),
            format!("find_by_owner_key {}", owner),
            format!("stop_state {} 1", id),
        ]
    );
    assert_eq!(runtime.count("create"), 1);
    assert_eq!(runtime.count("stop"), 1);
}
