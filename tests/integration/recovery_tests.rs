use super::*;
use rust_decimal::Decimal;
use uatu_sweeper::{Currency, MemoryStateStore, RunPhase, RunState, TaskResult};

fn interrupted_run(cursor: usize) -> RunState {
    let mut state = RunState::idle(test_run_config());
    state.phase = RunPhase::Running;
    state.queue = items(&["a", "b", "c"]);
    state.original_items = state.queue.clone();
    state.cursor = cursor;
    state.results.insert(
        "a".to_string(),
        TaskResult {
            min: Decimal::from(100),
            max: Decimal::from(100),
            avg: Decimal::from(100),
            currency: Currency::Rub,
            samples: vec!["100 ₽".to_string()],
        },
    );
    state
}

struct BrokenStore;

#[async_trait]
impl StateStore for BrokenStore {
    async fn persist(&self, _state: &RunState) -> uatu_sweeper::Result<()> {
        Ok(())
    }

    async fn restore(&self) -> uatu_sweeper::Result<Option<RunState>> {
        Err(AppError::InvalidInput("corrupt run record".into()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_run_comes_back_paused() -> anyhow::Result<()> {
    let navigator = Arc::new(ScriptedNavigator::new());
    let store = Arc::new(MemoryStateStore::with_state(interrupted_run(1)));
    let (handle, join) = spawn_scheduler(navigator.clone(), store.clone(), QueueSettings::default()).await;

    let status = handle.status();
    assert_eq!(status.phase, RunPhase::Paused);
    assert_eq!(status.cursor, 1);
    assert_eq!(status.total, 3);
    assert!(status.results.contains_key("a"));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(navigator.opened().is_empty());

    handle.shutdown().await?;
    join.await?;
    assert_eq!(store.snapshot().await.unwrap().phase, RunPhase::Paused);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_resume_continues_from_restored_cursor() -> anyhow::Result<()> {
    let navigator = Arc::new(ScriptedNavigator::new().script("c", vec![page("$30")]));
    let store = Arc::new(MemoryStateStore::with_state(interrupted_run(1)));
    let (handle, _join) = spawn_scheduler(navigator.clone(), store, QueueSettings::default()).await;
    let mut events = handle.subscribe();

    assert_eq!(handle.resume().await?, RunPhase::Running);
    let seen = events_until(&mut events, |e| matches!(e, QueueEvent::Done)).await;

    assert_eq!(progress_tasks(&seen), vec![(2, "b".to_string()), (3, "c".to_string())]);
    assert_eq!(navigator.opened(), items(&["b", "c"]));
    let status = handle.status();
    assert_eq!(status.results.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_auto_resume_picks_up_where_it_left_off() -> anyhow::Result<()> {
    let navigator = Arc::new(ScriptedNavigator::new());
    let store = Arc::new(MemoryStateStore::with_state(interrupted_run(2)));
    let settings = QueueSettings {
        resume_on_restore: true,
        ..QueueSettings::default()
    };
    let (handle, _join) = spawn_scheduler(navigator.clone(), store, settings).await;
    let mut events = handle.subscribe();

    assert_eq!(handle.status().phase, RunPhase::Running);
    let seen = events_until(&mut events, |e| matches!(e, QueueEvent::Done)).await;
    assert_eq!(progress_tasks(&seen), vec![(3, "c".to_string())]);
    assert_eq!(navigator.opened(), items(&["c"]));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_cursor_is_clamped_and_completes_on_resume() -> anyhow::Result<()> {
    let navigator = Arc::new(ScriptedNavigator::new());
    let store = Arc::new(MemoryStateStore::with_state(interrupted_run(9)));
    let (handle, _join) = spawn_scheduler(navigator.clone(), store, QueueSettings::default()).await;
    let mut events = handle.subscribe();

    assert_eq!(handle.status().cursor, 3);

    handle.resume().await?;
    let seen = events_until(&mut events, |e| matches!(e, QueueEvent::Done)).await;
    assert!(progress_tasks(&seen).is_empty());
    assert_eq!(handle.status().phase, RunPhase::Idle);
    assert!(navigator.opened().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_record_starts_idle() -> anyhow::Result<()> {
    let navigator = Arc::new(ScriptedNavigator::new());
    let (handle, _join) = spawn_scheduler(navigator, Arc::new(BrokenStore), QueueSettings::default()).await;

    let status = handle.status();
    assert_eq!(status.phase, RunPhase::Idle);
    assert_eq!(status.total, 0);
    assert!(status.results.is_empty());
    // nothing to resume
    assert_eq!(handle.resume().await?, RunPhase::Idle);
    Ok(())
}

// Real time: the sqlite driver works on its own thread.
#[tokio::test]
async fn test_sqlite_record_survives_scheduler_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("run.db").display());

    let navigator = Arc::new(ScriptedNavigator::new().script("a", vec![page("42 €")]));
    let store = Arc::new(uatu_sweeper::SqliteStateStore::connect(&url, 1).await?);
    let (handle, join) = spawn_scheduler(navigator, store, QueueSettings::default()).await;
    let mut events = handle.subscribe();

    handle.start(items(&["a", "b"]), Default::default()).await?;
    events_until(&mut events, |e| matches!(e, QueueEvent::Progress { cursor: 1, .. })).await;
    handle.shutdown().await?;
    join.await?;

    let store = Arc::new(uatu_sweeper::SqliteStateStore::connect(&url, 1).await?);
    let (handle, _join) = spawn_scheduler(Arc::new(ScriptedNavigator::new()), store, QueueSettings::default()).await;
    let status = handle.status();
    assert_eq!(status.phase, RunPhase::Paused);
    assert_eq!(status.cursor, 1);
    assert_eq!(status.results["a"].currency, Currency::Eur);
    Ok(())
}
