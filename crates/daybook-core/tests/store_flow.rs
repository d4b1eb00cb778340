use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use daybook_core::backend::MemoryBackend;
use daybook_core::category::CategoryRegistry;
use daybook_core::error::TrackerError;
use daybook_core::session::Session;
use daybook_core::store::{SyncState, TaskStore};
use daybook_core::task::Task;
use pretty_assertions::assert_eq;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).expect("valid day")
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0)
        .single()
        .expect("valid time")
        + Duration::seconds(secs)
}

fn open(backend: &Arc<MemoryBackend>) -> TaskStore<MemoryBackend> {
    TaskStore::load(Arc::clone(backend), day(10), at(0)).expect("load store")
}

#[test]
fn add_rejects_blank_text_and_category() {
    let backend = Arc::new(MemoryBackend::new());
    let mut store = open(&backend);

    let err = store.add("   ", "Work", day(10)).expect_err("blank text");
    assert!(matches!(err, TrackerError::Validation(_)));
    let err = store.add("Write report", " ", day(10)).expect_err("blank category");
    assert!(matches!(err, TrackerError::Validation(_)));

    assert!(store.tasks().is_empty());
    assert!(backend.stored_tasks().is_empty());

    let task = store.add("  Write report ", "Work", day(10)).expect("add");
    assert_eq!(task.text, "Write report");
    assert_eq!(task.time_spent, 0);
    assert!(!task.completed);
    assert_eq!(store.tasks().len(), 1);
    assert_eq!(store.sync_state(task.id), Some(&SyncState::Synced));
}

#[test]
fn toggle_complete_records_viewed_day_and_persists() {
    let backend = Arc::new(MemoryBackend::with_tasks(vec![Task::new(
        1,
        "Old chore".into(),
        "Personal".into(),
        day(8),
    )]));
    let mut store = open(&backend);
    assert_eq!(store.overdue().len(), 1);

    let done = store.toggle_complete(1).expect("visible task");
    assert!(done.completed);
    assert_eq!(done.completed_at, Some(day(10)));
    assert_eq!(backend.stored_task(1).and_then(|t| t.completed_at), Some(day(10)));

    let reopened = store.toggle_complete(1).expect("visible task");
    assert!(!reopened.completed);
    assert_eq!(reopened.completed_at, None);
    assert_eq!(backend.stored_task(1).map(|t| t.completed), Some(false));

    assert!(store.toggle_complete(99).is_none());
}

#[test]
fn clear_completed_keeps_pending_tasks() {
    let backend = Arc::new(MemoryBackend::new());
    let mut store = open(&backend);
    let ids: Vec<_> = (0..5)
        .map(|n| store.add(&format!("task {n}"), "Work", day(10)).expect("add").id)
        .collect();
    store.toggle_complete(ids[1]);
    store.toggle_complete(ids[3]);

    assert_eq!(store.clear_completed(), 2);
    assert_eq!(store.tasks().len(), 3);
    assert!(store.tasks().iter().all(|task| !task.completed));
    assert_eq!(backend.stored_tasks().len(), 3);
    assert_eq!(store.clear_completed(), 0);
}

#[test]
fn delete_single_and_batch() {
    let backend = Arc::new(MemoryBackend::new());
    let mut store = open(&backend);
    let a = store.add("a", "Work", day(10)).expect("add").id;
    let b = store.add("b", "Work", day(10)).expect("add").id;
    let c = store.add("c", "Work", day(10)).expect("add").id;

    assert!(store.delete(a));
    assert!(!store.delete(a));
    assert_eq!(store.delete_many(&[b, c, 42]), 2);
    assert!(store.tasks().is_empty());
    assert!(backend.stored_tasks().is_empty());
}

#[test]
fn move_overdue_brings_earlier_tasks_into_scope() {
    let mut finished = Task::new(4, "finished".into(), "Work".into(), day(7));
    finished.completed = true;
    let backend = Arc::new(MemoryBackend::with_tasks(vec![
        Task::new(1, "one".into(), "Work".into(), day(7)),
        Task::new(2, "two".into(), "Health".into(), day(8)),
        Task::new(3, "three".into(), "Social".into(), day(9)),
        finished,
        Task::new(5, "today".into(), "Work".into(), day(10)),
    ]));
    let mut store = open(&backend);
    assert_eq!(store.overdue().len(), 3);
    assert_eq!(store.tasks().len(), 1);

    let moved = store.move_overdue(at(0));
    assert_eq!(moved.len(), 3);
    assert!(store.overdue().is_empty());
    assert_eq!(store.tasks().len(), 4);
    for id in [1, 2, 3] {
        assert_eq!(backend.stored_task(id).map(|t| t.date), Some(day(10)));
    }
    assert_eq!(backend.stored_task(4).map(|t| t.date), Some(day(7)));
}

#[test]
fn moving_a_task_away_drops_it_from_view() {
    let backend = Arc::new(MemoryBackend::new());
    let mut store = open(&backend);
    let id = store.add("later", "Work", day(10)).expect("add").id;
    store.toggle_timer(id, at(0)).expect("start");

    let moved = store.move_to_scope(&[id], day(11), at(30));
    assert_eq!(moved.len(), 1);
    assert!(store.get(id).is_none());
    assert_eq!(store.running(), None);

    let stored = backend.stored_task(id).expect("stored");
    assert_eq!(stored.date, day(11));
    assert_eq!(stored.start_time, None);
    assert_eq!(stored.time_spent, 30);
}

#[test]
fn moving_within_view_keeps_the_timer_running() {
    let backend = Arc::new(MemoryBackend::with_tasks(vec![Task::new(
        1,
        "old".into(),
        "Work".into(),
        day(8),
    )]));
    let mut store = open(&backend);
    store.toggle_timer(1, at(0)).expect("start");

    store.move_overdue(at(30));
    assert_eq!(store.running(), Some(1));
    assert_eq!(backend.stored_task(1).and_then(|t| t.start_time), Some(at(0)));
}

#[test]
fn starting_stops_a_timer_left_running_on_another_day() {
    let backend = Arc::new(MemoryBackend::with_tasks(vec![
        Task::new(1, "today".into(), "Work".into(), day(10)),
        Task::new(2, "yesterday".into(), "Work".into(), day(9)),
    ]));
    let mut today = open(&backend);
    today.toggle_timer(1, at(0)).expect("start today");

    let mut yesterday = TaskStore::load(Arc::clone(&backend), day(9), at(40)).expect("load day 9");
    assert_eq!(yesterday.running(), None);
    let transition = yesterday.toggle_timer(2, at(40)).expect("toggle").expect("known");

    let stopped = transition.stopped.expect("day 10 timer reported");
    assert_eq!((stopped.id, stopped.elapsed, stopped.time_spent), (1, 40, 40));
    assert_eq!(transition.started, Some((2, at(40))));

    let running: Vec<_> = backend
        .stored_tasks()
        .into_iter()
        .filter(Task::timer_running)
        .map(|t| t.id)
        .collect();
    assert_eq!(running, vec![2]);
    assert_eq!(backend.stored_task(1).map(|t| t.time_spent), Some(40));
}

#[test]
fn moving_a_running_task_away_then_starting_another_leaves_one_running() {
    let backend = Arc::new(MemoryBackend::new());
    let mut store = open(&backend);
    let a = store.add("A", "Work", day(10)).expect("add").id;
    let b = store.add("B", "Work", day(10)).expect("add").id;
    store.toggle_timer(a, at(0)).expect("start A");

    store.move_to_scope(&[a], day(11), at(20));
    store.toggle_timer(b, at(25)).expect("start B");

    let running: Vec<_> = backend
        .stored_tasks()
        .into_iter()
        .filter(Task::timer_running)
        .map(|t| t.id)
        .collect();
    assert_eq!(running, vec![b]);
    assert_eq!(backend.stored_task(a).map(|t| t.time_spent), Some(20));

    let mut tomorrow = TaskStore::load(Arc::clone(&backend), day(11), at(30)).expect("load day 11");
    assert_eq!(tomorrow.running(), Some(b));
    let restarted = tomorrow.toggle_timer(a, at(30)).expect("toggle").expect("known");
    assert_eq!(restarted.stopped.map(|s| s.id), Some(b));
}

#[test]
fn nothing_starts_when_running_timers_cannot_be_listed() {
    let backend = Arc::new(MemoryBackend::new());
    let mut store = open(&backend);
    let a = store.add("A", "Work", day(10)).expect("add").id;

    backend.set_fail_reads(true);
    let err = store.toggle_timer(a, at(0)).expect_err("no start");
    assert!(matches!(err, TrackerError::Persistence { op: "list_running_tasks", .. }));
    assert_eq!(store.running(), None);
    assert_eq!(backend.stored_task(a).and_then(|t| t.start_time), None);
}

#[test]
fn only_one_timer_runs_at_a_time() {
    let backend = Arc::new(MemoryBackend::new());
    let mut store = open(&backend);
    let a = store.add("A", "Work", day(10)).expect("add").id;
    let b = store.add("B", "Learning", day(10)).expect("add").id;

    let first = store.toggle_timer(a, at(0)).expect("toggle").expect("known");
    assert_eq!(first.stopped, None);
    assert_eq!(first.started, Some((a, at(0))));

    let second = store.toggle_timer(b, at(12)).expect("toggle").expect("known");
    let stopped = second.stopped.expect("A stopped");
    assert_eq!((stopped.id, stopped.elapsed, stopped.time_spent), (a, 12, 12));
    assert_eq!(store.running(), Some(b));

    let stored_a = backend.stored_task(a).expect("stored A");
    assert_eq!(stored_a.time_spent, 12);
    assert_eq!(stored_a.start_time, None);
    assert_eq!(backend.stored_task(b).and_then(|t| t.start_time), Some(at(12)));

    let third = store.toggle_timer(b, at(20)).expect("toggle").expect("known");
    assert_eq!(third.started, None);
    assert_eq!(third.stopped.map(|s| s.time_spent), Some(8));
    assert_eq!(store.running(), None);

    assert_eq!(store.toggle_timer(77, at(30)).expect("toggle"), None);
}

#[test]
fn completed_tasks_cannot_start_but_can_stop() {
    let backend = Arc::new(MemoryBackend::new());
    let mut store = open(&backend);
    let idle = store.add("idle", "Work", day(10)).expect("add").id;
    store.toggle_complete(idle);
    let err = store.toggle_timer(idle, at(0)).expect_err("completed");
    assert!(matches!(err, TrackerError::TimerOnCompletedTask(id) if id == idle));

    let busy = store.add("busy", "Work", day(10)).expect("add").id;
    store.toggle_timer(busy, at(0)).expect("start");
    store.toggle_complete(busy);
    assert_eq!(store.running(), Some(busy));

    let stop = store.toggle_timer(busy, at(45)).expect("stop").expect("known");
    assert_eq!(stop.stopped.map(|s| s.time_spent), Some(45));
    assert_eq!(store.running(), None);
}

#[test]
fn failed_writes_are_recorded_not_lost() {
    let backend = Arc::new(MemoryBackend::new());
    let mut store = open(&backend);
    let id = store.add("fragile", "Work", day(10)).expect("add").id;

    backend.set_fail_writes(true);
    let toggled = store.toggle_complete(id).expect("visible");
    assert!(toggled.completed);
    assert!(matches!(store.sync_state(id), Some(SyncState::Failed(_))));
    assert_eq!(store.unsynced().len(), 1);
    assert_eq!(backend.stored_task(id).map(|t| t.completed), Some(false));

    let err = store.add("never", "Work", day(10)).expect_err("create fails");
    assert!(matches!(err, TrackerError::Persistence { op: "create_task", .. }));
    assert_eq!(store.tasks().len(), 1);

    backend.set_fail_writes(false);
    store.toggle_complete(id);
    assert_eq!(store.sync_state(id), Some(&SyncState::Synced));
    assert!(store.unsynced().is_empty());
}

#[test]
fn loading_two_running_timers_keeps_the_latest() {
    let mut older = Task::new(1, "older".into(), "Work".into(), day(10));
    older.time_spent = 100;
    older.start_time = Some(at(-60));
    let mut newer = Task::new(2, "newer".into(), "Work".into(), day(10));
    newer.start_time = Some(at(-10));
    let backend = Arc::new(MemoryBackend::with_tasks(vec![older, newer]));

    let store = open(&backend);
    assert_eq!(store.running(), Some(2));

    let stored = backend.stored_task(1).expect("older");
    assert_eq!(stored.start_time, None);
    assert_eq!(stored.time_spent, 160);
    assert_eq!(store.get(2).map(|t| t.display_seconds(at(0))), Some(10));
}

#[test]
fn stats_follow_the_scope_list() {
    let backend = Arc::new(MemoryBackend::new());
    let mut store = open(&backend);
    let a = store.add("a", "Work", day(10)).expect("add").id;
    store.add("b", "Health", day(10)).expect("add");
    store.toggle_complete(a);
    assert!(store.toggle_timer(a, at(0)).is_err());
    let b = store.tasks()[1].id;
    store.toggle_timer(b, at(0)).expect("start b");
    store.toggle_timer(b, at(90)).expect("stop b");

    let productivity = store.productivity();
    assert_eq!((productivity.total, productivity.completed, productivity.percentage), (2, 1, 50));

    let registry = CategoryRegistry::load(Arc::clone(&backend)).expect("registry");
    let time = store.category_time(registry.list_categories());
    assert_eq!(time.len(), 1);
    assert_eq!(time[0].name, "Health");
    assert!((time[0].minutes - 1.5).abs() < 1e-9);
}

#[test]
fn registry_rejects_duplicates_and_assigns_palette() {
    let backend = Arc::new(MemoryBackend::new());
    let mut registry = CategoryRegistry::load(Arc::clone(&backend)).expect("registry");
    assert_eq!(registry.list_categories().len(), 5);

    let err = registry.add_category("work", "🛠").expect_err("duplicate");
    assert!(matches!(err, TrackerError::Duplicate(_)));
    assert_eq!(registry.list_categories().len(), 5);

    let garden = registry.add_category(" Gardening ", "").expect("add");
    assert_eq!(garden.name, "Gardening");
    assert_eq!(garden.emoji, "✨");
    assert_eq!(garden.visuals.fill, "#14b8a6");
    assert_eq!(registry.custom_count(), 1);

    let reloaded = CategoryRegistry::load(backend).expect("reload");
    assert_eq!(reloaded.list_categories().len(), 6);
}

#[test]
fn session_reloads_when_scope_changes() {
    let backend = Arc::new(MemoryBackend::with_tasks(vec![
        Task::new(1, "ten".into(), "Work".into(), day(10)),
        Task::new(2, "eleven".into(), "Work".into(), day(11)),
    ]));
    let mut session = Session::open(Arc::clone(&backend), day(10), day(10), at(0)).expect("session");
    assert_eq!(session.store().tasks().len(), 1);

    let change = session.set_scope(day(11), at(0)).expect("reload").expect("changed");
    assert_eq!((change.previous, change.scope), (day(10), day(11)));
    assert_eq!(session.store().tasks()[0].id, 2);
    assert_eq!(session.store().overdue()[0].id, 1);
    assert!(!session.navigator().is_today());

    assert!(session.set_scope(day(11), at(0)).expect("no-op").is_none());

    let added = session.add_task("default category", None).expect("add");
    assert_eq!(added.category, "Work");
    assert_eq!(added.date, day(11));
}

#[test]
fn failed_scope_change_keeps_the_previous_day() {
    let backend = Arc::new(MemoryBackend::with_tasks(vec![
        Task::new(1, "ten".into(), "Work".into(), day(10)),
        Task::new(2, "eleven".into(), "Work".into(), day(11)),
    ]));
    let mut session = Session::open(Arc::clone(&backend), day(10), day(10), at(0)).expect("session");

    backend.set_fail_reads(true);
    assert!(session.set_scope(day(11), at(0)).is_err());
    assert!(session.shift_scope(-1, at(0)).is_err());
    assert_eq!(session.scope(), day(10));
    assert_eq!(session.store().scope(), day(10));
    assert_eq!(session.store().tasks()[0].id, 1);

    backend.set_fail_reads(false);
    let change = session.shift_scope(1, at(0)).expect("reload").expect("changed");
    assert_eq!(change.scope, day(11));
    assert_eq!(session.store().tasks()[0].id, 2);

    session.go_to_today(at(0)).expect("reload").expect("changed");
    assert_eq!(session.store().scope(), day(10));
    assert!(session.navigator().is_today());
}
