use super::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counting_task(period: Duration, stop_after: usize) -> (Option<PeriodicTask>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    let task = PeriodicTask::spawn("test", period, move || {
        let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
        if n >= stop_after { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
    });
    (task, count)
}

#[test]
fn spawn_outside_runtime_returns_none() {
    let (task, count) = counting_task(Duration::from_millis(10), usize::MAX);
    assert!(task.is_none());
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn default_schedule_is_manual() {
    assert_eq!(SyncSchedule::default(), SyncSchedule::Manual);
}

#[tokio::test(start_paused = true)]
async fn first_tick_waits_one_period() {
    let (task, count) = counting_task(Duration::from_millis(150), usize::MAX);
    let task = task.unwrap();
    assert_eq!(task.name(), "test");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn break_finishes_task() {
    let (task, count) = counting_task(Duration::from_millis(10), 2);
    let task = task.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert!(task.is_finished());
}

#[tokio::test(start_paused = true)]
async fn drop_cancels_task() {
    let (task, count) = counting_task(Duration::from_millis(10), usize::MAX);
    tokio::time::sleep(Duration::from_millis(25)).await;
    let before = count.load(Ordering::SeqCst);
    assert_eq!(before, 2);

    drop(task);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(count.load(Ordering::SeqCst), before);
}

#[tokio::test(start_paused = true)]
async fn cancel_is_idempotent() {
    let (task, count) = counting_task(Duration::from_millis(10), usize::MAX);
    let task = task.unwrap();
    task.cancel();
    task.cancel();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert!(task.is_finished());
}
