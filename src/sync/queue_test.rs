use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::sync::queue::TaskQueue;
use crate::types::{SyncResult, TaskLabel};

#[tokio::test(flavor = "multi_thread")]
async fn test_tasks_run_in_enqueue_order() {
    let queue = TaskQueue::new();
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for i in 0..5 {
        let order = Arc::clone(&order);
        handles.push(queue.enqueue(
            format!("task-{i}"),
            TaskLabel::Sync,
            Box::pin(async move {
                // Later tasks finish faster; order must still hold.
                tokio::time::sleep(Duration::from_millis(20 - i * 4)).await;
                order.lock().unwrap().push(i);
                Ok(SyncResult::Nop)
            }),
        ));
    }
    for handle in handles {
        assert_eq!(handle.wait().await.unwrap(), SyncResult::Nop);
    }
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_one_task_at_a_time() {
    let queue = TaskQueue::new();
    let running = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..4 {
        let running = Arc::clone(&running);
        let max_seen = Arc::clone(&max_seen);
        handles.push(queue.enqueue(
            format!("task-{i}"),
            TaskLabel::Sync,
            Box::pin(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(SyncResult::Nop)
            }),
        ));
    }
    for handle in handles {
        handle.wait().await.unwrap();
    }
    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_cancels_unstarted_tasks() {
    let queue = TaskQueue::new();

    // Block the worker on a long task, then stack one behind it.
    let blocker = queue.enqueue(
        "blocker",
        TaskLabel::Sync,
        Box::pin(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(SyncResult::Nop)
        }),
    );
    let queued = queue.enqueue(
        "queued",
        TaskLabel::Sync,
        Box::pin(async { Ok(SyncResult::Nop) }),
    );

    tokio::time::sleep(Duration::from_millis(10)).await;
    queue.close();

    // The in-flight task runs to completion.
    assert_eq!(blocker.wait().await.unwrap(), SyncResult::Nop);
    // The queued one never starts.
    assert_eq!(queued.wait().await.unwrap(), SyncResult::Canceled);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_enqueue_after_close_is_canceled() {
    let queue = TaskQueue::new();
    queue.close();
    let handle = queue.enqueue(
        "late",
        TaskLabel::Push,
        Box::pin(async { Ok(SyncResult::Nop) }),
    );
    assert_eq!(handle.wait().await.unwrap(), SyncResult::Canceled);
}
