//! Submission, execution and recovery tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use vnote_models::{TaskId, TaskRecord, TaskStatus, TaskType};
use vnote_queue::{
    CollectionEntry, CollectionExpander, CollectionHandler, QueueError, TaskQueue,
};

use common::{payload, payload_with, wait_for, wait_terminal, Fixture};

#[tokio::test]
async fn test_successful_task_lifecycle() {
    let fx = Fixture::new();
    let queue = fx.open().await;

    let id = queue
        .submit(TaskType::SingleVideo, payload("https://youtu.be/t1"), Some(TaskId::from("t1")))
        .await
        .unwrap();
    let pending = queue.get_status(&id).await.unwrap();
    assert_eq!(pending.status, TaskStatus::Pending);

    queue.start().await.unwrap();
    let done = wait_terminal(&queue, &id).await;

    assert_eq!(done.status, TaskStatus::Success);
    assert_eq!(done.result, Some(json!({"note": "https://youtu.be/t1"})));
    assert!(done.started_at.is_some());
    assert!(done.completed_at.is_some());
    assert!(done.error.is_none());
    assert!(queue.shutdown().await);
}

#[tokio::test]
async fn test_handler_error_marks_failed() {
    let fx = Fixture::new();
    let queue = fx.open().await;
    queue.start().await.unwrap();

    let id = queue
        .submit(
            TaskType::SingleVideo,
            payload_with("https://youtu.be/t2", json!({"mode": "fail", "error": "network timeout"})),
            Some(TaskId::from("t2")),
        )
        .await
        .unwrap();
    let done = wait_terminal(&queue, &id).await;

    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.error.as_deref(), Some("network timeout"));
    assert!(done.completed_at.is_some());
    assert!(done.result.is_none());
    queue.shutdown().await;
}

#[tokio::test]
async fn test_panic_and_unknown_type_are_contained() {
    let fx = Fixture::new();
    let queue = fx.open().await;
    queue.start_with(1).await.unwrap();

    let panicking = queue
        .submit(TaskType::SingleVideo, payload_with("https://youtu.be/p", json!({"mode": "panic"})), None)
        .await
        .unwrap();
    let unhandled = queue
        .submit(TaskType::Collection, payload("https://youtu.be/c"), None)
        .await
        .unwrap();
    let healthy = queue
        .submit(TaskType::SingleVideo, payload("https://youtu.be/ok"), None)
        .await
        .unwrap();

    let record = wait_terminal(&queue, &panicking).await;
    assert_eq!(record.status, TaskStatus::Failed);
    assert!(record.error.unwrap().contains("handler exploded"));

    let record = wait_terminal(&queue, &unhandled).await;
    assert_eq!(record.status, TaskStatus::Failed);
    assert!(record.error.unwrap().contains("no handler registered"));

    // The single worker survived both.
    assert_eq!(wait_terminal(&queue, &healthy).await.status, TaskStatus::Success);
    queue.shutdown().await;
}

#[tokio::test]
async fn test_job_timeout_fails_task() {
    let mut fx = Fixture::new();
    fx.config.job_timeout = Some(Duration::from_millis(50));
    let queue = fx.open().await;
    queue.start().await.unwrap();

    let id = queue
        .submit(
            TaskType::SingleVideo,
            payload_with("https://youtu.be/slow", json!({"mode": "sleep", "sleep_ms": 5000})),
            None,
        )
        .await
        .unwrap();
    let done = wait_terminal(&queue, &id).await;

    assert_eq!(done.status, TaskStatus::Failed);
    assert!(done.error.unwrap().contains("timed out"));
    queue.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_submit_is_rejected() {
    let fx = Fixture::new();
    let queue = fx.open().await;
    let id = TaskId::from("dup");

    queue
        .submit(TaskType::SingleVideo, payload("https://youtu.be/first"), Some(id.clone()))
        .await
        .unwrap();
    let err = queue
        .submit(TaskType::SingleVideo, payload("https://youtu.be/second"), Some(id.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::DuplicateTask(_)));

    let record = queue.get_status(&id).await.unwrap();
    assert_eq!(record.payload["video_url"], "https://youtu.be/first");
    assert_eq!(queue.list_all().await.len(), 1);
}

#[tokio::test]
async fn test_invalid_id_is_rejected() {
    let fx = Fixture::new();
    let queue = fx.open().await;
    let err = queue
        .submit(TaskType::SingleVideo, payload("https://youtu.be/x"), Some(TaskId::from("../x")))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::InvalidTask(_)));
}

#[tokio::test]
async fn test_submit_writes_record_and_snapshot() {
    let fx = Fixture::new();
    let queue = fx.open().await;
    let id = queue
        .submit(TaskType::SingleVideo, payload("https://youtu.be/s"), Some(TaskId::from("s1")))
        .await
        .unwrap();

    let on_disk = fx.store().await.load(&id).await.unwrap().unwrap();
    assert_eq!(Some(on_disk), queue.get_status(&id).await);

    let snapshot: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(fx.results_dir().join("s1.request.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(snapshot["task_id"], "s1");
    assert_eq!(snapshot["original_request"]["video_url"], "https://youtu.be/s");
    assert!(snapshot["created_at"].is_string());
}

#[tokio::test]
async fn test_disk_matches_memory_after_completion() {
    let fx = Fixture::new();
    let queue = fx.open().await;
    queue.start().await.unwrap();

    let ok = queue.submit(TaskType::SingleVideo, payload("https://youtu.be/a"), None).await.unwrap();
    let bad = queue
        .submit(TaskType::SingleVideo, payload_with("https://youtu.be/b", json!({"mode": "fail"})), None)
        .await
        .unwrap();
    wait_terminal(&queue, &ok).await;
    wait_terminal(&queue, &bad).await;
    queue.shutdown().await;

    let store = fx.store().await;
    for id in [ok, bad] {
        let memory = queue.get_status(&id).await.unwrap();
        let disk = store.load(&id).await.unwrap().unwrap();
        assert_eq!(memory, disk);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submitters_each_task_runs_once() {
    let mut fx = Fixture::new();
    fx.config.workers = 4;
    let queue = fx.open().await;
    queue.start().await.unwrap();

    let submitters: Vec<_> = (0..4)
        .map(|s| {
            let queue = queue.clone();
            tokio::spawn(async move {
                let mut ids = Vec::new();
                for n in 0..10 {
                    let url = format!("https://youtu.be/{}-{}", s, n);
                    let p = payload_with(&url, json!({"mode": "sleep", "sleep_ms": 5}));
                    ids.push(queue.submit(TaskType::SingleVideo, p, None).await.unwrap());
                }
                ids
            })
        })
        .collect();

    let ids: Vec<TaskId> = futures::future::join_all(submitters)
        .await
        .into_iter()
        .flat_map(|r| r.unwrap())
        .collect();
    assert_eq!(ids.len(), 40);

    for id in &ids {
        assert_eq!(wait_terminal(&queue, id).await.status, TaskStatus::Success);
    }
    for id in &ids {
        assert_eq!(fx.handler.calls(id.as_str()), 1);
    }

    let stats = queue.stats().await;
    assert_eq!(stats.total, 40);
    assert_eq!(stats.success, 40);
    assert_eq!(stats.workers, 4);
    assert!(queue.shutdown().await);
}

#[tokio::test]
async fn test_recovery_resets_running_tasks() {
    let fx = Fixture::new();
    let store = fx.store().await;

    let mut interrupted = TaskRecord::new(TaskId::from("r1"), TaskType::SingleVideo, payload("https://youtu.be/r1"));
    interrupted.mark_running();
    store.save(&interrupted).await.unwrap();

    let mut finished = TaskRecord::new(TaskId::from("r2"), TaskType::SingleVideo, payload("https://youtu.be/r2"));
    finished.complete(json!({"note": "done"}));
    store.save(&finished).await.unwrap();

    let waiting = TaskRecord::new(TaskId::from("r3"), TaskType::SingleVideo, payload("https://youtu.be/r3"));
    store.save(&waiting).await.unwrap();

    std::fs::write(fx.config.tasks_dir().join("broken.json"), b"{\"id\":").unwrap();

    let queue = fx.open().await;
    let report = queue.recovery_report();
    assert_eq!(report.loaded, 3);
    assert_eq!(report.reset_running, 1);
    assert_eq!(report.enqueued, 2);
    assert_eq!(report.corrupt, 1);

    let r1 = queue.get_status(&TaskId::from("r1")).await.unwrap();
    assert_eq!(r1.status, TaskStatus::Pending);
    assert!(r1.started_at.is_none());
    assert_eq!(store.load(&r1.id).await.unwrap().unwrap(), r1);

    queue.start().await.unwrap();
    assert_eq!(wait_terminal(&queue, &r1.id).await.status, TaskStatus::Success);
    assert_eq!(wait_terminal(&queue, &waiting.id).await.status, TaskStatus::Success);
    queue.shutdown().await;

    assert_eq!(fx.handler.calls("r2"), 0);
}

#[tokio::test]
async fn test_shutdown_lets_current_job_finish() {
    let fx = Fixture::new();
    let queue = fx.open().await;
    queue.start_with(1).await.unwrap();

    let id = queue
        .submit(
            TaskType::SingleVideo,
            payload_with("https://youtu.be/s", json!({"mode": "sleep", "sleep_ms": 150})),
            None,
        )
        .await
        .unwrap();
    wait_for(&queue, &id, |s| s == TaskStatus::Running).await;

    assert!(queue.shutdown().await);
    assert_eq!(queue.get_status(&id).await.unwrap().status, TaskStatus::Success);
    assert_eq!(queue.stats().await.workers, 0);
}

#[tokio::test]
async fn test_start_twice_fails() {
    let fx = Fixture::new();
    let queue = fx.open().await;
    queue.start().await.unwrap();
    assert!(matches!(queue.start().await, Err(QueueError::AlreadyStarted)));
    queue.shutdown().await;
}

struct Playlist;

#[async_trait]
impl CollectionExpander for Playlist {
    async fn expand(&self, url: &str, _platform: &str, _limit: usize) -> anyhow::Result<Vec<CollectionEntry>> {
        Ok((1..=3)
            .map(|n| CollectionEntry {
                video_url: format!("{}?p={}", url, n),
                title: format!("Part {}", n),
            })
            .collect())
    }
}

#[tokio::test]
async fn test_collection_fans_out_children() {
    let fx = Fixture::new();
    let handlers = fx
        .handlers()
        .with(TaskType::Collection, Arc::new(CollectionHandler::new(Arc::new(Playlist), 2)));
    let queue = TaskQueue::open(fx.config.clone(), handlers).await.unwrap();
    queue.start().await.unwrap();

    let parent = queue
        .submit(TaskType::Collection, payload("https://www.bilibili.com/video/BV1c"), None)
        .await
        .unwrap();
    let done = wait_terminal(&queue, &parent).await;
    assert_eq!(done.status, TaskStatus::Success);

    let result = done.result.unwrap();
    assert_eq!(result["total_videos"], 2);
    assert_eq!(result["created_tasks"], 2);

    let list = result["task_list"].as_array().unwrap();
    assert_eq!(list[1]["title"], "Part 2");
    for entry in list {
        let child = TaskId::from(entry["task_id"].as_str().unwrap());
        let record = wait_terminal(&queue, &child).await;
        assert_eq!(record.task_type, TaskType::SingleVideo);
        assert_eq!(record.status, TaskStatus::Success);
        assert_eq!(record.payload["video_url"], entry["video_url"]);
    }
    queue.shutdown().await;
}

#[tokio::test]
async fn test_recent_orders_newest_first() {
    let fx = Fixture::new();
    let queue = fx.open().await;
    for n in 0..3 {
        queue
            .submit(TaskType::SingleVideo, payload("https://youtu.be/r"), Some(TaskId::from(format!("n{}", n))))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let recent = queue.recent(2).await;
    let ids: Vec<_> = recent.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["n2", "n1"]);
}

#[tokio::test]
async fn test_collection_rerun_reuses_children() {
    let fx = Fixture::new();
    let open = || {
        let handlers = fx
            .handlers()
            .with(TaskType::Collection, Arc::new(CollectionHandler::new(Arc::new(Playlist), 2)));
        TaskQueue::open(fx.config.clone(), handlers)
    };

    let queue = open().await.unwrap();
    queue.start().await.unwrap();
    let parent = queue
        .submit(TaskType::Collection, payload("https://www.bilibili.com/video/BV1r"), Some(TaskId::from("col")))
        .await
        .unwrap();
    wait_terminal(&queue, &parent).await;
    for child in ["col-0", "col-1"] {
        wait_terminal(&queue, &TaskId::from(child)).await;
    }
    queue.shutdown().await;

    // Crash after the children were submitted but before the parent finished.
    let store = fx.store().await;
    let mut record = store.load(&parent).await.unwrap().unwrap();
    record.status = TaskStatus::Running;
    record.completed_at = None;
    record.result = None;
    store.save(&record).await.unwrap();

    let queue = open().await.unwrap();
    queue.start().await.unwrap();
    let done = wait_terminal(&queue, &parent).await;
    queue.shutdown().await;

    assert_eq!(done.status, TaskStatus::Success);
    let result = done.result.unwrap();
    assert_eq!(result["created_tasks"], 2);
    assert_eq!(result["task_list"][0]["task_id"], "col-0");
    assert_eq!(result["task_list"][1]["task_id"], "col-1");

    let children = queue
        .list_all()
        .await
        .into_iter()
        .filter(|r| r.task_type == TaskType::SingleVideo)
        .count();
    assert_eq!(children, 2);
    assert_eq!(fx.handler.calls("col-0"), 1);
}

#[tokio::test]
async fn test_unwritable_store_does_not_block_transitions() {
    let fx = Fixture::new();
    let queue = fx.open().await;

    // Every record write now fails.
    let tasks_dir = fx.config.tasks_dir();
    std::fs::remove_dir_all(&tasks_dir).unwrap();
    std::fs::write(&tasks_dir, b"not a directory").unwrap();

    let id = queue
        .submit(TaskType::SingleVideo, payload("https://youtu.be/soft"), Some(TaskId::from("soft")))
        .await
        .unwrap();
    assert_eq!(queue.get_status(&id).await.unwrap().status, TaskStatus::Pending);

    queue.start().await.unwrap();
    let done = wait_terminal(&queue, &id).await;
    queue.shutdown().await;

    assert_eq!(done.status, TaskStatus::Success);
    assert!(done.result.is_some());
    assert!(done.completed_at.is_some());
    assert!(tasks_dir.is_file());
    assert!(fx.results_dir().join("soft.request.json").exists());
}
