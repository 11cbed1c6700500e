// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `queue.rs`

#[cfg(test)]
mod tests {
    use super::super::WorkQueue;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_duplicate_adds_collapse() {
        let queue: WorkQueue<&str> = WorkQueue::new();
        queue.add("a");
        queue.add("b");
        queue.add("a");
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.next().await, Some("a"));
        assert_eq!(queue.next().await, Some("b"));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_active_key_is_requeued_after_done() {
        let queue: WorkQueue<&str> = WorkQueue::new();
        queue.add("a");
        let key = queue.next().await.unwrap();

        queue.add("a");
        queue.add("a");
        assert!(queue.is_empty(), "an active key must not be handed to a second worker");

        queue.done(&key);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next().await, Some("a"));
        queue.done(&"a");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_next_waits_for_add() {
        let queue: Arc<WorkQueue<String>> = Arc::new(WorkQueue::new());
        let worker = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!worker.is_finished());
        queue.add("late".to_string());
        assert_eq!(worker.await.unwrap().as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_add_after_delays_the_key() {
        let queue: Arc<WorkQueue<&str>> = Arc::new(WorkQueue::new());
        queue.add_after("slow", Duration::from_millis(50));
        assert!(queue.is_empty());
        let key = tokio::time::timeout(Duration::from_secs(1), queue.next())
            .await
            .unwrap();
        assert_eq!(key, Some("slow"));
    }

    #[tokio::test]
    async fn test_close_releases_waiting_workers() {
        let queue: Arc<WorkQueue<&str>> = Arc::new(WorkQueue::new());
        let workers: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.next().await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();
        for worker in workers {
            assert_eq!(worker.await.unwrap(), None);
        }
        queue.add("ignored");
        assert!(queue.is_empty());
    }
}
