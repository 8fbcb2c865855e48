//! Reactive observation of the active task list.

use crate::{tasks, Store, StoreResult};
use tokio::sync::watch;
use wearsync_types::Task;

/// A lazy, restartable, infinite feed of the active task list.
///
/// The first [`next`](TaskFeed::next) call returns the current list
/// immediately; each later call waits for a committed transaction that
/// changed the tasks table, then re-queries. Multiple rapid commits may
/// coalesce into one emission, but every emission reflects the latest
/// committed state.
pub struct TaskFeed {
    store: Store,
    rx: watch::Receiver<u64>,
    primed: bool,
}

impl TaskFeed {
    pub(crate) fn new(store: Store) -> Self {
        let rx = store.watch_tasks();
        Self {
            store,
            rx,
            primed: false,
        }
    }

    /// Wait for the next state of the active task list.
    pub async fn next(&mut self) -> StoreResult<Vec<Task>> {
        if self.primed {
            // Sender dropping means the store is gone; surface the last
            // state and keep returning it rather than erroring the UI.
            let _ = self.rx.changed().await;
        } else {
            self.primed = true;
            self.rx.mark_changed();
            let _ = self.rx.changed().await;
        }
        let mut conn = self.store.acquire().await?;
        tasks::list_active(&mut conn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wearsync_types::{NewTask, Task, TaskId};

    #[tokio::test]
    async fn first_next_fires_immediately() {
        let store = Store::in_memory().await.unwrap();
        let mut feed = store.task_feed();

        let list = tokio::time::timeout(Duration::from_secs(1), feed.next())
            .await
            .expect("first emission must not wait for a change")
            .unwrap();
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn emits_after_commit_notification() {
        let store = Store::in_memory().await.unwrap();
        let mut feed = store.task_feed();
        let _ = feed.next().await.unwrap();

        {
            let mut conn = store.acquire().await.unwrap();
            let task = Task::new_local(NewTask::titled("Milk"), 100);
            tasks::insert_or_replace(&mut conn, &task).await.unwrap();
        }
        store.notify_tasks_changed();

        let list = tokio::time::timeout(Duration::from_secs(1), feed.next())
            .await
            .expect("feed must wake on notification")
            .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "Milk");
    }

    #[tokio::test]
    async fn feed_is_restartable() {
        let store = Store::in_memory().await.unwrap();

        {
            let mut conn = store.acquire().await.unwrap();
            let mut task = Task::new_local(NewTask::titled("One"), 100);
            task.id = TaskId::from("one");
            tasks::insert_or_replace(&mut conn, &task).await.unwrap();
        }

        // A fresh feed starts from current state, not from history.
        let mut feed = store.task_feed();
        let list = feed.next().await.unwrap();
        assert_eq!(list.len(), 1);

        drop(feed);
        let mut feed = store.task_feed();
        let list = feed.next().await.unwrap();
        assert_eq!(list.len(), 1);
    }
}
