//! Bookkeeping for running listener tasks

use std::sync::Mutex;
use tokio::task::JoinHandle;

/// Tracks the tasks feeding registered listeners so they can be removed.
///
/// Dropping the registry aborts every task it still tracks.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a spawned listener task
    pub fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    /// Abort every tracked task, returning how many were still running
    pub fn abort_all(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let running = tasks.iter().filter(|t| !t.is_finished()).count();
        for task in tasks.drain(..) {
            task.abort();
        }
        running
    }

    /// Number of tasks still running
    pub fn active(&self) -> usize {
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.iter().filter(|t| !t.is_finished()).count()
    }
}

impl Drop for ListenerRegistry {
    fn drop(&mut self) {
        self.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_abort_all() {
        let registry = ListenerRegistry::new();
        registry.track(tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }));
        registry.track(tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }));

        assert_eq!(registry.active(), 2);
        assert_eq!(registry.abort_all(), 2);
        assert_eq!(registry.active(), 0);
    }

    #[tokio::test]
    async fn test_finished_tasks_are_pruned() {
        let registry = ListenerRegistry::new();
        let task = tokio::spawn(async {});
        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.track(task);
        assert_eq!(registry.active(), 0);
    }
}
