// ABOUTME: Per-project inactivity timers backed by a single delay queue
// ABOUTME: Entries keyed by (deadline, project) are drained by one background loop

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

#[derive(Debug, Default)]
struct QueueState {
    queue: BTreeSet<(Instant, String)>,
    deadlines: HashMap<String, Instant>,
}

impl QueueState {
    fn remove(&mut self, project_id: &str) -> bool {
        match self.deadlines.remove(project_id) {
            Some(deadline) => {
                self.queue.remove(&(deadline, project_id.to_string()));
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<QueueState>,
    notify: Notify,
}

/// One timer per project. Deadlines use tokio's clock, so paused-time tests
/// advance them without sleeping.
#[derive(Debug, Clone, Default)]
pub struct TimeoutScheduler {
    inner: Arc<Inner>,
}

impl TimeoutScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer for `project_id`, replacing any earlier deadline.
    pub async fn schedule(&self, project_id: &str, duration: Duration) {
        let deadline = Instant::now() + duration;
        {
            let mut state = self.inner.state.lock().await;
            state.remove(project_id);
            state.queue.insert((deadline, project_id.to_string()));
            state.deadlines.insert(project_id.to_string(), deadline);
        }
        debug!("Armed idle timer for project {} ({:?})", project_id, duration);
        self.inner.notify.notify_one();
    }

    pub async fn cancel(&self, project_id: &str) {
        let removed = self.inner.state.lock().await.remove(project_id);
        if removed {
            debug!("Cancelled idle timer for project {}", project_id);
            self.inner.notify.notify_one();
        }
    }

    pub async fn is_armed(&self, project_id: &str) -> bool {
        self.inner.state.lock().await.deadlines.contains_key(project_id)
    }

    pub async fn deadline(&self, project_id: &str) -> Option<Instant> {
        self.inner.state.lock().await.deadlines.get(project_id).copied()
    }

    pub async fn armed_count(&self) -> usize {
        self.inner.state.lock().await.deadlines.len()
    }

    /// Wait for the earliest deadline to pass, disarm it and return its project.
    /// Each arming is returned at most once.
    pub async fn next_expired(&self) -> String {
        loop {
            let next_deadline = {
                let mut state = self.inner.state.lock().await;
                match state.queue.first().cloned() {
                    Some((deadline, project_id)) if deadline <= Instant::now() => {
                        state.remove(&project_id);
                        return project_id;
                    }
                    Some((deadline, _)) => Some(deadline),
                    None => None,
                }
            };

            match next_deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = sleep_until(deadline) => {}
                        _ = self.inner.notify.notified() => {}
                    }
                }
                None => self.inner.notify.notified().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_duration() {
        let scheduler = TimeoutScheduler::new();
        let start = Instant::now();

        scheduler.schedule("p1", Duration::from_secs(10)).await;
        assert!(scheduler.is_armed("p1").await);

        assert_eq!(scheduler.next_expired().await, "p1");
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(!scheduler.is_armed("p1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_slides_the_deadline() {
        let scheduler = TimeoutScheduler::new();
        let start = Instant::now();
        scheduler.schedule("p1", Duration::from_secs(10)).await;

        let rearm = scheduler.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            rearm.schedule("p1", Duration::from_secs(10)).await;
        });

        assert_eq!(scheduler.next_expired().await, "p1");
        assert!(start.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_skips_project() {
        let scheduler = TimeoutScheduler::new();
        scheduler.schedule("p1", Duration::from_secs(5)).await;
        scheduler.schedule("p2", Duration::from_secs(10)).await;
        scheduler.cancel("p1").await;

        assert_eq!(scheduler.next_expired().await, "p2");
        assert_eq!(scheduler.armed_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_in_deadline_order() {
        let scheduler = TimeoutScheduler::new();
        scheduler.schedule("late", Duration::from_secs(3)).await;
        scheduler.schedule("early", Duration::from_secs(1)).await;

        assert_eq!(scheduler.next_expired().await, "early");
        assert_eq!(scheduler.next_expired().await, "late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_at_most_once_per_arming() {
        let scheduler = TimeoutScheduler::new();
        scheduler.schedule("p1", Duration::from_secs(1)).await;
        assert_eq!(scheduler.next_expired().await, "p1");

        let again =
            tokio::time::timeout(Duration::from_secs(60), scheduler.next_expired()).await;
        assert!(again.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_picks_up_later_schedule() {
        let scheduler = TimeoutScheduler::new();
        let waiter = scheduler.clone();
        let handle = tokio::spawn(async move { waiter.next_expired().await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.schedule("p9", Duration::from_secs(2)).await;

        assert_eq!(handle.await.unwrap(), "p9");
    }
}
