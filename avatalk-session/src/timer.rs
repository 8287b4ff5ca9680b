//! Inactivity deadline for a live session.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Single-shot session deadline. Dropping the timer cancels it.
#[derive(Debug)]
pub struct InactivityTimer {
    deadline: DateTime<Utc>,
    task: JoinHandle<()>,
}

impl InactivityTimer {
    /// Run `on_expire` once after `timeout` unless cancelled first.
    pub fn arm<F>(timeout: Duration, on_expire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        // Deadlines past chrono's range saturate instead of overflowing.
        let deadline = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            on_expire();
        });
        Self { deadline, task }
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for InactivityTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
