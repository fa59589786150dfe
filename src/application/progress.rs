// Incremental progress reporting for long-running plot requests
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
    pub message: String,
}

/// Counts completed steps and forwards them to an optional listener. A
/// reporter without a listener only counts.
#[derive(Debug)]
pub struct ProgressReporter {
    tx: Option<mpsc::Sender<Progress>>,
    total: usize,
    done: AtomicUsize,
}

impl ProgressReporter {
    pub fn new(tx: Option<mpsc::Sender<Progress>>, total: usize) -> Self {
        Self {
            tx,
            total,
            done: AtomicUsize::new(0),
        }
    }

    pub fn silent() -> Self {
        Self::new(None, 0)
    }

    pub async fn step(&self, message: impl Into<String>) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(tx) = &self.tx {
            // A dropped receiver just means nobody is watching anymore.
            let _ = tx
                .send(Progress {
                    done,
                    total: self.total.max(done),
                    message: message.into(),
                })
                .await;
        }
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }
}
