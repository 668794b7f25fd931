use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    PhaseStart { name: String },
    PhaseFinish,

    TaskStart { total_steps: u64 },
    TaskIncrement,
    TaskFinish,

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

/// Forwards progress events to an optional callback and counts completed steps.
///
/// The counter is observability only; nothing in the sweep reads it to make decisions.
#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
    completed: AtomicU64,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
            completed: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        match event {
            Progress::TaskStart { .. } => self.completed.store(0, Ordering::Relaxed),
            Progress::TaskIncrement => {
                self.completed.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    /// Steps completed since the last `TaskStart`.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}
