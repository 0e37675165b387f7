//! The single-slot background worker.
//!
//! At most one job runs at a time. Progress lives in one struct behind one
//! lock, so [`BackgroundWorker::poll`] always returns a consistent snapshot.
//! Cancellation is checked between items; the item in flight always
//! finishes or fails first.

mod job;
mod progress;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::cancel::CancellationToken;
use crate::error::{ErrorPayload, JournalError, Result};

pub use job::WorkerJob;
use job::JobOutcome;
pub use progress::{WorkerProgress, WorkerState};

#[derive(Debug)]
struct ActiveJob {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
pub struct BackgroundWorker {
    slot: Mutex<Option<ActiveJob>>,
    progress: Arc<Mutex<WorkerProgress>>,
}

impl BackgroundWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `job` on a new thread unless one is still running.
    pub fn start(&self, job: WorkerJob) -> Result<()> {
        let mut slot = self.slot.lock();
        if slot
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
        {
            return Err(JournalError::WorkerBusy);
        }
        if let Some(finished) = slot.take() {
            join(finished.handle);
        }

        let kind = job.kind();
        let total = job.len();
        *self.progress.lock() = WorkerProgress::started(total);
        log::info!("background job started kind={} items={}", kind, total);

        let cancel = CancellationToken::new();
        let cancel_for_thread = cancel.clone();
        let progress = self.progress.clone();
        let handle = thread::Builder::new()
            .name(format!("journals-{kind}"))
            .spawn(move || {
                // Catch panics so the slot always reaches a terminal state.
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    job.run(&progress, &cancel_for_thread)
                }));
                let (state, error) = match result {
                    Ok(Ok(JobOutcome::Completed)) => (WorkerState::Completed, None),
                    Ok(Ok(JobOutcome::Cancelled)) => (WorkerState::Cancelled, None),
                    Ok(Err(error)) => {
                        log::warn!("background job failed kind={}: {}", kind, error);
                        (WorkerState::Failed, Some(error.payload()))
                    }
                    Err(panic_info) => {
                        let message = if let Some(s) = panic_info.downcast_ref::<&str>() {
                            s.to_string()
                        } else if let Some(s) = panic_info.downcast_ref::<String>() {
                            s.clone()
                        } else {
                            "worker thread panicked".to_string()
                        };
                        log::error!("background job panicked kind={}: {}", kind, message);
                        (
                            WorkerState::Failed,
                            Some(ErrorPayload {
                                kind: "panic",
                                message: format!("panic during {kind}: {message}"),
                                fatal: true,
                            }),
                        )
                    }
                };

                let mut progress = progress.lock();
                progress.finish(state, error);
                log::info!(
                    "background job finished kind={} state={} completed={}/{}",
                    kind,
                    state.as_str(),
                    progress.num_completed,
                    progress.total
                );
            })
            .map_err(|error| {
                let error = JournalError::from(error);
                self.progress
                    .lock()
                    .finish(WorkerState::Failed, Some(error.payload()));
                error
            })?;

        *slot = Some(ActiveJob { cancel, handle });
        Ok(())
    }

    /// Snapshot of the current or last job's progress.
    pub fn poll(&self) -> WorkerProgress {
        self.progress.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Asks the running job to stop after its current item, without waiting.
    pub fn request_stop(&self) {
        if let Some(active) = self.slot.lock().as_ref() {
            active.cancel.cancel();
        }
    }

    /// Cancels the running job, waits for it to exit and clears the slot.
    pub fn stop(&self) -> WorkerProgress {
        let mut slot = self.slot.lock();
        if let Some(active) = slot.take() {
            active.cancel.cancel();
            join(active.handle);
        }
        self.poll()
    }

    /// Waits for the running job to finish on its own.
    pub fn wait(&self) -> WorkerProgress {
        let mut slot = self.slot.lock();
        if let Some(active) = slot.take() {
            join(active.handle);
        }
        self.poll()
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        if let Some(active) = self.slot.get_mut().take() {
            active.cancel.cancel();
            join(active.handle);
        }
    }
}

fn join(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        log::warn!("background worker thread exited abnormally");
    }
}
