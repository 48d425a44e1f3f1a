//! Single-worker FIFO task queue
//!
//! Each island owns one of these. Jobs are nullary closures executed in
//! enqueue order by a dedicated worker thread; a handle per job delivers
//! either completion or the failure the job raised. A panicking job is
//! caught and surfaced as a user error, so the worker never dies early.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::error::{lock, Error, Result};

type Job = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

enum Outcome {
    Pending,
    Done(Result<()>),
    Claimed,
}

struct Slot {
    outcome: Mutex<Outcome>,
    ready: Condvar,
}

impl Slot {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(Outcome::Pending),
            ready: Condvar::new(),
        }
    }
}

/// Handle to one enqueued job.
pub struct TaskHandle {
    slot: Arc<Slot>,
}

impl TaskHandle {
    /// Block until the job has run, then consume its outcome.
    ///
    /// Consumption is one-shot: the first call delivers the job's failure,
    /// if any; later calls return success.
    pub fn wait(&self) -> Result<()> {
        let mut outcome = lock(&self.slot.outcome, "task slot")?;
        while matches!(*outcome, Outcome::Pending) {
            outcome = self
                .slot
                .ready
                .wait(outcome)
                .map_err(|_| Error::Synchronization("the task slot wait was poisoned".into()))?;
        }
        match std::mem::replace(&mut *outcome, Outcome::Claimed) {
            Outcome::Done(result) => result,
            _ => Ok(()),
        }
    }

    /// Non-blocking poll: whether the job has finished running.
    pub fn is_finished(&self) -> Result<bool> {
        let outcome = lock(&self.slot.outcome, "task slot")?;
        Ok(!matches!(*outcome, Outcome::Pending))
    }
}

/// FIFO queue of nullary jobs consumed by one dedicated worker thread.
///
/// Dropping the queue closes it; the worker drains the jobs still pending
/// and then exits, and the drop joins it.
pub struct TaskQueue {
    jobs: Mutex<Option<Sender<(Job, Arc<Slot>)>>>,
    worker: Option<JoinHandle<()>>,
}

impl TaskQueue {
    /// Start the worker thread.
    pub fn new() -> Result<Self> {
        let (jobs, feed) = mpsc::channel::<(Job, Arc<Slot>)>();
        let worker = std::thread::Builder::new()
            .name("pelago-island-worker".into())
            .spawn(move || {
                for (job, slot) in feed {
                    let result = panic::catch_unwind(AssertUnwindSafe(job))
                        .unwrap_or_else(|payload| Err(Error::User(panic_text(&payload))));
                    // A poisoned slot guard still holds a usable state.
                    let mut outcome = slot
                        .outcome
                        .lock()
                        .unwrap_or_else(|e| e.into_inner());
                    *outcome = Outcome::Done(result);
                    drop(outcome);
                    slot.ready.notify_all();
                }
            })?;
        Ok(Self {
            jobs: Mutex::new(Some(jobs)),
            worker: Some(worker),
        })
    }

    /// Enqueue a job. Either the job is queued and a valid handle is
    /// returned, or an error is returned and nothing was queued.
    pub fn enqueue(
        &self,
        job: impl FnOnce() -> Result<()> + Send + 'static,
    ) -> Result<TaskHandle> {
        let slot = Arc::new(Slot::new());
        let jobs = lock(&self.jobs, "task queue")?;
        let sender = jobs.as_ref().ok_or_else(|| {
            Error::Synchronization("the task queue has been shut down".into())
        })?;
        sender
            .send((Box::new(job), Arc::clone(&slot)))
            .map_err(|_| Error::Synchronization("the task queue worker is gone".into()))?;
        Ok(TaskHandle { slot })
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what is left and exit.
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.take();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_jobs_run_in_enqueue_order() {
        let queue = TaskQueue::new().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..20 {
            let log = Arc::clone(&log);
            handles.push(
                queue
                    .enqueue(move || {
                        log.lock().unwrap().push(i);
                        Ok(())
                    })
                    .unwrap(),
            );
        }
        for handle in &handles {
            handle.wait().unwrap();
        }
        assert_eq!(*log.lock().unwrap(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_handle_delivers_the_job_failure() {
        let queue = TaskQueue::new().unwrap();
        let handle = queue
            .enqueue(|| Err(Error::User("deliberate".into())))
            .unwrap();
        let err = handle.wait().unwrap_err();
        assert_eq!(err.to_string(), "deliberate");
        // One-shot: the failure has been claimed.
        handle.wait().unwrap();
    }

    #[test]
    fn test_panicking_job_becomes_a_user_error() {
        let queue = TaskQueue::new().unwrap();
        let handle = queue.enqueue(|| panic!("exploded")).unwrap();
        let err = handle.wait().unwrap_err();
        assert!(matches!(err, Error::User(_)));
        assert!(err.to_string().contains("exploded"));

        // The worker survived and keeps serving jobs.
        let after = queue.enqueue(|| Ok(())).unwrap();
        after.wait().unwrap();
    }

    #[test]
    fn test_is_finished_polls_without_blocking() {
        let queue = TaskQueue::new().unwrap();
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let in_job = Arc::clone(&gate);
        let handle = queue
            .enqueue(move || {
                let (open, bell) = &*in_job;
                let mut open = open.lock().unwrap();
                while !*open {
                    open = bell.wait(open).unwrap();
                }
                Ok(())
            })
            .unwrap();

        assert!(!handle.is_finished().unwrap());
        let (open, bell) = &*gate;
        *open.lock().unwrap() = true;
        bell.notify_all();
        handle.wait().unwrap();
        assert!(handle.is_finished().unwrap());
    }

    #[test]
    fn test_drop_drains_pending_jobs() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let queue = TaskQueue::new().unwrap();
            for _ in 0..10 {
                let counter = Arc::clone(&counter);
                queue
                    .enqueue(move || {
                        std::thread::sleep(Duration::from_millis(1));
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .unwrap();
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }
}
