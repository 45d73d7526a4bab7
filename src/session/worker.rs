//! Dedicated background thread for hardware calls and callbacks.

use crate::errors::RangefinderError;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::thread::{JoinHandle, ThreadId};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

enum WorkerMessage {
    Job(Job),
    Shutdown,
}

/// Cloneable posting end of the worker queue.
#[derive(Clone)]
pub(crate) struct WorkerHandle {
    sender: Sender<WorkerMessage>,
    thread_id: ThreadId,
}

impl WorkerHandle {
    /// Queue a job. Returns false once the worker has stopped.
    pub(crate) fn post(&self, job: Job) -> bool {
        self.sender.send(WorkerMessage::Job(job)).is_ok()
    }

    pub(crate) fn is_current_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Block until every job queued before this call has run. Returns how
    /// many messages were queued behind the barrier when it ran, or `None`
    /// once the worker has stopped.
    pub(crate) fn barrier(&self) -> Option<usize> {
        if self.is_current_thread() {
            return Some(0);
        }
        let (tx, rx) = crossbeam_channel::bounded(1);
        let sender = self.sender.clone();
        let posted = self.post(Box::new(move || {
            let _ = tx.send(sender.len());
        }));
        if !posted {
            return None;
        }
        rx.recv().ok()
    }
}

/// Owns the worker thread; dropping it drains and joins.
pub(crate) struct Worker {
    handle: WorkerHandle,
    join: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn(name: &str) -> Result<Self, RangefinderError> {
        let (sender, receiver) = unbounded();
        let join = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(receiver))
            .map_err(|e| {
                RangefinderError::DeviceUnavailable(format!("worker spawn failed: {}", e))
            })?;

        log::debug!("Started worker thread {}", name);
        Ok(Self {
            handle: WorkerHandle {
                sender,
                thread_id: join.thread().id(),
            },
            join: Some(join),
        })
    }

    pub(crate) fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Stop accepting work, run what is already queued, and join.
    pub(crate) fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };
        let _ = self.handle.sender.send(WorkerMessage::Shutdown);
        if self.handle.is_current_thread() {
            // Last owner dropped from inside a job; the loop exits on its own.
            return;
        }
        if join.join().is_err() {
            log::error!("Camera worker thread panicked");
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(receiver: Receiver<WorkerMessage>) {
    loop {
        match receiver.recv() {
            Ok(WorkerMessage::Job(job)) => run_job(job),
            Ok(WorkerMessage::Shutdown) | Err(_) => break,
        }
    }
    // Callbacks that raced the shutdown still get to release their handles.
    while let Ok(WorkerMessage::Job(job)) = receiver.try_recv() {
        run_job(job);
    }
    // Disconnecting discards anything posted after the drain; jobs release
    // what they carry when dropped.
    drop(receiver);
    log::debug!("Worker thread drained");
}

fn run_job(job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        log::error!("Camera worker job panicked; continuing with the next job");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_jobs_run_in_order_on_worker_thread() {
        let worker = Worker::spawn("test-worker").unwrap();
        let handle = worker.handle();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..5 {
            let seen = seen.clone();
            let h = handle.clone();
            assert!(handle.post(Box::new(move || {
                assert!(h.is_current_thread());
                seen.lock().unwrap().push(i);
            })));
        }
        assert_eq!(handle.barrier(), Some(0));
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert!(!handle.is_current_thread());
    }

    #[test]
    fn test_shutdown_drains_and_rejects_new_jobs() {
        let worker = Worker::spawn("test-worker").unwrap();
        let handle = worker.handle();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let count = count.clone();
            handle.post(Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }
        worker.shutdown();
        assert_eq!(count.load(Ordering::SeqCst), 10);
        assert!(!handle.post(Box::new(|| {})));
        assert_eq!(handle.barrier(), None);
    }

    struct DropFlag(Arc<AtomicUsize>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_panicking_job_does_not_stop_worker() {
        let worker = Worker::spawn("test-worker").unwrap();
        let handle = worker.handle();
        let count = Arc::new(AtomicUsize::new(0));
        assert!(handle.post(Box::new(|| panic!("job failure"))));
        let after = count.clone();
        assert!(handle.post(Box::new(move || {
            after.fetch_add(1, Ordering::SeqCst);
        })));
        assert_eq!(handle.barrier(), Some(0));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        worker.shutdown();
    }

    #[test]
    fn test_jobs_left_after_drain_are_dropped_not_leaked() {
        let (sender, receiver) = unbounded();
        let ran = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicUsize::new(0));

        sender.send(WorkerMessage::Shutdown).unwrap();
        sender.send(WorkerMessage::Shutdown).unwrap();
        let flag = DropFlag(dropped.clone());
        let ran_in_job = ran.clone();
        sender
            .send(WorkerMessage::Job(Box::new(move || {
                let _flag = flag;
                ran_in_job.fetch_add(1, Ordering::SeqCst);
            })))
            .unwrap();

        run(receiver);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
        assert!(sender.send(WorkerMessage::Shutdown).is_err());
    }

    #[test]
    fn test_rejected_post_drops_job() {
        let worker = Worker::spawn("test-worker").unwrap();
        let handle = worker.handle();
        worker.shutdown();

        let dropped = Arc::new(AtomicUsize::new(0));
        let flag = DropFlag(dropped.clone());
        assert!(!handle.post(Box::new(move || drop(flag))));
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }
}
