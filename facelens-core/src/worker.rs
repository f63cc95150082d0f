//! Named background worker thread
//!
//! Camera capture-session setup and repeating requests are serialized on one
//! dedicated thread so they never block the thread that drives playback. Jobs
//! run in the order they were posted; [`BackgroundWorker::quit_safely`] lets
//! the queue drain before joining the thread.

use crate::error::FaceLensError;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A thread that runs posted jobs one at a time
#[derive(Debug)]
pub struct BackgroundWorker {
    name: String,
    sender: Option<mpsc::UnboundedSender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundWorker {
    /// Spawn the worker thread
    pub fn start(name: &str) -> Result<Self, FaceLensError> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let thread_name = name.to_string();

        let handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let mut jobs_run = 0u64;
                while let Some(job) = receiver.blocking_recv() {
                    job();
                    jobs_run += 1;
                }
                debug!("Worker {} drained after {} jobs", thread_name, jobs_run);
            })?;

        info!("Started background worker {}", name);

        Ok(Self {
            name: name.to_string(),
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Worker name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the worker still accepts jobs
    pub fn is_running(&self) -> bool {
        self.sender.is_some()
    }

    /// Queue a job
    pub fn post<F>(&self, job: F) -> Result<(), FaceLensError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or_else(|| self.stopped())?;
        sender.send(Box::new(job)).map_err(|_| self.stopped())
    }

    /// Queue a job and get a receiver for its result
    pub fn submit<F, R>(&self, job: F) -> Result<oneshot::Receiver<R>, FaceLensError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.post(move || {
            let _ = tx.send(job());
        })?;
        Ok(rx)
    }

    /// Queue a job and block the calling thread until it finishes
    ///
    /// Must not be called from inside an async runtime.
    pub fn run_blocking<F, R>(&self, job: F) -> Result<R, FaceLensError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.submit(job)?
            .blocking_recv()
            .map_err(|_| self.stopped())
    }

    /// Stop accepting jobs, let queued jobs finish, then join the thread
    pub fn quit_safely(&mut self) -> Result<(), FaceLensError> {
        // Closing the channel ends the receive loop once the queue is empty
        self.sender = None;

        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| {
                warn!("Worker {} panicked while draining", self.name);
                self.stopped()
            })?;
            info!("Stopped background worker {}", self.name);
        }
        Ok(())
    }

    fn stopped(&self) -> FaceLensError {
        FaceLensError::WorkerStopped {
            name: self.name.clone(),
        }
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.quit_safely();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_jobs_run_in_order() {
        let mut worker = BackgroundWorker::start("CameraBackground").unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let log = log.clone();
            worker.post(move || log.lock().push(i)).unwrap();
        }

        worker.quit_safely().unwrap();
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_run_blocking_returns_value() {
        let worker = BackgroundWorker::start("CameraBackground").unwrap();
        let name = worker
            .run_blocking(|| std::thread::current().name().map(str::to_string))
            .unwrap();
        assert_eq!(name.as_deref(), Some("CameraBackground"));
    }

    #[test]
    fn test_post_after_quit_fails() {
        let mut worker = BackgroundWorker::start("CameraBackground").unwrap();
        worker.quit_safely().unwrap();

        assert!(!worker.is_running());
        match worker.post(|| {}) {
            Err(FaceLensError::WorkerStopped { name }) => assert_eq!(name, "CameraBackground"),
            other => panic!("Expected WorkerStopped, got {:?}", other),
        }
        // A second quit is a no-op
        assert!(worker.quit_safely().is_ok());
    }
}
