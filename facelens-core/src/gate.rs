//! Scoped open/close gate for camera devices
//!
//! Opening and closing a camera must never interleave: a close that lands
//! while an open is still configuring the device leaves the device in an
//! undefined state. [`CameraGate`] is a single-owner lock whose guard is held
//! for the duration of an open or close sequence and released on drop, so
//! every exit path (early return, `?`, panic) gives the gate back.

use crate::error::FaceLensError;
use parking_lot::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

/// Default time to wait for the gate before giving up on an open
pub const DEFAULT_GATE_TIMEOUT: Duration = Duration::from_millis(2500);

/// Single-owner lock guarding camera open/close sequences
#[derive(Debug, Default)]
pub struct CameraGate {
    holder: Mutex<Option<String>>,
}

/// Proof of gate ownership. Dropping it releases the gate.
#[derive(Debug)]
pub struct CameraGateGuard<'a> {
    holder: MutexGuard<'a, Option<String>>,
}

impl CameraGate {
    /// Create an open gate
    pub fn new() -> Self {
        Self {
            holder: Mutex::new(None),
        }
    }

    /// Acquire the gate, waiting at most `timeout`
    ///
    /// A timeout is unrecoverable for the caller: the device is held by a
    /// sequence that did not finish in time.
    pub fn try_acquire_for(
        &self,
        operation: &str,
        timeout: Duration,
    ) -> Result<CameraGateGuard<'_>, FaceLensError> {
        match self.holder.try_lock_for(timeout) {
            Some(mut holder) => {
                debug!("Camera gate acquired for {}", operation);
                *holder = Some(operation.to_string());
                Ok(CameraGateGuard { holder })
            }
            None => {
                warn!("Time out waiting to lock camera gate for {}", operation);
                Err(FaceLensError::Timeout {
                    operation: format!("lock camera gate for {}", operation),
                    duration: timeout,
                })
            }
        }
    }

    /// Acquire the gate, waiting as long as needed
    pub fn acquire(&self, operation: &str) -> CameraGateGuard<'_> {
        let mut holder = self.holder.lock();
        debug!("Camera gate acquired for {}", operation);
        *holder = Some(operation.to_string());
        CameraGateGuard { holder }
    }

    /// Whether some sequence currently holds the gate
    pub fn is_locked(&self) -> bool {
        self.holder.is_locked()
    }
}

impl CameraGateGuard<'_> {
    /// Operation that acquired the gate
    pub fn operation(&self) -> &str {
        self.holder.as_deref().unwrap_or_default()
    }
}

impl Drop for CameraGateGuard<'_> {
    fn drop(&mut self) {
        if let Some(operation) = self.holder.take() {
            debug!("Camera gate released by {}", operation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_guard_releases_on_drop() {
        let gate = CameraGate::new();
        {
            let guard = gate.acquire("open");
            assert_eq!(guard.operation(), "open");
            assert!(gate.is_locked());
        }
        assert!(!gate.is_locked());
    }

    #[test]
    fn test_guard_releases_on_error_path() {
        fn failing_open(gate: &CameraGate) -> Result<(), FaceLensError> {
            let _guard = gate.try_acquire_for("open", Duration::from_millis(10))?;
            Err(FaceLensError::Camera {
                reason: "Cannot get available preview/video sizes".to_string(),
                fatal: true,
            })
        }

        let gate = CameraGate::new();
        assert!(failing_open(&gate).is_err());
        assert!(!gate.is_locked());
    }

    #[test]
    fn test_guard_releases_on_panic() {
        let gate = Arc::new(CameraGate::new());
        let panicking = gate.clone();
        let result = std::thread::spawn(move || {
            let _guard = panicking.acquire("open");
            panic!("device API blew up");
        })
        .join();

        assert!(result.is_err());
        assert!(!gate.is_locked());
        assert!(gate.try_acquire_for("close", Duration::from_millis(10)).is_ok());
    }

    #[test]
    fn test_try_acquire_times_out_while_held() {
        let gate = Arc::new(CameraGate::new());
        let _guard = gate.acquire("open");

        let contender = gate.clone();
        let result = std::thread::spawn(move || {
            contender
                .try_acquire_for("close", Duration::from_millis(20))
                .map(|_| ())
        })
        .join()
        .unwrap();

        match result {
            Err(FaceLensError::Timeout { duration, .. }) => {
                assert_eq!(duration, Duration::from_millis(20))
            }
            other => panic!("Expected timeout, got {:?}", other),
        }
    }
}
