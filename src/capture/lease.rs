use anyhow::Result;

use super::{CaptureConstraints, CaptureSource};
use crate::error::CameraAccessError;
use crate::frame::Frame;

/// Acquisition/release counters for a lease.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LeaseStats {
    pub acquisitions: u64,
    pub releases: u64,
}

/// Exclusive ownership of a capture source.
///
/// The lease forwards `release` to the source only while the stream is held,
/// so repeated releases are no-ops. Dropping the lease releases the stream
/// regardless of scanner state.
pub struct CameraLease {
    source: Box<dyn CaptureSource>,
    held: bool,
    stats: LeaseStats,
}

impl CameraLease {
    pub fn new(source: Box<dyn CaptureSource>) -> Self {
        Self {
            source,
            held: false,
            stats: LeaseStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn stats(&self) -> LeaseStats {
        self.stats
    }

    /// Acquire the stream. A held lease is not re-acquired.
    pub fn acquire(&mut self, constraints: &CaptureConstraints) -> Result<(), CameraAccessError> {
        if self.held {
            return Ok(());
        }
        match self.source.acquire(constraints) {
            Ok(()) => {
                self.held = true;
                self.stats.acquisitions += 1;
                log::info!(
                    "camera {} acquired ({}x{} @ {} fps requested)",
                    self.source.name(),
                    constraints.width,
                    constraints.height,
                    constraints.target_fps
                );
                Ok(())
            }
            Err(err) => {
                // A half-opened device still gets closed.
                self.source.release();
                Err(err)
            }
        }
    }

    /// Pull the current frame; `None` while not held or not ready.
    pub fn grab(&mut self) -> Result<Option<Frame>> {
        if !self.held {
            return Ok(None);
        }
        self.source.grab()
    }

    /// Release the stream. Safe to call any number of times.
    pub fn release(&mut self) {
        if !self.held {
            return;
        }
        self.source.release();
        self.held = false;
        self.stats.releases += 1;
        log::info!("camera {} released", self.source.name());
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.release();
    }
}
