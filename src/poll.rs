//! Completion polling shared by DMA engines and control interfaces.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use crate::Error;

/// Cloneable flag that aborts a running wait from another thread.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// How a wait polls the hardware.
///
/// The default busy-waits forever. A non-zero interval sleeps between polls.
/// A deadline or a cancel token make the wait give up with
/// [`Error::Timeout`] or [`Error::Cancelled`]; the hardware stays armed in
/// that case.
#[derive(Clone, Debug, Default)]
pub struct PollPolicy {
    interval: Duration,
    deadline: Option<Instant>,
    cancel: Option<CancelToken>,
}

impl PollPolicy {
    pub fn busy() -> PollPolicy {
        PollPolicy::default()
    }

    pub fn every(interval: Duration) -> PollPolicy {
        PollPolicy {
            interval,
            ..PollPolicy::default()
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> PollPolicy {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> PollPolicy {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> PollPolicy {
        self.cancel = Some(token);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn check_abort(&self) -> Result<(), Error> {
        if let Some(token) = &self.cancel {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
        }
        Ok(())
    }

    /// Poll `done` until it returns true.
    pub fn poll_until(&self, mut done: impl FnMut() -> bool) -> Result<(), Error> {
        loop {
            if done() {
                return Ok(());
            }
            self.check_abort()?;
            if self.interval.is_zero() {
                std::hint::spin_loop();
            } else {
                thread::sleep(self.interval);
            }
        }
    }

    /// Like [`PollPolicy::poll_until`], but yields to the executor between
    /// polls. A zero interval still waits for one timer tick so other tasks
    /// can run.
    #[cfg(feature = "async")]
    pub async fn poll_until_async(&self, mut done: impl FnMut() -> bool) -> Result<(), Error> {
        const MIN_INTERVAL: Duration = Duration::from_micros(10);
        loop {
            if done() {
                return Ok(());
            }
            self.check_abort()?;
            async_io::Timer::after(self.interval.max(MIN_INTERVAL)).await;
        }
    }
}

impl From<Duration> for PollPolicy {
    fn from(interval: Duration) -> PollPolicy {
        PollPolicy::every(interval)
    }
}
