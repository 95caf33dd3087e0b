//! # Roster Runtime
//!
//! Async runtime abstractions for Roster.
//!
//! This crate provides:
//! - A `Runtime` trait giving the membership sweep a clock, sleep and spawn
//! - **Tokio** and mock implementations
//! - The [`Sweeper`](sweeper::Sweeper) that periodically evicts expired
//!   membership records
//!
//! ## Feature Flags
//!
//! - `tokio` (default): Tokio runtime and the sweeper task

use core::future::Future;
use core::time::Duration;
use std::time::Instant;

#[cfg(feature = "tokio")]
pub mod sweeper;

#[cfg(feature = "tokio")]
pub use sweeper::{Sweeper, SweeperHandle};

/// Runtime trait for async operations
pub trait Runtime: Send + Sync + 'static {
    /// Get the current instant
    fn now(&self) -> Instant;

    /// Sleep for the specified duration
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Spawn a task (if supported by the runtime)
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

#[cfg(feature = "tokio")]
pub mod tokio_runtime {
    //! Tokio-based runtime implementation

    use super::*;

    /// Tokio runtime wrapper
    #[derive(Debug, Clone, Default)]
    pub struct TokioRuntime;

    impl TokioRuntime {
        /// Create a new Tokio runtime wrapper
        pub fn new() -> Self {
            Self
        }
    }

    impl Runtime for TokioRuntime {
        fn now(&self) -> Instant {
            tokio::time::Instant::now().into_std()
        }

        async fn sleep(&self, duration: Duration) {
            tokio::time::sleep(duration).await;
        }

        fn spawn<F>(&self, future: F)
        where
            F: Future<Output = ()> + Send + 'static,
        {
            tokio::spawn(future);
        }
    }
}

/// Mock runtime for testing
pub mod mock_runtime {
    use super::*;
    use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    /// Mock runtime with a manually advanced clock.
    ///
    /// There is no executor: spawned futures are counted and dropped unpolled.
    #[derive(Debug)]
    pub struct MockRuntime {
        origin: Instant,
        elapsed_ms: AtomicU64,
        spawned: AtomicUsize,
    }

    impl Default for MockRuntime {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockRuntime {
        /// Create a mock runtime whose clock starts now
        pub fn new() -> Self {
            Self::starting_at(Instant::now())
        }

        /// Create a mock runtime whose clock starts at `origin`
        pub fn starting_at(origin: Instant) -> Self {
            Self {
                origin,
                elapsed_ms: AtomicU64::new(0),
                spawned: AtomicUsize::new(0),
            }
        }

        /// Advance the mock clock, saturating at `u64::MAX` milliseconds
        pub fn advance(&self, duration: Duration) {
            let step = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
            let _ = self
                .elapsed_ms
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |elapsed| {
                    Some(elapsed.saturating_add(step))
                });
        }

        /// Virtual time elapsed since the origin
        pub fn elapsed(&self) -> Duration {
            Duration::from_millis(self.elapsed_ms.load(Ordering::SeqCst))
        }

        /// Number of futures handed to [`Runtime::spawn`]
        pub fn spawned(&self) -> usize {
            self.spawned.load(Ordering::SeqCst)
        }
    }

    impl Runtime for MockRuntime {
        fn now(&self) -> Instant {
            self.origin + self.elapsed()
        }

        async fn sleep(&self, duration: Duration) {
            // Virtual time: sleeping just moves the clock
            self.advance(duration);
        }

        fn spawn<F>(&self, future: F)
        where
            F: Future<Output = ()> + Send + 'static,
        {
            self.spawned.fetch_add(1, Ordering::SeqCst);
            drop(future);
        }
    }
}

/// Get the default runtime based on features
#[cfg(feature = "tokio")]
pub fn default_runtime() -> tokio_runtime::TokioRuntime {
    tokio_runtime::TokioRuntime::new()
}
