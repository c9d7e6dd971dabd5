//! The structural sync point.
//!
//! Structural changes (creating or destroying entities, adding or removing components) only
//! happen on one mutator thread, and never while parallel column work is in flight. Parallel
//! work announces itself with a [`JobHandle`]; every structural entry point first calls
//! [`SyncPoint::enter`], which checks the calling thread and waits until no handle is alive.
//!
//! ```rust,ignore
//! let job = world.sync_point().begin_job();
//! thread::spawn(move || {
//!     let _job = job;
//!     // ... column work ...
//! });
//! world.destroy_entity(e)?; // waits for the job above
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread::{self, ThreadId},
};

use crossbeam::utils::Backoff;

use crate::ecs::error::{Error, Result};

/// Counts outstanding parallel jobs and guards the mutator thread.
#[derive(Debug)]
pub struct SyncPoint {
    /// Live job handles.
    outstanding: Arc<AtomicUsize>,

    /// Number of completed barriers.
    generation: u64,

    /// The mutator thread.
    owner: ThreadId,

    /// Whether [`SyncPoint::check_thread`] verifies the owner.
    check_thread: bool,
}

impl SyncPoint {
    /// A sync point owned by the calling thread.
    pub fn new(check_thread: bool) -> Self {
        Self {
            outstanding: Arc::new(AtomicUsize::new(0)),
            generation: 0,
            owner: thread::current().id(),
            check_thread,
        }
    }

    /// Register a unit of parallel work. The work counts as outstanding until every clone of
    /// the returned handle is dropped.
    pub fn begin_job(&self) -> JobHandle {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        JobHandle {
            outstanding: Arc::clone(&self.outstanding),
        }
    }

    /// Number of live job handles.
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Number of barriers passed so far.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Block until no job is outstanding, then advance the generation.
    pub fn wait(&mut self) {
        let backoff = Backoff::new();
        while self.outstanding.load(Ordering::Acquire) != 0 {
            backoff.snooze();
        }
        self.generation += 1;
    }

    /// Fail with [`Error::ThreadAccess`] when called off the mutator thread.
    ///
    /// Only checked when enabled in the world config, which by default means debug builds.
    pub fn check_thread(&self) -> Result<()> {
        if self.check_thread && thread::current().id() != self.owner {
            return Err(Error::ThreadAccess);
        }
        Ok(())
    }

    /// Thread check followed by the barrier. Every structural operation starts here.
    pub fn enter(&mut self) -> Result<()> {
        self.check_thread()?;
        self.wait();
        Ok(())
    }

    /// Make the calling thread the mutator thread.
    pub fn bind_to_current_thread(&mut self) {
        self.owner = thread::current().id();
    }

    /// The mutator thread.
    #[inline]
    pub fn owner(&self) -> ThreadId {
        self.owner
    }
}

/// An outstanding unit of parallel work. Cloning counts as another unit.
#[derive(Debug)]
pub struct JobHandle {
    outstanding: Arc<AtomicUsize>,
}

impl Clone for JobHandle {
    fn clone(&self) -> Self {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        Self {
            outstanding: Arc::clone(&self.outstanding),
        }
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::AtomicBool,
        time::{Duration, Instant},
    };

    use super::*;

    #[test]
    fn handles_count_outstanding_work() {
        // Given
        let sync = SyncPoint::new(true);

        // When
        let a = sync.begin_job();
        let b = a.clone();

        // Then
        assert_eq!(sync.outstanding(), 2);
        drop(a);
        assert_eq!(sync.outstanding(), 1);
        drop(b);
        assert_eq!(sync.outstanding(), 0);
    }

    #[test]
    fn wait_blocks_until_jobs_finish() {
        // Given
        let mut sync = SyncPoint::new(true);
        let finished = Arc::new(AtomicBool::new(false));
        let job = sync.begin_job();
        let worker = {
            let finished = Arc::clone(&finished);
            thread::spawn(move || {
                let _job = job;
                thread::sleep(Duration::from_millis(50));
                finished.store(true, Ordering::Release);
            })
        };

        // When
        let start = Instant::now();
        sync.enter().unwrap();

        // Then - the barrier only returned after the job dropped its handle
        assert!(finished.load(Ordering::Acquire));
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(sync.generation(), 1);
        worker.join().unwrap();
    }

    #[test]
    fn wait_without_jobs_returns_immediately() {
        // Given
        let mut sync = SyncPoint::new(true);

        // When
        sync.wait();
        sync.wait();

        // Then
        assert_eq!(sync.generation(), 2);
    }

    #[test]
    fn foreign_thread_is_rejected() {
        // Given
        let sync = SyncPoint::new(true);

        // When
        let result = thread::scope(|scope| scope.spawn(|| sync.check_thread()).join().unwrap());

        // Then
        assert_eq!(result, Err(Error::ThreadAccess));
        assert_eq!(sync.check_thread(), Ok(()));
    }

    #[test]
    fn unchecked_sync_point_allows_any_thread() {
        // Given
        let sync = SyncPoint::new(false);

        // When
        let result = thread::scope(|scope| scope.spawn(|| sync.check_thread()).join().unwrap());

        // Then
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn rebinding_moves_ownership() {
        // Given
        let mut sync = SyncPoint::new(true);

        // When
        let sync = thread::spawn(move || {
            sync.bind_to_current_thread();
            assert_eq!(sync.check_thread(), Ok(()));
            sync
        })
        .join()
        .unwrap();

        // Then
        assert_eq!(sync.check_thread(), Err(Error::ThreadAccess));
    }
}
