//! Named, repeatable, thread-partitioned job registry.
//!
//! The worker owns a fixed-size rayon pool created once and reused for
//! every fit iteration. A job is a per-thread work function plus an
//! optional serial post step; `run` broadcasts the work across all pool
//! threads, barrier-synchronizes, then runs the post step. The caller
//! blocks until completion; there is no cancellation or timeout, and a
//! panic in a worker aborts the run. The worker imposes no ordering
//! between different named jobs; sequencing is the caller's
//! responsibility.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Mutex;

use xf_core::{Error, Result};

/// Per-thread execution context handed to job work functions.
#[derive(Debug, Clone, Copy)]
pub struct ThreadContext {
    /// This thread's index in `0..thread_count`
    pub thread_index: usize,
    /// Pool size
    pub thread_count: usize,
}

type WorkFn = Box<dyn Fn(ThreadContext) + Send + Sync>;
type PostFn = Box<dyn Fn() + Send + Sync>;

struct Job {
    work: WorkFn,
    post: Option<PostFn>,
}

/// Fixed-pool scheduler for named, repeatable data-parallel jobs.
pub struct ParallelWorker {
    pool: rayon::ThreadPool,
    thread_count: usize,
    jobs: HashMap<String, Job>,
}

impl ParallelWorker {
    /// Build the worker and its pool. The pool lives as long as the
    /// worker; it is never recreated per call.
    pub fn new(thread_count: usize) -> Result<Self> {
        if thread_count == 0 {
            return Err(Error::Config("Thread count must be at least 1".to_string()));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(thread_count)
            .thread_name(|i| format!("xf-worker-{}", i))
            .build()
            .map_err(|e| Error::Config(format!("Could not build thread pool: {}", e)))?;
        Ok(Self { pool, thread_count, jobs: HashMap::new() })
    }

    /// Pool size
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Register a named job. Duplicate names are a configuration error.
    pub fn register<F>(&mut self, name: impl Into<String>, work: F) -> Result<()>
    where
        F: Fn(ThreadContext) + Send + Sync + 'static,
    {
        let name = name.into();
        if self.jobs.contains_key(&name) {
            return Err(Error::Config(format!("Job '{}' is already registered", name)));
        }
        self.jobs.insert(name, Job { work: Box::new(work), post: None });
        Ok(())
    }

    /// Attach a serial post step to an already-registered job, run once
    /// after all threads finish.
    pub fn set_post_work<F>(&mut self, name: &str, post: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let job = self
            .jobs
            .get_mut(name)
            .ok_or_else(|| Error::Config(format!("Unknown job '{}'", name)))?;
        job.post = Some(Box::new(post));
        Ok(())
    }

    /// Run a named job to completion: broadcast the per-thread work
    /// across the whole pool, wait for every thread, then run the post
    /// step if one is attached.
    pub fn run(&self, name: &str) -> Result<()> {
        let job = self
            .jobs
            .get(name)
            .ok_or_else(|| Error::Config(format!("Unknown job '{}'", name)))?;

        let thread_count = self.thread_count;
        self.pool.broadcast(|ctx| {
            (job.work)(ThreadContext { thread_index: ctx.index(), thread_count });
        });

        if let Some(post) = &job.post {
            post();
        }
        Ok(())
    }
}

/// Contiguous index range handled by thread `thread_index` when `len`
/// items are split across `thread_count` threads. The first `len %
/// thread_count` threads take one extra item.
pub fn partition_range(len: usize, thread_index: usize, thread_count: usize) -> Range<usize> {
    debug_assert!(thread_index < thread_count);
    let base = len / thread_count;
    let extra = len % thread_count;
    let start = thread_index * base + thread_index.min(extra);
    let end = start + base + usize::from(thread_index < extra);
    start..end
}

/// First-error-wins slot for surfacing failures out of worker threads.
///
/// `broadcast` work functions cannot return a `Result`, so job bodies
/// record internal inconsistencies here and the calling step turns the
/// recorded error into its own return value.
#[derive(Default)]
pub struct JobErrorSlot {
    inner: Mutex<Option<Error>>,
}

impl JobErrorSlot {
    /// Record an error. Later errors from other threads are dropped.
    pub fn record(&self, err: Error) {
        let mut slot = self.inner.lock().expect("job error slot mutex poisoned");
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    /// Whether an error has been recorded since the last `take`. Lets a
    /// serial post step skip work whose inputs the failed threads never
    /// produced.
    pub fn is_set(&self) -> bool {
        self.inner.lock().expect("job error slot mutex poisoned").is_some()
    }

    /// Take the recorded error, leaving the slot empty for the next run.
    pub fn take(&self) -> Result<()> {
        match self.inner.lock().expect("job error slot mutex poisoned").take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
