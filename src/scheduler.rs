//! Dispatch of settlement continuations.
//!
//! There is no event loop: when a promise settles, each of its continuations
//! is handed to the promise's [`Scheduler`] and runs concurrently with the
//! others and with the settling thread.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::thread;

use futures::executor::ThreadPool;
use parking_lot::Mutex;

use crate::error::{ConfigError, ConfigResult};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

static GLOBAL: OnceLock<Scheduler> = OnceLock::new();

/// How continuations are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// A fresh named OS thread per continuation.
    ThreadPerContinuation,
    /// A fixed-size `futures` thread pool.
    Pool,
}

/// Configuration for a [`Scheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub strategy: Strategy,

    /// Thread name (or name prefix for pool workers)
    pub thread_name: String,

    /// Stack size for spawned threads (None for the platform default)
    pub stack_size: Option<usize>,

    /// Number of workers when `strategy` is `Pool`
    pub pool_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::ThreadPerContinuation,
            thread_name: "settle-continuation".to_string(),
            stack_size: None,
            pool_size: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run continuations on a pool of `pool_size` workers.
    ///
    /// Blocking inside a handler (for instance calling `wait` on a promise
    /// that another continuation settles) can starve a small pool.
    pub fn with_pool(mut self, pool_size: usize) -> ConfigResult<Self> {
        if pool_size == 0 {
            return Err(ConfigError::InvalidPoolSize { size: pool_size });
        }
        self.strategy = Strategy::Pool;
        self.pool_size = pool_size;
        Ok(self)
    }

    pub fn with_thread_name<S: Into<String>>(mut self, name: S) -> ConfigResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigError::EmptyThreadName);
        }
        self.thread_name = name;
        Ok(self)
    }

    pub fn with_stack_size(mut self, size: usize) -> ConfigResult<Self> {
        if size == 0 {
            return Err(ConfigError::InvalidStackSize { size });
        }
        self.stack_size = Some(size);
        Ok(self)
    }

    /// Check that the configuration is valid
    pub fn validate(&self) -> ConfigResult<()> {
        if self.thread_name.is_empty() {
            return Err(ConfigError::EmptyThreadName);
        }
        if self.stack_size == Some(0) {
            return Err(ConfigError::InvalidStackSize { size: 0 });
        }
        if self.strategy == Strategy::Pool && self.pool_size == 0 {
            return Err(ConfigError::InvalidPoolSize { size: 0 });
        }
        Ok(())
    }

    pub fn build(self) -> ConfigResult<Scheduler> {
        self.validate()?;
        let kind = match self.strategy {
            Strategy::ThreadPerContinuation => Kind::Threads {
                name: self.thread_name,
                stack_size: self.stack_size,
            },
            Strategy::Pool => {
                let mut builder = ThreadPool::builder();
                builder
                    .pool_size(self.pool_size)
                    .name_prefix(format!("{}-", self.thread_name));
                if let Some(size) = self.stack_size {
                    builder.stack_size(size);
                }
                Kind::Pool(builder.create()?)
            }
        };
        Ok(Scheduler {
            kind: Arc::new(kind),
        })
    }
}

enum Kind {
    Threads {
        name: String,
        stack_size: Option<usize>,
    },
    Pool(ThreadPool),
    Inline,
}

/// Runs the continuations of settled promises.
///
/// Cloning is cheap; clones share the same threads.
#[derive(Clone)]
pub struct Scheduler {
    kind: Arc<Kind>,
}

impl Scheduler {
    /// The process-wide scheduler, created from the default configuration on
    /// first use unless [`install_global`](Self::install_global) ran first.
    pub fn global() -> Scheduler {
        GLOBAL.get_or_init(Scheduler::default).clone()
    }

    /// Make `scheduler` the process-wide scheduler. Fails once the global
    /// scheduler has been used or installed.
    pub fn install_global(scheduler: Scheduler) -> ConfigResult<()> {
        GLOBAL
            .set(scheduler)
            .map_err(|_| ConfigError::GlobalAlreadySet)
    }

    /// Run every continuation on the thread that settles the promise.
    ///
    /// Handlers then execute before `resolve`/`reject` returns, which makes
    /// ordering deterministic in tests. Not suitable when handlers block.
    pub fn inline() -> Scheduler {
        Scheduler {
            kind: Arc::new(Kind::Inline),
        }
    }

    pub(crate) fn spawn(&self, job: Job) {
        match &*self.kind {
            Kind::Inline => job(),
            Kind::Pool(pool) => pool.spawn_ok(async move { job() }),
            Kind::Threads { name, stack_size } => {
                // Builder::spawn consumes the closure even when it fails, so
                // the job is parked in a slot we can take it back from.
                let slot = Arc::new(Mutex::new(Some(job)));
                let theirs = Arc::clone(&slot);
                let mut builder = thread::Builder::new().name(name.clone());
                if let Some(size) = stack_size {
                    builder = builder.stack_size(*size);
                }
                let spawned = builder.spawn(move || {
                    let job = theirs.lock().take();
                    if let Some(job) = job {
                        job();
                    }
                });
                if let Err(err) = spawned {
                    tracing::error!(error = %err, "failed to spawn continuation thread, running inline");
                    let job = slot.lock().take();
                    if let Some(job) = job {
                        job();
                    }
                }
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler {
            kind: Arc::new(Kind::Threads {
                name: SchedulerConfig::default().thread_name,
                stack_size: None,
            }),
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &*self.kind {
            Kind::Threads { .. } => "Threads",
            Kind::Pool(_) => "Pool",
            Kind::Inline => "Inline",
        };
        f.debug_struct("Scheduler").field("kind", &kind).finish()
    }
}
