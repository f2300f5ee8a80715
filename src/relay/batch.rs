//! Partial-failure-tolerant batch execution.
//!
//! Each item runs in isolation: a failing item is recorded in its report entry
//! and never stops the rest of the batch.

use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ZpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome<T> {
    Succeeded { result: T },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry<I, T> {
    pub index: usize,
    pub input: I,
    #[serde(flatten)]
    pub outcome: ItemOutcome<T>,
}

impl<I, T> BatchEntry<I, T> {
    pub fn result(&self) -> Option<&T> {
        match &self.outcome {
            ItemOutcome::Succeeded { result } => Some(result),
            ItemOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ItemOutcome::Succeeded { .. } => None,
            ItemOutcome::Failed { error } => Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport<I, T> {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<BatchEntry<I, T>>,
}

impl<I, T> BatchReport<I, T> {
    fn from_entries(results: Vec<BatchEntry<I, T>>) -> Self {
        let successful = results
            .iter()
            .filter(|entry| matches!(entry.outcome, ItemOutcome::Succeeded { .. }))
            .count();
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchRunner {
    /// Pause between item starts, for provider rate limits.
    delay: Duration,
    concurrency: usize,
}

impl Default for BatchRunner {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl BatchRunner {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            concurrency: 1,
        }
    }

    /// Items in flight at once for [`BatchRunner::execute`]. Zero counts as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs sequentially, or on the pool when concurrency is above one.
    pub fn execute<I, T, F>(&self, items: &[I], op: F) -> BatchReport<I, T>
    where
        I: Clone + Sync + Send,
        T: Send,
        F: Fn(usize, &I) -> Result<T, ZpError> + Sync,
    {
        if self.concurrency > 1 {
            self.run_parallel(items, self.concurrency, op)
        } else {
            self.run(items, op)
        }
    }

    /// Runs `op` over `items` in input order.
    pub fn run<I, T, F>(&self, items: &[I], mut op: F) -> BatchReport<I, T>
    where
        I: Clone,
        F: FnMut(usize, &I) -> Result<T, ZpError>,
    {
        queue(items.len());
        let mut entries = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            if index > 0 && !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            entries.push(run_item(index, item, &mut op));
        }
        BatchReport::from_entries(entries)
    }

    /// Runs `op` on a pool of at most `concurrency` threads. Item starts are
    /// still spaced by the runner delay across all threads. Entries stay in
    /// input order regardless of completion order.
    pub fn run_parallel<I, T, F>(&self, items: &[I], concurrency: usize, op: F) -> BatchReport<I, T>
    where
        I: Clone + Sync + Send,
        T: Send,
        F: Fn(usize, &I) -> Result<T, ZpError> + Sync,
    {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency.max(1))
            .build()
        {
            Ok(pool) => pool,
            Err(err) => {
                warn!(error = %err, "thread pool unavailable, running batch sequentially");
                return self.run(items, op);
            }
        };

        queue(items.len());
        let pacer = Pacer::new(self.delay);
        let entries = pool.install(|| {
            items
                .par_iter()
                .enumerate()
                .map(|(index, item)| {
                    pacer.wait();
                    run_item(index, item, &op)
                })
                .collect()
        });
        BatchReport::from_entries(entries)
    }
}

/// Hands out start times `delay` apart to whichever thread asks next.
struct Pacer {
    delay: Duration,
    next: Mutex<Option<Instant>>,
}

impl Pacer {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            next: Mutex::new(None),
        }
    }

    fn wait(&self) {
        if self.delay.is_zero() {
            return;
        }
        let start = {
            let mut next = self.next.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let start = next.map_or(now, |next| next.max(now));
            *next = Some(start + self.delay);
            start
        };
        let now = Instant::now();
        if start > now {
            thread::sleep(start - now);
        }
    }
}

fn queue(len: usize) {
    for index in 0..len {
        debug!(index, state = ?ItemState::Pending, "batch item queued");
    }
}

fn run_item<I, T, F>(index: usize, item: &I, op: F) -> BatchEntry<I, T>
where
    I: Clone,
    F: FnOnce(usize, &I) -> Result<T, ZpError>,
{
    debug!(index, state = ?ItemState::Running, "batch item started");
    let outcome = match op(index, item) {
        Ok(result) => {
            debug!(index, state = ?ItemState::Succeeded, "batch item finished");
            ItemOutcome::Succeeded { result }
        }
        Err(err) => {
            warn!(index, state = ?ItemState::Failed, error = %err, "batch item failed");
            ItemOutcome::Failed {
                error: err.to_string(),
            }
        }
    };
    BatchEntry {
        index,
        input: item.clone(),
        outcome,
    }
}
