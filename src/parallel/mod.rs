//! Worker pool that fans per-file jobs out to threads
//!
//! Each job runs on a rayon pool thread and reports back with exactly one
//! [`WorkerMessage`] over a crossbeam channel. The calling thread acts as the
//! coordinator: it sees every message as it arrives (in completion order) and
//! finally gets all outcomes back in submission order.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use crossbeam::channel;
use tracing::{debug, info, warn};

use crate::error::{Result, ProbeError};

/// Message a worker sends when its file is done
#[derive(Debug)]
pub struct WorkerMessage<T> {
    /// Position of the file in the submitted list
    pub index: usize,
    pub file: PathBuf,
    pub outcome: Result<T>,
}

/// Pool of worker threads, one job per file
#[derive(Debug, Clone, Default)]
pub struct WorkerPool {
    max_workers: Option<usize>,
}

impl WorkerPool {
    /// Create a pool; `None` gives every file its own worker thread
    pub fn new(max_workers: Option<usize>) -> Self {
        Self { max_workers }
    }

    /// Number of threads used for a batch of `file_count` files
    pub fn worker_count(&self, file_count: usize) -> usize {
        self.max_workers
            .unwrap_or(file_count)
            .min(file_count)
            .max(1)
    }

    /// Run `job` once per file
    ///
    /// `on_message` is called on the coordinating thread for every message in
    /// the order workers finish. The returned messages are ordered by
    /// submission index. A job that panics is reported as a failed file.
    pub fn run<T, F, M>(
        &self,
        files: Vec<PathBuf>,
        job: F,
        mut on_message: M,
    ) -> Result<Vec<WorkerMessage<T>>>
    where
        T: Send,
        F: Fn(&Path) -> Result<T> + Send + Sync,
        M: FnMut(&WorkerMessage<T>),
    {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let total = files.len();
        let threads = self.worker_count(total);
        info!("Dispatching {} files to {} worker threads", total, threads);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("resize-worker-{}", i))
            .build()
            .map_err(|e| ProbeError::worker(format!("Failed to start worker pool: {}", e)))?;

        let (sender, receiver) = channel::unbounded::<WorkerMessage<T>>();
        let mut slots: Vec<Option<WorkerMessage<T>>> = (0..total).map(|_| None).collect();
        let job = &job;

        pool.in_place_scope(|scope| {
            for (index, file) in files.into_iter().enumerate() {
                let sender = sender.clone();
                scope.spawn(move |_| {
                    let outcome = catch_unwind(AssertUnwindSafe(|| job(&file)))
                        .unwrap_or_else(|panic| {
                            Err(ProbeError::worker(format!(
                                "Worker panicked on {:?}: {}",
                                file,
                                panic_message(panic.as_ref())
                            )))
                        });

                    // The coordinator outlives every job, so a send failure means it gave up
                    if sender.send(WorkerMessage { index, file, outcome }).is_err() {
                        warn!("Coordinator stopped listening before job {} finished", index);
                    }
                });
            }
            drop(sender);

            for message in receiver.iter() {
                debug!("Worker message for {:?} (job {})", message.file, message.index);
                on_message(&message);
                let index = message.index;
                slots[index] = Some(message);
            }
        });

        let messages: Vec<_> = slots.into_iter().flatten().collect();
        if messages.len() != total {
            return Err(ProbeError::worker(format!(
                "Expected {} worker messages, received {}",
                total,
                messages.len()
            )));
        }

        Ok(messages)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn paths(count: usize) -> Vec<PathBuf> {
        (0..count).map(|i| PathBuf::from(format!("file-{}.png", i))).collect()
    }

    #[test]
    fn test_worker_count() {
        assert_eq!(WorkerPool::new(None).worker_count(7), 7);
        assert_eq!(WorkerPool::new(Some(3)).worker_count(7), 3);
        assert_eq!(WorkerPool::new(Some(16)).worker_count(2), 2);
        assert_eq!(WorkerPool::new(None).worker_count(0), 1);
    }

    #[test]
    fn test_results_in_submission_order() {
        let pool = WorkerPool::new(None);
        let mut seen = Vec::new();

        let messages = pool
            .run(
                paths(5),
                |file| {
                    // Later files finish first
                    let n: u64 = file.to_string_lossy()[5..6].parse().unwrap();
                    std::thread::sleep(Duration::from_millis((5 - n) * 20));
                    Ok(n)
                },
                |message| seen.push(message.index),
            )
            .unwrap();

        let values: Vec<u64> = messages.iter().map(|m| *m.outcome.as_ref().unwrap()).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
        assert_eq!(seen.len(), 5);
        let mut sorted = seen.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_bounded_concurrency() {
        let pool = WorkerPool::new(Some(2));
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let messages = pool
            .run(
                paths(8),
                |_| {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                },
                |_| {},
            )
            .unwrap();

        assert_eq!(messages.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_failures_and_panics_are_isolated() {
        let pool = WorkerPool::new(Some(2));

        let messages = pool
            .run(
                paths(3),
                |file| {
                    if file.ends_with("file-1.png") {
                        panic!("decoder exploded");
                    }
                    if file.ends_with("file-2.png") {
                        return Err(ProbeError::processing("bad file", Some(file.to_path_buf())));
                    }
                    Ok(())
                },
                |_| {},
            )
            .unwrap();

        assert!(messages[0].outcome.is_ok());
        let panic_err = messages[1].outcome.as_ref().unwrap_err();
        assert!(panic_err.to_string().contains("decoder exploded"));
        assert!(messages[2].outcome.is_err());
    }

    #[test]
    fn test_empty_batch() {
        let messages = WorkerPool::new(None)
            .run(Vec::new(), |_| Ok(()), |_| panic!("no messages expected"))
            .unwrap();
        assert!(messages.is_empty());
    }
}
