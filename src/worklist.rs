//! A process-wide queue of compilation tasks and the worker pool that
//! drains it.

use crate::task::CompilationTask;
use std::collections::VecDeque;
use std::mem;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

/// A process-wide scheduler for [`CompilationTask`]s.
///
/// A `Worklist` owns a fixed pool of background worker threads draining a
/// FIFO queue. Tasks from unrelated code blocks may run concurrently on
/// different workers; no ordering is guaranteed across them. A caller that
/// cannot proceed without a particular task uses
/// [`complete_synchronously`](Worklist::complete_synchronously) to force it
/// out of queue order.
///
/// The worklist is a shared service: construct one before creating any
/// [`CodeBlock`](crate::CodeBlock) and hand out clones of the handle.
/// Cloning is cheap and refers to the same queue and workers. Call
/// [`shutdown`](Worklist::shutdown) once all compilation is requested;
/// already-enqueued tasks are drained, not dropped. A worklist that is never
/// shut down keeps its workers parked until process exit, which is
/// acceptable for a long-lived embedder.
#[derive(Clone)]
pub struct Worklist {
    inner: Arc<WorklistInner>,
}

struct WorklistInner {
    state: Mutex<QueueState>,
    work_available: Condvar,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

struct QueueState {
    queue: VecDeque<Arc<CompilationTask>>,
    shutting_down: bool,
}

impl Worklist {
    /// Creates a worklist with `num_workers` background worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `num_workers` is zero.
    pub fn new(num_workers: usize) -> Worklist {
        assert!(num_workers > 0, "worklist requires at least one worker");
        let worklist = Worklist {
            inner: Arc::new(WorklistInner {
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    shutting_down: false,
                }),
                work_available: Condvar::new(),
                workers: Mutex::new(Vec::with_capacity(num_workers)),
            }),
        };
        let mut workers = worklist.inner.workers.lock().unwrap();
        for i in 0..num_workers {
            let inner = Arc::clone(&worklist.inner);
            let handle = thread::Builder::new()
                .name(format!("wasm-compile-{i}"))
                .spawn(move || inner.run_worker())
                .expect("failed to spawn compilation worker");
            workers.push(handle);
        }
        drop(workers);
        worklist
    }

    /// Appends `task` to the queue and wakes a worker.
    ///
    /// # Panics
    ///
    /// Panics if the worklist is shutting down; enqueueing after
    /// [`shutdown`](Worklist::shutdown) is a caller contract violation.
    pub fn enqueue(&self, task: Arc<CompilationTask>) {
        let mut state = self.inner.state.lock().unwrap();
        assert!(
            !state.shutting_down,
            "enqueue on a worklist that is shutting down"
        );
        log::trace!(
            "enqueueing compilation of module {:?}",
            task.module().name()
        );
        state.queue.push_back(task);
        self.inner.work_available.notify_one();
    }

    /// Forces `task` to completion before returning.
    ///
    /// If the task is still queued, it is stolen from the queue and executed
    /// on the calling thread, including delivery of its completion
    /// callbacks. If a worker already claimed it, the calling thread blocks
    /// until the worker has finished it and delivered every callback
    /// registered up to the finish moment.
    pub fn complete_synchronously(&self, task: &Arc<CompilationTask>) {
        let stolen = {
            let mut state = self.inner.state.lock().unwrap();
            match state.queue.iter().position(|queued| Arc::ptr_eq(queued, task)) {
                Some(index) => state.queue.remove(index),
                None => None,
            }
        };

        if let Some(task) = stolen {
            log::trace!(
                "completing module {:?} on the calling thread",
                task.module().name()
            );
            if task.execute() {
                return;
            }
            // Lost the claim to a worker between the steal and the call.
        }
        task.wait_until_notified();
    }

    /// Stops accepting new work, drains the queue, and joins the workers.
    ///
    /// Every task enqueued before this call still runs and notifies its
    /// callbacks. Idempotent; concurrent callers may return before the
    /// first caller has finished joining.
    pub fn shutdown(&self) {
        let already_shutting_down = {
            let mut state = self.inner.state.lock().unwrap();
            mem::replace(&mut state.shutting_down, true)
        };
        self.inner.work_available.notify_all();
        if already_shutting_down {
            return;
        }

        let workers = mem::take(&mut *self.inner.workers.lock().unwrap());
        log::debug!("draining {} compilation workers", workers.len());
        for worker in workers {
            worker.join().expect("compilation worker panicked");
        }
    }
}

impl WorklistInner {
    fn run_worker(&self) {
        loop {
            let task = {
                let mut state = self.state.lock().unwrap();
                loop {
                    if let Some(task) = state.queue.pop_front() {
                        break Some(task);
                    }
                    if state.shutting_down {
                        break None;
                    }
                    state = self.work_available.wait(state).unwrap();
                }
            };
            let Some(task) = task else { return };
            // The claim can only fail if a synchronous completer raced us,
            // in which case the task is already taken care of.
            task.execute();
        }
    }
}
