//! Background compilation tasks and their completion protocol.

use crate::compile::{Compilation, Compiler};
use crate::error::CompileError;
use crate::module::{MemoryMode, ModuleInfo, Tier};
use std::mem;
use std::sync::{Arc, Condvar, Mutex};

/// A completion callback registered on a task. Runs on whichever thread
/// finishes the task, with no task or worklist lock held.
pub(crate) type CompletionCallback = Box<dyn FnOnce(&CompilationTask) + Send>;

/// A unit of work that compiles all functions of one module at one tier.
///
/// A task is enqueued on a [`Worklist`](crate::Worklist) exactly once, runs
/// on exactly one thread, and transitions to finished exactly once. The
/// finishing thread notifies every completion callback in registration
/// order, draining late registrations until none remain; only then is the
/// task considered notified. A registrant arriving after that point is
/// handed its callback back to run inline.
pub struct CompilationTask {
    module: Arc<ModuleInfo>,
    tier: Tier,
    mode: MemoryMode,
    compiler: Arc<dyn Compiler>,
    state: Mutex<TaskState>,
    // Signaled once the task is finished and every callback registered
    // before that moment has run.
    notified_cond: Condvar,
}

enum TaskState {
    /// Enqueued, not yet claimed by a thread.
    Queued(Vec<CompletionCallback>),
    /// Claimed; the compiler is running.
    Running(Vec<CompletionCallback>),
    /// Result stored. The artifact is `Some` until the install callback
    /// takes it. Callbacks registered while the finisher is still
    /// delivering land in `late_callbacks`; `notified` flips once the
    /// finisher has drained them all.
    Finished {
        result: Result<Option<Compilation>, CompileError>,
        late_callbacks: Vec<CompletionCallback>,
        notified: bool,
    },
}

impl CompilationTask {
    /// Creates a task that will compile every function of `module` at `tier`
    /// with `mode`'s memory-safety strategy.
    pub fn new(
        module: Arc<ModuleInfo>,
        tier: Tier,
        mode: MemoryMode,
        compiler: Arc<dyn Compiler>,
    ) -> CompilationTask {
        CompilationTask {
            module,
            tier,
            mode,
            compiler,
            state: Mutex::new(TaskState::Queued(Vec::new())),
            notified_cond: Condvar::new(),
        }
    }

    /// The module this task compiles.
    pub fn module(&self) -> &ModuleInfo {
        &self.module
    }

    /// The optimization tier this task compiles at.
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// The memory-safety strategy this task compiles for.
    pub fn mode(&self) -> MemoryMode {
        self.mode
    }

    /// Whether the task has produced its result (callbacks may still be in
    /// the middle of delivery).
    pub fn is_finished(&self) -> bool {
        matches!(&*self.state.lock().unwrap(), TaskState::Finished { .. })
    }

    /// The task's error, if it finished unsuccessfully.
    pub fn error(&self) -> Option<CompileError> {
        match &*self.state.lock().unwrap() {
            TaskState::Finished {
                result: Err(err), ..
            } => Some(err.clone()),
            _ => None,
        }
    }

    /// Whether the task finished unsuccessfully.
    pub fn failed(&self) -> bool {
        self.error().is_some()
    }

    /// Registers `callback` to run when the task finishes. Returns the
    /// callback back to the caller if delivery has already completed; the
    /// caller must then invoke it inline to preserve exactly-once delivery.
    pub(crate) fn add_completion_callback(
        &self,
        callback: CompletionCallback,
    ) -> Option<CompletionCallback> {
        let mut state = self.state.lock().unwrap();
        match &mut *state {
            TaskState::Queued(callbacks) | TaskState::Running(callbacks) => {
                callbacks.push(callback);
                None
            }
            TaskState::Finished {
                late_callbacks,
                notified: false,
                ..
            } => {
                // The finisher is mid-delivery on another thread; it will
                // drain this before declaring the task notified.
                late_callbacks.push(callback);
                None
            }
            TaskState::Finished { .. } => Some(callback),
        }
    }

    /// Claims and runs the task on the calling thread. Returns `false`
    /// without doing anything if another thread already claimed it.
    pub(crate) fn execute(&self) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            let callbacks = match &mut *state {
                TaskState::Queued(callbacks) => mem::take(callbacks),
                _ => return false,
            };
            *state = TaskState::Running(callbacks);
        }

        log::debug!(
            "compiling module {:?} at {:?} ({:?})",
            self.module.name(),
            self.tier,
            self.mode
        );
        let result = self.compiler.compile(&self.module, self.tier, self.mode);
        if let Err(err) = &result {
            log::debug!("compilation of {:?} failed: {err}", self.module.name());
        }
        self.finish(result);
        true
    }

    fn finish(&self, result: Result<Compilation, CompileError>) {
        let mut callbacks = {
            let mut state = self.state.lock().unwrap();
            let callbacks = match &mut *state {
                TaskState::Running(callbacks) => mem::take(callbacks),
                _ => unreachable!("task finished while not running"),
            };
            *state = TaskState::Finished {
                result: result.map(Some),
                late_callbacks: Vec::new(),
                notified: false,
            };
            callbacks
        };

        loop {
            // Callbacks run with no lock held: they may take locks of their
            // own or enqueue further work on the worklist.
            for callback in callbacks {
                callback(self);
            }

            let mut state = self.state.lock().unwrap();
            match &mut *state {
                TaskState::Finished {
                    late_callbacks,
                    notified,
                    ..
                } => {
                    if late_callbacks.is_empty() {
                        *notified = true;
                        self.notified_cond.notify_all();
                        return;
                    }
                    callbacks = mem::take(late_callbacks);
                }
                _ => unreachable!("task state regressed after finishing"),
            }
        }
    }

    /// Blocks until the task has finished and delivered its callbacks.
    pub(crate) fn wait_until_notified(&self) {
        let mut state = self.state.lock().unwrap();
        while !matches!(&*state, TaskState::Finished { notified: true, .. }) {
            state = self.notified_cond.wait(state).unwrap();
        }
    }

    /// Takes the compilation artifact (or a clone of the error) for the
    /// install step. Only the install callback calls this, exactly once,
    /// after the task has finished.
    pub(crate) fn take_result(&self) -> Result<Compilation, CompileError> {
        match &mut *self.state.lock().unwrap() {
            TaskState::Finished { result, .. } => match result {
                Ok(compilation) => Ok(compilation
                    .take()
                    .expect("compilation artifact taken twice")),
                Err(err) => Err(err.clone()),
            },
            _ => unreachable!("result taken before the task finished"),
        }
    }
}
