//! `CodeBlock` owns and serves the compiled code for one module instance.

use crate::callee::{Callee, TierUpCounter};
use crate::compile::{Compilation, Compiler, UnlinkedWasmCall};
use crate::error::CompileError;
use crate::module::{CodePtr, MemoryMode, ModuleInfo, Tier};
use crate::task::CompilationTask;
use crate::worklist::Worklist;
use std::sync::{Arc, Mutex};

/// The compiled code for one module instance at one memory mode.
///
/// A `CodeBlock` is created in a pending state with exactly one in-flight
/// [`CompilationTask`] already enqueued on the worklist. At most one
/// compilation is ever in flight for a block. Callers observe completion
/// synchronously with [`wait_until_finished`](CodeBlock::wait_until_finished)
/// or asynchronously with [`compile_async`](CodeBlock::compile_async); once
/// finished, the block is either runnable (every function index has an
/// immutable wasm-entry and host-entry [`Callee`]) or failed with a stored
/// [`CompileError`]. Failure is terminal: the block never retries, and the
/// driver that discovers it is responsible for surfacing a link error.
///
/// Blocks are handed out as `Arc<CodeBlock>`; the pending task's install
/// callback holds its own reference, so a block stays alive until that
/// callback has run even if its creator drops every other handle.
pub struct CodeBlock {
    function_count: u32,
    mode: MemoryMode,
    worklist: Worklist,
    state: Mutex<State>,
}

enum State {
    Pending(Arc<CompilationTask>),
    Ready(CompiledCode),
    Failed(CompileError),
}

/// Everything a successful compilation installs. Immutable once built.
struct CompiledCode {
    wasm_callees: Vec<Arc<Callee>>,
    host_callees: Vec<Arc<Callee>>,
    indirect_call_entrypoints: Vec<CodePtr>,
    exit_stubs: Vec<CodePtr>,
    unlinked_calls: Vec<UnlinkedWasmCall>,
    tier_up_counters: Vec<Arc<TierUpCounter>>,
}

impl CompiledCode {
    fn install(
        function_count: u32,
        tier: Tier,
        compilation: Compilation,
    ) -> Result<CompiledCode, CompileError> {
        if compilation.functions.len() as u32 != function_count {
            return Err(CompileError::ArtifactMismatch {
                expected: function_count,
                actual: compilation.functions.len() as u32,
            });
        }
        if compilation.tier_up_counters.len() as u32 != function_count {
            return Err(CompileError::ArtifactMismatch {
                expected: function_count,
                actual: compilation.tier_up_counters.len() as u32,
            });
        }

        let mut wasm_callees = Vec::with_capacity(compilation.functions.len());
        let mut host_callees = Vec::with_capacity(compilation.functions.len());
        let mut indirect_call_entrypoints = Vec::with_capacity(compilation.functions.len());
        for (index, function) in compilation.functions.iter().enumerate() {
            let index = index as u32;
            wasm_callees.push(Arc::new(Callee::new(index, tier, function.wasm_entrypoint)));
            host_callees.push(Arc::new(Callee::new(index, tier, function.host_entrypoint)));
            // Indirect calls use the wasm calling convention.
            indirect_call_entrypoints.push(function.wasm_entrypoint);
        }

        Ok(CompiledCode {
            wasm_callees,
            host_callees,
            indirect_call_entrypoints,
            exit_stubs: compilation.exit_stubs,
            unlinked_calls: compilation.unlinked_calls,
            tier_up_counters: compilation.tier_up_counters,
        })
    }
}

impl CodeBlock {
    /// Creates a code block for `module` and immediately enqueues its
    /// baseline full-module compilation on `worklist`.
    ///
    /// The returned block may already be finished by the time this returns:
    /// the install callback can run on a worker concurrently with the tail
    /// of this constructor.
    pub fn new(
        worklist: &Worklist,
        mode: MemoryMode,
        module: Arc<ModuleInfo>,
        compiler: Arc<dyn Compiler>,
    ) -> Arc<CodeBlock> {
        let function_count = module.function_count();
        let task = Arc::new(CompilationTask::new(module, Tier::Baseline, mode, compiler));
        let block = Arc::new(CodeBlock {
            function_count,
            mode,
            worklist: worklist.clone(),
            state: Mutex::new(State::Pending(Arc::clone(&task))),
        });

        // The install callback keeps its own reference so the block outlives
        // its creator until the callback has run.
        let protected = Arc::clone(&block);
        let registered =
            task.add_completion_callback(Box::new(move |task| protected.install(task)));
        if let Some(callback) = registered {
            // Unreachable in practice: the task is not enqueued yet.
            callback(&task);
        }
        worklist.enqueue(task);
        block
    }

    /// Runs on task completion, exactly once, possibly before
    /// [`CodeBlock::new`] has returned.
    fn install(&self, task: &CompilationTask) {
        let tier = task.tier();
        let installed = task
            .take_result()
            .and_then(|compilation| CompiledCode::install(self.function_count, tier, compilation));

        let mut state = self.state.lock().unwrap();
        debug_assert!(matches!(&*state, State::Pending(_)));
        *state = match installed {
            Ok(code) => {
                log::debug!(
                    "installed {} callees at {tier:?}",
                    code.wasm_callees.len()
                );
                State::Ready(code)
            }
            Err(err) => {
                log::debug!("code block failed to compile: {err}");
                State::Failed(err)
            }
        };
    }

    fn pending_task(&self) -> Option<Arc<CompilationTask>> {
        match &*self.state.lock().unwrap() {
            State::Pending(task) => Some(Arc::clone(task)),
            _ => None,
        }
    }

    /// Blocks until compilation has finished, driving the task to completion
    /// on the calling thread if no worker has claimed it yet.
    ///
    /// On return the block is finished: exactly one of
    /// [`runnable`](CodeBlock::runnable) or [`error`](CodeBlock::error)
    /// observes a result.
    pub fn wait_until_finished(&self) {
        if let Some(task) = self.pending_task() {
            self.worklist.complete_synchronously(&task);
        }
        // Otherwise we are already finished.
    }

    /// Invokes `callback` with this block once compilation has finished.
    ///
    /// If the block is already finished the callback runs on the calling
    /// thread before this returns; otherwise it runs later on the worker
    /// that finishes the task. Each call results in exactly one invocation,
    /// and callbacks registered before completion run in registration order.
    pub fn compile_async(
        self: &Arc<Self>,
        callback: impl FnOnce(Arc<CodeBlock>) + Send + 'static,
    ) {
        if let Some(task) = self.pending_task() {
            // The worklist keeps the task alive until every completion
            // callback has run, so no extra reference to it is needed here.
            let protected = Arc::clone(self);
            let returned =
                task.add_completion_callback(Box::new(move |_task| callback(protected)));
            if let Some(callback) = returned {
                // The task finished between our state read and registration;
                // run inline as for an already-finished block.
                callback(&task);
            }
        } else {
            callback(Arc::clone(self));
        }
    }

    /// Whether compiled code with this block's memory mode may execute
    /// against a memory of `memory_mode`.
    ///
    /// Always `false` until compilation has finished successfully.
    /// Bounds-checking code is safe against any memory; signaling code
    /// performs no bounds checks of its own, so its memory must carry the
    /// guard pages that catch out-of-bounds accesses.
    pub fn is_safe_to_run(&self, memory_mode: MemoryMode) -> bool {
        if !self.runnable() {
            return false;
        }
        match self.mode {
            MemoryMode::BoundsChecking => true,
            MemoryMode::Signaling => memory_mode == MemoryMode::Signaling,
        }
    }

    /// Whether compilation has finished, successfully or not.
    pub fn is_finished(&self) -> bool {
        !matches!(&*self.state.lock().unwrap(), State::Pending(_))
    }

    /// Whether compilation has finished successfully.
    pub fn runnable(&self) -> bool {
        matches!(&*self.state.lock().unwrap(), State::Ready(_))
    }

    /// The stored compilation error, if compilation finished unsuccessfully.
    pub fn error(&self) -> Option<CompileError> {
        match &*self.state.lock().unwrap() {
            State::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// The memory mode this block's code was compiled for.
    pub fn mode(&self) -> MemoryMode {
        self.mode
    }

    /// The number of functions in the module, fixed at construction.
    pub fn function_count(&self) -> u32 {
        self.function_count
    }

    /// The wasm-calling-convention callee for `index`, once runnable.
    pub fn wasm_callee(&self, index: u32) -> Option<Arc<Callee>> {
        self.with_code(|code| code.wasm_callees.get(index as usize).cloned())
    }

    /// The host-calling-convention callee for `index`, once runnable.
    pub fn host_callee(&self, index: u32) -> Option<Arc<Callee>> {
        self.with_code(|code| code.host_callees.get(index as usize).cloned())
    }

    /// The wasm-calling-convention entry point for `index`, once runnable.
    pub fn wasm_entrypoint(&self, index: u32) -> Option<CodePtr> {
        self.wasm_callee(index).map(|callee| callee.entrypoint())
    }

    /// The host-calling-convention entry point for `index`, once runnable.
    pub fn host_entrypoint(&self, index: u32) -> Option<CodePtr> {
        self.host_callee(index).map(|callee| callee.entrypoint())
    }

    /// The indirect-call entry point for `index`, once runnable.
    pub fn indirect_call_entrypoint(&self, index: u32) -> Option<CodePtr> {
        self.with_code(|code| code.indirect_call_entrypoints.get(index as usize).copied())
    }

    /// The tier-up counter for `index`, once runnable.
    pub fn tier_up_counter(&self, index: u32) -> Option<Arc<TierUpCounter>> {
        self.with_code(|code| code.tier_up_counters.get(index as usize).cloned())
    }

    /// Exit stub addresses for wasm-to-wasm calls that leave this module.
    /// Empty unless runnable.
    pub fn exit_stubs(&self) -> Vec<CodePtr> {
        self.with_code(|code| Some(code.exit_stubs.clone()))
            .unwrap_or_default()
    }

    /// Call sites the instantiation driver must patch once the callee's
    /// module is compiled. Empty unless runnable.
    pub fn unlinked_calls(&self) -> Vec<UnlinkedWasmCall> {
        self.with_code(|code| Some(code.unlinked_calls.clone()))
            .unwrap_or_default()
    }

    fn with_code<T>(&self, f: impl FnOnce(&CompiledCode) -> Option<T>) -> Option<T> {
        match &*self.state.lock().unwrap() {
            State::Ready(code) => f(code),
            _ => None,
        }
    }
}
