//! Compilation scheduling and tier coordination for WebAssembly modules.
//!
//! This crate turns validated WebAssembly module metadata into callable
//! machine-code records. It does not generate code itself: embedders supply a
//! [`Compiler`] that translates function bodies at a given [`Tier`] and
//! [`MemoryMode`], and this crate schedules that work on a process-wide
//! [`Worklist`] of background worker threads.
//!
//! A [`CodeBlock`] owns the result of compiling one module instance. It is
//! created in a pending state with exactly one in-flight [`CompilationTask`],
//! and callers observe completion either synchronously with
//! [`CodeBlock::wait_until_finished`] or asynchronously with
//! [`CodeBlock::compile_async`]. Once finished, a block is either runnable
//! (every function has an immutable [`Callee`] record) or failed (a stored
//! [`CompileError`] replayed to every observer); compilation failure is
//! terminal and never retried automatically.
//!
//! ```rust,ignore
//! let worklist = Worklist::new(4);
//! let module = Arc::new(ModuleInfo::new(None, bodies));
//! let code = CodeBlock::new(&worklist, MemoryMode::BoundsChecking, module, compiler);
//! code.wait_until_finished();
//! if code.is_safe_to_run(MemoryMode::BoundsChecking) {
//!     let entry = code.wasm_entrypoint(0).unwrap();
//!     // hand `entry` to the execution engine
//! }
//! ```

#![deny(missing_docs)]

mod callee;
mod code_block;
mod compile;
mod error;
mod module;
mod task;
mod worklist;

pub use crate::callee::{Callee, TierUpCounter};
pub use crate::code_block::CodeBlock;
pub use crate::compile::{
    run_maybe_parallel, Compilation, CompiledFunction, Compiler, UnlinkedWasmCall,
};
pub use crate::error::CompileError;
pub use crate::module::{CodePtr, FunctionBody, MemoryMode, ModuleInfo, Tier};
pub use crate::task::CompilationTask;
pub use crate::worklist::Worklist;
