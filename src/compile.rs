//! The compiler seam and the artifact a compilation task produces.

use crate::callee::TierUpCounter;
use crate::error::CompileError;
use crate::module::{CodePtr, MemoryMode, ModuleInfo, Tier};
use std::sync::Arc;

/// Machine-code entry points for one compiled function.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CompiledFunction {
    /// Entry point using the wasm calling convention, called from other
    /// wasm functions and through indirect-call tables.
    pub wasm_entrypoint: CodePtr,
    /// Entry point using the host calling convention, called when the
    /// embedder invokes the function directly.
    pub host_entrypoint: CodePtr,
}

/// A call site awaiting cross-module linkage.
///
/// Wasm-to-wasm calls across module boundaries are emitted against an exit
/// stub and recorded here; the instantiation driver rewrites them once both
/// modules are compiled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UnlinkedWasmCall {
    /// The index, in the module's function index space, of the call target.
    pub target: u32,
    /// The address of the call instruction to patch.
    pub call_location: CodePtr,
}

/// The result of compiling all functions of one module at one tier.
///
/// Both `functions` and `tier_up_counters` must have exactly one entry per
/// function index; an artifact of any other shape is rejected at install
/// time with [`CompileError::ArtifactMismatch`].
pub struct Compilation {
    /// Entry points for every function, indexed by function index.
    pub functions: Vec<CompiledFunction>,
    /// Exit stub addresses for calls from this module's code back into wasm
    /// across a module boundary.
    pub exit_stubs: Vec<CodePtr>,
    /// Call sites to rewrite at link time.
    pub unlinked_calls: Vec<UnlinkedWasmCall>,
    /// One counter per function. The compiler allocates these because the
    /// generated code embeds references to them.
    pub tier_up_counters: Vec<Arc<TierUpCounter>>,
}

/// An implementation of a compiler from validated module metadata to native
/// code.
///
/// Implementations must be callable from any worklist worker thread, and may
/// be shared by many in-flight tasks.
pub trait Compiler: Send + Sync {
    /// Compiles every function of `module` at the requested tier, generating
    /// bounds checks or guard-page-relying code according to `mode`.
    fn compile(
        &self,
        module: &ModuleInfo,
        tier: Tier,
        mode: MemoryMode,
    ) -> Result<Compilation, CompileError>;
}

/// Maps `f` over `input`, in parallel when the `parallel-compilation`
/// feature is enabled.
///
/// A convenience for [`Compiler`] implementations whose functions compile
/// independently. Output order matches input order either way.
pub fn run_maybe_parallel<A, B, E, F>(input: Vec<A>, f: F) -> Result<Vec<B>, E>
where
    A: Send,
    B: Send,
    E: Send,
    F: Fn(A) -> Result<B, E> + Send + Sync,
{
    #[cfg(feature = "parallel-compilation")]
    {
        use rayon::prelude::*;
        input.into_par_iter().map(|a| f(a)).collect()
    }
    #[cfg(not(feature = "parallel-compilation"))]
    {
        input.into_iter().map(|a| f(a)).collect()
    }
}
