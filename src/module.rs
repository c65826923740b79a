//! Validated module metadata consumed by compilation tasks, plus the small
//! value types shared across the crate.

use std::fmt;

/// The memory-safety strategy compiled into a module's code.
///
/// Code and linear memory must agree on this strategy before the code may
/// execute against the memory; see
/// [`CodeBlock::is_safe_to_run`](crate::CodeBlock::is_safe_to_run).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemoryMode {
    /// Out-of-bounds accesses are prevented by explicit range checks in the
    /// generated code. Safe against a memory of either mode.
    BoundsChecking,
    /// The generated code performs no bounds checks; guard pages fault on
    /// out-of-bounds access. Requires a memory allocated with matching guard
    /// regions.
    Signaling,
}

/// An optimization level for compiled code.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    /// The fast, full-module compile every code block starts with.
    Baseline,
    /// Optimizing recompilation, requested once a function's
    /// [`TierUpCounter`](crate::TierUpCounter) crosses its threshold.
    Optimized,
}

/// An opaque machine-code entry address.
///
/// Code generation and executable-memory allocation are external to this
/// crate, so entry points are carried as opaque address tokens.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodePtr(usize);

impl CodePtr {
    /// Wraps a raw entry address.
    pub fn new(addr: usize) -> CodePtr {
        CodePtr(addr)
    }

    /// Returns the raw entry address.
    pub fn addr(self) -> usize {
        self.0
    }
}

impl fmt::Debug for CodePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodePtr({:#x})", self.0)
    }
}

/// A reference to one function's bytecode within the module image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FunctionBody {
    /// Byte offset of the body within the module image.
    pub offset: usize,
    /// Length of the body in bytes.
    pub len: usize,
}

/// Validated metadata for one WebAssembly module.
///
/// Produced by an external validator/parser; this crate only reads the
/// function count and forwards the body references to the [`Compiler`]
/// implementation opaquely.
///
/// [`Compiler`]: crate::Compiler
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    name: Option<String>,
    function_bodies: Vec<FunctionBody>,
}

impl ModuleInfo {
    /// Creates module metadata from an optional debug name and the validated
    /// per-function bytecode references.
    pub fn new(name: Option<String>, function_bodies: Vec<FunctionBody>) -> ModuleInfo {
        ModuleInfo {
            name,
            function_bodies,
        }
    }

    /// The number of functions defined in this module.
    pub fn function_count(&self) -> u32 {
        self.function_bodies.len() as u32
    }

    /// The bytecode reference for the function at `index`, if in range.
    pub fn function_body(&self, index: u32) -> Option<FunctionBody> {
        self.function_bodies.get(index as usize).copied()
    }

    /// All per-function bytecode references, indexed by function index.
    pub fn function_bodies(&self) -> &[FunctionBody] {
        &self.function_bodies
    }

    /// The module's debug name, if the binary carried one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}
