use thiserror::Error;

/// An error while compiling a WebAssembly module to machine code.
///
/// A failure is terminal for the [`CodeBlock`](crate::CodeBlock) that owns
/// the compilation: the error is stored on the block and handed out to every
/// observer, and the compilation is never retried automatically. Errors are
/// `Clone` for exactly that reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The code generator reported an error.
    #[error("compilation error: {0}")]
    Codegen(String),

    /// The code generator ran out of a resource, e.g. executable memory.
    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),

    /// The compiled artifact does not line up with the module's function
    /// count. Detected when installing the artifact into a code block.
    #[error("artifact shape mismatch: expected {expected} functions, got {actual}")]
    ArtifactMismatch {
        /// Function count the module declares.
        expected: u32,
        /// Function count the artifact actually carries.
        actual: u32,
    },
}
