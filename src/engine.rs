//! JavaScript engine capability
//!
//! The cache stores whatever the engine's compiler produces and treats it as
//! opaque bytes. Engines are plugged in through [`Engine`].

use serde::{Deserialize, Serialize};

/// Compilation failed. Bytecode is optional, so callers only log this.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("compile error: {message}")]
pub struct CompileError {
    pub message: String,
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Script execution failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("script threw: {0}")]
    Thrown(String),

    #[error("bytecode rejected by engine: {0}")]
    InvalidBytecode(String),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Completion value of a script, rendered as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub value: String,
}

/// Compiles and runs JavaScript.
pub trait Engine: Send + Sync {
    /// Compile source into an engine-specific artifact.
    fn compile(&self, source: &str) -> Result<Vec<u8>, CompileError>;

    /// Run a previously compiled artifact.
    fn execute(&self, bytecode: &[u8]) -> Result<ExecutionResult, ExecutionError>;

    /// Run source directly, compiling it first.
    fn execute_source(&self, source: &str) -> Result<ExecutionResult, ExecutionError> {
        let bytecode = self.compile(source)?;
        self.execute(&bytecode)
    }
}

impl<T: Engine + ?Sized> Engine for std::sync::Arc<T> {
    fn compile(&self, source: &str) -> Result<Vec<u8>, CompileError> {
        (**self).compile(source)
    }

    fn execute(&self, bytecode: &[u8]) -> Result<ExecutionResult, ExecutionError> {
        (**self).execute(bytecode)
    }
}
