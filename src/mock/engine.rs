//! Fake JavaScript engine.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::engine::{CompileError, Engine, ExecutionError, ExecutionResult};

const BYTECODE_PREFIX: &[u8] = b"bytecode:";

/// Compiles `source` to `b"bytecode:" + source`; executing that returns
/// the source text back.
#[derive(Debug, Default)]
pub struct MockEngine {
    compiles: AtomicUsize,
    executions: AtomicUsize,
    fail_compiles: AtomicBool,
    compile_delay: Option<Duration>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every compile take at least `delay`.
    pub fn with_compile_delay(mut self, delay: Duration) -> Self {
        self.compile_delay = Some(delay);
        self
    }

    pub fn fail_compiles(&self, fail: bool) {
        self.fail_compiles.store(fail, Ordering::SeqCst);
    }

    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    pub fn execution_count(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

impl Engine for MockEngine {
    fn compile(&self, source: &str) -> Result<Vec<u8>, CompileError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.compile_delay {
            thread::sleep(delay);
        }
        if self.fail_compiles.load(Ordering::SeqCst) {
            return Err(CompileError::new("SyntaxError: unexpected token"));
        }

        let mut bytecode = BYTECODE_PREFIX.to_vec();
        bytecode.extend_from_slice(source.as_bytes());
        Ok(bytecode)
    }

    fn execute(&self, bytecode: &[u8]) -> Result<ExecutionResult, ExecutionError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let body = bytecode
            .strip_prefix(BYTECODE_PREFIX)
            .ok_or_else(|| ExecutionError::InvalidBytecode("missing header".to_string()))?;
        let value = String::from_utf8(body.to_vec())
            .map_err(|_| ExecutionError::InvalidBytecode("not UTF-8".to_string()))?;
        Ok(ExecutionResult { value })
    }
}
