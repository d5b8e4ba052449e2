//! Logger handed to the schema builder and the object lifecycle.

use parking_lot::Mutex;
use std::sync::Arc;

/// Destination of schema-building and lifecycle messages.
pub trait Logger: Send + Sync {
    /// Diagnostic message, only interesting while debugging.
    fn log(&self, message: &str);

    /// Report of a completed create, update or delete.
    fn report(&self, message: &str);
}

/// Logger forwarding to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger {
    debug: bool,
}

impl TracingLogger {
    /// Create a logger; diagnostics are dropped unless `debug` is set.
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }
}

impl Logger for TracingLogger {
    fn log(&self, message: &str) {
        if self.debug {
            tracing::debug!(target: "angelo", "{message}");
        }
    }

    fn report(&self, message: &str) {
        tracing::info!(target: "angelo", "{message}");
    }
}

/// Logger that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentLogger;

impl Logger for SilentLogger {
    fn log(&self, _message: &str) {}

    fn report(&self, _message: &str) {}
}

/// Logger keeping every line in memory.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    logs: Mutex<Vec<String>>,
    reports: Mutex<Vec<String>>,
}

impl MemoryLogger {
    /// Create an empty logger behind an `Arc`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Diagnostic lines recorded so far.
    pub fn logs(&self) -> Vec<String> {
        self.logs.lock().clone()
    }

    /// Reports recorded so far.
    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().clone()
    }

    /// Forget everything recorded.
    pub fn clear(&self) {
        self.logs.lock().clear();
        self.reports.lock().clear();
    }
}

impl Logger for MemoryLogger {
    fn log(&self, message: &str) {
        self.logs.lock().push(message.to_string());
    }

    fn report(&self, message: &str) {
        self.reports.lock().push(message.to_string());
    }
}
