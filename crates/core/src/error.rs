use serde::Serialize;
use thiserror::Error;

/// Severity of a compiler diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// A single compiler diagnostic with its source location.
///
/// Diagnostics are non-blocking: the compiler records them and keeps going,
/// producing a possibly degraded track model. Only a missing primary route
/// file aborts the compile (see [`CompileError`]).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        file: &str,
        line: u32,
        column: u32,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            severity,
            file: file.to_owned(),
            line,
            column,
            message: message.into(),
        }
    }

    pub fn error(file: &str, line: u32, column: u32, message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Error, file, line, column, message)
    }

    pub fn warning(file: &str, line: u32, column: u32, message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Warning, file, line, column, message)
    }
}

/// Collecting sink for diagnostics emitted during a compile.
///
/// The sink is owned by the caller and threaded through every pass, so
/// messages survive even when a pass bails out early.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    messages: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        DiagnosticSink::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.messages.push(diagnostic);
    }

    pub fn error(&mut self, file: &str, line: u32, column: u32, message: impl Into<String>) {
        self.push(Diagnostic::error(file, line, column, message));
    }

    pub fn warning(&mut self, file: &str, line: u32, column: u32, message: impl Into<String>) {
        self.push(Diagnostic::warning(file, line, column, message));
    }

    pub fn messages(&self) -> &[Diagnostic] {
        &self.messages
    }

    pub fn error_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.severity == Severity::Error)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<Diagnostic> {
        self.messages
    }
}

/// Fatal compile failure. Everything else is a [`Diagnostic`].
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("scenario file {0} does not declare a route map")]
    MissingMapDeclaration(String),

    #[error("route file not found: {0}")]
    RouteFileNotFound(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("compilation cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_counts_errors_not_warnings() {
        let mut sink = DiagnosticSink::new();
        sink.warning("map.txt", 3, 1, "unknown command");
        sink.error("map.txt", 7, 12, "missing closing parenthesis");
        assert_eq!(sink.messages().len(), 2);
        assert_eq!(sink.error_count(), 1);
    }

    #[test]
    fn diagnostic_serializes_with_location() {
        let d = Diagnostic::error("map.txt", 1, 2, "bad");
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["severity"], "error");
        assert_eq!(v["line"], 1);
        assert_eq!(v["column"], 2);
    }
}
