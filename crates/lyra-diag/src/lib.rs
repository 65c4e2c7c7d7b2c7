//! Error reporting and diagnostics for Lyra.
//!
//! This crate provides the process-lifetime diagnostic sink shared by every
//! compilation stage. Diagnostics are appended once, never mutated, and read
//! by downstream stages (and the driver) to decide whether to proceed.
//!
//! The store is guarded by a per-instance mutex so an outer driver may
//! compile independent units in parallel against the same handler.

use std::fmt;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Source files
// ---------------------------------------------------------------------------

/// Identifies a source file registered with the [`ErrorHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

impl FileId {
    /// A file id for compiler-generated constructs with no source file.
    pub fn synthetic() -> Self {
        FileId(u32::MAX)
    }
}

// ---------------------------------------------------------------------------
// Severity and error codes
// ---------------------------------------------------------------------------

/// How severe a diagnostic is.
///
/// `Error` diagnostics are local and recoverable: the reporting stage keeps
/// going so one run can surface many problems. `Fatal` is reserved for
/// internal-consistency violations and aborts the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }
}

/// Stable, coded diagnostic taxonomy shared by every stage.
///
/// Families: lexical `L0xx`, syntax `S0xx` (produced by the external
/// parser), type `T0xx`, semantic `M0xx`, FFI `F0xx`, I/O `I0xx`, internal
/// `C0xx`, generic `G0xx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // -- Lexical --
    L001InvalidCharacter,
    L002UnterminatedString,
    L003InvalidNumberFormat,

    // -- Syntax (external parser contract) --
    S001UnexpectedToken,
    S002MissingExpectedToken,

    // -- Type --
    T001TypeMismatch,
    T002UndefinedVariable,
    T003UndefinedFunction,
    T006InvalidOperator,
    T007InvalidCall,
    T014InvalidReturnType,
    T017IncompleteTraitImpl,
    T032CannotInferType,

    // -- Semantic --
    M001OrPatternBindings,
    M002DuplicateDefinition,

    // -- FFI --
    F001InvalidExternSignature,

    // -- I/O --
    I001SourceRead,

    // -- Internal --
    C001NotImplemented,
    C002CodegenError,
    C003UnresolvedTypeInLowering,

    // -- Generic --
    G001Internal,
}

impl ErrorCode {
    /// The stable code rendered in user-facing output, e.g. `T001`.
    pub fn code(self) -> &'static str {
        match self {
            ErrorCode::L001InvalidCharacter => "L001",
            ErrorCode::L002UnterminatedString => "L002",
            ErrorCode::L003InvalidNumberFormat => "L003",
            ErrorCode::S001UnexpectedToken => "S001",
            ErrorCode::S002MissingExpectedToken => "S002",
            ErrorCode::T001TypeMismatch => "T001",
            ErrorCode::T002UndefinedVariable => "T002",
            ErrorCode::T003UndefinedFunction => "T003",
            ErrorCode::T006InvalidOperator => "T006",
            ErrorCode::T007InvalidCall => "T007",
            ErrorCode::T014InvalidReturnType => "T014",
            ErrorCode::T017IncompleteTraitImpl => "T017",
            ErrorCode::T032CannotInferType => "T032",
            ErrorCode::M001OrPatternBindings => "M001",
            ErrorCode::M002DuplicateDefinition => "M002",
            ErrorCode::F001InvalidExternSignature => "F001",
            ErrorCode::I001SourceRead => "I001",
            ErrorCode::C001NotImplemented => "C001",
            ErrorCode::C002CodegenError => "C002",
            ErrorCode::C003UnresolvedTypeInLowering => "C003",
            ErrorCode::G001Internal => "G001",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::L001InvalidCharacter => "Source contains an unexpected character.",
            ErrorCode::L002UnterminatedString => "A string literal is missing its closing quote.",
            ErrorCode::L003InvalidNumberFormat => "A numeric literal is malformed or out of range.",
            ErrorCode::S001UnexpectedToken => "The parser encountered an unexpected token.",
            ErrorCode::S002MissingExpectedToken => "The parser expected a token that is missing.",
            ErrorCode::T001TypeMismatch => "Expression type does not match the expected type.",
            ErrorCode::T002UndefinedVariable => "A referenced variable is not defined.",
            ErrorCode::T003UndefinedFunction => "A called function is not defined.",
            ErrorCode::T006InvalidOperator => "An operator was applied to unsupported types.",
            ErrorCode::T007InvalidCall => "A call does not match the callee's signature.",
            ErrorCode::T014InvalidReturnType => "A return value does not match the declared return type.",
            ErrorCode::T017IncompleteTraitImpl => "A trait implementation is missing required items.",
            ErrorCode::T032CannotInferType => "A variable's type cannot be inferred.",
            ErrorCode::M001OrPatternBindings => "Or-pattern alternatives bind different variables.",
            ErrorCode::M002DuplicateDefinition => "A name is defined more than once.",
            ErrorCode::F001InvalidExternSignature => "An external function signature is invalid.",
            ErrorCode::I001SourceRead => "A source file could not be read.",
            ErrorCode::C001NotImplemented => "The construct is not implemented by this stage.",
            ErrorCode::C002CodegenError => "Internal code generation error.",
            ErrorCode::C003UnresolvedTypeInLowering => {
                "An unresolved type reached code generation."
            }
            ErrorCode::G001Internal => "Internal compiler error.",
        }
    }
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// A single recorded diagnostic. Self-contained: the file name is resolved
/// at report time so readers never need the handler's file table.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub severity: Severity,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}]: {} ({}:{}:{})",
            self.severity.as_str(),
            self.code.code(),
            self.message,
            self.file,
            self.line,
            self.column
        )
    }
}

/// Error type wrapping one or more diagnostics, for embedding in driver
/// results.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", .0.first().map(|d| d.to_string()).unwrap_or_default())]
pub struct DiagnosticError(pub Vec<Diagnostic>);

impl DiagnosticError {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// ErrorHandler
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Store {
    files: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

/// Append-only diagnostic sink shared by all compilation stages.
///
/// Thread-safe: `report` and the read accessors each take the instance
/// mutex, so `errors()` observes a consistent snapshot even when an outer
/// driver parallelizes across compilation units.
#[derive(Debug, Default)]
pub struct ErrorHandler {
    store: Mutex<Store>,
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source file and return the id tokens and diagnostics use
    /// to refer to it.
    pub fn register_file(&self, name: impl Into<String>) -> FileId {
        let mut store = self.lock();
        store.files.push(name.into());
        FileId(store.files.len() as u32 - 1)
    }

    /// The registered name for `file`, or `<unknown>` for synthetic ids.
    pub fn file_name(&self, file: FileId) -> String {
        self.lock()
            .files
            .get(file.0 as usize)
            .cloned()
            .unwrap_or_else(|| "<unknown>".to_string())
    }

    pub fn report(
        &self,
        code: ErrorCode,
        message: impl Into<String>,
        file: FileId,
        line: u32,
        column: u32,
        severity: Severity,
    ) {
        let mut store = self.lock();
        let file = store
            .files
            .get(file.0 as usize)
            .cloned()
            .unwrap_or_else(|| "<unknown>".to_string());
        store.diagnostics.push(Diagnostic {
            code,
            message: message.into(),
            file,
            line,
            column,
            severity,
        });
    }

    pub fn warning(&self, code: ErrorCode, message: impl Into<String>, file: FileId, line: u32, column: u32) {
        self.report(code, message, file, line, column, Severity::Warning);
    }

    pub fn error(&self, code: ErrorCode, message: impl Into<String>, file: FileId, line: u32, column: u32) {
        self.report(code, message, file, line, column, Severity::Error);
    }

    pub fn fatal(&self, code: ErrorCode, message: impl Into<String>, file: FileId, line: u32, column: u32) {
        self.report(code, message, file, line, column, Severity::Fatal);
    }

    /// Snapshot of every recorded diagnostic, in report order.
    pub fn errors(&self) -> Vec<Diagnostic> {
        self.lock().diagnostics.clone()
    }

    /// True when any diagnostic of `Error` severity or above was recorded.
    pub fn has_errors(&self) -> bool {
        self.lock()
            .diagnostics
            .iter()
            .any(|d| d.severity >= Severity::Error)
    }

    pub fn has_fatal_errors(&self) -> bool {
        self.lock()
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Fatal)
    }

    pub fn error_count(&self) -> usize {
        self.lock()
            .diagnostics
            .iter()
            .filter(|d| d.severity >= Severity::Error)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        // A poisoned store means a reporting thread panicked; the recorded
        // diagnostics are still append-consistent, so keep serving them.
        match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_and_snapshot() {
        let handler = ErrorHandler::new();
        let file = handler.register_file("main.ly");
        handler.error(ErrorCode::T001TypeMismatch, "expected int, got string", file, 3, 7);

        let errors = handler.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].file, "main.ly");
        assert_eq!(errors[0].line, 3);
        assert!(handler.has_errors());
        assert!(!handler.has_fatal_errors());
    }

    #[test]
    fn warnings_do_not_gate() {
        let handler = ErrorHandler::new();
        let file = handler.register_file("main.ly");
        handler.warning(ErrorCode::C001NotImplemented, "channel send", file, 1, 1);

        assert!(!handler.has_errors());
        assert_eq!(handler.error_count(), 0);
        assert_eq!(handler.errors().len(), 1);
    }

    #[test]
    fn fatal_implies_error() {
        let handler = ErrorHandler::new();
        let file = handler.register_file("main.ly");
        handler.fatal(ErrorCode::C003UnresolvedTypeInLowering, "null type", file, 1, 1);

        assert!(handler.has_errors());
        assert!(handler.has_fatal_errors());
    }

    #[test]
    fn diagnostic_display() {
        let handler = ErrorHandler::new();
        let file = handler.register_file("main.ly");
        handler.error(ErrorCode::T002UndefinedVariable, "undefined variable `x`", file, 2, 5);
        let rendered = handler.errors()[0].to_string();
        assert!(rendered.starts_with("error[T002]: undefined variable `x`"));
        assert!(rendered.contains("main.ly:2:5"));
    }

    #[test]
    fn concurrent_append_is_safe() {
        let handler = std::sync::Arc::new(ErrorHandler::new());
        let file = handler.register_file("main.ly");
        let mut threads = Vec::new();
        for _ in 0..8 {
            let handler = handler.clone();
            threads.push(std::thread::spawn(move || {
                for i in 0..100 {
                    handler.error(ErrorCode::T001TypeMismatch, "mismatch", file, i, 0);
                }
            }));
        }
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(handler.error_count(), 800);
    }

    #[test]
    fn codes_are_unique() {
        let codes = [
            ErrorCode::L001InvalidCharacter,
            ErrorCode::L002UnterminatedString,
            ErrorCode::L003InvalidNumberFormat,
            ErrorCode::S001UnexpectedToken,
            ErrorCode::S002MissingExpectedToken,
            ErrorCode::T001TypeMismatch,
            ErrorCode::T002UndefinedVariable,
            ErrorCode::T003UndefinedFunction,
            ErrorCode::T006InvalidOperator,
            ErrorCode::T007InvalidCall,
            ErrorCode::T014InvalidReturnType,
            ErrorCode::T017IncompleteTraitImpl,
            ErrorCode::T032CannotInferType,
            ErrorCode::M001OrPatternBindings,
            ErrorCode::M002DuplicateDefinition,
            ErrorCode::F001InvalidExternSignature,
            ErrorCode::I001SourceRead,
            ErrorCode::C001NotImplemented,
            ErrorCode::C002CodegenError,
            ErrorCode::C003UnresolvedTypeInLowering,
            ErrorCode::G001Internal,
        ];
        let mut seen = std::collections::BTreeSet::new();
        for code in codes {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
            assert!(!code.description().is_empty());
        }
    }
}
