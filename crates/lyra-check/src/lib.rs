//! Type checking for Lyra.
//!
//! The checker visits every AST node exactly once, annotates expressions
//! with resolved types in place, and records diagnostics without unwinding.
//! On error it substitutes a best-effort placeholder (`unknown` for
//! expressions, `void` for statements) so a single pass surfaces as many
//! independent problems as possible.

mod typeck;

pub use typeck::TypeChecker;
