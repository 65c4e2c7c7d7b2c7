//! Compilation pipeline driver for Lyra.
//!
//! Wires the stages together — lexer, external parser (via the [`Parse`]
//! seam), type checker, IR generator — around one shared diagnostic sink,
//! gating each stage on the accumulated severity.

mod compiler;

pub use compiler::{Compiler, Parse};
