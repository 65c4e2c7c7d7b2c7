//! The compilation session and stage orchestration.

use std::sync::Arc;

use lyra_ast::{Stmt, Token};
use lyra_check::TypeChecker;
use lyra_diag::ErrorHandler;
use lyra_ir::{IrGenerator, IrModule};
use lyra_syntax::{LexConfig, tokenize};
use lyra_types::{TraitRegistry, TypeTable};

/// The external-parser collaborator contract.
///
/// A parser consumes the ordered token stream, produces statements
/// satisfying the AST capability sets (every node carrying its originating
/// token), and reports syntax diagnostics (`S0xx`) into the shared handler
/// rather than failing.
pub trait Parse {
    fn parse(&self, tokens: Vec<Token>, errors: &ErrorHandler) -> Vec<Stmt>;
}

/// One compilation session: the process-lifetime diagnostic sink plus the
/// immutable tables injected into each stage.
///
/// The pipeline is single-threaded and synchronous per compilation unit.
/// An outer driver that compiles units in parallel gives each unit its own
/// `Compiler`; only the [`ErrorHandler`] is safe to share, which is why it
/// is held behind an `Arc` — see [`Compiler::with_errors`].
#[derive(Debug, Default)]
pub struct Compiler {
    errors: Arc<ErrorHandler>,
    lex_config: LexConfig,
    type_table: TypeTable,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session reporting into an existing shared sink, for drivers that
    /// fan compilation units out across threads.
    pub fn with_errors(errors: Arc<ErrorHandler>) -> Self {
        Self {
            errors,
            ..Self::default()
        }
    }

    pub fn errors(&self) -> &ErrorHandler {
        &self.errors
    }

    /// The name → type table for basic type spellings; external parsers
    /// resolve annotation names against this.
    pub fn type_table(&self) -> &TypeTable {
        &self.type_table
    }

    /// Run the lexing stage on one source buffer.
    pub fn tokenize(&self, source: &str, filename: &str) -> Vec<Token> {
        let file = self.errors.register_file(filename);
        tokenize(source, file, &self.lex_config, &self.errors)
    }

    /// Run the full pipeline on one source buffer.
    ///
    /// Stages are gated on the shared handler: fatal diagnostics stop the
    /// pipeline immediately, and a module is only produced when the whole
    /// front end finished without errors. (Whether partial IR would still
    /// be worth emitting on error is a driver decision — this driver
    /// declines and leaves the diagnostics for inspection.)
    pub fn compile(&self, source: &str, filename: &str, parser: &dyn Parse) -> Option<IrModule> {
        let tokens = self.tokenize(source, filename);
        if self.errors.has_fatal_errors() {
            return None;
        }

        let mut ast = parser.parse(tokens, &self.errors);
        if self.errors.has_fatal_errors() {
            return None;
        }

        let mut traits = TraitRegistry::new();
        TypeChecker::new(&self.errors, &mut traits).check_module(&mut ast);
        if self.errors.has_errors() {
            return None;
        }

        let mut generator = IrGenerator::new(&self.errors);
        generator.lower_module(&ast);
        if self.errors.has_fatal_errors() {
            return None;
        }
        tracing::debug!(filename, "compilation unit lowered");
        Some(generator.finish())
    }
}
