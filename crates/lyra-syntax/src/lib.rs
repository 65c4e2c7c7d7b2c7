//! Lexical analysis for Lyra source text.
//!
//! The lexer is indentation-aware: it tracks the significant-whitespace
//! level at each logical line start and emits `Indent`/`Dedent` tokens that
//! are balanced by construction for any input. It never fails — lexical
//! errors become `Error`-kind tokens so the parser can recover locally.

mod lexer;

pub use lexer::{KeywordTable, LexConfig, tokenize};
pub use lyra_ast::{Token, TokenKind};
