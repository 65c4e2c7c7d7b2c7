//! Hand-written lexer for Lyra source code.

use lyra_ast::{Token, TokenKind};
use lyra_diag::{ErrorCode, ErrorHandler, FileId};
use rustc_hash::FxHashMap;

/// The keyword lookup table.
///
/// Built once and injected into [`tokenize`] rather than living as ambient
/// static state, so embedders can extend or restrict the keyword set.
#[derive(Debug)]
pub struct KeywordTable {
    map: FxHashMap<&'static str, TokenKind>,
}

impl Default for KeywordTable {
    fn default() -> Self {
        let mut map = FxHashMap::default();
        map.insert("let", TokenKind::Let);
        map.insert("def", TokenKind::Def);
        map.insert("class", TokenKind::Class);
        map.insert("if", TokenKind::If);
        map.insert("elif", TokenKind::Elif);
        map.insert("else", TokenKind::Else);
        map.insert("while", TokenKind::While);
        map.insert("for", TokenKind::For);
        map.insert("in", TokenKind::In);
        map.insert("return", TokenKind::Return);
        map.insert("import", TokenKind::Import);
        map.insert("from", TokenKind::From);
        map.insert("match", TokenKind::Match);
        map.insert("case", TokenKind::Case);
        map.insert("const", TokenKind::Const);
        map.insert("true", TokenKind::True);
        map.insert("false", TokenKind::False);
        map.insert("None", TokenKind::NilKw);
        map.insert("and", TokenKind::And);
        map.insert("or", TokenKind::Or);
        map.insert("not", TokenKind::Not);
        map.insert("lambda", TokenKind::Lambda);
        map.insert("async", TokenKind::Async);
        map.insert("await", TokenKind::Await);
        map.insert("go", TokenKind::Go);
        map.insert("select", TokenKind::Select);
        map.insert("trait", TokenKind::TraitKw);
        map.insert("impl", TokenKind::Impl);
        map.insert("break", TokenKind::Break);
        map.insert("continue", TokenKind::Continue);
        Self { map }
    }
}

impl KeywordTable {
    pub fn lookup(&self, ident: &str) -> Option<TokenKind> {
        self.map.get(ident).cloned()
    }
}

/// Lexer configuration, constructed once by the driver.
#[derive(Debug)]
pub struct LexConfig {
    pub keywords: KeywordTable,
    /// Columns per indentation level; a tab counts as this many columns.
    pub indent_width: u32,
}

impl Default for LexConfig {
    fn default() -> Self {
        Self {
            keywords: KeywordTable::default(),
            indent_width: 4,
        }
    }
}

/// Lex `source` into an ordered token sequence terminated by `Eof`.
///
/// Never fails: lexical errors are reported to `errors` and surface as
/// `Error`-kind tokens in the stream, and `Indent`/`Dedent` counts are
/// balanced by construction for any input.
pub fn tokenize(source: &str, file: FileId, config: &LexConfig, errors: &ErrorHandler) -> Vec<Token> {
    let mut lexer = Lexer::new(source, file, config, errors);
    lexer.scan_all();
    tracing::debug!(tokens = lexer.tokens.len(), "lexed source");
    lexer.tokens
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    file: FileId,
    config: &'a LexConfig,
    errors: &'a ErrorHandler,
    pos: usize,
    line: u32,
    column: u32,
    at_line_start: bool,
    indent_level: u32,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str, file: FileId, config: &'a LexConfig, errors: &'a ErrorHandler) -> Self {
        Self {
            src: source,
            bytes: source.as_bytes(),
            file,
            config,
            errors,
            pos: 0,
            line: 1,
            column: 1,
            at_line_start: true,
            indent_level: 0,
            tokens: Vec::new(),
        }
    }

    fn scan_all(&mut self) {
        while !self.is_at_end() {
            if self.at_line_start {
                self.handle_line_start();
                continue;
            }
            self.skip_spacing();
            if self.at_line_start || self.is_at_end() {
                continue;
            }
            self.scan_token();
        }
        // Flush remaining indentation so Indent/Dedent always balance.
        while self.indent_level > 0 {
            self.indent_level -= 1;
            self.tokens
                .push(Token::new(TokenKind::Dedent, "", self.file, self.line, self.column));
        }
        self.tokens
            .push(Token::new(TokenKind::Eof, "", self.file, self.line, self.column));
    }

    // -- Line starts and indentation --------------------------------------

    fn handle_line_start(&mut self) {
        let mut columns = 0u32;
        let mut saw_space = false;
        let mut saw_tab = false;
        loop {
            match self.peek() {
                Some(b' ') => {
                    columns += 1;
                    saw_space = true;
                    self.advance();
                }
                Some(b'\t') => {
                    columns += self.config.indent_width;
                    saw_tab = true;
                    self.advance();
                }
                _ => break,
            }
        }
        if saw_space && saw_tab {
            self.errors.error(
                ErrorCode::L001InvalidCharacter,
                "mixed tabs and spaces in indentation",
                self.file,
                self.line,
                1,
            );
        }

        match self.peek() {
            None => self.at_line_start = false,
            // Blank line: no effect on indentation.
            Some(b'\n') => self.advance_newline(),
            Some(b'\r') => {
                self.advance();
            }
            Some(b'#') => self.line_start_comment(columns),
            Some(_) => {
                self.apply_indent(columns);
                self.at_line_start = false;
            }
        }
    }

    /// A comment at a line start. Comment-only lines are skipped without
    /// affecting indentation; code after a closed block comment starts the
    /// line with the indentation measured before the comment.
    fn line_start_comment(&mut self, columns: u32) {
        self.advance(); // '#'
        if self.peek() == Some(b'#') {
            self.advance();
            self.skip_block_comment_body();
            loop {
                match self.peek() {
                    Some(b' ') | Some(b'\t') | Some(b'\r') => {
                        self.advance();
                    }
                    _ => break,
                }
            }
            match self.peek() {
                None => self.at_line_start = false,
                Some(b'\n') => self.advance_newline(),
                Some(_) => {
                    self.apply_indent(columns);
                    self.at_line_start = false;
                }
            }
        } else {
            while let Some(c) = self.peek() {
                if c == b'\n' {
                    break;
                }
                self.advance();
            }
            if self.peek() == Some(b'\n') {
                self.advance_newline();
            } else {
                self.at_line_start = false;
            }
        }
    }

    fn apply_indent(&mut self, columns: u32) {
        let new_level = columns / self.config.indent_width;
        while new_level > self.indent_level {
            self.indent_level += 1;
            self.tokens
                .push(Token::new(TokenKind::Indent, "", self.file, self.line, self.column));
        }
        while new_level < self.indent_level {
            self.indent_level -= 1;
            self.tokens
                .push(Token::new(TokenKind::Dedent, "", self.file, self.line, self.column));
        }
    }

    // -- Mid-line spacing and comments ------------------------------------

    fn skip_spacing(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') => {
                    self.advance();
                }
                Some(b'\n') => {
                    self.advance_newline();
                    return;
                }
                Some(b'#') => {
                    self.advance();
                    if self.peek() == Some(b'#') {
                        self.advance();
                        self.skip_block_comment_body();
                    } else {
                        while let Some(c) = self.peek() {
                            if c == b'\n' {
                                break;
                            }
                            self.advance();
                        }
                    }
                }
                _ => return,
            }
        }
    }

    /// Consume a `##` block comment body through its closing `##`.
    /// Embedded newlines advance the line counter but do not start a new
    /// logical line — the comment is invisible to the indentation machine.
    fn skip_block_comment_body(&mut self) {
        while let Some(c) = self.peek() {
            if c == b'#' && self.peek_next() == Some(b'#') {
                self.advance();
                self.advance();
                return;
            }
            if c == b'\n' {
                self.advance();
                self.line += 1;
                self.column = 1;
            } else {
                self.advance();
            }
        }
    }

    // -- Tokens ------------------------------------------------------------

    fn scan_token(&mut self) {
        let start = self.pos;
        let line = self.line;
        let column = self.column;
        let Some(c) = self.peek() else {
            return;
        };

        if c.is_ascii_alphabetic() || c == b'_' {
            self.scan_identifier(start, line, column);
            return;
        }
        if c.is_ascii_digit() {
            self.scan_number(start, line, column);
            return;
        }
        if c == b'"' || c == b'\'' {
            self.scan_string(start, line, column);
            return;
        }

        self.advance();
        // Maximal munch: two-character operators before single-character
        // fallback.
        let kind = match c {
            b'+' => {
                if self.match_byte(b'=') {
                    TokenKind::PlusEqual
                } else {
                    TokenKind::Plus
                }
            }
            b'-' => {
                if self.match_byte(b'=') {
                    TokenKind::MinusEqual
                } else if self.match_byte(b'>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }
            b'=' => {
                if self.match_byte(b'=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                }
            }
            b'!' => {
                if self.match_byte(b'=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                }
            }
            b'<' => {
                if self.match_byte(b'=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                }
            }
            b'>' => {
                if self.match_byte(b'=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            b':' => {
                if self.match_byte(b':') {
                    TokenKind::ColonColon
                } else {
                    TokenKind::Colon
                }
            }
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,
            b';' => TokenKind::Semicolon,
            b',' => TokenKind::Comma,
            b'.' => TokenKind::Dot,
            b'?' => TokenKind::Question,
            b'(' => TokenKind::LeftParen,
            b')' => TokenKind::RightParen,
            b'{' => TokenKind::LeftBrace,
            b'}' => TokenKind::RightBrace,
            b'[' => TokenKind::LeftBracket,
            b']' => TokenKind::RightBracket,
            _ => {
                // Consume the remainder of a multi-byte character so the
                // lexeme slice stays on a UTF-8 boundary.
                while matches!(self.peek(), Some(b) if b & 0xC0 == 0x80) {
                    self.advance();
                }
                let lexeme = &self.src[start..self.pos];
                let message = format!("unexpected character `{lexeme}`");
                self.errors
                    .error(ErrorCode::L001InvalidCharacter, &message, self.file, line, column);
                self.emit(TokenKind::Error(message), start, line, column);
                return;
            }
        };
        self.emit(kind, start, line, column);
    }

    fn scan_identifier(&mut self, start: usize, line: u32, column: u32) {
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.advance();
        }
        let text = &self.src[start..self.pos];
        let kind = self
            .config
            .keywords
            .lookup(text)
            .unwrap_or(TokenKind::Identifier);
        self.emit(kind, start, line, column);
    }

    fn scan_number(&mut self, start: usize, line: u32, column: u32) {
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let mut kind = TokenKind::Int;
        if self.peek() == Some(b'.')
            && matches!(self.peek_next(), Some(c) if c.is_ascii_digit())
        {
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
            kind = TokenKind::Float;
        }
        self.emit(kind, start, line, column);
    }

    /// Scan a single- or double-quoted string literal. A backslash escapes
    /// the next character; decoding is deferred to IR literal lowering, so
    /// the lexeme keeps the raw text including its quotes.
    fn scan_string(&mut self, start: usize, line: u32, column: u32) {
        let Some(quote) = self.peek() else { return };
        self.advance();
        loop {
            match self.peek() {
                None => {
                    self.unterminated_string(start, line, column);
                    return;
                }
                Some(b'\n') => {
                    // Leave the newline for the indentation machine.
                    self.unterminated_string(start, line, column);
                    return;
                }
                Some(b'\\') => {
                    self.advance();
                    match self.peek() {
                        None => {
                            self.unterminated_string(start, line, column);
                            return;
                        }
                        Some(b'\n') => {
                            self.advance();
                            self.line += 1;
                            self.column = 1;
                        }
                        Some(_) => {
                            self.advance();
                        }
                    }
                }
                Some(c) if c == quote => {
                    self.advance();
                    self.emit(TokenKind::Str, start, line, column);
                    return;
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    fn unterminated_string(&mut self, start: usize, line: u32, column: u32) {
        let message = "unterminated string literal".to_string();
        self.errors
            .error(ErrorCode::L002UnterminatedString, &message, self.file, line, column);
        self.emit(TokenKind::Error(message), start, line, column);
    }

    // -- Cursor ------------------------------------------------------------

    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.bytes.get(self.pos + 1).copied()
    }

    fn advance(&mut self) {
        if self.pos < self.bytes.len() {
            self.pos += 1;
            self.column += 1;
        }
    }

    fn advance_newline(&mut self) {
        self.advance();
        self.line += 1;
        self.column = 1;
        self.at_line_start = true;
    }

    fn match_byte(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn emit(&mut self, kind: TokenKind, start: usize, line: u32, column: u32) {
        let lexeme = self.src[start..self.pos].to_string();
        self.tokens
            .push(Token::new(kind, lexeme, self.file, line, column));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> (Vec<Token>, ErrorHandler) {
        let errors = ErrorHandler::new();
        let file = errors.register_file("test.ly");
        let config = LexConfig::default();
        let tokens = tokenize(source, file, &config, &errors);
        (tokens, errors)
    }

    fn kinds(tokens: &[Token]) -> Vec<&TokenKind> {
        tokens.iter().map(|t| &t.kind).collect()
    }

    fn count(tokens: &[Token], kind: &TokenKind) -> usize {
        tokens.iter().filter(|t| &t.kind == kind).count()
    }

    #[test]
    fn empty_input_is_just_eof() {
        let (tokens, errors) = lex("");
        assert_eq!(kinds(&tokens), vec![&TokenKind::Eof]);
        assert!(!errors.has_errors());
    }

    #[test]
    fn indent_and_dedent_balance() {
        let source = "if x:\n    let y = 1\n    if z:\n        let w = 2\nlet t = 3\n";
        let (tokens, _) = lex(source);
        assert_eq!(count(&tokens, &TokenKind::Indent), 2);
        assert_eq!(count(&tokens, &TokenKind::Dedent), 2);
    }

    #[test]
    fn dedents_flush_at_end_of_input() {
        let (tokens, _) = lex("while x:\n    y");
        assert_eq!(count(&tokens, &TokenKind::Indent), 1);
        assert_eq!(count(&tokens, &TokenKind::Dedent), 1);
        assert_eq!(tokens.last().map(|t| &t.kind), Some(&TokenKind::Eof));
    }

    #[test]
    fn blank_and_comment_lines_do_not_affect_indentation() {
        let source = "if x:\n    a\n\n    # a comment line\n    b\n";
        let (tokens, _) = lex(source);
        assert_eq!(count(&tokens, &TokenKind::Indent), 1);
        assert_eq!(count(&tokens, &TokenKind::Dedent), 1);
    }

    #[test]
    fn tabs_count_as_one_level() {
        let (tokens, _) = lex("if x:\n\ty\n");
        assert_eq!(count(&tokens, &TokenKind::Indent), 1);
        assert_eq!(count(&tokens, &TokenKind::Dedent), 1);
    }

    #[test]
    fn multi_level_dedent_emits_one_token_per_level() {
        let source = "a:\n    b:\n        c\nd\n";
        let (tokens, _) = lex(source);
        // Two levels closed at once before `d`.
        let dedent_positions: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| t.kind == TokenKind::Dedent)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(dedent_positions.len(), 2);
        assert_eq!(dedent_positions[0] + 1, dedent_positions[1]);
    }

    #[test]
    fn comments_produce_no_tokens() {
        let (tokens, errors) = lex("# just a comment\n## block\ncomment ## \n");
        assert_eq!(kinds(&tokens), vec![&TokenKind::Eof]);
        assert!(!errors.has_errors());
    }

    #[test]
    fn block_comment_newlines_advance_line_counter() {
        let (tokens, _) = lex("## one\ntwo\nthree ## x");
        let x = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Identifier)
            .expect("identifier after comment");
        assert_eq!(x.lexeme, "x");
        assert_eq!(x.line, 3);
    }

    #[test]
    fn line_comment_mid_line() {
        let (tokens, _) = lex("let x # trailing\nlet y\n");
        assert_eq!(count(&tokens, &TokenKind::Let), 2);
        assert_eq!(count(&tokens, &TokenKind::Identifier), 2);
    }

    #[test]
    fn keywords_and_identifiers() {
        let (tokens, _) = lex("let letter match matched None Nonem");
        assert_eq!(
            kinds(&tokens),
            vec![
                &TokenKind::Let,
                &TokenKind::Identifier,
                &TokenKind::Match,
                &TokenKind::Identifier,
                &TokenKind::NilKw,
                &TokenKind::Identifier,
                &TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers() {
        let (tokens, _) = lex("42 3.25 7.\n");
        assert_eq!(
            kinds(&tokens),
            vec![
                &TokenKind::Int,
                &TokenKind::Float,
                &TokenKind::Int,
                &TokenKind::Dot,
                &TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[0].lexeme, "42");
        assert_eq!(tokens[1].lexeme, "3.25");
    }

    #[test]
    fn operators_use_maximal_munch() {
        let (tokens, _) = lex("+= -= -> == != <= >= :: = < > : -");
        assert_eq!(
            kinds(&tokens),
            vec![
                &TokenKind::PlusEqual,
                &TokenKind::MinusEqual,
                &TokenKind::Arrow,
                &TokenKind::EqualEqual,
                &TokenKind::BangEqual,
                &TokenKind::LessEqual,
                &TokenKind::GreaterEqual,
                &TokenKind::ColonColon,
                &TokenKind::Equal,
                &TokenKind::Less,
                &TokenKind::Greater,
                &TokenKind::Colon,
                &TokenKind::Minus,
                &TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_lexeme_keeps_quotes_and_escapes() {
        let (tokens, errors) = lex(r#"let s = "a\nb""#);
        let s = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Str)
            .expect("string token");
        assert_eq!(s.lexeme, r#""a\nb""#);
        assert!(!errors.has_errors());
    }

    #[test]
    fn single_quoted_string_and_escaped_quote() {
        let (tokens, _) = lex(r#"'it\'s'"#);
        let s = &tokens[0];
        assert_eq!(s.kind, TokenKind::Str);
        assert_eq!(s.lexeme, r#"'it\'s'"#);
    }

    #[test]
    fn unterminated_string_yields_error_token_and_recovers() {
        let (tokens, errors) = lex("let s = \"oops\nlet t = 1\n");
        assert!(tokens.iter().any(Token::is_error));
        // Scanning continues on the next line.
        assert_eq!(count(&tokens, &TokenKind::Let), 2);
        let recorded = errors.errors();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].code.code(), "L002");
    }

    #[test]
    fn unterminated_string_at_eof() {
        let (tokens, errors) = lex("\"dangling");
        assert!(tokens.iter().any(Token::is_error));
        assert!(errors.has_errors());
        assert_eq!(tokens.last().map(|t| &t.kind), Some(&TokenKind::Eof));
    }

    #[test]
    fn unexpected_character_recovers_locally() {
        let (tokens, errors) = lex("let @ x");
        assert!(tokens.iter().any(Token::is_error));
        assert_eq!(count(&tokens, &TokenKind::Let), 1);
        assert_eq!(count(&tokens, &TokenKind::Identifier), 1);
        assert_eq!(errors.errors()[0].code.code(), "L001");
    }

    #[test]
    fn token_positions_are_one_based() {
        let (tokens, _) = lex("let x\nlet y\n");
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (1, 5));
        assert_eq!((tokens[2].line, tokens[2].column), (2, 1));
    }

    #[test]
    fn indent_level_replay_never_goes_negative() {
        let source = "a:\n        deep\nb\n    c\nd\n";
        let (tokens, _) = lex(source);
        let mut level: i64 = 0;
        for token in &tokens {
            match token.kind {
                TokenKind::Indent => level += 1,
                TokenKind::Dedent => level -= 1,
                _ => {}
            }
            assert!(level >= 0, "indent level went negative");
        }
        assert_eq!(level, 0);
    }
}
