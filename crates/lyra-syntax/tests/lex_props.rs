use lyra_diag::ErrorHandler;
use lyra_syntax::{LexConfig, Token, TokenKind, tokenize};
use proptest::prelude::*;

fn lex(source: &str) -> Vec<Token> {
    let errors = ErrorHandler::new();
    let file = errors.register_file("prop.ly");
    tokenize(source, file, &LexConfig::default(), &errors)
}

fn assert_balanced(tokens: &[Token]) {
    let mut level: i64 = 0;
    for token in tokens {
        match token.kind {
            TokenKind::Indent => level += 1,
            TokenKind::Dedent => level -= 1,
            _ => {}
        }
        assert!(level >= 0, "running indent level went negative");
    }
    assert_eq!(level, 0, "indent/dedent counts out of balance");
}

proptest! {
    // The lexer's structural contract holds for any input at all: it never
    // panics, always terminates the stream with Eof, and always balances
    // Indent with Dedent.
    #[test]
    fn arbitrary_input_keeps_the_structural_contract(source in "[ -~\t\n]{0,256}") {
        let tokens = lex(&source);
        prop_assert_eq!(&tokens.last().unwrap().kind, &TokenKind::Eof);
        assert_balanced(&tokens);
    }

    // Programs whose indentation follows a stack discipline (each line goes
    // at most one level deeper than the previous) lex without any lexical
    // diagnostics and still balance.
    #[test]
    fn consistent_indentation_balances(steps in prop::collection::vec(0u32..5, 1..24)) {
        let mut source = String::new();
        let mut previous = 0u32;
        for step in steps {
            let level = step.min(previous + 1);
            for _ in 0..level * 4 {
                source.push(' ');
            }
            source.push_str("x\n");
            previous = level;
        }

        let errors = ErrorHandler::new();
        let file = errors.register_file("prop.ly");
        let tokens = tokenize(&source, file, &LexConfig::default(), &errors);
        prop_assert!(!errors.has_errors());
        assert_balanced(&tokens);
    }

    // Line comments are invisible: interleaving comment-only lines into an
    // indented program never changes the Indent/Dedent sequence.
    #[test]
    fn comment_lines_are_invisible_to_indentation(depth in 1u32..4) {
        let mut plain = String::new();
        let mut commented = String::new();
        for level in 0..=depth {
            let pad = " ".repeat((level * 4) as usize);
            plain.push_str(&format!("{pad}x\n"));
            commented.push_str(&format!("{pad}# note\n{pad}x\n"));
        }
        let structural = |tokens: Vec<Token>| -> Vec<TokenKind> {
            tokens
                .into_iter()
                .filter(|t| matches!(t.kind, TokenKind::Indent | TokenKind::Dedent))
                .map(|t| t.kind)
                .collect()
        };
        prop_assert_eq!(structural(lex(&plain)), structural(lex(&commented)));
    }
}
