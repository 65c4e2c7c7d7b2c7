use std::fs;
use std::path::{Path, PathBuf};

use lyra::Compiler;
use lyra_diag::ErrorCode;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(message) = run() {
        eprintln!("{message}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args = std::env::args().collect::<Vec<_>>();
    match parse_cli(&args)? {
        Command::Tokens { input } => {
            let compiler = Compiler::new();
            let Some(source) = load_source(&compiler, &input) else {
                emit_diagnostics(&compiler);
                std::process::exit(1);
            };
            let tokens = compiler.tokenize(&source, &input.display().to_string());
            for token in &tokens {
                println!(
                    "{:>4}:{:<3} {:?} {}",
                    token.line, token.column, token.kind, token.lexeme
                );
            }
            emit_diagnostics(&compiler);
            if compiler.errors().has_errors() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

#[derive(Debug, PartialEq)]
enum Command {
    /// Dump the token stream for a source file.
    Tokens { input: PathBuf },
}

fn parse_cli(args: &[String]) -> Result<Command, String> {
    let usage = "usage: lyra tokens <file>";
    match args.get(1).map(String::as_str) {
        Some("tokens") => {
            let input = args
                .get(2)
                .ok_or_else(|| format!("missing input file\n{usage}"))?;
            if args.len() > 3 {
                return Err(format!("unexpected trailing arguments\n{usage}"));
            }
            Ok(Command::Tokens {
                input: PathBuf::from(input),
            })
        }
        Some(other) => Err(format!("unknown command `{other}`\n{usage}")),
        None => Err(usage.to_string()),
    }
}

fn load_source(compiler: &Compiler, path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(source) => Some(source),
        Err(err) => {
            let file = compiler.errors().register_file(path.display().to_string());
            compiler.errors().error(
                ErrorCode::I001SourceRead,
                format!("failed to read source file: {err}"),
                file,
                0,
                0,
            );
            None
        }
    }
}

fn emit_diagnostics(compiler: &Compiler) {
    for diagnostic in compiler.errors().errors() {
        eprintln!("{diagnostic}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn cli_parses_tokens_command() {
        let parsed = parse_cli(&args(&["lyra", "tokens", "main.ly"])).unwrap();
        assert_eq!(
            parsed,
            Command::Tokens {
                input: PathBuf::from("main.ly")
            }
        );
    }

    #[test]
    fn cli_rejects_unknown_commands_and_missing_input() {
        assert!(parse_cli(&args(&["lyra"])).is_err());
        assert!(parse_cli(&args(&["lyra", "build"])).is_err());
        assert!(parse_cli(&args(&["lyra", "tokens"])).is_err());
        assert!(parse_cli(&args(&["lyra", "tokens", "a", "b"])).is_err());
    }
}
