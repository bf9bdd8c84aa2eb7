use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use num_traits::ToPrimitive;
use plcparse::backend::{generator, interpreter::Interpreter};
use plcparse::environment::Value;
use plcparse::{analyzer, lexer, parser};

fn main() -> Result<ExitCode> {
    let mut args = std::env::args().skip(1);
    let mut backend_name = "interpreter".to_string();
    let mut input_path: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--backend" | "-b" => {
                backend_name = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing backend name after {arg}"))?;
            }
            _ => {
                input_path = Some(arg);
                if args.next().is_some() {
                    bail!("Only one input file is supported");
                }
                break;
            }
        }
    }

    let source = if let Some(path) = input_path {
        fs::read_to_string(&path).with_context(|| format!("Reading {path}"))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        buffer
    };

    let tokens = lexer::tokenize(&source)?;
    let parsed = parser::parse_tokens(tokens)?;
    let typed = analyzer::analyze(&parsed)?;

    match backend_name.as_str() {
        "interpreter" => {
            let mut interpreter = Interpreter::new();
            let result = interpreter.run(&typed)?;
            // The program's result becomes the process exit code, the way
            // the generated program delegates through System.exit.
            let code = match result {
                Value::Integer(value) => value.to_u8().unwrap_or(1),
                _ => 0,
            };
            Ok(ExitCode::from(code))
        }
        "generator" => {
            print!("{}", generator::generate(&typed));
            println!();
            Ok(ExitCode::SUCCESS)
        }
        other => bail!("Unknown backend '{other}'"),
    }
}
