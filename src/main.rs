use std::env;
use std::fs;
use std::process::ExitCode;

use tlb::schema::{compile_str, rust_module, CompileOptions, EmitOptions};
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("tlb-gen: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), String> {
    let mut schema_path = None;
    let mut compile_opts = CompileOptions::default();
    let mut emit_opts = EmitOptions::default();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--skip-magic" => compile_opts.skip_magic = true,
            "--prefix" => {
                emit_opts.type_prefix = args
                    .next()
                    .ok_or_else(|| "--prefix requires a name".to_string())?;
            }
            "--crate-path" => {
                emit_opts.crate_path = args
                    .next()
                    .ok_or_else(|| "--crate-path requires a path".to_string())?;
            }
            "--known" => {
                let names = args
                    .next()
                    .ok_or_else(|| "--known requires a comma-separated list".to_string())?;
                compile_opts = compile_opts.with_known_types(
                    names.split(',').map(str::trim).filter(|n| !n.is_empty()),
                );
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            other if other.starts_with('-') => return Err(format!("unknown argument: {other}")),
            path => {
                if schema_path.replace(path.to_owned()).is_some() {
                    return Err("only one schema file may be given".to_string());
                }
            }
        }
    }

    let schema_path = schema_path.ok_or_else(|| {
        print_usage();
        "no schema file given".to_string()
    })?;
    let text = fs::read_to_string(&schema_path)
        .map_err(|err| format!("cannot read {schema_path}: {err}"))?;
    let defs = compile_str(&text, &compile_opts).map_err(|err| format!("{schema_path}: {err}"))?;
    debug!(path = %schema_path, types = defs.len(), "compiled schema");
    print!("{}", rust_module(&defs, &emit_opts));
    Ok(())
}

fn print_usage() {
    eprintln!(
        "Usage: tlb-gen [--skip-magic] [--prefix NAME] [--crate-path PATH] [--known A,B,..] SCHEMA.tlb"
    );
}
