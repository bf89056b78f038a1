use clap::Parser;
use std::{fs, path::PathBuf, process};

use minicc::codegen;
use minicc::error::{CompileError, CompileResult};
use minicc::{lexer, parser};

#[derive(Parser, Debug)]
#[command(name = "minicc")]
#[command(about = "A small C compiler targeting ARM64 and x86-64")]
struct Args {
    /// Input source file.
    input: PathBuf,
    /// Output path. Defaults to the input file's stem.
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,
    /// Stop after writing assembly; do not assemble or link.
    #[arg(short = 'S')]
    assembly_only: bool,
    /// Print the parsed syntax tree as JSON and exit.
    #[arg(long = "dump-ast")]
    dump_ast: bool,
}

fn main() {
    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn run(args: Args) -> CompileResult<()> {
    let source = fs::read_to_string(&args.input).map_err(|err| {
        CompileError::new(format!("cannot open file {}: {err}", args.input.display()))
    })?;

    let tokens = lexer::tokenize(&source)?;
    let program = parser::parse(&tokens)?;

    if args.dump_ast {
        let json = serde_json::to_string_pretty(&program)
            .map_err(|err| CompileError::new(format!("cannot serialize syntax tree: {err}")))?;
        match &args.output {
            Some(path) => {
                fs::write(path, json + "\n").map_err(|err| {
                    CompileError::new(format!("cannot write {}: {err}", path.display()))
                })?;
                println!("Generated AST JSON: {}", path.display());
            }
            None => println!("{json}"),
        }
        return Ok(());
    }

    let asm = codegen::generate(&program)?;

    // With -S, -o names the assembly itself; otherwise it names the
    // executable and the assembly lands next to it.
    let asm_path = match (&args.output, args.assembly_only) {
        (Some(path), true) => path.clone(),
        (Some(path), false) => PathBuf::from(format!("{}.s", path.display())),
        (None, _) => args.input.with_extension("s"),
    };
    fs::write(&asm_path, asm)
        .map_err(|err| CompileError::new(format!("cannot write {}: {err}", asm_path.display())))?;
    println!("Generated assembly: {}", asm_path.display());

    if args.assembly_only {
        return Ok(());
    }

    let exe_path = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension(""));
    assemble_and_link(&asm_path, &exe_path)?;
    println!("Created executable: {}", exe_path.display());
    Ok(())
}

fn assemble_and_link(asm_path: &PathBuf, exe_path: &PathBuf) -> CompileResult<()> {
    println!("Assembling and linking...");
    let status = process::Command::new("cc")
        .arg("-o")
        .arg(exe_path)
        .arg(asm_path)
        .arg("-lc")
        .status()
        .map_err(|err| CompileError::new(format!("cannot run cc: {err}")))?;
    if !status.success() {
        return Err(CompileError::new("linking failed"));
    }
    Ok(())
}
