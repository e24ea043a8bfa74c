//! The compiler driver: parses CLI options, runs the requested prefix of
//! the pipeline (scan/parse/inter/assembly), and writes the result to
//! stdout or `--output`. See `src/lib.rs` and its submodules for the
//! pipeline itself; everything here is plumbing external to the core
//! three subsystems (scanner/parser, lowering, optimizer).

use std::fs;
use std::io::Write;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use decafc::back::code_gen;
use decafc::common::Diagnostic;
use decafc::front::lex::Lexer;
use decafc::front::parse;
use decafc::middle::{lower, optimize, Passes};

#[derive(Debug, Parser)]
#[command(name = "compiler", version, about = "A whole-program Decaf-style compiler.")]
struct Args {
    /// The Decaf source file to compile.
    file: String,

    /// Stop after this phase instead of emitting assembly.
    #[arg(short, long, value_enum, default_value_t = Target::Assembly)]
    target: Target,

    /// Write output to this path instead of standard output.
    #[arg(short, long)]
    output: Option<String>,

    /// Comma-separated optimizer passes to enable: cse, cp, dce, all.
    /// Prefix with `-` to disable a pass (e.g. `all,-dce`).
    #[arg(short = 'O', long)]
    optimizations: Option<String>,

    /// Dump LLIR instead of assembly at the assembly target.
    #[arg(short, long, default_value_t = false)]
    debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Target {
    Scan,
    Parse,
    Inter,
    Assembly,
}

/// Parses the `-O` argument into the optimizer's pass selection. Passes
/// start disabled; each comma-separated word enables or (`-`-prefixed)
/// disables one of `cse` (constant folding/propagation), `cp` (copy
/// propagation), `dce`, or `all`.
fn parse_optimizations(spec: Option<&str>) -> Result<Passes, String> {
    let mut passes = Passes::NONE;
    let Some(spec) = spec else {
        return Ok(passes);
    };
    for word in spec.split(',') {
        let word = word.trim();
        if word.is_empty() {
            continue;
        }
        let (enable, name) = match word.strip_prefix('-') {
            Some(rest) => (false, rest),
            None => (true, word),
        };
        match name {
            "cse" => passes.cf = enable,
            "cp" => passes.cp = enable,
            "dce" => passes.dce = enable,
            "all" => passes = if enable { Passes::ALL } else { Passes::NONE },
            other => return Err(format!("unknown optimization '{other}'")),
        }
    }
    Ok(passes)
}

fn report(diagnostics: &[Diagnostic]) {
    for d in diagnostics {
        eprintln!("{d}");
    }
}

fn open_output(path: Option<&str>) -> Result<Box<dyn Write>, String> {
    match path {
        Some(path) => fs::File::create(path)
            .map(|f| Box::new(f) as Box<dyn Write>)
            .map_err(|e| format!("failed to open output file '{path}': {e}")),
        None => Ok(Box::new(std::io::stdout())),
    }
}

fn run_scan(source: &str, out: &mut dyn Write) -> bool {
    let mut lexer = Lexer::new(source);
    let mut ok = true;
    loop {
        match lexer.next() {
            Ok(Some(token)) => {
                let line = token.line_col(source).line;
                match token.kind.scan_category() {
                    Some(category) => {
                        let _ = writeln!(out, "{line} {category} {}", token.text);
                    }
                    None => {
                        let _ = writeln!(out, "{line} {}", token.text);
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                eprintln!("{}", Diagnostic::new(err.at, err.to_string()));
                ok = false;
            }
        }
    }
    ok
}

fn main() -> ExitCode {
    let args = Args::parse();

    let source = match fs::read_to_string(&args.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("ERROR: failed to read '{}': {e}", args.file);
            return ExitCode::FAILURE;
        }
    };

    let passes = match parse_optimizations(args.optimizations.as_deref()) {
        Ok(p) => p,
        Err(msg) => {
            eprintln!("ERROR: {msg}");
            return ExitCode::FAILURE;
        }
    };

    let mut out = match open_output(args.output.as_deref()) {
        Ok(out) => out,
        Err(msg) => {
            eprintln!("ERROR: {msg}");
            return ExitCode::FAILURE;
        }
    };

    if args.target == Target::Scan {
        return if run_scan(&source, out.as_mut()) {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    let parsed = parse::parse(&source);
    if !parsed.diagnostics.is_empty() || parsed.program.is_none() {
        report(&parsed.diagnostics);
        return ExitCode::FAILURE;
    }
    let program = parsed.program.expect("checked above");

    if args.target == Target::Parse {
        let _ = writeln!(out, "{program:#?}");
        return ExitCode::SUCCESS;
    }

    let llir = lower(&program);
    let llir = optimize(llir, passes);

    if args.target == Target::Inter {
        let _ = write!(out, "{llir}");
        return ExitCode::SUCCESS;
    }

    if args.debug {
        let _ = write!(out, "{llir}");
        return ExitCode::SUCCESS;
    }

    let asm = code_gen(llir);
    let _ = write!(out, "{}", asm.asm_code());
    ExitCode::SUCCESS
}
