use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
    process,
};

use anyhow::{Context, Result};
use log::{info, warn};
use structopt::StructOpt;

use pvm::{Bytecode, Vm};

#[derive(StructOpt, Debug)]
#[structopt(name = "pvm", about = "Compile and run programs for the Pascal-like stack machine")]
struct Opt {
    /// Source file, or an object file with --object
    #[structopt(parse(from_os_str))]
    file: PathBuf,

    /// Treat FILE as an object file instead of source
    #[structopt(long)]
    object: bool,

    /// Print the token stream
    #[structopt(long)]
    tokens: bool,

    /// Print the symbol table
    #[structopt(long)]
    symbols: bool,

    /// Print the instruction listing
    #[structopt(long)]
    listing: bool,

    /// Write the object file to this path
    #[structopt(long, parse(from_os_str))]
    emit: Option<PathBuf>,

    /// Stop after compiling
    #[structopt(long)]
    no_run: bool,

    /// Memory cells of the machine
    #[structopt(long, default_value = "1000")]
    memory: usize,

    /// More output per occurrence (-v, -vv, -vvv)
    #[structopt(short, long, parse(from_occurrences))]
    verbose: usize,

    /// Silence all log output
    #[structopt(short, long)]
    quiet: bool,
}

fn main() {
    let opt = Opt::from_args();

    if let Err(e) = stderrlog::new()
        .module("pvm")
        .quiet(opt.quiet)
        .verbosity(opt.verbose + 1)
        .init()
    {
        eprintln!("failed to set up logging: {}", e);
    }

    if let Err(e) = execute(&opt) {
        eprintln!("{:#}", e);
        process::exit(1);
    }
}

fn execute(opt: &Opt) -> Result<()> {
    let text = fs::read_to_string(&opt.file)
        .with_context(|| format!("failed to read {}", opt.file.display()))?;

    let bytecode = if opt.object {
        Bytecode::load(&text).with_context(|| format!("invalid object file {}", opt.file.display()))?
    } else {
        compile(opt, &text)?
    };

    if opt.listing {
        println!("=== code ===");
        print!("{}", bytecode.listing());
    }

    if let Some(path) = &opt.emit {
        fs::write(path, bytecode.to_string())
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("object file written to {}", path.display());
    }

    if opt.no_run {
        return Ok(());
    }

    if opt.memory < bytecode.cells() {
        warn!(
            "program uses {} cells but the machine has {}",
            bytecode.cells(),
            opt.memory
        );
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut vm = Vm::with_memory(bytecode, opt.memory);
    vm.run(&mut stdin.lock(), &mut stdout.lock())?;
    io::stdout().flush()?;
    Ok(())
}

fn compile(opt: &Opt, source: &str) -> Result<Bytecode> {
    if opt.tokens {
        println!("=== tokens ===");
        let mut count = 0;
        for token in pvm::tokenize(source) {
            println!("{}", token?);
            count += 1;
        }
        println!("{} tokens", count);
    }

    let compiled = pvm::compile(source)?;
    info!(
        "compiled {} into {} instructions",
        opt.file.display(),
        compiled.bytecode.len()
    );

    if opt.symbols {
        println!("=== symbols ===");
        print!("{}", compiled.symbols);
    }

    Ok(compiled.bytecode)
}
