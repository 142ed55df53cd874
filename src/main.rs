use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use synacor::output::{self, file_message, message, MsgColor};
use synacor::{
    escape_string, Annotations, Disassembler, Image, Machine, Memory, RegisterFile, SymbolTable,
    TraceToggle, Tracer,
};

/// Virtual machine and disassembler for Synacor challenge binaries.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a binary image, with program input and output on the terminal
    Run {
        /// Binary image to run
        name: PathBuf,
        /// Symbol table naming address ranges
        #[arg(long)]
        symtab: Option<PathBuf>,
        /// Start executing at this address or symbol
        #[arg(long)]
        start: Option<String>,
        /// Stop after executing this address or symbol
        #[arg(long)]
        halt_at: Option<String>,
        /// Initial register values, such as `r1=5,r7=25734`
        #[arg(long)]
        init_reg: Option<String>,
        /// Memory words to replace after loading, such as `5489=21,5490=21`
        #[arg(long)]
        override_ram: Option<String>,
        /// Write memory to this file once halted
        #[arg(long)]
        ram_dump: Option<PathBuf>,
        /// Trace every executed instruction (`Ctrl+T` flips this while waiting for input)
        #[arg(short, long)]
        verbose: bool,
        /// Send trace lines to this file instead of stderr
        #[arg(long)]
        trace_file: Option<PathBuf>,
        /// Dump registers after every traced instruction
        #[arg(long)]
        dump_reg: bool,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// List the instructions of a binary image without running it
    Dis {
        /// Binary image to disassemble
        name: PathBuf,
        /// Maximum number of words to list
        #[arg(short, long)]
        len: Option<usize>,
        /// Address or symbol to start listing from
        #[arg(long)]
        start: Option<String>,
        /// Symbol table naming address ranges
        #[arg(long)]
        symtab: Option<PathBuf>,
        /// Comments to place alongside the listing
        #[arg(long)]
        annotations: Option<PathBuf>,
        /// Also show raw addresses and words
        #[arg(short, long)]
        full: bool,
    },
    /// Print a length-prefixed string stored in a binary image
    ReadString {
        /// Binary image to read from
        name: PathBuf,
        /// Address or symbol of the string
        location: String,
        /// Symbol table naming address ranges
        #[arg(long)]
        symtab: Option<PathBuf>,
        /// The location holds the address of the string
        #[arg(short, long)]
        indirect: bool,
        /// Print characters unescaped
        #[arg(short, long)]
        raw: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    synacor::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(synacor::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    match args.command {
        Command::Run {
            name,
            symtab,
            start,
            halt_at,
            init_reg,
            override_ram,
            ram_dump,
            verbose,
            trace_file,
            dump_reg,
            minimal,
        } => {
            output::set_minimal(minimal);
            let symbols = read_symbols(symtab.as_deref())?;

            file_message(MsgColor::Green, "Loading", &name);
            let image = Image::read(&name)?;
            let mut memory = Memory::load(&image);
            if let Some(pairs) = override_ram {
                memory.apply_overrides(&pairs)?;
            }
            let registers = match init_reg {
                Some(list) => RegisterFile::from_assignments(&list)?,
                None => RegisterFile::new(),
            };
            let start = match start {
                Some(loc) => symbols.resolve_location(&loc)?,
                None => 0,
            };
            let halt_at = halt_at
                .map(|loc| symbols.resolve_location(&loc))
                .transpose()?;

            let sink: Box<dyn Write> = match trace_file {
                Some(path) => Box::new(File::create(path).into_diagnostic()?),
                None => Box::new(output::Writer),
            };
            let toggle = TraceToggle::new(verbose || synacor::env::is_trace_enabled());
            let input = synacor::stdin_input(toggle.clone());
            let tracer = Tracer::new(sink, toggle)
                .dump_registers(dump_reg || synacor::env::is_dump_registers_enabled());

            let mut machine = Machine::new(memory, input, io::stdout())
                .with_registers(registers)
                .with_pc(start)
                .with_halt_at(halt_at)
                .with_tracer(tracer);

            message(MsgColor::Green, "Running", "loaded image");
            let halt = match machine.run(&symbols) {
                Ok(halt) => halt,
                Err(error) => {
                    message(MsgColor::Red, "Failed", &format!("stopped at {}", machine.pc()));
                    return Err(error).into_diagnostic();
                }
            };
            message(MsgColor::Cyan, "Halted", &halt.to_string());

            if let Some(path) = ram_dump {
                fs::write(&path, machine.memory().to_bytes()).into_diagnostic()?;
                file_message(MsgColor::Green, "Saved", &path);
            }
            Ok(())
        }
        Command::Dis {
            name,
            len,
            start,
            symtab,
            annotations,
            full,
        } => {
            let symbols = read_symbols(symtab.as_deref())?;
            let annotations = match annotations {
                Some(path) => Annotations::read(&path, &symbols)?,
                None => Annotations::new(),
            };
            let image = Image::read(&name)?;
            let start = match start {
                Some(loc) => symbols.resolve_location(&loc)?,
                None => 0,
            };

            let mut stdout = io::stdout().lock();
            Disassembler::new(&symbols, &annotations)
                .full(full)
                .write_listing(&mut stdout, image.words(), start, len)
                .into_diagnostic()?;
            stdout.flush().into_diagnostic()?;
            Ok(())
        }
        Command::ReadString {
            name,
            location,
            symtab,
            indirect,
            raw,
        } => {
            let symbols = read_symbols(symtab.as_deref())?;
            let image = Image::read(&name)?;
            let addr = symbols.resolve_location(&location)?;
            let chars = image.string_at(addr, indirect).into_diagnostic()?;
            if raw {
                let bytes: Vec<u8> = chars.iter().map(|&ch| ch as u8).collect();
                let mut stdout = io::stdout().lock();
                stdout.write_all(&bytes).into_diagnostic()?;
                stdout.flush().into_diagnostic()?;
            } else {
                println!("{}", escape_string(chars));
            }
            Ok(())
        }
    }
}

fn read_symbols(path: Option<&Path>) -> Result<SymbolTable> {
    match path {
        Some(path) => SymbolTable::read(path),
        None => Ok(SymbolTable::new()),
    }
}
