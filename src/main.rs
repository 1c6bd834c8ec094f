//! Continuum93 Emulator - CLI Entry Point
//!
//! Commands:
//! - `c93 run <program>` - Run a binary image or `.asm` file
//! - `c93 debug <program>` - Interactive debugger
//! - `c93 asm <source>` - Assemble to a binary image
//! - `c93 disasm <image>` - Disassemble a binary image

use clap::{Parser, Subcommand};
use continuum93::{Assembler, Computer, EmulatorConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "c93")]
#[command(version = "0.1.0")]
#[command(about = "An emulator and assembler for the Continuum93 fantasy CPU")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the binary image or ASM file to execute
        program: PathBuf,
        /// Maximum number of instructions to run
        #[arg(short, long)]
        max_cycles: Option<u64>,
        /// Print every executed instruction
        #[arg(short, long)]
        trace: bool,
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Seed for RAND (overrides the configuration)
        #[arg(long)]
        seed: Option<u64>,
        /// Write the final register state as JSON
        #[arg(long)]
        dump_state: Option<PathBuf>,
    },
    /// Interactive debugger
    Debug {
        /// Path to the binary image or ASM file to debug
        program: PathBuf,
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Assemble source to a binary image
    Asm {
        /// Path to the source file
        source: PathBuf,
        /// Output image file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Disassemble a binary image to source
    Disasm {
        /// Path to the image
        image: PathBuf,
        /// Address the image is loaded at
        #[arg(long, default_value = "0", value_parser = parse_address)]
        origin: u32,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            program,
            max_cycles,
            trace,
            config,
            seed,
            dump_state,
        }) => {
            let mut config = load_config(config.as_ref());
            if seed.is_some() {
                config.rng_seed = seed;
            }
            if max_cycles.is_some() {
                config.max_cycles = max_cycles;
            }
            run_program(&program, config, trace, dump_state.as_ref());
        }
        Some(Commands::Debug { program, config }) => {
            debug_program(&program, load_config(config.as_ref()));
        }
        Some(Commands::Asm { source, output }) => {
            assemble_file(&source, output);
        }
        Some(Commands::Disasm { image, origin }) => {
            disassemble_file(&image, origin);
        }
        None => {
            println!("Continuum93 Emulator v0.1.0");
            println!();
            println!("Use --help for available commands");
        }
    }
}

fn parse_address(text: &str) -> Result<u32, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| e.to_string())
}

fn fail(message: String) -> ! {
    eprintln!("❌ {}", message);
    std::process::exit(1);
}

fn load_config(path: Option<&PathBuf>) -> EmulatorConfig {
    match path {
        Some(path) => EmulatorConfig::from_file(path).unwrap_or_else(|e| fail(format!("Config error: {}", e))),
        None => EmulatorConfig::default(),
    }
}

fn assemble_source(path: &PathBuf) -> (Vec<u8>, u32) {
    let source = std::fs::read_to_string(path).unwrap_or_else(|e| fail(format!("Failed to read file: {}", e)));

    let mut asm = Assembler::new();
    asm.build(&source);
    match asm.compiled_code() {
        Some(code) => (code.to_vec(), asm.origin()),
        None => {
            for e in asm.diagnostics() {
                eprintln!("  {}", e);
            }
            fail(format!("Assembly failed with {} error(s)", asm.errors()))
        }
    }
}

/// Load a program as `(image, load address)`.
fn load_program(path: &PathBuf, config: &EmulatorConfig) -> (Vec<u8>, u32) {
    let is_asm = path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("asm"));
    if is_asm {
        let (image, origin) = assemble_source(path);
        println!("📝 Assembled {} bytes at 0x{:06X}", image.len(), origin);
        (image, origin)
    } else {
        let image = std::fs::read(path).unwrap_or_else(|e| fail(format!("Failed to read image: {}", e)));
        println!("📂 Loaded {} bytes", image.len());
        (image, config.load_address)
    }
}

fn run_program(path: &PathBuf, config: EmulatorConfig, trace: bool, dump_state: Option<&PathBuf>) {
    println!("🔧 Running: {}", path.display());

    let (image, origin) = load_program(path, &config);
    if image.is_empty() {
        fail("No instructions to execute".into());
    }

    let max_cycles = config.max_cycles;
    let mut computer = Computer::with_config(config).unwrap_or_else(|e| fail(format!("Config error: {}", e)));
    if let Err(e) = computer.load_mem_at(origin, &image) {
        fail(format!("Failed to load program: {}", e));
    }

    println!();
    println!("━━━ Execution ━━━");

    let result = if trace {
        let limit = max_cycles.unwrap_or(u64::MAX);
        let mut outcome = Ok(0);
        while computer.cpu.is_running() && computer.cpu.cycles < limit {
            let pc = computer.cpu.pc;
            match computer.step() {
                Ok(instr) => println!("{:06X}: {:<36} flags: {}", pc, instr.to_string(), computer.cpu.flags),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        outcome.map(|_: u64| computer.cpu.cycles)
    } else {
        computer.run()
    };

    if let Err(e) = result {
        fail(format!("CPU error at PC={:06X}: {}", computer.cpu.pc, e));
    }

    let cpu = &computer.cpu;
    println!();
    println!("━━━ Result ━━━");
    println!("Cycles: {}", cpu.cycles);
    println!("State:  {:?}", cpu.state);
    println!("PC:     {:06X}", cpu.pc);
    println!("Flags:  {}", cpu.flags);
    for (row, cells) in cpu.regs.cells().chunks(13).enumerate() {
        let text: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{}={:02X}", (b'A' + (row * 13 + i) as u8) as char, v))
            .collect();
        println!("{}", text.join(" "));
    }
    let floats: Vec<String> = cpu
        .fregs
        .values()
        .iter()
        .enumerate()
        .filter(|(_, v)| **v != 0.0)
        .map(|(i, v)| format!("F{}={}", i, v))
        .collect();
    if !floats.is_empty() {
        println!("{}", floats.join(" "));
    }

    if cpu.is_running() {
        println!();
        println!("⚠️  Reached max cycles limit. Use --max-cycles to increase.");
    }

    if let Some(out) = dump_state {
        let json = serde_json::to_string_pretty(&computer.snapshot())
            .unwrap_or_else(|e| fail(format!("Failed to serialize state: {}", e)));
        if let Err(e) = std::fs::write(out, json) {
            fail(format!("Failed to write state: {}", e));
        }
        println!("✓ State written to {}", out.display());
    }
}

#[cfg(feature = "tui")]
fn debug_program(path: &PathBuf, config: EmulatorConfig) {
    use continuum93::tui::run_debugger;

    println!("🔍 Loading: {}", path.display());
    let (image, origin) = load_program(path, &config);
    if image.is_empty() {
        fail("No instructions to execute".into());
    }

    println!("🚀 Launching debugger...");
    if let Err(e) = run_debugger(config, image, origin) {
        fail(format!("Debugger error: {}", e));
    }
}

#[cfg(not(feature = "tui"))]
fn debug_program(_path: &PathBuf, _config: EmulatorConfig) {
    fail("This build has no debugger; enable the `tui` feature".into());
}

fn assemble_file(source_path: &PathBuf, output: Option<PathBuf>) {
    let out_path = output.unwrap_or_else(|| source_path.with_extension("bin"));

    println!("📝 Assembling: {} → {}", source_path.display(), out_path.display());

    let (image, origin) = assemble_source(source_path);
    println!("✓ Assembled {} bytes at 0x{:06X}", image.len(), origin);

    if let Err(e) = std::fs::write(&out_path, &image) {
        fail(format!("Failed to save image: {}", e));
    }

    println!("✓ Saved to {}", out_path.display());
}

fn disassemble_file(image_path: &PathBuf, origin: u32) {
    let image = std::fs::read(image_path).unwrap_or_else(|e| fail(format!("Failed to read image: {}", e)));
    print!("{}", continuum93::disassemble(&image, origin));
}
