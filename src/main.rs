use std::fs;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use hotwatch::notify::Event;
use hotwatch::{
    blocking::{Flow, Hotwatch},
    EventKind,
};
use miette::{bail, IntoDiagnostic, Result};

use tuca::export::{self, MemoryImage};
use tuca::output;
use tuca::{Air, AsmParser, RunState, Snapshot, Termination};

/// Tuca is an assembler and emulator toolchain for the TUCA-5.1 ISA.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a program file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run an assembly or `.mem` program and report the final state
    Run {
        /// Program to run
        name: PathBuf,
        /// Initial data memory: a file, or a directory of `.txt` files to
        /// run against in turn
        #[arg(short, long)]
        memory: Option<PathBuf>,
        /// Write the final-state dump to a file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Stop after this many executed instructions
        #[arg(short, long)]
        limit: Option<u64>,
        /// Produce minimal output, suited for blackbox tests
        #[arg(long)]
        minimal: bool,
    },
    /// Assemble a program into an instruction-memory file
    Asm {
        /// Assembly file to encode
        name: PathBuf,
        /// Destination file
        dest: Option<PathBuf>,
        /// Output format
        #[arg(short, long, value_enum, default_value = "hex")]
        format: Format,
    },
    /// Check an assembly file without running or outputting binary
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Compare a final-state dump against an expected one
    Compare {
        /// Dump produced by a run
        actual: PathBuf,
        /// Expected dump
        expected: PathBuf,
    },
    /// Place a watch on an assembly file to receive constant assembler updates
    Watch {
        /// File to watch
        name: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    /// One 4-digit hex word per line
    Hex,
    /// One 16-digit binary word per line
    Bin,
    /// Verilog-style `@address word` memory file
    Mem,
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(tuca::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    if let Some(command) = args.command {
        match command {
            Command::Run {
                name,
                memory,
                output,
                limit,
                minimal,
            } => run(&name, memory, output, limit, minimal),
            Command::Asm { name, dest, format } => {
                file_message(Green, "Assembling", &name);
                let src = fs::read_to_string(&name).into_diagnostic()?;
                let air = assemble(&src)?;

                let (rendered, ext) = match format {
                    Format::Hex => (output::render_hex(&air)?, "hex"),
                    Format::Bin => (output::render_binary(&air)?, "bin"),
                    Format::Mem => (output::render_vmem(&air)?, "mem"),
                };
                let dest = dest.unwrap_or_else(|| name.with_extension(ext));
                fs::write(&dest, rendered).into_diagnostic()?;

                message(Green, "Finished", &format!("{} word(s)", air.len()));
                file_message(Green, "Saved", &dest);
                Ok(())
            }
            Command::Check { name } => {
                file_message(Green, "Checking", &name);
                let src = fs::read_to_string(&name).into_diagnostic()?;
                let _ = assemble(&src)?;
                message(Green, "Success", "no errors found!");
                Ok(())
            }
            Command::Compare { actual, expected } => {
                file_message(Green, "Comparing", &actual);
                let actual = export::parse_dump(&fs::read_to_string(&actual).into_diagnostic()?)?;
                let expected =
                    export::parse_dump(&fs::read_to_string(&expected).into_diagnostic()?)?;
                let mismatches = export::compare_dumps(&actual, &expected);
                if mismatches.is_empty() {
                    message(Green, "Success", "output matches expected state");
                    return Ok(());
                }
                for mismatch in &mismatches {
                    message(Red, "Mismatch", &mismatch.to_string());
                }
                bail!("output differs at {} address(es)", mismatches.len());
            }
            Command::Watch { name } => {
                if !name.exists() {
                    bail!("File does not exist. Exiting...")
                }
                // Vim breaks if watching a single file
                let folder_path = match name.parent() {
                    Some(pth) if pth.is_dir() => pth.to_path_buf(),
                    _ => Path::new(".").to_path_buf(),
                };

                // Clear screen and move cursor to top left
                print!("\x1B[2J\x1B[2;1H");
                file_message(Green, "Watching", &name);
                message(Cyan, "Help", "press CTRL+C to exit");

                let mut watcher = Hotwatch::new_with_custom_delay(Duration::from_millis(500))
                    .into_diagnostic()?;

                watcher
                    .watch(folder_path, move |event: Event| match event.kind {
                        // Watch remove for vim changes
                        EventKind::Modify(_) | EventKind::Remove(_) => {
                            // Clear screen
                            print!("\x1B[2J\x1B[2;1H");
                            file_message(Green, "Watching", &name);
                            message(Green, "Re-checking", "file change detected");
                            message(Cyan, "Help", "press CTRL+C to exit");

                            // Editors finish writing shortly after the event
                            sleep(Duration::from_millis(50));

                            let src = match fs::read_to_string(&name) {
                                Ok(cts) => cts,
                                Err(e) => {
                                    eprintln!("{e}. Exiting...");
                                    std::process::exit(1)
                                }
                            };
                            match assemble(&src) {
                                Ok(_) => {
                                    message(Green, "Success", "no errors found!");
                                }
                                Err(e) => {
                                    println!("\n{:?}", e);
                                }
                            };
                            Flow::Continue
                        }
                        _ => Flow::Continue,
                    })
                    .into_diagnostic()?;
                watcher.run();
                Ok(())
            }
        }
    } else if let Some(path) = args.path {
        run(&path, None, None, None, false)
    } else {
        println!("\n~ tuca v{VERSION} ~");
        println!("{}", LOGO.truecolor(255, 183, 197).bold());
        println!("{SHORT_INFO}");
        std::process::exit(0);
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message(color: MsgColor, left: &str, right: &str) {
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

fn run(
    name: &Path,
    memory: Option<PathBuf>,
    output: Option<PathBuf>,
    limit: Option<u64>,
    minimal: bool,
) -> Result<()> {
    use MsgColor::*;
    let images: Vec<(Option<PathBuf>, MemoryImage)> = match memory {
        None => vec![(None, MemoryImage::default())],
        Some(path) if path.is_dir() => {
            if output.is_some() {
                bail!("Cannot combine --output with a memory directory");
            }
            let pattern = path.join("*.txt");
            let Some(pattern) = pattern.to_str() else {
                bail!("Memory directory path is not valid UTF-8");
            };
            let mut images = Vec::new();
            for entry in glob::glob(pattern).into_diagnostic()? {
                let entry = entry.into_diagnostic()?;
                let image =
                    export::parse_initial_memory(&fs::read_to_string(&entry).into_diagnostic()?)?;
                images.push((Some(entry), image));
            }
            if images.is_empty() {
                bail!("No `.txt` memory files found in directory");
            }
            images
        }
        Some(path) => {
            let image =
                export::parse_initial_memory(&fs::read_to_string(&path).into_diagnostic()?)?;
            vec![(Some(path), image)]
        }
    };

    if !minimal {
        file_message(Green, "Loading", name);
    }
    for (mem_path, image) in images {
        if let Some(path) = &mem_path {
            if !minimal {
                file_message(Cyan, "Memory", path);
            }
        }
        let mut state = load(name)?;
        state.set_memory(image);
        if let Some(limit) = limit {
            state.set_limit(limit);
        }
        match state.run() {
            Ok(snapshot) => report(&snapshot, output.as_deref(), minimal)?,
            Err(err) => {
                message(Red, "Fault", &err.to_string());
                let dump = export::render_dump(&err.snapshot.memory);
                if !dump.is_empty() {
                    message(Red, "State", "memory at the point of failure:");
                    print!("{dump}");
                }
                bail!("{err}");
            }
        }
    }
    Ok(())
}

/// Word files load through the decoder, everything else is treated as
/// assembly text.
fn load(name: &Path) -> Result<RunState> {
    let contents = fs::read_to_string(name).into_diagnostic()?;
    match name.extension().and_then(|ext| ext.to_str()) {
        Some("mem" | "vmem" | "hex") => {
            let words = output::parse_vmem(&contents)?;
            RunState::from_words(&words)
        }
        _ => RunState::from_source(&contents),
    }
}

fn report(snapshot: &Snapshot, output: Option<&Path>, minimal: bool) -> Result<()> {
    use MsgColor::*;
    let dump = export::render_dump(&snapshot.memory);
    if let Some(path) = output {
        fs::write(path, &dump).into_diagnostic()?;
    }
    if minimal {
        print!("{dump}");
        return Ok(());
    }

    let steps = format!("after {} instruction(s)", snapshot.instruction_count);
    match snapshot.termination {
        Termination::Halted => message(Green, "Halted", &steps),
        Termination::EndOfProgram => message(Cyan, "Ended", &steps),
        Termination::CeilingReached => message(Red, "Ceiling", &steps),
        Termination::Faulted => message(Red, "Faulted", &steps),
    }

    let registers: Vec<String> = snapshot
        .registers
        .iter()
        .enumerate()
        .filter(|(_, &val)| val != 0)
        .map(|(idx, val)| format!("r{idx}={val:#04x}"))
        .collect();
    if registers.is_empty() {
        message(Cyan, "Registers", "all zero");
    } else {
        message(Cyan, "Registers", &registers.join(" "));
    }

    if dump.is_empty() {
        message(Cyan, "Memory", "no writes");
    } else {
        message(Cyan, "Memory", "written addresses:");
        print!("{dump}");
    }
    if let Some(path) = output {
        file_message(Green, "Saved", path);
    }
    Ok(())
}

/// Assemble source text for further processing.
fn assemble(src: &str) -> Result<Air> {
    AsmParser::new(src).parse()
}

const LOGO: &str = r#"
  .           ..
 @88>   x .d88"    .x~~"*Weu.
 %8P     5888R    d8Nu.  9888c
  .      '888R    88888  98888
.@88u     888R    "***"  9888%
''888E`   888R         ..@8*"
  888E    888R      ````"8Weu
  888E    888R     ..    ?8888L
  888E    888R   :@88N   '8888N
  888&   .888B . *8888~  '8888F
  R888"  ^*888%  '*8"`   9888%
   ""      "%      `~===*%"`"#;

const SHORT_INFO: &str = r"
Welcome to tuca, an assembler and emulator toolchain for the
TUCA-5.1 teaching instruction set.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
