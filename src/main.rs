use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser as ClapParser, Subcommand, ValueEnum};

use monkey::config::Config;
use monkey::driver::{self, Mode};

#[derive(ClapParser)]
#[command(name = "monkey", about = "The Monkey programming language")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start an interactive read-eval-print loop.
    Repl {
        #[arg(long, value_enum, default_value_t = BackendMode::Vm)]
        mode: BackendMode,
    },
    /// Run a Monkey source file once.
    Run {
        path: PathBuf,
        #[arg(long, value_enum, default_value_t = BackendMode::Vm)]
        mode: BackendMode,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendMode {
    Interpreter,
    Vm,
}

impl From<BackendMode> for Mode {
    fn from(mode: BackendMode) -> Self {
        match mode {
            BackendMode::Interpreter => Mode::Interpreter,
            BackendMode::Vm => Mode::Vm,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let config = Config::default();

    match cli.command {
        Command::Repl { mode } => {
            if let Err(err) = driver::run_repl(mode.into(), config) {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        }
        Command::Run { path, mode } => match driver::run_file(&path, mode.into(), config) {
            Ok(output) => println!("{output}"),
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        },
    }

    ExitCode::SUCCESS
}
