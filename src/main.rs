use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use termion::raw::IntoRawMode;

use lc3vm::{StdConsole, Vm, VmError};

/// LC-3 virtual machine: loads a big-endian program image and runs it.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Program image (.obj) to load and execute
    image: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("lc3vm: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), VmError> {
    let mut vm = Vm::new(StdConsole::new());
    let file = File::open(&args.image).map_err(VmError::Load)?;
    vm.load_image(file)?;

    // Character-at-a-time, echo-less input for the trap services. The
    // guard restores the terminal when it drops, on every exit path out
    // of this function. Skipped when stdin is a pipe or file.
    let raw = if io::stdin().is_terminal() {
        Some(io::stdout().into_raw_mode().map_err(VmError::Io)?)
    } else {
        None
    };

    let result = vm.run();
    drop(raw);
    result
}
