//! The `brains` command-line interpreter.
//!
//! Compiles and runs each source file in turn. A file that fails to
//! compile is reported and skipped; the run carries on with the next
//! one, and the process still exits 0. Only an unsupported option exits
//! nonzero.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use log::error;

use brains_core::{limits, Machine, MachineConfig, SchedulerPolicy};

/// A concurrent tape-machine interpreter.
///
/// Quantum `0` runs each thread until it yields, blocks or dies; a
/// negative quantum draws a fresh random slice length from `[1, 128]`
/// every time.
#[derive(Debug, Parser)]
#[command(name = "brains", version, about)]
struct Args {
    /// Process-fair scheduling with quantum N
    #[arg(short = 'q', value_name = "N", allow_hyphen_values = true)]
    quantum: Option<i32>,

    /// Thread-fair scheduling with quantum N
    #[arg(
        short = 'Q',
        value_name = "N",
        allow_hyphen_values = true,
        conflicts_with = "quantum"
    )]
    thread_quantum: Option<i32>,

    /// Seed for the random-quantum generator
    #[arg(long, value_name = "SEED", default_value_t = 1)]
    seed: u64,

    /// Reap all descendants when a process dies
    #[arg(long)]
    infanticide: bool,

    /// Source files, run one after another
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,
}

impl Args {
    fn config(&self) -> MachineConfig {
        let (policy, quantum) = match (self.quantum, self.thread_quantum) {
            (_, Some(quantum)) => (SchedulerPolicy::ThreadFair, quantum),
            (Some(quantum), None) => (SchedulerPolicy::ProcessFair, quantum),
            (None, None) => (SchedulerPolicy::ProcessFair, limits::DEFAULT_QUANTA as i32),
        };
        MachineConfig {
            policy,
            quantum,
            seed: self.seed,
            infanticide: self.infanticide,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{err}");
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            eprint!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let config = args.config();
    let stdin = io::stdin();
    let stdout = io::stdout();

    for file in &args.files {
        let source = match std::fs::read(file) {
            Ok(source) => source,
            Err(err) => {
                error!("{}: {err}", file.display());
                continue;
            }
        };
        let result = run_file(&source, config.clone(), &mut stdin.lock(), &mut stdout.lock());
        if let Err(err) = result {
            error!("{}: {err}", file.display());
        }
    }
    ExitCode::SUCCESS
}

/// Compiles and runs one file against the shared standard streams.
fn run_file<R: Read, W: Write>(
    source: &[u8],
    config: MachineConfig,
    input: &mut R,
    output: &mut W,
) -> io::Result<()> {
    match Machine::from_source(source, config) {
        Ok(mut machine) => machine.run(input, output),
        Err(err) => {
            // The classic diagnostic, with the actual reason appended.
            error!("code not syntactically correct: {err}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let args = Args::try_parse_from(["brains", "demo.b"]).expect("parses");
        let config = args.config();
        assert_eq!(config.policy, SchedulerPolicy::ProcessFair);
        assert_eq!(config.quantum, 10);
        assert_eq!(config.seed, 1);
        assert!(!config.infanticide);
    }

    #[test]
    fn test_attached_and_detached_quanta() {
        let attached = Args::try_parse_from(["brains", "-q10", "demo.b"]).expect("parses");
        assert_eq!(attached.config().quantum, 10);
        let detached = Args::try_parse_from(["brains", "-q", "10", "demo.b"]).expect("parses");
        assert_eq!(detached.config().quantum, 10);
        let negative = Args::try_parse_from(["brains", "-q", "-1", "demo.b"]).expect("parses");
        assert_eq!(negative.config().quantum, -1);
    }

    #[test]
    fn test_thread_fair_flag() {
        let args = Args::try_parse_from(["brains", "-Q0", "demo.b"]).expect("parses");
        let config = args.config();
        assert_eq!(config.policy, SchedulerPolicy::ThreadFair);
        assert_eq!(config.quantum, 0);
    }

    #[test]
    fn test_flags_conflict() {
        assert!(Args::try_parse_from(["brains", "-q1", "-Q1", "demo.b"]).is_err());
    }

    #[test]
    fn test_files_are_required() {
        assert!(Args::try_parse_from(["brains"]).is_err());
    }

    #[test]
    fn test_bad_files_do_not_stop_the_run() {
        let mut output = Vec::new();
        run_file(b"+[", MachineConfig::default(), &mut io::empty(), &mut output)
            .expect("compile errors are not I/O errors");
        run_file(b"+++.", MachineConfig::default(), &mut io::empty(), &mut output)
            .expect("runs");
        assert_eq!(output, [3]);
    }
}
