//! Execution engine for the brains concurrent tape-machine language.
//!
//! brains extends the classic single-tape byte machine with user-defined
//! procedures, if/else, inverted loops, cooperative green threads, forked
//! processes with private and shared tapes, and counting semaphores. This
//! crate compiles source text to a flat instruction stream and runs every
//! resulting process cooperatively until the system is quiescent.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                         Machine                            │
//! │  ┌───────────────┐   ┌────────────────────────────────┐    │
//! │  │  Instruction  │   │          PCB arena             │    │
//! │  │    memory     │   │  ┌─────┐ ┌─────┐ ┌─────┐       │    │
//! │  │  (shared,     │   │  │ PCB │ │ PCB │ │ PCB │  ...  │    │
//! │  │   read-only)  │   │  │tape │ │tape │ │tape │       │    │
//! │  └───────────────┘   │  └─────┘ └─────┘ └─────┘       │    │
//! │  ┌───────────────┐   └────────────────────────────────┘    │
//! │  │ System tape   │        ▲ ready / sleep / dead lists     │
//! │  └───────────────┘        │                                │
//! │                      ┌────┴─────┐      ┌────────────┐      │
//! │                      │ Scheduler│ ◄──► │ Dispatcher │      │
//! │                      └──────────┘      └────────────┘      │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The compiler is a single pass over the filtered source stream; it fuses
//! runs of repeatable operators, resolves every jump displacement, and
//! splits the program into one "big bang" process per `@`-delimited
//! segment. The scheduler hands one thread at a time to the dispatcher,
//! which advances it for one quantum and reports how the slice ended.
//!
//! # Usage
//!
//! ```
//! use brains_core::{compile, Machine, MachineConfig};
//!
//! let program = compile(b"++[>+++<-]>.").expect("valid program");
//! let mut machine = Machine::new(program, MachineConfig::default());
//!
//! let mut output = Vec::new();
//! machine.run(&mut std::io::empty(), &mut output).unwrap();
//! assert_eq!(output, [6]);
//! ```

#![warn(missing_docs)]

mod compile;
mod exec;
mod filter;
mod machine;
mod process;
mod sched;

pub mod inst;

pub use compile::{compile, CompileError, Program};
pub use machine::{Machine, MachineConfig, SchedulerPolicy};
pub use process::{Pcb, ProcId, SegmentRef, Tcb};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fixed capacities of the abstract machine.
pub mod limits {
    /// Instruction memory capacity in words.
    pub const IMEM: usize = 1 << 24;
    /// Length of one tape in bytes.
    pub const DMEM: usize = 65536;
    /// Mask applied to all data-pointer arithmetic.
    pub const DMASK: u16 = (DMEM - 1) as u16;
    /// Call stack capacity (pending return addresses per thread).
    pub const STACKSIZE: usize = 1024;
    /// Procedure table size (identifiers `0-9A-Za-z`).
    pub const NPROCS: usize = 62;
    /// Quantum used when the caller does not pick one.
    pub const DEFAULT_QUANTA: u32 = 10;
    /// Upper bound of the random quantum drawn for negative settings.
    pub const RANDOM_QUANTA_MAX: u32 = 128;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile and run a source string, capturing its output bytes.
    fn run_capture(source: &[u8], config: MachineConfig) -> Vec<u8> {
        let program = compile(source).expect("program compiles");
        let mut machine = Machine::new(program, config);
        let mut output = Vec::new();
        machine
            .run(&mut std::io::empty(), &mut output)
            .expect("run succeeds");
        output
    }

    #[test]
    fn test_limits() {
        assert_eq!(limits::DMEM, 65536);
        assert_eq!(limits::DMASK, 0xFFFF);
        assert_eq!(limits::IMEM, 16_777_216);
        assert_eq!(limits::STACKSIZE, 1024);
        assert_eq!(limits::NPROCS, 62);
    }

    #[test]
    fn test_plain_output() {
        assert_eq!(run_capture(b"+++.", MachineConfig::default()), [3]);
    }

    #[test]
    fn test_empty_program_is_quiescent() {
        assert_eq!(run_capture(b"", MachineConfig::default()), []);
        assert_eq!(run_capture(b"@@@", MachineConfig::default()), []);
    }

    #[test]
    fn test_unrecognized_characters_are_skipped() {
        assert_eq!(run_capture(b"+ +\t+\n.", MachineConfig::default()), [3]);
    }

    #[test]
    fn test_unbound_identifier_is_a_no_op() {
        assert_eq!(run_capture(b"+++Z.", MachineConfig::default()), [3]);
    }
}
