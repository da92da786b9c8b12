//! The interpreter context.
//!
//! One `Machine` holds everything a single source file needs to run:
//! instruction memory, the shared system tape, the process arena and the
//! scheduling lists. The driver loop asks the scheduler for a thread,
//! hands it to the dispatcher for one quantum, and files it back on the
//! list its outcome names, until no runnable thread remains.

use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};

use log::debug;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::compile::{compile, CompileError, Program};
use crate::exec::Outcome;
use crate::limits::DEFAULT_QUANTA;
use crate::process::{Pcb, ProcId, SegmentRef, Tcb};

/// Which fairness discipline the scheduler applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerPolicy {
    /// Round-robin over processes; each process round-robins its threads.
    #[default]
    ProcessFair,
    /// Round-robin over all ready threads, regardless of process.
    ThreadFair,
}

/// Runtime knobs for one machine.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Scheduling discipline.
    pub policy: SchedulerPolicy,
    /// Cost budget per slice. Zero runs a thread until it yields, blocks
    /// or dies; negative draws a fresh random quantum for every slice.
    pub quantum: i32,
    /// Seed for the random-quantum generator.
    pub seed: u64,
    /// Reap all descendants when a process dies.
    pub infanticide: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            policy: SchedulerPolicy::ProcessFair,
            quantum: DEFAULT_QUANTA as i32,
            seed: 1,
            infanticide: false,
        }
    }
}

/// A compiled program plus all of its runtime state.
pub struct Machine {
    /// Instruction memory, read-only after compilation.
    pub(crate) code: Vec<u32>,
    /// The tape shared by every big-bang process.
    pub(crate) system: Box<[u8]>,
    /// Process arena; slots are emptied only by infanticide.
    pub(crate) procs: Vec<Option<Pcb>>,
    /// Live processes in scheduling order.
    pub(crate) plist: VecDeque<ProcId>,
    /// Global ready list, used by the thread-fair scheduler.
    pub(crate) run_queue: VecDeque<Tcb>,
    /// Threads blocked on `_`, oldest first.
    pub(crate) sleepers: VecDeque<Tcb>,
    /// Processes that died with descendants still alive; their tapes stay
    /// valid until the machine is torn down.
    pub(crate) dead: Vec<ProcId>,
    /// The process whose thread ran last (process-fair bookkeeping).
    pub(crate) last: Option<ProcId>,
    /// Program input embedded after `!`, if the source carried any.
    pub(crate) input: Option<Cursor<Vec<u8>>>,
    pub(crate) rng: SmallRng,
    pub(crate) config: MachineConfig,
}

impl Machine {
    /// Builds a machine from a compiled program: a zeroed system tape and
    /// one big-bang process per segment.
    #[must_use]
    pub fn new(program: Program, config: MachineConfig) -> Self {
        let mut machine = Self {
            code: program.code,
            system: Pcb::blank_tape(),
            procs: Vec::new(),
            plist: VecDeque::new(),
            run_queue: VecDeque::new(),
            sleepers: VecDeque::new(),
            dead: Vec::new(),
            last: None,
            input: program.input.map(Cursor::new),
            rng: SmallRng::seed_from_u64(config.seed),
            config,
        };
        for &entry in &program.entries {
            machine.big_bang(entry);
        }
        machine
    }

    /// Compiles `source` and builds a machine for it.
    ///
    /// # Errors
    ///
    /// Returns the compiler's rejection unchanged.
    pub fn from_source(source: &[u8], config: MachineConfig) -> Result<Self, CompileError> {
        Ok(Self::new(compile(source)?, config))
    }

    /// One process born from an `@`-delimited segment. Its parent tape is
    /// the system tape, so `~` reaches shared memory.
    fn big_bang(&mut self, entry: u32) {
        let pid = self.procs.len();
        let mut pcb = Pcb::new(SegmentRef::System, Pcb::blank_tape());
        pcb.threads = 1;
        self.procs.push(Some(pcb));
        self.plist.push_back(pid);
        self.enqueue_ready(Tcb::main(pid, entry));
    }

    /// Runs until every thread has died or the system has deadlocked.
    ///
    /// `input` backs `,` when the program did not embed its own input
    /// after `!`; `output` receives `.` bytes.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the program's reads and writes.
    pub fn run<R: Read, W: Write>(&mut self, input: &mut R, output: &mut W) -> io::Result<()> {
        while let Some(mut tcb) = self.next_thread() {
            let quantum = self.slice_quantum();
            let outcome = self.run_slice(&mut tcb, quantum, input, output)?;
            self.settle(tcb, outcome);
        }
        if !self.sleepers.is_empty() {
            debug!("deadlock: {} thread(s) blocked at quiescence", self.sleepers.len());
        }
        if !self.dead.is_empty() {
            debug!("tearing down {} dead process(es)", self.dead.len());
        }
        output.flush()
    }

    /// Files a thread back where its slice outcome says it belongs.
    pub(crate) fn settle(&mut self, tcb: Tcb, outcome: Outcome) {
        match outcome {
            Outcome::Yielded => self.enqueue_ready(tcb),
            Outcome::Slept => self.sleepers.push_back(tcb),
            Outcome::Died => self.thread_died(tcb),
        }
    }

    /// Appends a runnable thread to the list the active policy reads.
    pub(crate) fn enqueue_ready(&mut self, tcb: Tcb) {
        match self.config.policy {
            SchedulerPolicy::ProcessFair => {
                let pid = tcb.pid;
                self.pcb_mut(pid).ready.push_back(tcb);
            }
            SchedulerPolicy::ThreadFair => self.run_queue.push_back(tcb),
        }
    }

    /// The live PCB behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if the process was reaped; handles held by live threads
    /// never are.
    pub(crate) fn pcb(&self, pid: ProcId) -> &Pcb {
        self.procs[pid].as_ref().expect("live process")
    }

    pub(crate) fn pcb_mut(&mut self, pid: ProcId) -> &mut Pcb {
        self.procs[pid].as_mut().expect("live process")
    }

    /// Identity of the tape a thread currently addresses.
    pub(crate) fn segment_of(&self, tcb: &Tcb) -> SegmentRef {
        if tcb.on_parent {
            self.pcb(tcb.pid).parent
        } else {
            SegmentRef::Process(tcb.pid)
        }
    }

    pub(crate) fn tape(&self, segment: SegmentRef) -> &[u8] {
        match segment {
            SegmentRef::System => &self.system,
            SegmentRef::Process(pid) => &self.pcb(pid).data,
        }
    }

    pub(crate) fn tape_mut(&mut self, segment: SegmentRef) -> &mut [u8] {
        match segment {
            SegmentRef::System => &mut self.system,
            SegmentRef::Process(pid) => &mut self.pcb_mut(pid).data,
        }
    }

    /// The cell under a thread's data pointer.
    pub(crate) fn cell(&self, tcb: &Tcb) -> u8 {
        self.tape(self.segment_of(tcb))[tcb.dp as usize]
    }

    pub(crate) fn cell_mut(&mut self, tcb: &Tcb) -> &mut u8 {
        let segment = self.segment_of(tcb);
        &mut self.tape_mut(segment)[tcb.dp as usize]
    }

    /// Writes a byte at an arbitrary offset on a thread's current tape.
    pub(crate) fn poke(&mut self, tcb: &Tcb, dp: u16, value: u8) {
        let segment = self.segment_of(tcb);
        self.tape_mut(segment)[dp as usize] = value;
    }

    /// One byte of program input: the embedded stream if the source ended
    /// in `!`, the caller's reader otherwise. `None` is end of input.
    pub(crate) fn read_input<R: Read>(&mut self, fallback: &mut R) -> io::Result<Option<u8>> {
        let source: &mut dyn Read = match self.input.as_mut() {
            Some(embedded) => embedded,
            None => fallback,
        };
        let mut byte = [0u8; 1];
        loop {
            match source.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Thread death: drop it, and reap its process once no thread is
    /// left.
    fn thread_died(&mut self, tcb: Tcb) {
        let pid = tcb.pid;
        let pcb = self.pcb_mut(pid);
        pcb.threads -= 1;
        if pcb.threads == 0 {
            self.reap(pid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(source: &[u8], config: MachineConfig) -> Machine {
        Machine::from_source(source, config).expect("compiles")
    }

    /// Sum of live-thread counters over the arena.
    fn counted_threads(machine: &Machine) -> usize {
        machine
            .procs
            .iter()
            .flatten()
            .map(|pcb| pcb.threads as usize)
            .sum()
    }

    /// Threads actually parked on some list.
    fn listed_threads(machine: &Machine) -> usize {
        let ready: usize = machine
            .procs
            .iter()
            .flatten()
            .map(|pcb| pcb.ready.len())
            .sum();
        ready + machine.run_queue.len() + machine.sleepers.len()
    }

    #[test]
    fn test_big_bang_processes() {
        let machine = machine(b"+@-@~", MachineConfig::default());
        assert_eq!(machine.procs.len(), 3);
        assert_eq!(machine.plist.len(), 3);
        for pcb in machine.procs.iter().flatten() {
            assert_eq!(pcb.parent, SegmentRef::System);
            assert_eq!(pcb.threads, 1);
        }
    }

    #[test]
    fn test_thread_accounting_invariant() {
        // Spawns, a fork, yields and a sleeper: every slice boundary must
        // account for each live thread exactly once.
        for policy in [SchedulerPolicy::ProcessFair, SchedulerPolicy::ThreadFair] {
            let config = MachineConfig {
                policy,
                quantum: 3,
                ..MachineConfig::default()
            };
            let mut machine = machine(b"&&*%*@_", config);
            let mut input = std::io::empty();
            let mut output = Vec::new();
            let mut slices = 0usize;
            while let Some(mut tcb) = machine.next_thread() {
                let quantum = machine.slice_quantum();
                let outcome = machine
                    .run_slice(&mut tcb, quantum, &mut input, &mut output)
                    .expect("no io");
                // The popped thread is in hand, not on any list.
                assert_eq!(counted_threads(&machine), listed_threads(&machine) + 1);
                machine.settle(tcb, outcome);
                assert_eq!(counted_threads(&machine), listed_threads(&machine));
                slices += 1;
                assert!(slices < 10_000, "program must quiesce");
            }
            // Quiescent: whatever is still counted is asleep.
            assert_eq!(counted_threads(&machine), machine.sleepers.len());
        }
    }

    #[test]
    fn test_dead_processes_stay_on_the_dead_list() {
        let mut machine = machine(b"+%(.)", MachineConfig::default());
        let mut output = Vec::new();
        machine.run(&mut std::io::empty(), &mut output).expect("runs");
        assert_eq!(output, [1]);
        // Both the parent and the orphan died; their tapes were kept.
        assert_eq!(machine.dead, [0, 1]);
        assert!(machine.plist.is_empty());
    }

    #[test]
    fn test_embedded_input_preferred_over_reader() {
        let mut machine = machine(b",.!A", MachineConfig::default());
        let mut input = &b"Z"[..];
        let mut output = Vec::new();
        machine.run(&mut input, &mut output).expect("runs");
        assert_eq!(output, b"A");
    }

    #[test]
    fn test_reader_input_without_bang() {
        let mut machine = machine(b",.", MachineConfig::default());
        let mut input = &b"Z"[..];
        let mut output = Vec::new();
        machine.run(&mut input, &mut output).expect("runs");
        assert_eq!(output, b"Z");
    }
}
