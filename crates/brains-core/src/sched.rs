//! Thread selection and process reaping.
//!
//! Both policies share one discipline: ready and sleep lists are FIFO,
//! removal is from the head, and a process leaves the live list the
//! moment its last thread dies. Selection returning `None` is the
//! machine's deadlock signal; sleepers are never woken by anything but a
//! `^` on their cell, so a cycle of downs with no ups ends the run
//! silently.

use log::{debug, trace};
use rand::Rng;

use crate::limits::RANDOM_QUANTA_MAX;
use crate::machine::{Machine, SchedulerPolicy};
use crate::process::{ProcId, SegmentRef, Tcb};

impl Machine {
    /// Cost budget for the next slice; zero means unbounded.
    pub(crate) fn slice_quantum(&mut self) -> u32 {
        if self.config.quantum < 0 {
            self.rng.gen_range(1..=RANDOM_QUANTA_MAX)
        } else {
            self.config.quantum as u32
        }
    }

    /// Pops the next runnable thread, or `None` on deadlock.
    pub(crate) fn next_thread(&mut self) -> Option<Tcb> {
        match self.config.policy {
            SchedulerPolicy::ProcessFair => self.next_process_fair(),
            SchedulerPolicy::ThreadFair => self.run_queue.pop_front(),
        }
    }

    /// Process-fair selection: rotate the process that ran last to the
    /// tail, then take the first process with a runnable thread.
    fn next_process_fair(&mut self) -> Option<Tcb> {
        if let Some(pid) = self.last.take() {
            self.plist.push_back(pid);
        }
        for _ in 0..self.plist.len() {
            let pid = self.plist.pop_front()?;
            if let Some(tcb) = self.pcb_mut(pid).ready.pop_front() {
                trace!("scheduling a thread of process {pid}");
                self.last = Some(pid);
                return Some(tcb);
            }
            self.plist.push_back(pid);
        }
        None
    }

    /// Removes a process whose last thread just died. Without
    /// infanticide its tape must outlive it for the children observing
    /// it, so the PCB moves to the dead list instead of being freed.
    pub(crate) fn reap(&mut self, pid: ProcId) {
        if self.last == Some(pid) {
            self.last = None;
        }
        self.plist.retain(|&p| p != pid);
        if self.config.infanticide {
            self.purge(pid);
        } else {
            debug!("process {pid} dead; tape kept for descendants");
            self.dead.push(pid);
        }
    }

    /// Recursive infanticide: frees the process, every process observing
    /// its tape, and so on down, purging their threads from every list.
    fn purge(&mut self, root: ProcId) {
        let mut doomed = vec![root];
        let mut next = 0;
        while next < doomed.len() {
            let parent = SegmentRef::Process(doomed[next]);
            for (pid, slot) in self.procs.iter().enumerate() {
                if slot.as_ref().is_some_and(|pcb| pcb.parent == parent) && !doomed.contains(&pid) {
                    doomed.push(pid);
                }
            }
            next += 1;
        }
        debug!("process {root} dead; purging {} process(es)", doomed.len());
        for &pid in &doomed {
            self.plist.retain(|&p| p != pid);
            self.run_queue.retain(|tcb| tcb.pid != pid);
            self.sleepers.retain(|tcb| tcb.pid != pid);
            self.procs[pid] = None;
        }
    }
}
