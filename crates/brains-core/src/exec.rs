//! The dispatcher.
//!
//! `run_slice` advances one thread for up to one quantum of cost and
//! reports how the slice ended. Instructions cost one unit unless a `=`
//! changed the price for the rest of the quantum; `#` and
//! unbound procedure calls always cost nothing. Because exactly one
//! thread runs at a time, the semaphore operators need no locking: `^`
//! and `_` are atomic by scheduling.

use std::io::{Read, Write};

use log::{debug, error};

use crate::inst::{self, op};
use crate::limits::STACKSIZE;
use crate::machine::Machine;
use crate::process::{Pcb, SegmentRef, Tcb};

/// How a slice ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Quantum exhausted or `*`: reschedule.
    Yielded,
    /// `_` blocked: move to the sleep list.
    Slept,
    /// `@`, or a return with no caller: the thread is gone.
    Died,
}

impl Machine {
    /// Executes `tcb` until its quantum (zero: no bound) is exhausted or
    /// it yields, sleeps or dies.
    pub(crate) fn run_slice<R: Read, W: Write>(
        &mut self,
        tcb: &mut Tcb,
        quantum: u32,
        input: &mut R,
        output: &mut W,
    ) -> std::io::Result<Outcome> {
        let mut budget = quantum;
        let mut cost: u32 = 1;
        loop {
            let word = self.code[tcb.pc as usize];
            tcb.pc += 1;
            let opcode = inst::opcode(word);
            let n = inst::payload(word);
            let mut charge = cost;
            match opcode {
                op::INC => {
                    let cell = self.cell_mut(tcb);
                    *cell = cell.wrapping_add(n as u8);
                }
                op::DEC => {
                    let cell = self.cell_mut(tcb);
                    *cell = cell.wrapping_sub(n as u8);
                }
                op::RIGHT => tcb.dp = tcb.dp.wrapping_add(n as u16),
                op::LEFT => tcb.dp = tcb.dp.wrapping_sub(n as u16),
                op::OUT => {
                    let byte = [self.cell(tcb)];
                    for _ in 0..n {
                        output.write_all(&byte)?;
                    }
                }
                op::IN => {
                    // Later reads overwrite earlier ones; end of input
                    // leaves the cell as it was.
                    for _ in 0..n {
                        match self.read_input(input)? {
                            Some(byte) => *self.cell_mut(tcb) = byte,
                            None => break,
                        }
                    }
                }
                op::LOOP_OPEN => {
                    if self.cell(tcb) == 0 {
                        tcb.pc += n;
                    }
                }
                op::LOOP_CLOSE => {
                    if self.cell(tcb) != 0 {
                        tcb.pc -= n;
                    }
                }
                op::GATE_OPEN => {
                    if self.cell(tcb) != 0 {
                        tcb.pc += n;
                    }
                }
                op::GATE_CLOSE => {
                    if self.cell(tcb) == 0 {
                        tcb.pc -= n;
                    }
                }
                op::IF_OPEN => {
                    if self.cell(tcb) == 0 {
                        tcb.pc += n;
                    }
                }
                op::ELSE => tcb.pc += n,
                op::IF_CLOSE => {}
                op::CLEAR => *self.cell_mut(tcb) = 0,
                op::DEFINE => {
                    // The word after the header is the procedure name;
                    // the body proper starts one past it.
                    let name = inst::opcode(self.code[tcb.pc as usize]);
                    if let Some(slot) = inst::proc_slot(name) {
                        tcb.procs[slot] = Some(tcb.pc + 1);
                    }
                    tcb.pc += n;
                }
                op::RETURN => match tcb.stack.pop() {
                    Some(return_addr) => tcb.pc = return_addr,
                    None => return Ok(Outcome::Died),
                },
                op::YIELD => return Ok(Outcome::Yielded),
                op::SEPARATE => return Ok(Outcome::Died),
                op::COST => cost = n,
                op::UP => {
                    for _ in 0..n {
                        let cell = self.cell_mut(tcb);
                        *cell = cell.wrapping_add(1);
                        self.wake_one(tcb);
                    }
                }
                op::DOWN => {
                    let cell = self.cell(tcb);
                    if u32::from(cell) < n {
                        // Retry the whole down once a `^` wakes us.
                        tcb.pc -= 1;
                        return Ok(Outcome::Slept);
                    }
                    *self.cell_mut(tcb) = cell - n as u8;
                }
                op::SWAP => tcb.on_parent = !tcb.on_parent,
                op::SPAWN => self.spawn(tcb),
                op::FORK => self.fork(tcb),
                op::TRACE => {
                    charge = 0;
                    debug!(
                        "pid={} pc={} dp={} cell={} depth={}",
                        tcb.pid,
                        tcb.pc - 1,
                        tcb.dp,
                        self.cell(tcb),
                        tcb.stack.len()
                    );
                }
                other => match inst::proc_slot(other).and_then(|slot| tcb.procs[slot]) {
                    Some(target) => {
                        if inst::opcode(self.code[tcb.pc as usize]) == op::RETURN {
                            // Tail call: the callee returns for us.
                            tcb.pc = target;
                        } else if tcb.stack.len() >= STACKSIZE {
                            error!("no mem for call");
                        } else {
                            tcb.stack.push(tcb.pc);
                            tcb.pc = target;
                        }
                    }
                    None => charge = 0,
                },
            }
            if budget != 0 {
                if charge >= budget {
                    return Ok(Outcome::Yielded);
                }
                budget -= charge;
            }
        }
    }

    /// `&`: a new thread in the current process, one cell to the right.
    fn spawn(&mut self, tcb: &Tcb) {
        self.poke(tcb, tcb.dp, 0);
        self.poke(tcb, tcb.dp.wrapping_add(1), 1);
        let child = tcb.offspring(tcb.pid, tcb.on_parent);
        self.pcb_mut(tcb.pid).threads += 1;
        self.enqueue_ready(child);
    }

    /// `%`: a new process whose tape is a copy of the current one and
    /// whose parent tape is the forking process's private tape.
    fn fork(&mut self, tcb: &Tcb) {
        self.poke(tcb, tcb.dp, 0);
        self.poke(tcb, tcb.dp.wrapping_add(1), 1);
        let snapshot = self.tape(self.segment_of(tcb)).to_vec().into_boxed_slice();
        let pid = self.procs.len();
        let mut pcb = Pcb::new(SegmentRef::Process(tcb.pid), snapshot);
        pcb.threads = 1;
        self.procs.push(Some(pcb));
        self.plist.push_back(pid);
        self.enqueue_ready(tcb.offspring(pid, false));
    }

    /// One wake step of `^`: the oldest sleeper on the waker's cell, if
    /// any, becomes runnable again.
    fn wake_one(&mut self, waker: &Tcb) {
        let segment = self.segment_of(waker);
        let position = self
            .sleepers
            .iter()
            .position(|tcb| tcb.dp == waker.dp && self.segment_of(tcb) == segment);
        if let Some(position) = position {
            if let Some(tcb) = self.sleepers.remove(position) {
                self.enqueue_ready(tcb);
            }
        }
    }
}
