//! Instruction word encoding.
//!
//! A compiled program is a flat array of `u32` words shared read-only by
//! every process. Each word packs an opcode byte in the low 8 bits and a
//! 24-bit payload above it:
//!
//! ```text
//! 31                    8 7        0
//! ├──────── payload ─────┼─ opcode ─┤
//! ```
//!
//! The opcode byte is the source character itself, so a disassembly of the
//! stream reads like the program that produced it. The payload is a repeat
//! count for the run-length-fused operators and an unsigned jump
//! displacement for the control-flow operators.

/// Bits the payload is shifted past the opcode byte.
pub const OPCODE_SHIFT: u32 = 8;
/// Mask selecting the opcode byte of a word.
pub const OPCODE_MASK: u32 = 0xFF;

/// Opcode bytes, named for the runtime action each one performs.
///
/// `BREAK` and `CONTINUE` exist only between emission and the loop-close
/// backfill; a successful compilation never contains them.
pub mod op {
    /// `+` adds the payload to the current cell.
    pub const INC: u8 = b'+';
    /// `-` subtracts the payload from the current cell.
    pub const DEC: u8 = b'-';
    /// `>` advances the data pointer.
    pub const RIGHT: u8 = b'>';
    /// `<` retreats the data pointer.
    pub const LEFT: u8 = b'<';
    /// `.` writes the current cell, payload times.
    pub const OUT: u8 = b'.';
    /// `,` reads payload bytes into the current cell.
    pub const IN: u8 = b',';
    /// `[` skips the body while the cell is zero.
    pub const LOOP_OPEN: u8 = b'[';
    /// `]` is the back edge while the cell is nonzero.
    pub const LOOP_CLOSE: u8 = b']';
    /// `{` skips the body while the cell is nonzero.
    pub const GATE_OPEN: u8 = b'{';
    /// `}` is the back edge while the cell is zero.
    pub const GATE_CLOSE: u8 = b'}';
    /// `(` jumps to the else arm (or past the close) on a zero cell.
    pub const IF_OPEN: u8 = b'(';
    /// `|` jumps forward unconditionally; also the backfilled form of
    /// break and continue.
    pub const ELSE: u8 = b'|';
    /// `)` is the no-op landmark closing a conditional.
    pub const IF_CLOSE: u8 = b')';
    /// `"` clears the current cell (peephole for `[-]`).
    pub const CLEAR: u8 = b'"';
    /// `:` binds the following identifier, then skips the body.
    pub const DEFINE: u8 = b':';
    /// `;` returns from a procedure, or dies at the top level.
    pub const RETURN: u8 = b';';
    /// `*` yields the rest of the quantum.
    pub const YIELD: u8 = b'*';
    /// `@` is thread death; it terminates every compilation segment.
    pub const SEPARATE: u8 = b'@';
    /// `=` sets the per-instruction cost for the rest of the quantum.
    pub const COST: u8 = b'=';
    /// `^` is semaphore up: increment, waking one sleeper per unit.
    pub const UP: u8 = b'^';
    /// `_` is semaphore down: decrement, or sleep on the current cell.
    pub const DOWN: u8 = b'_';
    /// `~` swaps between the private and the parent tape.
    pub const SWAP: u8 = b'~';
    /// `&` spawns a thread in the current process.
    pub const SPAWN: u8 = b'&';
    /// `%` forks a new process with a copy of the current tape.
    pub const FORK: u8 = b'%';
    /// `#` traces to the log; it costs nothing.
    pub const TRACE: u8 = b'#';
    /// `'` is the break sentinel, rewritten by the loop-close backfill.
    pub const BREAK: u8 = b'\'';
    /// `` ` `` is the continue sentinel, rewritten by the loop-close
    /// backfill.
    pub const CONTINUE: u8 = b'`';
}

/// Packs an opcode and payload into one instruction word.
#[inline]
#[must_use]
pub const fn pack(opcode: u8, payload: u32) -> u32 {
    (payload << OPCODE_SHIFT) | opcode as u32
}

/// Extracts the opcode byte of a word.
#[inline]
#[must_use]
pub const fn opcode(word: u32) -> u8 {
    (word & OPCODE_MASK) as u8
}

/// Extracts the payload of a word.
#[inline]
#[must_use]
pub const fn payload(word: u32) -> u32 {
    word >> OPCODE_SHIFT
}

/// Maps a procedure identifier to its table slot.
///
/// Digits map to 0..=9, uppercase letters to 10..=35, lowercase letters to
/// 36..=61. Every other byte names no procedure.
#[inline]
#[must_use]
pub const fn proc_slot(ch: u8) -> Option<usize> {
    match ch {
        b'0'..=b'9' => Some((ch - b'0') as usize),
        b'A'..=b'Z' => Some((ch - b'A') as usize + 10),
        b'a'..=b'z' => Some((ch - b'a') as usize + 36),
        _ => None,
    }
}
