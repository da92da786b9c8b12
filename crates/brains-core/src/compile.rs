//! Single-pass compiler.
//!
//! A recursive descent over the filtered character stream emits one
//! instruction word per construct. Runs of repeatable operators fuse into
//! one word, `[-]` collapses to a clear-cell opcode, loops that can only
//! be reached with a zero (or, for `{`, nonzero) cell lose their
//! conditional entry, and every jump displacement is resolved before the
//! word is final. Break and continue are emitted as sentinels and
//! rewritten by a linear backfill when the enclosing loop closes.
//!
//! Each `@`-delimited segment of the stream becomes one "big bang"
//! process. Any syntax error rejects the whole file.

use crate::filter::SourceFilter;
use crate::inst::{self, op, pack};
use crate::limits;

/// Reasons a source file is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// A close bracket with no matching open.
    #[error("unmatched `{0}`")]
    UnmatchedClose(char),

    /// An open construct never closed before its segment ended.
    #[error("unterminated `{0}`")]
    UnterminatedOpen(char),

    /// `|` occurred outside a conditional.
    #[error("`|` outside a conditional")]
    ElseOutsideConditional,

    /// A second `|` in the same conditional.
    #[error("more than one `|` in a conditional")]
    DoubleElse,

    /// `;` occurred outside a procedure definition.
    #[error("`;` outside a procedure definition")]
    ReturnOutsideDefinition,

    /// Break or continue occurred outside a loop.
    #[error("`{0}` outside a loop")]
    EscapeOutsideLoop(char),

    /// The program does not fit in instruction memory.
    #[error("program exceeds instruction memory")]
    ProgramTooLarge,
}

/// A compiled source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    /// Instruction memory, shared read-only by every process.
    pub code: Vec<u32>,
    /// Entry point of each big-bang segment.
    pub entries: Vec<u32>,
    /// Program input embedded after a `!` terminator, if any.
    pub input: Option<Vec<u8>>,
}

/// Compiles one source file.
///
/// # Errors
///
/// Returns the first syntax error encountered; the file is rejected
/// whole.
pub fn compile(source: &[u8]) -> Result<Program, CompileError> {
    Compiler::new(source).compile_all()
}

/// How a segment's token stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentEnd {
    /// An `@` (or the `!` rewritten to one); more text may follow.
    Separator,
    /// End of program text.
    Eof,
}

struct Compiler<'a> {
    src: SourceFilter<'a>,
    pending: Option<u8>,
    code: Vec<u32>,
}

impl<'a> Compiler<'a> {
    fn new(source: &'a [u8]) -> Self {
        Self {
            src: SourceFilter::new(source),
            pending: None,
            code: Vec::new(),
        }
    }

    fn compile_all(mut self) -> Result<Program, CompileError> {
        let mut entries = Vec::new();
        loop {
            let start = self.code.len();
            let end = self.segment()?;
            // A segment holding only its own sentinel spawns no process.
            if self.code.len() - start > 1 {
                entries.push(start as u32);
            }
            if end == SegmentEnd::Eof {
                break;
            }
        }
        let input = self.src.saw_bang().then(|| self.src.remainder().to_vec());
        Ok(Program {
            code: self.code,
            entries,
            input,
        })
    }

    fn next(&mut self) -> Option<u8> {
        self.pending.take().or_else(|| self.src.next_char())
    }

    fn emit(&mut self, word: u32) -> Result<(), CompileError> {
        if self.code.len() >= limits::IMEM {
            return Err(CompileError::ProgramTooLarge);
        }
        self.code.push(word);
        Ok(())
    }

    fn last_opcode(&self) -> Option<u8> {
        self.code.last().map(|&word| inst::opcode(word))
    }

    /// Counts the run of consecutive `ch` characters, including the one
    /// already consumed.
    fn run_length(&mut self, ch: u8) -> u32 {
        let mut count = 1u32;
        while let Some(next) = self.next() {
            if next == ch {
                count += 1;
            } else {
                self.pending = Some(next);
                break;
            }
        }
        count
    }

    /// One `@`-delimited compilation unit.
    fn segment(&mut self) -> Result<SegmentEnd, CompileError> {
        loop {
            let Some(ch) = self.next() else {
                self.emit(pack(op::SEPARATE, 0))?;
                return Ok(SegmentEnd::Eof);
            };
            match ch {
                b'@' => {
                    self.emit(pack(op::SEPARATE, 0))?;
                    return Ok(SegmentEnd::Separator);
                }
                b']' | b'}' | b')' => return Err(CompileError::UnmatchedClose(ch as char)),
                b';' => return Err(CompileError::ReturnOutsideDefinition),
                b'|' => return Err(CompileError::ElseOutsideConditional),
                b'\'' | b'`' => return Err(CompileError::EscapeOutsideLoop(ch as char)),
                _ => self.item(ch, false)?,
            }
        }
    }

    /// One construct that is legal in any block. Closers, terminators and
    /// escapes are the caller's business.
    fn item(&mut self, ch: u8, in_loop: bool) -> Result<(), CompileError> {
        match ch {
            b'+' | b'-' | b'<' | b'>' | b'.' | b',' | b'^' | b'_' | b'=' => {
                let count = self.run_length(ch);
                self.emit(pack(ch, count))
            }
            b'~' => {
                // An even number of tape swaps is a no-op.
                let count = self.run_length(ch);
                if count % 2 == 1 {
                    self.emit(pack(op::SWAP, count))
                } else {
                    Ok(())
                }
            }
            b'$' => self.emit(pack(op::RETURN, 0)),
            b'[' => self.repeat_loop(op::LOOP_OPEN, op::LOOP_CLOSE, b']'),
            b'{' => self.repeat_loop(op::GATE_OPEN, op::GATE_CLOSE, b'}'),
            b'(' => self.conditional(in_loop),
            b':' => self.definition(in_loop),
            b'&' | b'%' | b'*' | b'#' => self.emit(pack(ch, 0)),
            ch if inst::proc_slot(ch).is_some() => self.emit(pack(ch, 0)),
            _ => unreachable!("filter admits only recognized characters"),
        }
    }

    /// `[` … `]` or `{` … `}`.
    fn repeat_loop(&mut self, open_op: u8, close_op: u8, close_ch: u8) -> Result<(), CompileError> {
        let open_ix = self.code.len();
        // Fall-through can only reach this open with a cell value that
        // makes the test always skip: a zero cell after `]`, `"`, `@` or
        // at program start, a nonzero cell after `}`.
        let dead = if open_op == op::LOOP_OPEN {
            matches!(
                self.last_opcode(),
                None | Some(op::LOOP_CLOSE | op::CLEAR | op::SEPARATE)
            )
        } else {
            matches!(self.last_opcode(), Some(op::GATE_CLOSE))
        };
        self.emit(pack(open_op, 0))?;
        loop {
            let Some(ch) = self.next() else {
                return Err(CompileError::UnterminatedOpen(open_op as char));
            };
            match ch {
                ch if ch == close_ch => break,
                b'@' | b';' => return Err(CompileError::UnterminatedOpen(open_op as char)),
                b']' | b'}' | b')' => return Err(CompileError::UnmatchedClose(ch as char)),
                b'|' => return Err(CompileError::ElseOutsideConditional),
                b'\'' => self.emit(pack(op::BREAK, 0))?,
                b'`' => self.emit(pack(op::CONTINUE, 0))?,
                _ => self.item(ch, true)?,
            }
        }
        let close_ix = self.code.len();
        if open_op == op::LOOP_OPEN
            && close_ix == open_ix + 2
            && self.code[open_ix + 1] == pack(op::DEC, 1)
        {
            // `[-]` spins the cell down to zero one step at a time.
            self.code.truncate(open_ix);
            return self.emit(pack(op::CLEAR, 0));
        }
        let displacement = (close_ix - open_ix) as u32;
        self.emit(pack(close_op, displacement))?;
        self.code[open_ix] = if dead {
            pack(op::ELSE, displacement)
        } else {
            pack(open_op, displacement)
        };
        self.backfill(open_ix + 1, close_ix);
        Ok(())
    }

    /// Rewrites break/continue sentinels between `from` and the loop
    /// close at `close_ix`. Break lands one past the close, continue
    /// lands on the close test. Inner loops have already consumed their
    /// own sentinels.
    fn backfill(&mut self, from: usize, close_ix: usize) {
        for ix in from..close_ix {
            match inst::opcode(self.code[ix]) {
                op::BREAK => self.code[ix] = pack(op::ELSE, (close_ix - ix) as u32),
                op::CONTINUE => self.code[ix] = pack(op::ELSE, (close_ix - ix - 1) as u32),
                _ => {}
            }
        }
    }

    /// `(` … `)` with at most one `|`.
    fn conditional(&mut self, in_loop: bool) -> Result<(), CompileError> {
        let open_ix = self.code.len();
        self.emit(pack(op::IF_OPEN, 0))?;
        let mut else_ix: Option<usize> = None;
        loop {
            let Some(ch) = self.next() else {
                return Err(CompileError::UnterminatedOpen('('));
            };
            match ch {
                b')' => break,
                b'|' => {
                    if else_ix.is_some() {
                        return Err(CompileError::DoubleElse);
                    }
                    else_ix = Some(self.code.len());
                    self.emit(pack(op::ELSE, 0))?;
                }
                b'@' | b';' => return Err(CompileError::UnterminatedOpen('(')),
                b']' | b'}' => return Err(CompileError::UnmatchedClose(ch as char)),
                b'\'' | b'`' => {
                    if !in_loop {
                        return Err(CompileError::EscapeOutsideLoop(ch as char));
                    }
                    let sentinel = if ch == b'\'' { op::BREAK } else { op::CONTINUE };
                    self.emit(pack(sentinel, 0))?;
                }
                _ => self.item(ch, in_loop)?,
            }
        }
        let close_ix = self.code.len();
        self.emit(pack(op::IF_CLOSE, 0))?;
        match else_ix {
            Some(else_ix) => {
                self.code[open_ix] = pack(op::IF_OPEN, (else_ix - open_ix) as u32);
                self.code[else_ix] = pack(op::ELSE, (close_ix - else_ix) as u32);
            }
            None => {
                self.code[open_ix] = pack(op::IF_OPEN, (close_ix - open_ix) as u32);
            }
        }
        Ok(())
    }

    /// `:X` … `;`. The name is simply the first word of the body; the
    /// runtime binder inspects it when the header executes.
    fn definition(&mut self, in_loop: bool) -> Result<(), CompileError> {
        let def_ix = self.code.len();
        self.emit(pack(op::DEFINE, 0))?;
        loop {
            let Some(ch) = self.next() else {
                return Err(CompileError::UnterminatedOpen(':'));
            };
            match ch {
                b';' => break,
                b'@' => return Err(CompileError::UnterminatedOpen(':')),
                b']' | b'}' | b')' => return Err(CompileError::UnmatchedClose(ch as char)),
                b'|' => return Err(CompileError::ElseOutsideConditional),
                b'\'' | b'`' => {
                    if !in_loop {
                        return Err(CompileError::EscapeOutsideLoop(ch as char));
                    }
                    let sentinel = if ch == b'\'' { op::BREAK } else { op::CONTINUE };
                    self.emit(pack(sentinel, 0))?;
                }
                _ => self.item(ch, in_loop)?,
            }
        }
        let return_ix = self.code.len();
        self.emit(pack(op::RETURN, 0))?;
        self.code[def_ix] = pack(op::DEFINE, (return_ix - def_ix) as u32);
        Ok(())
    }
}
