//! End-to-end program behavior.
//!
//! Each test compiles a complete source text, runs it to quiescence and
//! checks the bytes it wrote. The property block at the bottom covers
//! the arithmetic and pointer wraparound laws and compile determinism.

use brains_core::{compile, CompileError, Machine, MachineConfig};
use proptest::prelude::*;

fn run_with(source: &[u8], config: MachineConfig) -> Vec<u8> {
    let mut machine = Machine::from_source(source, config).expect("program compiles");
    let mut output = Vec::new();
    machine
        .run(&mut std::io::empty(), &mut output)
        .expect("run succeeds");
    output
}

fn run(source: &[u8]) -> Vec<u8> {
    run_with(source, MachineConfig::default())
}

#[test]
fn test_increment_and_output() {
    assert_eq!(run(b"+++."), [3]);
}

#[test]
fn test_counting_loop() {
    assert_eq!(run(b"++[>+++<-]>."), [6]);
}

#[test]
fn test_procedure_call() {
    assert_eq!(run(b":A+++;A."), [3]);
}

#[test]
fn test_unnamed_procedure_is_legal_and_silent() {
    assert_eq!(run(b":+++;"), []);
}

#[test]
fn test_rebinding_executes_through_the_table() {
    // `A` is rebound by the body of `B` mid-flight: the net effect is
    // `--+++` on a zeroed cell.
    assert_eq!(run(b":A--B++;:B:A--;+;A."), [1]);
}

#[test]
fn test_dollar_at_top_level_dies_like_a_separator() {
    assert_eq!(run(b"+++$."), []);
    // The text after `@` is a second process, not dead code.
    assert_eq!(run(b"+++@."), [0]);
}

#[test]
fn test_clear_peephole_equivalence() {
    assert_eq!(run(b"++++++[-]."), run(b"++++++[-][-]."));
    assert_eq!(run(b"++[-]+."), [1]);
}

#[test]
fn test_double_swap_is_identity() {
    assert_eq!(run(b"+~~."), [1]);
    assert_eq!(run(b"+~~~~."), [1]);
}

#[test]
fn test_conditional_arms() {
    assert_eq!(run(b"+(+++.|-----.)"), [4]);
    assert_eq!(run(b"(+++.|--.)"), [254]);
    assert_eq!(run(b"(+++.)."), [0]);
}

#[test]
fn test_embedded_input() {
    assert_eq!(run(b",.,.!AB"), b"AB");
    // A fused read keeps only the last byte.
    assert_eq!(run(b",,.!XY"), b"Y");
    // End of embedded input leaves the cell unchanged.
    assert_eq!(run(b"+++,.!"), [3]);
}

#[test]
fn test_call_stack_exhaustion_is_survivable() {
    // 1024 frames of non-tail recursion, one refused call, and a full
    // unwind that increments once per frame: 1024 % 256 == 0.
    assert_eq!(run(b":AA+;A."), [0]);
}

#[test]
fn test_boundary_wraparound() {
    assert_eq!(run(b"<-."), [255]);
    assert_eq!(run(b"<+>."), [0]);
}

#[test]
fn test_rejected_files_name_their_error() {
    assert_eq!(compile(b"+[+"), Err(CompileError::UnterminatedOpen('[')));
    assert_eq!(compile(b"+]"), Err(CompileError::UnmatchedClose(']')));
    assert_eq!(compile(b"+|+"), Err(CompileError::ElseOutsideConditional));
    assert_eq!(compile(b"+;"), Err(CompileError::ReturnOutsideDefinition));
    assert_eq!(compile(b"+'"), Err(CompileError::EscapeOutsideLoop('\'')));
}

proptest! {
    /// Any run of `+` leaves the cell at its count modulo 256.
    #[test]
    fn prop_increment_runs_wrap(count in 0usize..2048) {
        let mut source = vec![b'+'; count];
        source.push(b'.');
        prop_assert_eq!(run(&source), [count as u8]);
    }

    /// Matched pointer walks return to the same cell, across the tape
    /// boundary included.
    #[test]
    fn prop_pointer_walk_round_trips(steps in 0usize..66000) {
        let mut source = vec![b'+'];
        source.extend(std::iter::repeat(b'>').take(steps));
        source.extend(std::iter::repeat(b'<').take(steps));
        source.push(b'.');
        prop_assert_eq!(run(&source), [1]);
    }

    /// Compilation is a pure function of the source bytes.
    #[test]
    fn prop_compilation_is_deterministic(source in proptest::collection::vec(any::<u8>(), 0..256)) {
        prop_assert_eq!(compile(&source), compile(&source));
    }
}
