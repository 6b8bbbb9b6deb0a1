//! Per-step execution tracing.
//!
//! A tracer is threaded explicitly into each frame (and from there into
//! predicate child frames) rather than living in a process-wide writer, so
//! verifications running in parallel never share mutable state. Tracing is
//! diagnostic only; correctness never depends on it.

use crate::isa::Instruction;
use std::io::Write;

/// Receives one callback per fetched instruction, before it executes.
pub trait Tracer {
    fn step(&mut self, depth: u32, pc: usize, instr: &Instruction, run_limit: i64, stack_len: usize);
}

/// Writes one line per step to any [`Write`] sink.
pub struct WriteTracer<W: Write> {
    out: W,
}

impl<W: Write> WriteTracer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Tracer for WriteTracer<W> {
    fn step(&mut self, depth: u32, pc: usize, instr: &Instruction, run_limit: i64, stack_len: usize) {
        let mut line = format!(
            "{:indent$}{:04x} {:<20} limit={} stack={}",
            "",
            pc,
            instr.opcode.mnemonic(),
            run_limit,
            stack_len,
            indent = depth as usize * 2,
        );
        if !instr.data.is_empty() {
            line.push_str(" data=");
            for byte in instr.data.as_slice() {
                line.push_str(&format!("{:02x}", byte));
            }
        }
        // A failed trace write must not fail the verification.
        let _ = writeln!(self.out, "{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::decode_instruction;

    #[test]
    fn write_tracer_emits_one_line_per_step() {
        let mut tracer = WriteTracer::new(Vec::new());
        let prog = [0x51u8, 0x76];
        let instr = decode_instruction(&prog, 0).unwrap();
        tracer.step(0, 0, &instr, 10_000, 0);
        let instr = decode_instruction(&prog, 1).unwrap();
        tracer.step(1, 1, &instr, 9_990, 1);

        let text = String::from_utf8(tracer.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("TRUE"));
        assert!(lines[0].contains("data=01"));
        assert!(lines[1].contains("DUP"));
        assert!(lines[1].starts_with("  "));
    }
}
