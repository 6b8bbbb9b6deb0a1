//! Stack-based predicate virtual machine.
//!
//! Evaluates the programs that gate spending (control programs), issuance
//! (issuance programs) and block acceptance (consensus programs). Every
//! validating node must reach a byte-identical accept/reject decision for
//! the same program and inputs, so everything here - decoding, costs,
//! control flow, opcode behavior - is consensus-critical.
//!
//! # Architecture
//!
//! - **Values**: variable-length byte strings ([`crate::types::bytes::Bytes`]),
//!   reinterpreted as booleans or integers per opcode
//! - **Stacks**: a data stack, an alt stack reachable only through explicit
//!   moves, and a control stack of open IF/ELSE/WHILE tuples
//! - **Execution model**: fetch-decode-execute over a flat byte program;
//!   control flow nests via the control stack, loops jump by rewriting the
//!   next program counter
//! - **Metering**: a signed run limit depletes by at least one unit per
//!   instruction; exhaustion aborts, which bounds every execution without a
//!   timeout
//! - **Recursion**: `CHECKPREDICATE` runs a child frame over a clone of the
//!   data stack with its own budget carved out of the parent's
//!
//! # Modules
//!
//! - [`context`]: transaction/block execution contexts
//! - [`cost`]: run-limit constants and stack memory costing
//! - [`stack`]: the stack container
//! - [`trace`]: per-step diagnostic tracing

pub mod context;
pub mod cost;
pub mod stack;
pub mod trace;

use crate::core::block::Block;
use crate::core::transaction::{Transaction, TxInput, TxSigHasher};
use crate::crypto::key_pair::{PublicKey, SIGNATURE_LEN};
use crate::errors::VmError;
use crate::isa::{Instruction, Opcode, append_push, decode_instruction};
use crate::types::bytes::Bytes;
use crate::types::value::{bool_to_bytes, bytes_to_bool, bytes_to_int64, int64_to_bytes};
use context::{BlockContext, ExecContext, TxContext};
use cost::{DEFAULT_RUN_LIMIT, PREDICATE_REFUND, stack_cost, value_cost};
use sha2::Digest;
use stack::Stack;
use trace::Tracer;

/// Program version this machine implements.
pub const VM_VERSION: u64 = 1;

/// Signature hash length expected by the signature-checking opcodes.
const MSG_LEN: usize = 32;

/// Kind of an open control-stack tuple.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ControlKind {
    If,
    Else,
    While,
}

/// One open nesting level: what opened it, whether its body executes, and
/// for loops the offset to jump back to.
#[derive(Clone, Debug)]
struct ControlTuple {
    kind: ControlKind,
    flag: bool,
    /// Offset of the WHILE opcode; unused for branch tuples.
    saved_pc: usize,
}

/// A single execution frame.
///
/// Created fresh for each top-level verification and for each
/// `CHECKPREDICATE` child; discarded when the call returns. Frames share
/// nothing mutable, so independent verifications can run in parallel.
pub struct VirtualMachine<'a, 't> {
    program: &'a [u8],
    pc: usize,
    next_pc: usize,
    run_limit: i64,
    deferred_cost: i64,
    data_stack: Stack,
    alt_stack: Stack,
    control_stack: Vec<ControlTuple>,
    depth: u32,
    context: Option<&'a ExecContext<'a>>,
    tracer: Option<&'t mut dyn Tracer>,
}

impl<'a, 't> VirtualMachine<'a, 't> {
    /// Creates a frame over `program` with the given budget.
    pub fn new(program: &'a [u8], run_limit: i64) -> Self {
        Self {
            program,
            pc: 0,
            next_pc: 0,
            run_limit,
            deferred_cost: 0,
            data_stack: Stack::new(),
            alt_stack: Stack::new(),
            control_stack: Vec::new(),
            depth: 0,
            context: None,
            tracer: None,
        }
    }

    /// Attaches a transaction or block context for introspection opcodes.
    pub fn with_context(mut self, context: &'a ExecContext<'a>) -> Self {
        self.context = Some(context);
        self
    }

    /// Attaches a diagnostic tracer for this frame and its children.
    pub fn with_tracer(mut self, tracer: &'t mut dyn Tracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Remaining run-limit budget.
    pub fn run_limit(&self) -> i64 {
        self.run_limit
    }

    /// Pushes witness arguments in order, charging their stack cost.
    pub fn seed(&mut self, args: &[Bytes]) -> Result<(), VmError> {
        for arg in args {
            self.push(arg.clone())?;
        }
        Ok(())
    }

    /// Runs the program to completion.
    ///
    /// The result is true iff the data stack is non-empty and its top value
    /// is boolean-true; an empty stack is a false result, not an error.
    pub fn run(&mut self) -> Result<bool, VmError> {
        while self.pc < self.program.len() {
            self.step()?;
        }
        if !self.control_stack.is_empty() {
            return Err(VmError::NonEmptyControlStack);
        }
        Ok(self.data_stack.peek().is_some_and(|top| bytes_to_bool(top)))
    }

    fn step(&mut self) -> Result<(), VmError> {
        let instr = decode_instruction(self.program, self.pc)?;
        if let Some(tracer) = self.tracer.as_deref_mut() {
            tracer.step(
                self.depth,
                self.pc,
                &instr,
                self.run_limit,
                self.data_stack.len(),
            );
        }
        self.next_pc = self.pc + instr.len;

        // Control-flow opcodes run even inside an inactive branch so the
        // nesting bookkeeping stays consistent.
        if !instr.opcode.is_control_flow() && !self.executing() {
            self.apply_cost(1)?;
        } else {
            self.deferred_cost = 0;
            self.apply_cost(instr.opcode.base_cost())?;
            self.exec(&instr)?;
            self.settle_deferred()?;
        }

        self.pc = self.next_pc;
        Ok(())
    }

    /// Whether the current position is inside active branches only.
    fn executing(&self) -> bool {
        self.control_stack.last().is_none_or(|t| t.flag)
    }

    fn exec(&mut self, instr: &Instruction) -> Result<(), VmError> {
        use Opcode::*;
        match instr.opcode {
            // Pushes
            False | DataPush | Pushdata1 | Pushdata2 | Pushdata4 | OneNegate | True | Num2
            | Num3 | Num4 | Num5 | Num6 | Num7 | Num8 | Num9 | Num10 | Num11 | Num12 | Num13
            | Num14 | Num15 | Num16 => self.push(instr.data.clone()),
            // Control flow
            While => self.op_while(),
            EndWhile => self.op_endwhile(),
            If => self.op_if(false),
            NotIf => self.op_if(true),
            Else => self.op_else(),
            EndIf => self.op_endif(),
            Verify => self.op_verify(),
            Fail => Err(VmError::Return),
            // Stack
            ToAltStack => self.op_to_alt_stack(),
            FromAltStack => self.op_from_alt_stack(),
            TwoDup => self.op_ndup(2),
            ThreeDup => self.op_ndup(3),
            TwoOver => self.op_two_over(),
            TwoRot => self.op_nswap(2, 5),
            TwoSwap => self.op_nswap(2, 3),
            IfDup => self.op_ifdup(),
            Depth => self.op_depth(),
            Drop => self.pop().map(|_| ()),
            Dup => self.op_ndup(1),
            Nip => self.op_nip(),
            Over => self.op_over(),
            Pick => self.op_pick(),
            Roll => self.op_roll(),
            Rot => self.op_nswap(1, 2),
            Swap => self.op_nswap(1, 1),
            Tuck => self.op_tuck(),
            // Splice
            Cat => self.op_cat(),
            Substr => self.op_substr(),
            Left => self.op_left(),
            Right => self.op_right(),
            Size => self.op_size(),
            CatPushdata => self.op_catpushdata(),
            // Bitwise
            Invert => self.op_invert(),
            And => self.op_and(),
            Or => self.op_bitwise_extend(|a, b| a | b),
            Xor => self.op_bitwise_extend(|a, b| a ^ b),
            Equal => self.op_equal(false),
            EqualVerify => self.op_equal(true),
            // Numeric
            OneAdd => self.op_unary(|a| a.wrapping_add(1)),
            OneSub => self.op_unary(|a| a.wrapping_sub(1)),
            TwoMul => self.op_unary(|a| a.wrapping_mul(2)),
            TwoDiv => self.op_unary(|a| a >> 1),
            Negate => self.op_unary(i64::wrapping_neg),
            Abs => self.op_unary(i64::wrapping_abs),
            Not => self.op_not(),
            ZeroNotEqual => self.op_zero_not_equal(),
            Add => self.op_binary(i64::wrapping_add),
            Sub => self.op_binary(i64::wrapping_sub),
            Mul => self.op_binary(i64::wrapping_mul),
            Div => self.op_div(),
            Mod => self.op_mod(),
            Lshift => self.op_shift(true),
            Rshift => self.op_shift(false),
            BoolAnd => self.op_bool_binary(|a, b| a && b),
            BoolOr => self.op_bool_binary(|a, b| a || b),
            NumEqual => self.op_compare(|a, b| a == b),
            NumEqualVerify => self.op_num_equal_verify(),
            NumNotEqual => self.op_compare(|a, b| a != b),
            LessThan => self.op_compare(|a, b| a < b),
            GreaterThan => self.op_compare(|a, b| a > b),
            LessThanOrEqual => self.op_compare(|a, b| a <= b),
            GreaterThanOrEqual => self.op_compare(|a, b| a >= b),
            Min => self.op_binary(i64::min),
            Within => self.op_within(),
            // Crypto
            Ripemd160 => self.op_hash::<ripemd::Ripemd160>(),
            Sha1 => self.op_hash::<sha1::Sha1>(),
            Sha256 => self.op_hash::<sha2::Sha256>(),
            Sha3 => self.op_hash::<sha3::Sha3_256>(),
            CheckSig => self.op_checksig(),
            CheckMultiSig => self.op_checkmultisig(),
            TxSigHash => self.op_txsighash(),
            BlockSigHash => self.op_blocksighash(),
            // Predicates and introspection
            CheckPredicate => self.op_checkpredicate(),
            FindOutput => self.op_findoutput(),
            Asset => self.op_asset(),
            Amount => self.op_amount(),
            Program => self.op_program(),
            MinTime => self.op_mintime(),
            MaxTime => self.op_maxtime(),
            RefDataHash => self.op_refdatahash(),
            Index => self.op_index(),
        }
    }

    // =========================
    // Cost accounting
    // =========================

    /// Charges `cost` immediately; driving the limit negative aborts.
    fn apply_cost(&mut self, cost: i64) -> Result<(), VmError> {
        if cost > self.run_limit {
            return Err(VmError::RunLimitExceeded);
        }
        self.run_limit -= cost;
        Ok(())
    }

    /// Accumulates a cost (or, negative, a refund) for settlement after the
    /// current handler returns.
    fn defer_cost(&mut self, cost: i64) {
        self.deferred_cost = self.deferred_cost.saturating_add(cost);
    }

    /// Settles the accumulated deferred cost as one atomic adjustment.
    fn settle_deferred(&mut self) -> Result<(), VmError> {
        let cost = std::mem::take(&mut self.deferred_cost);
        self.run_limit = self.run_limit.saturating_sub(cost);
        if self.run_limit < 0 {
            return Err(VmError::RunLimitExceeded);
        }
        Ok(())
    }

    // =========================
    // Stack access
    // =========================

    /// Pushes a value, charging its memory cost up front.
    fn push(&mut self, value: Bytes) -> Result<(), VmError> {
        self.apply_cost(value_cost(&value))?;
        self.data_stack.push(value);
        Ok(())
    }

    /// Pushes a value whose memory cost settles with the deferred batch.
    fn push_deferred(&mut self, value: Bytes) {
        self.defer_cost(value_cost(&value));
        self.data_stack.push(value);
    }

    fn push_bool(&mut self, v: bool) -> Result<(), VmError> {
        self.push(bool_to_bytes(v))
    }

    fn push_int64(&mut self, n: i64) -> Result<(), VmError> {
        self.push(int64_to_bytes(n))
    }

    /// Pops a value; its memory cost is refunded at settlement.
    fn pop(&mut self) -> Result<Bytes, VmError> {
        let value = self.data_stack.pop().ok_or(VmError::DataStackUnderflow)?;
        self.defer_cost(-value_cost(&value));
        Ok(value)
    }

    fn pop_bool(&mut self) -> Result<bool, VmError> {
        Ok(bytes_to_bool(&self.pop()?))
    }

    fn pop_int64(&mut self) -> Result<i64, VmError> {
        bytes_to_int64(&self.pop()?)
    }

    fn peek(&self) -> Result<&Bytes, VmError> {
        self.data_stack.peek().ok_or(VmError::DataStackUnderflow)
    }

    // =========================
    // Context access
    // =========================

    fn tx_context(&self) -> Result<&'a TxContext<'a>, VmError> {
        match self.context {
            Some(ExecContext::Tx(ctx)) => Ok(ctx),
            _ => Err(VmError::WrongContext),
        }
    }

    fn block_context(&self) -> Result<&'a BlockContext<'a>, VmError> {
        match self.context {
            Some(ExecContext::Block(ctx)) => Ok(ctx),
            _ => Err(VmError::WrongContext),
        }
    }

    fn current_input(&self) -> Result<&'a TxInput, VmError> {
        self.tx_context()?.input()
    }

    // =========================
    // Control flow
    // =========================

    fn op_if(&mut self, negate: bool) -> Result<(), VmError> {
        if !self.executing() {
            // Inactive enclosing branch: propagate the skip.
            self.control_stack.push(ControlTuple {
                kind: ControlKind::If,
                flag: false,
                saved_pc: 0,
            });
            return Ok(());
        }
        let condition = self.pop_bool()?;
        self.control_stack.push(ControlTuple {
            kind: ControlKind::If,
            flag: condition != negate,
            saved_pc: 0,
        });
        Ok(())
    }

    fn op_else(&mut self) -> Result<(), VmError> {
        let tuple = self
            .control_stack
            .pop()
            .ok_or(VmError::ControlStackUnderflow)?;
        if tuple.kind != ControlKind::If {
            return Err(VmError::BadControlSyntax { mnemonic: "ELSE" });
        }
        let flag = self.executing() && !tuple.flag;
        self.control_stack.push(ControlTuple {
            kind: ControlKind::Else,
            flag,
            saved_pc: 0,
        });
        Ok(())
    }

    fn op_endif(&mut self) -> Result<(), VmError> {
        let tuple = self
            .control_stack
            .pop()
            .ok_or(VmError::ControlStackUnderflow)?;
        if tuple.kind == ControlKind::While {
            return Err(VmError::BadControlSyntax { mnemonic: "ENDIF" });
        }
        Ok(())
    }

    fn op_while(&mut self) -> Result<(), VmError> {
        if !self.executing() {
            self.control_stack.push(ControlTuple {
                kind: ControlKind::While,
                flag: false,
                saved_pc: self.pc,
            });
            return Ok(());
        }
        // The condition is peeked, not popped: an executing loop body sees
        // it and usually consumes it itself. A false condition is discarded
        // here since no body will run to do so.
        let condition = bytes_to_bool(self.peek()?);
        self.control_stack.push(ControlTuple {
            kind: ControlKind::While,
            flag: condition,
            saved_pc: self.pc,
        });
        if !condition {
            self.pop()?;
        }
        Ok(())
    }

    fn op_endwhile(&mut self) -> Result<(), VmError> {
        let tuple = self
            .control_stack
            .pop()
            .ok_or(VmError::ControlStackUnderflow)?;
        if tuple.kind != ControlKind::While {
            return Err(VmError::BadControlSyntax {
                mnemonic: "ENDWHILE",
            });
        }
        if tuple.flag {
            // Re-execute the WHILE, re-evaluating the loop condition.
            self.next_pc = tuple.saved_pc;
        }
        Ok(())
    }

    fn op_verify(&mut self) -> Result<(), VmError> {
        if !self.pop_bool()? {
            return Err(VmError::VerifyFailed);
        }
        Ok(())
    }

    fn op_checkpredicate(&mut self) -> Result<(), VmError> {
        self.defer_cost(-PREDICATE_REFUND);
        let limit = self.pop_int64()?;
        if limit < 0 {
            return Err(VmError::BadValue);
        }
        let predicate = self.pop()?;
        let limit = if limit == 0 { self.run_limit } else { limit };
        // The child's whole budget is carved out of the parent up front;
        // whatever the child leaves unused comes back as a deferred refund.
        self.apply_cost(limit)?;
        let parent_stack_cost = stack_cost(self.data_stack.as_slice());

        let (result, unused, child_stack_cost) = {
            let mut child = VirtualMachine {
                program: predicate.as_slice(),
                pc: 0,
                next_pc: 0,
                run_limit: limit,
                deferred_cost: 0,
                data_stack: self.data_stack.clone(),
                alt_stack: Stack::new(),
                control_stack: Vec::new(),
                depth: self.depth + 1,
                context: self.context,
                tracer: self.tracer.take(),
            };
            let result = child.run();
            let summary = (
                matches!(result, Ok(true)),
                child.run_limit,
                stack_cost(child.data_stack.as_slice()),
            );
            // Hand the tracer back to the parent frame.
            self.tracer = child.tracer.take();
            summary
        };

        self.defer_cost(-unused);
        // Memory held by the discarded child stack is refunded; the items
        // the parent still holds were counted in both stacks and cancel.
        self.defer_cost(parent_stack_cost - child_stack_cost);
        self.push_deferred(bool_to_bytes(result));
        Ok(())
    }

    // =========================
    // Stack manipulation
    // =========================

    fn op_to_alt_stack(&mut self) -> Result<(), VmError> {
        let value = self.data_stack.pop().ok_or(VmError::DataStackUnderflow)?;
        self.alt_stack.push(value);
        Ok(())
    }

    fn op_from_alt_stack(&mut self) -> Result<(), VmError> {
        let value = self.alt_stack.pop().ok_or(VmError::AltStackUnderflow)?;
        self.data_stack.push(value);
        Ok(())
    }

    /// DUP/2DUP/3DUP: re-push copies of the top `n` values in order.
    fn op_ndup(&mut self, n: usize) -> Result<(), VmError> {
        if self.data_stack.len() < n {
            return Err(VmError::DataStackUnderflow);
        }
        for _ in 0..n {
            let value = self
                .data_stack
                .peek_at(n - 1)
                .cloned()
                .ok_or(VmError::DataStackUnderflow)?;
            self.push(value)?;
        }
        Ok(())
    }

    /// SWAP/ROT/2SWAP/2ROT: move the `count` values at `depth` to the top.
    fn op_nswap(&mut self, count: usize, depth: usize) -> Result<(), VmError> {
        for _ in 0..count {
            let value = self
                .data_stack
                .remove(depth)
                .ok_or(VmError::DataStackUnderflow)?;
            self.data_stack.push(value);
        }
        Ok(())
    }

    fn op_two_over(&mut self) -> Result<(), VmError> {
        for _ in 0..2 {
            let value = self
                .data_stack
                .peek_at(3)
                .cloned()
                .ok_or(VmError::DataStackUnderflow)?;
            self.push(value)?;
        }
        Ok(())
    }

    fn op_ifdup(&mut self) -> Result<(), VmError> {
        let top = self.peek()?;
        if bytes_to_bool(top) {
            let copy = top.clone();
            self.push(copy)?;
        }
        Ok(())
    }

    fn op_depth(&mut self) -> Result<(), VmError> {
        self.push_int64(self.data_stack.len() as i64)
    }

    fn op_nip(&mut self) -> Result<(), VmError> {
        let value = self
            .data_stack
            .remove(1)
            .ok_or(VmError::DataStackUnderflow)?;
        self.defer_cost(-value_cost(&value));
        Ok(())
    }

    fn op_over(&mut self) -> Result<(), VmError> {
        let value = self
            .data_stack
            .peek_at(1)
            .cloned()
            .ok_or(VmError::DataStackUnderflow)?;
        self.push(value)
    }

    fn op_pick(&mut self) -> Result<(), VmError> {
        let n = self.pop_int64()?;
        if n < 0 {
            return Err(VmError::DataStackUnderflow);
        }
        let value = self
            .data_stack
            .peek_at(n as usize)
            .cloned()
            .ok_or(VmError::DataStackUnderflow)?;
        self.push(value)
    }

    fn op_roll(&mut self) -> Result<(), VmError> {
        let n = self.pop_int64()?;
        if n < 0 {
            return Err(VmError::DataStackUnderflow);
        }
        let value = self
            .data_stack
            .remove(n as usize)
            .ok_or(VmError::DataStackUnderflow)?;
        self.data_stack.push(value);
        Ok(())
    }

    fn op_tuck(&mut self) -> Result<(), VmError> {
        if self.data_stack.len() < 2 {
            return Err(VmError::DataStackUnderflow);
        }
        let copy = self.peek()?.clone();
        self.apply_cost(value_cost(&copy))?;
        self.data_stack.insert(2, copy);
        Ok(())
    }

    // =========================
    // Splice
    // =========================

    fn op_cat(&mut self) -> Result<(), VmError> {
        let b = self.pop()?;
        let mut a = self.pop()?;
        a.extend_from_slice(&b);
        self.push(a)
    }

    fn op_substr(&mut self) -> Result<(), VmError> {
        let size = self.pop_int64()?;
        let offset = self.pop_int64()?;
        let value = self.pop()?;
        if size < 0 || offset < 0 {
            return Err(VmError::BadValue);
        }
        let end = (offset as usize)
            .checked_add(size as usize)
            .ok_or(VmError::BadValue)?;
        let slice = value.get(offset as usize..end).ok_or(VmError::BadValue)?;
        self.push(Bytes::from(slice))
    }

    fn op_left(&mut self) -> Result<(), VmError> {
        let n = self.pop_int64()?;
        let value = self.pop()?;
        if n < 0 || n as usize > value.len() {
            return Err(VmError::BadValue);
        }
        let slice = Bytes::from(&value[..n as usize]);
        self.push(slice)
    }

    fn op_right(&mut self) -> Result<(), VmError> {
        let n = self.pop_int64()?;
        let value = self.pop()?;
        if n < 0 || n as usize > value.len() {
            return Err(VmError::BadValue);
        }
        let slice = Bytes::from(&value[value.len() - n as usize..]);
        self.push(slice)
    }

    fn op_size(&mut self) -> Result<(), VmError> {
        let len = self.peek()?.len() as i64;
        self.push_int64(len)
    }

    fn op_catpushdata(&mut self) -> Result<(), VmError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let mut out = a.to_vec();
        append_push(&mut out, &b);
        self.push(Bytes::from_vec(out))
    }

    // =========================
    // Bitwise
    // =========================

    fn op_invert(&mut self) -> Result<(), VmError> {
        let value = self.pop()?;
        self.apply_cost(value.len() as i64)?;
        let out: Vec<u8> = value.iter().map(|&b| !b).collect();
        self.push(Bytes::from_vec(out))
    }

    /// AND truncates to the shorter operand; extra bytes are dropped, not
    /// zero-extended.
    fn op_and(&mut self) -> Result<(), VmError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let n = a.len().min(b.len());
        self.apply_cost(n as i64)?;
        let out: Vec<u8> = (0..n).map(|i| a[i] & b[i]).collect();
        self.push(Bytes::from_vec(out))
    }

    /// OR and XOR zero-extend the shorter operand to the longer length.
    fn op_bitwise_extend(&mut self, f: fn(u8, u8) -> u8) -> Result<(), VmError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let n = a.len().max(b.len());
        self.apply_cost(n as i64)?;
        let out: Vec<u8> = (0..n)
            .map(|i| f(*a.get(i).unwrap_or(&0), *b.get(i).unwrap_or(&0)))
            .collect();
        self.push(Bytes::from_vec(out))
    }

    /// Cost is charged on the shorter operand even though the comparison
    /// reads the longer one in full. Consensus-fixed; changing it would be
    /// a protocol break.
    fn op_equal(&mut self, verify: bool) -> Result<(), VmError> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.apply_cost(a.len().min(b.len()) as i64)?;
        let equal = a == b;
        if verify {
            if equal {
                return Ok(());
            }
            return Err(VmError::VerifyFailed);
        }
        self.push_bool(equal)
    }

    // =========================
    // Numeric
    // =========================

    fn op_unary(&mut self, f: fn(i64) -> i64) -> Result<(), VmError> {
        let a = self.pop_int64()?;
        self.push_int64(f(a))
    }

    fn op_binary(&mut self, f: fn(i64, i64) -> i64) -> Result<(), VmError> {
        let b = self.pop_int64()?;
        let a = self.pop_int64()?;
        self.push_int64(f(a, b))
    }

    fn op_compare(&mut self, f: fn(i64, i64) -> bool) -> Result<(), VmError> {
        let b = self.pop_int64()?;
        let a = self.pop_int64()?;
        self.push_bool(f(a, b))
    }

    fn op_bool_binary(&mut self, f: fn(bool, bool) -> bool) -> Result<(), VmError> {
        let b = self.pop_bool()?;
        let a = self.pop_bool()?;
        self.push_bool(f(a, b))
    }

    fn op_not(&mut self) -> Result<(), VmError> {
        let a = self.pop_bool()?;
        self.push_bool(!a)
    }

    fn op_zero_not_equal(&mut self) -> Result<(), VmError> {
        let a = self.pop_int64()?;
        self.push_bool(a != 0)
    }

    fn op_num_equal_verify(&mut self) -> Result<(), VmError> {
        let b = self.pop_int64()?;
        let a = self.pop_int64()?;
        if a != b {
            return Err(VmError::VerifyFailed);
        }
        Ok(())
    }

    fn op_div(&mut self) -> Result<(), VmError> {
        let b = self.pop_int64()?;
        let a = self.pop_int64()?;
        if b == 0 {
            return Err(VmError::DivZero);
        }
        self.push_int64(floor_div(a, b))
    }

    fn op_mod(&mut self) -> Result<(), VmError> {
        let b = self.pop_int64()?;
        let a = self.pop_int64()?;
        if b == 0 {
            return Err(VmError::DivZero);
        }
        self.push_int64(floor_mod(a, b))
    }

    fn op_shift(&mut self, left: bool) -> Result<(), VmError> {
        let count = self.pop_int64()?;
        let a = self.pop_int64()?;
        if count < 0 {
            return Err(VmError::BadValue);
        }
        self.push_int64(shift_sign_magnitude(a, count, left))
    }

    fn op_within(&mut self) -> Result<(), VmError> {
        let max = self.pop_int64()?;
        let min = self.pop_int64()?;
        let x = self.pop_int64()?;
        self.push_bool(min <= x && x < max)
    }

    // =========================
    // Crypto
    // =========================

    fn op_hash<D: Digest>(&mut self) -> Result<(), VmError> {
        let data = self.pop()?;
        self.apply_cost((data.len() as i64 - 64).max(0))?;
        let digest = D::digest(data.as_slice());
        self.push(Bytes::new(digest.to_vec()))
    }

    fn op_checksig(&mut self) -> Result<(), VmError> {
        let pubkey = self.pop()?;
        let msg = self.pop()?;
        if msg.len() != MSG_LEN {
            return Err(VmError::BadValue);
        }
        let sig = self.pop()?;
        let key = PublicKey::from_slice(&pubkey)?;
        self.push_bool(key.verify(&msg, &sig))
    }

    fn op_checkmultisig(&mut self) -> Result<(), VmError> {
        let msg = self.pop()?;
        if msg.len() != MSG_LEN {
            return Err(VmError::BadValue);
        }
        let num_keys = self.pop_int64()?;
        if num_keys <= 0 {
            return Err(VmError::BadValue);
        }
        self.apply_cost(1024i64.saturating_mul(num_keys - 1))?;
        let mut keys = Vec::new();
        for _ in 0..num_keys {
            keys.push(PublicKey::from_slice(&self.pop()?)?);
        }
        let num_sigs = self.pop_int64()?;
        if num_sigs <= 0 || num_sigs > num_keys {
            return Err(VmError::BadValue);
        }
        let mut sigs = Vec::new();
        for _ in 0..num_sigs {
            let sig = self.pop()?;
            if sig.len() != SIGNATURE_LEN {
                return Err(VmError::BadValue);
            }
            sigs.push(sig);
        }
        // Greedy scan: each key is tried once against the next unmatched
        // signature; success means every signature found a key.
        let mut matched = 0;
        for key in &keys {
            if matched < sigs.len() && key.verify(&msg, &sigs[matched]) {
                matched += 1;
            }
        }
        self.push_bool(matched == sigs.len())
    }

    fn op_txsighash(&mut self) -> Result<(), VmError> {
        let hash_type = self.pop_int64()?;
        let hash = self.tx_context()?.sig_hasher.sig_hash(hash_type)?;
        self.push(Bytes::new(hash.to_vec()))
    }

    fn op_blocksighash(&mut self) -> Result<(), VmError> {
        let hash = self.block_context()?.block.sig_hash();
        self.push(Bytes::new(hash.to_vec()))
    }

    // =========================
    // Transaction introspection
    // =========================

    fn op_asset(&mut self) -> Result<(), VmError> {
        let asset = *self.current_input()?.commitment.asset_id()?;
        self.push(Bytes::new(asset.to_vec()))
    }

    fn op_amount(&mut self) -> Result<(), VmError> {
        let amount = self.current_input()?.commitment.amount()?;
        let amount = i64::try_from(amount).map_err(|_| VmError::BadValue)?;
        self.push_int64(amount)
    }

    fn op_program(&mut self) -> Result<(), VmError> {
        let program = self.current_input()?.commitment.program()?.clone();
        self.push(program)
    }

    fn op_mintime(&mut self) -> Result<(), VmError> {
        let t = self.tx_context()?.tx.min_time_ms;
        self.push_int64(i64::try_from(t).map_err(|_| VmError::BadValue)?)
    }

    fn op_maxtime(&mut self) -> Result<(), VmError> {
        let t = self.tx_context()?.tx.max_time_ms;
        self.push_int64(i64::try_from(t).map_err(|_| VmError::BadValue)?)
    }

    fn op_refdatahash(&mut self) -> Result<(), VmError> {
        let hash = self.current_input()?.ref_data_hash;
        self.push(Bytes::new(hash.to_vec()))
    }

    fn op_index(&mut self) -> Result<(), VmError> {
        let index = self.tx_context()?.input_index;
        self.push_int64(index as i64)
    }

    fn op_findoutput(&mut self) -> Result<(), VmError> {
        let program = self.pop()?;
        let index = self.pop_int64()?;
        let amount = self.pop_int64()?;
        let asset = self.pop()?;
        if index < 0 || amount < 0 {
            return Err(VmError::BadValue);
        }
        let outputs = &self.tx_context()?.tx.outputs;
        // The index is a starting hint, not a constraint: the scan wraps
        // around so a match anywhere in the outputs counts.
        let found = !outputs.is_empty() && {
            let start = index as usize % outputs.len();
            (0..outputs.len()).any(|i| {
                let out = &outputs[(start + i) % outputs.len()];
                out.asset_id.as_slice() == asset.as_slice()
                    && out.amount == amount as u64
                    && out.control_program == program
            })
        };
        self.push_bool(found)
    }
}

/// Flooring division: the quotient rounds toward negative infinity.
fn floor_div(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    let r = a.wrapping_rem(b);
    if r != 0 && (r < 0) != (b < 0) { q - 1 } else { q }
}

/// Remainder taking the divisor's sign, consistent with [`floor_div`].
fn floor_mod(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && (r < 0) != (b < 0) { r + b } else { r }
}

/// Shifts operate on sign and magnitude separately: the sign bit is
/// extracted, the magnitude shifted, and the sign reapplied.
fn shift_sign_magnitude(a: i64, count: i64, left: bool) -> i64 {
    let negative = a < 0;
    let magnitude = a.unsigned_abs();
    let shifted = if count >= 64 {
        0
    } else if left {
        magnitude << count
    } else {
        magnitude >> count
    };
    let out = shifted as i64;
    if negative { out.wrapping_neg() } else { out }
}

// =========================
// Entry points
// =========================

/// Verifies that `tx`'s input at `input_index` is authorized by its witness.
///
/// The program and version come from the input's commitment; only version-1
/// programs are supported, and unrecognized commitment kinds are rejected.
/// The witness arguments seed the data stack in order.
pub fn verify_tx_input(
    tx: &Transaction,
    input_index: usize,
    tracer: Option<&mut dyn Tracer>,
) -> Result<bool, VmError> {
    let input = tx.inputs.get(input_index).ok_or(VmError::BadValue)?;
    let vm_version = input.commitment.vm_version()?;
    if vm_version != VM_VERSION {
        return Err(VmError::UnsupportedVM {
            version: vm_version,
        });
    }
    let program = input.commitment.program()?;
    let sig_hasher = TxSigHasher { tx, input_index };
    let context = ExecContext::Tx(TxContext {
        tx,
        input_index,
        sig_hasher: &sig_hasher,
    });
    let mut vm = VirtualMachine::new(program, DEFAULT_RUN_LIMIT).with_context(&context);
    if let Some(tracer) = tracer {
        vm = vm.with_tracer(tracer);
    }
    vm.seed(&input.witness)?;
    vm.run()
}

/// Verifies that `block` is accepted by its predecessor's consensus program.
///
/// The program comes from `prev_block`; the new block's witness seeds the
/// data stack.
pub fn verify_block_header(
    prev_block: &Block,
    block: &Block,
    tracer: Option<&mut dyn Tracer>,
) -> Result<bool, VmError> {
    let context = ExecContext::Block(BlockContext { block, prev_block });
    let mut vm =
        VirtualMachine::new(&prev_block.consensus_program, DEFAULT_RUN_LIMIT).with_context(&context);
    if let Some(tracer) = tracer {
        vm = vm.with_tracer(tracer);
    }
    vm.seed(&block.witness)?;
    vm.run()
}
