//! Execution context passed to the machine for introspection opcodes.
//!
//! A frame runs either against a transaction input, against a block header,
//! or context-free. The two contexts are mutually exclusive; opcodes that
//! need one fail with `WrongContext` when run under the other or under none.

use crate::core::block::Block;
use crate::core::transaction::{Transaction, TxInput};
use crate::errors::VmError;
use crate::types::hash::Hash;

/// Supplies the signature hash for a popped hash type.
///
/// The hashing rules themselves live with the transaction model; the
/// machine only forwards the hash type and pushes the digest.
pub trait SigHasher {
    fn sig_hash(&self, hash_type: i64) -> Result<Hash, VmError>;
}

/// Context for evaluating a control or issuance program.
pub struct TxContext<'a> {
    pub tx: &'a Transaction,
    pub input_index: usize,
    pub sig_hasher: &'a dyn SigHasher,
}

impl TxContext<'_> {
    /// The input whose program is being evaluated.
    pub fn input(&self) -> Result<&TxInput, VmError> {
        self.tx.inputs.get(self.input_index).ok_or(VmError::BadValue)
    }
}

/// Context for evaluating a consensus program against a block header.
pub struct BlockContext<'a> {
    pub block: &'a Block,
    pub prev_block: &'a Block,
}

/// Either of the two execution contexts.
pub enum ExecContext<'a> {
    Tx(TxContext<'a>),
    Block(BlockContext<'a>),
}
