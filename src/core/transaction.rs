//! Transaction model consumed at the verification boundary.
//!
//! Construction, serialization and asset bookkeeping live with the caller;
//! the machine only reads the fields its introspection opcodes expose and
//! the commitment that selects the program to run.

use crate::errors::VmError;
use crate::types::bytes::Bytes;
use crate::types::hash::Hash;
use crate::vm::context::SigHasher;

/// The only defined signature hash type: commit to the whole transaction.
pub const SIGHASH_ALL: i64 = 0;

/// A transaction as seen by predicate evaluation.
#[derive(Clone, Debug, Default)]
pub struct Transaction {
    pub version: u64,
    /// Earliest millisecond timestamp at which the transaction is valid.
    pub min_time_ms: u64,
    /// Latest millisecond timestamp at which the transaction is valid.
    pub max_time_ms: u64,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

/// One spend or issuance being authorized.
#[derive(Clone, Debug)]
pub struct TxInput {
    /// Commits to the program that gates this input.
    pub commitment: InputCommitment,
    /// Arguments seeded onto the data stack before the program runs.
    pub witness: Vec<Bytes>,
    /// Hash of the input's reference data.
    pub ref_data_hash: Hash,
}

/// What an input commits to.
///
/// The `Unknown` variant carries commitment kinds introduced after this
/// build; verification rejects them as unsupported rather than guessing.
#[derive(Clone, Debug)]
pub enum InputCommitment {
    Spend(SpendCommitment),
    Issuance(IssuanceCommitment),
    Unknown(u8),
}

/// A previous output being spent.
#[derive(Clone, Debug)]
pub struct SpendCommitment {
    pub asset_id: Hash,
    pub amount: u64,
    pub vm_version: u64,
    pub control_program: Bytes,
}

/// New units of an asset being issued.
#[derive(Clone, Debug)]
pub struct IssuanceCommitment {
    pub asset_id: Hash,
    pub amount: u64,
    pub vm_version: u64,
    pub issuance_program: Bytes,
}

/// A transaction output.
#[derive(Clone, Debug)]
pub struct TxOutput {
    pub asset_id: Hash,
    pub amount: u64,
    pub control_program: Bytes,
    pub ref_data_hash: Hash,
}

impl InputCommitment {
    fn kind(&self) -> u8 {
        match self {
            InputCommitment::Spend(_) => 0,
            InputCommitment::Issuance(_) => 1,
            InputCommitment::Unknown(kind) => *kind,
        }
    }

    pub fn asset_id(&self) -> Result<&Hash, VmError> {
        match self {
            InputCommitment::Spend(c) => Ok(&c.asset_id),
            InputCommitment::Issuance(c) => Ok(&c.asset_id),
            InputCommitment::Unknown(_) => Err(VmError::UnsupportedTx),
        }
    }

    pub fn amount(&self) -> Result<u64, VmError> {
        match self {
            InputCommitment::Spend(c) => Ok(c.amount),
            InputCommitment::Issuance(c) => Ok(c.amount),
            InputCommitment::Unknown(_) => Err(VmError::UnsupportedTx),
        }
    }

    pub fn vm_version(&self) -> Result<u64, VmError> {
        match self {
            InputCommitment::Spend(c) => Ok(c.vm_version),
            InputCommitment::Issuance(c) => Ok(c.vm_version),
            InputCommitment::Unknown(_) => Err(VmError::UnsupportedTx),
        }
    }

    /// The program this commitment selects for evaluation.
    pub fn program(&self) -> Result<&Bytes, VmError> {
        match self {
            InputCommitment::Spend(c) => Ok(&c.control_program),
            InputCommitment::Issuance(c) => Ok(&c.issuance_program),
            InputCommitment::Unknown(_) => Err(VmError::UnsupportedTx),
        }
    }
}

impl Transaction {
    /// Signature hash binding an input to this transaction (type ALL).
    ///
    /// Commits to the transaction header fields, the signing input's index
    /// and commitment, and every output. Witnesses are excluded so that
    /// signatures do not invalidate each other.
    pub fn sig_hash(&self, input_index: usize) -> Hash {
        let mut h = Hash::sha3();
        h.update(b"TXSIG");
        h.update(&self.version.to_le_bytes());
        h.update(&self.min_time_ms.to_le_bytes());
        h.update(&self.max_time_ms.to_le_bytes());
        h.update(&(input_index as u64).to_le_bytes());
        if let Some(input) = self.inputs.get(input_index) {
            let c = &input.commitment;
            h.update(&[c.kind()]);
            if let (Ok(asset), Ok(amount), Ok(version), Ok(program)) =
                (c.asset_id(), c.amount(), c.vm_version(), c.program())
            {
                h.update(asset.as_slice());
                h.update(&amount.to_le_bytes());
                h.update(&version.to_le_bytes());
                h.update(&(program.len() as u64).to_le_bytes());
                h.update(program);
            }
            h.update(input.ref_data_hash.as_slice());
        }
        h.update(&(self.outputs.len() as u64).to_le_bytes());
        for out in &self.outputs {
            h.update(out.asset_id.as_slice());
            h.update(&out.amount.to_le_bytes());
            h.update(&(out.control_program.len() as u64).to_le_bytes());
            h.update(&out.control_program);
            h.update(out.ref_data_hash.as_slice());
        }
        h.finalize()
    }
}

/// The standard [`SigHasher`] over a transaction input.
pub struct TxSigHasher<'a> {
    pub tx: &'a Transaction,
    pub input_index: usize,
}

impl SigHasher for TxSigHasher<'_> {
    fn sig_hash(&self, hash_type: i64) -> Result<Hash, VmError> {
        match hash_type {
            SIGHASH_ALL => Ok(self.tx.sig_hash(self.input_index)),
            _ => Err(VmError::UnknownHashType { hash_type }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spend_input(amount: u64) -> TxInput {
        TxInput {
            commitment: InputCommitment::Spend(SpendCommitment {
                asset_id: Hash::zero(),
                amount,
                vm_version: 1,
                control_program: Bytes::from(b"\x51"),
            }),
            witness: vec![],
            ref_data_hash: Hash::zero(),
        }
    }

    fn two_input_tx() -> Transaction {
        Transaction {
            version: 1,
            min_time_ms: 0,
            max_time_ms: 100,
            inputs: vec![spend_input(5), spend_input(7)],
            outputs: vec![TxOutput {
                asset_id: Hash::zero(),
                amount: 12,
                control_program: Bytes::from(b"\x51"),
                ref_data_hash: Hash::zero(),
            }],
        }
    }

    #[test]
    fn sig_hash_is_deterministic() {
        let tx = two_input_tx();
        assert_eq!(tx.sig_hash(0), tx.sig_hash(0));
    }

    #[test]
    fn sig_hash_binds_the_input_index() {
        let tx = two_input_tx();
        assert_ne!(tx.sig_hash(0), tx.sig_hash(1));
    }

    #[test]
    fn sig_hash_ignores_witnesses() {
        let mut tx = two_input_tx();
        let before = tx.sig_hash(0);
        tx.inputs[0].witness.push(Bytes::from(b"sig"));
        assert_eq!(tx.sig_hash(0), before);
    }

    #[test]
    fn sig_hash_covers_outputs() {
        let mut tx = two_input_tx();
        let before = tx.sig_hash(0);
        tx.outputs[0].amount = 13;
        assert_ne!(tx.sig_hash(0), before);
    }

    #[test]
    fn hasher_rejects_unknown_hash_types() {
        let tx = two_input_tx();
        let hasher = TxSigHasher { tx: &tx, input_index: 0 };
        assert!(hasher.sig_hash(SIGHASH_ALL).is_ok());
        assert!(matches!(
            hasher.sig_hash(3),
            Err(VmError::UnknownHashType { hash_type: 3 })
        ));
    }

    #[test]
    fn unknown_commitment_has_no_program() {
        let c = InputCommitment::Unknown(9);
        assert!(matches!(c.program(), Err(VmError::UnsupportedTx)));
        assert!(matches!(c.asset_id(), Err(VmError::UnsupportedTx)));
    }
}
