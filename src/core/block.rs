//! Block header model consumed at the verification boundary.
//!
//! A block is accepted when its witness satisfies the consensus program
//! committed to by its predecessor. Assembly of blocks and chain selection
//! live with the caller.

use crate::types::bytes::Bytes;
use crate::types::hash::Hash;

/// The header fields a consensus program can sign over, plus the program
/// and witness that link consecutive blocks.
#[derive(Clone, Debug, Default)]
pub struct Block {
    pub height: u64,
    pub prev_hash: Hash,
    pub timestamp_ms: u64,
    /// Merkle root of the block's transactions.
    pub tx_root: Hash,
    /// Program the *next* block's witness must satisfy.
    pub consensus_program: Bytes,
    /// Arguments seeded onto the data stack when this block is checked
    /// against its predecessor's consensus program.
    pub witness: Vec<Bytes>,
}

impl Block {
    /// Signature hash over the header fields. The witness is excluded so
    /// that signing the header is possible before the witness exists.
    pub fn sig_hash(&self) -> Hash {
        let mut h = Hash::sha3();
        h.update(b"BLOCKSIG");
        h.update(&self.height.to_le_bytes());
        h.update(self.prev_hash.as_slice());
        h.update(&self.timestamp_ms.to_le_bytes());
        h.update(self.tx_root.as_slice());
        h.update(&(self.consensus_program.len() as u64).to_le_bytes());
        h.update(&self.consensus_program);
        h.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> Block {
        Block {
            height: 7,
            prev_hash: Hash::zero(),
            timestamp_ms: 1234,
            tx_root: Hash::zero(),
            consensus_program: Bytes::from(b"\x51"),
            witness: vec![],
        }
    }

    #[test]
    fn sig_hash_excludes_witness() {
        let mut b = block();
        let before = b.sig_hash();
        b.witness.push(Bytes::from(b"sig"));
        assert_eq!(b.sig_hash(), before);
    }

    #[test]
    fn sig_hash_covers_header_fields() {
        let b = block();
        let mut changed = b.clone();
        changed.height = 8;
        assert_ne!(changed.sig_hash(), b.sig_hash());

        let mut changed = b.clone();
        changed.timestamp_ms = 0;
        assert_ne!(changed.sig_hash(), b.sig_hash());

        let mut changed = b.clone();
        changed.consensus_program = Bytes::from(b"\x00");
        assert_ne!(changed.sig_hash(), b.sig_hash());
    }
}
