use ethereum_types::H256;
use keccak_hash::keccak;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

/// Block-identifying metadata read once per snapshot run. The chain store
/// uses its own schema, so the header carries the fields the snapshot
/// pipeline consumes rather than the full execution-layer header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub parent_hash: H256,
    pub state_root: H256,
    pub number: u64,
    pub timestamp: u64,
}

impl BlockHeader {
    /// keccak-256 of the RLP encoding; the header's identity.
    pub fn hash(&self) -> H256 {
        keccak(rlp::encode(self))
    }
}

impl Encodable for BlockHeader {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(4);
        s.append(&self.parent_hash);
        s.append(&self.state_root);
        s.append(&self.number);
        s.append(&self.timestamp);
    }
}

impl Decodable for BlockHeader {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(Self {
            parent_hash: rlp.val_at(0)?,
            state_root: rlp.val_at(1)?,
            number: rlp.val_at(2)?,
            timestamp: rlp.val_at(3)?,
        })
    }
}
