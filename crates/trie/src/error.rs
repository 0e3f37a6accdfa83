use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrieError {
    #[error(transparent)]
    RlpDecode(#[from] rlp::DecoderError),
    #[error("invalid node encoding: expected 2 or 17 RLP items, got {0}")]
    InvalidNode(usize),
    #[error("invalid child reference of {0} bytes (expected empty, 32-byte hash or inline node)")]
    InvalidChildRef(usize),
    #[error("invalid nibble value {0:#x}")]
    InvalidNibble(u8),
    #[error("invalid nibble path: {0}")]
    InvalidPath(String),
    #[error("odd-length path of {0} nibbles cannot pack into bytes")]
    OddPath(usize),
}
