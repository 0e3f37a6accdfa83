use crate::error::TrieError;

/// A trie path: an ordered sequence of nibbles (4-bit values), one nibble
/// per stored byte. Paths in a state or storage trie are at most 64 nibbles
/// long, so the unpacked representation is cheap and keeps indexing trivial.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nibbles {
    data: Vec<u8>,
}

impl Nibbles {
    /// The empty path (the trie root position).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a path from raw nibble values. Fails on values above 0xf.
    pub fn from_nibbles(nibbles: &[u8]) -> Result<Self, TrieError> {
        if let Some(&bad) = nibbles.iter().find(|n| **n > 0xf) {
            return Err(TrieError::InvalidNibble(bad));
        }
        Ok(Self {
            data: nibbles.to_vec(),
        })
    }

    /// For nibble values already validated elsewhere in the crate.
    pub(crate) fn from_vec_unchecked(data: Vec<u8>) -> Self {
        debug_assert!(data.iter().all(|n| *n <= 0xf));
        Self { data }
    }

    /// Splits each input byte into two nibbles, high first. A 32-byte key
    /// becomes the canonical 64-nibble path.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = Vec::with_capacity(bytes.len() * 2);
        for b in bytes {
            data.push(b >> 4);
            data.push(b & 0x0f);
        }
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The nibble at `i`. Panics when out of range.
    pub fn at(&self, i: usize) -> u8 {
        self.data[i]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn append(&mut self, nibble: u8) {
        debug_assert!(nibble <= 0xf);
        self.data.push(nibble);
    }

    /// Returns a copy of self with `nibble` appended.
    pub fn append_new(&self, nibble: u8) -> Self {
        let mut out = self.clone();
        out.append(nibble);
        out
    }

    pub fn extend(&mut self, other: &Nibbles) {
        self.data.extend_from_slice(&other.data);
    }

    /// Concatenates self and `other` into a new path.
    pub fn concat(&self, other: &Nibbles) -> Self {
        let mut out = self.clone();
        out.extend(other);
        out
    }

    /// The sub-path `[start..end)` (clamped to the path length).
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.data.len());
        let start = start.min(end);
        Self {
            data: self.data[start..end].to_vec(),
        }
    }

    /// The sub-path after the first `offset` nibbles.
    pub fn offset(&self, offset: usize) -> Self {
        self.slice(offset, self.data.len())
    }

    /// True when self is a (non-strict) prefix of `other`.
    pub fn is_prefix_of(&self, other: &Nibbles) -> bool {
        other.data.len() >= self.data.len() && other.data[..self.data.len()] == self.data[..]
    }

    /// Number of leading nibbles shared with `other`.
    pub fn count_prefix(&self, other: &Nibbles) -> usize {
        self.data
            .iter()
            .zip(other.data.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Lowercase hex, two characters per nibble. Always even-length, which
    /// is what the recovery journal format requires.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.data)
    }

    /// Inverse of [`Nibbles::to_hex`].
    pub fn from_hex(s: &str) -> Result<Self, TrieError> {
        let data = hex::decode(s).map_err(|_| TrieError::InvalidPath(s.to_string()))?;
        if let Some(&bad) = data.iter().find(|n| **n > 0xf) {
            return Err(TrieError::InvalidNibble(bad));
        }
        Ok(Self { data })
    }

    /// Packs pairs of nibbles back into bytes. Only valid for even-length
    /// paths (a full 64-nibble leaf key packs into its 32-byte hash).
    pub fn to_packed_bytes(&self) -> Result<Vec<u8>, TrieError> {
        if self.data.len() % 2 != 0 {
            return Err(TrieError::OddPath(self.data.len()));
        }
        Ok(self
            .data
            .chunks(2)
            .map(|pair| (pair[0] << 4) | pair[1])
            .collect())
    }

    /// Hex-prefix (compact) encoding per the Ethereum yellow paper:
    ///
    /// | node type | path length | prefix |
    /// |-----------|-------------|--------|
    /// | extension | even        | 0x0    |
    /// | extension | odd         | 0x1    |
    /// | leaf      | even        | 0x2    |
    /// | leaf      | odd         | 0x3    |
    pub fn encode_compact(&self, is_leaf: bool) -> Vec<u8> {
        let mut flag = if is_leaf { 0x20u8 } else { 0x00 };
        let (mut out, rest) = if self.data.len() % 2 == 1 {
            flag |= 0x10 | self.data[0];
            (vec![flag], &self.data[1..])
        } else {
            (vec![flag], &self.data[..])
        };
        out.extend(rest.chunks(2).map(|pair| (pair[0] << 4) | pair[1]));
        out
    }

    /// Decodes a hex-prefix encoded key fragment. Returns the path and
    /// whether the fragment belongs to a leaf.
    pub fn decode_compact(compact: &[u8]) -> Result<(Self, bool), TrieError> {
        let Some(&flag) = compact.first() else {
            return Err(TrieError::InvalidPath("empty compact encoding".into()));
        };
        if flag >> 6 != 0 {
            return Err(TrieError::InvalidPath(format!(
                "bad hex-prefix flag {flag:#x}"
            )));
        }
        let is_leaf = flag & 0x20 != 0;
        let is_odd = flag & 0x10 != 0;
        let mut data = Vec::with_capacity(compact.len() * 2);
        if is_odd {
            data.push(flag & 0x0f);
        }
        for b in &compact[1..] {
            data.push(b >> 4);
            data.push(b & 0x0f);
        }
        Ok((Self { data }, is_leaf))
    }
}

impl std::fmt::Display for Nibbles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
