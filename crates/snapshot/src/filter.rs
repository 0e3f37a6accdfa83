use ethereum_types::Address;
use keccak_hash::keccak;
use snapex_trie::Nibbles;

/// Address-selective traversal filter.
///
/// State-trie accounts are keyed by the keccak of their address, so the
/// filter precomputes the 64-nibble key path of every watched address and
/// prunes any subtree whose position cannot be a prefix of one of them.
/// Branch and extension nodes on the way to a watched leaf pass the filter
/// (they are the Merkle proof of the leaf); other leaves never do. Storage
/// tries and code of a watched account are exempt from filtering.
#[derive(Debug, Clone)]
pub struct AddressFilter {
    watched_paths: Vec<Nibbles>,
}

impl AddressFilter {
    pub fn new(addresses: &[Address]) -> Self {
        let watched_paths = addresses
            .iter()
            .map(|address| Nibbles::from_bytes(keccak(address).as_bytes()))
            .collect();
        Self { watched_paths }
    }

    pub fn len(&self) -> usize {
        self.watched_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched_paths.is_empty()
    }

    /// True when some watched key lies below `prefix`, i.e. the subtree at
    /// `prefix` is worth entering.
    pub fn allows(&self, prefix: &Nibbles) -> bool {
        self.watched_paths
            .iter()
            .any(|path| prefix.is_prefix_of(path))
    }

    /// Exact-match test for a leaf's full 64-nibble key.
    pub fn matches_leaf(&self, full_path: &Nibbles) -> bool {
        self.watched_paths.iter().any(|path| path == full_path)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn allows_prefixes_of_watched_keys_only() {
        let address = Address::repeat_byte(0x11);
        let filter = AddressFilter::new(&[address]);
        let full = Nibbles::from_bytes(keccak(address).as_bytes());
        assert_eq!(full.len(), 64);

        assert!(filter.allows(&Nibbles::new()));
        assert!(filter.allows(&full.slice(0, 1)));
        assert!(filter.allows(&full.slice(0, 13)));
        assert!(filter.allows(&full));
        assert!(filter.matches_leaf(&full));

        // Flip the first nibble: a diverging prefix must be pruned.
        let mut diverging = vec![(full.at(0) + 1) % 16];
        diverging.extend_from_slice(&full.as_slice()[1..8]);
        let diverging = Nibbles::from_nibbles(&diverging).unwrap();
        assert!(!filter.allows(&diverging));
        assert!(!filter.matches_leaf(&full.slice(0, 63)));
    }

    #[test]
    fn empty_filter_allows_nothing() {
        let filter = AddressFilter::new(&[]);
        assert!(filter.is_empty());
        assert!(!filter.allows(&Nibbles::new()));
        assert!(!filter.matches_leaf(&Nibbles::from_bytes(&[0u8; 32])));
    }

    #[test]
    fn multiple_addresses_union_their_paths() {
        let a = Address::repeat_byte(0x22);
        let b = Address::repeat_byte(0x33);
        let filter = AddressFilter::new(&[a, b]);
        assert_eq!(filter.len(), 2);
        let path_a = Nibbles::from_bytes(keccak(a).as_bytes());
        let path_b = Nibbles::from_bytes(keccak(b).as_bytes());
        assert!(filter.matches_leaf(&path_a));
        assert!(filter.matches_leaf(&path_b));
        assert!(filter.allows(&path_b.slice(0, 20)));
    }
}
