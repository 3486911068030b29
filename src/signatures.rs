use alloy::primitives::{Address, B256, Bytes, U256};

/// One owner's signature over the operation hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeSignature {
    pub signer: Address,
    pub data: Bytes,
    /// EIP-1271 contract signature (v = 0 static part + length-prefixed dynamic part),
    /// used for passkey shared-signer owners.
    pub is_contract_signature: bool,
}

/// Signatures keyed by signer address, one entry per signer.
///
/// Insertion order is signing order and is preserved; re-adding an existing signer
/// replaces only that signer's entry. Lookup is case-insensitive on the address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureMap {
    entries: Vec<SafeSignature>,
}

impl SignatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, signature: SafeSignature) {
        match self.entries.iter_mut().find(|e| e.signer == signature.signer) {
            Some(existing) => *existing = signature,
            None => self.entries.push(signature),
        }
    }

    pub fn get(&self, signer: Address) -> Option<&SafeSignature> {
        self.entries.iter().find(|e| e.signer == signer)
    }

    /// Entries in signing order.
    pub fn iter(&self) -> impl Iterator<Item = &SafeSignature> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Packs the map into the module's combined signature:
    /// `validAfter (uint48) | validUntil (uint48) | signature bytes`.
    ///
    /// The Safe checks signatures in ascending signer order, so entries are sorted by
    /// address here regardless of signing order. ECDSA entries contribute their
    /// 65 bytes in place; contract signatures contribute a 65-byte static part
    /// (padded signer | dynamic offset | 0x00) with the length-prefixed payload
    /// appended after all static parts.
    pub fn encode_combined(&self, valid_after: u64, valid_until: u64) -> Bytes {
        let mut sorted: Vec<&SafeSignature> = self.entries.iter().collect();
        sorted.sort_by_key(|e| e.signer);

        let static_len = sorted.len() * 65;
        let mut static_part = Vec::with_capacity(static_len);
        let mut dynamic_part = Vec::new();

        for entry in sorted {
            if entry.is_contract_signature {
                let offset = static_len + dynamic_part.len();
                static_part.extend_from_slice(B256::left_padding_from(entry.signer.as_slice()).as_slice());
                static_part.extend_from_slice(&U256::from(offset).to_be_bytes::<32>());
                static_part.push(0x00);
                dynamic_part.extend_from_slice(&U256::from(entry.data.len()).to_be_bytes::<32>());
                dynamic_part.extend_from_slice(&entry.data);
            } else {
                static_part.extend_from_slice(&entry.data);
            }
        }

        let mut out = Vec::with_capacity(12 + static_part.len() + dynamic_part.len());
        out.extend_from_slice(&uint48_be(valid_after));
        out.extend_from_slice(&uint48_be(valid_until));
        out.extend_from_slice(&static_part);
        out.extend_from_slice(&dynamic_part);
        out.into()
    }
}

fn uint48_be(value: u64) -> [u8; 6] {
    let be = value.to_be_bytes();
    [be[2], be[3], be[4], be[5], be[6], be[7]]
}
