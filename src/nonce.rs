use alloy::primitives::{U256, aliases::U192};

/// Encodes an entry-point nonce from a 192-bit key and a 64-bit sequence:
/// `key << 64 | sequence`. Key 0 is the default sequential channel that
/// `EntryPoint.getNonce(sender, 0)` tracks; any other key opens an independent
/// ordering lane.
pub fn encode_nonce(key: U192, sequence: u64) -> U256 {
    (U256::from(key) << 64) | U256::from(sequence)
}
