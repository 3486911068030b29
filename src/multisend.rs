use crate::types::MetaTransaction;
use alloy::primitives::{Bytes, U256};

/// Packs a transaction batch into the MultiSend wire format, preserving input order.
///
/// Per entry: operation (1 byte) | to (20 bytes) | value (32 bytes) | data length
/// (32 bytes) | data. The result is the `transactions` argument of
/// `MultiSend.multiSend`, which the caller wraps in a delegate-call.
pub fn encode_multi_send(transactions: &[MetaTransaction]) -> Bytes {
    let mut out = Vec::with_capacity(transactions.iter().map(|t| 85 + t.data.len()).sum());
    for tx in transactions {
        out.push(tx.operation as u8);
        out.extend_from_slice(tx.to.as_slice());
        out.extend_from_slice(&tx.value.to_be_bytes::<32>());
        out.extend_from_slice(&U256::from(tx.data.len()).to_be_bytes::<32>());
        out.extend_from_slice(&tx.data);
    }
    out.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OperationType;
    use alloy::primitives::{Address, address};

    const A: Address = address!("00000000000000000000000000000000000000aa");
    const B: Address = address!("00000000000000000000000000000000000000bb");

    #[test]
    fn packs_single_call_entry() {
        let tx = MetaTransaction {
            to: A,
            value: U256::from(7u64),
            data: Bytes::from(vec![0xde, 0xad]),
            operation: OperationType::Call,
        };
        let packed = encode_multi_send(std::slice::from_ref(&tx));

        assert_eq!(packed.len(), 1 + 20 + 32 + 32 + 2);
        assert_eq!(packed[0], 0);
        assert_eq!(&packed[1..21], A.as_slice());
        assert_eq!(&packed[21..53], &U256::from(7u64).to_be_bytes::<32>());
        assert_eq!(&packed[53..85], &U256::from(2u64).to_be_bytes::<32>());
        assert_eq!(&packed[85..], &[0xde, 0xad]);
    }

    #[test]
    fn preserves_input_order_and_operation_byte() {
        let txs = vec![
            MetaTransaction {
                to: A,
                value: U256::ZERO,
                data: Bytes::new(),
                operation: OperationType::DelegateCall,
            },
            MetaTransaction::call(B, vec![0x01]),
        ];
        let packed = encode_multi_send(&txs);

        // First entry: delegate-call to A with empty data.
        assert_eq!(packed[0], 1);
        assert_eq!(&packed[1..21], A.as_slice());
        // Second entry starts right after the first's 85-byte header.
        assert_eq!(packed[85], 0);
        assert_eq!(&packed[86..106], B.as_slice());
        assert_eq!(*packed.last().unwrap(), 0x01);
    }

    #[test]
    fn empty_batch_packs_to_empty() {
        assert!(encode_multi_send(&[]).is_empty());
    }
}
