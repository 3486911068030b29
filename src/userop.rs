use crate::types::{ModuleVersion, SafeOperation};
use alloy::primitives::{Address, B256, Bytes, U256, aliases::U48};
use alloy::sol_types::{SolStruct, eip712_domain};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// The module hashes a `SafeOp` struct, not the raw user operation. The two module
// versions declare different field types/order, so each gets its own sol! block; the
// struct name must stay `SafeOp` in both for the typehash to match.
mod v06 {
    alloy::sol! {
        struct SafeOp {
            address safe;
            uint256 nonce;
            bytes initCode;
            bytes callData;
            uint256 callGasLimit;
            uint256 verificationGasLimit;
            uint256 preVerificationGas;
            uint256 maxFeePerGas;
            uint256 maxPriorityFeePerGas;
            bytes paymasterAndData;
            uint48 validAfter;
            uint48 validUntil;
            address entryPoint;
        }
    }
}

mod v07 {
    alloy::sol! {
        struct SafeOp {
            address safe;
            uint256 nonce;
            bytes initCode;
            bytes callData;
            uint128 verificationGasLimit;
            uint128 callGasLimit;
            uint256 preVerificationGas;
            uint128 maxPriorityFeePerGas;
            uint128 maxFeePerGas;
            bytes paymasterAndData;
            uint48 validAfter;
            uint48 validUntil;
            address entryPoint;
        }
    }
}

/// Upper bound of the module's `uint48` validity-window fields.
pub const MAX_VALIDITY_TIMESTAMP: u64 = (1 << 48) - 1;

/// The module carries `validAfter`/`validUntil` as `uint48`, both in the signed
/// struct and in the combined signature; larger values cannot be represented.
pub fn check_validity_window(valid_after: u64, valid_until: u64) -> Result<()> {
    for (field, value) in [("validAfter", valid_after), ("validUntil", valid_until)] {
        if value > MAX_VALIDITY_TIMESTAMP {
            anyhow::bail!("{field} {value} does not fit in uint48");
        }
    }
    Ok(())
}

/// EIP-712 digest the owners sign. Domain: `{chainId, verifyingContract: module}`.
pub fn safe_operation_hash(
    op: &SafeOperation,
    module_version: ModuleVersion,
    module: Address,
    chain_id: u64,
) -> Result<B256> {
    check_validity_window(op.valid_after, op.valid_until)?;

    let domain = eip712_domain! {
        chain_id: chain_id,
        verifying_contract: module,
    };

    let hash = match module_version {
        ModuleVersion::V0_2_0 => v06::SafeOp {
            safe: op.sender,
            nonce: op.nonce,
            initCode: op.init_code.clone(),
            callData: op.call_data.clone(),
            callGasLimit: op.call_gas_limit,
            verificationGasLimit: op.verification_gas_limit,
            preVerificationGas: op.pre_verification_gas,
            maxFeePerGas: op.max_fee_per_gas,
            maxPriorityFeePerGas: op.max_priority_fee_per_gas,
            paymasterAndData: op.paymaster_and_data.clone(),
            validAfter: U48::from(op.valid_after),
            validUntil: U48::from(op.valid_until),
            entryPoint: op.entry_point,
        }
        .eip712_signing_hash(&domain),
        ModuleVersion::V0_3_0 => v07::SafeOp {
            safe: op.sender,
            nonce: op.nonce,
            initCode: op.init_code.clone(),
            callData: op.call_data.clone(),
            verificationGasLimit: gas_u128(op.verification_gas_limit, "verificationGasLimit")?,
            callGasLimit: gas_u128(op.call_gas_limit, "callGasLimit")?,
            preVerificationGas: op.pre_verification_gas,
            maxPriorityFeePerGas: gas_u128(op.max_priority_fee_per_gas, "maxPriorityFeePerGas")?,
            maxFeePerGas: gas_u128(op.max_fee_per_gas, "maxFeePerGas")?,
            paymasterAndData: op.paymaster_and_data.clone(),
            validAfter: U48::from(op.valid_after),
            validUntil: U48::from(op.valid_until),
            entryPoint: op.entry_point,
        }
        .eip712_signing_hash(&domain),
    };
    Ok(hash)
}

fn gas_u128(value: U256, field: &'static str) -> Result<u128> {
    u128::try_from(value).ok().with_context(|| format!("{field} exceeds uint128"))
}

/// Entry point v0.6 wire shape. All quantities cross as 0x-hex strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationV06 {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

/// Entry point v0.7 wire shape (unpacked factory/paymaster fields).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationV07 {
    pub sender: Address,
    pub nonce: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    pub signature: Bytes,
}

/// What actually goes over the bundler wire; shape follows the entry point version.
///
/// Untagged: v0.6 is tried first because its mandatory `initCode`/`paymasterAndData`
/// fields are absent from v0.7 payloads, while the reverse would match spuriously.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum UserOperationWire {
    V06(UserOperationV06),
    V07(UserOperationV07),
}

impl UserOperationWire {
    pub fn sender(&self) -> Address {
        match self {
            UserOperationWire::V06(op) => op.sender,
            UserOperationWire::V07(op) => op.sender,
        }
    }

    pub fn nonce(&self) -> U256 {
        match self {
            UserOperationWire::V06(op) => op.nonce,
            UserOperationWire::V07(op) => op.nonce,
        }
    }
}

/// Converts the canonical operation to the wire shape for its module version,
/// stamping `signature` in.
pub fn to_wire(
    op: &SafeOperation,
    module_version: ModuleVersion,
    signature: Bytes,
) -> UserOperationWire {
    match module_version {
        ModuleVersion::V0_2_0 => UserOperationWire::V06(UserOperationV06 {
            sender: op.sender,
            nonce: op.nonce,
            init_code: op.init_code.clone(),
            call_data: op.call_data.clone(),
            call_gas_limit: op.call_gas_limit,
            verification_gas_limit: op.verification_gas_limit,
            pre_verification_gas: op.pre_verification_gas,
            max_fee_per_gas: op.max_fee_per_gas,
            max_priority_fee_per_gas: op.max_priority_fee_per_gas,
            paymaster_and_data: op.paymaster_and_data.clone(),
            signature,
        }),
        ModuleVersion::V0_3_0 => {
            let (factory, factory_data) = split_init_code(&op.init_code);
            let paymaster = split_paymaster_and_data(&op.paymaster_and_data);
            UserOperationWire::V07(UserOperationV07 {
                sender: op.sender,
                nonce: op.nonce,
                factory,
                factory_data,
                call_data: op.call_data.clone(),
                call_gas_limit: op.call_gas_limit,
                verification_gas_limit: op.verification_gas_limit,
                pre_verification_gas: op.pre_verification_gas,
                max_fee_per_gas: op.max_fee_per_gas,
                max_priority_fee_per_gas: op.max_priority_fee_per_gas,
                paymaster: paymaster.as_ref().map(|p| p.paymaster),
                paymaster_verification_gas_limit: paymaster
                    .as_ref()
                    .map(|p| p.verification_gas_limit),
                paymaster_post_op_gas_limit: paymaster.as_ref().map(|p| p.post_op_gas_limit),
                paymaster_data: paymaster.map(|p| p.data),
                signature,
            })
        }
    }
}

/// `init_code` = factory address followed by its calldata; empty means deployed.
pub fn split_init_code(init_code: &Bytes) -> (Option<Address>, Option<Bytes>) {
    if init_code.len() < 20 {
        return (None, None);
    }
    (
        Some(Address::from_slice(&init_code[..20])),
        Some(Bytes::copy_from_slice(&init_code[20..])),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPaymaster {
    pub paymaster: Address,
    pub verification_gas_limit: U256,
    pub post_op_gas_limit: U256,
    pub data: Bytes,
}

/// v0.7 `paymasterAndData` layout: paymaster (20) | verification gas (16) |
/// post-op gas (16) | data.
pub fn split_paymaster_and_data(blob: &Bytes) -> Option<SplitPaymaster> {
    if blob.len() < 52 {
        return None;
    }
    Some(SplitPaymaster {
        paymaster: Address::from_slice(&blob[..20]),
        verification_gas_limit: U256::from_be_slice(&blob[20..36]),
        post_op_gas_limit: U256::from_be_slice(&blob[36..52]),
        data: Bytes::copy_from_slice(&blob[52..]),
    })
}

/// Inverse of `split_paymaster_and_data`.
pub fn join_paymaster_and_data(
    paymaster: Address,
    verification_gas_limit: U256,
    post_op_gas_limit: U256,
    data: &Bytes,
) -> Bytes {
    let mut out = Vec::with_capacity(52 + data.len());
    out.extend_from_slice(paymaster.as_slice());
    out.extend_from_slice(&verification_gas_limit.to_be_bytes::<32>()[16..]);
    out.extend_from_slice(&post_op_gas_limit.to_be_bytes::<32>()[16..]);
    out.extend_from_slice(data);
    out.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{ENTRYPOINT_V06, ENTRYPOINT_V07, SAFE_4337_MODULE_V02};
    use crate::signatures::SignatureMap;
    use alloy::primitives::address;

    fn sample_op(entry_point: Address) -> SafeOperation {
        SafeOperation {
            sender: address!("00000000000000000000000000000000000000aa"),
            entry_point,
            init_code: Bytes::new(),
            call_data: Bytes::from(vec![0x01, 0x02]),
            nonce: U256::from(1u64),
            call_gas_limit: U256::from(100_000u64),
            verification_gas_limit: U256::from(200_000u64),
            pre_verification_gas: U256::from(50_000u64),
            max_fee_per_gas: U256::from(30u64),
            max_priority_fee_per_gas: U256::from(2u64),
            paymaster_and_data: Bytes::new(),
            valid_after: 0,
            valid_until: 0,
            signatures: SignatureMap::new(),
        }
    }

    #[test]
    fn hash_is_deterministic_and_version_sensitive() {
        let op = sample_op(ENTRYPOINT_V06);
        let module = SAFE_4337_MODULE_V02;

        let a = safe_operation_hash(&op, ModuleVersion::V0_2_0, module, 1).unwrap();
        let b = safe_operation_hash(&op, ModuleVersion::V0_2_0, module, 1).unwrap();
        assert_eq!(a, b);

        let other_version = safe_operation_hash(&op, ModuleVersion::V0_3_0, module, 1).unwrap();
        assert_ne!(a, other_version);

        let other_chain = safe_operation_hash(&op, ModuleVersion::V0_2_0, module, 137).unwrap();
        assert_ne!(a, other_chain);
    }

    #[test]
    fn validity_window_is_part_of_the_digest() {
        let mut op = sample_op(ENTRYPOINT_V06);
        let a = safe_operation_hash(&op, ModuleVersion::V0_2_0, SAFE_4337_MODULE_V02, 1).unwrap();
        op.valid_until = 1_800_000_000;
        let b = safe_operation_hash(&op, ModuleVersion::V0_2_0, SAFE_4337_MODULE_V02, 1).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn oversized_validity_window_is_rejected_not_truncated() {
        let mut op = sample_op(ENTRYPOINT_V06);
        op.valid_until = u64::MAX;
        let err = safe_operation_hash(&op, ModuleVersion::V0_2_0, SAFE_4337_MODULE_V02, 1)
            .unwrap_err()
            .to_string();
        assert!(err.contains("does not fit in uint48"), "{err}");

        op.valid_until = MAX_VALIDITY_TIMESTAMP;
        assert!(safe_operation_hash(&op, ModuleVersion::V0_2_0, SAFE_4337_MODULE_V02, 1).is_ok());
    }

    #[test]
    fn v06_wire_serializes_camel_case_hex() {
        let op = sample_op(ENTRYPOINT_V06);
        let wire = to_wire(&op, ModuleVersion::V0_2_0, Bytes::from(vec![0xff]));
        let value = serde_json::to_value(&wire).unwrap();

        assert_eq!(value["callGasLimit"], "0x186a0");
        assert_eq!(value["initCode"], "0x");
        assert_eq!(value["signature"], "0xff");
        assert!(value.get("factory").is_none());
    }

    #[test]
    fn v07_wire_splits_init_code_and_paymaster_blob() {
        let factory = address!("00000000000000000000000000000000000000f0");
        let paymaster = address!("00000000000000000000000000000000000000e0");

        let mut op = sample_op(ENTRYPOINT_V07);
        let mut init_code = factory.to_vec();
        init_code.extend_from_slice(&[0xab, 0xcd]);
        op.init_code = init_code.into();
        op.paymaster_and_data = join_paymaster_and_data(
            paymaster,
            U256::from(111u64),
            U256::from(222u64),
            &Bytes::from(vec![0x99]),
        );

        let UserOperationWire::V07(wire) = to_wire(&op, ModuleVersion::V0_3_0, Bytes::new())
        else {
            panic!("expected v0.7 wire shape");
        };
        assert_eq!(wire.factory, Some(factory));
        assert_eq!(wire.factory_data, Some(Bytes::from(vec![0xab, 0xcd])));
        assert_eq!(wire.paymaster, Some(paymaster));
        assert_eq!(wire.paymaster_verification_gas_limit, Some(U256::from(111u64)));
        assert_eq!(wire.paymaster_post_op_gas_limit, Some(U256::from(222u64)));
        assert_eq!(wire.paymaster_data, Some(Bytes::from(vec![0x99])));
    }

    #[test]
    fn paymaster_blob_round_trips() {
        let paymaster = address!("00000000000000000000000000000000000000e0");
        let blob = join_paymaster_and_data(
            paymaster,
            U256::from(7u64),
            U256::from(8u64),
            &Bytes::from(vec![0x01, 0x02, 0x03]),
        );
        let split = split_paymaster_and_data(&blob).unwrap();
        assert_eq!(split.paymaster, paymaster);
        assert_eq!(split.verification_gas_limit, U256::from(7u64));
        assert_eq!(split.post_op_gas_limit, U256::from(8u64));
        assert_eq!(split.data, Bytes::from(vec![0x01, 0x02, 0x03]));

        // A bare v0.6-style blob (address only) is not a valid v0.7 blob.
        assert!(split_paymaster_and_data(&Bytes::copy_from_slice(paymaster.as_slice())).is_none());
    }
}
