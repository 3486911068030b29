use crate::contracts;
use crate::signatures::SignatureMap;
use alloy::primitives::{Address, Bytes, U256};

/// Call semantics of a batch entry, matching the Safe `operation` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OperationType {
    Call = 0,
    DelegateCall = 1,
}

/// One entry of a transaction batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTransaction {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: OperationType,
}

impl MetaTransaction {
    /// Plain call with no value, the overwhelmingly common case.
    pub fn call(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            value: U256::ZERO,
            data: data.into(),
            operation: OperationType::Call,
        }
    }
}

/// Supported Safe 4337 module versions. Closed set: each version is hard-paired with
/// the entry point release it was audited against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleVersion {
    V0_2_0,
    V0_3_0,
}

impl ModuleVersion {
    pub fn module_address(self) -> Address {
        match self {
            ModuleVersion::V0_2_0 => contracts::SAFE_4337_MODULE_V02,
            ModuleVersion::V0_3_0 => contracts::SAFE_4337_MODULE_V03,
        }
    }

    pub fn entry_point(self) -> Address {
        match self {
            ModuleVersion::V0_2_0 => contracts::ENTRYPOINT_V06,
            ModuleVersion::V0_3_0 => contracts::ENTRYPOINT_V07,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModuleVersion::V0_2_0 => "0.2.0",
            ModuleVersion::V0_3_0 => "0.3.0",
        }
    }
}

/// A user operation being assembled for a Safe account.
///
/// The v0.6-style blobs (`init_code`, `paymaster_and_data`) are canonical; the v0.7
/// wire shape is derived by splitting them (see `userop`). Once submitted to a bundler
/// the operation is identified by its user-operation hash and must not be mutated.
#[derive(Debug, Clone)]
pub struct SafeOperation {
    pub sender: Address,
    pub entry_point: Address,
    /// Factory address followed by the deployment calldata; empty for deployed accounts.
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub nonce: U256,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    /// Seconds since epoch; 0 means "no lower bound".
    pub valid_after: u64,
    /// Seconds since epoch; 0 means "no expiry".
    pub valid_until: u64,
    pub signatures: SignatureMap,
}

impl SafeOperation {
    /// Final packed signature: `validAfter (6) | validUntil (6) | sorted signatures`.
    pub fn encoded_signatures(&self) -> Bytes {
        self.signatures
            .encode_combined(self.valid_after, self.valid_until)
    }
}
