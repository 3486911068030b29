use crate::contracts::WEBAUTHN_SHARED_SIGNER;
use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolValue;
use anyhow::{Context, Result};
use std::sync::Arc;

/// P-256 public key of a passkey credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasskeyCoordinates {
    pub x: U256,
    pub y: U256,
}

/// Decoded WebAuthn assertion over an operation hash.
///
/// `client_data_fields` is the client data JSON after the challenge entry, as the
/// on-chain verifier expects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebAuthnSignature {
    pub authenticator_data: Bytes,
    pub client_data_fields: String,
    pub r: U256,
    pub s: U256,
}

impl WebAuthnSignature {
    /// ABI encoding consumed by the WebAuthn signer contract:
    /// `(bytes authenticatorData, string clientDataFields, uint256 r, uint256 s)`.
    pub fn encode(&self) -> Bytes {
        (
            self.authenticator_data.clone(),
            self.client_data_fields.clone(),
            self.r,
            self.s,
        )
            .abi_encode_params()
            .into()
    }
}

/// Produces WebAuthn assertions for a credential. The ceremony itself (authenticator
/// interaction, CBOR parsing) happens outside this crate; implementations receive the
/// operation hash as the challenge.
pub trait PasskeyAssertion: Send + Sync {
    fn assert(&self, challenge: B256) -> Result<WebAuthnSignature>;
}

/// Passkey owner represented on-chain by the shared WebAuthn signer contract.
#[derive(Clone)]
pub struct PasskeySigner {
    coordinates: PasskeyCoordinates,
    shared_signer: Address,
    assertion: Arc<dyn PasskeyAssertion>,
}

impl std::fmt::Debug for PasskeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasskeySigner")
            .field("coordinates", &self.coordinates)
            .field("shared_signer", &self.shared_signer)
            .finish_non_exhaustive()
    }
}

impl PasskeySigner {
    pub fn new(coordinates: PasskeyCoordinates, assertion: Arc<dyn PasskeyAssertion>) -> Self {
        Self {
            coordinates,
            shared_signer: WEBAUTHN_SHARED_SIGNER,
            assertion,
        }
    }

    /// Overrides the shared signer contract address (non-default deployments).
    pub fn with_shared_signer(mut self, shared_signer: Address) -> Self {
        self.shared_signer = shared_signer;
        self
    }

    pub fn coordinates(&self) -> PasskeyCoordinates {
        self.coordinates
    }

    /// The address this signer occupies in the owner set and signature map.
    pub fn address(&self) -> Address {
        self.shared_signer
    }

    pub fn sign_digest(&self, digest: B256) -> Result<Bytes> {
        let assertion = self
            .assertion
            .assert(digest)
            .context("webauthn assertion")?;
        Ok(assertion.encode())
    }
}

/// A signer the pack can collect a signature from.
#[derive(Debug, Clone)]
pub enum PackSigner {
    /// ECDSA owner key; signs the EIP-712 digest directly (v in {27, 28}).
    Owner(PrivateKeySigner),
    /// Passkey owner; produces an EIP-1271 contract signature for the shared signer.
    Passkey(PasskeySigner),
}

impl PackSigner {
    pub fn address(&self) -> Address {
        match self {
            PackSigner::Owner(key) => key.address(),
            PackSigner::Passkey(passkey) => passkey.address(),
        }
    }

    pub fn is_contract_signature(&self) -> bool {
        matches!(self, PackSigner::Passkey(_))
    }

    pub fn sign_digest(&self, digest: B256) -> Result<Bytes> {
        match self {
            PackSigner::Owner(key) => {
                let signature = key.sign_hash_sync(&digest).context("sign operation hash")?;
                Ok(Bytes::from(signature.as_bytes().to_vec()))
            }
            PackSigner::Passkey(passkey) => passkey.sign_digest(digest),
        }
    }
}
