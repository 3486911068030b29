//! ERC-4337 account-abstraction pack for Safe smart accounts: build user operations
//! from transaction batches, collect owner and passkey signatures, submit through a
//! bundler, and query operation status.

pub mod account;
pub mod bundler;
pub mod contracts;
pub mod identifier;
pub mod multisend;
pub mod nonce;
pub mod pack;
pub mod paymaster;
pub mod signatures;
pub mod signers;
pub mod types;
pub mod userop;

pub use bundler::{BundlerClient, BundlerMethod, GasEstimation, GasPriceSuggestion};
pub use identifier::OnchainIdentifier;
pub use pack::{AccountConfig, BuildOptions, Safe4337Pack, Safe4337PackConfig};
pub use paymaster::{PaymasterClient, PaymasterOptions};
pub use signatures::{SafeSignature, SignatureMap};
pub use signers::{PackSigner, PasskeyAssertion, PasskeyCoordinates, PasskeySigner, WebAuthnSignature};
pub use types::{MetaTransaction, ModuleVersion, OperationType, SafeOperation};

pub use account::AccountReader;
