use crate::account::AccountReader;
use crate::bundler::BundlerClient;
use crate::contracts::{
    self, IERC20, IMultiSend, ISafe, ISafe4337Module, ISafeModuleSetup, ISafeProxyFactory,
    ISafeWebAuthnSharedSigner,
};
use crate::identifier::OnchainIdentifier;
use crate::multisend::encode_multi_send;
use crate::paymaster::{PaymasterClient, PaymasterOptions};
use crate::signatures::{SafeSignature, SignatureMap};
use crate::signers::{PackSigner, PasskeyCoordinates};
use crate::types::{MetaTransaction, ModuleVersion, OperationType, SafeOperation};
use crate::userop;
use alloy::primitives::{Address, B256, Bytes, U256, aliases::U176, aliases::U192, keccak256};
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};

/// Which Safe account the pack operates on.
#[derive(Debug, Clone)]
pub enum AccountConfig {
    /// An already deployed Safe; its compatibility is validated up front.
    Existing { safe: Address },
    /// A counterfactual Safe; the pack predicts its address and carries the
    /// deployment payload in `init_code` until the first operation deploys it.
    Counterfactual {
        owners: Vec<Address>,
        threshold: u64,
        salt_nonce: U256,
        /// Passkey owner to configure at deployment via the shared WebAuthn signer.
        passkey: Option<PasskeyCoordinates>,
    },
}

#[derive(Debug, Clone)]
pub struct Safe4337PackConfig {
    pub account: AccountConfig,
    pub module_version: ModuleVersion,
    /// Overrides the canonical module deployment address.
    pub module_address: Option<Address>,
    /// Explicitly selected entry point; must be bundler-supported and match the
    /// module version.
    pub entry_point: Option<Address>,
    pub paymaster: Option<PaymasterOptions>,
    /// Analytics fingerprint appended to every operation's call-data.
    pub identifier: Option<OnchainIdentifier>,
}

impl Safe4337PackConfig {
    pub fn existing(safe: Address, module_version: ModuleVersion) -> Self {
        Self {
            account: AccountConfig::Existing { safe },
            module_version,
            module_address: None,
            entry_point: None,
            paymaster: None,
            identifier: None,
        }
    }
}

/// Per-operation knobs for [`Safe4337Pack::build_operation`].
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Overrides the entry-point-fetched nonce; build one with
    /// [`crate::nonce::encode_nonce`] for keyed lanes.
    pub custom_nonce: Option<U256>,
    /// ERC-20 paymaster mode only: appends `approve(paymaster, amount)` to this
    /// batch. The config-level amount covers deployment, not regular batches.
    pub amount_to_approve: Option<U256>,
    pub valid_after: Option<u64>,
    pub valid_until: Option<u64>,
}

/// Entry point of the crate: validates a Safe account against the 4337 module,
/// builds user operations from transaction batches, collects signatures, and talks
/// to the bundler.
#[derive(Debug)]
pub struct Safe4337Pack {
    reader: AccountReader,
    bundler: BundlerClient,
    paymaster_client: Option<PaymasterClient>,
    paymaster: Option<PaymasterOptions>,
    identifier: Option<OnchainIdentifier>,
    chain_id: u64,
    safe: Address,
    deployed: bool,
    init_code: Bytes,
    module: Address,
    module_version: ModuleVersion,
    entry_point: Address,
}

impl Safe4337Pack {
    /// Validates account and bundler compatibility, resolving the counterfactual
    /// deployment payload when needed. Every incompatibility surfaces here, before
    /// any operation is built or submitted.
    pub async fn new(
        reader: AccountReader,
        bundler: BundlerClient,
        config: Safe4337PackConfig,
    ) -> Result<Self> {
        let chain_id = reader.chain_id().await?;
        let module = config
            .module_address
            .unwrap_or_else(|| config.module_version.module_address());
        let entry_point =
            resolve_entry_point(&bundler, config.module_version, config.entry_point).await?;

        let (safe, deployed, init_code) = match &config.account {
            AccountConfig::Existing { safe } => {
                validate_existing_account(&reader, *safe, module).await?;
                (*safe, true, Bytes::new())
            }
            AccountConfig::Counterfactual {
                owners,
                threshold,
                salt_nonce,
                passkey,
            } => {
                let deployment = plan_deployment(
                    &reader,
                    owners,
                    *threshold,
                    *salt_nonce,
                    *passkey,
                    module,
                    config.paymaster.as_ref(),
                )
                .await?;
                tracing::debug!(
                    safe = %deployment.predicted,
                    module = %module,
                    "prepared counterfactual Safe deployment"
                );
                (deployment.predicted, false, deployment.init_code)
            }
        };

        let paymaster_client = match &config.paymaster {
            Some(PaymasterOptions::Sponsored { paymaster_url, .. }) => {
                Some(PaymasterClient::new(paymaster_url.clone()))
            }
            _ => None,
        };

        Ok(Self {
            reader,
            bundler,
            paymaster_client,
            paymaster: config.paymaster,
            identifier: config.identifier,
            chain_id,
            safe,
            deployed,
            init_code,
            module,
            module_version: config.module_version,
            entry_point,
        })
    }

    pub fn address(&self) -> Address {
        self.safe
    }

    pub fn is_deployed(&self) -> bool {
        self.deployed
    }

    pub fn entry_point(&self) -> Address {
        self.entry_point
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Builds a signable operation from a transaction batch.
    ///
    /// A single transaction is encoded directly; a larger batch goes through
    /// MultiSend wrapped in a delegate-call. A per-operation approval amount
    /// appends `approve(paymaster, amount)` to the batch (ERC-20 paymaster mode).
    pub async fn build_operation(
        &self,
        transactions: &[MetaTransaction],
        options: BuildOptions,
    ) -> Result<SafeOperation> {
        userop::check_validity_window(
            options.valid_after.unwrap_or(0),
            options.valid_until.unwrap_or(0),
        )?;

        let mut batch = transactions.to_vec();
        if let Some(amount) = options.amount_to_approve {
            let Some(PaymasterOptions::Erc20 {
                paymaster_address,
                paymaster_token_address,
                ..
            }) = &self.paymaster
            else {
                anyhow::bail!("amount_to_approve requires an ERC-20 paymaster");
            };
            batch.push(MetaTransaction::call(
                *paymaster_token_address,
                IERC20::approveCall {
                    spender: *paymaster_address,
                    amount,
                }
                .abi_encode(),
            ));
        }
        if batch.is_empty() {
            anyhow::bail!("cannot build a user operation from an empty transaction batch");
        }

        let mut call_data = execute_user_op_call_data(&batch);
        if let Some(identifier) = &self.identifier {
            call_data = identifier.append_to(call_data);
        }

        let nonce = match options.custom_nonce {
            Some(nonce) => nonce,
            None => {
                self.reader
                    .entry_point_nonce(self.entry_point, self.safe, U192::ZERO)
                    .await?
            }
        };

        let fees = self.bundler.gas_price().await.context("bundler gas price")?;

        let mut op = SafeOperation {
            sender: self.safe,
            entry_point: self.entry_point,
            init_code: self.init_code.clone(),
            call_data,
            nonce,
            call_gas_limit: U256::ZERO,
            verification_gas_limit: U256::ZERO,
            pre_verification_gas: U256::ZERO,
            max_fee_per_gas: fees.fast.max_fee_per_gas,
            max_priority_fee_per_gas: fees.fast.max_priority_fee_per_gas,
            paymaster_and_data: self.initial_paymaster_and_data(),
            valid_after: options.valid_after.unwrap_or(0),
            valid_until: options.valid_until.unwrap_or(0),
            signatures: SignatureMap::new(),
        };

        self.estimate_gas(&mut op).await?;

        if let Some(PaymasterOptions::Sponsored {
            sponsorship_policy_id,
            ..
        }) = &self.paymaster
        {
            self.apply_sponsorship(&mut op, sponsorship_policy_id.as_deref())
                .await?;
        }

        Ok(op)
    }

    /// EIP-712 digest of the operation under the module's domain.
    pub fn operation_hash(&self, op: &SafeOperation) -> Result<B256> {
        userop::safe_operation_hash(op, self.module_version, self.module, self.chain_id)
    }

    /// Signs the operation and records the entry in its signature map. Entries from
    /// other signers (including ones that arrived with an externally supplied
    /// operation) are preserved.
    pub fn sign_operation(&self, op: &mut SafeOperation, signer: &PackSigner) -> Result<()> {
        let digest = self.operation_hash(op)?;
        let data = signer.sign_digest(digest)?;
        op.signatures.add(SafeSignature {
            signer: signer.address(),
            data,
            is_contract_signature: signer.is_contract_signature(),
        });
        Ok(())
    }

    /// Submits the signed operation; the returned user-operation hash is the
    /// canonical identifier for subsequent status queries.
    pub async fn execute_operation(&self, op: &SafeOperation) -> Result<B256> {
        if op.signatures.is_empty() {
            anyhow::bail!("cannot submit an unsigned user operation");
        }
        let wire = userop::to_wire(op, self.module_version, op.encoded_signatures());
        self.bundler
            .send_user_operation(&wire, self.entry_point)
            .await
            .context("bundler send user operation")
    }

    pub async fn get_user_operation_by_hash(
        &self,
        hash: B256,
    ) -> Result<Option<crate::bundler::UserOperationByHash>> {
        self.bundler.get_user_operation_by_hash(hash).await
    }

    pub async fn get_user_operation_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<crate::bundler::UserOperationReceipt>> {
        self.bundler.get_user_operation_receipt(hash).await
    }

    pub async fn get_supported_entry_points(&self) -> Result<Vec<Address>> {
        self.bundler.supported_entry_points().await
    }

    fn initial_paymaster_and_data(&self) -> Bytes {
        match (&self.paymaster, self.module_version) {
            (Some(PaymasterOptions::Erc20 { paymaster_address, .. }), ModuleVersion::V0_2_0) => {
                Bytes::copy_from_slice(paymaster_address.as_slice())
            }
            (Some(PaymasterOptions::Erc20 { paymaster_address, .. }), ModuleVersion::V0_3_0) => {
                userop::join_paymaster_and_data(
                    *paymaster_address,
                    U256::ZERO,
                    U256::ZERO,
                    &Bytes::new(),
                )
            }
            _ => Bytes::new(),
        }
    }

    async fn estimate_gas(&self, op: &mut SafeOperation) -> Result<()> {
        let wire = userop::to_wire(op, self.module_version, estimation_signature());
        let estimate = self
            .bundler
            .estimate_user_operation_gas(&wire, self.entry_point)
            .await
            .context("bundler gas estimation")?;

        op.call_gas_limit = estimate.call_gas_limit;
        op.verification_gas_limit = estimate.verification_gas_limit;
        op.pre_verification_gas = estimate.pre_verification_gas;

        // v0.7 carries the paymaster verification gas inside the packed blob.
        if self.module_version == ModuleVersion::V0_3_0
            && let Some(paymaster_gas) = estimate.paymaster_verification_gas_limit
            && let Some(split) = userop::split_paymaster_and_data(&op.paymaster_and_data)
        {
            op.paymaster_and_data = userop::join_paymaster_and_data(
                split.paymaster,
                paymaster_gas,
                split.post_op_gas_limit,
                &split.data,
            );
        }
        Ok(())
    }

    async fn apply_sponsorship(
        &self,
        op: &mut SafeOperation,
        sponsorship_policy_id: Option<&str>,
    ) -> Result<()> {
        let client = self
            .paymaster_client
            .as_ref()
            .context("sponsored paymaster mode without a paymaster client")?;
        let wire = userop::to_wire(op, self.module_version, estimation_signature());
        let sponsorship = client
            .sponsor_user_operation(&wire, self.entry_point, sponsorship_policy_id)
            .await?;

        if let Some(blob) = sponsorship.paymaster_and_data {
            op.paymaster_and_data = blob;
        } else if let Some(paymaster) = sponsorship.paymaster {
            op.paymaster_and_data = userop::join_paymaster_and_data(
                paymaster,
                sponsorship
                    .paymaster_verification_gas_limit
                    .unwrap_or(U256::ZERO),
                sponsorship.paymaster_post_op_gas_limit.unwrap_or(U256::ZERO),
                &sponsorship.paymaster_data.unwrap_or_default(),
            );
        } else {
            anyhow::bail!("paymaster service returned no paymaster data");
        }

        // Sponsors may re-estimate; their numbers win when present.
        if sponsorship.pre_verification_gas.is_some()
            || sponsorship.verification_gas_limit.is_some()
            || sponsorship.call_gas_limit.is_some()
        {
            tracing::debug!(sender = %op.sender, "paymaster service overrode gas estimates");
        }
        if let Some(gas) = sponsorship.pre_verification_gas {
            op.pre_verification_gas = gas;
        }
        if let Some(gas) = sponsorship.verification_gas_limit {
            op.verification_gas_limit = gas;
        }
        if let Some(gas) = sponsorship.call_gas_limit {
            op.call_gas_limit = gas;
        }
        Ok(())
    }
}

/// Resolves the entry point against the bundler's supported list and the module
/// version's pairing.
async fn resolve_entry_point(
    bundler: &BundlerClient,
    module_version: ModuleVersion,
    explicit: Option<Address>,
) -> Result<Address> {
    let supported = bundler
        .supported_entry_points()
        .await
        .context("eth_supportedEntryPoints")?;
    let required = module_version.entry_point();

    match explicit {
        Some(entry_point) => {
            if !supported.contains(&entry_point) {
                anyhow::bail!(
                    "entry point {entry_point} is not supported by the bundler (supported: {supported:?})"
                );
            }
            if entry_point != required {
                anyhow::bail!(
                    "entry point {entry_point} is incompatible with 4337 module v{} (requires {required})",
                    module_version.as_str()
                );
            }
            Ok(entry_point)
        }
        None => {
            if !supported.contains(&required) {
                anyhow::bail!(
                    "bundler does not support entry point {required} required by 4337 module v{}",
                    module_version.as_str()
                );
            }
            Ok(required)
        }
    }
}

async fn validate_existing_account(
    reader: &AccountReader,
    safe: Address,
    module: Address,
) -> Result<()> {
    if !reader.is_deployed(safe).await? {
        anyhow::bail!("no Safe account deployed at {safe}");
    }

    let version = reader.safe_version(safe).await?;
    if parse_safe_version(&version)? < (1, 4, 1) {
        anyhow::bail!(
            "incompatible Safe version {version}: the 4337 pack requires Safe v1.4.1 or newer"
        );
    }

    if !reader.is_module_enabled(safe, module).await? {
        anyhow::bail!("the Safe account {safe} does not have the 4337 module {module} enabled");
    }

    let fallback = reader.fallback_handler(safe).await?;
    if fallback != module {
        anyhow::bail!(
            "the 4337 module {module} must also be set as the Safe's fallback handler (found {fallback})"
        );
    }
    Ok(())
}

struct PlannedDeployment {
    predicted: Address,
    init_code: Bytes,
}

/// Computes the deployment payload and the CREATE2 address it will land on.
async fn plan_deployment(
    reader: &AccountReader,
    owners: &[Address],
    threshold: u64,
    salt_nonce: U256,
    passkey: Option<PasskeyCoordinates>,
    module: Address,
    paymaster: Option<&PaymasterOptions>,
) -> Result<PlannedDeployment> {
    if owners.is_empty() && passkey.is_none() || threshold == 0 {
        anyhow::bail!("owners and threshold are required to deploy a new Safe account");
    }

    let mut owners = owners.to_vec();
    if passkey.is_some() && !owners.contains(&contracts::WEBAUTHN_SHARED_SIGNER) {
        owners.push(contracts::WEBAUTHN_SHARED_SIGNER);
    }
    if threshold > owners.len() as u64 {
        anyhow::bail!(
            "threshold {threshold} exceeds the number of owners ({})",
            owners.len()
        );
    }

    let setup_actions = setup_actions(module, passkey, paymaster);
    let (setup_to, setup_data) = if setup_actions.len() == 1 {
        let action = setup_actions.into_iter().next().unwrap();
        (action.to, action.data)
    } else {
        (
            contracts::MULTI_SEND,
            IMultiSend::multiSendCall {
                transactions: encode_multi_send(&setup_actions),
            }
            .abi_encode()
            .into(),
        )
    };

    let initializer: Bytes = ISafe::setupCall {
        _owners: owners,
        _threshold: U256::from(threshold),
        to: setup_to,
        data: setup_data,
        fallbackHandler: module,
        paymentToken: Address::ZERO,
        payment: U256::ZERO,
        paymentReceiver: Address::ZERO,
    }
    .abi_encode()
    .into();

    let creation_code = reader
        .proxy_creation_code(contracts::SAFE_PROXY_FACTORY)
        .await?;
    let mut deployment_code = creation_code.to_vec();
    deployment_code.extend_from_slice(&B256::left_padding_from(
        contracts::SAFE_SINGLETON_L2.as_slice(),
    )[..]);

    let mut salt_preimage = keccak256(&initializer).to_vec();
    salt_preimage.extend_from_slice(&salt_nonce.to_be_bytes::<32>());
    let salt = keccak256(&salt_preimage);

    let predicted = contracts::SAFE_PROXY_FACTORY.create2(salt, keccak256(&deployment_code));

    let mut init_code = contracts::SAFE_PROXY_FACTORY.as_slice().to_vec();
    init_code.extend_from_slice(
        &ISafeProxyFactory::createProxyWithNonceCall {
            _singleton: contracts::SAFE_SINGLETON_L2,
            initializer,
            saltNonce: salt_nonce,
        }
        .abi_encode(),
    );

    Ok(PlannedDeployment {
        predicted,
        init_code: init_code.into(),
    })
}

/// Setup actions executed (via delegate-call) during `Safe.setup`.
///
/// Ordering when several are needed: module enablement first (everything else
/// assumes the 4337 path exists), then passkey shared-signer configuration, then the
/// externally observable token approval.
fn setup_actions(
    module: Address,
    passkey: Option<PasskeyCoordinates>,
    paymaster: Option<&PaymasterOptions>,
) -> Vec<MetaTransaction> {
    let mut actions = vec![MetaTransaction {
        to: contracts::SAFE_MODULE_SETUP,
        value: U256::ZERO,
        data: ISafeModuleSetup::enableModulesCall {
            modules: vec![module],
        }
        .abi_encode()
        .into(),
        operation: OperationType::DelegateCall,
    }];

    if let Some(coordinates) = passkey {
        actions.push(MetaTransaction {
            to: contracts::WEBAUTHN_SHARED_SIGNER,
            value: U256::ZERO,
            data: ISafeWebAuthnSharedSigner::configureCall {
                signer: ISafeWebAuthnSharedSigner::Signer {
                    x: coordinates.x,
                    y: coordinates.y,
                    verifiers: U176::from_be_slice(contracts::P256_VERIFIER.as_slice()),
                },
            }
            .abi_encode()
            .into(),
            operation: OperationType::DelegateCall,
        });
    }

    if let Some(PaymasterOptions::Erc20 {
        paymaster_address,
        paymaster_token_address,
        amount_to_approve: Some(amount),
    }) = paymaster
    {
        actions.push(MetaTransaction::call(
            *paymaster_token_address,
            IERC20::approveCall {
                spender: *paymaster_address,
                amount: *amount,
            }
            .abi_encode(),
        ));
    }

    actions
}

/// Single transaction encodes directly; a batch is merged through MultiSend and
/// wrapped in a delegate-call, preserving input order.
fn execute_user_op_call_data(batch: &[MetaTransaction]) -> Bytes {
    let call = if let [tx] = batch {
        ISafe4337Module::executeUserOpWithErrorStringCall {
            to: tx.to,
            value: tx.value,
            data: tx.data.clone(),
            operation: tx.operation as u8,
        }
    } else {
        ISafe4337Module::executeUserOpWithErrorStringCall {
            to: contracts::MULTI_SEND,
            value: U256::ZERO,
            data: IMultiSend::multiSendCall {
                transactions: encode_multi_send(batch),
            }
            .abi_encode()
            .into(),
            operation: OperationType::DelegateCall as u8,
        }
    };
    call.abi_encode().into()
}

/// Placeholder signature for gas estimation: zeroed validity window plus one dummy
/// ECDSA slot, so bundler simulations exercise the signature-length path.
fn estimation_signature() -> Bytes {
    let mut out = vec![0u8; 12];
    out.extend_from_slice(&[0xec; 64]);
    out.push(0x1c);
    out.into()
}

fn parse_safe_version(version: &str) -> Result<(u64, u64, u64)> {
    // Safe reports versions like "1.4.1"; some deployments suffix a variant tag
    // ("1.4.1+L2") which does not affect compatibility.
    let core = version.split('+').next().unwrap_or(version);
    let mut parts = core.split('.');
    let mut next = |name: &'static str| -> Result<u64> {
        parts
            .next()
            .with_context(|| format!("Safe version {version:?} is missing its {name} component"))?
            .parse::<u64>()
            .with_context(|| format!("Safe version {version:?} has a non-numeric {name} component"))
    };
    Ok((next("major")?, next("minor")?, next("patch")?))
}
