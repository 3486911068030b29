use crate::contracts::{FALLBACK_HANDLER_SLOT, IEntryPointNonces, ISafe, ISafeProxyFactory};
use alloy::primitives::{Address, Bytes, U256, aliases::U192};
use alloy::providers::{DynProvider, Provider};
use anyhow::{Context, Result};

/// Contract-read seam for everything the pack needs from the chain.
///
/// Injectable so validation logic is testable without an RPC endpoint: production
/// code wraps a provider, tests use [`mock::MockAccountReader`].
#[derive(Debug, Clone)]
pub struct AccountReader {
    inner: Inner,
}

#[derive(Debug, Clone)]
enum Inner {
    Rpc(DynProvider),
    #[cfg(test)]
    Mock(mock::MockAccountReader),
}

impl AccountReader {
    pub fn new(provider: DynProvider) -> Self {
        Self {
            inner: Inner::Rpc(provider),
        }
    }

    #[cfg(test)]
    pub fn mocked(mock: mock::MockAccountReader) -> Self {
        Self {
            inner: Inner::Mock(mock),
        }
    }

    pub async fn chain_id(&self) -> Result<u64> {
        match &self.inner {
            Inner::Rpc(provider) => provider.get_chain_id().await.context("eth_chainId"),
            #[cfg(test)]
            Inner::Mock(mock) => Ok(mock.chain_id),
        }
    }

    /// True when the address has contract code.
    pub async fn is_deployed(&self, account: Address) -> Result<bool> {
        match &self.inner {
            Inner::Rpc(provider) => {
                let code = provider
                    .get_code_at(account)
                    .await
                    .context("eth_getCode")?;
                Ok(!code.is_empty())
            }
            #[cfg(test)]
            Inner::Mock(mock) => Ok(mock.deployed),
        }
    }

    pub async fn safe_version(&self, safe: Address) -> Result<String> {
        match &self.inner {
            Inner::Rpc(provider) => ISafe::new(safe, provider)
                .VERSION()
                .call()
                .await
                .context("Safe.VERSION"),
            #[cfg(test)]
            Inner::Mock(mock) => Ok(mock.safe_version.clone()),
        }
    }

    pub async fn is_module_enabled(&self, safe: Address, module: Address) -> Result<bool> {
        match &self.inner {
            Inner::Rpc(provider) => ISafe::new(safe, provider)
                .isModuleEnabled(module)
                .call()
                .await
                .context("Safe.isModuleEnabled"),
            #[cfg(test)]
            Inner::Mock(mock) => Ok(mock.enabled_modules.contains(&module)),
        }
    }

    /// Reads the fallback handler from its dedicated storage slot.
    pub async fn fallback_handler(&self, safe: Address) -> Result<Address> {
        match &self.inner {
            Inner::Rpc(provider) => {
                let word = provider
                    .get_storage_at(safe, U256::from_be_bytes(FALLBACK_HANDLER_SLOT))
                    .await
                    .context("eth_getStorageAt(fallback handler)")?;
                Ok(Address::from_slice(&word.to_be_bytes::<32>()[12..]))
            }
            #[cfg(test)]
            Inner::Mock(mock) => Ok(mock.fallback_handler),
        }
    }

    pub async fn entry_point_nonce(
        &self,
        entry_point: Address,
        sender: Address,
        key: U192,
    ) -> Result<U256> {
        match &self.inner {
            Inner::Rpc(provider) => IEntryPointNonces::new(entry_point, provider)
                .getNonce(sender, key)
                .call()
                .await
                .context("EntryPoint.getNonce"),
            #[cfg(test)]
            Inner::Mock(mock) => Ok(mock.entry_point_nonce),
        }
    }

    /// Proxy creation bytecode, needed to predict the counterfactual address.
    pub async fn proxy_creation_code(&self, factory: Address) -> Result<Bytes> {
        match &self.inner {
            Inner::Rpc(provider) => ISafeProxyFactory::new(factory, provider)
                .proxyCreationCode()
                .call()
                .await
                .context("SafeProxyFactory.proxyCreationCode"),
            #[cfg(test)]
            Inner::Mock(mock) => Ok(mock.proxy_creation_code.clone()),
        }
    }
}
