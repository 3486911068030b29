use crate::userop::UserOperationWire;
use alloy::primitives::{Address, B256, U256, aliases::U64};
use anyhow::{Context, Result};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use url::Url;

/// The complete set of bundler operations this crate speaks. Closed on purpose:
/// every request goes through one of these, never a caller-supplied method string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundlerMethod {
    SupportedEntryPoints,
    ChainId,
    SendUserOperation,
    EstimateUserOperationGas,
    GetUserOperationByHash,
    GetUserOperationReceipt,
    GetUserOperationGasPrice,
}

impl BundlerMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            BundlerMethod::SupportedEntryPoints => "eth_supportedEntryPoints",
            BundlerMethod::ChainId => "eth_chainId",
            BundlerMethod::SendUserOperation => "eth_sendUserOperation",
            BundlerMethod::EstimateUserOperationGas => "eth_estimateUserOperationGas",
            BundlerMethod::GetUserOperationByHash => "eth_getUserOperationByHash",
            BundlerMethod::GetUserOperationReceipt => "eth_getUserOperationReceipt",
            BundlerMethod::GetUserOperationGasPrice => "pimlico_getUserOperationGasPrice",
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<serde_json::Value>,
}

/// Gas limits returned by `eth_estimateUserOperationGas`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimation {
    pub pre_verification_gas: U256,
    pub verification_gas_limit: U256,
    pub call_gas_limit: U256,
    #[serde(default)]
    pub paymaster_verification_gas_limit: Option<U256>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeePerGas {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// Fee tiers from `pimlico_getUserOperationGasPrice`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GasPriceSuggestion {
    pub slow: FeePerGas,
    pub standard: FeePerGas,
    pub fast: FeePerGas,
}

/// `eth_getUserOperationByHash` result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationByHash {
    pub user_operation: UserOperationWire,
    pub entry_point: Address,
    pub transaction_hash: Option<B256>,
    pub block_hash: Option<B256>,
    pub block_number: Option<U256>,
}

/// `eth_getUserOperationReceipt` result. The embedded transaction receipt is kept
/// raw: bundlers differ in which extra fields they attach and this layer does not
/// consume them.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    pub user_op_hash: B256,
    pub sender: Address,
    pub nonce: U256,
    #[serde(default)]
    pub paymaster: Option<Address>,
    pub actual_gas_used: U256,
    pub actual_gas_cost: U256,
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub logs: Vec<serde_json::Value>,
    pub receipt: serde_json::Value,
}

/// JSON-RPC client for a bundler endpoint.
///
/// The transport is injectable: HTTP in production, canned responses in tests.
#[derive(Debug, Clone)]
pub struct BundlerClient {
    transport: Transport,
}

#[derive(Debug, Clone)]
enum Transport {
    Http { http: reqwest::Client, url: Url },
    #[cfg(test)]
    Mock(mock::MockBundler),
}

impl BundlerClient {
    pub fn new(url: Url) -> Self {
        Self {
            transport: Transport::Http {
                http: reqwest::Client::new(),
                url,
            },
        }
    }

    #[cfg(test)]
    pub fn mocked(mock: mock::MockBundler) -> Self {
        Self {
            transport: Transport::Mock(mock),
        }
    }

    pub async fn supported_entry_points(&self) -> Result<Vec<Address>> {
        self.request(BundlerMethod::SupportedEntryPoints, json!([]))
            .await
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let id: U64 = self.request(BundlerMethod::ChainId, json!([])).await?;
        Ok(id.to::<u64>())
    }

    /// Submits the operation; the returned hash is its canonical identifier from
    /// here on.
    pub async fn send_user_operation(
        &self,
        operation: &UserOperationWire,
        entry_point: Address,
    ) -> Result<B256> {
        self.request(
            BundlerMethod::SendUserOperation,
            json!([operation, entry_point]),
        )
        .await
    }

    pub async fn estimate_user_operation_gas(
        &self,
        operation: &UserOperationWire,
        entry_point: Address,
    ) -> Result<GasEstimation> {
        self.request(
            BundlerMethod::EstimateUserOperationGas,
            json!([operation, entry_point]),
        )
        .await
    }

    pub async fn get_user_operation_by_hash(
        &self,
        hash: B256,
    ) -> Result<Option<UserOperationByHash>> {
        self.request_nullable(BundlerMethod::GetUserOperationByHash, json!([hash]))
            .await
    }

    pub async fn get_user_operation_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<UserOperationReceipt>> {
        self.request_nullable(BundlerMethod::GetUserOperationReceipt, json!([hash]))
            .await
    }

    pub async fn gas_price(&self) -> Result<GasPriceSuggestion> {
        self.request(BundlerMethod::GetUserOperationGasPrice, json!([]))
            .await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: BundlerMethod,
        params: serde_json::Value,
    ) -> Result<T> {
        let result = self.request_raw(method, params).await?;
        serde_json::from_value(result)
            .with_context(|| format!("decode {} result", method.as_str()))
    }

    /// Like `request`, but treats a JSON null result as `None` (hash lookups for
    /// operations the bundler has not seen yet).
    async fn request_nullable<T: DeserializeOwned>(
        &self,
        method: BundlerMethod,
        params: serde_json::Value,
    ) -> Result<Option<T>> {
        let result = self.request_raw(method, params).await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .with_context(|| format!("decode {} result", method.as_str()))
    }

    async fn request_raw(
        &self,
        method: BundlerMethod,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        match &self.transport {
            Transport::Http { http, url } => {
                let payload = json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "method": method.as_str(),
                    "params": params,
                });
                let resp = http
                    .post(url.clone())
                    .json(&payload)
                    .send()
                    .await
                    .context("post bundler jsonrpc")?;
                let body: JsonRpcResponse<serde_json::Value> = resp
                    .json()
                    .await
                    .with_context(|| format!("decode {} response", method.as_str()))?;
                if let Some(err) = body.error {
                    tracing::warn!(method = method.as_str(), err = %err, "bundler error");
                    anyhow::bail!("bundler rejected {}: {err}", method.as_str());
                }
                Ok(body.result.unwrap_or(serde_json::Value::Null))
            }
            #[cfg(test)]
            Transport::Mock(mock) => mock.respond(method, params),
        }
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Canned per-method responses plus a log of the params each method saw.
    #[derive(Debug, Clone, Default)]
    pub struct MockBundler {
        responses: Arc<Mutex<HashMap<&'static str, serde_json::Value>>>,
        requests: Arc<Mutex<Vec<(&'static str, serde_json::Value)>>>,
    }

    impl MockBundler {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(
            &self,
            method: BundlerMethod,
            params: serde_json::Value,
        ) -> Result<serde_json::Value> {
            self.requests.lock().unwrap().push((method.as_str(), params));
            self.responses
                .lock()
                .unwrap()
                .get(method.as_str())
                .cloned()
                .with_context(|| format!("mock bundler has no response for {}", method.as_str()))
        }

        pub fn stub(&self, method: BundlerMethod, response: serde_json::Value) -> &Self {
            self.responses
                .lock()
                .unwrap()
                .insert(method.as_str(), response);
            self
        }

        pub fn requests_for(&self, method: BundlerMethod) -> Vec<serde_json::Value> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|(m, _)| *m == method.as_str())
                .map(|(_, p)| p.clone())
                .collect()
        }
    }
}
