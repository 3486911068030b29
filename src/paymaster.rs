use crate::userop::UserOperationWire;
use alloy::primitives::{Address, Bytes, U256};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use url::Url;

/// How gas is paid for the account's operations.
#[derive(Debug, Clone)]
pub enum PaymasterOptions {
    /// A sponsorship service covers gas; the service returns the paymaster stub to
    /// embed in the operation (`pm_sponsorUserOperation`).
    Sponsored {
        paymaster_url: Url,
        sponsorship_policy_id: Option<String>,
    },
    /// An ERC-20 paymaster charges the account in `paymaster_token_address`.
    /// `amount_to_approve` is the approval granted once in the deployment setup
    /// batch; per-operation approvals ride on `BuildOptions` instead.
    Erc20 {
        paymaster_address: Address,
        paymaster_token_address: Address,
        amount_to_approve: Option<U256>,
    },
}

/// Paymaster stub returned by the sponsorship service. v0.6 services return the
/// combined blob; v0.7 services return the unpacked fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorshipData {
    #[serde(default)]
    pub paymaster_and_data: Option<Bytes>,
    #[serde(default)]
    pub paymaster: Option<Address>,
    #[serde(default)]
    pub paymaster_data: Option<Bytes>,
    #[serde(default)]
    pub paymaster_verification_gas_limit: Option<U256>,
    #[serde(default)]
    pub paymaster_post_op_gas_limit: Option<U256>,
    #[serde(default)]
    pub pre_verification_gas: Option<U256>,
    #[serde(default)]
    pub verification_gas_limit: Option<U256>,
    #[serde(default)]
    pub call_gas_limit: Option<U256>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<serde_json::Value>,
}

/// JSON-RPC client for a gas sponsorship service.
///
/// The transport is injectable like the bundler's: HTTP in production, canned
/// responses in tests.
#[derive(Debug, Clone)]
pub struct PaymasterClient {
    transport: Transport,
}

#[derive(Debug, Clone)]
enum Transport {
    Http { http: reqwest::Client, url: Url },
    #[cfg(test)]
    Mock(mock::MockPaymaster),
}

impl PaymasterClient {
    pub fn new(url: Url) -> Self {
        Self {
            transport: Transport::Http {
                http: reqwest::Client::new(),
                url,
            },
        }
    }

    #[cfg(test)]
    pub fn mocked(mock: mock::MockPaymaster) -> Self {
        Self {
            transport: Transport::Mock(mock),
        }
    }

    /// Asks the service to sponsor the operation. Params are positional:
    /// `[operation, entryPoint]` plus the policy id when one is configured.
    pub async fn sponsor_user_operation(
        &self,
        operation: &UserOperationWire,
        entry_point: Address,
        sponsorship_policy_id: Option<&str>,
    ) -> Result<SponsorshipData> {
        let params = match sponsorship_policy_id {
            Some(policy) => json!([operation, entry_point, { "sponsorshipPolicyId": policy }]),
            None => json!([operation, entry_point]),
        };
        let result = self.request_raw(params).await?;
        serde_json::from_value(result).context("decode pm_sponsorUserOperation result")
    }

    async fn request_raw(&self, params: serde_json::Value) -> Result<serde_json::Value> {
        match &self.transport {
            Transport::Http { http, url } => {
                let payload = json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "method": "pm_sponsorUserOperation",
                    "params": params,
                });
                let resp = http
                    .post(url.clone())
                    .json(&payload)
                    .send()
                    .await
                    .context("post paymaster jsonrpc")?;
                let body: JsonRpcResponse<serde_json::Value> = resp
                    .json()
                    .await
                    .context("decode pm_sponsorUserOperation response")?;
                if let Some(err) = body.error {
                    tracing::warn!(err = %err, "paymaster error");
                    anyhow::bail!("paymaster rejected sponsorship: {err}");
                }
                body.result
                    .context("paymaster returned empty sponsorship result")
            }
            #[cfg(test)]
            Transport::Mock(mock) => mock.respond(params),
        }
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Canned sponsorship response plus a log of the params each call carried.
    #[derive(Debug, Clone, Default)]
    pub struct MockPaymaster {
        response: Arc<Mutex<Option<serde_json::Value>>>,
        requests: Arc<Mutex<Vec<serde_json::Value>>>,
    }

    impl MockPaymaster {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn stub(&self, response: serde_json::Value) -> &Self {
            *self.response.lock().unwrap() = Some(response);
            self
        }

        pub fn respond(&self, params: serde_json::Value) -> Result<serde_json::Value> {
            self.requests.lock().unwrap().push(params);
            self.response
                .lock()
                .unwrap()
                .clone()
                .context("mock paymaster has no stubbed response")
        }

        pub fn requests(&self) -> Vec<serde_json::Value> {
            self.requests.lock().unwrap().clone()
        }
    }
}
