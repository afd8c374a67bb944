// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON-RPC client for the FHEVM host chain.
//!
//! Everything above this module talks to the chain through the object-safe
//! [`RpcTransport`] trait, so a live alloy HTTP provider and an injected
//! wallet-style provider look the same to the resolver and the mock instance.

use std::borrow::Cow;
use std::sync::Arc;

use alloy::{
    network::Ethereum,
    primitives::Address,
    providers::{
        fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller},
        Identity, Provider, ProviderBuilder, RootProvider,
    },
};
use async_trait::async_trait;
use serde_json::Value;

/// HTTP provider type for the host chain (with all fillers).
type HttpProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider<Ethereum>,
>;

/// A raw JSON-RPC endpoint.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Send `method` with positional `params` and return the raw result.
    async fn request(&self, method: &'static str, params: Value) -> Result<Value, ChainClientError>;
}

/// Opens transports for RPC URLs discovered at runtime (mock-chain overrides).
pub trait RpcConnector: Send + Sync {
    fn connect(&self, rpc_url: &str) -> Result<Arc<dyn RpcTransport>, ChainClientError>;
}

/// Host chain client over alloy's HTTP transport.
pub struct ChainClient {
    /// RPC endpoint URL
    rpc_url: String,
    /// Alloy HTTP provider
    provider: HttpProvider,
}

impl ChainClient {
    /// Create a new client for the given RPC endpoint.
    pub fn new(rpc_url: &str) -> Result<Self, ChainClientError> {
        let url: url::Url = rpc_url.parse().map_err(|e: url::ParseError| {
            ChainClientError::InvalidRpcUrl(format!("{rpc_url}: {e}"))
        })?;

        let provider = ProviderBuilder::new().connect_http(url);

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            provider,
        })
    }

    /// The endpoint this client was built for.
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Query the network for its chain id.
    pub async fn get_chain_id(&self) -> Result<u64, ChainClientError> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| ChainClientError::RpcError(e.to_string()))
    }

    /// Get the current block number.
    pub async fn get_block_number(&self) -> Result<u64, ChainClientError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ChainClientError::RpcError(e.to_string()))
    }
}

#[async_trait]
impl RpcTransport for ChainClient {
    async fn request(&self, method: &'static str, params: Value) -> Result<Value, ChainClientError> {
        self.provider
            .raw_request::<Value, Value>(Cow::Borrowed(method), params)
            .await
            .map_err(|e| ChainClientError::RpcError(format!("{method}: {e}")))
    }
}

/// Connector that opens a [`ChainClient`] per URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnector;

impl RpcConnector for HttpConnector {
    fn connect(&self, rpc_url: &str) -> Result<Arc<dyn RpcTransport>, ChainClientError> {
        Ok(Arc::new(ChainClient::new(rpc_url)?))
    }
}

/// `eth_chainId` over any transport.
pub async fn chain_id(transport: &dyn RpcTransport) -> Result<u64, ChainClientError> {
    let raw = transport.request("eth_chainId", Value::Array(vec![])).await?;
    parse_quantity(&raw)
}

/// `web3_clientVersion` over any transport.
///
/// The raw value is returned untouched; callers decide what counts as a
/// recognizable node.
pub async fn client_version(transport: &dyn RpcTransport) -> Result<Value, ChainClientError> {
    transport
        .request("web3_clientVersion", Value::Array(vec![]))
        .await
}

/// Accounts already exposed by the endpoint (`eth_accounts`).
pub async fn accounts(transport: &dyn RpcTransport) -> Result<Vec<Address>, ChainClientError> {
    let raw = transport.request("eth_accounts", Value::Array(vec![])).await?;
    parse_accounts(raw)
}

/// Ask the endpoint to expose accounts (`eth_requestAccounts`).
pub async fn request_accounts(
    transport: &dyn RpcTransport,
) -> Result<Vec<Address>, ChainClientError> {
    let raw = transport
        .request("eth_requestAccounts", Value::Array(vec![]))
        .await?;
    parse_accounts(raw)
}

/// Accounts the endpoint exposes, asking for them when none are exposed yet.
pub async fn exposed_accounts(
    transport: &dyn RpcTransport,
) -> Result<Vec<Address>, ChainClientError> {
    let exposed = accounts(transport).await?;
    if !exposed.is_empty() {
        return Ok(exposed);
    }
    request_accounts(transport).await
}

/// Parse a JSON-RPC quantity. Hex strings are canonical; plain numbers are
/// accepted because some dev nodes return them.
pub fn parse_quantity(value: &Value) -> Result<u64, ChainClientError> {
    match value {
        Value::String(s) => {
            let digits = s
                .strip_prefix("0x")
                .or_else(|| s.strip_prefix("0X"))
                .ok_or_else(|| ChainClientError::RpcError(format!("Invalid quantity: {s}")))?;
            u64::from_str_radix(digits, 16)
                .map_err(|e| ChainClientError::RpcError(format!("Invalid quantity {s}: {e}")))
        }
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| ChainClientError::RpcError(format!("Invalid quantity: {n}"))),
        other => Err(ChainClientError::RpcError(format!(
            "Invalid quantity: {other}"
        ))),
    }
}

fn parse_accounts(raw: Value) -> Result<Vec<Address>, ChainClientError> {
    let list: Vec<String> = serde_json::from_value(raw)
        .map_err(|e| ChainClientError::RpcError(format!("Invalid accounts list: {e}")))?;

    list.iter()
        .map(|a| {
            a.parse::<Address>()
                .map_err(|e| ChainClientError::InvalidAddress(format!("{a}: {e}")))
        })
        .collect()
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainClientError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Contract error: {0}")]
    ContractError(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
}
