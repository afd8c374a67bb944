// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain resolution and development-node detection.
//!
//! Resolution answers two questions about an endpoint: which chain it serves,
//! and whether that chain is a development chain whose node embeds the FHEVM
//! mock. The decision itself ([`select_strategy`]) is a pure function so it
//! can be tested without a network.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::types::{ChainResolution, MockChains, RelayerMetadata};
use crate::blockchain::client::{self, ChainClient, RpcTransport};
use crate::error::FhevmError;

/// JSON-RPC method exposed by FHEVM-enabled Hardhat nodes.
pub const RELAYER_METADATA_METHOD: &str = "fhevm_relayer_metadata";

/// Substring a development node reports in `web3_clientVersion`.
const DEV_NODE_MARKER: &str = "hardhat";

/// Where the session's chain lives.
#[derive(Clone)]
pub enum Endpoint {
    /// A live JSON-RPC transport (e.g. a wallet-injected provider).
    Provider(Arc<dyn RpcTransport>),
    /// A plain RPC URL.
    Url(String),
}

impl Endpoint {
    /// URL of the endpoint, when it was given as one.
    pub fn rpc_url(&self) -> Option<&str> {
        match self {
            Endpoint::Provider(_) => None,
            Endpoint::Url(url) => Some(url),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Provider(_) => write!(f, "Endpoint::Provider(..)"),
            Endpoint::Url(url) => write!(f, "Endpoint::Url({url})"),
        }
    }
}

/// Which instance backend a resolved chain gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Development node with embedded FHEVM contracts.
    Mock(RelayerMetadata),
    /// Production relayer SDK. `downgraded_from_mock` is set when the chain
    /// id is a development chain but its node did not identify as one.
    Production { downgraded_from_mock: bool },
}

pub fn is_mock_chain(chain_id: u64, mock_chains: &MockChains) -> bool {
    mock_chains.contains(chain_id)
}

/// Build the resolution for an already known chain id.
pub fn resolution_for(
    chain_id: u64,
    endpoint_url: Option<&str>,
    mock_chains: &MockChains,
) -> ChainResolution {
    let is_mock = is_mock_chain(chain_id, mock_chains);
    let rpc_url = match endpoint_url {
        Some(url) => Some(url.to_string()),
        None if is_mock => mock_chains.rpc_url(chain_id).map(str::to_string),
        None => None,
    };

    ChainResolution {
        chain_id,
        is_mock,
        rpc_url,
    }
}

/// Fetch the chain id behind `endpoint` and classify it.
pub async fn resolve(
    endpoint: &Endpoint,
    mock_chains: &MockChains,
) -> Result<ChainResolution, FhevmError> {
    let chain_id = match endpoint {
        Endpoint::Provider(transport) => client::chain_id(transport.as_ref()).await?,
        Endpoint::Url(url) => ChainClient::new(url)?.get_chain_id().await?,
    };

    let resolution = resolution_for(chain_id, endpoint.rpc_url(), mock_chains);
    tracing::debug!(
        chain_id,
        is_mock = resolution.is_mock,
        rpc_url = ?resolution.rpc_url,
        "Resolved chain"
    );
    Ok(resolution)
}

/// Ask a node whether it is an FHEVM development node and, if so, for the
/// addresses of its embedded contracts.
///
/// A failing `web3_clientVersion` call propagates. Anything wrong with the
/// metadata call itself means "no metadata".
pub async fn probe_relayer_metadata(
    transport: &dyn RpcTransport,
) -> Result<Option<RelayerMetadata>, FhevmError> {
    let version = client::client_version(transport).await?;
    let is_dev_node = version
        .as_str()
        .map(|v| v.to_lowercase().contains(DEV_NODE_MARKER))
        .unwrap_or(false);

    if !is_dev_node {
        tracing::debug!(version = %version, "Node is not an FHEVM development node");
        return Ok(None);
    }

    let raw = match transport
        .request(RELAYER_METADATA_METHOD, Value::Array(vec![]))
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!(error = %e, "Relayer metadata query failed");
            return Ok(None);
        }
    };

    let metadata = RelayerMetadata::from_json(&raw);
    if metadata.is_none() {
        tracing::debug!(raw = %raw, "Relayer metadata is malformed");
    }
    Ok(metadata)
}

pub fn select_strategy(
    resolution: &ChainResolution,
    metadata: Option<RelayerMetadata>,
) -> Strategy {
    match (resolution.is_mock, metadata) {
        (true, Some(metadata)) => Strategy::Mock(metadata),
        (true, None) => Strategy::Production {
            downgraded_from_mock: true,
        },
        (false, _) => Strategy::Production {
            downgraded_from_mock: false,
        },
    }
}
