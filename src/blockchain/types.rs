// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain types and constants.

use serde::{Deserialize, Serialize};

/// Host network configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: &'static str,
    /// Chain ID
    pub chain_id: u64,
    /// RPC endpoint URL
    pub rpc_url: &'static str,
    /// Block explorer URL (empty for local nodes)
    pub explorer_url: &'static str,
}

/// Local Hardhat node running the FHEVM mock plugin.
pub const HARDHAT_LOCAL: NetworkConfig = NetworkConfig {
    name: "Hardhat (FHEVM mock)",
    chain_id: 31337,
    rpc_url: "http://localhost:8545",
    explorer_url: "",
};

/// Ethereum Sepolia, served by the Zama testnet relayer.
pub const SEPOLIA: NetworkConfig = NetworkConfig {
    name: "Sepolia",
    chain_id: 11_155_111,
    rpc_url: "https://ethereum-sepolia-rpc.publicnode.com",
    explorer_url: "https://sepolia.etherscan.io",
};

/// Known networks, looked up by chain id.
pub fn network_for_chain(chain_id: u64) -> Option<NetworkConfig> {
    [HARDHAT_LOCAL, SEPOLIA]
        .into_iter()
        .find(|n| n.chain_id == chain_id)
}

/// Receipt of a confirmed write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Transaction hash
    pub tx_hash: String,
    /// Block number where transaction was included
    pub block_number: u64,
    /// Gas actually used
    pub gas_used: u64,
    /// Whether the transaction was successful
    pub success: bool,
}

impl TxReceipt {
    /// Explorer link for this transaction, if the network has an explorer.
    pub fn explorer_url(&self, network: &NetworkConfig) -> Option<String> {
        if network.explorer_url.is_empty() {
            None
        } else {
            Some(format!("{}/tx/{}", network.explorer_url, self.tx_hash))
        }
    }
}
