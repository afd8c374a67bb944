// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults and the deployment address book.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `RPC_URL` | JSON-RPC endpoint of the host chain | `http://localhost:8545` |
//! | `CONTRACT_ADDRESS` | FriendCircle address | Looked up in `ADDRESS_BOOK` |
//! | `ADDRESS_BOOK` | Deployment address book (JSON) | Optional |
//! | `PRIVATE_KEY` | Hex key of the signing account | Required for writes and decrypts |
//! | `MOCK_CHAINS` | Extra development chains, `id=url,id=url` | `31337=http://localhost:8545` |
//! | `RELAYER_SDK_URL` | Relayer SDK bundle location | Zama CDN 0.2.0 |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use alloy::primitives::Address;
use serde::Deserialize;

use crate::error::FhevmError;
use crate::fhevm::sdk::DEFAULT_SDK_URL;
use crate::fhevm::types::MockChains;

pub const RPC_URL_ENV: &str = "RPC_URL";

/// Explicit FriendCircle address. Takes precedence over the address book.
pub const CONTRACT_ADDRESS_ENV: &str = "CONTRACT_ADDRESS";

/// Path of a JSON address book keyed by chain id, as written by the
/// deployment scripts.
pub const ADDRESS_BOOK_ENV: &str = "ADDRESS_BOOK";

pub const PRIVATE_KEY_ENV: &str = "PRIVATE_KEY";

/// Development chains on top of the built-in Hardhat chain.
pub const MOCK_CHAINS_ENV: &str = "MOCK_CHAINS";

pub const RELAYER_SDK_URL_ENV: &str = "RELAYER_SDK_URL";

/// `json` selects structured JSON logs; anything else gives pretty output.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

/// Settings of one FriendCircle session.
#[derive(Clone)]
pub struct SessionConfig {
    pub rpc_url: String,
    pub contract_address: Option<Address>,
    pub address_book: Option<PathBuf>,
    pub private_key: Option<String>,
    pub mock_chains: MockChains,
    pub relayer_sdk_url: String,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("rpc_url", &self.rpc_url)
            .field("contract_address", &self.contract_address)
            .field("address_book", &self.address_book)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("mock_chains", &self.mock_chains)
            .field("relayer_sdk_url", &self.relayer_sdk_url)
            .finish()
    }
}

impl SessionConfig {
    pub fn from_env() -> Result<Self, FhevmError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, FhevmError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let contract_address = get(CONTRACT_ADDRESS_ENV)
            .map(|raw| {
                raw.trim().parse::<Address>().map_err(|e| {
                    FhevmError::Config(format!("{CONTRACT_ADDRESS_ENV}={raw}: {e}"))
                })
            })
            .transpose()?;

        let mock_chains = match get(MOCK_CHAINS_ENV) {
            Some(raw) => raw
                .parse::<MockChains>()
                .map_err(|e| FhevmError::Config(format!("{MOCK_CHAINS_ENV}: {e}")))?,
            None => MockChains::default(),
        };

        Ok(Self {
            rpc_url: get(RPC_URL_ENV).unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            contract_address,
            address_book: get(ADDRESS_BOOK_ENV).map(PathBuf::from),
            private_key: get(PRIVATE_KEY_ENV),
            mock_chains,
            relayer_sdk_url: get(RELAYER_SDK_URL_ENV)
                .unwrap_or_else(|| DEFAULT_SDK_URL.to_string()),
        })
    }

    /// FriendCircle address for `chain_id`: the explicit address if set,
    /// else the address book entry.
    pub fn resolve_contract_address(&self, chain_id: u64) -> Result<Address, FhevmError> {
        if let Some(address) = self.contract_address {
            return Ok(address);
        }

        let path = self.address_book.as_ref().ok_or_else(|| {
            FhevmError::Config(format!(
                "no FriendCircle address: set {CONTRACT_ADDRESS_ENV} or {ADDRESS_BOOK_ENV}"
            ))
        })?;

        AddressBook::load(path)?.address_for(chain_id).ok_or_else(|| {
            FhevmError::Config(format!(
                "FriendCircle is not deployed on chain {chain_id} according to {}",
                path.display()
            ))
        })
    }
}

/// One deployment record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub chain_id: u64,
    pub chain_name: String,
    pub address: Address,
}

/// Deployments keyed by chain id (or network name when the id was unknown
/// at deploy time).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct AddressBook(BTreeMap<String, Deployment>);

impl AddressBook {
    pub fn load(path: &Path) -> Result<Self, FhevmError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FhevmError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&raw)
            .map_err(|e| FhevmError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn address_for(&self, chain_id: u64) -> Option<Address> {
        self.0
            .get(&chain_id.to_string())
            .or_else(|| self.0.values().find(|d| d.chain_id == chain_id))
            .map(|d| d.address)
    }

    pub fn deployments(&self) -> impl Iterator<Item = &Deployment> {
        self.0.values()
    }
}
