// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! FHEVM session types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use alloy::{
    dyn_abi::TypedData,
    primitives::{Address, Bytes, B256},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::FhevmError;

/// Chain id of the local Hardhat FHEVM node.
pub const DEFAULT_MOCK_CHAIN_ID: u64 = 31337;

/// RPC URL used for the default mock chain.
pub const DEFAULT_MOCK_RPC_URL: &str = "http://localhost:8545";

/// EIP-712 primary type signed for user decryption.
pub const USER_DECRYPT_PRIMARY_TYPE: &str = "UserDecryptRequestVerification";

/// Validity window of a decryption grant.
pub const DEFAULT_DURATION_DAYS: u64 = 365;

/// Identifier of an encrypted value stored on-chain.
///
/// The all-zero handle means "nothing written yet" and must never reach the
/// relayer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CiphertextHandle(pub B256);

impl CiphertextHandle {
    /// The empty-handle sentinel.
    pub const EMPTY: CiphertextHandle = CiphertextHandle(B256::ZERO);

    pub fn is_empty(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_b256(&self) -> B256 {
        self.0
    }
}

impl From<B256> for CiphertextHandle {
    fn from(value: B256) -> Self {
        Self(value)
    }
}

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CiphertextHandle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<B256>()
            .map(Self)
            .map_err(|e| format!("Invalid ciphertext handle {s}: {e}"))
    }
}

/// Ephemeral keypair for one decryption grant.
#[derive(Clone, PartialEq, Eq)]
pub struct Keypair {
    pub public_key: String,
    pub private_key: String,
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Output of an encrypted-input builder, consumed by exactly one write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedInput {
    pub handles: Vec<CiphertextHandle>,
    pub input_proof: Bytes,
}

/// Confidential-computation contracts embedded in a development node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayerMetadata {
    #[serde(rename = "ACLAddress")]
    pub acl_address: Address,
    #[serde(rename = "InputVerifierAddress")]
    pub input_verifier_address: Address,
    #[serde(rename = "KMSVerifierAddress")]
    pub kms_verifier_address: Address,
}

impl RelayerMetadata {
    /// Validate a raw `fhevm_relayer_metadata` result.
    ///
    /// Every field must be a `0x` string that parses as an address; one bad
    /// field invalidates the record.
    pub fn from_json(raw: &Value) -> Option<Self> {
        let obj = raw.as_object()?;
        let field = |key: &str| -> Option<Address> {
            let s = obj.get(key)?.as_str()?;
            if !s.starts_with("0x") {
                return None;
            }
            s.parse().ok()
        };

        Some(Self {
            acl_address: field("ACLAddress")?,
            input_verifier_address: field("InputVerifierAddress")?,
            kms_verifier_address: field("KMSVerifierAddress")?,
        })
    }
}

/// Outcome of resolving an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainResolution {
    pub chain_id: u64,
    pub is_mock: bool,
    pub rpc_url: Option<String>,
}

/// Development chains served by an in-process emulator, keyed by chain id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockChains(BTreeMap<u64, String>);

impl Default for MockChains {
    fn default() -> Self {
        let mut chains = BTreeMap::new();
        chains.insert(DEFAULT_MOCK_CHAIN_ID, DEFAULT_MOCK_RPC_URL.to_string());
        Self(chains)
    }
}

impl MockChains {
    /// Default set merged with caller overrides (overrides win).
    pub fn with_overrides<I>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (u64, String)>,
    {
        let mut chains = Self::default();
        chains.0.extend(overrides);
        chains
    }

    pub fn contains(&self, chain_id: u64) -> bool {
        self.0.contains_key(&chain_id)
    }

    pub fn rpc_url(&self, chain_id: u64) -> Option<&str> {
        self.0.get(&chain_id).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &str)> {
        self.0.iter().map(|(id, url)| (*id, url.as_str()))
    }
}

impl FromStr for MockChains {
    type Err = String;

    /// Parse `id=url,id=url` overrides on top of the default set.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut overrides = Vec::new();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (id, url) = entry
                .split_once('=')
                .ok_or_else(|| format!("Invalid mock chain entry `{entry}` (expected id=url)"))?;
            let id: u64 = id
                .trim()
                .parse()
                .map_err(|e| format!("Invalid mock chain id `{id}`: {e}"))?;
            overrides.push((id, url.trim().to_string()));
        }
        Ok(Self::with_overrides(overrides))
    }
}

/// Production preset exported by the relayer SDK (`SepoliaConfig`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerConfig {
    pub acl_contract_address: Address,
    pub kms_contract_address: Address,
    pub input_verifier_contract_address: Address,
    pub verifying_contract_address_decryption: Address,
    pub verifying_contract_address_input_verification: Address,
    pub chain_id: u64,
    pub gateway_chain_id: u64,
    pub relayer_url: String,
    /// Fields this crate does not interpret, passed through to the SDK.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// EIP-712 payload as produced by an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eip712Payload {
    pub domain: Value,
    pub types: Value,
    pub message: Value,
}

impl Eip712Payload {
    /// Build the `UserDecryptRequestVerification` payload.
    pub fn user_decrypt(
        chain_id: u64,
        verifying_contract: Address,
        public_key: &str,
        contract_addresses: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> Self {
        let contracts: Vec<String> = contract_addresses
            .iter()
            .map(|a| a.to_checksum(None))
            .collect();

        Self {
            domain: json!({
                "name": "Decryption",
                "version": "1",
                "chainId": format!("{chain_id:#x}"),
                "verifyingContract": verifying_contract.to_checksum(None),
            }),
            types: json!({
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" },
                ],
                USER_DECRYPT_PRIMARY_TYPE: [
                    { "name": "publicKey", "type": "bytes" },
                    { "name": "contractAddresses", "type": "address[]" },
                    { "name": "startTimestamp", "type": "uint256" },
                    { "name": "durationDays", "type": "uint256" },
                    { "name": "extraData", "type": "bytes" },
                ],
            }),
            message: json!({
                "publicKey": ensure_hex_prefix(public_key),
                "contractAddresses": contracts,
                "startTimestamp": start_timestamp.to_string(),
                "durationDays": duration_days.to_string(),
                "extraData": "0x00",
            }),
        }
    }

    /// Typed data restricted to the user-decrypt primary type.
    pub fn typed_data(&self) -> Result<TypedData, FhevmError> {
        let verification = self
            .types
            .get(USER_DECRYPT_PRIMARY_TYPE)
            .cloned()
            .ok_or_else(|| {
                FhevmError::MalformedTypedData(format!("missing {USER_DECRYPT_PRIMARY_TYPE} type"))
            })?;

        serde_json::from_value(json!({
            "types": { USER_DECRYPT_PRIMARY_TYPE: verification },
            "primaryType": USER_DECRYPT_PRIMARY_TYPE,
            "domain": self.domain,
            "message": self.message,
        }))
        .map_err(|e| FhevmError::MalformedTypedData(e.to_string()))
    }

    /// Hash that the user signs.
    pub fn signing_hash(&self) -> Result<B256, FhevmError> {
        self.typed_data()?
            .eip712_signing_hash()
            .map_err(|e| FhevmError::MalformedTypedData(e.to_string()))
    }
}

fn ensure_hex_prefix(value: &str) -> String {
    if value.starts_with("0x") {
        value.to_string()
    } else {
        format!("0x{value}")
    }
}

/// One ciphertext to decrypt, with the contract that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleContractPair {
    pub handle: CiphertextHandle,
    pub contract_address: Address,
}

/// Arguments of a batched user-decrypt call.
#[derive(Debug, Clone)]
pub struct UserDecryptRequest {
    pub items: Vec<HandleContractPair>,
    pub private_key: String,
    pub public_key: String,
    pub signature: String,
    pub contract_addresses: Vec<Address>,
    pub user_address: Address,
    pub start_timestamp: u64,
    pub duration_days: u64,
}
