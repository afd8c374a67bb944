// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Instance for development nodes that embed the FHEVM mock.
//!
//! Nothing is actually encrypted. Handles are derived deterministically from
//! the input binding, the ACL on the node decides who may decrypt, and the
//! node reveals cleartexts through `fhevm_getClearText`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy::{
    hex,
    primitives::{keccak256, Address, Bytes, Signature, B256, U256},
    signers::local::PrivateKeySigner,
    sol,
    sol_types::SolCall,
};
use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use serde_json::{json, Value};

use super::instance::{EncryptedInputBuilder, FhevmInstance, InstanceKind};
use super::types::{
    CiphertextHandle, Eip712Payload, EncryptedInput, Keypair, RelayerMetadata,
    UserDecryptRequest,
};
use crate::blockchain::client::RpcTransport;
use crate::error::FhevmError;

/// Node RPC that reveals mock cleartexts.
pub const CLEAR_TEXT_METHOD: &str = "fhevm_getClearText";

/// Longest grant the relayer accepts.
pub const MAX_DURATION_DAYS: u64 = 365;

const SECONDS_PER_DAY: u64 = 86_400;

/// Handle type byte for `euint32`.
const EUINT32_TYPE: u8 = 4;
const HANDLE_VERSION: u8 = 0;

sol! {
    interface IAcl {
        function persistAllowed(bytes32 handle, address account) external view returns (bool);
    }
}

pub struct MockInstance {
    transport: Arc<dyn RpcTransport>,
    chain_id: u64,
    metadata: RelayerMetadata,
    input_nonce: AtomicU64,
}

impl MockInstance {
    pub fn new(transport: Arc<dyn RpcTransport>, chain_id: u64, metadata: RelayerMetadata) -> Self {
        Self {
            transport,
            chain_id,
            metadata,
            input_nonce: AtomicU64::new(0),
        }
    }

    pub fn metadata(&self) -> &RelayerMetadata {
        &self.metadata
    }

    fn verify_grant(&self, request: &UserDecryptRequest, now: u64) -> Result<(), FhevmError> {
        if !(1..=MAX_DURATION_DAYS).contains(&request.duration_days) {
            return Err(FhevmError::Relayer(format!(
                "durationDays must be between 1 and {MAX_DURATION_DAYS}, got {}",
                request.duration_days
            )));
        }
        if request.start_timestamp > now {
            return Err(FhevmError::Relayer(
                "startTimestamp is in the future".to_string(),
            ));
        }
        let expires_at = request.start_timestamp + request.duration_days * SECONDS_PER_DAY;
        if now >= expires_at {
            return Err(FhevmError::Relayer("decryption grant has expired".to_string()));
        }

        for item in &request.items {
            if !request.contract_addresses.contains(&item.contract_address) {
                return Err(FhevmError::Relayer(format!(
                    "contract {} is not covered by the signed request",
                    item.contract_address
                )));
            }
        }

        let payload = self.create_eip712(
            &request.public_key,
            &request.contract_addresses,
            request.start_timestamp,
            request.duration_days,
        )?;
        let hash = payload.signing_hash()?;
        let raw = hex::decode(&request.signature)
            .map_err(|e| FhevmError::Relayer(format!("signature is not hex: {e}")))?;
        let signature = Signature::from_raw(&raw)
            .map_err(|e| FhevmError::Relayer(format!("invalid signature: {e}")))?;
        let signer = signature
            .recover_address_from_prehash(&hash)
            .map_err(|e| FhevmError::Relayer(format!("invalid signature: {e}")))?;

        if signer != request.user_address {
            return Err(FhevmError::Relayer(format!(
                "signature was produced by {signer}, not {}",
                request.user_address
            )));
        }
        Ok(())
    }

    async fn persist_allowed(
        &self,
        handle: CiphertextHandle,
        account: Address,
    ) -> Result<bool, FhevmError> {
        let call = IAcl::persistAllowedCall {
            handle: handle.as_b256(),
            account,
        };
        let params = json!([
            { "to": self.metadata.acl_address, "data": hex::encode_prefixed(call.abi_encode()) },
            "latest"
        ]);
        let raw = self.transport.request("eth_call", params).await?;
        let data = raw
            .as_str()
            .ok_or_else(|| FhevmError::Relayer(format!("ACL returned {raw}")))?;
        let bytes =
            hex::decode(data).map_err(|e| FhevmError::Relayer(format!("ACL returned {data}: {e}")))?;

        IAcl::persistAllowedCall::abi_decode_returns(&bytes)
            .map_err(|e| FhevmError::Relayer(format!("ACL returned {data}: {e}")))
    }

    async fn clear_texts(&self, handles: &[CiphertextHandle]) -> Result<Vec<U256>, FhevmError> {
        let raw = self
            .transport
            .request(CLEAR_TEXT_METHOD, json!([handles]))
            .await?;
        let values = raw
            .as_array()
            .ok_or_else(|| FhevmError::Relayer(format!("{CLEAR_TEXT_METHOD} returned {raw}")))?;

        if values.len() != handles.len() {
            return Err(FhevmError::Relayer(format!(
                "{CLEAR_TEXT_METHOD} returned {} values for {} handles",
                values.len(),
                handles.len()
            )));
        }
        values.iter().map(parse_clear_text).collect()
    }
}

#[async_trait]
impl FhevmInstance for MockInstance {
    fn kind(&self) -> InstanceKind {
        InstanceKind::Mock
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn generate_keypair(&self) -> Result<Keypair, FhevmError> {
        let signer = PrivateKeySigner::random();
        let key: &SigningKey = signer.credential();
        let public = key.verifying_key().to_encoded_point(true);

        Ok(Keypair {
            public_key: hex::encode_prefixed(public.as_bytes()),
            private_key: hex::encode_prefixed(key.to_bytes()),
        })
    }

    fn create_encrypted_input(
        &self,
        contract_address: Address,
        user_address: Address,
    ) -> Box<dyn EncryptedInputBuilder> {
        Box::new(MockInputBuilder {
            chain_id: self.chain_id,
            acl_address: self.metadata.acl_address,
            contract_address,
            user_address,
            nonce: self.input_nonce.fetch_add(1, Ordering::Relaxed),
            values: Vec::new(),
        })
    }

    fn create_eip712(
        &self,
        public_key: &str,
        contract_addresses: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> Result<Eip712Payload, FhevmError> {
        Ok(Eip712Payload::user_decrypt(
            self.chain_id,
            self.metadata.kms_verifier_address,
            public_key,
            contract_addresses,
            start_timestamp,
            duration_days,
        ))
    }

    async fn user_decrypt(
        &self,
        request: UserDecryptRequest,
    ) -> Result<HashMap<CiphertextHandle, U256>, FhevmError> {
        let now = super::signature::unix_now();
        self.verify_grant(&request, now)?;

        for item in &request.items {
            if item.handle.is_empty() {
                return Err(FhevmError::Relayer(
                    "the empty handle cannot be decrypted".to_string(),
                ));
            }
            for (role, account) in [
                ("User", request.user_address),
                ("Contract", item.contract_address),
            ] {
                if !self.persist_allowed(item.handle, account).await? {
                    return Err(FhevmError::Relayer(format!(
                        "{role} {account} is not authorized to user decrypt handle {}!",
                        item.handle
                    )));
                }
            }
        }

        let handles: Vec<CiphertextHandle> = request.items.iter().map(|i| i.handle).collect();
        let values = self.clear_texts(&handles).await?;
        tracing::debug!(count = handles.len(), "Mock user decryption served");
        Ok(handles.into_iter().zip(values).collect())
    }
}

struct MockInputBuilder {
    chain_id: u64,
    acl_address: Address,
    contract_address: Address,
    user_address: Address,
    nonce: u64,
    values: Vec<u32>,
}

impl MockInputBuilder {
    fn handle(&self, index: u8, value: u32) -> CiphertextHandle {
        let mut preimage = Vec::with_capacity(20 * 3 + 8 + 1 + 4 + 8);
        preimage.extend_from_slice(self.acl_address.as_slice());
        preimage.extend_from_slice(self.contract_address.as_slice());
        preimage.extend_from_slice(self.user_address.as_slice());
        preimage.extend_from_slice(&self.chain_id.to_be_bytes());
        preimage.push(index);
        preimage.extend_from_slice(&value.to_be_bytes());
        preimage.extend_from_slice(&self.nonce.to_be_bytes());
        let digest = keccak256(&preimage);

        // hash[0..21] | index | chain id (8 bytes BE) | type | version
        let mut raw = [0u8; 32];
        raw[..21].copy_from_slice(&digest[..21]);
        raw[21] = index;
        raw[22..30].copy_from_slice(&self.chain_id.to_be_bytes());
        raw[30] = EUINT32_TYPE;
        raw[31] = HANDLE_VERSION;
        CiphertextHandle(B256::from(raw))
    }
}

#[async_trait]
impl EncryptedInputBuilder for MockInputBuilder {
    fn add32(&mut self, value: u32) {
        self.values.push(value);
    }

    async fn encrypt(self: Box<Self>) -> Result<EncryptedInput, FhevmError> {
        if self.values.is_empty() {
            return Err(FhevmError::Relayer("encrypted input is empty".to_string()));
        }
        let count = u8::try_from(self.values.len()).map_err(|_| {
            FhevmError::Relayer(format!("too many inputs: {}", self.values.len()))
        })?;

        let handles: Vec<CiphertextHandle> = self
            .values
            .iter()
            .zip(0..count)
            .map(|(value, index)| self.handle(index, *value))
            .collect();

        let mut proof = vec![count, 0];
        for handle in &handles {
            proof.extend_from_slice(handle.as_b256().as_slice());
        }
        for value in &self.values {
            proof.extend_from_slice(&value.to_be_bytes());
        }

        Ok(EncryptedInput {
            handles,
            input_proof: Bytes::from(proof),
        })
    }
}

fn parse_clear_text(value: &Value) -> Result<U256, FhevmError> {
    let bad = || FhevmError::Relayer(format!("unreadable cleartext {value}"));
    match value {
        Value::String(s) => match s.strip_prefix("0x") {
            Some(digits) => U256::from_str_radix(digits, 16).map_err(|_| bad()),
            None => U256::from_str_radix(s, 10).map_err(|_| bad()),
        },
        Value::Number(n) => n.as_u64().map(U256::from).ok_or_else(bad),
        Value::Bool(b) => Ok(U256::from(u8::from(*b))),
        _ => Err(bad()),
    }
}
