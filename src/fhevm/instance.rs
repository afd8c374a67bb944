// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session-bound FHEVM capability.
//!
//! An instance is scoped to one (endpoint, chain) pair. It is created by the
//! [`InstanceFactory`](super::factory::InstanceFactory), either as the local
//! mock or through the relayer SDK, and is never persisted.

use std::collections::HashMap;
use std::fmt;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use super::types::{CiphertextHandle, Eip712Payload, EncryptedInput, Keypair, UserDecryptRequest};
use crate::error::FhevmError;

/// Which backend produced an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceKind {
    /// In-process emulator bound to a development node.
    Mock,
    /// Production relayer SDK.
    Relayer,
}

impl fmt::Display for InstanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKind::Mock => write!(f, "mock"),
            InstanceKind::Relayer => write!(f, "relayer"),
        }
    }
}

#[async_trait]
pub trait FhevmInstance: Send + Sync {
    fn kind(&self) -> InstanceKind;

    fn chain_id(&self) -> u64;

    /// Fresh keypair for a single decryption grant.
    fn generate_keypair(&self) -> Result<Keypair, FhevmError>;

    /// Start an encrypted input bound to `(contract, user)`.
    fn create_encrypted_input(
        &self,
        contract_address: Address,
        user_address: Address,
    ) -> Box<dyn EncryptedInputBuilder>;

    /// Typed-data payload authorizing decryption for `contract_addresses`.
    fn create_eip712(
        &self,
        public_key: &str,
        contract_addresses: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> Result<Eip712Payload, FhevmError>;

    /// Batched user decryption. Returns plaintext per requested handle.
    async fn user_decrypt(
        &self,
        request: UserDecryptRequest,
    ) -> Result<HashMap<CiphertextHandle, U256>, FhevmError>;
}

#[async_trait]
pub trait EncryptedInputBuilder: Send {
    /// Append a 32-bit plaintext.
    fn add32(&mut self, value: u32);

    /// Encrypt everything added so far.
    async fn encrypt(self: Box<Self>) -> Result<EncryptedInput, FhevmError>;
}
