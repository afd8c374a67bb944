// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User-decryption grants.
//!
//! A [`DecryptionSignature`] is the wallet's EIP-712 signature over "this
//! keypair may decrypt values of these contracts for this long". It is built
//! per decrypt call and never stored.

use std::collections::BTreeSet;

use alloy::{hex, primitives::Address, signers::Signer};
use chrono::Utc;

use super::instance::FhevmInstance;
use super::types::{
    Eip712Payload, HandleContractPair, Keypair, UserDecryptRequest, DEFAULT_DURATION_DAYS,
};
use crate::error::FhevmError;

const SECONDS_PER_DAY: u64 = 86_400;

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct DecryptionSignature {
    keypair: Keypair,
    signature: String,
    user_address: Address,
    contract_addresses: Vec<Address>,
    start_timestamp: u64,
    duration_days: u64,
    eip712: Eip712Payload,
}

impl DecryptionSignature {
    /// Ask `signer` to authorize `keypair` for `contract_addresses`, starting
    /// now and valid for [`DEFAULT_DURATION_DAYS`].
    ///
    /// Returns `None` when the payload cannot be built or the signer refuses;
    /// the reason is logged.
    pub async fn new<S>(
        instance: &dyn FhevmInstance,
        contract_addresses: &[Address],
        keypair: Keypair,
        signer: &S,
    ) -> Option<Self>
    where
        S: Signer + Send + Sync,
    {
        match Self::sign(instance, contract_addresses, keypair, signer).await {
            Ok(signature) => Some(signature),
            Err(e) => {
                tracing::warn!(error = %e, "Could not obtain decryption signature");
                None
            }
        }
    }

    async fn sign<S>(
        instance: &dyn FhevmInstance,
        contract_addresses: &[Address],
        keypair: Keypair,
        signer: &S,
    ) -> Result<Self, FhevmError>
    where
        S: Signer + Send + Sync,
    {
        let start_timestamp = unix_now();
        let duration_days = DEFAULT_DURATION_DAYS;
        let eip712 = instance.create_eip712(
            &keypair.public_key,
            contract_addresses,
            start_timestamp,
            duration_days,
        )?;
        let typed = eip712.typed_data()?;

        let signature = signer
            .sign_dynamic_typed_data(&typed)
            .await
            .map_err(|e| FhevmError::SignatureDenied(e.to_string()))?;

        Ok(Self {
            keypair,
            signature: hex::encode_prefixed(signature.as_bytes()),
            user_address: signer.address(),
            contract_addresses: contract_addresses.to_vec(),
            start_timestamp,
            duration_days,
            eip712,
        })
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// `0x`-prefixed 65-byte signature.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn user_address(&self) -> Address {
        self.user_address
    }

    pub fn contract_addresses(&self) -> &[Address] {
        &self.contract_addresses
    }

    pub fn start_timestamp(&self) -> u64 {
        self.start_timestamp
    }

    pub fn duration_days(&self) -> u64 {
        self.duration_days
    }

    pub fn eip712(&self) -> &Eip712Payload {
        &self.eip712
    }

    pub fn expires_at(&self) -> u64 {
        self.start_timestamp
            .saturating_add(self.duration_days.saturating_mul(SECONDS_PER_DAY))
    }

    /// Whether this grant covers exactly `contracts` for `user` at `now`.
    /// Contract order does not matter.
    pub fn authorizes(&self, contracts: &[Address], user: Address, now: u64) -> bool {
        let signed: BTreeSet<&Address> = self.contract_addresses.iter().collect();
        let asked: BTreeSet<&Address> = contracts.iter().collect();
        signed == asked && user == self.user_address && now < self.expires_at()
    }

    /// Build the relayer request for `items`, refusing anything the grant
    /// does not cover.
    pub fn decrypt_request(
        &self,
        items: Vec<HandleContractPair>,
        contracts: &[Address],
        user: Address,
    ) -> Result<UserDecryptRequest, FhevmError> {
        if !self.authorizes(contracts, user, unix_now()) {
            return Err(FhevmError::GrantMismatch(format!(
                "grant for {} over {:?} does not cover {user} over {contracts:?}",
                self.user_address, self.contract_addresses
            )));
        }
        if let Some(stray) = items
            .iter()
            .find(|item| !self.contract_addresses.contains(&item.contract_address))
        {
            return Err(FhevmError::GrantMismatch(format!(
                "handle {} belongs to {}, which the grant does not cover",
                stray.handle, stray.contract_address
            )));
        }

        Ok(UserDecryptRequest {
            items,
            private_key: self.keypair.private_key.clone(),
            public_key: self.keypair.public_key.clone(),
            signature: self.signature.clone(),
            contract_addresses: self.contract_addresses.clone(),
            user_address: self.user_address,
            start_timestamp: self.start_timestamp,
            duration_days: self.duration_days,
        })
    }
}
