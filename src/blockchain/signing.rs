// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signer construction and wallet connection.
//!
//! A session obtains its signer once through a [`WalletConnector`] and keeps
//! it for its whole lifetime; reconnecting means building a new session.

use alloy::{
    network::EthereumWallet,
    signers::{local::PrivateKeySigner, Signer},
};
use async_trait::async_trait;

use super::client::ChainClientError;

/// Source of the signing identity for a session.
#[async_trait]
pub trait WalletConnector: Send + Sync {
    /// Signer handed out by this connector.
    type Signer: Signer + Send + Sync + 'static;

    /// Obtain the signer. May prompt the wallet owner.
    async fn connect(&self) -> Result<Self::Signer, ChainClientError>;
}

/// Wallet backed by a locally held private key.
///
/// A wallet without a key can still back read-only sessions; connecting it
/// fails.
#[derive(Clone, Default)]
pub struct LocalWallet {
    signer: Option<PrivateKeySigner>,
}

impl LocalWallet {
    /// Create a wallet from a hex private key (with or without `0x`).
    pub fn from_hex(private_key_hex: &str) -> Result<Self, ChainClientError> {
        Ok(Self::new(create_signer(private_key_hex)?))
    }

    pub fn new(signer: PrivateKeySigner) -> Self {
        Self {
            signer: Some(signer),
        }
    }

    /// Wallet with no key.
    pub fn unset() -> Self {
        Self { signer: None }
    }

    /// Ethereum wallet for the transaction-sending provider.
    pub fn ethereum_wallet(&self) -> Option<EthereumWallet> {
        self.signer.clone().map(EthereumWallet::from)
    }
}

#[async_trait]
impl WalletConnector for LocalWallet {
    type Signer = PrivateKeySigner;

    async fn connect(&self) -> Result<PrivateKeySigner, ChainClientError> {
        self.signer.clone().ok_or_else(|| {
            ChainClientError::InvalidPrivateKey("no private key configured".to_string())
        })
    }
}

/// Create a signer from a private key hex string.
///
/// # Arguments
/// * `private_key_hex` - Hex-encoded private key (64 characters, `0x` optional)
pub fn create_signer(private_key_hex: &str) -> Result<PrivateKeySigner, ChainClientError> {
    let trimmed = private_key_hex.trim();
    let key_bytes = alloy::hex::decode(trimmed)
        .map_err(|e| ChainClientError::InvalidPrivateKey(e.to_string()))?;

    if key_bytes.len() != 32 {
        return Err(ChainClientError::InvalidPrivateKey(format!(
            "expected 32 bytes, got {}",
            key_bytes.len()
        )));
    }

    PrivateKeySigner::from_slice(&key_bytes)
        .map_err(|e| ChainClientError::InvalidPrivateKey(e.to_string()))
}
