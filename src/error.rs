// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session-level error taxonomy.
//!
//! `FhevmError` is `Clone` because a single SDK load outcome is handed to
//! every caller waiting on it.

use crate::blockchain::ChainClientError;

/// Substring the relayer uses when the caller holds no decrypt grant.
pub const NOT_AUTHORIZED_PATTERN: &str = "not authorized";

#[derive(Debug, Clone, thiserror::Error)]
pub enum FhevmError {
    /// Aborted through the caller's cancellation token.
    #[error("FHEVM operation was cancelled")]
    Cancelled,

    /// The relayer SDK resource could not be injected.
    #[error("Failed to load relayer SDK from {url}: {reason}")]
    SdkLoad { url: String, reason: String },

    /// The SDK is present but does not expose the expected capabilities.
    #[error("Relayer SDK capability check failed: {0}")]
    InvalidCapability(String),

    /// The SDK init routine reported failure.
    #[error("Relayer SDK initialization failed: {0}")]
    Initialization(String),

    /// The wallet declined or could not produce the typed-data signature.
    #[error("Typed-data signature was not produced: {0}")]
    SignatureDenied(String),

    #[error("Malformed EIP-712 payload: {0}")]
    MalformedTypedData(String),

    /// The relayer refused to decrypt because no grant is registered.
    #[error("Decryption not authorized: {0}")]
    NotAuthorized(String),

    /// A decryption signature was presented for a contract set or identity
    /// it was not issued for, or after it expired.
    #[error("Decryption grant does not cover this request: {0}")]
    GrantMismatch(String),

    #[error("Relayer request failed: {0}")]
    Relayer(String),

    #[error("No FHEVM instance is available for this session")]
    InstanceUnavailable,

    #[error("Another operation is already in progress")]
    Busy,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Chain(#[from] ChainClientError),
}

impl FhevmError {
    /// Reclassify a relayer failure whose message says the caller lacks a
    /// decrypt grant. Everything else is returned unchanged.
    pub fn classify_decrypt_failure(self) -> Self {
        match self {
            FhevmError::Relayer(msg) if msg.contains(NOT_AUTHORIZED_PATTERN) => {
                FhevmError::NotAuthorized(msg)
            }
            FhevmError::Chain(ChainClientError::RpcError(msg))
                if msg.contains(NOT_AUTHORIZED_PATTERN) =>
            {
                FhevmError::NotAuthorized(msg)
            }
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FhevmError::Cancelled)
    }
}
