// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! FriendCircle contract surface.

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::Serialize;

use crate::blockchain::{ChainClientError, TxReceipt};
use crate::fhevm::CiphertextHandle;

/// A post as stored on-chain. Engagement counters are encrypted and live
/// behind separate handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub author: Address,
    pub text: String,
    pub ipfs_hash: String,
    /// Unix seconds.
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostEntry {
    /// 1-based post id.
    pub id: u64,
    #[serde(flatten)]
    pub post: Post,
}

/// Calls the session makes against the deployed contract.
///
/// Writes resolve only after the transaction is included; a reverted
/// transaction is an error.
#[async_trait]
pub trait CircleContract: Send + Sync {
    fn address(&self) -> Address;

    async fn create_post(&self, text: &str, ipfs_hash: &str) -> Result<TxReceipt, ChainClientError>;

    /// Like with an encrypted `1`, paying `value` wei.
    async fn like(
        &self,
        post_id: u64,
        encrypted_one: CiphertextHandle,
        input_proof: Bytes,
        value: U256,
    ) -> Result<TxReceipt, ChainClientError>;

    async fn tip(&self, post_id: u64, value: U256) -> Result<TxReceipt, ChainClientError>;

    /// `None` when no post exists under `post_id`.
    async fn get_post(&self, post_id: u64) -> Result<Option<Post>, ChainClientError>;

    async fn post_count(&self) -> Result<U256, ChainClientError>;

    async fn like_fee_wei(&self) -> Result<U256, ChainClientError>;

    async fn encrypted_like_count(&self, post_id: u64) -> Result<CiphertextHandle, ChainClientError>;

    async fn encrypted_tip_total(&self, post_id: u64) -> Result<CiphertextHandle, ChainClientError>;

    /// Grant the caller ACL permission on the post's encrypted counters.
    async fn grant_decrypt_for_post(&self, post_id: u64) -> Result<TxReceipt, ChainClientError>;
}
