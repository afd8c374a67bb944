// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! FriendCircle contract interactions.

use std::str::FromStr;

use alloy::{
    primitives::{Address, Bytes, U256},
    providers::Provider,
    sol,
};
use async_trait::async_trait;

use super::client::ChainClientError;
use super::transactions::confirmed_receipt;
use super::types::TxReceipt;
use crate::circle::contract::{CircleContract, Post};
use crate::fhevm::CiphertextHandle;

sol! {
    #[sol(rpc)]
    interface IFriendCircle {
        function createPost(string text, string ipfsHash) external;
        function like(uint256 postId, bytes32 encryptedOne, bytes inputProof) external payable;
        function tip(uint256 postId) external payable;
        function getPost(uint256 postId) external view returns (address author, string text, string ipfsHash, uint256 timestamp);
        function postCount() external view returns (uint256);
        function likeFeeWei() external view returns (uint256);
        function getEncryptedLikeCount(uint256 postId) external view returns (bytes32);
        function getEncryptedTipTotal(uint256 postId) external view returns (bytes32);
        function grantDecryptForPost(uint256 postId) external;
    }
}

/// FriendCircle contract wrapper over an alloy provider.
///
/// Use a wallet-enabled provider when writes are needed; a read-only
/// provider is enough for listing and handle queries.
pub struct AlloyCircleContract<P> {
    contract: IFriendCircle::IFriendCircleInstance<P>,
    address: Address,
}

impl<P: Provider + Clone> AlloyCircleContract<P> {
    pub fn new(provider: &P, contract_address: &str) -> Result<Self, ChainClientError> {
        let address = Address::from_str(contract_address.trim())
            .map_err(|e| ChainClientError::InvalidAddress(e.to_string()))?;

        let contract = IFriendCircle::new(address, provider.clone());

        Ok(Self { contract, address })
    }
}

fn contract_error(e: impl std::fmt::Display) -> ChainClientError {
    ChainClientError::ContractError(e.to_string())
}

#[async_trait]
impl<P> CircleContract for AlloyCircleContract<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    fn address(&self) -> Address {
        self.address
    }

    async fn create_post(&self, text: &str, ipfs_hash: &str) -> Result<TxReceipt, ChainClientError> {
        let receipt = self
            .contract
            .createPost(text.to_string(), ipfs_hash.to_string())
            .send()
            .await
            .map_err(contract_error)?
            .get_receipt()
            .await
            .map_err(|e| ChainClientError::TransactionFailed(e.to_string()))?;
        confirmed_receipt(&receipt)
    }

    async fn like(
        &self,
        post_id: u64,
        encrypted_one: CiphertextHandle,
        input_proof: Bytes,
        value: U256,
    ) -> Result<TxReceipt, ChainClientError> {
        let receipt = self
            .contract
            .like(U256::from(post_id), encrypted_one.as_b256(), input_proof)
            .value(value)
            .send()
            .await
            .map_err(contract_error)?
            .get_receipt()
            .await
            .map_err(|e| ChainClientError::TransactionFailed(e.to_string()))?;
        confirmed_receipt(&receipt)
    }

    async fn tip(&self, post_id: u64, value: U256) -> Result<TxReceipt, ChainClientError> {
        let receipt = self
            .contract
            .tip(U256::from(post_id))
            .value(value)
            .send()
            .await
            .map_err(contract_error)?
            .get_receipt()
            .await
            .map_err(|e| ChainClientError::TransactionFailed(e.to_string()))?;
        confirmed_receipt(&receipt)
    }

    async fn get_post(&self, post_id: u64) -> Result<Option<Post>, ChainClientError> {
        let raw = self
            .contract
            .getPost(U256::from(post_id))
            .call()
            .await
            .map_err(contract_error)?;

        // Unset slots come back zeroed.
        if raw.author.is_zero() {
            return Ok(None);
        }

        let timestamp = u64::try_from(raw.timestamp)
            .map_err(|_| contract_error(format!("post {post_id} timestamp out of range")))?;

        Ok(Some(Post {
            author: raw.author,
            text: raw.text,
            ipfs_hash: raw.ipfsHash,
            timestamp,
        }))
    }

    async fn post_count(&self) -> Result<U256, ChainClientError> {
        self.contract.postCount().call().await.map_err(contract_error)
    }

    async fn like_fee_wei(&self) -> Result<U256, ChainClientError> {
        self.contract.likeFeeWei().call().await.map_err(contract_error)
    }

    async fn encrypted_like_count(&self, post_id: u64) -> Result<CiphertextHandle, ChainClientError> {
        self.contract
            .getEncryptedLikeCount(U256::from(post_id))
            .call()
            .await
            .map(CiphertextHandle::from)
            .map_err(contract_error)
    }

    async fn encrypted_tip_total(&self, post_id: u64) -> Result<CiphertextHandle, ChainClientError> {
        self.contract
            .getEncryptedTipTotal(U256::from(post_id))
            .call()
            .await
            .map(CiphertextHandle::from)
            .map_err(contract_error)
    }

    async fn grant_decrypt_for_post(&self, post_id: u64) -> Result<TxReceipt, ChainClientError> {
        let receipt = self
            .contract
            .grantDecryptForPost(U256::from(post_id))
            .send()
            .await
            .map_err(contract_error)?
            .get_receipt()
            .await
            .map_err(|e| ChainClientError::TransactionFailed(e.to_string()))?;
        confirmed_receipt(&receipt)
    }
}
