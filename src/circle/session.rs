// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User-facing FriendCircle session.
//!
//! A session ties one contract, one wallet and (optionally) one FHEVM
//! instance together. Writes and decrypts are mutually exclusive: while one
//! is running the session is busy and further writes are refused with
//! [`FhevmError::Busy`]. Reads never take the busy flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use alloy::{
    primitives::{Address, U256},
    signers::Signer,
};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::OnceCell;

use super::contract::{CircleContract, Post, PostEntry};
use crate::blockchain::{ChainClientError, TxReceipt, WalletConnector};
use crate::error::FhevmError;
use crate::fhevm::types::HandleContractPair;
use crate::fhevm::{CiphertextHandle, DecryptionSignature, FhevmInstance};

/// Shown when the relayer reports that the caller has no decrypt grant.
pub const DECRYPT_NOT_AUTHORIZED_MESSAGE: &str =
    "You are not allowed to decrypt this post yet. Request decrypt permission for it, \
     wait for the transaction to confirm, then try again.";

/// Shown when the wallet did not produce a decryption signature.
pub const DECRYPT_UNAVAILABLE_MESSAGE: &str =
    "Cannot decrypt right now: the wallet did not sign the decryption request.";

/// Plaintext engagement of one post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PostStats {
    pub likes: U256,
    /// Wei.
    pub tips: U256,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CircleSession<C, W: WalletConnector> {
    contract: C,
    wallet: W,
    instance: Option<Arc<dyn FhevmInstance>>,
    signer: OnceCell<Arc<W::Signer>>,
    busy: AtomicBool,
    message: Mutex<Option<String>>,
}

impl<C, W> CircleSession<C, W>
where
    C: CircleContract,
    W: WalletConnector,
{
    pub fn new(contract: C, wallet: W, instance: Option<Arc<dyn FhevmInstance>>) -> Self {
        Self {
            contract,
            wallet,
            instance,
            signer: OnceCell::new(),
            busy: AtomicBool::new(false),
            message: Mutex::new(None),
        }
    }

    pub fn contract_address(&self) -> Address {
        self.contract.address()
    }

    pub fn instance(&self) -> Option<&Arc<dyn FhevmInstance>> {
        self.instance.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Latest user-facing message, if any.
    pub fn message(&self) -> Option<String> {
        self.message
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The session's signer, connecting the wallet on first use.
    pub async fn signer(&self) -> Result<Arc<W::Signer>, FhevmError> {
        self.signer
            .get_or_try_init(|| async {
                let signer = self.wallet.connect().await?;
                tracing::info!(address = %signer.address(), "Wallet connected");
                Ok::<_, FhevmError>(Arc::new(signer))
            })
            .await
            .cloned()
    }

    pub async fn signer_address(&self) -> Result<Address, FhevmError> {
        Ok(self.signer().await?.address())
    }

    fn set_message(&self, message: impl Into<String>) {
        *self.message.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.into());
    }

    fn begin(&self) -> Result<BusyGuard<'_>, FhevmError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| FhevmError::Busy)?;
        Ok(BusyGuard(&self.busy))
    }

    fn instance_or_unavailable(&self) -> Result<Arc<dyn FhevmInstance>, FhevmError> {
        self.instance.clone().ok_or(FhevmError::InstanceUnavailable)
    }

    pub async fn create_post(&self, text: &str, ipfs_hash: &str) -> Result<TxReceipt, FhevmError> {
        let _busy = self.begin()?;
        self.signer().await?;
        let receipt = self.contract.create_post(text, ipfs_hash).await?;
        tracing::info!(tx_hash = %receipt.tx_hash, "Post created");
        self.set_message("Post published.");
        Ok(receipt)
    }

    pub async fn like_fee_wei(&self) -> Result<U256, FhevmError> {
        Ok(self.contract.like_fee_wei().await?)
    }

    /// Like `post_id` with an encrypted `1`. When `fee` is `None` the
    /// contract's current like fee is paid.
    pub async fn like(&self, post_id: u64, fee: Option<U256>) -> Result<TxReceipt, FhevmError> {
        let _busy = self.begin()?;
        let instance = self.instance_or_unavailable()?;
        let user = self.signer_address().await?;
        let contract_address = self.contract.address();

        let mut input = instance.create_encrypted_input(contract_address, user);
        input.add32(1);
        let encrypted = input.encrypt().await?;
        let handle = encrypted
            .handles
            .first()
            .copied()
            .ok_or_else(|| FhevmError::Relayer("encryption produced no handle".to_string()))?;

        let fee = match fee {
            Some(fee) => fee,
            None => self.contract.like_fee_wei().await?,
        };

        let receipt = self
            .contract
            .like(post_id, handle, encrypted.input_proof, fee)
            .await?;
        tracing::info!(post_id, tx_hash = %receipt.tx_hash, "Post liked");
        self.set_message("Like sent.");
        Ok(receipt)
    }

    pub async fn tip(&self, post_id: u64, amount_wei: U256) -> Result<TxReceipt, FhevmError> {
        let _busy = self.begin()?;
        self.signer().await?;
        let receipt = self.contract.tip(post_id, amount_wei).await?;
        tracing::info!(post_id, amount_wei = %amount_wei, tx_hash = %receipt.tx_hash, "Post tipped");
        self.set_message("Tip sent.");
        Ok(receipt)
    }

    pub async fn get_post(&self, post_id: u64) -> Result<Option<Post>, FhevmError> {
        Ok(self.contract.get_post(post_id).await?)
    }

    pub async fn post_count(&self) -> Result<u64, FhevmError> {
        let count = self.contract.post_count().await?;
        u64::try_from(count).map_err(|_| {
            ChainClientError::ContractError(format!("postCount {count} does not fit in u64")).into()
        })
    }

    /// Every existing post, in id order. Ids whose post is missing are
    /// skipped.
    pub async fn all_posts(&self) -> Result<Vec<PostEntry>, FhevmError> {
        let total = self.post_count().await?;

        let fetches = (1..=total).map(|id| async move {
            self.contract
                .get_post(id)
                .await
                .map(|post| post.map(|post| PostEntry { id, post }))
        });

        let mut entries = Vec::new();
        for fetched in join_all(fetches).await {
            if let Some(entry) = fetched? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Decrypt the like count and tip total of `post_id`.
    ///
    /// Unwritten counters decrypt to zero without a relayer round-trip. A
    /// missing grant is not an error: the stats come back as zero and
    /// [`message`](Self::message) explains what to do.
    pub async fn decrypt_post_stats(&self, post_id: u64) -> Result<PostStats, FhevmError> {
        let _busy = self.begin()?;
        let instance = self.instance_or_unavailable()?;

        let likes = self.contract.encrypted_like_count(post_id).await?;
        let tips = self.contract.encrypted_tip_total(post_id).await?;
        if likes.is_empty() && tips.is_empty() {
            tracing::debug!(post_id, "Both counters unset, skipping decryption");
            return Ok(PostStats::default());
        }

        let signer = self.signer().await?;
        let user = signer.address();
        let contract_address = self.contract.address();
        let keypair = instance.generate_keypair()?;

        let Some(grant) = DecryptionSignature::new(
            &*instance,
            &[contract_address],
            keypair,
            &*signer,
        )
        .await
        else {
            self.set_message(DECRYPT_UNAVAILABLE_MESSAGE);
            return Ok(PostStats::default());
        };

        let items: Vec<HandleContractPair> = [likes, tips]
            .into_iter()
            .filter(|handle| !handle.is_empty())
            .map(|handle| HandleContractPair {
                handle,
                contract_address,
            })
            .collect();
        let request = grant.decrypt_request(items, &[contract_address], user)?;

        match instance
            .user_decrypt(request)
            .await
            .map_err(FhevmError::classify_decrypt_failure)
        {
            Ok(values) => {
                let value = |handle: CiphertextHandle| {
                    if handle.is_empty() {
                        U256::ZERO
                    } else {
                        values.get(&handle).copied().unwrap_or(U256::ZERO)
                    }
                };
                Ok(PostStats {
                    likes: value(likes),
                    tips: value(tips),
                })
            }
            Err(FhevmError::NotAuthorized(reason)) => {
                tracing::warn!(post_id, reason = %reason, "Decryption not authorized");
                self.set_message(DECRYPT_NOT_AUTHORIZED_MESSAGE);
                Ok(PostStats::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Ask the contract to grant the caller decrypt permission on the post's
    /// counters.
    pub async fn grant_decrypt_for_post(&self, post_id: u64) -> Result<TxReceipt, FhevmError> {
        let _busy = self.begin()?;
        self.signer().await?;
        let receipt = self.contract.grant_decrypt_for_post(post_id).await?;
        tracing::info!(post_id, tx_hash = %receipt.tx_hash, "Decrypt permission granted");
        self.set_message("Decrypt permission granted. You can now decrypt this post.");
        Ok(receipt)
    }
}
