// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Write confirmation and amount handling.
//!
//! Every FriendCircle write is awaited to inclusion; a mined-but-reverted
//! transaction is reported as [`ChainClientError::TransactionFailed`].

use alloy::{network::ReceiptResponse, primitives::U256, rpc::types::TransactionReceipt};

use super::client::ChainClientError;
use super::types::TxReceipt;

/// Convert an alloy receipt, rejecting reverted transactions.
pub fn confirmed_receipt(receipt: &TransactionReceipt) -> Result<TxReceipt, ChainClientError> {
    let tx = TxReceipt {
        tx_hash: format!("{:?}", receipt.transaction_hash),
        block_number: receipt.block_number.unwrap_or(0),
        gas_used: receipt.gas_used,
        success: ReceiptResponse::status(receipt),
    };

    if !tx.success {
        return Err(ChainClientError::TransactionFailed(format!(
            "{} reverted in block {}",
            tx.tx_hash, tx.block_number
        )));
    }

    tracing::debug!(
        tx_hash = %tx.tx_hash,
        block = tx.block_number,
        gas_used = tx.gas_used,
        "Transaction confirmed"
    );

    Ok(tx)
}

/// Parse a human-readable amount to wei.
///
/// # Arguments
/// * `amount` - Amount as a string (e.g., "0.0001")
/// * `decimals` - Number of decimals (18 for ETH)
pub fn parse_amount(amount: &str, decimals: u8) -> Result<U256, ChainClientError> {
    let parts: Vec<&str> = amount.trim().split('.').collect();

    if parts.len() > 2 || parts[0].is_empty() {
        return Err(ChainClientError::InvalidAmount(format!(
            "Invalid amount format: {amount}"
        )));
    }

    let whole = U256::from_str_radix(parts[0], 10)
        .map_err(|_| ChainClientError::InvalidAmount("Invalid whole number".to_string()))?;

    let decimal_part = if parts.len() == 2 {
        let dec_str = parts[1];
        if dec_str.len() > decimals as usize {
            return Err(ChainClientError::InvalidAmount(format!(
                "Too many decimal places (max {decimals})"
            )));
        }
        // Pad with zeros to match decimals
        let padded = format!("{:0<width$}", dec_str, width = decimals as usize);
        U256::from_str_radix(&padded, 10)
            .map_err(|_| ChainClientError::InvalidAmount("Invalid decimal".to_string()))?
    } else {
        U256::ZERO
    };

    let multiplier = U256::from(10u64).pow(U256::from(decimals));
    whole
        .checked_mul(multiplier)
        .and_then(|w| w.checked_add(decimal_part))
        .ok_or_else(|| ChainClientError::InvalidAmount("Amount overflow".to_string()))
}

/// Format wei to a human-readable amount.
pub fn format_amount(amount: U256, decimals: u8) -> String {
    if amount.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let whole = amount / divisor;
    let remainder = amount % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let decimal_str = format!("{:0>width$}", remainder, width = decimals as usize);
        let trimmed = decimal_str.trim_end_matches('0');
        format!("{}.{}", whole, trimmed)
    }
}
