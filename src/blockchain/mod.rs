// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Host-chain integration for the FHEVM session.
//!
//! This module provides functionality for:
//! - Raw JSON-RPC access (chain id, client version, accounts)
//! - The FriendCircle contract binding
//! - Signer construction and wallet connection
//! - Write confirmation and amount parsing

pub mod client;
pub mod friend_circle;
pub mod signing;
pub mod transactions;
pub mod types;

pub use client::{ChainClient, ChainClientError, HttpConnector, RpcConnector, RpcTransport};
pub use friend_circle::AlloyCircleContract;
pub use signing::{create_signer, LocalWallet, WalletConnector};
pub use transactions::{confirmed_receipt, format_amount, parse_amount};
pub use types::*;
