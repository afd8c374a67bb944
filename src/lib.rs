// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! fhevm-circle - Confidential FriendCircle client
//!
//! Session and authorization layer for a FriendCircle contract deployed on an
//! FHEVM chain. Likes and tip totals are stored encrypted; this crate works
//! out which FHEVM backend serves the connected chain, builds an instance for
//! it, and runs the interaction protocol on top.
//!
//! ## Modules
//!
//! - `blockchain` - JSON-RPC access, contract binding, signers
//! - `fhevm` - chain resolution, relayer SDK registry, instances, decrypt grants
//! - `circle` - FriendCircle session (posts, likes, tips, decryption)
//! - `config` - environment configuration and the deployment address book
//! - `error` - session error taxonomy

pub mod blockchain;
pub mod circle;
pub mod config;
pub mod error;
pub mod fhevm;

#[cfg(test)]
mod testing;
