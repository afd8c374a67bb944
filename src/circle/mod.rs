// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! FriendCircle interaction protocol: posts, encrypted likes, tips and
//! per-post decryption.

pub mod contract;
pub mod session;

pub use contract::{CircleContract, Post, PostEntry};
pub use session::{
    CircleSession, PostStats, DECRYPT_NOT_AUTHORIZED_MESSAGE, DECRYPT_UNAVAILABLE_MESSAGE,
};
