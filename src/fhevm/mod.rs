// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Confidential-computation client: chain resolution, relayer SDK loading,
//! instance creation and user-decryption grants.

pub mod factory;
pub mod instance;
pub mod mock;
pub mod resolver;
pub mod sdk;
pub mod signature;
pub mod types;

pub use factory::{FactoryStatus, InstanceFactory, InstanceManager, StatusLog};
pub use instance::{EncryptedInputBuilder, FhevmInstance, InstanceKind};
pub use mock::MockInstance;
pub use resolver::{Endpoint, Strategy};
pub use sdk::{DetachedSdkSource, SdkExports, SdkRegistry, SdkSource, SdkState};
pub use signature::DecryptionSignature;
pub use types::{
    ChainResolution, CiphertextHandle, EncryptedInput, Keypair, MockChains, RelayerMetadata,
};
