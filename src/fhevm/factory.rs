// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Instance creation.
//!
//! [`InstanceFactory::create`] resolves the endpoint, picks the mock or the
//! production path, and reports its progress through a [`StatusLog`]. The
//! caller's cancellation token is checked between every asynchronous step;
//! once it fires no further status is emitted and `FhevmError::Cancelled` is
//! returned.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::instance::FhevmInstance;
use super::mock::MockInstance;
use super::resolver::{probe_relayer_metadata, resolve, select_strategy, Endpoint, Strategy};
use super::sdk::SdkRegistry;
use super::types::{MockChains, RelayerMetadata};
use crate::blockchain::client::{RpcConnector, RpcTransport};
use crate::error::FhevmError;

const STATUS_CHANNEL_CAPACITY: usize = 16;

/// Progress of an instance creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactoryStatus {
    SdkLoading,
    SdkLoaded,
    SdkInitializing,
    SdkInitialized,
    Creating,
    /// A development chain id whose node gave no FHEVM metadata; the
    /// production path is used instead.
    MockFallback,
}

impl FactoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactoryStatus::SdkLoading => "sdk-loading",
            FactoryStatus::SdkLoaded => "sdk-loaded",
            FactoryStatus::SdkInitializing => "sdk-initializing",
            FactoryStatus::SdkInitialized => "sdk-initialized",
            FactoryStatus::Creating => "creating",
            FactoryStatus::MockFallback => "mock-fallback",
        }
    }
}

impl fmt::Display for FactoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered record of status notifications, with live subscription.
pub struct StatusLog {
    history: Mutex<Vec<FactoryStatus>>,
    sender: broadcast::Sender<FactoryStatus>,
}

impl StatusLog {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            history: Mutex::new(Vec::new()),
            sender,
        }
    }

    pub fn record(&self, status: FactoryStatus) {
        tracing::debug!(status = %status, "FHEVM instance status");
        self.history().push(status);
        // No subscribers is fine.
        let _ = self.sender.send(status);
    }

    pub fn snapshot(&self) -> Vec<FactoryStatus> {
        self.history().clone()
    }

    pub fn last(&self) -> Option<FactoryStatus> {
        self.history().last().copied()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FactoryStatus> {
        self.sender.subscribe()
    }

    pub fn clear(&self) {
        self.history().clear();
    }

    fn history(&self) -> MutexGuard<'_, Vec<FactoryStatus>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StatusLog {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<(), FhevmError> {
    if cancel.is_cancelled() {
        Err(FhevmError::Cancelled)
    } else {
        Ok(())
    }
}

fn emit(status: Option<&StatusLog>, value: FactoryStatus) {
    if let Some(log) = status {
        log.record(value);
    }
}

pub struct InstanceFactory {
    registry: Arc<SdkRegistry>,
    connector: Arc<dyn RpcConnector>,
}

impl InstanceFactory {
    pub fn new(registry: Arc<SdkRegistry>, connector: Arc<dyn RpcConnector>) -> Self {
        Self {
            registry,
            connector,
        }
    }

    pub fn registry(&self) -> &Arc<SdkRegistry> {
        &self.registry
    }

    /// Build an instance for `endpoint`.
    pub async fn create(
        &self,
        endpoint: &Endpoint,
        mock_chains: &MockChains,
        cancel: &CancellationToken,
        status: Option<&StatusLog>,
    ) -> Result<Arc<dyn FhevmInstance>, FhevmError> {
        let resolution = resolve(endpoint, mock_chains).await?;
        ensure_active(cancel)?;

        let (transport, metadata) = if resolution.is_mock {
            let rpc_url = resolution.rpc_url.as_deref().ok_or_else(|| {
                FhevmError::Config(format!(
                    "no RPC URL known for development chain {}",
                    resolution.chain_id
                ))
            })?;
            let transport = self.connector.connect(rpc_url)?;
            let metadata = probe_relayer_metadata(transport.as_ref()).await?;
            ensure_active(cancel)?;
            (Some(transport), metadata)
        } else {
            (None, None)
        };

        match select_strategy(&resolution, metadata) {
            Strategy::Mock(metadata) => {
                let transport = transport.ok_or_else(|| {
                    FhevmError::Config("development chain has no transport".to_string())
                })?;
                self.create_mock(transport, resolution.chain_id, metadata, cancel, status)
            }
            Strategy::Production {
                downgraded_from_mock,
            } => {
                if downgraded_from_mock {
                    tracing::warn!(
                        chain_id = resolution.chain_id,
                        "Development chain id without FHEVM node metadata, using relayer SDK"
                    );
                    emit(status, FactoryStatus::MockFallback);
                }
                self.create_production(endpoint, cancel, status).await
            }
        }
    }

    fn create_mock(
        &self,
        transport: Arc<dyn RpcTransport>,
        chain_id: u64,
        metadata: RelayerMetadata,
        cancel: &CancellationToken,
        status: Option<&StatusLog>,
    ) -> Result<Arc<dyn FhevmInstance>, FhevmError> {
        emit(status, FactoryStatus::Creating);
        let instance = MockInstance::new(transport, chain_id, metadata);
        ensure_active(cancel)?;
        tracing::info!(chain_id, acl = %metadata.acl_address, "Created mock FHEVM instance");
        Ok(Arc::new(instance))
    }

    async fn create_production(
        &self,
        endpoint: &Endpoint,
        cancel: &CancellationToken,
        status: Option<&StatusLog>,
    ) -> Result<Arc<dyn FhevmInstance>, FhevmError> {
        ensure_active(cancel)?;

        if !self.registry.is_loaded() {
            emit(status, FactoryStatus::SdkLoading);
            self.registry.load().await?;
            ensure_active(cancel)?;
            emit(status, FactoryStatus::SdkLoaded);
        }

        let sdk = self.registry.verified().ok_or_else(|| {
            FhevmError::InvalidCapability("relayer SDK is unavailable after load".to_string())
        })?;

        if !sdk.is_initialized() {
            emit(status, FactoryStatus::SdkInitializing);
            self.registry.initialize().await?;
            ensure_active(cancel)?;
            emit(status, FactoryStatus::SdkInitialized);
        }

        emit(status, FactoryStatus::Creating);
        let instance = sdk.create_instance(endpoint.clone()).await?;
        ensure_active(cancel)?;
        tracing::info!(
            chain_id = sdk.preset().chain_id,
            "Created relayer FHEVM instance"
        );
        Ok(instance)
    }
}

struct ManagerState {
    current: Option<Arc<dyn FhevmInstance>>,
    in_flight: Option<CancellationToken>,
    generation: u64,
}

/// Keeps the instance for the session's current endpoint.
///
/// Every refresh cancels the one before it and clears the current instance,
/// so a stale chain never keeps serving.
pub struct InstanceManager {
    factory: InstanceFactory,
    mock_chains: MockChains,
    status: Arc<StatusLog>,
    state: Mutex<ManagerState>,
}

impl InstanceManager {
    pub fn new(factory: InstanceFactory, mock_chains: MockChains) -> Self {
        Self {
            factory,
            mock_chains,
            status: Arc::new(StatusLog::new()),
            state: Mutex::new(ManagerState {
                current: None,
                in_flight: None,
                generation: 0,
            }),
        }
    }

    pub async fn refresh(&self, endpoint: Endpoint) -> Result<Arc<dyn FhevmInstance>, FhevmError> {
        let (token, generation) = {
            let mut state = self.lock();
            if let Some(previous) = state.in_flight.take() {
                tracing::debug!("Cancelling previous instance creation");
                previous.cancel();
            }
            state.current = None;
            state.generation += 1;
            let token = CancellationToken::new();
            state.in_flight = Some(token.clone());
            (token, state.generation)
        };
        self.status.clear();

        let result = self
            .factory
            .create(&endpoint, &self.mock_chains, &token, Some(&self.status))
            .await;

        let mut state = self.lock();
        if state.generation != generation || token.is_cancelled() {
            return Err(FhevmError::Cancelled);
        }
        state.in_flight = None;
        let instance = result?;
        state.current = Some(instance.clone());
        Ok(instance)
    }

    pub fn current(&self) -> Option<Arc<dyn FhevmInstance>> {
        self.lock().current.clone()
    }

    pub fn status(&self) -> &Arc<StatusLog> {
        &self.status
    }

    /// Abort the creation in flight, if any.
    pub fn cancel(&self) {
        if let Some(token) = self.lock().in_flight.take() {
            token.cancel();
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
