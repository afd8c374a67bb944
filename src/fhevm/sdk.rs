// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Process-wide relayer SDK registry.
//!
//! The relayer SDK is an external resource: something has to fetch it and
//! hand back its exports before any production instance can be built. The
//! registry makes sure that happens at most once per process at a time, that
//! concurrent callers share one in-flight load, and that the exports are
//! checked before anyone uses them.
//!
//! State only moves forward (`Unloaded -> Loading -> Loaded -> Initializing ->
//! Initialized`) except through [`SdkRegistry::reset`]. A failed injection
//! leaves the state at `Loading` with no load in flight, so the next call
//! retries.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;

use super::instance::FhevmInstance;
use super::resolver::Endpoint;
use super::types::RelayerConfig;
use crate::error::FhevmError;

/// Published location of the relayer SDK bundle.
pub const DEFAULT_SDK_URL: &str =
    "https://cdn.zama.ai/relayer-sdk-js/0.2.0/relayer-sdk-js.umd.cjs";

/// The SDK's `initSDK` entry point.
#[async_trait]
pub trait InitSdk: Send + Sync {
    async fn init_sdk(&self, options: Option<Value>) -> Result<bool, String>;
}

/// The SDK's `createInstance` entry point.
#[async_trait]
pub trait CreateInstance: Send + Sync {
    async fn create_instance(
        &self,
        config: RelayerConfig,
        network: Endpoint,
    ) -> Result<Arc<dyn FhevmInstance>, String>;
}

/// Raw exports of an injected SDK, before validation.
#[derive(Clone, Default)]
pub struct SdkExports {
    pub init_sdk: Option<Arc<dyn InitSdk>>,
    pub create_instance: Option<Arc<dyn CreateInstance>>,
    /// `SepoliaConfig` as shipped by the SDK.
    pub sepolia_config: Option<Value>,
    /// `__initialized__` marker, when the SDK sets one.
    pub initialized: Option<Value>,
}

/// Something able to bring the SDK into the process.
#[async_trait]
pub trait SdkSource: Send + Sync {
    async fn inject(&self, url: &str) -> Result<SdkExports, String>;
}

/// Source for builds that link no SDK binding. Every injection fails, which
/// leaves only development chains usable.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedSdkSource;

#[async_trait]
impl SdkSource for DetachedSdkSource {
    async fn inject(&self, _url: &str) -> Result<SdkExports, String> {
        Err("no relayer SDK binding is linked into this build".to_string())
    }
}

/// Exports that passed [`verify_exports`].
#[derive(Clone)]
pub struct VerifiedSdk {
    init: Arc<dyn InitSdk>,
    create: Arc<dyn CreateInstance>,
    preset: RelayerConfig,
    initialized: bool,
}

impl VerifiedSdk {
    /// The production preset instances are created with.
    pub fn preset(&self) -> &RelayerConfig {
        &self.preset
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub async fn create_instance(
        &self,
        network: Endpoint,
    ) -> Result<Arc<dyn FhevmInstance>, FhevmError> {
        self.create
            .create_instance(self.preset.clone(), network)
            .await
            .map_err(FhevmError::Relayer)
    }
}

impl fmt::Debug for VerifiedSdk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedSdk")
            .field("chain_id", &self.preset.chain_id)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

/// Check that injected exports look like a usable relayer SDK.
pub fn verify_exports(exports: SdkExports) -> Result<VerifiedSdk, String> {
    let init = exports.init_sdk.ok_or("missing initSDK function")?;
    let create = exports
        .create_instance
        .ok_or("missing createInstance function")?;
    let raw_preset = exports.sepolia_config.ok_or("missing SepoliaConfig object")?;
    if !raw_preset.is_object() {
        return Err("SepoliaConfig is not an object".to_string());
    }
    let preset: RelayerConfig = serde_json::from_value(raw_preset)
        .map_err(|e| format!("SepoliaConfig is malformed: {e}"))?;

    let initialized = match exports.initialized {
        None => false,
        Some(Value::Bool(flag)) => flag,
        Some(other) => return Err(format!("__initialized__ must be a boolean, got {other}")),
    };

    Ok(VerifiedSdk {
        init,
        create,
        preset,
        initialized,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SdkState {
    Unloaded,
    Loading,
    Loaded,
    Initializing,
    Initialized,
}

enum Slot {
    Verified(VerifiedSdk),
    /// Exports arrived but failed verification. Not retried.
    Invalid(String),
}

type LoadFuture = Shared<BoxFuture<'static, Result<(), FhevmError>>>;

struct RegistryInner {
    state: SdkState,
    slot: Option<Slot>,
    pending: Option<LoadFuture>,
    /// Bumped by `reset` so a load started before it cannot publish.
    generation: u64,
}

pub struct SdkRegistry {
    url: String,
    source: Arc<dyn SdkSource>,
    inner: Arc<Mutex<RegistryInner>>,
    init_lock: tokio::sync::Mutex<()>,
}

static GLOBAL: OnceLock<Arc<SdkRegistry>> = OnceLock::new();

impl SdkRegistry {
    pub fn new(source: Arc<dyn SdkSource>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source,
            inner: Arc::new(Mutex::new(RegistryInner {
                state: SdkState::Unloaded,
                slot: None,
                pending: None,
                generation: 0,
            })),
            init_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Install the process-wide registry. The first call wins; later calls
    /// return the registry already installed.
    pub fn init_global(source: Arc<dyn SdkSource>, url: impl Into<String>) -> Arc<Self> {
        GLOBAL
            .get_or_init(|| Arc::new(Self::new(source, url)))
            .clone()
    }

    pub fn global() -> Option<Arc<Self>> {
        GLOBAL.get().cloned()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> SdkState {
        self.lock().state
    }

    /// True once verified exports are present.
    pub fn is_loaded(&self) -> bool {
        matches!(self.lock().slot, Some(Slot::Verified(_)))
    }

    pub fn verified(&self) -> Option<VerifiedSdk> {
        match &self.lock().slot {
            Some(Slot::Verified(sdk)) => Some(sdk.clone()),
            _ => None,
        }
    }

    /// Register exports that are already present in the process, skipping
    /// injection.
    pub fn install(&self, exports: SdkExports) -> Result<(), FhevmError> {
        let sdk = verify_exports(exports).map_err(FhevmError::InvalidCapability)?;
        let mut inner = self.lock();
        if matches!(inner.slot, Some(Slot::Verified(_))) {
            tracing::debug!("Relayer SDK already loaded, ignoring install");
            return Ok(());
        }
        publish(&mut inner, sdk);
        Ok(())
    }

    /// Make sure the SDK is loaded. Concurrent callers share one injection
    /// and all observe its outcome.
    pub async fn load(&self) -> Result<(), FhevmError> {
        let pending = {
            let mut inner = self.lock();
            match &inner.slot {
                Some(Slot::Verified(_)) => return Ok(()),
                Some(Slot::Invalid(reason)) => {
                    return Err(FhevmError::InvalidCapability(reason.clone()))
                }
                None => {}
            }

            match &inner.pending {
                Some(pending) => {
                    tracing::debug!("Relayer SDK load already in flight");
                    pending.clone()
                }
                None => {
                    inner.state = inner.state.max(SdkState::Loading);
                    let load = inject(
                        self.source.clone(),
                        self.url.clone(),
                        self.inner.clone(),
                        inner.generation,
                    )
                    .boxed()
                    .shared();
                    inner.pending = Some(load.clone());
                    load
                }
            }
        };

        pending.await
    }

    /// Run the SDK's init routine once. Calls are serialized; a caller that
    /// arrives after a successful init returns immediately.
    pub async fn initialize(&self) -> Result<(), FhevmError> {
        let _serial = self.init_lock.lock().await;

        let sdk = {
            let mut inner = self.lock();
            let sdk = match &inner.slot {
                Some(Slot::Verified(sdk)) => sdk.clone(),
                _ => {
                    return Err(FhevmError::InvalidCapability(
                        "relayer SDK is not loaded".to_string(),
                    ))
                }
            };
            if sdk.initialized {
                return Ok(());
            }
            inner.state = inner.state.max(SdkState::Initializing);
            sdk
        };

        tracing::info!("Initializing relayer SDK");
        let ok = sdk
            .init
            .init_sdk(None)
            .await
            .map_err(FhevmError::Initialization)?;
        if !ok {
            return Err(FhevmError::Initialization(
                "initSDK reported failure".to_string(),
            ));
        }

        let mut inner = self.lock();
        if let Some(Slot::Verified(sdk)) = inner.slot.as_mut() {
            sdk.initialized = true;
        }
        inner.state = SdkState::Initialized;
        tracing::info!("Relayer SDK initialized");
        Ok(())
    }

    /// Forget everything. Any load still in flight completes without
    /// publishing.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = SdkState::Unloaded;
        inner.slot = None;
        inner.pending = None;
        inner.generation += 1;
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        lock_inner(&self.inner)
    }
}

fn lock_inner(inner: &Mutex<RegistryInner>) -> MutexGuard<'_, RegistryInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn publish(inner: &mut RegistryInner, sdk: VerifiedSdk) {
    let reached = if sdk.initialized {
        SdkState::Initialized
    } else {
        SdkState::Loaded
    };
    inner.state = inner.state.max(reached);
    inner.slot = Some(Slot::Verified(sdk));
}

async fn inject(
    source: Arc<dyn SdkSource>,
    url: String,
    inner: Arc<Mutex<RegistryInner>>,
    generation: u64,
) -> Result<(), FhevmError> {
    tracing::info!(url = %url, "Loading relayer SDK");
    let outcome = source.inject(&url).await;

    let mut inner = lock_inner(&inner);
    if inner.generation != generation {
        tracing::debug!("Registry was reset during load, discarding result");
        return Err(FhevmError::Cancelled);
    }
    inner.pending = None;

    if matches!(inner.slot, Some(Slot::Verified(_))) {
        tracing::debug!("Relayer SDK installed during load, dropping injected exports");
        return Ok(());
    }

    let exports = outcome.map_err(|reason| {
        tracing::warn!(url = %url, reason = %reason, "Relayer SDK injection failed");
        FhevmError::SdkLoad {
            url: url.clone(),
            reason,
        }
    })?;

    match verify_exports(exports) {
        Ok(sdk) => {
            publish(&mut inner, sdk);
            tracing::info!(state = ?inner.state, "Relayer SDK loaded");
            Ok(())
        }
        Err(reason) => {
            let reason = format!("relayer SDK from {url} is invalid after load: {reason}");
            tracing::error!(reason = %reason, "Relayer SDK rejected");
            inner.slot = Some(Slot::Invalid(reason.clone()));
            Err(FhevmError::InvalidCapability(reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{valid_exports, FakeBackend, FakeSdkSource, SourceBehavior};
    use serde_json::json;
    use std::time::Duration;

    fn registry(source: Arc<FakeSdkSource>) -> SdkRegistry {
        SdkRegistry::new(source, DEFAULT_SDK_URL)
    }

    #[test]
    fn verify_rejects_incomplete_exports() {
        let backend = FakeBackend::new();

        let mut no_init = valid_exports(&backend);
        no_init.init_sdk = None;
        assert!(verify_exports(no_init).unwrap_err().contains("initSDK"));

        let mut no_create = valid_exports(&backend);
        no_create.create_instance = None;
        assert!(verify_exports(no_create).unwrap_err().contains("createInstance"));

        let mut bad_preset = valid_exports(&backend);
        bad_preset.sepolia_config = Some(json!("sepolia"));
        assert!(verify_exports(bad_preset).is_err());

        let mut bad_flag = valid_exports(&backend);
        bad_flag.initialized = Some(json!("true"));
        assert!(verify_exports(bad_flag).unwrap_err().contains("__initialized__"));

        let ok = verify_exports(valid_exports(&backend)).unwrap();
        assert_eq!(ok.preset().chain_id, 11_155_111);
        assert!(!ok.is_initialized());
    }

    #[tokio::test]
    async fn concurrent_loads_share_one_injection() {
        let source = Arc::new(FakeSdkSource::new(SourceBehavior::Valid));
        let registry = registry(source.clone());

        let (a, b, c) = tokio::join!(registry.load(), registry.load(), registry.load());
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(source.injections(), 1);
        assert_eq!(registry.state(), SdkState::Loaded);

        registry.load().await.unwrap();
        assert_eq!(source.injections(), 1);
    }

    #[tokio::test]
    async fn failed_load_is_shared_then_retried() {
        let source = Arc::new(FakeSdkSource::new(SourceBehavior::Fail("HTTP 404".into())));
        let registry = registry(source.clone());

        let (a, b) = tokio::join!(registry.load(), registry.load());
        for result in [a, b] {
            match result {
                Err(FhevmError::SdkLoad { url, reason }) => {
                    assert_eq!(url, DEFAULT_SDK_URL);
                    assert_eq!(reason, "HTTP 404");
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(source.injections(), 1);
        assert_eq!(registry.state(), SdkState::Loading);
        assert!(!registry.is_loaded());

        let _ = registry.load().await;
        assert_eq!(source.injections(), 2);
    }

    #[tokio::test]
    async fn invalid_exports_are_not_retried() {
        let source = Arc::new(FakeSdkSource::new(SourceBehavior::Malformed));
        let registry = registry(source.clone());

        match registry.load().await {
            Err(FhevmError::InvalidCapability(reason)) => {
                assert!(reason.contains("invalid after load"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(matches!(
            registry.load().await,
            Err(FhevmError::InvalidCapability(_))
        ));
        assert_eq!(source.injections(), 1);
    }

    #[tokio::test]
    async fn installed_exports_skip_injection() {
        let source = Arc::new(FakeSdkSource::new(SourceBehavior::Valid));
        let registry = registry(source.clone());
        let backend = FakeBackend::new();

        let mut exports = valid_exports(&backend);
        exports.initialized = Some(json!(true));
        registry.install(exports).unwrap();

        registry.load().await.unwrap();
        assert_eq!(source.injections(), 0);
        assert_eq!(registry.state(), SdkState::Initialized);

        registry.initialize().await.unwrap();
        assert_eq!(backend.init_calls(), 0);
    }

    #[tokio::test]
    async fn initialize_runs_init_once() {
        let source = Arc::new(FakeSdkSource::new(SourceBehavior::Valid));
        let registry = registry(source.clone());

        assert!(matches!(
            registry.initialize().await,
            Err(FhevmError::InvalidCapability(_))
        ));

        registry.load().await.unwrap();
        let (a, b) = tokio::join!(registry.initialize(), registry.initialize());
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(source.backend().init_calls(), 1);
        assert_eq!(registry.state(), SdkState::Initialized);
        assert!(registry.verified().unwrap().is_initialized());
    }

    #[tokio::test]
    async fn init_failure_surfaces() {
        let source = Arc::new(FakeSdkSource::with_backend(
            SourceBehavior::Valid,
            FakeBackend::failing_init(),
        ));
        let registry = registry(source);
        registry.load().await.unwrap();

        assert!(matches!(
            registry.initialize().await,
            Err(FhevmError::Initialization(_))
        ));
        assert_eq!(registry.state(), SdkState::Initializing);
    }

    #[tokio::test]
    async fn reset_returns_to_unloaded() {
        let source = Arc::new(FakeSdkSource::new(SourceBehavior::Valid));
        let registry = registry(source.clone());
        registry.load().await.unwrap();

        registry.reset();
        assert_eq!(registry.state(), SdkState::Unloaded);
        assert!(registry.verified().is_none());

        registry.load().await.unwrap();
        assert_eq!(source.injections(), 2);
    }

    #[tokio::test]
    async fn reset_during_load_discards_result() {
        let source = Arc::new(
            FakeSdkSource::new(SourceBehavior::Valid).with_delay(Duration::from_millis(40)),
        );
        let registry = registry(source.clone());

        let (loaded, ()) = tokio::join!(registry.load(), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            registry.reset();
        });
        assert!(matches!(loaded, Err(FhevmError::Cancelled)));
        assert_eq!(registry.state(), SdkState::Unloaded);
        assert!(!registry.is_loaded());
        assert_eq!(source.injections(), 1);
    }

    #[tokio::test]
    async fn install_during_load_survives_malformed_injection() {
        let source = Arc::new(
            FakeSdkSource::new(SourceBehavior::Malformed).with_delay(Duration::from_millis(40)),
        );
        let registry = registry(source.clone());
        let backend = FakeBackend::new();

        let (loaded, installed) = tokio::join!(registry.load(), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            registry.install(valid_exports(&backend))
        });
        installed.unwrap();
        loaded.unwrap();
        assert!(registry.is_loaded());
        assert_eq!(registry.state(), SdkState::Loaded);

        registry.load().await.unwrap();
        assert_eq!(source.injections(), 1);
    }

    #[tokio::test]
    async fn install_during_load_keeps_initialized_sdk() {
        let source = Arc::new(
            FakeSdkSource::new(SourceBehavior::Valid).with_delay(Duration::from_millis(40)),
        );
        let registry = registry(source.clone());
        let backend = FakeBackend::new();
        let mut exports = valid_exports(&backend);
        exports.initialized = Some(json!(true));

        let (loaded, installed) = tokio::join!(registry.load(), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            registry.install(exports)
        });
        installed.unwrap();
        loaded.unwrap();
        assert_eq!(registry.state(), SdkState::Initialized);
        assert!(registry.verified().unwrap().is_initialized());

        registry.initialize().await.unwrap();
        assert_eq!(backend.init_calls(), 0);
        assert_eq!(source.backend().init_calls(), 0);
    }

    #[tokio::test]
    async fn detached_source_never_loads() {
        let registry = SdkRegistry::new(Arc::new(DetachedSdkSource), DEFAULT_SDK_URL);
        assert!(matches!(
            registry.load().await,
            Err(FhevmError::SdkLoad { .. })
        ));
    }
}
