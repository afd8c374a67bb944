// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory fakes shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::{
    primitives::{address, Address, Bytes, ChainId, Signature, B256, U256},
    signers::{local::PrivateKeySigner, Signer},
};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::blockchain::client::{ChainClientError, RpcConnector, RpcTransport};
use crate::blockchain::signing::WalletConnector;
use crate::blockchain::types::TxReceipt;
use crate::circle::contract::{CircleContract, Post};
use crate::error::FhevmError;
use crate::fhevm::instance::{EncryptedInputBuilder, FhevmInstance, InstanceKind};
use crate::fhevm::resolver::Endpoint;
use crate::fhevm::sdk::{CreateInstance, InitSdk, SdkExports, SdkSource};
use crate::fhevm::types::{
    CiphertextHandle, Eip712Payload, EncryptedInput, Keypair, RelayerConfig, RelayerMetadata,
    UserDecryptRequest,
};

/// Hardhat default account #0.
pub const HARDHAT_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const HARDHAT_ADDRESS: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

/// First contract deployed on a fresh Hardhat node.
pub const CONTRACT_ADDRESS: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");

pub fn hardhat_metadata_json() -> Value {
    json!({
        "ACLAddress": "0x50157CFfD6bBFA2DECe204a89ec419c23ef5755D",
        "InputVerifierAddress": "0x901F8942346f7AB3a01F6D7613119Bca447Bb030",
        "KMSVerifierAddress": "0x1364cBBf2cDF5032C47d8226a6f6FBD2AFCDacAC",
    })
}

pub fn hardhat_metadata() -> RelayerMetadata {
    RelayerMetadata::from_json(&hardhat_metadata_json()).unwrap()
}

pub fn sepolia_config_json() -> Value {
    json!({
        "aclContractAddress": "0x687820221192C5B662b25367F70076A37bc79b6c",
        "kmsContractAddress": "0x1364cBBf2cDF5032C47d8226a6f6FBD2AFCDacAC",
        "inputVerifierContractAddress": "0xbc91f3daD1A5F19F8390c400196e58073B6a0BC4",
        "verifyingContractAddressDecryption": "0xb6E160B1ff80D67Bfe90A85eE06Ce0A2613607D1",
        "verifyingContractAddressInputVerification": "0x7048C39f048125eDa9d678AEbaDfB22F7900a29F",
        "chainId": 11155111,
        "gatewayChainId": 55815,
        "relayerUrl": "https://relayer.testnet.zama.cloud",
        "network": "https://eth-sepolia.public.blastapi.io",
    })
}

/// ABI encoding of a single `bool` return value, as `eth_call` returns it.
pub fn abi_bool(value: bool) -> Value {
    let mut word = [0u8; 32];
    word[31] = u8::from(value);
    json!(alloy::hex::encode_prefixed(word))
}

fn receipt(n: u64) -> TxReceipt {
    TxReceipt {
        tx_hash: format!("{:?}", B256::left_padding_from(&n.to_be_bytes())),
        block_number: n,
        gas_used: 21_000,
        success: true,
    }
}

/// JSON-RPC endpoint answering from a script.
///
/// Each method has a queue of outcomes. The last one is repeated once the
/// queue is drained; unscripted methods fail.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<HashMap<String, VecDeque<Result<Value, String>>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, method: &str, result: Value) -> Self {
        self.push(method, Ok(result))
    }

    pub fn fail(self, method: &str, message: &str) -> Self {
        self.push(method, Err(message.to_string()))
    }

    fn push(mut self, method: &str, outcome: Result<Value, String>) -> Self {
        self.script
            .get_mut()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }
}

#[async_trait]
impl RpcTransport for ScriptedTransport {
    async fn request(&self, method: &'static str, params: Value) -> Result<Value, ChainClientError> {
        self.calls.lock().unwrap().push((method.to_string(), params));

        let mut script = self.script.lock().unwrap();
        let queue = script
            .get_mut(method)
            .ok_or_else(|| ChainClientError::RpcError(format!("{method}: not scripted")))?;
        let outcome = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };

        match outcome {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(ChainClientError::RpcError(format!("{method}: {message}"))),
            None => Err(ChainClientError::RpcError(format!("{method}: not scripted"))),
        }
    }
}

/// Connector handing out one shared scripted transport for every URL.
pub struct ScriptedConnector {
    transport: Arc<ScriptedTransport>,
    connected: Mutex<Vec<String>>,
}

impl ScriptedConnector {
    pub fn new(transport: ScriptedTransport) -> Self {
        Self {
            transport: Arc::new(transport),
            connected: Mutex::new(Vec::new()),
        }
    }

    pub fn connected(&self) -> Vec<String> {
        self.connected.lock().unwrap().clone()
    }
}

impl RpcConnector for ScriptedConnector {
    fn connect(&self, rpc_url: &str) -> Result<Arc<dyn RpcTransport>, ChainClientError> {
        self.connected.lock().unwrap().push(rpc_url.to_string());
        Ok(self.transport.clone())
    }
}

/// Stand-in for the relayer SDK's entry points.
pub struct FakeBackend {
    init_result: bool,
    init_calls: AtomicUsize,
    created: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            init_result: true,
            init_calls: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
        })
    }

    pub fn failing_init() -> Arc<Self> {
        Arc::new(Self {
            init_result: false,
            init_calls: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
        })
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InitSdk for FakeBackend {
    async fn init_sdk(&self, _options: Option<Value>) -> Result<bool, String> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(self.init_result)
    }
}

#[async_trait]
impl CreateInstance for FakeBackend {
    async fn create_instance(
        &self,
        config: RelayerConfig,
        _network: Endpoint,
    ) -> Result<Arc<dyn FhevmInstance>, String> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeInstance::new(config.chain_id)))
    }
}

pub fn valid_exports(backend: &Arc<FakeBackend>) -> SdkExports {
    SdkExports {
        init_sdk: Some(backend.clone()),
        create_instance: Some(backend.clone()),
        sepolia_config: Some(sepolia_config_json()),
        initialized: None,
    }
}

pub enum SourceBehavior {
    Valid,
    Fail(String),
    /// Injection succeeds but the exports lack `initSDK`.
    Malformed,
}

pub struct FakeSdkSource {
    behavior: SourceBehavior,
    backend: Arc<FakeBackend>,
    delay: Duration,
    cancel_on_inject: Option<CancellationToken>,
    injections: AtomicUsize,
}

impl FakeSdkSource {
    pub fn new(behavior: SourceBehavior) -> Self {
        Self::with_backend(behavior, FakeBackend::new())
    }

    pub fn with_backend(behavior: SourceBehavior, backend: Arc<FakeBackend>) -> Self {
        Self {
            behavior,
            backend,
            delay: Duration::from_millis(10),
            cancel_on_inject: None,
            injections: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fire `token` while the injection is in progress.
    pub fn cancelling_during_inject(mut self, token: CancellationToken) -> Self {
        self.cancel_on_inject = Some(token);
        self
    }

    pub fn injections(&self) -> usize {
        self.injections.load(Ordering::SeqCst)
    }

    pub fn backend(&self) -> &Arc<FakeBackend> {
        &self.backend
    }
}

#[async_trait]
impl SdkSource for FakeSdkSource {
    async fn inject(&self, _url: &str) -> Result<SdkExports, String> {
        self.injections.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_on_inject {
            token.cancel();
        }
        tokio::time::sleep(self.delay).await;

        match &self.behavior {
            SourceBehavior::Valid => Ok(valid_exports(&self.backend)),
            SourceBehavior::Fail(reason) => Err(reason.clone()),
            SourceBehavior::Malformed => {
                let mut exports = valid_exports(&self.backend);
                exports.init_sdk = None;
                Ok(exports)
            }
        }
    }
}

/// Instance that records decrypt requests and answers from a table.
pub struct FakeInstance {
    chain_id: u64,
    values: HashMap<CiphertextHandle, U256>,
    decrypt_error: Option<String>,
    requests: Mutex<Vec<UserDecryptRequest>>,
}

impl FakeInstance {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            values: HashMap::new(),
            decrypt_error: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn decrypting(mut self, values: HashMap<CiphertextHandle, U256>) -> Self {
        self.values = values;
        self
    }

    pub fn failing_decrypt(mut self, message: &str) -> Self {
        self.decrypt_error = Some(message.to_string());
        self
    }

    pub fn decrypt_requests(&self) -> Vec<UserDecryptRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl FhevmInstance for FakeInstance {
    fn kind(&self) -> InstanceKind {
        InstanceKind::Relayer
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn generate_keypair(&self) -> Result<Keypair, FhevmError> {
        Ok(Keypair {
            public_key: "0x02aabbccdd".to_string(),
            private_key: "0x11223344".to_string(),
        })
    }

    fn create_encrypted_input(
        &self,
        _contract_address: Address,
        _user_address: Address,
    ) -> Box<dyn EncryptedInputBuilder> {
        Box::new(FakeInput(Vec::new()))
    }

    fn create_eip712(
        &self,
        public_key: &str,
        contract_addresses: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> Result<Eip712Payload, FhevmError> {
        Ok(Eip712Payload::user_decrypt(
            self.chain_id,
            Address::repeat_byte(0x42),
            public_key,
            contract_addresses,
            start_timestamp,
            duration_days,
        ))
    }

    async fn user_decrypt(
        &self,
        request: UserDecryptRequest,
    ) -> Result<HashMap<CiphertextHandle, U256>, FhevmError> {
        let handles: Vec<CiphertextHandle> = request.items.iter().map(|i| i.handle).collect();
        self.requests.lock().unwrap().push(request);

        if let Some(message) = &self.decrypt_error {
            return Err(FhevmError::Relayer(message.clone()));
        }
        Ok(handles
            .into_iter()
            .map(|h| (h, self.values.get(&h).copied().unwrap_or(U256::ZERO)))
            .collect())
    }
}

struct FakeInput(Vec<u32>);

#[async_trait]
impl EncryptedInputBuilder for FakeInput {
    fn add32(&mut self, value: u32) {
        self.0.push(value);
    }

    async fn encrypt(self: Box<Self>) -> Result<EncryptedInput, FhevmError> {
        let handles = (0..self.0.len())
            .map(|i| CiphertextHandle(B256::repeat_byte(0xe0 + i as u8)))
            .collect();
        let proof: Vec<u8> = self.0.iter().flat_map(|v| v.to_be_bytes()).collect();
        Ok(EncryptedInput {
            handles,
            input_proof: Bytes::from(proof),
        })
    }
}

/// Signer that refuses every request, like a wallet whose user clicked
/// "reject".
pub struct RefusingSigner {
    address: Address,
}

impl RefusingSigner {
    pub fn new() -> Self {
        Self {
            address: HARDHAT_ADDRESS,
        }
    }
}

#[async_trait]
impl Signer for RefusingSigner {
    async fn sign_hash(&self, _hash: &B256) -> alloy::signers::Result<Signature> {
        Err(alloy::signers::Error::other("user rejected the request"))
    }

    fn address(&self) -> Address {
        self.address
    }

    fn chain_id(&self) -> Option<ChainId> {
        None
    }

    fn set_chain_id(&mut self, _chain_id: Option<ChainId>) {}
}

/// Wallet that counts how often it was asked to connect.
pub struct CountingWallet {
    signer: PrivateKeySigner,
    connects: AtomicUsize,
}

impl CountingWallet {
    pub fn new() -> Self {
        Self {
            signer: HARDHAT_KEY.parse().unwrap(),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletConnector for CountingWallet {
    type Signer = PrivateKeySigner;

    async fn connect(&self) -> Result<PrivateKeySigner, ChainClientError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.signer.clone())
    }
}

type LikeCall = (u64, CiphertextHandle, Bytes, U256);

/// In-memory FriendCircle.
pub struct FakeContract {
    posts: HashMap<u64, Post>,
    post_count: Option<U256>,
    handles: HashMap<u64, (CiphertextHandle, CiphertextHandle)>,
    like_fee: U256,
    write_delay: Duration,
    read_delays: HashMap<u64, Duration>,
    failing_posts: Vec<u64>,
    likes: Mutex<Vec<LikeCall>>,
    grants: Mutex<Vec<u64>>,
    writes: AtomicUsize,
}

impl FakeContract {
    pub fn new() -> Self {
        Self {
            posts: HashMap::new(),
            post_count: None,
            handles: HashMap::new(),
            like_fee: U256::ZERO,
            write_delay: Duration::ZERO,
            read_delays: HashMap::new(),
            failing_posts: Vec::new(),
            likes: Mutex::new(Vec::new()),
            grants: Mutex::new(Vec::new()),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn with_post(mut self, id: u64, text: &str) -> Self {
        self.posts.insert(
            id,
            Post {
                author: HARDHAT_ADDRESS,
                text: text.to_string(),
                ipfs_hash: String::new(),
                timestamp: 1_700_000_000 + id,
            },
        );
        self
    }

    pub fn with_post_count(self, count: u64) -> Self {
        self.with_raw_post_count(U256::from(count))
    }

    pub fn with_raw_post_count(mut self, count: U256) -> Self {
        self.post_count = Some(count);
        self
    }

    pub fn with_handles(mut self, id: u64, likes: CiphertextHandle, tips: CiphertextHandle) -> Self {
        self.handles.insert(id, (likes, tips));
        self
    }

    pub fn with_like_fee(mut self, fee: U256) -> Self {
        self.like_fee = fee;
        self
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    pub fn with_read_delay(mut self, id: u64, delay: Duration) -> Self {
        self.read_delays.insert(id, delay);
        self
    }

    pub fn failing_post(mut self, id: u64) -> Self {
        self.failing_posts.push(id);
        self
    }

    pub fn likes(&self) -> Vec<LikeCall> {
        self.likes.lock().unwrap().clone()
    }

    pub fn grants(&self) -> Vec<u64> {
        self.grants.lock().unwrap().clone()
    }

    async fn write(&self) -> TxReceipt {
        tokio::time::sleep(self.write_delay).await;
        let n = self.writes.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        receipt(n)
    }
}

#[async_trait]
impl CircleContract for FakeContract {
    fn address(&self) -> Address {
        CONTRACT_ADDRESS
    }

    async fn create_post(&self, _text: &str, _ipfs_hash: &str) -> Result<TxReceipt, ChainClientError> {
        Ok(self.write().await)
    }

    async fn like(
        &self,
        post_id: u64,
        encrypted_one: CiphertextHandle,
        input_proof: Bytes,
        value: U256,
    ) -> Result<TxReceipt, ChainClientError> {
        self.likes
            .lock()
            .unwrap()
            .push((post_id, encrypted_one, input_proof, value));
        Ok(self.write().await)
    }

    async fn tip(&self, _post_id: u64, _value: U256) -> Result<TxReceipt, ChainClientError> {
        Ok(self.write().await)
    }

    async fn get_post(&self, post_id: u64) -> Result<Option<Post>, ChainClientError> {
        if let Some(delay) = self.read_delays.get(&post_id) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_posts.contains(&post_id) {
            return Err(ChainClientError::ContractError(format!(
                "getPost({post_id}) reverted"
            )));
        }
        Ok(self.posts.get(&post_id).cloned())
    }

    async fn post_count(&self) -> Result<U256, ChainClientError> {
        Ok(self
            .post_count
            .unwrap_or_else(|| U256::from(self.posts.len())))
    }

    async fn like_fee_wei(&self) -> Result<U256, ChainClientError> {
        Ok(self.like_fee)
    }

    async fn encrypted_like_count(&self, post_id: u64) -> Result<CiphertextHandle, ChainClientError> {
        Ok(self
            .handles
            .get(&post_id)
            .map(|(likes, _)| *likes)
            .unwrap_or(CiphertextHandle::EMPTY))
    }

    async fn encrypted_tip_total(&self, post_id: u64) -> Result<CiphertextHandle, ChainClientError> {
        Ok(self
            .handles
            .get(&post_id)
            .map(|(_, tips)| *tips)
            .unwrap_or(CiphertextHandle::EMPTY))
    }

    async fn grant_decrypt_for_post(&self, post_id: u64) -> Result<TxReceipt, ChainClientError> {
        self.grants.lock().unwrap().push(post_id);
        Ok(self.write().await)
    }
}
