//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tangle_identity::config::RetryConfig;
use tangle_identity::ledger::{
    InMemoryNode, LedgerMessage, MessageId, MessageStatus, NodeApi, NodeInfo, SubmitRequest,
};
use tangle_identity::{
    ClientConfig, DidDocument, DidError, DidResult, KeyPair, KeyType, LedgerClient,
    NetworkProfile,
};

/// Config with millisecond backoff so retries finish quickly
pub fn fast_config(network: &str) -> ClientConfig {
    ClientConfig {
        network: network.to_string(),
        request_timeout: Duration::from_millis(500),
        retry: RetryConfig {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            max_attempts: 5,
        },
        ..ClientConfig::default()
    }
}

pub fn profile(network: &str) -> NetworkProfile {
    NetworkProfile::from_name(network).unwrap()
}

pub fn memory_node(network: &str) -> Arc<InMemoryNode> {
    Arc::new(InMemoryNode::for_profile(&profile(network)))
}

pub fn client_with(config: ClientConfig, node: Arc<dyn NodeApi>) -> LedgerClient {
    let profile = config.network_profile().unwrap();
    LedgerClient::with_node(config, profile, node)
}

pub fn client(network: &str, node: Arc<dyn NodeApi>) -> LedgerClient {
    client_with(fast_config(network), node)
}

/// Signed initial document and its key
pub fn signed_document(network: &str) -> (DidDocument, KeyPair) {
    let (doc, key) = DidDocument::create(KeyType::Ed25519, &profile(network)).unwrap();
    (doc.sign(&key).unwrap(), key)
}

/// File a raw payload under a DID's index, bypassing the client
pub async fn submit_raw(node: &InMemoryNode, doc: &DidDocument, data: Vec<u8>) -> MessageId {
    node.submit(&SubmitRequest {
        index: doc.id().tag().to_string(),
        data,
        nonce: None,
    })
    .await
    .unwrap()
}

/// Attach a signature by `key` to the canonical bytes of an unsigned document
pub fn sign_raw(unsigned: &[u8], key: &KeyPair) -> Vec<u8> {
    let signature = hex::encode(key.sign(unsigned).unwrap());
    let mut bytes = unsigned[..unsigned.len() - 1].to_vec();
    bytes.extend_from_slice(format!(",\"signature\":\"{}\"}}", signature).as_bytes());
    bytes
}

/// A document claiming `victim`'s DID but carrying and signed by `key`
pub fn unbound_document(victim: &DidDocument, key: &KeyPair) -> DidDocument {
    let own = DidDocument::from_key(key, &profile(victim.network())).unwrap();
    let text = String::from_utf8(own.to_canonical_bytes().unwrap())
        .unwrap()
        .replace(&own.id().to_string(), &victim.id().to_string());
    DidDocument::from_canonical_bytes(&sign_raw(text.as_bytes(), key)).unwrap()
}

fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Wraps a node and injects stalls, transport failures and rejections
pub struct FlakyNode {
    inner: Arc<InMemoryNode>,
    stalled_submits: AtomicU32,
    stall: Duration,
    failed_submits: AtomicU32,
    failed_status: AtomicU32,
    reject_reason: Option<String>,
    conflict_reason: Option<String>,
    submit_calls: AtomicU32,
}

impl FlakyNode {
    pub fn new(inner: Arc<InMemoryNode>) -> Self {
        Self {
            inner,
            stalled_submits: AtomicU32::new(0),
            stall: Duration::ZERO,
            failed_submits: AtomicU32::new(0),
            failed_status: AtomicU32::new(0),
            reject_reason: None,
            conflict_reason: None,
            submit_calls: AtomicU32::new(0),
        }
    }

    /// Delay the first `count` submissions by `stall`
    pub fn stall_submits(mut self, count: u32, stall: Duration) -> Self {
        self.stalled_submits = AtomicU32::new(count);
        self.stall = stall;
        self
    }

    /// Fail the first `count` submissions with a transport error
    pub fn fail_submits(mut self, count: u32) -> Self {
        self.failed_submits = AtomicU32::new(count);
        self
    }

    /// Fail the first `count` status queries with a transport error
    pub fn fail_status(mut self, count: u32) -> Self {
        self.failed_status = AtomicU32::new(count);
        self
    }

    pub fn reject_submits(mut self, reason: &str) -> Self {
        self.reject_reason = Some(reason.to_string());
        self
    }

    pub fn conflict_on_status(mut self, reason: &str) -> Self {
        self.conflict_reason = Some(reason.to_string());
        self
    }

    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeApi for FlakyNode {
    async fn network_info(&self) -> DidResult<NodeInfo> {
        self.inner.network_info().await
    }

    async fn submit(&self, request: &SubmitRequest) -> DidResult<MessageId> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.reject_reason {
            return Err(DidError::rejected(reason.clone()));
        }
        if take(&self.failed_submits) {
            return Err(DidError::Transport {
                operation: "submit".to_string(),
                message: "connection reset".to_string(),
            });
        }
        if take(&self.stalled_submits) {
            tokio::time::sleep(self.stall).await;
        }
        self.inner.submit(request).await
    }

    async fn message_status(&self, id: &MessageId) -> DidResult<MessageStatus> {
        if take(&self.failed_status) {
            return Err(DidError::Transport {
                operation: "message_status".to_string(),
                message: "connection refused".to_string(),
            });
        }
        if let Some(reason) = &self.conflict_reason {
            return Ok(MessageStatus {
                included: false,
                milestone_index: None,
                conflict: Some(reason.clone()),
            });
        }
        self.inner.message_status(id).await
    }

    async fn query_index(&self, index: &str) -> DidResult<Vec<MessageId>> {
        self.inner.query_index(index).await
    }

    async fn message(&self, id: &MessageId) -> DidResult<LedgerMessage> {
        self.inner.message(id).await
    }
}
