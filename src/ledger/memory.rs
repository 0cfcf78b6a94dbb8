/// In-memory simulated ledger node
///
/// Useful offline and in tests. Messages are content addressed, checked for
/// proof-of-work when a nonce is attached, and confirmed by a new milestone
/// after a configurable number of status polls.

use crate::error::{DidError, DidResult};
use crate::ledger::message::{LedgerMessage, MessageId, MessageStatus, NodeInfo, SubmitRequest};
use crate::ledger::node::NodeApi;
use crate::ledger::pow;
use crate::network::NetworkProfile;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Largest payload the simulated node accepts
pub const MAX_MESSAGE_SIZE: usize = 32 * 1024;

#[derive(Debug, Default)]
struct LedgerState {
    messages: HashMap<MessageId, StoredMessage>,
    by_index: HashMap<String, Vec<MessageId>>,
    sequence: u64,
    last_milestone: u32,
}

#[derive(Debug)]
struct StoredMessage {
    message: LedgerMessage,
    sequence: u64,
    polls: u32,
}

impl LedgerState {
    fn issue_milestone(&mut self, id: &MessageId) {
        let milestone = self.last_milestone + 1;
        if let Some(stored) = self.messages.get_mut(id) {
            if stored.message.milestone_index.is_none() {
                stored.message.milestone_index = Some(milestone);
                stored.message.timestamp = Some(1_600_000_000 + i64::from(milestone) * 10);
                self.last_milestone = milestone;
            }
        }
    }
}

/// Simulated ledger node
pub struct InMemoryNode {
    network_id: String,
    min_pow_difficulty: u32,
    confirm_after_polls: u32,
    state: RwLock<LedgerState>,
}

impl InMemoryNode {
    /// Node for a profile's network; confirms on the first status poll
    pub fn for_profile(profile: &NetworkProfile) -> Self {
        Self::new(profile.network_id())
    }

    pub fn new(network_id: impl Into<String>) -> Self {
        Self {
            network_id: network_id.into(),
            min_pow_difficulty: 0,
            confirm_after_polls: 1,
            state: RwLock::new(LedgerState::default()),
        }
    }

    /// Difficulty reported to clients and enforced on attached nonces
    pub fn with_min_pow_difficulty(mut self, difficulty: u32) -> Self {
        self.min_pow_difficulty = difficulty;
        self
    }

    /// Number of status polls before a message is confirmed; 0 never confirms
    pub fn with_confirm_after_polls(mut self, polls: u32) -> Self {
        self.confirm_after_polls = polls;
        self
    }

    /// Confirm every pending message in submission order
    pub async fn confirm_all(&self) {
        let mut state = self.state.write().await;
        let mut pending: Vec<(u64, MessageId)> = state
            .messages
            .values()
            .filter(|m| m.message.milestone_index.is_none())
            .map(|m| (m.sequence, m.message.id))
            .collect();
        pending.sort();
        for (_, id) in pending {
            state.issue_milestone(&id);
        }
    }

    /// Number of stored messages
    pub async fn message_count(&self) -> usize {
        self.state.read().await.messages.len()
    }
}

#[async_trait]
impl NodeApi for InMemoryNode {
    async fn network_info(&self) -> DidResult<NodeInfo> {
        Ok(NodeInfo {
            network_id: self.network_id.clone(),
            min_pow_difficulty: self.min_pow_difficulty,
        })
    }

    async fn submit(&self, request: &SubmitRequest) -> DidResult<MessageId> {
        if request.index.is_empty() {
            return Err(DidError::rejected("message index must not be empty"));
        }
        if request.data.len() > MAX_MESSAGE_SIZE {
            return Err(DidError::rejected(format!(
                "payload of {} bytes exceeds {}",
                request.data.len(),
                MAX_MESSAGE_SIZE
            )));
        }
        if let Some(nonce) = request.nonce {
            let target = pow::target_difficulty(self.min_pow_difficulty, request.data.len());
            if !pow::verify(&request.index, &request.data, nonce, target) {
                return Err(DidError::rejected(format!(
                    "insufficient proof-of-work for target {}",
                    target
                )));
            }
        }

        let mut state = self.state.write().await;
        state.sequence += 1;
        let sequence = state.sequence;

        // Sequence stands in for the parent references a real message carries
        let mut hasher = Sha256::new();
        hasher.update(sequence.to_le_bytes());
        hasher.update(request.index.as_bytes());
        hasher.update(&request.data);
        hasher.update(request.nonce.unwrap_or_default().to_le_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        let id = MessageId::new(bytes);

        state.messages.insert(
            id,
            StoredMessage {
                message: LedgerMessage {
                    id,
                    index: request.index.clone(),
                    data: request.data.clone(),
                    milestone_index: None,
                    timestamp: None,
                },
                sequence,
                polls: 0,
            },
        );
        state
            .by_index
            .entry(request.index.clone())
            .or_default()
            .push(id);

        debug!("Simulated node stored message {} under {}", id, request.index);
        Ok(id)
    }

    async fn message_status(&self, id: &MessageId) -> DidResult<MessageStatus> {
        let mut state = self.state.write().await;
        let confirm_after = self.confirm_after_polls;

        let stored = state
            .messages
            .get_mut(id)
            .ok_or_else(|| DidError::NotFound(format!("message {}", id)))?;
        stored.polls += 1;
        let should_confirm = confirm_after > 0
            && stored.polls >= confirm_after
            && stored.message.milestone_index.is_none();

        if should_confirm {
            state.issue_milestone(id);
        }

        let message = &state.messages[id].message;
        Ok(MessageStatus {
            included: message.milestone_index.is_some(),
            milestone_index: message.milestone_index,
            conflict: None,
        })
    }

    async fn query_index(&self, index: &str) -> DidResult<Vec<MessageId>> {
        let state = self.state.read().await;
        Ok(state.by_index.get(index).cloned().unwrap_or_default())
    }

    async fn message(&self, id: &MessageId) -> DidResult<LedgerMessage> {
        let state = self.state.read().await;
        state
            .messages
            .get(id)
            .map(|stored| stored.message.clone())
            .ok_or_else(|| DidError::NotFound(format!("message {}", id)))
    }
}
