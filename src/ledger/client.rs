/// Ledger client: publish signed documents and resolve DIDs
///
/// Publishing walks Built → ProofOfWorkPending → Submitted →
/// ConfirmationPending → Confirmed, ending in Failed on any error. Every node
/// call is bounded by the request timeout, transport failures are retried with
/// exponential backoff, and both operations stop on an external cancel signal.
use crate::cache::ResolutionCache;
use crate::config::{ClientConfig, PowMode};
use crate::did::{Did, DidDocument};
use crate::error::{DidError, DidResult};
use crate::ledger::message::{LedgerMessage, MessageId, MessageStatus, SubmitRequest};
use crate::ledger::node::{HttpNode, NodeApi};
use crate::ledger::pow;
use crate::ledger::resolve::{select_chain, DocumentVersion};
use crate::ledger::retry::{sleep_or_cancel, Backoff, CancelSignal};
use crate::metrics;
use crate::network::NetworkProfile;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Messages fetched concurrently during resolution
const FETCH_CONCURRENCY: usize = 8;

/// Progress of a publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    Built,
    ProofOfWorkPending,
    Submitted,
    ConfirmationPending,
    Confirmed,
    Failed,
}

impl PublishState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishState::Built => "built",
            PublishState::ProofOfWorkPending => "proof_of_work_pending",
            PublishState::Submitted => "submitted",
            PublishState::ConfirmationPending => "confirmation_pending",
            PublishState::Confirmed => "confirmed",
            PublishState::Failed => "failed",
        }
    }
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of an accepted and confirmed message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub message_id: MessageId,
    pub network_id: String,
    pub inclusion_confirmed: bool,
    pub milestone_index: Option<u32>,
    /// Submission attempts, including the successful one
    pub submit_attempts: u32,
    /// Status queries made while waiting for confirmation
    pub confirmation_polls: u32,
    pub state: PublishState,
}

/// Where a resolved document came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionMetadata {
    /// Message holding the returned version
    pub message_id: MessageId,
    pub milestone_index: u32,
    pub timestamp: Option<i64>,
    /// Position of the version in its chain, starting at 1
    pub version: usize,
    pub resolved_at: DateTime<Utc>,
    pub from_cache: bool,
}

/// Latest valid document for a DID
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedDocument {
    pub document: DidDocument,
    pub metadata: ResolutionMetadata,
}

struct PublishTracker {
    did: String,
    state: PublishState,
}

impl PublishTracker {
    fn advance(&mut self, next: PublishState) {
        debug!("Publish {}: {} -> {}", self.did, self.state, next);
        self.state = next;
    }
}

/// Client bound to one network profile and node
pub struct LedgerClient {
    config: ClientConfig,
    profile: NetworkProfile,
    node: Arc<dyn NodeApi>,
    cache: Option<ResolutionCache>,
}

impl LedgerClient {
    /// Connect to the configured node over HTTP
    pub fn new(config: ClientConfig) -> DidResult<Self> {
        config.validate()?;
        let profile = config.network_profile()?;
        let node = HttpNode::new(&profile, config.request_timeout)?;
        info!("Ledger client for network {} at {}", profile, profile.node_url());
        Ok(Self::with_node(config, profile, Arc::new(node)))
    }

    /// Use an explicit node implementation
    pub fn with_node(config: ClientConfig, profile: NetworkProfile, node: Arc<dyn NodeApi>) -> Self {
        let cache = config
            .cache
            .enabled
            .then(|| ResolutionCache::new(config.cache.ttl));
        Self {
            config,
            profile,
            node,
            cache,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn profile(&self) -> &NetworkProfile {
        &self.profile
    }

    pub fn cache(&self) -> Option<&ResolutionCache> {
        self.cache.as_ref()
    }

    /// Publish a signed document and wait for confirmation
    pub async fn publish(&self, doc: &DidDocument) -> DidResult<Receipt> {
        self.publish_with_cancel(doc, &CancelSignal::never()).await
    }

    /// Publish, stopping early if `cancel` fires.
    ///
    /// Cancelling before the node acknowledges the message leaves nothing
    /// behind. Cancelling afterwards only stops polling; the error carries the
    /// message id so [`LedgerClient::await_confirmation`] can pick it up.
    pub async fn publish_with_cancel(
        &self,
        doc: &DidDocument,
        cancel: &CancelSignal,
    ) -> DidResult<Receipt> {
        let started = Instant::now();
        let mut tracker = PublishTracker {
            did: doc.id().to_string(),
            state: PublishState::Built,
        };

        let result = self.run_publish(doc, cancel, &mut tracker).await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(receipt) => {
                info!(
                    "Published {} as message {} (milestone {:?}, {} submit attempt(s))",
                    tracker.did, receipt.message_id, receipt.milestone_index, receipt.submit_attempts
                );
                metrics::record_publish("confirmed", elapsed);
            }
            Err(e) => {
                warn!("Publish of {} failed while {}: {}", tracker.did, tracker.state, e);
                tracker.advance(PublishState::Failed);
                metrics::record_publish(e.kind(), elapsed);
                metrics::record_error(e.kind(), "publish");
            }
        }
        result
    }

    async fn run_publish(
        &self,
        doc: &DidDocument,
        cancel: &CancelSignal,
        tracker: &mut PublishTracker,
    ) -> DidResult<Receipt> {
        self.check_publishable(doc)?;
        if cancel.is_cancelled() {
            return Err(DidError::Cancelled { message_id: None });
        }

        let subject = doc.id().to_string();
        let (info, _) = self
            .call_with_retry(&subject, "network_info", cancel, || self.node.network_info())
            .await?;
        if info.network_id != self.profile.network_id() {
            return Err(DidError::NetworkMismatch {
                did: doc.id().to_string(),
                expected: self.profile.network_id().to_string(),
                found: info.network_id,
            });
        }

        let index = doc.id().tag().to_string();
        let data = doc.to_canonical_bytes()?;

        tracker.advance(PublishState::ProofOfWorkPending);
        let nonce = match self.config.pow.mode {
            PowMode::Remote => None,
            PowMode::Local => {
                let base = self.config.pow.difficulty.unwrap_or(info.min_pow_difficulty);
                let target = pow::target_difficulty(base, data.len());
                debug!("Searching proof-of-work for {} at {} bits", tracker.did, target);
                let nonce = pow::solve_async(
                    index.clone(),
                    data.clone(),
                    target,
                    self.config.pow.timeout,
                    cancel,
                )
                .await?;
                Some(nonce)
            }
        };

        let request = SubmitRequest { index, data, nonce };
        let (message_id, submit_attempts) = self
            .call_with_retry(&subject, "submit", cancel, || self.node.submit(&request))
            .await?;
        tracker.advance(PublishState::Submitted);
        info!("Node accepted message {} for {}", message_id, tracker.did);

        tracker.advance(PublishState::ConfirmationPending);
        let (status, confirmation_polls) = self.poll_confirmation(&message_id, cancel).await?;
        tracker.advance(PublishState::Confirmed);

        if let Some(cache) = &self.cache {
            cache.invalidate(doc.id()).await;
        }

        Ok(Receipt {
            message_id,
            network_id: self.profile.network_id().to_string(),
            inclusion_confirmed: true,
            milestone_index: status.milestone_index,
            submit_attempts,
            confirmation_polls,
            state: PublishState::Confirmed,
        })
    }

    fn check_publishable(&self, doc: &DidDocument) -> DidResult<()> {
        if !doc.is_signed() {
            return Err(DidError::Validation(format!(
                "document for {} must be signed before publishing",
                doc.id()
            )));
        }
        if !doc.verify() {
            return Err(DidError::VerificationFailed(format!(
                "signature on {} does not verify",
                doc.id()
            )));
        }
        if !doc.is_bound_to_did() {
            return Err(DidError::VerificationFailed(format!(
                "public key of {} does not derive its DID tag",
                doc.id()
            )));
        }
        if doc.network() != self.profile.name() {
            return Err(DidError::NetworkMismatch {
                did: doc.id().to_string(),
                expected: self.profile.name().to_string(),
                found: doc.network().to_string(),
            });
        }
        Ok(())
    }

    /// Single status query without retries
    pub async fn check_confirmation(&self, message_id: &MessageId) -> DidResult<MessageStatus> {
        self.timed("message_status", self.node.message_status(message_id))
            .await
    }

    /// Resume polling a message submitted earlier
    pub async fn await_confirmation(
        &self,
        message_id: &MessageId,
        cancel: &CancelSignal,
    ) -> DidResult<Receipt> {
        let (status, confirmation_polls) = self.poll_confirmation(message_id, cancel).await?;
        info!("Message {} confirmed at milestone {:?}", message_id, status.milestone_index);
        Ok(Receipt {
            message_id: *message_id,
            network_id: self.profile.network_id().to_string(),
            inclusion_confirmed: true,
            milestone_index: status.milestone_index,
            submit_attempts: 0,
            confirmation_polls,
            state: PublishState::Confirmed,
        })
    }

    async fn poll_confirmation(
        &self,
        message_id: &MessageId,
        cancel: &CancelSignal,
    ) -> DidResult<(MessageStatus, u32)> {
        let mut backoff = Backoff::new(&self.config.retry);
        let mut last_error: Option<DidError> = None;
        let mut seen_status = false;

        loop {
            let attempt = backoff.record_attempt();

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(DidError::Cancelled {
                        message_id: Some(message_id.to_string()),
                    });
                }
                outcome = self.timed("message_status", self.node.message_status(message_id)) => outcome,
            };

            match outcome {
                Ok(status) => {
                    if let Some(reason) = status.conflict {
                        return Err(DidError::RejectedMessage {
                            subject: Some(message_id.to_string()),
                            reason,
                        });
                    }
                    if status.included {
                        return Ok((status, attempt));
                    }
                    seen_status = true;
                    debug!("Message {} not confirmed yet (poll {})", message_id, attempt);
                }
                // Nodes may not index a fresh message immediately
                Err(DidError::NotFound(_)) => {
                    seen_status = true;
                    debug!("Message {} not visible yet (poll {})", message_id, attempt);
                }
                Err(e) if e.is_retryable() => {
                    warn!("Status poll {} for {} failed: {}", attempt, message_id, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e.with_subject(&message_id.to_string())),
            }

            match backoff.next_delay() {
                Some(delay) => {
                    sleep_or_cancel(delay, cancel, Some(message_id.to_string())).await?
                }
                None => {
                    return Err(match last_error {
                        Some(e) if !seen_status => DidError::NodeUnreachable {
                            subject: message_id.to_string(),
                            operation: "message_status".to_string(),
                            attempts: attempt,
                            message: e.to_string(),
                        },
                        _ => DidError::PublishTimeout {
                            message_id: message_id.to_string(),
                            attempts: attempt,
                        },
                    });
                }
            }
        }
    }

    /// Resolve the latest valid document for a DID
    pub async fn resolve(&self, did: &Did) -> DidResult<ResolvedDocument> {
        self.resolve_with_cancel(did, &CancelSignal::never()).await
    }

    pub async fn resolve_with_cancel(
        &self,
        did: &Did,
        cancel: &CancelSignal,
    ) -> DidResult<ResolvedDocument> {
        self.ensure_network(did)?;
        if cancel.is_cancelled() {
            return Err(DidError::Cancelled { message_id: None });
        }

        if let Some(cache) = &self.cache {
            if let Some(mut cached) = cache.get(did).await {
                cached.metadata.from_cache = true;
                metrics::record_resolution(true, true);
                return Ok(cached);
            }
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DidError::Cancelled { message_id: None }),
            chain = self.fetch_chain(did, cancel) => chain,
        };

        let chain = match result {
            Ok(chain) => chain,
            Err(e) => {
                warn!("Resolution of {} failed: {}", did, e);
                metrics::record_resolution(false, false);
                metrics::record_error(e.kind(), "resolve");
                return Err(e);
            }
        };

        let version = chain.len();
        let latest = chain
            .into_iter()
            .last()
            .ok_or_else(|| DidError::Internal(format!("empty version chain for {}", did)))?;

        let resolved = ResolvedDocument {
            document: latest.document,
            metadata: ResolutionMetadata {
                message_id: latest.message_id,
                milestone_index: latest.milestone_index,
                timestamp: latest.timestamp,
                version,
                resolved_at: Utc::now(),
                from_cache: false,
            },
        };

        if let Some(cache) = &self.cache {
            cache.put(did, resolved.clone()).await;
        }
        metrics::record_resolution(false, true);
        info!(
            "Resolved {} to version {} (message {})",
            did, version, resolved.metadata.message_id
        );
        Ok(resolved)
    }

    /// Every version of a DID's document, oldest first. Never cached.
    pub async fn resolve_history(&self, did: &Did) -> DidResult<Vec<DocumentVersion>> {
        self.ensure_network(did)?;
        self.fetch_chain(did, &CancelSignal::never()).await
    }

    fn ensure_network(&self, did: &Did) -> DidResult<()> {
        if did.network() != self.profile.name() {
            return Err(DidError::NetworkMismatch {
                did: did.to_string(),
                expected: self.profile.name().to_string(),
                found: did.network().to_string(),
            });
        }
        Ok(())
    }

    async fn fetch_chain(
        &self,
        did: &Did,
        cancel: &CancelSignal,
    ) -> DidResult<Vec<DocumentVersion>> {
        let subject = did.to_string();
        let (ids, _) = self
            .call_with_retry(&subject, "query_index", cancel, || {
                self.node.query_index(did.tag())
            })
            .await?;
        debug!("Found {} message(s) under {}", ids.len(), did.tag());

        let fetched: Vec<DidResult<LedgerMessage>> = stream::iter(ids)
            .map(|id| async move {
                self.call_with_retry(&id.to_string(), "message", cancel, || self.node.message(&id))
                    .await
                    .map(|(message, _)| message)
            })
            .buffer_unordered(FETCH_CONCURRENCY)
            .collect()
            .await;

        let mut messages = Vec::with_capacity(fetched.len());
        for result in fetched {
            match result {
                Ok(message) => messages.push(message),
                Err(DidError::NotFound(what)) => debug!("Skipping vanished {}", what),
                Err(e) => return Err(e),
            }
        }

        select_chain(did, messages, self.config.conflict_policy)
    }

    /// Run one node call under the request timeout
    async fn timed<T>(
        &self,
        operation: &str,
        call: impl Future<Output = DidResult<T>>,
    ) -> DidResult<T> {
        let timeout = self.config.request_timeout;
        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(DidError::transport(
                operation,
                format!("timed out after {}ms", timeout.as_millis()),
            )),
        };
        metrics::record_node_call(operation, result.is_ok());
        result
    }

    /// Retry transport failures with backoff; returns the value and attempt count.
    /// `subject` names the DID or message id in surfaced errors.
    async fn call_with_retry<T, F, Fut>(
        &self,
        subject: &str,
        operation: &str,
        cancel: &CancelSignal,
        mut call: F,
    ) -> DidResult<(T, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DidResult<T>>,
    {
        let mut backoff = Backoff::new(&self.config.retry);

        loop {
            let attempt = backoff.record_attempt();

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(DidError::Cancelled { message_id: None });
                }
                outcome = self.timed(operation, call()) => outcome,
            };

            let error = match outcome {
                Ok(value) => return Ok((value, attempt)),
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e.with_subject(subject)),
            };

            match backoff.next_delay() {
                Some(delay) => {
                    warn!(
                        "{} attempt {} for {} failed: {}; retrying in {:?}",
                        operation, attempt, subject, error, delay
                    );
                    sleep_or_cancel(delay, cancel, None).await?;
                }
                None => {
                    return Err(DidError::NodeUnreachable {
                        subject: subject.to_string(),
                        operation: operation.to_string(),
                        attempts: attempt,
                        message: error.to_string(),
                    });
                }
            }
        }
    }
}
