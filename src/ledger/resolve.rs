/// Chain selection over the messages filed under a DID's index
///
/// Only confirmed messages that decode, name the DID, are bound to its key and
/// carry a valid signature take part. Identical documents collapse onto the
/// earliest copy. The earliest root starts the chain and each step follows the
/// later versions whose `previousMessageId` points at the current head.

use crate::config::ConflictPolicy;
use crate::did::{Did, DidDocument};
use crate::error::{DidError, DidResult};
use crate::ledger::message::{LedgerMessage, MessageId};
use std::collections::HashMap;
use tracing::{debug, warn};

/// A document version together with where the ledger put it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentVersion {
    pub message_id: MessageId,
    pub milestone_index: u32,
    pub timestamp: Option<i64>,
    pub document: DidDocument,
}

/// Select the authoritative version chain, root first
pub fn select_chain(
    did: &Did,
    mut messages: Vec<LedgerMessage>,
    policy: ConflictPolicy,
) -> DidResult<Vec<DocumentVersion>> {
    messages.retain(LedgerMessage::is_confirmed);
    messages.sort_by(|a, b| a.ledger_cmp(b));

    let mut by_content: HashMap<[u8; 32], MessageId> = HashMap::new();
    let mut aliases: HashMap<MessageId, MessageId> = HashMap::new();
    let mut candidates: Vec<DocumentVersion> = Vec::new();

    for message in messages {
        let Some(document) = accept(did, &message) else {
            continue;
        };
        let Ok(hash) = document.content_hash() else {
            continue;
        };
        if let Some(kept) = by_content.get(&hash) {
            debug!("Message {} duplicates {}", message.id, kept);
            aliases.insert(message.id, *kept);
            continue;
        }
        by_content.insert(hash, message.id);
        aliases.insert(message.id, message.id);
        candidates.push(DocumentVersion {
            message_id: message.id,
            milestone_index: message.milestone_index.unwrap_or_default(),
            timestamp: message.timestamp,
            document,
        });
    }

    let root = candidates
        .iter()
        .position(|v| v.document.previous_message_id().is_none())
        .ok_or_else(|| DidError::NotFound(format!("no valid document for {}", did)))?;

    let mut chain = vec![candidates[root].clone()];
    let mut head = root;

    loop {
        let head_id = candidates[head].message_id;
        let children: Vec<usize> = (head + 1..candidates.len())
            .filter(|&i| {
                candidates[i]
                    .document
                    .previous_message_id()
                    .and_then(|prev| aliases.get(prev))
                    == Some(&head_id)
            })
            .collect();

        let next = match children.as_slice() {
            [] => break,
            [only] => *only,
            [first, ..] => match policy {
                ConflictPolicy::Reject => {
                    return Err(DidError::ResolutionAmbiguous {
                        did: did.to_string(),
                        candidates: children.len(),
                    });
                }
                ConflictPolicy::FirstWins => {
                    warn!(
                        "{} competing updates to {} for {}; taking {}",
                        children.len(),
                        head_id,
                        did,
                        candidates[*first].message_id
                    );
                    *first
                }
            },
        };

        chain.push(candidates[next].clone());
        head = next;
    }

    debug!("Resolved {} with {} version(s)", did, chain.len());
    Ok(chain)
}

fn accept(did: &Did, message: &LedgerMessage) -> Option<DidDocument> {
    if message.index != did.tag() {
        return None;
    }
    let document = match DidDocument::from_canonical_bytes(&message.data) {
        Ok(doc) => doc,
        Err(e) => {
            debug!("Skipping undecodable message {}: {}", message.id, e);
            return None;
        }
    };
    if document.id() != did {
        debug!("Skipping message {} naming {}", message.id, document.id());
        return None;
    }
    if !document.is_bound_to_did() || !document.verify() {
        warn!("Skipping message {} with invalid signature or key", message.id);
        return None;
    }
    Some(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{KeyPair, KeyType};
    use crate::did::Service;
    use crate::network::NetworkProfile;

    struct Ledger {
        messages: Vec<LedgerMessage>,
    }

    impl Ledger {
        fn new() -> Self {
            Self { messages: Vec::new() }
        }

        fn put(&mut self, doc: &DidDocument, milestone: Option<u32>) -> MessageId {
            let mut id = [0u8; 32];
            id[0] = self.messages.len() as u8 + 1;
            let id = MessageId::new(id);
            self.messages.push(LedgerMessage {
                id,
                index: doc.id().tag().to_string(),
                data: doc.to_canonical_bytes().unwrap(),
                milestone_index: milestone,
                timestamp: milestone.map(|m| 1_000 + m as i64),
            });
            id
        }
    }

    fn root() -> (DidDocument, KeyPair) {
        let profile = NetworkProfile::from_name("dev").unwrap();
        let (doc, key) = DidDocument::create(KeyType::Ed25519, &profile).unwrap();
        (doc.sign(&key).unwrap(), key)
    }

    fn update(prev: &DidDocument, prev_id: MessageId, key: &KeyPair, service: &str) -> DidDocument {
        let mut next = prev.new_version(prev_id);
        next.insert_service(Service::new(service, "LinkedDomains", "https://example.org"))
            .unwrap();
        next.sign(key).unwrap()
    }

    #[test]
    fn test_single_root() {
        let (doc, _) = root();
        let mut ledger = Ledger::new();
        let id = ledger.put(&doc, Some(1));

        let chain = select_chain(doc.id(), ledger.messages, ConflictPolicy::Reject).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].message_id, id);
        assert_eq!(chain[0].document, doc);
    }

    #[test]
    fn test_unconfirmed_ignored() {
        let (doc, _) = root();
        let mut ledger = Ledger::new();
        ledger.put(&doc, None);

        let result = select_chain(doc.id(), ledger.messages, ConflictPolicy::Reject);
        assert!(matches!(result, Err(DidError::NotFound(_))));
    }

    #[test]
    fn test_duplicates_collapse_to_earliest() {
        let (doc, key) = root();
        let mut ledger = Ledger::new();
        let first = ledger.put(&doc, Some(1));
        let second = ledger.put(&doc, Some(2));
        // An update pointing at the duplicate still extends the chain
        let next = update(&doc, second, &key, "#a");
        ledger.put(&next, Some(3));

        let chain = select_chain(doc.id(), ledger.messages, ConflictPolicy::Reject).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].message_id, first);
        assert_eq!(chain[1].document, next);
    }

    #[test]
    fn test_version_chain_followed() {
        let (doc, key) = root();
        let mut ledger = Ledger::new();
        let id1 = ledger.put(&doc, Some(1));
        let v2 = update(&doc, id1, &key, "#a");
        let id2 = ledger.put(&v2, Some(2));
        let v3 = update(&v2, id2, &key, "#b");
        let id3 = ledger.put(&v3, Some(3));

        let chain = select_chain(doc.id(), ledger.messages, ConflictPolicy::Reject).unwrap();
        let ids: Vec<_> = chain.iter().map(|v| v.message_id).collect();
        assert_eq!(ids, vec![id1, id2, id3]);
    }

    #[test]
    fn test_competing_updates() {
        let (doc, key) = root();
        let mut ledger = Ledger::new();
        let id1 = ledger.put(&doc, Some(1));
        let a = update(&doc, id1, &key, "#a");
        let b = update(&doc, id1, &key, "#b");
        let id_a = ledger.put(&a, Some(2));
        ledger.put(&b, Some(3));

        let result = select_chain(doc.id(), ledger.messages.clone(), ConflictPolicy::Reject);
        assert!(matches!(
            result,
            Err(DidError::ResolutionAmbiguous { candidates: 2, .. })
        ));

        let chain = select_chain(doc.id(), ledger.messages, ConflictPolicy::FirstWins).unwrap();
        assert_eq!(chain.last().unwrap().message_id, id_a);
    }

    #[test]
    fn test_forged_update_skipped() {
        let (doc, _) = root();
        let mut ledger = Ledger::new();
        let id1 = ledger.put(&doc, Some(1));

        // Same DID, but signed by an unrelated key
        let forger = crate::crypto::KeyStore::generate(KeyType::Ed25519).unwrap();
        let forged = doc.new_version(id1);
        let unsigned = forged.to_canonical_bytes().unwrap();
        let sig = forger.sign(&unsigned).unwrap();
        let mut bytes = unsigned[..unsigned.len() - 1].to_vec();
        bytes.extend_from_slice(format!(",\"signature\":\"{}\"}}", hex::encode(sig)).as_bytes());
        assert!(DidDocument::from_canonical_bytes(&bytes).is_ok());

        ledger.messages.push(LedgerMessage {
            id: MessageId::new([0xee; 32]),
            index: doc.id().tag().to_string(),
            data: bytes,
            milestone_index: Some(2),
            timestamp: Some(1_002),
        });

        let chain = select_chain(doc.id(), ledger.messages, ConflictPolicy::Reject).unwrap();
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_garbage_and_foreign_documents_skipped() {
        let (doc, _) = root();
        let (other, _) = root();
        let mut ledger = Ledger::new();
        ledger.messages.push(LedgerMessage {
            id: MessageId::new([0xaa; 32]),
            index: doc.id().tag().to_string(),
            data: b"not a document".to_vec(),
            milestone_index: Some(1),
            timestamp: Some(1_001),
        });
        // Foreign document filed under this DID's index
        ledger.put(&other, Some(2));
        if let Some(last) = ledger.messages.last_mut() {
            last.index = doc.id().tag().to_string();
        }
        let id = ledger.put(&doc, Some(3));

        let chain = select_chain(doc.id(), ledger.messages, ConflictPolicy::Reject).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].message_id, id);
    }

    #[test]
    fn test_update_before_its_parent_ignored() {
        let (doc, key) = root();
        let mut ledger = Ledger::new();
        let id1 = ledger.put(&doc, Some(5));
        let early = update(&doc, id1, &key, "#a");
        ledger.put(&early, Some(4));

        let chain = select_chain(doc.id(), ledger.messages, ConflictPolicy::Reject).unwrap();
        assert_eq!(chain.len(), 1);
    }
}
