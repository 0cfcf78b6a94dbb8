/// Ledger access: node boundary, proof-of-work, retries and the client
///
/// Documents are filed as indexed messages under their DID tag. Publication
/// waits for milestone confirmation; resolution reads every message under the
/// tag back and re-verifies it locally.

pub mod client;
pub mod memory;
pub mod message;
pub mod node;
pub mod pow;
pub mod resolve;
pub mod retry;

pub use client::{LedgerClient, PublishState, Receipt, ResolutionMetadata, ResolvedDocument};
pub use memory::InMemoryNode;
pub use message::{LedgerMessage, MessageId, MessageStatus, NodeInfo, SubmitRequest};
pub use node::{HttpNode, NodeApi};
pub use resolve::{select_chain, DocumentVersion};
pub use retry::{Backoff, CancelSignal, Canceller};
