/// Tangle Identity - DID document registry client
///
/// Creates and signs DID documents, publishes them as proof-of-work gated
/// ledger messages and resolves DIDs back to their latest verified document.

pub mod cache;
pub mod config;
pub mod crypto;
pub mod did;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod network;

pub use cache::ResolutionCache;
pub use config::{ClientConfig, ConflictPolicy, PowMode};
pub use crypto::{KeyPair, KeyStore, KeyType, PublicKey};
pub use did::{Did, DidDocument, Service};
pub use error::{DidError, DidResult, ErrorCategory};
pub use ledger::{CancelSignal, Canceller, LedgerClient, Receipt, ResolvedDocument};
pub use network::NetworkProfile;
