/// Cryptography module for document keys
///
/// Handles Ed25519 and secp256k1 signing for DID documents

pub mod keys;

pub use keys::{KeyPair, KeyStore, KeyType, PublicKey};
