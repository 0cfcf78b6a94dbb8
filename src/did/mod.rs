/// Decentralized identifiers and the documents they name
///
/// A DID is `did:iota:<network>:<tag>` where the tag is the base58 SHA-256
/// of the initial public key. Main network DIDs omit the network segment.

pub mod document;

pub use document::{DidDocument, Service, DOCUMENT_SCHEMA_VERSION};

use crate::{
    crypto::PublicKey,
    error::{DidError, DidResult},
    network::{validate_network_name, NetworkProfile},
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// DID method handled by this client
pub const DID_METHOD: &str = "iota";

/// Network name implied by DIDs without a network segment
pub const MAIN_NETWORK: &str = "main";

/// Decentralized identifier bound to one network
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Did {
    network: String,
    tag: String,
}

impl Did {
    /// Derive the DID for a public key on a network
    pub fn from_public_key(public_key: &PublicKey, network: &NetworkProfile) -> DidResult<Self> {
        validate_network_name(network.name())?;
        Ok(Self {
            network: network.name().to_string(),
            tag: compute_tag(public_key),
        })
    }

    /// Network name this DID was created on
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Base58 key hash; also the ledger index for this DID's messages
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Whether the public key is the one this DID was derived from
    pub fn is_derived_from(&self, public_key: &PublicKey) -> bool {
        self.tag == compute_tag(public_key)
    }
}

fn compute_tag(public_key: &PublicKey) -> String {
    let hash = Sha256::digest(public_key.as_bytes());
    bs58::encode(hash).into_string()
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.network == MAIN_NETWORK {
            write!(f, "did:{}:{}", DID_METHOD, self.tag)
        } else {
            write!(f, "did:{}:{}:{}", DID_METHOD, self.network, self.tag)
        }
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({})", self)
    }
}

impl FromStr for Did {
    type Err = DidError;

    fn from_str(s: &str) -> DidResult<Self> {
        let parts: Vec<&str> = s.split(':').collect();

        let (network, tag) = match parts.as_slice() {
            ["did", method, tag] if *method == DID_METHOD => (MAIN_NETWORK, *tag),
            ["did", method, network, tag] if *method == DID_METHOD => (*network, *tag),
            ["did", method, ..] => {
                return Err(DidError::InvalidDid(format!(
                    "unsupported method '{}' in {}",
                    method, s
                )))
            }
            _ => return Err(DidError::InvalidDid(s.to_string())),
        };

        validate_network_name(network)?;

        let decoded = bs58::decode(tag)
            .into_vec()
            .map_err(|e| DidError::InvalidDid(format!("tag of {} is not base58: {}", s, e)))?;
        if decoded.len() != 32 {
            return Err(DidError::InvalidDid(format!(
                "tag of {} must encode 32 bytes",
                s
            )));
        }

        Ok(Self {
            network: network.to_string(),
            tag: tag.to_string(),
        })
    }
}

impl Serialize for Did {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
