/// DID document construction, signing and canonical encoding
use crate::{
    crypto::{KeyPair, KeyStore, KeyType, PublicKey},
    did::Did,
    error::{DidError, DidResult},
    ledger::MessageId,
    network::{validate_network_name, NetworkProfile},
};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Version of the canonical document schema
pub const DOCUMENT_SCHEMA_VERSION: u32 = 1;

/// Service endpoint advertised by a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Service {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub service_endpoint: String,
}

impl Service {
    pub fn new(
        id: impl Into<String>,
        service_type: impl Into<String>,
        service_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            service_type: service_type.into(),
            service_endpoint: service_endpoint.into(),
        }
    }
}

/// A versioned DID document.
///
/// Field declaration order is the canonical encoding order. A signed document
/// is immutable; changes go through [`DidDocument::new_version`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DidDocument {
    schema: u32,
    id: Did,
    network: String,
    public_key: PublicKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    services: Vec<Service>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    previous_message_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "signature_hex")]
    signature: Option<Vec<u8>>,
}

impl DidDocument {
    /// Generate a key pair and an unsigned document embedding its public key
    pub fn create(key_type: KeyType, network: &NetworkProfile) -> DidResult<(Self, KeyPair)> {
        validate_network_name(network.name())?;
        let key = KeyStore::generate(key_type)?;
        let doc = Self::from_key(&key, network)?;
        Ok((doc, key))
    }

    /// Build an unsigned document for an existing key pair
    pub fn from_key(key: &KeyPair, network: &NetworkProfile) -> DidResult<Self> {
        let id = Did::from_public_key(key.public_key(), network)?;
        let now = now();
        Ok(Self {
            schema: DOCUMENT_SCHEMA_VERSION,
            network: id.network().to_string(),
            id,
            public_key: key.public_key().clone(),
            created: Some(now),
            updated: Some(now),
            services: Vec::new(),
            previous_message_id: None,
            signature: None,
        })
    }

    pub fn id(&self) -> &Did {
        &self.id
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.updated
    }

    pub fn previous_message_id(&self) -> Option<&MessageId> {
        self.previous_message_id.as_ref()
    }

    pub fn signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Add or replace a service on an unsigned document
    pub fn insert_service(&mut self, service: Service) -> DidResult<()> {
        self.ensure_unsigned()?;
        if service.id.is_empty() {
            return Err(DidError::Validation("service id must not be empty".to_string()));
        }
        self.services.retain(|s| s.id != service.id);
        self.services.push(service);
        self.touch();
        Ok(())
    }

    /// Remove a service from an unsigned document
    pub fn remove_service(&mut self, service_id: &str) -> DidResult<bool> {
        self.ensure_unsigned()?;
        let before = self.services.len();
        self.services.retain(|s| s.id != service_id);
        let removed = self.services.len() != before;
        if removed {
            self.touch();
        }
        Ok(removed)
    }

    fn touch(&mut self) {
        let now = now();
        self.updated = Some(self.updated.map_or(now, |previous| previous.max(now)));
    }

    fn ensure_unsigned(&self) -> DidResult<()> {
        if self.is_signed() {
            return Err(DidError::AlreadySigned(self.id.to_string()));
        }
        Ok(())
    }

    /// Unsigned successor that references the message holding the previous version
    pub fn new_version(&self, previous_message_id: MessageId) -> Self {
        let mut next = Self {
            previous_message_id: Some(previous_message_id),
            signature: None,
            ..self.clone()
        };
        next.touch();
        next
    }

    /// Sign the canonical encoding and return the signed document
    pub fn sign(&self, key: &KeyPair) -> DidResult<Self> {
        self.ensure_unsigned()?;
        if key.public_key() != &self.public_key {
            return Err(DidError::SigningError(format!(
                "key pair does not match the public key of {}",
                self.id
            )));
        }

        let signature = key.sign(&self.signing_input()?)?;
        let signed = Self {
            signature: Some(signature),
            ..self.clone()
        };

        if !signed.verify() {
            return Err(DidError::Internal(format!(
                "freshly signed document {} does not verify",
                self.id
            )));
        }

        Ok(signed)
    }

    /// Check the signature against the embedded public key
    pub fn verify(&self) -> bool {
        let Some(signature) = &self.signature else {
            return false;
        };
        match self.signing_input() {
            Ok(input) => KeyStore::verify(&self.public_key, &input, signature),
            Err(_) => false,
        }
    }

    /// Whether the embedded key is the one the DID was derived from
    pub fn is_bound_to_did(&self) -> bool {
        self.id.is_derived_from(&self.public_key)
    }

    /// Deterministic encoding; field order is fixed by the schema
    pub fn to_canonical_bytes(&self) -> DidResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode canonical bytes, rejecting anything that would not re-encode identically
    pub fn from_canonical_bytes(bytes: &[u8]) -> DidResult<Self> {
        let doc: Self = serde_json::from_slice(bytes)?;

        if doc.schema != DOCUMENT_SCHEMA_VERSION {
            return Err(DidError::Validation(format!(
                "unsupported document schema {}",
                doc.schema
            )));
        }
        if doc.network != doc.id.network() {
            return Err(DidError::Validation(format!(
                "document network '{}' does not match {}",
                doc.network, doc.id
            )));
        }
        if doc.to_canonical_bytes()? != bytes {
            return Err(DidError::Validation(
                "document bytes are not in canonical form".to_string(),
            ));
        }

        Ok(doc)
    }

    /// SHA-256 of the canonical bytes
    pub fn content_hash(&self) -> DidResult<[u8; 32]> {
        let digest = Sha256::digest(self.to_canonical_bytes()?);
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&digest);
        Ok(hash)
    }

    fn signing_input(&self) -> DidResult<Vec<u8>> {
        let unsigned = Self {
            signature: None,
            ..self.clone()
        };
        unsigned.to_canonical_bytes()
    }
}

/// Timestamps are kept to whole seconds so they re-encode identically
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

mod signature_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_str(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
