/// Key generation and signing for DID documents
///
/// Implements Ed25519 and secp256k1 key pairs. Public keys travel in documents
/// as multibase (base58btc) strings carrying a multicodec prefix.

use crate::error::{DidError, DidResult};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Multicodec varint prefix for ed25519-pub
const ED25519_CODEC: [u8; 2] = [0xed, 0x01];

/// Multicodec varint prefix for secp256k1-pub
const SECP256K1_CODEC: [u8; 2] = [0xe7, 0x01];

/// Supported signature schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyType {
    #[default]
    Ed25519,
    Secp256k1,
}

impl KeyType {
    fn codec(&self) -> [u8; 2] {
        match self {
            KeyType::Ed25519 => ED25519_CODEC,
            KeyType::Secp256k1 => SECP256K1_CODEC,
        }
    }

    fn public_key_len(&self) -> usize {
        match self {
            KeyType::Ed25519 => 32,
            // Compressed SEC1 point
            KeyType::Secp256k1 => 33,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Ed25519 => "Ed25519",
            KeyType::Secp256k1 => "Secp256k1",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = DidError;

    fn from_str(s: &str) -> DidResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ed25519" => Ok(KeyType::Ed25519),
            "secp256k1" | "k256" => Ok(KeyType::Secp256k1),
            _ => Err(DidError::UnsupportedKeyType(s.to_string())),
        }
    }
}

/// Public half of a key pair, tagged with its scheme
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey {
    key_type: KeyType,
    bytes: Vec<u8>,
}

impl PublicKey {
    /// Wrap raw public key bytes, checking the length for the scheme
    pub fn new(key_type: KeyType, bytes: Vec<u8>) -> DidResult<Self> {
        if bytes.len() != key_type.public_key_len() {
            return Err(DidError::Validation(format!(
                "{} public key must be {} bytes, got {}",
                key_type,
                key_type.public_key_len(),
                bytes.len()
            )));
        }
        Ok(Self { key_type, bytes })
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Encode as multibase base58btc over `codec || key`
    pub fn to_multibase(&self) -> String {
        let mut data = self.key_type.codec().to_vec();
        data.extend_from_slice(&self.bytes);
        multibase::encode(multibase::Base::Base58Btc, data)
    }

    /// Decode a multibase string produced by [`PublicKey::to_multibase`]
    pub fn from_multibase(encoded: &str) -> DidResult<Self> {
        let (base, data) = multibase::decode(encoded)
            .map_err(|e| DidError::Validation(format!("Invalid multibase public key: {}", e)))?;
        if base != multibase::Base::Base58Btc {
            return Err(DidError::Validation(
                "Public key must be base58btc encoded".to_string(),
            ));
        }
        if data.len() < 2 {
            return Err(DidError::Validation("Public key is too short".to_string()));
        }

        let key_type = match [data[0], data[1]] {
            ED25519_CODEC => KeyType::Ed25519,
            SECP256K1_CODEC => KeyType::Secp256k1,
            other => {
                return Err(DidError::UnsupportedKeyType(format!(
                    "multicodec 0x{}",
                    hex::encode(other)
                )))
            }
        };

        Self::new(key_type, data[2..].to_vec())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_multibase())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_multibase())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        PublicKey::from_multibase(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Key pair owned by the caller. Only the public half is ever published.
pub struct KeyPair {
    public: PublicKey,
    private: Zeroizing<Vec<u8>>,
}

impl KeyPair {
    /// Rebuild a key pair from a 32-byte private key
    pub fn from_private_key(key_type: KeyType, private_key: &[u8]) -> DidResult<Self> {
        if private_key.len() != 32 {
            return Err(DidError::SigningError(
                "Private key must be exactly 32 bytes".to_string(),
            ));
        }

        let public_bytes = match key_type {
            KeyType::Ed25519 => {
                let mut secret = Zeroizing::new([0u8; 32]);
                secret.copy_from_slice(private_key);
                let signing_key = ed25519_dalek::SigningKey::from_bytes(&secret);
                signing_key.verifying_key().to_bytes().to_vec()
            }
            KeyType::Secp256k1 => {
                let signing_key = k256::ecdsa::SigningKey::from_slice(private_key)
                    .map_err(|e| DidError::SigningError(format!("Invalid private key: {}", e)))?;
                signing_key
                    .verifying_key()
                    .to_encoded_point(true)
                    .as_bytes()
                    .to_vec()
            }
        };

        Ok(Self {
            public: PublicKey::new(key_type, public_bytes)?,
            private: Zeroizing::new(private_key.to_vec()),
        })
    }

    /// Rebuild a key pair from a hex-encoded private key
    pub fn from_hex(key_type: KeyType, hex_key: &str) -> DidResult<Self> {
        let key_bytes = hex::decode(hex_key)
            .map_err(|e| DidError::SigningError(format!("Invalid hex private key: {}", e)))?;
        Self::from_private_key(key_type, &key_bytes)
    }

    pub fn key_type(&self) -> KeyType {
        self.public.key_type
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Raw private key bytes. Keep inside the process.
    pub fn private_key(&self) -> &[u8] {
        &self.private
    }

    /// Sign a message with this key pair
    pub fn sign(&self, message: &[u8]) -> DidResult<Vec<u8>> {
        KeyStore::sign(self.key_type(), &self.private, message)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("private", &"<redacted>")
            .finish()
    }
}

/// Key generation, signing and verification
pub struct KeyStore;

impl KeyStore {
    /// Generate fresh key material from the OS RNG
    pub fn generate(key_type: KeyType) -> DidResult<KeyPair> {
        let private = Zeroizing::new(match key_type {
            KeyType::Ed25519 => ed25519_dalek::SigningKey::generate(&mut OsRng)
                .to_bytes()
                .to_vec(),
            KeyType::Secp256k1 => k256::ecdsa::SigningKey::random(&mut OsRng)
                .to_bytes()
                .to_vec(),
        });
        KeyPair::from_private_key(key_type, &private)
    }

    /// Generate a key pair from a key type name such as "ed25519"
    pub fn generate_named(key_type: &str) -> DidResult<KeyPair> {
        Self::generate(key_type.parse()?)
    }

    /// Sign a message. Both schemes are deterministic.
    ///
    /// Returns a 64-byte signature
    pub fn sign(key_type: KeyType, private_key: &[u8], message: &[u8]) -> DidResult<Vec<u8>> {
        match key_type {
            KeyType::Ed25519 => {
                use ed25519_dalek::Signer;
                let secret: Zeroizing<[u8; 32]> =
                    Zeroizing::new(private_key.try_into().map_err(|_| {
                        DidError::SigningError("Ed25519 private key must be 32 bytes".to_string())
                    })?);
                let signing_key = ed25519_dalek::SigningKey::from_bytes(&secret);
                Ok(signing_key.sign(message).to_bytes().to_vec())
            }
            KeyType::Secp256k1 => {
                use k256::ecdsa::signature::Signer;
                let signing_key = k256::ecdsa::SigningKey::from_slice(private_key)
                    .map_err(|e| DidError::SigningError(format!("Invalid private key: {}", e)))?;
                let signature: k256::ecdsa::Signature = signing_key.sign(message);
                Ok(signature.to_bytes().to_vec())
            }
        }
    }

    /// Verify a signature against a public key. Malformed input verifies false.
    pub fn verify(public_key: &PublicKey, message: &[u8], signature: &[u8]) -> bool {
        match public_key.key_type {
            KeyType::Ed25519 => {
                use ed25519_dalek::Verifier;
                let Ok(bytes) = <[u8; 32]>::try_from(public_key.as_bytes()) else {
                    return false;
                };
                let Ok(verifying_key) = ed25519_dalek::VerifyingKey::from_bytes(&bytes) else {
                    return false;
                };
                let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
                    return false;
                };
                verifying_key.verify(message, &signature).is_ok()
            }
            KeyType::Secp256k1 => {
                use k256::ecdsa::signature::Verifier;
                let Ok(verifying_key) =
                    k256::ecdsa::VerifyingKey::from_sec1_bytes(public_key.as_bytes())
                else {
                    return false;
                };
                let Ok(signature) = k256::ecdsa::Signature::from_slice(signature) else {
                    return false;
                };
                verifying_key.verify(message, &signature).is_ok()
            }
        }
    }
}
