/// Configuration management for the identity client
use crate::error::{DidError, DidResult};
use crate::network::{NetworkProfile, DEFAULT_NETWORK};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Timeout applied to every single node call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// First retry delay
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(250);

/// Upper bound on a single retry delay
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(10);

/// Attempts per retried step. With the base and cap above the sleeps add up
/// to roughly 56 seconds.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 11;

/// Upper bound on a local proof-of-work search
pub const DEFAULT_POW_TIMEOUT: Duration = Duration::from_secs(60);

/// Resolution cache entry lifetime
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Where proof-of-work is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowMode {
    /// The node performs proof-of-work on submission
    #[default]
    Remote,
    /// The client searches the nonce before submitting
    Local,
}

impl FromStr for PowMode {
    type Err = DidError;

    fn from_str(s: &str) -> DidResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "remote" | "node" => Ok(PowMode::Remote),
            "local" | "client" => Ok(PowMode::Local),
            other => Err(DidError::Validation(format!("Invalid PoW mode: {}", other))),
        }
    }
}

/// What resolution does with competing updates to the same version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Fail with `ResolutionAmbiguous`
    #[default]
    Reject,
    /// Take the update that is earliest in ledger order
    FirstWins,
}

impl FromStr for ConflictPolicy {
    type Err = DidError;

    fn from_str(s: &str) -> DidResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(ConflictPolicy::Reject),
            "first-wins" | "first_wins" => Ok(ConflictPolicy::FirstWins),
            other => Err(DidError::Validation(format!(
                "Invalid conflict policy: {}",
                other
            ))),
        }
    }
}

/// Retry schedule for node calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BACKOFF_BASE,
            max_delay: DEFAULT_BACKOFF_CAP,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Proof-of-work settings
#[derive(Debug, Clone)]
pub struct PowConfig {
    pub mode: PowMode,
    /// Overrides the difficulty reported by the node
    pub difficulty: Option<u32>,
    pub timeout: Duration,
}

impl Default for PowConfig {
    fn default() -> Self {
        Self {
            mode: PowMode::Remote,
            difficulty: None,
            timeout: DEFAULT_POW_TIMEOUT,
        }
    }
}

/// Resolution cache settings
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// Client configuration, passed explicitly to the ledger client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Network name or alias; empty selects [`DEFAULT_NETWORK`]
    pub network: String,
    /// Replaces the network's default node URL
    pub node_url: Option<String>,
    /// Reject unknown network names
    pub strict_network: bool,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
    pub pow: PowConfig,
    pub conflict_policy: ConflictPolicy,
    pub cache: CacheSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network: DEFAULT_NETWORK.to_string(),
            node_url: None,
            strict_network: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryConfig::default(),
            pow: PowConfig::default(),
            conflict_policy: ConflictPolicy::default(),
            cache: CacheSettings::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables (and `.env`)
    pub fn from_env() -> DidResult<Self> {
        dotenv::dotenv().ok();

        let defaults = Self::default();

        let network = env::var("IDENTITY_NETWORK").unwrap_or(defaults.network);
        let node_url = env::var("IDENTITY_NODE_URL").ok().filter(|u| !u.is_empty());
        let strict_network = parse_var("IDENTITY_STRICT_NETWORK", false)?;

        let request_timeout = Duration::from_millis(parse_var(
            "IDENTITY_REQUEST_TIMEOUT_MS",
            DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
        )?);

        let retry = RetryConfig {
            base_delay: Duration::from_millis(parse_var(
                "IDENTITY_BACKOFF_BASE_MS",
                DEFAULT_BACKOFF_BASE.as_millis() as u64,
            )?),
            max_delay: Duration::from_millis(parse_var(
                "IDENTITY_BACKOFF_CAP_MS",
                DEFAULT_BACKOFF_CAP.as_millis() as u64,
            )?),
            max_attempts: parse_var("IDENTITY_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
        };

        let pow = PowConfig {
            mode: parse_var("IDENTITY_POW_MODE", PowMode::Remote)?,
            difficulty: match env::var("IDENTITY_POW_DIFFICULTY") {
                Ok(raw) => Some(raw.parse().map_err(|_| {
                    DidError::Validation(format!("Invalid IDENTITY_POW_DIFFICULTY: {}", raw))
                })?),
                Err(_) => None,
            },
            timeout: Duration::from_millis(parse_var(
                "IDENTITY_POW_TIMEOUT_MS",
                DEFAULT_POW_TIMEOUT.as_millis() as u64,
            )?),
        };

        let conflict_policy = parse_var("IDENTITY_CONFLICT_POLICY", ConflictPolicy::Reject)?;

        let cache = CacheSettings {
            enabled: parse_var("IDENTITY_CACHE_ENABLED", true)?,
            ttl: Duration::from_secs(parse_var(
                "IDENTITY_CACHE_TTL_SECS",
                DEFAULT_CACHE_TTL.as_secs(),
            )?),
        };

        let config = Self {
            network,
            node_url,
            strict_network,
            request_timeout,
            retry,
            pow,
            conflict_policy,
            cache,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make retries or timeouts meaningless
    pub fn validate(&self) -> DidResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(DidError::Validation(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(DidError::Validation(
                "request timeout must be non-zero".to_string(),
            ));
        }
        if self.pow.timeout.is_zero() {
            return Err(DidError::Validation(
                "proof-of-work timeout must be non-zero".to_string(),
            ));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(DidError::Validation(
                "backoff base delay exceeds the cap".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the network profile this configuration describes
    pub fn network_profile(&self) -> DidResult<NetworkProfile> {
        let mut builder = NetworkProfile::builder()
            .name(self.network.as_str())
            .strict(self.strict_network);
        if let Some(url) = &self.node_url {
            builder = builder.node_url(url.as_str());
        }
        builder.build()
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> DidResult<T> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| DidError::Validation(format!("Invalid {}: {}", name, raw))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.network, "tangle");
        assert_eq!(config.retry.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_default_backoff_budget_covers_about_a_minute() {
        let retry = RetryConfig::default();
        let mut total = Duration::ZERO;
        let mut delay = retry.base_delay;
        for _ in 1..retry.max_attempts {
            total += delay;
            delay = (delay * 2).min(retry.max_delay);
        }
        assert!(total >= Duration::from_secs(50));
        assert!(total <= Duration::from_secs(70));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = ClientConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(DidError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let mut config = ClientConfig::default();
        config.retry.base_delay = Duration::from_secs(20);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_network_profile_with_override() {
        let config = ClientConfig {
            network: String::new(),
            node_url: Some("http://192.168.1.10:14265/".to_string()),
            ..ClientConfig::default()
        };
        let profile = config.network_profile().unwrap();
        assert_eq!(profile.name(), "tangle");
        assert_eq!(profile.node_url().as_str(), "http://192.168.1.10:14265/");
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("LOCAL".parse::<PowMode>().unwrap(), PowMode::Local);
        assert_eq!(
            "first-wins".parse::<ConflictPolicy>().unwrap(),
            ConflictPolicy::FirstWins
        );
        assert!("sometimes".parse::<ConflictPolicy>().is_err());
    }
}
