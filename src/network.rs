/// Network profiles: name validation, known aliases and node endpoints
use crate::error::{DidError, DidResult};
use std::fmt;
use url::Url;

/// Network used when an empty name is given
pub const DEFAULT_NETWORK: &str = "tangle";

/// REST endpoint of a locally running private tangle node
pub const DEFAULT_NODE_URL: &str = "http://127.0.0.1:14265/";

/// Network names are embedded in DIDs and limited to this many characters
pub const MAX_NETWORK_NAME_LEN: usize = 6;

/// Built-in network definition
struct KnownNetwork {
    name: &'static str,
    aliases: &'static [&'static str],
    network_id: &'static str,
    node_url: &'static str,
    explorer_url: Option<&'static str>,
}

const KNOWN_NETWORKS: &[KnownNetwork] = &[
    KnownNetwork {
        name: "main",
        aliases: &["mainnet"],
        network_id: "chrysalis-mainnet",
        node_url: "https://chrysalis-nodes.iota.org/",
        explorer_url: Some("https://explorer.iota.org/mainnet/"),
    },
    KnownNetwork {
        name: "dev",
        aliases: &["devnet"],
        network_id: "chrysalis-devnet",
        node_url: "https://api.lb-0.h.chrysalis-devnet.iota.cafe/",
        explorer_url: Some("https://explorer.iota.org/devnet/"),
    },
    // The one-click private tangle has id `private-tangle`, which does not
    // fit in a DID, so it is addressed as `tangle`.
    KnownNetwork {
        name: "tangle",
        aliases: &["private-tangle"],
        network_id: "private-tangle",
        node_url: DEFAULT_NODE_URL,
        explorer_url: None,
    },
];

fn lookup_known(name: &str) -> Option<&'static KnownNetwork> {
    KNOWN_NETWORKS
        .iter()
        .find(|n| n.name == name || n.aliases.contains(&name))
}

/// Validate the name that goes into a DID
pub fn validate_network_name(name: &str) -> DidResult<()> {
    if name.is_empty() {
        return Err(DidError::InvalidNetworkName(
            "network name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_NETWORK_NAME_LEN {
        return Err(DidError::InvalidNetworkName(format!(
            "'{}' exceeds {} characters",
            name, MAX_NETWORK_NAME_LEN
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(DidError::InvalidNetworkName(format!(
            "'{}' must be lowercase ASCII letters and digits",
            name
        )));
    }
    Ok(())
}

/// Ledger network a client talks to. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkProfile {
    name: String,
    network_id: String,
    node_url: Url,
    explorer_url: Option<Url>,
}

impl NetworkProfile {
    /// Resolve a name or alias leniently with default endpoints
    pub fn from_name(name: &str) -> DidResult<Self> {
        NetworkProfileBuilder::new().name(name).build()
    }

    pub fn builder() -> NetworkProfileBuilder {
        NetworkProfileBuilder::new()
    }

    /// Short name embedded in DIDs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier the node reports for this network
    pub fn network_id(&self) -> &str {
        &self.network_id
    }

    pub fn node_url(&self) -> &Url {
        &self.node_url
    }

    pub fn explorer_url(&self) -> Option<&Url> {
        self.explorer_url.as_ref()
    }

    /// Explorer link for a message, when the network has an explorer
    pub fn explorer_message_url(&self, message_id: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .and_then(|base| base.join(&format!("message/{}", message_id)).ok())
            .map(|url| url.to_string())
    }

    /// DIDs on the main network omit the network segment
    pub fn is_main(&self) -> bool {
        self.name == "main"
    }
}

impl fmt::Display for NetworkProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Builder for network profiles
#[derive(Debug, Default)]
pub struct NetworkProfileBuilder {
    name: Option<String>,
    default_name: Option<String>,
    node_url: Option<String>,
    network_id: Option<String>,
    strict: bool,
}

impl NetworkProfileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Network name or alias. Empty selects the default network.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Network used for an empty name (falls back to [`DEFAULT_NETWORK`])
    pub fn default_name(mut self, name: impl Into<String>) -> Self {
        self.default_name = Some(name.into());
        self
    }

    /// Override the node REST endpoint
    pub fn node_url(mut self, url: impl Into<String>) -> Self {
        self.node_url = Some(url.into());
        self
    }

    /// Network id for custom networks (defaults to the name)
    pub fn network_id(mut self, id: impl Into<String>) -> Self {
        self.network_id = Some(id.into());
        self
    }

    /// Reject names that are not known networks
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn build(self) -> DidResult<NetworkProfile> {
        let requested = self.name.unwrap_or_default().trim().to_ascii_lowercase();
        let requested = if requested.is_empty() {
            self.default_name
                .map(|n| n.trim().to_ascii_lowercase())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| DEFAULT_NETWORK.to_string())
        } else {
            requested
        };

        let node_override = self.node_url.map(|u| parse_node_url(&u)).transpose()?;

        if let Some(known) = lookup_known(&requested) {
            let node_url = match node_override {
                Some(url) => url,
                None => parse_node_url(known.node_url)?,
            };
            let explorer_url = known
                .explorer_url
                .map(|u| Url::parse(u).map_err(|e| DidError::Internal(e.to_string())))
                .transpose()?;

            return Ok(NetworkProfile {
                name: known.name.to_string(),
                network_id: known.network_id.to_string(),
                node_url,
                explorer_url,
            });
        }

        if self.strict {
            return Err(DidError::UnknownNetwork(requested));
        }

        validate_network_name(&requested)?;

        let node_url = node_override.ok_or_else(|| {
            DidError::Validation(format!(
                "custom network '{}' requires an explicit node URL",
                requested
            ))
        })?;

        Ok(NetworkProfile {
            network_id: self.network_id.unwrap_or_else(|| requested.clone()),
            name: requested,
            node_url,
            explorer_url: None,
        })
    }
}

fn parse_node_url(raw: &str) -> DidResult<Url> {
    let url = Url::parse(raw).map_err(|e| DidError::InvalidNodeUrl(format!("{}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(DidError::InvalidNodeUrl(format!(
            "unsupported scheme '{}' in {}",
            other, raw
        ))),
    }
}
