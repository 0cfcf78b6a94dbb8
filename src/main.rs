/// Tangle Identity - create, publish and resolve a DID document
///
/// Usage: tangle-identity [network] [node-url]
///
/// Arguments override `IDENTITY_NETWORK` and `IDENTITY_NODE_URL`.

use tangle_identity::{ClientConfig, DidDocument, DidResult, KeyType, LedgerClient};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> DidResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tangle_identity=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    // Load configuration
    let mut config = ClientConfig::from_env()?;
    let mut args = std::env::args().skip(1);
    if let Some(network) = args.next() {
        config.network = network;
    }
    if let Some(node_url) = args.next() {
        config.node_url = Some(node_url);
    }

    let client = LedgerClient::new(config)?;
    let profile = client.profile().clone();

    let key_type = std::env::var("IDENTITY_KEY_TYPE")
        .ok()
        .map(|k| k.parse::<KeyType>())
        .transpose()?
        .unwrap_or(KeyType::Ed25519);

    let (doc, key) = DidDocument::create(key_type, &profile)?;
    let doc = doc.sign(&key)?;
    info!("Created {} with a {} key", doc.id(), key.key_type());

    let receipt = client.publish(&doc).await?;
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    if let Some(link) = profile.explorer_message_url(&receipt.message_id.to_hex()) {
        println!("Explorer: {}", link);
    }

    let resolved = client.resolve(doc.id()).await?;
    println!("{}", serde_json::to_string_pretty(&resolved)?);

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  Tangle Identity v{}
  DID documents on the ledger
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
