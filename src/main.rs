//! Gatekeeper - gateway trust and client registration tool

use anyhow::Context;
use clap::Parser;
use rustls::pki_types::{ServerName, UnixTime};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatekeeper::{
    assertion::{AssertionChain, AssertionContext, OtpAssertion},
    config::{Args, Commands, GatewayConfig},
    events::EventBus,
    gateway::GatewayClient,
    http::ReqwestExecutor,
    platform::{InMemoryKeyProvider, PlatformContext},
    session::SessionState,
    trust::{parse_pem_certificates, PinnedTrustVerifier, PublicKeyHash},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("gatekeeper={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match args.command {
        Commands::Pin { pem } => {
            let text = std::fs::read_to_string(&pem)
                .with_context(|| format!("reading {}", pem.display()))?;
            for cert in parse_pem_certificates(&text)? {
                println!("{}", PublicKeyHash::from_certificate(&cert)?);
            }
        }

        Commands::Verify { chain, server_name } => {
            let config = load_config(&args.config)?;
            let verifier = PinnedTrustVerifier::new(&config.trust_configuration()?)?;

            let text = std::fs::read_to_string(&chain)
                .with_context(|| format!("reading {}", chain.display()))?;
            let certs = parse_pem_certificates(&text)?;
            let name = ServerName::try_from(server_name.as_str())
                .with_context(|| format!("invalid server name {:?}", server_name))?;

            match verifier.check_server_trusted(&certs, &name, UnixTime::now()) {
                Ok(()) => println!("trusted"),
                Err(e) => {
                    error!(server = %server_name, error = %e, "Chain rejected");
                    println!("rejected: {}", e);
                    std::process::exit(2);
                }
            }
        }

        Commands::Register {
            client_id,
            device_id,
            nonce,
        } => {
            let config = load_config(&args.config)?;
            let verifier = Arc::new(PinnedTrustVerifier::new(&config.trust_configuration()?)?);

            let platform = PlatformContext::new(
                Arc::new(InMemoryKeyProvider::new()),
                Arc::new(EventBus::new()),
            )
            .with_identity_alias(config.identity_alias.clone());
            let identity = platform.device_identity()?;

            let executor = ReqwestExecutor::with_trust(verifier, identity, config.timeout())?;
            let context = AssertionContext::new(Arc::new(SessionState::new()), Arc::new(platform));
            let chain = AssertionChain::new(vec![Box::new(OtpAssertion::new())], context)?;
            let client = GatewayClient::new(chain, Arc::new(executor), config.endpoint()?);

            info!(gateway = %config.server.base_url, "Registering client");
            let credentials = client.register_client(&client_id, &nonce, &device_id).await?;
            println!("{}", serde_json::to_string_pretty(&credentials)?);
        }
    }

    Ok(())
}

fn load_config(path: &std::path::Path) -> anyhow::Result<GatewayConfig> {
    GatewayConfig::load(path).with_context(|| format!("loading gateway configuration {}", path.display()))
}
