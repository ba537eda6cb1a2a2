mod config;
mod error;
mod openapi;
mod probe;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use config::{CliArgs, ProberConfig};
use openapi::NormalizedApi;
use probe::Prober;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the report.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conformance_prober=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    info!("Starting conformance-prober v{}", env!("CARGO_PKG_VERSION"));
    info!("API document: {:?}", args.spec_file);

    let api = NormalizedApi::from_file(&args.spec_file)
        .with_context(|| format!("Failed to load API document {:?}", args.spec_file))?;
    info!("Loaded {} ({} operations)", api.label(), api.operations.len());

    let Some(config) = ProberConfig::from_args(&args, api.base_url.as_deref()) else {
        anyhow::bail!("No base URL: pass --base-url or declare a server in the API document");
    };
    info!("Target: {}", config.base_url);
    info!("Sandbox: {}", config.sandbox);
    info!("Malformations: {}", config.include_malformations);

    let prober = Prober::new(config).context("Failed to initialize prober")?;
    let report = prober
        .probe_all(&api, |done, total| info!("Progress: {}/{}", done, total))
        .await;

    let json = serde_json::to_string_pretty(&report)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write report to {:?}", path))?;
            info!("Report written to {:?}", path);
        }
        None => println!("{}", json),
    }

    Ok(())
}
