#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::style)]

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sublink::cli::{Args, Command};
use sublink::codec::CodecRegistry;
use sublink::config::AppConfig;
use sublink::fingerprint::Fingerprinter;
use sublink::ingest::Ingestor;
use sublink::store::{HttpFetcher, JsonFileStore};
use sublink::subscription::SubscriptionSource;
use tracing::Level;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let is_verbose = args.verbose;
    tracing_subscriber::fmt()
        .with_max_level(if is_verbose {
            Level::TRACE
        } else {
            Level::INFO
        })
        .init();

    if let Err(e) = run(args).await {
        tracing::error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = AppConfig::load(&args.config)?;

    let store = Arc::new(JsonFileStore::new(
        config.records_path.clone(),
        config.sources_path.clone(),
    ));
    let fetcher = Arc::new(HttpFetcher::new(config.proxy_url.as_deref())?);
    let ingestor = Ingestor::new(
        store.clone(),
        store,
        fetcher,
        CodecRegistry::with_builtin_codecs(),
        Fingerprinter::new(config.hash_algorithm),
    );

    match args.command {
        Command::Import { input } => {
            let content = read_input(input.as_deref())?;
            let report = ingestor.import_text(&content).await?;
            println!("{report}");
        }
        Command::Export { legacy, bundle } => {
            println!("{}", ingestor.export_records(legacy, bundle).await?);
        }
        Command::Refresh { auto_only } => {
            let summary = ingestor.refresh_all(auto_only).await?;
            println!(
                "{} sources refreshed, {} failed: {}",
                summary.sources_ok, summary.sources_failed, summary.report
            );
        }
        Command::List => {
            for record in ingestor.list_records().await? {
                println!(
                    "{}  {:5}  {:24}  {}",
                    if record.on != 0 { "*" } else { " " },
                    record.protocol(),
                    record.host,
                    record.ps
                );
            }
        }
        Command::ExportSources => {
            println!("{}", ingestor.export_sources().await?);
        }
        Command::ImportSources { input } => {
            let content = read_input(input.as_deref())?;
            let report = ingestor.import_sources_text(&content).await?;
            println!(
                "{} imported, {} existing, {} failed",
                report.ok_count, report.existing_count, report.error_count
            );
        }
        Command::AddSource {
            name,
            url,
            note,
            html,
            proxy,
            auto,
        } => {
            let source = SubscriptionSource {
                name,
                url,
                note: note.unwrap_or_default(),
                is_html: html,
                is_proxy: proxy,
                auto_update: auto,
                ..Default::default()
            };
            ingestor.put_source(source, None).await?;
            tracing::info!("Source saved");
        }
    }

    Ok(())
}

fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read stdin")?;
            Ok(content)
        }
    }
}
