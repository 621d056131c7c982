//! Checkout Client
//!
//! Drives a purchase from the command line.
//!
//! ```bash
//! checkout-client stage photo1.jpg photo2.png --package standard --email buyer@example.com
//! # pay in the browser, then paste the address you land on
//! checkout-client resume "https://shop.example.com/success?session_id=cs_test_..."
//! checkout-client status
//! checkout-client clear
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use checkout_core::{
    Checkout, CheckoutConfig, FileKeyValueStore, StagingStore, UploadProgress,
};
use checkout_runtime::{
    CheckoutApi, CheckoutRequest, HttpOrderGateway, HttpUploadSink, ServerConfig,
    read_staging_file, session_id_from_return_url,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "checkout-client")]
#[command(about = "Stage files, pay, and upload them to the resulting order")]
struct Cli {
    /// Checkout server base URL
    #[arg(long, env = "CHECKOUT_SERVER_URL", default_value = "http://localhost:3000")]
    server: String,

    /// Directory holding staged files between runs
    #[arg(long, env = "CHECKOUT_STAGING_DIR", default_value = ".checkout-staging")]
    staging_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stage files and start a payment session
    Stage {
        /// Files to upload after payment
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Package to purchase
        #[arg(long, default_value = "standard")]
        package: String,

        /// Customer email
        #[arg(long)]
        email: String,

        /// Page the payment provider returns to after payment
        #[arg(long)]
        success_url: Option<String>,

        /// Page the payment provider returns to on cancel
        #[arg(long)]
        cancel_url: Option<String>,
    },

    /// Find the order for a completed payment and upload the staged files
    Resume {
        /// Address landed on after payment
        return_url: Option<String>,

        /// Payment session id, instead of a return URL
        #[arg(long, conflicts_with = "return_url")]
        session_id: Option<String>,
    },

    /// Show what is currently staged
    Status,

    /// Discard staged files
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "checkout_core=info,checkout_runtime=info,warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = CheckoutConfig::from_env();
    config.validate()?;

    let kv = FileKeyValueStore::open(&cli.staging_dir)
        .with_context(|| format!("opening staging dir {}", cli.staging_dir.display()))?;
    let staging = Arc::new(StagingStore::from_config(Arc::new(kv), &config));
    let server = ServerConfig {
        base_url: cli.server.clone(),
        ..ServerConfig::from_env()
    };

    match cli.command {
        Command::Stage {
            files,
            package,
            email,
            success_url,
            cancel_url,
        } => {
            let mut selected = Vec::with_capacity(files.len());
            for path in &files {
                let file = read_staging_file(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                selected.push(file);
            }

            let ids = staging.stage_all(selected).await?;
            staging.ensure_complete(&ids)?;
            println!("Staged {} file(s)", ids.len());

            let api = CheckoutApi::new(server.clone())?;
            let request = CheckoutRequest {
                package,
                customer_email: email,
                success_url: success_url.unwrap_or_else(|| format!("{}/success", cli.server)),
                cancel_url: cancel_url.unwrap_or_else(|| format!("{}/packages", cli.server)),
                file_count: ids.len(),
            };
            let link = api.create_checkout(&request).await?;

            println!("Session: {}", link.session_id);
            println!("Pay here: {}", link.checkout_url);
        }

        Command::Resume {
            return_url,
            session_id,
        } => {
            let session_id = match (session_id, return_url) {
                (Some(id), _) => id,
                (None, Some(url)) => session_id_from_return_url(&url)?,
                (None, None) => bail!("pass a return URL or --session-id"),
            };

            let gateway = Arc::new(HttpOrderGateway::new(server.clone())?);
            let sink = Arc::new(HttpUploadSink::new(server)?);
            let checkout = Checkout::new(config, staging, gateway, sink).with_progress(Arc::new(
                |p: UploadProgress| {
                    eprintln!(
                        "Uploading {}/{} files ({:.0}%)",
                        p.files_done,
                        p.files_total,
                        p.fraction() * 100.0
                    );
                },
            ));

            let result = checkout
                .resume(&session_id, |p| {
                    eprintln!(
                        "Waiting for order... attempt {} missed, {} left, retrying in {:?}",
                        p.attempt, p.remaining, p.delay
                    );
                })
                .await;

            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                if result.retryable {
                    eprintln!("Staged files are kept; run `resume` again to retry the upload");
                }
                std::process::exit(1);
            }
        }

        Command::Status => match staging.manifest()? {
            Some(manifest) => {
                let batch = staging.read_all()?;
                println!("Staged at {}", manifest.staged_at);
                for file in &batch.files {
                    println!("  {}  {}", file.id, file.content_type);
                }
                for id in &batch.missing {
                    println!("  {id}  MISSING");
                }
            }
            None => println!("Nothing staged"),
        },

        Command::Clear => {
            staging.clear()?;
            let swept = staging.sweep_orphans()?;
            println!("Cleared staging ({swept} orphaned payload(s) removed)");
        }
    }

    Ok(())
}
