//! 🚀 ofx-cli: the front desk of ofx.
//!
//! 🎬 *[narrator voice]* "It all started with two CSV files and a deadline..."
//! 📦 This binary crate is the thin CLI wrapper: it parses args, loads config,
//! sets up logging, and then lets the library do the heavy lifting.
//! Like a concierge who points at the elevator. 🦆
//!
//! ```text
//! ofx ingest --config ofx.toml     # load hotels + offers into the index
//! ofx serve  --config ofx.toml     # answer offer searches over HTTP
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 🏨 Load travel offers into Elasticsearch and search them.
#[derive(Debug, Parser)]
#[command(name = "ofx", version, about)]
struct Cli {
    /// TOML config file. Optional: `OFX_*` environment variables work on their own.
    #[arg(short, long, global = true, default_value = "ofx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 🚚 Load the hotels and offers CSV files into the index.
    Ingest,
    /// 🌐 Serve the offer search API.
    Serve,
}

/// 🚀 main(): the "I pressed enter and held my breath" moment.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Parse args
/// 3. Load config: the file if it exists, the environment always
/// 4. Run the subcommand (send it 🙏)
/// 5. Handle errors (cry, but with a helpful hint)
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 `RUST_LOG` wins; otherwise info for everything
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // 🔒 A missing config file is fine; the environment may carry everything.
    let config_file_exists = cli
        .config
        .try_exists()
        .context(format!(
            "💀 Could not check whether the configuration file exists. If this is a relative path, \
             double-check the working directory, or use an absolute path. Was checking here: '{}'",
            cli.config.display()
        ))?;
    let config_file = config_file_exists.then_some(cli.config.as_path());
    if config_file.is_none() {
        info!(
            "📭 No configuration file at '{}'; using OFX_* environment variables and defaults",
            cli.config.display()
        );
    }

    let app_config = ofx::load_config(config_file)
        .context("💀 In ofx-cli, main, we couldn't load the configuration. Take a look at the file and the OFX_* variables")?;

    let result = match cli.command {
        Command::Ingest => ofx::ingest(app_config).await.map(|report| {
            // -- the table is for humans, so it goes to stdout, not the log
            println!("{report}");
        }),
        Command::Serve => ofx::serve(app_config).await,
    };

    // 💀 Error handling: print the chain in a way that's helpful at 3am
    if let Err(err) = result {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion, one layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
                || cause_str.contains("timed out")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }

        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: Elasticsearch doesn't seem to be reachable. Check `elasticsearch.url` \
                (or OFX_ELASTICSEARCH__URL) and that the cluster is actually running. \
                If you're using Docker, `docker ps` tells you what's up. ☕"
            );
        }

        std::process::exit(1);
    }

    Ok(())
}
