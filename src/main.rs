use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use singbox_merge::app::App;
use singbox_merge::common::MergeError;
use singbox_merge::config::{self, MergeOptions, OptionOverrides, OptionsFile};

/// Insert subscription nodes into sing-box outbound groups.
#[derive(Debug, Parser)]
#[command(name = "singbox-merge", version, about)]
struct Cli {
    /// sing-box configuration to rewrite (stdin when omitted)
    #[arg(short, long)]
    input: Option<String>,

    /// Where to write the result (stdout when omitted)
    #[arg(short, long)]
    output: Option<String>,

    /// YAML file with default options
    #[arg(long, env = "SB_MERGE_OPTIONS")]
    options: Option<String>,

    /// `1` or `collection` for a collection, anything else for a subscription
    #[arg(long = "type", env = "SB_MERGE_TYPE")]
    source_type: Option<String>,

    /// Subscription or collection name
    #[arg(long, env = "SB_MERGE_NAME")]
    name: Option<String>,

    /// Subscription url, passed to the backend or fetched directly
    #[arg(long, env = "SB_MERGE_URL")]
    url: Option<String>,

    /// Base url of the subscription backend
    #[arg(long, env = "SB_MERGE_BACKEND")]
    backend: Option<String>,

    /// Read sing-box node outbounds from a local file instead of the backend
    #[arg(long, env = "SB_MERGE_NODES_FILE")]
    nodes_file: Option<String>,

    #[arg(long, env = "SB_MERGE_INCLUDE_UNSUPPORTED")]
    include_unsupported_proxy: bool,

    /// `false` keeps the groups' existing members
    #[arg(long, env = "SB_MERGE_CLEAR_EXISTING")]
    clear_existing: Option<String>,

    /// Rules: `group🏷node🕳group2🏷node2`, prefix a pattern with ℹ️ to ignore case
    #[arg(long, env = "SB_MERGE_OUTBOUND")]
    outbound: Option<String>,

    /// HTTP timeout in seconds
    #[arg(long, env = "SB_MERGE_TIMEOUT")]
    timeout: Option<u64>,
}

impl Cli {
    fn overrides(&self) -> OptionOverrides {
        OptionOverrides {
            source_type: self.source_type.clone(),
            name: self.name.clone(),
            url: self.url.clone(),
            backend: self.backend.clone(),
            nodes_file: self.nodes_file.clone(),
            include_unsupported_proxy: self.include_unsupported_proxy,
            clear_existing: self.clear_existing.clone(),
            outbound: self.outbound.clone(),
            timeout: self.timeout,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        let kind = MergeError::classify(&err);
        error!(kind = kind.as_str(), "{:#}", err);
        std::process::exit(kind.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let file = match cli.options.as_deref() {
        Some(path) => config::load_options(path)
            .with_context(|| format!("failed to load options from {}", path))?,
        None => OptionsFile::default(),
    };
    let options = MergeOptions::resolve(file, cli.overrides())?;

    let app = App::new(&options)?;
    let report = app.run(cli.input.as_deref(), cli.output.as_deref()).await?;
    info!(nodes_appended = report.nodes_appended, "done");

    Ok(())
}
