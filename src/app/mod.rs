pub mod provider;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;

use crate::common::error::Result;
use crate::config::{self, MergeOptions};
use crate::merge::{MergeReport, Merger};

use provider::NodeProvider;

/// One merge run: rules are compiled up front, nodes are fetched once.
pub struct App {
    merger: Merger,
    provider: Box<dyn NodeProvider>,
}

impl App {
    pub fn new(options: &MergeOptions) -> Result<Self> {
        let merger = Merger::from_rule_string(&options.rules, options.clear_existing)?;
        let provider = provider::build_provider(&options.source, options.timeout)?;
        Ok(Self::with_provider(merger, provider))
    }

    pub fn with_provider(merger: Merger, provider: Box<dyn NodeProvider>) -> Self {
        Self { merger, provider }
    }

    /// Rewrite `content` and return the rendered document.
    ///
    /// The document is parsed before any node is fetched, so a malformed
    /// input never costs a network round-trip.
    pub async fn transform(&self, content: &str) -> Result<(String, MergeReport)> {
        let mut doc = config::parse_document(content)?;
        info!(
            rules = self.merger.rules().len(),
            clear_existing = self.merger.clear_existing(),
            source = %self.provider.describe(),
            "fetching nodes"
        );
        let nodes = self.provider.fetch_nodes().await?;
        let report = self.merger.apply(&mut doc, &nodes)?;
        info!(
            group_matches = report.group_matches,
            tags_inserted = report.tags_inserted,
            placeholder_groups = report.placeholder_groups,
            nodes_appended = report.nodes_appended,
            nodes_present = report.nodes_present,
            nodes_untagged = report.nodes_untagged,
            "outbounds merged"
        );
        Ok((config::render_document(&doc)?, report))
    }

    /// Read from `input` (stdin when `None`), write to `output` (stdout when `None`).
    pub async fn run(&self, input: Option<&str>, output: Option<&str>) -> Result<MergeReport> {
        let content = match input {
            Some(path) => tokio::fs::read_to_string(path).await?,
            None => {
                let mut buf = String::new();
                tokio::io::stdin().read_to_string(&mut buf).await?;
                buf
            }
        };

        let (rendered, report) = self.transform(&content).await?;

        match output {
            Some(path) => {
                tokio::fs::write(path, rendered.as_bytes()).await?;
                info!(path, "document written");
            }
            None => {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(rendered.as_bytes()).await?;
                stdout.flush().await?;
            }
        }
        Ok(report)
    }
}
