use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, info};

use crate::common::error::{MergeError, Result};
use crate::config::subscription::{self, NodeRecord};
use crate::config::types::{NodeSource, SourceKind};

/// Something that can hand over the node records for one run.
#[async_trait]
pub trait NodeProvider: Send + Sync {
    async fn fetch_nodes(&self) -> Result<Vec<NodeRecord>>;

    /// Human-readable origin, for logs.
    fn describe(&self) -> String;
}

/// Build the provider matching `source`.
pub fn build_provider(source: &NodeSource, timeout: Duration) -> Result<Box<dyn NodeProvider>> {
    match source {
        NodeSource::File { path } => Ok(Box::new(FileProvider::new(path.clone()))),
        NodeSource::Remote {
            base_url,
            kind,
            name,
            url,
            include_unsupported,
        } => {
            let target = match (name.as_deref(), url.as_deref()) {
                (None, Some(direct)) => Url::parse(direct).map_err(|e| {
                    MergeError::Config(format!("invalid source url '{}': {}", direct, e))
                })?,
                (Some(name), url) => {
                    artifact_url(base_url, *kind, name, url, *include_unsupported)?
                }
                (None, None) => {
                    return Err(MergeError::Config(
                        "either a subscription name or a url is required".into(),
                    ))
                }
            };
            Ok(Box::new(HttpProvider::new(target, timeout)?))
        }
    }
}

/// Download URL of a sing-box artifact on the producer service.
///
/// `{base}/download/{name}` for subscriptions and
/// `{base}/download/collection/{name}` for collections.
pub fn artifact_url(
    base_url: &str,
    kind: SourceKind,
    name: &str,
    source_url: Option<&str>,
    include_unsupported: bool,
) -> Result<Url> {
    let mut url = Url::parse(base_url)
        .map_err(|e| MergeError::Config(format!("invalid backend url '{}': {}", base_url, e)))?;
    {
        let mut segments = url.path_segments_mut().map_err(|_| {
            MergeError::Config(format!("backend url '{}' cannot be a base", base_url))
        })?;
        segments.pop_if_empty().push("download");
        if kind == SourceKind::Collection {
            segments.push("collection");
        }
        segments.push(name);
    }
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("target", "sing-box");
        query.append_pair("produceType", "internal");
        if include_unsupported {
            query.append_pair("includeUnsupportedProxy", "true");
        }
        if let Some(source_url) = source_url {
            query.append_pair("url", source_url);
        }
    }
    debug!(kind = kind.as_str(), name, "producer artifact selected");
    Ok(url)
}

/// Fetches a node list over HTTP.
pub struct HttpProvider {
    url: Url,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("singbox-merge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { url, client })
    }

    fn fetch_error(&self, e: reqwest::Error) -> MergeError {
        let e = e.without_url();
        let reason = if e.is_timeout() {
            format!("request timed out: {}", e)
        } else {
            e.to_string()
        };
        MergeError::Fetch(format!("{}: {}", self.describe(), reason))
    }
}

#[async_trait]
impl NodeProvider for HttpProvider {
    async fn fetch_nodes(&self) -> Result<Vec<NodeRecord>> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| self.fetch_error(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MergeError::Fetch(format!(
                "{} answered {}",
                self.describe(),
                status
            )));
        }
        let content = response.text().await.map_err(|e| self.fetch_error(e))?;
        debug!(bytes = content.len(), "node list downloaded");
        let nodes = subscription::dedup_nodes(subscription::parse_node_list(&content)?);
        info!(source = %self.describe(), nodes = nodes.len(), "nodes fetched");
        Ok(nodes)
    }

    fn describe(&self) -> String {
        // query may carry a subscription url with credentials
        let mut shown = self.url.clone();
        shown.set_query(None);
        shown.to_string()
    }
}

/// Reads a node list from disk.
pub struct FileProvider {
    path: String,
}

impl FileProvider {
    pub fn new(path: String) -> Self {
        Self { path }
    }
}

#[async_trait]
impl NodeProvider for FileProvider {
    async fn fetch_nodes(&self) -> Result<Vec<NodeRecord>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let nodes = subscription::dedup_nodes(subscription::parse_node_list(&content)?);
        info!(source = %self.path, nodes = nodes.len(), "nodes loaded");
        Ok(nodes)
    }

    fn describe(&self) -> String {
        self.path.clone()
    }
}
