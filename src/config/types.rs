use std::time::Duration;

use serde::Deserialize;

use crate::common::error::{MergeError, Result};

pub const DEFAULT_BACKEND: &str = "http://127.0.0.1:3000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Which kind of artifact the producer service should build the node list from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    #[default]
    Subscription,
    Collection,
}

impl SourceKind {
    /// `1` or anything mentioning `col` selects a collection.
    pub fn from_flag(flag: &str) -> Self {
        let flag = flag.trim();
        if flag == "1" || flag.to_ascii_lowercase().contains("col") {
            SourceKind::Collection
        } else {
            SourceKind::Subscription
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Subscription => "subscription",
            SourceKind::Collection => "collection",
        }
    }
}

/// Textual `false` disables clearing; every other value enables it.
pub fn parse_clear_existing(value: &str) -> bool {
    value.trim() != "false"
}

/// Where node records come from.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSource {
    Remote {
        base_url: String,
        kind: SourceKind,
        name: Option<String>,
        url: Option<String>,
        include_unsupported: bool,
    },
    File {
        path: String,
    },
}

/// Options file layout. Every key is optional; CLI flags win over it.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OptionsFile {
    #[serde(rename = "type")]
    pub source_type: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
    pub backend: Option<String>,
    pub nodes_file: Option<String>,
    pub include_unsupported_proxy: Option<bool>,
    /// Kept textual so `"false"` and `false` behave the same.
    pub clear_existing: Option<serde_yml::Value>,
    pub outbound: Option<String>,
    pub timeout: Option<u64>,
}

/// Values given on the command line or through the environment.
#[derive(Debug, Default, Clone)]
pub struct OptionOverrides {
    pub source_type: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
    pub backend: Option<String>,
    pub nodes_file: Option<String>,
    pub include_unsupported_proxy: bool,
    pub clear_existing: Option<String>,
    pub outbound: Option<String>,
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub source: NodeSource,
    pub clear_existing: bool,
    pub rules: String,
    pub timeout: Duration,
}

impl MergeOptions {
    pub fn resolve(file: OptionsFile, cli: OptionOverrides) -> Result<Self> {
        let nodes_file = cli.nodes_file.or(file.nodes_file);
        let source = match nodes_file {
            Some(path) => NodeSource::File { path },
            None => NodeSource::Remote {
                base_url: cli
                    .backend
                    .or(file.backend)
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                kind: cli
                    .source_type
                    .or(file.source_type)
                    .map(|t| SourceKind::from_flag(&t))
                    .unwrap_or_default(),
                name: cli.name.or(file.name).filter(|n| !n.trim().is_empty()),
                url: cli.url.or(file.url).filter(|u| !u.trim().is_empty()),
                include_unsupported: cli.include_unsupported_proxy
                    || file.include_unsupported_proxy.unwrap_or(false),
            },
        };

        let clear_existing = match cli.clear_existing {
            Some(v) => parse_clear_existing(&v),
            None => match file.clear_existing {
                Some(serde_yml::Value::Bool(b)) => b,
                Some(serde_yml::Value::String(s)) => parse_clear_existing(&s),
                _ => true,
            },
        };

        let options = Self {
            source,
            clear_existing,
            rules: cli.outbound.or(file.outbound).unwrap_or_default(),
            timeout: Duration::from_secs(
                cli.timeout.or(file.timeout).unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rules.trim().is_empty() {
            return Err(MergeError::Config(
                "outbound rules are required (e.g. 'ℹ️HongKong🏷ℹ️hk|hongkong')".into(),
            ));
        }
        match &self.source {
            NodeSource::Remote { name, url, .. } => {
                if name.is_none() && url.is_none() {
                    return Err(MergeError::Config(
                        "either a subscription name or a url is required".into(),
                    ));
                }
            }
            NodeSource::File { path } => {
                if path.trim().is_empty() {
                    return Err(MergeError::Config("nodes file path is empty".into()));
                }
            }
        }
        if self.timeout.is_zero() {
            return Err(MergeError::Config("timeout must be greater than 0".into()));
        }
        Ok(())
    }
}
