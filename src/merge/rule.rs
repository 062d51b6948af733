use regex::{Regex, RegexBuilder};

use crate::common::error::{MergeError, Result};

/// Separates rules inside a rule string.
pub const SEGMENT_MARKER: &str = "🕳";
/// Separates the group pattern from the node pattern inside one rule.
pub const FIELD_MARKER: &str = "🏷";
/// Anywhere in a pattern, makes that pattern case-insensitive.
pub const CASE_INSENSITIVE_MARKER: &str = "ℹ️";
/// Node pattern used when a rule only names groups.
pub const MATCH_ALL: &str = ".*";

/// A compiled, unanchored pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    case_insensitive: bool,
    regex: Regex,
}

impl Pattern {
    pub fn compile(raw: &str) -> Result<Self> {
        let case_insensitive = raw.contains(CASE_INSENSITIVE_MARKER);
        let source = raw.replace(CASE_INSENSITIVE_MARKER, "");
        let regex = RegexBuilder::new(&source)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| MergeError::Pattern {
                pattern: raw.to_string(),
                source: e,
            })?;
        Ok(Self {
            source,
            case_insensitive,
            regex,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Pattern text with the case marker removed.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }
}

/// Which groups receive which nodes.
#[derive(Debug, Clone)]
pub struct Rule {
    pub outbound: Pattern,
    pub tag: Pattern,
}

impl Rule {
    pub fn parse(segment: &str) -> Result<Self> {
        let mut fields = segment.split(FIELD_MARKER);
        let outbound = fields.next().unwrap_or_default();
        let tag = fields.next().unwrap_or(MATCH_ALL);
        Ok(Self {
            outbound: Pattern::compile(outbound)?,
            tag: Pattern::compile(tag)?,
        })
    }

    pub fn matches_group(&self, group_tag: &str) -> bool {
        self.outbound.is_match(group_tag)
    }

    pub fn matches_node(&self, node_tag: &str) -> bool {
        self.tag.is_match(node_tag)
    }
}

/// Parse a rule string into rules, in source order.
///
/// `ℹ️🇭🇰 HongKong🏷ℹ️hk|hongkong🕳🇺🇸 US🏷ℹ️us` yields two rules. Empty
/// segments are skipped; a string with no rules at all is an error.
pub fn parse_rules(input: &str) -> Result<Vec<Rule>> {
    if input.trim().is_empty() {
        return Err(MergeError::Config("outbound rule string is empty".into()));
    }

    let rules = input
        .split(SEGMENT_MARKER)
        .filter(|segment| !segment.trim().is_empty())
        .map(Rule::parse)
        .collect::<Result<Vec<_>>>()?;

    if rules.is_empty() {
        return Err(MergeError::Config(format!(
            "outbound rule string contains no rules: {:?}",
            input
        )));
    }
    Ok(rules)
}
