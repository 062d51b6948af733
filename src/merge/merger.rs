use std::collections::HashSet;

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::common::error::{MergeError, Result};
use crate::config::subscription::NodeRecord;
use crate::merge::rule::{parse_rules, Rule};

/// Tag of the pass-through outbound that keeps an otherwise empty group valid.
pub const PLACEHOLDER_TAG: &str = "COMPATIBLE";

pub fn placeholder_outbound() -> Value {
    json!({ "tag": PLACEHOLDER_TAG, "type": "direct" })
}

/// What a merge pass did to the document.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// (group, rule) pairs that matched.
    pub group_matches: usize,
    /// Node tags newly inserted into groups.
    pub tags_inserted: usize,
    /// Groups that received the placeholder.
    pub placeholder_groups: usize,
    /// Whether the placeholder outbound was added to the top-level list.
    pub placeholder_added: bool,
    pub nodes_appended: usize,
    /// Nodes whose tag was already present in the top-level list.
    pub nodes_present: usize,
    /// Nodes without a tag.
    pub nodes_untagged: usize,
}

/// Compiled rules plus the clearing policy, applied to one document at a time.
#[derive(Debug, Clone)]
pub struct Merger {
    rules: Vec<Rule>,
    clear_existing: bool,
}

impl Merger {
    pub fn new(rules: Vec<Rule>, clear_existing: bool) -> Self {
        Self {
            rules,
            clear_existing,
        }
    }

    pub fn from_rule_string(rules: &str, clear_existing: bool) -> Result<Self> {
        Ok(Self::new(parse_rules(rules)?, clear_existing))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn clear_existing(&self) -> bool {
        self.clear_existing
    }

    /// Merge `nodes` into the groups of `doc`, fill groups left empty with the
    /// placeholder, then append the node records themselves.
    pub fn apply(&self, doc: &mut Value, nodes: &[NodeRecord]) -> Result<MergeReport> {
        let outbounds = top_level_outbounds(doc)?;
        let mut report = MergeReport::default();

        self.merge_groups(outbounds, nodes, &mut report);
        self.fill_empty_groups(outbounds, &mut report);
        append_nodes(outbounds, nodes, &mut report);

        Ok(report)
    }

    fn merge_groups(
        &self,
        outbounds: &mut [Value],
        nodes: &[NodeRecord],
        report: &mut MergeReport,
    ) {
        let selected: Vec<Vec<&str>> = self
            .rules
            .iter()
            .map(|rule| {
                nodes
                    .iter()
                    .filter_map(NodeRecord::tag)
                    .filter(|tag| rule.matches_node(tag))
                    .collect()
            })
            .collect();

        for group in outbounds.iter_mut() {
            let Some((tag, obj)) = as_group(group) else {
                continue;
            };
            for (rule, tags) in self.rules.iter().zip(&selected) {
                if !rule.matches_group(&tag) {
                    continue;
                }
                let Some(list) = group_members(obj) else {
                    continue;
                };
                report.group_matches += 1;
                if self.clear_existing {
                    list.clear();
                }
                let inserted = merge_unique(list, tags);
                report.tags_inserted += inserted;
                debug!(
                    group = tag.as_str(),
                    pattern = rule.tag.as_str(),
                    matched = tags.len(),
                    inserted,
                    "merged nodes into group"
                );
            }
        }
    }

    fn fill_empty_groups(&self, outbounds: &mut Vec<Value>, report: &mut MergeReport) {
        for group in outbounds.iter_mut() {
            let Some((tag, obj)) = as_group(group) else {
                continue;
            };
            if !self.rules.iter().any(|r| r.matches_group(&tag)) {
                continue;
            }
            let Some(list) = group_members(obj) else {
                continue;
            };
            if list.is_empty() {
                list.push(Value::String(PLACEHOLDER_TAG.to_string()));
                report.placeholder_groups += 1;
                warn!(group = tag.as_str(), "no nodes matched, using {}", PLACEHOLDER_TAG);
            }
        }

        if report.placeholder_groups > 0 && !contains_tag(outbounds, PLACEHOLDER_TAG) {
            outbounds.push(placeholder_outbound());
            report.placeholder_added = true;
        }
    }
}

/// The top-level `outbounds` array, created or reset when it is not an array.
fn top_level_outbounds(doc: &mut Value) -> Result<&mut Vec<Value>> {
    let obj = doc
        .as_object_mut()
        .ok_or_else(|| MergeError::Document("configuration root must be an object".into()))?;
    let slot = obj
        .entry("outbounds")
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        warn!("top-level 'outbounds' is not an array, replacing it with an empty one");
        *slot = Value::Array(Vec::new());
    }
    slot.as_array_mut()
        .ok_or_else(|| MergeError::Document("'outbounds' must be an array".into()))
}

/// Objects with a string tag are groups; everything else is left alone.
fn as_group(value: &mut Value) -> Option<(String, &mut Map<String, Value>)> {
    let obj = value.as_object_mut()?;
    let tag = obj.get("tag")?.as_str()?.to_string();
    Some((tag, obj))
}

/// The group's member list, normalised to an array.
fn group_members(obj: &mut Map<String, Value>) -> Option<&mut Vec<Value>> {
    let slot = obj
        .entry("outbounds")
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    slot.as_array_mut()
}

fn member_key(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        // keeps non-string members from colliding with tags
        other => format!("\u{0}{}", other),
    }
}

/// Set-style merge in first-seen order. Returns how many tags were added.
fn merge_unique(list: &mut Vec<Value>, tags: &[&str]) -> usize {
    let mut seen = HashSet::with_capacity(list.len() + tags.len());
    list.retain(|v| seen.insert(member_key(v)));
    let before = list.len();
    for tag in tags {
        if seen.insert((*tag).to_string()) {
            list.push(Value::String((*tag).to_string()));
        }
    }
    list.len() - before
}

fn contains_tag(outbounds: &[Value], tag: &str) -> bool {
    outbounds
        .iter()
        .any(|o| o.get("tag").and_then(Value::as_str) == Some(tag))
}

fn append_nodes(outbounds: &mut Vec<Value>, nodes: &[NodeRecord], report: &mut MergeReport) {
    let mut present: HashSet<String> = outbounds
        .iter()
        .filter_map(|o| o.get("tag").and_then(Value::as_str))
        .map(str::to_string)
        .collect();

    for node in nodes {
        let Some(tag) = node.tag() else {
            report.nodes_untagged += 1;
            debug!("skipping node record without tag");
            continue;
        };
        if present.insert(tag.to_string()) {
            outbounds.push(node.to_value());
            report.nodes_appended += 1;
        } else {
            report.nodes_present += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(tags: &[&str]) -> Vec<NodeRecord> {
        tags.iter()
            .map(|t| NodeRecord::try_from(json!({ "tag": t, "type": "shadowsocks" })).unwrap())
            .collect()
    }

    fn group<'a>(doc: &'a Value, tag: &str) -> &'a Value {
        doc["outbounds"]
            .as_array()
            .unwrap()
            .iter()
            .find(|o| o["tag"] == tag)
            .unwrap()
    }

    fn count_tag(doc: &Value, tag: &str) -> usize {
        doc["outbounds"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|o| o["tag"] == tag)
            .count()
    }

    #[test]
    fn keep_existing_merges_as_set() {
        let mut doc = json!({ "outbounds": [
            { "tag": "Proxy", "type": "selector", "outbounds": ["A", "B"] }
        ]});
        let merger = Merger::from_rule_string("Proxy🏷^(B|C)$", false).unwrap();
        let report = merger.apply(&mut doc, &nodes(&["B", "C", "D"])).unwrap();
        assert_eq!(group(&doc, "Proxy")["outbounds"], json!(["A", "B", "C"]));
        assert_eq!(report.tags_inserted, 1);
    }

    #[test]
    fn clear_existing_replaces_members() {
        let mut doc = json!({ "outbounds": [
            { "tag": "Proxy", "type": "selector", "outbounds": ["A", "B"] }
        ]});
        let merger = Merger::from_rule_string("Proxy🏷^(B|C)$", true).unwrap();
        merger.apply(&mut doc, &nodes(&["B", "C"])).unwrap();
        assert_eq!(group(&doc, "Proxy")["outbounds"], json!(["B", "C"]));
    }

    #[test]
    fn existing_duplicates_collapse() {
        let mut doc = json!({ "outbounds": [
            { "tag": "Proxy", "outbounds": ["A", "A", "B"] }
        ]});
        let merger = Merger::from_rule_string("Proxy🏷X", false).unwrap();
        merger.apply(&mut doc, &nodes(&["X"])).unwrap();
        assert_eq!(group(&doc, "Proxy")["outbounds"], json!(["A", "B", "X"]));
    }

    #[test]
    fn non_array_members_normalised() {
        let mut doc = json!({ "outbounds": [
            { "tag": "Proxy", "outbounds": "oops" },
            { "tag": "Auto" }
        ]});
        let merger = Merger::from_rule_string("Proxy|Auto", false).unwrap();
        merger.apply(&mut doc, &nodes(&["n1"])).unwrap();
        assert_eq!(group(&doc, "Proxy")["outbounds"], json!(["n1"]));
        assert_eq!(group(&doc, "Auto")["outbounds"], json!(["n1"]));
    }

    #[test]
    fn later_rule_clears_earlier_insertions() {
        let mut doc = json!({ "outbounds": [{ "tag": "Proxy", "outbounds": [] }]});
        let merger = Merger::from_rule_string("Proxy🏷^hk🕳Proxy🏷^us", true).unwrap();
        merger.apply(&mut doc, &nodes(&["hk1", "us1"])).unwrap();
        assert_eq!(group(&doc, "Proxy")["outbounds"], json!(["us1"]));
    }

    #[test]
    fn later_rule_accumulates_without_clear() {
        let mut doc = json!({ "outbounds": [{ "tag": "Proxy", "outbounds": [] }]});
        let merger = Merger::from_rule_string("Proxy🏷^hk🕳Proxy🏷^us", false).unwrap();
        merger.apply(&mut doc, &nodes(&["hk1", "us1"])).unwrap();
        assert_eq!(group(&doc, "Proxy")["outbounds"], json!(["hk1", "us1"]));
    }

    #[test]
    fn unmatched_groups_untouched() {
        let mut doc = json!({ "outbounds": [
            { "tag": "direct", "type": "direct" },
            { "tag": "Other", "outbounds": ["keep"] }
        ]});
        let merger = Merger::from_rule_string("Proxy", true).unwrap();
        merger.apply(&mut doc, &nodes(&["n1"])).unwrap();
        assert_eq!(group(&doc, "Other")["outbounds"], json!(["keep"]));
        assert!(group(&doc, "direct").get("outbounds").is_none());
    }

    #[test]
    fn placeholder_added_once_for_many_groups() {
        let mut doc = json!({ "outbounds": [
            { "tag": "G1" }, { "tag": "G2" }, { "tag": "G3" }, { "tag": "G4" }, { "tag": "G5" }
        ]});
        let merger = Merger::from_rule_string("^G🏷nothing-matches", true).unwrap();
        let report = merger.apply(&mut doc, &nodes(&["n1"])).unwrap();
        for g in ["G1", "G2", "G3", "G4", "G5"] {
            assert_eq!(group(&doc, g)["outbounds"], json!([PLACEHOLDER_TAG]));
        }
        assert_eq!(count_tag(&doc, PLACEHOLDER_TAG), 1);
        assert_eq!(report.placeholder_groups, 5);
        assert!(report.placeholder_added);
        assert_eq!(group(&doc, PLACEHOLDER_TAG)["type"], "direct");
    }

    #[test]
    fn placeholder_not_duplicated_when_configured() {
        let mut doc = json!({ "outbounds": [
            { "tag": "G1" },
            { "tag": "COMPATIBLE", "type": "direct" }
        ]});
        let merger = Merger::from_rule_string("G1🏷none", true).unwrap();
        let report = merger.apply(&mut doc, &[]).unwrap();
        assert_eq!(count_tag(&doc, PLACEHOLDER_TAG), 1);
        assert!(!report.placeholder_added);
    }

    #[test]
    fn no_placeholder_when_group_filled() {
        let mut doc = json!({ "outbounds": [{ "tag": "G1" }]});
        let merger = Merger::from_rule_string("G1", true).unwrap();
        let report = merger.apply(&mut doc, &nodes(&["n1"])).unwrap();
        assert_eq!(count_tag(&doc, PLACEHOLDER_TAG), 0);
        assert_eq!(report.placeholder_groups, 0);
    }

    #[test]
    fn nodes_appended_once_in_order() {
        let mut doc = json!({ "outbounds": [
            { "tag": "n2", "type": "shadowsocks", "server": "custom" }
        ]});
        let merger = Merger::from_rule_string("nothing", true).unwrap();
        let report = merger
            .apply(&mut doc, &nodes(&["n1", "n2", "n3", "n1"]))
            .unwrap();
        let tags: Vec<&str> = doc["outbounds"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["tag"].as_str().unwrap())
            .collect();
        assert_eq!(tags, vec!["n2", "n1", "n3"]);
        assert_eq!(group(&doc, "n2")["server"], "custom");
        assert_eq!(report.nodes_appended, 2);
        assert_eq!(report.nodes_present, 2);
    }

    #[test]
    fn untagged_nodes_skipped() {
        let mut doc = json!({ "outbounds": [] });
        let untagged = NodeRecord::try_from(json!({ "type": "vmess" })).unwrap();
        let merger = Merger::from_rule_string("X", true).unwrap();
        let report = merger.apply(&mut doc, &[untagged]).unwrap();
        assert_eq!(report.nodes_untagged, 1);
        assert!(doc["outbounds"].as_array().unwrap().is_empty());
    }

    #[test]
    fn missing_top_level_outbounds_created() {
        let mut doc = json!({ "log": { "level": "info" } });
        let merger = Merger::from_rule_string("X", true).unwrap();
        merger.apply(&mut doc, &nodes(&["n1"])).unwrap();
        assert_eq!(doc["outbounds"][0]["tag"], "n1");
    }

    #[test]
    fn non_object_root_rejected() {
        let mut doc = json!([]);
        let merger = Merger::from_rule_string("X", true).unwrap();
        assert!(matches!(
            merger.apply(&mut doc, &[]),
            Err(MergeError::Document(_))
        ));
    }
}
