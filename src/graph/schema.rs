//! Serde model of the raw graph file.
//!
//! The file is produced by an external fetch/tag pipeline and has two
//! top-level sections: `meta` (counts plus prebuilt search/tag/time indices)
//! and `elements` (the node and edge lists). Node records carry a `type` tag
//! of either `channel` or `block`; everything beyond the id and the tag is
//! optional so that a sloppy export degrades to skipped records instead of a
//! failed load.

use std::collections::HashMap;

use serde::Deserialize;

/// Top-level document. `meta` and `elements` presence is checked before
/// typed deserialization so their absence reports a clear error.
#[derive(Debug, Deserialize)]
pub struct RawGraph {
    pub meta: RawMeta,
    pub elements: RawElements,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMeta {
    #[serde(default)]
    pub channel_count: Option<usize>,
    #[serde(default)]
    pub block_count: Option<usize>,
    #[serde(default)]
    pub edge_count: Option<usize>,
    /// word -> block node ids
    #[serde(default)]
    pub search_index: HashMap<String, Vec<String>>,
    /// tag -> block node ids
    #[serde(default)]
    pub auto_tag_index: HashMap<String, Vec<String>>,
    /// time-sorted `[millis, blockId]` pairs
    #[serde(default)]
    pub sorted_timestamps: Vec<(i64, String)>,
}

#[derive(Debug, Deserialize)]
pub struct RawElements {
    pub nodes: Vec<RawNode>,
    pub edges: Vec<RawEdge>,
}

#[derive(Debug, Deserialize)]
pub struct RawNode {
    pub data: RawNodeData,
}

/// One node record, channel or block. Channel-only and block-only fields
/// coexist here; classification happens in the model builder off `kind`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNodeData {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub label: Option<String>,

    // channel fields
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub block_count: Option<usize>,
    #[serde(default)]
    pub status: Option<String>,

    // block fields
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub thumb: Option<String>,
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub original: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub connected_at: Option<String>,
    #[serde(default)]
    pub ts: Option<i64>,
    #[serde(default)]
    pub connection_count: Option<usize>,
    #[serde(default)]
    pub auto_tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawEdge {
    pub data: RawEdgeData,
}

/// Directed membership edge: source channel id -> target block id.
#[derive(Debug, Deserialize)]
pub struct RawEdgeData {
    #[serde(default)]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
}
