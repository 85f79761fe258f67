//! Typed graph model and derived indices.
//!
//! `GraphModel` is built once from the raw file and is read-only afterwards.
//! Every channel and block gets a dense zero-based index matching its order
//! in the source list; those indices are the only keys the rendering layers
//! use, so they must stay stable for the lifetime of the loaded graph.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use super::schema::{RawGraph, RawNodeData};

/// Linear RGB triple used for channel/block display colors.
pub type Color = [f32; 3];

/// Default color for blocks that belong to no channel.
pub const ORPHAN_COLOR: Color = [0.55, 0.55, 0.58];

/// Deterministic channel palette, assigned by channel index.
const PALETTE: [Color; 12] = [
    [0.91, 0.36, 0.33],
    [0.95, 0.61, 0.25],
    [0.93, 0.82, 0.31],
    [0.55, 0.82, 0.39],
    [0.29, 0.72, 0.65],
    [0.30, 0.60, 0.89],
    [0.48, 0.44, 0.90],
    [0.72, 0.42, 0.87],
    [0.90, 0.44, 0.70],
    [0.62, 0.72, 0.32],
    [0.36, 0.80, 0.86],
    [0.85, 0.52, 0.42],
];

/// Errors produced while loading a graph file. A load either succeeds with a
/// complete, internally consistent model or fails with one of these; no
/// partial model is ever handed back.
#[derive(Debug, Error)]
pub enum GraphLoadError {
    #[error("graph file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("graph file is missing required section `{0}`")]
    MissingSection(&'static str),
}

/// A collection/grouping entity. Immutable after load except that its
/// display color may come from a caller-supplied palette.
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: String,
    pub label: String,
    pub block_count: usize,
    pub color: Color,
}

/// Content class of a block, with the optional fields each class actually
/// carries. Consumers match on the variant instead of null-checking a grab
/// bag of fields.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Image {
        thumb: Option<String>,
        display: Option<String>,
        original: Option<String>,
    },
    Text {
        content: String,
    },
    Link {
        url: Option<String>,
        domain: Option<String>,
        thumb: Option<String>,
    },
    Media {
        url: Option<String>,
        thumb: Option<String>,
    },
    Attachment {
        url: Option<String>,
    },
    Generic,
}

/// A content item entity. Created once at load and never removed; hiding a
/// block at runtime is done by fading its render attributes, not by touching
/// the model.
#[derive(Debug, Clone)]
pub struct Block {
    pub id: String,
    pub label: String,
    pub kind: BlockKind,
    pub description: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
    /// Millisecond timestamp used for timeline ordering.
    pub ts: Option<i64>,
    pub tags: Vec<String>,
    /// Owning channel ids, in membership-edge insertion order.
    pub channels: Vec<String>,
    /// Inherited from the first owning channel, `ORPHAN_COLOR` if none.
    pub color: Color,
}

impl Block {
    /// A block connected to more than one channel.
    pub fn is_cross_linked(&self) -> bool {
        self.channels.len() > 1
    }
}

/// Load-time configuration. The default palette can be overridden without
/// touching anything else about the load.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub palette: Option<Vec<Color>>,
}

/// The parsed graph plus every derived index, all built once at load.
#[derive(Debug)]
pub struct GraphModel {
    channels: Vec<Channel>,
    blocks: Vec<Block>,
    channel_index: HashMap<String, usize>,
    block_index: HashMap<String, usize>,
    /// block id -> owning channel ids, edge insertion order
    membership: HashMap<String, Vec<String>>,
    /// undirected id graph, symmetric, insertion order per list
    adjacency: HashMap<String, Vec<String>>,
    /// (channel index, block index) per membership edge, insertion order
    edges: Vec<(usize, usize)>,
    search_index: HashMap<String, Vec<String>>,
    tag_index: HashMap<String, Vec<String>>,
    /// time-sorted (millis, block id)
    timeline: Vec<(i64, String)>,
}

impl GraphModel {
    /// Parses and indexes a graph file.
    pub fn load(raw: &str) -> Result<Self, GraphLoadError> {
        Self::load_with(raw, &LoadOptions::default())
    }

    pub fn load_with(raw: &str, options: &LoadOptions) -> Result<Self, GraphLoadError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::load_value(value, options)
    }

    /// Same as [`GraphModel::load`] for an already-parsed JSON document.
    pub fn load_value(value: Value, options: &LoadOptions) -> Result<Self, GraphLoadError> {
        // Section checks up front so the error names what is missing instead
        // of pointing at an arbitrary field deep in the document.
        let root = value
            .as_object()
            .ok_or(GraphLoadError::MissingSection("meta"))?;
        if !root.contains_key("meta") {
            return Err(GraphLoadError::MissingSection("meta"));
        }
        let elements = root
            .get("elements")
            .and_then(Value::as_object)
            .ok_or(GraphLoadError::MissingSection("elements"))?;
        if !elements.contains_key("nodes") {
            return Err(GraphLoadError::MissingSection("elements.nodes"));
        }
        if !elements.contains_key("edges") {
            return Err(GraphLoadError::MissingSection("elements.edges"));
        }

        let raw: RawGraph = serde_json::from_value(value)?;
        Ok(Self::build(raw, options))
    }

    fn build(raw: RawGraph, options: &LoadOptions) -> Self {
        let palette: &[Color] = options.palette.as_deref().unwrap_or(&PALETTE);

        let mut channels = Vec::new();
        let mut blocks = Vec::new();
        let mut channel_index = HashMap::new();
        let mut block_index = HashMap::new();

        for node in raw.elements.nodes {
            let data = node.data;
            match data.kind.as_str() {
                "channel" => {
                    if channel_index.contains_key(&data.id) {
                        log::warn!("duplicate channel node {}, keeping first", data.id);
                        continue;
                    }
                    let idx = channels.len();
                    channel_index.insert(data.id.clone(), idx);
                    channels.push(Channel {
                        color: palette[idx % palette.len()],
                        label: data.label.unwrap_or_default(),
                        block_count: data.block_count.unwrap_or(0),
                        id: data.id,
                    });
                }
                "block" => {
                    if block_index.contains_key(&data.id) {
                        log::warn!("duplicate block node {}, keeping first", data.id);
                        continue;
                    }
                    block_index.insert(data.id.clone(), blocks.len());
                    blocks.push(block_from_raw(data));
                }
                other => {
                    log::warn!("skipping node {} with unknown type `{}`", data.id, other);
                }
            }
        }

        let mut membership: HashMap<String, Vec<String>> = HashMap::new();
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        let mut edges = Vec::new();

        for edge in raw.elements.edges {
            let data = edge.data;
            let (Some(&ci), Some(&bi)) = (
                channel_index.get(&data.source),
                block_index.get(&data.target),
            ) else {
                // Real exports contain dangling references; dropping the edge
                // is recoverable, failing the whole load is not.
                log::warn!(
                    "skipping edge {} -> {}: unknown endpoint",
                    data.source,
                    data.target
                );
                continue;
            };

            let owners = membership.entry(data.target.clone()).or_default();
            if owners.contains(&data.source) {
                continue;
            }
            owners.push(data.source.clone());

            adjacency
                .entry(data.source.clone())
                .or_default()
                .push(data.target.clone());
            adjacency
                .entry(data.target.clone())
                .or_default()
                .push(data.source.clone());
            edges.push((ci, bi));
        }

        for block in &mut blocks {
            if let Some(owners) = membership.get(&block.id) {
                block.channels = owners.clone();
            }
            block.color = block
                .channels
                .first()
                .and_then(|id| channel_index.get(id))
                .map(|&i| channels[i].color)
                .unwrap_or(ORPHAN_COLOR);
        }

        Self {
            channels,
            blocks,
            channel_index,
            block_index,
            membership,
            adjacency,
            edges,
            search_index: raw.meta.search_index,
            tag_index: raw.meta.auto_tag_index,
            timeline: raw.meta.sorted_timestamps,
        }
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn channel_index(&self, id: &str) -> Option<usize> {
        self.channel_index.get(id).copied()
    }

    pub fn block_index(&self, id: &str) -> Option<usize> {
        self.block_index.get(id).copied()
    }

    /// Owning channel ids for a block, membership insertion order.
    pub fn membership(&self, block_id: &str) -> &[String] {
        self.membership.get(block_id).map_or(&[], Vec::as_slice)
    }

    /// Undirected neighbors of a channel or block id.
    pub fn neighbors(&self, id: &str) -> &[String] {
        self.adjacency.get(id).map_or(&[], Vec::as_slice)
    }

    /// Membership edges as (channel index, block index), insertion order.
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// Time-sorted (millis, block id) pairs from the file's meta section.
    pub fn timeline(&self) -> &[(i64, String)] {
        &self.timeline
    }

    fn contains_id(&self, id: &str) -> bool {
        self.channel_index.contains_key(id) || self.block_index.contains_key(id)
    }

    /// Breadth-first shortest path over the undirected id graph.
    ///
    /// Returns `[start]` when start == end, the full id sequence including
    /// both endpoints otherwise, and an empty vector when either id is
    /// unknown or the endpoints are disconnected. Ties among equally short
    /// paths are broken by adjacency-list insertion order, which makes the
    /// result deterministic for a given file.
    pub fn shortest_path(&self, start: &str, end: &str) -> Vec<String> {
        if !self.contains_id(start) || !self.contains_id(end) {
            return Vec::new();
        }
        if start == end {
            return vec![start.to_owned()];
        }

        let mut prev: HashMap<&str, &str> = HashMap::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        visited.insert(start);
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            for neighbor in self.neighbors(current) {
                let neighbor = neighbor.as_str();
                if !visited.insert(neighbor) {
                    continue;
                }
                prev.insert(neighbor, current);
                if neighbor == end {
                    let mut path = vec![neighbor.to_owned()];
                    let mut at = neighbor;
                    while let Some(&p) = prev.get(at) {
                        path.push(p.to_owned());
                        at = p;
                    }
                    path.reverse();
                    return path;
                }
                queue.push_back(neighbor);
            }
        }

        Vec::new()
    }

    /// Block indices matching a search term, using the prebuilt word index.
    /// Terms are matched by prefix; results keep index order and are deduped.
    pub fn search(&self, term: &str) -> Vec<usize> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let mut terms: Vec<&String> = self
            .search_index
            .keys()
            .filter(|k| k.starts_with(&needle))
            .collect();
        terms.sort();

        let mut seen = HashSet::new();
        let mut hits = Vec::new();
        for term in terms {
            for id in &self.search_index[term] {
                if let Some(idx) = self.block_index(id) {
                    if seen.insert(idx) {
                        hits.push(idx);
                    }
                }
            }
        }
        hits.sort_unstable();
        hits
    }

    /// Block indices carrying a tag, via the prebuilt tag index.
    pub fn blocks_with_tag(&self, tag: &str) -> Vec<usize> {
        let mut hits: Vec<usize> = self
            .tag_index
            .get(tag)
            .map(|ids| ids.iter().filter_map(|id| self.block_index(id)).collect())
            .unwrap_or_default();
        hits.sort_unstable();
        hits.dedup();
        hits
    }

    /// Blocks sharing at least one tag with the given block, as
    /// (block index, shared tag count), most similar first.
    pub fn similar_blocks(&self, index: usize) -> Vec<(usize, usize)> {
        let Some(block) = self.blocks.get(index) else {
            return Vec::new();
        };
        let tags: HashSet<&str> = block.tags.iter().map(String::as_str).collect();
        if tags.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, usize)> = self
            .blocks
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .filter_map(|(i, other)| {
                let shared = other
                    .tags
                    .iter()
                    .filter(|t| tags.contains(t.as_str()))
                    .count();
                (shared > 0).then_some((i, shared))
            })
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        scored
    }

    /// Indices of blocks belonging to more than one channel.
    pub fn cross_linked(&self) -> Vec<usize> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_cross_linked())
            .map(|(i, _)| i)
            .collect()
    }
}

fn block_from_raw(data: RawNodeData) -> Block {
    let kind = match data.class.as_deref() {
        Some("Image") => BlockKind::Image {
            thumb: data.thumb,
            display: data.display,
            original: data.original,
        },
        Some("Text") => BlockKind::Text {
            content: data.content.unwrap_or_default(),
        },
        Some("Link") => BlockKind::Link {
            url: data.source,
            domain: data.domain,
            thumb: data.thumb,
        },
        Some("Media") => BlockKind::Media {
            url: data.source,
            thumb: data.thumb,
        },
        Some("Attachment") => BlockKind::Attachment { url: data.source },
        _ => BlockKind::Generic,
    };

    let connected_at = data
        .connected_at
        .as_deref()
        .or(data.created_at.as_deref())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc));
    let ts = data.ts.or_else(|| connected_at.map(|d| d.timestamp_millis()));

    Block {
        id: data.id,
        label: data.label.unwrap_or_else(|| "Untitled".to_owned()),
        kind,
        description: data.description.filter(|d| !d.is_empty()),
        connected_at,
        ts,
        tags: data.auto_tags,
        channels: Vec::new(),
        color: ORPHAN_COLOR,
    }
}
