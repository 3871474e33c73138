//! Turns wire-format graph data into renderable buffers.
//!
//! Every node gets a stable index in `0..N`. Indices are assigned after a stable sort by group,
//! so each group covers one contiguous range and can be drawn with a single batched call. The
//! index doubles as the node's picking id through [`encode_index`].

use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use serde::Serialize;

use super::error::{Result, ViewerError};
use super::types::{ColorTable, GraphData, NodeTexture, Rgb};

/// Index color reserved for "no node"; also the index scene background.
pub const RESERVED_INDEX_COLOR: [u8; 3] = [255, 255, 255];
/// Number of distinct node indices the 24-bit index colors can address.
pub const MAX_NODES: usize = 0xff_ffff;

/// Maps a node index to its 24-bit picking color.
pub fn encode_index(index: usize) -> [u8; 3] {
	debug_assert!(index < MAX_NODES);
	[
		(index / 65536) as u8,
		((index / 256) % 256) as u8,
		(index % 256) as u8,
	]
}

/// Inverse of [`encode_index`]; `None` for the reserved background color.
pub fn decode_index(rgb: [u8; 3]) -> Option<usize> {
	let [r, g, b] = rgb;
	if r == 255 && g == 255 && b == 255 {
		return None;
	}
	Some(r as usize * 65536 + g as usize * 256 + b as usize)
}

/// Precomputed addressing for one edge incident to a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connection {
	pub edge: usize,
	pub start_slot: usize,
	pub end_slot: usize,
}

impl Connection {
	fn new(edge: usize) -> Self {
		Self {
			edge,
			start_slot: 2 * edge,
			end_slot: 2 * edge + 1,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeRecord {
	pub id: String,
	pub index: usize,
	#[serde(rename = "pos")]
	pub position: [f32; 3],
	#[serde(rename = "g")]
	pub group: String,
	#[serde(rename = "n")]
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub color: Option<Rgb>,
	#[serde(skip)]
	pub connections: Vec<Connection>,
}

impl NodeRecord {
	/// Looks up a filterable attribute by its wire or long name.
	pub fn attribute(&self, key: &str) -> Option<&str> {
		match key {
			"id" => Some(&self.id),
			"g" | "group" => Some(&self.group),
			"n" | "name" => Some(&self.name),
			_ => None,
		}
	}
}

/// Per-vertex colors with a flag telling the renderer to re-upload them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColorBuffer {
	colors: Vec<Rgb>,
	dirty: bool,
}

impl ColorBuffer {
	pub fn from_colors(colors: Vec<Rgb>) -> Self {
		Self {
			colors,
			dirty: true,
		}
	}

	pub fn set(&mut self, slot: usize, color: Rgb) {
		if let Some(entry) = self.colors.get_mut(slot) {
			*entry = color;
			self.dirty = true;
		}
	}

	pub fn get(&self, slot: usize) -> Option<Rgb> {
		self.colors.get(slot).copied()
	}

	pub fn as_slice(&self) -> &[Rgb] {
		&self.colors
	}

	pub fn len(&self) -> usize {
		self.colors.len()
	}

	pub fn is_empty(&self) -> bool {
		self.colors.is_empty()
	}

	pub fn is_dirty(&self) -> bool {
		self.dirty
	}

	pub fn mark_clean(&mut self) {
		self.dirty = false;
	}
}

#[derive(Clone, Debug, Default)]
pub struct PointGeometry {
	pub positions: Vec<[f32; 3]>,
	pub colors: ColorBuffer,
}

/// Two vertices per edge: slot `2k` is the start, `2k + 1` the end.
#[derive(Clone, Debug, Default)]
pub struct EdgeGeometry {
	pub positions: Vec<[f32; 3]>,
	pub colors: ColorBuffer,
	pub endpoints: Vec<(usize, usize)>,
}

impl EdgeGeometry {
	pub fn edge_count(&self) -> usize {
		self.endpoints.len()
	}
}

/// Contiguous node range sharing one sprite texture.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialPartition {
	pub group: String,
	pub start: usize,
	pub count: usize,
	/// Position in [`GraphBuild::textures`], if the group has a sprite.
	pub texture: Option<usize>,
	pub visible: bool,
}

impl MaterialPartition {
	pub fn range(&self) -> std::ops::Range<usize> {
		self.start..self.start + self.count
	}
}

/// Output of [`build`], replaced wholesale on every data load.
#[derive(Clone, Debug, Default)]
pub struct GraphBuild {
	pub node_index: HashMap<String, usize>,
	pub nodes: Vec<NodeRecord>,
	pub node_geometry: PointGeometry,
	pub index_geometry: PointGeometry,
	pub edge_geometry: EdgeGeometry,
	pub partitions: Vec<MaterialPartition>,
	/// Texture descriptors sorted by group, one per group.
	pub textures: Vec<NodeTexture>,
	pub group_colors: HashMap<String, Rgb>,
	pub node_size: f32,
}

impl GraphBuild {
	pub fn node_count(&self) -> usize {
		self.nodes.len()
	}

	pub fn node(&self, index: usize) -> Option<&NodeRecord> {
		self.nodes.get(index)
	}

	/// Color of a node when it is neither selected nor hovered.
	pub fn resting_color(&self, index: usize, palette: &ColorTable) -> Rgb {
		self.nodes
			.get(index)
			.and_then(|node| {
				node.color
					.or_else(|| self.group_colors.get(&node.group).copied())
			})
			.unwrap_or(palette.node)
	}

	pub fn is_visible(&self, index: usize) -> bool {
		self.partitions
			.iter()
			.find(|p| p.range().contains(&index))
			.is_some_and(|p| p.visible)
	}
}

pub fn build(
	data: &GraphData,
	textures: &[NodeTexture],
	node_size: f32,
	palette: &ColorTable,
) -> Result<GraphBuild> {
	build_capped(data, textures, node_size, palette, MAX_NODES)
}

/// Like [`build`], refusing inputs with more than `max_nodes` nodes. The cap never exceeds
/// [`MAX_NODES`].
pub fn build_capped(
	data: &GraphData,
	textures: &[NodeTexture],
	node_size: f32,
	palette: &ColorTable,
	max_nodes: usize,
) -> Result<GraphBuild> {
	let max = max_nodes.min(MAX_NODES);
	if data.nodes.len() > max {
		return Err(ViewerError::TooManyNodes {
			count: data.nodes.len(),
			max,
		});
	}

	let mut sorted_textures: Vec<NodeTexture> = Vec::with_capacity(textures.len());
	let mut seen_groups = HashSet::new();
	for texture in textures {
		if seen_groups.insert(texture.group.as_str()) {
			sorted_textures.push(texture.clone());
		} else {
			warn!("ignoring duplicate sprite for group `{}`", texture.group);
		}
	}
	sorted_textures.sort_by(|a, b| a.group.cmp(&b.group));
	let group_colors: HashMap<String, Rgb> = sorted_textures
		.iter()
		.filter_map(|t| t.color.map(|c| (t.group.clone(), c)))
		.collect();

	let mut ordered: Vec<_> = data.nodes.iter().collect();
	ordered.sort_by(|a, b| a.group.cmp(&b.group));

	let mut graph = GraphBuild {
		node_size,
		group_colors,
		..GraphBuild::default()
	};
	let mut positions = Vec::with_capacity(ordered.len());
	let mut index_colors = Vec::with_capacity(ordered.len());

	for node in ordered {
		if graph.node_index.contains_key(&node.id) {
			warn!("skipping duplicate node id `{}`", node.id);
			continue;
		}
		let index = graph.nodes.len();
		graph.node_index.insert(node.id.clone(), index);
		positions.push(node.position);
		index_colors.push(Rgb::from_bytes(encode_index(index)));
		graph.nodes.push(NodeRecord {
			id: node.id.clone(),
			index,
			position: node.position,
			group: node.group.clone(),
			name: node.name.clone(),
			color: node.color,
			connections: Vec::new(),
		});
	}

	let node_colors = (0..graph.nodes.len())
		.map(|i| graph.resting_color(i, palette))
		.collect();
	graph.node_geometry = PointGeometry {
		positions: positions.clone(),
		colors: ColorBuffer::from_colors(node_colors),
	};
	graph.index_geometry = PointGeometry {
		positions,
		colors: ColorBuffer::from_colors(index_colors),
	};

	for node in &graph.nodes {
		match graph.partitions.last_mut() {
			Some(last) if last.group == node.group => last.count += 1,
			_ => graph.partitions.push(MaterialPartition {
				group: node.group.clone(),
				start: node.index,
				count: 1,
				texture: sorted_textures.iter().position(|t| t.group == node.group),
				visible: true,
			}),
		}
	}
	graph.textures = sorted_textures;

	let mut edges = EdgeGeometry::default();
	let mut edge_colors = Vec::with_capacity(data.links.len() * 2);
	for link in &data.links {
		let (Some(&source), Some(&target)) = (
			graph.node_index.get(&link.source),
			graph.node_index.get(&link.target),
		) else {
			warn!(
				"dropping link {} -> {}: endpoint not in node set",
				link.source, link.target
			);
			continue;
		};
		let edge = edges.endpoints.len();
		edges.endpoints.push((source, target));
		edges.positions.push(graph.nodes[source].position);
		edges.positions.push(graph.nodes[target].position);
		edge_colors.push(palette.connection_start);
		edge_colors.push(palette.connection_end);
		graph.nodes[source].connections.push(Connection::new(edge));
		graph.nodes[target].connections.push(Connection::new(edge));
	}
	edges.colors = ColorBuffer::from_colors(edge_colors);
	graph.edge_geometry = edges;

	debug!(
		"built {} nodes in {} groups, {} edges",
		graph.nodes.len(),
		graph.partitions.len(),
		graph.edge_geometry.edge_count()
	);
	Ok(graph)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::graph_view::testing::{link, node};

	fn texture(group: &str) -> NodeTexture {
		NodeTexture {
			group: group.into(),
			sprite: format!("{}.png", group),
			color: None,
		}
	}

	#[test]
	fn index_colors_round_trip_at_boundaries() {
		for index in [0, 1, 255, 256, 65535, 65536, MAX_NODES - 1] {
			assert_eq!(decode_index(encode_index(index)), Some(index));
		}
		assert_eq!(encode_index(0x01_02_03), [1, 2, 3]);
		assert_eq!(decode_index(RESERVED_INDEX_COLOR), None);
		// Two channels at 255 still decode; only the full triple is reserved.
		assert_eq!(decode_index([255, 255, 0]), Some(255 * 65536 + 255 * 256));
	}

	#[test]
	fn three_nodes_one_link() {
		let data = GraphData {
			nodes: vec![
				node("A", [0.0, 0.0, 0.0], "m"),
				node("B", [100.0, 0.0, 0.0], "m"),
				node("C", [0.0, 100.0, 0.0], "m"),
			],
			links: vec![link("A", "B")],
		};
		let graph = build(&data, &[], 10.0, &ColorTable::default()).unwrap();

		assert_eq!(graph.edge_geometry.edge_count(), 1);
		assert_eq!(graph.edge_geometry.positions.len(), 2);
		assert_eq!(graph.edge_geometry.colors.len(), 2);
		let decoded: Vec<_> = graph
			.index_geometry
			.colors
			.as_slice()
			.iter()
			.map(|c| decode_index(c.to_bytes()))
			.collect();
		assert_eq!(decoded, vec![Some(0), Some(1), Some(2)]);
		assert_eq!(graph.node_index["A"], 0);
		assert_eq!(graph.node_index["C"], 2);
	}

	#[test]
	fn dangling_link_is_dropped() {
		let data = GraphData {
			nodes: vec![node("A", [0.0; 3], "m")],
			links: vec![link("A", "Z"), link("Z", "A")],
		};
		let graph = build(&data, &[], 10.0, &ColorTable::default()).unwrap();

		assert_eq!(graph.edge_geometry.edge_count(), 0);
		assert!(graph.edge_geometry.colors.is_empty());
		assert!(graph.nodes[0].connections.is_empty());
	}

	#[test]
	fn groups_are_contiguous_partitions() {
		let data = GraphData {
			nodes: vec![
				node("1", [0.0; 3], "b"),
				node("2", [0.0; 3], "a"),
				node("3", [0.0; 3], "b"),
				node("4", [0.0; 3], "c"),
				node("5", [0.0; 3], "a"),
			],
			links: vec![],
		};
		let graph = build(
			&data,
			&[texture("c"), texture("a")],
			10.0,
			&ColorTable::default(),
		)
		.unwrap();

		let ranges: Vec<_> = graph
			.partitions
			.iter()
			.map(|p| (p.group.as_str(), p.start, p.count, p.texture))
			.collect();
		assert_eq!(
			ranges,
			vec![("a", 0, 2, Some(0)), ("b", 2, 2, None), ("c", 4, 1, Some(1))]
		);
		// Stable within a group.
		assert_eq!(graph.nodes[0].id, "2");
		assert_eq!(graph.nodes[1].id, "5");
		assert_eq!(graph.textures[0].group, "a");
		let covered: usize = graph.partitions.iter().map(|p| p.count).sum();
		assert_eq!(covered, graph.node_count());
	}

	#[test]
	fn connection_slots_cover_both_endpoints() {
		let data = GraphData {
			nodes: vec![
				node("A", [0.0; 3], "m"),
				node("B", [1.0; 3], "m"),
				node("C", [2.0; 3], "m"),
			],
			links: vec![link("A", "B"), link("B", "C")],
		};
		let graph = build(&data, &[], 10.0, &ColorTable::default()).unwrap();
		let b = &graph.nodes[1];

		assert_eq!(b.connections.len(), 2);
		assert_eq!(
			b.connections[0],
			Connection {
				edge: 0,
				start_slot: 0,
				end_slot: 1
			}
		);
		assert_eq!(b.connections[1].edge, 1);
		assert_eq!(b.connections[1].start_slot, 2);
		assert_eq!(b.connections[1].end_slot, 3);
		assert_eq!(graph.edge_geometry.positions[3], [2.0; 3]);
	}

	#[test]
	fn node_cap_refuses_larger_graphs() {
		let data = GraphData {
			nodes: vec![node("A", [0.0; 3], "m"), node("B", [0.0; 3], "m")],
			links: vec![],
		};
		let palette = ColorTable::default();
		let err = build_capped(&data, &[], 10.0, &palette, 1).unwrap_err();
		assert!(matches!(err, ViewerError::TooManyNodes { count: 2, max: 1 }));
		assert!(build_capped(&data, &[], 10.0, &palette, 2).is_ok());
		assert!(build_capped(&data, &[], 10.0, &palette, usize::MAX).is_ok());
	}

	#[test]
	fn node_override_beats_group_color() {
		let palette = ColorTable::default();
		let mut red = node("A", [0.0; 3], "m");
		red.color = Some(Rgb([1.0, 0.0, 0.0]));
		let data = GraphData {
			nodes: vec![red, node("B", [0.0; 3], "m"), node("C", [0.0; 3], "x")],
			links: vec![],
		};
		let mut tinted = texture("m");
		tinted.color = Some(Rgb([0.0, 0.0, 1.0]));
		let graph = build(&data, &[tinted], 10.0, &palette).unwrap();
		let colors = graph.node_geometry.colors.as_slice();

		assert_eq!(colors[0], Rgb([1.0, 0.0, 0.0]));
		assert_eq!(colors[1], Rgb([0.0, 0.0, 1.0]));
		assert_eq!(colors[2], palette.node);
	}

	#[test]
	fn duplicate_ids_keep_first() {
		let data = GraphData {
			nodes: vec![node("A", [1.0; 3], "m"), node("A", [2.0; 3], "m")],
			links: vec![],
		};
		let graph = build(&data, &[], 10.0, &ColorTable::default()).unwrap();
		assert_eq!(graph.node_count(), 1);
		assert_eq!(graph.nodes[0].position, [1.0; 3]);
	}
}
