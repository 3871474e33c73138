use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::builder::MAX_NODES;
use super::error::Result;

/// Linear RGB color with channels in `0.0..=1.0`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rgb(pub [f32; 3]);

impl Rgb {
	pub const WHITE: Rgb = Rgb([1.0, 1.0, 1.0]);

	pub const fn from_hex(hex: u32) -> Self {
		Self([
			((hex >> 16) & 0xff) as f32 / 255.0,
			((hex >> 8) & 0xff) as f32 / 255.0,
			(hex & 0xff) as f32 / 255.0,
		])
	}

	pub fn from_bytes(bytes: [u8; 3]) -> Self {
		Self([
			bytes[0] as f32 / 255.0,
			bytes[1] as f32 / 255.0,
			bytes[2] as f32 / 255.0,
		])
	}

	pub fn to_bytes(self) -> [u8; 3] {
		self.0.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
	}

	pub fn to_css(self) -> String {
		let [r, g, b] = self.to_bytes();
		format!("rgb({}, {}, {})", r, g, b)
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
	pub id: String,
	#[serde(rename = "pos")]
	pub position: [f32; 3],
	#[serde(rename = "g", default)]
	pub group: String,
	#[serde(rename = "n", default)]
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub color: Option<Rgb>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphLink {
	#[serde(rename = "s")]
	pub source: String,
	#[serde(rename = "t")]
	pub target: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
	#[serde(default)]
	pub nodes: Vec<GraphNode>,
	#[serde(default)]
	pub links: Vec<GraphLink>,
}

/// Sprite image for every node of one group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeTexture {
	pub group: String,
	pub sprite: String,
	/// Resting color for the group, used when a node carries no override.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub color: Option<Rgb>,
}

/// Everything one `set_data` call replaces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRequest {
	pub graph_data: GraphData,
	#[serde(default)]
	pub node_textures: Vec<NodeTexture>,
	#[serde(default = "default_node_size")]
	pub node_size: f32,
}

impl DataRequest {
	pub fn from_json(text: &str) -> Result<Self> {
		Ok(serde_json::from_str(text)?)
	}
}

fn default_node_size() -> f32 {
	ViewerConfig::default().node_size
}

/// Palette used for resting, selected and hovered elements.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColorTable {
	pub node: Rgb,
	pub connection_start: Rgb,
	pub connection_end: Rgb,
	pub select_node: Rgb,
	pub select_start: Rgb,
	pub select_end: Rgb,
	pub hover_node: Rgb,
	pub hover_start: Rgb,
	pub hover_end: Rgb,
	pub background: Rgb,
}

impl Default for ColorTable {
	fn default() -> Self {
		Self {
			node: Rgb::from_hex(0x8fb3d9),
			connection_start: Rgb::from_hex(0x6488c0),
			connection_end: Rgb::from_hex(0x233554),
			select_node: Rgb::from_hex(0xffcc33),
			select_start: Rgb::from_hex(0xffaa00),
			select_end: Rgb::from_hex(0x8a4a00),
			hover_node: Rgb::from_hex(0x66ffcc),
			hover_start: Rgb::from_hex(0x33ddaa),
			hover_end: Rgb::from_hex(0x0f6f55),
			background: Rgb::from_hex(0x1a1a2e),
		}
	}
}

/// Partial palette accepted by `set_colors`; missing entries keep their value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColorOverrides {
	pub node: Option<Rgb>,
	pub connection_start: Option<Rgb>,
	pub connection_end: Option<Rgb>,
	pub select_node: Option<Rgb>,
	pub select_start: Option<Rgb>,
	pub select_end: Option<Rgb>,
	pub hover_node: Option<Rgb>,
	pub hover_start: Option<Rgb>,
	pub hover_end: Option<Rgb>,
	pub background: Option<Rgb>,
}

impl ColorTable {
	pub fn apply(&mut self, overrides: &ColorOverrides) {
		let slots = [
			(&mut self.node, overrides.node),
			(&mut self.connection_start, overrides.connection_start),
			(&mut self.connection_end, overrides.connection_end),
			(&mut self.select_node, overrides.select_node),
			(&mut self.select_start, overrides.select_start),
			(&mut self.select_end, overrides.select_end),
			(&mut self.hover_node, overrides.hover_node),
			(&mut self.hover_start, overrides.hover_start),
			(&mut self.hover_end, overrides.hover_end),
			(&mut self.background, overrides.background),
		];
		for (slot, value) in slots {
			if let Some(color) = value {
				*slot = color;
			}
		}
	}
}

/// Accepted values for one attribute in a `select_by` filter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValues {
	One(String),
	Many(Vec<String>),
}

impl FilterValues {
	pub fn as_slice(&self) -> &[String] {
		match self {
			FilterValues::One(value) => std::slice::from_ref(value),
			FilterValues::Many(values) => values,
		}
	}
}

/// Attribute name (`id`, `g`, `n`, or their long forms) to accepted values.
pub type AttributeFilter = BTreeMap<String, FilterValues>;

/// Tunables for the camera, controls, labels and palette.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewerConfig {
	pub fov: f32,
	pub near: f32,
	pub far: f32,
	pub min_distance: f32,
	pub max_distance: f32,
	pub rotate_speed: f32,
	pub zoom_speed: f32,
	pub pan_speed: f32,
	pub damping_factor: f32,
	pub static_moving: bool,
	pub fly_duration_ms: f64,
	pub label_distance: f32,
	pub labels_visible: bool,
	pub node_size: f32,
	/// Larger data sets are refused. Capped at the index-color limit.
	pub max_nodes: usize,
	pub colors: ColorTable,
}

impl Default for ViewerConfig {
	fn default() -> Self {
		Self {
			fov: 60.0,
			near: 1.0,
			far: 20_000.0,
			min_distance: 10.0,
			max_distance: 10_000.0,
			rotate_speed: 1.0,
			zoom_speed: 1.2,
			pan_speed: 0.3,
			damping_factor: 0.2,
			static_moving: false,
			fly_duration_ms: 1000.0,
			label_distance: 400.0,
			labels_visible: true,
			node_size: 12.0,
			max_nodes: MAX_NODES,
			colors: ColorTable::default(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::graph_view::error::ViewerError;

	#[test]
	fn parses_wire_format() {
		let request = DataRequest::from_json(
			r#"{
				"graphData": {
					"nodes": [
						{"id": "a", "pos": [0, 1, 2], "g": "m", "n": "Alpha"},
						{"id": "b", "pos": [3, 4, 5], "g": "x", "n": "Beta", "color": [1, 0, 0]}
					],
					"links": [{"s": "a", "t": "b"}]
				},
				"nodeTextures": [{"group": "m", "sprite": "m.png"}],
				"nodeSize": 8
			}"#,
		)
		.unwrap();

		assert_eq!(request.graph_data.nodes.len(), 2);
		assert_eq!(request.graph_data.nodes[1].color, Some(Rgb([1.0, 0.0, 0.0])));
		assert_eq!(request.graph_data.links[0].target, "b");
		assert_eq!(request.node_textures[0].sprite, "m.png");
		assert_eq!(request.node_size, 8.0);
	}

	#[test]
	fn node_size_defaults_when_missing() {
		let text = r#"{"graphData": {"nodes": [], "links": []}}"#;
		let request = DataRequest::from_json(text).unwrap();
		assert_eq!(request.node_size, ViewerConfig::default().node_size);
		assert!(request.node_textures.is_empty());
	}

	#[test]
	fn malformed_request_is_invalid_data() {
		let missing_graph = DataRequest::from_json(r#"{"nodeSize": 4}"#);
		assert!(matches!(missing_graph, Err(ViewerError::InvalidData(_))));
		let truncated = DataRequest::from_json(r#"{"graphData": {"nodes": ["#);
		assert!(matches!(truncated, Err(ViewerError::InvalidData(_))));
	}

	#[test]
	fn overrides_only_touch_given_entries() {
		let mut table = ColorTable::default();
		let before = table.clone();
		let overrides: ColorOverrides =
			serde_json::from_str(r#"{"selectNode": [0, 1, 0]}"#).unwrap();
		table.apply(&overrides);

		assert_eq!(table.select_node, Rgb([0.0, 1.0, 0.0]));
		assert_eq!(table.node, before.node);
		assert_eq!(table.hover_end, before.hover_end);
	}

	#[test]
	fn filter_accepts_single_or_many_values() {
		let filter: AttributeFilter =
			serde_json::from_str(r#"{"g": ["m", "k"], "id": "a"}"#).unwrap();
		assert_eq!(filter["g"].as_slice(), ["m".to_string(), "k".to_string()]);
		assert_eq!(filter["id"].as_slice(), ["a".to_string()]);
	}

	#[test]
	fn byte_conversion_is_exact() {
		for byte in [0u8, 1, 127, 128, 254, 255] {
			let color = Rgb::from_bytes([byte, 255 - byte, byte / 2]);
			assert_eq!(color.to_bytes(), [byte, 255 - byte, byte / 2]);
		}
		assert_eq!(Rgb::from_hex(0xff8000).to_css(), "rgb(255, 128, 0)");
	}
}
