//! Fixtures shared by the unit tests: wire-format helpers, a recording render backend and a
//! texture loader that resolves immediately.

use std::collections::HashMap;
use std::future::{Ready, ready};

use super::backend::{Projector, RenderBackend, RenderTarget, Scene, Surface, sprite_covers};
use super::camera::{Camera, ViewOffset};
use super::error::{Result, ViewerError};
use super::textures::TextureLoader;
use super::types::{GraphLink, GraphNode, Rgb};

pub fn node(id: &str, pos: [f32; 3], group: &str) -> GraphNode {
	GraphNode {
		id: id.into(),
		position: pos,
		group: group.into(),
		name: format!("Node {}", id),
		color: None,
	}
}

pub fn link(s: &str, t: &str) -> GraphLink {
	GraphLink {
		source: s.into(),
		target: t.into(),
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderRecord {
	pub target: RenderTarget,
	pub view_offset: Option<ViewOffset>,
	pub edge_vertices: usize,
	pub sprite_batches: usize,
	pub sprite_vertices: usize,
	pub textures: Vec<Option<String>>,
	pub labels: Vec<String>,
	pub colors_dirty: bool,
}

/// Records every render and rasterizes the pick target with the same rule as the canvas.
pub struct MockBackend {
	pub surface: Surface,
	pub renders: Vec<RenderRecord>,
	pub fail_readback: bool,
	pick_pixel: [u8; 4],
}

impl MockBackend {
	pub fn new() -> Self {
		Self {
			surface: Surface::default(),
			renders: Vec::new(),
			fail_readback: false,
			pick_pixel: [0, 0, 0, 0],
		}
	}

	pub fn screen_renders(&self) -> impl Iterator<Item = &RenderRecord> {
		self.renders.iter().filter(|r| r.target == RenderTarget::Screen)
	}
}

impl RenderBackend for MockBackend {
	type Texture = String;

	fn surface(&self) -> Surface {
		self.surface
	}

	fn render(
		&mut self,
		scene: &Scene<'_, String>,
		camera: &Camera,
		target: RenderTarget,
	) -> Result<()> {
		self.renders.push(RenderRecord {
			target,
			view_offset: camera.view_offset(),
			edge_vertices: scene.edges.as_ref().map_or(0, |e| e.positions.len()),
			sprite_batches: scene.sprites.len(),
			sprite_vertices: scene.sprites.iter().map(|s| s.positions.len()).sum(),
			textures: scene.sprites.iter().map(|s| s.texture.cloned()).collect(),
			labels: scene.labels.iter().map(|l| l.text.to_string()).collect(),
			colors_dirty: scene.edges.as_ref().is_some_and(|e| e.dirty)
				|| scene.sprites.iter().any(|s| s.dirty),
		});

		if target == RenderTarget::Pick {
			let projector = Projector::new(camera, target.size(&self.surface));
			let mut nearest: Option<(f32, Rgb)> = None;
			for batch in &scene.sprites {
				for (position, color) in batch.positions.iter().zip(batch.colors) {
					let Some(p) = projector.project(*position) else {
						continue;
					};
					let size = projector.sprite_size(batch.size, p.depth);
					let covers = sprite_covers(p.x, p.y, size, 0.5, 0.5);
					if covers && nearest.is_none_or(|(depth, _)| p.depth < depth) {
						nearest = Some((p.depth, *color));
					}
				}
			}
			let [r, g, b] = nearest.map_or(scene.background, |(_, c)| c).to_bytes();
			self.pick_pixel = [r, g, b, 255];
		}
		Ok(())
	}

	fn read_pixels(
		&mut self,
		target: RenderTarget,
		_x: u32,
		_y: u32,
		width: u32,
		height: u32,
	) -> Result<Vec<u8>> {
		if self.fail_readback {
			return Err(ViewerError::PixelReadback("mock readback disabled".into()));
		}
		assert_eq!(target, RenderTarget::Pick);
		assert_eq!((width, height), (1, 1));
		Ok(self.pick_pixel.to_vec())
	}
}

/// Resolves each url from a fixed table; unknown urls fail.
#[derive(Clone, Default)]
pub struct ReadyLoader {
	pub textures: HashMap<String, String>,
}

impl ReadyLoader {
	pub fn accepting(urls: &[&str]) -> Self {
		Self {
			textures: urls
				.iter()
				.map(|u| (u.to_string(), format!("texture:{}", u)))
				.collect(),
		}
	}
}

impl TextureLoader for ReadyLoader {
	type Texture = String;
	type Pending = Ready<std::result::Result<String, String>>;

	fn load(&self, url: &str) -> Self::Pending {
		ready(
			self.textures
				.get(url)
				.cloned()
				.ok_or_else(|| format!("404 for {}", url)),
		)
	}
}
