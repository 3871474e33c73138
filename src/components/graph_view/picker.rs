use log::debug;

use super::backend::{RenderBackend, RenderTarget, Scene, SpriteBatch};
use super::builder::{GraphBuild, RESERVED_INDEX_COLOR, decode_index};
use super::camera::{Camera, ViewOffset};
use super::error::{Result, ViewerError};
use super::types::Rgb;

/// Pointer position in client coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerSample {
	pub client_x: f64,
	pub client_y: f64,
}

impl PointerSample {
	pub fn new(client_x: f64, client_y: f64) -> Self {
		Self { client_x, client_y }
	}
}

/// Resolves pointer positions to node indices by rendering the index scene into one pixel.
#[derive(Debug)]
pub struct IndexPicker {
	background: Rgb,
}

impl Default for IndexPicker {
	fn default() -> Self {
		Self {
			background: Rgb::from_bytes(RESERVED_INDEX_COLOR),
		}
	}
}

impl IndexPicker {
	/// The never-displayed scene: index-colored sprites of the visible groups, no edges.
	pub fn index_scene<'a, T>(&self, graph: &'a GraphBuild) -> Scene<'a, T> {
		let geometry = &graph.index_geometry;
		let mut scene = Scene::empty(self.background);
		scene.sprites = graph
			.partitions
			.iter()
			.filter(|p| p.visible && p.count > 0)
			.map(|p| SpriteBatch {
				positions: &geometry.positions[p.range()],
				colors: &geometry.colors.as_slice()[p.range()],
				texture: None,
				size: graph.node_size,
				dirty: false,
			})
			.collect();
		scene
	}

	pub fn pick<B: RenderBackend>(
		&self,
		backend: &mut B,
		camera: &mut Camera,
		graph: &GraphBuild,
		pointer: PointerSample,
	) -> Result<Option<usize>> {
		let surface = backend.surface();
		let Some((x, y)) = surface.device_pixel(pointer.client_x, pointer.client_y) else {
			return Ok(None);
		};
		let (full_width, full_height) = surface.device_size();

		let previous = camera.view_offset();
		camera.set_view_offset(ViewOffset {
			full_width,
			full_height,
			x,
			y,
			width: 1,
			height: 1,
		});
		let sampled = self.sample(backend, camera, graph);
		match previous {
			Some(offset) => camera.set_view_offset(offset),
			None => camera.clear_view_offset(),
		}

		let [r, g, b, _] = sampled?;
		let Some(index) = decode_index([r, g, b]) else {
			return Ok(None);
		};
		if graph.node(index).is_none() {
			debug!("ignoring stale pick index {}", index);
			return Ok(None);
		}
		Ok(Some(index))
	}

	fn sample<B: RenderBackend>(
		&self,
		backend: &mut B,
		camera: &Camera,
		graph: &GraphBuild,
	) -> Result<[u8; 4]> {
		let scene = self.index_scene(graph);
		backend.render(&scene, camera, RenderTarget::Pick)?;
		let bytes = backend.read_pixels(RenderTarget::Pick, 0, 0, 1, 1)?;
		bytes
			.get(..4)
			.and_then(|b| <[u8; 4]>::try_from(b).ok())
			.ok_or_else(|| {
				ViewerError::PixelReadback(format!("expected 4 bytes, got {}", bytes.len()))
			})
	}
}
