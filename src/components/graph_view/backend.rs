//! The rendering capability the viewer draws through.
//!
//! A backend receives a flat [`Scene`] description each frame and renders it through a
//! [`Camera`] either to the screen or to the 1×1 pick target, which can be read back.

use glam::{Mat4, Vec3};

use super::camera::Camera;
use super::error::Result;
use super::types::Rgb;

/// Placement of the drawing surface in client (CSS pixel) coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Surface {
	pub left: f64,
	pub top: f64,
	pub width: f64,
	pub height: f64,
	pub pixel_ratio: f64,
}

impl Default for Surface {
	fn default() -> Self {
		Self {
			left: 0.0,
			top: 0.0,
			width: 800.0,
			height: 600.0,
			pixel_ratio: 1.0,
		}
	}
}

impl Surface {
	pub fn device_size(&self) -> (u32, u32) {
		(
			(self.width * self.pixel_ratio).round().max(1.0) as u32,
			(self.height * self.pixel_ratio).round().max(1.0) as u32,
		)
	}

	pub fn aspect(&self) -> f32 {
		if self.height > 0.0 {
			(self.width / self.height) as f32
		} else {
			1.0
		}
	}

	/// Device pixel under a client coordinate, `None` outside the surface.
	pub fn device_pixel(&self, client_x: f64, client_y: f64) -> Option<(u32, u32)> {
		let x = (client_x - self.left) * self.pixel_ratio;
		let y = (client_y - self.top) * self.pixel_ratio;
		let (w, h) = self.device_size();
		if x < 0.0 || y < 0.0 || x >= w as f64 || y >= h as f64 {
			return None;
		}
		Some((x.floor() as u32, y.floor() as u32))
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderTarget {
	/// The displayed framebuffer, sized to the surface.
	Screen,
	/// Offscreen 1×1 target used for picking.
	Pick,
}

impl RenderTarget {
	pub fn size(self, surface: &Surface) -> (u32, u32) {
		match self {
			RenderTarget::Screen => surface.device_size(),
			RenderTarget::Pick => (1, 1),
		}
	}
}

/// Line segments, two vertices each.
pub struct EdgeBatch<'a> {
	pub positions: &'a [[f32; 3]],
	pub colors: &'a [Rgb],
	pub dirty: bool,
}

/// Point sprites sharing one texture.
pub struct SpriteBatch<'a, T> {
	pub positions: &'a [[f32; 3]],
	pub colors: &'a [Rgb],
	pub texture: Option<&'a T>,
	/// World-space size, attenuated with distance.
	pub size: f32,
	pub dirty: bool,
}

pub struct Label<'a> {
	pub position: [f32; 3],
	pub text: &'a str,
}

/// Everything drawn in one pass. Edges go first, then sprites, then labels.
pub struct Scene<'a, T> {
	pub background: Rgb,
	pub edges: Option<EdgeBatch<'a>>,
	pub sprites: Vec<SpriteBatch<'a, T>>,
	pub labels: Vec<Label<'a>>,
}

impl<T> Scene<'_, T> {
	pub fn empty(background: Rgb) -> Self {
		Self {
			background,
			edges: None,
			sprites: Vec::new(),
			labels: Vec::new(),
		}
	}
}

pub trait RenderBackend {
	type Texture;

	fn surface(&self) -> Surface;

	fn render(
		&mut self,
		scene: &Scene<'_, Self::Texture>,
		camera: &Camera,
		target: RenderTarget,
	) -> Result<()>;

	/// RGBA bytes of a rectangle of `target`, row-major.
	fn read_pixels(
		&mut self,
		target: RenderTarget,
		x: u32,
		y: u32,
		width: u32,
		height: u32,
	) -> Result<Vec<u8>>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projected {
	pub x: f64,
	pub y: f64,
	/// View-space distance along the camera axis.
	pub depth: f32,
}

/// Maps world points to pixel coordinates of a render target.
pub struct Projector {
	view_projection: Mat4,
	size_scale: f32,
	width: f32,
	height: f32,
}

impl Projector {
	pub fn new(camera: &Camera, (width, height): (u32, u32)) -> Self {
		let projection = camera.projection_matrix();
		Self {
			view_projection: projection * camera.view_matrix(),
			size_scale: projection.y_axis.y * height as f32 * 0.5,
			width: width as f32,
			height: height as f32,
		}
	}

	pub fn project(&self, point: [f32; 3]) -> Option<Projected> {
		let clip = self.view_projection * Vec3::from(point).extend(1.0);
		if clip.w <= 0.0 {
			return None;
		}
		let z = clip.z / clip.w;
		if !(-1.0..=1.0).contains(&z) {
			return None;
		}
		Some(Projected {
			x: ((clip.x / clip.w + 1.0) * 0.5 * self.width) as f64,
			y: ((1.0 - clip.y / clip.w) * 0.5 * self.height) as f64,
			depth: clip.w,
		})
	}

	/// On-target pixel size of a sprite of `world_size` at `depth`.
	pub fn sprite_size(&self, world_size: f32, depth: f32) -> f64 {
		(world_size * self.size_scale / depth.max(f32::EPSILON)) as f64
	}
}

/// Whether the disc of a sprite centered at `(x, y)` covers the point `(px, py)`.
///
/// The disc matches what the screen draws, but never shrinks below a radius of one pixel so a
/// distant node stays pickable under the pointer.
pub fn sprite_covers(x: f64, y: f64, size: f64, px: f64, py: f64) -> bool {
	let radius = (size * 0.5).max(1.0);
	(px - x).powi(2) + (py - y).powi(2) <= radius * radius
}
