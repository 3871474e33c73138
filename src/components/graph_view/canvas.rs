use std::f64::consts::PI;

use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlImageElement};

use super::backend::{
	EdgeBatch, Label, Projector, RenderBackend, RenderTarget, Scene, Surface, sprite_covers,
};
use super::camera::Camera;
use super::error::{Result, ViewerError};
use super::textures::describe;
use super::types::Rgb;

const LABEL_FONT_PX: f64 = 11.0;

/// Draws scenes onto a 2D canvas. Picking renders into a detached 1×1 canvas.
pub struct CanvasBackend {
	canvas: HtmlCanvasElement,
	ctx: CanvasRenderingContext2d,
	pick_ctx: CanvasRenderingContext2d,
}

struct SpriteDraw<'a> {
	x: f64,
	y: f64,
	depth: f32,
	size: f64,
	color: Rgb,
	texture: Option<&'a HtmlImageElement>,
}

impl CanvasBackend {
	pub fn new(canvas: HtmlCanvasElement) -> Result<Self> {
		let ctx = context_2d(&canvas)?;
		let document = web_sys::window()
			.and_then(|w| w.document())
			.ok_or_else(|| ViewerError::Backend("no document".into()))?;
		let pick_canvas: HtmlCanvasElement = document
			.create_element("canvas")
			.map_err(|e| ViewerError::Backend(describe(&e)))?
			.dyn_into()
			.map_err(|_| ViewerError::Backend("pick target is not a canvas".into()))?;
		pick_canvas.set_width(1);
		pick_canvas.set_height(1);
		let pick_ctx = context_2d(&pick_canvas)?;
		pick_ctx.set_image_smoothing_enabled(false);
		Ok(Self {
			canvas,
			ctx,
			pick_ctx,
		})
	}

	fn context(&self, target: RenderTarget) -> &CanvasRenderingContext2d {
		match target {
			RenderTarget::Screen => &self.ctx,
			RenderTarget::Pick => &self.pick_ctx,
		}
	}

	/// Matches the backing store to the displayed size.
	fn fit_backing_store(&self, surface: &Surface) {
		let (width, height) = surface.device_size();
		if self.canvas.width() != width {
			self.canvas.set_width(width);
		}
		if self.canvas.height() != height {
			self.canvas.set_height(height);
		}
	}

	fn draw_edges(
		&self,
		ctx: &CanvasRenderingContext2d,
		edges: &EdgeBatch,
		projector: &Projector,
	) {
		ctx.set_line_width(1.0);
		let vertices = edges.positions.chunks_exact(2);
		for (positions, colors) in vertices.zip(edges.colors.chunks_exact(2)) {
			let a = projector.project(positions[0]);
			let b = projector.project(positions[1]);
			let (Some(a), Some(b)) = (a, b) else {
				continue;
			};
			if colors[0] == colors[1] {
				ctx.set_stroke_style_str(&colors[0].to_css());
			} else {
				let gradient = ctx.create_linear_gradient(a.x, a.y, b.x, b.y);
				let _ = gradient.add_color_stop(0.0, &colors[0].to_css());
				let _ = gradient.add_color_stop(1.0, &colors[1].to_css());
				ctx.set_stroke_style_canvas_gradient(&gradient);
			}
			ctx.begin_path();
			ctx.move_to(a.x, a.y);
			ctx.line_to(b.x, b.y);
			ctx.stroke();
		}
	}

	fn draw_sprite(&self, ctx: &CanvasRenderingContext2d, sprite: &SpriteDraw) -> Result<()> {
		let radius = sprite.size * 0.5;
		ctx.set_fill_style_str(&sprite.color.to_css());
		let Some(image) = sprite.texture else {
			ctx.begin_path();
			let _ = ctx.arc(sprite.x, sprite.y, radius, 0.0, 2.0 * PI);
			ctx.fill();
			return Ok(());
		};

		// Tint the sprite by multiplying its pixels with the vertex color.
		ctx.save();
		ctx.begin_path();
		let _ = ctx.arc(sprite.x, sprite.y, radius, 0.0, 2.0 * PI);
		ctx.clip();
		let drawn = ctx.draw_image_with_html_image_element_and_dw_and_dh(
			image,
			sprite.x - radius,
			sprite.y - radius,
			sprite.size,
			sprite.size,
		);
		let _ = ctx.set_global_composite_operation("multiply");
		ctx.fill_rect(sprite.x - radius, sprite.y - radius, sprite.size, sprite.size);
		ctx.restore();
		drawn.map_err(|e| ViewerError::Backend(describe(&e)))
	}

	fn draw_labels(&self, labels: &[Label], projector: &Projector, pixel_ratio: f64) {
		let ctx = &self.ctx;
		ctx.set_fill_style_str("rgba(255, 255, 255, 0.8)");
		ctx.set_font(&format!("{}px sans-serif", LABEL_FONT_PX * pixel_ratio));
		for label in labels {
			if let Some(p) = projector.project(label.position) {
				let _ = ctx.fill_text(label.text, p.x + 6.0 * pixel_ratio, p.y + 3.0 * pixel_ratio);
			}
		}
	}
}

impl RenderBackend for CanvasBackend {
	type Texture = HtmlImageElement;

	fn surface(&self) -> Surface {
		let rect = self.canvas.get_bounding_client_rect();
		let pixel_ratio = web_sys::window().map_or(1.0, |w| w.device_pixel_ratio());
		Surface {
			left: rect.left(),
			top: rect.top(),
			width: rect.width(),
			height: rect.height(),
			pixel_ratio: if pixel_ratio > 0.0 { pixel_ratio } else { 1.0 },
		}
	}

	fn render(
		&mut self,
		scene: &Scene<'_, HtmlImageElement>,
		camera: &Camera,
		target: RenderTarget,
	) -> Result<()> {
		let surface = self.surface();
		if target == RenderTarget::Screen {
			self.fit_backing_store(&surface);
		}
		let (width, height) = target.size(&surface);
		let projector = Projector::new(camera, (width, height));
		let ctx = self.context(target);

		ctx.set_fill_style_str(&scene.background.to_css());
		ctx.fill_rect(0.0, 0.0, width as f64, height as f64);

		if let Some(edges) = &scene.edges {
			self.draw_edges(ctx, edges, &projector);
		}

		let mut sprites: Vec<SpriteDraw> = Vec::new();
		for batch in &scene.sprites {
			for (position, color) in batch.positions.iter().zip(batch.colors) {
				let Some(p) = projector.project(*position) else {
					continue;
				};
				sprites.push(SpriteDraw {
					x: p.x,
					y: p.y,
					depth: p.depth,
					size: projector.sprite_size(batch.size, p.depth),
					color: *color,
					texture: batch.texture,
				});
			}
		}
		sprites.sort_by(|a, b| b.depth.total_cmp(&a.depth));

		match target {
			RenderTarget::Screen => {
				for sprite in &sprites {
					self.draw_sprite(ctx, sprite)?;
				}
				self.draw_labels(&scene.labels, &projector, surface.pixel_ratio);
			}
			RenderTarget::Pick => {
				// Flat fills of the single pixel, so it holds an exact index color.
				for sprite in &sprites {
					if sprite_covers(sprite.x, sprite.y, sprite.size, 0.5, 0.5) {
						ctx.set_fill_style_str(&sprite.color.to_css());
						ctx.fill_rect(0.0, 0.0, 1.0, 1.0);
					}
				}
			}
		}
		Ok(())
	}

	fn read_pixels(
		&mut self,
		target: RenderTarget,
		x: u32,
		y: u32,
		width: u32,
		height: u32,
	) -> Result<Vec<u8>> {
		let image = self
			.context(target)
			.get_image_data(x as f64, y as f64, width as f64, height as f64)
			.map_err(|e| ViewerError::PixelReadback(describe(&e)))?;
		Ok(image.data().0)
	}
}

fn context_2d(canvas: &HtmlCanvasElement) -> Result<CanvasRenderingContext2d> {
	canvas
		.get_context("2d")
		.map_err(|e| ViewerError::Backend(describe(&e)))?
		.ok_or_else(|| ViewerError::Backend("2d context unavailable".into()))?
		.dyn_into()
		.map_err(|_| ViewerError::Backend("unexpected context type".into()))
}
