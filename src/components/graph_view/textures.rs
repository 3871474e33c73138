use std::future::Future;
use std::pin::Pin;

use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;
use web_sys::HtmlImageElement;

use super::error::{Result, ViewerError};
use super::types::NodeTexture;

/// Image decode service producing texture handles.
pub trait TextureLoader {
	type Texture;
	/// Started by `load`; resolves to the texture or a failure reason.
	type Pending: Future<Output = std::result::Result<Self::Texture, String>>;

	fn load(&self, url: &str) -> Self::Pending;
}

/// Starts every load at once, then waits for all of them. The first failure wins.
pub async fn load_all<L: TextureLoader>(
	loader: &L,
	descriptors: &[NodeTexture],
) -> Result<Vec<L::Texture>> {
	let pending: Vec<_> = descriptors
		.iter()
		.map(|d| (d, loader.load(&d.sprite)))
		.collect();
	let mut textures = Vec::with_capacity(pending.len());
	for (descriptor, load) in pending {
		let texture = load.await.map_err(|reason| ViewerError::TextureLoad {
			group: descriptor.group.clone(),
			url: descriptor.sprite.clone(),
			reason,
		})?;
		textures.push(texture);
	}
	Ok(textures)
}

/// Decodes sprites with `HtmlImageElement::decode`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageLoader;

impl TextureLoader for ImageLoader {
	type Texture = HtmlImageElement;
	type Pending = Pin<Box<dyn Future<Output = std::result::Result<HtmlImageElement, String>>>>;

	fn load(&self, url: &str) -> Self::Pending {
		let image = match HtmlImageElement::new() {
			Ok(image) => image,
			Err(err) => {
				let reason = describe(&err);
				return Box::pin(async move { Err(reason) });
			}
		};
		image.set_cross_origin(Some("anonymous"));
		image.set_src(url);
		let decode = JsFuture::from(image.decode());
		Box::pin(async move {
			decode.await.map_err(|err| describe(&err))?;
			Ok(image)
		})
	}
}

pub(crate) fn describe(err: &JsValue) -> String {
	err.as_string()
		.or_else(|| {
			js_sys::Reflect::get(err, &JsValue::from_str("message"))
				.ok()
				.and_then(|m| m.as_string())
		})
		.unwrap_or_else(|| format!("{:?}", err))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::graph_view::testing::ReadyLoader;

	fn descriptor(group: &str, sprite: &str) -> NodeTexture {
		NodeTexture {
			group: group.into(),
			sprite: sprite.into(),
			color: None,
		}
	}

	#[test]
	fn resolves_in_descriptor_order() {
		let loader = ReadyLoader::accepting(&["a.png", "b.png"]);
		let textures = pollster::block_on(load_all(
			&loader,
			&[descriptor("b", "b.png"), descriptor("a", "a.png")],
		))
		.unwrap();
		assert_eq!(textures, vec!["texture:b.png", "texture:a.png"]);
	}

	#[test]
	fn failure_names_the_group() {
		let loader = ReadyLoader::accepting(&["a.png"]);
		let err = pollster::block_on(load_all(
			&loader,
			&[descriptor("a", "a.png"), descriptor("z", "missing.png")],
		))
		.unwrap_err();
		match err {
			ViewerError::TextureLoad { group, url, .. } => {
				assert_eq!(group, "z");
				assert_eq!(url, "missing.png");
			}
			other => panic!("unexpected error {other}"),
		}
	}
}
