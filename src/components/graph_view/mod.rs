//! Interactive 3D graph view: geometry building, index-color picking, selection highlighting,
//! camera controls and the viewer session tying them together.

mod backend;
mod builder;
mod camera;
mod canvas;
mod component;
mod controls;
mod error;
mod events;
mod picker;
mod selection;
#[cfg(test)]
mod testing;
mod textures;
mod types;
mod viewport;

pub use backend::{RenderBackend, RenderTarget, Scene, Surface};
pub use builder::{GraphBuild, NodeRecord, build, build_capped};
pub use camera::{Camera, FlyTo, focus_position};
pub use canvas::CanvasBackend;
pub use component::{GraphViewport, ViewerHandle};
pub use controls::{
	CameraController, ControlEvent, ControlFactory, ControlState, PointerButton, TrackballControls,
};
pub use error::{Result, ViewerError};
pub use picker::{IndexPicker, PointerSample};
pub use selection::{SelectionEvent, SelectionManager};
pub use textures::{ImageLoader, TextureLoader};
pub use types::{
	AttributeFilter, ColorOverrides, ColorTable, DataRequest, FilterValues, GraphData, GraphLink,
	GraphNode, NodeTexture, Rgb, ViewerConfig,
};
pub use viewport::{PendingLoad, Viewer, load_data, load_json};
