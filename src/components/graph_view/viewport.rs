//! The viewer session: owns the graph buffers, camera, controls and selection, and exposes the
//! control surface the host calls into.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec3;
use log::{debug, info, warn};

use super::backend::{EdgeBatch, Label, RenderBackend, RenderTarget, Scene, SpriteBatch};
use super::builder::{GraphBuild, NodeRecord, build_capped};
use super::camera::{Camera, FlyTo, focus_position};
use super::controls::{
	CameraController, ControlEvent, ControlFactory, ControlState, PointerButton, TrackballControls,
};
use super::error::{Result, ViewerError};
use super::events::Observers;
use super::picker::{IndexPicker, PointerSample};
use super::selection::{SelectionEvent, SelectionManager};
use super::textures::{TextureLoader, load_all};
use super::types::{AttributeFilter, ColorOverrides, DataRequest, NodeTexture, Rgb, ViewerConfig};

/// Pointer travel in CSS pixels after which a press no longer counts as a click.
pub const DRAG_THRESHOLD: f64 = 4.0;

#[derive(Clone, Copy, Debug)]
struct Press {
	button: PointerButton,
	x: f64,
	y: f64,
	dragged: bool,
}

/// A built data set waiting for its textures.
#[derive(Debug)]
pub struct PendingLoad {
	generation: u64,
	graph: GraphBuild,
}

impl PendingLoad {
	pub fn generation(&self) -> u64 {
		self.generation
	}

	pub fn textures(&self) -> &[NodeTexture] {
		&self.graph.textures
	}
}

pub struct Viewer<B: RenderBackend> {
	backend: B,
	config: ViewerConfig,
	camera: Camera,
	controls: Box<dyn CameraController>,
	control_events: Rc<RefCell<Vec<ControlEvent>>>,
	fly: Option<FlyTo>,
	clock_ms: f64,
	generation: u64,
	graph: Option<GraphBuild>,
	textures: Vec<B::Texture>,
	picker: IndexPicker,
	selection: SelectionManager,
	labels: Vec<usize>,
	press: Option<Press>,
	node_click: Observers<NodeRecord>,
	camera_update: Observers<Camera>,
}

impl<B: RenderBackend> Viewer<B> {
	pub fn new(backend: B, config: ViewerConfig) -> Self {
		let surface = backend.surface();
		let camera = Camera::new(&config, surface.aspect());
		let controls = TrackballControls::factory(&camera, surface, &config);
		let mut viewer = Self {
			backend,
			config,
			camera,
			controls,
			control_events: Rc::new(RefCell::new(Vec::new())),
			fly: None,
			clock_ms: 0.0,
			generation: 0,
			graph: None,
			textures: Vec::new(),
			picker: IndexPicker::default(),
			selection: SelectionManager::default(),
			labels: Vec::new(),
			press: None,
			node_click: Observers::default(),
			camera_update: Observers::default(),
		};
		viewer.listen_to_controls();
		viewer
	}

	pub fn backend(&self) -> &B {
		&self.backend
	}

	pub fn config(&self) -> &ViewerConfig {
		&self.config
	}

	pub fn camera(&self) -> &Camera {
		&self.camera
	}

	pub fn graph(&self) -> Option<&GraphBuild> {
		self.graph.as_ref()
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}

	pub fn selected(&self) -> &[usize] {
		self.selection.selected()
	}

	pub fn hovered(&self) -> Option<usize> {
		self.selection.hovered()
	}

	pub fn visible_labels(&self) -> &[usize] {
		&self.labels
	}

	pub fn is_flying(&self) -> bool {
		self.fly.is_some()
	}

	pub fn control_state(&self) -> ControlState {
		self.controls.state()
	}

	pub fn on_select(&mut self, observer: impl FnMut(&SelectionEvent) + 'static) {
		self.selection.subscribe(observer);
	}

	pub fn on_node_click(&mut self, observer: impl FnMut(&NodeRecord) + 'static) {
		self.node_click.subscribe(observer);
	}

	/// Called with the camera after each manual interaction ends.
	pub fn on_camera_update(&mut self, observer: impl FnMut(&Camera) + 'static) {
		self.camera_update.subscribe(observer);
	}

	/// Builds the geometry for `request` and makes it the newest load.
	/// A request that fails to build leaves any load already in flight current.
	pub fn prepare_load(&mut self, request: &DataRequest) -> Result<PendingLoad> {
		let graph = build_capped(
			&request.graph_data,
			&request.node_textures,
			request.node_size,
			&self.config.colors,
			self.config.max_nodes,
		)?;
		self.generation += 1;
		debug!(
			"prepared load {} with {} sprites pending",
			self.generation,
			graph.textures.len()
		);
		Ok(PendingLoad {
			generation: self.generation,
			graph,
		})
	}

	/// Swaps in a prepared data set, unless a newer load has started since.
	pub fn commit_load(&mut self, pending: PendingLoad, textures: Vec<B::Texture>) -> Result<()> {
		if pending.generation != self.generation {
			warn!(
				"discarding load {}, load {} is newer",
				pending.generation, self.generation
			);
			return Err(ViewerError::Superseded {
				generation: pending.generation,
				current: self.generation,
			});
		}

		let had_selection = self.selection.reset();
		let mut graph = pending.graph;
		self.selection.repaint_all(&mut graph, &self.config.colors);
		info!(
			"showing {} nodes and {} edges in {} groups",
			graph.node_count(),
			graph.edge_geometry.edge_count(),
			graph.partitions.len()
		);
		self.graph = Some(graph);
		self.textures = textures;
		self.press = None;
		if had_selection {
			self.selection.emit_current(self.graph.as_ref());
		}
		self.refresh_labels();
		Ok(())
	}

	/// Advances the session by `dt_ms` and renders one frame.
	pub fn tick(&mut self, dt_ms: f64) -> Result<()> {
		self.clock_ms += dt_ms.max(0.0);
		let landed = self
			.fly
			.as_ref()
			.map(|fly| fly.apply(&mut self.camera, self.clock_ms));
		match landed {
			Some(true) => {
				self.fly = None;
				self.controls.halt(&self.camera);
			}
			Some(false) => {}
			None => {
				self.controls.update(&mut self.camera);
			}
		}
		self.flush_control_events();
		self.refresh_labels();
		self.render()
	}

	pub fn render(&mut self) -> Result<()> {
		let scene = visible_scene(
			self.graph.as_ref(),
			&self.textures,
			&self.labels,
			self.config.colors.background,
		);
		self.backend
			.render(&scene, &self.camera, RenderTarget::Screen)?;
		if let Some(graph) = self.graph.as_mut() {
			graph.node_geometry.colors.mark_clean();
			graph.edge_geometry.colors.mark_clean();
		}
		Ok(())
	}

	/// Node under a client coordinate, if any.
	pub fn pick_at(&mut self, client_x: f64, client_y: f64) -> Option<usize> {
		let graph = self.graph.as_ref()?;
		let pointer = PointerSample::new(client_x, client_y);
		match self
			.picker
			.pick(&mut self.backend, &mut self.camera, graph, pointer)
		{
			Ok(index) => index,
			Err(err) => {
				warn!("pick failed: {}", err);
				None
			}
		}
	}

	pub fn pointer_down(&mut self, button: PointerButton, client_x: f64, client_y: f64) {
		self.press = Some(Press {
			button,
			x: client_x,
			y: client_y,
			dragged: false,
		});
		self.controls.pointer_down(button, client_x, client_y);
		self.flush_control_events();
	}

	pub fn pointer_move(&mut self, client_x: f64, client_y: f64) {
		self.controls.pointer_move(client_x, client_y);
		match self.press.as_mut() {
			Some(press) => {
				let travel = (client_x - press.x).hypot(client_y - press.y);
				if travel > DRAG_THRESHOLD {
					press.dragged = true;
				}
			}
			None => {
				let hit = self.pick_at(client_x, client_y);
				self.hover(hit);
			}
		}
	}

	pub fn pointer_up(&mut self, client_x: f64, client_y: f64) {
		self.controls.pointer_up();
		if let Some(press) = self.press.take() {
			if press.button == PointerButton::Primary && !press.dragged {
				self.click(client_x, client_y);
			}
		}
		self.flush_control_events();
	}

	pub fn pointer_leave(&mut self) {
		self.controls.pointer_up();
		self.press = None;
		self.hover(None);
		self.flush_control_events();
	}

	pub fn wheel(&mut self, delta_y: f64) {
		self.controls.wheel(delta_y);
		self.flush_control_events();
	}

	pub fn touch_start(&mut self, touches: &[[f64; 2]]) {
		self.controls.touch_start(touches);
		self.flush_control_events();
	}

	pub fn touch_move(&mut self, touches: &[[f64; 2]]) {
		self.controls.touch_move(touches);
	}

	pub fn touch_end(&mut self, touches: &[[f64; 2]]) {
		self.controls.touch_end(touches);
		self.flush_control_events();
	}

	/// Re-reads the surface size after the host resized it.
	pub fn resize(&mut self) {
		let surface = self.backend.surface();
		self.camera.aspect = surface.aspect();
		self.controls.handle_resize(surface);
	}

	pub fn hover(&mut self, index: Option<usize>) {
		if let Some(graph) = self.graph.as_mut() {
			self.selection.hover(graph, &self.config.colors, index);
		}
	}

	/// Replaces the selection with `indices`, in order.
	pub fn select(&mut self, indices: &[usize]) {
		self.select_with(indices, true);
	}

	pub fn select_with(&mut self, indices: &[usize], replace: bool) {
		match self.graph.as_mut() {
			Some(graph) => self
				.selection
				.select(graph, &self.config.colors, indices, replace),
			None => self.selection.emit_current(None),
		}
	}

	/// Selects every node matching `filter` and flies the camera to frame them.
	pub fn select_by(&mut self, filter: &AttributeFilter) -> Vec<usize> {
		let Some(graph) = self.graph.as_mut() else {
			self.selection.emit_current(None);
			return Vec::new();
		};
		let matches = self
			.selection
			.select_by_attributes(graph, &self.config.colors, filter);
		if !matches.is_empty() {
			self.focus_on(&matches);
		}
		matches
	}

	/// Flies to a position framing the given nodes. Returns `false` if there was nothing to frame.
	pub fn focus_on(&mut self, indices: &[usize]) -> bool {
		let Some(graph) = self.graph.as_ref() else {
			return false;
		};
		let points: Vec<Vec3> = indices
			.iter()
			.filter_map(|&i| graph.node(i))
			.map(|node| Vec3::from(node.position))
			.collect();
		let Some(position) = focus_position(&points, &self.camera) else {
			return false;
		};
		self.fly_to(position, Vec3::Y, Vec3::ZERO, self.config.fly_duration_ms);
		true
	}

	pub fn fly_to(&mut self, position: Vec3, up: Vec3, look_at: Vec3, duration_ms: f64) {
		self.fly = Some(FlyTo::new(
			&self.camera,
			position,
			up,
			look_at,
			duration_ms,
			self.clock_ms,
		));
		self.controls.halt(&self.camera);
	}

	/// Places the camera immediately, cancelling any flight.
	pub fn set_camera(&mut self, position: Vec3, up: Option<Vec3>, target: Option<Vec3>) {
		self.fly = None;
		self.camera.position = position;
		if let Some(up) = up {
			self.camera.up = up;
		}
		if let Some(target) = target {
			self.camera.target = target;
		}
		self.controls.halt(&self.camera);
	}

	pub fn set_camera_controls(&mut self, factory: &ControlFactory) {
		self.controls.dispose();
		self.controls = factory(&self.camera, self.backend.surface(), &self.config);
		self.listen_to_controls();
	}

	pub fn set_colors(&mut self, overrides: &ColorOverrides) {
		self.config.colors.apply(overrides);
		if let Some(graph) = self.graph.as_mut() {
			self.selection.repaint_all(graph, &self.config.colors);
		}
	}

	pub fn set_background_color(&mut self, color: Rgb) {
		self.config.colors.background = color;
	}

	pub fn set_label_distance(&mut self, distance: f32) {
		self.config.label_distance = distance.max(0.0);
		self.refresh_labels();
	}

	/// Returns whether labels are now shown.
	pub fn toggle_labels(&mut self) -> bool {
		self.config.labels_visible = !self.config.labels_visible;
		self.refresh_labels();
		self.config.labels_visible
	}

	/// Shows or hides one group. Returns its new visibility, `None` for an unknown group.
	pub fn toggle_node_type(&mut self, group: &str) -> Option<bool> {
		let graph = self.graph.as_mut()?;
		let partition = graph.partitions.iter_mut().find(|p| p.group == group)?;
		partition.visible = !partition.visible;
		let visible = partition.visible;
		if self.selection.hovered().is_some_and(|h| !graph.is_visible(h)) {
			self.hover(None);
		}
		self.refresh_labels();
		Some(visible)
	}

	fn click(&mut self, client_x: f64, client_y: f64) {
		let Some(index) = self.pick_at(client_x, client_y) else {
			return;
		};
		self.select(&[index]);
		if let Some(record) = self.graph.as_ref().and_then(|g| g.node(index)).cloned() {
			self.node_click.emit(&record);
		}
	}

	fn listen_to_controls(&mut self) {
		let sink = self.control_events.clone();
		self.controls.subscribe(Box::new(move |event| {
			if *event == ControlEvent::End {
				sink.borrow_mut().push(*event);
			}
		}));
		self.controls.halt(&self.camera);
	}

	fn flush_control_events(&mut self) {
		let events: Vec<_> = self.control_events.borrow_mut().drain(..).collect();
		for event in events {
			if event == ControlEvent::End {
				self.camera_update.emit(&self.camera);
			}
		}
	}

	/// Labels for visible nodes closer than the label distance and inside the view.
	fn refresh_labels(&mut self) {
		self.labels.clear();
		let Some(graph) = self.graph.as_ref() else {
			return;
		};
		if !self.config.labels_visible {
			return;
		}
		let mut label_camera = self.camera.clone();
		label_camera.clear_view_offset();
		label_camera.far = self.config.label_distance.max(label_camera.near * 1.001);
		let frustum = label_camera.frustum();
		for partition in graph.partitions.iter().filter(|p| p.visible) {
			for index in partition.range() {
				let position = Vec3::from(graph.node_geometry.positions[index]);
				if frustum.contains_point(position) {
					self.labels.push(index);
				}
			}
		}
	}
}

/// Starts a data load, waits for its textures and composes it into the session.
///
/// The session is only borrowed around the synchronous steps. A load overtaken by a newer one
/// fails with [`ViewerError::Superseded`]; a texture failure leaves the current data in place.
pub async fn load_data<B, L>(
	session: &Rc<RefCell<Viewer<B>>>,
	loader: &L,
	request: &DataRequest,
) -> Result<()>
where
	B: RenderBackend,
	L: TextureLoader<Texture = B::Texture>,
{
	let pending = session.borrow_mut().prepare_load(request)?;
	match load_all(loader, pending.textures()).await {
		Ok(textures) => session.borrow_mut().commit_load(pending, textures),
		Err(err) => {
			warn!("load {} failed: {}", pending.generation(), err);
			Err(err)
		}
	}
}

/// [`load_data`] for a request still in its JSON wire form. Malformed input fails with
/// [`ViewerError::InvalidData`] before anything is prepared.
pub async fn load_json<B, L>(
	session: &Rc<RefCell<Viewer<B>>>,
	loader: &L,
	text: &str,
) -> Result<()>
where
	B: RenderBackend,
	L: TextureLoader<Texture = B::Texture>,
{
	let request = DataRequest::from_json(text)?;
	load_data(session, loader, &request).await
}

fn visible_scene<'a, T>(
	graph: Option<&'a GraphBuild>,
	textures: &'a [T],
	labels: &[usize],
	background: Rgb,
) -> Scene<'a, T> {
	let mut scene = Scene::empty(background);
	let Some(graph) = graph else {
		return scene;
	};
	let edges = &graph.edge_geometry;
	scene.edges = Some(EdgeBatch {
		positions: &edges.positions,
		colors: edges.colors.as_slice(),
		dirty: edges.colors.is_dirty(),
	});
	let nodes = &graph.node_geometry;
	scene.sprites = graph
		.partitions
		.iter()
		.filter(|p| p.visible && p.count > 0)
		.map(|p| SpriteBatch {
			positions: &nodes.positions[p.range()],
			colors: &nodes.colors.as_slice()[p.range()],
			texture: p.texture.and_then(|i| textures.get(i)),
			size: graph.node_size,
			dirty: nodes.colors.is_dirty(),
		})
		.collect();
	scene.labels = labels
		.iter()
		.filter_map(|&i| graph.node(i))
		.map(|node| Label {
			position: node.position,
			text: if node.name.is_empty() {
				&node.id
			} else {
				&node.name
			},
		})
		.collect();
	scene
}
