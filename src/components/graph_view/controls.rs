//! Manual camera controls.
//!
//! [`CameraController`] is the capability the viewer drives each frame; [`TrackballControls`]
//! is the default implementation. Input handlers only record deltas. The camera moves in
//! [`CameraController::update`], which also applies damping and the distance clamp.

use glam::{Quat, Vec2, Vec3};

use super::backend::Surface;
use super::camera::Camera;
use super::events::Observers;
use super::types::ViewerConfig;

const CHANGE_EPSILON: f32 = 1e-6;
const WHEEL_ZOOM_SCALE: f32 = 0.000_25;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlState {
	Idle,
	Rotate,
	Zoom,
	Pan,
	TouchRotate,
	TouchZoomPan,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointerButton {
	Primary,
	Middle,
	Secondary,
}

impl PointerButton {
	/// Maps `MouseEvent.button`.
	pub fn from_dom(button: i16) -> Option<Self> {
		match button {
			0 => Some(PointerButton::Primary),
			1 => Some(PointerButton::Middle),
			2 => Some(PointerButton::Secondary),
			_ => None,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlAction {
	Rotate,
	Zoom,
	Pan,
}

/// Which action each pointer button starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ButtonMap {
	pub primary: Option<ControlAction>,
	pub middle: Option<ControlAction>,
	pub secondary: Option<ControlAction>,
}

impl Default for ButtonMap {
	fn default() -> Self {
		Self {
			primary: Some(ControlAction::Rotate),
			middle: Some(ControlAction::Zoom),
			secondary: Some(ControlAction::Pan),
		}
	}
}

impl ButtonMap {
	pub fn action(&self, button: PointerButton) -> Option<ControlAction> {
		match button {
			PointerButton::Primary => self.primary,
			PointerButton::Middle => self.middle,
			PointerButton::Secondary => self.secondary,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlEvent {
	/// The camera moved during `update`.
	Change,
	/// A manual interaction began.
	Start,
	/// A manual interaction ended.
	End,
}

pub trait CameraController {
	fn state(&self) -> ControlState;

	/// Applies pending input to the camera. Returns `true` when the camera moved.
	fn update(&mut self, camera: &mut Camera) -> bool;

	fn handle_resize(&mut self, surface: Surface);

	fn dispose(&mut self);

	/// Drops residual motion, e.g. after the camera was placed programmatically.
	fn halt(&mut self, camera: &Camera);

	fn pointer_down(&mut self, button: PointerButton, x: f64, y: f64);

	fn pointer_move(&mut self, x: f64, y: f64);

	fn pointer_up(&mut self);

	/// Wheel delta in pixels, positive away from the user.
	fn wheel(&mut self, delta_y: f64);

	fn touch_start(&mut self, touches: &[[f64; 2]]);

	fn touch_move(&mut self, touches: &[[f64; 2]]);

	/// Called with the contacts that remain.
	fn touch_end(&mut self, touches: &[[f64; 2]]);

	fn subscribe(&mut self, observer: Box<dyn FnMut(&ControlEvent)>);
}

/// Builds a controller for the current camera and surface.
pub type ControlFactory = dyn Fn(&Camera, Surface, &ViewerConfig) -> Box<dyn CameraController>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackballSettings {
	pub rotate_speed: f32,
	pub zoom_speed: f32,
	pub pan_speed: f32,
	pub damping_factor: f32,
	pub static_moving: bool,
	pub min_distance: f32,
	pub max_distance: f32,
}

impl From<&ViewerConfig> for TrackballSettings {
	fn from(config: &ViewerConfig) -> Self {
		Self {
			rotate_speed: config.rotate_speed,
			zoom_speed: config.zoom_speed,
			pan_speed: config.pan_speed,
			damping_factor: config.damping_factor,
			static_moving: config.static_moving,
			min_distance: config.min_distance,
			max_distance: config.max_distance,
		}
	}
}

pub struct TrackballControls {
	pub settings: TrackballSettings,
	pub buttons: ButtonMap,
	pub enabled: bool,
	surface: Surface,
	state: ControlState,
	move_prev: Vec2,
	move_curr: Vec2,
	last_axis: Vec3,
	last_angle: f32,
	zoom_start: Vec2,
	zoom_end: Vec2,
	touch_zoom_start: f32,
	touch_zoom_end: f32,
	pan_start: Vec2,
	pan_end: Vec2,
	last_position: Option<Vec3>,
	observers: Observers<ControlEvent>,
}

impl TrackballControls {
	pub fn new(settings: TrackballSettings, surface: Surface) -> Self {
		Self {
			settings,
			buttons: ButtonMap::default(),
			enabled: true,
			surface,
			state: ControlState::Idle,
			move_prev: Vec2::ZERO,
			move_curr: Vec2::ZERO,
			last_axis: Vec3::ZERO,
			last_angle: 0.0,
			zoom_start: Vec2::ZERO,
			zoom_end: Vec2::ZERO,
			touch_zoom_start: 0.0,
			touch_zoom_end: 0.0,
			pan_start: Vec2::ZERO,
			pan_end: Vec2::ZERO,
			last_position: None,
			observers: Observers::default(),
		}
	}

	/// Default [`ControlFactory`].
	pub fn factory(
		_camera: &Camera,
		surface: Surface,
		config: &ViewerConfig,
	) -> Box<dyn CameraController> {
		Box::new(Self::new(TrackballSettings::from(config), surface))
	}

	fn on_screen(&self, x: f64, y: f64) -> Vec2 {
		let s = &self.surface;
		Vec2::new(
			((x - s.left) / s.width.max(1.0)) as f32,
			((y - s.top) / s.height.max(1.0)) as f32,
		)
	}

	fn on_circle(&self, x: f64, y: f64) -> Vec2 {
		let s = &self.surface;
		let half = (s.width * 0.5).max(0.5);
		Vec2::new(
			((x - s.width * 0.5 - s.left) / half) as f32,
			((s.height + 2.0 * (s.top - y)) / s.width.max(1.0)) as f32,
		)
	}

	fn rotate(&mut self, eye: &mut Vec3, up: &mut Vec3) {
		let delta = self.move_curr - self.move_prev;
		let mut angle = delta.length();

		if angle > 0.0 {
			let eye_direction = eye.normalize_or_zero();
			let up_direction = up.normalize_or_zero();
			let sideways = up_direction.cross(eye_direction).normalize_or_zero();
			let direction = up_direction * delta.y + sideways * delta.x;
			let axis = direction.cross(*eye).normalize_or_zero();
			angle *= self.settings.rotate_speed;
			if axis != Vec3::ZERO {
				let rotation = Quat::from_axis_angle(axis, angle);
				*eye = rotation * *eye;
				*up = rotation * *up;
				self.last_axis = axis;
				self.last_angle = angle;
			}
		} else if !self.settings.static_moving && self.last_angle != 0.0 {
			self.last_angle *= (1.0 - self.settings.damping_factor).sqrt();
			if self.last_angle.abs() < CHANGE_EPSILON {
				self.last_angle = 0.0;
			} else {
				let rotation = Quat::from_axis_angle(self.last_axis, self.last_angle);
				*eye = rotation * *eye;
				*up = rotation * *up;
			}
		}
		self.move_prev = self.move_curr;
	}

	fn zoom(&mut self, eye: &mut Vec3) {
		if self.state == ControlState::TouchZoomPan {
			if self.touch_zoom_end > 0.0 {
				let factor = self.touch_zoom_start / self.touch_zoom_end;
				self.touch_zoom_start = self.touch_zoom_end;
				*eye *= factor;
			}
			return;
		}
		let factor = 1.0 + (self.zoom_end.y - self.zoom_start.y) * self.settings.zoom_speed;
		if factor != 1.0 && factor > 0.0 {
			*eye *= factor;
		}
		if self.settings.static_moving {
			self.zoom_start = self.zoom_end;
		} else {
			let remaining = self.zoom_end.y - self.zoom_start.y;
			self.zoom_start.y += remaining * self.settings.damping_factor;
		}
	}

	fn pan(&mut self, camera: &mut Camera, eye: Vec3) {
		let change = self.pan_end - self.pan_start;
		if change.length_squared() <= 0.0 {
			return;
		}
		let change = change * eye.length() * self.settings.pan_speed;
		let pan = eye.cross(camera.up).normalize_or_zero() * change.x
			+ camera.up.normalize_or_zero() * change.y;
		camera.target += pan;
		if self.settings.static_moving {
			self.pan_start = self.pan_end;
		} else {
			self.pan_start += (self.pan_end - self.pan_start) * self.settings.damping_factor;
		}
	}

	fn clamp_distance(&mut self, camera: &mut Camera) {
		let eye = camera.position - camera.target;
		let distance = eye.length();
		let (min, max) = (self.settings.min_distance, self.settings.max_distance);
		if (min..=max).contains(&distance) {
			return;
		}
		let direction = if distance > f32::EPSILON {
			eye / distance
		} else {
			// Eye on the target: back off perpendicular to `up`.
			camera.up.try_normalize().map_or(Vec3::Z, |up| up.any_orthonormal_vector())
		};
		camera.position = camera.target + direction * distance.clamp(min, max);
		self.zoom_start = self.zoom_end;
	}

	fn touch_midpoint(touches: &[[f64; 2]]) -> (f64, f64) {
		let [a, b] = [touches[0], touches[1]];
		((a[0] + b[0]) * 0.5, (a[1] + b[1]) * 0.5)
	}

	fn touch_distance(touches: &[[f64; 2]]) -> f32 {
		let [a, b] = [touches[0], touches[1]];
		((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt() as f32
	}
}

impl CameraController for TrackballControls {
	fn state(&self) -> ControlState {
		self.state
	}

	fn update(&mut self, camera: &mut Camera) -> bool {
		let mut eye = camera.position - camera.target;
		let mut up = camera.up;
		self.rotate(&mut eye, &mut up);
		camera.up = up;
		self.zoom(&mut eye);
		self.pan(camera, eye);
		camera.position = camera.target + eye;
		self.clamp_distance(camera);

		let changed = self
			.last_position
			.is_none_or(|last| last.distance_squared(camera.position) > CHANGE_EPSILON);
		if changed {
			self.last_position = Some(camera.position);
			self.observers.emit(&ControlEvent::Change);
		}
		changed
	}

	fn handle_resize(&mut self, surface: Surface) {
		self.surface = surface;
	}

	fn dispose(&mut self) {
		self.enabled = false;
		self.state = ControlState::Idle;
		self.observers.clear();
	}

	fn halt(&mut self, camera: &Camera) {
		self.move_prev = self.move_curr;
		self.last_angle = 0.0;
		self.zoom_start = self.zoom_end;
		self.touch_zoom_start = self.touch_zoom_end;
		self.pan_start = self.pan_end;
		self.last_position = Some(camera.position);
	}

	fn pointer_down(&mut self, button: PointerButton, x: f64, y: f64) {
		if !self.enabled || self.state != ControlState::Idle {
			return;
		}
		let Some(action) = self.buttons.action(button) else {
			return;
		};
		match action {
			ControlAction::Rotate => {
				self.state = ControlState::Rotate;
				self.move_curr = self.on_circle(x, y);
				self.move_prev = self.move_curr;
			}
			ControlAction::Zoom => {
				self.state = ControlState::Zoom;
				self.zoom_start = self.on_screen(x, y);
				self.zoom_end = self.zoom_start;
			}
			ControlAction::Pan => {
				self.state = ControlState::Pan;
				self.pan_start = self.on_screen(x, y);
				self.pan_end = self.pan_start;
			}
		}
		self.observers.emit(&ControlEvent::Start);
	}

	fn pointer_move(&mut self, x: f64, y: f64) {
		if !self.enabled {
			return;
		}
		match self.state {
			ControlState::Rotate => {
				self.move_prev = self.move_curr;
				self.move_curr = self.on_circle(x, y);
			}
			ControlState::Zoom => self.zoom_end = self.on_screen(x, y),
			ControlState::Pan => self.pan_end = self.on_screen(x, y),
			_ => {}
		}
	}

	fn pointer_up(&mut self) {
		if !self.enabled || self.state == ControlState::Idle {
			return;
		}
		self.state = ControlState::Idle;
		self.observers.emit(&ControlEvent::End);
	}

	fn wheel(&mut self, delta_y: f64) {
		if !self.enabled {
			return;
		}
		self.zoom_start.y -= delta_y as f32 * WHEEL_ZOOM_SCALE;
		self.observers.emit(&ControlEvent::Start);
		self.observers.emit(&ControlEvent::End);
	}

	fn touch_start(&mut self, touches: &[[f64; 2]]) {
		if !self.enabled || touches.is_empty() {
			return;
		}
		if touches.len() == 1 {
			self.state = ControlState::TouchRotate;
			self.move_curr = self.on_circle(touches[0][0], touches[0][1]);
			self.move_prev = self.move_curr;
		} else {
			self.state = ControlState::TouchZoomPan;
			self.touch_zoom_start = Self::touch_distance(touches);
			self.touch_zoom_end = self.touch_zoom_start;
			let (x, y) = Self::touch_midpoint(touches);
			self.pan_start = self.on_screen(x, y);
			self.pan_end = self.pan_start;
		}
		self.observers.emit(&ControlEvent::Start);
	}

	fn touch_move(&mut self, touches: &[[f64; 2]]) {
		if !self.enabled || touches.is_empty() {
			return;
		}
		if touches.len() == 1 {
			self.move_prev = self.move_curr;
			self.move_curr = self.on_circle(touches[0][0], touches[0][1]);
		} else {
			self.touch_zoom_end = Self::touch_distance(touches);
			let (x, y) = Self::touch_midpoint(touches);
			self.pan_end = self.on_screen(x, y);
		}
	}

	fn touch_end(&mut self, touches: &[[f64; 2]]) {
		if !self.enabled {
			return;
		}
		match touches.len() {
			0 => self.state = ControlState::Idle,
			1 => {
				self.state = ControlState::TouchRotate;
				self.move_curr = self.on_circle(touches[0][0], touches[0][1]);
				self.move_prev = self.move_curr;
			}
			_ => self.state = ControlState::TouchZoomPan,
		}
		self.observers.emit(&ControlEvent::End);
	}

	fn subscribe(&mut self, observer: Box<dyn FnMut(&ControlEvent)>) {
		self.observers.subscribe(observer);
	}
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::rc::Rc;

	use super::*;

	fn setup(static_moving: bool) -> (TrackballControls, Camera) {
		let config = ViewerConfig {
			static_moving,
			..ViewerConfig::default()
		};
		let surface = Surface::default();
		let mut camera = Camera::new(&config, surface.aspect());
		camera.position = Vec3::new(0.0, 0.0, 500.0);
		let controls = TrackballControls::new(TrackballSettings::from(&config), surface);
		(controls, camera)
	}

	#[test]
	fn buttons_enter_mapped_states() {
		let (mut controls, _) = setup(false);
		controls.pointer_down(PointerButton::Primary, 400.0, 300.0);
		assert_eq!(controls.state(), ControlState::Rotate);
		controls.pointer_up();
		assert_eq!(controls.state(), ControlState::Idle);

		controls.buttons.secondary = Some(ControlAction::Rotate);
		controls.pointer_down(PointerButton::Secondary, 400.0, 300.0);
		assert_eq!(controls.state(), ControlState::Rotate);
		controls.pointer_up();

		controls.pointer_down(PointerButton::Middle, 400.0, 300.0);
		assert_eq!(controls.state(), ControlState::Zoom);
	}

	#[test]
	fn rotation_keeps_distance_and_moves_camera() {
		let (mut controls, mut camera) = setup(true);
		controls.update(&mut camera);
		let before = camera.position;

		controls.pointer_down(PointerButton::Primary, 400.0, 300.0);
		controls.pointer_move(480.0, 300.0);
		assert!(controls.update(&mut camera));
		controls.pointer_up();

		assert!(camera.position.distance(before) > 1.0);
		assert!((camera.distance() - 500.0).abs() < 1e-2);
	}

	#[test]
	fn damping_decays_rotation() {
		let (mut controls, mut camera) = setup(false);
		controls.update(&mut camera);
		controls.pointer_down(PointerButton::Primary, 400.0, 300.0);
		controls.pointer_move(440.0, 300.0);
		controls.update(&mut camera);
		controls.pointer_up();

		let mut steps = Vec::new();
		for _ in 0..5 {
			let before = camera.position;
			controls.update(&mut camera);
			steps.push(camera.position.distance(before));
		}
		assert!(steps[0] > 0.0);
		assert!(steps.windows(2).all(|w| w[1] < w[0]));

		let (mut rigid, mut camera) = setup(true);
		rigid.update(&mut camera);
		rigid.pointer_down(PointerButton::Primary, 400.0, 300.0);
		rigid.pointer_move(440.0, 300.0);
		rigid.update(&mut camera);
		rigid.pointer_up();
		assert!(!rigid.update(&mut camera));
	}

	#[test]
	fn zoom_is_clamped_to_distance_range() {
		let (mut controls, mut camera) = setup(false);
		for _ in 0..200 {
			controls.wheel(2000.0);
			controls.update(&mut camera);
			assert!(camera.distance() <= controls.settings.max_distance + 1e-2);
		}
		assert!((camera.distance() - controls.settings.max_distance).abs() < 1e-1);

		for _ in 0..400 {
			controls.wheel(-2000.0);
			controls.update(&mut camera);
			assert!(camera.distance() >= controls.settings.min_distance - 1e-3);
		}
	}

	#[test]
	fn camera_on_its_target_is_pushed_out_to_min_distance() {
		let (mut controls, mut camera) = setup(false);
		camera.target = Vec3::splat(5.0);
		camera.position = camera.target;
		controls.update(&mut camera);
		let distance = camera.distance();
		assert!((distance - controls.settings.min_distance).abs() < 1e-3);
		assert!(camera.position.is_finite());
		assert!((camera.position - camera.target).dot(camera.up).abs() < 1e-3);
	}

	#[test]
	fn pan_moves_target_and_camera_together() {
		let (mut controls, mut camera) = setup(true);
		controls.pointer_down(PointerButton::Secondary, 400.0, 300.0);
		controls.pointer_move(500.0, 300.0);
		controls.update(&mut camera);
		controls.pointer_up();

		assert!(camera.target.x.abs() > 1.0);
		assert!((camera.distance() - 500.0).abs() < 1e-2);
	}

	#[test]
	fn two_touches_zoom_by_spread() {
		let (mut controls, mut camera) = setup(true);
		controls.touch_start(&[[300.0, 300.0], [500.0, 300.0]]);
		assert_eq!(controls.state(), ControlState::TouchZoomPan);
		controls.touch_move(&[[200.0, 300.0], [600.0, 300.0]]);
		controls.update(&mut camera);
		assert!((camera.distance() - 250.0).abs() < 1e-1);

		controls.touch_end(&[[200.0, 300.0]]);
		assert_eq!(controls.state(), ControlState::TouchRotate);
		controls.touch_end(&[]);
		assert_eq!(controls.state(), ControlState::Idle);
	}

	#[test]
	fn start_and_end_are_announced() {
		let (mut controls, _) = setup(false);
		let events = Rc::new(RefCell::new(Vec::new()));
		let sink = events.clone();
		controls.subscribe(Box::new(move |e| sink.borrow_mut().push(*e)));

		controls.pointer_down(PointerButton::Primary, 10.0, 10.0);
		controls.pointer_up();
		controls.wheel(10.0);
		assert_eq!(
			*events.borrow(),
			vec![
				ControlEvent::Start,
				ControlEvent::End,
				ControlEvent::Start,
				ControlEvent::End
			]
		);
	}
}
