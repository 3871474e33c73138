use glam::{Mat4, Vec3, Vec4};

use super::types::ViewerConfig;

/// Distance from a single focused node to the camera.
pub const DEFAULT_FOCUS_DISTANCE: f32 = 300.0;
/// Outward step while fitting several nodes into view.
pub const FOCUS_STEP: f32 = 50.0;
pub const MAX_FOCUS_DISTANCE: f32 = 8_000.0;
/// The fit test uses a slightly narrower field of view than the live camera.
pub const FOCUS_FOV_MARGIN: f32 = 0.9;

/// Sub-rectangle of the full surface rendered into a smaller target, in device pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewOffset {
	pub full_width: u32,
	pub full_height: u32,
	pub x: u32,
	pub y: u32,
	pub width: u32,
	pub height: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
	pub position: Vec3,
	pub up: Vec3,
	/// Point the camera looks at and orbits around.
	pub target: Vec3,
	/// Vertical field of view in degrees.
	pub fov: f32,
	pub aspect: f32,
	pub near: f32,
	pub far: f32,
	view_offset: Option<ViewOffset>,
}

impl Camera {
	pub fn new(config: &ViewerConfig, aspect: f32) -> Self {
		Self {
			position: Vec3::new(0.0, 0.0, 1000.0),
			up: Vec3::Y,
			target: Vec3::ZERO,
			fov: config.fov,
			aspect,
			near: config.near,
			far: config.far,
			view_offset: None,
		}
	}

	pub fn set_view_offset(&mut self, offset: ViewOffset) {
		self.view_offset = Some(offset);
	}

	pub fn clear_view_offset(&mut self) {
		self.view_offset = None;
	}

	pub fn view_offset(&self) -> Option<ViewOffset> {
		self.view_offset
	}

	pub fn distance(&self) -> f32 {
		self.position.distance(self.target)
	}

	pub fn view_matrix(&self) -> Mat4 {
		let forward = (self.target - self.position).normalize_or_zero();
		let up = if forward != Vec3::ZERO && forward.cross(self.up).length_squared() < 1e-8 {
			// Looking straight along `up`: pick any perpendicular axis.
			forward.any_orthonormal_vector()
		} else {
			self.up
		};
		Mat4::look_at_rh(self.position, self.target, up)
	}

	pub fn projection_matrix(&self) -> Mat4 {
		let mut top = self.near * (self.fov.to_radians() * 0.5).tan();
		let mut height = 2.0 * top;
		let mut width = self.aspect * height;
		let mut left = -0.5 * width;

		if let Some(view) = self.view_offset {
			let (full_w, full_h) = (view.full_width.max(1) as f32, view.full_height.max(1) as f32);
			left += view.x as f32 * width / full_w;
			top -= view.y as f32 * height / full_h;
			width *= view.width as f32 / full_w;
			height *= view.height as f32 / full_h;
		}

		perspective(left, left + width, top, top - height, self.near, self.far)
	}

	pub fn view_projection(&self) -> Mat4 {
		self.projection_matrix() * self.view_matrix()
	}

	pub fn frustum(&self) -> Frustum {
		Frustum::from_matrix(self.view_projection())
	}
}

fn perspective(left: f32, right: f32, top: f32, bottom: f32, near: f32, far: f32) -> Mat4 {
	let x = 2.0 * near / (right - left);
	let y = 2.0 * near / (top - bottom);
	let a = (right + left) / (right - left);
	let b = (top + bottom) / (top - bottom);
	let c = -(far + near) / (far - near);
	let d = -2.0 * far * near / (far - near);
	Mat4::from_cols(
		Vec4::new(x, 0.0, 0.0, 0.0),
		Vec4::new(0.0, y, 0.0, 0.0),
		Vec4::new(a, b, c, -1.0),
		Vec4::new(0.0, 0.0, d, 0.0),
	)
}

/// Six clip planes, normals pointing inwards.
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
	planes: [Vec4; 6],
}

impl Frustum {
	pub fn from_matrix(m: Mat4) -> Self {
		let (r0, r1, r2, r3) = (m.row(0), m.row(1), m.row(2), m.row(3));
		let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r3 + r2, r3 - r2].map(|plane| {
			let len = plane.truncate().length();
			if len > 0.0 { plane / len } else { plane }
		});
		Self { planes }
	}

	pub fn contains_point(&self, point: Vec3) -> bool {
		self.planes
			.iter()
			.all(|plane| plane.truncate().dot(point) + plane.w >= 0.0)
	}
}

/// Timed linear interpolation between two camera poses.
#[derive(Clone, Debug, PartialEq)]
pub struct FlyTo {
	from_position: Vec3,
	from_up: Vec3,
	to_position: Vec3,
	to_up: Vec3,
	look_at: Vec3,
	start_ms: f64,
	duration_ms: f64,
}

impl FlyTo {
	pub fn new(
		camera: &Camera,
		position: Vec3,
		up: Vec3,
		look_at: Vec3,
		duration_ms: f64,
		now_ms: f64,
	) -> Self {
		Self {
			from_position: camera.position,
			from_up: camera.up,
			to_position: position,
			to_up: up,
			look_at,
			start_ms: now_ms,
			duration_ms,
		}
	}

	pub fn destination(&self) -> Vec3 {
		self.to_position
	}

	pub fn progress(&self, now_ms: f64) -> f32 {
		if self.duration_ms <= 0.0 {
			return 1.0;
		}
		((now_ms - self.start_ms) / self.duration_ms).clamp(0.0, 1.0) as f32
	}

	/// Position and up at `now_ms`; the flag is set once the end pose is reached.
	pub fn sample(&self, now_ms: f64) -> (Vec3, Vec3, bool) {
		let p = self.progress(now_ms);
		if p >= 1.0 {
			return (self.to_position, self.to_up, true);
		}
		(
			self.from_position.lerp(self.to_position, p),
			self.from_up.lerp(self.to_up, p),
			false,
		)
	}

	/// Moves the camera to the pose at `now_ms`. Returns `true` when the flight is over.
	pub fn apply(&self, camera: &mut Camera, now_ms: f64) -> bool {
		let (position, up, done) = self.sample(now_ms);
		camera.position = position;
		camera.up = up;
		camera.target = self.look_at;
		done
	}
}

/// Camera position that frames `points`, looking at the world origin.
///
/// The camera sits on the ray from the origin through the centroid. One point is viewed from
/// [`DEFAULT_FOCUS_DISTANCE`]; for more, the camera backs off in [`FOCUS_STEP`] increments
/// until a slightly narrower frustum holds every point or [`MAX_FOCUS_DISTANCE`] is hit.
pub fn focus_position(points: &[Vec3], camera: &Camera) -> Option<Vec3> {
	if points.is_empty() {
		return None;
	}
	let centroid = points.iter().copied().sum::<Vec3>() / points.len() as f32;
	let direction = match centroid.try_normalize() {
		Some(direction) => direction,
		None => Vec3::Z,
	};
	if points.len() == 1 {
		return Some(centroid + direction * DEFAULT_FOCUS_DISTANCE);
	}

	let mut candidate = camera.clone();
	candidate.clear_view_offset();
	candidate.fov = camera.fov * FOCUS_FOV_MARGIN;
	candidate.up = Vec3::Y;
	candidate.target = Vec3::ZERO;

	let mut distance = DEFAULT_FOCUS_DISTANCE;
	loop {
		candidate.position = centroid + direction * distance;
		let frustum = candidate.frustum();
		if distance >= MAX_FOCUS_DISTANCE || points.iter().all(|p| frustum.contains_point(*p)) {
			return Some(candidate.position);
		}
		distance = (distance + FOCUS_STEP).min(MAX_FOCUS_DISTANCE);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn camera() -> Camera {
		Camera::new(&ViewerConfig::default(), 1.5)
	}

	fn close(a: Vec3, b: Vec3) -> bool {
		a.distance(b) < 1e-3
	}

	#[test]
	fn frustum_sees_what_is_in_front() {
		let cam = camera();
		let frustum = cam.frustum();
		assert!(frustum.contains_point(Vec3::ZERO));
		assert!(frustum.contains_point(Vec3::new(100.0, 50.0, 0.0)));
		assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 2000.0)));
		assert!(!frustum.contains_point(Vec3::new(5000.0, 0.0, 0.0)));
	}

	#[test]
	fn short_far_plane_limits_range() {
		let mut cam = camera();
		cam.far = 500.0;
		assert!(!cam.frustum().contains_point(Vec3::ZERO));
		assert!(cam.frustum().contains_point(Vec3::new(0.0, 0.0, 600.0)));
	}

	#[test]
	fn view_offset_centers_the_selected_pixel() {
		let mut cam = camera();
		let (w, h) = (300u32, 200u32);
		cam.aspect = w as f32 / h as f32;
		// Where does a world point land on the full surface?
		let point = Vec3::new(120.0, -40.0, 0.0);
		let clip = cam.view_projection() * point.extend(1.0);
		let px = ((clip.x / clip.w + 1.0) * 0.5 * w as f32).floor() as u32;
		let py = ((1.0 - clip.y / clip.w) * 0.5 * h as f32).floor() as u32;

		cam.set_view_offset(ViewOffset {
			full_width: w,
			full_height: h,
			x: px,
			y: py,
			width: 1,
			height: 1,
		});
		let clip = cam.view_projection() * point.extend(1.0);
		assert!((clip.x / clip.w).abs() <= 1.0);
		assert!((clip.y / clip.w).abs() <= 1.0);

		cam.clear_view_offset();
		assert_eq!(cam.view_offset(), None);
	}

	#[test]
	fn fly_interpolates_linearly_then_snaps() {
		let mut cam = camera();
		cam.position = Vec3::new(0.0, 0.0, 100.0);
		cam.up = Vec3::Y;
		let fly = FlyTo::new(
			&cam,
			Vec3::new(100.0, 200.0, -100.0),
			Vec3::X,
			Vec3::ZERO,
			1000.0,
			5000.0,
		);

		let (pos, up, done) = fly.sample(5250.0);
		assert!(!done);
		assert_eq!(pos, Vec3::new(0.0, 0.0, 100.0).lerp(Vec3::new(100.0, 200.0, -100.0), 0.25));
		assert_eq!(up, Vec3::Y.lerp(Vec3::X, 0.25));

		let (pos, _, done) = fly.sample(4000.0);
		assert_eq!(pos, Vec3::new(0.0, 0.0, 100.0));
		assert!(!done);

		assert!(fly.apply(&mut cam, 6000.0));
		assert_eq!(cam.position, Vec3::new(100.0, 200.0, -100.0));
		assert_eq!(cam.up, Vec3::X);
		assert_eq!(cam.target, Vec3::ZERO);
	}

	#[test]
	fn zero_duration_lands_immediately() {
		let cam = camera();
		let fly = FlyTo::new(&cam, Vec3::ONE, Vec3::Y, Vec3::ZERO, 0.0, 10.0);
		assert_eq!(fly.progress(10.0), 1.0);
		assert!(fly.sample(10.0).2);
	}

	#[test]
	fn single_node_focus_uses_default_offset() {
		let node = Vec3::new(30.0, 40.0, 0.0);
		let position = focus_position(&[node], &camera()).unwrap();
		let expected = node + node.normalize() * DEFAULT_FOCUS_DISTANCE;
		assert!(close(position, expected));
	}

	#[test]
	fn focus_at_origin_falls_back_to_z() {
		let position = focus_position(&[Vec3::ZERO], &camera()).unwrap();
		assert!(close(position, Vec3::Z * DEFAULT_FOCUS_DISTANCE));
		assert_eq!(focus_position(&[], &camera()), None);
	}

	#[test]
	fn multi_node_focus_fits_every_point() {
		let cam = camera();
		let points = [
			Vec3::new(400.0, 0.0, 200.0),
			Vec3::new(-300.0, 100.0, 250.0),
			Vec3::new(0.0, -350.0, 150.0),
		];
		let position = focus_position(&points, &cam).unwrap();

		let mut check = cam.clone();
		check.position = position;
		check.target = Vec3::ZERO;
		check.up = Vec3::Y;
		let frustum = check.frustum();
		assert!(points.iter().all(|p| frustum.contains_point(*p)));
		let centroid = points.iter().copied().sum::<Vec3>() / 3.0;
		assert!(position.distance(centroid) >= DEFAULT_FOCUS_DISTANCE - 1e-3);
		assert!(position.distance(centroid) <= MAX_FOCUS_DISTANCE + 1e-3);
	}

	#[test]
	fn view_matrix_survives_up_parallel_to_view() {
		let mut cam = camera();
		cam.position = Vec3::new(0.0, 500.0, 0.0);
		cam.up = Vec3::Y;
		assert!(!cam.view_matrix().is_nan());
	}
}
