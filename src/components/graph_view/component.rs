use std::cell::RefCell;
use std::rc::Rc;

use leptos::prelude::*;
use log::{error, warn};
use wasm_bindgen::prelude::*;
use web_sys::{
	CustomEvent, CustomEventInit, HtmlCanvasElement, HtmlElement, MouseEvent, TouchEvent,
	WheelEvent, Window,
};

use super::canvas::CanvasBackend;
use super::controls::PointerButton;
use super::textures::ImageLoader;
use super::types::{DataRequest, ViewerConfig};
use super::viewport::{Viewer, load_data, load_json};

type Session = Rc<RefCell<Viewer<CanvasBackend>>>;

/// Shared access to the viewer behind a [`GraphViewport`], for hosts that drive it directly.
#[derive(Clone, Default)]
pub struct ViewerHandle(Rc<RefCell<Option<Session>>>);

impl ViewerHandle {
	/// Runs `f` against the viewer. `None` until the canvas is mounted.
	pub fn with<R>(&self, f: impl FnOnce(&mut Viewer<CanvasBackend>) -> R) -> Option<R> {
		let session = self.session()?;
		let mut viewer = session.borrow_mut();
		Some(f(&mut viewer))
	}

	pub fn is_ready(&self) -> bool {
		self.0.borrow().is_some()
	}

	fn session(&self) -> Option<Session> {
		self.0.borrow().clone()
	}
}

/// Dispatches a bubbling `CustomEvent` named `name` with a JSON `detail`.
fn dispatch(target: &HtmlElement, name: &str, detail: &impl serde::Serialize) {
	let detail = match serde_json::to_string(detail).map(|json| js_sys::JSON::parse(&json)) {
		Ok(Ok(detail)) => detail,
		Ok(Err(_)) | Err(_) => {
			warn!("could not encode `{}` event detail", name);
			return;
		}
	};
	let init = CustomEventInit::new();
	init.set_bubbles(true);
	init.set_detail(&detail);
	if let Ok(event) = CustomEvent::new_with_event_init_dict(name, &init) {
		let _ = target.dispatch_event(&event);
	}
}

fn touch_points(ev: &TouchEvent) -> Vec<[f64; 2]> {
	let touches = ev.touches();
	(0..touches.length())
		.filter_map(|i| touches.item(i))
		.map(|t| [t.client_x() as f64, t.client_y() as f64])
		.collect()
}

/// Interactive 3D graph view. Emits `select`, `nodeclick` and `cameraupdate` DOM events from its
/// container element.
///
/// `json` takes a data set still in its wire form, for hosts that fetch it as text.
#[component]
pub fn GraphViewport(
	#[prop(into)] data: Signal<Option<DataRequest>>,
	#[prop(optional, into)] json: Option<Signal<Option<String>>>,
	#[prop(optional)] config: Option<ViewerConfig>,
	#[prop(optional)] handle: Option<ViewerHandle>,
) -> impl IntoView {
	let container_ref = NodeRef::<leptos::html::Div>::new();
	let canvas_ref = NodeRef::<leptos::html::Canvas>::new();
	let handle = handle.unwrap_or_default();
	let (ready, set_ready) = signal(false);
	let animate: Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>> = Rc::new(RefCell::new(None));
	let resize_cb: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
	let (handle_init, animate_init, resize_cb_init) =
		(handle.clone(), animate.clone(), resize_cb.clone());

	Effect::new(move |_| {
		let (Some(canvas), Some(container)) = (canvas_ref.get(), container_ref.get()) else {
			return;
		};
		if handle_init.is_ready() {
			return;
		}
		let canvas: HtmlCanvasElement = canvas.into();
		let container: HtmlElement = container.into();
		let Some(window) = web_sys::window() else {
			return;
		};

		let backend = match CanvasBackend::new(canvas) {
			Ok(backend) => backend,
			Err(err) => {
				error!("graph viewport unavailable: {}", err);
				return;
			}
		};
		let mut viewer = Viewer::new(backend, config.clone().unwrap_or_default());

		let target = container.clone();
		viewer.on_select(move |event| dispatch(&target, "select", &event.nodes));
		let target = container.clone();
		viewer.on_node_click(move |node| dispatch(&target, "nodeclick", node));
		let target = container;
		viewer.on_camera_update(move |camera| {
			let detail = serde_json::json!({
				"position": camera.position.to_array(),
				"up": camera.up.to_array(),
				"target": camera.target.to_array(),
			});
			dispatch(&target, "cameraupdate", &detail);
		});

		let session: Session = Rc::new(RefCell::new(viewer));
		*handle_init.0.borrow_mut() = Some(session.clone());

		let session_resize = session.clone();
		*resize_cb_init.borrow_mut() = Some(Closure::new(move || {
			session_resize.borrow_mut().resize();
		}));
		if let Some(ref cb) = *resize_cb_init.borrow() {
			let _ = window.add_event_listener_with_callback("resize", cb.as_ref().unchecked_ref());
		}

		let (session_anim, animate_inner) = (session, animate_init.clone());
		let mut last_frame: Option<f64> = None;
		*animate_init.borrow_mut() = Some(Closure::new(move |now: f64| {
			let dt = last_frame.map_or(0.0, |last| now - last);
			last_frame = Some(now);
			if let Err(err) = session_anim.borrow_mut().tick(dt) {
				warn!("frame skipped: {}", err);
			}
			if let Some(ref cb) = *animate_inner.borrow() {
				let window: Option<Window> = web_sys::window();
				if let Some(window) = window {
					let _ = window.request_animation_frame(cb.as_ref().unchecked_ref());
				}
			}
		}));
		if let Some(ref cb) = *animate_init.borrow() {
			let _ = window.request_animation_frame(cb.as_ref().unchecked_ref());
		}
		set_ready.set(true);
	});

	let handle_data = handle.clone();
	Effect::new(move |_| {
		let request = data.get();
		if !ready.get() {
			return;
		}
		let (Some(request), Some(session)) = (request, handle_data.session()) else {
			return;
		};
		wasm_bindgen_futures::spawn_local(async move {
			if let Err(err) = load_data(&session, &ImageLoader, &request).await {
				warn!("data set not shown: {}", err);
			}
		});
	});

	let handle_json = handle.clone();
	Effect::new(move |_| {
		let text = json.and_then(|json| json.get());
		if !ready.get() {
			return;
		}
		let (Some(text), Some(session)) = (text, handle_json.session()) else {
			return;
		};
		wasm_bindgen_futures::spawn_local(async move {
			if let Err(err) = load_json(&session, &ImageLoader, &text).await {
				warn!("data set not shown: {}", err);
			}
		});
	});

	let handle_md = handle.clone();
	let on_mousedown = move |ev: MouseEvent| {
		let Some(button) = PointerButton::from_dom(ev.button()) else {
			return;
		};
		handle_md.with(|v| v.pointer_down(button, ev.client_x() as f64, ev.client_y() as f64));
	};

	let handle_mm = handle.clone();
	let on_mousemove = move |ev: MouseEvent| {
		handle_mm.with(|v| v.pointer_move(ev.client_x() as f64, ev.client_y() as f64));
	};

	let handle_mu = handle.clone();
	let on_mouseup = move |ev: MouseEvent| {
		handle_mu.with(|v| v.pointer_up(ev.client_x() as f64, ev.client_y() as f64));
	};

	let handle_ml = handle.clone();
	let on_mouseleave = move |_: MouseEvent| {
		handle_ml.with(|v| v.pointer_leave());
	};

	let handle_wh = handle.clone();
	let on_wheel = move |ev: WheelEvent| {
		ev.prevent_default();
		handle_wh.with(|v| v.wheel(ev.delta_y()));
	};

	let handle_ts = handle.clone();
	let on_touchstart = move |ev: TouchEvent| {
		ev.prevent_default();
		let touches = touch_points(&ev);
		handle_ts.with(|v| v.touch_start(&touches));
	};

	let handle_tm = handle.clone();
	let on_touchmove = move |ev: TouchEvent| {
		ev.prevent_default();
		let touches = touch_points(&ev);
		handle_tm.with(|v| v.touch_move(&touches));
	};

	let handle_te = handle;
	let on_touchend = move |ev: TouchEvent| {
		let touches = touch_points(&ev);
		handle_te.with(|v| v.touch_end(&touches));
	};

	view! {
		<div node_ref=container_ref class="graph-viewport" style="width: 100%; height: 100%;">
			<canvas
				node_ref=canvas_ref
				on:mousedown=on_mousedown
				on:mousemove=on_mousemove
				on:mouseup=on_mouseup
				on:mouseleave=on_mouseleave
				on:wheel=on_wheel
				on:touchstart=on_touchstart
				on:touchmove=on_touchmove
				on:touchend=on_touchend
				on:contextmenu=|ev: MouseEvent| ev.prevent_default()
				style="display: block; width: 100%; height: 100%; cursor: grab; touch-action: none;"
			/>
		</div>
	}
}
