use leptos::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::CustomEvent;

use crate::components::graph_view::{
	AttributeFilter, DataRequest, FilterValues, GraphData, GraphLink, GraphNode, GraphViewport,
	NodeTexture, Rgb, ViewerHandle,
};

const GROUPS: [(&str, u32); 3] = [("service", 0x4fc3f7), ("client", 0xffb74d), ("store", 0x81c784)];

/// White disc with a ring, tinted per vertex by the viewer.
fn sprite_url() -> String {
	let svg = "<svg xmlns='http://www.w3.org/2000/svg' width='64' height='64'>\
		<circle cx='32' cy='32' r='30' fill='white'/>\
		<circle cx='32' cy='32' r='20' fill='none' stroke='%23999' stroke-width='4'/>\
		</svg>";
	format!("data:image/svg+xml;utf8,{}", svg)
}

/// Random tree laid out on nested shells, one shell per depth bucket.
fn generate_sample_data(n: usize) -> DataRequest {
	let nodes: Vec<GraphNode> = (0..n)
		.map(|i| {
			let radius = 150.0 + 60.0 * (i as f32).sqrt();
			let theta = (rand_simple(i * 3) * std::f64::consts::TAU) as f32;
			let phi = (rand_simple(i * 3 + 1) * 2.0 - 1.0).acos() as f32;
			GraphNode {
				id: i.to_string(),
				position: [
					radius * phi.sin() * theta.cos(),
					radius * phi.cos(),
					radius * phi.sin() * theta.sin(),
				],
				group: GROUPS[i % GROUPS.len()].0.to_string(),
				name: format!("Node {}", i),
				color: None,
			}
		})
		.collect();

	let links: Vec<GraphLink> = (1..n)
		.map(|i| {
			let target = (rand_simple(i) * (i as f64)) as usize;
			GraphLink {
				source: i.to_string(),
				target: target.to_string(),
			}
		})
		.collect();

	let node_textures = GROUPS
		.iter()
		.map(|(group, color)| NodeTexture {
			group: group.to_string(),
			sprite: sprite_url(),
			color: Some(Rgb::from_hex(*color)),
		})
		.collect();

	DataRequest {
		graph_data: GraphData { nodes, links },
		node_textures,
		node_size: 14.0,
	}
}

/// Simple pseudo-random number generator (deterministic for consistency).
fn rand_simple(seed: usize) -> f64 {
	let x = ((seed + 1) * 9301 + 49297) % 233280;
	(x as f64) / 233280.0
}

/// Default Home Page
#[component]
pub fn Home() -> impl IntoView {
	let data = Signal::derive(move || Some(generate_sample_data(300)));
	// ErrorBoundary children must be Send, so the Rc-backed handle lives in local storage.
	let handle = StoredValue::new_local(ViewerHandle::default());
	let (status, set_status) = signal(String::from("Click a node to select it."));

	let toggle_labels = move |_| {
		handle.with_value(|h| h.with(|v| v.toggle_labels()));
	};

	let select_stores = move |_| {
		let mut filter = AttributeFilter::new();
		filter.insert("g".into(), FilterValues::One("store".into()));
		handle.with_value(|h| h.with(|v| v.select_by(&filter)));
	};

	let toggle_clients = move |_| {
		handle.with_value(|h| h.with(|v| v.toggle_node_type("client")));
	};

	let on_select = move |ev: web_sys::Event| {
		let Some(ev) = ev.dyn_ref::<CustomEvent>() else {
			return;
		};
		let count = js_sys::Array::from(&ev.detail()).length();
		set_status.set(format!("{} selected", count));
	};

	view! {
		<ErrorBoundary fallback=|errors| {
			view! {
				<h1>"Uh oh! Something went wrong!"</h1>

				<p>"Errors: "</p>
				<ul>
					{move || {
						errors
							.get()
							.into_iter()
							.map(|(_, e)| view! { <li>{e.to_string()}</li> })
							.collect_view()
					}}
				</ul>
			}
		}>

			<div class="graph-page" on:select=on_select>
				<GraphViewport data=data handle=handle.get_value() />
				<div class="graph-overlay">
					<h1>"Graph Viewport"</h1>
					<p class="subtitle">
						"Drag to rotate, right-drag to pan, scroll to zoom. " {move || status.get()}
					</p>
					<button on:click=toggle_labels>"Labels"</button>
					<button on:click=select_stores>"Select stores"</button>
					<button on:click=toggle_clients>"Hide clients"</button>
				</div>
			</div>
		</ErrorBoundary>
	}
}
