use std::collections::HashSet;

use log::debug;

use super::builder::{GraphBuild, NodeRecord};
use super::events::Observers;
use super::types::{AttributeFilter, ColorTable, Rgb};

/// Emitted on every `select`, carrying the full records of the selected nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionEvent {
	pub nodes: Vec<NodeRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Highlight {
	Resting,
	Selected,
	Hovered,
}

/// Persistent selection plus transient hover, painted straight into the color buffers.
#[derive(Default)]
pub struct SelectionManager {
	selected: Vec<usize>,
	selected_set: HashSet<usize>,
	hover: Option<usize>,
	observers: Observers<SelectionEvent>,
}

impl SelectionManager {
	pub fn selected(&self) -> &[usize] {
		&self.selected
	}

	pub fn hovered(&self) -> Option<usize> {
		self.hover
	}

	pub fn is_selected(&self, index: usize) -> bool {
		self.selected_set.contains(&index)
	}

	pub fn subscribe(&mut self, observer: impl FnMut(&SelectionEvent) + 'static) {
		self.observers.subscribe(observer);
	}

	/// Moves the hover highlight. Emits nothing.
	pub fn hover(&mut self, graph: &mut GraphBuild, palette: &ColorTable, index: Option<usize>) {
		let index = index.filter(|&i| i < graph.node_count());
		if self.hover == index {
			return;
		}
		let previous = std::mem::replace(&mut self.hover, index);
		if let Some(previous) = previous {
			self.paint_node(graph, palette, previous);
		}
		if let Some(index) = index {
			self.paint_node(graph, palette, index);
		}
	}

	/// Selects `indices` in caller order. With `replace`, the old selection is restored first;
	/// otherwise the indices are appended.
	pub fn select(
		&mut self,
		graph: &mut GraphBuild,
		palette: &ColorTable,
		indices: &[usize],
		replace: bool,
	) {
		if replace {
			let previous = std::mem::take(&mut self.selected);
			self.selected_set.clear();
			for index in previous {
				self.paint_node(graph, palette, index);
			}
		}
		for &index in indices {
			if index >= graph.node_count() {
				debug!("ignoring selection of unknown node index {}", index);
				continue;
			}
			if self.selected_set.insert(index) {
				self.selected.push(index);
			}
		}
		// Selection shows even under the pointer; hover takes over again once it moves.
		for &index in &self.selected {
			paint_selected(graph, palette, index);
		}

		let event = SelectionEvent {
			nodes: self
				.selected
				.iter()
				.filter_map(|&i| graph.node(i).cloned())
				.collect(),
		};
		self.observers.emit(&event);
	}

	/// Selects every node matching any attribute/value pair and returns the matches.
	pub fn select_by_attributes(
		&mut self,
		graph: &mut GraphBuild,
		palette: &ColorTable,
		filter: &AttributeFilter,
	) -> Vec<usize> {
		let matches: Vec<usize> = graph
			.nodes
			.iter()
			.filter(|node| {
				filter.iter().any(|(key, accepted)| {
					node.attribute(key)
						.is_some_and(|value| accepted.as_slice().iter().any(|a| a == value))
				})
			})
			.map(|node| node.index)
			.collect();
		self.select(graph, palette, &matches, true);
		matches
	}

	/// Repaints every node and edge, e.g. after the palette changed.
	pub fn repaint_all(&self, graph: &mut GraphBuild, palette: &ColorTable) {
		for index in 0..graph.node_count() {
			let color = self.node_color(graph, palette, index);
			graph.node_geometry.colors.set(index, color);
		}
		for edge in 0..graph.edge_geometry.edge_count() {
			let (start, end) = self.edge_colors(graph, palette, edge);
			graph.edge_geometry.colors.set(2 * edge, start);
			graph.edge_geometry.colors.set(2 * edge + 1, end);
		}
	}

	/// Forgets all state without repainting; used when the graph is replaced.
	pub(crate) fn reset(&mut self) -> bool {
		let had_selection = !self.selected.is_empty();
		self.selected.clear();
		self.selected_set.clear();
		self.hover = None;
		had_selection
	}

	pub(crate) fn emit_current(&mut self, graph: Option<&GraphBuild>) {
		let nodes = graph
			.map(|g| {
				self.selected
					.iter()
					.filter_map(|&i| g.node(i).cloned())
					.collect()
			})
			.unwrap_or_default();
		self.observers.emit(&SelectionEvent { nodes });
	}

	fn highlight(&self, index: usize) -> Highlight {
		if self.hover == Some(index) {
			Highlight::Hovered
		} else if self.is_selected(index) {
			Highlight::Selected
		} else {
			Highlight::Resting
		}
	}

	fn node_color(&self, graph: &GraphBuild, palette: &ColorTable, index: usize) -> Rgb {
		match self.highlight(index) {
			Highlight::Hovered => palette.hover_node,
			Highlight::Selected => palette.select_node,
			Highlight::Resting => graph.resting_color(index, palette),
		}
	}

	/// An edge takes the strongest highlight of its two endpoints.
	fn edge_colors(&self, graph: &GraphBuild, palette: &ColorTable, edge: usize) -> (Rgb, Rgb) {
		let (source, target) = graph.edge_geometry.endpoints[edge];
		let (a, b) = (self.highlight(source), self.highlight(target));
		if a == Highlight::Hovered || b == Highlight::Hovered {
			(palette.hover_start, palette.hover_end)
		} else if a == Highlight::Selected || b == Highlight::Selected {
			(palette.select_start, palette.select_end)
		} else {
			(palette.connection_start, palette.connection_end)
		}
	}

	fn paint_node(&self, graph: &mut GraphBuild, palette: &ColorTable, index: usize) {
		let Some(node) = graph.nodes.get(index) else {
			return;
		};
		let color = self.node_color(graph, palette, index);
		let paints: Vec<_> = node
			.connections
			.iter()
			.map(|c| (c.start_slot, c.end_slot, self.edge_colors(graph, palette, c.edge)))
			.collect();

		graph.node_geometry.colors.set(index, color);
		for (start_slot, end_slot, (start, end)) in paints {
			graph.edge_geometry.colors.set(start_slot, start);
			graph.edge_geometry.colors.set(end_slot, end);
		}
	}
}

fn paint_selected(graph: &mut GraphBuild, palette: &ColorTable, index: usize) {
	let Some(node) = graph.nodes.get(index) else {
		return;
	};
	for connection in &node.connections {
		graph.edge_geometry.colors.set(connection.start_slot, palette.select_start);
		graph.edge_geometry.colors.set(connection.end_slot, palette.select_end);
	}
	graph.node_geometry.colors.set(index, palette.select_node);
}
