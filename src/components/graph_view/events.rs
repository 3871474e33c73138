/// Ordered list of callbacks notified with `&T`.
pub struct Observers<T> {
	entries: Vec<Box<dyn FnMut(&T)>>,
}

impl<T> Default for Observers<T> {
	fn default() -> Self {
		Self {
			entries: Vec::new(),
		}
	}
}

impl<T> Observers<T> {
	pub fn subscribe(&mut self, observer: impl FnMut(&T) + 'static) {
		self.entries.push(Box::new(observer));
	}

	pub fn emit(&mut self, event: &T) {
		for observer in &mut self.entries {
			observer(event);
		}
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}
}
