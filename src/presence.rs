use std::collections::BTreeMap;

use log::info;

use crate::common::Serial;



#[derive(Clone)]
#[derive(Debug)]
pub struct CameraEntry<R> {
	pub status: R,
	/// Reported since the start of the current poll cycle.
	pub seen: bool,
}

/// Cameras currently known behind a registrator, with mark/sweep liveness.
pub struct Presence<R> {
	cameras: BTreeMap<Serial, CameraEntry<R>>,
}

impl<R: Clone + Default> Presence<R> {
	pub fn new() -> Self {
		Presence { cameras: BTreeMap::new() }
	}

	/// Starts a new cycle: nothing has been seen yet.
	pub fn unmark_all(&mut self) {
		for entry in self.cameras.values_mut() {
			entry.seen = false;
		}
	}

	/// Stores the status for `serial`. Returns true if the camera just appeared.
	pub fn record(&mut self, serial: Serial, status: R) -> bool {
		match self.cameras.get_mut(&serial) {
			Some(entry) => {
				entry.status = status;
				entry.seen = true;
				false
			},
			None => {
				// New cameras count as seen only from their next report
				info!("Camera {} appeared", serial);
				self.cameras.insert(serial, CameraEntry { status, seen: false });
				true
			}
		}
	}

	/// Drops every camera not seen in the current cycle and returns how many went away.
	pub fn sweep(&mut self) -> usize {
		let stale: Vec<Serial> = self.cameras.iter()
			.filter(|(_, entry)| !entry.seen)
			.map(|(serial, _)| serial.clone())
			.collect();

		for serial in &stale {
			self.cameras.remove(serial);
			info!("Camera {} disappeared", serial);
		}
		stale.len()
	}

	/// Forgets all cameras. Returns true if any were known.
	pub fn clear(&mut self) -> bool {
		let had_cameras = !self.cameras.is_empty();
		self.cameras.clear();
		had_cameras
	}

	pub fn serials(&self) -> Vec<Serial> {
		self.cameras.keys().cloned().collect()
	}

	pub fn get(&self, serial: &str) -> Option<&CameraEntry<R>> {
		self.cameras.get(serial)
	}

	/// Status for `serial`, or the default status if unknown.
	/// An empty serial selects the first known camera.
	pub fn status(&self, serial: &str) -> R {
		let entry = if serial.is_empty() {
			self.cameras.values().next()
		} else {
			self.cameras.get(serial)
		};
		entry.map(|entry| entry.status.clone()).unwrap_or_default()
	}

	pub fn len(&self) -> usize {
		self.cameras.len()
	}

	pub fn is_empty(&self) -> bool {
		self.cameras.is_empty()
	}
}

impl<R: Clone + Default> Default for Presence<R> {
	fn default() -> Self {
		Self::new()
	}
}
