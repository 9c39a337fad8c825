use std::ops::Range;

use serde_json::{Map, Value};



/// A self-delimited status record, as found in a registrator reply.
///
/// Replies may carry several records back to back, possibly surrounded by noise.
/// Implementations only need to find and decode the first complete one.
pub trait StatusRecord: Clone + Default + Send + Sync + 'static {
	/// Locates the first complete record in `buf`.
	///
	/// The range covers the record bytes only; anything before `range.start` is noise.
	/// Returns `None` when `buf` holds no complete record.
	fn decode(buf: &[u8]) -> Option<(Range<usize>, Self)>;

	/// Serial of the reporting camera. Zero or negative marks a placeholder record.
	fn serial(&self) -> i64;
}


/// Default record format: one JSON object per camera, carrying at least a `serial`.
#[derive(Clone)]
#[derive(Debug)]
#[derive(Default)]
#[derive(PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct CameraStatus {
	#[serde(default)]
	pub serial: i64,
	#[serde(flatten)]
	pub fields: Map<String, Value>,
}

impl StatusRecord for CameraStatus {
	fn decode(buf: &[u8]) -> Option<(Range<usize>, Self)> {
		let mut from = 0;
		while let Some(offset) = buf[from..].iter().position(|b| *b == b'{') {
			let start = from + offset;
			let mut stream = serde_json::Deserializer::from_slice(&buf[start..]).into_iter::<CameraStatus>();
			match stream.next() {
				Some(Ok(status)) => return Some((start..start + stream.byte_offset(), status)),
				// Record is still being received
				Some(Err(err)) if err.is_eof() => return None,
				_ => from = start + 1,
			}
		}
		None
	}

	fn serial(&self) -> i64 {
		self.serial
	}
}
