use std::marker::PhantomData;

use log::{debug, trace};

use crate::common::Serial;
use crate::record::StatusRecord;



/// Splits raw status-port deliveries into records.
///
/// Bytes left over after the last complete record are kept from the first possible record
/// start, at most the last `carry_over_limit` of them, and prepended to the next delivery.
/// A limit of zero drops them instead.
pub struct ReplyProcessor<R> {
	pending: Vec<u8>,
	carry_over_limit: usize,
	_record: PhantomData<R>,
}

impl<R: StatusRecord> ReplyProcessor<R> {
	pub fn new(carry_over_limit: usize) -> Self {
		ReplyProcessor {
			pending: Vec::new(),
			carry_over_limit,
			_record: PhantomData,
		}
	}

	/// Returns the valid records found, in the order they appear.
	pub fn process(&mut self, data: &[u8]) -> Vec<(Serial, R)> {
		let mut buf = std::mem::take(&mut self.pending);
		buf.extend_from_slice(data);

		let mut records = Vec::new();
		let mut consumed = 0;
		while let Some((range, record)) = R::decode(&buf[consumed..]) {
			if range.end <= range.start {
				break;
			}
			let serial = record.serial();
			if serial > 0 {
				records.push((serial.to_string(), record));
			} else {
				trace!("Ignoring record with serial {}", serial);
			}
			consumed += range.end;
		}

		let tail = from_record_start(&buf[consumed..]);
		let kept = if tail.len() > self.carry_over_limit {
			let kept = from_record_start(&tail[tail.len() - self.carry_over_limit..]);
			debug!("Dropping {} unparsed bytes of registrator reply", tail.len() - kept.len());
			kept
		} else {
			tail
		};
		self.pending = kept.to_vec();

		records
	}

	/// Forgets any partial record, e.g. when the stream it belonged to is gone.
	pub fn reset(&mut self) {
		self.pending.clear();
	}
}

/// Noise ahead of the first brace can never become part of a record.
fn from_record_start(bytes: &[u8]) -> &[u8] {
	match bytes.iter().position(|&byte| byte == b'{') {
		Some(start) => &bytes[start..],
		None => &[],
	}
}
