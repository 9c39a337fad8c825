use std::future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior, Sleep};



const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(PartialEq, Eq)]
pub enum PollState {
	/// No status request outstanding.
	Idle,
	/// A status request went out and the timeout is armed.
	AwaitingReply,
}

#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(PartialEq, Eq)]
pub enum Tick {
	Poll,
	Timeout,
}

/// Repeating poll timer plus the single-shot reply timeout.
pub struct PollScheduler {
	state: PollState,
	interval: Interval,
	timeout: Duration,
	deadline: Option<Pin<Box<Sleep>>>,
}

impl PollScheduler {
	/// The first poll fires one full interval after creation. A zero interval is treated as 1 ms.
	pub fn new(poll_interval: Duration, poll_timeout: Duration) -> Self {
		let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
		let mut interval = time::interval_at(Instant::now() + poll_interval, poll_interval);
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

		PollScheduler {
			state: PollState::Idle,
			interval,
			timeout: poll_timeout,
			deadline: None,
		}
	}

	pub fn state(&self) -> PollState {
		self.state
	}

	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	/// Waits for the next timer to fire. Cancel safe.
	pub async fn next_tick(&mut self) -> Tick {
		let deadline = &mut self.deadline;
		tokio::select! {
			biased;
			_ = async {
				match deadline {
					Some(sleep) => sleep.as_mut().await,
					None => future::pending().await,
				}
			} => Tick::Timeout,
			_ = self.interval.tick() => Tick::Poll,
		}
	}

	/// Arms (or re-arms) the timeout for a request that was just written.
	pub fn request_sent(&mut self) {
		self.deadline = Some(Box::pin(time::sleep(self.timeout)));
		self.state = PollState::AwaitingReply;
	}

	/// Handles a fired timeout. Returns true if a reply was still awaited.
	pub fn expire(&mut self) -> bool {
		self.deadline = None;
		let awaiting = self.state == PollState::AwaitingReply;
		self.state = PollState::Idle;
		awaiting
	}
}
