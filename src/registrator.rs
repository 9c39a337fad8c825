use std::net::Ipv4Addr;
use std::sync::Arc;

use log::{debug, info, trace, warn};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::commands::{self, RegistratorCommand};
use crate::common::{ConnectionState, Identity, RegistratorError, SessionEvent, Serial};
use crate::config::{ConfigError, RegistratorConfig};
use crate::connection::{Connection, ConnectionEvent};
use crate::netif;
use crate::presence::Presence;
use crate::record::StatusRecord;
use crate::reply::ReplyProcessor;
use crate::scheduler::{PollScheduler, Tick};



const REQUEST_QUEUE: usize = 32;
const EVENT_QUEUE: usize = 64;

enum Request<R> {
	Serials(oneshot::Sender<Vec<Serial>>),
	Status(String, oneshot::Sender<R>),
	Camera(String, oneshot::Sender<Option<R>>),
	Sweep(oneshot::Sender<usize>),
	SendCommand { command: String, params: String, reply: oneshot::Sender<bool> },
	ConnectionState(oneshot::Sender<ConnectionState>),
}

/// Client side of a registrator session.
///
/// The session runs as its own task and owns all of its state. It stops, closing the
/// connection, once the last handle is dropped.
pub struct RegistratorHandle<R> {
	identity: Arc<Identity>,
	requests: mpsc::Sender<Request<R>>,
	events: broadcast::Sender<SessionEvent<R>>,
}

impl<R> Clone for RegistratorHandle<R> {
	fn clone(&self) -> Self {
		RegistratorHandle {
			identity: self.identity.clone(),
			requests: self.requests.clone(),
			events: self.events.clone(),
		}
	}
}

impl<R: StatusRecord> RegistratorHandle<R> {
	/// Starts a session on the current tokio runtime. An invalid config starts nothing.
	pub fn spawn(config: &RegistratorConfig) -> Result<Self, ConfigError> {
		config.validate()?;

		let identity = Arc::new(config.identity());
		let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE);
		let (events_tx, _) = broadcast::channel(EVENT_QUEUE);

		let session = Registrator {
			identity: identity.clone(),
			connection: Connection::new(&config.ip, config.status_port, config.reconnect_delay()),
			scheduler: PollScheduler::new(config.poll_interval(), config.poll_timeout()),
			replies: ReplyProcessor::new(config.carry_over_limit),
			presence: Presence::new(),
			requests: requests_rx,
			events: events_tx.clone(),
		};
		tokio::spawn(session.run());

		Ok(RegistratorHandle {
			identity,
			requests: requests_tx,
			events: events_tx,
		})
	}

	pub fn identity(&self) -> &Identity {
		&self.identity
	}

	pub fn name(&self) -> &str {
		&self.identity.name
	}

	pub fn ip(&self) -> &str {
		&self.identity.ip
	}

	pub fn mac(&self) -> &str {
		&self.identity.mac
	}

	pub fn motion_client_port(&self) -> u16 {
		self.identity.motion_client_port
	}

	/// Local address the registrator should use to reach us.
	pub fn wol(&self) -> Option<Ipv4Addr> {
		netif::local_ipv4()
	}

	pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent<R>> {
		self.events.subscribe()
	}

	async fn request<T>(&self, request: Request<R>, reply: oneshot::Receiver<T>) -> Result<T, RegistratorError> {
		self.requests.send(request).await.map_err(|_| RegistratorError::Closed)?;
		reply.await.map_err(|_| RegistratorError::Closed)
	}

	pub async fn cameras_serials(&self) -> Result<Vec<Serial>, RegistratorError> {
		let (tx, rx) = oneshot::channel();
		self.request(Request::Serials(tx), rx).await
	}

	/// Status of `serial`, the default status if it is unknown, or the status of
	/// some known camera if `serial` is empty.
	pub async fn status(&self, serial: &str) -> Result<R, RegistratorError> {
		let (tx, rx) = oneshot::channel();
		self.request(Request::Status(serial.to_string(), tx), rx).await
	}

	/// Status of `serial` if it is currently known.
	pub async fn camera(&self, serial: &str) -> Result<Option<R>, RegistratorError> {
		let (tx, rx) = oneshot::channel();
		self.request(Request::Camera(serial.to_string(), tx), rx).await
	}

	/// Drops cameras that were not reported since the last poll and returns how many went away.
	pub async fn sweep(&self) -> Result<usize, RegistratorError> {
		let (tx, rx) = oneshot::channel();
		self.request(Request::Sweep(tx), rx).await
	}

	/// Writes a raw command. Returns false if the registrator is not connected.
	pub async fn send_command(&self, command: &str, params: &str) -> Result<bool, RegistratorError> {
		let (tx, rx) = oneshot::channel();
		let request = Request::SendCommand {
			command: command.to_string(),
			params: params.to_string(),
			reply: tx,
		};
		self.request(request, rx).await
	}

	pub async fn connection_state(&self) -> Result<ConnectionState, RegistratorError> {
		let (tx, rx) = oneshot::channel();
		self.request(Request::ConnectionState(tx), rx).await
	}
}


struct Registrator<R> {
	identity: Arc<Identity>,
	connection: Connection,
	scheduler: PollScheduler,
	replies: ReplyProcessor<R>,
	presence: Presence<R>,
	requests: mpsc::Receiver<Request<R>>,
	events: broadcast::Sender<SessionEvent<R>>,
}

impl<R: StatusRecord> Registrator<R> {
	async fn run(mut self) {
		info!("Registrator {} started for {}:{}", self.identity.name, self.identity.ip, self.identity.status_port);

		loop {
			tokio::select! {
				request = self.requests.recv() => match request {
					Some(request) => self.handle_request(request).await,
					None => break,
				},
				tick = self.scheduler.next_tick() => match tick {
					Tick::Poll => self.poll().await,
					Tick::Timeout => self.timeout(),
				},
				event = self.connection.next_event() => self.connection_event(event),
			}
		}

		info!("Registrator {} stopped", self.identity.name);
	}

	fn notify(&self, event: SessionEvent<R>) {
		// No subscribers is fine
		let _ = self.events.send(event);
	}

	async fn poll(&mut self) {
		self.presence.unmark_all();

		let request = commands::request(RegistratorCommand::GetStatus.as_str(), "");
		if self.connection.send(request.as_bytes()).await {
			self.scheduler.request_sent();
		} else {
			trace!("Registrator {} not connected, skipping status request", self.identity.name);
		}
	}

	fn timeout(&mut self) {
		if !self.scheduler.expire() {
			return;
		}
		debug!("Registrator {}: status reply timeout after {:?}", self.identity.name, self.scheduler.timeout());
		if self.presence.clear() {
			warn!("Registrator {}: lost all cameras", self.identity.name);
			self.notify(SessionEvent::CamerasUpdated);
		}
	}

	fn connection_event(&mut self, event: ConnectionEvent) {
		match event {
			ConnectionEvent::Data(data) => self.process_reply(&data),
			ConnectionEvent::Connected => self.replies.reset(),
			ConnectionEvent::Connecting => {},
			ConnectionEvent::Disconnected(err) => {
				self.replies.reset();
				match err {
					Some(err) => debug!("Registrator {} unreachable; error was {}", self.identity.name, err),
					None => debug!("Registrator {} disconnected", self.identity.name),
				}
			}
		}
	}

	fn process_reply(&mut self, data: &[u8]) {
		for (serial, status) in self.replies.process(data) {
			if self.presence.record(serial.clone(), status.clone()) {
				self.notify(SessionEvent::CamerasUpdated);
			}
			self.notify(SessionEvent::StatusReceived { serial, status });
		}
	}

	async fn handle_request(&mut self, request: Request<R>) {
		// A caller that went away no longer wants the answer
		match request {
			Request::Serials(reply) => {
				let _ = reply.send(self.presence.serials());
			},
			Request::Status(serial, reply) => {
				let _ = reply.send(self.presence.status(&serial));
			},
			Request::Camera(serial, reply) => {
				let _ = reply.send(self.presence.get(&serial).map(|entry| entry.status.clone()));
			},
			Request::Sweep(reply) => {
				let removed = self.presence.sweep();
				if removed > 0 {
					self.notify(SessionEvent::CamerasUpdated);
				}
				let _ = reply.send(removed);
			},
			Request::SendCommand { command, params, reply } => {
				let sent = self.connection.send(commands::request(&command, &params).as_bytes()).await;
				let _ = reply.send(sent);
			},
			Request::ConnectionState(reply) => {
				let _ = reply.send(self.connection.state());
			}
		}
	}
}
