use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{self, Sleep};

use crate::common::ConnectionState;



const READ_BUFFER_SIZE: usize = 4096;

type ConnectFuture = Pin<Box<dyn Future<Output = io::Result<TcpStream>> + Send>>;

enum State {
	Disconnected { retry: Pin<Box<Sleep>> },
	Connecting { attempt: ConnectFuture },
	Connected { stream: TcpStream },
}

#[derive(Debug)]
pub enum ConnectionEvent {
	Connecting,
	Connected,
	Data(Vec<u8>),
	/// Carries the error of a failed attempt or a broken stream; `None` for a clean close.
	Disconnected(Option<io::Error>),
}

fn connect_to(host: &str, port: u16) -> ConnectFuture {
	let address = (host.to_string(), port);
	Box::pin(async move { TcpStream::connect(address).await })
}

/// Best-effort connection to the registrator's status port.
///
/// Every drop or failed attempt schedules exactly one new attempt after `reconnect_delay`,
/// for as long as the connection exists.
pub struct Connection {
	host: String,
	port: u16,
	reconnect_delay: Duration,
	state: State,
	buffer: Vec<u8>,
	// A write failure that `next_event` has not reported yet
	lost: Option<io::Error>,
}

impl Connection {
	/// Starts connecting right away.
	pub fn new(host: &str, port: u16, reconnect_delay: Duration) -> Self {
		debug!("Connecting to {}:{}", host, port);
		Connection {
			host: host.to_string(),
			port,
			reconnect_delay,
			state: State::Connecting { attempt: connect_to(host, port) },
			buffer: vec![0; READ_BUFFER_SIZE],
			lost: None,
		}
	}

	pub fn state(&self) -> ConnectionState {
		match self.state {
			State::Disconnected { .. } => ConnectionState::Disconnected,
			State::Connecting { .. } => ConnectionState::Connecting,
			State::Connected { .. } => ConnectionState::Connected,
		}
	}

	pub fn connect(&mut self) {
		debug!("Connecting to {}:{}", self.host, self.port);
		self.state = State::Connecting { attempt: connect_to(&self.host, self.port) };
	}

	fn schedule_reconnect(&mut self) {
		self.state = State::Disconnected { retry: Box::pin(time::sleep(self.reconnect_delay)) };
	}

	/// Writes `bytes` if connected. Nothing is queued otherwise.
	///
	/// A failed write drops the stream; the next call to `next_event` reports it.
	pub async fn send(&mut self, bytes: &[u8]) -> bool {
		let stream = match &mut self.state {
			State::Connected { stream } => stream,
			_ => return false,
		};

		let written = async {
			stream.write_all(bytes).await?;
			stream.flush().await
		}.await;

		match written {
			Ok(()) => true,
			Err(err) => {
				warn!("Failed to write to {}:{}; error was {}", self.host, self.port, err);
				self.schedule_reconnect();
				self.lost = Some(err);
				false
			}
		}
	}

	/// Drives the connection until something happens. Cancel safe.
	pub async fn next_event(&mut self) -> ConnectionEvent {
		if let Some(err) = self.lost.take() {
			return ConnectionEvent::Disconnected(Some(err));
		}

		match &mut self.state {
			State::Disconnected { retry } => {
				retry.as_mut().await;
				self.connect();
				ConnectionEvent::Connecting
			},
			State::Connecting { attempt } => {
				let result = attempt.as_mut().await;
				match result {
					Ok(stream) => {
						if let Err(err) = stream.set_nodelay(true) {
							debug!("Failed to set TCP_NODELAY; error was {}", err);
						}
						info!("Connected to {}:{}", self.host, self.port);
						self.state = State::Connected { stream };
						ConnectionEvent::Connected
					},
					Err(err) => {
						self.schedule_reconnect();
						ConnectionEvent::Disconnected(Some(err))
					}
				}
			},
			State::Connected { stream } => {
				let read = stream.read(&mut self.buffer).await;
				match read {
					Ok(0) => {
						info!("Connection to {}:{} closed", self.host, self.port);
						self.schedule_reconnect();
						ConnectionEvent::Disconnected(None)
					},
					Ok(n) => ConnectionEvent::Data(self.buffer[..n].to_vec()),
					Err(err) => {
						warn!("Connection to {}:{} lost; error was {}", self.host, self.port, err);
						self.schedule_reconnect();
						ConnectionEvent::Disconnected(Some(err))
					}
				}
			}
		}
	}
}



#[cfg(test)]
mod tests {
	use super::*;
	use tokio::net::TcpListener;
	use tokio::time::timeout;

	const DELAY: Duration = Duration::from_millis(50);

	async fn next_event(connection: &mut Connection) -> ConnectionEvent {
		timeout(Duration::from_secs(5), connection.next_event()).await.expect("connection event")
	}

	#[tokio::test]
	async fn connects_and_delivers_bytes() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();
		let mut connection = Connection::new("127.0.0.1", port, DELAY);
		assert_eq!(connection.state(), ConnectionState::Connecting);

		let (accepted, event) = tokio::join!(listener.accept(), next_event(&mut connection));
		let (mut device, _) = accepted.unwrap();
		assert!(matches!(event, ConnectionEvent::Connected));
		assert_eq!(connection.state(), ConnectionState::Connected);

		assert!(connection.send(b"GET /getStatus HTTP/1.1").await);
		let mut request = [0u8; 23];
		device.read_exact(&mut request).await.unwrap();
		assert_eq!(&request, b"GET /getStatus HTTP/1.1");

		device.write_all(br#"{"serial":101}"#).await.unwrap();
		match next_event(&mut connection).await {
			ConnectionEvent::Data(bytes) => assert_eq!(bytes, br#"{"serial":101}"#),
			other => panic!("unexpected event {:?}", other),
		}
	}

	#[tokio::test]
	async fn send_fails_while_not_connected() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();
		drop(listener);

		let mut connection = Connection::new("127.0.0.1", port, DELAY);
		assert!(!connection.send(b"GET /getStatus HTTP/1.1").await);

		assert!(matches!(next_event(&mut connection).await, ConnectionEvent::Disconnected(Some(_))));
		assert_eq!(connection.state(), ConnectionState::Disconnected);
		assert!(!connection.send(b"GET /getStatus HTTP/1.1").await);
	}

	#[tokio::test]
	async fn reconnects_after_drop() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();
		let mut connection = Connection::new("127.0.0.1", port, DELAY);

		let (accepted, event) = tokio::join!(listener.accept(), next_event(&mut connection));
		assert!(matches!(event, ConnectionEvent::Connected));
		drop(accepted.unwrap());

		assert!(matches!(next_event(&mut connection).await, ConnectionEvent::Disconnected(_)));
		assert_eq!(connection.state(), ConnectionState::Disconnected);

		let started = time::Instant::now();
		assert!(matches!(next_event(&mut connection).await, ConnectionEvent::Connecting));
		assert!(started.elapsed() >= DELAY - Duration::from_millis(5));

		let (accepted, event) = tokio::join!(listener.accept(), next_event(&mut connection));
		assert!(accepted.is_ok());
		assert!(matches!(event, ConnectionEvent::Connected));
	}

	#[tokio::test]
	async fn write_failure_is_reported_as_disconnect() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();
		let mut connection = Connection::new("127.0.0.1", port, DELAY);

		let (accepted, event) = tokio::join!(listener.accept(), next_event(&mut connection));
		assert!(matches!(event, ConnectionEvent::Connected));
		drop(accepted.unwrap());

		// The first write after the peer is gone usually still succeeds locally
		let mut failed = false;
		for _ in 0..100 {
			if !connection.send(b"GET /getStatus HTTP/1.1").await {
				failed = true;
				break;
			}
			time::sleep(Duration::from_millis(10)).await;
		}
		assert!(failed);
		assert_eq!(connection.state(), ConnectionState::Disconnected);

		assert!(matches!(next_event(&mut connection).await, ConnectionEvent::Disconnected(Some(_))));
		assert!(matches!(next_event(&mut connection).await, ConnectionEvent::Connecting));
	}

	#[tokio::test]
	async fn keeps_retrying_until_the_registrator_listens() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();
		drop(listener);
		let mut connection = Connection::new("127.0.0.1", port, DELAY);

		for _ in 0..3 {
			assert!(matches!(next_event(&mut connection).await, ConnectionEvent::Disconnected(Some(_))));
			assert_eq!(connection.state(), ConnectionState::Disconnected);
			assert!(matches!(next_event(&mut connection).await, ConnectionEvent::Connecting));
		}

		let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
		let (accepted, event) = tokio::join!(listener.accept(), next_event(&mut connection));
		assert!(accepted.is_ok());
		assert!(matches!(event, ConnectionEvent::Connected));
		assert_eq!(connection.state(), ConnectionState::Connected);
	}
}
