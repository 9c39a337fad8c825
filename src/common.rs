/// Camera identifier as reported in a status record, kept in its decimal string form.
pub type Serial = String;

#[derive(Clone)]
#[derive(Debug)]
#[derive(PartialEq, Eq)]
#[derive(Serialize)]
pub struct Identity {
	pub name: String,
	pub ip: String,
	pub mac: String,
	pub status_port: u16,
	pub motion_client_port: u16,
}

#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(PartialEq, Eq)]
#[derive(Serialize)]
pub enum ConnectionState {
	Disconnected,
	Connecting,
	Connected,
}

/// Notifications published by a registrator session.
#[derive(Clone)]
#[derive(Debug)]
#[derive(PartialEq)]
pub enum SessionEvent<R> {
	/// A camera appeared or one or more cameras were dropped.
	CamerasUpdated,
	/// A valid record arrived, for new and already known cameras alike.
	StatusReceived { serial: Serial, status: R },
}

#[derive(Debug)]
#[derive(thiserror::Error)]
pub enum RegistratorError {
	#[error("registrator session has shut down")]
	Closed,
}
