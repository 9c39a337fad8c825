/// Commands understood by the registrator's status port.
#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(PartialEq, Eq)]
pub enum RegistratorCommand {
	GetStatus,
}

impl RegistratorCommand {
	pub fn as_str(self) -> &'static str {
		match self {
			RegistratorCommand::GetStatus => "getStatus",
		}
	}
}

/// Builds the request line for `command`. The registrator expects no headers and no body.
pub fn request(command: &str, params: &str) -> String {
	if params.is_empty() {
		format!("GET /{} HTTP/1.1", command)
	} else {
		format!("GET /{}?{} HTTP/1.1", command, params)
	}
}
