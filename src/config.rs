use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use log::warn;

use crate::common::Identity;



pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["/etc/clustervms/registrator.toml", "registrator.toml"];

#[derive(Debug)]
#[derive(thiserror::Error)]
pub enum ConfigError {
	#[error("no config file found (looked for {0})")]
	NoConfigFile(String),
	#[error("registrator ip must not be empty")]
	MissingIp,
	#[error("poll_interval_ms must be greater than zero")]
	ZeroPollInterval,
}

#[derive(Clone)]
#[derive(Debug)]
#[derive(Deserialize)]
pub struct Config {
	pub registrator: RegistratorConfig,
}

#[derive(Clone)]
#[derive(Debug)]
#[derive(Deserialize)]
pub struct RegistratorConfig {
	pub name: String,
	pub ip: String,
	#[serde(default)]
	pub mac: String,
	pub status_port: u16,
	#[serde(default)]
	pub motion_client_port: u16,
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	#[serde(default = "default_poll_timeout_ms")]
	pub poll_timeout_ms: u64,
	#[serde(default = "default_reconnect_delay_ms")]
	pub reconnect_delay_ms: u64,
	/// Bytes of an unfinished record kept for the next delivery; 0 disables carry-over.
	#[serde(default = "default_carry_over_limit")]
	pub carry_over_limit: usize,
}

fn default_poll_interval_ms() -> u64 { 5000 }
fn default_poll_timeout_ms() -> u64 { 2000 }
fn default_reconnect_delay_ms() -> u64 { 1000 }
fn default_carry_over_limit() -> usize { 64 * 1024 }

impl RegistratorConfig {
	pub fn identity(&self) -> Identity {
		Identity {
			name: self.name.clone(),
			ip: self.ip.clone(),
			mac: self.mac.clone(),
			status_port: self.status_port,
			motion_client_port: self.motion_client_port,
		}
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn poll_timeout(&self) -> Duration {
		Duration::from_millis(self.poll_timeout_ms)
	}

	pub fn reconnect_delay(&self) -> Duration {
		Duration::from_millis(self.reconnect_delay_ms)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.ip.is_empty() {
			return Err(ConfigError::MissingIp);
		}
		if self.poll_interval_ms == 0 {
			return Err(ConfigError::ZeroPollInterval);
		}
		if self.poll_timeout_ms >= self.poll_interval_ms {
			warn!("Registrator {}: poll timeout ({} ms) is not shorter than the poll interval ({} ms)", self.name, self.poll_timeout_ms, self.poll_interval_ms);
		}
		Ok(())
	}
}

/// Merges `overlay` into `base`; nested tables are merged key by key, anything else is replaced.
fn merge(base: &mut toml::Table, overlay: toml::Table) {
	for (key, value) in overlay {
		match (base.get_mut(&key), value) {
			(Some(toml::Value::Table(existing)), toml::Value::Table(table)) => merge(existing, table),
			(Some(existing), value) => *existing = value,
			(None, value) => {
				base.insert(key, value);
			}
		}
	}
}

pub fn parse(tables: Vec<toml::Table>) -> anyhow::Result<Config> {
	let mut merged = toml::Table::new();
	for table in tables {
		merge(&mut merged, table);
	}
	let config: Config = toml::Value::Table(merged).try_into().context("Invalid registrator config")?;
	config.registrator.validate()?;
	Ok(config)
}

/// Reads and merges the given files in order; later files override earlier ones.
pub async fn read_config(filenames: &[&str]) -> anyhow::Result<Config> {
	let mut tables = Vec::new();
	for filename in filenames {
		let text = tokio::fs::read_to_string(filename).await
			.with_context(|| format!("Failed to read config file {}", filename))?;
		let table = text.parse::<toml::Table>()
			.with_context(|| format!("Failed to parse config file {}", filename))?;
		tables.push(table);
	}
	parse(tables)
}

pub async fn read_default_config_files() -> anyhow::Result<Config> {
	let existing: Vec<&str> = DEFAULT_CONFIG_FILES.iter()
		.copied()
		.filter(|filename| Path::new(filename).exists())
		.collect();
	if existing.is_empty() {
		return Err(ConfigError::NoConfigFile(DEFAULT_CONFIG_FILES.join(", ")).into());
	}
	read_config(&existing).await
}



#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	fn table(text: &str) -> toml::Table {
		text.parse().unwrap()
	}

	#[test]
	fn defaults_apply() {
		let config = parse(vec![table(r#"
			[registrator]
			name = "front-door"
			ip = "192.168.1.50"
			status_port = 10001
		"#)]).unwrap();
		let registrator = config.registrator;

		assert_eq!(registrator.mac, "");
		assert_eq!(registrator.motion_client_port, 0);
		assert_eq!(registrator.poll_interval(), Duration::from_millis(5000));
		assert_eq!(registrator.poll_timeout(), Duration::from_millis(2000));
		assert_eq!(registrator.reconnect_delay(), Duration::from_millis(1000));
		assert_eq!(registrator.carry_over_limit, 65536);
	}

	#[test]
	fn later_tables_override_earlier_keys() {
		let config = parse(vec![
			table(r#"
				[registrator]
				name = "front-door"
				ip = "192.168.1.50"
				status_port = 10001
				poll_interval_ms = 3000
			"#),
			table(r#"
				[registrator]
				ip = "192.168.1.51"
				mac = "00:11:22:33:44:55"
			"#),
		]).unwrap();
		let identity = config.registrator.identity();

		assert_eq!(identity.name, "front-door");
		assert_eq!(identity.ip, "192.168.1.51");
		assert_eq!(identity.mac, "00:11:22:33:44:55");
		assert_eq!(config.registrator.poll_interval_ms, 3000);
	}

	#[test]
	fn zero_poll_interval_is_rejected() {
		let err = parse(vec![table(r#"
			[registrator]
			name = "front-door"
			ip = "192.168.1.50"
			status_port = 10001
			poll_interval_ms = 0
		"#)]).unwrap_err();

		assert!(matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::ZeroPollInterval)));
	}

	#[test]
	fn missing_fields_are_reported() {
		assert!(parse(vec![table("[registrator]\nname = \"front-door\"")]).is_err());
		assert!(parse(Vec::new()).is_err());
	}

	#[tokio::test]
	async fn reads_files_in_order() {
		let mut base = tempfile::NamedTempFile::new().unwrap();
		writeln!(base, "[registrator]\nname = \"porch\"\nip = \"10.0.0.2\"\nstatus_port = 8000").unwrap();
		let mut overlay = tempfile::NamedTempFile::new().unwrap();
		writeln!(overlay, "[registrator]\nstatus_port = 8001").unwrap();

		let base_path = base.path().to_str().unwrap();
		let overlay_path = overlay.path().to_str().unwrap();
		let config = read_config(&[base_path, overlay_path]).await.unwrap();

		assert_eq!(config.registrator.name, "porch");
		assert_eq!(config.registrator.status_port, 8001);
	}

	#[tokio::test]
	async fn unreadable_file_is_an_error() {
		assert!(read_config(&["/nonexistent/registrator.toml"]).await.is_err());
	}
}
