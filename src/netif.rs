use std::net::Ipv4Addr;

#[cfg(unix)]
use log::warn;



/// First non-loopback IPv4 address among the local interfaces.
///
/// No attempt is made to pick the interface that actually routes to the registrator.
pub fn local_ipv4() -> Option<Ipv4Addr> {
	first_usable(interface_addresses())
}

fn first_usable(addresses: impl IntoIterator<Item = Ipv4Addr>) -> Option<Ipv4Addr> {
	addresses.into_iter().find(|address| !address.is_loopback())
}

#[cfg(unix)]
fn interface_addresses() -> Vec<Ipv4Addr> {
	match nix::ifaddrs::getifaddrs() {
		Ok(interfaces) => interfaces
			.filter_map(|interface| interface.address)
			.filter_map(|address| address.as_sockaddr_in().map(|address| address.ip()))
			.collect(),
		Err(err) => {
			warn!("Failed to list network interfaces; error was {}", err);
			Vec::new()
		}
	}
}

#[cfg(not(unix))]
fn interface_addresses() -> Vec<Ipv4Addr> {
	Vec::new()
}
