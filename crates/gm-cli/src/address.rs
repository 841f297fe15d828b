//! Local address discovery
//!
//! Without a public tunnel, clients connect over the local network. The
//! address to advertise is the one on the interface holding the default
//! route.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

/// Any routable address works; connecting a UDP socket sends nothing.
const ROUTE_TARGET: &str = "8.8.8.8:80";

/// Address clients on the local network should use to reach `listener`
pub fn local_address(listener: SocketAddr) -> IpAddr {
    if !listener.ip().is_unspecified() {
        return listener.ip();
    }

    match default_route_address() {
        Ok(ip) => ip,
        Err(e) => {
            tracing::warn!("Unable to find the default route address: {}", e);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

/// Source address the OS would pick for outbound traffic
fn default_route_address() -> io::Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(ROUTE_TARGET)?;
    let ip = socket.local_addr()?.ip();

    if ip.is_unspecified() {
        return Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no default route",
        ));
    }
    Ok(ip)
}
