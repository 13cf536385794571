/// Client network origin
///
/// Sessions are bound to the IP address they were issued to. Ports are
/// dropped so that a client reconnecting from a new ephemeral port keeps the
/// same origin.

use std::net::{IpAddr, SocketAddr};

use actix_web::dev::ConnectionInfo;

const UNKNOWN_ORIGIN: &str = "unknown";

#[derive(Debug, Clone, Copy, Default)]
pub struct OriginPolicy {
    /// Honour `Forwarded`/`X-Forwarded-For`; only safe behind a trusted proxy
    pub trust_forwarded_for: bool,
}

impl OriginPolicy {
    pub fn new(trust_forwarded_for: bool) -> Self {
        Self {
            trust_forwarded_for,
        }
    }

    pub fn client_origin(&self, info: &ConnectionInfo) -> String {
        let address = if self.trust_forwarded_for {
            info.realip_remote_addr()
        } else {
            info.peer_addr()
        };

        address
            .map(strip_port)
            .unwrap_or_else(|| UNKNOWN_ORIGIN.to_string())
    }
}

/// `10.0.0.1:5123` -> `10.0.0.1`, `[::1]:80` -> `::1`; anything unparsable is kept as is
pub fn strip_port(address: &str) -> String {
    let address = address.trim();

    if let Ok(socket) = address.parse::<SocketAddr>() {
        return socket.ip().to_string();
    }
    if let Ok(ip) = address.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
        return ip.to_string();
    }
    // hostname:port
    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => {
            host.to_string()
        }
        _ => address.to_string(),
    }
}
