//! IPv6 address helpers: token validation, host/port splitting and CIDR expansion

use ipnet::Ipv6Net;
use rand::Rng;
use std::net::Ipv6Addr;
use tracing::{debug, trace};

/// Check whether a token is a textual IPv6 address
pub fn is_ipv6(token: &str) -> bool {
    match token.parse::<Ipv6Addr>() {
        Ok(_) => true,
        Err(_) => {
            trace!("Not an IPv6 address: {:?}", token);
            false
        }
    }
}

/// Split `host:port`, `[host]:port` or `scheme://host:port` into its parts
///
/// Unbracketed hosts are split at the last colon. Port 0 is rejected.
pub fn split_host_port(endpoint: &str) -> Option<(&str, u16)> {
    let endpoint = endpoint.trim();
    let endpoint = endpoint
        .split_once("://")
        .map_or(endpoint, |(_, rest)| rest)
        .trim_end_matches('/');

    let (host, port) = if let Some(rest) = endpoint.strip_prefix('[') {
        rest.split_once("]:")?
    } else {
        endpoint.rsplit_once(':')?
    };

    let port: u16 = port.parse().ok()?;
    if host.is_empty() || port == 0 {
        return None;
    }
    Some((host, port))
}

/// Number of usable hosts in a block: every address except the network address
pub fn usable_hosts(net: &Ipv6Net) -> u128 {
    u128::from(net.hostmask())
}

/// Pick a random usable host from a CIDR block
///
/// Host bits in the input are tolerated. Returns `None` when the block
/// does not parse or has no usable host (a `/128`).
pub fn random_host(cidr: &str) -> Option<Ipv6Addr> {
    let net = match cidr.trim().parse::<Ipv6Net>() {
        Ok(net) => net.trunc(),
        Err(e) => {
            debug!("Invalid IPv6 CIDR {:?}: {}", cidr, e);
            return None;
        }
    };
    random_host_in(&net, &mut rand::thread_rng())
}

/// Pick a random usable host from an already parsed block
pub fn random_host_in<R: Rng + ?Sized>(net: &Ipv6Net, rng: &mut R) -> Option<Ipv6Addr> {
    let last = usable_hosts(net);
    if last == 0 {
        debug!("CIDR {} has no usable hosts", net);
        return None;
    }

    let offset = rng.gen_range(1..=last);
    Some(Ipv6Addr::from(u128::from(net.network()) | offset))
}
