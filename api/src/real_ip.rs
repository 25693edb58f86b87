// Borrow a lot of code from crates.io
// https://github.com/rust-lang/crates.io/blob/986d296f910c2ed821be907b1e32a120c03338cb/src/real_ip.rs

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use ipnetwork::IpNetwork;
use std::net::{IpAddr, SocketAddr};

use crate::{App, error::AppError};

fn is_trusted(ip: &IpAddr, trusted_proxies: &[IpNetwork]) -> bool {
    trusted_proxies.iter().any(|proxy| proxy.contains(*ip))
}

fn forwarded_ips(headers: &HeaderMap) -> Vec<IpAddr> {
    headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| header.split(','))
        .filter_map(|ip| ip.trim().parse().ok())
        .collect()
}

/// Resolves the address a request should be attributed to.
///
/// `X-Forwarded-For` is only read when the connecting socket is one of the
/// trusted proxies. Every proxy appends the peer it saw, so the hops are
/// walked from the right and the first address that isn't a trusted proxy is
/// the client. Anything left of it was written by the client and is ignored.
pub fn get_client_ip(
    headers: &HeaderMap,
    socket_ip: IpAddr,
    trusted_proxies: &[IpNetwork],
) -> IpAddr {
    if !is_trusted(&socket_ip, trusted_proxies) {
        return socket_ip;
    }

    let hops = forwarded_ips(headers);
    hops.iter()
        .rev()
        .find(|ip| !is_trusted(ip, trusted_proxies))
        // the whole chain is our own proxies
        .or_else(|| hops.first())
        .copied()
        .unwrap_or(socket_ip)
}

pub struct ClientIp(pub IpAddr);

impl FromRequestParts<App> for ClientIp {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &App) -> Result<Self, Self::Rejection> {
        let socket_ip: IpAddr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .ok_or("couldn't get connecting socket IP")?
            .0
            .ip();

        let client_ip = get_client_ip(&parts.headers, socket_ip, &state.config.trusted_proxies);
        if client_ip != socket_ip {
            tracing::debug!(%client_ip, %socket_ip, "Client IP taken from X-Forwarded-For");
        }

        Ok(ClientIp(client_ip))
    }
}
