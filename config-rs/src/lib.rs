//! config-rs/lib.rs
//! Shared configuration utilities for consistent service configuration
//! Provides standardized functions for port/address management

use std::env;
use std::net::SocketAddr;

/// Get the service port from the environment with proper fallback
///
/// # Arguments
/// * `default_port` - The default port to use if `PORT` is not set
///
/// # Returns
/// The port number to bind the service to
pub fn get_service_port(default_port: u16) -> u16 {
    env::var("PORT")
        .unwrap_or_else(|_| default_port.to_string())
        .parse::<u16>()
        .unwrap_or_else(|_| {
            log::warn!("Invalid port in PORT, using default {}", default_port);
            default_port
        })
}

/// Create a SocketAddr for binding the service
///
/// # Arguments
/// * `default_port` - The default port to use if not specified in environment
///
/// # Returns
/// A SocketAddr configured with the appropriate bind address and port
pub fn get_bind_address(default_port: u16) -> SocketAddr {
    // Check if there's a full address override
    if let Ok(addr_str) = env::var("BIND_ADDR") {
        if let Ok(addr) = addr_str.parse::<SocketAddr>() {
            return addr;
        }
        log::warn!("Invalid address format in BIND_ADDR, using default");
    }

    let port = get_service_port(default_port);
    format!("0.0.0.0:{}", port).parse().unwrap()
}
