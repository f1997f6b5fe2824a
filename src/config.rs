// src/config.rs

//! Reads the environment-variable configuration for the master and replica
//! roles. Unlike the rest of the ambient stack there is no file to load:
//! spec.md fixes configuration to three environment variables.

use anyhow::{Context, Result, bail};
use std::net::SocketAddr;

/// The master always listens on this port; only its host is configurable.
pub const MASTER_PORT: u16 = 8000;

/// Configuration for the master process.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub addr: SocketAddr,
}

impl MasterConfig {
    /// Reads `IP` from the environment; the master's port is fixed.
    pub fn from_env() -> Result<Self> {
        let ip = std::env::var("IP").context("IP environment variable not set")?;
        let addr: SocketAddr = format!("{ip}:{MASTER_PORT}")
            .parse()
            .with_context(|| format!("invalid IP '{ip}'"))?;
        Ok(Self { addr })
    }
}

/// Configuration for a replica process.
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    pub addr: SocketAddr,
    pub master_addr: SocketAddr,
}

impl ReplicaConfig {
    /// Reads `IP`, `PORT`, and `MASTER_IP` from the environment.
    pub fn from_env() -> Result<Self> {
        let ip = std::env::var("IP").context("IP environment variable not set")?;
        let port = std::env::var("PORT").context("PORT environment variable not set")?;
        let master_ip = std::env::var("MASTER_IP").context("MASTER_IP environment variable not set")?;

        let port: u16 = port
            .parse()
            .with_context(|| format!("PORT '{port}' is not a valid port number"))?;
        if port == 0 {
            bail!("PORT must be a positive integer");
        }

        let addr: SocketAddr = format!("{ip}:{port}")
            .parse()
            .with_context(|| format!("invalid IP '{ip}'"))?;
        let master_addr: SocketAddr = format!("{master_ip}:{MASTER_PORT}")
            .parse()
            .with_context(|| format!("invalid MASTER_IP '{master_ip}'"))?;

        Ok(Self { addr, master_addr })
    }

    /// The path of this replica's on-disk document snapshot, keyed by port
    /// as spec.md §6 requires ("Persisted state... keyed by PORT").
    pub fn store_path(&self) -> std::path::PathBuf {
        std::path::PathBuf::from(format!("scriptorium_{}.json", self.addr.port()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_port() {
        // SAFETY: tests run single-threaded within this module; no other
        // test reads these variables concurrently.
        unsafe {
            std::env::set_var("IP", "127.0.0.1");
            std::env::set_var("PORT", "0");
            std::env::set_var("MASTER_IP", "127.0.0.1");
        }
        assert!(ReplicaConfig::from_env().is_err());
        unsafe {
            std::env::remove_var("IP");
            std::env::remove_var("PORT");
            std::env::remove_var("MASTER_IP");
        }
    }

    #[test]
    fn store_path_is_keyed_by_port() {
        let cfg = ReplicaConfig {
            addr: "127.0.0.1:8001".parse().unwrap(),
            master_addr: "127.0.0.1:8000".parse().unwrap(),
        };
        assert_eq!(cfg.store_path(), std::path::PathBuf::from("scriptorium_8001.json"));
    }
}
