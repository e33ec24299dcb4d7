//! # Diameter
//!
//! Rust implementation of the Diameter Base Protocol (RFC 6733) core: the
//! dictionary, message codec, peer state machine, capability exchange,
//! watchdog, and routing/dispatch engine a Diameter node is built from.
//!
//! ## Reference
//! Based on [RFC 6733](https://tools.ietf.org/html/rfc6733)
//!
//! ## Examples
//! * [`client`] - A simple diameter client that sends a request to a server and prints the response.
//!
//! * [`server`] - A simple diameter server that listens for requests and sends a response.
//!
//! [`server`]: transport::server
//! [`client`]: transport::client

pub mod acceptor;
pub mod avp;
pub mod capability;
pub mod config;
pub mod diameter;
pub mod dictionary;
pub mod display;
pub mod error;
pub mod extension;
pub mod hooks;
pub mod node;
pub mod peer;
pub mod psm;
pub mod routing;
pub mod transport;
pub mod watchdog;

pub use crate::diameter::flags;
pub use crate::diameter::{ApplicationId, CommandCode, DiameterHeader, DiameterMessage};
pub use crate::error::{Error, Result};
