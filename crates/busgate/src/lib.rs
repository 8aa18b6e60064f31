//! HTTP-to-AMQP request/reply bus gateway.
//!
//! # Architecture
//!
//! ```text
//! Client → POST /bus/{app_name}/{object_name}/{interface_name}/{method_name}
//!              ↓
//!         [HTTP surface (axum)]
//!              ↓ builds a BusRequest from path + body `data.data`
//!         [BusGateway coordinator]
//!              ↓ declares a private reply queue (exclusive, auto-delete, x-expires)
//!              ↓ starts the reply waiter for a fresh correlation token
//!              ↓ publishes the request to exchange {app_name} (confirm channel)
//!              ↓ races first delivery against the wait window
//!         [Worker consumes from its exchange, replies to the queue]
//!              ↓
//!         [HTTP surface returns the reply body, or a {code, message} envelope]
//! ```
//!
//! Every response is HTTP 200; outcomes are distinguished by the body, which
//! is what the gateway's existing callers expect.

pub mod bus;
pub mod config;
pub mod error;
pub mod health;
pub mod rpc;
