//! # busgate-amqp
//!
//! Shared AMQP infrastructure for the bus gateway.
//!
//! This crate provides:
//! - Per-operation AMQP client traits for testability (zero-cost via monomorphization)
//! - Connection and channel bootstrap for the gateway's two channels
//!   (plain declare/consume/delete, and publisher-confirm publishing)
//! - Reply-queue leases with exactly-once release
//! - Correlation tokens and the single-delivery reply waiter
//! - Mock broker clients for testing (with `test-support` feature)
//!
//! ## Example
//!
//! ```rust,no_run
//! use busgate_amqp::{AmqpConfig, GatewayChannels, connect};
//! use busgate_amqp::env::SystemEnv;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AmqpConfig::from_env(&SystemEnv);
//!     let conn = connect(&config).await.expect("Failed to connect");
//!     let channels = GatewayChannels::open(&conn).await.expect("Failed to open channels");
//!     assert!(busgate_amqp::BrokerReady::is_ready(&channels));
//! }
//! ```
//!
//! ## Zero-Cost Abstraction
//!
//! Use generics for zero-cost abstraction:
//!
//! ```rust,no_run
//! use busgate_amqp::{ConfirmPublishClient, ReplyQueueClient};
//!
//! // Depend only on the operations you need
//! pub struct MyService<B: ReplyQueueClient + ConfirmPublishClient> {
//!     broker: B,
//! }
//! ```

pub mod client;
pub mod config;
pub mod connect;
pub mod correlation;
pub mod env;
pub mod lease;

#[cfg(feature = "test-support")]
pub mod mocks;

pub use client::{
    BrokerReady, ConfirmPublishClient, ConsumeClient, PublishProperties, ReplyDelivery,
    ReplyQueueClient,
};
pub use config::AmqpConfig;
pub use connect::{ConnectError, GatewayChannels, PublishConfirmError, connect};
pub use correlation::{CorrelationToken, ReplyOutcome, await_reply};
pub use lease::ReplyQueueLease;

#[cfg(feature = "test-support")]
pub use mocks::{MockBroker, MockError, PublishedRequest};
