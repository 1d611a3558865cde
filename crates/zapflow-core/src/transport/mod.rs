//! Transport capability boundary
//!
//! The messaging transport (pairing, session persistence, the actual wire)
//! lives outside this repository. The core consumes it through the narrow
//! [`Transport`] trait and owns connection lifecycle through the
//! [`ConnectionRegistry`].

pub mod cloud;
pub mod registry;

use async_trait::async_trait;
use thiserror::Error;
use zapflow_storage::models::ImageAttachment;

pub use cloud::{CloudApiTransport, CloudConfig};
pub use registry::ConnectionRegistry;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("account is not connected")]
    NotConnected,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("provider rejected the message: {0}")]
    Rejected(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("send timed out")]
    Timeout,
}

/// Capability interface to a connected messaging account.
///
/// `send_message` returns the provider-assigned message identifier used to
/// correlate later delivery acknowledgements.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish (or verify) the session for this account
    async fn connect(&self) -> Result<(), TransportError>;

    /// Whether the account currently holds a live connection
    fn is_connected(&self) -> bool;

    /// Send one message; returns the provider message id
    async fn send_message(
        &self,
        phone: &str,
        text: &str,
        images: &[ImageAttachment],
    ) -> Result<String, TransportError>;
}
