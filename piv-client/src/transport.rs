//! External collaborator adapters
//!
//! The smart-card transport is consumed as a trait: one operation that
//! sends a command APDU and returns the raw response, payload and status
//! word concatenated, exactly as the card produced them. Device discovery,
//! reader selection, and protocol negotiation all live behind it.

use crate::prelude::*;

/// A connected smart-card channel.
///
/// `exchange` must return the response payload with the two status-word
/// bytes appended. Short responses are fine; `61XX` continuation is
/// handled above this trait. Implementations block (asynchronously) for
/// as long as the card takes, which for touch- or biometric-gated
/// operations means until the user acts or the reader times out.
#[async_trait]
pub trait Transport: Send {
    async fn exchange(&mut self, request: &[u8]) -> std::io::Result<Vec<u8>>;
}

/// Why the next command may stall waiting for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceHint {
    /// The slot may have a touch policy; the token wants a press.
    Touch,
    /// A biometric match is about to run.
    Biometric,
}

/// Fire-and-forget notifier invoked right before an operation that may
/// require physical presence. The callback must not re-enter the session;
/// it is meant to surface a "touch your key" prompt and return.
pub type PresenceCallback = Box<dyn Fn(PresenceHint) + Send>;
