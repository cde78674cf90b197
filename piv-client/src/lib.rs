// Deny debug and print macros in production code
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]

//! Host-side client for the PIV application on YubiKey-class security tokens.
//!
//! The crate speaks NIST SP 800-73 PIV over a caller-supplied smart-card
//! transport and exposes the primitive PIV commands: key generation and
//! import, signing/decryption/key agreement, certificate and data-object
//! storage, and PIN/PUK/management-key administration. It does not discover
//! devices and it does not parse X.509; certificates are opaque DER.
//!
//! Entry point is [`Session::open`], which selects the PIV application on a
//! fresh transport and reads the firmware version. All secrets handed to a
//! session (PINs, PUKs, management keys, private key material) are wiped
//! from memory when the operation completes, on success and failure alike.

pub mod apdu;
pub mod buffer;
pub mod constants;
pub mod error;
pub mod key;
pub mod metadata;
pub mod mgm;
pub mod session;
pub mod tlv;
pub mod transport;

pub(crate) mod prelude;

pub use buffer::SecretBuffer;
pub use constants::{object_id, DEFAULT_MGMT_KEY, DEFAULT_PIN, DEFAULT_PUK};
pub use error::{Error, Result};
pub use key::{Algorithm, EcCurve, KeyOrigin, PinPolicy, Slot, TouchPolicy};
pub use key::{PrivateKeyMaterial, PublicKey};
pub use metadata::{
    BioMetadata, ManagementKeyMetadata, PinMetadata, SlotMetadata, Version,
};
pub use mgm::{MgmKey, MgmKeyAlgorithm};
pub use session::{CertCompression, Session};
pub use transport::{PresenceCallback, PresenceHint, Transport};
