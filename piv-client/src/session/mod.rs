//! PIV session: lifecycle, state machine, and the command surface
//!
//! A [`Session`] exclusively owns its transport; every command takes
//! `&mut self`, which is the whole concurrency story — one operation in
//! flight, responses matched 1:1 with requests. Command handlers live in
//! the submodules, one file per command family.
//!
//! Lifecycle: a fresh transport is promoted to a session by selecting the
//! PIV application and reading the version. PIN verification and
//! management-key authentication each flip a flag that the device, not
//! this struct, ultimately enforces; the flags exist so callers can ask
//! where they stand. Dropping the session clears both.

use crate::apdu::{self, CommandApdu, ResponseApdu};
use crate::constants::{INS_GET_SERIAL, INS_GET_VERSION, INS_SELECT, PIV_AID};
use crate::metadata::Version;
use crate::mgm::MgmKeyAlgorithm;
use crate::prelude::*;
use crate::transport::{PresenceCallback, PresenceHint, Transport};

mod auth;
mod keys;
mod meta;
mod objects;
mod pin;
mod reset;

pub use objects::CertCompression;

/// An open session with the PIV application on one token.
pub struct Session<T: Transport> {
    transport: T,
    version: Version,
    mgm_key_type: MgmKeyAlgorithm,
    authenticated: bool,
    pin_verified: bool,
    presence_cb: Option<PresenceCallback>,
}

impl<T: Transport> Session<T> {
    /// Select the PIV application on `transport` and read the reported
    /// version. On firmware that reports metadata support (>= 5.3) the
    /// management-key type is read from it; otherwise the 3DES factory
    /// default is assumed until a successful authentication or key
    /// change says otherwise.
    pub async fn open(transport: T) -> Result<Self> {
        let mut session = Self {
            transport,
            version: Version {
                major: 0,
                minor: 0,
                patch: 0,
            },
            mgm_key_type: MgmKeyAlgorithm::TripleDes,
            authenticated: false,
            pin_verified: false,
            presence_cb: None,
        };
        session.select().await?;
        session.version = session.read_version().await?;
        session.refresh_mgm_key_type().await?;
        info!(version = %session.version, "PIV application selected");
        Ok(session)
    }

    /// Re-learn the management-key type. The version check is only a
    /// fast path to skip the probe on firmware that predates metadata; a
    /// probe that still answers `6D00`/`6A88` falls back to the 3DES
    /// default rather than erroring.
    pub(crate) async fn refresh_mgm_key_type(&mut self) -> Result<()> {
        self.mgm_key_type = if self.version.supports_metadata() {
            match self.management_key_metadata().await {
                Ok(meta) => meta.key_type,
                Err(Error::NotSupported) | Err(Error::NotFound) => MgmKeyAlgorithm::TripleDes,
                Err(e) => return Err(e),
            }
        } else {
            MgmKeyAlgorithm::TripleDes
        };
        Ok(())
    }

    /// Re-select the application. Clears the PIN and management-key
    /// state, which makes this the innocuous command to issue after a
    /// cancelled or timed-out exchange left the session indeterminate.
    pub async fn reselect(&mut self) -> Result<()> {
        self.authenticated = false;
        self.pin_verified = false;
        self.select().await
    }

    async fn select(&mut self) -> Result<()> {
        let apdu = CommandApdu::new(INS_SELECT, 0x04, 0x00)
            .with_data(PIV_AID.to_vec())
            .with_le(0x100);
        self.transmit(&apdu).await?.require_success()
    }

    async fn read_version(&mut self) -> Result<Version> {
        let apdu = CommandApdu::new(INS_GET_VERSION, 0x00, 0x00).with_le(0x100);
        let resp = self.transmit(&apdu).await?;
        resp.require_success()?;
        Version::parse(resp.data())
    }

    /// Device serial number.
    pub async fn serial(&mut self) -> Result<u32> {
        let apdu = CommandApdu::new(INS_GET_SERIAL, 0x00, 0x00).with_le(0x100);
        let resp = self.transmit(&apdu).await?;
        resp.require_success()?;
        let bytes: [u8; 4] = resp
            .data()
            .try_into()
            .map_err(|_| Error::protocol("serial payload is not 4 bytes"))?;
        Ok(u32::from_be_bytes(bytes))
    }

    /// Version reported at selection time. Advisory: several devices
    /// report the application version here, so feature checks go through
    /// the status word of the actual command.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Management-key type as last reported or set.
    pub fn management_key_type(&self) -> MgmKeyAlgorithm {
        self.mgm_key_type
    }

    /// Whether a management-key mutual authentication has succeeded in
    /// this session.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Whether a PIN verification has succeeded in this session. Slots
    /// with an `Always` PIN policy need one per operation regardless.
    pub fn is_pin_verified(&self) -> bool {
        self.pin_verified
    }

    /// Register the advisory callback invoked right before operations
    /// that may block on touch or a fingerprint. The callback must not
    /// re-enter the session.
    pub fn set_presence_callback(&mut self, callback: PresenceCallback) {
        self.presence_cb = Some(callback);
    }

    pub(crate) fn notify_presence(&self, hint: PresenceHint) {
        if let Some(cb) = &self.presence_cb {
            cb(hint);
        }
    }

    pub(crate) async fn transmit(&mut self, apdu: &CommandApdu) -> Result<ResponseApdu> {
        apdu::transmit(&mut self.transport, apdu).await
    }

    pub(crate) fn set_mgm_key_type(&mut self, key_type: MgmKeyAlgorithm) {
        self.mgm_key_type = key_type;
    }

    pub(crate) fn set_authenticated(&mut self, value: bool) {
        self.authenticated = value;
    }

    pub(crate) fn set_pin_verified(&mut self, value: bool) {
        self.pin_verified = value;
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.authenticated = false;
        self.pin_verified = false;
    }
}
