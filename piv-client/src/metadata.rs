//! Read-only views the device reports about itself
//!
//! Firmware version plus the metadata records for key slots, the
//! management key, PIN/PUK retry state and the biometric subsystem. All
//! parsers take the tag map of an `INS F7` response; absent slots never
//! reach them (the session maps those status words to `Ok(None)`).

use serde::Serialize;
use std::fmt;

use crate::constants::{
    TAG_METADATA_ALGORITHM, TAG_METADATA_BIO_CONFIGURED, TAG_METADATA_IS_DEFAULT,
    TAG_METADATA_ORIGIN, TAG_METADATA_POLICY, TAG_METADATA_PUBLIC_KEY, TAG_METADATA_RETRIES,
    TAG_METADATA_TEMPORARY_PIN,
};
use crate::key::{Algorithm, KeyOrigin, PinPolicy, PublicKey, TouchPolicy};
use crate::mgm::MgmKeyAlgorithm;
use crate::prelude::*;

type TagMap<'a> = std::collections::BTreeMap<u16, &'a [u8]>;

/// Application version as reported by the token.
///
/// Many devices report the PIV application version here rather than the
/// firmware version, so this is advisory: feature detection goes through
/// "try the command and map the status word", not version comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Version {
    pub(crate) fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 3 {
            return Err(Error::protocol(format!(
                "version payload of {} bytes, expected 3",
                data.len()
            )));
        }
        Ok(Self {
            major: data[0],
            minor: data[1],
            patch: data[2],
        })
    }

    /// Fast path: metadata appeared in 5.3, so older-reporting devices
    /// skip the probe entirely. When the probe does run and the device
    /// answers "not supported" anyway, the caller degrades via the
    /// status word, not this comparison.
    pub fn supports_metadata(&self) -> bool {
        (self.major, self.minor) >= (5, 3)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Metadata for an asymmetric key slot.
#[derive(Debug, Clone)]
pub struct SlotMetadata {
    pub algorithm: Algorithm,
    pub pin_policy: PinPolicy,
    pub touch_policy: TouchPolicy,
    pub origin: Option<KeyOrigin>,
    /// Present iff the slot holds an asymmetric key.
    pub public_key: Option<PublicKey>,
    pub is_default: bool,
}

impl SlotMetadata {
    pub fn generated_on_device(&self) -> bool {
        self.origin == Some(KeyOrigin::Generated)
    }
}

pub(crate) fn parse_slot_metadata(map: &TagMap<'_>) -> Result<SlotMetadata> {
    let algorithm_id = require_byte(map, TAG_METADATA_ALGORITHM, "algorithm")?;
    let algorithm = Algorithm::from_id(algorithm_id)
        .ok_or_else(|| Error::protocol(format!("unknown algorithm {algorithm_id:#04X}")))?;

    let policy = require(map, TAG_METADATA_POLICY, "policy")?;
    if policy.len() < 2 {
        return Err(Error::protocol("metadata policy pair is truncated"));
    }
    let pin_policy = PinPolicy::from_id(policy[0])
        .ok_or_else(|| Error::protocol(format!("unknown PIN policy {:#04X}", policy[0])))?;
    let touch_policy = TouchPolicy::from_id(policy[1])
        .ok_or_else(|| Error::protocol(format!("unknown touch policy {:#04X}", policy[1])))?;

    let origin = map
        .get(&(TAG_METADATA_ORIGIN as u16))
        .and_then(|v| v.first())
        .copied()
        .and_then(KeyOrigin::from_id);

    let public_key = map
        .get(&(TAG_METADATA_PUBLIC_KEY as u16))
        .map(|v| PublicKey::decode(algorithm, v))
        .transpose()?;

    Ok(SlotMetadata {
        algorithm,
        pin_policy,
        touch_policy,
        origin,
        public_key,
        is_default: flag(map, TAG_METADATA_IS_DEFAULT),
    })
}

/// Metadata for the management key in slot 9B.
#[derive(Debug, Clone, Copy)]
pub struct ManagementKeyMetadata {
    pub key_type: MgmKeyAlgorithm,
    pub touch_policy: TouchPolicy,
    pub is_default: bool,
}

pub(crate) fn parse_management_key_metadata(map: &TagMap<'_>) -> Result<ManagementKeyMetadata> {
    let type_id = require_byte(map, TAG_METADATA_ALGORITHM, "key type")?;
    let key_type = MgmKeyAlgorithm::from_algorithm_id(type_id)
        .ok_or_else(|| Error::protocol(format!("unknown management key type {type_id:#04X}")))?;

    // Byte 0 of the policy pair is unused for slot 9B.
    let policy = require(map, TAG_METADATA_POLICY, "policy")?;
    if policy.len() < 2 {
        return Err(Error::protocol("metadata policy pair is truncated"));
    }
    let touch_policy = TouchPolicy::from_id(policy[1])
        .ok_or_else(|| Error::protocol(format!("unknown touch policy {:#04X}", policy[1])))?;

    Ok(ManagementKeyMetadata {
        key_type,
        touch_policy,
        is_default: flag(map, TAG_METADATA_IS_DEFAULT),
    })
}

/// Retry state of the PIN or PUK.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PinMetadata {
    pub is_default: bool,
    pub total_retries: u8,
    pub retries_remaining: u8,
}

impl PinMetadata {
    pub fn is_blocked(&self) -> bool {
        self.retries_remaining == 0
    }
}

pub(crate) fn parse_pin_metadata(map: &TagMap<'_>) -> Result<PinMetadata> {
    let retries = require(map, TAG_METADATA_RETRIES, "retries")?;
    if retries.len() < 2 {
        return Err(Error::protocol("metadata retry pair is truncated"));
    }
    Ok(PinMetadata {
        is_default: flag(map, TAG_METADATA_IS_DEFAULT),
        total_retries: retries[0],
        retries_remaining: retries[1],
    })
}

/// State of the biometric subsystem, absent on non-bio devices.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BioMetadata {
    /// Fingerprints are enrolled.
    pub is_configured: bool,
    pub attempts_remaining: u8,
    /// A temporary PIN has been generated for this session.
    pub has_temporary_pin: bool,
}

pub(crate) fn parse_bio_metadata(map: &TagMap<'_>) -> Result<BioMetadata> {
    Ok(BioMetadata {
        is_configured: flag(map, TAG_METADATA_BIO_CONFIGURED),
        attempts_remaining: map
            .get(&(TAG_METADATA_RETRIES as u16))
            .and_then(|v| v.first())
            .copied()
            .unwrap_or(0),
        has_temporary_pin: flag(map, TAG_METADATA_TEMPORARY_PIN),
    })
}

fn require<'a>(map: &TagMap<'a>, tag: u8, what: &str) -> Result<&'a [u8]> {
    map.get(&(tag as u16))
        .copied()
        .ok_or_else(|| Error::protocol(format!("metadata response lacks {what} (tag {tag:#04X})")))
}

fn require_byte(map: &TagMap<'_>, tag: u8, what: &str) -> Result<u8> {
    let value = require(map, tag, what)?;
    value
        .first()
        .copied()
        .ok_or_else(|| Error::protocol(format!("metadata {what} is empty")))
}

fn flag(map: &TagMap<'_>, tag: u8) -> bool {
    map.get(&(tag as u16))
        .and_then(|v| v.first())
        .map(|&b| b == 0x01)
        .unwrap_or(false)
}
