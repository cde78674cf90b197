//! Slots, algorithms and key policies
//!
//! The value sets here are fixed by SP 800-73 and the vendor extensions;
//! nothing is open-ended. Conversions to and from the wire bytes live next
//! to the enums so command handlers never see raw identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::object_id;
use crate::prelude::*;

mod private;
mod public;

pub use private::PrivateKeyMaterial;
pub use public::PublicKey;

/// A key slot on the token.
///
/// Slot 9B holds the symmetric management key; 0xF9 holds the attestation
/// key and only ever signs attestation certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Slot {
    Authentication = 0x9A,
    CardManagement = 0x9B,
    Signature = 0x9C,
    KeyManagement = 0x9D,
    CardAuthentication = 0x9E,
    Retired1 = 0x82,
    Retired2 = 0x83,
    Retired3 = 0x84,
    Retired4 = 0x85,
    Retired5 = 0x86,
    Retired6 = 0x87,
    Retired7 = 0x88,
    Retired8 = 0x89,
    Retired9 = 0x8A,
    Retired10 = 0x8B,
    Retired11 = 0x8C,
    Retired12 = 0x8D,
    Retired13 = 0x8E,
    Retired14 = 0x8F,
    Retired15 = 0x90,
    Retired16 = 0x91,
    Retired17 = 0x92,
    Retired18 = 0x93,
    Retired19 = 0x94,
    Retired20 = 0x95,
    Attestation = 0xF9,
}

impl Slot {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0x9A => Self::Authentication,
            0x9B => Self::CardManagement,
            0x9C => Self::Signature,
            0x9D => Self::KeyManagement,
            0x9E => Self::CardAuthentication,
            0x82..=0x95 => RETIRED[(id - 0x82) as usize],
            0xF9 => Self::Attestation,
            _ => return None,
        })
    }

    /// Whether the slot can hold an asymmetric private key.
    pub fn is_asymmetric(self) -> bool {
        self != Self::CardManagement
    }

    /// Data object holding this slot's certificate, if it has one.
    pub fn certificate_object(self) -> Option<u32> {
        Some(match self {
            Self::Authentication => object_id::AUTHENTICATION,
            Self::Signature => object_id::SIGNATURE,
            Self::KeyManagement => object_id::KEY_MANAGEMENT,
            Self::CardAuthentication => object_id::CARD_AUTH,
            Self::Attestation => object_id::ATTESTATION,
            Self::CardManagement => return None,
            retired => object_id::retired(retired.id() - 0x82 + 1),
        })
    }
}

const RETIRED: [Slot; 20] = [
    Slot::Retired1,
    Slot::Retired2,
    Slot::Retired3,
    Slot::Retired4,
    Slot::Retired5,
    Slot::Retired6,
    Slot::Retired7,
    Slot::Retired8,
    Slot::Retired9,
    Slot::Retired10,
    Slot::Retired11,
    Slot::Retired12,
    Slot::Retired13,
    Slot::Retired14,
    Slot::Retired15,
    Slot::Retired16,
    Slot::Retired17,
    Slot::Retired18,
    Slot::Retired19,
    Slot::Retired20,
];

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.id())
    }
}

/// PIV algorithm identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Algorithm {
    None = 0x00,
    TripleDes = 0x03,
    Rsa3072 = 0x05,
    Rsa1024 = 0x06,
    Rsa2048 = 0x07,
    Aes128 = 0x08,
    Aes192 = 0x0A,
    Aes256 = 0x0C,
    EccP256 = 0x11,
    EccP384 = 0x14,
    Rsa4096 = 0x16,
    Ed25519 = 0xE0,
    X25519 = 0xE1,
    Pin = 0xFF,
}

impl Algorithm {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0x00 => Self::None,
            0x03 => Self::TripleDes,
            0x05 => Self::Rsa3072,
            0x06 => Self::Rsa1024,
            0x07 => Self::Rsa2048,
            0x08 => Self::Aes128,
            0x0A => Self::Aes192,
            0x0C => Self::Aes256,
            0x11 => Self::EccP256,
            0x14 => Self::EccP384,
            0x16 => Self::Rsa4096,
            0xE0 => Self::Ed25519,
            0xE1 => Self::X25519,
            0xFF => Self::Pin,
            _ => return None,
        })
    }

    /// Nominal key size in bits.
    pub fn key_size_bits(self) -> usize {
        match self {
            Self::None => 0,
            Self::TripleDes | Self::Aes192 => 192,
            Self::Aes128 => 128,
            Self::Aes256 | Self::EccP256 | Self::Ed25519 | Self::X25519 => 256,
            Self::EccP384 => 384,
            Self::Rsa1024 => 1024,
            Self::Rsa2048 => 2048,
            Self::Rsa3072 => 3072,
            Self::Rsa4096 => 4096,
            Self::Pin => 64,
        }
    }

    pub fn is_rsa(self) -> bool {
        matches!(
            self,
            Self::Rsa1024 | Self::Rsa2048 | Self::Rsa3072 | Self::Rsa4096
        )
    }

    /// RSA modulus length in bytes.
    pub(crate) fn modulus_len(self) -> Option<usize> {
        self.is_rsa().then(|| self.key_size_bits() / 8)
    }

    pub(crate) fn ec_curve(self) -> Option<EcCurve> {
        match self {
            Self::EccP256 => Some(EcCurve::P256),
            Self::EccP384 => Some(EcCurve::P384),
            _ => None,
        }
    }
}

/// NIST curves the token implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EcCurve {
    P256,
    P384,
}

impl EcCurve {
    /// Field element size in bytes.
    pub fn field_len(self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
        }
    }

    /// Length of an uncompressed point (`04 || X || Y`).
    pub fn point_len(self) -> usize {
        1 + 2 * self.field_len()
    }
}

/// When the PIN must be presented for a private-key operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PinPolicy {
    #[default]
    Default = 0x00,
    Never = 0x01,
    Once = 0x02,
    Always = 0x03,
    MatchOnce = 0x04,
    MatchAlways = 0x05,
}

impl PinPolicy {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0x00 => Self::Default,
            0x01 => Self::Never,
            0x02 => Self::Once,
            0x03 => Self::Always,
            0x04 => Self::MatchOnce,
            0x05 => Self::MatchAlways,
            _ => return None,
        })
    }
}

/// When the token demands a touch for a private-key operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TouchPolicy {
    #[default]
    Default = 0x00,
    Never = 0x01,
    Always = 0x02,
    Cached = 0x03,
}

impl TouchPolicy {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0x00 => Self::Default,
            0x01 => Self::Never,
            0x02 => Self::Always,
            0x03 => Self::Cached,
            _ => return None,
        })
    }
}

/// How a key got into its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyOrigin {
    Generated,
    Imported,
}

impl KeyOrigin {
    pub(crate) fn from_id(id: u8) -> Option<Self> {
        match id {
            0x01 => Some(Self::Generated),
            0x02 => Some(Self::Imported),
            _ => None,
        }
    }
}

/// Shared helper: the slot byte for an asymmetric operation, rejecting the
/// management slot early with a clear error.
pub(crate) fn require_asymmetric(slot: Slot, field: &'static str) -> Result<()> {
    if !slot.is_asymmetric() {
        return Err(Error::invalid_argument(
            field,
            "slot 9B holds the symmetric management key",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_ids_round_trip() {
        for id in (0x82..=0x95).chain([0x9A, 0x9B, 0x9C, 0x9D, 0x9E, 0xF9]) {
            let slot = Slot::from_id(id).unwrap();
            assert_eq!(slot.id(), id);
        }
        assert!(Slot::from_id(0x00).is_none());
        assert!(Slot::from_id(0x96).is_none());
        assert!(Slot::from_id(0x81).is_none());
    }

    #[test]
    fn certificate_objects_match_table() {
        assert_eq!(
            Slot::Authentication.certificate_object(),
            Some(0x005F_C105)
        );
        assert_eq!(Slot::Signature.certificate_object(), Some(0x005F_C10A));
        assert_eq!(Slot::KeyManagement.certificate_object(), Some(0x005F_C10B));
        assert_eq!(
            Slot::CardAuthentication.certificate_object(),
            Some(0x005F_C101)
        );
        assert_eq!(Slot::Retired1.certificate_object(), Some(0x005F_C10D));
        assert_eq!(Slot::Retired20.certificate_object(), Some(0x005F_C120));
        assert_eq!(Slot::Attestation.certificate_object(), Some(0x005F_C121));
        assert_eq!(Slot::CardManagement.certificate_object(), None);
    }

    #[test]
    fn algorithm_ids_round_trip() {
        for alg in [
            Algorithm::TripleDes,
            Algorithm::Rsa1024,
            Algorithm::Rsa2048,
            Algorithm::Rsa3072,
            Algorithm::Rsa4096,
            Algorithm::Aes128,
            Algorithm::Aes192,
            Algorithm::Aes256,
            Algorithm::EccP256,
            Algorithm::EccP384,
            Algorithm::Ed25519,
            Algorithm::X25519,
            Algorithm::Pin,
        ] {
            assert_eq!(Algorithm::from_id(alg.id()), Some(alg));
        }
        assert!(Algorithm::from_id(0x42).is_none());
    }

    #[test]
    fn rsa_modulus_lengths() {
        assert_eq!(Algorithm::Rsa1024.modulus_len(), Some(128));
        assert_eq!(Algorithm::Rsa2048.modulus_len(), Some(256));
        assert_eq!(Algorithm::Rsa3072.modulus_len(), Some(384));
        assert_eq!(Algorithm::Rsa4096.modulus_len(), Some(512));
        assert_eq!(Algorithm::EccP256.modulus_len(), None);
    }

    #[test]
    fn curve_sizes() {
        assert_eq!(EcCurve::P256.field_len(), 32);
        assert_eq!(EcCurve::P384.field_len(), 48);
        assert_eq!(EcCurve::P256.point_len(), 65);
        assert_eq!(EcCurve::P384.point_len(), 97);
    }

    #[test]
    fn policy_bytes() {
        assert_eq!(PinPolicy::Always.id(), 0x03);
        assert_eq!(PinPolicy::from_id(0x05), Some(PinPolicy::MatchAlways));
        assert_eq!(TouchPolicy::Always.id(), 0x02);
        assert_eq!(TouchPolicy::from_id(0x03), Some(TouchPolicy::Cached));
        assert_eq!(PinPolicy::default(), PinPolicy::Default);
        assert_eq!(TouchPolicy::default(), TouchPolicy::Default);
    }
}
