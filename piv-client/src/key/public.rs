//! Public-key codec
//!
//! Converts between the PIV `7F 49` template the device emits and caller
//! friendly representations: a structured [`PublicKey`] or a
//! SubjectPublicKeyInfo DER suitable for certificate-request tooling.

use pkcs8::ObjectIdentifier;
use spki::der::asn1::BitString;
use spki::der::Encode;
use spki::{
    AlgorithmIdentifierOwned, DecodePublicKey, EncodePublicKey, SubjectPublicKeyInfoOwned,
    SubjectPublicKeyInfoRef,
};

use rsa::traits::PublicKeyParts;
use rsa::BigUint;

use crate::constants::{
    TAG_PUBKEY_EC_POINT, TAG_PUBKEY_RSA_EXPONENT, TAG_PUBKEY_RSA_MODULUS,
    TAG_PUBLIC_KEY_TEMPLATE,
};
use crate::key::{Algorithm, EcCurve};
use crate::prelude::*;
use crate::tlv;

pub(crate) const OID_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
pub(crate) const OID_EC: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
pub(crate) const OID_P256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
pub(crate) const OID_P384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");
pub(crate) const OID_ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");
pub(crate) const OID_X25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.110");

/// The canonical public exponent. The token accepts nothing else.
pub(crate) const RSA_EXPONENT: [u8; 3] = [0x01, 0x00, 0x01];

/// A public key read back from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// RSA modulus and the fixed `0x010001` exponent.
    Rsa { modulus: Vec<u8>, exponent: Vec<u8> },
    /// Uncompressed NIST point, `04 || X || Y`.
    Ec { curve: EcCurve, point: Vec<u8> },
    /// Ed25519 compressed point.
    Ed25519([u8; 32]),
    /// X25519 u-coordinate.
    X25519([u8; 32]),
}

impl PublicKey {
    /// Parse the public-key template a GENERATE ASYMMETRIC or metadata
    /// response carries. Accepts the value with or without its `7F 49`
    /// wrapper, since metadata nests it one level deeper.
    pub(crate) fn decode(algorithm: Algorithm, data: &[u8]) -> Result<Self> {
        let inner = if data.first() == Some(&0x7F) {
            tlv::read_single(data, TAG_PUBLIC_KEY_TEMPLATE)?
        } else {
            data
        };
        let fields = tlv::tag_map(inner)?;

        if let Some(modulus_len) = algorithm.modulus_len() {
            let modulus = *fields
                .get(&(TAG_PUBKEY_RSA_MODULUS as u16))
                .ok_or_else(|| Error::protocol("public-key template lacks RSA modulus"))?;
            let exponent = *fields
                .get(&(TAG_PUBKEY_RSA_EXPONENT as u16))
                .ok_or_else(|| Error::protocol("public-key template lacks RSA exponent"))?;
            if strip_leading_zeros(exponent) != [0x01, 0x00, 0x01] {
                return Err(Error::protocol(format!(
                    "device reported RSA exponent {}, expected 010001",
                    hex::encode(exponent)
                )));
            }
            if modulus.len() != modulus_len {
                return Err(Error::protocol(format!(
                    "RSA modulus of {} bytes does not match {algorithm:?}",
                    modulus.len()
                )));
            }
            return Ok(Self::Rsa {
                modulus: modulus.to_vec(),
                exponent: RSA_EXPONENT.to_vec(),
            });
        }

        let point = *fields
            .get(&(TAG_PUBKEY_EC_POINT as u16))
            .ok_or_else(|| Error::protocol("public-key template lacks EC point"))?;
        match algorithm {
            Algorithm::EccP256 | Algorithm::EccP384 => {
                let curve = match algorithm {
                    Algorithm::EccP256 => EcCurve::P256,
                    _ => EcCurve::P384,
                };
                if point.len() != curve.point_len() || point[0] != 0x04 {
                    return Err(Error::protocol(format!(
                        "EC point of {} bytes is not an uncompressed {curve:?} point",
                        point.len()
                    )));
                }
                Ok(Self::Ec {
                    curve,
                    point: point.to_vec(),
                })
            }
            Algorithm::Ed25519 | Algorithm::X25519 => {
                let bytes: [u8; 32] = point.try_into().map_err(|_| {
                    Error::protocol("Curve25519 point is not exactly 32 bytes")
                })?;
                if algorithm == Algorithm::Ed25519 {
                    Ok(Self::Ed25519(bytes))
                } else {
                    Ok(Self::X25519(bytes))
                }
            }
            other => Err(Error::invalid_argument(
                "algorithm",
                format!("{other:?} does not describe an asymmetric key"),
            )),
        }
    }

    /// The PIV algorithm this key belongs to.
    pub fn algorithm(&self) -> Option<Algorithm> {
        match self {
            Self::Rsa { modulus, .. } => match modulus.len() {
                128 => Some(Algorithm::Rsa1024),
                256 => Some(Algorithm::Rsa2048),
                384 => Some(Algorithm::Rsa3072),
                512 => Some(Algorithm::Rsa4096),
                _ => None,
            },
            Self::Ec { curve, .. } => Some(match curve {
                EcCurve::P256 => Algorithm::EccP256,
                EcCurve::P384 => Algorithm::EccP384,
            }),
            Self::Ed25519(_) => Some(Algorithm::Ed25519),
            Self::X25519(_) => Some(Algorithm::X25519),
        }
    }

    /// X and Y coordinates of a NIST key.
    pub fn coordinates(&self) -> Option<(&[u8], &[u8])> {
        match self {
            Self::Ec { curve, point } => {
                let n = curve.field_len();
                Some((&point[1..1 + n], &point[1 + n..]))
            }
            _ => None,
        }
    }

    /// Encode as SubjectPublicKeyInfo DER.
    pub fn to_spki_der(&self) -> Result<Vec<u8>> {
        match self {
            Self::Rsa { modulus, exponent } => {
                let key = rsa::RsaPublicKey::new(
                    BigUint::from_bytes_be(modulus),
                    BigUint::from_bytes_be(exponent),
                )
                .map_err(|e| Error::protocol(format!("unusable RSA public key: {e}")))?;
                Ok(key
                    .to_public_key_der()
                    .map_err(|e| Error::protocol(format!("SPKI encoding failed: {e}")))?
                    .into_vec())
            }
            Self::Ec {
                curve: EcCurve::P256,
                point,
            } => {
                let key = p256::PublicKey::from_sec1_bytes(point)
                    .map_err(|e| Error::protocol(format!("invalid P-256 point: {e}")))?;
                Ok(key
                    .to_public_key_der()
                    .map_err(|e| Error::protocol(format!("SPKI encoding failed: {e}")))?
                    .into_vec())
            }
            Self::Ec {
                curve: EcCurve::P384,
                point,
            } => {
                let key = p384::PublicKey::from_sec1_bytes(point)
                    .map_err(|e| Error::protocol(format!("invalid P-384 point: {e}")))?;
                Ok(key
                    .to_public_key_der()
                    .map_err(|e| Error::protocol(format!("SPKI encoding failed: {e}")))?
                    .into_vec())
            }
            Self::Ed25519(bytes) => {
                let key = ed25519_dalek::VerifyingKey::from_bytes(bytes)
                    .map_err(|e| Error::protocol(format!("invalid Ed25519 point: {e}")))?;
                Ok(key
                    .to_public_key_der()
                    .map_err(|e| Error::protocol(format!("SPKI encoding failed: {e}")))?
                    .into_vec())
            }
            Self::X25519(bytes) => {
                let spki_doc = SubjectPublicKeyInfoOwned {
                    algorithm: AlgorithmIdentifierOwned {
                        oid: OID_X25519,
                        parameters: None,
                    },
                    subject_public_key: BitString::from_bytes(bytes)
                        .map_err(|e| Error::protocol(format!("SPKI encoding failed: {e}")))?,
                };
                spki_doc
                    .to_der()
                    .map_err(|e| Error::protocol(format!("SPKI encoding failed: {e}")))
            }
        }
    }

    /// Parse a SubjectPublicKeyInfo DER back into a structured key.
    pub fn from_spki_der(der: &[u8]) -> Result<Self> {
        let spki_doc = SubjectPublicKeyInfoRef::try_from(der)
            .map_err(|e| Error::invalid_argument("public_key", format!("bad SPKI DER: {e}")))?;
        let oid = spki_doc.algorithm.oid;

        if oid == OID_RSA {
            let key = rsa::RsaPublicKey::from_public_key_der(der)
                .map_err(|e| Error::invalid_argument("public_key", format!("bad RSA SPKI: {e}")))?;
            if key.e() != &BigUint::from(65537u32) {
                return Err(Error::invalid_argument(
                    "public_key",
                    "RSA public exponent must be 0x010001",
                ));
            }
            return Ok(Self::Rsa {
                modulus: key.n().to_bytes_be(),
                exponent: RSA_EXPONENT.to_vec(),
            });
        }

        let raw = spki_doc
            .subject_public_key
            .as_bytes()
            .ok_or_else(|| Error::invalid_argument("public_key", "SPKI bit string has padding"))?;

        if oid == OID_EC {
            let curve_oid = spki_doc.algorithm.parameters_oid().map_err(|e| {
                Error::invalid_argument("public_key", format!("EC SPKI lacks curve: {e}"))
            })?;
            let curve = if curve_oid == OID_P256 {
                EcCurve::P256
            } else if curve_oid == OID_P384 {
                EcCurve::P384
            } else {
                return Err(Error::invalid_argument(
                    "public_key",
                    format!("unsupported curve {curve_oid}"),
                ));
            };
            if raw.len() != curve.point_len() || raw[0] != 0x04 {
                return Err(Error::invalid_argument(
                    "public_key",
                    "EC SPKI does not carry an uncompressed point",
                ));
            }
            return Ok(Self::Ec {
                curve,
                point: raw.to_vec(),
            });
        }

        if oid == OID_ED25519 || oid == OID_X25519 {
            let bytes: [u8; 32] = raw.try_into().map_err(|_| {
                Error::invalid_argument("public_key", "Curve25519 key is not 32 bytes")
            })?;
            return Ok(if oid == OID_ED25519 {
                Self::Ed25519(bytes)
            } else {
                Self::X25519(bytes)
            });
        }

        Err(Error::invalid_argument(
            "public_key",
            format!("unsupported key algorithm {oid}"),
        ))
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}
