//! Private key-material codec for IMPORT ASYMMETRIC KEY
//!
//! The wire format is algorithm specific: RSA travels as its five CRT
//! components, each zero-padded to half the modulus; NIST curves as the
//! scalar padded to the field size; Curve25519 as the raw 32-byte seed or
//! scalar. The public exponent is never transmitted and must be 0x010001.
//!
//! Everything here is wiped on drop. The PKCS#8 helper borrows the
//! caller's DER; wiping that input remains the caller's job.

use pkcs8::{DecodePrivateKey, ObjectIdentifier, PrivateKeyInfo};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey};
use zeroize::{Zeroize, Zeroizing};

use super::public::{OID_EC, OID_ED25519, OID_P256, OID_P384, OID_RSA, OID_X25519};
use crate::buffer::SecretBuffer;
use crate::constants::{TAG_PIN_POLICY, TAG_TOUCH_POLICY};
use crate::key::{Algorithm, EcCurve, PinPolicy, TouchPolicy};
use crate::prelude::*;
use crate::tlv;

const TAG_RSA_PRIME_P: u8 = 0x01;
const TAG_RSA_PRIME_Q: u8 = 0x02;
const TAG_RSA_EXPONENT_P: u8 = 0x03;
const TAG_RSA_EXPONENT_Q: u8 = 0x04;
const TAG_RSA_COEFFICIENT: u8 = 0x05;
const TAG_EC_SCALAR: u8 = 0x06;
const TAG_ED25519_SEED: u8 = 0x07;
const TAG_X25519_SCALAR: u8 = 0x08;

/// Private key material staged for import into a slot.
pub enum PrivateKeyMaterial {
    Rsa {
        algorithm: Algorithm,
        prime_p: SecretBuffer,
        prime_q: SecretBuffer,
        exponent_p: SecretBuffer,
        exponent_q: SecretBuffer,
        coefficient: SecretBuffer,
    },
    Ec {
        curve: EcCurve,
        scalar: SecretBuffer,
    },
    Ed25519(SecretBuffer),
    X25519(SecretBuffer),
}

impl PrivateKeyMaterial {
    /// Build RSA material from the five CRT components. Components shorter
    /// than half the modulus are zero-padded; longer ones are rejected.
    /// The public exponent is fixed at 0x010001 by the card, so a key with
    /// any other exponent must not reach this constructor.
    pub fn rsa(
        algorithm: Algorithm,
        prime_p: Vec<u8>,
        prime_q: Vec<u8>,
        exponent_p: Vec<u8>,
        exponent_q: Vec<u8>,
        coefficient: Vec<u8>,
    ) -> Result<Self> {
        let modulus_len = algorithm
            .modulus_len()
            .ok_or_else(|| Error::invalid_argument("algorithm", format!("{algorithm:?} is not RSA")))?;
        let half = modulus_len / 2;
        Ok(Self::Rsa {
            algorithm,
            prime_p: pad_left(prime_p, half, "prime_p")?,
            prime_q: pad_left(prime_q, half, "prime_q")?,
            exponent_p: pad_left(exponent_p, half, "exponent_p")?,
            exponent_q: pad_left(exponent_q, half, "exponent_q")?,
            coefficient: pad_left(coefficient, half, "coefficient")?,
        })
    }

    /// NIST-curve scalar, zero-padded to the field size.
    pub fn ec(curve: EcCurve, scalar: Vec<u8>) -> Result<Self> {
        Ok(Self::Ec {
            curve,
            scalar: pad_left(scalar, curve.field_len(), "scalar")?,
        })
    }

    /// 32-byte Ed25519 seed.
    pub fn ed25519(seed: Vec<u8>) -> Result<Self> {
        Ok(Self::Ed25519(exact32(seed, "seed")?))
    }

    /// 32-byte X25519 scalar.
    pub fn x25519(scalar: Vec<u8>) -> Result<Self> {
        Ok(Self::X25519(exact32(scalar, "scalar")?))
    }

    /// The algorithm identifier sent as P1 of the import command.
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Rsa { algorithm, .. } => *algorithm,
            Self::Ec {
                curve: EcCurve::P256,
                ..
            } => Algorithm::EccP256,
            Self::Ec {
                curve: EcCurve::P384,
                ..
            } => Algorithm::EccP384,
            Self::Ed25519(_) => Algorithm::Ed25519,
            Self::X25519(_) => Algorithm::X25519,
        }
    }

    /// Extract importable material from a PKCS#8 `PrivateKeyInfo` DER.
    ///
    /// RSA keys with a public exponent other than 0x010001 are rejected
    /// because the card cannot represent them. The borrowed DER is not
    /// wiped here; the caller owns that buffer.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let info = PrivateKeyInfo::try_from(der)
            .map_err(|e| Error::invalid_argument("private_key", format!("bad PKCS#8 DER: {e}")))?;
        let oid = info.algorithm.oid;

        if oid == OID_RSA {
            return Self::rsa_from_pkcs8(der);
        }
        if oid == OID_EC {
            let curve_oid = info.algorithm.parameters_oid().map_err(|e| {
                Error::invalid_argument("private_key", format!("EC key lacks curve OID: {e}"))
            })?;
            return Self::ec_from_pkcs8(der, curve_oid);
        }
        if oid == OID_ED25519 {
            let signing = ed25519_dalek::SigningKey::from_pkcs8_der(der).map_err(|e| {
                Error::invalid_argument("private_key", format!("bad Ed25519 key: {e}"))
            })?;
            return Self::ed25519(signing.to_bytes().to_vec());
        }
        if oid == OID_X25519 {
            // RFC 8410: the PrivateKey octet string nests a second octet
            // string holding the raw scalar.
            let inner = info.private_key;
            if inner.len() != 34 || inner[0] != 0x04 || inner[1] != 0x20 {
                return Err(Error::invalid_argument(
                    "private_key",
                    "X25519 key does not carry a 32-byte scalar",
                ));
            }
            return Self::x25519(inner[2..].to_vec());
        }

        Err(Error::invalid_argument(
            "private_key",
            format!("unsupported key algorithm {oid}"),
        ))
    }

    fn rsa_from_pkcs8(der: &[u8]) -> Result<Self> {
        let key = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| Error::invalid_argument("private_key", format!("bad RSA key: {e}")))?;
        if key.e() != &BigUint::from(65537u32) {
            return Err(Error::invalid_argument(
                "private_key",
                "RSA public exponent must be 0x010001",
            ));
        }
        let algorithm = match key.size() {
            128 => Algorithm::Rsa1024,
            256 => Algorithm::Rsa2048,
            384 => Algorithm::Rsa3072,
            512 => Algorithm::Rsa4096,
            n => {
                return Err(Error::invalid_argument(
                    "private_key",
                    format!("unsupported RSA modulus of {n} bytes"),
                ))
            }
        };
        let primes = key.primes();
        if primes.len() != 2 {
            return Err(Error::invalid_argument(
                "private_key",
                "multi-prime RSA keys cannot be imported",
            ));
        }
        let p = &primes[0];
        let q = &primes[1];
        let one = BigUint::from(1u32);
        let two = BigUint::from(2u32);
        let d = key.d();
        let exponent_p = d % (p - &one);
        let exponent_q = d % (q - &one);
        // p is prime, so Fermat gives the inverse of q directly.
        let coefficient = q.modpow(&(p - &two), p);

        Self::rsa(
            algorithm,
            p.to_bytes_be(),
            q.to_bytes_be(),
            exponent_p.to_bytes_be(),
            exponent_q.to_bytes_be(),
            coefficient.to_bytes_be(),
        )
    }

    fn ec_from_pkcs8(der: &[u8], curve_oid: ObjectIdentifier) -> Result<Self> {
        if curve_oid == OID_P256 {
            let key = p256::SecretKey::from_pkcs8_der(der).map_err(|e| {
                Error::invalid_argument("private_key", format!("bad P-256 key: {e}"))
            })?;
            Self::ec(EcCurve::P256, key.to_bytes().to_vec())
        } else if curve_oid == OID_P384 {
            let key = p384::SecretKey::from_pkcs8_der(der).map_err(|e| {
                Error::invalid_argument("private_key", format!("bad P-384 key: {e}"))
            })?;
            Self::ec(EcCurve::P384, key.to_bytes().to_vec())
        } else {
            Err(Error::invalid_argument(
                "private_key",
                format!("unsupported curve {curve_oid}"),
            ))
        }
    }

    /// Serialize the import command body: the algorithm-specific TLVs,
    /// then the optional policy TLVs.
    pub(crate) fn to_import_body(
        &self,
        pin_policy: PinPolicy,
        touch_policy: TouchPolicy,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let mut body = Zeroizing::new(Vec::new());
        match self {
            Self::Rsa {
                prime_p,
                prime_q,
                exponent_p,
                exponent_q,
                coefficient,
                ..
            } => {
                tlv::encode_into(&mut body, TAG_RSA_PRIME_P, prime_p.as_slice())?;
                tlv::encode_into(&mut body, TAG_RSA_PRIME_Q, prime_q.as_slice())?;
                tlv::encode_into(&mut body, TAG_RSA_EXPONENT_P, exponent_p.as_slice())?;
                tlv::encode_into(&mut body, TAG_RSA_EXPONENT_Q, exponent_q.as_slice())?;
                tlv::encode_into(&mut body, TAG_RSA_COEFFICIENT, coefficient.as_slice())?;
            }
            Self::Ec { scalar, .. } => {
                tlv::encode_into(&mut body, TAG_EC_SCALAR, scalar.as_slice())?;
            }
            Self::Ed25519(seed) => {
                tlv::encode_into(&mut body, TAG_ED25519_SEED, seed.as_slice())?;
            }
            Self::X25519(scalar) => {
                tlv::encode_into(&mut body, TAG_X25519_SCALAR, scalar.as_slice())?;
            }
        }
        if pin_policy != PinPolicy::Default {
            tlv::encode_into(&mut body, TAG_PIN_POLICY, &[pin_policy.id()])?;
        }
        if touch_policy != TouchPolicy::Default {
            tlv::encode_into(&mut body, TAG_TOUCH_POLICY, &[touch_policy.id()])?;
        }
        Ok(body)
    }
}

impl std::fmt::Debug for PrivateKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKeyMaterial({:?})", self.algorithm())
    }
}

/// Zero-pad `bytes` on the left to `width`, consuming and wiping the
/// input. Values wider than `width` (after discarding leading zeros) are
/// refused.
fn pad_left(mut bytes: Vec<u8>, width: usize, field: &'static str) -> Result<SecretBuffer> {
    let lead = bytes.iter().take_while(|&&b| b == 0).count();
    let significant = bytes.len() - lead;
    if significant > width {
        bytes.zeroize();
        return Err(Error::invalid_argument(
            field,
            format!("{significant} significant bytes exceed the {width}-byte field"),
        ));
    }
    let mut out = SecretBuffer::zeroed(width);
    out.as_mut_slice()[width - significant..].copy_from_slice(&bytes[lead..]);
    bytes.zeroize();
    Ok(out)
}

fn exact32(mut bytes: Vec<u8>, field: &'static str) -> Result<SecretBuffer> {
    if bytes.len() != 32 {
        let got = bytes.len();
        bytes.zeroize();
        return Err(Error::invalid_argument(
            field,
            format!("expected 32 bytes, got {got}"),
        ));
    }
    Ok(SecretBuffer::new(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlv;

    #[test]
    fn rsa_components_are_padded_to_half_modulus() {
        let material = PrivateKeyMaterial::rsa(
            Algorithm::Rsa1024,
            vec![0x11; 60],
            vec![0x22; 64],
            vec![0x33; 64],
            vec![0x44; 64],
            vec![0x55; 64],
        )
        .unwrap();
        let body = material.to_import_body(PinPolicy::Default, TouchPolicy::Default).unwrap();
        let fields = tlv::tag_map(&body).unwrap();
        let p = fields[&0x0001];
        assert_eq!(p.len(), 64);
        assert_eq!(&p[..4], &[0, 0, 0, 0]);
        assert_eq!(&p[4..], &[0x11; 60][..]);
        for tag in [0x0002u16, 0x0003, 0x0004, 0x0005] {
            assert_eq!(fields[&tag].len(), 64);
        }
    }

    #[test]
    fn oversized_component_is_refused() {
        let err = PrivateKeyMaterial::rsa(
            Algorithm::Rsa1024,
            vec![0x11; 65],
            vec![0x22; 64],
            vec![0x33; 64],
            vec![0x44; 64],
            vec![0x55; 64],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { field: "prime_p", .. }));
    }

    #[test]
    fn ec_import_body_layout() {
        let material = PrivateKeyMaterial::ec(EcCurve::P256, vec![0x42; 31]).unwrap();
        let body = material
            .to_import_body(PinPolicy::Once, TouchPolicy::Always)
            .unwrap();
        let fields = tlv::tag_map(&body).unwrap();
        let scalar = fields[&0x0006];
        assert_eq!(scalar.len(), 32);
        assert_eq!(scalar[0], 0x00);
        assert_eq!(fields[&(TAG_PIN_POLICY as u16)], &[0x02]);
        assert_eq!(fields[&(TAG_TOUCH_POLICY as u16)], &[0x02]);
    }

    #[test]
    fn default_policies_are_omitted() {
        let material = PrivateKeyMaterial::ed25519(vec![0x07; 32]).unwrap();
        let body = material
            .to_import_body(PinPolicy::Default, TouchPolicy::Default)
            .unwrap();
        let fields = tlv::tag_map(&body).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[&0x0007], &[0x07; 32][..]);
    }

    #[test]
    fn x25519_uses_tag_8_and_requires_32_bytes() {
        let material = PrivateKeyMaterial::x25519(vec![0x08; 32]).unwrap();
        let body = material
            .to_import_body(PinPolicy::Default, TouchPolicy::Default)
            .unwrap();
        let fields = tlv::tag_map(&body).unwrap();
        assert_eq!(fields[&0x0008], &[0x08; 32][..]);

        assert!(PrivateKeyMaterial::x25519(vec![0x08; 31]).is_err());
        assert!(PrivateKeyMaterial::ed25519(vec![0x07; 33]).is_err());
    }

    #[test]
    fn rsa_from_pkcs8_round_trip() {
        use rsa::pkcs8::EncodePrivateKey;

        let key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 1024).unwrap();
        let der = key.to_pkcs8_der().unwrap();
        let material = PrivateKeyMaterial::from_pkcs8_der(der.as_bytes()).unwrap();
        assert_eq!(material.algorithm(), Algorithm::Rsa1024);

        let body = material
            .to_import_body(PinPolicy::Default, TouchPolicy::Default)
            .unwrap();
        let fields = tlv::tag_map(&body).unwrap();

        // Components line up with the library's own CRT values.
        let p = &key.primes()[0];
        let q = &key.primes()[1];
        assert_eq!(strip(fields[&0x0001]), p.to_bytes_be());
        assert_eq!(strip(fields[&0x0002]), q.to_bytes_be());

        // coefficient * q == 1 (mod p)
        let coeff = BigUint::from_bytes_be(fields[&0x0005]);
        assert_eq!((coeff * q) % p, BigUint::from(1u32));
    }

    #[test]
    fn rsa_with_small_exponent_is_rejected() {
        use rsa::pkcs8::EncodePrivateKey;

        let key =
            RsaPrivateKey::new_with_exp(&mut rand::rngs::OsRng, 1024, &BigUint::from(3u32))
                .unwrap();
        let der = key.to_pkcs8_der().unwrap();
        let err = PrivateKeyMaterial::from_pkcs8_der(der.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn p256_from_pkcs8() {
        use p256::pkcs8::EncodePrivateKey;

        let key = p256::SecretKey::random(&mut rand::rngs::OsRng);
        let der = key.to_pkcs8_der().unwrap();
        let material = PrivateKeyMaterial::from_pkcs8_der(der.as_bytes()).unwrap();
        assert_eq!(material.algorithm(), Algorithm::EccP256);
        match &material {
            PrivateKeyMaterial::Ec { scalar, .. } => {
                assert_eq!(scalar.as_slice(), key.to_bytes().as_slice());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn ed25519_from_pkcs8_fixed_form() {
        // RFC 8410 v1 structure with the Ed25519 OID.
        let mut der = vec![
            0x30, 0x2E, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2B, 0x65, 0x70, 0x04,
            0x22, 0x04, 0x20,
        ];
        der.extend_from_slice(&[0x17; 32]);
        let material = PrivateKeyMaterial::from_pkcs8_der(&der).unwrap();
        assert_eq!(material.algorithm(), Algorithm::Ed25519);
    }

    #[test]
    fn x25519_from_pkcs8_fixed_form() {
        let mut der = vec![
            0x30, 0x2E, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2B, 0x65, 0x6E, 0x04,
            0x22, 0x04, 0x20,
        ];
        der.extend_from_slice(&[0x2A; 32]);
        let material = PrivateKeyMaterial::from_pkcs8_der(&der).unwrap();
        assert_eq!(material.algorithm(), Algorithm::X25519);
        match material {
            PrivateKeyMaterial::X25519(scalar) => assert_eq!(scalar.as_slice(), &[0x2A; 32]),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    fn strip(bytes: &[u8]) -> Vec<u8> {
        let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
        bytes[start..].to_vec()
    }
}
