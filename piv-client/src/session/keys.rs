//! Asymmetric-key commands: generate, import, use, attest, move, delete
//!
//! The private-key operations share one framing, the dynamic
//! authentication template: an empty `82` response slot plus the payload
//! under `81` (sign/decrypt) or `85` (key agreement). Input sizing rules
//! differ per family and are applied here, before the template is built;
//! the library never hashes — sign inputs are digests already.

use zeroize::Zeroizing;

use crate::apdu::CommandApdu;
use crate::buffer::SecretBuffer;
use crate::constants::{
    INS_ATTEST, INS_GENERAL_AUTHENTICATE, INS_GENERATE_ASYMMETRIC, INS_IMPORT_KEY, INS_MOVE_KEY,
    TAG_AUTH_CHALLENGE, TAG_AUTH_EXPONENTIATION, TAG_AUTH_RESPONSE, TAG_DYN_AUTH,
    TAG_GEN_ALGORITHM, TAG_GEN_TEMPLATE, TAG_PIN_POLICY, TAG_TOUCH_POLICY,
};
use crate::key::{require_asymmetric, Algorithm, PinPolicy, PrivateKeyMaterial, PublicKey, Slot, TouchPolicy};
use crate::prelude::*;
use crate::tlv;
use crate::transport::{PresenceHint, Transport};

use super::Session;

impl<T: Transport> Session<T> {
    /// Generate a key on the device. Requires management-key
    /// authentication; the private part never leaves the token.
    pub async fn generate_key(
        &mut self,
        slot: Slot,
        algorithm: Algorithm,
        pin_policy: PinPolicy,
        touch_policy: TouchPolicy,
    ) -> Result<PublicKey> {
        require_asymmetric(slot, "slot")?;
        require_asymmetric_algorithm(algorithm)?;

        let mut inner = Vec::new();
        tlv::encode_into(&mut inner, TAG_GEN_ALGORITHM, &[algorithm.id()])?;
        if pin_policy != PinPolicy::Default {
            tlv::encode_into(&mut inner, TAG_PIN_POLICY, &[pin_policy.id()])?;
        }
        if touch_policy != TouchPolicy::Default {
            tlv::encode_into(&mut inner, TAG_TOUCH_POLICY, &[touch_policy.id()])?;
        }
        let body = tlv::encode(TAG_GEN_TEMPLATE, &inner)?;

        let apdu = CommandApdu::new(INS_GENERATE_ASYMMETRIC, 0x00, slot.id())
            .with_data(body)
            .with_le(0x100);
        let resp = self.transmit(&apdu).await?;
        resp.require_success()?;
        info!(%slot, ?algorithm, "key generated on device");
        PublicKey::decode(algorithm, resp.data())
    }

    /// Import caller-supplied key material into a slot. Requires
    /// management-key authentication. The material is consumed and wiped
    /// once the command completes, whatever the outcome.
    pub async fn import_key(
        &mut self,
        slot: Slot,
        material: PrivateKeyMaterial,
        pin_policy: PinPolicy,
        touch_policy: TouchPolicy,
    ) -> Result<()> {
        require_asymmetric(slot, "slot")?;
        let algorithm = material.algorithm();
        let mut body = material.to_import_body(pin_policy, touch_policy)?;

        let apdu = CommandApdu::new(INS_IMPORT_KEY, algorithm.id(), slot.id())
            .with_data(std::mem::take(&mut *body));
        self.transmit(&apdu).await?.require_success()?;
        info!(%slot, ?algorithm, "key imported");
        Ok(())
    }

    /// Sign a digest (or, for Ed25519, the message itself) with the key
    /// in `slot`. Blocks on touch when the slot's policy demands it.
    pub async fn sign(
        &mut self,
        slot: Slot,
        algorithm: Algorithm,
        digest: &[u8],
    ) -> Result<Vec<u8>> {
        let prepared = prepare_sign_input(algorithm, digest)?;
        let resp = self
            .use_private_key(slot, algorithm, TAG_AUTH_CHALLENGE, &prepared)
            .await?;
        Ok(resp.to_vec())
    }

    /// Raw RSA decryption. The result is padded plaintext; stripping
    /// OAEP or PKCS#1 is the caller's business, so the buffer comes back
    /// wipe-on-drop.
    pub async fn decrypt(
        &mut self,
        slot: Slot,
        algorithm: Algorithm,
        ciphertext: &[u8],
    ) -> Result<SecretBuffer> {
        if !algorithm.is_rsa() {
            return Err(Error::invalid_argument(
                "algorithm",
                "decrypt is an RSA operation; use key_agreement for curves",
            ));
        }
        let prepared = prepare_rsa_input(algorithm, ciphertext)?;
        let resp = self
            .use_private_key(slot, algorithm, TAG_AUTH_CHALLENGE, &prepared)
            .await?;
        Ok(SecretBuffer::from(&resp[..]))
    }

    /// ECDH (or X25519) key agreement with a peer public point. NIST
    /// peers are the uncompressed `04 || X || Y` encoding; X25519 peers
    /// the 32-byte u-coordinate. Returns the raw shared secret.
    pub async fn key_agreement(
        &mut self,
        slot: Slot,
        algorithm: Algorithm,
        peer_point: &[u8],
    ) -> Result<SecretBuffer> {
        let expected = match algorithm {
            Algorithm::EccP256 | Algorithm::EccP384 => {
                if peer_point.first() != Some(&0x04) {
                    return Err(Error::invalid_argument(
                        "peer_point",
                        "NIST peer must be an uncompressed point",
                    ));
                }
                if algorithm == Algorithm::EccP256 {
                    65
                } else {
                    97
                }
            }
            Algorithm::X25519 => 32,
            other => {
                return Err(Error::invalid_argument(
                    "algorithm",
                    format!("{other:?} does not support key agreement"),
                ))
            }
        };
        if peer_point.len() != expected {
            return Err(Error::invalid_argument(
                "peer_point",
                format!("expected {expected} bytes, got {}", peer_point.len()),
            ));
        }

        let resp = self
            .use_private_key(slot, algorithm, TAG_AUTH_EXPONENTIATION, peer_point)
            .await?;
        Ok(SecretBuffer::from(&resp[..]))
    }

    /// Ask the attestation key to certify that `slot`'s key was generated
    /// on this device. Returns the X.509 certificate DER.
    pub async fn attest(&mut self, slot: Slot) -> Result<Vec<u8>> {
        require_asymmetric(slot, "slot")?;
        if slot == Slot::Attestation {
            return Err(Error::invalid_argument(
                "slot",
                "the attestation key cannot attest itself",
            ));
        }
        let apdu = CommandApdu::new(INS_ATTEST, slot.id(), 0x00);
        let resp = self.transmit(&apdu).await?;
        resp.require_success()?;
        Ok(resp.data().to_vec())
    }

    /// Move a key between slots. The attestation slot is pinned.
    pub async fn move_key(&mut self, source: Slot, destination: Slot) -> Result<()> {
        require_asymmetric(source, "source")?;
        require_asymmetric(destination, "destination")?;
        if source == Slot::Attestation || destination == Slot::Attestation {
            return Err(Error::invalid_argument(
                "slot",
                "the attestation key cannot be moved",
            ));
        }
        if source == destination {
            return Err(Error::invalid_argument(
                "destination",
                "source and destination are the same slot",
            ));
        }
        let apdu = CommandApdu::new(INS_MOVE_KEY, destination.id(), source.id());
        self.transmit(&apdu).await?.require_success()?;
        info!(%source, %destination, "key moved");
        Ok(())
    }

    /// Delete the key in `slot`.
    pub async fn delete_key(&mut self, slot: Slot) -> Result<()> {
        require_asymmetric(slot, "slot")?;
        let apdu = CommandApdu::new(INS_MOVE_KEY, 0xFF, slot.id());
        self.transmit(&apdu).await?.require_success()?;
        info!(%slot, "key deleted");
        Ok(())
    }

    /// Shared framing for sign/decrypt/agree: `7C { 82 00, tag payload }`,
    /// response `7C { 82 result }`.
    async fn use_private_key(
        &mut self,
        slot: Slot,
        algorithm: Algorithm,
        payload_tag: u8,
        payload: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        require_asymmetric(slot, "slot")?;

        let mut inner = Zeroizing::new(Vec::with_capacity(payload.len() + 8));
        tlv::encode_into(&mut inner, TAG_AUTH_RESPONSE, &[])?;
        tlv::encode_into(&mut inner, payload_tag, payload)?;
        let body = tlv::encode(TAG_DYN_AUTH, &inner)?;

        self.notify_presence(PresenceHint::Touch);
        let apdu = CommandApdu::new(INS_GENERAL_AUTHENTICATE, algorithm.id(), slot.id())
            .with_data(body)
            .with_le(0x100);
        let resp = self.transmit(&apdu).await?;
        resp.require_success()?;

        let template = tlv::read_single(resp.data(), TAG_DYN_AUTH)?;
        let fields = tlv::tag_map(template)?;
        let result = fields
            .get(&(TAG_AUTH_RESPONSE as u16))
            .ok_or_else(|| Error::protocol("dynamic authentication response lacks a result"))?;
        Ok(Zeroizing::new(result.to_vec()))
    }
}

fn require_asymmetric_algorithm(algorithm: Algorithm) -> Result<()> {
    let asymmetric = algorithm.is_rsa()
        || algorithm.ec_curve().is_some()
        || matches!(algorithm, Algorithm::Ed25519 | Algorithm::X25519);
    if !asymmetric {
        return Err(Error::invalid_argument(
            "algorithm",
            format!("{algorithm:?} cannot live in an asymmetric slot"),
        ));
    }
    Ok(())
}

/// Size the sign input for the slot's algorithm.
///
/// RSA wants exactly the modulus: shorter inputs gain zeros on the left,
/// longer ones lose their leading bytes. NIST curves keep the most
/// significant `field_len` bytes of an over-long digest and pad short
/// ones with zeros on the right. Ed25519 signs the message as-is; X25519
/// cannot sign at all.
fn prepare_sign_input(algorithm: Algorithm, digest: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if algorithm.is_rsa() {
        return prepare_rsa_input(algorithm, digest);
    }
    match algorithm {
        Algorithm::EccP256 | Algorithm::EccP384 => {
            let len = if algorithm == Algorithm::EccP256 { 32 } else { 48 };
            let mut out = Zeroizing::new(vec![0u8; len]);
            if digest.len() >= len {
                out.copy_from_slice(&digest[..len]);
            } else {
                out[..digest.len()].copy_from_slice(digest);
            }
            Ok(out)
        }
        Algorithm::Ed25519 => Ok(Zeroizing::new(digest.to_vec())),
        Algorithm::X25519 => Err(Error::invalid_argument(
            "algorithm",
            "X25519 only supports key agreement",
        )),
        other => Err(Error::invalid_argument(
            "algorithm",
            format!("{other:?} cannot sign"),
        )),
    }
}

fn prepare_rsa_input(algorithm: Algorithm, data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let modulus_len = algorithm
        .modulus_len()
        .ok_or_else(|| Error::invalid_argument("algorithm", format!("{algorithm:?} is not RSA")))?;
    let mut out = Zeroizing::new(vec![0u8; modulus_len]);
    if data.len() >= modulus_len {
        // Left-truncate: keep the trailing modulus-sized window.
        out.copy_from_slice(&data[data.len() - modulus_len..]);
    } else {
        out[modulus_len - data.len()..].copy_from_slice(data);
    }
    Ok(out)
}
