//! Administrative flows: reset, retry limits, key lifecycle, attestation

mod common;

use common::{open_preamble, with_sw, ScriptedTransport};
use piv_client::{
    Algorithm, Error, PinPolicy, PrivateKeyMaterial, Session, Slot, TouchPolicy,
};

const EMPTY_PIN: [u8; 8] = [0xFF; 8];

fn verify_empty_request() -> Vec<u8> {
    let mut req = vec![0x00, 0x20, 0x00, 0x80, 0x08];
    req.extend_from_slice(&EMPTY_PIN);
    req
}

fn unblock_empty_request() -> Vec<u8> {
    let mut req = vec![0x00, 0x2C, 0x00, 0x80, 0x10];
    req.extend_from_slice(&EMPTY_PIN);
    req.extend_from_slice(&EMPTY_PIN);
    req
}

#[tokio::test]
async fn reset_blocks_pin_and_puk_then_wipes() {
    let script = open_preamble(ScriptedTransport::new(), [5, 4, 3])
        // No biometrics on this device.
        .expect(vec![0x00, 0xF7, 0x00, 0x96, 0x00], vec![0x6D, 0x00])
        // Burn PIN attempts until the counter hits zero.
        .expect(verify_empty_request(), vec![0x63, 0xC2])
        .expect(verify_empty_request(), vec![0x63, 0xC1])
        .expect(verify_empty_request(), vec![0x63, 0xC0])
        // Burn PUK attempts through unblock-PIN.
        .expect(unblock_empty_request(), vec![0x63, 0xC1])
        .expect(unblock_empty_request(), vec![0x69, 0x83])
        // The card accepts RESET now.
        .expect(vec![0x00, 0xFB, 0x00, 0x00], vec![0x90, 0x00])
        // Post-reset management-key probe.
        .expect(vec![0x00, 0xF7, 0x00, 0x9B, 0x00], vec![0x6D, 0x00]);

    let mut session = Session::open(script).await.unwrap();
    session.reset().await.unwrap();
    assert!(!session.is_authenticated());
    assert!(!session.is_pin_verified());
    assert_eq!(
        session.management_key_type(),
        piv_client::MgmKeyAlgorithm::TripleDes
    );
}

#[tokio::test]
async fn reset_refuses_when_fingerprints_are_enrolled() {
    let bio = with_sw(vec![0x07, 0x01, 0x01, 0x06, 0x01, 0x03], 0x9000);
    let script = open_preamble(ScriptedTransport::new(), [5, 7, 2])
        .expect(vec![0x00, 0xF7, 0x00, 0x96, 0x00], bio);

    let mut session = Session::open(script).await.unwrap();
    let err = session.reset().await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { field: "reset", .. }));
    // No block/reset traffic followed the refusal; an extra exchange
    // would have panicked the scripted transport.
}

#[tokio::test]
async fn set_retry_limits_sends_counts_in_p1_p2() {
    let script = open_preamble(ScriptedTransport::new(), [5, 4, 3])
        .expect(vec![0x00, 0xFA, 0x05, 0x03], vec![0x90, 0x00]);

    let mut session = Session::open(script).await.unwrap();
    session.set_pin_attempts(5, 3).await.unwrap();
}

#[tokio::test]
async fn zero_retry_limit_is_rejected_locally() {
    let script = open_preamble(ScriptedTransport::new(), [5, 4, 3]);
    let mut session = Session::open(script).await.unwrap();
    assert!(session.set_pin_attempts(0, 3).await.is_err());
    assert!(session.set_pin_attempts(3, 0).await.is_err());
}

#[tokio::test]
async fn move_and_delete_key_framing() {
    let script = open_preamble(ScriptedTransport::new(), [5, 7, 0])
        .expect(vec![0x00, 0xF6, 0x9C, 0x9A], vec![0x90, 0x00])
        .expect(vec![0x00, 0xF6, 0xFF, 0x9C], vec![0x90, 0x00]);

    let mut session = Session::open(script).await.unwrap();
    session
        .move_key(Slot::Authentication, Slot::Signature)
        .await
        .unwrap();
    session.delete_key(Slot::Signature).await.unwrap();
}

#[tokio::test]
async fn attestation_slot_cannot_move() {
    let script = open_preamble(ScriptedTransport::new(), [5, 7, 0]);
    let mut session = Session::open(script).await.unwrap();
    assert!(session
        .move_key(Slot::Attestation, Slot::Retired1)
        .await
        .is_err());
    assert!(session
        .move_key(Slot::Retired1, Slot::Attestation)
        .await
        .is_err());
    assert!(session.attest(Slot::Attestation).await.is_err());
}

#[tokio::test]
async fn import_ed25519_framing() {
    let seed = vec![0x07; 32];
    let mut request = vec![0x00, 0xFE, 0xE0, 0x9A, 0x22, 0x07, 0x20];
    request.extend_from_slice(&seed);

    let script = open_preamble(ScriptedTransport::new(), [5, 7, 0])
        .expect(request, vec![0x90, 0x00]);

    let mut session = Session::open(script).await.unwrap();
    let material = PrivateKeyMaterial::ed25519(seed).unwrap();
    session
        .import_key(
            Slot::Authentication,
            material,
            PinPolicy::Default,
            TouchPolicy::Default,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn import_with_policies_appends_policy_tlvs() {
    let scalar = vec![0x42; 32];
    let mut request = vec![0x00, 0xFE, 0x11, 0x9D, 0x28, 0x06, 0x20];
    request.extend_from_slice(&scalar);
    request.extend_from_slice(&[0xAA, 0x01, 0x02, 0xAB, 0x01, 0x03]);

    let script = open_preamble(ScriptedTransport::new(), [5, 7, 0])
        .expect(request, vec![0x90, 0x00]);

    let mut session = Session::open(script).await.unwrap();
    let material =
        PrivateKeyMaterial::ec(piv_client::EcCurve::P256, scalar).unwrap();
    session
        .import_key(
            Slot::KeyManagement,
            material,
            PinPolicy::Once,
            TouchPolicy::Cached,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn attest_returns_der_and_chains() {
    let cert: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
    let first_chunk = cert[..200].to_vec();
    let rest = cert[200..].to_vec();

    let script = open_preamble(ScriptedTransport::new(), [5, 4, 3])
        .expect(
            vec![0x00, 0xF9, 0x9A, 0x00],
            with_sw(first_chunk, 0x6100 | (rest.len() as u16)),
        )
        .expect(
            vec![0x00, 0xC0, 0x00, 0x00, rest.len() as u8],
            with_sw(rest.clone(), 0x9000),
        );

    let mut session = Session::open(script).await.unwrap();
    let produced = session.attest(Slot::Authentication).await.unwrap();
    assert_eq!(produced, cert);
}

#[tokio::test]
async fn serial_parses_big_endian() {
    let script = open_preamble(ScriptedTransport::new(), [5, 4, 3]).expect(
        vec![0x00, 0xF8, 0x00, 0x00, 0x00],
        with_sw(vec![0x00, 0xBC, 0x61, 0x4E], 0x9000),
    );

    let mut session = Session::open(script).await.unwrap();
    assert_eq!(session.serial().await.unwrap(), 12_345_678);
}

#[tokio::test]
async fn empty_slot_metadata_is_none() {
    let script = open_preamble(ScriptedTransport::new(), [5, 4, 3])
        .expect(vec![0x00, 0xF7, 0x00, 0x9C, 0x00], vec![0x6A, 0x88]);

    let mut session = Session::open(script).await.unwrap();
    assert!(session
        .slot_metadata(Slot::Signature)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn slot_metadata_parses_public_key() {
    let mut point = vec![0x04];
    point.extend_from_slice(&[0x33; 32]);
    point.extend_from_slice(&[0x44; 32]);
    let mut payload = vec![
        0x01, 0x01, 0x11, // algorithm: ECC P-256
        0x02, 0x02, 0x02, 0x01, // policies: once / never
        0x03, 0x01, 0x01, // origin: generated
        0x04, 0x48, 0x7F, 0x49, 0x45, 0x86, 0x43,
    ];
    payload.extend_from_slice(&point);

    let script = open_preamble(ScriptedTransport::new(), [5, 4, 3])
        .expect(vec![0x00, 0xF7, 0x00, 0x9A, 0x00], with_sw(payload, 0x9000));

    let mut session = Session::open(script).await.unwrap();
    let meta = session
        .slot_metadata(Slot::Authentication)
        .await
        .unwrap()
        .expect("slot is occupied");
    assert_eq!(meta.algorithm, Algorithm::EccP256);
    assert!(meta.generated_on_device());
    let key = meta.public_key.expect("asymmetric slot carries a key");
    let (x, y) = key.coordinates().unwrap();
    assert_eq!(x, &[0x33; 32]);
    assert_eq!(y, &[0x44; 32]);
}

#[tokio::test]
async fn pin_attempts_falls_back_to_empty_verify() {
    let script = open_preamble(ScriptedTransport::new(), [4, 3, 0])
        // Metadata unavailable on this firmware.
        .expect(vec![0x00, 0xF7, 0x00, 0x80, 0x00], vec![0x6D, 0x00])
        // Zero-length VERIFY probe.
        .expect(vec![0x00, 0x20, 0x00, 0x80], vec![0x63, 0xC5]);

    let mut session = Session::open(script).await.unwrap();
    assert_eq!(session.pin_attempts().await.unwrap(), Some(5));
}

#[tokio::test]
async fn pin_attempts_prefers_metadata() {
    let meta = with_sw(vec![0x05, 0x01, 0x01, 0x06, 0x02, 0x08, 0x06], 0x9000);
    let script = open_preamble(ScriptedTransport::new(), [5, 4, 3])
        .expect(vec![0x00, 0xF7, 0x00, 0x80, 0x00], meta);

    let mut session = Session::open(script).await.unwrap();
    assert_eq!(session.pin_attempts().await.unwrap(), Some(6));
}

#[tokio::test]
async fn change_pin_concatenates_old_and_new() {
    let mut request = vec![0x00, 0x24, 0x00, 0x80, 0x10];
    request.extend_from_slice(b"123456");
    request.extend_from_slice(&[0xFF, 0xFF]);
    request.extend_from_slice(b"654321");
    request.extend_from_slice(&[0xFF, 0xFF]);

    let script =
        open_preamble(ScriptedTransport::new(), [5, 4, 3]).expect(request, vec![0x90, 0x00]);

    let mut session = Session::open(script).await.unwrap();
    session.change_pin("123456", "654321").await.unwrap();
}

#[tokio::test]
async fn unblock_pin_uses_reset_retry_instruction() {
    let mut request = vec![0x00, 0x2C, 0x00, 0x80, 0x10];
    request.extend_from_slice(b"12345678");
    request.extend_from_slice(b"222333");
    request.extend_from_slice(&[0xFF, 0xFF]);

    let script = open_preamble(ScriptedTransport::new(), [5, 4, 3])
        .expect(request, vec![0x63, 0xC4]);

    let mut session = Session::open(script).await.unwrap();
    let err = session.unblock_pin("12345678", "222333").await.unwrap_err();
    assert!(matches!(err, Error::WrongPuk { retries_remaining: 4 }));
}

#[tokio::test]
async fn sign_maps_security_status_to_authentication_required() {
    let mut request = vec![0x00, 0x87, 0x11, 0x9A, 0x26, 0x7C, 0x24, 0x82, 0x00, 0x81, 0x20];
    request.extend_from_slice(&[0x10; 32]);
    request.push(0x00);

    let script = open_preamble(ScriptedTransport::new(), [5, 4, 3])
        .expect(request, vec![0x69, 0x82]);

    let mut session = Session::open(script).await.unwrap();
    let err = session
        .sign(Slot::Authentication, Algorithm::EccP256, &[0x10; 32])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AuthenticationRequired));
}
