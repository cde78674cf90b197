//! PIN, PUK, retry counters, and biometric verification
//!
//! PINs travel as their UTF-8 bytes right-padded with `0xFF` to exactly
//! eight; change and unblock commands concatenate two such fields. Wrong
//! attempts surface the remaining retry count straight from the status
//! word so callers can prompt without another round trip.

use zeroize::Zeroizing;

use crate::apdu::{retry_count, CommandApdu};
use crate::buffer::SecretBuffer;
use crate::constants::{
    INS_CHANGE_REFERENCE, INS_RESET_RETRY, INS_SET_PIN_RETRIES, INS_VERIFY, KEY_REF_BIO,
    KEY_REF_PIN, KEY_REF_PUK, TAG_BIO_GET_TEMPORARY_PIN, TAG_BIO_TEMPORARY_PIN,
    TAG_BIO_VERIFY_UV,
};
use crate::prelude::*;
use crate::tlv;
use crate::transport::{PresenceHint, Transport};

use super::Session;

/// Pad a PIN or PUK to the fixed 8-byte field. Empty values become all
/// padding, which is what the reset flow sends to burn attempts.
pub(crate) fn encode_pin_field(value: &str, field: &'static str) -> Result<Zeroizing<[u8; 8]>> {
    let bytes = value.as_bytes();
    if bytes.len() > 8 {
        return Err(Error::invalid_argument(
            field,
            format!("{} bytes exceed the 8-byte field", bytes.len()),
        ));
    }
    let mut padded = Zeroizing::new([0xFFu8; 8]);
    padded[..bytes.len()].copy_from_slice(bytes);
    Ok(padded)
}

fn check_user_length(value: &str, field: &'static str) -> Result<()> {
    let len = value.as_bytes().len();
    if !(6..=8).contains(&len) {
        return Err(Error::invalid_argument(
            field,
            format!("must be 6-8 bytes, got {len}"),
        ));
    }
    Ok(())
}

/// Map a verify-family status word: retry counts win over the generic
/// taxonomy, and `is_puk` picks which typed error carries them.
fn reference_failure(sw: u16, is_puk: bool) -> Error {
    match retry_count(sw) {
        Some(0) => Error::Blocked,
        Some(remaining) if is_puk => Error::WrongPuk {
            retries_remaining: remaining,
        },
        Some(remaining) => Error::WrongPin {
            retries_remaining: remaining,
        },
        None => match crate::apdu::check_sw(sw) {
            Err(e) => e,
            Ok(()) => Error::Device { sw },
        },
    }
}

impl<T: Transport> Session<T> {
    /// Verify the PIN, unlocking PIN-gated operations for this session.
    pub async fn verify_pin(&mut self, pin: &str) -> Result<()> {
        check_user_length(pin, "pin")?;
        self.verify_pin_raw(pin).await
    }

    /// Verify without the 6-8 byte precondition. The reset flow burns
    /// attempts with an empty value through this path.
    pub(crate) async fn verify_pin_raw(&mut self, pin: &str) -> Result<()> {
        let padded = encode_pin_field(pin, "pin")?;
        let apdu =
            CommandApdu::new(INS_VERIFY, 0x00, KEY_REF_PIN).with_data(padded.to_vec());
        let resp = self.transmit(&apdu).await?;
        if !resp.is_success() {
            return Err(reference_failure(resp.status_word(), false));
        }
        self.set_pin_verified(true);
        Ok(())
    }

    /// Change the PIN. A wrong current PIN costs an attempt and reports
    /// the remainder.
    pub async fn change_pin(&mut self, current: &str, new: &str) -> Result<()> {
        check_user_length(current, "current_pin")?;
        check_user_length(new, "new_pin")?;
        self.change_reference(INS_CHANGE_REFERENCE, KEY_REF_PIN, current, new, false)
            .await
    }

    /// Change the PUK.
    pub async fn change_puk(&mut self, current: &str, new: &str) -> Result<()> {
        check_user_length(current, "current_puk")?;
        check_user_length(new, "new_puk")?;
        self.change_reference(INS_CHANGE_REFERENCE, KEY_REF_PUK, current, new, true)
            .await
    }

    /// Set a new PIN using the PUK, recovering a blocked PIN.
    pub async fn unblock_pin(&mut self, puk: &str, new_pin: &str) -> Result<()> {
        check_user_length(puk, "puk")?;
        check_user_length(new_pin, "new_pin")?;
        self.change_reference(INS_RESET_RETRY, KEY_REF_PIN, puk, new_pin, true)
            .await
    }

    /// Shared 16-byte `{ old | new }` body for change and unblock.
    pub(crate) async fn change_reference(
        &mut self,
        ins: u8,
        key_ref: u8,
        old: &str,
        new: &str,
        old_is_puk: bool,
    ) -> Result<()> {
        let old_field = encode_pin_field(old, "current")?;
        let new_field = encode_pin_field(new, "new")?;
        let mut body = Zeroizing::new(Vec::with_capacity(16));
        body.extend_from_slice(&old_field[..]);
        body.extend_from_slice(&new_field[..]);

        let apdu = CommandApdu::new(ins, 0x00, key_ref).with_data(std::mem::take(&mut *body));
        let resp = self.transmit(&apdu).await?;
        if !resp.is_success() {
            return Err(reference_failure(resp.status_word(), old_is_puk));
        }
        Ok(())
    }

    /// Remaining PIN attempts without spending one.
    ///
    /// Prefers the metadata instruction. On firmware without it, falls
    /// back to a zero-length VERIFY, which compliant devices answer
    /// without consuming an attempt — some non-compliant ones decrement
    /// anyway, hence the warning and the preference. `Ok(None)` means the
    /// PIN is currently verified and the device did not reveal a count.
    pub async fn pin_attempts(&mut self) -> Result<Option<u8>> {
        match self.pin_metadata().await {
            Ok(meta) => return Ok(Some(meta.retries_remaining)),
            Err(Error::NotSupported) => {
                warn!(
                    "metadata not supported; probing retries with an empty VERIFY, \
                     which some firmware wrongly counts as an attempt"
                );
            }
            Err(e) => return Err(e),
        }

        let apdu = CommandApdu::new(INS_VERIFY, 0x00, KEY_REF_PIN);
        let resp = self.transmit(&apdu).await?;
        if resp.is_success() {
            return Ok(None);
        }
        match retry_count(resp.status_word()) {
            Some(remaining) => Ok(Some(remaining)),
            None => Err(Error::Device {
                sw: resp.status_word(),
            }),
        }
    }

    /// Set the PIN and PUK retry limits. Requires management-key
    /// authentication and a verified PIN, and resets both codes to their
    /// factory defaults as a side effect.
    pub async fn set_pin_attempts(&mut self, pin_attempts: u8, puk_attempts: u8) -> Result<()> {
        if pin_attempts == 0 || puk_attempts == 0 {
            return Err(Error::invalid_argument(
                "attempts",
                "retry limits must be at least 1",
            ));
        }
        let apdu = CommandApdu::new(INS_SET_PIN_RETRIES, pin_attempts, puk_attempts);
        self.transmit(&apdu).await?.require_success()?;
        info!(pin = pin_attempts, puk = puk_attempts, "retry limits set, codes back to defaults");
        Ok(())
    }

    /// Run a biometric match. A plain match (both flags false) prompts
    /// for a fingerprint and satisfies the PIN gate. With
    /// `request_temporary_pin` (TLV `02`) the device additionally hands
    /// back a 16-byte temporary PIN usable after the fingerprint session
    /// ends. With `check_only` (TLV `03`) the device merely reports the
    /// current match state: nothing is prompted and the PIN gate is NOT
    /// satisfied, so a successful probe leaves the session unchanged.
    /// The two flags are mutually exclusive.
    pub async fn verify_uv(
        &mut self,
        request_temporary_pin: bool,
        check_only: bool,
    ) -> Result<Option<SecretBuffer>> {
        if request_temporary_pin && check_only {
            return Err(Error::invalid_argument(
                "check_only",
                "a temporary PIN request performs a full match",
            ));
        }
        let mut apdu = CommandApdu::new(INS_VERIFY, 0x00, KEY_REF_BIO).with_le(0x100);
        if request_temporary_pin {
            apdu = apdu.with_data(tlv::encode(TAG_BIO_GET_TEMPORARY_PIN, &[])?);
        } else if check_only {
            apdu = apdu.with_data(tlv::encode(TAG_BIO_VERIFY_UV, &[])?);
        }
        if !check_only {
            self.notify_presence(PresenceHint::Biometric);
        }
        let resp = self.transmit(&apdu).await?;
        if !resp.is_success() {
            return Err(reference_failure(resp.status_word(), false));
        }
        if !check_only {
            self.set_pin_verified(true);
        }
        if request_temporary_pin {
            Ok(Some(SecretBuffer::from(resp.data())))
        } else {
            Ok(None)
        }
    }

    /// Satisfy the PIN gate with a temporary PIN from [`verify_uv`].
    /// The buffer is consumed and wiped.
    ///
    /// [`verify_uv`]: Session::verify_uv
    pub async fn verify_temporary_pin(&mut self, pin: SecretBuffer) -> Result<()> {
        if pin.len() != 16 {
            return Err(Error::invalid_argument(
                "temporary_pin",
                format!("expected 16 bytes, got {}", pin.len()),
            ));
        }
        let body = tlv::encode(TAG_BIO_TEMPORARY_PIN, pin.as_slice())?;
        let apdu = CommandApdu::new(INS_VERIFY, 0x00, KEY_REF_BIO).with_data(body);
        let resp = self.transmit(&apdu).await?;
        if !resp.is_success() {
            return Err(reference_failure(resp.status_word(), false));
        }
        self.set_pin_verified(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", [0xFF; 8])]
    #[case("1", [0x31, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF])]
    #[case("123456", [0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0xFF, 0xFF])]
    #[case("12345678", [0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38])]
    fn pin_padding(#[case] pin: &str, #[case] expected: [u8; 8]) {
        assert_eq!(*encode_pin_field(pin, "pin").unwrap(), expected);
    }

    #[test]
    fn pin_padding_covers_every_length_up_to_eight() {
        for len in 0..=8usize {
            let pin: String = "9".repeat(len);
            let encoded = encode_pin_field(&pin, "pin").unwrap();
            assert_eq!(encoded.len(), 8);
            assert!(encoded[..len].iter().all(|&b| b == b'9'));
            assert!(encoded[len..].iter().all(|&b| b == 0xFF));
        }
        assert!(encode_pin_field("123456789", "pin").is_err());
    }

    #[test]
    fn multibyte_utf8_counts_bytes_not_chars() {
        // Four two-byte characters fill the field exactly.
        let encoded = encode_pin_field("éééé", "pin").unwrap();
        assert_eq!(encoded.len(), 8);
        assert!(encode_pin_field("ééééé", "pin").is_err());
    }

    #[rstest]
    #[case(0x63C2, false, 2)]
    #[case(0x63C0, false, 0)]
    #[case(0x63CA, true, 10)]
    fn reference_failures_carry_retries(
        #[case] sw: u16,
        #[case] is_puk: bool,
        #[case] remaining: u8,
    ) {
        match (reference_failure(sw, is_puk), is_puk) {
            (Error::Blocked, _) => assert_eq!(remaining, 0),
            (Error::WrongPuk { retries_remaining }, true) => {
                assert_eq!(retries_remaining, remaining)
            }
            (Error::WrongPin { retries_remaining }, false) => {
                assert_eq!(retries_remaining, remaining)
            }
            (other, _) => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn blocked_status_maps_to_blocked() {
        assert!(matches!(reference_failure(0x6983, false), Error::Blocked));
        assert!(matches!(reference_failure(0x6983, true), Error::Blocked));
        assert!(matches!(
            reference_failure(0x6A80, false),
            Error::Device { sw: 0x6A80 }
        ));
    }
}
