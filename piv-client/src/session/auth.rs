//! Management-key mutual authentication and rotation
//!
//! The witness/challenge exchange proves both sides hold the symmetric
//! key in slot 9B without putting it on the wire. Every intermediate
//! buffer that touches key-derived material is wiped before the function
//! returns, on success and on every error path.

use rand::RngCore;
use zeroize::Zeroizing;

use crate::apdu::CommandApdu;
use crate::constants::{
    INS_GENERAL_AUTHENTICATE, INS_SET_MGMKEY, KEY_REF_MGMT, TAG_AUTH_CHALLENGE,
    TAG_AUTH_RESPONSE, TAG_AUTH_WITNESS, TAG_DYN_AUTH,
};
use crate::mgm::{constant_time_eq, MgmKey};
use crate::prelude::*;
use crate::tlv;
use crate::transport::Transport;

use super::Session;

impl<T: Transport> Session<T> {
    /// Mutually authenticate the management key against slot 9B.
    ///
    /// One round: request a witness, decrypt it, return the plaintext
    /// together with a fresh random challenge, and require the card to
    /// send that challenge back encrypted. The comparison is constant
    /// time; on mismatch the session does not become authenticated.
    pub async fn authenticate(&mut self, key: &MgmKey) -> Result<()> {
        let algorithm = key.algorithm();
        let block = algorithm.block_len();

        // Step 1: empty witness request.
        let mut request = Vec::new();
        tlv::encode_into(&mut request, TAG_AUTH_WITNESS, &[])?;
        let body = tlv::encode(TAG_DYN_AUTH, &request)?;
        let apdu = CommandApdu::new(
            INS_GENERAL_AUTHENTICATE,
            algorithm.algorithm_id(),
            KEY_REF_MGMT,
        )
        .with_data(body)
        .with_le(0x100);
        let resp = self.transmit(&apdu).await?;
        resp.require_success()?;

        // Step 2: the card's witness, encrypted under the key.
        let template = tlv::read_single(resp.data(), TAG_DYN_AUTH)?;
        let fields = tlv::tag_map(template)?;
        let witness = *fields
            .get(&(TAG_AUTH_WITNESS as u16))
            .ok_or_else(|| Error::protocol("authenticate response lacks a witness"))?;
        if witness.len() != block {
            return Err(Error::protocol(format!(
                "witness of {} bytes, expected the {block}-byte cipher block",
                witness.len()
            )));
        }

        // Step 3: decrypted witness plus our own challenge.
        let witness_plain = key.decrypt_block(witness)?;
        let mut challenge = Zeroizing::new(vec![0u8; block]);
        rand::thread_rng().fill_bytes(&mut challenge);

        let mut inner = Zeroizing::new(Vec::new());
        tlv::encode_into(&mut inner, TAG_AUTH_WITNESS, &witness_plain)?;
        tlv::encode_into(&mut inner, TAG_AUTH_CHALLENGE, &challenge)?;
        let body = tlv::encode(TAG_DYN_AUTH, &inner)?;

        let apdu = CommandApdu::new(
            INS_GENERAL_AUTHENTICATE,
            algorithm.algorithm_id(),
            KEY_REF_MGMT,
        )
        .with_data(body)
        .with_le(0x100);
        let resp = self.transmit(&apdu).await?;
        resp.require_success()?;

        // Step 4: the card's response must be our challenge, encrypted.
        let template = tlv::read_single(resp.data(), TAG_DYN_AUTH)?;
        let fields = tlv::tag_map(template)?;
        let response = *fields
            .get(&(TAG_AUTH_RESPONSE as u16))
            .ok_or_else(|| Error::protocol("authenticate response lacks the challenge reply"))?;
        let expected = key.encrypt_block(&challenge)?;

        if !constant_time_eq(response, &expected) {
            self.set_authenticated(false);
            warn!("management key mutual authentication failed");
            return Err(Error::MutualAuthFailed);
        }

        self.set_authenticated(true);
        self.set_mgm_key_type(algorithm);
        debug!(algorithm = ?algorithm, "management key authenticated");
        Ok(())
    }

    /// Install a new management key (requires prior [`authenticate`]).
    ///
    /// `require_touch` asks the card to demand a touch for every future
    /// authentication with this key.
    ///
    /// [`authenticate`]: Session::authenticate
    pub async fn set_management_key(&mut self, key: &MgmKey, require_touch: bool) -> Result<()> {
        let algorithm = key.algorithm();
        let mut data = Vec::with_capacity(3 + key.as_bytes().len());
        data.push(algorithm.algorithm_id());
        data.push(KEY_REF_MGMT);
        data.push(key.as_bytes().len() as u8);
        data.extend_from_slice(key.as_bytes());

        let p2 = if require_touch { 0xFE } else { 0xFF };
        let apdu = CommandApdu::new(INS_SET_MGMKEY, 0xFF, p2).with_data(data);
        self.transmit(&apdu).await?.require_success()?;

        self.set_mgm_key_type(algorithm);
        info!(algorithm = ?algorithm, touch = require_touch, "management key replaced");
        Ok(())
    }
}
