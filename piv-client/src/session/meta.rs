//! Metadata commands (`INS F7`)
//!
//! One instruction, parameterized by slot or pseudo-slot. Older firmware
//! answers `6D00`; callers that can degrade (retry probing, reset guard)
//! catch `Error::NotSupported` themselves.

use crate::apdu::CommandApdu;
use crate::constants::{INS_GET_METADATA, KEY_REF_BIO, KEY_REF_MGMT, KEY_REF_PIN, KEY_REF_PUK};
use crate::key::Slot;
use crate::metadata::{
    parse_bio_metadata, parse_management_key_metadata, parse_pin_metadata, parse_slot_metadata,
    BioMetadata, ManagementKeyMetadata, PinMetadata, SlotMetadata,
};
use crate::prelude::*;
use crate::tlv;
use crate::transport::Transport;

use super::Session;

impl<T: Transport> Session<T> {
    /// Metadata for an asymmetric slot. An empty slot is `Ok(None)`.
    pub async fn slot_metadata(&mut self, slot: Slot) -> Result<Option<SlotMetadata>> {
        match self.read_metadata(slot.id()).await {
            Ok(data) => Ok(Some(parse_slot_metadata(&tlv::tag_map(&data)?)?)),
            Err(Error::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Metadata for the management key in slot 9B.
    pub async fn management_key_metadata(&mut self) -> Result<ManagementKeyMetadata> {
        let data = self.read_metadata(KEY_REF_MGMT).await?;
        parse_management_key_metadata(&tlv::tag_map(&data)?)
    }

    /// PIN retry state without spending an attempt.
    pub async fn pin_metadata(&mut self) -> Result<PinMetadata> {
        let data = self.read_metadata(KEY_REF_PIN).await?;
        parse_pin_metadata(&tlv::tag_map(&data)?)
    }

    /// PUK retry state without spending an attempt.
    pub async fn puk_metadata(&mut self) -> Result<PinMetadata> {
        let data = self.read_metadata(KEY_REF_PUK).await?;
        parse_pin_metadata(&tlv::tag_map(&data)?)
    }

    /// Biometric subsystem state; `Ok(None)` on devices without one.
    pub async fn bio_metadata(&mut self) -> Result<Option<BioMetadata>> {
        match self.read_metadata(KEY_REF_BIO).await {
            Ok(data) => Ok(Some(parse_bio_metadata(&tlv::tag_map(&data)?)?)),
            Err(Error::NotSupported) | Err(Error::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn read_metadata(&mut self, key_ref: u8) -> Result<Vec<u8>> {
        let apdu = CommandApdu::new(INS_GET_METADATA, 0x00, key_ref).with_le(0x100);
        let resp = self.transmit(&apdu).await?;
        resp.require_success()?;
        Ok(resp.data().to_vec())
    }
}
