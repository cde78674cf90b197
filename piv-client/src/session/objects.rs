//! Data objects and certificate storage
//!
//! GET/PUT DATA address objects by their SP 800-73 identifier wrapped in
//! tag `5C`; payloads live under tag `53`. Certificates add one more
//! layer: `{ 70 DER, 71 compression-flag, FE }`, gzip-compressed when
//! large. Writing a zero-length `53` deletes the object.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::apdu::CommandApdu;
use crate::constants::{
    CERT_COMPRESS_THRESHOLD, CERT_INFO_GZIP, CERT_INFO_UNCOMPRESSED, INS_GET_DATA, INS_PUT_DATA,
    TAG_CERTIFICATE, TAG_CERT_INFO, TAG_LRC, TAG_OBJ_DATA, TAG_OBJ_ID,
};
use crate::key::Slot;
use crate::prelude::*;
use crate::tlv;
use crate::transport::Transport;

use super::Session;

/// Whether a stored certificate may be gzip-compressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CertCompression {
    /// Compress when the DER exceeds the on-card comfort threshold.
    #[default]
    Auto,
    /// Store the DER verbatim regardless of size.
    Uncompressed,
}

impl<T: Transport> Session<T> {
    /// Read a data object. `Ok(None)` when the object does not exist.
    pub async fn get_object(&mut self, id: u32) -> Result<Option<Vec<u8>>> {
        let mut body = Vec::with_capacity(5);
        tlv::encode_into(&mut body, TAG_OBJ_ID, &object_id_bytes(id))?;
        let apdu = CommandApdu::new(INS_GET_DATA, 0x3F, 0xFF)
            .with_data(body)
            .with_le(0x100);
        let resp = self.transmit(&apdu).await?;
        match resp.require_success() {
            Ok(()) => {}
            Err(Error::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        }
        Ok(Some(tlv::read_single(resp.data(), TAG_OBJ_DATA)?.to_vec()))
    }

    /// Write a data object. Requires management-key authentication.
    pub async fn put_object(&mut self, id: u32, data: &[u8]) -> Result<()> {
        let mut body = Vec::with_capacity(data.len() + 10);
        tlv::encode_into(&mut body, TAG_OBJ_ID, &object_id_bytes(id))?;
        tlv::encode_into(&mut body, TAG_OBJ_DATA, data)?;
        let apdu = CommandApdu::new(INS_PUT_DATA, 0x3F, 0xFF).with_data(body);
        self.transmit(&apdu).await?.require_success()
    }

    /// Remove a data object: the card treats an empty `53` as deletion.
    pub async fn delete_object(&mut self, id: u32) -> Result<()> {
        self.put_object(id, &[]).await
    }

    /// Read the certificate stored for `slot`, decompressing if needed.
    /// Returns the DER, or `Ok(None)` when the slot has no certificate.
    pub async fn read_certificate(&mut self, slot: Slot) -> Result<Option<Vec<u8>>> {
        let object = certificate_object(slot)?;
        let Some(wrapper) = self.get_object(object).await? else {
            return Ok(None);
        };
        let fields = tlv::tag_map(&wrapper)?;
        let cert = fields
            .get(&(TAG_CERTIFICATE as u16))
            .ok_or_else(|| Error::protocol("certificate object lacks tag 70"))?;

        let compressed = fields
            .get(&(TAG_CERT_INFO as u16))
            .and_then(|v| v.first())
            .map(|&b| b == CERT_INFO_GZIP)
            .unwrap_or(false);
        if !compressed {
            return Ok(Some(cert.to_vec()));
        }

        let mut der = Vec::new();
        GzDecoder::new(&cert[..])
            .read_to_end(&mut der)
            .map_err(|e| Error::protocol(format!("stored certificate failed to decompress: {e}")))?;
        Ok(Some(der))
    }

    /// Store a certificate for `slot`. Requires management-key
    /// authentication. With [`CertCompression::Auto`], DER beyond the
    /// threshold is gzipped and flagged as such in the wrapper.
    pub async fn write_certificate(
        &mut self,
        slot: Slot,
        der: &[u8],
        compression: CertCompression,
    ) -> Result<()> {
        let object = certificate_object(slot)?;
        let compress =
            compression == CertCompression::Auto && der.len() > CERT_COMPRESS_THRESHOLD;

        let payload = if compress {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(der)
                .and_then(|_| encoder.finish())
                .map_err(|e| Error::protocol(format!("gzip failed: {e}")))?
        } else {
            der.to_vec()
        };

        let mut wrapper = Vec::with_capacity(payload.len() + 16);
        tlv::encode_into(&mut wrapper, TAG_CERTIFICATE, &payload)?;
        let flag = if compress {
            CERT_INFO_GZIP
        } else {
            CERT_INFO_UNCOMPRESSED
        };
        tlv::encode_into(&mut wrapper, TAG_CERT_INFO, &[flag])?;
        tlv::encode_into(&mut wrapper, TAG_LRC, &[])?;

        debug!(%slot, der_len = der.len(), compressed = compress, "storing certificate");
        self.put_object(object, &wrapper).await
    }

    /// Remove the certificate stored for `slot`.
    pub async fn delete_certificate(&mut self, slot: Slot) -> Result<()> {
        self.delete_object(certificate_object(slot)?).await
    }
}

fn certificate_object(slot: Slot) -> Result<u32> {
    slot.certificate_object().ok_or_else(|| {
        Error::invalid_argument("slot", "slot 9B does not hold a certificate")
    })
}

/// Minimal wire encoding of an object identifier: `7E` and `7F61` stay
/// short, everything else is the three-byte `5F C1 xx` family.
fn object_id_bytes(id: u32) -> Vec<u8> {
    if id <= 0xFF {
        vec![id as u8]
    } else if id <= 0xFFFF {
        vec![(id >> 8) as u8, id as u8]
    } else {
        vec![(id >> 16) as u8, (id >> 8) as u8, id as u8]
    }
}
