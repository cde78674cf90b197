//! APDU codec: command framing, response parsing, GET RESPONSE chaining
//!
//! Commands carry the classic `CLA INS P1 P2` header plus optional data
//! and expected-length fields, in short or extended form. Responses are
//! payload plus a two-byte status word. When the card answers `61XX` the
//! remainder is fetched with GET RESPONSE and concatenated before any
//! caller sees it.

use zeroize::Zeroizing;

use crate::constants::INS_GET_RESPONSE;
use crate::prelude::*;
use crate::transport::Transport;

pub(crate) const SW_SUCCESS: u16 = 0x9000;
pub(crate) const SW_SECURITY_STATUS_NOT_SATISFIED: u16 = 0x6982;
pub(crate) const SW_AUTH_METHOD_BLOCKED: u16 = 0x6983;
pub(crate) const SW_FILE_NOT_FOUND: u16 = 0x6A82;
pub(crate) const SW_FUNCTION_NOT_SUPPORTED: u16 = 0x6A81;
pub(crate) const SW_REFERENCED_DATA_NOT_FOUND: u16 = 0x6A88;
pub(crate) const SW_INS_NOT_SUPPORTED: u16 = 0x6D00;

/// A command APDU under construction.
///
/// The data field is wiped on drop because several commands (VERIFY,
/// CHANGE REFERENCE, IMPORT KEY) put secrets in it; Debug shows only the
/// header and lengths for the same reason.
pub struct CommandApdu {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    data: Zeroizing<Vec<u8>>,
    le: Option<u32>,
}

impl CommandApdu {
    pub fn new(ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla: 0x00,
            ins,
            p1,
            p2,
            data: Zeroizing::new(Vec::new()),
            le: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = Zeroizing::new(data.into());
        self
    }

    /// Expected response length, 1..=65536.
    pub fn with_le(mut self, le: u32) -> Self {
        self.le = Some(le);
        self
    }

    pub(crate) fn ins(&self) -> u8 {
        self.ins
    }

    /// Serialize to wire form. Extended length is used exactly when the
    /// data exceeds 255 bytes or the expected length exceeds 256.
    pub fn encode(&self) -> Zeroizing<Vec<u8>> {
        let extended =
            self.data.len() > 0xFF || self.le.map(|le| le > 0x100).unwrap_or(false);
        let mut out = Zeroizing::new(Vec::with_capacity(self.data.len() + 10));
        out.push(self.cla);
        out.push(self.ins);
        out.push(self.p1);
        out.push(self.p2);

        if !self.data.is_empty() {
            if extended {
                out.push(0x00);
                out.push((self.data.len() >> 8) as u8);
                out.push(self.data.len() as u8);
            } else {
                out.push(self.data.len() as u8);
            }
            out.extend_from_slice(&self.data);
        }

        if let Some(le) = self.le {
            if extended {
                if self.data.is_empty() {
                    out.push(0x00);
                }
                out.push((le >> 8) as u8);
                out.push(le as u8);
            } else {
                // 256 is encoded as 0x00 in the short form.
                out.push(le as u8);
            }
        }
        out
    }
}

impl std::fmt::Debug for CommandApdu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandApdu")
            .field("cla", &self.cla)
            .field("ins", &self.ins)
            .field("p1", &self.p1)
            .field("p2", &self.p2)
            .field("data_len", &self.data.len())
            .field("le", &self.le)
            .finish()
    }
}

/// A parsed response: payload plus status word.
pub struct ResponseApdu {
    data: Zeroizing<Vec<u8>>,
    sw: u16,
}

impl std::fmt::Debug for ResponseApdu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseApdu")
            .field("data_len", &self.data.len())
            .field("sw", &self.sw)
            .finish()
    }
}

impl ResponseApdu {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < 2 {
            return Err(Error::protocol(format!(
                "response of {} bytes cannot carry a status word",
                raw.len()
            )));
        }
        let (payload, trailer) = raw.split_at(raw.len() - 2);
        Ok(Self {
            data: Zeroizing::new(payload.to_vec()),
            sw: ((trailer[0] as u16) << 8) | trailer[1] as u16,
        })
    }

    pub fn status_word(&self) -> u16 {
        self.sw
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the response, keeping the payload in a wiped-on-drop buffer.
    pub fn into_data(self) -> Zeroizing<Vec<u8>> {
        self.data
    }

    pub fn is_success(&self) -> bool {
        self.sw == SW_SUCCESS
    }

    /// Map a non-success status word to the typed error taxonomy.
    pub fn require_success(&self) -> Result<()> {
        check_sw(self.sw)
    }
}

/// Generic status-word mapping shared by every command handler. Commands
/// with richer semantics (wrong-PIN retry counts) inspect the status word
/// themselves before falling back to this.
pub(crate) fn check_sw(sw: u16) -> Result<()> {
    match sw {
        SW_SUCCESS => Ok(()),
        SW_SECURITY_STATUS_NOT_SATISFIED => Err(Error::AuthenticationRequired),
        SW_AUTH_METHOD_BLOCKED => Err(Error::Blocked),
        SW_INS_NOT_SUPPORTED | SW_FUNCTION_NOT_SUPPORTED => Err(Error::NotSupported),
        SW_FILE_NOT_FOUND | SW_REFERENCED_DATA_NOT_FOUND => Err(Error::NotFound),
        _ => Err(Error::Device { sw }),
    }
}

/// Retry count hidden in a status word: `63CX` carries X, `6983` means the
/// counter is exhausted. Anything else has no retry information.
pub(crate) fn retry_count(sw: u16) -> Option<u8> {
    match sw {
        0x63C0..=0x63CF => Some((sw & 0x000F) as u8),
        SW_AUTH_METHOD_BLOCKED => Some(0),
        _ => None,
    }
}

/// Send one command and reassemble a chained response. `61XX` replies are
/// followed up with GET RESPONSE until the card reports a final status;
/// callers always observe the concatenated payload.
pub(crate) async fn transmit<T>(transport: &mut T, apdu: &CommandApdu) -> Result<ResponseApdu>
where
    T: Transport + ?Sized,
{
    let wire = apdu.encode();
    debug!(ins = apdu.ins(), len = wire.len(), "transmit");
    let raw = Zeroizing::new(transport.exchange(&wire).await?);
    let first = ResponseApdu::parse(&raw)?;

    let mut data = first.data;
    let mut sw = first.sw;
    while sw >> 8 == 0x61 {
        let le = match sw & 0x00FF {
            0 => 0x100,
            n => n as u32,
        };
        let follow = CommandApdu::new(INS_GET_RESPONSE, 0x00, 0x00).with_le(le);
        let raw = Zeroizing::new(transport.exchange(&follow.encode()).await?);
        let chunk = ResponseApdu::parse(&raw)?;
        data.extend_from_slice(chunk.data());
        sw = chunk.sw;
    }
    trace!(sw, len = data.len(), "response");
    Ok(ResponseApdu { data, sw })
}
