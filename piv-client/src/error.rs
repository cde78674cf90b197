//! Centralized error types for PIV operations
//!
//! Every caller-visible failure is one of the variants here; command
//! handlers map known status words to typed errors and attach enough
//! context (retry counts, offending field) that callers can prompt a user
//! without re-querying the device.

/// Main result type for all PIV operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The exchange failed at a layer below PIV.
    #[error("transport error: {source}")]
    Transport {
        #[from]
        source: std::io::Error,
    },

    /// The device sent something the TLV/APDU layer cannot parse.
    #[error("malformed response from device: {reason}")]
    Protocol { reason: String },

    /// The device returned a status word this crate has no better name for.
    #[error("device returned status word {sw:#06X}")]
    Device { sw: u16 },

    /// `SW=0x6982`: the operation needs PIN verification, touch, or
    /// management-key authentication first.
    #[error("security status not satisfied: PIN, touch, or management key required")]
    AuthenticationRequired,

    /// Wrong PIN presented; the device still accepts further attempts.
    #[error("wrong PIN, {retries_remaining} attempts remaining")]
    WrongPin { retries_remaining: u8 },

    /// Wrong PUK presented; the device still accepts further attempts.
    #[error("wrong PUK, {retries_remaining} attempts remaining")]
    WrongPuk { retries_remaining: u8 },

    /// `SW=0x6983`: the referenced PIN or PUK has no attempts left.
    #[error("PIN or PUK is blocked")]
    Blocked,

    /// `SW=0x6D00`/`0x6A81`: the instruction or function does not exist on
    /// this device or firmware.
    #[error("not supported by this device or firmware")]
    NotSupported,

    /// `SW=0x6A82`/`0x6A88`: the referenced slot or data object is absent.
    #[error("referenced key or data object not found")]
    NotFound,

    /// Caller-supplied data failed a precondition before anything was sent.
    #[error("invalid argument `{field}`: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    /// The device failed the management-key challenge: its response to our
    /// challenge did not match the expected ciphertext.
    #[error("management key mutual authentication failed")]
    MutualAuthFailed,
}

impl Error {
    /// Create a protocol error from anything displayable.
    pub(crate) fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Create an invalid-argument error for a named field.
    pub(crate) fn invalid_argument(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }

    /// Status word carried by this error, if it came from the device.
    pub fn status_word(&self) -> Option<u16> {
        match self {
            Self::Device { sw } => Some(*sw),
            Self::AuthenticationRequired => Some(0x6982),
            Self::Blocked => Some(0x6983),
            _ => None,
        }
    }
}
