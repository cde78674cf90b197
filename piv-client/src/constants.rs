//! Centralized constants for the PIV protocol
//!
//! Instruction bytes, TLV tags, the application identifier and the
//! well-known default credentials, in one place so the command handlers
//! never carry magic numbers.

/// AID of the PIV application. Devices accept the 5-byte truncation; the
/// full form is what SP 800-73 registers.
pub const PIV_AID: &[u8] = &[
    0xA0, 0x00, 0x00, 0x03, 0x08, 0x00, 0x00, 0x10, 0x00, 0x01, 0x00,
];

// ISO 7816 instructions
pub(crate) const INS_SELECT: u8 = 0xA4;
pub(crate) const INS_VERIFY: u8 = 0x20;
pub(crate) const INS_CHANGE_REFERENCE: u8 = 0x24;
pub(crate) const INS_RESET_RETRY: u8 = 0x2C;
pub(crate) const INS_GENERAL_AUTHENTICATE: u8 = 0x87;
pub(crate) const INS_GENERATE_ASYMMETRIC: u8 = 0x47;
pub(crate) const INS_GET_DATA: u8 = 0xCB;
pub(crate) const INS_PUT_DATA: u8 = 0xDB;
pub(crate) const INS_GET_RESPONSE: u8 = 0xC0;

// Vendor extensions
pub(crate) const INS_SET_MGMKEY: u8 = 0xFF;
pub(crate) const INS_IMPORT_KEY: u8 = 0xFE;
pub(crate) const INS_GET_VERSION: u8 = 0xFD;
pub(crate) const INS_RESET: u8 = 0xFB;
pub(crate) const INS_SET_PIN_RETRIES: u8 = 0xFA;
pub(crate) const INS_ATTEST: u8 = 0xF9;
pub(crate) const INS_GET_SERIAL: u8 = 0xF8;
pub(crate) const INS_GET_METADATA: u8 = 0xF7;
pub(crate) const INS_MOVE_KEY: u8 = 0xF6;

// P2 key references for VERIFY / CHANGE REFERENCE / metadata
pub(crate) const KEY_REF_PIN: u8 = 0x80;
pub(crate) const KEY_REF_PUK: u8 = 0x81;
pub(crate) const KEY_REF_BIO: u8 = 0x96;
pub(crate) const KEY_REF_MGMT: u8 = 0x9B;

// Dynamic authentication template (GENERAL AUTHENTICATE)
pub(crate) const TAG_DYN_AUTH: u8 = 0x7C;
pub(crate) const TAG_AUTH_WITNESS: u8 = 0x80;
pub(crate) const TAG_AUTH_CHALLENGE: u8 = 0x81;
pub(crate) const TAG_AUTH_RESPONSE: u8 = 0x82;
pub(crate) const TAG_AUTH_EXPONENTIATION: u8 = 0x85;

// GENERATE ASYMMETRIC template
pub(crate) const TAG_GEN_TEMPLATE: u8 = 0xAC;
pub(crate) const TAG_GEN_ALGORITHM: u8 = 0x80;
pub(crate) const TAG_PIN_POLICY: u8 = 0xAA;
pub(crate) const TAG_TOUCH_POLICY: u8 = 0xAB;

/// Two-byte tag wrapping the public-key template in GENERATE and metadata
/// responses.
pub(crate) const TAG_PUBLIC_KEY_TEMPLATE: u16 = 0x7F49;
pub(crate) const TAG_PUBKEY_RSA_MODULUS: u8 = 0x81;
pub(crate) const TAG_PUBKEY_RSA_EXPONENT: u8 = 0x82;
pub(crate) const TAG_PUBKEY_EC_POINT: u8 = 0x86;

// Data objects
pub(crate) const TAG_OBJ_ID: u8 = 0x5C;
pub(crate) const TAG_OBJ_DATA: u8 = 0x53;
pub(crate) const TAG_CERTIFICATE: u8 = 0x70;
pub(crate) const TAG_CERT_INFO: u8 = 0x71;
pub(crate) const TAG_LRC: u8 = 0xFE;
pub(crate) const CERT_INFO_UNCOMPRESSED: u8 = 0x00;
pub(crate) const CERT_INFO_GZIP: u8 = 0x01;

// Metadata response tags
pub(crate) const TAG_METADATA_ALGORITHM: u8 = 0x01;
pub(crate) const TAG_METADATA_POLICY: u8 = 0x02;
pub(crate) const TAG_METADATA_ORIGIN: u8 = 0x03;
pub(crate) const TAG_METADATA_PUBLIC_KEY: u8 = 0x04;
pub(crate) const TAG_METADATA_IS_DEFAULT: u8 = 0x05;
pub(crate) const TAG_METADATA_RETRIES: u8 = 0x06;
pub(crate) const TAG_METADATA_BIO_CONFIGURED: u8 = 0x07;
pub(crate) const TAG_METADATA_TEMPORARY_PIN: u8 = 0x08;

// VERIFY P2=0x96 (biometric) request tags
pub(crate) const TAG_BIO_TEMPORARY_PIN: u8 = 0x01;
pub(crate) const TAG_BIO_GET_TEMPORARY_PIN: u8 = 0x02;
pub(crate) const TAG_BIO_VERIFY_UV: u8 = 0x03;

/// Certificates larger than this are gzip-compressed before PUT DATA
/// unless the caller opts out. Matches the historic on-card object limit.
pub(crate) const CERT_COMPRESS_THRESHOLD: usize = 1856;

/// PIN as shipped from the factory.
pub const DEFAULT_PIN: &str = "123456";
/// PUK as shipped from the factory.
pub const DEFAULT_PUK: &str = "12345678";
/// 3DES management key as shipped from the factory.
pub const DEFAULT_MGMT_KEY: [u8; 24] = [
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07,
    0x08, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
];

/// Well-known PIV data-object identifiers (SP 800-73 part 1, table 3).
///
/// Identifiers are encoded on the wire in their minimal form: `DISCOVERY`
/// is a single byte, everything else three bytes.
pub mod object_id {
    pub const CARD_AUTH: u32 = 0x005F_C101;
    pub const CHUID: u32 = 0x005F_C102;
    pub const FINGERPRINTS: u32 = 0x005F_C103;
    pub const AUTHENTICATION: u32 = 0x005F_C105;
    pub const SECURITY_OBJECT: u32 = 0x005F_C106;
    pub const CAPABILITY: u32 = 0x005F_C107;
    pub const FACIAL_IMAGE: u32 = 0x005F_C108;
    pub const PRINTED: u32 = 0x005F_C109;
    pub const SIGNATURE: u32 = 0x005F_C10A;
    pub const KEY_MANAGEMENT: u32 = 0x005F_C10B;
    pub const KEY_HISTORY: u32 = 0x005F_C10C;
    /// First retired key-management certificate; the remaining nineteen
    /// follow contiguously through `0x5FC120`.
    pub const RETIRED1: u32 = 0x005F_C10D;
    pub const ATTESTATION: u32 = 0x005F_C121;
    pub const DISCOVERY: u32 = 0x0000_007E;

    /// Object holding the certificate for retired slot `n` (1-based).
    pub const fn retired(n: u8) -> u32 {
        RETIRED1 + (n as u32) - 1
    }
}
