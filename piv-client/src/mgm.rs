//! Management key: type matrix and single-block ECB primitive
//!
//! The PIV management key is symmetric: 3DES historically, AES-128/192/256
//! on newer firmware. Mutual authentication (see `session::auth`) only
//! ever encrypts or decrypts a single cipher block, so that is all this
//! module exposes.

use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use serde::Serialize;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::buffer::SecretBuffer;
use crate::constants::DEFAULT_MGMT_KEY;
use crate::prelude::*;

/// Cipher backing the management key in slot 9B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MgmKeyAlgorithm {
    TripleDes,
    Aes128,
    Aes192,
    Aes256,
}

impl MgmKeyAlgorithm {
    /// Key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Self::TripleDes | Self::Aes192 => 24,
            Self::Aes128 => 16,
            Self::Aes256 => 32,
        }
    }

    /// Cipher block length in bytes: 8 for 3DES, 16 for AES.
    pub fn block_len(self) -> usize {
        match self {
            Self::TripleDes => 8,
            _ => 16,
        }
    }

    /// PIV algorithm identifier, used as P1 in GENERAL AUTHENTICATE and as
    /// the leading byte of SET MANAGEMENT KEY.
    pub fn algorithm_id(self) -> u8 {
        match self {
            Self::TripleDes => 0x03,
            Self::Aes128 => 0x08,
            Self::Aes192 => 0x0A,
            Self::Aes256 => 0x0C,
        }
    }

    pub(crate) fn from_algorithm_id(id: u8) -> Option<Self> {
        match id {
            0x03 => Some(Self::TripleDes),
            0x08 => Some(Self::Aes128),
            0x0A => Some(Self::Aes192),
            0x0C => Some(Self::Aes256),
            _ => None,
        }
    }
}

/// A management key held by the host, wiped on drop.
pub struct MgmKey {
    algorithm: MgmKeyAlgorithm,
    bytes: SecretBuffer,
}

impl MgmKey {
    /// Take ownership of key material. The length must match the
    /// algorithm's key size.
    pub fn new(algorithm: MgmKeyAlgorithm, bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = SecretBuffer::new(bytes.into());
        if bytes.len() != algorithm.key_len() {
            return Err(Error::invalid_argument(
                "management_key",
                format!(
                    "{:?} requires {} bytes, got {}",
                    algorithm,
                    algorithm.key_len(),
                    bytes.len()
                ),
            ));
        }
        Ok(Self { algorithm, bytes })
    }

    /// The well-known factory-default 3DES key.
    pub fn default_triple_des() -> Self {
        Self {
            algorithm: MgmKeyAlgorithm::TripleDes,
            bytes: SecretBuffer::from(&DEFAULT_MGMT_KEY[..]),
        }
    }

    pub fn algorithm(&self) -> MgmKeyAlgorithm {
        self.algorithm
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    pub(crate) fn encrypt_block(&self, block: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.block_op(block, true)
    }

    pub(crate) fn decrypt_block(&self, block: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.block_op(block, false)
    }

    fn block_op(&self, data: &[u8], encrypt: bool) -> Result<Zeroizing<Vec<u8>>> {
        if data.len() != self.algorithm.block_len() {
            return Err(Error::protocol(format!(
                "cipher block of {} bytes, expected {}",
                data.len(),
                self.algorithm.block_len()
            )));
        }

        macro_rules! run {
            ($cipher:ty) => {{
                let cipher = <$cipher>::new_from_slice(self.bytes.as_slice())
                    .map_err(|_| Error::invalid_argument("management_key", "bad key length"))?;
                let mut block = GenericArray::clone_from_slice(data);
                if encrypt {
                    cipher.encrypt_block(&mut block);
                } else {
                    cipher.decrypt_block(&mut block);
                }
                let out = Zeroizing::new(block.to_vec());
                block.iter_mut().for_each(|b| *b = 0);
                out
            }};
        }

        Ok(match self.algorithm {
            MgmKeyAlgorithm::TripleDes => run!(des::TdesEde3),
            MgmKeyAlgorithm::Aes128 => run!(aes::Aes128),
            MgmKeyAlgorithm::Aes192 => run!(aes::Aes192),
            MgmKeyAlgorithm::Aes256 => run!(aes::Aes256),
        })
    }
}

impl std::fmt::Debug for MgmKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MgmKey({:?})", self.algorithm)
    }
}

/// Length-then-content comparison that does not leak where the first
/// mismatching byte sits.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    bool::from(a.ct_eq(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(MgmKeyAlgorithm::TripleDes, 24, 8)]
    #[case(MgmKeyAlgorithm::Aes128, 16, 16)]
    #[case(MgmKeyAlgorithm::Aes192, 24, 16)]
    #[case(MgmKeyAlgorithm::Aes256, 32, 16)]
    fn key_and_block_lengths(
        #[case] alg: MgmKeyAlgorithm,
        #[case] key_len: usize,
        #[case] block_len: usize,
    ) {
        assert_eq!(alg.key_len(), key_len);
        assert_eq!(alg.block_len(), block_len);
        assert_eq!(MgmKeyAlgorithm::from_algorithm_id(alg.algorithm_id()), Some(alg));
    }

    #[test]
    fn rejects_wrong_key_length() {
        assert!(MgmKey::new(MgmKeyAlgorithm::Aes256, vec![0u8; 24]).is_err());
        assert!(MgmKey::new(MgmKeyAlgorithm::TripleDes, vec![0u8; 16]).is_err());
    }

    #[rstest]
    #[case(MgmKeyAlgorithm::TripleDes)]
    #[case(MgmKeyAlgorithm::Aes128)]
    #[case(MgmKeyAlgorithm::Aes192)]
    #[case(MgmKeyAlgorithm::Aes256)]
    fn encrypt_decrypt_round_trip(#[case] alg: MgmKeyAlgorithm) {
        let key = MgmKey::new(alg, vec![0x42u8; alg.key_len()]).unwrap();
        let plain = vec![0xA5u8; alg.block_len()];
        let cipher_text = key.encrypt_block(&plain).unwrap();
        assert_ne!(&*cipher_text, &plain);
        let round = key.decrypt_block(&cipher_text).unwrap();
        assert_eq!(&*round, &plain);
    }

    #[test]
    fn rejects_wrong_block_length() {
        let key = MgmKey::default_triple_des();
        assert!(key.encrypt_block(&[0u8; 16]).is_err());
        assert!(key.decrypt_block(&[0u8; 7]).is_err());
    }

    #[test]
    fn default_key_matches_factory_value() {
        let key = MgmKey::default_triple_des();
        assert_eq!(key.algorithm(), MgmKeyAlgorithm::TripleDes);
        assert_eq!(key.as_bytes(), &DEFAULT_MGMT_KEY);
    }

    #[test]
    fn constant_time_compare() {
        assert!(constant_time_eq(&[1, 2, 3], &[1, 2, 3]));
        assert!(!constant_time_eq(&[1, 2, 3], &[1, 2, 4]));
        assert!(!constant_time_eq(&[1, 2, 3], &[1, 2]));
        assert!(constant_time_eq(&[], &[]));
    }

    #[test]
    fn debug_hides_key_material() {
        let key = MgmKey::default_triple_des();
        assert_eq!(format!("{key:?}"), "MgmKey(TripleDes)");
    }
}
