//! Factory reset of the PIV application
//!
//! The card only accepts RESET once both the PIN and the PUK are blocked,
//! so the flow deliberately burns the remaining attempts with values that
//! cannot match, then issues the instruction. Biometric-enrolled devices
//! refuse the whole procedure up front: a reset would strand the
//! fingerprints.

use crate::apdu::CommandApdu;
use crate::constants::{INS_RESET, INS_RESET_RETRY, KEY_REF_PIN};
use crate::prelude::*;
use crate::transport::Transport;

use super::Session;

/// Upper bound on attempt-burning loops; retry counters are a byte.
const MAX_BLOCK_ATTEMPTS: usize = 256;

impl<T: Transport> Session<T> {
    /// Wipe the PIV application: all keys, certificates and data objects
    /// are destroyed, PIN/PUK/management key return to factory defaults.
    ///
    /// Fails without touching the card when fingerprints are enrolled.
    pub async fn reset(&mut self) -> Result<()> {
        if let Some(bio) = self.bio_metadata().await? {
            if bio.is_configured {
                return Err(Error::invalid_argument(
                    "reset",
                    "biometric enrollment present; remove fingerprints first",
                ));
            }
        }

        info!("blocking PIN and PUK ahead of reset");
        self.block_pin().await?;
        self.block_puk().await?;

        let apdu = CommandApdu::new(INS_RESET, 0x00, 0x00);
        self.transmit(&apdu).await?.require_success()?;

        self.set_authenticated(false);
        self.set_pin_verified(false);
        self.refresh_mgm_key_type().await?;
        info!("PIV application reset to factory state");
        Ok(())
    }

    async fn block_pin(&mut self) -> Result<()> {
        for _ in 0..MAX_BLOCK_ATTEMPTS {
            match self.verify_pin_raw("").await {
                Err(Error::WrongPin { .. }) => continue,
                Err(Error::Blocked) => return Ok(()),
                // All-padding can never be a valid PIN.
                Ok(()) => return Err(Error::protocol("device accepted an empty PIN")),
                Err(e) => return Err(e),
            }
        }
        Err(Error::protocol("PIN retry counter refused to reach zero"))
    }

    /// Burning PUK attempts goes through unblock-PIN: each wrong PUK in
    /// an `INS 2C` decrements the PUK counter.
    async fn block_puk(&mut self) -> Result<()> {
        for _ in 0..MAX_BLOCK_ATTEMPTS {
            match self
                .change_reference(INS_RESET_RETRY, KEY_REF_PIN, "", "", true)
                .await
            {
                Err(Error::WrongPuk { .. }) => continue,
                Err(Error::Blocked) => return Ok(()),
                Ok(()) => return Err(Error::protocol("device accepted an empty PUK")),
                Err(e) => return Err(e),
            }
        }
        Err(Error::protocol("PUK retry counter refused to reach zero"))
    }
}
