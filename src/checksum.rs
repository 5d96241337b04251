//! CRC32C (Castagnoli) checksums and the LevelDB mask transform.
//!
//! LevelDB stores every CRC in "masked" form so that files containing
//! embedded CRCs do not checksum to a fixed point:
//!
//! ```text
//! mask(crc)     = rotl(crc, 17) + 0xA282EAD8          (mod 2^32)
//! unmask(m)     = rotr(m - 0xA282EAD8, 17)            (mod 2^32)
//! ```
//!
//! Both record-log records and table blocks checksum the payload first and
//! then fold in the one-byte type discriminator.  The order matters; the
//! fold uses the incremental form.

use crate::error::{Error, Result};

const MASK_DELTA: u32 = 0xA282_EAD8;

/// CRC32C of a single slice.
#[inline]
pub fn crc(data: &[u8]) -> u32 {
    crc32c::crc32c(data)
}

/// Continue an existing CRC32C over more bytes.
#[inline]
pub fn crc_update(prev: u32, data: &[u8]) -> u32 {
    crc32c::crc32c_append(prev, data)
}

/// Apply the LevelDB storage mask to a raw CRC.
#[inline]
pub fn mask(crc: u32) -> u32 {
    crc.rotate_left(17).wrapping_add(MASK_DELTA)
}

/// Undo [`mask`], recovering the raw CRC.
#[inline]
pub fn unmask(masked: u32) -> u32 {
    masked.wrapping_sub(MASK_DELTA).rotate_right(17)
}

/// Verify a payload + one-byte type discriminator against a stored masked
/// CRC.  Fails with [`Error::CorruptChecksum`] on mismatch.
pub fn verify(payload: &[u8], kind: u8, stored_masked: u32) -> Result<()> {
    let stored = unmask(stored_masked);
    let computed = crc_update(crc(payload), &[kind]);
    if stored != computed {
        return Err(Error::CorruptChecksum { stored, computed });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn crc32c_check_vector() {
        // The canonical CRC32C check value.
        assert_eq!(crc(b"123456789"), 0xE306_9283);
    }

    #[test]
    fn incremental_equals_whole() {
        let data = b"the quick brown fox";
        let whole = crc(data);
        let split = crc_update(crc(&data[..7]), &data[7..]);
        assert_eq!(whole, split);
    }

    #[test]
    fn verify_folds_type_after_payload() {
        let payload = b"payload";
        let stored = mask(crc_update(crc(payload), &[0x01]));
        assert!(verify(payload, 0x01, stored).is_ok());
        // Same bytes hashed in the other order must not verify.
        let reversed = mask(crc_update(crc(&[0x01]), payload));
        assert!(matches!(
            verify(payload, 0x01, reversed),
            Err(Error::CorruptChecksum { .. })
        ));
    }

    proptest! {
        // mask(unmask(x)) == x over the whole u32 range.
        #[test]
        fn mask_involution(x in any::<u32>()) {
            prop_assert_eq!(mask(unmask(x)), x);
            prop_assert_eq!(unmask(mask(x)), x);
        }
    }
}
