//! Persistent region over the TAMP backup registers.
//!
//! The registers live in the backup domain, so they keep their contents
//! through stop, standby and a VDD cut while VBAT is present. Writes are
//! word-wide; byte writes read-modify-write the containing register.

use embassy_stm32::pac;
use qualifier_core::persist::{PersistentRegion, RegionError};

/// Backup registers on the STM32G0B1.
const BACKUP_WORDS: usize = 5;
const WORD_LEN: usize = 4;

/// Requires the backup domain to be writable, which RTC initialization
/// already arranges.
pub struct BackupRegion {
    _private: (),
}

impl BackupRegion {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn load_word(index: usize) -> [u8; WORD_LEN] {
        pac::TAMP.bkpr(index).read().bkp().to_le_bytes()
    }

    fn store_word(index: usize, bytes: [u8; WORD_LEN]) {
        let value = u32::from_le_bytes(bytes);
        pac::TAMP.bkpr(index).write(|w| w.set_bkp(value));
    }

    fn check(&self, offset: usize, len: usize) -> Result<(), RegionError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.capacity() => Ok(()),
            _ => Err(RegionError::OutOfBounds { offset, len }),
        }
    }
}

impl PersistentRegion for BackupRegion {
    fn capacity(&self) -> usize {
        BACKUP_WORDS * WORD_LEN
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), RegionError> {
        self.check(offset, buf.len())?;
        for (position, byte) in (offset..).zip(buf.iter_mut()) {
            *byte = Self::load_word(position / WORD_LEN)[position % WORD_LEN];
        }
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), RegionError> {
        self.check(offset, data.len())?;
        let mut position = offset;
        for chunk_len in chunk_lengths(offset, data.len()) {
            let word = position / WORD_LEN;
            let start = position % WORD_LEN;
            let mut bytes = Self::load_word(word);
            let source = &data[position - offset..position - offset + chunk_len];
            bytes[start..start + chunk_len].copy_from_slice(source);
            Self::store_word(word, bytes);
            position += chunk_len;
        }
        Ok(())
    }
}

/// Splits `offset..offset + len` at word boundaries.
fn chunk_lengths(offset: usize, len: usize) -> impl Iterator<Item = usize> {
    let mut position = offset;
    let end = offset + len;
    core::iter::from_fn(move || {
        if position >= end {
            return None;
        }
        let chunk = (WORD_LEN - position % WORD_LEN).min(end - position);
        position += chunk;
        Some(chunk)
    })
}
