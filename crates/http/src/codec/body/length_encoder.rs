//! Accounting for `Content-Length` delimited response bodies.
//!
//! The bytes themselves are scatter-written by the write driver; this
//! encoder only checks that what was written matches what the committed
//! header declared.

use crate::protocol::SendError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    declared: u64,
    written: u64,
}

impl LengthEncoder {
    pub fn new(declared: u64) -> Self {
        Self { declared, written: 0 }
    }

    /// Records `len` bytes about to be written.
    pub fn note(&mut self, len: usize) -> Result<(), SendError> {
        self.written += len as u64;
        if self.written > self.declared {
            return Err(SendError::LengthMismatch { declared: self.declared, written: self.written });
        }
        Ok(())
    }

    /// Verifies the declared length was fully written.
    pub fn finish(&self) -> Result<(), SendError> {
        if self.written != self.declared {
            return Err(SendError::LengthMismatch { declared: self.declared, written: self.written });
        }
        Ok(())
    }
}
