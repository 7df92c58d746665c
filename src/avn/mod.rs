//! ASN.1 value notation (X.680): the human-readable text form.

pub mod de;
pub mod enc;

pub use self::{de::AvnDecoder, enc::AvnEncoder};

use alloc::string::String;

use crate::types::Value;

impl Value {
    /// Format this value in ASN.1 value notation.
    pub fn to_value_notation(&self) -> Result<String, enc::Error> {
        let mut encoder = AvnEncoder::new();
        self.encode(&mut encoder)?;
        Ok(encoder.output())
    }

    /// Populate this value from ASN.1 value notation.
    pub fn from_value_notation(&mut self, text: &str) -> Result<(), de::Error> {
        let mut decoder = AvnDecoder::new(text, None);
        self.decode(&mut decoder)?;
        decoder.finish()
    }
}
