//! Basic Encoding Rules (X.690): tag-length-value, byte aligned.

pub mod de;
pub mod enc;

pub use self::{de::BerDecoder, enc::BerEncoder};
