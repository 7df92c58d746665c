//! The coder environment: the active encoding rule, the module
//! registry for open-type resolution, and the library entry points.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use snafu::Snafu;

use crate::avn::{AvnDecoder, AvnEncoder};
use crate::ber::{BerDecoder, BerEncoder};
use crate::per::{PerDecoder, PerEncoder};
use crate::types::Value;
use crate::{avn, ber, per};

/// The encoding rules this runtime speaks. Only the aligned PER
/// variant exists; the unaligned variant is not constructible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingRule {
    Ber,
    PerAligned,
    Avn,
}

/// A compiled ASN.1 module registered for open-type resolution. The
/// runtime only stores and retrieves modules; generated code queries
/// them while decoding information objects.
pub trait Module {
    fn name(&self) -> &'static str;
}

#[derive(Snafu, Debug)]
pub enum EncodeError {
    #[snafu(context(false))]
    #[snafu(display("BER: {source}"))]
    BerEncode { source: ber::enc::Error },
    #[snafu(context(false))]
    #[snafu(display("PER: {source}"))]
    PerEncode { source: per::enc::Error },
    #[snafu(context(false))]
    #[snafu(display("value notation: {source}"))]
    AvnEncode { source: avn::enc::Error },
}

#[derive(Snafu, Debug)]
pub enum DecodeError {
    #[snafu(context(false))]
    #[snafu(display("BER: {source}"))]
    BerDecode { source: ber::de::Error },
    #[snafu(context(false))]
    #[snafu(display("PER: {source}"))]
    PerDecode { source: per::de::Error },
    #[snafu(context(false))]
    #[snafu(display("value notation: {source}"))]
    AvnDecode { source: avn::de::Error },
}

pub struct CoderEnv {
    rule: EncodingRule,
    modules: BTreeMap<&'static str, Box<dyn Module>>,
}

impl CoderEnv {
    pub fn new(rule: EncodingRule) -> Self {
        Self {
            rule,
            modules: BTreeMap::new(),
        }
    }

    pub fn rule(&self) -> EncodingRule {
        self.rule
    }

    pub fn set_rule(&mut self, rule: EncodingRule) {
        self.rule = rule;
    }

    pub fn register_module(&mut self, module: Box<dyn Module>) {
        self.modules.insert(module.name(), module);
    }

    pub fn find_module(&self, name: &str) -> Option<&dyn Module> {
        self.modules.get(name).map(Box::as_ref)
    }

    pub fn unregister_module(&mut self, name: &str) -> Option<Box<dyn Module>> {
        self.modules.remove(name)
    }

    /// Encode `value` under the active rule, appending to `output`.
    /// On failure the output holds an undefined prefix.
    pub fn encode(&self, value: &Value, output: &mut Vec<u8>) -> Result<(), EncodeError> {
        match self.rule {
            EncodingRule::Ber => {
                let mut encoder = BerEncoder::new();
                value.encode(&mut encoder)?;
                output.extend_from_slice(&encoder.output());
            }
            EncodingRule::PerAligned => {
                let mut encoder = PerEncoder::new();
                value.encode(&mut encoder)?;
                output.extend_from_slice(&encoder.output());
            }
            EncodingRule::Avn => {
                let mut encoder = AvnEncoder::new();
                value.encode(&mut encoder)?;
                output.extend_from_slice(encoder.output().as_bytes());
            }
        }
        Ok(())
    }

    /// Decode `input` into the caller's value shell under the active
    /// rule. With `defered` set, the decoder runs without the
    /// environment, so open types keep their raw buffers for a later
    /// [`CoderEnv::revisit`] instead of resolving eagerly. On failure
    /// the value is partially populated.
    pub fn decode(&self, input: &[u8], value: &mut Value, defered: bool) -> Result<(), DecodeError> {
        let env = (!defered).then_some(self);
        match self.rule {
            EncodingRule::Ber => {
                let mut decoder = BerDecoder::new(input, env);
                value.decode(&mut decoder)?;
            }
            EncodingRule::PerAligned => {
                let mut decoder = PerDecoder::new(input, env);
                value.decode(&mut decoder)?;
            }
            EncodingRule::Avn => {
                let text = core::str::from_utf8(input)
                    .map_err(|_| avn::de::Error::InvalidString)?;
                let mut decoder = AvnDecoder::new(text, env);
                value.decode(&mut decoder)?;
            }
        }
        Ok(())
    }

    /// Decode the deferred buffer of an open-type value into its held
    /// value, under the active rule.
    pub fn revisit(&self, value: &mut Value) -> Result<(), DecodeError> {
        match self.rule {
            EncodingRule::Ber => {
                let mut decoder = BerDecoder::new(&[], Some(self));
                value.revisit(&mut decoder)?;
            }
            EncodingRule::PerAligned => {
                let mut decoder = PerDecoder::new(&[], Some(self));
                value.revisit(&mut decoder)?;
            }
            EncodingRule::Avn => {
                let mut decoder = AvnDecoder::new("", Some(self));
                value.revisit(&mut decoder)?;
            }
        }
        Ok(())
    }
}
