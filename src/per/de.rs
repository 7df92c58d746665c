//! Aligned PER decoder.
//!
//! A close dual of the encoder, with two defensive caps taken from the
//! decoder options: hostile length determinants may not inflate strings
//! past `max_string_size` or arrays past `max_array_size`.

use alloc::string::String;
use alloc::vec::Vec;

use bytes::Bytes;
use snafu::Snafu;

use crate::bits::BitReader;
use crate::env::CoderEnv;
use crate::per::{log2, SIXTEEN_K};
use crate::types::constraints::{Constraint, ConstraintKind};
use crate::types::descriptor::{ChoiceInfo, Descriptor, Kind, SequenceInfo};
use crate::types::oid;
use crate::types::time::GeneralizedTime;
use crate::types::value::{BitString, ChoiceValue, OpenValue, SequenceValue, Value};
use crate::visit::{SeqStep, Visitor};

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Snafu, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[snafu(display("input exhausted before the element completed"))]
    Truncated,
    #[snafu(display("length exceeds the decoder cap of {limit}"))]
    SizeExceeded { limit: usize },
    #[snafu(display("fragmented lengths (16K and up) are not supported"))]
    UnsupportedFragmentedLength,
    #[snafu(display("integer contents are too long"))]
    LengthViolation,
    #[snafu(display("CHOICE index has no known alternative"))]
    UnknownChoice,
    #[snafu(display("malformed OBJECT IDENTIFIER contents"))]
    InvalidObjectIdentifier,
    #[snafu(display("malformed GeneralizedTime contents"))]
    InvalidTime,
    #[snafu(display("character code outside the permitted alphabet"))]
    InvalidCharacter,
}

/// Safety caps for hostile inputs, per decoder instance.
#[derive(Debug, Clone, Copy)]
pub struct DecoderOptions {
    pub max_string_size: usize,
    pub max_array_size: usize,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            max_string_size: SIXTEEN_K,
            max_array_size: 128,
        }
    }
}

pub struct PerDecoder<'a> {
    reader: BitReader<'a>,
    options: DecoderOptions,
    env: Option<&'a CoderEnv>,
}

impl<'a> PerDecoder<'a> {
    pub fn new(data: &'a [u8], env: Option<&'a CoderEnv>) -> Self {
        Self::with_options(data, env, DecoderOptions::default())
    }

    pub fn with_options(data: &'a [u8], env: Option<&'a CoderEnv>, options: DecoderOptions) -> Self {
        Self {
            reader: BitReader::new(data),
            options,
            env,
        }
    }

    fn read_bit(&mut self) -> Result<bool> {
        self.reader.read_bit().ok_or(Error::Truncated)
    }

    fn read_bits(&mut self, count: u32) -> Result<u64> {
        self.reader.read_bits(count).ok_or(Error::Truncated)
    }

    fn read_block(&mut self, count: usize) -> Result<&'a [u8]> {
        self.reader.read_bytes(count).ok_or(Error::Truncated)
    }

    fn decode_offset(&mut self, range: u64) -> Result<u64> {
        if range <= 1 {
            return Ok(0);
        }
        let n_bits = log2(range);
        if range > 255 {
            let n_bits = if n_bits > 16 {
                let max_octets = (n_bits + 7) / 8;
                let n_octets = self.decode_length(1, Some(u64::from(max_octets)))?;
                n_octets as u32 * 8
            } else if n_bits > 8 {
                16
            } else {
                n_bits
            };
            self.reader.byte_align();
            self.read_bits(n_bits)
        } else {
            self.read_bits(n_bits)
        }
    }

    fn decode_small_unsigned(&mut self) -> Result<u64> {
        if !self.read_bit()? {
            return self.read_bits(6);
        }
        let len = self.decode_length(0, None)?;
        if len == 0 || len > 8 {
            return Err(Error::LengthViolation);
        }
        self.reader.byte_align();
        self.read_bits(len as u32 * 8)
    }

    fn decode_length(&mut self, lower: u64, upper: Option<u64>) -> Result<usize> {
        if let Some(upper) = upper {
            if upper < 65536 {
                let offset = self.decode_offset(upper - lower + 1)?;
                return Ok((lower + offset) as usize);
            }
        }
        self.reader.byte_align();
        if !self.read_bit()? {
            return Ok(self.read_bits(7)? as usize);
        }
        if !self.read_bit()? {
            return Ok(self.read_bits(14)? as usize);
        }
        Err(Error::UnsupportedFragmentedLength)
    }

    fn decode_constrained_length(&mut self, constraint: Constraint) -> Result<usize> {
        match constraint.kind {
            ConstraintKind::Extendable => {
                if self.read_bit()? {
                    self.decode_length(0, None)
                } else {
                    self.decode_length(constraint.lower.max(0) as u64, Some(constraint.upper))
                }
            }
            ConstraintKind::Unconstrained => self.decode_length(0, None),
            _ => self.decode_length(constraint.lower.max(0) as u64, Some(constraint.upper)),
        }
    }

    fn decode_indefinite_int(&mut self, signed: bool) -> Result<i64> {
        let len = self.decode_length(0, None)?;
        if len == 0 || len > 8 {
            return Err(Error::LengthViolation);
        }
        self.reader.byte_align();
        let raw = self.read_bits(len as u32 * 8)?;
        if signed && len < 8 {
            let shift = 64 - len as u32 * 8;
            Ok((raw as i64) << shift >> shift)
        } else {
            Ok(raw as i64)
        }
    }

    /// Skip a length-prefixed open-type wrapper, returning the byte
    /// position just past it.
    fn wrapped_end(&mut self, len: usize) -> Result<usize> {
        let end = self.reader.byte_pos() + len;
        if len * 8 > self.reader.bits_left() + 7 {
            return Err(Error::Truncated);
        }
        Ok(end)
    }
}

impl<'a> Visitor for PerDecoder<'a> {
    type Error = Error;

    fn visit_null(&mut self, _desc: &'static Descriptor) -> Result<()> {
        Ok(())
    }

    fn visit_boolean(&mut self, _desc: &'static Descriptor, value: &mut bool) -> Result<()> {
        *value = self.read_bit()?;
        Ok(())
    }

    fn visit_integer(&mut self, desc: &'static Descriptor, value: &mut i64) -> Result<()> {
        let constraint = desc.constraint();
        match constraint.kind {
            ConstraintKind::Extendable if self.read_bit()? => {
                *value = self.decode_indefinite_int(false)?;
            }
            ConstraintKind::Unconstrained => *value = self.decode_indefinite_int(true)?,
            ConstraintKind::PartiallyConstrained => {
                *value = self.decode_indefinite_int(false)?;
            }
            _ => match constraint.range() {
                Some(range) if range > 1 => {
                    let offset = self.decode_offset(range)?;
                    *value = constraint.lower + offset as i64;
                }
                _ => *value = constraint.lower,
            },
        }
        Ok(())
    }

    fn visit_enumerated(&mut self, desc: &'static Descriptor, value: &mut i64) -> Result<()> {
        let (extendable, max) = match desc.kind {
            Kind::Enumerated { extendable, max, .. } => (extendable, max),
            _ => unreachable!("enumerated repr with non-enumerated descriptor"),
        };
        if extendable && self.read_bit()? {
            *value = self.decode_small_unsigned()? as i64;
        } else {
            *value = self.decode_offset(max as u64 + 1)? as i64;
        }
        Ok(())
    }

    fn visit_object_id(&mut self, _desc: &'static Descriptor, arcs: &mut Vec<u32>) -> Result<()> {
        let len = self.decode_length(0, Some(255))?;
        let body = self.read_block(len)?;
        *arcs = oid::decode_body(body).ok_or(Error::InvalidObjectIdentifier)?;
        Ok(())
    }

    fn visit_bit_string(&mut self, desc: &'static Descriptor, bits: &mut BitString) -> Result<()> {
        let total = self.decode_constrained_length(desc.constraint())?;
        if total > self.options.max_string_size {
            return Err(Error::SizeExceeded {
                limit: self.options.max_string_size,
            });
        }
        bits.clear();
        if total == 0 {
            return Ok(());
        }
        if total > self.reader.bits_left() {
            return Err(Error::Truncated);
        }
        if total > 16 {
            let body = self.read_block((total + 7) / 8)?;
            *bits = BitString::from_slice(body);
            bits.truncate(total);
        } else {
            for _ in 0..total {
                let bit = self.read_bit()?;
                bits.push(bit);
            }
        }
        Ok(())
    }

    fn visit_octet_string(&mut self, desc: &'static Descriptor, octets: &mut Vec<u8>) -> Result<()> {
        let len = self.decode_constrained_length(desc.constraint())?;
        if len > self.options.max_string_size {
            return Err(Error::SizeExceeded {
                limit: self.options.max_string_size,
            });
        }
        octets.clear();
        match len {
            0 => {}
            1 | 2 => {
                for _ in 0..len {
                    octets.push(self.read_bits(8)? as u8);
                }
            }
            _ => octets.extend_from_slice(self.read_block(len)?),
        }
        Ok(())
    }

    fn visit_char_string(&mut self, desc: &'static Descriptor, text: &mut String) -> Result<()> {
        let (constraint, set) = match desc.kind {
            Kind::CharString { constraint, set } => (constraint, set),
            _ => unreachable!("character repr with non-character descriptor"),
        };
        let len = self.decode_constrained_length(constraint)?;
        if len > self.options.max_string_size {
            return Err(Error::SizeExceeded {
                limit: self.options.max_string_size,
            });
        }
        text.clear();

        let n_bits = set.aligned_bits;
        if constraint.kind == ConstraintKind::Unconstrained
            || constraint.upper.saturating_mul(u64::from(n_bits)) > 16
        {
            if n_bits == 8 {
                let body = self.read_block(len)?;
                text.extend(body.iter().map(|&b| b as char));
                return Ok(());
            }
            self.reader.byte_align();
        }

        for _ in 0..len {
            let code = self.read_bits(n_bits)? as u32;
            if set.is_passthrough(n_bits) {
                text.push(code as u8 as char);
            } else {
                let ch = *set
                    .chars
                    .get(code as usize)
                    .ok_or(Error::InvalidCharacter)?;
                text.push(ch as char);
            }
        }
        Ok(())
    }

    fn visit_bmp_string(&mut self, desc: &'static Descriptor, units: &mut Vec<u16>) -> Result<()> {
        let (constraint, first, last) = match desc.kind {
            Kind::BmpString {
                constraint,
                first,
                last,
            } => (constraint, first, last),
            _ => unreachable!("BMP repr with non-BMP descriptor"),
        };
        let len = self.decode_constrained_length(constraint)?;
        if len > self.options.max_string_size {
            return Err(Error::SizeExceeded {
                limit: self.options.max_string_size,
            });
        }
        units.clear();

        let n_bits = log2(u64::from(last - first) + 1).next_power_of_two();
        if constraint.kind == ConstraintKind::Unconstrained
            || constraint.upper.saturating_mul(u64::from(n_bits)) > 16
        {
            self.reader.byte_align();
        }
        for _ in 0..len {
            let offset = self.read_bits(n_bits)?;
            units.push(first + offset as u16);
        }
        Ok(())
    }

    fn visit_time(&mut self, _desc: &'static Descriptor, time: &mut GeneralizedTime) -> Result<()> {
        let len = self.decode_length(0, None)?;
        let body = self.read_block(len)?;
        let text = core::str::from_utf8(body).map_err(|_| Error::InvalidTime)?;
        *time = GeneralizedTime::parse(text).ok_or(Error::InvalidTime)?;
        Ok(())
    }

    fn visit_choice(
        &mut self,
        _desc: &'static Descriptor,
        info: &'static ChoiceInfo,
        choice: &mut ChoiceValue,
    ) -> Result<()> {
        if info.extendable && self.read_bit()? {
            let index = info.num_root + self.decode_small_unsigned()? as usize;
            let len = self.decode_length(0, None)?;
            let next = self.wrapped_end(len)?;
            if choice.select(info, index) {
                if let Some(child) = choice.child.as_deref_mut() {
                    child.decode(self)?;
                }
            }
            self.reader.set_byte_pos(next);
            return Ok(());
        }

        let index = if info.num_root < 2 {
            0
        } else {
            self.decode_offset(info.num_root as u64)? as usize
        };
        if !choice.select(info, index) {
            return Err(Error::UnknownChoice);
        }
        match choice.child.as_deref_mut() {
            Some(child) => child.decode(self),
            None => Ok(()),
        }
    }

    fn visit_sequence_of(
        &mut self,
        desc: &'static Descriptor,
        elements: &mut Vec<Value>,
    ) -> Result<()> {
        let element_desc = match desc.kind {
            Kind::SequenceOf { element, .. } => element,
            _ => unreachable!("sequence-of repr with non-sequence-of descriptor"),
        };
        let size = self.decode_constrained_length(desc.constraint())?;
        if size > self.options.max_array_size {
            return Err(Error::SizeExceeded {
                limit: self.options.max_array_size,
            });
        }
        elements.clear();
        for _ in 0..size {
            let mut element = element_desc.new_value();
            element.decode(self)?;
            elements.push(element);
        }
        Ok(())
    }

    fn visit_open(&mut self, desc: &'static Descriptor, open: &mut OpenValue) -> Result<()> {
        let len = self.decode_length(0, None)?;
        if let (Kind::Open { inner: Some(_) }, Some(value)) = (&desc.kind, open.value.as_deref_mut())
        {
            let next = self.wrapped_end(len)?;
            value.decode(self)?;
            self.reader.set_byte_pos(next);
            return Ok(());
        }
        if len > self.options.max_string_size {
            return Err(Error::SizeExceeded {
                limit: self.options.max_string_size,
            });
        }
        let body = self.read_block(len)?;
        open.buffer = Some(Bytes::copy_from_slice(body));
        Ok(())
    }

    fn redecode_open(&mut self, _desc: &'static Descriptor, open: &mut OpenValue) -> Result<()> {
        let buffer = match (&open.buffer, open.value.is_some()) {
            (Some(buffer), true) => buffer.clone(),
            _ => return Err(Error::Truncated),
        };
        let mut decoder = PerDecoder::with_options(&buffer, self.env, self.options);
        match open.value.as_deref_mut() {
            Some(value) => value.decode(&mut decoder),
            None => Ok(()),
        }
    }

    fn pre_decode_extension_roots(
        &mut self,
        _desc: &'static Descriptor,
        info: &'static SequenceInfo,
        seq: &mut SequenceValue,
    ) -> Result<SeqStep> {
        let has_extensions = info.extendable && self.read_bit()?;
        for opt in 0..info.num_optional {
            let bit = self.read_bit()?;
            seq.option_map.set(opt, bit);
        }
        Ok(if has_extensions {
            SeqStep::Continue
        } else {
            SeqStep::NoExtension
        })
    }

    fn decode_extension_root(
        &mut self,
        info: &'static SequenceInfo,
        seq: &mut SequenceValue,
        pos: usize,
    ) -> Result<SeqStep> {
        if seq.field_present(info, pos) {
            if seq.fields[pos].is_none() {
                seq.fields[pos] = Some(info.fields[pos].desc.new_value());
            }
            if let Some(field) = seq.field_mut(pos) {
                field.decode(self)?;
            }
        }
        Ok(SeqStep::Continue)
    }

    fn pre_decode_extensions(
        &mut self,
        _info: &'static SequenceInfo,
        seq: &mut SequenceValue,
    ) -> Result<SeqStep> {
        let total = self.decode_small_unsigned()? as usize + 1;
        if total > self.options.max_array_size {
            return Err(Error::SizeExceeded {
                limit: self.options.max_array_size,
            });
        }
        seq.extension_map.clear();
        seq.extension_map.resize(total, false);
        for k in 0..total {
            let bit = self.read_bit()?;
            seq.extension_map.set(k, bit);
        }
        Ok(SeqStep::Continue)
    }

    fn decode_known_extension(
        &mut self,
        info: &'static SequenceInfo,
        seq: &mut SequenceValue,
        pos: usize,
    ) -> Result<SeqStep> {
        let k = pos - info.num_root;
        if k >= seq.extension_map.len() || !seq.extension_map[k] {
            return Ok(SeqStep::Continue);
        }
        let len = self.decode_length(0, None)?;
        let next = self.wrapped_end(len)?;
        if seq.fields[pos].is_none() {
            seq.fields[pos] = Some(info.fields[pos].desc.new_value());
        }
        if let Some(field) = seq.field_mut(pos) {
            field.decode(self)?;
        }
        self.reader.set_byte_pos(next);
        Ok(SeqStep::Continue)
    }

    fn decode_unknown_extensions(
        &mut self,
        info: &'static SequenceInfo,
        seq: &mut SequenceValue,
    ) -> Result<()> {
        for k in info.known_extensions()..seq.extension_map.len() {
            if seq.extension_map[k] {
                let len = self.decode_length(0, None)?;
                self.read_block(len)?;
            }
        }
        Ok(())
    }
}
