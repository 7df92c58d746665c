//! Aligned PER encoder.
//!
//! Alignment happens only at the points X.691 prescribes: before a
//! length determinant in its unconstrained forms, before a constrained
//! whole number wider than a byte, before long strings, and before open
//! type contents. Single-bit markers, normally-small numbers and
//! sub-byte constrained numbers stay bit-packed.

mod error;

use alloc::vec::Vec;

use crate::bits::BitWriter;
use crate::per::{log2, unsigned_octets, SIXTEEN_K};
use crate::types::constraints::{Constraint, ConstraintKind};
use crate::types::descriptor::{ChoiceInfo, Descriptor, Kind, SequenceInfo};
use crate::types::time::GeneralizedTime;
use crate::types::value::{BitString, ChoiceValue, OpenValue, SequenceValue, Value};
use crate::types::oid;
use crate::visit::ConstVisitor;

pub use error::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Default)]
pub struct PerEncoder {
    output: BitWriter,
}

impl PerEncoder {
    /// An encoder for the aligned variant. The unaligned variant is not
    /// supported and has no constructor.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(self) -> Vec<u8> {
        self.output.into_bytes()
    }

    /// X.691 §10.5: a constrained whole number as an offset into its
    /// range.
    fn encode_offset(&mut self, offset: u64, range: u64) -> Result<()> {
        if range <= 1 {
            return Ok(());
        }
        let n_bits = log2(range);
        if range > 255 {
            if n_bits > 16 {
                let n_octets = unsigned_octets(offset);
                let max_octets = (n_bits + 7) / 8;
                self.encode_length(n_octets as usize, 1, Some(u64::from(max_octets)))?;
                self.output.byte_align();
                self.output.push_bits(offset, n_octets * 8);
            } else {
                let n_bits = if n_bits > 8 { 16 } else { n_bits };
                self.output.byte_align();
                self.output.push_bits(offset, n_bits);
            }
        } else {
            self.output.push_bits(offset, n_bits);
        }
        Ok(())
    }

    /// X.691 §10.6: a normally small non-negative whole number.
    fn encode_small_unsigned(&mut self, value: u64) -> Result<()> {
        if value < 64 {
            self.output.push_bit(false);
            self.output.push_bits(value, 6);
            return Ok(());
        }
        self.output.push_bit(true);
        let n_octets = unsigned_octets(value);
        self.encode_length(n_octets as usize, 0, None)?;
        self.output.byte_align();
        self.output.push_bits(value, n_octets * 8);
        Ok(())
    }

    /// X.691 §10.9: a length determinant. Bounded below 64K lengths are
    /// constrained whole numbers; anything else uses the aligned
    /// single- or double-octet form. The fragmented form is refused.
    fn encode_length(&mut self, len: usize, lower: u64, upper: Option<u64>) -> Result<()> {
        if let Some(upper) = upper {
            if upper < 65536 {
                if (len as u64) < lower || len as u64 > upper {
                    return Err(Error::ValueOutOfRange { value: len as i64 });
                }
                return self.encode_offset(len as u64 - lower, upper - lower + 1);
            }
        }
        self.output.byte_align();
        if len <= 127 {
            self.output.push_bit(false);
            self.output.push_bits(len as u64, 7);
            Ok(())
        } else if len < SIXTEEN_K {
            self.output.push_bits(0b10, 2);
            self.output.push_bits(len as u64, 14);
            Ok(())
        } else {
            Err(Error::UnsupportedLength { len })
        }
    }

    /// A length under a size constraint, with the extension-escape bit
    /// when the constraint is extensible.
    fn encode_constrained_length(&mut self, constraint: Constraint, len: usize) -> Result<()> {
        match constraint.kind {
            ConstraintKind::Extendable => {
                let in_range = constraint.contains_length(len);
                self.output.push_bit(!in_range);
                if in_range {
                    self.encode_length(len, constraint.lower.max(0) as u64, Some(constraint.upper))
                } else {
                    self.encode_length(len, 0, None)
                }
            }
            ConstraintKind::Unconstrained => self.encode_length(len, 0, None),
            _ => self.encode_length(len, constraint.lower.max(0) as u64, Some(constraint.upper)),
        }
    }

    fn encode_constrained_int(&mut self, constraint: Constraint, value: i64) -> Result<()> {
        if !constraint.contains(value) {
            return Err(Error::ValueOutOfRange { value });
        }
        match constraint.range() {
            Some(range) => self.encode_offset(constraint.effective_value(value), range),
            None => Ok(()),
        }
    }

    /// An integer without a usable range: minimum octets behind a
    /// length determinant, two's complement only for fully
    /// unconstrained types.
    fn encode_indefinite_int(&mut self, value: i64, signed: bool) -> Result<()> {
        let (skip, bytes);
        if signed {
            let be = value.to_be_bytes();
            let mut start = 0;
            while start < 7 {
                let redundant = (be[start] == 0x00 && be[start + 1] & 0x80 == 0)
                    || (be[start] == 0xFF && be[start + 1] & 0x80 != 0);
                if !redundant {
                    break;
                }
                start += 1;
            }
            (skip, bytes) = (start, be);
        } else {
            if value < 0 {
                return Err(Error::ValueOutOfRange { value });
            }
            let be = value.to_be_bytes();
            (skip, bytes) = (8 - unsigned_octets(value as u64) as usize, be);
        }
        self.encode_length(8 - skip, 0, None)?;
        self.output.byte_align();
        self.output.append_bytes(&bytes[skip..]);
        Ok(())
    }

    fn encode_wrapped(&mut self, value: &Value) -> Result<()> {
        let mut nested = PerEncoder::new();
        value.encode(&mut nested)?;
        let bytes = nested.output();
        self.encode_length(bytes.len(), 0, None)?;
        self.output.byte_align();
        self.output.append_bytes(&bytes);
        Ok(())
    }
}

impl ConstVisitor for PerEncoder {
    type Error = Error;

    fn visit_null(&mut self, _desc: &'static Descriptor) -> Result<()> {
        Ok(())
    }

    fn visit_boolean(&mut self, _desc: &'static Descriptor, value: bool) -> Result<()> {
        self.output.push_bit(value);
        Ok(())
    }

    fn visit_integer(&mut self, desc: &'static Descriptor, value: i64) -> Result<()> {
        let constraint = desc.constraint();
        match constraint.kind {
            ConstraintKind::Extendable => {
                let in_range = constraint.contains(value);
                self.output.push_bit(!in_range);
                if in_range {
                    self.encode_constrained_int(constraint, value)
                } else {
                    self.encode_indefinite_int(value, false)
                }
            }
            ConstraintKind::Fixed => self.encode_constrained_int(constraint, value),
            ConstraintKind::Unconstrained => self.encode_indefinite_int(value, true),
            ConstraintKind::PartiallyConstrained => self.encode_indefinite_int(value, false),
        }
    }

    fn visit_enumerated(&mut self, desc: &'static Descriptor, value: i64) -> Result<()> {
        let (extendable, max) = match desc.kind {
            Kind::Enumerated { extendable, max, .. } => (extendable, max),
            _ => unreachable!("enumerated repr with non-enumerated descriptor"),
        };
        if value < 0 {
            return Err(Error::ValueOutOfRange { value });
        }
        if extendable {
            let in_root = value <= max;
            self.output.push_bit(!in_root);
            if in_root {
                self.encode_offset(value as u64, max as u64 + 1)
            } else {
                self.encode_small_unsigned(value as u64)
            }
        } else {
            if value > max {
                return Err(Error::ValueOutOfRange { value });
            }
            self.encode_offset(value as u64, max as u64 + 1)
        }
    }

    fn visit_object_id(&mut self, _desc: &'static Descriptor, arcs: &[u32]) -> Result<()> {
        let mut body = Vec::with_capacity(arcs.len() * 2);
        oid::encode_body(arcs, &mut body);
        self.encode_length(body.len(), 0, Some(255))?;
        self.output.byte_align();
        self.output.append_bytes(&body);
        Ok(())
    }

    fn visit_bit_string(&mut self, desc: &'static Descriptor, bits: &BitString) -> Result<()> {
        self.encode_constrained_length(desc.constraint(), bits.len())?;
        if bits.is_empty() {
            return Ok(());
        }
        if bits.len() > 16 {
            self.output.byte_align();
            let mut padded = bits.clone();
            padded.resize((bits.len() + 7) / 8 * 8, false);
            self.output.append_bytes(&padded.into_vec());
        } else {
            self.output.append_bit_slice(bits);
        }
        Ok(())
    }

    fn visit_octet_string(&mut self, desc: &'static Descriptor, octets: &[u8]) -> Result<()> {
        self.encode_constrained_length(desc.constraint(), octets.len())?;
        match octets.len() {
            0 => {}
            1 | 2 => {
                for &byte in octets {
                    self.output.push_bits(u64::from(byte), 8);
                }
            }
            _ => {
                self.output.byte_align();
                self.output.append_bytes(octets);
            }
        }
        Ok(())
    }

    fn visit_char_string(&mut self, desc: &'static Descriptor, text: &str) -> Result<()> {
        let (constraint, set) = match desc.kind {
            Kind::CharString { constraint, set } => (constraint, set),
            _ => unreachable!("character repr with non-character descriptor"),
        };
        let len = text.chars().count();
        self.encode_constrained_length(constraint, len)?;

        let n_bits = set.aligned_bits;
        if constraint.kind == ConstraintKind::Unconstrained
            || constraint.upper.saturating_mul(u64::from(n_bits)) > 16
        {
            if n_bits == 8 {
                let bytes: Vec<u8> = text.chars().map(|c| c as u32 as u8).collect();
                self.output.byte_align();
                self.output.append_bytes(&bytes);
                return Ok(());
            }
            self.output.byte_align();
        }

        for ch in text.chars() {
            let code = ch as u32;
            if code > 255 || !set.contains(code as u8) {
                return Err(Error::InvalidCharacter { ch });
            }
            if set.is_passthrough(n_bits) {
                self.output.push_bits(u64::from(code), n_bits);
            } else {
                let index = set
                    .index_of(code as u8)
                    .ok_or(Error::InvalidCharacter { ch })?;
                self.output.push_bits(index as u64, n_bits);
            }
        }
        Ok(())
    }

    fn visit_bmp_string(&mut self, desc: &'static Descriptor, units: &[u16]) -> Result<()> {
        let (constraint, first, last) = match desc.kind {
            Kind::BmpString {
                constraint,
                first,
                last,
            } => (constraint, first, last),
            _ => unreachable!("BMP repr with non-BMP descriptor"),
        };
        self.encode_constrained_length(constraint, units.len())?;

        let n_bits = log2(u64::from(last - first) + 1).next_power_of_two();
        if constraint.kind == ConstraintKind::Unconstrained
            || constraint.upper.saturating_mul(u64::from(n_bits)) > 16
        {
            self.output.byte_align();
        }
        for &unit in units {
            if unit < first || unit > last {
                return Err(Error::ValueOutOfRange {
                    value: i64::from(unit),
                });
            }
            self.output.push_bits(u64::from(unit - first), n_bits);
        }
        Ok(())
    }

    fn visit_time(&mut self, _desc: &'static Descriptor, time: &GeneralizedTime) -> Result<()> {
        let text = time.format();
        self.encode_length(text.len(), 0, None)?;
        self.output.byte_align();
        self.output.append_bytes(text.as_bytes());
        Ok(())
    }

    fn visit_choice(
        &mut self,
        _desc: &'static Descriptor,
        info: &'static ChoiceInfo,
        choice: &ChoiceValue,
    ) -> Result<()> {
        let index = match choice.index {
            i if i >= 0 => i as usize,
            ChoiceValue::UNKNOWN => return Err(Error::UnknownSelection),
            _ => return Err(Error::UnselectedChoice),
        };
        let child = choice.child.as_deref().ok_or(Error::UnselectedChoice)?;
        let is_extension = index >= info.num_root;

        if info.extendable {
            self.output.push_bit(is_extension);
        } else if is_extension {
            return Err(Error::UnknownSelection);
        }

        if is_extension {
            self.encode_small_unsigned((index - info.num_root) as u64)?;
            self.encode_wrapped(child)
        } else {
            if info.num_root >= 2 {
                self.encode_offset(index as u64, info.num_root as u64)?;
            }
            child.encode(self)
        }
    }

    fn visit_sequence_of(&mut self, desc: &'static Descriptor, elements: &[Value]) -> Result<()> {
        self.encode_constrained_length(desc.constraint(), elements.len())?;
        for element in elements {
            element.encode(self)?;
        }
        Ok(())
    }

    fn visit_open(&mut self, _desc: &'static Descriptor, open: &OpenValue) -> Result<()> {
        if let Some(buffer) = &open.buffer {
            self.encode_length(buffer.len(), 0, None)?;
            self.output.byte_align();
            self.output.append_bytes(buffer);
            Ok(())
        } else if let Some(value) = &open.value {
            self.encode_wrapped(value)
        } else {
            Err(Error::EmptyOpenType)
        }
    }

    fn pre_encode_extension_roots(
        &mut self,
        _desc: &'static Descriptor,
        info: &'static SequenceInfo,
        seq: &SequenceValue,
    ) -> Result<()> {
        if info.extendable {
            self.output.push_bit(seq.extension_map.any());
        }
        for opt in 0..info.num_optional {
            self.output.push_bit(seq.option_map[opt]);
        }
        Ok(())
    }

    fn encode_extension_root(
        &mut self,
        _info: &'static SequenceInfo,
        seq: &SequenceValue,
        pos: usize,
    ) -> Result<()> {
        match seq.field(pos) {
            Some(field) => field.encode(self),
            None => Err(Error::MissingField { pos }),
        }
    }

    fn pre_encode_extensions(
        &mut self,
        _info: &'static SequenceInfo,
        seq: &SequenceValue,
    ) -> Result<()> {
        self.encode_small_unsigned(seq.extension_map.len() as u64 - 1)?;
        for bit in seq.extension_map.iter().by_vals() {
            self.output.push_bit(bit);
        }
        Ok(())
    }

    fn encode_known_extension(
        &mut self,
        _info: &'static SequenceInfo,
        seq: &SequenceValue,
        pos: usize,
    ) -> Result<()> {
        match seq.field(pos) {
            Some(field) => self.encode_wrapped(field),
            None => Err(Error::MissingField { pos }),
        }
    }
}
