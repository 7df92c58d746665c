//! BER encoder.
//!
//! Constructed types are encoded into a nested buffer so the definite
//! length is known before the header is written; the indefinite form is
//! never emitted. A pending implicit-tag override replaces the payload's
//! own tag for automatically or implicitly tagged fields, while tagged
//! CHOICE values and explicitly tagged fields wrap the inner encoding in
//! an outer constructed header.

use alloc::vec::Vec;

use snafu::Snafu;

use crate::tag::Tag;
use crate::types::descriptor::{Descriptor, SequenceInfo, TagMode};
use crate::types::time::GeneralizedTime;
use crate::types::value::{BitString, ChoiceValue, OpenValue, SequenceValue, Value};
use crate::types::{oid, ChoiceInfo};
use crate::visit::ConstVisitor;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Snafu, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[snafu(display("CHOICE value has no selected alternative"))]
    UnselectedChoice,
    #[snafu(display("CHOICE value holds an unknown extension selection"))]
    UnknownSelection,
    #[snafu(display("open type holds neither a value nor a buffer"))]
    EmptyOpenType,
    #[snafu(display("SEQUENCE field {pos} is marked present but holds no value"))]
    MissingField { pos: usize },
}

pub struct BerEncoder {
    output: Vec<u8>,
    /// Parent buffer and pending header tag of each open constructed.
    nested: Vec<(Vec<u8>, Tag)>,
    tag_override: Option<Tag>,
}

impl Default for BerEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BerEncoder {
    pub fn new() -> Self {
        Self {
            output: Vec::with_capacity(256),
            nested: Vec::new(),
            tag_override: None,
        }
    }

    pub fn output(self) -> Vec<u8> {
        debug_assert!(self.nested.is_empty());
        self.output
    }

    fn take_tag(&mut self, desc: &Descriptor) -> Tag {
        self.tag_override.take().unwrap_or(desc.tag)
    }

    fn begin_constructed(&mut self, tag: Tag) {
        let parent = core::mem::take(&mut self.output);
        self.nested.push((parent, tag));
    }

    fn end_constructed(&mut self) {
        let (parent, tag) = match self.nested.pop() {
            Some(entry) => entry,
            None => return,
        };
        let contents = core::mem::replace(&mut self.output, parent);
        self.header(tag, true, contents.len());
        self.output.extend_from_slice(&contents);
    }

    fn header(&mut self, tag: Tag, constructed: bool, len: usize) {
        let mut ident = (tag.class() as u8) | if constructed { 0x20 } else { 0 };
        let number = tag.number();
        if number < 31 {
            self.output.push(ident | number as u8);
        } else {
            ident |= 31;
            self.output.push(ident);
            let mut shift = (31 - number.leading_zeros()) / 7 * 7;
            while shift > 0 {
                self.output.push((number >> shift & 0x7F) as u8 | 0x80);
                shift -= 7;
            }
            self.output.push((number & 0x7F) as u8);
        }

        if len < 128 {
            self.output.push(len as u8);
        } else {
            let bytes = len.to_be_bytes();
            let skip = bytes.iter().take_while(|&&b| b == 0).count();
            self.output.push(0x80 | (bytes.len() - skip) as u8);
            self.output.extend_from_slice(&bytes[skip..]);
        }
    }

    fn primitive(&mut self, tag: Tag, contents: &[u8]) {
        self.header(tag, false, contents.len());
        self.output.extend_from_slice(contents);
    }

    /// Minimum-length two's-complement content octets.
    fn signed_bytes(value: i64) -> (usize, [u8; 8]) {
        let bytes = value.to_be_bytes();
        let mut start = 0;
        while start < 7 {
            let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
                || (bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0);
            if !redundant {
                break;
            }
            start += 1;
        }
        (start, bytes)
    }

    fn field_override(info: &SequenceInfo, pos: usize) -> Option<Tag> {
        match info.tag_mode {
            TagMode::Automatic => Some(Tag::context(pos as u32)),
            // Explicit fields are wrapped instead of retagged.
            TagMode::Explicit => None,
            TagMode::Implicit => {
                let tag = info.fields[pos].tag;
                (!tag.is_none()).then_some(tag)
            }
        }
    }

    fn encode_field(
        &mut self,
        info: &'static SequenceInfo,
        seq: &SequenceValue,
        pos: usize,
    ) -> Result<()> {
        let field = seq.field(pos).ok_or(Error::MissingField { pos })?;
        if info.tag_mode == TagMode::Explicit && !info.fields[pos].tag.is_none() {
            self.begin_constructed(info.fields[pos].tag);
            field.encode(self)?;
            self.end_constructed();
        } else {
            self.tag_override = Self::field_override(info, pos);
            field.encode(self)?;
        }
        Ok(())
    }
}

impl ConstVisitor for BerEncoder {
    type Error = Error;

    fn visit_null(&mut self, desc: &'static Descriptor) -> Result<()> {
        let tag = self.take_tag(desc);
        self.primitive(tag, &[]);
        Ok(())
    }

    fn visit_boolean(&mut self, desc: &'static Descriptor, value: bool) -> Result<()> {
        let tag = self.take_tag(desc);
        self.primitive(tag, &[if value { 0xFF } else { 0x00 }]);
        Ok(())
    }

    fn visit_integer(&mut self, desc: &'static Descriptor, value: i64) -> Result<()> {
        let tag = self.take_tag(desc);
        let (start, bytes) = Self::signed_bytes(value);
        self.primitive(tag, &bytes[start..]);
        Ok(())
    }

    fn visit_enumerated(&mut self, desc: &'static Descriptor, value: i64) -> Result<()> {
        self.visit_integer(desc, value)
    }

    fn visit_object_id(&mut self, desc: &'static Descriptor, arcs: &[u32]) -> Result<()> {
        let tag = self.take_tag(desc);
        let mut body = Vec::with_capacity(arcs.len() * 2);
        oid::encode_body(arcs, &mut body);
        self.primitive(tag, &body);
        Ok(())
    }

    fn visit_bit_string(&mut self, desc: &'static Descriptor, bits: &BitString) -> Result<()> {
        let tag = self.take_tag(desc);
        let unused = (8 - bits.len() % 8) % 8;
        let mut padded = bits.clone();
        padded.resize(bits.len() + unused, false);
        let mut contents = Vec::with_capacity(1 + padded.len() / 8);
        contents.push(unused as u8);
        contents.extend_from_slice(&padded.into_vec());
        self.primitive(tag, &contents);
        Ok(())
    }

    fn visit_octet_string(&mut self, desc: &'static Descriptor, octets: &[u8]) -> Result<()> {
        let tag = self.take_tag(desc);
        self.primitive(tag, octets);
        Ok(())
    }

    fn visit_char_string(&mut self, desc: &'static Descriptor, text: &str) -> Result<()> {
        let tag = self.take_tag(desc);
        let contents: Vec<u8> = text.chars().map(|c| c as u32 as u8).collect();
        self.primitive(tag, &contents);
        Ok(())
    }

    fn visit_bmp_string(&mut self, desc: &'static Descriptor, units: &[u16]) -> Result<()> {
        let tag = self.take_tag(desc);
        let mut contents = Vec::with_capacity(units.len() * 2);
        for unit in units {
            contents.extend_from_slice(&unit.to_be_bytes());
        }
        self.primitive(tag, &contents);
        Ok(())
    }

    fn visit_time(&mut self, desc: &'static Descriptor, time: &GeneralizedTime) -> Result<()> {
        let tag = self.take_tag(desc);
        self.primitive(tag, time.format().as_bytes());
        Ok(())
    }

    fn visit_choice(
        &mut self,
        desc: &'static Descriptor,
        info: &'static ChoiceInfo,
        choice: &ChoiceValue,
    ) -> Result<()> {
        let index = match choice.index {
            i if i >= 0 => i as usize,
            ChoiceValue::UNKNOWN => return Err(Error::UnknownSelection),
            _ => return Err(Error::UnselectedChoice),
        };
        let child = choice.child.as_deref().ok_or(Error::UnselectedChoice)?;

        let outer = self
            .tag_override
            .take()
            .or_else(|| (!desc.tag.is_none()).then_some(desc.tag));
        let selection = info.selection_tag(index);

        if let Some(outer) = outer {
            self.begin_constructed(outer);
            self.tag_override = (!selection.is_none()).then_some(selection);
            child.encode(self)?;
            self.end_constructed();
        } else {
            self.tag_override = (!selection.is_none()).then_some(selection);
            child.encode(self)?;
        }
        Ok(())
    }

    fn visit_sequence_of(&mut self, desc: &'static Descriptor, elements: &[Value]) -> Result<()> {
        let tag = self.take_tag(desc);
        self.begin_constructed(tag);
        for element in elements {
            element.encode(self)?;
        }
        self.end_constructed();
        Ok(())
    }

    fn visit_open(&mut self, desc: &'static Descriptor, open: &OpenValue) -> Result<()> {
        let outer = self
            .tag_override
            .take()
            .or_else(|| (!desc.tag.is_none()).then_some(desc.tag));
        if let Some(buffer) = &open.buffer {
            match outer {
                Some(tag) => {
                    self.header(tag, true, buffer.len());
                    self.output.extend_from_slice(buffer);
                }
                None => self.output.extend_from_slice(buffer),
            }
            Ok(())
        } else if let Some(value) = &open.value {
            match outer {
                Some(tag) => {
                    self.begin_constructed(tag);
                    value.encode(self)?;
                    self.end_constructed();
                }
                None => value.encode(self)?,
            }
            Ok(())
        } else {
            Err(Error::EmptyOpenType)
        }
    }

    fn pre_encode_extension_roots(
        &mut self,
        desc: &'static Descriptor,
        _info: &'static SequenceInfo,
        _seq: &SequenceValue,
    ) -> Result<()> {
        let tag = self.take_tag(desc);
        self.begin_constructed(tag);
        Ok(())
    }

    fn encode_extension_root(
        &mut self,
        info: &'static SequenceInfo,
        seq: &SequenceValue,
        pos: usize,
    ) -> Result<()> {
        self.encode_field(info, seq, pos)
    }

    // BER does not mark the extension boundary; extensions are plain
    // trailing fields.
    fn encode_known_extension(
        &mut self,
        info: &'static SequenceInfo,
        seq: &SequenceValue,
        pos: usize,
    ) -> Result<()> {
        self.encode_field(info, seq, pos)
    }

    fn after_encode_sequence(
        &mut self,
        _info: &'static SequenceInfo,
        _seq: &SequenceValue,
    ) -> Result<()> {
        self.end_constructed();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::descriptor;
    use alloc::vec;
    use pretty_assertions::assert_eq;

    fn encode(value: &Value) -> Vec<u8> {
        let mut encoder = BerEncoder::new();
        value.encode(&mut encoder).unwrap();
        encoder.output()
    }

    #[test]
    fn integer_5020() {
        let mut value = descriptor::INTEGER.new_value();
        value.set_integer(0x139C);
        assert_eq!(vec![0x02, 0x02, 0x13, 0x9C], encode(&value));
    }

    #[test]
    fn integer_minimal_lengths() {
        let mut value = descriptor::INTEGER.new_value();
        for (n, bytes) in [
            (0i64, vec![0x02, 0x01, 0x00]),
            (127, vec![0x02, 0x01, 0x7F]),
            (128, vec![0x02, 0x02, 0x00, 0x80]),
            (-1, vec![0x02, 0x01, 0xFF]),
            (-129, vec![0x02, 0x02, 0xFF, 0x7F]),
        ] {
            value.set_integer(n);
            assert_eq!(bytes, encode(&value), "value {n}");
        }
    }

    #[test]
    fn booleans() {
        let mut value = descriptor::BOOLEAN.new_value();
        value.set_boolean(true);
        assert_eq!(vec![0x01, 0x01, 0xFF], encode(&value));
        value.set_boolean(false);
        assert_eq!(vec![0x01, 0x01, 0x00], encode(&value));
    }

    #[test]
    fn object_identifier() {
        let mut value = descriptor::OBJECT_IDENTIFIER.new_value();
        *value.arcs_mut() = vec![0, 0, 16, 1];
        assert_eq!(vec![0x06, 0x03, 0x00, 0x10, 0x01], encode(&value));
    }

    #[test]
    fn null_and_empty_strings() {
        assert_eq!(vec![0x05, 0x00], encode(&descriptor::NULL.new_value()));
        assert_eq!(
            vec![0x04, 0x00],
            encode(&descriptor::OCTET_STRING.new_value())
        );
    }

    #[test]
    fn bit_string_trailing_bit_count() {
        let mut value = descriptor::BIT_STRING.new_value();
        value.bits_mut().extend([true, false, true, true]);
        assert_eq!(vec![0x03, 0x02, 0x04, 0xB0], encode(&value));
    }

    #[test]
    fn bmp_string_code_units() {
        let mut value = descriptor::BMP_STRING.new_value();
        value.set_bmp_from_str("hi");
        assert_eq!(vec![0x1E, 0x04, 0x00, b'h', 0x00, b'i'], encode(&value));
    }

    #[test]
    fn long_form_length() {
        let mut value = descriptor::OCTET_STRING.new_value();
        *value.octets_mut() = vec![0xAA; 200];
        let bytes = encode(&value);
        assert_eq!(&[0x04, 0x81, 200], &bytes[..3]);
        assert_eq!(203, bytes.len());
    }
}
