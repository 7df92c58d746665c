//! BER decoder.
//!
//! SEQUENCE decoding peeks each field's tag and either recurses, skips
//! an absent optional, or fails on a mandatory mismatch; the stored
//! end-of-SEQUENCE position bounds the walk and swallows unknown
//! trailing extensions. A small `dont_check_tag` counter suppresses one
//! tag comparison when a CHOICE or retagged field introduces a context
//! tag the payload cannot know about.

use alloc::string::String;
use alloc::vec::Vec;

use bytes::Bytes;
use snafu::Snafu;

use crate::env::CoderEnv;
use crate::tag::Tag;
use crate::types::descriptor::{ChoiceInfo, Descriptor, Kind, SequenceInfo, TagMode};
use crate::types::time::GeneralizedTime;
use crate::types::value::{BitString, ChoiceValue, OpenValue, SequenceValue, Value};
use crate::types::{oid, Repr};
use crate::visit::{SeqStep, Visitor};

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Snafu, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[snafu(display("input exhausted before the element completed"))]
    Truncated,
    #[snafu(display("tag mismatch: expected {expected:?}, found {found:?}"))]
    TagMismatch { expected: Tag, found: Tag },
    #[snafu(display("malformed identifier or length octets"))]
    MalformedHeader,
    #[snafu(display("indefinite length is not supported"))]
    IndefiniteLength,
    #[snafu(display("encoded length exceeds the available input"))]
    LengthViolation,
    #[snafu(display("no CHOICE alternative matches the incoming tag"))]
    UnknownChoice,
    #[snafu(display("malformed OBJECT IDENTIFIER contents"))]
    InvalidObjectIdentifier,
    #[snafu(display("malformed GeneralizedTime contents"))]
    InvalidTime,
}

#[derive(Debug, Clone, Copy)]
struct Header {
    tag: Tag,
    #[allow(dead_code)]
    primitive: bool,
    len: usize,
}

pub struct BerDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    end_positions: Vec<usize>,
    dont_check_tag: u32,
    env: Option<&'a CoderEnv>,
}

impl<'a> BerDecoder<'a> {
    pub fn new(data: &'a [u8], env: Option<&'a CoderEnv>) -> Self {
        Self {
            data,
            pos: 0,
            end_positions: Vec::new(),
            dont_check_tag: 0,
            env,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn read_byte(&mut self) -> Result<u8> {
        let byte = *self.data.get(self.pos).ok_or(Error::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_block(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(Error::LengthViolation)?;
        if end > self.data.len() {
            return Err(Error::Truncated);
        }
        let block = &self.data[self.pos..end];
        self.pos = end;
        Ok(block)
    }

    fn decode_header(&mut self) -> Result<Header> {
        let ident = self.read_byte()?;
        let class = u32::from(ident & 0xC0);
        let primitive = ident & 0x20 == 0;
        let mut number = u32::from(ident & 31);
        if number == 31 {
            number = 0;
            loop {
                let byte = self.read_byte()?;
                if number > u32::MAX >> 7 {
                    return Err(Error::MalformedHeader);
                }
                number = number << 7 | u32::from(byte & 0x7F);
                if byte & 0x80 == 0 {
                    break;
                }
            }
        }

        let first = self.read_byte()?;
        let len = if first & 0x80 == 0 {
            usize::from(first)
        } else {
            let count = usize::from(first & 0x7F);
            if count == 0 {
                return Err(Error::IndefiniteLength);
            }
            if count > core::mem::size_of::<usize>() {
                return Err(Error::MalformedHeader);
            }
            let mut len = 0usize;
            for _ in 0..count {
                len = len << 8 | usize::from(self.read_byte()?);
            }
            len
        };

        if len > self.data.len() - self.pos {
            return Err(Error::LengthViolation);
        }
        Ok(Header {
            tag: Tag::new(class, number),
            primitive,
            len,
        })
    }

    /// Header whose tag must match `expected`, unless the expected tag
    /// is `NONE` or a pending `dont_check_tag` credit absorbs the
    /// mismatch. Rolls back on failure.
    fn expect_header(&mut self, expected: Tag) -> Result<usize> {
        let saved = self.pos;
        let header = self.decode_header()?;
        if expected.is_none() || header.tag == expected {
            return Ok(header.len);
        }
        if self.dont_check_tag > 0 {
            self.dont_check_tag -= 1;
            return Ok(header.len);
        }
        self.pos = saved;
        Err(Error::TagMismatch {
            expected,
            found: header.tag,
        })
    }

    /// Resolve a wire tag to a CHOICE alternative, following the
    /// zero-tag sentinel into untagged embedded CHOICE types.
    fn set_choice_id(
        &mut self,
        info: &'static ChoiceInfo,
        choice: &mut ChoiceValue,
        tag: Tag,
    ) -> bool {
        if info.tag_table.is_empty() {
            // Automatic tags: the context tag number is the index.
            return choice.select(info, tag.number() as usize);
        }
        if let Ok(entry) = info.tag_table.binary_search_by_key(&tag.0, |e| e.0) {
            return choice.select(info, info.tag_table[entry].1);
        }
        if info.tag_table[0].0 == 0 && choice.select(info, info.tag_table[0].1) {
            if let Some(child) = choice.child.as_deref_mut() {
                if let Kind::Choice(nested) = child.desc().kind {
                    if let Repr::Choice(nested_choice) = child.repr_mut() {
                        if self.set_choice_id(nested, nested_choice, tag) {
                            return true;
                        }
                    }
                }
            }
        }
        choice.set_unknown();
        false
    }

    fn seq_end(&self) -> usize {
        self.end_positions.last().copied().unwrap_or(self.data.len())
    }

    fn decode_field(
        &mut self,
        info: &'static SequenceInfo,
        seq: &mut SequenceValue,
        pos: usize,
    ) -> Result<SeqStep> {
        let optional = info.optional_id(pos);
        if self.pos >= self.seq_end() || self.at_end() {
            return match optional {
                None => Err(Error::Truncated),
                Some(_) => Ok(SeqStep::Continue),
            };
        }

        let saved = self.pos;
        let header = self.decode_header()?;
        self.pos = saved;

        let field_tag = info.field_tag(pos);
        if !field_tag.is_none() && header.tag != field_tag {
            return match optional {
                None => Err(Error::TagMismatch {
                    expected: field_tag,
                    found: header.tag,
                }),
                Some(_) => Ok(SeqStep::Continue),
            };
        }

        if let Some(opt) = optional {
            seq.include_optional(info, opt, pos);
        }

        let explicit = info.tag_mode == TagMode::Explicit && !info.fields[pos].tag.is_none();
        if explicit {
            // Consume the wrapper; the field owns the inner TLV.
            self.decode_header()?;
        } else {
            let retagged = match info.tag_mode {
                TagMode::Automatic => true,
                TagMode::Implicit => !info.fields[pos].tag.is_none(),
                TagMode::Explicit => false,
            };
            if retagged {
                self.dont_check_tag = 1;
            }
        }

        match seq.field_mut(pos) {
            Some(field) => field.decode(self)?,
            None => return Err(Error::Truncated),
        }
        Ok(SeqStep::Continue)
    }
}

impl<'a> Visitor for BerDecoder<'a> {
    type Error = Error;

    fn visit_null(&mut self, desc: &'static Descriptor) -> Result<()> {
        let len = self.expect_header(desc.tag)?;
        self.pos += len;
        Ok(())
    }

    fn visit_boolean(&mut self, desc: &'static Descriptor, value: &mut bool) -> Result<()> {
        let len = self.expect_header(desc.tag)?;
        for _ in 0..len {
            *value = self.read_byte()? != 0;
        }
        Ok(())
    }

    fn visit_integer(&mut self, desc: &'static Descriptor, value: &mut i64) -> Result<()> {
        let len = self.expect_header(desc.tag)?;
        if len == 0 || len > 8 {
            return Err(Error::LengthViolation);
        }
        let mut accumulator = i64::from(self.read_byte()? as i8);
        for _ in 1..len {
            accumulator = accumulator << 8 | i64::from(self.read_byte()?);
        }
        *value = accumulator;
        Ok(())
    }

    fn visit_enumerated(&mut self, desc: &'static Descriptor, value: &mut i64) -> Result<()> {
        let len = self.expect_header(desc.tag)?;
        if len == 0 || len > 8 {
            return Err(Error::LengthViolation);
        }
        let mut accumulator: i64 = 0;
        for _ in 0..len {
            accumulator = accumulator << 8 | i64::from(self.read_byte()?);
        }
        *value = accumulator;
        Ok(())
    }

    fn visit_object_id(&mut self, desc: &'static Descriptor, arcs: &mut Vec<u32>) -> Result<()> {
        let len = self.expect_header(desc.tag)?;
        let body = self.read_block(len)?;
        *arcs = oid::decode_body(body).ok_or(Error::InvalidObjectIdentifier)?;
        Ok(())
    }

    fn visit_bit_string(&mut self, desc: &'static Descriptor, bits: &mut BitString) -> Result<()> {
        let len = self.expect_header(desc.tag)?;
        if len == 0 {
            return Err(Error::LengthViolation);
        }
        let unused = usize::from(self.read_byte()?);
        if unused > 7 || (len == 1 && unused != 0) {
            return Err(Error::LengthViolation);
        }
        let body = self.read_block(len - 1)?;
        *bits = BitString::from_slice(body);
        bits.truncate(body.len() * 8 - unused);
        Ok(())
    }

    fn visit_octet_string(&mut self, desc: &'static Descriptor, octets: &mut Vec<u8>) -> Result<()> {
        let len = self.expect_header(desc.tag)?;
        *octets = self.read_block(len)?.to_vec();
        Ok(())
    }

    fn visit_char_string(&mut self, desc: &'static Descriptor, text: &mut String) -> Result<()> {
        let len = self.expect_header(desc.tag)?;
        let body = self.read_block(len)?;
        *text = body.iter().map(|&b| b as char).collect();
        Ok(())
    }

    fn visit_bmp_string(&mut self, desc: &'static Descriptor, units: &mut Vec<u16>) -> Result<()> {
        let len = self.expect_header(desc.tag)?;
        if len % 2 != 0 {
            return Err(Error::LengthViolation);
        }
        let body = self.read_block(len)?;
        *units = body
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        Ok(())
    }

    fn visit_time(&mut self, desc: &'static Descriptor, time: &mut GeneralizedTime) -> Result<()> {
        let len = self.expect_header(desc.tag)?;
        let body = self.read_block(len)?;
        let text = core::str::from_utf8(body).map_err(|_| Error::InvalidTime)?;
        *time = GeneralizedTime::parse(text).ok_or(Error::InvalidTime)?;
        Ok(())
    }

    fn visit_choice(
        &mut self,
        desc: &'static Descriptor,
        info: &'static ChoiceInfo,
        choice: &mut ChoiceValue,
    ) -> Result<()> {
        let saved = self.pos;
        let mut header = self.decode_header()?;
        let mut inner_start = saved;
        if self.dont_check_tag > 0 || !desc.tag.is_none() {
            // Tagged context: the first header was the wrapper.
            inner_start = self.pos;
            header = self.decode_header()?;
        }
        let next_pos = self.pos + header.len;
        self.pos = inner_start;

        if self.set_choice_id(info, choice, header.tag) {
            if !info.selection_tag(choice.index as usize).is_none() {
                self.dont_check_tag = 1;
            }
            if let Some(child) = choice.child.as_deref_mut() {
                child.decode(self)?;
            }
            self.pos = next_pos;
            Ok(())
        } else if info.extendable {
            choice.set_unknown();
            self.pos = next_pos;
            Ok(())
        } else {
            Err(Error::UnknownChoice)
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
        let len = self.expect_header(desc.tag)?;
        let end = self.pos + len;

        elements.clear();
        while self.pos < end {
            let mut element = element_desc.new_value();
            element.decode(self)?;
            elements.push(element);
        }
        self.pos = end;
        Ok(())
    }

    fn visit_open(&mut self, desc: &'static Descriptor, open: &mut OpenValue) -> Result<()> {
        let saved = self.pos;
        let header = self.decode_header()?;
        // A tagged or retagged context means the header just read was a
        // wrapper around the open contents.
        let wrapped = self.dont_check_tag > 0 || !desc.tag.is_none();
        if self.dont_check_tag > 0 {
            self.dont_check_tag -= 1;
        }

        if let (Kind::Open { inner: Some(_) }, Some(value)) = (&desc.kind, open.value.as_deref_mut())
        {
            // The content type is known: decode in place.
            if !wrapped {
                self.pos = saved;
            }
            return value.decode(self);
        }

        let buffer = if wrapped {
            self.read_block(header.len)?
        } else {
            // Keep the complete TLV so a later revisit can decode it.
            let end = self.pos + header.len;
            let block = &self.data[saved..end];
            self.pos = end;
            block
        };
        open.buffer = Some(Bytes::copy_from_slice(buffer));
        Ok(())
    }

    fn redecode_open(&mut self, _desc: &'static Descriptor, open: &mut OpenValue) -> Result<()> {
        let buffer = match (&open.buffer, open.value.is_some()) {
            (Some(buffer), true) => buffer.clone(),
            _ => return Err(Error::Truncated),
        };
        let mut decoder = BerDecoder::new(&buffer, self.env);
        match open.value.as_deref_mut() {
            Some(value) => value.decode(&mut decoder),
            None => Ok(()),
        }
    }

    fn pre_decode_extension_roots(
        &mut self,
        desc: &'static Descriptor,
        _info: &'static SequenceInfo,
        _seq: &mut SequenceValue,
    ) -> Result<SeqStep> {
        let len = self.expect_header(desc.tag)?;
        self.end_positions.push(self.pos + len);
        Ok(SeqStep::Continue)
    }

    fn decode_extension_root(
        &mut self,
        info: &'static SequenceInfo,
        seq: &mut SequenceValue,
        pos: usize,
    ) -> Result<SeqStep> {
        self.decode_field(info, seq, pos).map_err(|error| {
            self.end_positions.pop();
            error
        })
    }

    fn decode_known_extension(
        &mut self,
        info: &'static SequenceInfo,
        seq: &mut SequenceValue,
        pos: usize,
    ) -> Result<SeqStep> {
        self.decode_extension_root(info, seq, pos)
    }

    fn decode_unknown_extensions(
        &mut self,
        _info: &'static SequenceInfo,
        _seq: &mut SequenceValue,
    ) -> Result<()> {
        // Unknown trailing extensions are skipped wholesale.
        if let Some(end) = self.end_positions.pop() {
            self.pos = end;
        }
        Ok(())
    }
}
