//! The two dispatch surfaces every codec implements.
//!
//! [`ConstVisitor`] observes a value tree (encoders, validity walks);
//! [`Visitor`] mutates one in place (decoders). Each has one handler per
//! leaf variant plus the open type; the SEQUENCE traversal protocol is a
//! provided method that drives the `pre_*`/`*_extension_root`/
//! `*_known_extension` hooks in declaration order.
//!
//! Hooks signal failure through `Err`; the decode-side hooks additionally
//! steer traversal with [`SeqStep`].

use crate::types::descriptor::{ChoiceInfo, Descriptor, SequenceInfo};
use crate::types::time::GeneralizedTime;
use crate::types::value::{BitString, ChoiceValue, OpenValue, Repr, SequenceValue, Value};

/// How a successful decode hook steers the rest of the SEQUENCE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqStep {
    /// End the sequence now, successfully.
    Stop,
    /// Visit the remaining extension-root fields only.
    NoExtension,
    /// Keep going.
    Continue,
}

/// Observing dispatch: encoders, formatters, validity checks.
pub trait ConstVisitor: Sized {
    type Error;

    fn visit_null(&mut self, desc: &'static Descriptor) -> Result<(), Self::Error>;
    fn visit_boolean(&mut self, desc: &'static Descriptor, value: bool)
        -> Result<(), Self::Error>;
    fn visit_integer(&mut self, desc: &'static Descriptor, value: i64)
        -> Result<(), Self::Error>;
    fn visit_enumerated(
        &mut self,
        desc: &'static Descriptor,
        value: i64,
    ) -> Result<(), Self::Error>;
    fn visit_object_id(
        &mut self,
        desc: &'static Descriptor,
        arcs: &[u32],
    ) -> Result<(), Self::Error>;
    fn visit_bit_string(
        &mut self,
        desc: &'static Descriptor,
        bits: &BitString,
    ) -> Result<(), Self::Error>;
    fn visit_octet_string(
        &mut self,
        desc: &'static Descriptor,
        octets: &[u8],
    ) -> Result<(), Self::Error>;
    fn visit_char_string(
        &mut self,
        desc: &'static Descriptor,
        text: &str,
    ) -> Result<(), Self::Error>;
    fn visit_bmp_string(
        &mut self,
        desc: &'static Descriptor,
        units: &[u16],
    ) -> Result<(), Self::Error>;
    fn visit_time(
        &mut self,
        desc: &'static Descriptor,
        time: &GeneralizedTime,
    ) -> Result<(), Self::Error>;
    fn visit_choice(
        &mut self,
        desc: &'static Descriptor,
        info: &'static ChoiceInfo,
        choice: &ChoiceValue,
    ) -> Result<(), Self::Error>;
    fn visit_sequence_of(
        &mut self,
        desc: &'static Descriptor,
        elements: &[Value],
    ) -> Result<(), Self::Error>;
    fn visit_open(
        &mut self,
        desc: &'static Descriptor,
        open: &OpenValue,
    ) -> Result<(), Self::Error>;

    /// The shared SEQUENCE traversal: roots in declared order (present
    /// fields only), then — when any extension is present — the known
    /// extensions.
    fn visit_sequence(
        &mut self,
        desc: &'static Descriptor,
        info: &'static SequenceInfo,
        seq: &SequenceValue,
    ) -> Result<(), Self::Error> {
        self.pre_encode_extension_roots(desc, info, seq)?;
        for pos in 0..info.num_root {
            if seq.field_present(info, pos) {
                self.encode_extension_root(info, seq, pos)?;
            }
        }
        if seq.extension_map.any() {
            self.pre_encode_extensions(info, seq)?;
            for k in 0..info.known_extensions() {
                if k < seq.extension_map.len() && seq.extension_map[k] {
                    self.encode_known_extension(info, seq, info.num_root + k)?;
                }
            }
        }
        self.after_encode_sequence(info, seq)
    }

    fn pre_encode_extension_roots(
        &mut self,
        _desc: &'static Descriptor,
        _info: &'static SequenceInfo,
        _seq: &SequenceValue,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    fn encode_extension_root(
        &mut self,
        info: &'static SequenceInfo,
        seq: &SequenceValue,
        pos: usize,
    ) -> Result<(), Self::Error>;

    fn pre_encode_extensions(
        &mut self,
        _info: &'static SequenceInfo,
        _seq: &SequenceValue,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    fn encode_known_extension(
        &mut self,
        info: &'static SequenceInfo,
        seq: &SequenceValue,
        pos: usize,
    ) -> Result<(), Self::Error>;

    fn after_encode_sequence(
        &mut self,
        _info: &'static SequenceInfo,
        _seq: &SequenceValue,
    ) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Mutating dispatch: decoders.
pub trait Visitor: Sized {
    type Error;

    fn visit_null(&mut self, desc: &'static Descriptor) -> Result<(), Self::Error>;
    fn visit_boolean(
        &mut self,
        desc: &'static Descriptor,
        value: &mut bool,
    ) -> Result<(), Self::Error>;
    fn visit_integer(
        &mut self,
        desc: &'static Descriptor,
        value: &mut i64,
    ) -> Result<(), Self::Error>;
    fn visit_enumerated(
        &mut self,
        desc: &'static Descriptor,
        value: &mut i64,
    ) -> Result<(), Self::Error>;
    fn visit_object_id(
        &mut self,
        desc: &'static Descriptor,
        arcs: &mut alloc::vec::Vec<u32>,
    ) -> Result<(), Self::Error>;
    fn visit_bit_string(
        &mut self,
        desc: &'static Descriptor,
        bits: &mut BitString,
    ) -> Result<(), Self::Error>;
    fn visit_octet_string(
        &mut self,
        desc: &'static Descriptor,
        octets: &mut alloc::vec::Vec<u8>,
    ) -> Result<(), Self::Error>;
    fn visit_char_string(
        &mut self,
        desc: &'static Descriptor,
        text: &mut alloc::string::String,
    ) -> Result<(), Self::Error>;
    fn visit_bmp_string(
        &mut self,
        desc: &'static Descriptor,
        units: &mut alloc::vec::Vec<u16>,
    ) -> Result<(), Self::Error>;
    fn visit_time(
        &mut self,
        desc: &'static Descriptor,
        time: &mut GeneralizedTime,
    ) -> Result<(), Self::Error>;
    fn visit_choice(
        &mut self,
        desc: &'static Descriptor,
        info: &'static ChoiceInfo,
        choice: &mut ChoiceValue,
    ) -> Result<(), Self::Error>;
    fn visit_sequence_of(
        &mut self,
        desc: &'static Descriptor,
        elements: &mut alloc::vec::Vec<Value>,
    ) -> Result<(), Self::Error>;
    fn visit_open(
        &mut self,
        desc: &'static Descriptor,
        open: &mut OpenValue,
    ) -> Result<(), Self::Error>;

    /// Decode a deferred open type's stored buffer into its value.
    fn redecode_open(
        &mut self,
        desc: &'static Descriptor,
        open: &mut OpenValue,
    ) -> Result<(), Self::Error>;

    /// The shared SEQUENCE decode protocol: extension roots, then — when
    /// the preamble announced extensions — known extensions and the
    /// unknown-extension tail.
    fn visit_sequence(
        &mut self,
        desc: &'static Descriptor,
        info: &'static SequenceInfo,
        seq: &mut SequenceValue,
    ) -> Result<(), Self::Error> {
        let step = self.pre_decode_extension_roots(desc, info, seq)?;
        if step == SeqStep::Stop {
            return Ok(());
        }
        let visit_extensions = step == SeqStep::Continue;

        for pos in 0..info.num_root {
            if self.decode_extension_root(info, seq, pos)? == SeqStep::Stop {
                return Ok(());
            }
        }

        if !visit_extensions {
            return Ok(());
        }
        if self.pre_decode_extensions(info, seq)? != SeqStep::Continue {
            return Ok(());
        }
        for pos in info.num_root..info.fields.len() {
            if self.decode_known_extension(info, seq, pos)? != SeqStep::Continue {
                return Ok(());
            }
        }
        self.decode_unknown_extensions(info, seq)
    }

    fn pre_decode_extension_roots(
        &mut self,
        _desc: &'static Descriptor,
        _info: &'static SequenceInfo,
        _seq: &mut SequenceValue,
    ) -> Result<SeqStep, Self::Error> {
        Ok(SeqStep::Continue)
    }

    fn decode_extension_root(
        &mut self,
        info: &'static SequenceInfo,
        seq: &mut SequenceValue,
        pos: usize,
    ) -> Result<SeqStep, Self::Error>;

    fn pre_decode_extensions(
        &mut self,
        _info: &'static SequenceInfo,
        _seq: &mut SequenceValue,
    ) -> Result<SeqStep, Self::Error> {
        Ok(SeqStep::Continue)
    }

    fn decode_known_extension(
        &mut self,
        info: &'static SequenceInfo,
        seq: &mut SequenceValue,
        pos: usize,
    ) -> Result<SeqStep, Self::Error>;

    fn decode_unknown_extensions(
        &mut self,
        _info: &'static SequenceInfo,
        _seq: &mut SequenceValue,
    ) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Value {
    /// Dispatch an observing visitor over this value.
    pub fn encode<V: ConstVisitor>(&self, visitor: &mut V) -> Result<(), V::Error> {
        let desc = self.desc();
        match self.repr() {
            Repr::Null => visitor.visit_null(desc),
            Repr::Boolean(value) => visitor.visit_boolean(desc, *value),
            Repr::Integer(value) => visitor.visit_integer(desc, *value),
            Repr::Enumerated(value) => visitor.visit_enumerated(desc, *value),
            Repr::ObjectId(arcs) => visitor.visit_object_id(desc, arcs),
            Repr::BitString(bits) => visitor.visit_bit_string(desc, bits),
            Repr::OctetString(octets) => visitor.visit_octet_string(desc, octets),
            Repr::CharString(text) => visitor.visit_char_string(desc, text),
            Repr::BmpString(units) => visitor.visit_bmp_string(desc, units),
            Repr::Time(time) => visitor.visit_time(desc, time),
            Repr::Choice(choice) => {
                let info = choice_info(desc);
                visitor.visit_choice(desc, info, choice)
            }
            Repr::SequenceOf(elements) => visitor.visit_sequence_of(desc, elements),
            Repr::Open(open) => visitor.visit_open(desc, open),
            Repr::Sequence(seq) => {
                let info = sequence_info(desc);
                visitor.visit_sequence(desc, info, seq)
            }
        }
    }

    /// Dispatch a mutating visitor over this value.
    pub fn decode<V: Visitor>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        let desc = self.desc();
        match self.repr_mut() {
            Repr::Null => visitor.visit_null(desc),
            Repr::Boolean(value) => visitor.visit_boolean(desc, value),
            Repr::Integer(value) => visitor.visit_integer(desc, value),
            Repr::Enumerated(value) => visitor.visit_enumerated(desc, value),
            Repr::ObjectId(arcs) => visitor.visit_object_id(desc, arcs),
            Repr::BitString(bits) => visitor.visit_bit_string(desc, bits),
            Repr::OctetString(octets) => visitor.visit_octet_string(desc, octets),
            Repr::CharString(text) => visitor.visit_char_string(desc, text),
            Repr::BmpString(units) => visitor.visit_bmp_string(desc, units),
            Repr::Time(time) => visitor.visit_time(desc, time),
            Repr::Choice(choice) => {
                let info = choice_info(desc);
                visitor.visit_choice(desc, info, choice)
            }
            Repr::SequenceOf(elements) => visitor.visit_sequence_of(desc, elements),
            Repr::Open(open) => visitor.visit_open(desc, open),
            Repr::Sequence(seq) => {
                let info = sequence_info(desc);
                visitor.visit_sequence(desc, info, seq)
            }
        }
    }

    /// Re-run a decoder over a deferred open type's buffer.
    pub fn revisit<V: Visitor>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        let desc = self.desc();
        match self.repr_mut() {
            Repr::Open(open) => visitor.redecode_open(desc, open),
            _ => Ok(()),
        }
    }
}

fn choice_info(desc: &'static Descriptor) -> &'static crate::types::descriptor::ChoiceInfo {
    match desc.kind {
        crate::types::Kind::Choice(info) => info,
        _ => unreachable!("choice repr with non-choice descriptor"),
    }
}

fn sequence_info(desc: &'static Descriptor) -> &'static SequenceInfo {
    match desc.kind {
        crate::types::Kind::Sequence(info) => info,
        _ => unreachable!("sequence repr with non-sequence descriptor"),
    }
}
