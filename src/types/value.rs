//! Runtime values: one tagged union over every ASN.1 variant.
//!
//! A [`Value`] pairs a `&'static` [`Descriptor`] with its representation.
//! The descriptor never changes after construction; payload mutation goes
//! through the typed accessors, and constructed values own their children
//! (SEQUENCE owns its field slots, SEQUENCE OF its elements, CHOICE its
//! selection).
//!
//! Accessors panic when invoked on the wrong variant — pairing a
//! descriptor with a foreign representation is an API-contract violation,
//! not a recoverable condition.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use bitvec::prelude::*;
use bytes::Bytes;
use core::cmp::Ordering;

use crate::types::descriptor::{ChoiceInfo, Descriptor, Kind, SequenceInfo};
use crate::types::time::GeneralizedTime;

/// Bit payloads and presence maps, MSB-first within each byte.
pub type BitString = BitVec<u8, Msb0>;

#[derive(Debug, Clone)]
pub struct Value {
    desc: &'static Descriptor,
    repr: Repr,
}

#[derive(Debug, Clone)]
pub enum Repr {
    Null,
    Boolean(bool),
    Integer(i64),
    Enumerated(i64),
    ObjectId(Vec<u32>),
    BitString(BitString),
    OctetString(Vec<u8>),
    CharString(String),
    BmpString(Vec<u16>),
    Time(GeneralizedTime),
    Sequence(SequenceValue),
    SequenceOf(Vec<Value>),
    Choice(ChoiceValue),
    Open(OpenValue),
}

/// Field slots plus the optional-present and extension-present bitmaps.
///
/// Root optional fields occupy `option_map`; extension fields (known and
/// unknown) occupy `extension_map`, which starts empty unless the type
/// declares mandatory extensions.
#[derive(Debug, Clone)]
pub struct SequenceValue {
    pub fields: Vec<Option<Value>>,
    pub option_map: BitString,
    pub extension_map: BitString,
}

#[derive(Debug, Clone)]
pub struct ChoiceValue {
    pub index: i32,
    pub child: Option<Box<Value>>,
}

#[derive(Debug, Clone, Default)]
pub struct OpenValue {
    pub value: Option<Box<Value>>,
    pub buffer: Option<Bytes>,
}

impl ChoiceValue {
    pub const UNSELECTED: i32 = -1;
    pub const UNKNOWN: i32 = -2;

    /// Select alternative `index`, instantiating its value. An index
    /// beyond the known alternatives records the unknown-selection
    /// sentinel and returns false.
    pub fn select(&mut self, info: &'static ChoiceInfo, index: usize) -> bool {
        if index < info.total() {
            self.index = index as i32;
            self.child = Some(Box::new(info.alternatives[index].new_value()));
            true
        } else {
            self.set_unknown();
            false
        }
    }

    pub fn set_unknown(&mut self) {
        self.index = Self::UNKNOWN;
        self.child = None;
    }

    pub fn is_unknown(&self) -> bool {
        self.index == Self::UNKNOWN
    }

    pub fn is_selected(&self) -> bool {
        self.index >= 0
    }
}

impl SequenceValue {
    fn new(info: &'static SequenceInfo) -> Self {
        let mut fields: Vec<Option<Value>> = (0..info.fields.len()).map(|_| None).collect();
        for (pos, field) in info.fields[..info.num_root].iter().enumerate() {
            if field.optional.is_none() {
                fields[pos] = Some(field.desc.new_value());
            }
        }

        let mandatory_extensions = info.fields[info.num_root..]
            .iter()
            .any(|field| field.optional.is_none());
        let mut extension_map = BitString::new();
        if mandatory_extensions {
            extension_map.resize(info.known_extensions(), false);
            for (k, field) in info.fields[info.num_root..].iter().enumerate() {
                if field.optional.is_none() {
                    extension_map.set(k, true);
                    fields[info.num_root + k] = Some(field.desc.new_value());
                }
            }
        }

        Self {
            fields,
            option_map: BitString::repeat(false, info.num_optional),
            extension_map,
        }
    }

    pub fn has_optional(&self, opt: usize) -> bool {
        if opt < self.option_map.len() {
            self.option_map[opt]
        } else {
            let ext = opt - self.option_map.len();
            ext < self.extension_map.len() && self.extension_map[ext]
        }
    }

    /// Mark the optional slot `opt` present and make sure the field at
    /// `pos` holds a value.
    pub fn include_optional(&mut self, info: &'static SequenceInfo, opt: usize, pos: usize) {
        if opt < self.option_map.len() {
            self.option_map.set(opt, true);
        } else {
            let ext = opt - self.option_map.len();
            if ext >= self.extension_map.len() {
                self.extension_map.resize(ext + 1, false);
            }
            self.extension_map.set(ext, true);
        }
        if self.fields[pos].is_none() {
            self.fields[pos] = Some(info.fields[pos].desc.new_value());
        }
    }

    pub fn remove_optional(&mut self, opt: usize) {
        if opt < self.option_map.len() {
            self.option_map.set(opt, false);
        } else {
            let ext = opt - self.option_map.len();
            if ext < self.extension_map.len() {
                self.extension_map.set(ext, false);
            }
        }
    }

    pub fn field(&self, pos: usize) -> Option<&Value> {
        self.fields[pos].as_ref()
    }

    pub fn field_mut(&mut self, pos: usize) -> Option<&mut Value> {
        self.fields[pos].as_mut()
    }

    /// Presence of the field at `pos` per the bitmaps (mandatory fields
    /// are always present).
    pub fn field_present(&self, info: &SequenceInfo, pos: usize) -> bool {
        match info.optional_id(pos) {
            None => true,
            Some(opt) => self.has_optional(opt),
        }
    }
}

impl OpenValue {
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.buffer.is_none()
    }
}

impl Descriptor {
    /// The factory: build a fresh default value of this type. Mandatory
    /// SEQUENCE fields and constrained open-type payloads are
    /// instantiated recursively.
    pub fn new_value(&'static self) -> Value {
        let repr = match self.kind {
            Kind::Null => Repr::Null,
            Kind::Boolean => Repr::Boolean(false),
            Kind::Integer { constraint, .. } => Repr::Integer(if constraint.contains(0) {
                0
            } else {
                constraint.lower
            }),
            Kind::Enumerated { .. } => Repr::Enumerated(0),
            Kind::ObjectId => Repr::ObjectId(Vec::new()),
            Kind::BitString { .. } => Repr::BitString(BitString::new()),
            Kind::OctetString { .. } => Repr::OctetString(Vec::new()),
            Kind::CharString { .. } => Repr::CharString(String::new()),
            Kind::BmpString { .. } => Repr::BmpString(Vec::new()),
            Kind::Time => Repr::Time(GeneralizedTime::default()),
            Kind::Sequence(info) => Repr::Sequence(SequenceValue::new(info)),
            Kind::SequenceOf { .. } => Repr::SequenceOf(Vec::new()),
            Kind::Choice(_) => Repr::Choice(ChoiceValue {
                index: ChoiceValue::UNSELECTED,
                child: None,
            }),
            Kind::Open { inner } => Repr::Open(OpenValue {
                value: inner.map(|desc| Box::new(desc.new_value())),
                buffer: None,
            }),
        };
        Value { desc: self, repr }
    }
}

macro_rules! expect_repr {
    ($value:expr, $variant:ident, $what:literal) => {
        match $value {
            Repr::$variant(inner) => inner,
            _ => panic!(concat!("value is not ", $what)),
        }
    };
}

impl Value {
    pub fn desc(&self) -> &'static Descriptor {
        self.desc
    }

    pub fn repr(&self) -> &Repr {
        &self.repr
    }

    pub(crate) fn repr_mut(&mut self) -> &mut Repr {
        &mut self.repr
    }

    /// Two values are assignment-compatible iff they share a descriptor.
    pub fn is_compatible(&self, other: &Value) -> bool {
        core::ptr::eq(self.desc, other.desc)
    }

    pub fn boolean(&self) -> bool {
        *expect_repr!(&self.repr, Boolean, "a BOOLEAN")
    }

    pub fn set_boolean(&mut self, value: bool) {
        *expect_repr!(&mut self.repr, Boolean, "a BOOLEAN") = value;
    }

    pub fn integer(&self) -> i64 {
        *expect_repr!(&self.repr, Integer, "an INTEGER")
    }

    pub fn set_integer(&mut self, value: i64) {
        *expect_repr!(&mut self.repr, Integer, "an INTEGER") = value;
    }

    pub fn enumerated(&self) -> i64 {
        *expect_repr!(&self.repr, Enumerated, "an ENUMERATED")
    }

    pub fn set_enumerated(&mut self, value: i64) {
        *expect_repr!(&mut self.repr, Enumerated, "an ENUMERATED") = value;
    }

    pub fn arcs(&self) -> &[u32] {
        expect_repr!(&self.repr, ObjectId, "an OBJECT IDENTIFIER")
    }

    pub fn arcs_mut(&mut self) -> &mut Vec<u32> {
        expect_repr!(&mut self.repr, ObjectId, "an OBJECT IDENTIFIER")
    }

    pub fn bits(&self) -> &BitString {
        expect_repr!(&self.repr, BitString, "a BIT STRING")
    }

    pub fn bits_mut(&mut self) -> &mut BitString {
        expect_repr!(&mut self.repr, BitString, "a BIT STRING")
    }

    pub fn octets(&self) -> &[u8] {
        expect_repr!(&self.repr, OctetString, "an OCTET STRING")
    }

    pub fn octets_mut(&mut self) -> &mut Vec<u8> {
        expect_repr!(&mut self.repr, OctetString, "an OCTET STRING")
    }

    pub fn chars(&self) -> &str {
        expect_repr!(&self.repr, CharString, "a character string")
    }

    pub fn chars_mut(&mut self) -> &mut String {
        expect_repr!(&mut self.repr, CharString, "a character string")
    }

    pub fn bmp_units(&self) -> &[u16] {
        expect_repr!(&self.repr, BmpString, "a BMPString")
    }

    pub fn bmp_units_mut(&mut self) -> &mut Vec<u16> {
        expect_repr!(&mut self.repr, BmpString, "a BMPString")
    }

    /// Fill a BMPString from UTF-8 text (basic-plane scalars only).
    pub fn set_bmp_from_str(&mut self, text: &str) {
        let units = self.bmp_units_mut();
        units.clear();
        units.extend(text.chars().map(|c| c as u32 as u16));
    }

    pub fn time(&self) -> &GeneralizedTime {
        expect_repr!(&self.repr, Time, "a GeneralizedTime")
    }

    pub fn time_mut(&mut self) -> &mut GeneralizedTime {
        expect_repr!(&mut self.repr, Time, "a GeneralizedTime")
    }

    fn choice_info(&self) -> &'static ChoiceInfo {
        match self.desc.kind {
            Kind::Choice(info) => info,
            _ => panic!("value is not a CHOICE"),
        }
    }

    fn sequence_info(&self) -> &'static SequenceInfo {
        match self.desc.kind {
            Kind::Sequence(info) => info,
            _ => panic!("value is not a SEQUENCE"),
        }
    }

    pub fn selection(&self) -> i32 {
        expect_repr!(&self.repr, Choice, "a CHOICE").index
    }

    /// Select a CHOICE alternative and return its fresh value.
    pub fn select(&mut self, index: usize) -> &mut Value {
        let info = self.choice_info();
        let choice = expect_repr!(&mut self.repr, Choice, "a CHOICE");
        choice.select(info, index);
        choice
            .child
            .as_deref_mut()
            .unwrap_or_else(|| panic!("selection index out of range"))
    }

    pub fn selected(&self) -> Option<&Value> {
        expect_repr!(&self.repr, Choice, "a CHOICE")
            .child
            .as_deref()
    }

    pub fn selected_mut(&mut self) -> Option<&mut Value> {
        expect_repr!(&mut self.repr, Choice, "a CHOICE")
            .child
            .as_deref_mut()
    }

    pub fn field(&self, pos: usize) -> Option<&Value> {
        expect_repr!(&self.repr, Sequence, "a SEQUENCE").field(pos)
    }

    /// Mutable access to the field at `pos`; mandatory fields always
    /// exist, optional fields only after `include_optional`.
    pub fn field_mut(&mut self, pos: usize) -> Option<&mut Value> {
        expect_repr!(&mut self.repr, Sequence, "a SEQUENCE").field_mut(pos)
    }

    pub fn has_optional(&self, opt: usize) -> bool {
        expect_repr!(&self.repr, Sequence, "a SEQUENCE").has_optional(opt)
    }

    /// Make an optional field present and return its value.
    pub fn include_optional(&mut self, opt: usize, pos: usize) -> &mut Value {
        let info = self.sequence_info();
        let seq = expect_repr!(&mut self.repr, Sequence, "a SEQUENCE");
        seq.include_optional(info, opt, pos);
        seq.fields[pos]
            .as_mut()
            .unwrap_or_else(|| panic!("optional slot missing after include"))
    }

    pub fn remove_optional(&mut self, opt: usize) {
        expect_repr!(&mut self.repr, Sequence, "a SEQUENCE").remove_optional(opt)
    }

    pub fn elements(&self) -> &[Value] {
        expect_repr!(&self.repr, SequenceOf, "a SEQUENCE OF")
    }

    pub fn elements_mut(&mut self) -> &mut Vec<Value> {
        expect_repr!(&mut self.repr, SequenceOf, "a SEQUENCE OF")
    }

    /// Append a fresh element and return it.
    pub fn push_element(&mut self) -> &mut Value {
        let element = match self.desc.kind {
            Kind::SequenceOf { element, .. } => element,
            _ => panic!("value is not a SEQUENCE OF"),
        };
        let elements = expect_repr!(&mut self.repr, SequenceOf, "a SEQUENCE OF");
        elements.push(element.new_value());
        elements
            .last_mut()
            .unwrap_or_else(|| panic!("push produced no element"))
    }

    pub fn open(&self) -> &OpenValue {
        expect_repr!(&self.repr, Open, "an open type")
    }

    pub fn open_mut(&mut self) -> &mut OpenValue {
        expect_repr!(&mut self.repr, Open, "an open type")
    }

    /// Take ownership of a decoded payload for this open type.
    pub fn grab_value(&mut self, value: Value) {
        self.open_mut().value = Some(Box::new(value));
    }

    /// Take ownership of a raw encoding for this open type.
    pub fn grab_buffer(&mut self, buffer: Bytes) {
        self.open_mut().buffer = Some(buffer);
    }

    /// Total structural order over values of the same descriptor.
    pub fn compare(&self, other: &Value) -> Ordering {
        debug_assert!(self.is_compatible(other), "comparing incompatible values");
        match (&self.repr, &other.repr) {
            (Repr::Null, Repr::Null) => Ordering::Equal,
            (Repr::Boolean(a), Repr::Boolean(b)) => a.cmp(b),
            (Repr::Integer(a), Repr::Integer(b)) => a.cmp(b),
            (Repr::Enumerated(a), Repr::Enumerated(b)) => a.cmp(b),
            // Componentwise, then by arc count.
            (Repr::ObjectId(a), Repr::ObjectId(b)) => a.cmp(b),
            (Repr::BitString(a), Repr::BitString(b)) => a.iter().by_vals().cmp(b.iter().by_vals()),
            (Repr::OctetString(a), Repr::OctetString(b)) => a.cmp(b),
            (Repr::CharString(a), Repr::CharString(b)) => a.cmp(b),
            (Repr::BmpString(a), Repr::BmpString(b)) => a.cmp(b),
            (Repr::Time(a), Repr::Time(b)) => a.compare(b),
            (Repr::Sequence(a), Repr::Sequence(b)) => {
                self.compare_sequences(self.sequence_info(), a, b)
            }
            (Repr::SequenceOf(a), Repr::SequenceOf(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y) {
                        Ordering::Equal => continue,
                        ord => return ord,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Repr::Choice(a), Repr::Choice(b)) => {
                if a.index >= 0 && a.index == b.index {
                    match (&a.child, &b.child) {
                        (Some(x), Some(y)) => x.compare(y),
                        _ => Ordering::Equal,
                    }
                } else {
                    a.index.cmp(&b.index)
                }
            }
            (Repr::Open(a), Repr::Open(b)) => match (&a.value, &b.value, &a.buffer, &b.buffer) {
                (Some(x), Some(y), _, _) => x.compare(y),
                (None, None, Some(x), Some(y)) => x.cmp(y),
                _ if a.is_empty() && b.is_empty() => Ordering::Equal,
                _ => {
                    if a.value.is_some() {
                        Ordering::Greater
                    } else {
                        Ordering::Less
                    }
                }
            },
            _ => Ordering::Equal,
        }
    }

    fn compare_sequences(
        &self,
        info: &SequenceInfo,
        a: &SequenceValue,
        b: &SequenceValue,
    ) -> Ordering {
        for pos in 0..info.fields.len() {
            let opt = info.optional_id(pos);
            let ord = match opt {
                None => match (a.field(pos), b.field(pos)) {
                    (Some(x), Some(y)) => x.compare(y),
                    (x, y) => x.is_some().cmp(&y.is_some()),
                },
                Some(opt) => {
                    let (pa, pb) = (a.has_optional(opt), b.has_optional(opt));
                    if pa && pb {
                        match (a.field(pos), b.field(pos)) {
                            (Some(x), Some(y)) => x.compare(y),
                            (x, y) => x.is_some().cmp(&y.is_some()),
                        }
                    } else {
                        pa.cmp(&pb)
                    }
                }
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.is_compatible(other) && self.compare(other) == Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::descriptor;
    use alloc::vec;

    #[test]
    fn clone_is_deep() {
        let mut a = descriptor::OCTET_STRING.new_value();
        a.octets_mut().extend_from_slice(b"abc");
        let b = a.clone();
        a.octets_mut().push(b'd');
        assert_eq!(b"abc", b.octets());
        assert_eq!(b"abcd", a.octets());
    }

    #[test]
    fn oid_compare_is_componentwise_then_length() {
        let mut a = descriptor::OBJECT_IDENTIFIER.new_value();
        let mut b = descriptor::OBJECT_IDENTIFIER.new_value();
        *a.arcs_mut() = vec![1, 2, 3];
        *b.arcs_mut() = vec![1, 2, 3, 1];
        assert_eq!(Ordering::Less, a.compare(&b));
        *b.arcs_mut() = vec![1, 2, 2];
        assert_eq!(Ordering::Greater, a.compare(&b));
    }

    #[test]
    fn bit_string_compare_prefers_bits_then_length() {
        let mut a = descriptor::BIT_STRING.new_value();
        let mut b = descriptor::BIT_STRING.new_value();
        a.bits_mut().extend([true, false]);
        b.bits_mut().extend([true, false, true]);
        assert_eq!(Ordering::Less, a.compare(&b));
        assert_eq!(Ordering::Equal, a.compare(&a.clone()));
    }

    #[test]
    fn compare_is_antisymmetric_and_transitive_for_integers() {
        let make = |n| {
            let mut v = descriptor::INTEGER.new_value();
            v.set_integer(n);
            v
        };
        let (a, b, c) = (make(-2), make(0), make(7));
        assert_eq!(Ordering::Less, a.compare(&b));
        assert_eq!(Ordering::Greater, b.compare(&a));
        assert_eq!(Ordering::Less, a.compare(&c));
        assert!(a == a.clone());
    }
}
