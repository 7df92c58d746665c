//! Validity predicates as a walk over the observing visitor surface.
//!
//! `is_valid` accepts values that could fit an extension of the type;
//! `is_strictly_valid` holds every constrained value to its extension
//! root. Both are advisory: decoding never consults them.

use crate::types::constraints::{Constraint, ConstraintKind};
use crate::types::descriptor::{ChoiceInfo, Descriptor, Kind, SequenceInfo};
use crate::types::time::GeneralizedTime;
use crate::types::value::{BitString, ChoiceValue, OpenValue, SequenceValue, Value};
use crate::visit::ConstVisitor;

/// The single failure value of a validity walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invalid;

struct Checker {
    strict: bool,
}

impl Checker {
    fn check(&self, ok: bool) -> Result<(), Invalid> {
        if ok {
            Ok(())
        } else {
            Err(Invalid)
        }
    }

    fn check_size(&self, constraint: Constraint, len: usize) -> Result<(), Invalid> {
        let above_lower = len as u64 >= constraint.lower.max(0) as u64;
        let below_upper = len as u64 <= constraint.upper
            || (!self.strict && constraint.kind == ConstraintKind::Extendable);
        self.check(above_lower && below_upper)
    }
}

impl ConstVisitor for Checker {
    type Error = Invalid;

    fn visit_null(&mut self, _desc: &'static Descriptor) -> Result<(), Invalid> {
        Ok(())
    }

    fn visit_boolean(&mut self, _desc: &'static Descriptor, _value: bool) -> Result<(), Invalid> {
        Ok(())
    }

    fn visit_integer(&mut self, desc: &'static Descriptor, value: i64) -> Result<(), Invalid> {
        let constraint = desc.constraint();
        let ok = match constraint.kind {
            ConstraintKind::Unconstrained => true,
            // Only the lower bound of a semi-constrained type is known.
            ConstraintKind::PartiallyConstrained => value >= constraint.lower,
            ConstraintKind::Fixed => constraint.contains(value),
            ConstraintKind::Extendable => !self.strict || constraint.contains(value),
        };
        self.check(ok)
    }

    fn visit_enumerated(&mut self, desc: &'static Descriptor, value: i64) -> Result<(), Invalid> {
        let (extendable, max) = match desc.kind {
            Kind::Enumerated { extendable, max, .. } => (extendable, max),
            _ => return Err(Invalid),
        };
        let in_root = (0..=max).contains(&value);
        self.check(in_root || (!self.strict && extendable && value >= 0))
    }

    fn visit_object_id(&mut self, _desc: &'static Descriptor, arcs: &[u32]) -> Result<(), Invalid> {
        self.check(!arcs.is_empty())
    }

    fn visit_bit_string(
        &mut self,
        desc: &'static Descriptor,
        bits: &BitString,
    ) -> Result<(), Invalid> {
        self.check_size(desc.constraint(), bits.len())
    }

    fn visit_octet_string(
        &mut self,
        desc: &'static Descriptor,
        octets: &[u8],
    ) -> Result<(), Invalid> {
        self.check_size(desc.constraint(), octets.len())
    }

    fn visit_char_string(&mut self, desc: &'static Descriptor, text: &str) -> Result<(), Invalid> {
        let set = match desc.kind {
            Kind::CharString { set, .. } => set,
            _ => return Err(Invalid),
        };
        self.check_size(desc.constraint(), text.chars().count())?;
        let legal = text
            .chars()
            .all(|c| (c as u32) <= 255 && set.contains(c as u32 as u8));
        self.check(legal)
    }

    fn visit_bmp_string(&mut self, desc: &'static Descriptor, units: &[u16]) -> Result<(), Invalid> {
        let (first, last) = match desc.kind {
            Kind::BmpString { first, last, .. } => (first, last),
            _ => return Err(Invalid),
        };
        self.check_size(desc.constraint(), units.len())?;
        self.check(units.iter().all(|&u| u >= first && u <= last))
    }

    fn visit_time(
        &mut self,
        _desc: &'static Descriptor,
        time: &GeneralizedTime,
    ) -> Result<(), Invalid> {
        self.check(time.is_strictly_valid())
    }

    fn visit_choice(
        &mut self,
        _desc: &'static Descriptor,
        info: &'static ChoiceInfo,
        choice: &ChoiceValue,
    ) -> Result<(), Invalid> {
        if choice.index < 0 {
            return Err(Invalid);
        }
        let index = choice.index as usize;
        let in_root = index < info.num_root;
        self.check(in_root || (!self.strict && info.extendable))?;
        match choice.child.as_deref() {
            Some(child) => child.encode(self),
            None => Err(Invalid),
        }
    }

    fn visit_sequence_of(
        &mut self,
        desc: &'static Descriptor,
        elements: &[Value],
    ) -> Result<(), Invalid> {
        self.check_size(desc.constraint(), elements.len())?;
        for element in elements {
            element.encode(self)?;
        }
        Ok(())
    }

    fn visit_open(&mut self, _desc: &'static Descriptor, open: &OpenValue) -> Result<(), Invalid> {
        match (&open.value, &open.buffer) {
            (Some(value), _) => value.encode(self),
            (None, Some(_)) => Ok(()),
            (None, None) => Err(Invalid),
        }
    }

    fn encode_extension_root(
        &mut self,
        _info: &'static SequenceInfo,
        seq: &SequenceValue,
        pos: usize,
    ) -> Result<(), Invalid> {
        match seq.field(pos) {
            Some(field) => field.encode(self),
            None => Err(Invalid),
        }
    }

    fn encode_known_extension(
        &mut self,
        info: &'static SequenceInfo,
        seq: &SequenceValue,
        pos: usize,
    ) -> Result<(), Invalid> {
        self.encode_extension_root(info, seq, pos)
    }
}

impl Value {
    /// Conformance to the type's constraints, counting values that fit
    /// an extension as acceptable.
    pub fn is_valid(&self) -> bool {
        self.encode(&mut Checker { strict: false }).is_ok()
    }

    /// Conformance without any allowance for extensions.
    pub fn is_strictly_valid(&self) -> bool {
        self.encode(&mut Checker { strict: true }).is_ok()
    }
}
