//! Value-notation encoder: a pretty printer with two-space indentation.
//!
//! SEQUENCE separators are tracked by a stack of "emitted a field yet"
//! flags so that nested sequences never leak a leading comma.

use alloc::string::String;
use alloc::vec::Vec;

use core::fmt::Write;
use snafu::Snafu;

use crate::types::descriptor::{ChoiceInfo, Descriptor, Kind, SequenceInfo};
use crate::types::time::GeneralizedTime;
use crate::types::value::{BitString, ChoiceValue, OpenValue, SequenceValue, Value};
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
    #[snafu(display("formatting failed"))]
    Format,
}

impl From<core::fmt::Error> for Error {
    fn from(_: core::fmt::Error) -> Self {
        Error::Format
    }
}

pub struct AvnEncoder {
    out: String,
    indent: usize,
    separators: Vec<bool>,
}

impl Default for AvnEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl AvnEncoder {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
            separators: Vec::new(),
        }
    }

    pub fn output(self) -> String {
        self.out
    }

    fn pad(&mut self, width: usize) {
        for _ in 0..width {
            self.out.push(' ');
        }
    }
}

impl ConstVisitor for AvnEncoder {
    type Error = Error;

    fn visit_null(&mut self, _desc: &'static Descriptor) -> Result<()> {
        self.out.push_str("NULL");
        Ok(())
    }

    fn visit_boolean(&mut self, _desc: &'static Descriptor, value: bool) -> Result<()> {
        self.out.push_str(if value { "TRUE" } else { "FALSE" });
        Ok(())
    }

    fn visit_integer(&mut self, desc: &'static Descriptor, value: i64) -> Result<()> {
        let names = match desc.kind {
            Kind::Integer { names, .. } => names,
            _ => &[],
        };
        match names.binary_search_by_key(&value, |entry| entry.value) {
            Ok(found) => self.out.push_str(names[found].name),
            Err(_) => write!(self.out, "{value}")?,
        }
        Ok(())
    }

    fn visit_enumerated(&mut self, desc: &'static Descriptor, value: i64) -> Result<()> {
        let names = match desc.kind {
            Kind::Enumerated { names, .. } => names,
            _ => &[],
        };
        match usize::try_from(value).ok().and_then(|i| names.get(i)) {
            Some(name) => self.out.push_str(name),
            None => write!(self.out, "{value}")?,
        }
        Ok(())
    }

    fn visit_object_id(&mut self, _desc: &'static Descriptor, arcs: &[u32]) -> Result<()> {
        self.out.push_str("{ ");
        for arc in arcs {
            write!(self.out, "{arc} ")?;
        }
        self.out.push('}');
        Ok(())
    }

    fn visit_bit_string(&mut self, _desc: &'static Descriptor, bits: &BitString) -> Result<()> {
        self.out.push('\'');
        for bit in bits.iter().by_vals() {
            self.out.push(if bit { '1' } else { '0' });
        }
        self.out.push_str("'B");
        Ok(())
    }

    fn visit_octet_string(&mut self, _desc: &'static Descriptor, octets: &[u8]) -> Result<()> {
        self.out.push('\'');
        for (i, byte) in octets.iter().enumerate() {
            if i != 0 {
                self.out.push(' ');
            }
            write!(self.out, "{byte:02X}")?;
        }
        self.out.push_str("'H");
        Ok(())
    }

    fn visit_char_string(&mut self, _desc: &'static Descriptor, text: &str) -> Result<()> {
        write!(self.out, "\"{text}\"")?;
        Ok(())
    }

    fn visit_bmp_string(&mut self, _desc: &'static Descriptor, units: &[u16]) -> Result<()> {
        if units.iter().all(|&unit| unit <= 0x7F) {
            self.out.push('"');
            for &unit in units {
                self.out.push(unit as u8 as char);
            }
            self.out.push('"');
        } else {
            // The Quadruple form is canonical beyond ASCII.
            self.out.push('{');
            for (i, &unit) in units.iter().enumerate() {
                if i != 0 {
                    self.out.push_str(", ");
                }
                write!(self.out, "{{ 0, 0, {}, {} }}", unit >> 8, unit & 0xFF)?;
            }
            self.out.push('}');
        }
        Ok(())
    }

    fn visit_time(&mut self, _desc: &'static Descriptor, time: &GeneralizedTime) -> Result<()> {
        write!(self.out, "\"{}\"", time.format())?;
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
        write!(self.out, "{} : ", info.names[index])?;
        child.encode(self)
    }

    fn visit_sequence_of(&mut self, _desc: &'static Descriptor, elements: &[Value]) -> Result<()> {
        self.out.push_str("{\n");
        self.indent += 2;
        for (i, element) in elements.iter().enumerate() {
            if i != 0 {
                self.out.push_str(",\n");
            }
            self.pad(self.indent);
            element.encode(self)?;
        }
        self.indent -= 2;
        if !elements.is_empty() {
            self.out.push('\n');
        }
        self.pad(self.indent);
        self.out.push('}');
        Ok(())
    }

    fn visit_open(&mut self, desc: &'static Descriptor, open: &OpenValue) -> Result<()> {
        if let Some(value) = &open.value {
            value.encode(self)
        } else if let Some(buffer) = &open.buffer {
            self.visit_octet_string(desc, buffer)
        } else {
            Err(Error::EmptyOpenType)
        }
    }

    fn pre_encode_extension_roots(
        &mut self,
        _desc: &'static Descriptor,
        _info: &'static SequenceInfo,
        _seq: &SequenceValue,
    ) -> Result<()> {
        self.separators.push(false);
        self.out.push_str("{\n");
        Ok(())
    }

    fn encode_extension_root(
        &mut self,
        info: &'static SequenceInfo,
        seq: &SequenceValue,
        pos: usize,
    ) -> Result<()> {
        if self.separators.last().copied().unwrap_or(false) {
            self.out.push_str(",\n");
        }
        self.pad(self.indent + 2);
        self.out.push_str(info.names[pos]);
        self.out.push(' ');
        self.indent += 2;
        let field = seq.field(pos).ok_or(Error::MissingField { pos })?;
        field.encode(self)?;
        self.indent -= 2;
        if let Some(flag) = self.separators.last_mut() {
            *flag = true;
        }
        Ok(())
    }

    fn encode_known_extension(
        &mut self,
        info: &'static SequenceInfo,
        seq: &SequenceValue,
        pos: usize,
    ) -> Result<()> {
        self.encode_extension_root(info, seq, pos)
    }

    fn after_encode_sequence(
        &mut self,
        _info: &'static SequenceInfo,
        _seq: &SequenceValue,
    ) -> Result<()> {
        if self.separators.pop().unwrap_or(false) {
            self.out.push('\n');
        }
        self.pad(self.indent);
        self.out.push('}');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::Tag;
    use crate::types::constraints::Constraint;
    use crate::types::descriptor::{self, Field, NamedNumber, TagMode};
    use alloc::vec;
    use pretty_assertions::assert_eq;

    fn notation(value: &Value) -> String {
        value.to_value_notation().unwrap()
    }

    #[test]
    fn primitives() {
        let mut value = descriptor::BOOLEAN.new_value();
        value.set_boolean(true);
        assert_eq!("TRUE", notation(&value));

        let mut value = descriptor::OBJECT_IDENTIFIER.new_value();
        *value.arcs_mut() = vec![0, 0, 16, 1];
        assert_eq!("{ 0 0 16 1 }", notation(&value));

        let mut value = descriptor::OCTET_STRING.new_value();
        *value.octets_mut() = vec![0xA4, 0x30, 0x33, 0xEE];
        assert_eq!("'A4 30 33 EE'H", notation(&value));

        let mut value = descriptor::BIT_STRING.new_value();
        value.bits_mut().extend([true, false, true, true]);
        assert_eq!("'1011'B", notation(&value));
    }

    static LEVEL: Descriptor = Descriptor {
        tag: Tag::INTEGER,
        kind: Kind::Integer {
            constraint: Constraint::NONE,
            names: &[
                NamedNumber {
                    value: 1,
                    name: "low",
                },
                NamedNumber {
                    value: 5,
                    name: "high",
                },
            ],
        },
    };

    #[test]
    fn named_numbers_use_binary_search() {
        let mut value = LEVEL.new_value();
        value.set_integer(5);
        assert_eq!("high", notation(&value));
        value.set_integer(3);
        assert_eq!("3", notation(&value));
    }

    #[test]
    fn bmp_quoted_and_quadruple_forms() {
        let mut value = descriptor::BMP_STRING.new_value();
        value.set_bmp_from_str("ok");
        assert_eq!("\"ok\"", notation(&value));
        value.set_bmp_from_str("é");
        assert_eq!("{{ 0, 0, 0, 233 }}", notation(&value));
    }

    static PAIR_INFO: descriptor::SequenceInfo = descriptor::SequenceInfo {
        extendable: false,
        fields: &[
            Field {
                desc: &descriptor::INTEGER,
                optional: Some(0),
                tag: Tag::NONE,
            },
            Field {
                desc: &descriptor::INTEGER,
                optional: Some(1),
                tag: Tag::NONE,
            },
        ],
        num_root: 2,
        num_optional: 2,
        tag_mode: TagMode::Automatic,
        names: &["fieldA", "fieldB"],
    };

    static PAIR: Descriptor = Descriptor {
        tag: Tag::SEQUENCE,
        kind: Kind::Sequence(&PAIR_INFO),
    };

    #[test]
    fn second_optional_alone_has_no_leading_comma() {
        let mut value = PAIR.new_value();
        value.include_optional(1, 1).set_integer(7);
        assert_eq!("{\n  fieldB 7\n}", notation(&value));
    }

    #[test]
    fn both_fields_use_comma_separators() {
        let mut value = PAIR.new_value();
        value.include_optional(0, 0).set_integer(1);
        value.include_optional(1, 1).set_integer(2);
        assert_eq!("{\n  fieldA 1,\n  fieldB 2\n}", notation(&value));
    }

    #[test]
    fn empty_sequence_of() {
        static LIST: Descriptor = Descriptor {
            tag: Tag::SEQUENCE,
            kind: Kind::SequenceOf {
                constraint: Constraint::NONE,
                element: &descriptor::INTEGER,
            },
        };
        let mut value = LIST.new_value();
        assert_eq!("{\n}", notation(&value));
        value.push_element().set_integer(4);
        value.push_element().set_integer(9);
        assert_eq!("{\n  4,\n  9\n}", notation(&value));
    }
}
