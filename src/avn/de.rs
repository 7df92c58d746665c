//! Value-notation decoder: recursive descent driven by the target
//! value's descriptor, over nom token parsers.
//!
//! SEQUENCE fields match by name against a pending-identifier stack (an
//! identifier read for one field position may belong to a later field);
//! unknown field names and unknown CHOICE alternative names fail.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use nom::bytes::complete::{take_while, take_while1};
use nom::character::complete::{char as nom_char, digit1, one_of};
use nom::combinator::{opt, recognize};
use nom::sequence::{delimited, pair};
use nom::IResult;
use snafu::Snafu;

use crate::env::CoderEnv;
use crate::types::descriptor::{ChoiceInfo, Descriptor, Kind, SequenceInfo};
use crate::types::time::GeneralizedTime;
use crate::types::value::{BitString, ChoiceValue, OpenValue, SequenceValue, Value};
use crate::visit::{SeqStep, Visitor};

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Snafu, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[snafu(display("unexpected end of input"))]
    UnexpectedEnd,
    #[snafu(display("expected {what}"))]
    Expected { what: &'static str },
    #[snafu(display("unknown SEQUENCE field name {name:?}"))]
    UnknownField { name: String },
    #[snafu(display("unknown CHOICE alternative name {name:?}"))]
    UnknownAlternative { name: String },
    #[snafu(display("unknown value name {name:?}"))]
    UnknownName { name: String },
    #[snafu(display("malformed number"))]
    InvalidNumber,
    #[snafu(display("malformed hex or binary string body"))]
    InvalidString,
    #[snafu(display("malformed GeneralizedTime literal"))]
    InvalidTime,
    #[snafu(display("open type value literals are not supported"))]
    UnsupportedOpenType,
    #[snafu(display("trailing input after the value"))]
    TrailingInput,
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic()),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
    ))(input)
}

fn signed_number(input: &str) -> IResult<&str, &str> {
    recognize(pair(opt(nom_char('-')), digit1))(input)
}

fn quoted(input: &str) -> IResult<&str, &str> {
    delimited(nom_char('"'), take_while(|c| c != '"'), nom_char('"'))(input)
}

/// `'..'B` or `'..'H` — returns the body and the radix letter.
fn tick_string(input: &str) -> IResult<&str, (&str, char)> {
    pair(
        delimited(
            nom_char('\''),
            take_while(|c: char| c != '\''),
            nom_char('\''),
        ),
        one_of("BH"),
    )(input)
}

pub struct AvnDecoder<'a> {
    rest: &'a str,
    pending: Vec<Option<String>>,
    env: Option<&'a CoderEnv>,
}

impl<'a> AvnDecoder<'a> {
    pub fn new(text: &'a str, env: Option<&'a CoderEnv>) -> Self {
        Self {
            rest: text,
            pending: Vec::new(),
            env,
        }
    }

    /// Fails when non-whitespace input remains.
    pub fn finish(mut self) -> Result<()> {
        self.skip_ws();
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(Error::TrailingInput)
        }
    }

    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.rest.chars().next()
    }

    fn expect_char(&mut self, expected: char, what: &'static str) -> Result<()> {
        match self.peek() {
            Some(c) if c == expected => {
                self.rest = &self.rest[expected.len_utf8()..];
                Ok(())
            }
            Some(_) => Err(Error::Expected { what }),
            None => Err(Error::UnexpectedEnd),
        }
    }

    fn eat<T>(&mut self, parser: impl Fn(&'a str) -> IResult<&'a str, T>, what: &'static str) -> Result<T> {
        self.skip_ws();
        if self.rest.is_empty() {
            return Err(Error::UnexpectedEnd);
        }
        match parser(self.rest) {
            Ok((rest, token)) => {
                self.rest = rest;
                Ok(token)
            }
            Err(_) => Err(Error::Expected { what }),
        }
    }

    fn take_identifier(&mut self) -> Result<&'a str> {
        self.eat(identifier, "an identifier")
    }

    fn take_integer(&mut self) -> Result<i64> {
        let digits = self.eat(signed_number, "a number")?;
        digits.parse().map_err(|_| Error::InvalidNumber)
    }

    fn take_quoted(&mut self) -> Result<&'a str> {
        self.eat(quoted, "a quoted string")
    }
}

impl<'a> Visitor for AvnDecoder<'a> {
    type Error = Error;

    fn visit_null(&mut self, _desc: &'static Descriptor) -> Result<()> {
        match self.take_identifier()? {
            "NULL" => Ok(()),
            _ => Err(Error::Expected { what: "NULL" }),
        }
    }

    fn visit_boolean(&mut self, _desc: &'static Descriptor, value: &mut bool) -> Result<()> {
        match self.take_identifier()? {
            "TRUE" => *value = true,
            "FALSE" => *value = false,
            _ => return Err(Error::Expected { what: "TRUE or FALSE" }),
        }
        Ok(())
    }

    fn visit_integer(&mut self, desc: &'static Descriptor, value: &mut i64) -> Result<()> {
        let names = match desc.kind {
            Kind::Integer { names, .. } => names,
            _ => &[],
        };
        if self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            let name = self.take_identifier()?;
            match names.iter().find(|entry| entry.name == name) {
                Some(entry) => *value = entry.value,
                None => {
                    return Err(Error::UnknownName {
                        name: name.to_string(),
                    })
                }
            }
            return Ok(());
        }
        *value = self.take_integer()?;
        Ok(())
    }

    fn visit_enumerated(&mut self, desc: &'static Descriptor, value: &mut i64) -> Result<()> {
        let names = match desc.kind {
            Kind::Enumerated { names, .. } => names,
            _ => &[],
        };
        if self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            let name = self.take_identifier()?;
            match names.iter().position(|&n| n == name) {
                Some(index) => *value = index as i64,
                None => {
                    return Err(Error::UnknownName {
                        name: name.to_string(),
                    })
                }
            }
            return Ok(());
        }
        *value = self.take_integer()?;
        Ok(())
    }

    fn visit_object_id(&mut self, _desc: &'static Descriptor, arcs: &mut Vec<u32>) -> Result<()> {
        self.expect_char('{', "'{'")?;
        arcs.clear();
        while self.peek() != Some('}') {
            let arc = self.take_integer()?;
            let arc = u32::try_from(arc).map_err(|_| Error::InvalidNumber)?;
            arcs.push(arc);
        }
        self.expect_char('}', "'}'")
    }

    fn visit_bit_string(&mut self, _desc: &'static Descriptor, bits: &mut BitString) -> Result<()> {
        let (body, radix) = self.eat(tick_string, "a 'xxxx'B literal")?;
        if radix != 'B' {
            return Err(Error::Expected {
                what: "a binary string",
            });
        }
        bits.clear();
        for c in body.chars() {
            match c {
                '0' => bits.push(false),
                '1' => bits.push(true),
                c if c.is_whitespace() => {}
                _ => return Err(Error::InvalidString),
            }
        }
        Ok(())
    }

    fn visit_octet_string(&mut self, _desc: &'static Descriptor, octets: &mut Vec<u8>) -> Result<()> {
        let (body, radix) = self.eat(tick_string, "a 'xx xx'H literal")?;
        if radix != 'H' {
            return Err(Error::Expected { what: "a hex string" });
        }
        octets.clear();
        let mut nibbles = body.chars().filter(|c| !c.is_whitespace());
        while let Some(high) = nibbles.next() {
            let low = nibbles.next().ok_or(Error::InvalidString)?;
            let high = high.to_digit(16).ok_or(Error::InvalidString)?;
            let low = low.to_digit(16).ok_or(Error::InvalidString)?;
            octets.push((high << 4 | low) as u8);
        }
        Ok(())
    }

    fn visit_char_string(&mut self, _desc: &'static Descriptor, text: &mut String) -> Result<()> {
        let body = self.take_quoted()?;
        text.clear();
        text.push_str(body);
        Ok(())
    }

    fn visit_bmp_string(&mut self, _desc: &'static Descriptor, units: &mut Vec<u16>) -> Result<()> {
        units.clear();
        if self.peek() == Some('"') {
            let body = self.take_quoted()?;
            units.extend(body.chars().map(|c| c as u32 as u16));
            return Ok(());
        }
        // Quadruple form: { { 0, 0, row, cell }, ... }
        self.expect_char('{', "'{' or a quoted string")?;
        while self.peek() != Some('}') {
            self.expect_char('{', "'{'")?;
            let mut cells = [0i64; 4];
            for (i, cell) in cells.iter_mut().enumerate() {
                if i != 0 {
                    self.expect_char(',', "','")?;
                }
                *cell = self.take_integer()?;
            }
            self.expect_char('}', "'}'")?;
            let unit = ((cells[2] & 0xFF) as u16) << 8 | (cells[3] & 0xFF) as u16;
            units.push(unit);
            if self.peek() == Some(',') {
                self.expect_char(',', "','")?;
            }
        }
        self.expect_char('}', "'}'")
    }

    fn visit_time(&mut self, _desc: &'static Descriptor, time: &mut GeneralizedTime) -> Result<()> {
        let body = self.take_quoted()?;
        *time = GeneralizedTime::parse(body).ok_or(Error::InvalidTime)?;
        Ok(())
    }

    fn visit_choice(
        &mut self,
        _desc: &'static Descriptor,
        info: &'static ChoiceInfo,
        choice: &mut ChoiceValue,
    ) -> Result<()> {
        let name = self.take_identifier()?;
        let index = match info.names.iter().position(|&n| n == name) {
            Some(index) => index,
            None => {
                return Err(Error::UnknownAlternative {
                    name: name.to_string(),
                })
            }
        };
        self.expect_char(':', "':'")?;
        choice.select(info, index);
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
        self.expect_char('{', "'{'")?;
        elements.clear();
        if self.peek() == Some('}') {
            return self.expect_char('}', "'}'");
        }
        loop {
            let mut element = element_desc.new_value();
            element.decode(self)?;
            elements.push(element);
            match self.peek() {
                Some(',') => self.expect_char(',', "','")?,
                _ => break,
            }
        }
        self.expect_char('}', "'}'")
    }

    fn visit_open(&mut self, _desc: &'static Descriptor, open: &mut OpenValue) -> Result<()> {
        match open.value.as_deref_mut() {
            Some(value) => value.decode(self),
            None => Err(Error::UnsupportedOpenType),
        }
    }

    fn redecode_open(&mut self, _desc: &'static Descriptor, open: &mut OpenValue) -> Result<()> {
        let buffer = match (&open.buffer, open.value.is_some()) {
            (Some(buffer), true) => buffer.clone(),
            _ => return Err(Error::UnexpectedEnd),
        };
        let text = core::str::from_utf8(&buffer).map_err(|_| Error::InvalidString)?;
        let mut decoder = AvnDecoder::new(text, self.env);
        match open.value.as_deref_mut() {
            Some(value) => value.decode(&mut decoder),
            None => Ok(()),
        }
    }

    fn pre_decode_extension_roots(
        &mut self,
        _desc: &'static Descriptor,
        _info: &'static SequenceInfo,
        _seq: &mut SequenceValue,
    ) -> Result<SeqStep> {
        self.expect_char('{', "'{'")?;
        self.pending.push(None);
        Ok(SeqStep::Continue)
    }

    fn decode_extension_root(
        &mut self,
        info: &'static SequenceInfo,
        seq: &mut SequenceValue,
        pos: usize,
    ) -> Result<SeqStep> {
        if self.pending.last().is_some_and(|slot| slot.is_none()) {
            if self.peek() == Some('}') {
                self.expect_char('}', "'}'")?;
                self.pending.pop();
                return Ok(SeqStep::Stop);
            }
            let name = self.take_identifier()?.to_string();
            if let Some(slot) = self.pending.last_mut() {
                *slot = Some(name);
            }
        }

        let matches = self
            .pending
            .last()
            .and_then(|slot| slot.as_deref())
            .is_some_and(|name| name == info.names[pos]);
        if !matches {
            return Ok(SeqStep::Continue);
        }
        if let Some(slot) = self.pending.last_mut() {
            *slot = None;
        }

        if let Some(opt) = info.optional_id(pos) {
            seq.include_optional(info, opt, pos);
        } else if seq.fields[pos].is_none() {
            seq.fields[pos] = Some(info.fields[pos].desc.new_value());
        }
        if let Some(field) = seq.field_mut(pos) {
            field.decode(self)?;
        }
        if self.peek() == Some(',') {
            self.expect_char(',', "','")?;
        }
        Ok(SeqStep::Continue)
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
        if let Some(Some(name)) = self.pending.last() {
            return Err(Error::UnknownField { name: name.clone() });
        }
        self.expect_char('}', "'}'")?;
        self.pending.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::descriptor;
    use alloc::vec;
    use pretty_assertions::assert_eq;

    fn parse(desc: &'static Descriptor, text: &str) -> Result<Value> {
        let mut value = desc.new_value();
        value.from_value_notation(text)?;
        Ok(value)
    }

    #[test]
    fn primitives() {
        assert!(parse(&descriptor::BOOLEAN, " TRUE ").unwrap().boolean());
        assert_eq!(
            -42,
            parse(&descriptor::INTEGER, "-42").unwrap().integer()
        );
        assert_eq!(
            &[0, 0, 16, 1],
            parse(&descriptor::OBJECT_IDENTIFIER, "{ 0 0 16 1 }")
                .unwrap()
                .arcs()
        );
        assert_eq!(
            b"\xA4\x30\x33\xEE".as_slice(),
            parse(&descriptor::OCTET_STRING, "'A4 30 33 EE'H")
                .unwrap()
                .octets()
        );
        assert_eq!(
            "abc",
            parse(&descriptor::IA5_STRING, "\"abc\"").unwrap().chars()
        );
    }

    #[test]
    fn bit_string_body() {
        let value = parse(&descriptor::BIT_STRING, "'1011'B").unwrap();
        assert_eq!(
            vec![true, false, true, true],
            value.bits().iter().by_vals().collect::<Vec<_>>()
        );
        assert!(parse(&descriptor::BIT_STRING, "'10F1'B").is_err());
    }

    #[test]
    fn encoder_output_parses_back() {
        let mut value = descriptor::GENERALIZED_TIME.new_value();
        *value.time_mut() = crate::types::GeneralizedTime::parse("20080301143000Z").unwrap();
        let text = value.to_value_notation().unwrap();
        assert_eq!(value, parse(&descriptor::GENERALIZED_TIME, &text).unwrap());

        let mut value = descriptor::BMP_STRING.new_value();
        value.set_bmp_from_str("héllo");
        let text = value.to_value_notation().unwrap();
        assert_eq!(value, parse(&descriptor::BMP_STRING, &text).unwrap());
    }

    #[test]
    fn trailing_input_is_rejected() {
        assert_eq!(
            Err(Error::TrailingInput),
            parse(&descriptor::INTEGER, "7 8").map(|_| ())
        );
    }
}
