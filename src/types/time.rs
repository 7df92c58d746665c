//! The GeneralizedTime component record and its compact ASCII form.

use alloc::format;
use alloc::string::String;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use core::cmp::Ordering;

/// A GeneralizedTime broken into calendar components.
///
/// `minute_offset` is the timezone offset in minutes when `utc` is false;
/// setting one clears the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralizedTime {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub millisecond: u16,
    pub minute_offset: i16,
    pub utc: bool,
}

impl Default for GeneralizedTime {
    fn default() -> Self {
        Self {
            year: 1,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
            millisecond: 0,
            minute_offset: 0,
            utc: false,
        }
    }
}

impl GeneralizedTime {
    pub fn new(year: i32, month: u8, day: u8) -> Self {
        Self {
            year,
            month,
            day,
            ..Self::default()
        }
    }

    pub fn set_minute_offset(&mut self, minutes: i16) {
        self.utc = false;
        self.minute_offset = minutes;
    }

    pub fn set_utc(&mut self, utc: bool) {
        self.minute_offset = 0;
        self.utc = utc;
    }

    /// The compact form used on the wire: `YYYYMMDDHHMMSS`, an optional
    /// `.fff` fraction, and an optional `Z` or `+HHMM`/`-HHMM` suffix.
    pub fn format(&self) -> String {
        let mut out = format!(
            "{:04}{:02}{:02}{:02}{:02}{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        );
        if self.millisecond != 0 {
            out.push_str(&format!(".{:03}", self.millisecond));
        }
        if self.utc {
            out.push('Z');
        } else if self.minute_offset != 0 {
            out.push_str(&format!(
                "{:+03}{:02}",
                self.minute_offset / 60,
                (self.minute_offset % 60).abs()
            ));
        }
        out
    }

    pub fn parse(text: &str) -> Option<Self> {
        let bytes = text.as_bytes();
        if bytes.len() < 14 || !bytes[..14].iter().all(u8::is_ascii_digit) {
            return None;
        }
        let digits = |r: core::ops::Range<usize>| -> i32 {
            text[r].parse().unwrap_or(0)
        };
        let mut time = Self {
            year: digits(0..4),
            month: digits(4..6) as u8,
            day: digits(6..8) as u8,
            hour: digits(8..10) as u8,
            minute: digits(10..12) as u8,
            second: digits(12..14) as u8,
            ..Self::default()
        };

        let mut rest = &text[14..];
        if let Some(fraction) = rest.strip_prefix('.') {
            let end = fraction
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(fraction.len());
            let frac: &str = &fraction[..end.min(3)];
            if frac.is_empty() {
                return None;
            }
            let scale = 10u16.pow(3 - frac.len() as u32);
            time.millisecond = frac.parse::<u16>().ok()? * scale;
            rest = &fraction[end..];
        }
        match rest.as_bytes() {
            [] => {}
            [b'Z'] => time.utc = true,
            [sign @ (b'+' | b'-'), h1, h2, m1, m2]
                if [h1, h2, m1, m2].iter().all(|b| b.is_ascii_digit()) =>
            {
                let hours: i16 = rest[1..3].parse().ok()?;
                let minutes: i16 = rest[3..5].parse().ok()?;
                let total = hours * 60 + minutes;
                time.minute_offset = if *sign == b'-' { -total } else { total };
            }
            _ => return None,
        }
        Some(time)
    }

    /// Calendar conversion; `None` when the components do not name a real
    /// instant.
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month as u32, self.day as u32)?
            .and_hms_milli_opt(
                self.hour as u32,
                self.minute as u32,
                self.second as u32,
                self.millisecond as u32,
            )
    }

    pub fn from_datetime(datetime: NaiveDateTime) -> Self {
        let date = datetime.date();
        Self {
            year: date.year(),
            month: date.month() as u8,
            day: date.day() as u8,
            hour: datetime.hour() as u8,
            minute: datetime.minute() as u8,
            second: datetime.second() as u8,
            millisecond: (datetime.nanosecond() / 1_000_000) as u16,
            minute_offset: 0,
            utc: false,
        }
    }

    pub fn compare(&self, other: &Self) -> Ordering {
        (
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.millisecond,
            self.minute_offset,
            self.utc,
        )
            .cmp(&(
                other.year,
                other.month,
                other.day,
                other.hour,
                other.minute,
                other.second,
                other.millisecond,
                other.minute_offset,
                other.utc,
            ))
    }

    pub fn is_strictly_valid(&self) -> bool {
        self.year > 0
            && (1..=12).contains(&self.month)
            && (1..=31).contains(&self.day)
            && self.hour <= 24
            && self.minute < 60
            && self.second < 60
            && (-60 * 12..=60 * 12).contains(&(self.minute_offset as i32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parse_round_trip() {
        let mut t = GeneralizedTime::new(2008, 3, 1);
        t.hour = 14;
        t.minute = 30;
        t.set_utc(true);
        assert_eq!("20080301143000Z", t.format());
        assert_eq!(Some(t), GeneralizedTime::parse("20080301143000Z"));
    }

    #[test]
    fn fraction_and_offset() {
        let parsed = GeneralizedTime::parse("19990101000000.5-0130").unwrap();
        assert_eq!(500, parsed.millisecond);
        assert_eq!(-90, parsed.minute_offset);
        let mut t = GeneralizedTime::new(1999, 1, 1);
        t.millisecond = 500;
        t.set_minute_offset(-90);
        assert_eq!("19990101000000.500-0130", t.format());
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(None, GeneralizedTime::parse("not a time"));
        assert_eq!(None, GeneralizedTime::parse("2008030114"));
        assert_eq!(None, GeneralizedTime::parse("20080301143000X"));
    }

    #[test]
    fn datetime_conversion() {
        let t = GeneralizedTime::new(2020, 2, 29);
        let dt = t.to_datetime().unwrap();
        assert_eq!(t, GeneralizedTime::from_datetime(dt));
        assert!(GeneralizedTime::new(2021, 2, 29).to_datetime().is_none());
    }

    #[test]
    fn strict_validity_bounds() {
        assert!(GeneralizedTime::new(2021, 12, 31).is_strictly_valid());
        assert!(!GeneralizedTime::new(2021, 13, 1).is_strictly_valid());
        assert!(!GeneralizedTime::new(0, 1, 1).is_strictly_valid());
    }
}
