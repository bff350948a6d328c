//! Built-in text forms of the simple types.

use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeDelta};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::ConversionError;
use crate::options::Culture;
use crate::value::{Scalar, SimpleType};

use super::escape;

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
const DEFAULT_TIME_FORMAT: &str = "%H:%M:%S%.f";

/// Formats a scalar of a built-in simple type.
pub fn format_scalar(scalar: &Scalar, culture: &Culture) -> String {
    match scalar {
        Scalar::Bool(b) => bool_to_string(*b).to_string(),
        Scalar::Char(c) => escape::escape(c.encode_utf8(&mut [0; 4])).into_owned(),
        Scalar::I8(v) => v.to_string(),
        Scalar::I16(v) => v.to_string(),
        Scalar::I32(v) => v.to_string(),
        Scalar::I64(v) => v.to_string(),
        Scalar::U8(v) => v.to_string(),
        Scalar::U16(v) => v.to_string(),
        Scalar::U32(v) => v.to_string(),
        Scalar::U64(v) => v.to_string(),
        Scalar::F32(v) => localize(format_float(f64::from(*v), v.to_string()), culture),
        Scalar::F64(v) => localize(format_float(*v, v.to_string()), culture),
        Scalar::Decimal(d) => localize(d.to_string(), culture),
        Scalar::String(s) => escape::escape(s).into_owned(),
        Scalar::DateTime(dt) => match &culture.date_time_format {
            Some(format) => dt.format(format).to_string(),
            None => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        },
        Scalar::Date(d) => d
            .format(culture.date_format.as_deref().unwrap_or(DEFAULT_DATE_FORMAT))
            .to_string(),
        Scalar::Time(t) => t
            .format(culture.time_format.as_deref().unwrap_or(DEFAULT_TIME_FORMAT))
            .to_string(),
        Scalar::Duration(d) => format_duration(*d),
        Scalar::Uuid(u) => u.hyphenated().to_string(),
        Scalar::Bytes(bytes) => BASE64.encode(bytes),
        Scalar::Enum(e) => e.variant.clone(),
    }
}

/// Parses text as a built-in simple type.
pub fn parse_scalar(
    text: &str,
    ty: SimpleType,
    culture: &Culture,
) -> Result<Scalar, ConversionError> {
    let fail = |reason: &dyn std::fmt::Display| ConversionError::new(text, ty.type_name(), reason);
    let trimmed = text.trim();

    Ok(match ty {
        SimpleType::Bool => {
            Scalar::Bool(parse_bool(trimmed).ok_or_else(|| fail(&"not a boolean"))?)
        }
        SimpleType::Char => {
            let unescaped = escape::unescape(text)?;
            let mut chars = unescaped.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Scalar::Char(c),
                _ => return Err(fail(&"expected exactly one character")),
            }
        }
        SimpleType::I8 => Scalar::I8(trimmed.parse().map_err(|e| fail(&e))?),
        SimpleType::I16 => Scalar::I16(trimmed.parse().map_err(|e| fail(&e))?),
        SimpleType::I32 => Scalar::I32(trimmed.parse().map_err(|e| fail(&e))?),
        SimpleType::I64 => Scalar::I64(trimmed.parse().map_err(|e| fail(&e))?),
        SimpleType::U8 => Scalar::U8(trimmed.parse().map_err(|e| fail(&e))?),
        SimpleType::U16 => Scalar::U16(trimmed.parse().map_err(|e| fail(&e))?),
        SimpleType::U32 => Scalar::U32(trimmed.parse().map_err(|e| fail(&e))?),
        SimpleType::U64 => Scalar::U64(trimmed.parse().map_err(|e| fail(&e))?),
        SimpleType::F32 => {
            let v = parse_float(&delocalize(trimmed, culture)).map_err(|e| fail(&e))?;
            Scalar::F32(v as f32)
        }
        SimpleType::F64 => {
            Scalar::F64(parse_float(&delocalize(trimmed, culture)).map_err(|e| fail(&e))?)
        }
        SimpleType::Decimal => Scalar::Decimal(
            Decimal::from_str(&delocalize(trimmed, culture))
                .or_else(|_| Decimal::from_scientific(&delocalize(trimmed, culture)))
                .map_err(|e| fail(&e))?,
        ),
        SimpleType::String => Scalar::String(escape::unescape(text)?.into_owned()),
        SimpleType::DateTime => {
            Scalar::DateTime(parse_date_time(trimmed, culture).map_err(|e| fail(&e))?)
        }
        SimpleType::Date => Scalar::Date(
            NaiveDate::parse_from_str(
                trimmed,
                culture.date_format.as_deref().unwrap_or(DEFAULT_DATE_FORMAT),
            )
            .map_err(|e| fail(&e))?,
        ),
        SimpleType::Time => Scalar::Time(
            NaiveTime::parse_from_str(
                trimmed,
                culture.time_format.as_deref().unwrap_or(DEFAULT_TIME_FORMAT),
            )
            .map_err(|e| fail(&e))?,
        ),
        SimpleType::Duration => {
            let duration = parse_duration(trimmed)
                .ok_or_else(|| fail(&"expected [-][d.]hh:mm:ss[.fffffff]"))?;
            Scalar::Duration(duration)
        }
        SimpleType::Uuid => Scalar::Uuid(Uuid::parse_str(trimmed).map_err(|e| fail(&e))?),
        SimpleType::Bytes => Scalar::Bytes(BASE64.decode(trimmed).map_err(|e| fail(&e))?),
    })
}

/// Converts a Rust boolean to its string representation for XML.
pub fn bool_to_string(b: bool) -> &'static str {
    if b { "true" } else { "false" }
}

/// Accepts `true/yes/on/t/1` and `false/no/off/f/0`, case-insensitively.
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "t" | "1" => Some(true),
        "false" | "no" | "off" | "f" | "0" => Some(false),
        _ => None,
    }
}

fn format_float(v: f64, shortest: String) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "INF" } else { "-INF" }.to_string()
    } else {
        shortest
    }
}

fn parse_float(text: &str) -> Result<f64, std::num::ParseFloatError> {
    match text {
        "INF" | "Infinity" => Ok(f64::INFINITY),
        "-INF" | "-Infinity" => Ok(f64::NEG_INFINITY),
        "NaN" => Ok(f64::NAN),
        other => other.parse(),
    }
}

fn localize(invariant: String, culture: &Culture) -> String {
    if culture.decimal_separator == '.' {
        invariant
    } else {
        invariant.replace('.', &culture.decimal_separator.to_string())
    }
}

fn delocalize(text: &str, culture: &Culture) -> String {
    if culture.decimal_separator == '.' {
        text.to_string()
    } else {
        text.replace(culture.decimal_separator, ".")
    }
}

fn parse_date_time(
    text: &str,
    culture: &Culture,
) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    if let Some(format) = &culture.date_time_format {
        return DateTime::parse_from_str(text, format);
    }
    DateTime::parse_from_rfc3339(text).or_else(|err| {
        // Timestamps without an offset are read as UTC.
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc().fixed_offset())
            .map_err(|_| err)
    })
}

/// Formats a duration as `[-][d.]hh:mm:ss[.fffffff]`.
pub fn format_duration(d: TimeDelta) -> String {
    let negative = d < TimeDelta::zero();
    let d = d.abs();
    let total_seconds = d.num_seconds();
    let nanos = d.subsec_nanos();
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if days > 0 {
        out.push_str(&format!("{}.", days));
    }
    out.push_str(&format!("{:02}:{:02}:{:02}", hours, minutes, seconds));
    if nanos > 0 {
        let fraction = format!("{:09}", nanos);
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }
    out
}

/// Parses the form produced by [`format_duration`].
pub fn parse_duration(text: &str) -> Option<TimeDelta> {
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let mut parts = rest.split(':');
    let (head, minutes, tail) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let (days, hours) = match head.split_once('.') {
        Some((days, hours)) => (days.parse::<i64>().ok()?, hours.parse::<i64>().ok()?),
        None => (0, head.parse::<i64>().ok()?),
    };
    let minutes = minutes.parse::<i64>().ok()?;
    let (seconds, nanos) = match tail.split_once('.') {
        Some((seconds, fraction)) => {
            if fraction.is_empty()
                || fraction.len() > 9
                || !fraction.bytes().all(|b| b.is_ascii_digit())
            {
                return None;
            }
            let padded = format!("{:0<9}", fraction);
            (seconds.parse::<i64>().ok()?, padded.parse::<i64>().ok()?)
        }
        None => (tail.parse::<i64>().ok()?, 0),
    };
    if hours > 23 || minutes > 59 || seconds > 59 {
        return None;
    }

    let total = TimeDelta::try_days(days)?
        + TimeDelta::try_hours(hours)?
        + TimeDelta::try_minutes(minutes)?
        + TimeDelta::try_seconds(seconds)?
        + TimeDelta::nanoseconds(nanos);
    Some(if negative { -total } else { total })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn invariant() -> Culture {
        Culture::invariant()
    }

    #[test]
    fn test_bool_spellings() {
        for t in ["true", "YES", "on", "t", "1"] {
            assert_eq!(parse_bool(t), Some(true), "{}", t);
        }
        for f in ["false", "No", "OFF", "f", "0"] {
            assert_eq!(parse_bool(f), Some(false), "{}", f);
        }
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(
            parse_scalar(" yes ", SimpleType::Bool, &invariant()).unwrap(),
            Scalar::Bool(true)
        );
    }

    #[test]
    fn test_integer_widths() {
        assert_eq!(
            parse_scalar("-128", SimpleType::I8, &invariant()).unwrap(),
            Scalar::I8(-128)
        );
        assert!(parse_scalar("256", SimpleType::U8, &invariant()).is_err());
        assert_eq!(
            parse_scalar("18446744073709551615", SimpleType::U64, &invariant()).unwrap(),
            Scalar::U64(u64::MAX)
        );
    }

    #[test]
    fn test_float_specials() {
        assert_eq!(format_scalar(&Scalar::F64(f64::INFINITY), &invariant()), "INF");
        assert_eq!(format_scalar(&Scalar::F64(1.5), &invariant()), "1.5");
        assert_eq!(
            parse_scalar("-INF", SimpleType::F64, &invariant()).unwrap(),
            Scalar::F64(f64::NEG_INFINITY)
        );
        match parse_scalar("NaN", SimpleType::F32, &invariant()).unwrap() {
            Scalar::F32(v) => assert!(v.is_nan()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decimal_with_culture_separator() {
        let culture = Culture {
            decimal_separator: ',',
            ..Culture::invariant()
        };
        let scalar = Scalar::Decimal(dec!(12.50));
        assert_eq!(format_scalar(&scalar, &culture), "12,50");
        assert_eq!(
            parse_scalar("12,50", SimpleType::Decimal, &culture).unwrap(),
            scalar
        );
    }

    #[test]
    fn test_dates() {
        let dt = DateTime::parse_from_rfc3339("2024-03-01T10:15:30+02:00").unwrap();
        let text = format_scalar(&Scalar::DateTime(dt), &invariant());
        assert_eq!(text, "2024-03-01T10:15:30+02:00");
        assert_eq!(
            parse_scalar(&text, SimpleType::DateTime, &invariant()).unwrap(),
            Scalar::DateTime(dt)
        );
        assert!(matches!(
            parse_scalar("2024-03-01T10:15:30", SimpleType::DateTime, &invariant()),
            Ok(Scalar::DateTime(_))
        ));

        let date = NaiveDate::from_ymd_opt(1974, 12, 25).unwrap();
        assert_eq!(format_scalar(&Scalar::Date(date), &invariant()), "1974-12-25");

        let time = NaiveTime::from_hms_milli_opt(8, 30, 0, 250).unwrap();
        let text = format_scalar(&Scalar::Time(time), &invariant());
        assert_eq!(text, "08:30:00.250");
        assert_eq!(
            parse_scalar(&text, SimpleType::Time, &invariant()).unwrap(),
            Scalar::Time(time)
        );
    }

    #[test]
    fn test_duration_format() {
        let d = TimeDelta::try_days(1).unwrap()
            + TimeDelta::try_hours(2).unwrap()
            + TimeDelta::try_minutes(3).unwrap()
            + TimeDelta::try_seconds(4).unwrap()
            + TimeDelta::try_milliseconds(500).unwrap();
        assert_eq!(format_duration(d), "1.02:03:04.5");
        assert_eq!(parse_duration("1.02:03:04.5"), Some(d));
        assert_eq!(format_duration(-TimeDelta::try_minutes(90).unwrap()), "-01:30:00");
        assert_eq!(parse_duration("-01:30:00"), Some(-TimeDelta::try_minutes(90).unwrap()));
        assert_eq!(parse_duration("25:00:00"), None);
        assert_eq!(parse_duration("1:2"), None);
    }

    #[test]
    fn test_uuid_and_bytes() {
        let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        let text = format_scalar(&Scalar::Uuid(id), &invariant());
        assert_eq!(text, "67e55044-10b1-426f-9247-bb680e5fe0c8");
        assert_eq!(
            parse_scalar("{67E55044-10B1-426F-9247-BB680E5FE0C8}", SimpleType::Uuid, &invariant())
                .unwrap(),
            Scalar::Uuid(id)
        );

        let bytes = Scalar::Bytes(vec![0, 1, 2, 255]);
        assert_eq!(format_scalar(&bytes, &invariant()), "AAEC/w==");
        assert_eq!(
            parse_scalar("AAEC/w==", SimpleType::Bytes, &invariant()).unwrap(),
            bytes
        );
    }

    #[test]
    fn test_string_and_char_are_escaped() {
        assert_eq!(
            format_scalar(&Scalar::String("a\tb".into()), &invariant()),
            "a\\tb"
        );
        assert_eq!(format_scalar(&Scalar::Char('\n'), &invariant()), "\\n");
        assert_eq!(
            parse_scalar("\\n", SimpleType::Char, &invariant()).unwrap(),
            Scalar::Char('\n')
        );
        assert!(parse_scalar("ab", SimpleType::Char, &invariant()).is_err());
    }

    #[test]
    fn test_conversion_error_names_type() {
        let err = parse_scalar("twelve", SimpleType::I32, &invariant()).unwrap_err();
        assert_eq!(err.expected, "Int32");
        assert_eq!(err.text, "twelve");
    }
}
