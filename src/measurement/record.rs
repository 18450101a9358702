//! Record parser for the meter's wire format.
//!
//! Each line is `timestamp,voltage,current,power`: an unsigned integer
//! followed by three decimal numbers. Fields are not trimmed. Anything that
//! does not match exactly is rejected with a [`RecordError`] and the caller
//! keeps reading.

use super::Measurement;
use crate::error::RecordError;
use std::str::FromStr;

const FIELD_COUNT: usize = 4;

/// Parses one decoded line (delimiter already stripped) into a [`Measurement`].
///
/// # Example
///
/// ```
/// use picova::measurement::parse_record;
///
/// let m = parse_record("100,3.30,250.0,825.0").unwrap();
/// assert_eq!(m.timestamp, 100);
/// assert!(parse_record("bad,data").is_err());
/// ```
pub fn parse_record(line: &str) -> Result<Measurement, RecordError> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != FIELD_COUNT {
        return Err(RecordError::FieldCount(fields.len()));
    }

    let timestamp = fields[0]
        .parse::<u64>()
        .map_err(|_| RecordError::Timestamp(fields[0].to_string()))?;

    Ok(Measurement {
        timestamp,
        voltage: parse_value("voltage", fields[1])?,
        current: parse_value("current", fields[2])?,
        power: parse_value("power", fields[3])?,
    })
}

// `f32::from_str` also accepts "inf" and "NaN"; the meter never sends those.
fn parse_value(field: &'static str, raw: &str) -> Result<f32, RecordError> {
    match raw.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(RecordError::Value {
            field,
            raw: raw.to_string(),
        }),
    }
}

impl FromStr for Measurement {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_record(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_line() {
        let m = parse_record("100,3.30,250.0,825.0").unwrap();
        assert_eq!(m, Measurement::new(100, 3.30, 250.0, 825.0));
    }

    #[test]
    fn test_parse_negative_current() {
        // Reverse current through the shunt reads negative.
        let m = parse_record("42,5.01,-12.5,-62.6").unwrap();
        assert_eq!(m.current, -12.5);
        assert_eq!(m.power, -62.6);
    }

    #[test]
    fn test_reject_wrong_field_count() {
        assert_eq!(parse_record("bad,data"), Err(RecordError::FieldCount(2)));
        assert_eq!(parse_record("1,2,3"), Err(RecordError::FieldCount(3)));
        assert_eq!(parse_record("1,2,3,4,5"), Err(RecordError::FieldCount(5)));
        assert_eq!(parse_record(""), Err(RecordError::FieldCount(1)));
    }

    #[test]
    fn test_reject_non_numeric_fields() {
        assert_eq!(
            parse_record("abc,1,2,3"),
            Err(RecordError::Timestamp("abc".into()))
        );
        assert_eq!(
            parse_record("-5,1,2,3"),
            Err(RecordError::Timestamp("-5".into()))
        );
        assert!(matches!(
            parse_record("1,x,2,3"),
            Err(RecordError::Value { field: "voltage", .. })
        ));
        assert!(matches!(
            parse_record("1,2,3,"),
            Err(RecordError::Value { field: "power", .. })
        ));
    }

    #[test]
    fn test_reject_whitespace_and_non_finite() {
        assert!(parse_record("1, 2,3,4").is_err());
        assert!(parse_record("1,NaN,3,4").is_err());
        assert!(parse_record("1,2,inf,4").is_err());
    }

    #[test]
    fn test_from_str() {
        let m: Measurement = "7,1.5,2.5,3.75".parse().unwrap();
        assert_eq!(m.timestamp, 7);
    }
}
