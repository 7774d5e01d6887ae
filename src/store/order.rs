// MongoDB-style ordering of BSON values for backends that sort in process.
// Type rank: missing/null < numbers < strings < documents < arrays < binary < ObjectId
// < booleans < dates < timestamps < everything else.

use std::cmp::Ordering;

use mongodb::bson::Bson;

fn type_rank(value: Option<&Bson>) -> u8 {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => 0,
        Some(Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_)) => 1,
        Some(Bson::String(_) | Bson::Symbol(_)) => 2,
        Some(Bson::Document(_)) => 3,
        Some(Bson::Array(_)) => 4,
        Some(Bson::Binary(_)) => 5,
        Some(Bson::ObjectId(_)) => 6,
        Some(Bson::Boolean(_)) => 7,
        Some(Bson::DateTime(_)) => 8,
        Some(Bson::Timestamp(_)) => 9,
        Some(_) => 10,
    }
}

fn numeric(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        Bson::Decimal128(d) => Some(decimal_to_f64(&d.bytes())),
        _ => None,
    }
}

/// IEEE 754-2008 decimal128 (BID encoding, little-endian bytes) to the nearest f64.
fn decimal_to_f64(bytes: &[u8; 16]) -> f64 {
    let bits = u128::from_le_bytes(*bytes);
    let negative = bits >> 127 == 1;
    let combination = (bits >> 122) & 0b1_1111;
    let (exponent, coefficient) = match combination {
        0b1_1111 => return f64::NAN,
        0b1_1110 => {
            return if negative {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            };
        }
        // Large-coefficient form: always above 10^34 - 1, so non-canonical and read as zero.
        c if c >> 3 == 0b11 => ((bits >> 111) & 0x3fff, 0),
        _ => ((bits >> 113) & 0x3fff, bits & ((1u128 << 113) - 1)),
    };
    let exponent = exponent as i32 - 6176;
    let magnitude = if coefficient == 0 {
        0.0
    } else {
        format!("{coefficient}e{exponent}")
            .parse::<f64>()
            .unwrap_or(f64::INFINITY)
    };
    if negative { -magnitude } else { magnitude }
}

/// Total order on doubles with NaN below every other number.
fn compare_f64(x: f64, y: f64) -> Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

fn text(value: &Bson) -> Option<&str> {
    match value {
        Bson::String(s) | Bson::Symbol(s) => Some(s),
        _ => None,
    }
}

pub(super) fn compare(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    let (Some(x), Some(y)) = (a, b) else {
        return Ordering::Equal;
    };
    if let (Some(x), Some(y)) = (numeric(x), numeric(y)) {
        return compare_f64(x, y);
    }
    if let (Some(x), Some(y)) = (text(x), text(y)) {
        return x.cmp(y);
    }
    match (x, y) {
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => {
            x.timestamp_millis().cmp(&y.timestamp_millis())
        }
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            (x.time, x.increment).cmp(&(y.time, y.increment))
        }
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{DateTime, Decimal128};

    #[test]
    fn missing_sorts_before_numbers_and_dates() {
        let n = Bson::Int32(5);
        let d = Bson::DateTime(DateTime::from_millis(0));
        assert_eq!(compare(None, Some(&n)), Ordering::Less);
        assert_eq!(compare(Some(&n), Some(&d)), Ordering::Less);
        assert_eq!(compare(Some(&Bson::Null), None), Ordering::Equal);
    }

    #[test]
    fn mixed_numeric_types_compare_by_value() {
        assert_eq!(
            compare(Some(&Bson::Int64(3)), Some(&Bson::Double(2.5))),
            Ordering::Greater
        );
        assert_eq!(
            compare(Some(&Bson::Int32(2)), Some(&Bson::Double(2.0))),
            Ordering::Equal
        );
    }

    #[test]
    fn dates_compare_chronologically() {
        let early = Bson::DateTime(DateTime::from_millis(1_000));
        let late = Bson::DateTime(DateTime::from_millis(2_000));
        assert_eq!(compare(Some(&early), Some(&late)), Ordering::Less);
    }

    fn decimal(coefficient: u128, exponent: i32) -> Bson {
        let bits = ((exponent + 6176) as u128) << 113 | coefficient;
        Bson::Decimal128(Decimal128::from_bytes(bits.to_le_bytes()))
    }

    #[test]
    fn nan_sorts_below_every_number() {
        let nan = Bson::Double(f64::NAN);
        let low = Bson::Double(f64::NEG_INFINITY);
        assert_eq!(compare(Some(&nan), Some(&low)), Ordering::Less);
        assert_eq!(compare(Some(&Bson::Int32(0)), Some(&nan)), Ordering::Greater);
        assert_eq!(compare(Some(&nan), Some(&nan)), Ordering::Equal);
    }

    #[test]
    fn sort_with_nan_keeps_numbers_in_order() {
        let mut values: Vec<Bson> = (0..200)
            .map(|i| {
                if i % 3 == 0 {
                    Bson::Double(f64::NAN)
                } else {
                    Bson::Int64((i * 7919) % 1000)
                }
            })
            .collect();
        values.sort_by(|a, b| compare(Some(a), Some(b)));

        let nans = values
            .iter()
            .take_while(|v| matches!(v, Bson::Double(x) if x.is_nan()))
            .count();
        assert_eq!(nans, 67);
        let rest: Vec<i64> = values[nans..]
            .iter()
            .map(|v| match v {
                Bson::Int64(n) => *n,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert!(rest.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn decimals_compare_by_value() {
        let d25 = decimal(25, 0);
        let d255 = decimal(255, -1);
        assert_eq!(compare(Some(&d25), Some(&Bson::Double(25.0))), Ordering::Equal);
        assert_eq!(compare(Some(&d255), Some(&Bson::Int32(26))), Ordering::Less);
        assert_eq!(compare(Some(&d255), Some(&d25)), Ordering::Greater);
        let negative = Bson::Decimal128(Decimal128::from_bytes(
            (1u128 << 127 | 6176u128 << 113 | 3).to_le_bytes(),
        ));
        assert_eq!(compare(Some(&negative), Some(&Bson::Int32(0))), Ordering::Less);
    }

    #[test]
    fn symbols_and_strings_compare_as_text() {
        let a = Bson::String("a".into());
        let b = Bson::Symbol("b".into());
        assert_eq!(compare(Some(&a), Some(&b)), Ordering::Less);
    }
}
