//! Arbitrary-precision decimal numbers.
//!
//! A [`Number`] is held in the narrowest exact representation: a signed
//! 64-bit integer, an unsigned 64-bit integer, an IEEE double, or a
//! [`BigUint`] mantissa scaled by a power of ten. The representation is
//! canonical, so two numbers are equal exactly when their representations are.
//!
//! A decimal counts as a double only when it has the same value as that
//! double. `0.5` and `18446744073709551616` are doubles; `0.1` is not, since
//! the nearest double is `0.1000000000000000055511151231257827021181583404541015625`.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::ToPrimitive;

use super::AttributePath;
use crate::error::Error;

/// Beyond this many places of exponent, [`fmt::Display`] switches to
/// scientific notation instead of writing every zero.
const PLAIN_EXPONENT_LIMIT: u64 = 1000;

/// Leading-digit positions past the largest double.
const MAX_DOUBLE_MAGNITUDE: i64 = 310;

/// Leading-digit positions below the smallest subnormal double.
const MIN_DOUBLE_MAGNITUDE: i64 = -330;

/// An arbitrary-precision number. NaN is not representable.
#[derive(Debug, Clone, PartialEq)]
pub struct Number(Repr);

#[derive(Debug, Clone, PartialEq)]
enum Repr {
    Int(i64),
    /// Only values above `i64::MAX`.
    UInt(u64),
    /// Finite values a double holds exactly that are not 64-bit integers, and
    /// the infinities.
    Float(f64),
    Big(Decimal),
}

/// `±mantissa × 10^exponent`. The mantissa is never zero and never a
/// multiple of ten. `exponent + precision` always fits in an `i64`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Decimal {
    negative: bool,
    mantissa: BigUint,
    exponent: i64,
    /// Number of decimal digits in the mantissa.
    precision: i64,
}

impl Eq for Number {}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Repr::Int(v) => {
                state.write_u8(0);
                v.hash(state);
            }
            Repr::UInt(v) => {
                state.write_u8(1);
                v.hash(state);
            }
            Repr::Float(v) => {
                state.write_u8(2);
                v.to_bits().hash(state);
            }
            Repr::Big(d) => {
                state.write_u8(3);
                d.hash(state);
            }
        }
    }
}

impl Number {
    /// Build a number from a double. Returns `None` for NaN.
    pub fn from_f64(value: f64) -> Option<Self> {
        if value.is_nan() {
            return None;
        }
        if value.is_finite() && value.fract() == 0.0 {
            if (-9_223_372_036_854_775_808.0..9_223_372_036_854_775_808.0).contains(&value) {
                return Some(Self(Repr::Int(value as i64)));
            }
            if (0.0..18_446_744_073_709_551_616.0).contains(&value) {
                return Some(Self(Repr::UInt(value as u64)));
            }
        }
        Some(Self(Repr::Float(value)))
    }

    /// The value as an `i64`, if it is an integer in range.
    pub fn as_i64(&self) -> Option<i64> {
        match self.0 {
            Repr::Int(v) => Some(v),
            _ => None,
        }
    }

    /// The value as a `u64`, if it is a non-negative integer in range.
    pub fn as_u64(&self) -> Option<u64> {
        match self.0 {
            Repr::Int(v) => u64::try_from(v).ok(),
            Repr::UInt(v) => Some(v),
            _ => None,
        }
    }

    /// The value as an `f64`, if a double represents it exactly.
    pub fn as_f64(&self) -> Option<f64> {
        match self.0 {
            Repr::Int(v) => {
                let f = v as f64;
                (f >= -9_223_372_036_854_775_808.0
                    && f < 9_223_372_036_854_775_808.0
                    && f as i64 == v)
                    .then_some(f)
            }
            Repr::UInt(v) => {
                let f = v as f64;
                (f < 18_446_744_073_709_551_616.0 && f as u64 == v).then_some(f)
            }
            Repr::Float(f) => Some(f),
            Repr::Big(_) => None,
        }
    }

    /// The nearest double to this value.
    pub fn to_f64_lossy(&self) -> f64 {
        match &self.0 {
            Repr::Int(v) => *v as f64,
            Repr::UInt(v) => *v as f64,
            Repr::Float(f) => *f,
            Repr::Big(d) => d.nearest_f64(),
        }
    }

    /// Whether the value is a whole number.
    pub fn is_integer(&self) -> bool {
        match &self.0 {
            Repr::Int(_) | Repr::UInt(_) => true,
            Repr::Float(f) => f.is_finite() && f.fract() == 0.0,
            Repr::Big(d) => d.exponent >= 0,
        }
    }

    /// Whether the value is positive or negative infinity.
    pub fn is_infinite(&self) -> bool {
        matches!(self.0, Repr::Float(f) if f.is_infinite())
    }

    /// Whether the value is below zero.
    pub fn is_negative(&self) -> bool {
        match &self.0 {
            Repr::Int(v) => *v < 0,
            Repr::UInt(_) => false,
            Repr::Float(f) => *f < 0.0,
            Repr::Big(d) => d.negative,
        }
    }

    /// The value as a JSON number. Infinities have no JSON form.
    pub fn to_json_number(&self) -> Option<serde_json::Number> {
        if self.is_infinite() {
            return None;
        }
        serde_json::Number::from_str(&self.to_string()).ok()
    }

    fn canonical(decimal: Decimal) -> Self {
        if let Some(repr) = decimal.to_integer() {
            return Self(repr);
        }
        let nearest = decimal.nearest_f64();
        if Decimal::from_f64(nearest).as_ref() == Some(&decimal) {
            return Self(Repr::Float(nearest));
        }
        Self(Repr::Big(decimal))
    }
}

impl Decimal {
    /// Parse decimal text. Infinities are handled by the caller.
    fn parse(text: &str) -> Result<Option<Self>, &'static str> {
        let (negative, body) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let (mantissa, exponent) = match body.find(['e', 'E']) {
            Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
            None => (body, None),
        };
        let (int_part, frac_part) = match mantissa.find('.') {
            Some(pos) => (&mantissa[..pos], &mantissa[pos + 1..]),
            None => (mantissa, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err("missing digits");
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err("unexpected character");
        }
        let exponent: i64 = match exponent {
            Some(exp) => {
                let digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err("malformed exponent");
                }
                exp.parse().map_err(|_| "exponent out of range")?
            }
            None => 0,
        };
        let frac_len = i64::try_from(frac_part.len()).map_err(|_| "too many digits")?;
        let exponent = exponent
            .checked_sub(frac_len)
            .ok_or("exponent out of range")?;

        let mut digits = String::with_capacity(int_part.len() + frac_part.len());
        digits.push_str(int_part);
        digits.push_str(frac_part);
        Self::from_digits(negative, &digits, exponent)
    }

    /// Build from ASCII digits scaled by `10^exponent`, normalizing away
    /// leading and trailing zeros. Zero yields `None`.
    fn from_digits(
        negative: bool,
        digits: &str,
        exponent: i64,
    ) -> Result<Option<Self>, &'static str> {
        let significant = digits.trim_start_matches('0');
        let trimmed = significant.trim_end_matches('0');
        if trimmed.is_empty() {
            return Ok(None);
        }
        let trailing =
            i64::try_from(significant.len() - trimmed.len()).map_err(|_| "too many digits")?;
        let precision = i64::try_from(trimmed.len()).map_err(|_| "too many digits")?;
        let exponent = exponent
            .checked_add(trailing)
            .ok_or("exponent out of range")?;
        exponent
            .checked_add(precision)
            .ok_or("exponent out of range")?;
        let mantissa =
            BigUint::parse_bytes(trimmed.as_bytes(), 10).ok_or("unexpected character")?;
        Ok(Some(Self {
            negative,
            mantissa,
            exponent,
            precision,
        }))
    }

    /// The exact decimal value of a finite, non-zero double.
    fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value == 0.0 {
            return None;
        }
        let bits = value.to_bits();
        let biased = ((bits >> 52) & 0x7ff) as i64;
        let fraction = bits & ((1 << 52) - 1);
        let (significand, exp2) = if biased == 0 {
            (fraction, -1074)
        } else {
            (fraction | (1 << 52), biased - 1075)
        };
        let shift = significand.trailing_zeros();
        let significand = BigUint::from(significand >> shift);
        let exp2 = exp2 + i64::from(shift);

        // m × 2^-k == (m × 5^k) × 10^-k
        let (magnitude, exponent) = if exp2 >= 0 {
            (significand << usize::try_from(exp2).ok()?, 0)
        } else {
            let five = BigUint::from(5_u8);
            (significand * five.pow(u32::try_from(exp2.unsigned_abs()).ok()?), exp2)
        };
        Self::from_digits(value < 0.0, &magnitude.to_str_radix(10), exponent)
            .ok()
            .flatten()
    }

    /// Position of the leading digit: the value lies in
    /// `[10^(adjusted-1), 10^adjusted)`.
    fn adjusted(&self) -> i64 {
        self.exponent.saturating_add(self.precision)
    }

    fn to_integer(&self) -> Option<Repr> {
        // 10^20 already exceeds u64::MAX.
        if self.exponent < 0 || self.adjusted() > 20 {
            return None;
        }
        let scale = BigUint::from(10_u8).pow(u32::try_from(self.exponent).ok()?);
        let magnitude = &self.mantissa * scale;
        if self.negative {
            BigInt::from_biguint(Sign::Minus, magnitude)
                .to_i64()
                .map(Repr::Int)
        } else if let Some(v) = magnitude.to_i64() {
            Some(Repr::Int(v))
        } else {
            magnitude.to_u64().map(Repr::UInt)
        }
    }

    fn nearest_f64(&self) -> f64 {
        let adjusted = self.adjusted();
        let magnitude = if adjusted > MAX_DOUBLE_MAGNITUDE {
            f64::INFINITY
        } else if adjusted < MIN_DOUBLE_MAGNITUDE {
            0.0
        } else {
            format!("{}e{}", self.mantissa, self.exponent)
                .parse()
                .unwrap_or(f64::NAN)
        };
        if self.negative {
            -magnitude
        } else {
            magnitude
        }
    }

    fn write_plain(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        let digits = self.mantissa.to_str_radix(10);
        let adjusted = self.adjusted();
        if self.exponent >= 0 {
            f.write_str(&digits)?;
            for _ in 0..self.exponent {
                f.write_str("0")?;
            }
        } else if adjusted > 0 {
            let point = usize::try_from(adjusted).map_err(|_| fmt::Error)?;
            write!(f, "{}.{}", &digits[..point], &digits[point..])?;
        } else {
            f.write_str("0.")?;
            for _ in 0..adjusted.unsigned_abs() {
                f.write_str("0")?;
            }
            f.write_str(&digits)?;
        }
        Ok(())
    }

    fn write_scientific(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        let digits = self.mantissa.to_str_radix(10);
        let exponent = self.adjusted() - 1;
        if digits.len() > 1 {
            write!(f, "{}.{}e{}", &digits[..1], &digits[1..], exponent)
        } else {
            write!(f, "{}e{}", digits, exponent)
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exponent.unsigned_abs() > PLAIN_EXPONENT_LIMIT {
            self.write_scientific(f)
        } else {
            self.write_plain(f)
        }
    }
}

impl FromStr for Number {
    type Err = Error;

    /// Parse decimal text, optionally in exponent form. `Inf`, `+Inf`,
    /// `-Inf`, and `Infinity` are accepted in any case.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let unsigned = text.trim_start_matches(['+', '-']);
        if unsigned.eq_ignore_ascii_case("inf") || unsigned.eq_ignore_ascii_case("infinity") {
            let negative = text.starts_with('-');
            return Ok(Self(Repr::Float(if negative {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            })));
        }
        match Decimal::parse(text) {
            Ok(Some(decimal)) => Ok(Self::canonical(decimal)),
            Ok(None) => Ok(Self(Repr::Int(0))),
            Err(reason) => Err(Error::decode_value(
                &AttributePath::new(),
                format!("invalid number {:?}: {}", text, reason),
            )),
        }
    }
}

/// Doubles print their exact decimal value, so the text parses back to the
/// same number.
impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::Int(v) => write!(f, "{}", v),
            Repr::UInt(v) => write!(f, "{}", v),
            Repr::Float(v) if v.is_infinite() => {
                f.write_str(if *v < 0.0 { "-Inf" } else { "+Inf" })
            }
            Repr::Float(v) => match Decimal::from_f64(*v) {
                Some(d) => fmt::Display::fmt(&d, f),
                None => f.write_str("0"),
            },
            Repr::Big(d) => fmt::Display::fmt(d, f),
        }
    }
}

macro_rules! number_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Number {
                fn from(v: $t) -> Self {
                    Self(Repr::Int(i64::from(v)))
                }
            }
        )*
    };
}

number_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Number {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(v) => Self(Repr::Int(v)),
            Err(_) => Self(Repr::UInt(v)),
        }
    }
}

impl From<usize> for Number {
    fn from(v: usize) -> Self {
        Self::from(v as u64)
    }
}

impl TryFrom<f64> for Number {
    type Error = Error;

    fn try_from(v: f64) -> Result<Self, Self::Error> {
        Self::from_f64(v).ok_or_else(|| {
            Error::decode_value(&AttributePath::new(), "NaN is not a valid number")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(text: &str) -> Number {
        text.parse().unwrap()
    }

    #[test]
    fn test_number_integers() {
        assert_eq!(n("42"), Number::from(42));
        assert_eq!(n("-7"), Number::from(-7));
        assert_eq!(n("0"), Number::from(0));
        assert_eq!(n("-0.000"), Number::from(0));
        assert_eq!(n("1e3"), Number::from(1000));
        assert_eq!(n("1500e-2"), Number::from(15));
        assert_eq!(n("18446744073709551615"), Number::from(u64::MAX));
        assert_eq!(n("-9223372036854775808"), Number::from(i64::MIN));
        assert_eq!(n("42").as_i64(), Some(42));
        assert_eq!(n("18446744073709551615").as_i64(), None);
        assert_eq!(n("18446744073709551615").as_u64(), Some(u64::MAX));
    }

    #[test]
    fn test_number_floats() {
        assert_eq!(n("1.5").as_f64(), Some(1.5));
        assert_eq!(n("1e20"), Number::from_f64(1e20).unwrap());
        assert_eq!(Number::from_f64(3.0).unwrap(), Number::from(3));
        assert!(Number::from_f64(f64::NAN).is_none());
        assert!(Number::try_from(f64::NAN).is_err());
    }

    #[test]
    fn test_number_double_matched_by_exact_value() {
        // 0.1 is not a double; its nearest double has a longer expansion.
        let tenth = Number::from_f64(0.1).unwrap();
        assert_ne!(n("0.1"), tenth);
        assert_eq!(n("0.1").as_f64(), None);

        let expansion = "0.1000000000000000055511151231257827021181583404541015625";
        assert_eq!(n(expansion), tenth);
        assert_eq!(n(expansion).as_f64(), Some(0.1));
        assert_eq!(tenth.to_string(), expansion);

        let two_pow_64 = n("18446744073709551616");
        assert_eq!(two_pow_64, Number::from_f64(18_446_744_073_709_551_616.0).unwrap());
        assert_eq!(two_pow_64.as_f64(), Some(18_446_744_073_709_551_616.0));
        assert_eq!(two_pow_64.as_u64(), None);
        assert_eq!(two_pow_64.to_string(), "18446744073709551616");

        // One past 2^64 needs 65 bits of mantissa.
        assert_eq!(n("18446744073709551617").as_f64(), None);

        let subnormal = Number::from_f64(5e-324).unwrap();
        assert_eq!(n(&subnormal.to_string()), subnormal);
        assert_eq!(n(&subnormal.to_string()).as_f64(), Some(5e-324));
    }

    #[test]
    fn test_number_extreme_exponents() {
        let err = "12e9223372036854775807".parse::<Number>().unwrap_err();
        assert!(matches!(err, Error::DecodeValue { .. }));
        assert!("1e9223372036854775807".parse::<Number>().is_err());
        assert!("1e9223372036854775808".parse::<Number>().is_err());
        assert!(".5e-9223372036854775808".parse::<Number>().is_err());

        let tiny = n("1e-9223372036854775808");
        assert!(!tiny.is_integer());
        assert_eq!(tiny.as_f64(), None);
        assert_eq!(tiny.to_f64_lossy(), 0.0);
        assert_eq!(tiny.to_string(), "1e-9223372036854775808");
        assert_eq!(n(&tiny.to_string()), tiny);

        let huge = n("-25e9223372036854775000");
        assert!(huge.is_negative());
        assert_eq!(huge.to_f64_lossy(), f64::NEG_INFINITY);
        assert_eq!(huge.to_string(), "-2.5e9223372036854775001");
    }

    #[test]
    fn test_number_hash_follows_equality() {
        use std::collections::hash_map::DefaultHasher;

        fn hash_of(number: &Number) -> u64 {
            let mut hasher = DefaultHasher::new();
            number.hash(&mut hasher);
            hasher.finish()
        }

        assert_eq!(hash_of(&n("1.50")), hash_of(&n("15e-1")));
        assert_eq!(hash_of(&n("1e3")), hash_of(&Number::from(1000)));
        assert_eq!(
            hash_of(&n("0.1000000000000000055511151231257827021181583404541015625")),
            hash_of(&Number::from_f64(0.1).unwrap())
        );
    }

    #[test]
    fn test_number_big_decimals() {
        let nines = "9".repeat(100);
        let big = n(&nines);
        assert_eq!(big.to_string(), nines);
        assert_eq!(big.as_f64(), None);
        assert_eq!(big.as_i64(), None);
        assert!(big.is_integer());

        let precise = n("0.10000000000000000000000001");
        assert_ne!(precise, n("0.1"));
        assert_eq!(precise.to_string(), "0.10000000000000000000000001");

        let tiny = n("-1.25e-30");
        assert!(tiny.is_negative());
        assert!(!tiny.is_integer());
    }

    #[test]
    fn test_number_canonical_equality() {
        assert_eq!(n("1.50"), n("15e-1"));
        assert_eq!(n("100000000000000000000000"), n("1e23"));
        assert_eq!(n("123456789012345678901234567890"), n("1.2345678901234567890123456789e29"));
    }

    #[test]
    fn test_number_display() {
        assert_eq!(n("1e23").to_string(), "100000000000000000000000");
        assert_eq!(n("-0.0005").to_string(), "-0.0005");
        assert_eq!(n("12.5").to_string(), "12.5");
        assert_eq!(n("1e-2000").to_string(), "1e-2000");
        assert_eq!(n("1.25e2000").to_string(), "1.25e2000");
    }

    #[test]
    fn test_number_infinity() {
        let inf = n("+Inf");
        assert!(inf.is_infinite());
        assert_eq!(inf.to_string(), "+Inf");
        assert_eq!(n("-infinity").to_string(), "-Inf");
        assert!(inf.to_json_number().is_none());
        assert_eq!(n("inf"), Number::from_f64(f64::INFINITY).unwrap());
    }

    #[test]
    fn test_number_parse_errors() {
        for text in ["", "-", "abc", "1.2.3", "1e", "1e+", "0x10", "NaN", " 1"] {
            assert!(text.parse::<Number>().is_err(), "{:?} should not parse", text);
        }
        assert!(".5".parse::<Number>().is_ok());
        assert!("5.".parse::<Number>().is_ok());
    }

    #[test]
    fn test_number_json() {
        let number = n("3.14159265358979323846264338327950288");
        let json = number.to_json_number().unwrap();
        assert_eq!(json.to_string(), "3.14159265358979323846264338327950288");
        assert_eq!(n(&json.to_string()), number);
    }

    #[test]
    fn test_number_lossy() {
        assert_eq!(n("0.10000000000000000000000001").to_f64_lossy(), 0.1);
        assert_eq!(Number::from(u64::MAX).to_f64_lossy(), u64::MAX as f64);
    }
}
