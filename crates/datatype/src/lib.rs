//! Element datatypes for streamed hardware operators.
//!
//! A [`DataType`] is a closed descriptor of how a single tensor element is
//! represented on the hardware side: its signedness, bit-width, whether it is
//! a floating-point format, and the range of values it can hold. Datatypes are
//! identified by canonical names such as `INT8`, `UINT23`, `BIPOLAR`,
//! `FIXED<8,4>` or `FLOAT32`; these names are what configuration files and
//! graph annotations carry, and [`DataType::from_str`](std::str::FromStr)
//! resolves them.
//!
//! Extrema are reported as `f64` because fixed-point and float formats have
//! non-integral bounds. Integer bounds stay exact up to 53 bits of magnitude.

pub mod errors;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub use errors::{Error, Result};

/// Representation of a single tensor element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    /// Single bit taking values `{0, 1}`.
    Binary,
    /// Single bit taking values `{-1, +1}`.
    Bipolar,
    /// Two bits taking values `{-1, 0, +1}`.
    Ternary,
    /// Two's complement signed integer of the given width.
    Int(u32),
    /// Unsigned integer of the given width.
    UInt(u32),
    /// Signed fixed-point number with `width` total and `int_width` integer bits.
    Fixed { width: u32, int_width: u32 },
    /// IEEE half precision.
    Float16,
    /// IEEE single precision.
    Float32,
}

impl DataType {
    /// Signed integer datatype, rejecting a zero width.
    pub fn int(width: u32) -> Result<Self> {
        if width == 0 {
            return Err(Error::ZeroWidth { kind: "INT" });
        }
        Ok(Self::Int(width))
    }

    /// Unsigned integer datatype, rejecting a zero width.
    pub fn uint(width: u32) -> Result<Self> {
        if width == 0 {
            return Err(Error::ZeroWidth { kind: "UINT" });
        }
        Ok(Self::UInt(width))
    }

    /// Signed fixed-point datatype.
    pub fn fixed(width: u32, int_width: u32) -> Result<Self> {
        if width == 0 {
            return Err(Error::ZeroWidth { kind: "FIXED" });
        }
        if int_width > width {
            return Err(Error::FixedPointWidth { width, int_width });
        }
        Ok(Self::Fixed { width, int_width })
    }

    /// Number of bits a single element occupies on a stream.
    pub fn bitwidth(&self) -> u32 {
        match *self {
            DataType::Binary | DataType::Bipolar => 1,
            DataType::Ternary => 2,
            DataType::Int(width) | DataType::UInt(width) => width,
            DataType::Fixed { width, .. } => width,
            DataType::Float16 => 16,
            DataType::Float32 => 32,
        }
    }

    pub fn signed(&self) -> bool {
        !matches!(self, DataType::Binary | DataType::UInt(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float16 | DataType::Float32)
    }

    /// Whether every representable value is an integer.
    pub fn is_integer(&self) -> bool {
        !self.is_float() && !matches!(self, DataType::Fixed { .. })
    }

    /// Smallest representable value.
    pub fn min(&self) -> f64 {
        match *self {
            DataType::Binary | DataType::UInt(_) => 0.0,
            DataType::Bipolar | DataType::Ternary => -1.0,
            DataType::Int(width) => -pow2(width.saturating_sub(1)),
            DataType::Fixed { int_width, .. } => {
                if int_width == 0 {
                    -0.5
                } else {
                    -pow2(int_width.saturating_sub(1))
                }
            }
            DataType::Float16 => -65504.0,
            DataType::Float32 => -(f32::MAX as f64),
        }
    }

    /// Largest representable value.
    pub fn max(&self) -> f64 {
        match *self {
            DataType::Binary | DataType::Bipolar | DataType::Ternary => 1.0,
            DataType::Int(width) => pow2(width.saturating_sub(1)) - 1.0,
            DataType::UInt(width) => pow2(width) - 1.0,
            DataType::Fixed { width, int_width } => {
                let frac_bits = width.saturating_sub(int_width) as f64;
                (pow2(width.saturating_sub(1)) - 1.0) * (-frac_bits).exp2()
            }
            DataType::Float16 => 65504.0,
            DataType::Float32 => f32::MAX as f64,
        }
    }

    /// Canonical name, the inverse of parsing.
    pub fn name(&self) -> String {
        match *self {
            DataType::Binary => "BINARY".to_string(),
            DataType::Bipolar => "BIPOLAR".to_string(),
            DataType::Ternary => "TERNARY".to_string(),
            DataType::Int(width) => format!("INT{width}"),
            DataType::UInt(width) => format!("UINT{width}"),
            DataType::Fixed { width, int_width } => format!("FIXED<{width},{int_width}>"),
            DataType::Float16 => "FLOAT16".to_string(),
            DataType::Float32 => "FLOAT32".to_string(),
        }
    }

    /// Spelling of the datatype in Vitis HLS C++ (`ap_int`, `ap_fixed`, ...).
    pub fn hls_type(&self) -> String {
        match *self {
            DataType::Binary => "ap_uint<1>".to_string(),
            DataType::Bipolar => "ap_int<1>".to_string(),
            DataType::Ternary => "ap_int<2>".to_string(),
            DataType::Int(width) => format!("ap_int<{width}>"),
            DataType::UInt(width) => format!("ap_uint<{width}>"),
            DataType::Fixed { width, int_width } => format!("ap_fixed<{width}, {int_width}>"),
            DataType::Float16 => "half".to_string(),
            DataType::Float32 => "float".to_string(),
        }
    }
}

fn pow2(exponent: u32) -> f64 {
    (exponent as f64).exp2()
}

/// Widths are plain ASCII digits so that a parsed name always round-trips.
fn parse_width(digits: &str, name: &str) -> Result<u32> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::UnknownName(name.to_string()));
    }
    digits
        .parse::<u32>()
        .map_err(|_| Error::UnknownName(name.to_string()))
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        match name {
            "BINARY" => return Ok(DataType::Binary),
            "BIPOLAR" => return Ok(DataType::Bipolar),
            "TERNARY" => return Ok(DataType::Ternary),
            "FLOAT16" => return Ok(DataType::Float16),
            "FLOAT32" => return Ok(DataType::Float32),
            _ => {}
        }

        if let Some(params) = name
            .strip_prefix("FIXED<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            let (width, int_width) = params
                .split_once(',')
                .ok_or_else(|| Error::UnknownName(name.to_string()))?;
            return DataType::fixed(parse_width(width, name)?, parse_width(int_width, name)?);
        }
        if let Some(width) = name.strip_prefix("UINT") {
            return DataType::uint(parse_width(width, name)?);
        }
        if let Some(width) = name.strip_prefix("INT") {
            return DataType::int(parse_width(width, name)?);
        }

        Err(Error::UnknownName(name.to_string()))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl TryFrom<String> for DataType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DataType> for String {
    fn from(value: DataType) -> Self {
        value.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_names() {
        assert_eq!("INT8".parse::<DataType>().unwrap(), DataType::Int(8));
        assert_eq!("UINT23".parse::<DataType>().unwrap(), DataType::UInt(23));
        assert_eq!("BIPOLAR".parse::<DataType>().unwrap(), DataType::Bipolar);
        assert_eq!(
            "FIXED<8,4>".parse::<DataType>().unwrap(),
            DataType::Fixed {
                width: 8,
                int_width: 4
            }
        );
        assert_eq!("FLOAT32".parse::<DataType>().unwrap(), DataType::Float32);
    }

    #[test]
    fn rejects_unknown_and_degenerate_names() {
        assert!(matches!(
            "INT".parse::<DataType>(),
            Err(Error::UnknownName(_))
        ));
        assert!(matches!(
            "int8".parse::<DataType>(),
            Err(Error::UnknownName(_))
        ));
        for name in ["INT+8", "UINT 8", "UINT-1", "FIXED<8, 4>", "FIXED< 8,4>"] {
            assert_eq!(
                name.parse::<DataType>(),
                Err(Error::UnknownName(name.to_string())),
                "{name}"
            );
        }
        assert_eq!(
            "UINT0".parse::<DataType>(),
            Err(Error::ZeroWidth { kind: "UINT" })
        );
        assert_eq!(
            "FIXED<4,6>".parse::<DataType>(),
            Err(Error::FixedPointWidth {
                width: 4,
                int_width: 6
            })
        );
    }

    #[test]
    fn integer_extrema() {
        let uint8 = DataType::UInt(8);
        assert_eq!(uint8.min(), 0.0);
        assert_eq!(uint8.max(), 255.0);
        assert!(!uint8.signed());

        let int8 = DataType::Int(8);
        assert_eq!(int8.min(), -128.0);
        assert_eq!(int8.max(), 127.0);
        assert!(int8.signed());
        assert!(int8.is_integer());
    }

    #[test]
    fn fixed_point_extrema_follow_fraction_bits() {
        let fixed = DataType::fixed(8, 4).unwrap();
        assert_eq!(fixed.min(), -8.0);
        assert_eq!(fixed.max(), 127.0 / 16.0);
        assert!(!fixed.is_integer());
        assert!(!fixed.is_float());
        assert_eq!(fixed.hls_type(), "ap_fixed<8, 4>");
    }

    #[test]
    fn hls_spelling() {
        assert_eq!(DataType::Int(4).hls_type(), "ap_int<4>");
        assert_eq!(DataType::UInt(32).hls_type(), "ap_uint<32>");
        assert_eq!(DataType::Binary.hls_type(), "ap_uint<1>");
        assert_eq!(DataType::Float32.hls_type(), "float");
        assert_eq!(DataType::Float32.bitwidth(), 32);
        assert!(DataType::Float16.is_float());
    }

    #[test]
    fn deserializes_from_config_strings() {
        #[derive(Deserialize)]
        struct Types {
            query: DataType,
            output: DataType,
        }

        let types: Types = toml::from_str("query = \"INT4\"\noutput = \"FIXED<16,8>\"").unwrap();
        assert_eq!(types.query, DataType::Int(4));
        assert_eq!(types.output.name(), "FIXED<16,8>");

        let json = serde_json::to_string(&DataType::UInt(23)).unwrap();
        assert_eq!(json, "\"UINT23\"");
        assert!(serde_json::from_str::<DataType>("\"UINT-1\"").is_err());
    }
}
