//! Calibration ranges and the scale/unit rules shared by the codec and the
//! calibration store.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::RangeError;

/// How a raw optimizer value maps onto the simulator's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    /// Real value is `floor(raw)`.
    #[default]
    Linear,
    /// Raw value is an exponent: real value is `2^floor(raw)`.
    Log2,
}

impl Scale {
    pub fn parse(s: &str) -> Result<Self, RangeError> {
        match s {
            "linear" => Ok(Self::Linear),
            "log2" => Ok(Self::Log2),
            other => Err(RangeError::UnknownScale {
                scale: other.to_string(),
            }),
        }
    }

    /// Decode a raw value into the number the simulator sees, rendered without
    /// a unit.
    pub fn realize_number(&self, raw: f64) -> String {
        let floored = raw.floor();
        match self {
            Self::Linear => format_integral(floored),
            Self::Log2 => {
                if (0.0..=127.0).contains(&floored) {
                    (1u128 << floored as u32).to_string()
                } else {
                    format_float(floored.exp2())
                }
            }
        }
    }

    /// Decode a raw value and append `unit` verbatim.
    pub fn realize(&self, raw: f64, unit: Option<&str>) -> String {
        let mut out = self.realize_number(raw);
        if let Some(unit) = unit {
            out.push_str(unit);
        }
        out
    }

    /// Inverse of [`Scale::realize`]: strip the unit and recover the raw value
    /// (the exponent for `Log2`). Returns `None` when `text` is not a number.
    pub fn unrealize(&self, text: &str, unit: Option<&str>) -> Option<f64> {
        let trimmed = text.trim();
        let number = match unit {
            Some(unit) if !unit.is_empty() => trimmed.strip_suffix(unit).unwrap_or(trimmed),
            _ => trimmed,
        };
        let value: f64 = number.trim().parse().ok()?;
        if !value.is_finite() {
            return None;
        }
        match self {
            Self::Linear => Some(value.floor()),
            Self::Log2 => {
                if value <= 0.0 {
                    return None;
                }
                // Absorb float noise so exact powers of two map to their exponent.
                Some((value.log2() + 1e-9).floor())
            }
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::Log2 => write!(f, "log2"),
        }
    }
}

fn format_integral(value: f64) -> String {
    if value.abs() < i64::MAX as f64 {
        (value as i64).to_string()
    } else {
        format!("{value:.0}")
    }
}

fn format_float(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

/// One entry of the calibration-ranges document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRange {
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub scale: Scale,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub infinity_allowed: bool,
}

impl CalibrationRange {
    pub fn new(min: f64, max: f64, scale: Scale) -> Self {
        Self {
            min,
            max,
            scale,
            unit: None,
            infinity_allowed: false,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_infinity(mut self) -> Self {
        self.infinity_allowed = true;
        self
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// A one-point range: sampled as a constant.
    pub fn is_degenerate(&self) -> bool {
        self.min == self.max
    }

    pub fn validate(&self, key: &str) -> Result<(), RangeError> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(RangeError::InvalidRange {
                key: key.to_string(),
                message: format!("bounds must be finite (min {}, max {})", self.min, self.max),
            });
        }
        if self.min > self.max {
            return Err(RangeError::InvalidRange {
                key: key.to_string(),
                message: format!("min {} is greater than max {}", self.min, self.max),
            });
        }
        if self.is_degenerate() && self.infinity_allowed {
            return Err(RangeError::InvalidRange {
                key: key.to_string(),
                message: format!(
                    "min == max ({}) cannot also allow infinity",
                    self.min
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log2_concatenates_unit() {
        assert_eq!(Scale::Log2.realize(10.0, Some("MBps")), "1024MBps");
        assert_eq!(Scale::Log2.realize(8.0, Some("MBps")), "256MBps");
        assert_eq!(Scale::Log2.realize(22.0, Some("B")), "4194304B");
    }

    #[test]
    fn raw_values_are_floored() {
        assert_eq!(Scale::Log2.realize(8.9, None), "256");
        assert_eq!(Scale::Linear.realize(12.7, Some("ms")), "12ms");
        assert_eq!(Scale::Linear.realize(-0.5, None), "-1");
    }

    #[test]
    fn negative_exponents_render_fractions() {
        assert_eq!(Scale::Log2.realize(-3.0, Some("s")), "0.125s");
    }

    #[test]
    fn unrealize_reverses_log2() {
        for e in 0..=40 {
            let text = Scale::Log2.realize(e as f64, Some("MBps"));
            assert_eq!(Scale::Log2.unrealize(&text, Some("MBps")), Some(e as f64));
        }
    }

    #[test]
    fn unrealize_rejects_garbage() {
        assert_eq!(Scale::Linear.unrealize("fast", None), None);
        assert_eq!(Scale::Log2.unrealize("0B", Some("B")), None);
    }

    #[test]
    fn scale_serde_names() {
        let range: CalibrationRange = serde_json::from_str(
            r#"{"min": 6, "max": 10, "scale": "log2", "unit": "MBps"}"#,
        )
        .unwrap();
        assert_eq!(range.scale, Scale::Log2);
        assert_eq!(range.unit(), Some("MBps"));
        assert!(!range.infinity_allowed);
        assert!(Scale::parse("cubic").is_err());
    }

    #[test]
    fn validate_rejects_contradictions() {
        assert!(CalibrationRange::new(10.0, 6.0, Scale::Linear)
            .validate("x")
            .is_err());
        assert!(CalibrationRange::new(5.0, 5.0, Scale::Linear)
            .with_infinity()
            .validate("BUFFER_SIZE")
            .is_err());
        assert!(CalibrationRange::new(5.0, 5.0, Scale::Linear)
            .validate("x")
            .is_ok());
    }
}
