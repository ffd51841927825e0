use serde::Serialize;

use crate::LineKind;

/// Upper bound accepted for any scrap factor.
pub const MAX_SCRAP_FACTOR: f64 = 1.0;

/// Validated scrap factor in `[0, MAX_SCRAP_FACTOR]`.
#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct ScrapFactor(f64);

impl ScrapFactor {
    pub const ZERO: Self = Self(0.0);

    pub fn new(value: f64) -> Result<Self, ScrapFactorError> {
        if value.is_finite() && (0.0..=MAX_SCRAP_FACTOR).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ScrapFactorError::OutOfRange { value })
        }
    }

    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for ScrapFactor {
    type Error = ScrapFactorError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, derive_more::Display, derive_more::Error)]
pub enum ScrapFactorError {
    #[display("scrap factor {value} outside [0, 1]")]
    OutOfRange { value: f64 },
    #[display("line `{kind}` has no scrap factor")]
    Unsupported { kind: LineKind },
}
