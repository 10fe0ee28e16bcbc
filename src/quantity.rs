//! The `{boxes, units}` stock measure and the rules for accepting one from callers.
use super::error::{StockError, StockResult};
use std::fmt;
use std::ops::Add;

/// A non-negative pair of box and loose-unit counts. Components never go negative;
/// a debit is expressed as a [`QuantityDelta`] and applied through [`Quantity::combine`].
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Quantity {
    #[n(0)]
    boxes: u64,
    #[n(1)]
    units: u64,
}

/// Signed change to a ledger entry. Both components share the sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityDelta {
    Credit(Quantity),
    Debit(Quantity),
}

/// Why a delta could not be applied to a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineError {
    Shortfall {
        available: Quantity,
        requested: Quantity,
    },
    Overflow,
}

impl CombineError {
    /// Attach the ledger location the failed delta was aimed at.
    pub fn at(self, location: &str) -> StockError {
        match self {
            CombineError::Shortfall {
                available,
                requested,
            } => StockError::InsufficientStock {
                location: location.to_string(),
                available,
                requested,
            },
            CombineError::Overflow => {
                StockError::invalid_quantity("quantity", format!("balance at {location} overflows"))
            }
        }
    }
}

/// Untyped quantity input, as handed over by a transport adapter.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawQuantity {
    #[default]
    Missing,
    Number(f64),
    Text(String),
    Parts {
        boxes: Option<f64>,
        units: Option<f64>,
    },
}

/// Options for [`Quantity::normalize_input`].
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions<'a> {
    pub allow_zero: bool,
    pub field: &'a str,
}

impl Default for NormalizeOptions<'_> {
    fn default() -> Self {
        Self {
            allow_zero: false,
            field: "quantity",
        }
    }
}

impl Quantity {
    pub const ZERO: Quantity = Quantity { boxes: 0, units: 0 };

    pub fn new(boxes: u64, units: u64) -> Self {
        Self { boxes, units }
    }
    pub fn boxes(&self) -> u64 {
        self.boxes
    }
    pub fn units(&self) -> u64 {
        self.units
    }
    pub fn is_zero(&self) -> bool {
        self.boxes == 0 && self.units == 0
    }

    /// Lenient read used for stored or legacy values: anything unusable becomes zero,
    /// fractional values are truncated and negatives clamp to zero.
    pub fn coerce(raw: &RawQuantity) -> Self {
        match raw {
            RawQuantity::Missing => Self::ZERO,
            RawQuantity::Number(value) => Self::new(0, to_non_negative_integer(*value)),
            RawQuantity::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Self::ZERO;
                }
                let value = trimmed.parse::<f64>().unwrap_or(f64::NAN);
                Self::new(0, to_non_negative_integer(value))
            }
            RawQuantity::Parts { boxes, units } => Self::new(
                to_non_negative_integer(boxes.unwrap_or(f64::NAN)),
                to_non_negative_integer(units.unwrap_or(f64::NAN)),
            ),
        }
    }

    /// Strict validation for write paths. Any present component must be a finite,
    /// non-negative whole number; an all-zero result is refused unless `allow_zero`.
    pub fn normalize_input(raw: &RawQuantity, options: NormalizeOptions<'_>) -> StockResult<Self> {
        let field = options.field;
        let quantity = match raw {
            RawQuantity::Missing => Self::ZERO,
            RawQuantity::Number(value) => Self::new(0, strict_component(*value, field)?),
            RawQuantity::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    Self::ZERO
                } else {
                    let value = trimmed
                        .parse::<f64>()
                        .map_err(|_| StockError::invalid_quantity(field, "must be a number"))?;
                    Self::new(0, strict_component(value, field)?)
                }
            }
            RawQuantity::Parts { boxes, units } => {
                let boxes = match boxes {
                    Some(value) => strict_component(*value, &format!("{field}.boxes"))?,
                    None => 0,
                };
                let units = match units {
                    Some(value) => strict_component(*value, &format!("{field}.units"))?,
                    None => 0,
                };
                Self::new(boxes, units)
            }
        };

        if !options.allow_zero && quantity.is_zero() {
            return Err(StockError::invalid_quantity(
                field,
                "amount must be greater than 0",
            ));
        }
        Ok(quantity)
    }

    pub fn negate(self) -> QuantityDelta {
        QuantityDelta::Debit(self)
    }

    /// Apply `delta` to this balance. A debit that would take either component below
    /// zero is a shortfall and leaves nothing changed.
    pub fn combine(self, delta: QuantityDelta) -> Result<Quantity, CombineError> {
        match delta {
            QuantityDelta::Credit(amount) => {
                match (
                    self.boxes.checked_add(amount.boxes),
                    self.units.checked_add(amount.units),
                ) {
                    (Some(boxes), Some(units)) => Ok(Quantity::new(boxes, units)),
                    _ => Err(CombineError::Overflow),
                }
            }
            QuantityDelta::Debit(amount) => {
                match (
                    self.boxes.checked_sub(amount.boxes),
                    self.units.checked_sub(amount.units),
                ) {
                    (Some(boxes), Some(units)) => Ok(Quantity::new(boxes, units)),
                    _ => Err(CombineError::Shortfall {
                        available: self,
                        requested: amount,
                    }),
                }
            }
        }
    }
}

/// Component-wise sum; saturates instead of wrapping.
impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity::new(
            self.boxes.saturating_add(rhs.boxes),
            self.units.saturating_add(rhs.units),
        )
    }
}

impl From<Quantity> for QuantityDelta {
    fn from(value: Quantity) -> Self {
        QuantityDelta::Credit(value)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} boxes / {} units", self.boxes, self.units)
    }
}

impl From<Quantity> for RawQuantity {
    fn from(value: Quantity) -> Self {
        RawQuantity::Parts {
            boxes: Some(value.boxes as f64),
            units: Some(value.units as f64),
        }
    }
}

impl From<f64> for RawQuantity {
    fn from(value: f64) -> Self {
        RawQuantity::Number(value)
    }
}

impl From<&str> for RawQuantity {
    fn from(value: &str) -> Self {
        RawQuantity::Text(value.to_string())
    }
}

fn to_non_negative_integer(value: f64) -> u64 {
    if !value.is_finite() {
        return 0;
    }
    // `as` saturates, so huge values clamp to u64::MAX and negatives to 0
    value.trunc().max(0.0) as u64
}

fn strict_component(value: f64, field: &str) -> StockResult<u64> {
    if !value.is_finite() {
        return Err(StockError::invalid_quantity(field, "must be a finite number"));
    }
    if value < 0.0 {
        return Err(StockError::invalid_quantity(field, "must not be negative"));
    }
    if value.fract() != 0.0 {
        return Err(StockError::invalid_quantity(field, "must be a whole number"));
    }
    if value >= u64::MAX as f64 {
        return Err(StockError::invalid_quantity(field, "is too large"));
    }
    Ok(value as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn parts(boxes: f64, units: f64) -> RawQuantity {
        RawQuantity::Parts {
            boxes: Some(boxes),
            units: Some(units),
        }
    }

    #[test]
    fn coerce_defaults_missing_to_zero() {
        assert_eq!(Quantity::coerce(&RawQuantity::Missing), Quantity::ZERO);
        assert_eq!(Quantity::coerce(&"  ".into()), Quantity::ZERO);
    }

    #[test]
    fn coerce_bare_numbers_become_units() {
        assert_eq!(Quantity::coerce(&7.9.into()), Quantity::new(0, 7));
        assert_eq!(Quantity::coerce(&"12".into()), Quantity::new(0, 12));
        assert_eq!(Quantity::coerce(&(-3.0).into()), Quantity::ZERO);
        assert_eq!(Quantity::coerce(&"abc".into()), Quantity::ZERO);
    }

    #[test]
    fn coerce_parts_independently() {
        let raw = RawQuantity::Parts {
            boxes: Some(2.7),
            units: Some(f64::INFINITY),
        };
        assert_eq!(Quantity::coerce(&raw), Quantity::new(2, 0));
        let raw = RawQuantity::Parts {
            boxes: None,
            units: Some(-1.0),
        };
        assert_eq!(Quantity::coerce(&raw), Quantity::ZERO);
    }

    #[test]
    fn normalize_rejects_fractions_negatives_and_nan() {
        for raw in [parts(1.5, 0.0), parts(-1.0, 2.0), parts(f64::NAN, 1.0)] {
            let err = Quantity::normalize_input(&raw, NormalizeOptions::default()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[test]
    fn normalize_rejects_zero_unless_allowed() {
        let zero = parts(0.0, 0.0);
        let err = Quantity::normalize_input(&zero, NormalizeOptions::default()).unwrap_err();
        assert!(err.to_string().contains("greater than 0"));

        let allowed = NormalizeOptions {
            allow_zero: true,
            field: "stock",
        };
        assert_eq!(Quantity::normalize_input(&zero, allowed).unwrap(), Quantity::ZERO);
    }

    #[test]
    fn normalize_names_the_offending_component() {
        let err = Quantity::normalize_input(&parts(1.0, 0.5), NormalizeOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("quantity.units"));
    }

    #[test]
    fn normalize_accepts_text() {
        let q = Quantity::normalize_input(&" 4 ".into(), NormalizeOptions::default()).unwrap();
        assert_eq!(q, Quantity::new(0, 4));
        assert!(Quantity::normalize_input(&"four".into(), NormalizeOptions::default()).is_err());
    }

    #[test]
    fn combine_debit_checks_each_component() {
        let base = Quantity::new(2, 5);
        assert_eq!(
            base.combine(Quantity::new(1, 5).negate()),
            Ok(Quantity::new(1, 0))
        );
        // boxes suffice, units do not
        assert!(matches!(
            base.combine(Quantity::new(1, 6).negate()),
            Err(CombineError::Shortfall { .. })
        ));
    }

    #[test]
    fn combine_credit_adds() {
        let base = Quantity::new(1, 1);
        assert_eq!(base.combine(Quantity::new(2, 3).into()), Ok(Quantity::new(3, 4)));
        assert_eq!(
            Quantity::new(u64::MAX, 0).combine(Quantity::new(1, 0).into()),
            Err(CombineError::Overflow)
        );
    }
}
