//! Occurrence bounds
//!
//! Every particle of a content model carries `minOccurs`/`maxOccurs`
//! bounds. This module holds the bounds type, the attribute parser used by
//! the XSD reader and the range arithmetic the restriction check relies on.

use crate::error::{ParseError, Result};

/// Occurrence bounds for a particle (minOccurs, maxOccurs)
/// None for max means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Occurs {
    /// Minimum number of occurrences (default 1)
    pub min: u32,
    /// Maximum number of occurrences (None = unbounded, default 1)
    pub max: Option<u32>,
}

impl Occurs {
    /// Create new occurrence bounds
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// Default occurrence (1, 1)
    pub fn once() -> Self {
        Self { min: 1, max: Some(1) }
    }

    /// Optional occurrence (0, 1)
    pub fn optional() -> Self {
        Self { min: 0, max: Some(1) }
    }

    /// Zero or more (0, unbounded)
    pub fn zero_or_more() -> Self {
        Self { min: 0, max: None }
    }

    /// One or more (1, unbounded)
    pub fn one_or_more() -> Self {
        Self { min: 1, max: None }
    }

    /// Whether no occurrence is required
    pub fn is_emptiable(&self) -> bool {
        self.min == 0
    }

    /// Whether the particle is prohibited (maxOccurs == 0)
    pub fn is_empty(&self) -> bool {
        self.max == Some(0)
    }

    /// Whether `count` occurrences fall short of the minimum
    pub fn is_missing(&self, count: u32) -> bool {
        count < self.min
    }

    /// Whether `count` occurrences leave no room for another one
    pub fn is_over(&self, count: u32) -> bool {
        match self.max {
            Some(max) => count >= max,
            None => false,
        }
    }

    /// Whether `count` occurrences exceed the maximum
    pub fn is_exceeded(&self, count: u32) -> bool {
        match self.max {
            Some(max) => count > max,
            None => false,
        }
    }

    /// Whether these bounds are a valid restriction of `other`
    pub fn has_occurs_restriction(&self, other: &Occurs) -> bool {
        if self.min < other.min {
            return false;
        }
        if self.is_empty() {
            return true;
        }
        match (self.max, other.max) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(mine), Some(theirs)) => mine <= theirs,
        }
    }
}

impl Default for Occurs {
    fn default() -> Self {
        Self::once()
    }
}

impl std::fmt::Display for Occurs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.max {
            Some(max) => write!(f, "[{}..{}]", self.min, max),
            None => write!(f, "[{}..unbounded]", self.min),
        }
    }
}

/// Parse minOccurs/maxOccurs from XML attribute values
pub fn parse_occurs(min_occurs: Option<&str>, max_occurs: Option<&str>) -> Result<Occurs> {
    let mut occurs = Occurs::once();

    if let Some(min_str) = min_occurs {
        occurs.min = min_str.trim().parse::<u32>().map_err(|_| {
            ParseError::new(format!(
                "minOccurs value '{}' is not a valid non-negative integer",
                min_str
            ))
        })?;
    }

    match max_occurs.map(str::trim) {
        Some("unbounded") => occurs.max = None,
        Some(max_str) => {
            let max = max_str.parse::<u32>().map_err(|_| {
                ParseError::new(format!(
                    "maxOccurs value '{}' must be a non-negative integer or 'unbounded'",
                    max_str
                ))
            })?;
            if occurs.min > max {
                return Err(ParseError::new(
                    "maxOccurs must be 'unbounded' or greater than minOccurs",
                )
                .into());
            }
            occurs.max = Some(max);
        }
        None => {
            if occurs.min > 1 {
                return Err(
                    ParseError::new("minOccurs must be lesser or equal than maxOccurs").into(),
                );
            }
        }
    }

    Ok(occurs)
}

/// Accumulator for the total occurrence range of a model group
#[derive(Debug, Clone, Copy)]
pub struct OccursCalculator {
    /// Calculated minimum occurrences
    pub min_occurs: u32,
    /// Calculated maximum occurrences (None = unbounded)
    pub max_occurs: Option<u32>,
}

impl OccursCalculator {
    /// Create a new calculator initialized to (0, 0)
    pub fn new() -> Self {
        Self {
            min_occurs: 0,
            max_occurs: Some(0),
        }
    }

    /// Get as Occurs
    pub fn occurs(&self) -> Occurs {
        Occurs::new(self.min_occurs, self.max_occurs)
    }

    /// Add another particle's range (sequence and all members)
    pub fn add(&mut self, other: Occurs) {
        self.min_occurs = self.min_occurs.saturating_add(other.min);
        self.max_occurs = match (self.max_occurs, other.max) {
            (Some(a), Some(b)) => Some(a.saturating_add(b)),
            _ => None,
        };
    }

    /// Widen to cover another alternative (choice members)
    pub fn alternative(&mut self, other: Occurs, first: bool) {
        if first {
            self.min_occurs = other.min;
            self.max_occurs = other.max;
            return;
        }
        self.min_occurs = self.min_occurs.min(other.min);
        self.max_occurs = match (self.max_occurs, other.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            _ => None,
        };
    }

    /// Scale by the enclosing group's own bounds
    pub fn multiply(&mut self, other: Occurs) {
        self.min_occurs = self.min_occurs.saturating_mul(other.min);
        self.max_occurs = match (self.max_occurs, other.max) {
            (Some(0), _) | (_, Some(0)) => Some(0),
            (Some(a), Some(b)) => Some(a.saturating_mul(b)),
            _ => None,
        };
    }
}

impl Default for OccursCalculator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occurs_presets() {
        assert_eq!(Occurs::once(), Occurs::new(1, Some(1)));
        assert_eq!(Occurs::optional(), Occurs::new(0, Some(1)));
        assert_eq!(Occurs::zero_or_more(), Occurs::new(0, None));
        assert_eq!(Occurs::one_or_more(), Occurs::new(1, None));
        assert_eq!(Occurs::default(), Occurs::once());
    }

    #[test]
    fn test_occurs_counting() {
        let occurs = Occurs::new(2, Some(5));
        assert!(occurs.is_missing(1));
        assert!(!occurs.is_missing(2));
        assert!(!occurs.is_over(4));
        assert!(occurs.is_over(5));
        assert!(!occurs.is_exceeded(5));
        assert!(occurs.is_exceeded(6));
        assert!(!Occurs::zero_or_more().is_over(u32::MAX));
    }

    #[test]
    fn test_occurs_restriction() {
        let base = Occurs::new(1, Some(3));
        assert!(Occurs::new(1, Some(3)).has_occurs_restriction(&base));
        assert!(Occurs::new(2, Some(2)).has_occurs_restriction(&base));
        assert!(!Occurs::new(0, Some(3)).has_occurs_restriction(&base));
        assert!(!Occurs::new(1, Some(4)).has_occurs_restriction(&base));
        assert!(!Occurs::one_or_more().has_occurs_restriction(&base));
        assert!(Occurs::new(5, None).has_occurs_restriction(&Occurs::one_or_more()));
    }

    #[test]
    fn test_parse_occurs() {
        assert_eq!(parse_occurs(None, None).unwrap(), Occurs::once());
        assert_eq!(
            parse_occurs(Some("0"), Some("unbounded")).unwrap(),
            Occurs::zero_or_more()
        );
        assert_eq!(parse_occurs(Some("2"), Some("4")).unwrap(), Occurs::new(2, Some(4)));
        assert!(parse_occurs(Some("-1"), None).is_err());
        assert!(parse_occurs(Some("3"), Some("2")).is_err());
        assert!(parse_occurs(Some("2"), None).is_err());
        assert!(parse_occurs(None, Some("many")).is_err());
    }

    #[test]
    fn test_calculator() {
        let mut calc = OccursCalculator::new();
        calc.add(Occurs::once());
        calc.add(Occurs::optional());
        assert_eq!(calc.occurs(), Occurs::new(1, Some(2)));
        calc.multiply(Occurs::zero_or_more());
        assert_eq!(calc.occurs(), Occurs::new(0, None));

        let mut choice = OccursCalculator::new();
        choice.alternative(Occurs::new(2, Some(2)), true);
        choice.alternative(Occurs::optional(), false);
        assert_eq!(choice.occurs(), Occurs::new(0, Some(2)));
    }
}
