//! Distance metrics a collection can be created with.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Distance metric of a collection. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Metric {
    /// Squared Euclidean distance: `sum((a - b)^2)`.
    #[default]
    SquaredEuclidean,
    /// Cosine distance: `1 - cos(a, b)`.
    Cosine,
    /// Inner-product distance: `1 - dot(a, b)`.
    InnerProduct,
}

impl Metric {
    /// Short name used on the command line and in configuration files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SquaredEuclidean => "l2",
            Self::Cosine => "cosine",
            Self::InnerProduct => "ip",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l2" | "euclidean" | "squared-euclidean" => Ok(Self::SquaredEuclidean),
            "cosine" | "cos" => Ok(Self::Cosine),
            "ip" | "dot" | "inner-product" => Ok(Self::InnerProduct),
            other => Err(CoreError::Parse(format!("unknown metric '{other}' (expected l2, cosine or ip)"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_names() {
        assert_eq!("l2".parse::<Metric>().expect("l2"), Metric::SquaredEuclidean);
        assert_eq!("Cosine".parse::<Metric>().expect("cosine"), Metric::Cosine);
        assert_eq!("inner-product".parse::<Metric>().expect("ip"), Metric::InnerProduct);
        assert!("manhattan".parse::<Metric>().is_err());
    }

    #[test]
    fn display_matches_parse() {
        for m in [Metric::SquaredEuclidean, Metric::Cosine, Metric::InnerProduct] {
            assert_eq!(m.to_string().parse::<Metric>().expect("roundtrip"), m);
        }
    }
}
