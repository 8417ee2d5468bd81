//! Module: source
//! Responsibility: the total order over configuration sources.
//! Boundary: every "is this change allowed" decision in the crate goes through here.
//!
//! Invariants:
//! - `Convention < DataAnnotation < Explicit`.
//! - An absent recorded source is overridden by anything.
//! - An absent requested source overrides only an absent recorded source.

use derive_more::Display;
use serde::{Deserialize, Serialize};

///
/// ConfigurationSource
/// Authority of the input that proposed a piece of model configuration.
///

#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationSource {
    Convention,
    DataAnnotation,
    Explicit,
}

impl ConfigurationSource {
    /// Whether a change proposed by `self` may replace a value recorded by `recorded`.
    #[must_use]
    pub const fn overrides(self, recorded: Option<Self>) -> bool {
        match recorded {
            None => true,
            Some(recorded) => self as u8 >= recorded as u8,
        }
    }

    /// Whether `self` has strictly more authority than `recorded`.
    #[must_use]
    pub const fn overrides_strictly(self, recorded: Option<Self>) -> bool {
        match recorded {
            None => true,
            Some(recorded) => self as u8 > recorded as u8,
        }
    }

    /// Pick the higher of `self` and an optional recorded source.
    #[must_use]
    pub const fn max(self, other: Option<Self>) -> Self {
        match other {
            Some(other) if other as u8 > self as u8 => other,
            _ => self,
        }
    }

    #[must_use]
    pub const fn is_explicit(self) -> bool {
        matches!(self, Self::Explicit)
    }
}

/// `overrides` lifted to an optional requested source.
#[must_use]
pub const fn overrides(
    requested: Option<ConfigurationSource>,
    recorded: Option<ConfigurationSource>,
) -> bool {
    match requested {
        Some(requested) => requested.overrides(recorded),
        None => recorded.is_none(),
    }
}

/// `max` over two optional sources; absent is lowest.
#[must_use]
pub const fn max_source(
    a: Option<ConfigurationSource>,
    b: Option<ConfigurationSource>,
) -> Option<ConfigurationSource> {
    match (a, b) {
        (Some(a), b) => Some(a.max(b)),
        (None, b) => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConfigurationSource::{Convention, DataAnnotation, Explicit};

    const ALL: [ConfigurationSource; 3] = [Convention, DataAnnotation, Explicit];

    #[test]
    fn overrides_is_greater_or_equal() {
        for requested in ALL {
            for recorded in ALL {
                assert_eq!(
                    requested.overrides(Some(recorded)),
                    requested >= recorded,
                    "{requested} vs {recorded}"
                );
            }
        }
    }

    #[test]
    fn anything_overrides_absent() {
        for requested in ALL {
            assert!(requested.overrides(None));
            assert!(requested.overrides_strictly(None));
        }
        assert!(overrides(None, None));
        assert!(!overrides(None, Some(Convention)));
    }

    #[test]
    fn strict_override_excludes_equal() {
        assert!(!Convention.overrides_strictly(Some(Convention)));
        assert!(DataAnnotation.overrides_strictly(Some(Convention)));
        assert!(!DataAnnotation.overrides_strictly(Some(Explicit)));
    }

    #[test]
    fn max_treats_absent_as_lowest() {
        assert_eq!(max_source(None, None), None);
        assert_eq!(max_source(None, Some(Convention)), Some(Convention));
        assert_eq!(max_source(Some(Explicit), Some(Convention)), Some(Explicit));
        assert_eq!(Convention.max(Some(DataAnnotation)), DataAnnotation);
        assert_eq!(Explicit.max(None), Explicit);
    }
}
