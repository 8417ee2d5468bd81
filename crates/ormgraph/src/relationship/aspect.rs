use crate::source::ConfigurationSource;

///
/// Aspect
///
/// A value paired with the source that last configured it. An aspect
/// without a recorded source still holds its default value.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Aspect<T> {
    value: T,
    source: Option<ConfigurationSource>,
}

///
/// SetOutcome
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SetOutcome<T> {
    /// `source` could not override the recorded source.
    Rejected,
    /// Value already matched; only the recorded source moved up.
    Upgraded,
    Changed { previous: T },
}

impl<T> SetOutcome<T> {
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

impl<T: Clone + PartialEq> Aspect<T> {
    /// Default value, no recorded source.
    pub const fn new(value: T) -> Self {
        Self {
            value,
            source: None,
        }
    }

    pub const fn with_source(value: T, source: ConfigurationSource) -> Self {
        Self {
            value,
            source: Some(source),
        }
    }

    pub const fn value(&self) -> &T {
        &self.value
    }

    pub const fn source(&self) -> Option<ConfigurationSource> {
        self.source
    }

    /// Pure twin of `try_set`.
    pub fn can_set(&self, value: &T, source: ConfigurationSource) -> bool {
        *value == self.value || source.overrides(self.source)
    }

    /// Equal value: record the higher source. Different value: apply it if
    /// `source` overrides the recorded one.
    pub fn try_set(&mut self, value: T, source: ConfigurationSource) -> SetOutcome<T> {
        if value == self.value {
            self.upgrade(source);
            return SetOutcome::Upgraded;
        }
        if !source.overrides(self.source) {
            return SetOutcome::Rejected;
        }

        let previous = std::mem::replace(&mut self.value, value);
        self.source = Some(source);

        SetOutcome::Changed { previous }
    }

    pub fn upgrade(&mut self, source: ConfigurationSource) {
        self.source = Some(source.max(self.source));
    }

    /// Put the value back to `value` and forget the recorded source.
    pub fn reset(&mut self, value: T) {
        self.value = value;
        self.source = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConfigurationSource::{Convention, DataAnnotation, Explicit};

    #[test]
    fn unrecorded_aspect_accepts_anything() {
        let mut unique = Aspect::new(false);
        assert!(unique.can_set(&true, Convention));
        assert_eq!(
            unique.try_set(true, Convention),
            SetOutcome::Changed { previous: false }
        );
        assert_eq!(unique.source(), Some(Convention));
    }

    #[test]
    fn lower_source_is_rejected_without_change() {
        let mut required = Aspect::with_source(true, DataAnnotation);
        assert!(!required.can_set(&false, Convention));
        assert_eq!(required.try_set(false, Convention), SetOutcome::Rejected);
        assert!(*required.value());
        assert_eq!(required.source(), Some(DataAnnotation));
    }

    #[test]
    fn equal_value_upgrades_but_never_downgrades() {
        let mut owned = Aspect::with_source(true, DataAnnotation);
        assert_eq!(owned.try_set(true, Explicit), SetOutcome::Upgraded);
        assert_eq!(owned.source(), Some(Explicit));

        assert_eq!(owned.try_set(true, Convention), SetOutcome::Upgraded);
        assert_eq!(owned.source(), Some(Explicit));
    }

    #[test]
    fn reset_forgets_source() {
        let mut unique = Aspect::with_source(true, Explicit);
        unique.reset(false);
        assert!(!*unique.value());
        assert_eq!(unique.source(), None);
        assert!(unique.can_set(&true, Convention));
    }
}
