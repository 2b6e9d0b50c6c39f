//! Tri-valued resolution state for the gate's session and profile axes.

use serde::Serialize;

use crate::identity::Session;
use crate::onboarding::model::ProfileRecord;

/// What the gate knows about one input.
///
/// `Unresolved` (lookup in flight) is distinct from `Absent` (lookup
/// finished, nothing there).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Resolution<T> {
    Unresolved,
    Absent,
    Present(T),
}

impl<T> Resolution<T> {
    pub fn present(&self) -> Option<&T> {
        match self {
            Self::Present(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> Default for Resolution<T> {
    fn default() -> Self {
        Self::Unresolved
    }
}

impl<T> From<Option<T>> for Resolution<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Present(v),
            None => Self::Absent,
        }
    }
}

/// Per-gate view of both axes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GateResolution {
    pub session: Resolution<Session>,
    pub profile: Resolution<ProfileRecord>,
}

impl GateResolution {
    /// Both axes back to `Unresolved`.
    pub fn reset(&mut self) {
        self.session = Resolution::Unresolved;
        self.profile = Resolution::Unresolved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unresolved() {
        let res = GateResolution::default();
        assert_eq!(res.session, Resolution::Unresolved);
        assert_eq!(res.profile, Resolution::Unresolved);
    }

    #[test]
    fn option_maps_to_absent_or_present() {
        assert_eq!(Resolution::from(None::<u8>), Resolution::Absent);
        assert_eq!(Resolution::from(Some(3u8)), Resolution::Present(3));
        assert_eq!(Resolution::Present(3u8).present(), Some(&3));
        assert_eq!(Resolution::<u8>::Absent.present(), None);
    }
}
