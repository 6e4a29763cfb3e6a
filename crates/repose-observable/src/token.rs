/// Per-container mutation counter.
///
/// Bumped once for every mutation that has an observable effect. Iterators
/// capture it at creation and refuse to step once it has moved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChangeToken(u64);

impl ChangeToken {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}
