use serde::{Deserialize, Serialize};

/// Flags threaded through a chain's redirects.
///
/// Flags only ever get set: once a chain is forked or returning, every stage
/// resolved after it is too.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ChainModifiers(u8);

impl ChainModifiers {
    /// No flags set.
    pub const DEFAULT: Self = Self(0);
    const FORKED: u8 = 1;
    const RETURN: u8 = 2;

    /// Returns these modifiers with the forked flag set.
    #[must_use]
    pub const fn set_forked(self) -> Self {
        Self(self.0 | Self::FORKED)
    }

    /// Returns these modifiers with the return flag set.
    #[must_use]
    pub const fn set_return(self) -> Self {
        Self(self.0 | Self::RETURN)
    }

    /// Returns true if errors in one source must not abort its siblings.
    #[must_use]
    pub const fn is_forked(self) -> bool {
        self.0 & Self::FORKED != 0
    }

    /// Returns true if the chain's result is returned to the enclosing frame.
    #[must_use]
    pub const fn is_return(self) -> bool {
        self.0 & Self::RETURN != 0
    }
}
