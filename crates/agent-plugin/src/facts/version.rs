use std::fmt;
use std::str::FromStr;

use crate::error::DeployError;

/// `major.minor` of the agent integration; patch and pre-release parts are
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AgentVersion {
    pub major: u32,
    pub minor: u32,
}

/// Last version exposing the search path at the top level of the agent config.
pub const LEGACY_LAYOUT_MAX: AgentVersion = AgentVersion::new(8, 6);

impl AgentVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub fn uses_legacy_layout(self) -> bool {
        self <= LEGACY_LAYOUT_MAX
    }
}

impl FromStr for AgentVersion {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || DeployError::Facts(format!("unparseable agent version '{s}'"));
        let mut parts = s.trim().split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(bad)?;
        // "8.6.0-rc1" and "8" are both fine; only leading digits of minor count.
        let minor = match parts.next() {
            Some(p) => {
                let digits: String = p.chars().take_while(|c| c.is_ascii_digit()).collect();
                if digits.is_empty() {
                    return Err(bad());
                }
                digits.parse::<u32>().map_err(|_| bad())?
            }
            None => 0,
        };
        Ok(Self { major, minor })
    }
}

impl fmt::Display for AgentVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
