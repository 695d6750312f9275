use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Semantic `major.minor.patch` application version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AppVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl AppVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid app version '{0}'")]
pub struct ParseVersionError(String);

impl FromStr for AppVersion {
    type Err = ParseVersionError;

    /// Accepts `major`, `major.minor` or `major.minor.patch`; missing parts are zero.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ParseVersionError(raw.to_owned()));
        }

        let mut parts = [0_u32; 3];
        let mut count = 0;
        for segment in trimmed.split('.') {
            if count == parts.len() {
                return Err(ParseVersionError(raw.to_owned()));
            }
            parts[count] = segment
                .parse()
                .map_err(|_| ParseVersionError(raw.to_owned()))?;
            count += 1;
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_versions() {
        assert_eq!("1.6".parse(), Ok(AppVersion::new(1, 6, 0)));
        assert_eq!("2".parse(), Ok(AppVersion::new(2, 0, 0)));
        assert_eq!(" 1.10.3 ".parse(), Ok(AppVersion::new(1, 10, 3)));
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<AppVersion>().is_err());
        assert!("1.x".parse::<AppVersion>().is_err());
        assert!("1.2.3.4".parse::<AppVersion>().is_err());
    }

    #[test]
    fn orders_numerically() {
        assert!(AppVersion::new(1, 10, 0) > AppVersion::new(1, 9, 9));
        assert!(AppVersion::new(1, 0, 9) < AppVersion::new(1, 1, 0));
        assert_eq!(AppVersion::new(1, 6, 0).to_string(), "1.6.0");
    }
}
