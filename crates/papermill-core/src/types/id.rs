//! Newtype wrapper for the job correlation identifier.
//!
//! Using a distinct type prevents accidentally passing an arbitrary string
//! where a job id is expected, and keeps the token format in one place.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Number of hexadecimal characters in a job identifier.
pub const JOB_ID_LEN: usize = 8;

/// Error returned when parsing a malformed job identifier.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid job id: expected {JOB_ID_LEN} lowercase hex characters")]
pub struct InvalidJobId;

/// Short opaque correlation identifier for one dispatched job.
///
/// Eight random lowercase hex characters. The same token doubles as the
/// collision-avoidance short id in every artifact name the job produces,
/// so anything found on disk can be traced back to the job that wrote it.
/// Collisions are statistically negligible and not detected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a new random identifier.
    pub fn generate() -> Self {
        let mut token = Uuid::new_v4().simple().to_string();
        token.truncate(JOB_ID_LEN);
        Self(token)
    }

    /// View the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobId {
    type Err = InvalidJobId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == JOB_ID_LEN && s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()) {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidJobId)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_unique() {
        let a = JobId::generate();
        let b = JobId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_generate_format() {
        let id = JobId::generate();
        assert_eq!(id.as_str().len(), JOB_ID_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_from_str_valid() {
        let id: JobId = "a1b2c3d4".parse().expect("should parse");
        assert_eq!(id.as_str(), "a1b2c3d4");
    }

    #[test]
    fn test_from_str_rejects_bad_input() {
        assert!("".parse::<JobId>().is_err());
        assert!("a1b2c3".parse::<JobId>().is_err());
        assert!("a1b2c3d4e5".parse::<JobId>().is_err());
        assert!("A1B2C3D4".parse::<JobId>().is_err());
        assert!("a1b2..d4".parse::<JobId>().is_err());
        assert!("../../up".parse::<JobId>().is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let id = JobId::generate();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", id.as_str()));
        let parsed: JobId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);
    }
}
