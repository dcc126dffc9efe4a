//! Receiver configuration.
//!
//! [`ReceiverConfig`] carries everything the object writer and the multipart
//! coordinator need to know about the filesystem layout and ingestion policy.
//! The server binary fills it from command line flags and environment variables.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// What to do when a body's MD5 does not match its `Content-MD5` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Md5Policy {
    /// Refuse the write with a `BadDigest` error.
    #[default]
    Reject,
    /// Log a warning and store the bytes anyway.
    Warn,
}

impl Md5Policy {
    /// Return the lowercase name used in configuration.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::Warn => "warn",
        }
    }
}

impl fmt::Display for Md5Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an [`Md5Policy`] from a string fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown MD5 policy '{0}', expected 'reject' or 'warn'")]
pub struct ParseMd5PolicyError(String);

impl FromStr for Md5Policy {
    type Err = ParseMd5PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "warn" => Ok(Self::Warn),
            _ => Err(ParseMd5PolicyError(s.to_owned())),
        }
    }
}

/// Receiver configuration.
///
/// # Examples
///
/// ```
/// use logrecv_core::config::{Md5Policy, ReceiverConfig};
///
/// let config = ReceiverConfig::builder()
///     .root_dir("/var/log/s3".into())
///     .aggregate(true)
///     .build();
/// assert!(config.aggregate);
/// assert_eq!(config.md5_policy, Md5Policy::Reject);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverConfig {
    /// Root of the object tree; bucket paths are joined below it.
    #[builder(default = PathBuf::from("data/objects"))]
    pub root_dir: PathBuf,

    /// Directory holding staged multipart parts.
    #[builder(default = PathBuf::from("data/staging"))]
    pub staging_dir: PathBuf,

    /// Append every upload to a per-day `<bucket>/<YYYYMMDD>.log` file.
    #[builder(default = false)]
    pub aggregate: bool,

    /// Handling of `Content-MD5` mismatches.
    #[builder(default)]
    pub md5_policy: Md5Policy,

    /// Public host name used in `Location` URLs.
    #[builder(default = String::from("localhost"))]
    pub domain: String,

    /// Seconds an upload may stay incomplete before it is reaped.
    #[builder(default = 86_400)]
    pub upload_ttl_secs: u64,

    /// Seconds between reaper runs.
    #[builder(default = 3_600)]
    pub reap_interval_secs: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ReceiverConfig {
    /// Upload time-to-live as a [`Duration`].
    #[must_use]
    pub fn upload_ttl(&self) -> Duration {
        Duration::from_secs(self.upload_ttl_secs)
    }

    /// Reaper period as a [`Duration`], never shorter than one second.
    #[must_use]
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_create_default_config() {
        let config = ReceiverConfig::default();
        assert_eq!(config.root_dir, PathBuf::from("data/objects"));
        assert_eq!(config.staging_dir, PathBuf::from("data/staging"));
        assert!(!config.aggregate);
        assert_eq!(config.md5_policy, Md5Policy::Reject);
        assert_eq!(config.domain, "localhost");
        assert_eq!(config.upload_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.reap_interval(), Duration::from_secs(3_600));
    }

    #[test]
    fn test_should_parse_md5_policy() {
        assert_eq!("reject".parse::<Md5Policy>().unwrap(), Md5Policy::Reject);
        assert_eq!("WARN".parse::<Md5Policy>().unwrap(), Md5Policy::Warn);
        assert!("ignore".parse::<Md5Policy>().is_err());
    }

    #[test]
    fn test_should_round_trip_md5_policy_display() {
        for policy in [Md5Policy::Reject, Md5Policy::Warn] {
            assert_eq!(policy.to_string().parse::<Md5Policy>().unwrap(), policy);
        }
    }

    #[test]
    fn test_should_clamp_zero_reap_interval() {
        let config = ReceiverConfig::builder().reap_interval_secs(0).build();
        assert_eq!(config.reap_interval(), Duration::from_secs(1));
    }
}
