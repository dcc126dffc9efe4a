//! Command line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use logrecv_core::{Md5Policy, ReceiverConfig};
use logrecv_http::HttpConfig;

/// Every flag falls back to an environment variable, then to a default.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "S3-compatible log receiver")]
pub struct Cli {
    /// Address to listen on.
    #[arg(long = "port", env = "SERVER_PORT", default_value = "0.0.0.0:8443")]
    pub listen: SocketAddr,

    /// PEM private key.
    #[arg(long, env = "SERVER_KEY", default_value = "data/key.pem")]
    pub key: PathBuf,

    /// PEM certificate chain.
    #[arg(long, env = "SERVER_CERT", default_value = "data/certificate.pem")]
    pub cert: PathBuf,

    /// Public host name, used for SNI, the self-signed fallback and `Location`.
    #[arg(long, env = "SNI_NAME", default_value = "localhost")]
    pub domain: String,

    /// The only access key accepted.
    #[arg(long, env = "ACCESS_KEY", default_value = "AKIAI44QH8DHBEXAMPLE")]
    pub access_key: String,

    /// Secret key paired with the access key.
    #[arg(
        long,
        env = "SECRET",
        default_value = "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub secret: String,

    /// Log every request with its headers.
    #[arg(long, env = "VERBOSE")]
    pub verbose: bool,

    /// Append uploads to one `<bucket>/<YYYYMMDD>.log` file per day.
    #[arg(long, env = "AGGREGATE")]
    pub aggregate: bool,

    /// Root of the object tree.
    #[arg(long, env = "ROOT_FOLDER", default_value = "data/objects")]
    pub root: PathBuf,

    /// Directory for staged multipart parts.
    #[arg(long, env = "STAGING_FOLDER", default_value = "data/staging")]
    pub staging: PathBuf,

    /// `reject` or `warn` on a Content-MD5 mismatch.
    #[arg(long, env = "MD5_POLICY", default_value = "reject")]
    pub md5_policy: Md5Policy,

    /// Seconds an incomplete multipart upload is kept.
    #[arg(long = "upload-ttl", env = "UPLOAD_TTL_SECS", default_value_t = 86_400)]
    pub upload_ttl_secs: u64,

    /// Seconds between reaper passes.
    #[arg(long = "reap-interval", env = "REAP_INTERVAL_SECS", default_value_t = 3_600)]
    pub reap_interval_secs: u64,

    /// Seconds allowed for receiving one request body.
    #[arg(long = "body-timeout", env = "BODY_READ_TIMEOUT_SECS", default_value_t = 60)]
    pub body_read_timeout_secs: u64,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Ingestion settings.
    #[must_use]
    pub fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig::builder()
            .root_dir(self.root.clone())
            .staging_dir(self.staging.clone())
            .aggregate(self.aggregate)
            .md5_policy(self.md5_policy)
            .domain(self.domain.clone())
            .upload_ttl_secs(self.upload_ttl_secs)
            .reap_interval_secs(self.reap_interval_secs)
            .build()
    }

    /// Authentication and request handling settings.
    #[must_use]
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            access_key: self.access_key.clone(),
            secret_key: self.secret.clone(),
            verbose: self.verbose,
            body_read_timeout: Duration::from_secs(self.body_read_timeout_secs.max(1)),
        }
    }

    /// Default log filter: `debug` in verbose mode, `LOG_LEVEL` otherwise.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        if self.verbose { "debug" } else { &self.log_level }
    }
}
