//! Bucket identifier parsing
//!
//! A bucket identifier names the remote storage target, optionally prefixed
//! with a backend scheme: `mybucket`, `s3://mybucket/some/prefix`,
//! `adl://account.azuredatalakestore.net/dir`, `wasb://container/dir`.

use std::fmt;
use std::str::FromStr;

use crate::error::{BucketFsError, Result};

const SCHEME_DELIMITER: &str = "://";

/// Backend scheme recognized in a bucket identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// No scheme given, default object-storage backend
    Default,
    S3,
    /// Azure Data Lake Storage Gen1
    Adl,
    /// Azure Blob Storage
    Wasb,
    /// Azure Blob Storage over TLS
    Wasbs,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Default => "",
            Scheme::S3 => "s3",
            Scheme::Adl => "adl",
            Scheme::Wasb => "wasb",
            Scheme::Wasbs => "wasbs",
        }
    }
}

impl FromStr for Scheme {
    type Err = BucketFsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Ok(Scheme::Default),
            "s3" => Ok(Scheme::S3),
            "adl" => Ok(Scheme::Adl),
            "wasb" => Ok(Scheme::Wasb),
            "wasbs" => Ok(Scheme::Wasbs),
            other => Err(BucketFsError::MalformedSpec(format!(
                "unknown scheme: {}",
                other
            ))),
        }
    }
}

/// Parsed bucket identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSpec {
    pub scheme: Scheme,
    pub bucket: String,
    /// Path prefix inside the bucket, without a trailing separator
    pub prefix: String,
}

impl BucketSpec {
    pub fn has_prefix(&self) -> bool {
        !self.prefix.is_empty()
    }
}

/// Parse a bucket identifier into a [`BucketSpec`]
pub fn parse_bucket_spec(input: &str) -> Result<BucketSpec> {
    let Some((scheme, rest)) = input.split_once(SCHEME_DELIMITER) else {
        if input.is_empty() {
            return Err(BucketFsError::MalformedSpec(
                "empty bucket identifier".to_string(),
            ));
        }
        return Ok(BucketSpec {
            scheme: Scheme::Default,
            bucket: input.to_string(),
            prefix: String::new(),
        });
    };

    let scheme = scheme.parse::<Scheme>()?;

    let (bucket, prefix) = match rest.split_once('/') {
        Some((bucket, prefix)) => (bucket, prefix.trim_end_matches('/')),
        None => (rest, ""),
    };

    if bucket.is_empty() {
        return Err(BucketFsError::MalformedSpec(format!(
            "missing bucket in {:?}",
            input
        )));
    }

    Ok(BucketSpec {
        scheme,
        bucket: bucket.to_string(),
        prefix: prefix.to_string(),
    })
}

impl FromStr for BucketSpec {
    type Err = BucketFsError;

    fn from_str(s: &str) -> Result<Self> {
        parse_bucket_spec(s)
    }
}

impl fmt::Display for BucketSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scheme != Scheme::Default {
            write!(f, "{}{}", self.scheme.as_str(), SCHEME_DELIMITER)?;
        }
        write!(f, "{}", self.bucket)?;
        if self.has_prefix() {
            write!(f, "/{}", self.prefix)?;
        }
        Ok(())
    }
}
