//! Image locations.
//!
//! A location names where an image lives as a URL whose scheme selects the
//! transport:
//!
//! ```text
//! docker:///busybox:latest              registry, default host
//! docker://localhost:5000/team/app:1.0  registry on an explicit host
//! oci:///var/images/alpine:3.19         local OCI image layout + tag
//! ```
//!
//! Parsing is pure; nothing is opened until a transport turns the location
//! into a reference (see [`crate::transport`]).

use crate::constants::MAX_LOCATION_LEN;
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Parsed image location: scheme, optional host (with port) and path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLocation {
    scheme: String,
    host: Option<String>,
    path: String,
}

impl ImageLocation {
    /// Parses a location string.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidLocation`] when the string is empty, too long, or not
    /// a URL with a scheme.
    pub fn parse(location: &str) -> Result<Self> {
        if location.is_empty() {
            return Err(Error::InvalidLocation {
                location: String::new(),
                reason: "empty image location".to_string(),
            });
        }
        if location.len() > MAX_LOCATION_LEN {
            return Err(Error::InvalidLocation {
                location: location.chars().take(50).collect::<String>() + "...",
                reason: format!("exceeds maximum length of {} bytes", MAX_LOCATION_LEN),
            });
        }

        let url = Url::parse(location).map_err(|e| Error::InvalidLocation {
            location: location.to_string(),
            reason: e.to_string(),
        })?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .map(|h| match url.port() {
                Some(port) => format!("{}:{}", h, port),
                None => h.to_string(),
            });

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            path: url.path().to_string(),
        })
    }

    /// Returns the scheme that selects the transport.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns the host (including any port), if present.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Returns the path component.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Builds the root-relative string handed to the transport parser:
    /// `"/"`, then `"/" + host` when a host is present, then the path.
    pub fn reference_string(&self) -> String {
        let mut reference = String::from("/");
        if let Some(host) = &self.host {
            reference.push('/');
            reference.push_str(host);
        }
        reference.push_str(&self.path);
        reference
    }
}

impl FromStr for ImageLocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.host.as_deref().unwrap_or(""), self.path)
    }
}
