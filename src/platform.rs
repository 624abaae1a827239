//! Target platform for image index resolution.
//!
//! Multi-platform images publish an index with one manifest per OS and CPU
//! architecture. The pull selects the entry matching a [`Platform`], which
//! defaults to the host and can be overridden (e.g. `linux/arm64`).

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Target platform of a pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Operating system.
    pub os: Os,
    /// CPU architecture.
    pub arch: Arch,
    /// Architecture variant (e.g. `v8` for arm64), if required.
    pub variant: Option<String>,
}

/// Operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    Darwin,
    Windows,
    Unknown,
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Amd64,
    Arm64,
    Arm,
    Unknown,
}

impl Os {
    /// Returns the OCI `os` value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
            Self::Unknown => "unknown",
        }
    }
}

impl Arch {
    /// Returns the OCI `architecture` value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
            Self::Arm => "arm",
            Self::Unknown => "unknown",
        }
    }
}

impl Platform {
    /// Detects the host platform.
    ///
    /// Container images are overwhelmingly Linux, so a macOS host still
    /// targets `linux/<arch>`: the unpacked rootfs runs in a Linux VM there.
    pub fn detect() -> Self {
        let os = match Self::detect_os() {
            Os::Darwin => Os::Linux,
            other => other,
        };

        Self {
            os,
            arch: Self::detect_arch(),
            variant: None,
        }
    }

    /// Detects the operating system.
    fn detect_os() -> Os {
        #[cfg(target_os = "linux")]
        return Os::Linux;

        #[cfg(target_os = "macos")]
        return Os::Darwin;

        #[cfg(target_os = "windows")]
        return Os::Windows;

        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        return Os::Unknown;
    }

    /// Detects the CPU architecture.
    fn detect_arch() -> Arch {
        #[cfg(target_arch = "x86_64")]
        return Arch::Amd64;

        #[cfg(target_arch = "aarch64")]
        return Arch::Arm64;

        #[cfg(target_arch = "arm")]
        return Arch::Arm;

        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "arm")))]
        return Arch::Unknown;
    }

    /// Returns true if an index entry's platform fields select this platform.
    ///
    /// A variant is only compared when this platform asks for one.
    pub fn matches(&self, os: &str, architecture: &str, variant: Option<&str>) -> bool {
        if os != self.os.as_str() || architecture != self.arch.as_str() {
            return false;
        }
        match &self.variant {
            Some(wanted) => variant == Some(wanted.as_str()),
            None => true,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os.as_str(), self.arch.as_str())?;
        if let Some(variant) = &self.variant {
            write!(f, "/{}", variant)?;
        }
        Ok(())
    }
}

impl FromStr for Platform {
    type Err = Error;

    /// Parses `os/arch[/variant]`, accepting the common Go-style aliases
    /// (`x86_64`, `aarch64`).
    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidLocation {
            location: s.to_string(),
            reason: format!("invalid platform: {}", reason),
        };

        let mut parts = s.split('/');
        let os = match parts.next() {
            Some("linux") => Os::Linux,
            Some("darwin") => Os::Darwin,
            Some("windows") => Os::Windows,
            _ => return Err(invalid("unknown os")),
        };
        let arch = match parts.next() {
            Some("amd64") | Some("x86_64") => Arch::Amd64,
            Some("arm64") | Some("aarch64") => Arch::Arm64,
            Some("arm") => Arch::Arm,
            _ => return Err(invalid("unknown architecture")),
        };
        let variant = parts.next().map(str::to_string);
        if parts.next().is_some() {
            return Err(invalid("expected os/arch[/variant]"));
        }

        Ok(Self { os, arch, variant })
    }
}
