use crate::error::{OstreeError, Result};
use crate::ostree::executor::DEFAULT_BINARY;
use std::process::Command;

/// An ostree release, versioned as `<year>.<release>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OstreeVersion {
    pub year: u32,
    pub release: u32,
}

impl OstreeVersion {
    /// Detect the installed ostree version
    pub fn detect() -> Result<Self> {
        Self::detect_with(DEFAULT_BINARY)
    }

    /// Detect the version of a specific ostree executable
    pub fn detect_with(binary: &str) -> Result<Self> {
        let output = Command::new(binary)
            .arg("--version")
            .output()
            .map_err(|e| {
                OstreeError::VersionDetectionFailed(format!("Failed to execute {}: {}", binary, e))
            })?;

        if !output.status.success() {
            return Err(OstreeError::VersionDetectionFailed(format!(
                "{} --version failed",
                binary
            )));
        }

        let version_string = String::from_utf8_lossy(&output.stdout);
        Self::parse(&version_string)
    }

    /// Parse `ostree --version` output.
    ///
    /// The output is YAML-like; the version sits on a ` Version: '2023.7'`
    /// line under the `libostree:` key.
    pub fn parse(version_str: &str) -> Result<Self> {
        let value = version_str
            .lines()
            .find_map(|line| line.trim().strip_prefix("Version:"))
            .map(|value| value.trim().trim_matches(|c| c == '\'' || c == '"'))
            .ok_or_else(|| {
                OstreeError::ParseError(format!("Unexpected ostree version format: {}", version_str))
            })?;

        let (year, release) = value.split_once('.').ok_or_else(|| {
            OstreeError::ParseError(format!("Invalid version number format: {}", value))
        })?;

        let year = year
            .parse::<u32>()
            .map_err(|_| OstreeError::ParseError(format!("Invalid version year: {}", year)))?;

        // Point releases like 2020.8.1 only matter for their release component
        let release = release.split('.').next().unwrap_or(release);
        let release = release
            .parse::<u32>()
            .map_err(|_| OstreeError::ParseError(format!("Invalid release number: {}", release)))?;

        Ok(OstreeVersion { year, release })
    }
}

impl std::fmt::Display for OstreeVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.year, self.release)
    }
}
