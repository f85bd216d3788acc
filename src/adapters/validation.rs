//! Input validation shared by all adapters. Everything here runs before backend I/O.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Component, Path};

use super::errors::AdapterError;

pub const MAX_NAME_LENGTH: usize = 63;

lazy_static! {
    static ref DNS_LABEL: Regex =
        Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").expect("valid DNS label regex");
    static ref SEMVER: Regex = Regex::new(
        r"^v?(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(-[0-9A-Za-z.-]+)?(\+[0-9A-Za-z.-]+)?$"
    )
    .expect("valid semver regex");
}

/// Lowercase alphanumerics and hyphens, 1-63 characters, no leading or trailing hyphen.
pub fn validate_name(name: &str) -> Result<(), AdapterError> {
    let invalid = |reason: &str| AdapterError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(invalid("name must be at most 63 characters"));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid("name must not start or end with a hyphen"));
    }
    if !DNS_LABEL.is_match(name) {
        return Err(invalid(
            "name must contain only lowercase alphanumeric characters and hyphens",
        ));
    }
    Ok(())
}

pub fn validate_package_version(version: &str) -> Result<(), AdapterError> {
    if SEMVER.is_match(version) {
        Ok(())
    } else {
        Err(AdapterError::InvalidInput(format!(
            "package version {:?} is not a semantic version",
            version
        )))
    }
}

/// Rejects absolute paths and any `..` component.
pub fn validate_relative_path(path: &str) -> Result<(), AdapterError> {
    let invalid = |reason: &str| AdapterError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.trim().is_empty() {
        return Err(invalid("path must not be empty"));
    }
    if path.starts_with('/') || path.starts_with('\\') || Path::new(path).is_absolute() {
        return Err(invalid("absolute paths are not allowed"));
    }
    let traverses = Path::new(path)
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
        || path.split(['/', '\\']).any(|segment| segment == "..");
    if traverses {
        return Err(invalid("path traversal is not allowed"));
    }
    Ok(())
}

/// Validates every string extension whose key names a path (`overlayPath`, `chartPath`, ...).
pub fn validate_path_extensions(
    extensions: &HashMap<String, serde_json::Value>,
) -> Result<(), AdapterError> {
    for (key, value) in extensions {
        if !key.ends_with("Path") && !key.ends_with("path") {
            continue;
        }
        match value.as_str() {
            Some(path) => validate_relative_path(path)?,
            None if value.is_null() => {}
            None => {
                return Err(AdapterError::InvalidInput(format!(
                    "extension {} must be a string path",
                    key
                )))
            }
        }
    }
    Ok(())
}
