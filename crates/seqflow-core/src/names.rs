//! Sequence and channel naming rules.
//!
//! Names are path-like identifiers. Leading slashes are not significant, so
//! `"/front/imu"` and `"front/imu"` refer to the same channel. A name must
//! start with an ASCII letter or digit and may only contain
//! `[A-Za-z0-9_-]`; channel names additionally allow `/` as a separator.
//!
//! The fully-qualified resource name of a channel is
//! `"{sequence_name}/{channel_name}"`, built by [`pack_resource_name`].

use crate::error::{Error, Result};

const SEQUENCE: &str = "sequence";
const CHANNEL: &str = "channel";

/// Strips leading and trailing slashes and collapses repeated separators.
///
/// `"/front//imu"` becomes `"front/imu"`.
pub fn normalize(name: &str) -> String {
    name.split('/')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Validates and normalizes a sequence name.
pub fn validate_sequence_name(name: &str) -> Result<String> {
    validate(SEQUENCE, name, false)
}

/// Validates and normalizes a channel name.
pub fn validate_channel_name(name: &str) -> Result<String> {
    validate(CHANNEL, name, true)
}

fn validate(kind: &'static str, name: &str, allow_separator: bool) -> Result<String> {
    let invalid = |reason: &str| Error::InvalidName {
        kind,
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }

    let normalized = normalize(name);
    if normalized.is_empty() {
        return Err(invalid("name is empty after '/' removal"));
    }

    if let Some(bad) = normalized
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || (allow_separator && *c == '/')))
    {
        let allowed = if allow_separator {
            "[A-Za-z0-9_-/]"
        } else {
            "[A-Za-z0-9_-]"
        };
        return Err(invalid(&format!(
            "invalid character '{bad}', only {allowed} are allowed"
        )));
    }

    // Checked after the character set so the separator case reports the '/' itself.
    if !normalized.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(invalid("name does not begin with a letter or a number"));
    }

    Ok(normalized)
}

/// Joins a sequence and a channel name into a channel resource name.
///
/// Leading slashes are stripped from both components before joining.
pub fn pack_resource_name(sequence_name: &str, channel_name: &str) -> String {
    format!(
        "{}/{}",
        sequence_name.trim_start_matches('/'),
        channel_name.trim_start_matches('/')
    )
}

/// Splits a channel resource name into `(sequence_name, channel_name)`.
///
/// Returns `None` when either component is missing.
pub fn unpack_resource_name(resource: &str) -> Option<(String, String)> {
    let trimmed = resource.trim_start_matches('/');
    let (sequence, channel) = trimmed.split_once('/')?;
    let channel = channel.trim_start_matches('/');
    if sequence.is_empty() || channel.is_empty() {
        return None;
    }
    Some((sequence.to_string(), channel.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_name_normalizes_separators() {
        assert_eq!(validate_channel_name("/front//imu").unwrap(), "front/imu");
        assert_eq!(validate_channel_name("gps/").unwrap(), "gps");
    }

    #[test]
    fn test_channel_name_rejects_bad_charset() {
        let err = validate_channel_name("#bad").unwrap_err();
        match err {
            Error::InvalidName { kind, reason, .. } => {
                assert_eq!(kind, "channel");
                assert!(reason.contains("invalid character '#'"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_name_must_start_alphanumeric() {
        assert!(validate_channel_name("_imu").is_err());
        assert!(validate_sequence_name("-run").is_err());
        assert!(validate_sequence_name("run-1_a").is_ok());
    }

    #[test]
    fn test_sequence_name_rejects_separator() {
        let err = validate_sequence_name("a/b").unwrap_err();
        assert!(err.to_string().contains("invalid character '/'"));
        // A leading slash alone is stripped, not rejected.
        assert_eq!(validate_sequence_name("/mission").unwrap(), "mission");
    }

    #[test]
    fn test_empty_names() {
        assert!(validate_sequence_name("").is_err());
        assert!(validate_channel_name("///").is_err());
    }

    #[test]
    fn test_pack_strips_leading_slashes() {
        assert_eq!(pack_resource_name("/seq", "/front/imu"), "seq/front/imu");
        assert_eq!(pack_resource_name("seq", "gps"), "seq/gps");
    }

    #[test]
    fn test_unpack_resource_name() {
        assert_eq!(
            unpack_resource_name("seq/front/imu"),
            Some(("seq".to_string(), "front/imu".to_string()))
        );
        assert_eq!(unpack_resource_name("seq"), None);
        assert_eq!(unpack_resource_name("seq/"), None);
    }
}
