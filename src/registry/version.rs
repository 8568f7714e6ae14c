use time::OffsetDateTime;
use time::format_description::FormatItem;
use time::macros::format_description;

use crate::ml::ModelKind;

const VERSION_STAMP: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]-[hour][minute][second]");

/// Version string `<prefix>-YYYY-MM-DD-HHMMSS-<kind>` in UTC.
///
/// The zero-padded stamp comes straight after the prefix, so for a fixed
/// prefix lexicographic order is chronological whatever the model kind.
pub fn generate_version(
    prefix: &str,
    kind: ModelKind,
    at: OffsetDateTime,
) -> Result<String, time::error::Format> {
    let stamp = at.to_offset(time::UtcOffset::UTC).format(VERSION_STAMP)?;
    Ok(format!("{prefix}-{stamp}-{}", kind.version_tag()))
}

/// Reject names that could escape the store or collide with temp files.
pub fn check_version(version: &str) -> Result<(), String> {
    if version.is_empty() {
        return Err("version is empty".to_string());
    }
    if version.starts_with('.') {
        return Err("version must not start with '.'".to_string());
    }
    if let Some(bad) = version
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(format!("version contains unsupported character {bad:?}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn version_sorts_chronologically() {
        let early = generate_version("risk", ModelKind::GbdtStumpV1, datetime!(2024-03-09 07:05:04 UTC)).unwrap();
        let late = generate_version("risk", ModelKind::GbdtStumpV1, datetime!(2024-11-10 23:00:00 UTC)).unwrap();
        assert_eq!(early, "risk-2024-03-09-070504-gbdt");
        assert!(early < late);
    }

    #[test]
    fn kind_does_not_affect_ordering() {
        let older = generate_version("risk", ModelKind::LogRegV1, datetime!(2024-01-01 00:00:00 UTC)).unwrap();
        let newer = generate_version("risk", ModelKind::GbdtStumpV1, datetime!(2024-06-01 00:00:00 UTC)).unwrap();
        assert!(older < newer);
        let same_second = generate_version("risk", ModelKind::GbdtStumpV1, datetime!(2024-01-01 00:00:00 UTC)).unwrap();
        assert!(same_second < newer);
    }

    #[test]
    fn stamp_is_converted_to_utc() {
        let version = generate_version("risk", ModelKind::LogRegV1, datetime!(2024-01-01 05:30:00 +05:30)).unwrap();
        assert_eq!(version, "risk-2024-01-01-000000-logreg");
    }

    #[test]
    fn rejects_path_like_versions() {
        assert!(check_version("risk-2024-01-01-000000-gbdt").is_ok());
        assert!(check_version("").is_err());
        assert!(check_version("../escape").is_err());
        assert!(check_version(".hidden").is_err());
        assert!(check_version("a/b").is_err());
    }
}
