use std::fs;
use std::path::{Path, PathBuf};
use chrono::{DateTime, NaiveDateTime, Utc};

pub const BACKUP_PREFIX: &str = "tbl_backup_";
pub const BACKUP_EXTENSION: &str = ".db";
pub const COMPRESSED_EXTENSION: &str = ".zst";

// RFC3339 at second precision, colons stripped.
const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H%M%SZ";

pub fn format_file_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(FILE_TIMESTAMP_FORMAT).to_string()
}

/// Name of the uncompressed artifact for `timestamp`, e.g. `tbl_backup_2009-11-17T203458Z.db`.
pub fn backup_file_name(timestamp: DateTime<Utc>) -> String {
    format!("{}{}{}", BACKUP_PREFIX, format_file_timestamp(timestamp), BACKUP_EXTENSION)
}

pub fn backup_file_path(dir: &Path, timestamp: DateTime<Utc>) -> PathBuf {
    dir.join(backup_file_name(timestamp))
}

/// Appends the compressed suffix, keeping the `.db` part of the name.
pub fn compressed_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(COMPRESSED_EXTENSION);
    PathBuf::from(name)
}

/// Whether `name` follows the backup naming pattern, regardless of its timestamp.
pub fn is_backup_file_name(name: &str) -> bool {
    timestamp_part(name).is_some()
}

fn timestamp_part(name: &str) -> Option<&str> {
    let rest = name.strip_prefix(BACKUP_PREFIX)?;
    let rest = rest.strip_suffix(COMPRESSED_EXTENSION).unwrap_or(rest);
    rest.strip_suffix(BACKUP_EXTENSION)
}

/// Extracts the timestamp embedded in a backup file name.
///
/// Accepts the colon-free form written by this tool as well as full RFC3339
/// timestamps found in directories produced by older versions.
pub fn parse_backup_timestamp(name: &str) -> Option<DateTime<Utc>> {
    let raw = timestamp_part(name)?;
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, FILE_TIMESTAMP_FORMAT) {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|timestamp| timestamp.with_timezone(&Utc))
}

pub fn get_size<P: AsRef<Path>>(path: P) -> Result<u64, std::io::Error> {
    let path = path.as_ref();
    let metadata = fs::metadata(path)?;

    if metadata.is_file() {
        Ok(metadata.len())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is not a file", path.display()),
        ))
    }
}

/// Removes `path`, treating an already missing file as success.
pub fn remove_file_if_exists(path: &Path) -> Result<(), std::io::Error> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_backup_file_name_has_no_colons() {
        let timestamp = Utc.with_ymd_and_hms(2009, 11, 17, 20, 34, 58).unwrap();
        let name = backup_file_name(timestamp);

        assert_eq!(name, "tbl_backup_2009-11-17T203458Z.db");
        assert!(!name.contains(':'));
    }

    #[test]
    fn test_compressed_path_keeps_db_extension() {
        let path = Path::new("/tmp/backups/tbl_backup_2009-11-17T203458Z.db");
        assert_eq!(
            compressed_path(path),
            PathBuf::from("/tmp/backups/tbl_backup_2009-11-17T203458Z.db.zst")
        );
    }

    #[test]
    fn test_parse_backup_timestamp() {
        let expected = Utc.with_ymd_and_hms(2009, 11, 17, 20, 34, 58).unwrap();

        assert_eq!(parse_backup_timestamp("tbl_backup_2009-11-17T203458Z.db"), Some(expected));
        assert_eq!(parse_backup_timestamp("tbl_backup_2009-11-17T203458Z.db.zst"), Some(expected));
        assert_eq!(parse_backup_timestamp("tbl_backup_2009-11-17T20:34:58Z.db"), Some(expected));
        assert_eq!(parse_backup_timestamp("tbl_backup_2009-11-17T21:34:58+01:00.db.zst"), Some(expected));
    }

    #[test]
    fn test_parse_backup_timestamp_rejects_other_files() {
        assert_eq!(parse_backup_timestamp("notes.txt"), None);
        assert_eq!(parse_backup_timestamp("tbl_backup_2009-11-17T203458Z.sql"), None);
        assert_eq!(parse_backup_timestamp("tbl_backup_garbage.db"), None);

        assert!(is_backup_file_name("tbl_backup_garbage.db"));
        assert!(!is_backup_file_name("other_2009-11-17T203458Z.db"));
    }

    #[test]
    fn test_get_size_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(get_size(dir.path()).is_err());

        let file = dir.path().join("file");
        fs::write(&file, b"12345").unwrap();
        assert_eq!(get_size(&file).unwrap(), 5);
    }

    #[test]
    fn test_remove_file_if_exists() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, b"x").unwrap();

        remove_file_if_exists(&file).unwrap();
        assert!(!file.exists());
        remove_file_if_exists(&file).unwrap();
    }
}
