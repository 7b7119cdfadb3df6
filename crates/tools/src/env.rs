//! Environment variable snapshot
//!
//! The ambient process environment is captured once and merged with the
//! secrets file. File values only fill in variables that are not already
//! set; an ambient value is never overridden. Within the file, a repeated
//! key takes its last value. Values are read literally, with no `$NAME`
//! expansion.
//!
//! Loading the secrets file is best-effort: a missing or unreadable file
//! leaves the snapshot as the ambient environment alone.

use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Default location of the secrets file, relative to the working directory
pub const DEFAULT_SECRETS_FILE: &str = "./process.env";

/// Immutable set of environment variables seen at load time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Snapshot the process environment and merge in the secrets file.
    pub fn load(secrets_path: impl AsRef<Path>) -> Self {
        Self::from_parts(ambient_vars(), secrets_path)
    }

    /// Build from an explicit ambient set plus the secrets file.
    pub fn from_parts<I, K, V>(ambient: I, secrets_path: impl AsRef<Path>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut vars: BTreeMap<String, String> = ambient
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let path = secrets_path.as_ref();
        let added = merge_secrets_file(&mut vars, path);
        debug!(path = %path.display(), added, total = vars.len(), "environment resolved");

        Self { vars }
    }

    /// Build directly from key-value pairs, without touching the filesystem.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Process environment as UTF-8 pairs.
///
/// A non-UTF-8 name cannot match any key the secrets file defines, so it is
/// dropped. A non-UTF-8 value is kept lossily so the name still counts as set.
fn ambient_vars() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os().filter_map(|(k, v)| {
        let key = k.into_string().ok()?;
        Some((key, v.to_string_lossy().into_owned()))
    })
}

/// Insert file values for keys not yet present. Returns how many were added.
fn merge_secrets_file(vars: &mut BTreeMap<String, String>, path: &Path) -> usize {
    let mut added = 0;
    for (key, value) in read_secrets_file(path) {
        if vars.contains_key(&key) {
            debug!(key = %key, "already set, keeping existing value");
            continue;
        }
        vars.insert(key, value);
        added += 1;
    }
    added
}

/// Parse the secrets file into a map. A key repeated in the file takes its
/// last value. Values are kept literally: `$NAME` is never expanded.
fn read_secrets_file(path: &Path) -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "secrets file not found, skipping");
            return entries;
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "secrets file unreadable, skipping");
            return entries;
        }
    };

    // dotenvy substitutes on '$' only, so hide it behind a character the
    // file does not contain and restore it in the parsed values
    let Some(placeholder) = ('\u{E000}'..='\u{F8FF}').find(|c| !content.contains(*c)) else {
        warn!(path = %path.display(), "secrets file not parseable literally, skipping");
        return entries;
    };
    let masked = content.replace('$', &placeholder.to_string());

    for item in dotenvy::from_read_iter(masked.as_bytes()) {
        match item {
            Ok((key, value)) => {
                let value = value.replace(placeholder, "$");
                entries.insert(key, value);
            }
            Err(dotenvy::Error::LineParse(_, index)) => {
                // Only the position is logged; the line may hold a secret
                warn!(path = %path.display(), index, "skipping malformed line in secrets file");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "stopped reading secrets file");
                break;
            }
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn write_secrets(content: &str) -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("process.env");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_file_values_fill_empty_environment() {
        let (_dir, path) = write_secrets("URL1=https://a.example\nAPI_KEY=k1\n");
        let env = Environment::from_parts(Vec::<(String, String)>::new(), &path);

        assert_eq!(env.get("URL1"), Some("https://a.example"));
        assert_eq!(env.get("API_KEY"), Some("k1"));
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn test_ambient_value_not_overridden() {
        let (_dir, path) = write_secrets("PRIVATE_KEY=0xabc\nURL2=https://b.example\n");
        let env = Environment::from_parts([("PRIVATE_KEY", "0xdef")], &path);

        assert_eq!(env.get("PRIVATE_KEY"), Some("0xdef"));
        assert_eq!(env.get("URL2"), Some("https://b.example"));
    }

    #[test]
    fn test_ambient_empty_value_still_wins() {
        let (_dir, path) = write_secrets("API_KEY=from-file\n");
        let env = Environment::from_parts([("API_KEY", "")], &path);

        assert_eq!(env.get("API_KEY"), Some(""));
    }

    #[test]
    fn test_missing_file_is_noop() {
        let dir = TempDir::new().unwrap();
        let env = Environment::from_parts([("HOME", "/root")], dir.path().join("absent.env"));

        assert_eq!(env.len(), 1);
        assert_eq!(env.get("URL1"), None);
    }

    #[test]
    fn test_directory_instead_of_file_is_noop() {
        let dir = TempDir::new().unwrap();
        let env = Environment::from_parts(Vec::<(String, String)>::new(), dir.path());

        assert!(env.is_empty());
    }

    #[test]
    fn test_comments_quotes_and_export() {
        let (_dir, path) = write_secrets(
            "# deployment secrets\nexport URL1=\"https://a.example\"\nAPI_KEY='k1'\n\nURL2=https://b.example\n",
        );
        let env = Environment::from_parts(Vec::<(String, String)>::new(), &path);

        assert_eq!(env.get("URL1"), Some("https://a.example"));
        assert_eq!(env.get("API_KEY"), Some("k1"));
        assert_eq!(env.get("URL2"), Some("https://b.example"));
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let (_dir, path) = write_secrets("URL1=https://a.example\nnot a valid line\nAPI_KEY=k1\n");
        let env = Environment::from_parts(Vec::<(String, String)>::new(), &path);

        assert_eq!(env.get("URL1"), Some("https://a.example"));
        assert_eq!(env.get("API_KEY"), Some("k1"));
    }

    #[test]
    fn test_from_vars_skips_filesystem() {
        let env = Environment::from_vars([("URL1", "https://a.example")]);
        assert_eq!(env.get("URL1"), Some("https://a.example"));
        assert!(!env.contains("URL2"));
    }

    #[test]
    #[serial]
    fn test_load_reads_process_environment() {
        let original = std::env::var("CHAINKIT_ENV_PROBE").ok();
        std::env::set_var("CHAINKIT_ENV_PROBE", "ambient");

        let (_dir, path) = write_secrets("CHAINKIT_ENV_PROBE=file\n");
        let env = Environment::load(&path);
        assert_eq!(env.get("CHAINKIT_ENV_PROBE"), Some("ambient"));

        match original {
            Some(value) => std::env::set_var("CHAINKIT_ENV_PROBE", value),
            None => std::env::remove_var("CHAINKIT_ENV_PROBE"),
        }
    }

    #[test]
    #[serial]
    fn test_load_does_not_mutate_process_environment() {
        std::env::remove_var("CHAINKIT_FILE_ONLY");
        let (_dir, path) = write_secrets("CHAINKIT_FILE_ONLY=value\n");

        let env = Environment::load(&path);
        assert_eq!(env.get("CHAINKIT_FILE_ONLY"), Some("value"));
        assert!(std::env::var("CHAINKIT_FILE_ONLY").is_err());
    }

    #[test]
    fn test_dollar_signs_kept_literally() {
        let (_dir, path) = write_secrets(
            "API_KEY=ab$cd\nPRIVATE_KEY=\"0x12${X}34\"\nURL1='https://a.example/$path'\n",
        );
        let env = Environment::from_parts(Vec::<(String, String)>::new(), &path);

        assert_eq!(env.get("API_KEY"), Some("ab$cd"));
        assert_eq!(env.get("PRIVATE_KEY"), Some("0x12${X}34"));
        assert_eq!(env.get("URL1"), Some("https://a.example/$path"));
    }

    #[test]
    fn test_dollar_kept_when_file_uses_private_use_chars() {
        let (_dir, path) = write_secrets("NOTE=\u{E000}\u{E001}\nAPI_KEY=k$1\n");
        let env = Environment::from_parts(Vec::<(String, String)>::new(), &path);

        assert_eq!(env.get("NOTE"), Some("\u{E000}\u{E001}"));
        assert_eq!(env.get("API_KEY"), Some("k$1"));
    }

    #[test]
    fn test_later_duplicate_in_file_wins() {
        let (_dir, path) = write_secrets("URL1=https://old.example\nURL1=https://new.example\n");
        let env = Environment::from_parts(Vec::<(String, String)>::new(), &path);

        assert_eq!(env.get("URL1"), Some("https://new.example"));
    }

    #[test]
    fn test_ambient_beats_every_duplicate_in_file() {
        let (_dir, path) = write_secrets("URL1=https://old.example\nURL1=https://new.example\n");
        let env = Environment::from_parts([("URL1", "https://ambient.example")], &path);

        assert_eq!(env.get("URL1"), Some("https://ambient.example"));
    }

    #[test]
    #[serial]
    fn test_from_parts_ignores_process_environment() {
        std::env::set_var("CHAINKIT_REFERENCED", "leaked");
        let (_dir, path) = write_secrets("URL1=${CHAINKIT_REFERENCED}\nURL2=$CHAINKIT_REFERENCED\n");

        let env = Environment::from_parts(Vec::<(String, String)>::new(), &path);
        std::env::remove_var("CHAINKIT_REFERENCED");

        assert_eq!(env.get("URL1"), Some("${CHAINKIT_REFERENCED}"));
        assert_eq!(env.get("URL2"), Some("$CHAINKIT_REFERENCED"));
        assert!(!env.contains("CHAINKIT_REFERENCED"));
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_non_utf8_ambient_value_still_counts_as_set() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        std::env::set_var("CHAINKIT_RAW_KEY", OsStr::from_bytes(b"0x\xff"));
        let (_dir, path) = write_secrets("CHAINKIT_RAW_KEY=from-file\n");

        let env = Environment::load(&path);
        std::env::remove_var("CHAINKIT_RAW_KEY");

        assert_eq!(env.get("CHAINKIT_RAW_KEY"), Some("0x\u{FFFD}"));
    }
}
