//! Brokerage credential persistence (spec §6): the on-disk JSON shape an
//! OAuth-style brokerage session is cached under, plus load/save helpers.
//!
//! There is no teacher analogue — `bog-core` never persists credentials,
//! it authenticates against an in-process market-data feed — so this is
//! grounded directly in spec §6's wire shape, using this crate's existing
//! `serde_json` dependency the same way the teacher's journal
//! (`monitoring::journal`, read via other example files) persists
//! newline-delimited JSON state to disk.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cached brokerage session credentials (spec §6: `{accessToken,
/// refreshToken, issuedAt, expiresIn}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub access_token: String,
    pub refresh_token: String,
    pub issued_at: DateTime<Utc>,
    /// Seconds after `issued_at` the access token stops being valid.
    pub expires_in: i64,
}

impl StoredCredentials {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>, issued_at: DateTime<Utc>, expires_in: i64) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            issued_at,
            expires_in,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + chrono::Duration::seconds(self.expires_in)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Reads and parses the credential file at `path`. Missing file and
    /// malformed JSON are both reported through `anyhow::Error` rather than
    /// distinguished, since both require the same remedy: re-authenticate
    /// and call [`StoredCredentials::save`] again.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Writes the credentials to `path` as pretty-printed JSON, creating
    /// parent directories if necessary.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let issued_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let creds = StoredCredentials::new("access-1", "refresh-1", issued_at, 1_800);

        creds.save(&path).unwrap();
        let loaded = StoredCredentials::load(&path).unwrap();
        assert_eq!(loaded, creds);
    }

    #[test]
    fn save_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("credentials.json");
        let creds = StoredCredentials::new("a", "r", Utc::now(), 60);
        creds.save(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn expiry_is_computed_from_issued_at_plus_expires_in() {
        let issued_at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let creds = StoredCredentials::new("a", "r", issued_at, 3_600);
        let just_before = issued_at + chrono::Duration::minutes(59);
        let just_after = issued_at + chrono::Duration::hours(1) + chrono::Duration::seconds(1);
        assert!(!creds.is_expired(just_before));
        assert!(creds.is_expired(just_after));
    }

    #[test]
    fn loading_a_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(StoredCredentials::load(&path).is_err());
    }
}
