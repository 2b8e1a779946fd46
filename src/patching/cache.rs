//! Persistent record of the methods a pass rewrote.
//!
//! A full scan of a large module is slow, while the set of methods that actually touch the
//! tracked fields is small and stable. After a full scan the pass writes the `(type, method)`
//! pairs it changed to a cache file; the next run with the same fingerprint replays the rewrite
//! on exactly those methods.
//!
//! # File Format
//!
//! UTF-8 text, one record per line:
//!
//! ```text
//! X 0.3.2 // 2025-09-04T17:12:09Z
//! T GameManager
//! M System.Void GameManager::TimePassesElsewhere()
//! M System.Boolean GameManager::CanSave()
//! E
//! ```
//!
//! `X` carries the fingerprint, `T` opens a block for a type, `M` lists a rewritten method and
//! `E` closes the block. A fingerprint that differs from the current one, an absent file and
//! any other corruption all read as "no cache". A block that is never closed is reported as an
//! error instead, since the writer always closes its blocks.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    io::{self, Write},
    path::Path,
};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Error, Result};

/// Builds the fingerprint of a cache: tool version plus the modification time of the target.
///
/// # Errors
///
/// Returns [`crate::Error::FileError`] if the target's metadata can not be read.
pub fn fingerprint(tool_version: &str, target: &Path) -> Result<String> {
    let modified = fs::metadata(target)?.modified()?;
    let timestamp: DateTime<Utc> = modified.into();
    Ok(format!(
        "{tool_version} // {}",
        timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    ))
}

/// The methods rewritten by one pass on one assembly, keyed by declaring type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchCache {
    fingerprint: String,
    entries: BTreeMap<String, BTreeSet<String>>,
}

enum Parsed {
    Cache(PatchCache),
    Stale(&'static str),
}

impl PatchCache {
    /// Creates an empty cache for `fingerprint`.
    pub fn new(fingerprint: impl Into<String>) -> Self {
        PatchCache {
            fingerprint: fingerprint.into(),
            entries: BTreeMap::new(),
        }
    }

    /// The fingerprint this cache is valid for.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Records that `method` of `type_name` was rewritten.
    pub fn add(&mut self, type_name: impl Into<String>, method: impl Into<String>) {
        self.entries
            .entry(type_name.into())
            .or_default()
            .insert(method.into());
    }

    /// Returns `true` if the pair was recorded.
    #[must_use]
    pub fn contains(&self, type_name: &str, method: &str) -> bool {
        self.entries
            .get(type_name)
            .is_some_and(|methods| methods.contains(method))
    }

    /// Number of recorded methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    /// Returns `true` if no method was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recorded types with their methods, ordered by type name.
    pub fn types(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.entries
            .iter()
            .map(|(type_name, methods)| (type_name.as_str(), methods))
    }

    /// Every recorded `(type, method)` pair.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(type_name, methods)| {
            methods
                .iter()
                .map(move |method| (type_name.as_str(), method.as_str()))
        })
    }

    /// Renders the cache in its file format.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut lines = vec![format!("X {}", self.fingerprint)];
        for (type_name, methods) in &self.entries {
            lines.push(format!("T {type_name}"));
            lines.extend(methods.iter().map(|method| format!("M {method}")));
            lines.push("E".to_string());
        }
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }

    /// Writes the cache to `path`, creating the parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] on I/O failure.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = io::BufWriter::new(fs::File::create(path)?);
        file.write_all(self.to_text().as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Reads the cache at `path` if it exists and was written for `expected_fingerprint`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::CacheMalformed`] if a block is missing its terminator. Every
    /// other problem yields `Ok(None)`.
    pub fn load(path: &Path, expected_fingerprint: &str) -> Result<Option<PatchCache>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("No patch cache at {}", path.display());
                return Ok(None);
            }
            Err(e) => {
                log::warn!("Failed to read patch cache {}: {e}", path.display());
                return Ok(None);
            }
        };

        match Self::parse(&text, &path.display().to_string(), expected_fingerprint)? {
            Parsed::Cache(cache) => Ok(Some(cache)),
            Parsed::Stale(reason) => {
                log::debug!("Ignoring patch cache {}: {reason}", path.display());
                Ok(None)
            }
        }
    }

    /// Parses cache text; see [`PatchCache::load`] for the outcomes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::CacheMalformed`] if a block is missing its terminator.
    pub fn from_text(
        text: &str,
        source: &str,
        expected_fingerprint: &str,
    ) -> Result<Option<PatchCache>> {
        match Self::parse(text, source, expected_fingerprint)? {
            Parsed::Cache(cache) => Ok(Some(cache)),
            Parsed::Stale(_) => Ok(None),
        }
    }

    fn parse(text: &str, source: &str, expected_fingerprint: &str) -> Result<Parsed> {
        let unterminated = |line: usize, type_name: &str| Error::CacheMalformed {
            path: source.to_string(),
            line,
            message: format!("block of {type_name} is missing its terminator"),
        };

        let mut cache = PatchCache::new(expected_fingerprint);
        let mut validated = false;
        let mut open: Option<(String, BTreeSet<String>)> = None;
        let mut last_line = 0;

        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;
            last_line = line_no;
            let line = line.trim_end_matches('\r');

            if let Some(fingerprint) = line.strip_prefix("X ") {
                if fingerprint != expected_fingerprint {
                    return Ok(Parsed::Stale("fingerprint mismatch"));
                }
                validated = true;
            } else if let Some(type_name) = line.strip_prefix("T ") {
                if let Some((open_type, _)) = &open {
                    return Err(unterminated(line_no, open_type));
                }
                open = Some((type_name.to_string(), BTreeSet::new()));
            } else if let Some(method) = line.strip_prefix("M ") {
                match open.as_mut() {
                    Some((_, methods)) => {
                        methods.insert(method.to_string());
                    }
                    None => return Ok(Parsed::Stale("method outside of a type block")),
                }
            } else if line == "E" || line.starts_with("E ") {
                match open.take() {
                    Some((_, methods)) if methods.is_empty() => {
                        return Ok(Parsed::Stale("empty type block"))
                    }
                    Some((type_name, methods)) => {
                        cache.entries.entry(type_name).or_default().extend(methods);
                    }
                    None => return Ok(Parsed::Stale("terminator without a type block")),
                }
            } else if !line.is_empty() {
                return Ok(Parsed::Stale("unrecognized line"));
            }
        }

        if let Some((type_name, _)) = open {
            return Err(unterminated(last_line, &type_name));
        }
        if !validated {
            return Ok(Parsed::Stale("no fingerprint"));
        }
        Ok(Parsed::Cache(cache))
    }
}
