//! Server version probing.
//!
//! The version string decides which privilege vocabulary and role-attribute
//! set apply. Parsed once per reconciliation pass, never cached across
//! passes.

use serde::{Deserialize, Serialize};
use std::fmt;

use dbkeeper_core::{OperatorError, OperatorResult};

/// Backend product family, as reported by the version probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerProduct {
    Postgres,
    Cockroach,
    MySql,
}

impl ServerProduct {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerProduct::Postgres => "postgres",
            ServerProduct::Cockroach => "cockroach",
            ServerProduct::MySql => "mysql",
        }
    }
}

impl fmt::Display for ServerProduct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed `version()` probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerVersion {
    pub product: ServerProduct,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    pub fn new(product: ServerProduct, major: u32, minor: u32, patch: u32) -> Self {
        Self {
            product,
            major,
            minor,
            patch,
        }
    }

    /// Parse the raw `SELECT version()` (postgres family) or
    /// `SELECT VERSION()` (mysql) output.
    ///
    /// Accepted shapes:
    /// - `PostgreSQL 15.3 (Debian 15.3-1.pgdg120+1) on x86_64 ...`
    /// - `CockroachDB CCL v23.1.11 (x86_64-pc-linux-gnu, ...)`
    /// - `8.0.34` / `8.0.34-log`
    pub fn parse(raw: &str) -> OperatorResult<Self> {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix("PostgreSQL ") {
            let (major, minor, patch) = parse_triple(first_word(rest))?;
            return Ok(Self::new(ServerProduct::Postgres, major, minor, patch));
        }
        if raw.starts_with("CockroachDB") {
            let token = raw
                .split_whitespace()
                .find(|w| w.starts_with('v'))
                .ok_or_else(|| {
                    OperatorError::backend(format!("unparseable version string: {raw}"))
                })?;
            let (major, minor, patch) = parse_triple(&token[1..])?;
            return Ok(Self::new(ServerProduct::Cockroach, major, minor, patch));
        }
        if raw
            .chars()
            .next()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false)
        {
            let numeric = raw.split('-').next().unwrap_or(raw);
            let (major, minor, patch) = parse_triple(numeric)?;
            return Ok(Self::new(ServerProduct::MySql, major, minor, patch));
        }
        Err(OperatorError::backend(format!(
            "unrecognized server version string: {raw}"
        )))
    }

    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        self.major > major || (self.major == major && self.minor >= minor)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{}.{}",
            self.product, self.major, self.minor, self.patch
        )
    }
}

fn first_word(s: &str) -> &str {
    s.split_whitespace().next().unwrap_or(s)
}

fn parse_triple(s: &str) -> OperatorResult<(u32, u32, u32)> {
    let mut parts = s.split('.');
    let major = parse_part(parts.next(), s)?;
    let minor = parse_part(parts.next(), s).unwrap_or(0);
    let patch = parse_part(parts.next(), s).unwrap_or(0);
    Ok((major, minor, patch))
}

fn parse_part(part: Option<&str>, whole: &str) -> OperatorResult<u32> {
    part.ok_or_else(|| OperatorError::backend(format!("unparseable version number: {whole}")))?
        .trim_matches(|c: char| !c.is_ascii_digit())
        .parse::<u32>()
        .map_err(|_| OperatorError::backend(format!("unparseable version number: {whole}")))
}
