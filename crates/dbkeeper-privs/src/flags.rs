//! Server-level role attribute parsing.
//!
//! `serverPrivs` is a comma list of role attributes, each optionally
//! `NO`-prefixed (`CREATEDB,NOLOGIN`). Parsing validates against the flag
//! set valid for the probed server version and fails closed, naming exactly
//! the tokens it rejected. Attributes not mentioned are left as-is.

use dbkeeper_core::{OperatorError, OperatorResult};
use dbkeeper_dialect::vocab::valid_role_flags;
use dbkeeper_dialect::{RoleFlagState, ServerVersion};

/// Parse a comma list of role attributes into desired flag states.
pub fn parse_role_flags(input: &str, version: &ServerVersion) -> OperatorResult<Vec<RoleFlagState>> {
    let valid = valid_role_flags(version);
    let mut flags = Vec::new();
    let mut invalid = Vec::new();

    for token in input.split(',') {
        let token = token.trim().to_ascii_uppercase();
        if token.is_empty() {
            continue;
        }
        if valid.contains(&token.as_str()) {
            flags.push(RoleFlagState::new(token, true));
            continue;
        }
        match token.strip_prefix("NO") {
            Some(rest) if valid.contains(&rest) => {
                flags.push(RoleFlagState::new(rest, false));
            }
            _ => invalid.push(token),
        }
    }

    if !invalid.is_empty() {
        return Err(OperatorError::invalid_spec(format!(
            "invalid server privileges for {}: {}",
            version,
            invalid.join(", ")
        )));
    }
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbkeeper_dialect::ServerProduct;

    fn pg15() -> ServerVersion {
        ServerVersion::new(ServerProduct::Postgres, 15, 3, 0)
    }

    #[test]
    fn parses_positive_and_negated_flags() {
        let flags = parse_role_flags("CREATEDB, nologin", &pg15()).unwrap();
        assert_eq!(flags.len(), 2);
        assert_eq!(flags[0], RoleFlagState::new("CREATEDB", true));
        assert_eq!(flags[1], RoleFlagState::new("LOGIN", false));
    }

    #[test]
    fn unknown_flags_are_named_in_the_error() {
        let err = parse_role_flags("CREATEDB,FLYING,NOWALKING", &pg15()).unwrap_err();
        assert!(err.is_invalid_spec());
        let text = err.to_string();
        assert!(text.contains("FLYING"));
        assert!(text.contains("NOWALKING"));
        assert!(!text.contains("CREATEDB,"));
    }

    #[test]
    fn version_gated_flags_are_rejected_on_old_servers() {
        let old = ServerVersion::new(ServerProduct::Postgres, 9, 0, 0);
        assert!(parse_role_flags("REPLICATION", &old).is_err());
        assert!(parse_role_flags("REPLICATION", &pg15()).is_ok());
    }

    #[test]
    fn every_flag_is_invalid_on_mysql() {
        let mysql = ServerVersion::new(ServerProduct::MySql, 8, 0, 34);
        let err = parse_role_flags("LOGIN", &mysql).unwrap_err();
        assert!(err.is_invalid_spec());
    }

    #[test]
    fn empty_input_yields_no_flags() {
        assert!(parse_role_flags("", &pg15()).unwrap().is_empty());
        assert!(parse_role_flags(" , ", &pg15()).unwrap().is_empty());
    }
}
