//! Postgres ACL (`aclitem`) parsing.
//!
//! Catalog columns like `pg_database.datacl` and `pg_default_acl.defaclacl`
//! store grants as aclitem arrays, e.g. `{app=arwd/owner,=r/owner}`. Each
//! item is `grantee=letters/grantor`; an empty grantee means PUBLIC and a
//! `*` suffix on a letter marks the grant option (ignored here).

use std::collections::BTreeSet;

/// One parsed aclitem entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEntry {
    /// Empty string for PUBLIC.
    pub grantee: String,
    pub grantor: String,
    /// Raw privilege letters, grant-option markers stripped.
    pub letters: Vec<char>,
}

/// Map one aclitem letter to its privilege token.
pub fn letter_to_privilege(letter: char) -> Option<&'static str> {
    Some(match letter {
        'r' => "SELECT",
        'a' => "INSERT",
        'w' => "UPDATE",
        'd' => "DELETE",
        'D' => "TRUNCATE",
        'x' => "REFERENCES",
        't' => "TRIGGER",
        'C' => "CREATE",
        'c' => "CONNECT",
        'T' => "TEMPORARY",
        'U' => "USAGE",
        'X' => "EXECUTE",
        _ => return None,
    })
}

/// Parse one aclitem (`grantee=letters/grantor`).
pub fn parse_acl_item(item: &str) -> Option<AclEntry> {
    let item = item.trim().trim_matches('"');
    let (grantee, rest) = item.split_once('=')?;
    let (letters, grantor) = rest.split_once('/')?;
    Some(AclEntry {
        grantee: grantee.to_string(),
        grantor: grantor.to_string(),
        letters: letters.chars().filter(|c| *c != '*').collect(),
    })
}

/// Parse a text-cast aclitem array (`{a=rw/o,b=r/o}`) into entries.
pub fn parse_acl_array(raw: &str) -> Vec<AclEntry> {
    raw.trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(parse_acl_item)
        .collect()
}

/// Privilege tokens a grantee holds according to an aclitem array.
pub fn privileges_for_grantee(raw: &str, grantee: &str) -> BTreeSet<String> {
    parse_acl_array(raw)
        .into_iter()
        .filter(|e| e.grantee == grantee)
        .flat_map(|e| e.letters)
        .filter_map(|l| letter_to_privilege(l).map(str::to_string))
        .collect()
}
