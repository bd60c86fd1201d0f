//! Identifier and literal quoting.
//!
//! Identifiers are always escaped with dialect-correct quoting before
//! interpolation; privilege tokens are validated against an allow-list
//! elsewhere since they cannot be parameterized.

/// Quote an identifier for the postgres family: `"name"`, doubling any
/// embedded double quote.
pub fn ident_pg(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote an identifier for mysql: `` `name` ``, doubling any embedded
/// backtick.
pub fn ident_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a string literal: `'value'`, doubling any embedded single quote.
pub fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote a mysql account name: `'user'@'%'`.
pub fn account_mysql(user: &str) -> String {
    format!("{}@'%'", literal(user))
}
