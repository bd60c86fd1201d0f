//! dbkeeper dialect adapters.
//!
//! One fixed capability set ([`adapter::DialectAdapter`]) over three SQL
//! backends: postgres (primary), cockroach (distributed variant sharing most
//! of the grammar) and mysql (divergent grant syntax and catalog shape).
//! All statement execution flows through the [`runner::SqlRunner`] seam;
//! real runners live in dbkeeper-conn.

pub mod acl;
pub mod adapter;
pub mod cockroach;
pub mod mysql;
pub mod postgres;
pub mod quote;
pub mod runner;
pub mod version;
pub mod vocab;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{adapter_for, DialectAdapter, PrivSet, RoleFlagState, TableRef};
pub use runner::{SqlRow, SqlRunner};
pub use version::{ServerProduct, ServerVersion};
pub use vocab::ScopeKind;
