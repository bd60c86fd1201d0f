//! dbkeeper connection provider.
//!
//! Resolves logical (server, database, acting user) triples to live,
//! per-pass cached connection handles. The provider owns every handle it
//! opens; callers only ever see the [`SqlRunner`](dbkeeper_dialect::SqlRunner)
//! seam and must not retain it beyond the pass.

pub mod pool;
pub mod provider;
pub mod resolver;

pub use pool::{Handle, HandleCloser, PoolFactory, SqlxPoolFactory};
pub use provider::ConnectionProvider;
pub use resolver::{Credential, ServerInfo, ServerResolver};
