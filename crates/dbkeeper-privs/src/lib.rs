//! dbkeeper privilege convergence.
//!
//! Turns declared [`DbPriv`](dbkeeper_core::resources::DbPriv) entries into
//! the minimal grant/revoke statements needed to make a principal's live
//! privileges match: classify the scope, normalize and validate the tokens,
//! read the live set through the dialect adapter, diff, apply.

pub mod engine;
pub mod flags;
pub mod normalize;

pub use engine::{update_user_privs, AdapterProvider, PrivsReconciler};
pub use flags::parse_role_flags;
pub use normalize::{classify, normalize, PrivScope};
