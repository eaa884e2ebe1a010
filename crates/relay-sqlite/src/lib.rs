//! SQLite turn log.
//!
//! Implements `relay_core::context::ContextStore` over a single `turns` table:
//!
//! ```sql
//! turns(id INTEGER PRIMARY KEY AUTOINCREMENT, user_id, role, text, tokens,
//!       archived, created_at)   -- index (user_id, created_at DESC)
//! ```
//!
//! Every statement is a single-row insert or a single UPDATE/DELETE, so no
//! explicit transactions are needed.

mod pool;
mod store;

pub use pool::connect;
pub use store::SqliteContextStore;
