//! Running compiled commands.
//!
//! ```text
//! Commands ──▶ BatchPlan ──▶ BatchRun (Begin / Execute / Commit) ──▶ Cursor ──▶ Materializer
//!                              ▲                      ▲
//!                        Session (blocking)    AsyncSession (awaiting)
//! ```
//!
//! Providers plug in through [`Connection`] or [`AsyncConnection`]; the
//! [`sqlite`] module is the reference implementation.

mod async_session;
mod batch;
mod changeset;
mod cursor;
mod provider;
mod session;
pub mod sqlite;

pub use async_session::{AsyncSession, SharedQuery};
pub use batch::{BatchPlan, BatchRun, Step};
pub use changeset::ChangeSet;
pub use cursor::{BufferedCursor, ResultSet};
pub use provider::{
    AsyncConnection, Connection, Cursor, ProviderError, ProviderResult, ValueEncoder,
};
pub use session::Session;
pub use sqlite::{AsyncSqliteConnection, SqliteConnection, SqliteEncoder};
