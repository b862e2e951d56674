//! Result materialization.
//!
//! ```text
//! Cursor ──▶ Materializer ──▶ Vec<T: Entity>    (split-sentinel hydration)
//!   │                     ├─▶ Vec<R: FromRow>   (tuples, raw values)
//!   │                     ├─▶ Value             (scalars)
//!   │                     └─▶ DataTable         (untyped, JSON export)
//!   └─ several result sets ──▶ MultiReader
//! ```

mod materializer;
mod reader;
mod row;
mod table;

pub use materializer::Materializer;
pub use reader::MultiReader;
pub(crate) use reader::convert;
pub use row::FromRow;
pub use table::DataTable;
