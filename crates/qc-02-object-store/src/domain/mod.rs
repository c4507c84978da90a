//! Domain layer: the copy-on-write buffer and the typed, undo-tracked
//! table that `Database` composes into a multi-table store.

pub mod cow;
pub mod table;

pub use cow::CowBytes;
pub use table::{Table, TableSchema};
