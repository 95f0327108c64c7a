//! Loading, inspecting and saving a tabular dataset.
//!
//! These are the first and last steps of every cleaning run: read the raw
//! file, look at what is in it, and write the cleaned result somewhere else.

pub mod inspect;
pub mod io;
pub mod naming;

pub use inspect::{ColumnProfile, DatasetProfile, inspect_df};
pub use io::{CsvOptions, load_df, load_df_lazy, save_df};
pub use naming::{sanitize_column_name, sanitize_column_names};
