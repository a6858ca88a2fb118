//! Output formatting for run summaries.

mod json;
mod method;
mod table;
mod terminal;

pub use json::{to_json, to_json_pretty};
pub use method::{method_summary, parameter_suffix, result_sentence};
pub use table::{fdr_table, FDR_TABLE_HEADER};
pub use terminal::format_summary;
