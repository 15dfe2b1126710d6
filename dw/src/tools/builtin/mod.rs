//! Built-in tools

mod search_in_file;

pub use search_in_file::SearchInFileTool;
