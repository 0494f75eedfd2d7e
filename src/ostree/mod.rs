pub mod executor;
pub mod parser;
pub mod repository;
pub mod version;

// Re-export commonly used types
pub use executor::{CommandOutput, Diagnostics, OstreeExecutor};
pub use parser::{
    CommitRecord, DiffEntry, DiffEntryKind, FileEntry, FileEntryKind, Parsed, parse_commit,
    parse_diff, parse_diff_line, parse_file_entry, parse_listing, parse_log, parse_refs,
    parse_show,
};
pub use repository::{Repository, Response};
pub use version::OstreeVersion;
