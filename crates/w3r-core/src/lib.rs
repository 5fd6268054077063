//! w3r-core: Witcher 3 save decoding and tracker report extraction
//!
//! This crate focuses on a small, well-factored surface:
//! - Save reader (LZ4 chunk container + SAV3 variable image) producing a generic attribute tree
//! - Typed quest journal statuses decoded from `CJournalManager`
//! - Report projection (map pin tags + quest statuses) and JSON/CSV export
//! - Save directory discovery and a tree JSON dump for CLI use
//!
pub mod binfmt;
pub mod binfmt_write;
pub mod error;
pub mod export;
pub mod journal;
pub mod json;
pub mod model;
pub mod report;
pub mod saves;

pub use binfmt::{ReadLevel, SaveGame, SaveHeader, read_save, read_save_file};
pub use binfmt_write::{WriteOpts, write_save, write_save_file};
pub use error::{Error, Result};
pub use export::{
    ExportConfig, OutputFormat, report_from_json, to_csv_string, to_json_string, write_report,
};
pub use journal::{QuestStatus, QuestStatusRecord};
pub use model::{AttributeNode, Guid, NodeKind, Scalar};
pub use report::{
    QuestStatusEntry, Report, build_report, extract_map_pin_tags, extract_quests,
};
