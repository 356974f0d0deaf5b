pub mod archive;
pub mod diff;
pub mod editor;
pub mod recipe;
pub mod report;


pub use archive::{list_entries, write_archive, ArchiveWriter};
pub use diff::{generate_unified_diff, print_diff, DiffStats};
pub use editor::{apply_recipe, read_strategy, survey, AnchorMiss, StrategyEditor, TransformOutcome};
pub use recipe::{AnchorInjection, FunctionReplacement, Methodology, Placement, Recipe};
pub use report::{FileReport, FileStatus, RunSummary};
