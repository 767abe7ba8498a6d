//! Query helpers, one zero-sized repo struct per table.

pub mod report_repo;

pub use report_repo::ReportRepo;
