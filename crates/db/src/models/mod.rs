//! Row structs and DTOs.

pub mod report;
