//! Domain types and pure algorithms for road-damage video assessment.
//!
//! Nothing in this crate talks to a database or the network. The async
//! pipeline stages live in `crackx-pipeline`; persistence lives in
//! `crackx-db`.

pub mod detection;
pub mod error;
pub mod ffmpeg;
pub mod report;
pub mod sampling;
pub mod types;
pub mod verdict;
