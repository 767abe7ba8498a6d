//! Video damage-assessment pipeline.
//!
//! [`driver::PollingDriver`] repeatedly scans the report store for pending
//! video reports and runs each one, sequentially, through
//! fetch → sample → detect → update → cleanup. A failure in any stage
//! aborts only that report; the report stays pending and is retried on a
//! later cycle.
//!
//! External collaborators sit behind traits so adapters can be swapped:
//! [`store::ReportStore`], [`fetcher::VideoFetcher`],
//! [`sampler::FrameSampler`] and [`detector::DetectionPort`].

pub mod aggregator;
pub mod config;
pub mod detector;
pub mod driver;
pub mod error;
pub mod fetcher;
pub mod janitor;
pub mod sampler;
pub mod scanner;
pub mod scratch;
pub mod store;
pub mod updater;
