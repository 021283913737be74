//! Scan engine — fans the scoring engine out across a security universe.

pub mod scanner;

pub use scanner::{MarketScanner, ScanAborted, ScanConfig, ScanReport, SkippedSecurity};
