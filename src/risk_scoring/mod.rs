//! Risk scoring domain: package graphs, advisories, reports and scans, plus
//! the pure services that traverse and score graphs.

pub mod domain;
pub mod services;
