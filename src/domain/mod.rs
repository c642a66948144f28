//! Domain model: transactions and their status machine, screening decisions,
//! queue metrics, reports, and the ports the pipeline publishes through.

pub mod metrics;
pub mod ports;
pub mod report;
pub mod screening;
pub mod transaction;
