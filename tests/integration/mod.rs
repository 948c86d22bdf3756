//! tests/integration/mod.rs

mod dedup_and_liveness;
mod reliability;
mod sequencing;
