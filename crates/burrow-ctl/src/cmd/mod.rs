//! CLI command modules.

pub mod fingerprint;
pub mod lookup;
