//! CLI command handlers

pub mod common;
pub mod logout;
pub mod pair;
pub mod renew;
pub mod status;
