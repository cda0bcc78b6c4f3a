#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod amm;
pub mod config;
pub mod errors;
pub mod rpc;
pub mod sync;
