use std::process::ExitCode;

use crate::cli::run;

pub mod catalog;
pub mod cli;
mod config;
pub mod domain;
pub mod http;
mod public_endpoint;
pub mod session;
pub mod storage;
pub mod tag;

fn main() -> ExitCode {
    run()
}
