#![forbid(unsafe_code)]

pub mod cli;
pub mod error;
pub mod navigation;
pub mod report;
pub mod signals;
