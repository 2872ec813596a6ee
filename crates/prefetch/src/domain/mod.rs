#![forbid(unsafe_code)]

mod host_info;
mod motivation;

pub use host_info::{HostInfo, PrefetchBenefit, ResolutionState};
pub use motivation::Motivation;
