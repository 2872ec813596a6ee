#![forbid(unsafe_code)]

pub mod clock;
pub mod domain;
mod error;
pub mod persistence;
pub mod queue;
pub mod referral;
pub mod resolver;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{HostInfo, Motivation, PrefetchBenefit, ResolutionState};
pub use error::Error;
pub use persistence::{NoopRepository, ReferralRepository, ReferralSnapshot, SqliteRepository};
pub use resolver::{HostResolver, ResolveError, SystemResolver};
pub use scheduler::{Diagnostics, HostReport, Scheduler};
