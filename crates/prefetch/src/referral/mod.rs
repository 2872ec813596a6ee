#![forbid(unsafe_code)]

mod referrer;
mod table;

pub use referrer::{MAX_SUGGESTIONS, ReferralStats, Referrer};
pub use table::ReferralTable;
