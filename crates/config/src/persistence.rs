#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Persistence {
    /// Optional path to the referral database.
    pub state_path: Option<PathBuf>,

    pub save_on_shutdown: bool,
}

impl Default for Persistence {
    fn default() -> Self {
        Self {
            state_path: None,
            save_on_shutdown: true,
        }
    }
}
