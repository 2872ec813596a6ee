#![forbid(unsafe_code)]

use std::fmt;

/// Why a hostname was put in front of the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Motivation {
    MouseOver,
    PageScan,
    Omnibox,
    StartupList,
    LearnedReferral,
    StaticReferral,
    #[default]
    NoPrefetch,
}

impl Motivation {
    /// Names the user is about to hit, or that a referrer taught us to expect,
    /// jump ahead of background scans.
    pub fn is_urgent(self) -> bool {
        matches!(
            self,
            Motivation::MouseOver | Motivation::LearnedReferral | Motivation::StaticReferral
        )
    }

    pub fn is_referral(self) -> bool {
        matches!(
            self,
            Motivation::LearnedReferral | Motivation::StaticReferral
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Motivation::MouseOver => "mouse-over",
            Motivation::PageScan => "page-scan",
            Motivation::Omnibox => "omnibox",
            Motivation::StartupList => "startup-list",
            Motivation::LearnedReferral => "learned-referral",
            Motivation::StaticReferral => "static-referral",
            Motivation::NoPrefetch => "none",
        }
    }
}

impl fmt::Display for Motivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
