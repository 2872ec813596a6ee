#![forbid(unsafe_code)]

use super::Referrer;
use crate::error::Error;
use crate::persistence::{ReferrerRecord, SubresourceRecord};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::trace;

/// Referring host → subresource hosts it is known to need.
#[derive(Debug, Default)]
pub struct ReferralTable {
    referrers: BTreeMap<String, Referrer>,
}

impl ReferralTable {
    /// Record that a page on `referrer` led to `subresource`.
    pub fn suggest_host(&mut self, referrer: &str, subresource: &str, now: Instant) {
        if referrer.is_empty() || subresource.is_empty() || referrer == subresource {
            return;
        }
        let evicted = self
            .referrers
            .entry(referrer.to_owned())
            .or_default()
            .suggest_host(subresource, now);
        if let Some(evicted) = evicted {
            trace!(referrer, %evicted, added = subresource, "referral evicted");
        }
    }

    pub fn accrue_value(
        &mut self,
        referrer: &str,
        subresource: &str,
        delta: Duration,
    ) -> Result<(), Error> {
        let entry = self
            .referrers
            .get_mut(referrer)
            .ok_or_else(|| Error::UnknownReferrer {
                referrer: referrer.to_owned(),
            })?;
        if entry.accrue_value(subresource, delta) {
            Ok(())
        } else {
            Err(Error::UnknownSubresource {
                referrer: referrer.to_owned(),
                subresource: subresource.to_owned(),
            })
        }
    }

    pub fn get(&self, referrer: &str) -> Option<&Referrer> {
        self.referrers.get(referrer)
    }

    /// Learned subresources of `referrer`, in hostname order.
    pub fn subresources(&self, referrer: &str) -> Vec<String> {
        self.referrers
            .get(referrer)
            .map(|r| r.hosts().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.referrers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.referrers.is_empty()
    }

    pub fn clear(&mut self) {
        self.referrers.clear();
    }

    pub fn serialize(&self) -> Vec<ReferrerRecord> {
        self.referrers
            .iter()
            .filter(|(_, referrer)| !referrer.is_empty())
            .map(|(name, referrer)| ReferrerRecord {
                referrer: name.clone(),
                subresources: referrer
                    .iter()
                    .map(|(host, stats)| SubresourceRecord {
                        host: host.to_owned(),
                        latency_ms: u64::try_from(stats.latency().as_millis()).unwrap_or(u64::MAX),
                    })
                    .collect(),
            })
            .collect()
    }

    /// Merge saved associations into the table. Existing entries keep their
    /// age and gain the saved latency on top of what they already have.
    pub fn deserialize(&mut self, records: &[ReferrerRecord], now: Instant) {
        for record in records {
            for sub in &record.subresources {
                self.suggest_host(&record.referrer, &sub.host, now);
                // the host may have been refused or evicted right away
                let _ = self.accrue_value(
                    &record.referrer,
                    &sub.host,
                    Duration::from_millis(sub.latency_ms),
                );
            }
        }
    }
}
