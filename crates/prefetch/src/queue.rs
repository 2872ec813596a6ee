#![forbid(unsafe_code)]

use crate::domain::Motivation;
use std::collections::VecDeque;

/// Hostnames waiting for a worker.
///
/// Two FIFO lanes: urgent names (see [`Motivation::is_urgent`]) are always
/// handed out before background ones. The queue does not deduplicate; the
/// scheduler only pushes names whose record just moved to `Queued`.
#[derive(Debug, Default)]
pub struct HostNameQueue {
    rush: VecDeque<String>,
    background: VecDeque<String>,
}

impl HostNameQueue {
    pub fn push(&mut self, hostname: impl Into<String>, motivation: Motivation) {
        if motivation.is_urgent() {
            self.rush.push_back(hostname.into());
        } else {
            self.background.push_back(hostname.into());
        }
    }

    pub fn pop(&mut self) -> Option<String> {
        self.rush.pop_front().or_else(|| self.background.pop_front())
    }

    pub fn len(&self) -> usize {
        self.rush.len() + self.background.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rush.is_empty() && self.background.is_empty()
    }

    /// Waiting names in the order they will be handed out.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.rush.iter().chain(&self.background).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn urgent_names_jump_the_line() {
        let mut queue = HostNameQueue::default();
        queue.push("scan-1.example", Motivation::PageScan);
        queue.push("scan-2.example", Motivation::StartupList);
        queue.push("hover.example", Motivation::MouseOver);
        queue.push("learned.example", Motivation::LearnedReferral);
        assert_eq!(queue.len(), 4);
        assert_eq!(
            queue.iter().collect::<Vec<_>>(),
            [
                "hover.example",
                "learned.example",
                "scan-1.example",
                "scan-2.example"
            ]
        );

        let order: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(
            order,
            [
                "hover.example",
                "learned.example",
                "scan-1.example",
                "scan-2.example"
            ]
        );
        assert!(queue.is_empty());
    }
}
