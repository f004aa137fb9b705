//! Append-only log of bids in arrival order.

use crate::domain::Bid;
use std::sync::Arc;

/// An ordered, append-only sequence of bids.
///
/// The counterpart's offers and the agent's own offers are kept in separate logs.
#[derive(Debug, Clone, Default)]
pub struct OfferLog {
    entries: Vec<Arc<Bid>>,
}

impl OfferLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a bid after every bid already logged.
    pub fn append(&mut self, bid: Arc<Bid>) {
        self.entries.push(bid);
    }

    /// Returns the `n` most recent bids, oldest first. Shorter logs return everything.
    pub fn last(&self, n: usize) -> &[Arc<Bid>] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    /// Returns the two most recent bids as `(previous, latest)`.
    pub fn last_pair(&self) -> Option<(&Bid, &Bid)> {
        match self.last(2) {
            [prev, latest] => Some((prev.as_ref(), latest.as_ref())),
            _ => None,
        }
    }

    pub fn latest(&self) -> Option<&Arc<Bid>> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Bid>> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(price: i64) -> Arc<Bid> {
        Arc::new(Bid::new().with("price", price))
    }

    #[test]
    fn test_append_preserves_order() {
        let mut log = OfferLog::new();
        assert!(log.is_empty());
        assert!(log.latest().is_none());

        log.append(bid(10));
        log.append(bid(20));
        log.append(bid(30));

        assert_eq!(log.len(), 3);
        let prices: Vec<_> = log
            .iter()
            .map(|b| b.value_for("price").and_then(|v| v.as_i64()).unwrap())
            .collect();
        assert_eq!(prices, vec![10, 20, 30]);
        assert_eq!(log.latest().unwrap().as_ref(), bid(30).as_ref());
    }

    #[test]
    fn test_last_is_bounded_by_length() {
        let mut log = OfferLog::new();
        assert!(log.last(2).is_empty());

        log.append(bid(10));
        assert_eq!(log.last(5).len(), 1);

        log.append(bid(20));
        log.append(bid(30));
        let tail = log.last(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].as_ref(), bid(20).as_ref());
        assert_eq!(tail[1].as_ref(), bid(30).as_ref());
    }

    #[test]
    fn test_last_pair_needs_two_entries() {
        let mut log = OfferLog::new();
        log.append(bid(10));
        assert!(log.last_pair().is_none());

        log.append(bid(20));
        let (prev, latest) = log.last_pair().unwrap();
        assert_eq!(prev, bid(10).as_ref());
        assert_eq!(latest, bid(20).as_ref());
    }

    #[test]
    fn test_shared_bids_are_not_copied() {
        let shared = bid(10);
        let mut log = OfferLog::new();
        log.append(Arc::clone(&shared));
        assert!(Arc::ptr_eq(log.latest().unwrap(), &shared));
    }
}
