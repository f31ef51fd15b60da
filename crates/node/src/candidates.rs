//! Round-robin queue of candidate peers.
//!
//! The front of the queue is the next peer to serve a sync request. Serving
//! a peer rotates it to the back, so a stable set of candidates is visited
//! in order: `[p1, p2, p3]` yields `p1, p2, p3, p1, ...`.
//!
//! A newly advertising peer is inserted at the front, ahead of the current
//! rotation point, so it is served before peers that were already waiting.

use ledger_sync_types::PeerId;
use std::collections::VecDeque;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateQueue {
    peers: VecDeque<PeerId>,
}

impl CandidateQueue {
    /// Build a queue serving `peers` in the given order.
    ///
    /// Duplicates are kept; a peer listed twice is served twice per cycle.
    pub fn new(peers: impl IntoIterator<Item = PeerId>) -> Self {
        Self {
            peers: peers.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.peers.contains(peer)
    }

    /// The peer that would be served next.
    pub fn front(&self) -> Option<PeerId> {
        self.peers.front().copied()
    }

    /// Take the next candidate and rotate it to the back.
    pub fn fetch_next(&mut self) -> Option<PeerId> {
        let peer = self.peers.pop_front()?;
        self.peers.push_back(peer);
        Some(peer)
    }

    /// Place `peer` ahead of the rotation point.
    ///
    /// Existing entries keep their relative order. A peer that is already
    /// queued is left where it is.
    pub fn insert(&mut self, peer: PeerId) {
        if !self.peers.contains(&peer) {
            self.peers.push_front(peer);
        }
    }

    /// Move `peer` from the front to the back, if it is at the front.
    ///
    /// Returns whether a rotation happened.
    pub fn rotate_past(&mut self, peer: &PeerId) -> bool {
        if self.peers.front() == Some(peer) {
            self.peers.rotate_left(1);
            true
        } else {
            false
        }
    }

    /// Drop every candidate for which `keep` returns false.
    ///
    /// Returns the number of candidates removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&PeerId) -> bool) -> usize {
        let before = self.peers.len();
        self.peers.retain(|peer| keep(peer));
        before - self.peers.len()
    }

    /// Peek the `n`-th peer the queue would serve, wrapping around.
    pub fn peek_nth(&self, n: usize) -> Option<PeerId> {
        if self.peers.is_empty() {
            return None;
        }
        self.peers.get(n % self.peers.len()).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerId> {
        self.peers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: u64) -> PeerId {
        PeerId(id)
    }

    fn serve(queue: &mut CandidateQueue, times: usize) -> Vec<PeerId> {
        (0..times).filter_map(|_| queue.fetch_next()).collect()
    }

    #[test]
    fn test_fetch_next_is_round_robin() {
        let mut queue = CandidateQueue::new([p(1), p(2), p(3)]);
        assert_eq!(serve(&mut queue, 4), vec![p(1), p(2), p(3), p(1)]);
    }

    #[test]
    fn test_insert_goes_ahead_of_rotation_point() {
        // p1 was served, so the rotation point is now p2.
        let mut queue = CandidateQueue::new([p(1), p(2), p(3)]);
        assert_eq!(queue.fetch_next(), Some(p(1)));

        queue.insert(p(4));

        assert_eq!(serve(&mut queue, 5), vec![p(4), p(2), p(3), p(1), p(4)]);
    }

    #[test]
    fn test_insert_twice_does_not_duplicate() {
        let mut queue = CandidateQueue::new([p(1), p(2)]);
        queue.insert(p(3));
        queue.insert(p(3));

        let peeked: Vec<_> = (0..6).filter_map(|n| queue.peek_nth(n)).collect();
        assert_eq!(peeked, vec![p(3), p(1), p(2), p(3), p(1), p(2)]);
    }

    #[test]
    fn test_insert_existing_keeps_order() {
        let mut queue = CandidateQueue::new([p(1), p(2), p(3)]);
        queue.insert(p(3));
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![p(1), p(2), p(3)]);
    }

    #[test]
    fn test_constructor_keeps_duplicates() {
        let mut queue = CandidateQueue::new([p(1), p(1), p(2)]);
        assert_eq!(queue.len(), 3);
        assert_eq!(serve(&mut queue, 3), vec![p(1), p(1), p(2)]);
    }

    #[test]
    fn test_rotate_past_only_moves_front() {
        let mut queue = CandidateQueue::new([p(1), p(2)]);
        assert!(!queue.rotate_past(&p(2)));
        assert_eq!(queue.front(), Some(p(1)));

        assert!(queue.rotate_past(&p(1)));
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![p(2), p(1)]);
    }

    #[test]
    fn test_retain_drops_superseded() {
        let mut queue = CandidateQueue::new([p(1), p(2), p(3)]);
        let removed = queue.retain(|peer| *peer != p(2));
        assert_eq!(removed, 1);
        assert_eq!(serve(&mut queue, 2), vec![p(1), p(3)]);
    }

    #[test]
    fn test_empty_queue() {
        let mut queue = CandidateQueue::default();
        assert!(queue.is_empty());
        assert_eq!(queue.fetch_next(), None);
        assert_eq!(queue.peek_nth(3), None);
    }
}
