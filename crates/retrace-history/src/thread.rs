use retrace_core::{Message, RetraceError, RetraceResult};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Arena of messages keyed by id, in insertion order.
///
/// Predecessor links are resolved through the index rather than through
/// embedded pointers, so cycle and broken-link detection reduce to a
/// visited-set walk. The index makes no validity assumptions about the
/// links it holds: persisted data may contain dangling references (pruned
/// history) and, if corrupted, loops.
#[derive(Debug, Default)]
pub struct ThreadIndex {
    messages: Vec<Message>,
    by_id: HashMap<Uuid, usize>,
}

impl ThreadIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from messages in iteration order.
    pub fn from_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        let mut index = Self::new();
        for message in messages {
            index.push(message);
        }
        index
    }

    /// Appends a message. A duplicate id is ignored (first insertion wins).
    pub fn push(&mut self, message: Message) {
        if self.by_id.contains_key(&message.id) {
            return;
        }
        self.by_id.insert(message.id, self.messages.len());
        self.messages.push(message);
    }

    /// Looks up a message by id.
    pub fn get(&self, id: Uuid) -> Option<&Message> {
        self.by_id.get(&id).map(|&slot| &self.messages[slot])
    }

    /// True when the id is present.
    pub fn contains(&self, id: Uuid) -> bool {
        self.by_id.contains_key(&id)
    }

    /// All messages in insertion order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages held.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when the index holds no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The ancestor chain ending at and including `target`, root-first.
    ///
    /// Fails with [`RetraceError::MessageNotFound`] when `target` is absent,
    /// [`RetraceError::Cycle`] when the walk revisits an id, and
    /// [`RetraceError::BrokenChain`] when a link points at a missing
    /// message; the broken-chain error carries the reachable portion,
    /// oldest-first and still ending at `target`.
    pub fn chain_to(&self, target: Uuid) -> RetraceResult<Vec<Message>> {
        if !self.contains(target) {
            return Err(RetraceError::MessageNotFound(target));
        }

        let mut chain: Vec<Message> = Vec::new();
        let mut visited: HashSet<Uuid> = HashSet::new();
        let mut cursor = Some(target);

        while let Some(id) = cursor {
            if !visited.insert(id) {
                return Err(RetraceError::Cycle { at: id });
            }
            match self.get(id) {
                Some(message) => {
                    chain.push(message.clone());
                    cursor = message.previous_id;
                }
                None => {
                    // The dangling link belongs to the message walked last.
                    let referrer = chain.last().map_or(target, |m| m.id);
                    chain.reverse();
                    return Err(RetraceError::BrokenChain {
                        referrer,
                        missing: id,
                        partial: chain,
                    });
                }
            }
        }

        chain.reverse();
        Ok(chain)
    }

    /// Messages no other message references as predecessor, in insertion
    /// order.
    pub fn leaves(&self) -> Vec<&Message> {
        let referenced: HashSet<Uuid> = self
            .messages
            .iter()
            .filter_map(|m| m.previous_id)
            .collect();
        self.messages
            .iter()
            .filter(|m| !referenced.contains(&m.id))
            .collect()
    }

    /// The most recently created leaf; ties go to the latest-inserted one.
    pub fn latest_leaf(&self) -> Option<&Message> {
        let referenced: HashSet<Uuid> = self
            .messages
            .iter()
            .filter_map(|m| m.previous_id)
            .collect();
        self.messages
            .iter()
            .enumerate()
            .filter(|(_, m)| !referenced.contains(&m.id))
            .max_by_key(|(slot, m)| (m.created_at, *slot))
            .map(|(_, m)| m)
    }

    /// The canonical path: the latest leaf's ancestor chain, root-first.
    ///
    /// An empty index yields an empty vec. A non-empty index with no leaf
    /// at all means every message sits on a loop, reported as
    /// [`RetraceError::Cycle`].
    pub fn canonical_path(&self) -> RetraceResult<Vec<Message>> {
        match self.latest_leaf() {
            Some(leaf) => self.chain_to(leaf.id),
            None if self.messages.is_empty() => Ok(Vec::new()),
            None => Err(RetraceError::Cycle {
                at: self.messages[0].id,
            }),
        }
    }

    /// The last `limit` messages of the canonical path, oldest-first.
    ///
    /// `limit == 0` yields an empty vec. A broken link above the window
    /// degrades to the reachable suffix rather than failing; cycles stay
    /// hard errors.
    pub fn recent_window(&self, limit: usize) -> RetraceResult<Vec<Message>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut path = match self.canonical_path() {
            Ok(chain) => chain,
            Err(RetraceError::BrokenChain { partial, .. }) => partial,
            Err(e) => return Err(e),
        };
        if path.len() > limit {
            path = path.split_off(path.len() - limit);
        }
        Ok(path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    /// Helper: a linear chain m1 <- m2 <- ... of `len` messages, one second
    /// apart.
    fn linear_chain(len: usize) -> (ThreadIndex, Vec<Uuid>) {
        let session = Uuid::new_v4();
        let base = Utc::now();
        let mut index = ThreadIndex::new();
        let mut ids = Vec::new();
        let mut previous: Option<Uuid> = None;
        for i in 0..len {
            let mut message = Message::new(session, format!("msg {i}"));
            message.previous_id = previous;
            message.created_at = base + Duration::seconds(i as i64);
            previous = Some(message.id);
            ids.push(message.id);
            index.push(message);
        }
        (index, ids)
    }

    #[test]
    fn chain_to_returns_root_first() {
        let (index, ids) = linear_chain(3);
        let chain = index.chain_to(ids[2]).unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].id, ids[0]);
        assert_eq!(chain[1].id, ids[1]);
        assert_eq!(chain[2].id, ids[2]);
    }

    #[test]
    fn chain_second_to_last_is_previous() {
        let (index, ids) = linear_chain(4);
        let chain = index.chain_to(ids[3]).unwrap();
        let target = chain.last().unwrap();
        assert_eq!(chain[chain.len() - 2].id, target.previous_id.unwrap());
    }

    #[test]
    fn chain_to_unknown_id_is_not_found() {
        let (index, _) = linear_chain(2);
        let err = index.chain_to(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, RetraceError::MessageNotFound(_)));
    }

    #[test]
    fn chain_to_detects_two_node_cycle() {
        let session = Uuid::new_v4();
        let mut a = Message::new(session, "a");
        let mut b = Message::new(session, "b");
        a.previous_id = Some(b.id);
        b.previous_id = Some(a.id);
        let a_id = a.id;
        let index = ThreadIndex::from_messages([a, b]);

        let err = index.chain_to(a_id).unwrap_err();
        assert!(matches!(err, RetraceError::Cycle { .. }));
    }

    #[test]
    fn chain_to_detects_self_reference() {
        let session = Uuid::new_v4();
        let mut a = Message::new(session, "a");
        a.previous_id = Some(a.id);
        let a_id = a.id;
        let index = ThreadIndex::from_messages([a]);

        let err = index.chain_to(a_id).unwrap_err();
        assert!(matches!(err, RetraceError::Cycle { at } if at == a_id));
    }

    #[test]
    fn broken_chain_carries_reachable_partial() {
        let session = Uuid::new_v4();
        let missing_id = Uuid::new_v4();
        let mut b = Message::new(session, "b");
        b.previous_id = Some(missing_id);
        let c = Message::reply_to(&b, "c");
        let b_id = b.id;
        let c_id = c.id;
        let index = ThreadIndex::from_messages([b, c]);

        match index.chain_to(c_id).unwrap_err() {
            RetraceError::BrokenChain {
                referrer,
                missing,
                partial,
            } => {
                assert_eq!(referrer, b_id);
                assert_eq!(missing, missing_id);
                assert_eq!(partial.len(), 2);
                assert_eq!(partial[0].id, b_id);
                assert_eq!(partial[1].id, c_id);
            }
            other => panic!("expected BrokenChain, got {other:?}"),
        }
    }

    #[test]
    fn latest_leaf_picks_newest_branch() {
        let session = Uuid::new_v4();
        let base = Utc::now();
        let mut root = Message::new(session, "root");
        root.created_at = base;

        // Two branches off the root; the second is created later.
        let mut old_branch = Message::reply_to(&root, "old");
        old_branch.created_at = base + Duration::seconds(1);
        let mut new_branch = Message::reply_to(&root, "new");
        new_branch.created_at = base + Duration::seconds(2);

        let new_id = new_branch.id;
        let index = ThreadIndex::from_messages([root, old_branch, new_branch]);

        assert_eq!(index.leaves().len(), 2);
        assert_eq!(index.latest_leaf().unwrap().id, new_id);
    }

    #[test]
    fn latest_leaf_tie_goes_to_latest_inserted() {
        let session = Uuid::new_v4();
        let at = Utc::now();
        let mut first = Message::new(session, "first");
        first.created_at = at;
        let mut second = Message::new(session, "second");
        second.created_at = at;
        let second_id = second.id;

        let index = ThreadIndex::from_messages([first, second]);
        assert_eq!(index.latest_leaf().unwrap().id, second_id);
    }

    #[test]
    fn canonical_path_empty_index() {
        let index = ThreadIndex::new();
        assert!(index.canonical_path().unwrap().is_empty());
    }

    #[test]
    fn canonical_path_all_loops_is_cycle() {
        let session = Uuid::new_v4();
        let mut a = Message::new(session, "a");
        let mut b = Message::new(session, "b");
        a.previous_id = Some(b.id);
        b.previous_id = Some(a.id);
        let index = ThreadIndex::from_messages([a, b]);

        let err = index.canonical_path().unwrap_err();
        assert!(matches!(err, RetraceError::Cycle { .. }));
    }

    #[test]
    fn recent_window_takes_newest_suffix() {
        let (index, ids) = linear_chain(5);
        let window = index.recent_window(2).unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].id, ids[3]);
        assert_eq!(window[1].id, ids[4]);
    }

    #[test]
    fn recent_window_zero_limit_is_empty() {
        let (index, _) = linear_chain(3);
        assert!(index.recent_window(0).unwrap().is_empty());
    }

    #[test]
    fn recent_window_shorter_chain_returns_all() {
        let (index, _) = linear_chain(3);
        assert_eq!(index.recent_window(10).unwrap().len(), 3);
    }

    #[test]
    fn recent_window_degrades_on_broken_link() {
        let session = Uuid::new_v4();
        let base = Utc::now();
        let mut b = Message::new(session, "b");
        b.previous_id = Some(Uuid::new_v4());
        b.created_at = base;
        let mut c = Message::reply_to(&b, "c");
        c.created_at = base + Duration::seconds(1);
        let b_id = b.id;
        let c_id = c.id;

        let index = ThreadIndex::from_messages([b, c]);
        let window = index.recent_window(10).unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].id, b_id);
        assert_eq!(window[1].id, c_id);
    }

    #[test]
    fn duplicate_push_keeps_first() {
        let session = Uuid::new_v4();
        let message = Message::new(session, "original");
        let mut altered = message.clone();
        altered.request = "altered".into();

        let mut index = ThreadIndex::new();
        index.push(message.clone());
        index.push(altered);

        assert_eq!(index.len(), 1);
        assert_eq!(index.get(message.id).unwrap().request, message.request);
    }
}
