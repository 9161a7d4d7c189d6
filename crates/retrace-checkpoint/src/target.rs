use std::fmt;
use uuid::Uuid;

/// A checkpoint retrieval target: positional index or exact id.
///
/// Index 0 is the newest checkpoint of the (optionally session-scoped)
/// newest-first list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointRef {
    /// Position in the newest-first checkpoint list.
    Index(usize),
    /// Exact checkpoint id.
    Id(Uuid),
}

impl CheckpointRef {
    /// Parses user input into a target.
    ///
    /// Precedence: a string of digits is always an index; anything else
    /// must be a UUID. The two cannot genuinely collide — hyphenated UUIDs
    /// never parse as `usize`, and a 32-digit un-hyphenated UUID overflows
    /// it. Input that is neither (including the empty string) yields
    /// `None`: there is nothing it could match.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(index) = raw.parse::<usize>() {
            return Some(Self::Index(index));
        }
        Uuid::parse_str(raw).ok().map(Self::Id)
    }
}

impl From<usize> for CheckpointRef {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<Uuid> for CheckpointRef {
    fn from(id: Uuid) -> Self {
        Self::Id(id)
    }
}

impl fmt::Display for CheckpointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn digits_parse_as_index() {
        assert_eq!(CheckpointRef::parse("0"), Some(CheckpointRef::Index(0)));
        assert_eq!(CheckpointRef::parse(" 12 "), Some(CheckpointRef::Index(12)));
    }

    #[test]
    fn uuids_parse_as_id() {
        let id = Uuid::new_v4();
        assert_eq!(
            CheckpointRef::parse(&id.to_string()),
            Some(CheckpointRef::Id(id))
        );
    }

    #[test]
    fn hyphenless_uuid_still_resolves_as_id() {
        let id = Uuid::new_v4();
        let compact = id.simple().to_string();
        // 32 hex digits exceed usize even when all-numeric.
        assert_eq!(CheckpointRef::parse(&compact), Some(CheckpointRef::Id(id)));
    }

    #[test]
    fn garbage_matches_nothing() {
        assert_eq!(CheckpointRef::parse(""), None);
        assert_eq!(CheckpointRef::parse("   "), None);
        assert_eq!(CheckpointRef::parse("not-a-target"), None);
        assert_eq!(CheckpointRef::parse("-3"), None);
    }
}
