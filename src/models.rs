/// Stored kind of a key, as persisted in `entries.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Bytes,
    Set,
}

impl Kind {
    pub fn as_i64(self) -> i64 {
        match self {
            Kind::Bytes => 0,
            Kind::Set => 1,
        }
    }

    pub fn from_i64(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(Kind::Bytes),
            1 => Some(Kind::Set),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Kind::Bytes => "bytes",
            Kind::Set => "set",
        }
    }
}

/// A live (not expired) key as read inside a batch.
#[derive(Debug, Clone)]
pub struct Entry {
    pub kind: Kind,
    pub value: Vec<u8>,
    pub expire_at: Option<i64>,
}
