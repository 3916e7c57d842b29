use crate::store;
use crate::store::reply::Kind;

/// Result of one primitive command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Nil,
    Integer(i64),
    Bulk(Vec<u8>),
    Members(Vec<Vec<u8>>),
    Done,
}

impl Reply {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Reply::Nil => "nil",
            Reply::Integer(_) => "integer",
            Reply::Bulk(_) => "bulk",
            Reply::Members(_) => "members",
            Reply::Done => "done",
        }
    }
}

impl From<Reply> for store::Reply {
    fn from(reply: Reply) -> Self {
        let kind = match reply {
            Reply::Nil => Kind::Nil(true),
            Reply::Integer(n) => Kind::Integer(n),
            Reply::Bulk(bytes) => Kind::Bulk(bytes),
            Reply::Members(items) => Kind::Members(store::Members { items }),
            Reply::Done => Kind::Done(true),
        };
        store::Reply { kind: Some(kind) }
    }
}

impl From<store::Reply> for Reply {
    fn from(reply: store::Reply) -> Self {
        match reply.kind {
            None | Some(Kind::Nil(_)) => Reply::Nil,
            Some(Kind::Integer(n)) => Reply::Integer(n),
            Some(Kind::Bulk(bytes)) => Reply::Bulk(bytes),
            Some(Kind::Members(members)) => Reply::Members(members.items),
            Some(Kind::Done(_)) => Reply::Done,
        }
    }
}
