//! Checks that a reply has the shape its command promises.

use keyspace_types::Reply;

use crate::error::Error;

fn unexpected(command: &'static str, reply: &Reply) -> Error {
    Error::UnexpectedReply {
        command,
        reply: reply.kind_name(),
    }
}

pub(crate) fn done(command: &'static str, reply: Reply) -> Result<(), Error> {
    match reply {
        Reply::Done => Ok(()),
        other => Err(unexpected(command, &other)),
    }
}

pub(crate) fn integer(command: &'static str, reply: Reply) -> Result<i64, Error> {
    match reply {
        Reply::Integer(n) => Ok(n),
        other => Err(unexpected(command, &other)),
    }
}

pub(crate) fn count(command: &'static str, reply: Reply) -> Result<u64, Error> {
    let n = integer(command, reply)?;
    u64::try_from(n).map_err(|_| Error::UnexpectedReply {
        command,
        reply: "negative integer",
    })
}

pub(crate) fn flag(command: &'static str, reply: Reply) -> Result<bool, Error> {
    match integer(command, reply)? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(Error::UnexpectedReply {
            command,
            reply: "non-boolean integer",
        }),
    }
}

/// A missing value reads as empty.
pub(crate) fn bytes(command: &'static str, reply: Reply) -> Result<Vec<u8>, Error> {
    match reply {
        Reply::Bulk(bytes) => Ok(bytes),
        Reply::Nil => Ok(Vec::new()),
        other => Err(unexpected(command, &other)),
    }
}

pub(crate) fn members(command: &'static str, reply: Reply) -> Result<Vec<Vec<u8>>, Error> {
    match reply {
        Reply::Members(items) => Ok(items),
        Reply::Nil => Ok(Vec::new()),
        other => Err(unexpected(command, &other)),
    }
}
