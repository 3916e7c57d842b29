//! Typed primitive commands and their wire encoding.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::store;

/// Bitwise operation applied across several keys by [`Command::BitOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    And,
    Or,
    Xor,
}

impl BitOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BitOp::And => "AND",
            BitOp::Or => "OR",
            BitOp::Xor => "XOR",
        }
    }

    /// Combines two bytes.
    pub fn apply(&self, a: u8, b: u8) -> u8 {
        match self {
            BitOp::And => a & b,
            BitOp::Or => a | b,
            BitOp::Xor => a ^ b,
        }
    }
}

impl fmt::Display for BitOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BitOp {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AND" => Ok(BitOp::And),
            "OR" => Ok(BitOp::Or),
            "XOR" => Ok(BitOp::Xor),
            other => Err(DecodeError::InvalidArgument(format!(
                "unknown bit operation {other}"
            ))),
        }
    }
}

/// A primitive operation bound to one key (or, for `BitOp`, a destination
/// and its sources).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get { key: String },
    Set { key: String, value: Vec<u8> },
    BitLen { key: String },
    GetBit { key: String, offset: u64 },
    SetBit { key: String, offset: u64, value: bool },
    BitFill { key: String, from: u64, to: u64, value: bool },
    BitCount { key: String },
    BitNot { key: String },
    BitOp { op: BitOp, dest: String, sources: Vec<String> },
    Del { key: String },
    SMembers { key: String },
    SAdd { key: String, members: Vec<Vec<u8>> },
    SRem { key: String, members: Vec<Vec<u8>> },
    SIsMember { key: String, member: Vec<u8> },
    SCard { key: String },
    /// Succeeds only if the set at `key` holds exactly `members`, so a
    /// batch can be made conditional on a set it read earlier.
    SMatch { key: String, members: Vec<Vec<u8>> },
    PExpire { key: String, millis: u64 },
    PExpireAt { key: String, unix_millis: i64 },
    PTtl { key: String },
    Persist { key: String },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "GET",
            Command::Set { .. } => "SET",
            Command::BitLen { .. } => "BITLEN",
            Command::GetBit { .. } => "GETBIT",
            Command::SetBit { .. } => "SETBIT",
            Command::BitFill { .. } => "BITFILL",
            Command::BitCount { .. } => "BITCOUNT",
            Command::BitNot { .. } => "BITNOT",
            Command::BitOp { .. } => "BITOP",
            Command::Del { .. } => "DEL",
            Command::SMembers { .. } => "SMEMBERS",
            Command::SAdd { .. } => "SADD",
            Command::SRem { .. } => "SREM",
            Command::SIsMember { .. } => "SISMEMBER",
            Command::SCard { .. } => "SCARD",
            Command::SMatch { .. } => "SMATCH",
            Command::PExpire { .. } => "PEXPIRE",
            Command::PExpireAt { .. } => "PEXPIREAT",
            Command::PTtl { .. } => "PTTL",
            Command::Persist { .. } => "PERSIST",
        }
    }

    /// The key this command writes to or reads from first.
    pub fn key(&self) -> &str {
        match self {
            Command::BitOp { dest, .. } => dest,
            Command::Get { key }
            | Command::Set { key, .. }
            | Command::BitLen { key }
            | Command::GetBit { key, .. }
            | Command::SetBit { key, .. }
            | Command::BitFill { key, .. }
            | Command::BitCount { key }
            | Command::BitNot { key }
            | Command::Del { key }
            | Command::SMembers { key }
            | Command::SAdd { key, .. }
            | Command::SRem { key, .. }
            | Command::SIsMember { key, .. }
            | Command::SCard { key }
            | Command::SMatch { key, .. }
            | Command::PExpire { key, .. }
            | Command::PExpireAt { key, .. }
            | Command::PTtl { key }
            | Command::Persist { key } => key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown command {0}")]
    UnknownCommand(String),

    #[error("{0}")]
    InvalidArgument(String),
}

fn number(n: impl ToString) -> Vec<u8> {
    n.to_string().into_bytes()
}

fn flag(value: bool) -> Vec<u8> {
    if value { b"1".to_vec() } else { b"0".to_vec() }
}

impl From<Command> for store::Command {
    fn from(command: Command) -> Self {
        let name = command.name().to_string();
        let args = match command {
            Command::Get { key }
            | Command::BitLen { key }
            | Command::BitCount { key }
            | Command::BitNot { key }
            | Command::Del { key }
            | Command::SMembers { key }
            | Command::SCard { key }
            | Command::PTtl { key }
            | Command::Persist { key } => vec![key.into_bytes()],
            Command::Set { key, value } => vec![key.into_bytes(), value],
            Command::GetBit { key, offset } => vec![key.into_bytes(), number(offset)],
            Command::SetBit { key, offset, value } => {
                vec![key.into_bytes(), number(offset), flag(value)]
            }
            Command::BitFill { key, from, to, value } => {
                vec![key.into_bytes(), number(from), number(to), flag(value)]
            }
            Command::BitOp { op, dest, sources } => {
                let mut args = vec![op.as_str().as_bytes().to_vec(), dest.into_bytes()];
                args.extend(sources.into_iter().map(String::into_bytes));
                args
            }
            Command::SAdd { key, members }
            | Command::SRem { key, members }
            | Command::SMatch { key, members } => {
                let mut args = vec![key.into_bytes()];
                args.extend(members);
                args
            }
            Command::SIsMember { key, member } => vec![key.into_bytes(), member],
            Command::PExpire { key, millis } => vec![key.into_bytes(), number(millis)],
            Command::PExpireAt { key, unix_millis } => {
                vec![key.into_bytes(), number(unix_millis)]
            }
        };
        store::Command { name, args }
    }
}

/// Cursor over the raw arguments of a wire command.
struct Args {
    name: String,
    args: std::vec::IntoIter<Vec<u8>>,
}

impl Args {
    fn next(&mut self, what: &str) -> Result<Vec<u8>, DecodeError> {
        self.args.next().ok_or_else(|| {
            DecodeError::InvalidArgument(format!("{}: missing {}", self.name, what))
        })
    }

    fn text(&mut self, what: &str) -> Result<String, DecodeError> {
        let raw = self.next(what)?;
        String::from_utf8(raw).map_err(|_| {
            DecodeError::InvalidArgument(format!("{}: {} is not valid UTF-8", self.name, what))
        })
    }

    fn parse<T: FromStr>(&mut self, what: &str) -> Result<T, DecodeError> {
        let text = self.text(what)?;
        text.parse().map_err(|_| {
            DecodeError::InvalidArgument(format!(
                "{}: {} is not a number: {}",
                self.name, what, text
            ))
        })
    }

    fn flag(&mut self, what: &str) -> Result<bool, DecodeError> {
        match self.next(what)?.as_slice() {
            b"0" => Ok(false),
            b"1" => Ok(true),
            _ => Err(DecodeError::InvalidArgument(format!(
                "{}: {} must be 0 or 1",
                self.name, what
            ))),
        }
    }

    fn rest(&mut self) -> Vec<Vec<u8>> {
        self.args.by_ref().collect()
    }

    fn finish<T>(mut self, value: T) -> Result<T, DecodeError> {
        if self.args.next().is_some() {
            return Err(DecodeError::InvalidArgument(format!(
                "{}: too many arguments",
                self.name
            )));
        }
        Ok(value)
    }
}

impl TryFrom<store::Command> for Command {
    type Error = DecodeError;

    fn try_from(raw: store::Command) -> Result<Self, Self::Error> {
        let name = raw.name.to_ascii_uppercase();
        let mut args = Args {
            name: name.clone(),
            args: raw.args.into_iter(),
        };

        let command = match name.as_str() {
            "GET" => Command::Get { key: args.text("key")? },
            "SET" => Command::Set {
                key: args.text("key")?,
                value: args.next("value")?,
            },
            "BITLEN" => Command::BitLen { key: args.text("key")? },
            "GETBIT" => Command::GetBit {
                key: args.text("key")?,
                offset: args.parse("offset")?,
            },
            "SETBIT" => Command::SetBit {
                key: args.text("key")?,
                offset: args.parse("offset")?,
                value: args.flag("value")?,
            },
            "BITFILL" => Command::BitFill {
                key: args.text("key")?,
                from: args.parse("from")?,
                to: args.parse("to")?,
                value: args.flag("value")?,
            },
            "BITCOUNT" => Command::BitCount { key: args.text("key")? },
            "BITNOT" => Command::BitNot { key: args.text("key")? },
            "BITOP" => {
                let op = args.text("operation")?.parse()?;
                let dest = args.text("destination")?;
                let mut sources = Vec::new();
                for raw in args.rest() {
                    let source = String::from_utf8(raw).map_err(|_| {
                        DecodeError::InvalidArgument("BITOP: source key is not valid UTF-8".into())
                    })?;
                    sources.push(source);
                }
                if sources.is_empty() {
                    return Err(DecodeError::InvalidArgument(
                        "BITOP: at least one source key is required".into(),
                    ));
                }
                Command::BitOp { op, dest, sources }
            }
            "DEL" => Command::Del { key: args.text("key")? },
            "SMEMBERS" => Command::SMembers { key: args.text("key")? },
            "SADD" | "SREM" => {
                let key = args.text("key")?;
                let members = args.rest();
                if members.is_empty() {
                    return Err(DecodeError::InvalidArgument(format!(
                        "{name}: at least one member is required"
                    )));
                }
                if name == "SADD" {
                    Command::SAdd { key, members }
                } else {
                    Command::SRem { key, members }
                }
            }
            "SISMEMBER" => Command::SIsMember {
                key: args.text("key")?,
                member: args.next("member")?,
            },
            "SCARD" => Command::SCard { key: args.text("key")? },
            "SMATCH" => Command::SMatch {
                key: args.text("key")?,
                members: args.rest(),
            },
            "PEXPIRE" => Command::PExpire {
                key: args.text("key")?,
                millis: args.parse("milliseconds")?,
            },
            "PEXPIREAT" => Command::PExpireAt {
                key: args.text("key")?,
                unix_millis: args.parse("timestamp")?,
            },
            "PTTL" => Command::PTtl { key: args.text("key")? },
            "PERSIST" => Command::Persist { key: args.text("key")? },
            _ => return Err(DecodeError::UnknownCommand(raw.name)),
        };

        args.finish(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(name: &str, args: &[&[u8]]) -> store::Command {
        store::Command {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_vec()).collect(),
        }
    }

    #[test]
    fn test_setbit_encoding() {
        let raw = store::Command::from(Command::SetBit {
            key: "bits".into(),
            offset: 42,
            value: true,
        });
        assert_eq!(raw.name, "SETBIT");
        assert_eq!(raw.args, vec![b"bits".to_vec(), b"42".to_vec(), b"1".to_vec()]);
    }

    #[test]
    fn test_bitop_decoding() {
        let command = Command::try_from(wire("bitop", &[b"or", b"dest", b"a", b"b"])).unwrap();
        assert_eq!(
            command,
            Command::BitOp {
                op: BitOp::Or,
                dest: "dest".into(),
                sources: vec!["a".into(), "b".into()],
            }
        );
        assert_eq!(command.key(), "dest");
    }

    #[test]
    fn test_bitop_requires_sources() {
        let err = Command::try_from(wire("BITOP", &[b"AND", b"dest"])).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidArgument(_)));
    }

    #[test]
    fn test_unknown_command() {
        let err = Command::try_from(wire("HGETALL", &[b"k"])).unwrap_err();
        assert_eq!(err, DecodeError::UnknownCommand("HGETALL".into()));
    }

    #[test]
    fn test_rejects_bad_arguments() {
        let err = Command::try_from(wire("GETBIT", &[b"k", b"-1"])).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidArgument(_)));

        let err = Command::try_from(wire("SETBIT", &[b"k", b"1", b"2"])).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidArgument(_)));

        let err = Command::try_from(wire("GET", &[b"k", b"extra"])).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidArgument(_)));

        let err = Command::try_from(wire("SADD", &[b"k"])).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidArgument(_)));
    }

    #[test]
    fn test_smatch_allows_no_members() {
        let command = Command::try_from(wire("SMATCH", &[b"index"])).unwrap();
        assert_eq!(
            command,
            Command::SMatch {
                key: "index".into(),
                members: vec![],
            }
        );

        let raw = store::Command::from(Command::SMatch {
            key: "index".into(),
            members: vec![b"a".to_vec()],
        });
        assert_eq!(raw.name, "SMATCH");
        assert_eq!(raw.args, vec![b"index".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn test_sadd_keeps_binary_members() {
        let command = Command::try_from(wire("SADD", &[b"k", &[0xff, 0x00], b"x"])).unwrap();
        assert_eq!(
            command,
            Command::SAdd {
                key: "k".into(),
                members: vec![vec![0xff, 0x00], b"x".to_vec()],
            }
        );
    }
}
