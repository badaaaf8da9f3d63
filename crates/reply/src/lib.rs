//! Tagged reply values: the single currency crossing the shard boundary.
//!
//! A [`Reply`] owns its child nodes outright. Callers that need to move a
//! child out of a parent that is about to be dropped use [`Reply::take_child`],
//! which leaves [`Reply::Nil`] behind rather than handing out a reference into
//! a structure someone else still owns.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Integer(i64),
    Double(f64),
    Bool(bool),
    String(Vec<u8>),
    Status(Vec<u8>),
    Error(Vec<u8>),
    Nil,
    Array(Vec<Reply>),
    /// Alternating key/value pairs. Always an even number of elements.
    Map(Vec<Reply>),
    Set(Vec<Reply>),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplyError {
    #[error("map reply must have an even number of elements, got {0}")]
    OddMapLength(usize),
    #[error("index {0} out of bounds for a reply with {1} children")]
    OutOfBounds(usize, usize),
    #[error("reply is not a container and has no children")]
    NotAContainer,
    #[error("cannot write a container as a map key")]
    ContainerAsMapKey,
}

impl Reply {
    pub fn map(pairs: Vec<Reply>) -> Result<Reply, ReplyError> {
        if pairs.len() % 2 != 0 {
            return Err(ReplyError::OddMapLength(pairs.len()));
        }
        for (i, entry) in pairs.iter().enumerate() {
            if i % 2 == 0 && matches!(entry, Reply::Array(_) | Reply::Map(_) | Reply::Set(_)) {
                return Err(ReplyError::ContainerAsMapKey);
            }
        }
        Ok(Reply::Map(pairs))
    }

    pub fn error(msg: impl Into<Vec<u8>>) -> Reply {
        Reply::Error(msg.into())
    }

    pub fn status(msg: impl Into<Vec<u8>>) -> Reply {
        Reply::Status(msg.into())
    }

    pub fn string(s: impl Into<Vec<u8>>) -> Reply {
        Reply::String(s.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    pub fn as_error(&self) -> Option<&[u8]> {
        match self {
            Reply::Error(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The leading error-code token of an error reply (everything up to the
    /// first space), used when an error must be logged in truncated form.
    pub fn error_code(&self) -> Option<&[u8]> {
        self.as_error().map(|bytes| {
            let end = bytes.iter().position(|&b| b == b' ').unwrap_or(bytes.len());
            &bytes[..end]
        })
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Reply::Double(d) => Some(*d),
            Reply::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::String(b) | Reply::Status(b) | Reply::Error(b) => Some(b),
            _ => None,
        }
    }

    /// Children of a container reply, in wire order.
    pub fn children(&self) -> Option<&[Reply]> {
        match self {
            Reply::Array(v) | Reply::Map(v) | Reply::Set(v) => Some(v),
            _ => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Reply>> {
        match self {
            Reply::Array(v) | Reply::Map(v) | Reply::Set(v) => Some(v),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.children().map_or(0, |c| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a value in a `Map` reply by string key. Linear scan,
    /// case-insensitive, as specified for coordinator INFO/cursor maps.
    pub fn map_get(&self, key: &str) -> Option<&Reply> {
        let pairs = self.children()?;
        let mut it = pairs.chunks_exact(2);
        it.find_map(|pair| {
            let k = pair[0].as_bytes()?;
            std::str::from_utf8(k)
                .ok()
                .filter(|k| k.eq_ignore_ascii_case(key))
                .map(|_| &pair[1])
        })
    }

    /// Transfers ownership of child `idx` out of this reply, leaving `Nil`
    /// behind. The parent remains a valid (shorter-lived) container.
    pub fn take_child(&mut self, idx: usize) -> Result<Reply, ReplyError> {
        let children = self.children_mut().ok_or(ReplyError::NotAContainer)?;
        let len = children.len();
        let slot = children.get_mut(idx).ok_or(ReplyError::OutOfBounds(idx, len))?;
        Ok(std::mem::replace(slot, Reply::Nil))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_rejects_odd_length() {
        assert_eq!(
            Reply::map(vec![Reply::string("a")]),
            Err(ReplyError::OddMapLength(1))
        );
    }

    #[test]
    fn map_get_is_case_insensitive() {
        let m = Reply::map(vec![
            Reply::string("Num_Docs"),
            Reply::Integer(10),
            Reply::string("other"),
            Reply::Nil,
        ])
        .unwrap();
        assert_eq!(m.map_get("num_docs"), Some(&Reply::Integer(10)));
        assert_eq!(m.map_get("NUM_DOCS"), Some(&Reply::Integer(10)));
        assert_eq!(m.map_get("missing"), None);
    }

    #[test]
    fn take_child_leaves_nil_behind() {
        let mut arr = Reply::Array(vec![Reply::Integer(1), Reply::Integer(2)]);
        let taken = arr.take_child(0).unwrap();
        assert_eq!(taken, Reply::Integer(1));
        assert_eq!(arr.children().unwrap()[0], Reply::Nil);
        assert_eq!(arr.children().unwrap()[1], Reply::Integer(2));
    }

    #[test]
    fn take_child_out_of_bounds() {
        let mut arr = Reply::Array(vec![Reply::Integer(1)]);
        assert_eq!(arr.take_child(5), Err(ReplyError::OutOfBounds(5, 1)));
    }

    #[test]
    fn error_code_truncates_to_first_space() {
        let e = Reply::error("ERR Unknown index name");
        assert_eq!(e.error_code(), Some(&b"ERR"[..]));
    }

    #[test]
    fn scalar_has_no_children() {
        let mut i = Reply::Integer(5);
        assert!(i.children().is_none());
        assert_eq!(i.take_child(0), Err(ReplyError::NotAContainer));
    }
}
