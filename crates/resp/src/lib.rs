//! RESP2/RESP3 reply formatter: a stack-based writer where each `Array`,
//! `Map`, or `Set` opens a frame recording its element count and closes by
//! patching the length header once every child has been written. RESP2
//! has no native `Map`/`Set`/`Double`/`Boolean`/`Null` types, so those
//! downgrade to their RESP2-compatible shape at write time.

use reply::Reply;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Resp2,
    Resp3,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RespError {
    #[error("cannot write a container as a map key")]
    ContainerAsMapKey,
    #[error("end() called with no open container")]
    NoOpenContainer,
    #[error("encoding finished with {0} container(s) still open")]
    UnclosedContainers(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Array,
    Map,
    Set,
}

struct Frame {
    kind: Kind,
    /// Byte offset in `buf` where this container's header belongs; the
    /// header is spliced in at this position once `end()` knows the
    /// final count.
    header_at: usize,
    count: usize,
    /// For `Map` frames: true when the next value written is a key.
    expecting_key: bool,
}

/// Builds a RESP reply incrementally. `begin_array`/`begin_map`/`begin_set`
/// push a frame and return immediately; scalars written afterward are
/// nested inside it until the matching `end()`.
pub struct ReplyWriter {
    protocol: Protocol,
    buf: Vec<u8>,
    stack: Vec<Frame>,
}

impl ReplyWriter {
    pub fn new(protocol: Protocol) -> Self {
        ReplyWriter { protocol, buf: Vec::new(), stack: Vec::new() }
    }

    /// Finishes the encode, returning the wire bytes. Errors if any
    /// container opened with `begin_*` was never closed with `end()`.
    pub fn finish(self) -> Result<Vec<u8>, RespError> {
        if !self.stack.is_empty() {
            return Err(RespError::UnclosedContainers(self.stack.len()));
        }
        Ok(self.buf)
    }

    fn record_child(&mut self) -> Result<(), RespError> {
        if let Some(frame) = self.stack.last_mut() {
            if frame.kind == Kind::Map {
                if frame.expecting_key {
                    frame.expecting_key = false;
                } else {
                    frame.expecting_key = true;
                }
            }
            frame.count += 1;
        }
        Ok(())
    }

    fn check_not_map_key_container(&self) -> Result<(), RespError> {
        if let Some(frame) = self.stack.last() {
            if frame.kind == Kind::Map && frame.expecting_key {
                return Err(RespError::ContainerAsMapKey);
            }
        }
        Ok(())
    }

    fn write_line(&mut self, prefix: u8, body: &[u8]) {
        self.buf.push(prefix);
        self.buf.extend_from_slice(body);
        self.buf.extend_from_slice(b"\r\n");
    }

    pub fn integer(&mut self, n: i64) -> Result<(), RespError> {
        self.write_line(b':', n.to_string().as_bytes());
        self.record_child()
    }

    pub fn double(&mut self, d: f64) -> Result<(), RespError> {
        match self.protocol {
            Protocol::Resp3 => self.write_line(b',', format_double(d).as_bytes()),
            Protocol::Resp2 => self.bulk_string(format_double(d).as_bytes())?,
        }
        self.record_child()
    }

    pub fn boolean(&mut self, b: bool) -> Result<(), RespError> {
        match self.protocol {
            Protocol::Resp3 => self.write_line(b'#', if b { b"t" } else { b"f" }),
            Protocol::Resp2 => self.write_line(b':', if b { b"1" } else { b"0" }),
        }
        self.record_child()
    }

    pub fn nil(&mut self) -> Result<(), RespError> {
        match self.protocol {
            Protocol::Resp3 => self.write_line(b'_', b""),
            Protocol::Resp2 => self.buf.extend_from_slice(b"$-1\r\n"),
        }
        self.record_child()
    }

    pub fn bulk_string(&mut self, s: &[u8]) -> Result<(), RespError> {
        self.write_line(b'$', s.len().to_string().as_bytes());
        self.buf.extend_from_slice(s);
        self.buf.extend_from_slice(b"\r\n");
        self.record_child()
    }

    pub fn status(&mut self, s: &[u8]) -> Result<(), RespError> {
        self.write_line(b'+', s);
        self.record_child()
    }

    pub fn error(&mut self, s: &[u8]) -> Result<(), RespError> {
        self.write_line(b'-', s);
        self.record_child()
    }

    fn begin(&mut self, kind: Kind) -> Result<(), RespError> {
        self.check_not_map_key_container()?;
        let header_at = self.buf.len();
        self.stack.push(Frame { kind, header_at, count: 0, expecting_key: true });
        Ok(())
    }

    pub fn begin_array(&mut self) -> Result<(), RespError> {
        self.begin(Kind::Array)
    }

    pub fn begin_map(&mut self) -> Result<(), RespError> {
        self.begin(Kind::Map)
    }

    pub fn begin_set(&mut self) -> Result<(), RespError> {
        self.begin(Kind::Set)
    }

    /// Closes the most recently opened container, splicing its length
    /// header into the buffer at the position `begin_*` recorded.
    pub fn end(&mut self) -> Result<(), RespError> {
        let frame = self.stack.pop().ok_or(RespError::NoOpenContainer)?;

        let (prefix, count) = match (self.protocol, frame.kind) {
            (Protocol::Resp3, Kind::Map) => (b'%', frame.count / 2),
            (Protocol::Resp2, Kind::Map) => (b'*', frame.count),
            (Protocol::Resp3, Kind::Set) => (b'~', frame.count),
            (Protocol::Resp2, Kind::Set) => (b'*', frame.count),
            (_, Kind::Array) => (b'*', frame.count),
        };

        let mut header = vec![prefix];
        header.extend_from_slice(count.to_string().as_bytes());
        header.extend_from_slice(b"\r\n");
        self.buf.splice(frame.header_at..frame.header_at, header);

        self.record_child()
    }
}

fn format_double(d: f64) -> String {
    if d.is_infinite() {
        if d > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if d.is_nan() {
        "nan".to_string()
    } else {
        let mut s = format!("{d}");
        if !s.contains('.') && !s.contains('e') && !s.contains("inf") && !s.contains("nan") {
            s.push_str(".0");
        }
        s
    }
}

/// Encodes a complete [`Reply`] tree, driving a [`ReplyWriter`]
/// recursively. The writer itself stays usable for callers building a
/// reply incrementally (e.g. streaming a cursor page) without a materialized
/// `Reply` tree.
pub fn encode(reply: &Reply, protocol: Protocol) -> Result<Vec<u8>, RespError> {
    let mut writer = ReplyWriter::new(protocol);
    write_reply(&mut writer, reply)?;
    writer.finish()
}

fn write_reply(writer: &mut ReplyWriter, reply: &Reply) -> Result<(), RespError> {
    match reply {
        Reply::Integer(n) => writer.integer(*n),
        Reply::Double(d) => writer.double(*d),
        Reply::Bool(b) => writer.boolean(*b),
        Reply::String(s) => writer.bulk_string(s),
        Reply::Status(s) => writer.status(s),
        Reply::Error(s) => writer.error(s),
        Reply::Nil => writer.nil(),
        Reply::Array(items) => {
            writer.begin_array()?;
            for item in items {
                write_reply(writer, item)?;
            }
            writer.end()
        }
        Reply::Map(pairs) => {
            writer.begin_map()?;
            for item in pairs {
                write_reply(writer, item)?;
            }
            writer.end()
        }
        Reply::Set(items) => {
            writer.begin_set()?;
            for item in items {
                write_reply(writer, item)?;
            }
            writer.end()
        }
    }
}
