use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::LengthDelimitedCodec;

// Command type identifiers
pub const CMD_PING: u8 = 0x00;
pub const CMD_SET: u8 = 0x01;
pub const CMD_GET: u8 = 0x02;
pub const CMD_DELETE: u8 = 0x03;

// Response type identifiers
pub const RESP_PONG: u8 = 0x00;
pub const RESP_OK: u8 = 0x01;
pub const RESP_VALUE: u8 = 0x02;
pub const RESP_NOT_FOUND: u8 = 0x03;
pub const RESP_ERROR: u8 = 0x04;
pub const RESP_DELETED: u8 = 0x05;

pub const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

/// 4-byte big-endian length prefix, shared by server and client.
pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Ping,
    /// `ttl_ms` of 0 means no TTL. `entry` is a JSON-encoded cache entry.
    Set { key: String, ttl_ms: u64, entry: Bytes },
    Get { key: String },
    Delete { key: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Pong,
    Ok,
    Value { value: Bytes },
    NotFound,
    Deleted { existed: bool },
    Error { msg: String },
}

impl Request {
    /// Encode a Request into Bytes for transmission
    ///
    /// Format:
    /// - PING: [0x00]
    /// - SET: [0x01][key_len: u32][key][ttl_ms: u64][entry_len: u32][entry]
    /// - GET: [0x02][key_len: u32][key]
    /// - DELETE: [0x03][key_len: u32][key]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();

        match self {
            Request::Ping => {
                buf.put_u8(CMD_PING);
            }
            Request::Set { key, ttl_ms, entry } => {
                buf.put_u8(CMD_SET);
                put_chunk(&mut buf, key.as_bytes());
                buf.put_u64(*ttl_ms);
                put_chunk(&mut buf, entry);
            }
            Request::Get { key } => {
                buf.put_u8(CMD_GET);
                put_chunk(&mut buf, key.as_bytes());
            }
            Request::Delete { key } => {
                buf.put_u8(CMD_DELETE);
                put_chunk(&mut buf, key.as_bytes());
            }
        }

        buf.freeze()
    }

    /// Decode a Request from a complete frame
    pub fn decode(mut buf: Bytes) -> Result<Self, String> {
        if buf.is_empty() {
            return Err("Empty buffer".to_string());
        }

        let cmd = buf.get_u8();

        match cmd {
            CMD_PING => Ok(Request::Ping),
            CMD_SET => {
                let key = get_string(&mut buf, "SET key")?;
                if buf.remaining() < 8 {
                    return Err("Invalid SET: missing ttl".to_string());
                }
                let ttl_ms = buf.get_u64();
                let entry = get_chunk(&mut buf, "SET entry")?;
                Ok(Request::Set { key, ttl_ms, entry })
            }
            CMD_GET => Ok(Request::Get {
                key: get_string(&mut buf, "GET key")?,
            }),
            CMD_DELETE => Ok(Request::Delete {
                key: get_string(&mut buf, "DELETE key")?,
            }),
            _ => Err(format!("Unknown command: 0x{:02X}", cmd)),
        }
    }
}

impl Response {
    /// Encode a Response into Bytes for transmission
    ///
    /// Format:
    /// - PONG: [0x00]
    /// - OK: [0x01]
    /// - VALUE: [0x02][value_len: u32][value bytes]
    /// - NOT_FOUND: [0x03]
    /// - ERROR: [0x04][msg_len: u32][msg bytes]
    /// - DELETED: [0x05][existed: u8]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();

        match self {
            Response::Pong => buf.put_u8(RESP_PONG),
            Response::Ok => buf.put_u8(RESP_OK),
            Response::Value { value } => {
                buf.put_u8(RESP_VALUE);
                put_chunk(&mut buf, value);
            }
            Response::NotFound => buf.put_u8(RESP_NOT_FOUND),
            Response::Deleted { existed } => {
                buf.put_u8(RESP_DELETED);
                buf.put_u8(u8::from(*existed));
            }
            Response::Error { msg } => {
                buf.put_u8(RESP_ERROR);
                put_chunk(&mut buf, msg.as_bytes());
            }
        }

        buf.freeze()
    }

    /// Decode a Response from a complete frame
    pub fn decode(mut buf: Bytes) -> Result<Self, String> {
        if buf.is_empty() {
            return Err("Empty buffer".to_string());
        }

        let resp_type = buf.get_u8();

        match resp_type {
            RESP_PONG => Ok(Response::Pong),
            RESP_OK => Ok(Response::Ok),
            RESP_VALUE => Ok(Response::Value {
                value: get_chunk(&mut buf, "VALUE")?,
            }),
            RESP_NOT_FOUND => Ok(Response::NotFound),
            RESP_DELETED => {
                if buf.remaining() < 1 {
                    return Err("Invalid DELETED: missing flag".to_string());
                }
                Ok(Response::Deleted {
                    existed: buf.get_u8() != 0,
                })
            }
            RESP_ERROR => {
                let msg_bytes = get_chunk(&mut buf, "ERROR")?;
                Ok(Response::Error {
                    msg: String::from_utf8_lossy(&msg_bytes).to_string(),
                })
            }
            _ => Err(format!("Unknown response type: 0x{:02X}", resp_type)),
        }
    }
}

fn put_chunk(buf: &mut BytesMut, chunk: &[u8]) {
    buf.put_u32(chunk.len() as u32);
    buf.put_slice(chunk);
}

fn get_chunk(buf: &mut Bytes, what: &str) -> Result<Bytes, String> {
    if buf.remaining() < 4 {
        return Err(format!("Invalid {}: missing length", what));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(format!(
            "Invalid {}: expected {} bytes, got {}",
            what,
            len,
            buf.remaining()
        ));
    }
    Ok(buf.copy_to_bytes(len))
}

fn get_string(buf: &mut Bytes, what: &str) -> Result<String, String> {
    let bytes = get_chunk(buf, what)?;
    String::from_utf8(bytes.to_vec()).map_err(|e| format!("Invalid {} UTF-8: {}", what, e))
}
