//! Blob data wire protocol
//!
//! Every message is a fixed-size header optionally followed by a payload of
//! exactly `length` bytes. All integers are big-endian.
//!
//! ```text
//! request:  magic(1) | op(1)     | object_id(16) | offset(8) | length(8)   = 34 bytes
//! response: magic(1) | status(1) | length(8)                               = 10 bytes
//! ```
//!
//! There is no version field, checksum or compression.

use crate::error::{BlobError, BlobResult};
use std::fmt;
use std::io::{Read, Write};
use tufa_common::{OBJECT_ID_SIZE, ObjectId};

/// Magic byte that starts every request and response
pub const PROTOCOL_MAGIC: u8 = 0xBA;

/// Request header size: magic + op + object id + offset + length
pub const REQUEST_HEADER_SIZE: usize = 2 + OBJECT_ID_SIZE + 8 + 8;

/// Response header size: magic + status + length
pub const RESPONSE_HEADER_SIZE: usize = 2 + 8;

/// Request operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Append data at an offset
    Append = 0x01,
    /// Append and sync to disk in one round trip; empty payload is a pure sync
    AppendSync = 0x02,
    /// Read up to `length` bytes at an offset
    Read = 0x03,
}

impl OpCode {
    pub const ALL: [Self; 3] = [Self::Append, Self::AppendSync, Self::Read];

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for OpCode {
    type Error = BlobError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Append),
            0x02 => Ok(Self::AppendSync),
            0x03 => Ok(Self::Read),
            _ => Err(BlobError::protocol(format!("unknown op code: {value:#04x}"))),
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Append => "Append",
            Self::AppendSync => "AppendSync",
            Self::Read => "Read",
        })
    }
}

/// Response status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatusCode {
    Ok = 0x00,
    NotFound = 0x01,
    AlreadyExists = 0x02,
    Sealed = 0x03,
    IoError = 0x04,
    InvalidOp = 0x05,
    BadRequest = 0x06,
}

impl StatusCode {
    pub const ALL: [Self; 7] = [
        Self::Ok,
        Self::NotFound,
        Self::AlreadyExists,
        Self::Sealed,
        Self::IoError,
        Self::InvalidOp,
        Self::BadRequest,
    ];

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Translate the status into its named error; `Ok` maps to `Ok(())`
    pub fn into_result(self) -> BlobResult<()> {
        match self {
            Self::Ok => Ok(()),
            Self::NotFound => Err(BlobError::NotFound),
            Self::AlreadyExists => Err(BlobError::AlreadyExists),
            Self::Sealed => Err(BlobError::Sealed),
            Self::IoError => Err(BlobError::IoError),
            Self::InvalidOp => Err(BlobError::InvalidOp),
            Self::BadRequest => Err(BlobError::BadRequest),
        }
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = BlobError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Ok),
            0x01 => Ok(Self::NotFound),
            0x02 => Ok(Self::AlreadyExists),
            0x03 => Ok(Self::Sealed),
            0x04 => Ok(Self::IoError),
            0x05 => Ok(Self::InvalidOp),
            0x06 => Ok(Self::BadRequest),
            _ => Err(BlobError::protocol(format!("unknown status: {value}"))),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::Sealed => "Sealed",
            Self::IoError => "IOError",
            Self::InvalidOp => "InvalidOp",
            Self::BadRequest => "BadRequest",
        })
    }
}

fn check_header(buf: &[u8], size: usize) -> BlobResult<()> {
    if buf.len() < size {
        return Err(BlobError::protocol(format!(
            "buffer too small: {} < {size}",
            buf.len()
        )));
    }
    if buf[0] != PROTOCOL_MAGIC {
        return Err(BlobError::protocol(format!("invalid magic: {:#04x}", buf[0])));
    }
    Ok(())
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_be_bytes(bytes)
}

/// Request message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub op: OpCode,
    pub object_id: ObjectId,
    /// Byte position being written or read
    pub offset: u64,
    /// Payload size for writes, requested size for reads
    pub length: u64,
}

impl RequestHeader {
    /// Encode into a fixed-size buffer
    pub fn encode(&self, buf: &mut [u8; REQUEST_HEADER_SIZE]) {
        buf[0] = PROTOCOL_MAGIC;
        buf[1] = self.op.as_u8();
        buf[2..18].copy_from_slice(self.object_id.as_bytes());
        buf[18..26].copy_from_slice(&self.offset.to_be_bytes());
        buf[26..34].copy_from_slice(&self.length.to_be_bytes());
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; REQUEST_HEADER_SIZE] {
        let mut buf = [0u8; REQUEST_HEADER_SIZE];
        self.encode(&mut buf);
        buf
    }

    /// Decode from the first `REQUEST_HEADER_SIZE` bytes of `buf`
    pub fn decode(buf: &[u8]) -> BlobResult<Self> {
        check_header(buf, REQUEST_HEADER_SIZE)?;
        let mut id = [0u8; OBJECT_ID_SIZE];
        id.copy_from_slice(&buf[2..18]);
        Ok(Self {
            op: OpCode::try_from(buf[1])?,
            object_id: ObjectId::from_bytes(id),
            offset: read_u64(buf, 18),
            length: read_u64(buf, 26),
        })
    }
}

/// Response message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub status: StatusCode,
    /// Size of the data segment that follows; 0 when none
    pub length: u64,
}

impl ResponseHeader {
    /// Encode into a fixed-size buffer
    pub fn encode(&self, buf: &mut [u8; RESPONSE_HEADER_SIZE]) {
        buf[0] = PROTOCOL_MAGIC;
        buf[1] = self.status.as_u8();
        buf[2..10].copy_from_slice(&self.length.to_be_bytes());
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; RESPONSE_HEADER_SIZE] {
        let mut buf = [0u8; RESPONSE_HEADER_SIZE];
        self.encode(&mut buf);
        buf
    }

    /// Decode from the first `RESPONSE_HEADER_SIZE` bytes of `buf`
    pub fn decode(buf: &[u8]) -> BlobResult<Self> {
        check_header(buf, RESPONSE_HEADER_SIZE)?;
        Ok(Self {
            status: StatusCode::try_from(buf[1])?,
            length: read_u64(buf, 2),
        })
    }
}

/// Write a complete request (header + optional payload)
pub fn write_request<W: Write>(w: &mut W, header: &RequestHeader, data: &[u8]) -> BlobResult<()> {
    w.write_all(&header.to_bytes())
        .map_err(|e| BlobError::transport("writing request header", e))?;
    if !data.is_empty() {
        w.write_all(data)
            .map_err(|e| BlobError::transport("writing request data", e))?;
    }
    Ok(())
}

/// Read and decode a request header
pub fn read_request_header<R: Read>(r: &mut R) -> BlobResult<RequestHeader> {
    let mut buf = [0u8; REQUEST_HEADER_SIZE];
    r.read_exact(&mut buf)
        .map_err(|e| BlobError::transport("reading request header", e))?;
    RequestHeader::decode(&buf)
}

/// Write a complete response (header + optional payload)
pub fn write_response<W: Write>(w: &mut W, status: StatusCode, data: &[u8]) -> BlobResult<()> {
    let header = ResponseHeader {
        status,
        length: data.len() as u64,
    };
    w.write_all(&header.to_bytes())
        .map_err(|e| BlobError::transport("writing response header", e))?;
    if !data.is_empty() {
        w.write_all(data)
            .map_err(|e| BlobError::transport("writing response data", e))?;
    }
    Ok(())
}

/// Read and decode a response header
pub fn read_response_header<R: Read>(r: &mut R) -> BlobResult<ResponseHeader> {
    let mut buf = [0u8; RESPONSE_HEADER_SIZE];
    r.read_exact(&mut buf)
        .map_err(|e| BlobError::transport("reading response header", e))?;
    ResponseHeader::decode(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::io::Cursor;

    fn test_id() -> ObjectId {
        ObjectId::from_bytes([
            0x12, 0x34, 0x56, 0x78, 0x12, 0x34, 0x56, 0x78, 0x12, 0x34, 0x56, 0x78, 0x12, 0x34,
            0x56, 0x78,
        ])
    }

    #[test]
    fn test_request_header_layout() {
        let header = RequestHeader {
            op: OpCode::Read,
            object_id: test_id(),
            offset: 1000,
            length: 4096,
        };
        let buf = header.to_bytes();
        assert_eq!(buf.len(), 34);
        assert_eq!(buf[0], 0xBA);
        assert_eq!(buf[1], 0x03);
        assert_eq!(&buf[2..18], test_id().as_bytes());
        assert_eq!(&buf[18..26], &[0, 0, 0, 0, 0, 0, 0x03, 0xE8]);
        assert_eq!(&buf[26..34], &[0, 0, 0, 0, 0, 0, 0x10, 0x00]);
        assert_eq!(RequestHeader::decode(&buf).unwrap(), header);
    }

    #[test]
    fn test_response_header_layout() {
        let header = ResponseHeader {
            status: StatusCode::Sealed,
            length: 12345,
        };
        let buf = header.to_bytes();
        assert_eq!(buf, [0xBA, 0x03, 0, 0, 0, 0, 0, 0, 0x30, 0x39]);
        assert_eq!(ResponseHeader::decode(&buf).unwrap(), header);
    }

    #[test]
    fn test_header_round_trip_random() {
        let mut rng = rand::thread_rng();
        for _ in 0..64 {
            let request = RequestHeader {
                op: OpCode::ALL[rng.gen_range(0..OpCode::ALL.len())],
                object_id: ObjectId::from_bytes(rng.r#gen()),
                offset: rng.r#gen(),
                length: rng.r#gen(),
            };
            assert_eq!(RequestHeader::decode(&request.to_bytes()).unwrap(), request);

            let response = ResponseHeader {
                status: StatusCode::ALL[rng.gen_range(0..StatusCode::ALL.len())],
                length: rng.r#gen(),
            };
            assert_eq!(ResponseHeader::decode(&response.to_bytes()).unwrap(), response);
        }
    }

    #[test]
    fn test_bad_magic() {
        for magic in [0x00, 0xFF, 0xAB] {
            let mut req = RequestHeader {
                op: OpCode::Append,
                object_id: test_id(),
                offset: 0,
                length: 0,
            }
            .to_bytes();
            req[0] = magic;
            assert!(matches!(
                RequestHeader::decode(&req),
                Err(BlobError::Protocol(_))
            ));

            let mut resp = ResponseHeader {
                status: StatusCode::Ok,
                length: 0,
            }
            .to_bytes();
            resp[0] = magic;
            assert!(matches!(
                ResponseHeader::decode(&resp),
                Err(BlobError::Protocol(_))
            ));
        }
    }

    #[test]
    fn test_short_buffer() {
        let req = RequestHeader {
            op: OpCode::Append,
            object_id: test_id(),
            offset: 1,
            length: 2,
        }
        .to_bytes();
        assert!(RequestHeader::decode(&req[..REQUEST_HEADER_SIZE - 1]).is_err());
        assert!(ResponseHeader::decode(&[PROTOCOL_MAGIC, 0x00]).is_err());
        assert!(ResponseHeader::decode(&[]).is_err());
    }

    #[test]
    fn test_unknown_codes() {
        let mut req = [0u8; REQUEST_HEADER_SIZE];
        req[0] = PROTOCOL_MAGIC;
        req[1] = 0xFF;
        assert!(RequestHeader::decode(&req).is_err());

        let mut resp = [0u8; RESPONSE_HEADER_SIZE];
        resp[0] = PROTOCOL_MAGIC;
        resp[1] = 0x07;
        assert!(ResponseHeader::decode(&resp).is_err());
    }

    #[test]
    fn test_write_read_request() {
        let header = RequestHeader {
            op: OpCode::AppendSync,
            object_id: ObjectId::from_bytes([0xAA; 16]),
            offset: 500,
            length: 11,
        };
        let mut buf = Vec::new();
        write_request(&mut buf, &header, b"hello world").unwrap();
        assert_eq!(buf.len(), REQUEST_HEADER_SIZE + 11);

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_request_header(&mut cursor).unwrap(), header);
        let mut rest = Vec::new();
        cursor.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"hello world");
    }

    #[test]
    fn test_write_read_response() {
        let mut buf = Vec::new();
        write_response(&mut buf, StatusCode::NotFound, &[]).unwrap();
        assert_eq!(buf.len(), RESPONSE_HEADER_SIZE);

        let decoded = read_response_header(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded.status, StatusCode::NotFound);
        assert_eq!(decoded.length, 0);
    }

    #[test]
    fn test_truncated_stream() {
        let mut cursor = Cursor::new(vec![PROTOCOL_MAGIC, 0x00, 0x00]);
        assert!(matches!(
            read_response_header(&mut cursor),
            Err(BlobError::Transport { .. })
        ));
    }

    #[test]
    fn test_status_errors() {
        assert!(StatusCode::Ok.into_result().is_ok());
        assert!(matches!(StatusCode::NotFound.into_result(), Err(BlobError::NotFound)));
        assert!(matches!(StatusCode::AlreadyExists.into_result(), Err(BlobError::AlreadyExists)));
        assert!(matches!(StatusCode::Sealed.into_result(), Err(BlobError::Sealed)));
        assert!(matches!(StatusCode::IoError.into_result(), Err(BlobError::IoError)));
        assert!(matches!(StatusCode::InvalidOp.into_result(), Err(BlobError::InvalidOp)));
        assert!(matches!(StatusCode::BadRequest.into_result(), Err(BlobError::BadRequest)));
    }

    #[test]
    fn test_display() {
        assert_eq!(OpCode::Append.to_string(), "Append");
        assert_eq!(OpCode::AppendSync.to_string(), "AppendSync");
        assert_eq!(OpCode::Read.to_string(), "Read");
        assert_eq!(StatusCode::Ok.to_string(), "OK");
        assert_eq!(StatusCode::IoError.to_string(), "IOError");
        assert_eq!(StatusCode::BadRequest.to_string(), "BadRequest");
    }
}
