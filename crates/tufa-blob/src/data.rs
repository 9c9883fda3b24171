//! Data connection to a single blob server
//!
//! A [`DataClient`] owns one TCP connection to a blob server's data
//! endpoint and runs one request/response exchange at a time. It is not
//! shareable: exclusive access comes either from the pool (acquire/release)
//! or from being dedicated to a quorum replica worker.

use crate::error::{BlobError, BlobResult};
use crate::protocol::{
    OpCode, REQUEST_HEADER_SIZE, RequestHeader, StatusCode, read_response_header,
};
use std::io::{self, BufReader, IoSlice, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use tufa_common::ObjectId;
use tufa_common::config::DataConfig;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Connection options
#[derive(Clone, Debug)]
pub struct DataOptions {
    /// TCP connect timeout (none = OS default)
    pub connect_timeout: Option<Duration>,
    /// Set TCP_NODELAY on new connections
    pub nodelay: bool,
}

impl Default for DataOptions {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            nodelay: true,
        }
    }
}

impl From<&DataConfig> for DataOptions {
    fn from(config: &DataConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            nodelay: config.nodelay,
        }
    }
}

/// Client for a blob server's data endpoint.
///
/// The connection is established lazily on first use. Any transport or
/// framing failure drops the connection so the next call reconnects from
/// scratch.
pub struct DataClient {
    id: u64,
    addr: String,
    options: DataOptions,
    conn: Option<BufReader<TcpStream>>,
    /// Scratch buffer for request headers; payloads are never copied into it
    header_buf: [u8; REQUEST_HEADER_SIZE],
}

impl DataClient {
    /// Create a client for `addr` with default options
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_options(addr, DataOptions::default())
    }

    /// Create a client for `addr`
    pub fn with_options(addr: impl Into<String>, options: DataOptions) -> Self {
        Self {
            id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            addr: addr.into(),
            options,
            conn: None,
            header_buf: [0u8; REQUEST_HEADER_SIZE],
        }
    }

    /// Server address this client talks to
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Process-unique identity of this client
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether a connection is currently open
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Close the connection. Idempotent; the next call reconnects.
    pub fn close(&mut self) {
        if self.conn.take().is_some() {
            debug!(addr = %self.addr, client = self.id, "closed data connection");
        }
    }

    /// Append `data` at `offset`
    pub fn append(&mut self, id: ObjectId, offset: u64, data: &[u8]) -> BlobResult<()> {
        self.do_request(
            RequestHeader {
                op: OpCode::Append,
                object_id: id,
                offset,
                length: data.len() as u64,
            },
            data,
            &mut [],
        )
        .map(|_| ())
    }

    /// Append `data` at `offset` and sync to disk in one round trip.
    /// Empty `data` performs a pure sync.
    pub fn append_sync(&mut self, id: ObjectId, offset: u64, data: &[u8]) -> BlobResult<()> {
        self.do_request(
            RequestHeader {
                op: OpCode::AppendSync,
                object_id: id,
                offset,
                length: data.len() as u64,
            },
            data,
            &mut [],
        )
        .map(|_| ())
    }

    /// Sync an object's data to disk
    pub fn sync(&mut self, id: ObjectId) -> BlobResult<()> {
        self.append_sync(id, 0, &[])
    }

    /// Read into `buf` starting at `offset`; returns the number of bytes read.
    /// `buf.len()` is a hard ceiling: any excess the server sends is discarded.
    pub fn read(&mut self, id: ObjectId, offset: u64, buf: &mut [u8]) -> BlobResult<usize> {
        self.do_request(
            RequestHeader {
                op: OpCode::Read,
                object_id: id,
                offset,
                length: buf.len() as u64,
            },
            &[],
            buf,
        )
    }

    fn do_request(
        &mut self,
        header: RequestHeader,
        src: &[u8],
        dst: &mut [u8],
    ) -> BlobResult<usize> {
        let conn = match &mut self.conn {
            Some(conn) => conn,
            slot @ None => slot.insert(connect(&self.addr, &self.options)?),
        };

        header.encode(&mut self.header_buf);

        match exchange(conn, &self.header_buf, src, dst) {
            Ok((status, n)) => {
                status.into_result()?;
                Ok(n)
            }
            Err(e) => {
                warn!(
                    addr = %self.addr,
                    client = self.id,
                    op = %header.op,
                    error = %e,
                    "data request failed, dropping connection"
                );
                self.conn = None;
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for DataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataClient")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

fn connect(addr: &str, options: &DataOptions) -> BlobResult<BufReader<TcpStream>> {
    let connect_err = |source| BlobError::Connect {
        addr: addr.to_string(),
        source,
    };

    let stream = match options.connect_timeout {
        None => TcpStream::connect(addr).map_err(connect_err)?,
        Some(timeout) => {
            let mut last_err =
                io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing");
            let mut connected = None;
            for sock_addr in addr.to_socket_addrs().map_err(connect_err)? {
                match TcpStream::connect_timeout(&sock_addr, timeout) {
                    Ok(stream) => {
                        connected = Some(stream);
                        break;
                    }
                    Err(e) => last_err = e,
                }
            }
            connected.ok_or_else(|| connect_err(last_err))?
        }
    };

    if options.nodelay {
        stream.set_nodelay(true).map_err(connect_err)?;
    }
    debug!(addr, "opened data connection");
    Ok(BufReader::new(stream))
}

/// One request/response exchange. Returns the response status and the
/// number of bytes copied into `dst`.
fn exchange(
    conn: &mut BufReader<TcpStream>,
    header: &[u8],
    src: &[u8],
    dst: &mut [u8],
) -> BlobResult<(StatusCode, usize)> {
    let mut slices = [IoSlice::new(header), IoSlice::new(src)];
    let used = if src.is_empty() { 1 } else { 2 };
    write_all_vectored(conn.get_mut(), &mut slices[..used])
        .map_err(|e| BlobError::transport("writing request", e))?;

    let response = read_response_header(conn)?;
    if response.length == 0 {
        return Ok((response.status, 0));
    }

    let n = usize::try_from(response.length).map_or(dst.len(), |len| len.min(dst.len()));
    conn.read_exact(&mut dst[..n])
        .map_err(|e| BlobError::transport("reading response data", e))?;

    let extra = response.length - n as u64;
    if extra > 0 {
        let discarded = io::copy(&mut conn.by_ref().take(extra), &mut io::sink())
            .map_err(|e| BlobError::transport("discarding response data", e))?;
        if discarded < extra {
            return Err(BlobError::transport(
                "discarding response data",
                io::ErrorKind::UnexpectedEof.into(),
            ));
        }
    }

    Ok((response.status, n))
}

/// Gather write of every slice, retrying short writes.
fn write_all_vectored<W: Write>(w: &mut W, mut slices: &mut [IoSlice<'_>]) -> io::Result<()> {
    while !slices.is_empty() {
        match w.write_vectored(slices) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => IoSlice::advance_slices(&mut slices, n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
