//! WebSocket handshake, frame read/write, the app-level compression
//! envelope, and thread-safe send (spec §4.1).

use crate::codec::zstd_codec::{Compressor, Decompressor};
use crate::crypto::{base64, sha1};
use crate::error::{Error, Result};
use crate::ws::frame::{unmask, Frame, Opcode};
use std::io::{IoSlice, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const MAX_PAYLOAD: usize = 16 * 1024 * 1024;
const HANDSHAKE_BUF_CAP: usize = 4096;
const ZSTD_LEVEL: i32 = 3;

/// Opaque binding recorded on a connection by its owning subsystem
/// (`Panel` or `TransferSession`), read back by callback dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserData {
    Panel(u32),
    Transfer(u32),
}

struct CodecState {
    compressor: Option<Compressor>,
    decompressor: Option<Decompressor>,
}

struct WriteSide {
    stream: Option<TcpStream>,
    codec: CodecState,
}

/// One accepted WebSocket connection. Owns the byte stream, a write mutex
/// that serializes concurrent writes with teardown, optional per-connection
/// zstd state, and an opaque `user_data` binding.
pub struct Connection {
    read_stream: TcpStream,
    write: Mutex<WriteSide>,
    is_open: AtomicBool,
    pub request_uri: String,
    pub user_data: Mutex<Option<UserData>>,
}

impl Connection {
    /// Perform the server-side handshake on an already-accepted socket.
    /// `enable_zstd` turns on the per-connection compression envelope for
    /// binary frames (spec §4.1, §6 "WebSocket compression envelope").
    pub fn accept(mut stream: TcpStream, enable_zstd: bool, write_timeout: Duration) -> Result<Self> {
        let mut buf = Vec::with_capacity(HANDSHAKE_BUF_CAP);
        let mut chunk = [0u8; 512];
        let header_end = loop {
            if buf.len() >= HANDSHAKE_BUF_CAP {
                return Err(Error::InvalidHandshake);
            }
            let n = stream.read(&mut chunk).map_err(|_| Error::InvalidHandshake)?;
            if n == 0 {
                return Err(Error::InvalidHandshake);
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = std::str::from_utf8(&buf[..header_end]).map_err(|_| Error::InvalidHandshake)?;
        let mut lines = head.split("\r\n");
        let request_line = lines.next().ok_or(Error::InvalidHandshake)?;
        let uri = request_line
            .split_ascii_whitespace()
            .nth(1)
            .ok_or(Error::InvalidHandshake)?
            .to_string();

        let mut key: Option<&str> = None;
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                if name.trim().eq_ignore_ascii_case("sec-websocket-key") {
                    key = Some(value.trim());
                }
            }
        }
        let key = key.ok_or(Error::InvalidHandshake)?;

        let digest = sha1::sha1_digest(format!("{key}{WS_GUID}").as_bytes());
        let accept = base64::encode(&digest);

        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {accept}\r\n\r\n"
        );
        stream.write_all(response.as_bytes()).map_err(|_| Error::InvalidHandshake)?;
        stream.set_write_timeout(Some(write_timeout)).ok();

        let codec = if enable_zstd {
            CodecState {
                compressor: Some(Compressor::new(ZSTD_LEVEL)?),
                decompressor: Some(Decompressor::new()?),
            }
        } else {
            CodecState { compressor: None, decompressor: None }
        };

        let read_stream = stream.try_clone().map_err(Error::from)?;
        Ok(Connection {
            read_stream,
            write: Mutex::new(WriteSide { stream: Some(stream), codec }),
            is_open: AtomicBool::new(true),
            request_uri: uri,
            user_data: Mutex::new(None),
        })
    }

    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Acquire)
    }

    pub fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
        use std::os::unix::io::AsRawFd;
        self.read_stream.as_raw_fd()
    }

    pub fn token_from_uri(&self) -> Option<&str> {
        let (_, query) = self.request_uri.split_once('?')?;
        query.split('&').find_map(|kv| kv.strip_prefix("token="))
    }

    /// Read one frame. Enforces the 16 MiB payload cap and applies the
    /// compression envelope to binary frames on zstd-enabled connections.
    pub fn read_frame(&self) -> Result<Frame> {
        let mut reader = &self.read_stream;
        let mut header = [0u8; 2];
        read_exact_or_closed(&mut reader, &mut header)?;

        let fin = header[0] & 0x80 != 0;
        let opcode = Opcode::from_byte(header[0] & 0x0F).ok_or(Error::InvalidHandshake)?;
        let masked = header[1] & 0x80 != 0;
        let len7 = (header[1] & 0x7F) as u64;

        let len: u64 = match len7 {
            126 => {
                let mut ext = [0u8; 2];
                read_exact_or_closed(&mut reader, &mut ext)?;
                u16::from_be_bytes(ext) as u64
            }
            127 => {
                let mut ext = [0u8; 8];
                read_exact_or_closed(&mut reader, &mut ext)?;
                u64::from_be_bytes(ext)
            }
            n => n,
        };
        if len as usize > MAX_PAYLOAD {
            return Err(Error::PayloadTooLarge);
        }

        let mask_key = if masked {
            let mut k = [0u8; 4];
            read_exact_or_closed(&mut reader, &mut k)?;
            Some(k)
        } else {
            None
        };

        let mut payload = vec![0u8; len as usize];
        read_exact_or_closed(&mut reader, &mut payload)?;
        if let Some(key) = mask_key {
            unmask(&mut payload, key);
        }

        if opcode == Opcode::Binary && payload.len() >= 2 {
            let mut write = self.write.lock().unwrap();
            if let Some(dec) = write.codec.decompressor.as_mut() {
                let flag = payload[0];
                payload = match flag {
                    0x00 => payload.split_off(1),
                    0x01 => dec.decompress(&payload[1..], MAX_PAYLOAD).map_err(|_| Error::DecompressionFailed)?,
                    _ => payload,
                };
            }
        }

        Ok(Frame { fin, opcode, payload })
    }

    pub fn send_text(&self, text: &str) -> Result<()> {
        self.write_frame(Opcode::Text, text.as_bytes(), &[])
    }

    pub fn send_binary(&self, payload: &[u8]) -> Result<()> {
        self.write_frame(Opcode::Binary, payload, &[])
    }

    /// Write a binary frame assembled from two parts without concatenating
    /// them in a caller-visible buffer (e.g. a pixel-frame header + the
    /// already-compressed payload).
    pub fn send_binary_parts(&self, prefix: &[u8], payload: &[u8]) -> Result<()> {
        self.write_frame_parts(Opcode::Binary, prefix, payload)
    }

    pub fn send_close(&self) -> Result<()> {
        self.write_frame(Opcode::Close, &[], &[])
    }

    pub fn send_pong(&self, data: &[u8]) -> Result<()> {
        self.write_frame(Opcode::Pong, data, &[])
    }

    fn write_frame(&self, opcode: Opcode, prefix: &[u8], payload: &[u8]) -> Result<()> {
        self.write_frame_parts(opcode, &[prefix, payload].concat(), &[])
    }

    fn write_frame_parts(&self, opcode: Opcode, prefix: &[u8], payload: &[u8]) -> Result<()> {
        let mut write = self.write.lock().unwrap();
        if !self.is_open.load(Ordering::Acquire) || write.stream.is_none() {
            return Err(Error::ConnectionClosed);
        }

        // The compression envelope only applies to binary frames.
        let envelope_flag: Option<u8>;
        let body: Vec<u8>;
        if opcode == Opcode::Binary && write.codec.compressor.is_some() {
            let joined = if payload.is_empty() { prefix.to_vec() } else { [prefix, payload].concat() };
            let compressor = write.codec.compressor.as_mut().unwrap();
            match compressor.compress(&joined) {
                Ok(compressed) if compressed.len() + 1 < joined.len() => {
                    envelope_flag = Some(0x01);
                    body = compressed;
                }
                _ => {
                    envelope_flag = Some(0x00);
                    body = joined;
                }
            }
        } else {
            envelope_flag = None;
            body = Vec::new();
        }

        let header_payload_len = match envelope_flag {
            Some(_) => body.len() + 1,
            None => prefix.len() + payload.len(),
        };

        let mut header = Vec::with_capacity(10);
        header.push(0x80 | opcode.as_byte());
        if header_payload_len <= 125 {
            header.push(header_payload_len as u8);
        } else if header_payload_len <= u16::MAX as usize {
            header.push(126);
            header.extend_from_slice(&(header_payload_len as u16).to_be_bytes());
        } else {
            header.push(127);
            header.extend_from_slice(&(header_payload_len as u64).to_be_bytes());
        }

        let flag_byte = [envelope_flag.unwrap_or(0)];
        let mut slices: Vec<IoSlice> = Vec::with_capacity(4);
        slices.push(IoSlice::new(&header));
        match envelope_flag {
            Some(f) => {
                let _ = f;
                slices.push(IoSlice::new(&flag_byte));
                slices.push(IoSlice::new(&body));
            }
            None => {
                slices.push(IoSlice::new(prefix));
                slices.push(IoSlice::new(payload));
            }
        }

        let stream = write.stream.as_mut().unwrap();
        let result = write_vectored_all(stream, &mut slices);
        match result {
            Ok(()) => Ok(()),
            Err(WriteFault::WouldBlockAtStart) => Err(Error::WouldBlock),
            Err(WriteFault::BrokenMidFrame) | Err(WriteFault::Other) => {
                self.is_open.store(false, Ordering::Release);
                Err(Error::BrokenPipe)
            }
        }
    }

    /// Tear down: acquire the write mutex, clear `is_open`, drop codecs, then
    /// close the stream -- eliminating use-after-free from a concurrent
    /// broadcast that is mid-write when this runs (spec §4.1).
    pub fn close(&self) {
        let mut write = self.write.lock().unwrap();
        self.is_open.store(false, Ordering::Release);
        write.codec.compressor = None;
        write.codec.decompressor = None;
        if let Some(stream) = write.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

enum WriteFault {
    WouldBlockAtStart,
    BrokenMidFrame,
    Other,
}

/// Send `slices` as one logical frame using vectored writes. Advances past
/// partially-written iovecs and retries. A `WouldBlock` before any bytes
/// were written drops the frame; a `WouldBlock` after partial progress
/// promotes the connection to closed, since resuming could interleave bytes
/// with another thread's frame (spec §4.1).
fn write_vectored_all(stream: &mut TcpStream, slices: &mut [IoSlice]) -> std::result::Result<(), WriteFault> {
    // Own the bytes so a partially-consumed leading iovec can be trimmed by
    // advancing an offset instead of reallocating/leaking on every retry.
    let mut bufs: Vec<Vec<u8>> = slices.iter().map(|s| s.to_vec()).collect();
    let mut front_offset = 0usize;
    let mut wrote_any = false;

    loop {
        let iovecs: Vec<IoSlice> = bufs
            .iter()
            .enumerate()
            .map(|(i, b)| IoSlice::new(if i == 0 { &b[front_offset..] } else { &b[..] }))
            .collect();
        let remaining_total: usize = iovecs.iter().map(|b| b.len()).sum();
        if remaining_total == 0 {
            return Ok(());
        }
        match stream.write_vectored(&iovecs) {
            Ok(0) => return Err(WriteFault::Other),
            Ok(mut n) => {
                wrote_any = true;
                while n > 0 && !bufs.is_empty() {
                    let avail = bufs[0].len() - front_offset;
                    if n < avail {
                        front_offset += n;
                        n = 0;
                    } else {
                        n -= avail;
                        bufs.remove(0);
                        front_offset = 0;
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                return if wrote_any {
                    Err(WriteFault::BrokenMidFrame)
                } else {
                    Err(WriteFault::WouldBlockAtStart)
                };
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => return Err(WriteFault::Other),
        }
    }
}

fn read_exact_or_closed(stream: &mut &TcpStream, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return Err(if filled == 0 { Error::ConnectionClosed } else { Error::BrokenPipe }),
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::from(e)),
        }
    }
    Ok(())
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream as ClientStream};

    fn loopback_pair() -> (TcpStream, ClientStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = ClientStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (server, client)
    }

    #[test]
    fn handshake_computes_rfc6455_accept() {
        let (server, mut client) = loopback_pair();
        let handle = std::thread::spawn(move || Connection::accept(server, false, Duration::from_secs(1)));

        let request = "GET /ws/panel HTTP/1.1\r\n\
            Host: example.com\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
            Sec-WebSocket-Version: 13\r\n\r\n";
        client.write_all(request.as_bytes()).unwrap();

        let mut resp = [0u8; 512];
        let n = client.read(&mut resp).unwrap();
        let resp = String::from_utf8_lossy(&resp[..n]);
        assert!(resp.contains("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));

        let conn = handle.join().unwrap().unwrap();
        assert_eq!(conn.request_uri, "/ws/panel");
    }

    #[test]
    fn frame_round_trip_preserves_opcode_and_payload() {
        let (server, client) = loopback_pair();
        let conn = Connection::accept_for_test(server);
        let mut client = client;

        // Write a masked text frame as a client would.
        let payload = b"hello";
        let key = [0x01, 0x02, 0x03, 0x04];
        let mut masked = payload.to_vec();
        unmask(&mut masked, key);
        let mut wire = vec![0x81u8, 0x80 | payload.len() as u8];
        wire.extend_from_slice(&key);
        wire.extend_from_slice(&masked);
        client.write_all(&wire).unwrap();

        let frame = conn.read_frame().unwrap();
        assert_eq!(frame.opcode, Opcode::Text);
        assert_eq!(frame.payload, payload);
    }

    impl Connection {
        fn accept_for_test(stream: TcpStream) -> Connection {
            let read_stream = stream.try_clone().unwrap();
            Connection {
                read_stream,
                write: Mutex::new(WriteSide {
                    stream: Some(stream),
                    codec: CodecState { compressor: None, decompressor: None },
                }),
                is_open: AtomicBool::new(true),
                request_uri: String::new(),
                user_data: Mutex::new(None),
            }
        }
    }
}
