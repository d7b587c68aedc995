//! File-transfer session engine: session identity, file-list construction
//! with content hashing, chunked mmap-backed reads, compressed chunk
//! framing, and on-disk resumable state (spec §3 "TransferSession", §4.8).

use crate::codec::hash::hash_bytes;
use crate::codec::zstd_codec;
use crate::error::{Error, Result};
use memmap2::{Advice, Mmap};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    Upload = 0,
    Download = 1,
}

impl Direction {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Direction::Upload),
            1 => Some(Direction::Download),
            _ => None,
        }
    }
}

pub const FLAG_DELETE_EXTRA: u8 = 0x01;
pub const FLAG_DRY_RUN: u8 = 0x02;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub relative_path: String,
    pub size_bytes: u64,
    pub mtime_seconds: u64,
    pub content_hash: u64,
    pub is_dir: bool,
}

/// Current mmap held open by a session, re-mapped on access to a different
/// file index (spec §4.8 "Chunk read").
struct MappedFile {
    file_index: usize,
    mmap: Mmap,
}

pub struct TransferSession {
    pub id: u32,
    pub direction: Direction,
    pub flags: u8,
    pub base_path: PathBuf,
    pub exclude_globs: Vec<String>,
    pub files: Vec<FileEntry>,
    pub total_bytes: u64,
    pub current_file_index: u32,
    pub current_file_offset: u64,
    pub bytes_transferred: u64,
    mapped: Mutex<Option<MappedFile>>,
}

impl TransferSession {
    fn new(id: u32, direction: Direction, flags: u8, base_path: PathBuf, exclude_globs: Vec<String>) -> Self {
        TransferSession {
            id,
            direction,
            flags,
            base_path,
            exclude_globs,
            files: Vec::new(),
            total_bytes: 0,
            current_file_index: 0,
            current_file_offset: 0,
            bytes_transferred: 0,
            mapped: Mutex::new(None),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.flags & FLAG_DRY_RUN != 0
    }

    pub fn deletes_extra(&self) -> bool {
        self.flags & FLAG_DELETE_EXTRA != 0
    }

    /// Walk `base_path` recursively, excluding globbed relative paths, and
    /// fill `files`/`total_bytes` (spec §4.8 "File-list build").
    pub fn build_file_list(&mut self) -> Result<()> {
        let mut files = Vec::new();
        let mut total = 0u64;
        walk_dir(&self.base_path, &self.base_path, &self.exclude_globs, &mut files, &mut total)?;
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        self.files = files;
        self.total_bytes = total;
        Ok(())
    }

    /// Read up to `max_size` bytes starting at `offset` from `file_index`,
    /// re-mapping only when the requested file differs from the cached one.
    pub fn read_chunk(&self, file_index: usize, offset: u64, max_size: usize) -> Result<Vec<u8>> {
        let entry = self.files.get(file_index).ok_or(Error::InvalidFileIndex)?;
        if entry.is_dir {
            return Err(Error::IsDirectory);
        }
        let full_path = self.base_path.join(&entry.relative_path);

        let mut mapped = self.mapped.lock().unwrap();
        let needs_remap = match mapped.as_ref() {
            Some(m) => m.file_index != file_index,
            None => true,
        };
        if needs_remap {
            let file = File::open(&full_path).map_err(|_| Error::ReadFailed)?;
            let mmap = unsafe { Mmap::map(&file).map_err(|_| Error::ReadFailed)? };
            let _ = mmap.advise(Advice::Sequential);
            *mapped = Some(MappedFile { file_index, mmap });
        }

        let mmap = &mapped.as_ref().unwrap().mmap;
        let start = (offset as usize).min(mmap.len());
        let end = (start + max_size).min(mmap.len());
        Ok(mmap[start..end].to_vec())
    }

    /// `read_chunk` followed by zstd at the transfer level (spec §4.8
    /// "Compression").
    pub fn compress_from_mapped(&self, file_index: usize, offset: u64, max_size: usize) -> Result<Vec<u8>> {
        let raw = self.read_chunk(file_index, offset, max_size)?;
        zstd_codec::compress(&raw, zstd_codec::TRANSFER_LEVEL).map_err(Error::from)
    }

    /// Write an already-decompressed chunk to `self.files[file_index]`'s
    /// destination path at `offset`, creating parent directories and the
    /// file as needed (upload direction; spec §4.8 "file_data").
    pub fn write_chunk(&self, file_index: usize, offset: u64, data: &[u8]) -> Result<()> {
        let entry = self.files.get(file_index).ok_or(Error::InvalidFileIndex)?;
        if entry.is_dir {
            return Err(Error::IsDirectory);
        }
        let full_path = self.base_path.join(&entry.relative_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        use std::io::{Seek, SeekFrom, Write};
        let mut file = std::fs::OpenOptions::new().create(true).write(true).open(&full_path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    pub fn advance_cursor(&mut self, file_index: u32, offset: u64, bytes: u64) {
        self.current_file_index = file_index;
        self.current_file_offset = offset;
        self.bytes_transferred = self.bytes_transferred.saturating_add(bytes);
    }

    fn state_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(PathBuf::from(home).join(".termweb").join("transfers"))
    }

    /// Serialize cursor + file list so a resumed session matches byte-for-byte
    /// (spec §4.8 "Resumable state").
    pub fn save(&self) -> Result<()> {
        let dir = Self::state_path().ok_or(Error::StateMissing)?;
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.state", self.id));

        let mut buf = Vec::new();
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.push(self.direction as u8);
        buf.push(self.flags);
        buf.extend_from_slice(&self.current_file_index.to_le_bytes());
        buf.extend_from_slice(&self.current_file_offset.to_le_bytes());
        buf.extend_from_slice(&self.bytes_transferred.to_le_bytes());

        let base = self.base_path.to_string_lossy();
        buf.extend_from_slice(&(base.len() as u16).to_le_bytes());
        buf.extend_from_slice(base.as_bytes());

        buf.extend_from_slice(&(self.files.len() as u32).to_le_bytes());
        for entry in &self.files {
            buf.extend_from_slice(&(entry.relative_path.len() as u16).to_le_bytes());
            buf.extend_from_slice(entry.relative_path.as_bytes());
            buf.extend_from_slice(&entry.size_bytes.to_le_bytes());
            buf.extend_from_slice(&entry.mtime_seconds.to_le_bytes());
            buf.extend_from_slice(&entry.content_hash.to_le_bytes());
            buf.push(entry.is_dir as u8);
        }

        let tmp_path = path.with_extension("state.tmp");
        std::fs::write(&tmp_path, &buf)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Rejects a state file whose id does not match `id` (spec §4.8 "Load
    /// rejects mismatched ids").
    pub fn load(id: u32) -> Result<Self> {
        let dir = Self::state_path().ok_or(Error::StateMissing)?;
        let path = dir.join(format!("{id}.state"));
        let buf = std::fs::read(&path).map_err(|_| Error::StateMissing)?;
        let mut r = Reader::new(&buf);

        let stored_id = r.u32().ok_or(Error::InvalidStateFile)?;
        if stored_id != id {
            return Err(Error::InvalidStateFile);
        }
        let direction = Direction::from_byte(r.u8().ok_or(Error::InvalidStateFile)?).ok_or(Error::InvalidStateFile)?;
        let flags = r.u8().ok_or(Error::InvalidStateFile)?;
        let current_file_index = r.u32().ok_or(Error::InvalidStateFile)?;
        let current_file_offset = r.u64().ok_or(Error::InvalidStateFile)?;
        let bytes_transferred = r.u64().ok_or(Error::InvalidStateFile)?;
        let base_path = PathBuf::from(r.string16().ok_or(Error::InvalidStateFile)?);

        let file_count = r.u32().ok_or(Error::InvalidStateFile)?;
        let mut files = Vec::with_capacity(file_count as usize);
        let mut total_bytes = 0u64;
        for _ in 0..file_count {
            let relative_path = r.string16().ok_or(Error::InvalidStateFile)?;
            let size_bytes = r.u64().ok_or(Error::InvalidStateFile)?;
            let mtime_seconds = r.u64().ok_or(Error::InvalidStateFile)?;
            let content_hash = r.u64().ok_or(Error::InvalidStateFile)?;
            let is_dir = r.u8().ok_or(Error::InvalidStateFile)? != 0;
            if !is_dir {
                total_bytes += size_bytes;
            }
            files.push(FileEntry { relative_path, size_bytes, mtime_seconds, content_hash, is_dir });
        }

        Ok(TransferSession {
            id,
            direction,
            flags,
            base_path,
            exclude_globs: Vec::new(),
            files,
            total_bytes,
            current_file_index,
            current_file_offset,
            bytes_transferred,
            mapped: Mutex::new(None),
        })
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let slice = self.buf.get(self.pos..self.pos + n)?;
        self.pos += n;
        Some(slice)
    }

    fn u8(&mut self) -> Option<u8> {
        Some(self.take(1)?[0])
    }

    fn u16(&mut self) -> Option<u16> {
        Some(u16::from_le_bytes(self.take(2)?.try_into().ok()?))
    }

    fn u32(&mut self) -> Option<u32> {
        Some(u32::from_le_bytes(self.take(4)?.try_into().ok()?))
    }

    fn u64(&mut self) -> Option<u64> {
        Some(u64::from_le_bytes(self.take(8)?.try_into().ok()?))
    }

    fn string16(&mut self) -> Option<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes).ok().map(String::from)
    }
}

/// Thread-safe registry of active sessions (spec §4.8 "Manager").
#[derive(Default)]
pub struct TransferManager {
    sessions: Mutex<HashMap<u32, TransferSession>>,
    next_id: AtomicU32,
}

impl TransferManager {
    pub fn new() -> Self {
        TransferManager { sessions: Mutex::new(HashMap::new()), next_id: AtomicU32::new(1) }
    }

    pub fn create_session(
        &self,
        direction: Direction,
        flags: u8,
        base_path: PathBuf,
        exclude_globs: Vec<String>,
    ) -> u32 {
        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        let session = TransferSession::new(id, direction, flags, base_path, exclude_globs);
        self.sessions.lock().unwrap().insert(id, session);
        id
    }

    pub fn with_session<R>(&self, id: u32, f: impl FnOnce(&mut TransferSession) -> R) -> Option<R> {
        self.sessions.lock().unwrap().get_mut(&id).map(f)
    }

    /// Honors `transfer_cancel` by removing the session (spec §5 "Cancellation").
    pub fn remove_session(&self, id: u32) -> Option<TransferSession> {
        self.sessions.lock().unwrap().remove(&id)
    }
}

fn walk_dir(
    root: &Path,
    dir: &Path,
    excludes: &[String],
    out: &mut Vec<FileEntry>,
    total_bytes: &mut u64,
) -> Result<()> {
    let entries = std::fs::read_dir(dir)?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().replace('\\', "/");
        if excludes.iter().any(|pattern| glob_match(pattern, &relative)) {
            continue;
        }

        let meta = entry.metadata()?;
        if meta.is_dir() {
            out.push(FileEntry { relative_path: relative, size_bytes: 0, mtime_seconds: 0, content_hash: 0, is_dir: true });
            walk_dir(root, &path, excludes, out, total_bytes)?;
        } else {
            let file = File::open(&path).map_err(|_| Error::ReadFailed)?;
            let hash = if meta.len() == 0 {
                hash_bytes(&[])
            } else {
                let mmap = unsafe { Mmap::map(&file).map_err(|_| Error::ReadFailed)? };
                let _ = mmap.advise(Advice::Sequential);
                hash_bytes(&mmap)
            };
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            *total_bytes += meta.len();
            out.push(FileEntry {
                relative_path: relative,
                size_bytes: meta.len(),
                mtime_seconds: mtime,
                content_hash: hash,
                is_dir: false,
            });
        }
    }
    Ok(())
}

/// Classic backtracking glob with `*` and `?` only (spec §4.8, §8 property 8).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    match_from(&p, 0, &t, 0)
}

fn match_from(p: &[char], pi: usize, t: &[char], ti: usize) -> bool {
    if pi == p.len() {
        return ti == t.len();
    }
    match p[pi] {
        '*' => {
            for skip in 0..=(t.len() - ti) {
                if match_from(p, pi + 1, t, ti + skip) {
                    return true;
                }
            }
            false
        }
        '?' => ti < t.len() && match_from(p, pi + 1, t, ti + 1),
        c => ti < t.len() && t[ti] == c && match_from(p, pi + 1, t, ti + 1),
    }
}

/// Client->server and server->client transfer wire tags and encoders/decoders
/// (spec §4.8 "Wire messages"). All numeric fields little-endian.
pub mod wire {
    use super::{Direction, FileEntry};

    pub const TAG_TRANSFER_INIT: u8 = 0x20;
    pub const TAG_FILE_LIST_REQUEST: u8 = 0x21;
    pub const TAG_FILE_DATA: u8 = 0x22;
    pub const TAG_TRANSFER_RESUME: u8 = 0x23;
    pub const TAG_TRANSFER_CANCEL: u8 = 0x24;

    pub const TAG_TRANSFER_READY: u8 = 0x30;
    pub const TAG_FILE_LIST: u8 = 0x31;
    pub const TAG_FILE_CHUNK: u8 = 0x32;
    pub const TAG_FILE_ACK: u8 = 0x33;
    pub const TAG_TRANSFER_COMPLETE: u8 = 0x34;
    pub const TAG_TRANSFER_ERROR: u8 = 0x35;
    pub const TAG_DRY_RUN_REPORT: u8 = 0x36;

    pub struct TransferInit {
        pub direction: Direction,
        pub flags: u8,
        pub path: String,
        pub excludes: Vec<String>,
    }

    /// `[direction:u8][flags:u8][exclude_count:u8][path_len:u16][path] then
    /// exclude_count x [len:u8][pattern]`.
    pub fn parse_transfer_init(body: &[u8]) -> Option<TransferInit> {
        let mut r = super::Reader::new(body);
        let direction = Direction::from_byte(r.u8()?)?;
        let flags = r.u8()?;
        let exclude_count = r.u8()?;
        let path_len = r.u16()? as usize;
        let path = String::from_utf8(r.take(path_len)?.to_vec()).ok()?;
        let mut excludes = Vec::with_capacity(exclude_count as usize);
        for _ in 0..exclude_count {
            let len = r.u8()? as usize;
            excludes.push(String::from_utf8(r.take(len)?.to_vec()).ok()?);
        }
        Some(TransferInit { direction, flags, path, excludes })
    }

    /// `[0x30][transfer_id:u32]`.
    pub fn transfer_ready(id: u32) -> Vec<u8> {
        let mut out = vec![TAG_TRANSFER_READY];
        out.extend_from_slice(&id.to_le_bytes());
        out
    }

    /// `[0x31][id:u32][count:u32][total_bytes:u64] then per entry
    /// [path_len:u16][path][size:u64][mtime:u64][hash:u64][is_dir:u8]`.
    pub fn file_list(id: u32, files: &[FileEntry], total_bytes: u64) -> Vec<u8> {
        let mut out = vec![TAG_FILE_LIST];
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&(files.len() as u32).to_le_bytes());
        out.extend_from_slice(&total_bytes.to_le_bytes());
        for entry in files {
            out.extend_from_slice(&(entry.relative_path.len() as u16).to_le_bytes());
            out.extend_from_slice(entry.relative_path.as_bytes());
            out.extend_from_slice(&entry.size_bytes.to_le_bytes());
            out.extend_from_slice(&entry.mtime_seconds.to_le_bytes());
            out.extend_from_slice(&entry.content_hash.to_le_bytes());
            out.push(entry.is_dir as u8);
        }
        out
    }

    /// `[0x32][id:u32][file_index:u32][offset:u64][uncompressed_size:u32][zstd bytes]`.
    pub fn file_chunk(id: u32, file_index: u32, offset: u64, uncompressed_size: u32, compressed: &[u8]) -> Vec<u8> {
        let mut out = vec![TAG_FILE_CHUNK];
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&file_index.to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&uncompressed_size.to_le_bytes());
        out.extend_from_slice(compressed);
        out
    }

    /// `[0x33][id:u32][file_index:u32][bytes_received:u64]`.
    pub fn file_ack(id: u32, file_index: u32, bytes_received: u64) -> Vec<u8> {
        let mut out = vec![TAG_FILE_ACK];
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&file_index.to_le_bytes());
        out.extend_from_slice(&bytes_received.to_le_bytes());
        out
    }

    /// `[0x34][id:u32][total_bytes:u64]`.
    pub fn transfer_complete(id: u32, total_bytes: u64) -> Vec<u8> {
        let mut out = vec![TAG_TRANSFER_COMPLETE];
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&total_bytes.to_le_bytes());
        out
    }

    /// `[0x35][id:u32][msg_len:u16][msg]`.
    pub fn transfer_error(id: u32, msg: &str) -> Vec<u8> {
        let mut out = vec![TAG_TRANSFER_ERROR];
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&(msg.len() as u16).to_le_bytes());
        out.extend_from_slice(msg.as_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    // HOME is process-global; serialize the tests that touch it so they
    // don't race against each other under the parallel test harness.
    static HOME_LOCK: StdMutex<()> = StdMutex::new(());

    #[test]
    fn transfer_init_round_trips_direction_flags_and_excludes() {
        let mut body = vec![Direction::Download as u8, FLAG_DRY_RUN, 2u8];
        body.extend_from_slice(&7u16.to_le_bytes());
        body.extend_from_slice(b"/tmp/x1");
        body.push(5);
        body.extend_from_slice(b"*.tmp");
        body.push(4);
        body.extend_from_slice(b"*.db");

        let parsed = wire::parse_transfer_init(&body).unwrap();
        assert_eq!(parsed.direction, Direction::Download);
        assert_eq!(parsed.flags, FLAG_DRY_RUN);
        assert_eq!(parsed.path, "/tmp/x1");
        assert_eq!(parsed.excludes, vec!["*.tmp", "*.db"]);
    }

    #[test]
    fn file_list_wire_layout_matches_header_fields() {
        let entries = vec![FileEntry {
            relative_path: "a.txt".into(),
            size_bytes: 5,
            mtime_seconds: 100,
            content_hash: 0xABCD,
            is_dir: false,
        }];
        let packet = wire::file_list(9, &entries, 5);
        assert_eq!(packet[0], wire::TAG_FILE_LIST);
        assert_eq!(u32::from_le_bytes(packet[1..5].try_into().unwrap()), 9);
        assert_eq!(u32::from_le_bytes(packet[5..9].try_into().unwrap()), 1);
        assert_eq!(u64::from_le_bytes(packet[9..17].try_into().unwrap()), 5);
    }

    #[test]
    fn glob_semantics_match_spec_examples() {
        assert!(glob_match("*.log", "a/b.log"));
        assert!(glob_match("foo/*.tmp", "foo/bar.tmp"));
        assert!(!glob_match("*.tmp", "a.log"));
        assert!(glob_match("?", "a"));
        assert!(!glob_match("?", "ab"));
    }

    #[test]
    fn file_list_is_built_in_deterministic_order_with_hashes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"world").unwrap();
        std::fs::write(dir.path().join("skip.tmp"), b"ignored").unwrap();

        let mut session = TransferSession::new(1, Direction::Download, 0, dir.path().to_path_buf(), vec!["*.tmp".into()]);
        session.build_file_list().unwrap();

        let names: Vec<&str> = session.files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert_eq!(session.total_bytes, 10);
        assert_eq!(session.files[0].content_hash, hash_bytes(b"world"));
    }

    #[test]
    fn read_chunk_bounds_to_file_size() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.bin"), vec![7u8; 100]).unwrap();
        let mut session = TransferSession::new(1, Direction::Download, 0, dir.path().to_path_buf(), vec![]);
        session.build_file_list().unwrap();

        let chunk = session.read_chunk(0, 90, 50).unwrap();
        assert_eq!(chunk.len(), 10);
    }

    #[test]
    fn state_round_trips_cursor_and_file_list() {
        let _guard = HOME_LOCK.lock().unwrap();
        std::env::set_var("HOME", tempfile::tempdir().unwrap().path());
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.txt"), b"contents").unwrap();

        let mut session = TransferSession::new(42, Direction::Upload, FLAG_DRY_RUN, dir.path().to_path_buf(), vec![]);
        session.build_file_list().unwrap();
        session.advance_cursor(0, 4, 4);
        session.save().unwrap();

        let loaded = TransferSession::load(42).unwrap();
        assert_eq!(loaded.current_file_index, 0);
        assert_eq!(loaded.current_file_offset, 4);
        assert_eq!(loaded.bytes_transferred, 4);
        assert_eq!(loaded.files, session.files);
        assert_eq!(loaded.flags, FLAG_DRY_RUN);
    }

    #[test]
    fn write_chunk_creates_file_at_offset() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = TransferSession::new(1, Direction::Upload, 0, dir.path().to_path_buf(), vec![]);
        session.files.push(FileEntry {
            relative_path: "nested/out.bin".into(),
            size_bytes: 0,
            mtime_seconds: 0,
            content_hash: 0,
            is_dir: false,
        });
        session.write_chunk(0, 0, b"hello ").unwrap();
        session.write_chunk(0, 6, b"world").unwrap();
        let contents = std::fs::read(dir.path().join("nested/out.bin")).unwrap();
        assert_eq!(contents, b"hello world");
    }

    #[test]
    fn load_rejects_mismatched_id() {
        let _guard = HOME_LOCK.lock().unwrap();
        std::env::set_var("HOME", tempfile::tempdir().unwrap().path());
        let dir = tempfile::tempdir().unwrap();
        let mut session = TransferSession::new(5, Direction::Upload, 0, dir.path().to_path_buf(), vec![]);
        session.build_file_list().unwrap();
        session.save().unwrap();

        assert!(TransferSession::load(6).is_err());
    }
}
