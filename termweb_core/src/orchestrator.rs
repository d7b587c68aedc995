//! Panel registry, control/panel/http wiring, pending-work queues, and the
//! single-threaded render loop (spec §4.7 "Server (orchestrator)").

use crate::codec::zstd_codec;
use crate::error::Result;
use crate::messages::{self, ClientMessage, PanelSummary, ServerMessage};
use crate::panel::{self, Panel};
use crate::surface::{Surface, SurfaceRuntime};
use crate::transfer::{self, wire as transfer_wire, TransferManager};
use crate::ws::connection::UserData;
use crate::ws::{Connection, WsCallbacks};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const MAX_PANELS_DRAIN_PER_TICK: usize = panel::MAX_DRAIN_BATCH;
pub const RENDER_FPS: u32 = 30;
pub const FRAME_BUDGET: Duration = Duration::from_micros(1_000_000 / RENDER_FPS as u64);
pub const RENDERER_SETTLE_SLEEP: Duration = Duration::from_millis(1);

struct PendingCreate {
    connection: Arc<Connection>,
    width: u16,
    height: u16,
    scale: f32,
}

struct PendingResize {
    panel_id: u32,
    width: u16,
    height: u16,
}

/// A boxed constructor for the out-of-scope "surface" SPI (spec §1). Injected
/// so this crate stays free of any concrete terminal-emulator dependency.
pub type SurfaceFactory = dyn Fn(u32, (u16, u16), f32) -> Result<Box<dyn Surface>> + Send + Sync;

pub struct Server<R: SurfaceRuntime> {
    panels: Mutex<HashMap<u32, Arc<Panel>>>,
    panel_connections: Mutex<HashMap<usize, u32>>,
    control_connections: Mutex<Vec<Arc<Connection>>>,
    pending_create: Mutex<VecDeque<PendingCreate>>,
    pending_destroy: Mutex<VecDeque<u32>>,
    pending_resize: Mutex<VecDeque<PendingResize>>,
    next_panel_id: AtomicU32,
    running: AtomicBool,
    runtime: Mutex<R>,
    surface_factory: Box<SurfaceFactory>,
    transfers: TransferManager,
}

const MAX_DECOMPRESSED: usize = 16 * 1024 * 1024;
const TRANSFER_CHUNK_SIZE: usize = 64 * 1024;

impl<R: SurfaceRuntime> Server<R> {
    pub fn new(runtime: R, surface_factory: Box<SurfaceFactory>) -> Arc<Self> {
        Arc::new(Server {
            panels: Mutex::new(HashMap::new()),
            panel_connections: Mutex::new(HashMap::new()),
            control_connections: Mutex::new(Vec::new()),
            pending_create: Mutex::new(VecDeque::new()),
            pending_destroy: Mutex::new(VecDeque::new()),
            pending_resize: Mutex::new(VecDeque::new()),
            next_panel_id: AtomicU32::new(1),
            running: AtomicBool::new(true),
            runtime: Mutex::new(runtime),
            surface_factory,
            transfers: TransferManager::new(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    fn broadcast(&self, msg: ServerMessage) {
        let json = msg.to_json();
        let connections = self.control_connections.lock().unwrap();
        for conn in connections.iter() {
            if conn.is_open() {
                let _ = conn.send_text(&json);
            }
        }
    }

    fn panel_summaries(&self) -> Vec<PanelSummary> {
        self.panels
            .lock()
            .unwrap()
            .values()
            .map(|p| {
                let (w, h) = p.pixel_size();
                PanelSummary { panel_id: p.id, width: w as u16, height: h as u16 }
            })
            .collect()
    }

    /// The invoking thread becomes the render loop; returns when `stop()` is
    /// called (spec §4.7 "Thread ownership").
    pub fn run_render_loop(self: &Arc<Self>) {
        while self.is_running() {
            let tick_start = Instant::now();

            self.drain_pending_create();
            self.drain_pending_destroy();
            self.drain_pending_resize();

            self.runtime.lock().unwrap().tick_all();

            let panels: Vec<Arc<Panel>> = self.panels.lock().unwrap().values().cloned().collect();
            for panel in &panels {
                panel.drain_input(MAX_PANELS_DRAIN_PER_TICK);
            }

            std::thread::sleep(RENDERER_SETTLE_SLEEP);

            for panel in &panels {
                if !panel.is_streaming() {
                    continue;
                }
                if !panel.capture() {
                    continue;
                }
                if let Some((_kind, bytes)) = panel.prepare_frame() {
                    panel.send_frame(&bytes);
                }
            }

            let elapsed = tick_start.elapsed();
            if elapsed < FRAME_BUDGET {
                std::thread::sleep(FRAME_BUDGET - elapsed);
            }
        }
    }

    fn drain_pending_create(&self) {
        let items: Vec<PendingCreate> = self.pending_create.lock().unwrap().drain(..).collect();
        for item in items {
            let id = self.next_panel_id.fetch_add(1, Ordering::AcqRel);
            match (self.surface_factory)(id, (item.width, item.height), item.scale) {
                Ok(surface) => {
                    let panel = Arc::new(Panel::new(id, surface, (item.width, item.height), item.scale));
                    panel.set_connection(Some(item.connection.clone()));
                    *item.connection.user_data.lock().unwrap() = Some(UserData::Panel(id));
                    self.panels.lock().unwrap().insert(id, panel.clone());
                    self.panel_connections.lock().unwrap().insert(conn_key(&item.connection), id);

                    let (w, h) = panel.pixel_size();
                    self.broadcast(ServerMessage::PanelCreated { panel_id: id, width: w as u16, height: h as u16 });
                }
                Err(_) => {
                    let _ = item.connection.send_text(&ServerMessage::PanelClosed { panel_id: id }.to_json());
                    item.connection.close();
                }
            }
        }
    }

    fn drain_pending_destroy(&self) {
        let ids: Vec<u32> = self.pending_destroy.lock().unwrap().drain(..).collect();
        for id in ids {
            let panel = self.panels.lock().unwrap().remove(&id);
            if let Some(panel) = panel {
                if let Some(conn) = panel.bound_connection() {
                    conn.close();
                }
            }
            self.panel_connections.lock().unwrap().retain(|_, panel_id| *panel_id != id);
            self.broadcast(ServerMessage::PanelClosed { panel_id: id });
        }
    }

    fn drain_pending_resize(&self) {
        let items: Vec<PendingResize> = self.pending_resize.lock().unwrap().drain(..).collect();
        let panels = self.panels.lock().unwrap();
        for item in items {
            if let Some(panel) = panels.get(&item.panel_id) {
                panel.resize_internal(item.width, item.height);
            }
        }
    }
}

fn conn_key(conn: &Arc<Connection>) -> usize {
    Arc::as_ptr(conn) as usize
}

/// Panel-WS callbacks (spec §4.7 "Panel WS callbacks").
pub struct PanelCallbacks<R: SurfaceRuntime> {
    server: Arc<Server<R>>,
}

impl<R: SurfaceRuntime> PanelCallbacks<R> {
    pub fn new(server: Arc<Server<R>>) -> Self {
        PanelCallbacks { server }
    }
}

impl<R: SurfaceRuntime + 'static> WsCallbacks for PanelCallbacks<R> {
    fn on_connect(&self, _conn: &Arc<Connection>) {}

    fn on_message(&self, conn: &Arc<Connection>, payload: &[u8], is_binary: bool) {
        if !is_binary {
            return;
        }
        let bound_panel = match *conn.user_data.lock().unwrap() {
            Some(UserData::Panel(id)) => Some(id),
            _ => None,
        };
        if let Some(id) = bound_panel {
            if let Some(panel) = self.server.panels.lock().unwrap().get(&id) {
                panel.handle_message(payload);
            }
            return;
        }

        let Some((&tag, body)) = payload.split_first() else { return };
        match tag {
            panel::TAG_CONNECT_PANEL => {
                if body.len() < 4 {
                    return;
                }
                let id = u32::from_le_bytes(body[0..4].try_into().unwrap());
                if let Some(panel) = self.server.panels.lock().unwrap().get(&id) {
                    panel.set_connection(Some(conn.clone()));
                    *conn.user_data.lock().unwrap() = Some(UserData::Panel(id));
                    self.server.panel_connections.lock().unwrap().insert(conn_key(conn), id);
                }
            }
            panel::TAG_CREATE_PANEL => {
                if body.len() < 8 {
                    return;
                }
                let width = u16::from_le_bytes(body[0..2].try_into().unwrap());
                let height = u16::from_le_bytes(body[2..4].try_into().unwrap());
                let scale = f32::from_le_bytes(body[4..8].try_into().unwrap());
                self.server.pending_create.lock().unwrap().push_back(PendingCreate {
                    connection: conn.clone(),
                    width,
                    height,
                    scale,
                });
            }
            _ => {}
        }
    }

    fn on_disconnect(&self, conn: &Arc<Connection>) {
        let key = conn_key(conn);
        let panel_id = self.server.panel_connections.lock().unwrap().remove(&key);
        if let Some(id) = panel_id {
            if let Some(panel) = self.server.panels.lock().unwrap().get(&id) {
                panel.set_connection(None);
            }
        }
    }
}

/// Control-WS callbacks (spec §4.7 "Control WS callbacks").
pub struct ControlCallbacks<R: SurfaceRuntime> {
    server: Arc<Server<R>>,
}

impl<R: SurfaceRuntime> ControlCallbacks<R> {
    pub fn new(server: Arc<Server<R>>) -> Self {
        ControlCallbacks { server }
    }
}

impl<R: SurfaceRuntime + 'static> WsCallbacks for ControlCallbacks<R> {
    fn on_connect(&self, conn: &Arc<Connection>) {
        self.server.control_connections.lock().unwrap().push(conn.clone());
        let panels = self.server.panel_summaries();
        let _ = conn.send_text(&ServerMessage::PanelList { panels }.to_json());
    }

    fn on_message(&self, conn: &Arc<Connection>, payload: &[u8], is_binary: bool) {
        if is_binary {
            self.handle_transfer_message(conn, payload);
            return;
        }
        let Ok(text) = std::str::from_utf8(payload) else { return };
        let Some(msg) = messages::parse_client_message(text) else { return };
        match msg {
            ClientMessage::CreatePanel => {
                // Panels are created on panel-WS connect today; informational only.
            }
            ClientMessage::ClosePanel { panel_id } => {
                self.server.pending_destroy.lock().unwrap().push_back(panel_id);
            }
            ClientMessage::ResizePanel { panel_id, width, height } => {
                self.server.pending_resize.lock().unwrap().push_back(PendingResize { panel_id, width, height });
            }
            ClientMessage::FocusPanel { .. } => {
                // No render-affecting action is specified; informational only.
            }
            ClientMessage::ViewAction { panel_id, action } => {
                if let Some(panel) = self.server.panels.lock().unwrap().get(&panel_id) {
                    panel.view_action(&action);
                }
            }
        }
        let _ = conn;
    }

    fn on_disconnect(&self, conn: &Arc<Connection>) {
        let key = conn_key(conn);
        self.server.control_connections.lock().unwrap().retain(|c| conn_key(c) != key);
    }
}

impl<R: SurfaceRuntime> ControlCallbacks<R> {
    /// Dispatches a binary frame on the control channel as file-transfer
    /// protocol traffic (spec §4.8 "Wire messages") -- the control channel
    /// multiplexes JSON text frames with the transfer binary dialect since
    /// there is no dedicated transfer endpoint among the three bindings.
    fn handle_transfer_message(&self, conn: &Arc<Connection>, payload: &[u8]) {
        let Some((&tag, body)) = payload.split_first() else { return };
        match tag {
            transfer_wire::TAG_TRANSFER_INIT => {
                let Some(init) = transfer_wire::parse_transfer_init(body) else { return };
                let id = self.server.transfers.create_session(
                    init.direction,
                    init.flags,
                    std::path::PathBuf::from(init.path),
                    init.excludes,
                );
                *conn.user_data.lock().unwrap() = Some(UserData::Transfer(id));
                let _ = conn.send_binary(&transfer_wire::transfer_ready(id));
            }
            transfer_wire::TAG_FILE_LIST_REQUEST => {
                let Some(id) = bound_transfer(conn) else { return };
                let built = self.server.transfers.with_session(id, |session| -> crate::error::Result<_> {
                    if session.files.is_empty() {
                        session.build_file_list()?;
                    }
                    Ok((session.files.clone(), session.total_bytes, session.is_dry_run()))
                });
                let Some(built) = built else { return };
                let (files, total_bytes, dry_run) = match built {
                    Ok(v) => v,
                    Err(e) => {
                        let _ = conn.send_binary(&transfer_wire::transfer_error(id, &e.to_string()));
                        return;
                    }
                };
                if dry_run {
                    let report = dry_run_report(id, &files);
                    let _ = conn.send_binary(&report);
                    return;
                }
                let _ = conn.send_binary(&transfer_wire::file_list(id, &files, total_bytes));
                self.stream_download_chunks(conn, id, &files);
            }
            transfer_wire::TAG_FILE_DATA => {
                let Some(id) = bound_transfer(conn) else { return };
                self.apply_upload_chunk(conn, id, body);
            }
            transfer_wire::TAG_TRANSFER_RESUME => {
                if body.len() < 4 {
                    return;
                }
                let id = u32::from_le_bytes(body[0..4].try_into().unwrap());
                match crate::transfer::TransferSession::load(id) {
                    Ok(_session) => {
                        *conn.user_data.lock().unwrap() = Some(UserData::Transfer(id));
                        let _ = conn.send_binary(&transfer_wire::transfer_ready(id));
                    }
                    Err(e) => {
                        let _ = conn.send_binary(&transfer_wire::transfer_error(id, &e.to_string()));
                    }
                }
            }
            transfer_wire::TAG_TRANSFER_CANCEL => {
                if body.len() < 4 {
                    return;
                }
                let id = u32::from_le_bytes(body[0..4].try_into().unwrap());
                self.server.transfers.remove_session(id);
            }
            _ => {}
        }
    }

    fn stream_download_chunks(&self, conn: &Arc<Connection>, id: u32, files: &[transfer::FileEntry]) {
        let mut total_sent = 0u64;
        for (index, entry) in files.iter().enumerate() {
            if entry.is_dir {
                continue;
            }
            let mut offset = 0u64;
            loop {
                let compressed = self
                    .server
                    .transfers
                    .with_session(id, |session| session.compress_from_mapped(index, offset, TRANSFER_CHUNK_SIZE));
                let Some(Ok(compressed)) = compressed else { break };
                let read_len = entry.size_bytes.saturating_sub(offset).min(TRANSFER_CHUNK_SIZE as u64);
                if read_len == 0 {
                    break;
                }
                let packet = transfer_wire::file_chunk(id, index as u32, offset, read_len as u32, &compressed);
                if conn.send_binary(&packet).is_err() {
                    return;
                }
                offset += read_len;
                total_sent += read_len;
                self.server
                    .transfers
                    .with_session(id, |session| session.advance_cursor(index as u32, offset, read_len));
                if offset >= entry.size_bytes {
                    break;
                }
            }
        }
        let _ = conn.send_binary(&transfer_wire::transfer_complete(id, total_sent));
    }

    fn apply_upload_chunk(&self, conn: &Arc<Connection>, id: u32, body: &[u8]) {
        if body.len() < 16 {
            return;
        }
        let file_index = u32::from_le_bytes(body[0..4].try_into().unwrap());
        let offset = u64::from_le_bytes(body[4..12].try_into().unwrap());
        let uncompressed_size = u32::from_le_bytes(body[12..16].try_into().unwrap()) as usize;
        let compressed = &body[16..];
        let Ok(data) = zstd_codec::decompress_capped(compressed, uncompressed_size.min(MAX_DECOMPRESSED)) else {
            let _ = conn.send_binary(&transfer_wire::transfer_error(id, "decompression failed"));
            return;
        };

        let result = self.server.transfers.with_session(id, |session| {
            session.write_chunk(file_index as usize, offset, &data)?;
            session.advance_cursor(file_index, offset + data.len() as u64, data.len() as u64);
            session.save()
        });
        match result {
            Some(Ok(())) => {
                let bytes_received = self.server.transfers.with_session(id, |s| s.bytes_transferred).unwrap_or(0);
                let _ = conn.send_binary(&transfer_wire::file_ack(id, file_index, bytes_received));
            }
            _ => {
                let _ = conn.send_binary(&transfer_wire::transfer_error(id, "write failed"));
            }
        }
    }
}

fn bound_transfer(conn: &Arc<Connection>) -> Option<u32> {
    match *conn.user_data.lock().unwrap() {
        Some(UserData::Transfer(id)) => Some(id),
        _ => None,
    }
}

/// `[0x36][id:u32][new:u32][update:u32][delete:u32] then entries`. Every
/// listed entry is reported `new` (action=0): the engine has no destination
/// snapshot to diff against, only the freshly walked source tree.
fn dry_run_report(id: u32, files: &[transfer::FileEntry]) -> Vec<u8> {
    let mut out = vec![transfer_wire::TAG_DRY_RUN_REPORT];
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(files.len() as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    for entry in files {
        out.push(0u8);
        out.extend_from_slice(&(entry.relative_path.len() as u16).to_le_bytes());
        out.extend_from_slice(entry.relative_path.as_bytes());
        out.extend_from_slice(&entry.size_bytes.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::TestSurface;

    struct NoopRuntime;
    impl SurfaceRuntime for NoopRuntime {
        fn tick_all(&mut self) {}
    }

    fn test_server() -> Arc<Server<NoopRuntime>> {
        Server::new(
            NoopRuntime,
            Box::new(|_id, size, scale| Ok(Box::new(TestSurface::create(size, scale).unwrap()) as Box<dyn Surface>)),
        )
    }

    #[test]
    fn panel_summaries_empty_on_fresh_server() {
        let server = test_server();
        assert!(server.panel_summaries().is_empty());
    }

    #[test]
    fn stop_clears_running_flag() {
        let server = test_server();
        assert!(server.is_running());
        server.stop();
        assert!(!server.is_running());
    }

    #[test]
    fn pending_create_allocates_panel_and_broadcasts() {
        let server = test_server();
        let (server_stream, mut client) = loopback();
        let handle = std::thread::spawn(move || {
            crate::ws::connection::Connection::accept(server_stream, false, Duration::from_secs(1))
        });

        let request = "GET /ws/panel HTTP/1.1\r\n\
            Host: example.com\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
            Sec-WebSocket-Version: 13\r\n\r\n";
        use std::io::{Read, Write};
        client.write_all(request.as_bytes()).unwrap();
        let mut resp = [0u8; 512];
        let _ = client.read(&mut resp).unwrap();

        let conn = Arc::new(handle.join().unwrap().unwrap());
        server.pending_create.lock().unwrap().push_back(PendingCreate {
            connection: conn,
            width: 80,
            height: 24,
            scale: 1.0,
        });
        server.drain_pending_create();
        assert_eq!(server.panels.lock().unwrap().len(), 1);
    }

    fn loopback() -> (std::net::TcpStream, std::net::TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (server, client)
    }

    #[test]
    fn file_list_request_reports_error_instead_of_empty_list() {
        let server = test_server();
        let callbacks = ControlCallbacks::new(server.clone());
        let (server_stream, mut client) = loopback();
        let handle = std::thread::spawn(move || {
            crate::ws::connection::Connection::accept(server_stream, false, Duration::from_secs(1))
        });
        let request = "GET /ws/control HTTP/1.1\r\n\
            Host: example.com\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
            Sec-WebSocket-Version: 13\r\n\r\n";
        use std::io::{Read, Write};
        client.write_all(request.as_bytes()).unwrap();
        let mut resp = [0u8; 512];
        let _ = client.read(&mut resp).unwrap();
        let conn = Arc::new(handle.join().unwrap().unwrap());

        let missing = std::env::temp_dir().join("termweb_orchestrator_test_missing_dir_does_not_exist");
        let _ = std::fs::remove_dir_all(&missing);
        let id = server.transfers.create_session(
            crate::transfer::Direction::Download,
            0,
            missing,
            Vec::new(),
        );
        *conn.user_data.lock().unwrap() = Some(UserData::Transfer(id));

        let mut request_msg = vec![transfer_wire::TAG_FILE_LIST_REQUEST];
        request_msg.extend_from_slice(&id.to_le_bytes());
        callbacks.handle_transfer_message(&conn, &request_msg);

        let mut frame_buf = [0u8; 512];
        client.set_read_timeout(Some(Duration::from_secs(1))).unwrap();
        let n = client.read(&mut frame_buf).unwrap();
        assert!(n > 0, "expected a websocket frame carrying transfer_error");
        // The frame's payload starts a few bytes in past the WS header; the
        // error tag (0x35) must be present, and no file_list tag (0x31).
        assert!(frame_buf[..n].contains(&transfer_wire::TAG_TRANSFER_ERROR));
    }
}
