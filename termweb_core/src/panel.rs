//! One hosted terminal session: a terminal surface, a framebuffer, an input
//! queue, and a connection binding (spec §3 "Panel", §4.6).

use crate::framebuffer::{FrameBuffer, PixelFrameType};
use crate::surface::{InputEvent, KeyAction, Surface};
use crate::ws::Connection;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub const MAX_DRAIN_BATCH: usize = 256;
const MAX_TEXT_INPUT_BYTES: usize = 256;

// Client -> panel tags (spec §6).
pub const TAG_KEY_INPUT: u8 = 0x01;
pub const TAG_MOUSE_BUTTON: u8 = 0x02;
pub const TAG_MOUSE_MOVE: u8 = 0x03;
pub const TAG_MOUSE_SCROLL: u8 = 0x04;
pub const TAG_TEXT_INPUT: u8 = 0x05;
pub const TAG_RESIZE: u8 = 0x10;
pub const TAG_REQUEST_KEYFRAME: u8 = 0x11;
pub const TAG_PAUSE_STREAM: u8 = 0x12;
pub const TAG_RESUME_STREAM: u8 = 0x13;
pub const TAG_CONNECT_PANEL: u8 = 0x20;
pub const TAG_CREATE_PANEL: u8 = 0x21;

pub const MOD_SHIFT: u8 = 0x01;
pub const MOD_CTRL: u8 = 0x02;
pub const MOD_ALT: u8 = 0x04;
pub const MOD_SUPER: u8 = 0x08;

pub struct Panel {
    pub id: u32,
    surface: Mutex<Box<dyn Surface>>,
    framebuffer: Mutex<FrameBuffer>,
    sequence: AtomicU32,
    last_keyframe_ms: Mutex<u64>,
    logical_size: Mutex<(u16, u16)>,
    scale: Mutex<f32>,
    streaming: AtomicBool,
    force_keyframe: AtomicBool,
    connection: Mutex<Option<Arc<Connection>>>,
    input_queue: Mutex<VecDeque<InputEvent>>,
}

impl Panel {
    pub fn new(id: u32, surface: Box<dyn Surface>, logical_size: (u16, u16), scale: f32) -> Self {
        let pixel_w = (logical_size.0 as f32 * scale) as u32;
        let pixel_h = (logical_size.1 as f32 * scale) as u32;
        Panel {
            id,
            surface: Mutex::new(surface),
            framebuffer: Mutex::new(FrameBuffer::new(pixel_w.max(1), pixel_h.max(1))),
            sequence: AtomicU32::new(0),
            last_keyframe_ms: Mutex::new(0),
            logical_size: Mutex::new(logical_size),
            scale: Mutex::new(scale),
            streaming: AtomicBool::new(false),
            force_keyframe: AtomicBool::new(true),
            connection: Mutex::new(None),
            input_queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Binding change never destroys the panel. Binding activates streaming
    /// and forces a keyframe; unbinding deactivates streaming (spec §4.6).
    pub fn set_connection(&self, conn: Option<Arc<Connection>>) {
        let mut slot = self.connection.lock().unwrap();
        let activating = conn.is_some();
        *slot = conn;
        drop(slot);
        self.streaming.store(activating, Ordering::Release);
        if activating {
            self.force_keyframe.store(true, Ordering::Release);
        }
    }

    pub fn bound_connection(&self) -> Option<Arc<Connection>> {
        self.connection.lock().unwrap().clone()
    }

    /// Parse one client->panel message by leading tag byte and enqueue the
    /// corresponding input event, or apply a synchronous flag write. Tags
    /// 0x20/0x21 are handled by the server before reaching the panel.
    pub fn handle_message(&self, bytes: &[u8]) {
        let Some((&tag, body)) = bytes.split_first() else { return };
        match tag {
            TAG_KEY_INPUT => {
                if let Some(event) = parse_key_input(body) {
                    self.enqueue(event);
                }
            }
            TAG_MOUSE_BUTTON => {
                if body.len() >= 3 {
                    self.enqueue(InputEvent::MouseButton { pressed: body[0] != 0, button: body[1], mods: body[2] });
                }
            }
            TAG_MOUSE_MOVE => {
                if body.len() >= 9 {
                    let x = i32::from_le_bytes(body[0..4].try_into().unwrap());
                    let y = i32::from_le_bytes(body[4..8].try_into().unwrap());
                    self.enqueue(InputEvent::MousePos { x, y, mods: body[8] });
                }
            }
            TAG_MOUSE_SCROLL => {
                if body.len() >= 16 {
                    let x = i32::from_le_bytes(body[0..4].try_into().unwrap());
                    let y = i32::from_le_bytes(body[4..8].try_into().unwrap());
                    let dx = f32::from_le_bytes(body[8..12].try_into().unwrap());
                    let dy = f32::from_le_bytes(body[12..16].try_into().unwrap());
                    self.enqueue(InputEvent::MouseScroll { x, y, dx, dy });
                }
            }
            TAG_TEXT_INPUT => {
                if body.len() >= 2 {
                    let len = u16::from_le_bytes(body[0..2].try_into().unwrap()) as usize;
                    let len = len.min(MAX_TEXT_INPUT_BYTES).min(body.len().saturating_sub(2));
                    self.enqueue(InputEvent::Text { bytes: body[2..2 + len].to_vec() });
                }
            }
            TAG_RESIZE => {
                if body.len() >= 4 {
                    let w = u16::from_le_bytes(body[0..2].try_into().unwrap());
                    let h = u16::from_le_bytes(body[2..4].try_into().unwrap());
                    self.enqueue(InputEvent::Resize { width: w, height: h });
                }
            }
            TAG_REQUEST_KEYFRAME => self.force_keyframe.store(true, Ordering::Release),
            TAG_PAUSE_STREAM => self.streaming.store(false, Ordering::Release),
            TAG_RESUME_STREAM => self.streaming.store(true, Ordering::Release),
            _ => {}
        }
    }

    fn enqueue(&self, event: InputEvent) {
        self.input_queue.lock().unwrap().push_back(event);
    }

    /// Render-thread only: move at most `max_batch` queued events into the
    /// surface, preserving insertion order (spec §3 "InputEvent ordering").
    pub fn drain_input(&self, max_batch: usize) {
        let mut batch = Vec::with_capacity(max_batch);
        {
            let mut queue = self.input_queue.lock().unwrap();
            while batch.len() < max_batch {
                match queue.pop_front() {
                    Some(ev) => batch.push(ev),
                    None => break,
                }
            }
        }
        let mut surface = self.surface.lock().unwrap();
        for event in &batch {
            if let InputEvent::Resize { width, height } = event {
                *self.logical_size.lock().unwrap() = (*width, *height);
                surface.set_size((*width, *height));
                self.force_keyframe.store(true, Ordering::Release);
            }
            surface.feed_input(event);
        }
    }

    /// Render-thread only.
    pub fn capture(&self) -> bool {
        let surface = self.surface.lock().unwrap();
        let Some(view) = surface.query_framebuffer() else { return false };
        let mut fb = self.framebuffer.lock().unwrap();
        if view.width != fb.width() || view.height != fb.height() {
            fb.resize(view.width, view.height);
            self.force_keyframe.store(true, Ordering::Release);
        }
        fb.capture(&view);
        true
    }

    /// Render-thread only. Returns the finished wire packet (type, bytes).
    pub fn prepare_frame(&self) -> Option<(PixelFrameType, Vec<u8>)> {
        let seq = self.sequence.fetch_add(1, Ordering::AcqRel);
        let force = self.force_keyframe.swap(false, Ordering::AcqRel);
        let mut fb = self.framebuffer.lock().unwrap();
        let mut last_keyframe_ms = self.last_keyframe_ms.lock().unwrap();
        let now_ms = now_millis();
        let (kind, packet) = fb.prepare_frame(seq, force, &mut last_keyframe_ms, now_ms)?;
        Some((kind, packet.to_vec()))
    }

    /// Send failure does not destroy the panel.
    pub fn send_frame(&self, bytes: &[u8]) {
        if let Some(conn) = self.bound_connection() {
            if conn.is_open() {
                let _ = conn.send_binary(bytes);
            }
        }
    }

    /// Render-thread only. The framebuffer is resized lazily on the next
    /// `capture()` once the hardware framebuffer size actually changes.
    pub fn resize_internal(&self, width: u16, height: u16) {
        *self.logical_size.lock().unwrap() = (width, height);
        self.surface.lock().unwrap().set_size((width, height));
        self.force_keyframe.store(true, Ordering::Release);
    }

    pub fn logical_size(&self) -> (u16, u16) {
        *self.logical_size.lock().unwrap()
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        let fb = self.framebuffer.lock().unwrap();
        (fb.width(), fb.height())
    }

    pub fn scale(&self) -> f32 {
        *self.scale.lock().unwrap()
    }

    /// One of the few surface calls the server performs off the render
    /// thread (spec §4.7 "view_action", §9 open question).
    pub fn view_action(&self, action: &str) {
        self.surface.lock().unwrap().view_action(action);
    }
}

fn parse_key_input(body: &[u8]) -> Option<InputEvent> {
    if body.len() < 7 {
        return None;
    }
    let action = match body[0] {
        0 => KeyAction::Press,
        1 => KeyAction::Release,
        2 => KeyAction::Repeat,
        _ => return None,
    };
    let keycode = u32::from_le_bytes(body[1..5].try_into().unwrap());
    let mods = body[5];
    let has_text = body[6] != 0;
    let text = if has_text && body.len() >= 8 {
        let len = body[7] as usize;
        body.get(8..8 + len).and_then(|b| std::str::from_utf8(b).ok()).map(String::from)
    } else {
        None
    };
    Some(InputEvent::Key { action, keycode, mods, text })
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::TestSurface;

    fn make_panel() -> Panel {
        let surface = TestSurface::create((80, 24), 1.0).unwrap();
        Panel::new(1, Box::new(surface), (80, 24), 1.0)
    }

    #[test]
    fn at_most_one_binding_disconnect_leaves_panel_in_registry() {
        let panel = make_panel();
        assert!(!panel.is_streaming());
        // Simulated bound connection: a real Connection needs a live socket,
        // so this test exercises the unbind path directly.
        panel.set_connection(None);
        assert!(!panel.is_streaming());
    }

    #[test]
    fn sequence_is_strictly_monotonic_across_many_frames() {
        let panel = make_panel();
        panel.capture();
        let mut last = None;
        for _ in 0..50 {
            panel.capture();
            let (_, _packet) = panel.prepare_frame().unwrap();
            let seq = panel.sequence.load(Ordering::Acquire);
            if let Some(prev) = last {
                assert!(seq > prev || seq == 0);
            }
            last = Some(seq);
        }
    }

    #[test]
    fn resize_message_preserves_order_with_other_input() {
        let panel = make_panel();
        panel.handle_message(&[TAG_REQUEST_KEYFRAME]);
        panel.handle_message(&{
            let mut m = vec![TAG_RESIZE];
            m.extend_from_slice(&100u16.to_le_bytes());
            m.extend_from_slice(&50u16.to_le_bytes());
            m
        });
        panel.handle_message(&{
            let mut m = vec![TAG_KEY_INPUT, 0];
            m.extend_from_slice(&65u32.to_le_bytes());
            m.push(0);
            m.push(0);
            m
        });
        panel.drain_input(MAX_DRAIN_BATCH);
        assert_eq!(panel.logical_size(), (100, 50));
    }

    #[test]
    fn text_input_is_capped_at_256_bytes() {
        let panel = make_panel();
        let mut m = vec![TAG_TEXT_INPUT];
        m.extend_from_slice(&300u16.to_le_bytes());
        m.extend_from_slice(&vec![b'a'; 300]);
        panel.handle_message(&m);
        assert_eq!(panel.input_queue.lock().unwrap().len(), 1);
    }
}
