//! Control-channel JSON: a minimal key-seeking reader/emitter, not a general
//! parser (spec §4.7, §9 "JSON parsing"). The control dialect is narrow
//! enough that a real parser would add nothing.

/// Server->client control messages, serialized as UTF-8 JSON text frames.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    PanelList { panels: Vec<PanelSummary> },
    PanelCreated { panel_id: u32, width: u16, height: u16 },
    PanelClosed { panel_id: u32 },
    PanelTitle { panel_id: u32, title: String },
    PanelBell { panel_id: u32 },
}

#[derive(Debug, Clone)]
pub struct PanelSummary {
    pub panel_id: u32,
    pub width: u16,
    pub height: u16,
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        match self {
            ServerMessage::PanelList { panels } => {
                let items: Vec<String> = panels
                    .iter()
                    .map(|p| {
                        format!(
                            r#"{{"panel_id":{},"width":{},"height":{}}}"#,
                            p.panel_id, p.width, p.height
                        )
                    })
                    .collect();
                format!(r#"{{"type":"panel_list","panels":[{}]}}"#, items.join(","))
            }
            ServerMessage::PanelCreated { panel_id, width, height } => {
                format!(r#"{{"type":"panel_created","panel_id":{panel_id},"width":{width},"height":{height}}}"#)
            }
            ServerMessage::PanelClosed { panel_id } => {
                format!(r#"{{"type":"panel_closed","panel_id":{panel_id}}}"#)
            }
            ServerMessage::PanelTitle { panel_id, title } => {
                format!(r#"{{"type":"panel_title","panel_id":{panel_id},"title":"{}"}}"#, escape_json(title))
            }
            ServerMessage::PanelBell { panel_id } => {
                format!(r#"{{"type":"panel_bell","panel_id":{panel_id}}}"#)
            }
        }
    }
}

/// Client->server control messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    CreatePanel,
    ClosePanel { panel_id: u32 },
    ResizePanel { panel_id: u32, width: u16, height: u16 },
    FocusPanel { panel_id: u32 },
    ViewAction { panel_id: u32, action: String },
}

/// Seek `"type":"..."` then the fields that message type requires. Returns
/// `None` on any missing field rather than attempting partial recovery.
pub fn parse_client_message(json: &str) -> Option<ClientMessage> {
    let kind = find_string_value(json, "type")?;
    match kind.as_str() {
        "create_panel" => Some(ClientMessage::CreatePanel),
        "close_panel" => Some(ClientMessage::ClosePanel { panel_id: find_u32(json, "panel_id")? }),
        "resize_panel" => Some(ClientMessage::ResizePanel {
            panel_id: find_u32(json, "panel_id")?,
            width: find_u32(json, "width")? as u16,
            height: find_u32(json, "height")? as u16,
        }),
        "focus_panel" => Some(ClientMessage::FocusPanel { panel_id: find_u32(json, "panel_id")? }),
        "view_action" => Some(ClientMessage::ViewAction {
            panel_id: find_u32(json, "panel_id")?,
            action: find_string_value(json, "action")?,
        }),
        _ => None,
    }
}

/// Find `"key":` then read the following JSON string literal.
fn find_string_value(json: &str, key: &str) -> Option<String> {
    let needle = format!("\"{key}\"");
    let key_pos = json.find(&needle)?;
    let rest = &json[key_pos + needle.len()..];
    let colon = rest.find(':')?;
    let after_colon = rest[colon + 1..].trim_start();
    let quoted = after_colon.strip_prefix('"')?;
    let end = quoted.find('"')?;
    Some(unescape_json(&quoted[..end]))
}

/// Find `"key":` then read the following bare JSON number.
fn find_u32(json: &str, key: &str) -> Option<u32> {
    let needle = format!("\"{key}\"");
    let key_pos = json.find(&needle)?;
    let rest = &json[key_pos + needle.len()..];
    let colon = rest.find(':')?;
    let after_colon = rest[colon + 1..].trim_start();
    let end = after_colon.find(|c: char| !c.is_ascii_digit()).unwrap_or(after_colon.len());
    after_colon[..end].parse().ok()
}

fn escape_json(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape_json(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_close_panel() {
        let msg = parse_client_message(r#"{"type":"close_panel","panel_id":7}"#).unwrap();
        assert_eq!(msg, ClientMessage::ClosePanel { panel_id: 7 });
    }

    #[test]
    fn parses_resize_panel_regardless_of_field_order() {
        let msg = parse_client_message(r#"{"width":1024,"type":"resize_panel","panel_id":3,"height":768}"#).unwrap();
        assert_eq!(msg, ClientMessage::ResizePanel { panel_id: 3, width: 1024, height: 768 });
    }

    #[test]
    fn parses_view_action() {
        let msg = parse_client_message(r#"{"type":"view_action","panel_id":1,"action":"scroll_up"}"#).unwrap();
        assert_eq!(msg, ClientMessage::ViewAction { panel_id: 1, action: "scroll_up".into() });
    }

    #[test]
    fn unknown_type_is_none() {
        assert!(parse_client_message(r#"{"type":"bogus"}"#).is_none());
    }

    #[test]
    fn panel_closed_emits_expected_shape() {
        let json = ServerMessage::PanelClosed { panel_id: 7 }.to_json();
        assert_eq!(json, r#"{"type":"panel_closed","panel_id":7}"#);
    }
}
