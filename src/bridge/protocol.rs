//! Relay Protocol
//!
//! Messages exchanged between the host and a display surface over one
//! WebSocket. Raw bytes ride in binary messages (`data` towards the
//! surface, `input` towards the host); everything else is a JSON text
//! message tagged by `"type"`:
//!
//! ```text
//! surface → host   {"type":"open","argv":["--title","Dev"],"cols":120,"rows":40}
//!                  {"type":"input","data":"ls\r"}
//!                  {"type":"resize","cols":120,"rows":40}
//!                  {"type":"set-title","title":"vim"}
//!                  {"type":"get-theme"} {"type":"restart"} {"type":"kill"} {"type":"teardown"}
//! host → surface   {"type":"theme","bg":"#1e1e1e","fg":"#cccccc","base_title":"Youyou",...}
//!                  {"type":"title","title":"Youyou vim"}
//!                  {"type":"exit","code":0}
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

use crate::config::options::Theme;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected {0} frame")]
    UnexpectedFrame(&'static str),
}

/// Surface → host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RelayCommand {
    /// Start the surface's session with per-window options
    Open {
        #[serde(default)]
        argv: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cols: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rows: Option<u16>,
    },
    Input {
        #[serde(with = "text_bytes")]
        data: Bytes,
    },
    Resize {
        cols: u16,
        rows: u16,
    },
    /// Kill the session, keep the surface
    Kill,
    /// The surface is going away
    Teardown,
    /// Kill and re-open with the same options
    Restart,
    SetTitle {
        title: String,
    },
    GetTheme,
}

impl RelayCommand {
    /// Decode a WebSocket message. Control frames yield `Ok(None)`.
    pub fn decode(msg: Message) -> Result<Option<Self>, ProtocolError> {
        match msg {
            Message::Binary(data) => Ok(Some(Self::Input {
                data: Bytes::from(data),
            })),
            Message::Text(text) => Ok(Some(serde_json::from_str(&text)?)),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(None),
            Message::Close(_) => Err(ProtocolError::UnexpectedFrame("close")),
        }
    }

    /// Encode as a WebSocket message; input travels as binary
    pub fn encode(&self) -> Result<Message, ProtocolError> {
        match self {
            Self::Input { data } => Ok(Message::Binary(data.to_vec())),
            other => Ok(Message::Text(serde_json::to_string(other)?)),
        }
    }
}

/// Host → surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RelayEvent {
    /// PTY output, binary only
    #[serde(skip)]
    Data(Bytes),
    /// Session exited; sent once per session
    Exit { code: i32 },
    Theme(Theme),
    Title { title: String },
}

impl RelayEvent {
    pub fn encode(&self) -> Result<Message, ProtocolError> {
        match self {
            Self::Data(data) => Ok(Message::Binary(data.to_vec())),
            other => Ok(Message::Text(serde_json::to_string(other)?)),
        }
    }

    /// Decode a WebSocket message. Control frames yield `Ok(None)`.
    pub fn decode(msg: Message) -> Result<Option<Self>, ProtocolError> {
        match msg {
            Message::Binary(data) => Ok(Some(Self::Data(Bytes::from(data)))),
            Message::Text(text) => Ok(Some(serde_json::from_str(&text)?)),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(None),
            Message::Close(_) => Err(ProtocolError::UnexpectedFrame("close")),
        }
    }
}

/// Text-form input: a JSON string on the wire, raw bytes in memory
mod text_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        String::deserialize(deserializer).map(Bytes::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_text(json: &str) -> RelayCommand {
        RelayCommand::decode(Message::Text(json.to_string()))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_command_shapes() {
        assert_eq!(
            decode_text(r#"{"type":"resize","cols":120,"rows":40}"#),
            RelayCommand::Resize { cols: 120, rows: 40 }
        );
        assert_eq!(
            decode_text(r#"{"type":"open"}"#),
            RelayCommand::Open {
                argv: vec![],
                cols: None,
                rows: None
            }
        );
        assert_eq!(
            decode_text(r#"{"type":"open","argv":["--title","Dev"],"cols":100}"#),
            RelayCommand::Open {
                argv: vec!["--title".into(), "Dev".into()],
                cols: Some(100),
                rows: None
            }
        );
        assert_eq!(
            decode_text(r#"{"type":"set-title","title":"vim"}"#),
            RelayCommand::SetTitle {
                title: "vim".into()
            }
        );
        assert_eq!(decode_text(r#"{"type":"get-theme"}"#), RelayCommand::GetTheme);
        assert_eq!(decode_text(r#"{"type":"teardown"}"#), RelayCommand::Teardown);
        assert_eq!(decode_text(r#"{"type":"kill"}"#), RelayCommand::Kill);
    }

    #[test]
    fn test_input_text_and_binary() {
        assert_eq!(
            decode_text(r#"{"type":"input","data":"ls\r"}"#),
            RelayCommand::Input {
                data: Bytes::from_static(b"ls\r")
            }
        );
        let binary = RelayCommand::decode(Message::Binary(vec![0x1b, b'[', b'A']))
            .unwrap()
            .unwrap();
        assert_eq!(
            binary,
            RelayCommand::Input {
                data: Bytes::from_static(b"\x1b[A")
            }
        );
        assert!(matches!(binary.encode().unwrap(), Message::Binary(_)));
    }

    #[test]
    fn test_malformed_and_control_frames() {
        assert!(matches!(
            RelayCommand::decode(Message::Text("{nope".into())),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            RelayCommand::decode(Message::Text(r#"{"type":"fly"}"#.into())),
            Err(ProtocolError::Json(_))
        ));
        assert!(RelayCommand::decode(Message::Ping(vec![])).unwrap().is_none());
    }

    #[test]
    fn test_event_shapes() {
        let exit = RelayEvent::Exit { code: 0 }.encode().unwrap();
        assert_eq!(exit, Message::Text(r#"{"type":"exit","code":0}"#.to_string()));

        let title = RelayEvent::Title {
            title: "Youyou vim".into(),
        }
        .encode()
        .unwrap();
        assert_eq!(
            title,
            Message::Text(r#"{"type":"title","title":"Youyou vim"}"#.to_string())
        );

        let data = RelayEvent::Data(Bytes::from_static(b"hi\r\n")).encode().unwrap();
        assert_eq!(data, Message::Binary(b"hi\r\n".to_vec()));
    }

    #[test]
    fn test_theme_event_is_flat() {
        let theme = Theme {
            bg: "#1e1e1e".into(),
            fg: "#cccccc".into(),
            base_title: "Youyou".into(),
            user_title: String::new(),
            title: "Youyou".into(),
        };
        let Message::Text(json) = RelayEvent::Theme(theme.clone()).encode().unwrap() else {
            panic!("theme must be a text message");
        };
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "theme");
        assert_eq!(value["bg"], "#1e1e1e");
        assert_eq!(value["base_title"], "Youyou");

        let decoded = RelayEvent::decode(Message::Text(json)).unwrap().unwrap();
        assert_eq!(decoded, RelayEvent::Theme(theme));
    }
}
