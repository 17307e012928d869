//! Push-channel wire format.
//!
//! Every frame is a JSON text message `{"event": <name>, "data": <payload>}`.

use serde::ser::{SerializeSeq, SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

use crate::download::formats::FormatDescriptor;
use crate::download::job::JobEvent;
use crate::download::progress::ProgressEvent;
use crate::download::types::DownloadRequest;

/// Client → server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    GetFormats(String),
    StartDownload(DownloadRequest),
}

impl ClientMessage {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Payload of a `formats` event: `{"audioOnly": [...]}` on success, a bare
/// empty list on every failure path.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatsPayload {
    AudioOnly(Vec<FormatDescriptor>),
    Unavailable,
}

impl Serialize for FormatsPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FormatsPayload::AudioOnly(formats) => {
                let mut state = serializer.serialize_struct("FormatsPayload", 1)?;
                state.serialize_field("audioOnly", formats)?;
                state.end()
            }
            FormatsPayload::Unavailable => serializer.serialize_seq(Some(0))?.end(),
        }
    }
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    Status(String),
    Formats(FormatsPayload),
    Progress(ProgressEvent),
    Complete { filename: String },
}

impl ServerEvent {
    pub fn status(message: impl Into<String>) -> Self {
        ServerEvent::Status(message.into())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<JobEvent> for ServerEvent {
    fn from(event: JobEvent) -> Self {
        match event {
            JobEvent::Status(message) | JobEvent::Failed(message) => ServerEvent::Status(message),
            JobEvent::Progress(progress) => ServerEvent::Progress(progress),
            JobEvent::Complete(artifact) => ServerEvent::Complete {
                filename: artifact.display_name,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::artifact::Artifact;
    use crate::download::types::MediaKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;

    fn to_value(event: &ServerEvent) -> serde_json::Value {
        serde_json::from_str(&event.to_json().unwrap()).unwrap()
    }

    #[test]
    fn test_client_messages() {
        assert_eq!(
            ClientMessage::from_json(r#"{"event":"get-formats","data":"https://youtu.be/x"}"#).unwrap(),
            ClientMessage::GetFormats("https://youtu.be/x".to_string())
        );
        assert_eq!(
            ClientMessage::from_json(
                r#"{"event":"start-download","data":{"url":"https://youtu.be/x","format_id":"140","type":"audio"}}"#
            )
            .unwrap(),
            ClientMessage::StartDownload(DownloadRequest::new("https://youtu.be/x", Some("140"), "audio"))
        );
    }

    #[test]
    fn test_unknown_client_event_is_rejected() {
        assert!(ClientMessage::from_json(r#"{"event":"cancel","data":null}"#).is_err());
        assert!(ClientMessage::from_json("get-formats").is_err());
        assert!(ClientMessage::from_json(r#"{"event":"start-download","data":{"url":"u"}}"#).is_err());
    }

    #[test]
    fn test_formats_payload_shapes() {
        let descriptor = FormatDescriptor {
            format_id: "140".to_string(),
            ext: "m4a".to_string(),
            has_video: false,
            has_audio: true,
            quality: "medium".to_string(),
            filesize: None,
            abr: Some(129.5),
        };
        assert_eq!(
            to_value(&ServerEvent::Formats(FormatsPayload::AudioOnly(vec![descriptor]))),
            json!({
                "event": "formats",
                "data": {"audioOnly": [{
                    "format_id": "140",
                    "ext": "m4a",
                    "has_video": false,
                    "has_audio": true,
                    "quality": "medium",
                    "abr": 129.5
                }]}
            })
        );
        assert_eq!(
            to_value(&ServerEvent::Formats(FormatsPayload::Unavailable)),
            json!({"event": "formats", "data": []})
        );
    }

    #[test]
    fn test_job_events_map_to_wire_events() {
        let artifact = Artifact::new(
            PathBuf::from("/d/song (1).mp3"),
            MediaKind::Audio,
            Duration::from_secs(60),
        );
        assert_eq!(
            to_value(&JobEvent::Complete(artifact).into()),
            json!({"event": "complete", "data": {"filename": "song (1).mp3"}})
        );
        assert_eq!(
            to_value(&JobEvent::Failed("❌ Download cancelled.".into()).into()),
            json!({"event": "status", "data": "❌ Download cancelled."})
        );

        let progress = ProgressEvent {
            percent: 42.5,
            size: "10.00MiB".to_string(),
            speed: "1.20MiB/s".to_string(),
            downloaded: "4.25MiB".to_string(),
            eta: None,
        };
        assert_eq!(
            to_value(&JobEvent::Progress(progress).into()),
            json!({
                "event": "progress",
                "data": {"percent": 42.5, "size": "10.00MiB", "speed": "1.20MiB/s", "downloaded": "4.25MiB"}
            })
        );
    }
}
