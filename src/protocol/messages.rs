// ABOUTME: Wire message envelope and typed event definitions
// ABOUTME: Supports fire_detected, camera_status, frame, start_stream, stop_stream, etc.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Discriminants the backend is known to emit or accept
pub const KNOWN_KINDS: &[&str] = &[
    "fire_detected",
    "camera_status",
    "frame",
    "start_stream",
    "stop_stream",
    "check_camera",
    "stream_stopped",
];

/// Raw message envelope as it travels on the wire
///
/// Every frame is a JSON object with a string `type` discriminant and a
/// `data` payload. The envelope is what handlers receive: it is parsed once
/// per inbound frame and lent read-only to each handler in turn, so an
/// unknown discriminant reaches handlers untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message discriminant
    #[serde(rename = "type")]
    pub kind: String,
    /// Kind-specific payload
    pub data: Value,
}

impl Envelope {
    /// Create an envelope from a discriminant and payload
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Parse a raw inbound frame
    ///
    /// Fails when the text is not JSON, the discriminant is missing or not a
    /// string, or the payload is missing or null.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let envelope: Envelope =
            serde_json::from_str(raw).map_err(|e| Error::InvalidMessage(e.to_string()))?;

        if envelope.data.is_null() {
            return Err(Error::InvalidMessage("null data payload".to_string()));
        }

        Ok(envelope)
    }

    /// Whether the discriminant is one of [`KNOWN_KINDS`]
    pub fn is_known(&self) -> bool {
        KNOWN_KINDS.contains(&self.kind.as_str())
    }

    /// Decode into a typed [`Event`]
    ///
    /// Returns `Ok(None)` for unknown discriminants and an error when a known
    /// discriminant carries a payload of the wrong shape.
    pub fn event(&self) -> Result<Option<Event>, Error> {
        if !self.is_known() {
            return Ok(None);
        }

        let tagged = serde_json::json!({ "type": self.kind, "data": self.data });
        serde_json::from_value(tagged)
            .map(Some)
            .map_err(|e| Error::Protocol(format!("{} payload: {}", self.kind, e)))
    }

    /// Camera the message refers to, if the payload names one
    pub fn camera_id(&self) -> Option<i64> {
        self.data.get("cameraId").and_then(Value::as_i64)
    }
}

impl TryFrom<&Event> for Envelope {
    type Error = Error;

    fn try_from(event: &Event) -> Result<Self, Self::Error> {
        let value = serde_json::to_value(event).map_err(|e| Error::Protocol(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| Error::Protocol(e.to_string()))
    }
}

/// Typed view of the known message kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// Fire or smoke detected on a camera frame
    FireDetected(Detection),

    /// Camera online/offline status report
    CameraStatus(CameraStatus),

    /// Annotated video frame
    Frame(Frame),

    /// Request the backend to start analysing a stream
    StartStream(StreamRequest),

    /// Request the backend to stop analysing a stream
    StopStream(CameraRef),

    /// Ask the backend to probe a camera
    CheckCamera(CameraRef),

    /// Backend confirmation that a stream has stopped
    StreamStopped(CameraRef),
}

impl Event {
    /// Wire discriminant for this event
    pub fn kind(&self) -> &'static str {
        match self {
            Event::FireDetected(_) => "fire_detected",
            Event::CameraStatus(_) => "camera_status",
            Event::Frame(_) => "frame",
            Event::StartStream(_) => "start_stream",
            Event::StopStream(_) => "stop_stream",
            Event::CheckCamera(_) => "check_camera",
            Event::StreamStopped(_) => "stream_stopped",
        }
    }

    /// Camera the event refers to
    pub fn camera_id(&self) -> i64 {
        match self {
            Event::FireDetected(d) => d.camera_id,
            Event::CameraStatus(s) => s.camera_id,
            Event::Frame(f) => f.camera_id,
            Event::StartStream(r) => r.camera_id,
            Event::StopStream(c) | Event::CheckCamera(c) | Event::StreamStopped(c) => c.camera_id,
        }
    }
}

/// Minimal camera reference used by control messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraRef {
    #[serde(rename = "cameraId")]
    pub camera_id: i64,
    #[serde(rename = "wsId", default, skip_serializing_if = "Option::is_none")]
    pub ws_id: Option<String>,
    /// Fields not modelled here, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CameraRef {
    /// Reference a camera with no session id
    pub fn new(camera_id: i64) -> Self {
        Self {
            camera_id,
            ws_id: None,
            extra: Map::new(),
        }
    }
}

/// Start-stream request payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRequest {
    #[serde(rename = "cameraId")]
    pub camera_id: i64,
    #[serde(rename = "rtspUrl", default, skip_serializing_if = "Option::is_none")]
    pub rtsp_url: Option<String>,
    #[serde(rename = "wsId", default, skip_serializing_if = "Option::is_none")]
    pub ws_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Camera status payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraStatus {
    #[serde(rename = "cameraId")]
    pub camera_id: i64,
    pub status: i64,
    #[serde(rename = "wsId", default, skip_serializing_if = "Option::is_none")]
    pub ws_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Video frame payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "cameraId")]
    pub camera_id: i64,
    /// Base64-encoded JPEG
    pub frame: String,
    #[serde(rename = "wsId", default, skip_serializing_if = "Option::is_none")]
    pub ws_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Detection result for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "cameraId")]
    pub camera_id: i64,
    #[serde(default)]
    pub has_fire: bool,
    #[serde(default)]
    pub has_smoke: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fire_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoke_confidence: Option<f64>,
    /// `[x1, y1, x2, y2]` in frame pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fire_bbox: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoke_bbox: Option<Vec<f64>>,
    /// Alert severity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Annotated frame, base64-encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
    #[serde(rename = "wsId", default, skip_serializing_if = "Option::is_none")]
    pub ws_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
