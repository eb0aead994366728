//! Messages and their content parts.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Free-form metadata attached to protocol objects.
pub type Metadata = Map<String, Value>;

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The chat user.
    User,
    /// The remote agent.
    Agent,
}

/// One piece of message or artifact content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Part {
    /// Plain text.
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Metadata>,
    },

    /// A file, inline or by reference.
    File {
        file: FileContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Metadata>,
    },

    /// Structured payload.
    Data {
        data: Map<String, Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Metadata>,
    },
}

impl Part {
    /// Create a text part without metadata.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            metadata: None,
        }
    }

    /// Create a file part without metadata.
    pub fn file(file: FileContent) -> Self {
        Self::File {
            file,
            metadata: None,
        }
    }

    /// Create a data part without metadata.
    pub fn data(data: Map<String, Value>) -> Self {
        Self::Data {
            data,
            metadata: None,
        }
    }

    /// The text of a text part, `None` for other kinds.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text),
            Self::File { .. } | Self::Data { .. } => None,
        }
    }
}

/// File content carried by a file part.
///
/// Exactly one of `bytes` (base64) or `uri` is set; the constructors and the
/// deserializer both reject anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFileContent", into = "RawFileContent")]
pub struct FileContent {
    name: Option<String>,
    mime_type: Option<String>,
    source: FileSource,
}

#[derive(Debug, Clone, PartialEq)]
enum FileSource {
    Bytes(String),
    Uri(String),
}

/// Wire shape of [`FileContent`], before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFileContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bytes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uri: Option<String>,
}

impl FileContent {
    /// Build file content, enforcing that exactly one of `bytes`/`uri` is set.
    /// Empty strings count as absent.
    pub fn new(
        name: Option<String>,
        mime_type: Option<String>,
        bytes: Option<String>,
        uri: Option<String>,
    ) -> Result<Self, CoreError> {
        let bytes = bytes.filter(|b| !b.is_empty());
        let uri = uri.filter(|u| !u.is_empty());
        let source = match (bytes, uri) {
            (Some(b), None) => FileSource::Bytes(b),
            (None, Some(u)) => FileSource::Uri(u),
            (None, None) => {
                return Err(CoreError::Validation(
                    "either 'bytes' or 'uri' must be present in file content".to_string(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(CoreError::Validation(
                    "only one of 'bytes' or 'uri' may be present in file content".to_string(),
                ))
            }
        };
        Ok(Self {
            name,
            mime_type,
            source,
        })
    }

    /// Inline file from already base64-encoded bytes.
    pub fn from_base64(name: Option<String>, mime_type: Option<String>, bytes: String) -> Result<Self, CoreError> {
        Self::new(name, mime_type, Some(bytes), None)
    }

    /// Inline file from raw bytes.
    pub fn from_raw(name: Option<String>, mime_type: Option<String>, raw: &[u8]) -> Result<Self, CoreError> {
        Self::new(name, mime_type, Some(STANDARD.encode(raw)), None)
    }

    /// File referenced by URI.
    pub fn from_uri(name: Option<String>, mime_type: Option<String>, uri: String) -> Result<Self, CoreError> {
        Self::new(name, mime_type, None, Some(uri))
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Base64 payload, if the file is inline.
    pub fn bytes(&self) -> Option<&str> {
        match &self.source {
            FileSource::Bytes(b) => Some(b),
            FileSource::Uri(_) => None,
        }
    }

    /// Reference URI, if the file is not inline.
    pub fn uri(&self) -> Option<&str> {
        match &self.source {
            FileSource::Uri(u) => Some(u),
            FileSource::Bytes(_) => None,
        }
    }

    /// Decode the inline payload.
    pub fn decode_bytes(&self) -> Result<Option<Vec<u8>>, CoreError> {
        match &self.source {
            FileSource::Bytes(b) => STANDARD
                .decode(b)
                .map(Some)
                .map_err(|e| CoreError::InvalidBytes(e.to_string())),
            FileSource::Uri(_) => Ok(None),
        }
    }
}

impl TryFrom<RawFileContent> for FileContent {
    type Error = CoreError;

    fn try_from(raw: RawFileContent) -> Result<Self, Self::Error> {
        Self::new(raw.name, raw.mime_type, raw.bytes, raw.uri)
    }
}

impl From<FileContent> for RawFileContent {
    fn from(file: FileContent) -> Self {
        let (bytes, uri) = match file.source {
            FileSource::Bytes(b) => (Some(b), None),
            FileSource::Uri(u) => (None, Some(u)),
        };
        Self {
            name: file.name,
            mime_type: file.mime_type,
            bytes,
            uri,
        }
    }
}

/// A message exchanged with the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Message {
    /// Create a message with the given parts.
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            role,
            parts,
            metadata: None,
        }
    }

    /// A user message holding a single text part.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    /// An agent message holding a single text part.
    pub fn agent_text(text: impl Into<String>) -> Self {
        Self::new(Role::Agent, vec![Part::text(text)])
    }

    /// Iterate over the text parts, skipping files and data.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(Part::as_text)
    }
}
