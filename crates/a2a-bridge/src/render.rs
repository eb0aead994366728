//! Turns task responses into chat-sized messages.

use a2a_bridge_client::TaskResponse;
use a2a_bridge_core::{FileContent, Part, Task, TaskState};
use serde_json::{Map, Value};

/// Characters of a data part shown before truncation. Keys keep the order the
/// agent sent them in.
const DATA_PREVIEW_CHARS: usize = 100;

pub const NO_RESULT: &str = "Sorry, the service returned no result.";
pub const COMPLETED_WITHOUT_CONTENT: &str = "Task completed, but no content was produced.";
pub const NEED_MORE_INFO: &str = "More information is needed. Please provide more details.";

/// One outbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderUnit {
    Text(String),
    DataSummary(String),
    FileNotice(String),
}

impl RenderUnit {
    /// The text to send.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(s) | Self::DataSummary(s) | Self::FileNotice(s) => s,
        }
    }
}

/// Maps a [`TaskResponse`] to the ordered messages shown to the user.
#[derive(Debug, Clone)]
pub struct ResponseInterpreter {
    max_chars: usize,
}

impl Default for ResponseInterpreter {
    fn default() -> Self {
        Self::new(2000)
    }
}

impl ResponseInterpreter {
    /// `max_chars` is the longest text sent as a single message.
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    pub fn render(&self, response: &TaskResponse) -> Vec<RenderUnit> {
        if let Some(error) = &response.error {
            return vec![RenderUnit::Text(format!(
                "Error [{}]: {}",
                error.code, error.message
            ))];
        }

        let Some(task) = &response.result else {
            return vec![RenderUnit::Text(NO_RESULT.to_string())];
        };

        self.render_task(task)
            .into_iter()
            .flat_map(|unit| match unit {
                RenderUnit::Text(text) => self
                    .split_text(&text)
                    .into_iter()
                    .map(RenderUnit::Text)
                    .collect(),
                other => vec![other],
            })
            .collect()
    }

    fn render_task(&self, task: &Task) -> Vec<RenderUnit> {
        let status = &task.status;
        match status.state {
            TaskState::Completed => {
                let artifacts = task.artifacts();
                if artifacts.is_empty() {
                    return vec![RenderUnit::Text(COMPLETED_WITHOUT_CONTENT.to_string())];
                }
                artifacts
                    .iter()
                    .flat_map(|artifact| artifact.parts.iter())
                    .map(render_part)
                    .collect()
            }
            TaskState::InputRequired => {
                let prompts: Vec<RenderUnit> = status
                    .message_texts()
                    .into_iter()
                    .map(|text| RenderUnit::Text(text.to_string()))
                    .collect();
                let has_parts = status
                    .message
                    .as_ref()
                    .is_some_and(|message| !message.parts.is_empty());

                if has_parts {
                    prompts
                } else {
                    vec![RenderUnit::Text(NEED_MORE_INFO.to_string())]
                }
            }
            state => {
                let mut text = format!("Task status: {}", state);
                for line in status.message_texts() {
                    text.push('\n');
                    text.push_str(line);
                }
                vec![RenderUnit::Text(text)]
            }
        }
    }

    /// Split `text` into segments of at most `max_chars` characters, each
    /// labelled `[i/N]` on its own line. Short text is returned unchanged.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= self.max_chars {
            return vec![text.to_string()];
        }

        let segments: Vec<String> = chars
            .chunks(self.max_chars)
            .map(|chunk| chunk.iter().collect())
            .collect();
        let total = segments.len();
        segments
            .into_iter()
            .enumerate()
            .map(|(i, segment)| format!("[{}/{}]\n{}", i + 1, total, segment))
            .collect()
    }
}

fn render_part(part: &Part) -> RenderUnit {
    match part {
        Part::Text { text, .. } => RenderUnit::Text(text.clone()),
        Part::Data { data, .. } => RenderUnit::DataSummary(summarize_data(data)),
        Part::File { file, .. } => RenderUnit::FileNotice(describe_file(file)),
    }
}

fn summarize_data(data: &Map<String, Value>) -> String {
    let serialized = Value::Object(data.clone()).to_string();
    let preview: String = serialized.chars().take(DATA_PREVIEW_CHARS).collect();
    format!("Received structured data: {}...", preview)
}

fn describe_file(file: &FileContent) -> String {
    let mut notice = String::from("Received file:");
    if let Some(name) = file.name() {
        notice.push(' ');
        notice.push_str(name);
    }
    if let Some(uri) = file.uri() {
        notice.push_str(&format!(" (link: {})", uri));
    }
    notice
}
