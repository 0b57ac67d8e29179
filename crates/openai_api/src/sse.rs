use serde::Deserialize;

use crate::events::{FinishReason, OpenAiStreamEvent};

const FRAME_SEPARATOR: &[u8] = b"\n\n";
const DONE_SENTINEL: &str = "[DONE]";
pub const INVALID_UTF8_CODE: &str = "invalid_utf8";

/// Incremental parser for `text/event-stream` bodies.
///
/// Bytes may arrive split anywhere, including inside a multi-byte character;
/// only complete frames are decoded and produce events.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    pending: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    index: Option<usize>,
    /// Chat chunks.
    delta: Option<ChatDelta>,
    /// Legacy completion chunks.
    text: Option<String>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: Option<String>,
    code: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl SseStreamParser {
    /// Appends `bytes` and returns the events of every frame completed by them.
    ///
    /// A frame that is not valid UTF-8 yields an [`OpenAiStreamEvent::Error`].
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<OpenAiStreamEvent> {
        self.pending
            .extend(bytes.iter().copied().filter(|byte| *byte != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = find_separator(&self.pending) {
            let frame: Vec<u8> = self.pending.drain(..end + FRAME_SEPARATOR.len()).collect();
            let frame = match std::str::from_utf8(&frame) {
                Ok(frame) => frame,
                Err(error) => {
                    events.push(OpenAiStreamEvent::Error {
                        code: Some(INVALID_UTF8_CODE.to_string()),
                        message: Some(format!("stream frame is not valid UTF-8: {error}")),
                    });
                    continue;
                }
            };
            if let Some(data) = frame_data(frame) {
                events.extend(frame_events(&data));
            }
        }
        events
    }

    /// Parses a complete stream body in one call.
    pub fn parse_frames(input: &str) -> Vec<OpenAiStreamEvent> {
        Self::default().feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.pending.iter().all(u8::is_ascii_whitespace)
    }
}

fn find_separator(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(FRAME_SEPARATOR.len())
        .position(|window| window == FRAME_SEPARATOR)
}

/// Joined `data:` lines of one frame; comments and other fields are ignored.
fn frame_data(frame: &str) -> Option<String> {
    let lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn frame_events(data: &str) -> Vec<OpenAiStreamEvent> {
    if data == DONE_SENTINEL {
        return vec![OpenAiStreamEvent::Done];
    }
    // Malformed frames are dropped; the terminal event still decides success.
    let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else {
        return Vec::new();
    };

    if let Some(error) = chunk.error {
        return vec![OpenAiStreamEvent::Error {
            code: error.code.or(error.kind),
            message: error.message,
        }];
    }

    let mut events = Vec::new();
    for (position, choice) in chunk.choices.into_iter().enumerate() {
        let index = choice.index.unwrap_or(position);
        let text = choice
            .delta
            .and_then(|delta| delta.content)
            .or(choice.text)
            .filter(|text| !text.is_empty());
        if let Some(text) = text {
            events.push(OpenAiStreamEvent::Delta {
                choice: index,
                text,
            });
        }
        if let Some(reason) = choice.finish_reason {
            events.push(OpenAiStreamEvent::ChoiceFinished {
                choice: index,
                reason: FinishReason::parse(&reason),
            });
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::{SseStreamParser, INVALID_UTF8_CODE};
    use crate::events::OpenAiStreamEvent;

    #[test]
    fn frames_split_across_reads_are_reassembled() {
        let mut parser = SseStreamParser::default();

        assert!(parser
            .feed(b"data: {\"choices\":[{\"index\":0,\"delta\":{\"con")
            .is_empty());
        assert_eq!(
            parser.feed(b"tent\":\"Hello\"}}]}\n\n"),
            vec![OpenAiStreamEvent::Delta {
                choice: 0,
                text: "Hello".to_string()
            }]
        );
        assert_eq!(parser.feed(b"data: [DONE]\n\n"), vec![OpenAiStreamEvent::Done]);
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn multibyte_characters_split_across_reads_survive() {
        let frame = "data: {\"choices\":[{\"index\":0,\"text\":\"café\"}]}\n\n".as_bytes();
        let split = frame
            .iter()
            .position(|byte| *byte == 0xC3)
            .expect("é lead byte")
            + 1;
        let mut parser = SseStreamParser::default();

        assert!(parser.feed(&frame[..split]).is_empty());
        assert_eq!(
            parser.feed(&frame[split..]),
            vec![OpenAiStreamEvent::Delta {
                choice: 0,
                text: "café".to_string()
            }]
        );
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn invalid_utf8_frames_are_reported() {
        let mut parser = SseStreamParser::default();
        let mut frame = b"data: {\"choices\":[{\"index\":0,\"text\":\"".to_vec();
        frame.extend_from_slice(&[0xC3, 0x28]);
        frame.extend_from_slice(b"\"}]}\n\ndata: [DONE]\n\n");

        let events = parser.feed(&frame);

        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            OpenAiStreamEvent::Error { code: Some(code), .. } if code == INVALID_UTF8_CODE
        ));
        assert_eq!(events[1], OpenAiStreamEvent::Done);
    }

    #[test]
    fn role_only_chat_delta_emits_nothing() {
        let events = SseStreamParser::parse_frames(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        );
        assert!(events.is_empty());
    }

    #[test]
    fn crlf_frame_separators_are_accepted() {
        let events = SseStreamParser::parse_frames(
            "data: {\"choices\":[{\"index\":0,\"text\":\"a\"}]}\r\n\r\ndata: [DONE]\r\n\r\n",
        );
        assert_eq!(events.len(), 2);
    }
}
