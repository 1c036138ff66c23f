//! Frame Parser
//!
//! Turns raw transport messages into classified frames, and builds the two
//! outbound messages a synthesis request consists of.
//!
//! Every message on the wire starts with a block of `Key:Value` header lines
//! separated by CRLF. Text messages end the block with a blank line and carry
//! an optional body. Binary audio messages end the block with the literal
//! `Path:audio\r\n` line, followed directly by the audio payload.

use crate::{error::ProtocolError, format::OutputFormat, id::RequestId, transport::WireMessage};
use bytes::Bytes;
use serde::Serialize;

const REQUEST_ID_HEADER: &str = "X-RequestId";
const PATH_HEADER: &str = "Path";
const AUDIO_SEPARATOR: &[u8] = b"Path:audio\r\n";

/// A parsed inbound frame, routed by the session on its correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    TurnStart(RequestId),
    TurnEnd(RequestId),
    AudioChunk(RequestId, Bytes),
    /// A well-formed message the session has no use for (metadata, responses).
    Ignored,
}

/// Classifies one inbound message.
pub fn parse(message: &WireMessage) -> Result<Frame, ProtocolError> {
    match message {
        WireMessage::Text(text) => parse_text(text),
        WireMessage::Binary(data) => parse_binary(data),
    }
}

fn parse_text(text: &str) -> Result<Frame, ProtocolError> {
    let header_block = text.split("\r\n\r\n").next().unwrap_or_default();

    let path = header_value(header_block, PATH_HEADER);
    let make: fn(RequestId) -> Frame = match path {
        Some("turn.start") => Frame::TurnStart,
        Some("turn.end") => Frame::TurnEnd,
        _ => return Ok(Frame::Ignored),
    };

    let id = header_value(header_block, REQUEST_ID_HEADER).ok_or(ProtocolError::MissingRequestId)?;
    Ok(make(RequestId::from(id)))
}

fn parse_binary(data: &Bytes) -> Result<Frame, ProtocolError> {
    let separator_at = data
        .windows(AUDIO_SEPARATOR.len())
        .position(|window| window == AUDIO_SEPARATOR)
        .ok_or(ProtocolError::MissingAudioSeparator)?;

    let header_block = String::from_utf8_lossy(&data[..separator_at]);
    let id = header_value(&header_block, REQUEST_ID_HEADER)
        .map(RequestId::from)
        .ok_or(ProtocolError::MissingRequestId)?;

    let payload = data.slice(separator_at + AUDIO_SEPARATOR.len()..);
    Ok(Frame::AudioChunk(id, payload))
}

/// Finds the value of the first `name:value` line in a header block.
///
/// Binary header blocks are preceded by a two byte length prefix that may
/// decode to any character, so the key is located within the line rather than
/// required at its start.
fn header_value<'a>(header_block: &'a str, name: &str) -> Option<&'a str> {
    header_block
        .split("\r\n")
        .find_map(|line| {
            let start = line.find(name)?;
            line[start + name.len()..].strip_prefix(':')
        })
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

// --- Outbound messages ---

#[derive(Serialize)]
struct SpeechConfig {
    context: SpeechContext,
}

#[derive(Serialize)]
struct SpeechContext {
    synthesis: Synthesis,
}

#[derive(Serialize)]
struct Synthesis {
    audio: AudioConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    #[serde(rename = "metadataoptions")]
    metadata_options: MetadataOptions,
    output_format: OutputFormat,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetadataOptions {
    sentence_boundary_enabled: bool,
    word_boundary_enabled: bool,
}

/// The `speech.config` message selecting the output format for the requests
/// that follow it. Boundary metadata events are disabled.
pub fn config_message(format: OutputFormat) -> Result<WireMessage, serde_json::Error> {
    let config = SpeechConfig {
        context: SpeechContext {
            synthesis: Synthesis {
                audio: AudioConfig {
                    metadata_options: MetadataOptions {
                        sentence_boundary_enabled: false,
                        word_boundary_enabled: false,
                    },
                    output_format: format,
                },
            },
        },
    };
    let body = serde_json::to_string(&config)?;
    Ok(WireMessage::Text(format!(
        "Content-Type:application/json; charset=utf-8\r\nPath:speech.config\r\n\r\n{body}"
    )))
}

/// The `ssml` message carrying the document to synthesize, tagged with `id`.
pub fn ssml_message(id: &RequestId, ssml: &str) -> WireMessage {
    WireMessage::Text(format!(
        "X-RequestId:{id}\r\nContent-Type:application/ssml+xml\r\nPath:ssml\r\n\r\n{ssml}"
    ))
}
