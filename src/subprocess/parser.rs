//! Stream Parser (§4.3, component C4). Pure translation from one raw
//! stdout line to zero or one [`ParsedEvent`] — no I/O, no state beyond
//! what's passed in, mirroring the dispatch-by-discriminator style of
//! `subprocess/streaming/claude_processor.rs`'s `parse_*` helpers.

use super::types::RawAgentLine;

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    System,
    ToolCall { name: String },
    ToolResult { name: String, is_error: bool },
    Output { content: String },
    Final { success: bool, output: Option<String> },
    /// A line that parsed as JSON but didn't match any known
    /// discriminator, or failed to parse as JSON at all.
    Unknown,
}

/// Parse one line of agent stdout. Never fails: lines that are not
/// valid JSON, or whose `type` tag is unrecognized, become
/// [`ParsedEvent::Unknown`] rather than propagating an error, since a
/// single malformed line from the child process must not abort the run.
pub fn parse_line(line: &str) -> ParsedEvent {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ParsedEvent::Unknown;
    }
    let Ok(parsed) = serde_json::from_str::<RawAgentLine>(trimmed) else {
        return ParsedEvent::Unknown;
    };
    match parsed {
        RawAgentLine::System { .. } => ParsedEvent::System,
        RawAgentLine::Assistant { text, tool_use } => {
            if let Some(tool_use) = tool_use {
                ParsedEvent::ToolCall { name: tool_use.name }
            } else if let Some(text) = text {
                ParsedEvent::Output { content: text }
            } else {
                ParsedEvent::Unknown
            }
        }
        RawAgentLine::User { tool_result } => match tool_result {
            Some(tr) => ParsedEvent::ToolResult {
                name: tr.name,
                is_error: tr.is_error,
            },
            None => ParsedEvent::Unknown,
        },
        RawAgentLine::Result { output, success } => ParsedEvent::Final {
            success: success.unwrap_or(false),
            output,
        },
        RawAgentLine::Unknown => ParsedEvent::Unknown,
    }
}
