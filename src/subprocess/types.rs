//! Wire shapes for the agent subprocess's line-framed JSON stdout
//! protocol (§4.3), and small value types shared by the executor.

use serde::Deserialize;

/// Which stream a raw line came from, used when tagging stderr ring
/// buffer entries and bus events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

/// The agent's stdout protocol is a sequence of newline-delimited JSON
/// objects discriminated by `type`. Matches the discriminator table in
/// §4.3; anything that doesn't match one of these shapes is `Unknown`
/// and is logged but otherwise ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawAgentLine {
    System {
        #[serde(default)]
        message: Option<String>,
    },
    Assistant {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        tool_use: Option<RawToolUse>,
    },
    User {
        #[serde(default)]
        tool_result: Option<RawToolResult>,
    },
    Result {
        #[serde(default)]
        output: Option<String>,
        #[serde(default)]
        success: Option<bool>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawToolUse {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawToolResult {
    pub name: String,
    #[serde(default)]
    pub is_error: bool,
}

/// Tracks tool-call count across a single iteration to derive a
/// monotonic, never-100%-before-completion progress estimate (§4.3):
/// `percent = min(95, tool_call_count * 5)`.
#[derive(Debug, Default)]
pub struct ProgressTicker {
    tool_call_count: u32,
}

impl ProgressTicker {
    pub fn record_tool_call(&mut self) -> u8 {
        self.tool_call_count += 1;
        self.percent()
    }

    pub fn percent(&self) -> u8 {
        (self.tool_call_count.saturating_mul(5)).min(95) as u8
    }

    pub fn tool_call_count(&self) -> u32 {
        self.tool_call_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_caps_at_95_percent() {
        let mut ticker = ProgressTicker::default();
        for _ in 0..30 {
            ticker.record_tool_call();
        }
        assert_eq!(ticker.percent(), 95);
    }

    #[test]
    fn progress_scales_linearly_below_cap() {
        let mut ticker = ProgressTicker::default();
        assert_eq!(ticker.record_tool_call(), 5);
        assert_eq!(ticker.record_tool_call(), 10);
    }
}
