//! Agent reasoning trace steps.
//!
//! Trace lines are surfaced for display only: the session controller
//! forwards them verbatim and never acts on their content. Classification
//! uses the agent's fixed marker vocabulary.

/// Presentation category of a trace step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    /// The agent invoked a tool.
    CallingTool,
    /// A tool returned a result.
    ToolResult,
    /// The agent committed to its final answer.
    FinalAnswer,
    /// The agent reported an error.
    Error,
    /// Anything outside the marker vocabulary.
    Note,
}

impl TraceKind {
    /// Short label for console sinks.
    pub fn label(self) -> &'static str {
        match self {
            Self::CallingTool => "tool",
            Self::ToolResult => "result",
            Self::FinalAnswer => "answer",
            Self::Error => "error",
            Self::Note => "note",
        }
    }
}

/// One line of agent-internal reasoning surfaced for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceStep {
    pub text: String,
}

impl TraceStep {
    /// Classify by the marker vocabulary. Order matters: the first
    /// matching marker wins.
    pub fn kind(&self) -> TraceKind {
        if self.text.contains("Calling Tool") {
            TraceKind::CallingTool
        } else if self.text.contains("Tool Result") {
            TraceKind::ToolResult
        } else if self.text.contains("Final Answer") {
            TraceKind::FinalAnswer
        } else if self.text.contains("Error") {
            TraceKind::Error
        } else {
            TraceKind::Note
        }
    }
}

/// Wrap raw trace lines for display.
pub fn classify_trace(lines: Vec<String>) -> Vec<TraceStep> {
    lines.into_iter().map(|text| TraceStep { text }).collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn kind_of(text: &str) -> TraceKind {
        TraceStep {
            text: text.to_owned(),
        }
        .kind()
    }

    #[test]
    fn marker_vocabulary_is_recognized() {
        assert_eq!(kind_of("Calling Tool: search"), TraceKind::CallingTool);
        assert_eq!(kind_of("Tool Result: ok"), TraceKind::ToolResult);
        assert_eq!(kind_of("Final Answer: done"), TraceKind::FinalAnswer);
        assert_eq!(kind_of("Error: boom"), TraceKind::Error);
        assert_eq!(kind_of("thinking about it"), TraceKind::Note);
    }

    #[test]
    fn first_marker_wins() {
        assert_eq!(
            kind_of("Calling Tool: search (Tool Result pending)"),
            TraceKind::CallingTool
        );
    }

    #[test]
    fn classification_preserves_order_and_text() {
        let steps = classify_trace(vec!["a".into(), "Final Answer: b".into()]);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].text, "a");
        assert_eq!(steps[1].kind(), TraceKind::FinalAnswer);
    }
}
