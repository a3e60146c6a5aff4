use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptKind {
    /// Provisional; may be revised by a later event
    Interim,
    /// Committed; will not be revised
    Final,
}

/// One transcript result from the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub kind: TranscriptKind,
    pub text: String,
}

impl TranscriptEvent {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            kind: TranscriptKind::Interim,
            text: text.into(),
        }
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            kind: TranscriptKind::Final,
            text: text.into(),
        }
    }
}

/// What the renderer displays: stable text plus the current partial
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSnapshot {
    pub committed: String,
    pub interim: String,
}

/// Merges interim/final events into a running transcript
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    committed: String,
    interim: String,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &TranscriptEvent) -> TranscriptSnapshot {
        match event.kind {
            TranscriptKind::Final => {
                if !event.text.trim().is_empty() {
                    let joined = format!("{} {}", self.committed, event.text);
                    self.committed = joined.trim().to_string();
                }
                self.interim.clear();
            }
            TranscriptKind::Interim => {
                // Empty interim is meaningful: it clears the displayed partial
                self.interim = event.text.clone();
            }
        }
        self.snapshot()
    }

    /// Drop the interim fragment; returns whether there was one
    pub fn clear_interim(&mut self) -> bool {
        if self.interim.is_empty() {
            return false;
        }
        self.interim.clear();
        true
    }

    pub fn reset(&mut self) -> TranscriptSnapshot {
        self.committed.clear();
        self.interim.clear();
        self.snapshot()
    }

    pub fn committed(&self) -> &str {
        &self.committed
    }

    pub fn interim(&self) -> &str {
        &self.interim
    }

    pub fn snapshot(&self) -> TranscriptSnapshot {
        TranscriptSnapshot {
            committed: self.committed.clone(),
            interim: self.interim.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interim_then_final_commits() {
        let mut assembler = TranscriptAssembler::new();
        assembler.apply(&TranscriptEvent::interim("a"));
        assembler.apply(&TranscriptEvent::interim("ab"));
        let snap = assembler.apply(&TranscriptEvent::final_text("abc"));

        assert_eq!(snap.committed, "abc");
        assert_eq!(snap.interim, "");

        let snap = assembler.apply(&TranscriptEvent::interim(""));
        assert_eq!(snap.committed, "abc");
        assert_eq!(snap.interim, "");
    }

    #[test]
    fn test_finals_are_space_joined() {
        let mut assembler = TranscriptAssembler::new();
        assembler.apply(&TranscriptEvent::final_text("hello"));
        let snap = assembler.apply(&TranscriptEvent::final_text("world "));
        assert_eq!(snap.committed, "hello world");
    }

    #[test]
    fn test_empty_final_only_clears_interim() {
        let mut assembler = TranscriptAssembler::new();
        assembler.apply(&TranscriptEvent::final_text("kept"));
        assembler.apply(&TranscriptEvent::interim("partial"));

        let snap = assembler.apply(&TranscriptEvent::final_text(""));
        assert_eq!(snap.committed, "kept");
        assert_eq!(snap.interim, "");
    }

    #[test]
    fn test_interim_is_replaced_not_appended() {
        let mut assembler = TranscriptAssembler::new();
        assembler.apply(&TranscriptEvent::interim("one"));
        let snap = assembler.apply(&TranscriptEvent::interim("two"));
        assert_eq!(snap.interim, "two");
        assert_eq!(snap.committed, "");
    }

    #[test]
    fn test_clear_interim_reports_change() {
        let mut assembler = TranscriptAssembler::new();
        assert!(!assembler.clear_interim());
        assembler.apply(&TranscriptEvent::interim("x"));
        assert!(assembler.clear_interim());
        assert_eq!(assembler.interim(), "");
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut assembler = TranscriptAssembler::new();
        assembler.apply(&TranscriptEvent::final_text("done"));
        assembler.apply(&TranscriptEvent::interim("more"));

        let snap = assembler.reset();
        assert_eq!(snap, TranscriptSnapshot::default());
        assert_eq!(assembler.committed(), "");
    }
}
