/// Common structures shared by the ingestion stages
use chrono::{DateTime, Utc};

/// Raw RFC 822 content of one message, as downloaded from the mailbox
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub uid: u32,
    pub content: Vec<u8>,
}

impl RawMessage {
    pub fn new(uid: u32, content: impl Into<Vec<u8>>) -> Self {
        Self {
            uid,
            content: content.into(),
        }
    }
}

/// Readable view of a message, produced once by the extractor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedMessage {
    pub uid: u32,
    pub subject: String,
    pub from_name: String,
    pub from_addr: String,
    /// `Date` header text exactly as sent
    pub date: String,
    /// Parsed `Date` header, when it could be understood
    pub received_at: Option<DateTime<Utc>>,
    /// Plain text, bounded in length
    pub body: String,
}

/// Outcome of classifying one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub is_important: bool,
    /// Empty when the message is not important
    pub summary: String,
    pub reason: Option<String>,
}

impl ClassificationResult {
    pub fn important(summary: impl Into<String>, reason: Option<String>) -> Self {
        Self {
            is_important: true,
            summary: summary.into(),
            reason,
        }
    }

    pub fn not_important(reason: Option<String>) -> Self {
        Self {
            is_important: false,
            summary: String::new(),
            reason,
        }
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub watermark_before: Option<u32>,
    pub watermark_after: Option<u32>,
    /// The run only recorded the mailbox's current position
    pub initialized: bool,
    pub emails_listed: usize,
    pub emails_stored: usize,
    /// Important messages printed by a dry run instead of being stored
    pub emails_previewed: usize,
    pub emails_skipped: usize,
    pub emails_failed: usize,
}

impl RunReport {
    pub fn new(watermark_before: Option<u32>) -> Self {
        Self {
            watermark_before,
            watermark_after: watermark_before,
            ..Self::default()
        }
    }

    pub fn stored(&mut self) {
        self.emails_stored += 1;
    }

    pub fn previewed(&mut self) {
        self.emails_previewed += 1;
    }

    pub fn skipped(&mut self) {
        self.emails_skipped += 1;
    }

    pub fn failure(&mut self) {
        self.emails_failed += 1;
    }
}
