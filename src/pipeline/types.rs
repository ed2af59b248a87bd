//! Items that flow between pipeline stages.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

// ── Users ───────────────────────────────────────────────────────────

/// Candidate email address fed into the pipeline.
pub type Address = String;

/// A resolved user. Identity is `id`; several addresses may share it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub email: String,
}

// ── Messages ────────────────────────────────────────────────────────

/// Opaque message identifier assigned by the message store.
///
/// Ordered numerically; the text form is the plain decimal value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A message returned by a batch fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// Owner of the message.
    pub user_id: u64,
}

/// A message that went through the classifier successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassifiedMessage {
    pub id: MessageId,
    pub has_spam: bool,
}

impl ClassifiedMessage {
    pub fn new(id: u64, has_spam: bool) -> Self {
        Self {
            id: MessageId(id),
            has_spam,
        }
    }

    /// Report order: spam first, then ascending id.
    pub fn report_order(a: &Self, b: &Self) -> Ordering {
        b.has_spam.cmp(&a.has_spam).then_with(|| a.id.cmp(&b.id))
    }
}

/// Renders a report line: `"<has_spam> <id>"`.
impl fmt::Display for ClassifiedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.has_spam, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_line_uses_canonical_bool_text() {
        assert_eq!(ClassifiedMessage::new(7, true).to_string(), "true 7");
        assert_eq!(ClassifiedMessage::new(42, false).to_string(), "false 42");
    }

    #[test]
    fn report_order_puts_spam_first() {
        let spam = ClassifiedMessage::new(9, true);
        let ham = ClassifiedMessage::new(1, false);
        assert_eq!(ClassifiedMessage::report_order(&spam, &ham), Ordering::Less);
        assert_eq!(ClassifiedMessage::report_order(&ham, &spam), Ordering::Greater);
    }

    #[test]
    fn report_order_breaks_ties_by_numeric_id() {
        let a = ClassifiedMessage::new(9, false);
        let b = ClassifiedMessage::new(10, false);
        assert_eq!(ClassifiedMessage::report_order(&a, &b), Ordering::Less);
        assert_eq!(ClassifiedMessage::report_order(&a, &a), Ordering::Equal);
    }

    #[test]
    fn message_id_serializes_as_number() {
        let json = serde_json::to_value(ClassifiedMessage::new(3, true)).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["has_spam"], true);
    }
}
