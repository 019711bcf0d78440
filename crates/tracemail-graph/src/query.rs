//! OData query fragments for the mail endpoints
//!
//! Pure functions producing decoded `(parameter, value)` pairs; URL
//! encoding happens when they are appended to a request URL. Inputs are
//! assumed to be provider identifiers and reference codes, not arbitrary
//! user text.

/// Extended property carrying the conversation reference code
///
/// The value is written on the first message of a thread and queried back
/// to correlate application conversations with provider threads.
pub const REF_CODE_PROPERTY: &str =
    "String {9f51f2e5-2c0e-4d2f-8f44-5b0e9c4a7d31} Name TracemailRefCode";

/// Result cap applied to unread lookups when the caller does not pick one
pub const DEFAULT_UNREAD_TOP: u32 = 10;

// The provider rejects $orderby on a field that does not also appear in
// $filter, so ordered thread queries carry a far-past receivedDateTime
// floor that matches everything.
const ORDERBY_DATE_FLOOR: &str = "2000-01-01T00:01:00Z";

/// Which end of a thread an ordered lookup should return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadOrder {
    Earliest,
    Latest,
}

impl ThreadOrder {
    fn direction(self) -> &'static str {
        match self {
            ThreadOrder::Earliest => "asc",
            ThreadOrder::Latest => "desc",
        }
    }
}

/// Messages tagged with the given reference code
///
/// Expands the property back into the result so callers can read it
/// without a second round trip.
pub fn by_ref_code(ref_code: &str) -> Vec<(&'static str, String)> {
    vec![
        (
            "$filter",
            format!(
                "singleValueExtendedProperties/Any(ep: ep/id eq '{REF_CODE_PROPERTY}' \
                 and ep/value eq '{ref_code}')"
            ),
        ),
        (
            "$expand",
            format!("singleValueExtendedProperties($filter=id eq '{REF_CODE_PROPERTY}')"),
        ),
    ]
}

/// The single earliest or latest message of a conversation
pub fn thread(conversation_id: &str, order: ThreadOrder) -> Vec<(&'static str, String)> {
    vec![
        (
            "$filter",
            format!(
                "receivedDateTime ge {ORDERBY_DATE_FLOOR} \
                 and conversationId eq '{conversation_id}'"
            ),
        ),
        (
            "$orderby",
            format!("receivedDateTime {}", order.direction()),
        ),
        ("$top", "1".to_string()),
    ]
}

/// Every message of a conversation, in provider order
pub fn conversation(conversation_id: &str) -> Vec<(&'static str, String)> {
    vec![("$filter", format!("conversationId eq '{conversation_id}'"))]
}

/// Unread messages, mailbox-wide or scoped to one conversation
pub fn unread(conversation_id: Option<&str>, top: u32) -> Vec<(&'static str, String)> {
    let filter = match conversation_id {
        Some(id) => format!("isRead eq false and conversationId eq '{id}'"),
        None => "isRead eq false".to_string(),
    };
    vec![("$filter", filter), ("$top", top.to_string())]
}

/// Messages of a conversation that carry any reference code
///
/// Inverse lookup: recovers which code was attached to a thread after an
/// external reply arrives without the property.
pub fn ref_code_of_conversation(conversation_id: &str) -> Vec<(&'static str, String)> {
    vec![
        (
            "$filter",
            format!(
                "singleValueExtendedProperties/Any(ep: ep/id eq '{REF_CODE_PROPERTY}' \
                 and ep/value ne null) and conversationId eq '{conversation_id}'"
            ),
        ),
        (
            "$expand",
            format!("singleValueExtendedProperties($filter=id eq '{REF_CODE_PROPERTY}')"),
        ),
    ]
}

/// Draft messages with exactly the given subject
pub fn drafts_by_subject(subject: &str) -> Vec<(&'static str, String)> {
    vec![(
        "$filter",
        format!("subject eq '{subject}' and isDraft eq true"),
    )]
}
