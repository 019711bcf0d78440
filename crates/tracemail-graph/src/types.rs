//! Wire types for the Graph mail endpoints

use serde::{Deserialize, Serialize};

/// Response wrapper for Graph API list endpoints
#[derive(Debug, Deserialize)]
pub struct ListResponse<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// A message as returned by the Graph mail endpoints
///
/// Every field other than the id is optional; what comes back depends on
/// the query that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "conversationId")]
    pub conversation_id: Option<String>,
    pub subject: Option<String>,
    #[serde(rename = "bodyPreview")]
    pub body_preview: Option<String>,
    pub body: Option<MessageBody>,
    pub from: Option<Recipient>,
    #[serde(rename = "toRecipients", default)]
    pub to_recipients: Vec<Recipient>,
    #[serde(rename = "ccRecipients", default)]
    pub cc_recipients: Vec<Recipient>,
    #[serde(rename = "receivedDateTime")]
    pub received_date_time: Option<String>,
    #[serde(rename = "isRead")]
    pub is_read: Option<bool>,
    #[serde(rename = "isDraft")]
    pub is_draft: Option<bool>,
    #[serde(rename = "hasAttachments")]
    pub has_attachments: Option<bool>,
    #[serde(rename = "singleValueExtendedProperties", default)]
    pub extended_properties: Vec<ExtendedProperty>,
}

impl Message {
    /// Value of the given extended property, if this message carries it
    pub fn extended_property(&self, id: &str) -> Option<&str> {
        self.extended_properties
            .iter()
            .find(|property| property.id == id)
            .map(|property| property.value.as_str())
    }
}

/// Message body together with its content type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBody {
    #[serde(rename = "contentType")]
    pub content_type: BodyKind,
    pub content: String,
}

/// Body content type understood by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BodyKind {
    #[default]
    Text,
    Html,
}

/// A message participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    #[serde(rename = "emailAddress")]
    pub email_address: EmailAddress,
}

impl Recipient {
    pub fn address(address: impl Into<String>) -> Self {
        Self {
            email_address: EmailAddress {
                name: None,
                address: Some(address.into()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailAddress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub address: Option<String>,
}

/// A single-value extended property attached to a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedProperty {
    pub id: String,
    pub value: String,
}

/// An email to be sent or drafted
///
/// The optional reference code is written into the message as an extended
/// property so the resulting thread can be found again later.
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub body_kind: BodyKind,
    pub ref_code: Option<String>,
    pub attachments: Vec<MailAttachment>,
}

impl OutgoingMail {
    /// Create a new mail builder
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.into(),
            body: body.into(),
            body_kind: BodyKind::Text,
            ref_code: None,
            attachments: Vec::new(),
        }
    }

    /// Add a To recipient
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    /// Add a CC recipient
    pub fn cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    /// Add a BCC recipient
    pub fn bcc(mut self, address: impl Into<String>) -> Self {
        self.bcc.push(address.into());
        self
    }

    /// Mark the body as HTML instead of plain text
    pub fn html(mut self) -> Self {
        self.body_kind = BodyKind::Html;
        self
    }

    /// Tag the message with a conversation reference code
    pub fn ref_code(mut self, code: impl Into<String>) -> Self {
        self.ref_code = Some(code.into());
        self
    }

    /// Add a file attachment
    pub fn attachment(
        mut self,
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.attachments.push(MailAttachment {
            name: name.into(),
            content_type: content_type.into(),
            data,
        });
        self
    }
}

/// A file attachment for an outgoing message
#[derive(Debug, Clone)]
pub struct MailAttachment {
    /// Filename to display
    pub name: String,
    /// MIME type (e.g., "application/pdf")
    pub content_type: String,
    /// Raw file data
    pub data: Vec<u8>,
}

/// Partial update for a draft message
///
/// Unset fields are left untouched on the server; recipient lists replace
/// the existing ones wholesale.
#[derive(Debug, Clone, Default)]
pub struct DraftUpdate {
    pub body: Option<String>,
    pub body_kind: BodyKind,
    pub to: Option<Vec<String>>,
    pub cc: Option<Vec<String>>,
    pub ref_code: Option<String>,
}

impl DraftUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the draft body
    pub fn body(mut self, body: impl Into<String>, kind: BodyKind) -> Self {
        self.body = Some(body.into());
        self.body_kind = kind;
        self
    }

    /// Replace the To recipients
    pub fn to(mut self, addresses: Vec<String>) -> Self {
        self.to = Some(addresses);
        self
    }

    /// Replace the CC recipients
    pub fn cc(mut self, addresses: Vec<String>) -> Self {
        self.cc = Some(addresses);
        self
    }

    /// Tag the draft with a conversation reference code
    pub fn ref_code(mut self, code: impl Into<String>) -> Self {
        self.ref_code = Some(code.into());
        self
    }
}
