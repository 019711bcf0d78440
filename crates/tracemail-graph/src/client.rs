//! Graph mail client
//!
//! [`GraphMailClient`] wraps the mail operations of the Graph API for one
//! resource: sending and replying, the draft lifecycle, unread lookups and
//! reference-code correlation. The current access token is read from a
//! shared [`TokenKeeper`] on every call; the client never renews tokens
//! itself.
//!
//! Acceptance is by exact status code per operation: 200 for reads and
//! patches, 201 for creation and copies, 202 for anything that queues mail
//! for delivery.

use std::sync::Arc;

use reqwest::{Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use tracemail_auth::TokenKeeper;

use crate::error::{GraphError, GraphResult};
use crate::query::{self, ThreadOrder, DEFAULT_UNREAD_TOP, REF_CODE_PROPERTY};
use crate::types::*;

const GRAPH_API_VERSION: &str = "v1.0";

/// Reads ask the provider to render bodies as plain text, matching what
/// the reply endpoints expect as comment input
const PREFER_TEXT_BODY: &str = "outlook.body-content-type=\"text\"";

pub struct GraphMailClient {
    http: reqwest::Client,
    tokens: Arc<TokenKeeper>,
    resource: String,
    page_limit: Option<u32>,
}

impl GraphMailClient {
    /// Create a client for the given resource base (e.g.
    /// `https://graph.microsoft.com`)
    pub fn new(resource: impl Into<String>, tokens: Arc<TokenKeeper>) -> Self {
        let resource = resource.into();
        Self {
            http: reqwest::Client::new(),
            tokens,
            resource: resource.trim_end_matches('/').to_string(),
            page_limit: None,
        }
    }

    /// Cap thread-wide fetches at this many pages
    ///
    /// Without a limit, conversation reads follow continuation links until
    /// the provider is exhausted; a limit of 1 reads a single page. Zero
    /// is clamped to one page.
    pub fn with_page_limit(mut self, pages: u32) -> Self {
        self.page_limit = Some(pages.max(1));
        self
    }

    fn bearer(&self) -> GraphResult<String> {
        self.tokens.token().ok_or(GraphError::NoToken)
    }

    fn url(
        &self,
        mailbox: &str,
        tail: &str,
        query: &[(&'static str, String)],
    ) -> GraphResult<Url> {
        let mut url = Url::parse(&format!(
            "{}/{}/users/{}/{}",
            self.resource, GRAPH_API_VERSION, mailbox, tail
        ))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Fail unless the response carries exactly the expected status
    async fn expect_status(response: Response, expected: StatusCode) -> GraphResult<Response> {
        let status = response.status();
        if status != expected {
            let body = response.text().await.unwrap_or_default();
            return Err(GraphError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn fetch_messages(&self, url: Url) -> GraphResult<ListResponse<Message>> {
        let token = self.bearer()?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&token)
            .header("Prefer", PREFER_TEXT_BODY)
            .send()
            .await?;

        let response = Self::expect_status(response, StatusCode::OK).await?;
        response
            .json()
            .await
            .map_err(|e| GraphError::Parse(e.to_string()))
    }

    /// Conversation id of the thread tagged with a reference code
    ///
    /// Returns the id of the first matching message; if duplicate codes
    /// exist, provider response order decides which thread wins.
    pub async fn conversation_id(
        &self,
        mailbox: &str,
        ref_code: &str,
    ) -> GraphResult<Option<String>> {
        debug!("Graph: resolving conversation for ref code {}", ref_code);
        let url = self.url(mailbox, "messages", &query::by_ref_code(ref_code))?;
        let list = self.fetch_messages(url).await?;
        Ok(list
            .value
            .into_iter()
            .next()
            .and_then(|message| message.conversation_id))
    }

    async fn thread_edge(
        &self,
        mailbox: &str,
        ref_code: &str,
        order: ThreadOrder,
    ) -> GraphResult<Option<Message>> {
        let conversation_id = match self.conversation_id(mailbox, ref_code).await? {
            Some(id) => id,
            None => return Ok(None),
        };
        let url = self.url(mailbox, "messages", &query::thread(&conversation_id, order))?;
        let list = self.fetch_messages(url).await?;
        Ok(list.value.into_iter().next())
    }

    /// Earliest message of the thread tagged with this reference code
    pub async fn first_message(
        &self,
        mailbox: &str,
        ref_code: &str,
    ) -> GraphResult<Option<Message>> {
        self.thread_edge(mailbox, ref_code, ThreadOrder::Earliest)
            .await
    }

    /// Latest message of the thread tagged with this reference code
    pub async fn last_message(
        &self,
        mailbox: &str,
        ref_code: &str,
    ) -> GraphResult<Option<Message>> {
        self.thread_edge(mailbox, ref_code, ThreadOrder::Latest)
            .await
    }

    /// All messages of the thread tagged with this reference code
    ///
    /// `Ok(None)` means the reference code resolved to no thread.
    pub async fn conversation_messages(
        &self,
        mailbox: &str,
        ref_code: &str,
    ) -> GraphResult<Option<Vec<Message>>> {
        let conversation_id = match self.conversation_id(mailbox, ref_code).await? {
            Some(id) => id,
            None => return Ok(None),
        };

        let mut url = self.url(mailbox, "messages", &query::conversation(&conversation_id))?;
        let mut messages = Vec::new();
        let mut pages = 0u32;
        loop {
            let list = self.fetch_messages(url).await?;
            messages.extend(list.value);
            pages += 1;
            if self.page_limit.map_or(false, |limit| pages >= limit) {
                debug!("Graph: stopping conversation fetch at page {}", pages);
                break;
            }
            match list.next_link {
                Some(link) => url = Url::parse(&link)?,
                None => break,
            }
        }

        info!(
            "Graph: fetched {} messages over {} pages",
            messages.len(),
            pages
        );
        Ok(Some(messages))
    }

    /// First message tagged with the given reference code
    pub async fn message_by_ref_code(
        &self,
        mailbox: &str,
        ref_code: &str,
    ) -> GraphResult<Option<Message>> {
        let url = self.url(mailbox, "messages", &query::by_ref_code(ref_code))?;
        let list = self.fetch_messages(url).await?;
        Ok(list.value.into_iter().next())
    }

    /// Send a message, optionally tagged with a reference code
    ///
    /// Success means the provider queued the message for delivery
    /// (status 202).
    pub async fn send_message(&self, mailbox: &str, mail: &OutgoingMail) -> GraphResult<()> {
        let token = self.bearer()?;
        let url = self.url(mailbox, "sendMail", &[])?;
        debug!(
            "Graph: sending '{}' to {} recipients",
            mail.subject,
            mail.to.len()
        );

        let response = self
            .http
            .post(url)
            .bearer_auth(&token)
            .json(&SendMailRequest::from_mail(mail))
            .send()
            .await?;

        Self::expect_status(response, StatusCode::ACCEPTED).await?;
        info!("Graph: message accepted for delivery");
        Ok(())
    }

    /// Reply to everyone on the latest message of the thread
    ///
    /// `Ok(false)` means the reference code resolved to no thread and
    /// nothing was posted.
    pub async fn reply_all_in_conversation(
        &self,
        mailbox: &str,
        ref_code: &str,
        comment: &str,
    ) -> GraphResult<bool> {
        self.reply_in_thread(mailbox, ref_code, comment, "replyAll")
            .await
    }

    /// Reply to the sender of the latest message of the thread
    pub async fn reply_in_conversation(
        &self,
        mailbox: &str,
        ref_code: &str,
        comment: &str,
    ) -> GraphResult<bool> {
        self.reply_in_thread(mailbox, ref_code, comment, "reply")
            .await
    }

    async fn reply_in_thread(
        &self,
        mailbox: &str,
        ref_code: &str,
        comment: &str,
        endpoint: &str,
    ) -> GraphResult<bool> {
        let message = match self.last_message(mailbox, ref_code).await? {
            Some(message) => message,
            None => {
                warn!("Graph: no thread found for ref code {}", ref_code);
                return Ok(false);
            }
        };

        let token = self.bearer()?;
        let url = self.url(
            mailbox,
            &format!("messages/{}/{}", message.id, endpoint),
            &[],
        )?;
        debug!("Graph: posting {} on message {}", endpoint, message.id);

        let response = self
            .http
            .post(url)
            .bearer_auth(&token)
            .json(&json!({ "comment": comment }))
            .send()
            .await?;

        Self::expect_status(response, StatusCode::ACCEPTED).await?;
        info!("Graph: reply accepted for delivery");
        Ok(true)
    }

    /// Create an empty draft with the given subject
    ///
    /// Returns the created draft.
    pub async fn create_draft(&self, mailbox: &str, subject: &str) -> GraphResult<Message> {
        let token = self.bearer()?;
        let url = self.url(mailbox, "messages", &[])?;
        debug!("Graph: creating draft '{}'", subject);

        let response = self
            .http
            .post(url)
            .bearer_auth(&token)
            .json(&json!({ "subject": subject }))
            .send()
            .await?;

        let response = Self::expect_status(response, StatusCode::CREATED).await?;
        let draft: Message = response
            .json()
            .await
            .map_err(|e| GraphError::Parse(e.to_string()))?;
        info!("Graph: created draft {}", draft.id);
        Ok(draft)
    }

    /// First draft whose subject matches exactly
    pub async fn find_draft(&self, mailbox: &str, subject: &str) -> GraphResult<Option<Message>> {
        let url = self.url(mailbox, "messages", &query::drafts_by_subject(subject))?;
        let list = self.fetch_messages(url).await?;
        Ok(list.value.into_iter().next())
    }

    /// Copy a message into another folder. Returns the copy.
    ///
    /// Well-known folder names such as "drafts" are accepted as the
    /// destination.
    pub async fn copy_message(
        &self,
        mailbox: &str,
        message_id: &str,
        destination_id: &str,
    ) -> GraphResult<Message> {
        let token = self.bearer()?;
        let url = self.url(mailbox, &format!("messages/{message_id}/copy"), &[])?;
        debug!("Graph: copying {} to {}", message_id, destination_id);

        let response = self
            .http
            .post(url)
            .bearer_auth(&token)
            .json(&json!({ "destinationId": destination_id }))
            .send()
            .await?;

        let response = Self::expect_status(response, StatusCode::CREATED).await?;
        let copy: Message = response
            .json()
            .await
            .map_err(|e| GraphError::Parse(e.to_string()))?;
        info!("Graph: copied message, new id={}", copy.id);
        Ok(copy)
    }

    /// Patch fields of an existing draft
    pub async fn update_draft(
        &self,
        mailbox: &str,
        message_id: &str,
        update: &DraftUpdate,
    ) -> GraphResult<()> {
        let mut patch = json!({});
        if let Some(ref body) = update.body {
            patch["body"] = json!({
                "contentType": update.body_kind,
                "content": body,
            });
        }
        if let Some(ref to) = update.to {
            patch["toRecipients"] = recipients_json(to);
        }
        if let Some(ref cc) = update.cc {
            patch["ccRecipients"] = recipients_json(cc);
        }
        if let Some(ref code) = update.ref_code {
            patch["singleValueExtendedProperties"] = json!([
                { "id": REF_CODE_PROPERTY, "value": code }
            ]);
        }

        let token = self.bearer()?;
        let url = self.url(mailbox, &format!("messages/{message_id}"), &[])?;
        debug!("Graph: updating draft {}", message_id);

        let response = self
            .http
            .patch(url)
            .bearer_auth(&token)
            .json(&patch)
            .send()
            .await?;

        Self::expect_status(response, StatusCode::OK).await?;
        info!("Graph: updated draft {}", message_id);
        Ok(())
    }

    /// Attach a file to an existing draft
    pub async fn add_attachment(
        &self,
        mailbox: &str,
        message_id: &str,
        attachment: &MailAttachment,
    ) -> GraphResult<()> {
        use base64::Engine;
        let engine = base64::engine::general_purpose::STANDARD;

        let token = self.bearer()?;
        let url = self.url(mailbox, &format!("messages/{message_id}/attachments"), &[])?;
        debug!(
            "Graph: attaching '{}' ({} bytes) to {}",
            attachment.name,
            attachment.data.len(),
            message_id
        );

        let response = self
            .http
            .post(url)
            .bearer_auth(&token)
            .json(&json!({
                "@odata.type": "#microsoft.graph.fileAttachment",
                "name": attachment.name,
                "contentType": attachment.content_type,
                "contentBytes": engine.encode(&attachment.data),
            }))
            .send()
            .await?;

        Self::expect_status(response, StatusCode::CREATED).await?;
        Ok(())
    }

    /// Send an existing draft
    pub async fn send_draft(&self, mailbox: &str, message_id: &str) -> GraphResult<()> {
        let token = self.bearer()?;
        let url = self.url(mailbox, &format!("messages/{message_id}/send"), &[])?;
        debug!("Graph: sending draft {}", message_id);

        let response = self.http.post(url).bearer_auth(&token).send().await?;

        Self::expect_status(response, StatusCode::ACCEPTED).await?;
        info!("Graph: draft accepted for delivery");
        Ok(())
    }

    /// Mark a message as read
    pub async fn mark_read(&self, mailbox: &str, message_id: &str) -> GraphResult<()> {
        let token = self.bearer()?;
        let url = self.url(mailbox, &format!("messages/{message_id}"), &[])?;
        debug!("Graph: setting isRead=true for {}", message_id);

        let response = self
            .http
            .patch(url)
            .bearer_auth(&token)
            .json(&json!({ "isRead": true }))
            .send()
            .await?;

        Self::expect_status(response, StatusCode::OK).await?;
        Ok(())
    }

    /// Unread messages in the mailbox
    ///
    /// `top` caps the result count; `None` applies the default of 10.
    pub async fn unread_messages(
        &self,
        mailbox: &str,
        top: Option<u32>,
    ) -> GraphResult<Vec<Message>> {
        let top = top.unwrap_or(DEFAULT_UNREAD_TOP);
        let url = self.url(mailbox, "messages", &query::unread(None, top))?;
        let list = self.fetch_messages(url).await?;
        debug!("Graph: {} unread messages", list.value.len());
        Ok(list.value)
    }

    /// Unread messages within the thread tagged with this reference code
    ///
    /// `Ok(None)` means the reference code resolved to no thread.
    pub async fn unread_in_conversation(
        &self,
        mailbox: &str,
        ref_code: &str,
        top: Option<u32>,
    ) -> GraphResult<Option<Vec<Message>>> {
        let conversation_id = match self.conversation_id(mailbox, ref_code).await? {
            Some(id) => id,
            None => return Ok(None),
        };
        let top = top.unwrap_or(DEFAULT_UNREAD_TOP);
        let url = self.url(
            mailbox,
            "messages",
            &query::unread(Some(&conversation_id), top),
        )?;
        let list = self.fetch_messages(url).await?;
        Ok(Some(list.value))
    }

    /// Recover the reference code previously attached to a conversation
    ///
    /// Inverse of [`GraphMailClient::conversation_id`]; used when an
    /// external reply arrives and only the provider thread is known.
    pub async fn ref_code_of_conversation(
        &self,
        mailbox: &str,
        conversation_id: &str,
    ) -> GraphResult<Option<String>> {
        let url = self.url(
            mailbox,
            "messages",
            &query::ref_code_of_conversation(conversation_id),
        )?;
        let list = self.fetch_messages(url).await?;
        Ok(list.value.iter().find_map(|message| {
            message
                .extended_property(REF_CODE_PROPERTY)
                .map(str::to_string)
        }))
    }
}

fn recipients_json(addresses: &[String]) -> serde_json::Value {
    let recipients: Vec<serde_json::Value> = addresses
        .iter()
        .filter(|address| !address.is_empty())
        .map(|address| json!({ "emailAddress": { "address": address } }))
        .collect();
    serde_json::Value::Array(recipients)
}

#[derive(Serialize)]
struct SendMailRequest {
    message: OutboundMessage,
    #[serde(rename = "saveToSentItems")]
    save_to_sent_items: bool,
}

#[derive(Serialize)]
struct OutboundMessage {
    subject: String,
    body: MessageBody,
    #[serde(rename = "toRecipients")]
    to_recipients: Vec<Recipient>,
    #[serde(rename = "ccRecipients", skip_serializing_if = "Vec::is_empty")]
    cc_recipients: Vec<Recipient>,
    #[serde(rename = "bccRecipients", skip_serializing_if = "Vec::is_empty")]
    bcc_recipients: Vec<Recipient>,
    #[serde(
        rename = "singleValueExtendedProperties",
        skip_serializing_if = "Vec::is_empty"
    )]
    extended_properties: Vec<ExtendedProperty>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<OutboundAttachment>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboundAttachment {
    #[serde(rename = "@odata.type")]
    odata_type: String,
    name: String,
    content_type: String,
    content_bytes: String,
}

impl SendMailRequest {
    fn from_mail(mail: &OutgoingMail) -> Self {
        use base64::Engine;
        let engine = base64::engine::general_purpose::STANDARD;

        let recipients = |addresses: &[String]| -> Vec<Recipient> {
            addresses
                .iter()
                .filter(|address| !address.is_empty())
                .map(|address| Recipient::address(address.as_str()))
                .collect()
        };

        let extended_properties = mail
            .ref_code
            .iter()
            .map(|code| ExtendedProperty {
                id: REF_CODE_PROPERTY.to_string(),
                value: code.clone(),
            })
            .collect();

        let attachments = mail
            .attachments
            .iter()
            .map(|attachment| OutboundAttachment {
                odata_type: "#microsoft.graph.fileAttachment".to_string(),
                name: attachment.name.clone(),
                content_type: attachment.content_type.clone(),
                content_bytes: engine.encode(&attachment.data),
            })
            .collect();

        Self {
            message: OutboundMessage {
                subject: mail.subject.clone(),
                body: MessageBody {
                    content_type: mail.body_kind,
                    content: mail.body.clone(),
                },
                to_recipients: recipients(&mail.to),
                cc_recipients: recipients(&mail.cc),
                bcc_recipients: recipients(&mail.bcc),
                extended_properties,
                attachments,
            },
            save_to_sent_items: true,
        }
    }
}
