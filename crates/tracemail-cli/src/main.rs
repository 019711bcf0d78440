//! Command line harness for the Tracemail mail operations
//!
//! Drives the library end to end against a real tenant. Credentials and
//! keeper tunables come from `TRACEMAIL_*` environment variables; the
//! mailbox comes from `--mailbox` or `TRACEMAIL_MAILBOX`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tracemail_auth::{Credentials, KeeperOptions, TokenKeeper};
use tracemail_graph::{
    BodyKind, DraftUpdate, GraphMailClient, MailAttachment, Message, OutgoingMail,
};

#[derive(Parser)]
#[command(
    name = "tracemail",
    about = "Conversation-tracking mail client for Microsoft Graph",
    version
)]
struct Cli {
    /// Mailbox (user principal name) to operate on
    #[arg(long, global = true)]
    mailbox: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a new message, optionally tagged with a reference code
    Send {
        /// To recipient; repeatable
        #[arg(long)]
        to: Vec<String>,
        /// CC recipient; repeatable
        #[arg(long)]
        cc: Vec<String>,
        /// BCC recipient; repeatable
        #[arg(long)]
        bcc: Vec<String>,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        body: String,
        /// Treat the body as HTML instead of plain text
        #[arg(long)]
        html: bool,
        /// Reference code to tag the new thread with
        #[arg(long = "ref")]
        ref_code: Option<String>,
        /// File to attach
        #[arg(long)]
        attach: Option<PathBuf>,
        /// MIME type of the attached file
        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,
    },
    /// Show the first message tagged with a reference code
    Check {
        #[arg(long = "ref")]
        ref_code: String,
    },
    /// Reply to the latest message in a thread
    Reply {
        #[arg(long = "ref")]
        ref_code: String,
        #[arg(long)]
        body: String,
        /// Reply to all recipients instead of just the sender
        #[arg(long)]
        all: bool,
    },
    /// Dump every message in a thread
    Conversation {
        #[arg(long = "ref")]
        ref_code: String,
        /// Stop after this many pages instead of reading the whole thread
        #[arg(long)]
        pages: Option<u32>,
    },
    /// List unread messages, mailbox-wide or within one thread
    Unread {
        #[arg(long = "ref")]
        ref_code: Option<String>,
        /// Cap the result count (default 10)
        #[arg(long)]
        top: Option<u32>,
    },
    /// Mark the first unread message of a thread as read
    MarkRead {
        #[arg(long = "ref")]
        ref_code: String,
    },
    /// Recover the reference code attached to a conversation id
    RefCode {
        #[arg(long)]
        conversation_id: String,
    },
    /// Draft operations
    #[command(subcommand)]
    Draft(DraftCommands),
}

#[derive(Subcommand)]
enum DraftCommands {
    /// Create an empty draft with a subject
    Create {
        #[arg(long)]
        subject: String,
    },
    /// Show the first draft with a subject
    Find {
        #[arg(long)]
        subject: String,
    },
    /// Copy a message into the drafts folder
    Copy {
        #[arg(long)]
        id: String,
    },
    /// Update body, recipients or reference code of a draft
    Update {
        #[arg(long)]
        id: String,
        #[arg(long)]
        body: Option<String>,
        /// Treat the body as HTML instead of plain text
        #[arg(long)]
        html: bool,
        /// Replacement To recipient; repeatable
        #[arg(long)]
        to: Vec<String>,
        /// Replacement CC recipient; repeatable
        #[arg(long)]
        cc: Vec<String>,
        #[arg(long = "ref")]
        ref_code: Option<String>,
    },
    /// Attach a file to a draft
    Attach {
        #[arg(long)]
        id: String,
        #[arg(long)]
        file: PathBuf,
        /// MIME type of the file
        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,
    },
    /// Send a draft
    Send {
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("tracemail_auth=debug".parse()?)
                .add_directive("tracemail_graph=debug".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let credentials = Credentials::from_env().context("loading credentials")?;
    let resource = credentials.resource.clone();
    let options = KeeperOptions::from_env().context("loading keeper options")?;

    let keeper = Arc::new(TokenKeeper::start(credentials, options).await?);
    if !keeper.is_ready() {
        warn!("no access token yet; the keeper keeps retrying in the background");
    }

    let result = run(cli, resource, keeper.clone()).await;
    keeper.shutdown();
    result
}

async fn run(cli: Cli, resource: String, keeper: Arc<TokenKeeper>) -> anyhow::Result<()> {
    let Cli { mailbox, command } = cli;
    let mailbox = match mailbox {
        Some(mailbox) => mailbox,
        None => std::env::var("TRACEMAIL_MAILBOX")
            .context("no mailbox given; pass --mailbox or set TRACEMAIL_MAILBOX")?,
    };

    let mut client = GraphMailClient::new(resource, keeper);
    if let Commands::Conversation {
        pages: Some(pages), ..
    } = &command
    {
        client = client.with_page_limit(*pages);
    }

    match command {
        Commands::Send {
            to,
            cc,
            bcc,
            subject,
            body,
            html,
            ref_code,
            attach,
            content_type,
        } => {
            let mut mail = OutgoingMail::new(subject, body);
            mail.to = to;
            mail.cc = cc;
            mail.bcc = bcc;
            if html {
                mail = mail.html();
            }
            if let Some(code) = ref_code {
                mail = mail.ref_code(code);
            }
            if let Some(path) = attach {
                let data = std::fs::read(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                mail = mail.attachment(file_name(&path), content_type, data);
            }
            client.send_message(&mailbox, &mail).await?;
            println!("message sent");
        }

        Commands::Check { ref_code } => match client.message_by_ref_code(&mailbox, &ref_code).await? {
            Some(message) => print_json(&message)?,
            None => println!("no message tagged {ref_code}"),
        },

        Commands::Reply {
            ref_code,
            body,
            all,
        } => {
            let sent = if all {
                client
                    .reply_all_in_conversation(&mailbox, &ref_code, &body)
                    .await?
            } else {
                client
                    .reply_in_conversation(&mailbox, &ref_code, &body)
                    .await?
            };
            if sent {
                println!("reply sent");
            } else {
                println!("no thread found for {ref_code}");
            }
        }

        Commands::Conversation { ref_code, .. } => {
            match client.conversation_messages(&mailbox, &ref_code).await? {
                Some(messages) => {
                    println!("{} messages in thread", messages.len());
                    print_json(&messages)?;
                }
                None => println!("no thread found for {ref_code}"),
            }
        }

        Commands::Unread { ref_code, top } => match ref_code {
            Some(code) => match client.unread_in_conversation(&mailbox, &code, top).await? {
                Some(messages) => print_summaries(&messages),
                None => println!("no thread found for {code}"),
            },
            None => {
                let messages = client.unread_messages(&mailbox, top).await?;
                print_summaries(&messages);
            }
        },

        Commands::MarkRead { ref_code } => {
            match client.unread_in_conversation(&mailbox, &ref_code, None).await? {
                Some(messages) => match messages.first() {
                    Some(message) => {
                        client.mark_read(&mailbox, &message.id).await?;
                        println!("marked {} read", message.id);
                    }
                    None => println!("nothing unread in thread {ref_code}"),
                },
                None => println!("no thread found for {ref_code}"),
            }
        }

        Commands::RefCode { conversation_id } => {
            match client
                .ref_code_of_conversation(&mailbox, &conversation_id)
                .await?
            {
                Some(code) => println!("{code}"),
                None => println!("no reference code on this conversation"),
            }
        }

        Commands::Draft(draft) => match draft {
            DraftCommands::Create { subject } => {
                let draft = client.create_draft(&mailbox, &subject).await?;
                println!("created draft {}", draft.id);
            }
            DraftCommands::Find { subject } => match client.find_draft(&mailbox, &subject).await? {
                Some(draft) => print_json(&draft)?,
                None => println!("no draft titled {subject:?}"),
            },
            DraftCommands::Copy { id } => {
                let copy = client.copy_message(&mailbox, &id, "drafts").await?;
                println!("copied to draft {}", copy.id);
            }
            DraftCommands::Update {
                id,
                body,
                html,
                to,
                cc,
                ref_code,
            } => {
                let mut update = DraftUpdate::new();
                if let Some(body) = body {
                    let kind = if html { BodyKind::Html } else { BodyKind::Text };
                    update = update.body(body, kind);
                }
                if !to.is_empty() {
                    update = update.to(to);
                }
                if !cc.is_empty() {
                    update = update.cc(cc);
                }
                if let Some(code) = ref_code {
                    update = update.ref_code(code);
                }
                client.update_draft(&mailbox, &id, &update).await?;
                println!("updated draft {id}");
            }
            DraftCommands::Attach {
                id,
                file,
                content_type,
            } => {
                let data = std::fs::read(&file)
                    .with_context(|| format!("reading {}", file.display()))?;
                client
                    .add_attachment(
                        &mailbox,
                        &id,
                        &MailAttachment {
                            name: file_name(&file),
                            content_type,
                            data,
                        },
                    )
                    .await?;
                println!("attached {} to {id}", file.display());
            }
            DraftCommands::Send { id } => {
                client.send_draft(&mailbox, &id).await?;
                println!("draft {id} sent");
            }
        },
    }

    Ok(())
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_summaries(messages: &[Message]) {
    if messages.is_empty() {
        println!("no unread messages");
        return;
    }
    for message in messages {
        let from = message
            .from
            .as_ref()
            .and_then(|sender| sender.email_address.address.as_deref())
            .unwrap_or("<unknown>");
        println!(
            "{}  {}  {}  {}",
            message.received_date_time.as_deref().unwrap_or("-"),
            from,
            message.subject.as_deref().unwrap_or("(no subject)"),
            message.id
        );
    }
}
