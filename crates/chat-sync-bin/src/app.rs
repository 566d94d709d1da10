//! Command implementations.
//!
//! Each command writes its user-facing output to `out`; diagnostics go
//! through `tracing`.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use anyhow::{bail, Context};
use chat_config_and_utils::Config;
use chrono::Local;
use conversation_sync_core::{
    contacts_for, conversation_id, legacy_conversation_id, send_message, ConversationSession,
    ParticipantId, UserProfile, ViewSnapshot,
};
use tracing::{info, warn};

use crate::backend::{display_policy, id_scheme, session_config, Backend};
use crate::render::{timeline_lines, user_line, PrintedMessages};

/// How long `history` waits for the first tail window.
const FIRST_WINDOW_TIMEOUT: Duration = Duration::from_secs(15);

pub async fn add_user(
    backend: &Backend,
    id: Option<String>,
    name: String,
    email: String,
    out: &mut impl Write,
) -> anyhow::Result<UserProfile> {
    let id = id.map(ParticipantId::from).unwrap_or_default();
    let user = UserProfile::new(id, name.trim(), email.trim());
    user.validate()?;

    backend.users.save_user(user.clone()).await?;
    info!(user = %user.id, "user saved");
    writeln!(out, "{}", user_line(&user))?;
    Ok(user)
}

pub async fn list_users(backend: &Backend, out: &mut impl Write) -> anyhow::Result<()> {
    let mut users = backend.users.list_users().await?;
    users.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    for user in &users {
        writeln!(out, "{}", user_line(user))?;
    }
    Ok(())
}

pub async fn contacts(backend: &Backend, me: String, out: &mut impl Write) -> anyhow::Result<()> {
    let users = backend.users.list_users().await?;
    let me = ParticipantId::from(me);
    let Some(current) = users.iter().find(|user| user.id == me).cloned() else {
        bail!("unknown user {me}; register with `chatsync users add`");
    };

    for contact in contacts_for(&current, users) {
        writeln!(out, "{}", user_line(&contact))?;
    }
    Ok(())
}

pub async fn send(
    backend: &Backend,
    config: &Config,
    me: String,
    to: String,
    text: String,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let (me, to) = (ParticipantId::from(me), ParticipantId::from(to));
    let sender_name = display_name(backend, &me).await;

    let id = send_message(
        backend.messages.as_ref(),
        id_scheme(config),
        &me,
        &to,
        &text,
        sender_name.as_deref(),
    )
    .await?;
    writeln!(out, "sent {id}")?;
    Ok(())
}

pub async fn history(
    backend: &Backend,
    config: &Config,
    me: String,
    with: String,
    pages: usize,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let viewer = ParticipantId::from(me);
    let mut session = ConversationSession::open(
        backend.messages.clone(),
        viewer.clone(),
        ParticipantId::from(with),
        session_config(config),
    )
    .await?;

    let result = print_history(&session, config, &viewer, pages, out).await;
    session.close().await;
    result
}

async fn print_history(
    session: &ConversationSession,
    config: &Config,
    viewer: &ParticipantId,
    pages: usize,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let mut snapshots = session.watch();
    let first = tokio::time::timeout(
        FIRST_WINDOW_TIMEOUT,
        snapshots.wait_for(|view| view.synced || view.tail_error.is_some()),
    )
    .await
    .context("timed out waiting for the conversation")?
    .context("conversation closed")?
    .clone();
    if let Some(err) = first.tail_error.filter(|_| !first.synced) {
        bail!("could not load conversation: {err}");
    }

    for _ in 0..pages {
        if session.load_older_page().await? == 0 {
            break;
        }
    }

    let view = session.snapshot();
    let now = Local::now();
    let rows = display_policy(config).timeline_rows(&view.messages, viewer, &now);
    for line in timeline_lines(&rows) {
        writeln!(out, "{line}")?;
    }
    if !view.has_more {
        writeln!(out, "(beginning of conversation)")?;
    }
    Ok(())
}

/// Prints the conversation as it changes until `shutdown` resolves.
pub async fn watch(
    backend: &Backend,
    config: &Config,
    me: String,
    with: String,
    shutdown: impl Future<Output = ()>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let viewer = ParticipantId::from(me);
    let mut session = ConversationSession::open(
        backend.messages.clone(),
        viewer.clone(),
        ParticipantId::from(with),
        session_config(config),
    )
    .await?;
    let watcher = backend.watch_external_writes();

    let policy = display_policy(config);
    let mut printed = PrintedMessages::default();
    let mut snapshots = session.watch();
    let mut last_error = None;
    tokio::pin!(shutdown);

    let result = loop {
        let view: ViewSnapshot = snapshots.borrow_and_update().clone();
        if view.tail_error != last_error {
            if let Some(err) = &view.tail_error {
                warn!(error = %err, "tail error");
            }
            last_error = view.tail_error.clone();
        }

        let now = Local::now();
        let rows = printed.take_unseen(policy.timeline_rows(&view.messages, &viewer, &now));
        if let Err(err) = write_lines(out, timeline_lines(&rows)) {
            break Err(err.into());
        }

        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
            }
            _ = &mut shutdown => break Ok(()),
        }
    };

    if let Some(watcher) = watcher {
        watcher.abort();
    }
    session.close().await;
    result
}

pub fn print_conversation_id(
    a: String,
    b: String,
    legacy: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let (a, b) = (ParticipantId::from(a), ParticipantId::from(b));
    let id = if legacy {
        legacy_conversation_id(&a, &b)?
    } else {
        conversation_id(&a, &b)?
    };
    writeln!(out, "{id}")?;
    Ok(())
}

fn write_lines(out: &mut impl Write, lines: Vec<String>) -> std::io::Result<()> {
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()
}

/// Directory name for `id`, if the directory is reachable and knows it.
async fn display_name(backend: &Backend, id: &ParticipantId) -> Option<String> {
    match backend.users.list_users().await {
        Ok(users) => users
            .into_iter()
            .find(|user| &user.id == id)
            .map(|user| user.name),
        Err(err) => {
            warn!(error = %err, "user directory unavailable, sending without a name");
            None
        }
    }
}
