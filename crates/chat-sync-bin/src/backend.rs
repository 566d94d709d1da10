//! Store selection and config mapping.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use chat_config_and_utils::{Config, IdScheme as ConfigIdScheme, Paths};
use conversation_store_sqlite::SqliteMessageStore;
use conversation_sync_core::{
    DisplayPolicy, IdScheme, MessageStore, SessionConfig, UserDirectory, ViewportTracker,
};
use supabase_chat_store::{SupabaseChatStore, SupabaseClient};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::BackendKind;

/// How often the local database is checked for writes from other processes.
const LOCAL_WATCH_INTERVAL: Duration = Duration::from_millis(250);

/// Message store and user directory behind one command.
pub struct Backend {
    pub messages: Arc<dyn MessageStore>,
    pub users: Arc<dyn UserDirectory>,
    local: Option<Arc<SqliteMessageStore>>,
}

impl Backend {
    pub fn open(config: &Config, paths: &Paths, kind: BackendKind) -> anyhow::Result<Self> {
        match kind {
            BackendKind::Local => {
                let path = paths.database_file();
                let store = SqliteMessageStore::open(&path)
                    .with_context(|| format!("opening {}", path.display()))?;
                info!(path = %path.display(), "using local store");
                Ok(Self::local(Arc::new(store)))
            }
            BackendKind::Hosted => {
                let key = config.supabase_publishable_key.clone().ok_or_else(|| {
                    anyhow!("hosted backend needs a publishable key (CHATSYNC_SUPABASE_KEY)")
                })?;
                let url = config.supabase_url()?;
                let client = SupabaseClient::new(url.as_str(), key)?;
                info!(url = %url, "using hosted store");
                Ok(Self::shared(Arc::new(SupabaseChatStore::new(client))))
            }
        }
    }

    pub fn local(store: Arc<SqliteMessageStore>) -> Self {
        Self {
            messages: store.clone(),
            users: store.clone(),
            local: Some(store),
        }
    }

    /// A store that serves both messages and users.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: MessageStore + UserDirectory + 'static,
    {
        Self {
            messages: store.clone(),
            users: store,
            local: None,
        }
    }

    /// Starts polling the local database for other writers. Hosted stores
    /// poll on their own, so this is a no-op for them.
    pub fn watch_external_writes(&self) -> Option<JoinHandle<()>> {
        let store = self.local.as_ref()?;
        debug!("watching local database for external writes");
        Some(store.spawn_change_watcher(LOCAL_WATCH_INTERVAL))
    }
}

pub fn id_scheme(config: &Config) -> IdScheme {
    match config.id_scheme {
        ConfigIdScheme::LengthPrefixed => IdScheme::LengthPrefixed,
        ConfigIdScheme::LegacyJoin => IdScheme::LegacyJoin,
    }
}

pub fn session_config(config: &Config) -> SessionConfig {
    SessionConfig {
        tail_limit: config.tail_limit,
        page_limit: config.page_limit,
        id_scheme: id_scheme(config),
    }
}

pub fn display_policy(config: &Config) -> DisplayPolicy {
    DisplayPolicy::with_burst_window_secs(config.burst_window_secs)
}

/// Stick-to-bottom tracker for front ends that render into a scroll view.
pub fn viewport_tracker(config: &Config) -> ViewportTracker {
    ViewportTracker::new(config.near_bottom_threshold)
}
