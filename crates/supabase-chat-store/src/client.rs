//! REST client for the hosted chat tables.
//!
//! Tables:
//! - `messages(id, conversation_id, sender_id, sender_name, text, created_at)`;
//!   `id` and `created_at` are assigned by the database
//! - `users(id, name, email)`

use chrono::{DateTime, SecondsFormat, Utc};
use conversation_sync_core::{ConversationId, Message, MessageId, NewMessage, ParticipantId, UserProfile};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use url::Url;

use crate::error::{SupabaseResult, SupabaseStoreError};

const MESSAGE_COLUMNS: &str = "id,conversation_id,sender_id,sender_name,text,created_at";

/// Message row as stored by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: MessageId(row.id),
            sender_id: ParticipantId(row.sender_id),
            sender_name: row.sender_name,
            text: row.text,
            timestamp: row.created_at,
        }
    }
}

/// Insert payload; the backend fills in `id` and `created_at`.
#[derive(Debug, Serialize)]
struct MessageInsert<'a> {
    conversation_id: &'a str,
    sender_id: &'a str,
    sender_name: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize, Deserialize)]
struct UserRow {
    id: String,
    name: String,
    email: String,
}

/// Supabase REST API client for chat messages and users.
#[derive(Clone)]
pub struct SupabaseClient {
    http_client: reqwest::Client,
    api_url: Url,
    publishable_key: String,
    access_token: Option<String>,
}

impl SupabaseClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `api_url` - The project API URL (e.g., `https://xyz.supabase.co`)
    /// * `publishable_key` - The project's publishable API key
    pub fn new(api_url: &str, publishable_key: impl Into<String>) -> SupabaseResult<Self> {
        let publishable_key = publishable_key.into();
        if publishable_key.trim().is_empty() {
            return Err(SupabaseStoreError::Config(
                "publishable key is empty".to_string(),
            ));
        }
        let mut api_url = Url::parse(api_url)?;
        if api_url.cannot_be_a_base() {
            return Err(SupabaseStoreError::Config(format!(
                "not a base URL: {api_url}"
            )));
        }
        if !api_url.path().ends_with('/') {
            let path = format!("{}/", api_url.path());
            api_url.set_path(&path);
        }

        Ok(Self {
            http_client: reqwest::Client::new(),
            api_url,
            publishable_key,
            access_token: None,
        })
    }

    /// Sends requests as a signed-in user instead of the anonymous role.
    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }

    /// Build the REST API URL for a table.
    fn rest_url(&self, table: &str) -> SupabaseResult<Url> {
        Ok(self.api_url.join(&format!("rest/v1/{table}"))?)
    }

    pub(crate) fn latest_url(&self, conversation: &ConversationId, limit: usize) -> SupabaseResult<Url> {
        let mut url = self.rest_url("messages")?;
        url.query_pairs_mut()
            .append_pair("select", MESSAGE_COLUMNS)
            .append_pair("conversation_id", &format!("eq.{conversation}"))
            .append_pair("order", "created_at.desc,id.desc")
            .append_pair("limit", &limit.to_string());
        Ok(url)
    }

    /// Rows strictly older than `cursor`.
    ///
    /// The cursor is a bare timestamp, so a row sharing `created_at` with the
    /// oldest displayed row is never paged in. Postgres stores microseconds,
    /// which makes such ties rare but possible.
    pub(crate) fn before_url(
        &self,
        conversation: &ConversationId,
        cursor: DateTime<Utc>,
        limit: usize,
    ) -> SupabaseResult<Url> {
        let mut url = self.rest_url("messages")?;
        url.query_pairs_mut()
            .append_pair("select", MESSAGE_COLUMNS)
            .append_pair("conversation_id", &format!("eq.{conversation}"))
            .append_pair(
                "created_at",
                &format!("lt.{}", cursor.to_rfc3339_opts(SecondsFormat::Micros, true)),
            )
            .append_pair("order", "created_at.desc,id.desc")
            .append_pair("limit", &limit.to_string());
        Ok(url)
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Insert a message and return the stored row.
    pub async fn insert_message(
        &self,
        conversation: &ConversationId,
        message: &NewMessage,
    ) -> SupabaseResult<Message> {
        let mut url = self.rest_url("messages")?;
        url.query_pairs_mut().append_pair("select", MESSAGE_COLUMNS);

        let body = MessageInsert {
            conversation_id: conversation.as_str(),
            sender_id: message.sender_id.as_str(),
            sender_name: &message.sender_name,
            text: &message.text,
        };

        debug!(conversation = %conversation, "Inserting message");

        let rows: Vec<MessageRow> = self.post_returning(url, &body).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or(SupabaseStoreError::EmptyResponse("messages"))?;

        debug!(conversation = %conversation, message_id = %row.id, "Message inserted");
        Ok(row.into())
    }

    /// Newest `limit` messages, ascending.
    pub async fn latest_messages(
        &self,
        conversation: &ConversationId,
        limit: usize,
    ) -> SupabaseResult<Vec<Message>> {
        let rows: Vec<MessageRow> = self.get(self.latest_url(conversation, limit)?).await?;
        Ok(ascending(rows))
    }

    /// Up to `limit` messages strictly older than `cursor`, ascending.
    pub async fn messages_before(
        &self,
        conversation: &ConversationId,
        cursor: DateTime<Utc>,
        limit: usize,
    ) -> SupabaseResult<Vec<Message>> {
        let url = self.before_url(conversation, cursor, limit)?;
        let rows: Vec<MessageRow> = self.get(url).await?;
        Ok(ascending(rows))
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub async fn list_users(&self) -> SupabaseResult<Vec<UserProfile>> {
        let mut url = self.rest_url("users")?;
        url.query_pairs_mut().append_pair("select", "id,name,email");

        let rows: Vec<UserRow> = self.get(url).await?;
        Ok(rows
            .into_iter()
            .map(|row| UserProfile {
                id: ParticipantId(row.id),
                name: row.name,
                email: row.email,
            })
            .collect())
    }

    /// Insert or merge a user by id.
    pub async fn upsert_user(&self, user: &UserProfile) -> SupabaseResult<()> {
        let mut url = self.rest_url("users")?;
        url.query_pairs_mut().append_pair("on_conflict", "id");

        let body = UserRow {
            id: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
        };

        debug!(user_id = %user.id, "Syncing user");

        let response = self
            .authorized(self.http_client.post(url))
            .header("Content-Type", "application/json")
            .header("Prefer", "resolution=merge-duplicates")
            .json(&body)
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }

    // =========================================================================
    // HTTP helpers
    // =========================================================================

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let token = self
            .access_token
            .as_deref()
            .unwrap_or(&self.publishable_key);
        request
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {token}"))
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> SupabaseResult<T> {
        let response = self.authorized(self.http_client.get(url)).send().await?;
        let response = check_response(response).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// POST that asks the backend to echo the inserted rows.
    async fn post_returning<B, T>(&self, url: Url, body: &B) -> SupabaseResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .authorized(self.http_client.post(url))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        let response = check_response(response).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Check HTTP response for errors.
async fn check_response(response: reqwest::Response) -> SupabaseResult<reqwest::Response> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        error!("Supabase request failed: {} - {}", status, body);
        return Err(SupabaseStoreError::Supabase {
            status,
            message: body,
        });
    }
    Ok(response)
}

fn ascending(rows: Vec<MessageRow>) -> Vec<Message> {
    let mut messages: Vec<Message> = rows.into_iter().map(Message::from).collect();
    messages.reverse();
    messages
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("api_url", &self.api_url.as_str())
            .finish_non_exhaustive()
    }
}
