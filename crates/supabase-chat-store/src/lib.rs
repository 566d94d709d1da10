//! # Supabase Chat Store
//!
//! Message store and user directory on a hosted Supabase project, talking to
//! its PostgREST endpoint with `reqwest`.
//!
//! - [`client`] - REST calls for the `messages` and `users` tables
//! - [`store`] - `MessageStore` / `UserDirectory` implementations and the
//!   polling tail
//! - [`error`] - Error types

pub mod client;
pub mod error;
pub mod store;

pub use client::SupabaseClient;
pub use error::{SupabaseResult, SupabaseStoreError};
pub use store::{SupabaseChatStore, TailPoller, DEFAULT_POLL_INTERVAL};
