//! User directory: registration and the contact list.

use async_trait::async_trait;

use crate::store::StoreError;
use crate::types::UserProfile;
use crate::ValidationError;

/// Directory of registered users.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// All registered users, in no particular order.
    async fn list_users(&self) -> Result<Vec<UserProfile>, StoreError>;

    /// Inserts or replaces the profile with the same id.
    async fn save_user(&self, user: UserProfile) -> Result<(), StoreError>;
}

impl UserProfile {
    /// Checks registration data: non-empty id and name, and an email that
    /// contains both `@` and `.`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyParticipant);
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::InvalidProfile("name is empty".into()));
        }
        let email = self.email.trim();
        if !email.contains('@') || !email.contains('.') {
            return Err(ValidationError::InvalidProfile(format!(
                "invalid email address: {email:?}"
            )));
        }
        Ok(())
    }
}

/// The users `current` can start a conversation with.
///
/// Drops `current` itself (matched by id, or by case-insensitive email when
/// the directory holds a duplicate registration) and sorts by name.
pub fn contacts_for(current: &UserProfile, users: Vec<UserProfile>) -> Vec<UserProfile> {
    let email = current.email.trim().to_lowercase();
    let mut contacts: Vec<UserProfile> = users
        .into_iter()
        .filter(|user| {
            user.id != current.id && (email.is_empty() || user.email.trim().to_lowercase() != email)
        })
        .collect();

    contacts.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
    contacts
}
