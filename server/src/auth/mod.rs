pub mod jwt;
pub mod middleware;

use crate::db::models::UserId;
use crate::error::AuthError;

/// Identity collaborator: turns a bearer credential into a user id.
pub trait IdentityResolver: Send + Sync {
    fn resolve_current_user(&self, credential: &str) -> Result<UserId, AuthError>;
}
