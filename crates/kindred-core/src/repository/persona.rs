//! PersonaRepository trait definition.

use chrono::{DateTime, Utc};
use kindred_types::error::RepositoryError;
use kindred_types::persona::{NewPersona, Persona};
use uuid::Uuid;

/// Repository trait for persona persistence.
///
/// `(owner_id, name)` is unique. Implementations live in kindred-infra.
pub trait PersonaRepository: Send + Sync {
    /// Return the owner's persona with `defaults.name`, creating it from
    /// `defaults` if absent.
    ///
    /// Must be an upsert keyed by `(owner_id, name)` so concurrent first
    /// contacts resolve to the same row.
    fn ensure_persona(
        &self,
        owner_id: &str,
        defaults: &NewPersona,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Persona, RepositoryError>> + Send;

    /// Insert a new persona. Returns `RepositoryError::Conflict` on a duplicate name.
    fn create_persona(
        &self,
        persona: &Persona,
    ) -> impl std::future::Future<Output = Result<Persona, RepositoryError>> + Send;

    /// Get a persona by id, scoped to its owner.
    fn get_persona(
        &self,
        persona_id: &Uuid,
        owner_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Persona>, RepositoryError>> + Send;

    /// Get a persona by id regardless of owner (background work only).
    fn get_persona_by_id(
        &self,
        persona_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Persona>, RepositoryError>> + Send;

    /// List an owner's personas, ordered by name.
    fn list_personas(
        &self,
        owner_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Persona>, RepositoryError>> + Send;

    /// Overwrite a persona's mutable fields.
    fn update_persona(
        &self,
        persona: &Persona,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a persona and, by cascade, its sessions. Returns false if none matched.
    fn delete_persona(
        &self,
        persona_id: &Uuid,
        owner_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
