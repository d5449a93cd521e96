//! SQLite persona repository implementation.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use kindred_core::repository::persona::PersonaRepository;
use kindred_types::error::RepositoryError;
use kindred_types::persona::{NewPersona, Persona, PersonaTimings, ProactiveBehavior};

use super::pool::DatabasePool;
use super::{DELETE_ORPHAN_MESSAGES, format_datetime, parse_datetime, parse_uuid, query_error};

/// SQLite-backed implementation of `PersonaRepository`.
pub struct SqlitePersonaRepository {
    pool: DatabasePool,
}

impl SqlitePersonaRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct PersonaRow {
    id: String,
    owner_id: String,
    name: String,
    model: String,
    personality_prompt: String,
    parameters: String,
    timings: String,
    proactive_behavior: String,
    created_at: String,
    updated_at: String,
}

impl PersonaRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            name: row.try_get("name")?,
            model: row.try_get("model")?,
            personality_prompt: row.try_get("personality_prompt")?,
            parameters: row.try_get("parameters")?,
            timings: row.try_get("timings")?,
            proactive_behavior: row.try_get("proactive_behavior")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_persona(self) -> Result<Persona, RepositoryError> {
        let parameters = serde_json::from_str(&self.parameters)
            .map_err(|e| RepositoryError::Query(format!("invalid parameters: {e}")))?;
        let timings: PersonaTimings = serde_json::from_str(&self.timings)
            .map_err(|e| RepositoryError::Query(format!("invalid timings: {e}")))?;
        let proactive_behavior: ProactiveBehavior = self
            .proactive_behavior
            .parse()
            .map_err(RepositoryError::Query)?;

        Ok(Persona {
            id: parse_uuid(&self.id, "persona id")?,
            owner_id: self.owner_id,
            name: self.name,
            model: self.model,
            personality_prompt: self.personality_prompt,
            parameters,
            timings,
            proactive_behavior,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(e.to_string()))
}

fn decode(row: Option<sqlx::sqlite::SqliteRow>) -> Result<Option<Persona>, RepositoryError> {
    row.map(|row| PersonaRow::from_row(&row).map_err(query_error)?.into_persona())
        .transpose()
}

const INSERT_PERSONA: &str = r#"INSERT INTO personas
    (id, owner_id, name, model, personality_prompt, parameters, timings, proactive_behavior, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#;

impl SqlitePersonaRepository {
    async fn insert(&self, persona: &Persona, upsert: bool) -> Result<u64, sqlx::Error> {
        let sql = if upsert {
            format!("{INSERT_PERSONA} ON CONFLICT(owner_id, name) DO NOTHING")
        } else {
            INSERT_PERSONA.to_string()
        };
        let parameters = serde_json::to_string(&persona.parameters)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let timings =
            serde_json::to_string(&persona.timings).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        let result = sqlx::query(&sql)
            .bind(persona.id.to_string())
            .bind(&persona.owner_id)
            .bind(&persona.name)
            .bind(&persona.model)
            .bind(&persona.personality_prompt)
            .bind(parameters)
            .bind(timings)
            .bind(persona.proactive_behavior.to_string())
            .bind(format_datetime(&persona.created_at))
            .bind(format_datetime(&persona.updated_at))
            .execute(&self.pool.writer)
            .await?;
        Ok(result.rows_affected())
    }
}

impl PersonaRepository for SqlitePersonaRepository {
    async fn ensure_persona(
        &self,
        owner_id: &str,
        defaults: &NewPersona,
        now: DateTime<Utc>,
    ) -> Result<Persona, RepositoryError> {
        let candidate = defaults.clone().into_persona(owner_id, now);
        self.insert(&candidate, true).await.map_err(query_error)?;

        // Read back through the writer so a just-inserted row is always visible.
        let row = sqlx::query("SELECT * FROM personas WHERE owner_id = ? AND name = ?")
            .bind(owner_id)
            .bind(&defaults.name)
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(query_error)?;
        decode(row)?.ok_or(RepositoryError::NotFound)
    }

    async fn create_persona(&self, persona: &Persona) -> Result<Persona, RepositoryError> {
        match self.insert(persona, false).await {
            Ok(_) => Ok(persona.clone()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                RepositoryError::Conflict(format!("persona '{}' already exists", persona.name)),
            ),
            Err(e) => Err(query_error(e)),
        }
    }

    async fn get_persona(
        &self,
        persona_id: &Uuid,
        owner_id: &str,
    ) -> Result<Option<Persona>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM personas WHERE id = ? AND owner_id = ?")
            .bind(persona_id.to_string())
            .bind(owner_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;
        decode(row)
    }

    async fn get_persona_by_id(&self, persona_id: &Uuid) -> Result<Option<Persona>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM personas WHERE id = ?")
            .bind(persona_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;
        decode(row)
    }

    async fn list_personas(&self, owner_id: &str) -> Result<Vec<Persona>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM personas WHERE owner_id = ? ORDER BY name ASC")
            .bind(owner_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let mut personas = Vec::with_capacity(rows.len());
        for row in &rows {
            personas.push(PersonaRow::from_row(row).map_err(query_error)?.into_persona()?);
        }
        Ok(personas)
    }

    async fn update_persona(&self, persona: &Persona) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE personas
               SET name = ?, model = ?, personality_prompt = ?, parameters = ?, timings = ?,
                   proactive_behavior = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&persona.name)
        .bind(&persona.model)
        .bind(&persona.personality_prompt)
        .bind(to_json(&persona.parameters)?)
        .bind(to_json(&persona.timings)?)
        .bind(persona.proactive_behavior.to_string())
        .bind(format_datetime(&persona.updated_at))
        .bind(persona.id.to_string())
        .execute(&self.pool.writer)
        .await;

        let result = match result {
            Ok(result) => result,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(RepositoryError::Conflict(format!(
                    "persona '{}' already exists",
                    persona.name
                )));
            }
            Err(e) => return Err(query_error(e)),
        };

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete_persona(&self, persona_id: &Uuid, owner_id: &str) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        // Sessions and their memberships go with the persona via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM personas WHERE id = ? AND owner_id = ?")
            .bind(persona_id.to_string())
            .bind(owner_id)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        if result.rows_affected() > 0 {
            sqlx::query(DELETE_ORPHAN_MESSAGES)
                .execute(&mut *tx)
                .await
                .map_err(query_error)?;
        }

        tx.commit().await.map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::tests::test_pool;

    fn luna() -> NewPersona {
        serde_json::from_value(serde_json::json!({
            "name": "luna",
            "model": "gpt-4o",
            "personality_prompt": "You are curious.",
            "parameters": {"temperature": 0.9},
            "timings": {"inactivity_threshold_minutes": 15},
            "proactive_behavior": "aggressive"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_persona() {
        let repo = SqlitePersonaRepository::new(test_pool().await);
        let persona = luna().into_persona("alice", Utc::now());
        repo.create_persona(&persona).await.unwrap();

        let found = repo.get_persona(&persona.id, "alice").await.unwrap().unwrap();
        assert_eq!(found.name, "luna");
        assert_eq!(found.personality_prompt, "You are curious.");
        assert_eq!(found.parameters["temperature"], 0.9);
        assert_eq!(found.timings.inactivity_threshold(), 15);
        assert_eq!(found.proactive_behavior, ProactiveBehavior::Aggressive);
        assert_eq!(found.created_at, persona.created_at);

        assert!(repo.get_persona(&persona.id, "bob").await.unwrap().is_none());
        assert!(repo.get_persona_by_id(&persona.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let repo = SqlitePersonaRepository::new(test_pool().await);
        repo.create_persona(&luna().into_persona("alice", Utc::now()))
            .await
            .unwrap();
        let err = repo
            .create_persona(&luna().into_persona("alice", Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        // Same name for another owner is fine.
        repo.create_persona(&luna().into_persona("bob", Utc::now()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ensure_persona_is_idempotent() {
        let repo = SqlitePersonaRepository::new(test_pool().await);
        let defaults = NewPersona::default_for("gpt-4o");
        let first = repo.ensure_persona("alice", &defaults, Utc::now()).await.unwrap();
        let second = repo.ensure_persona("alice", &defaults, Utc::now()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(repo.list_personas("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = SqlitePersonaRepository::new(test_pool().await);
        let mut persona = luna().into_persona("alice", Utc::now());
        repo.create_persona(&persona).await.unwrap();

        persona.personality_prompt = "You are calm.".to_string();
        repo.update_persona(&persona).await.unwrap();
        let found = repo.get_persona_by_id(&persona.id).await.unwrap().unwrap();
        assert_eq!(found.personality_prompt, "You are calm.");

        assert!(!repo.delete_persona(&persona.id, "bob").await.unwrap());
        assert!(repo.delete_persona(&persona.id, "alice").await.unwrap());
        assert!(repo.get_persona_by_id(&persona.id).await.unwrap().is_none());

        let missing = luna().into_persona("alice", Utc::now());
        assert!(matches!(
            repo.update_persona(&missing).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_rename_onto_taken_name_conflicts() {
        let repo = SqlitePersonaRepository::new(test_pool().await);
        repo.create_persona(&luna().into_persona("alice", Utc::now()))
            .await
            .unwrap();
        let mut other = NewPersona::default_for("gpt-4o").into_persona("alice", Utc::now());
        repo.create_persona(&other).await.unwrap();

        other.name = "luna".to_string();
        assert!(matches!(
            repo.update_persona(&other).await,
            Err(RepositoryError::Conflict(_))
        ));
    }
}
