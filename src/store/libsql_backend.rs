//! libSQL backend — async `ProfileStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::identity::IdentityId;
use crate::onboarding::model::{NewProfile, ProfilePatch, ProfileRecord, WeeklyCap};
use crate::onboarding::state::OnboardingStep;
use crate::store::migrations;
use crate::store::traits::ProfileStore;

/// Column list shared by every profile SELECT.
const PROFILE_COLUMNS: &str = "identity_id, email, onboarding_step, church_id, weekly_cap, \
                               bank_connected, created_at, updated_at";

/// Maps the stored step to its rank so step writes can be advance-only.
const STEP_RANK_SQL: &str = "CASE onboarding_step WHEN 'cap' THEN 1 WHEN 'bank' THEN 2 \
                             WHEN 'done' THEN 3 ELSE 0 END";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    /// Owns the database; `conn` is only valid while it lives.
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Map a libsql Row to a ProfileRecord.
///
/// Column order matches PROFILE_COLUMNS.
fn row_to_profile(row: &libsql::Row) -> Result<ProfileRecord, libsql::Error> {
    let identity_id: String = row.get(0)?;
    let email: Option<String> = row.get(1).ok();
    let step_str: String = row.get(2)?;
    let church_id: Option<String> = row.get(3).ok();
    let cap_str: Option<String> = row.get(4).ok();
    let bank_connected: i64 = row.get(5).unwrap_or(0);
    let created_str: String = row.get(6)?;
    let updated_str: String = row.get(7)?;

    Ok(ProfileRecord {
        identity_id: IdentityId::from(identity_id),
        email,
        onboarding_step: OnboardingStep::parse_lossy(&step_str),
        church_id,
        weekly_cap: cap_str.as_deref().and_then(WeeklyCap::from_db),
        bank_connected: bank_connected != 0,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

#[async_trait]
impl ProfileStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn get_profile(&self, identity_id: &IdentityId) -> Result<Option<ProfileRecord>, DatabaseError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE identity_id = ?1");
        let mut rows = self
            .conn()
            .query(&sql, params![identity_id.as_str()])
            .await
            .map_err(|e| DatabaseError::Query(format!("get_profile: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_profile(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("get_profile row: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_profile: {e}"))),
        }
    }

    async fn create_profile_if_absent(
        &self,
        identity_id: &IdentityId,
        defaults: &NewProfile,
    ) -> Result<ProfileRecord, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let inserted = self
            .conn()
            .execute(
                "INSERT INTO profiles (identity_id, email, onboarding_step, bank_connected, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?4)
                 ON CONFLICT (identity_id) DO NOTHING",
                libsql::params::Params::Positional(vec![
                    libsql::Value::Text(identity_id.as_str().to_string()),
                    defaults
                        .email
                        .clone()
                        .map_or(libsql::Value::Null, libsql::Value::Text),
                    libsql::Value::Text(OnboardingStep::Church.as_str().to_string()),
                    libsql::Value::Text(now),
                ]),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_profile_if_absent: {e}")))?;

        if inserted > 0 {
            info!(identity_id = %identity_id, "Provisioned profile");
        } else {
            debug!(identity_id = %identity_id, "Profile already exists");
        }

        self.get_profile(identity_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "profile".into(),
                id: identity_id.to_string(),
            })
    }

    async fn update_profile(&self, identity_id: &IdentityId, patch: &ProfilePatch) -> Result<(), DatabaseError> {
        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<libsql::Value> = Vec::new();

        if let Some(step) = patch.advance_to {
            sets.push(format!(
                "onboarding_step = CASE WHEN ({STEP_RANK_SQL}) < ? THEN ? ELSE onboarding_step END"
            ));
            values.push(libsql::Value::Integer(i64::from(step.rank())));
            values.push(libsql::Value::Text(step.as_str().to_string()));
        }
        if let Some(ref church_id) = patch.church_id {
            sets.push("church_id = ?".to_string());
            values.push(libsql::Value::Text(church_id.clone()));
        }
        if let Some(ref cap) = patch.weekly_cap {
            sets.push("weekly_cap = ?".to_string());
            values.push(libsql::Value::Text(cap.to_db()));
        }
        if let Some(connected) = patch.bank_connected {
            sets.push("bank_connected = ?".to_string());
            values.push(libsql::Value::Integer(i64::from(connected)));
        }
        sets.push("updated_at = ?".to_string());
        values.push(libsql::Value::Text(Utc::now().to_rfc3339()));
        values.push(libsql::Value::Text(identity_id.as_str().to_string()));

        let sql = format!("UPDATE profiles SET {} WHERE identity_id = ?", sets.join(", "));
        let changed = self
            .conn()
            .execute(&sql, libsql::params::Params::Positional(values))
            .await
            .map_err(|e| DatabaseError::Query(format!("update_profile: {e}")))?;

        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "profile".into(),
                id: identity_id.to_string(),
            });
        }
        debug!(identity_id = %identity_id, fields = sets.len() - 1, "Profile updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    async fn backend() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    #[tokio::test]
    async fn missing_profile_reads_as_none() {
        let db = backend().await;
        assert!(db.get_profile(&IdentityId::from("nobody")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_defaults_to_church_step() {
        let db = backend().await;
        let id = IdentityId::from("u1");
        let profile = db
            .create_profile_if_absent(&id, &NewProfile { email: Some("a@b.co".into()) })
            .await
            .unwrap();

        assert_eq!(profile.identity_id, id);
        assert_eq!(profile.email.as_deref(), Some("a@b.co"));
        assert_eq!(profile.onboarding_step, OnboardingStep::Church);
        assert!(profile.church_id.is_none());
        assert!(profile.weekly_cap.is_none());
        assert!(!profile.bank_connected);
    }

    #[tokio::test]
    async fn create_keeps_existing_row() {
        let db = backend().await;
        let id = IdentityId::from("u1");
        db.create_profile_if_absent(&id, &NewProfile::default()).await.unwrap();
        db.update_profile(
            &id,
            &ProfilePatch {
                advance_to: Some(OnboardingStep::Bank),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let again = db
            .create_profile_if_absent(&id, &NewProfile { email: Some("late@b.co".into()) })
            .await
            .unwrap();
        assert_eq!(again.onboarding_step, OnboardingStep::Bank);
        assert!(again.email.is_none());
    }

    #[tokio::test]
    async fn update_writes_only_named_fields() {
        let db = backend().await;
        let id = IdentityId::from("u1");
        db.create_profile_if_absent(&id, &NewProfile::default()).await.unwrap();

        db.update_profile(
            &id,
            &ProfilePatch {
                church_id: Some("grace".into()),
                advance_to: Some(OnboardingStep::Cap),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        db.update_profile(
            &id,
            &ProfilePatch {
                weekly_cap: Some(WeeklyCap::Amount(dec!(25))),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let profile = db.get_profile(&id).await.unwrap().unwrap();
        assert_eq!(profile.church_id.as_deref(), Some("grace"));
        assert_eq!(profile.weekly_cap, Some(WeeklyCap::Amount(dec!(25))));
        assert_eq!(profile.onboarding_step, OnboardingStep::Cap);
    }

    #[tokio::test]
    async fn step_writes_are_advance_only() {
        let db = backend().await;
        let id = IdentityId::from("u1");
        db.create_profile_if_absent(&id, &NewProfile::default()).await.unwrap();

        for step in [OnboardingStep::Done, OnboardingStep::Cap, OnboardingStep::Church] {
            db.update_profile(
                &id,
                &ProfilePatch {
                    advance_to: Some(step),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        let profile = db.get_profile(&id).await.unwrap().unwrap();
        assert_eq!(profile.onboarding_step, OnboardingStep::Done);
    }

    #[tokio::test]
    async fn update_missing_row_is_not_found() {
        let db = backend().await;
        let err = db
            .update_profile(
                &IdentityId::from("ghost"),
                &ProfilePatch {
                    bank_connected: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn concurrent_creates_leave_one_row() {
        let db = Arc::new(backend().await);
        let id = IdentityId::from("racer");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = Arc::clone(&db);
                let id = id.clone();
                tokio::spawn(async move { db.create_profile_if_absent(&id, &NewProfile::default()).await })
            })
            .collect();
        for handle in handles {
            let profile = handle.await.unwrap().unwrap();
            assert_eq!(profile.onboarding_step, OnboardingStep::Church);
        }

        let mut rows = db
            .conn()
            .query("SELECT COUNT(*) FROM profiles WHERE identity_id = ?1", params!["racer"])
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn local_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("gate.db");
        let id = IdentityId::from("u1");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.create_profile_if_absent(&id, &NewProfile::default()).await.unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(db.get_profile(&id).await.unwrap().is_some());
    }
}
