//! PostgreSQL [`Store`] implementation.
//!
//! Raw SQL over a shared [`PgPool`]. Uniqueness is enforced by database
//! indexes (`(client_id, resource_owner_id)` and the hashed grant code);
//! the authorization upsert and the client-scope narrowing cascade each run
//! as a single atomic statement or transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::crypto::{self, Keys};
use crate::models::{
    Authorization, Client, ClientType, Grant, GrantType, NewClient, NewGrant,
};
use crate::scope::ScopeSet;
use crate::store::{Store, StoreError};

/// Production storage backend.
pub struct PgStore {
    pool: PgPool,
    keys: Keys,
}

impl PgStore {
    pub fn new(pool: PgPool, keys: Keys) -> Self {
        Self { pool, keys }
    }
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore").finish()
    }
}

#[derive(sqlx::FromRow)]
struct ClientRow {
    id: Uuid,
    name: String,
    description: String,
    secret: Vec<u8>,
    redirect_uris: Vec<String>,
    scope: Vec<String>,
    grant_types: Vec<String>,
    client_type: String,
    owner_id: Uuid,
    created: DateTime<Utc>,
    changed: DateTime<Utc>,
}

impl ClientRow {
    fn into_client(self, keys: &Keys) -> Result<Client, StoreError> {
        let secret = keys.open_client_secret(&self.secret)?;
        let client_type =
            ClientType::parse(&self.client_type).ok_or(StoreError::Corrupt("client_type"))?;
        let grant_types = self
            .grant_types
            .iter()
            .map(|g| GrantType::parse(g).ok_or(StoreError::Corrupt("grant_types")))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Client {
            id: self.id,
            name: self.name,
            description: self.description,
            secret,
            redirect_uris: self.redirect_uris,
            scope: ScopeSet::from(self.scope),
            grant_types,
            client_type,
            owner_id: self.owner_id,
            created: self.created,
            changed: self.changed,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AuthorizationRow {
    id: Uuid,
    client_id: Uuid,
    resource_owner_id: Uuid,
    scope: Vec<String>,
    created: DateTime<Utc>,
    changed: DateTime<Utc>,
}

impl From<AuthorizationRow> for Authorization {
    fn from(row: AuthorizationRow) -> Self {
        Authorization {
            id: row.id,
            client_id: row.client_id,
            resource_owner_id: row.resource_owner_id,
            scope: ScopeSet::from(row.scope),
            created: row.created,
            changed: row.changed,
        }
    }
}

/// Grant joined with its parent authorization, authorization columns aliased.
#[derive(sqlx::FromRow)]
struct GrantWithAuthorizationRow {
    id: Uuid,
    authorization_id: Uuid,
    resource_owner_id: Uuid,
    grant_type: String,
    redirect_uri: String,
    redirect_uri_specified: bool,
    code_challenge: Option<Vec<u8>>,
    expires_at: DateTime<Utc>,
    created: DateTime<Utc>,
    a_id: Uuid,
    a_client_id: Uuid,
    a_resource_owner_id: Uuid,
    a_scope: Vec<String>,
    a_created: DateTime<Utc>,
    a_changed: DateTime<Utc>,
}

impl GrantWithAuthorizationRow {
    fn split(self, keys: &Keys) -> Result<(Grant, Authorization), StoreError> {
        let grant_type =
            GrantType::parse(&self.grant_type).ok_or(StoreError::Corrupt("grant_type"))?;
        let code_challenge = self
            .code_challenge
            .as_deref()
            .map(|sealed| keys.open_code_challenge(sealed))
            .transpose()?;

        let grant = Grant {
            id: self.id,
            authorization_id: self.authorization_id,
            resource_owner_id: self.resource_owner_id,
            grant_type,
            redirect_uri: self.redirect_uri,
            redirect_uri_specified: self.redirect_uri_specified,
            code_challenge,
            expires_at: self.expires_at,
            created: self.created,
        };
        let authorization = Authorization {
            id: self.a_id,
            client_id: self.a_client_id,
            resource_owner_id: self.a_resource_owner_id,
            scope: ScopeSet::from(self.a_scope),
            created: self.a_created,
            changed: self.a_changed,
        };
        Ok((grant, authorization))
    }
}

/// Translate constraint violations into typed store errors.
fn constraint_error(e: sqlx::Error, relation: &'static str) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::UniqueViolation(relation);
        }
        if db.is_foreign_key_violation() {
            return StoreError::ForeignKeyViolation(relation);
        }
    }
    StoreError::Database(e)
}

const CLIENT_COLUMNS: &str = "id, name, description, secret, redirect_uris, scope, grant_types, \
                              client_type, owner_id, created, changed";

#[async_trait]
impl Store for PgStore {
    async fn get_client(&self, id: Uuid) -> Result<Option<Client>, StoreError> {
        let row = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM oauth2_clients WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_client(&self.keys)).transpose()
    }

    async fn insert_client(&self, new: NewClient) -> Result<Client, StoreError> {
        let id = Uuid::now_v7();
        let secret = crypto::random_urlsafe();
        let sealed = self.keys.seal_client_secret(&secret)?;
        let now = Utc::now();
        let grant_types: Vec<String> =
            new.grant_types.iter().map(|g| g.as_str().to_string()).collect();

        sqlx::query(
            r#"
            INSERT INTO oauth2_clients
                (id, name, description, secret, redirect_uris, scope, grant_types,
                 client_type, owner_id, created, changed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            "#,
        )
        .bind(id)
        .bind(&new.name)
        .bind(&new.description)
        .bind(&sealed)
        .bind(&new.redirect_uris)
        .bind(new.scope.as_slice())
        .bind(&grant_types)
        .bind(new.client_type.as_str())
        .bind(new.owner_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "clients"))?;

        Ok(Client {
            id,
            name: new.name,
            description: new.description,
            secret,
            redirect_uris: new.redirect_uris,
            scope: new.scope,
            grant_types: new.grant_types,
            client_type: new.client_type,
            owner_id: new.owner_id,
            created: now,
            changed: now,
        })
    }

    async fn update_client_scope(
        &self,
        id: Uuid,
        scope: &ScopeSet,
    ) -> Result<Client, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ClientRow>(&format!(
            "UPDATE oauth2_clients SET scope = $2, changed = now() WHERE id = $1 \
             RETURNING {CLIENT_COLUMNS}"
        ))
        .bind(id)
        .bind(scope.as_slice())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::ForeignKeyViolation("client"))?;

        // Intersect every dependent authorization's scope, preserving order.
        sqlx::query(
            r#"
            UPDATE oauth2_authorizations
            SET scope = ARRAY(
                    SELECT t.s
                    FROM unnest(scope) WITH ORDINALITY AS t(s, ord)
                    WHERE t.s = ANY($2)
                    ORDER BY t.ord
                ),
                changed = now()
            WHERE client_id = $1
            "#,
        )
        .bind(id)
        .bind(scope.as_slice())
        .execute(&mut *tx)
        .await?;

        // A consent with no remaining scope is no consent at all.
        sqlx::query(
            "DELETE FROM oauth2_authorizations WHERE client_id = $1 AND cardinality(scope) = 0",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        row.into_client(&self.keys)
    }

    async fn get_authorization(
        &self,
        client_id: Uuid,
        resource_owner_id: Uuid,
    ) -> Result<Option<Authorization>, StoreError> {
        let row = sqlx::query_as::<_, AuthorizationRow>(
            r#"
            SELECT id, client_id, resource_owner_id, scope, created, changed
            FROM oauth2_authorizations
            WHERE client_id = $1 AND resource_owner_id = $2
            "#,
        )
        .bind(client_id)
        .bind(resource_owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Authorization::from))
    }

    async fn upsert_authorization(
        &self,
        client_id: Uuid,
        resource_owner_id: Uuid,
        scope: &ScopeSet,
    ) -> Result<Authorization, StoreError> {
        // The unique (client_id, resource_owner_id) index serializes
        // concurrent upserts; ON CONFLICT turns the loser into the
        // scope-union update within the same statement.
        let row = sqlx::query_as::<_, AuthorizationRow>(
            r#"
            INSERT INTO oauth2_authorizations (id, client_id, resource_owner_id, scope)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (client_id, resource_owner_id) DO UPDATE
            SET scope = ARRAY(
                    SELECT t.s
                    FROM unnest(oauth2_authorizations.scope || EXCLUDED.scope)
                         WITH ORDINALITY AS t(s, ord)
                    GROUP BY t.s
                    ORDER BY min(t.ord)
                ),
                changed = now()
            RETURNING id, client_id, resource_owner_id, scope, created, changed
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(client_id)
        .bind(resource_owner_id)
        .bind(scope.as_slice())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "authorizations"))?;

        Ok(Authorization::from(row))
    }

    async fn delete_authorization(
        &self,
        client_id: Uuid,
        resource_owner_id: Uuid,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM oauth2_authorizations WHERE client_id = $1 AND resource_owner_id = $2",
        )
        .bind(client_id)
        .bind(resource_owner_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_grant_by_code(
        &self,
        code: &str,
    ) -> Result<Option<(Grant, Authorization)>, StoreError> {
        let hash = self.keys.code_hash(code)?;

        let row = sqlx::query_as::<_, GrantWithAuthorizationRow>(
            r#"
            SELECT g.id, g.authorization_id, g.resource_owner_id, g.grant_type,
                   g.redirect_uri, g.redirect_uri_specified, g.code_challenge,
                   g.expires_at, g.created,
                   a.id AS a_id, a.client_id AS a_client_id,
                   a.resource_owner_id AS a_resource_owner_id, a.scope AS a_scope,
                   a.created AS a_created, a.changed AS a_changed
            FROM oauth2_grants g
            JOIN oauth2_authorizations a ON a.id = g.authorization_id
            WHERE g.code_hash = $1 AND g.expires_at > $2
            "#,
        )
        .bind(&hash)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.split(&self.keys)).transpose()
    }

    async fn insert_grant(&self, new: NewGrant) -> Result<Grant, StoreError> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let hash = self.keys.code_hash(&new.code)?;
        let sealed_challenge = new
            .code_challenge
            .as_deref()
            .map(|c| self.keys.seal_code_challenge(c))
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO oauth2_grants
                (id, authorization_id, resource_owner_id, grant_type, code_hash,
                 redirect_uri, redirect_uri_specified, code_challenge, expires_at, created)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(id)
        .bind(new.authorization_id)
        .bind(new.resource_owner_id)
        .bind(GrantType::AuthorizationCode.as_str())
        .bind(&hash)
        .bind(&new.redirect_uri)
        .bind(new.redirect_uri_specified)
        .bind(&sealed_challenge)
        .bind(new.expires_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "grants"))?;

        Ok(Grant {
            id,
            authorization_id: new.authorization_id,
            resource_owner_id: new.resource_owner_id,
            grant_type: GrantType::AuthorizationCode,
            redirect_uri: new.redirect_uri,
            redirect_uri_specified: new.redirect_uri_specified,
            code_challenge: new.code_challenge,
            expires_at: new.expires_at,
            created: now,
        })
    }

    async fn delete_grant(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM oauth2_grants WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_grants(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM oauth2_grants WHERE expires_at <= $1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
