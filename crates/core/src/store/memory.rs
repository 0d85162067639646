//! Thread-safe in-memory [`Store`] implementation for tests and demos.
//!
//! Mirrors the Postgres backend's observable behavior: codes are looked up
//! by keyed hash, uniqueness constraints are enforced, and deletes cascade
//! along the client → authorization → grant ownership tree.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::crypto::{self, Keys};
use crate::models::{Authorization, Client, Grant, GrantType, NewClient, NewGrant};
use crate::scope::ScopeSet;
use crate::store::{Store, StoreError};

#[derive(Default)]
struct Inner {
    clients: HashMap<Uuid, Client>,
    authorizations: HashMap<Uuid, Authorization>,
    /// `(client_id, resource_owner_id)` → authorization id.
    authorization_pairs: HashMap<(Uuid, Uuid), Uuid>,
    grants: HashMap<Uuid, Grant>,
    /// hashed code → grant id.
    grant_codes: HashMap<String, Uuid>,
}

/// In-process storage backend.
pub struct MemoryStore {
    keys: Keys,
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new(keys: Keys) -> Self {
        Self {
            keys,
            inner: RwLock::new(Inner::default()),
        }
    }

    fn cascade_delete_authorization(inner: &mut Inner, authorization_id: Uuid) {
        let grant_ids: Vec<Uuid> = inner
            .grants
            .values()
            .filter(|g| g.authorization_id == authorization_id)
            .map(|g| g.id)
            .collect();
        for id in grant_ids {
            inner.grants.remove(&id);
        }
        let Inner {
            grants, grant_codes, ..
        } = inner;
        grant_codes.retain(|_, gid| grants.contains_key(gid));
        inner.authorizations.remove(&authorization_id);
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_client(&self, id: Uuid) -> Result<Option<Client>, StoreError> {
        Ok(self.inner.read().clients.get(&id).cloned())
    }

    async fn insert_client(&self, new: NewClient) -> Result<Client, StoreError> {
        let now = Utc::now();
        let client = Client {
            id: Uuid::now_v7(),
            name: new.name,
            description: new.description,
            secret: crypto::random_urlsafe(),
            redirect_uris: new.redirect_uris,
            scope: new.scope,
            grant_types: new.grant_types,
            client_type: new.client_type,
            owner_id: new.owner_id,
            created: now,
            changed: now,
        };
        self.inner.write().clients.insert(client.id, client.clone());
        Ok(client)
    }

    async fn update_client_scope(
        &self,
        id: Uuid,
        scope: &ScopeSet,
    ) -> Result<Client, StoreError> {
        let mut inner = self.inner.write();

        let client = inner
            .clients
            .get_mut(&id)
            .ok_or(StoreError::ForeignKeyViolation("client"))?;
        client.scope = scope.clone();
        client.changed = Utc::now();
        let updated = client.clone();

        let mut emptied = Vec::new();
        for authorization in inner
            .authorizations
            .values_mut()
            .filter(|a| a.client_id == id)
        {
            authorization.scope = authorization.scope.intersect(scope);
            authorization.changed = Utc::now();
            if authorization.scope.is_empty() {
                emptied.push((authorization.id, authorization.resource_owner_id));
            }
        }
        for (authorization_id, owner) in emptied {
            Self::cascade_delete_authorization(&mut inner, authorization_id);
            inner.authorization_pairs.remove(&(id, owner));
        }

        Ok(updated)
    }

    async fn get_authorization(
        &self,
        client_id: Uuid,
        resource_owner_id: Uuid,
    ) -> Result<Option<Authorization>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .authorization_pairs
            .get(&(client_id, resource_owner_id))
            .and_then(|id| inner.authorizations.get(id))
            .cloned())
    }

    async fn upsert_authorization(
        &self,
        client_id: Uuid,
        resource_owner_id: Uuid,
        scope: &ScopeSet,
    ) -> Result<Authorization, StoreError> {
        let mut inner = self.inner.write();

        if !inner.clients.contains_key(&client_id) {
            return Err(StoreError::ForeignKeyViolation("client"));
        }

        let pair = (client_id, resource_owner_id);
        if let Some(id) = inner.authorization_pairs.get(&pair).copied() {
            let authorization = inner
                .authorizations
                .get_mut(&id)
                .ok_or(StoreError::Corrupt("authorization index"))?;
            authorization.scope = authorization.scope.union(scope);
            authorization.changed = Utc::now();
            return Ok(authorization.clone());
        }

        let now = Utc::now();
        let authorization = Authorization {
            id: Uuid::now_v7(),
            client_id,
            resource_owner_id,
            scope: scope.clone(),
            created: now,
            changed: now,
        };
        inner.authorization_pairs.insert(pair, authorization.id);
        inner
            .authorizations
            .insert(authorization.id, authorization.clone());
        Ok(authorization)
    }

    async fn delete_authorization(
        &self,
        client_id: Uuid,
        resource_owner_id: Uuid,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        let Some(id) = inner
            .authorization_pairs
            .remove(&(client_id, resource_owner_id))
        else {
            return Ok(false);
        };
        Self::cascade_delete_authorization(&mut inner, id);
        Ok(true)
    }

    async fn get_grant_by_code(
        &self,
        code: &str,
    ) -> Result<Option<(Grant, Authorization)>, StoreError> {
        let hash = self.keys.code_hash(code)?;
        let inner = self.inner.read();

        let Some(grant) = inner
            .grant_codes
            .get(&hash)
            .and_then(|id| inner.grants.get(id))
        else {
            return Ok(None);
        };
        if grant.is_expired_at(Utc::now()) {
            return Ok(None);
        }
        let authorization = inner
            .authorizations
            .get(&grant.authorization_id)
            .ok_or(StoreError::Corrupt("grant without authorization"))?;

        Ok(Some((grant.clone(), authorization.clone())))
    }

    async fn insert_grant(&self, new: NewGrant) -> Result<Grant, StoreError> {
        let hash = self.keys.code_hash(&new.code)?;
        let mut inner = self.inner.write();

        if !inner.authorizations.contains_key(&new.authorization_id) {
            return Err(StoreError::ForeignKeyViolation("authorization"));
        }
        if inner.grant_codes.contains_key(&hash) {
            return Err(StoreError::UniqueViolation("grants.code"));
        }

        let grant = Grant {
            id: Uuid::now_v7(),
            authorization_id: new.authorization_id,
            resource_owner_id: new.resource_owner_id,
            grant_type: GrantType::AuthorizationCode,
            redirect_uri: new.redirect_uri,
            redirect_uri_specified: new.redirect_uri_specified,
            code_challenge: new.code_challenge,
            expires_at: new.expires_at,
            created: Utc::now(),
        };
        inner.grant_codes.insert(hash, grant.id);
        inner.grants.insert(grant.id, grant.clone());
        Ok(grant)
    }

    async fn delete_grant(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        let existed = inner.grants.remove(&id).is_some();
        if existed {
            inner.grant_codes.retain(|_, gid| *gid != id);
        }
        Ok(existed)
    }

    async fn delete_expired_grants(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        let before = inner.grants.len();
        let Inner {
            grants, grant_codes, ..
        } = &mut *inner;
        grants.retain(|_, g| !g.is_expired_at(now));
        grant_codes.retain(|_, gid| grants.contains_key(gid));
        Ok((before - inner.grants.len()) as u64)
    }
}
