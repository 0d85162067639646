//! In-process [`SessionStore`] for tests and single-node demos.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::session::{SessionRecord, SessionStore, SessionType};

#[derive(Default)]
pub struct MemorySessionStore {
    records: RwLock<HashMap<(Uuid, SessionType), SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemorySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySessionStore").finish()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn upsert(&self, record: SessionRecord) -> anyhow::Result<()> {
        self.records
            .write()
            .insert((record.user_id, record.session_type), record);
        Ok(())
    }

    async fn get(
        &self,
        user_id: Uuid,
        session_type: SessionType,
    ) -> anyhow::Result<Option<SessionRecord>> {
        Ok(self.records.read().get(&(user_id, session_type)).cloned())
    }

    async fn delete(&self, user_id: Uuid, session_type: SessionType) -> anyhow::Result<bool> {
        Ok(self
            .records
            .write()
            .remove(&(user_id, session_type))
            .is_some())
    }
}
