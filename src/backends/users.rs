//! In-Memory User Directory

use crate::domain::context::RequestContext;
use crate::domain::ports::UserDirectory;
use crate::domain::types::UserRecord;
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// User directory backed by a vector of records
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: RwLock<Vec<UserRecord>>,
}

impl MemoryUserDirectory {
    pub fn new(users: Vec<UserRecord>) -> Self {
        Self {
            users: RwLock::new(users),
        }
    }

    /// Add or replace a user, keyed by ID
    pub async fn upsert(&self, user: UserRecord) {
        let mut users = self.users.write().await;
        users.retain(|u| u.id != user.id);
        users.push(user);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn list_by_id_or_uid(
        &self,
        _ctx: &RequestContext,
        uids: &[String],
        ids: &[i64],
    ) -> Result<Vec<UserRecord>> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .filter(|u| ids.contains(&u.id) || uids.iter().any(|uid| *uid == u.uid))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::user;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_lookup_by_either_key() {
        let directory = MemoryUserDirectory::new(vec![
            user(1, "uid-value"),
            user(2, "uid-value2"),
            user(3, "other"),
        ]);

        let found = assert_ok!(
            directory
                .list_by_id_or_uid(&RequestContext::new(), &["uid-value2".to_string()], &[1])
                .await
        );
        let mut ids: Vec<i64> = found.iter().map(|u| u.id).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let directory = MemoryUserDirectory::default();
        directory.upsert(user(1, "a")).await;
        directory.upsert(user(1, "b")).await;

        let found = assert_ok!(
            directory
                .list_by_id_or_uid(&RequestContext::new(), &[], &[1])
                .await
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].uid, "b");
    }
}
