//! Registration-approval applications (§3, §8 "application-gated
//! registration"). Like notifications, there is no secondary index; the
//! admin-facing pending-applications list is a full scan filtered by
//! `approved_at.is_none()`.

use ludwig_types::{ApplicationId, UserId};
use rand::RngCore as _;
use redb_bincode::ReadableTable as _;

use crate::error::DbResult;
use crate::tables::{applications, ApplicationRecord};
use crate::{now, DbError, Database, WritePriority};

impl Database {
    pub async fn create_application(
        &self,
        user: UserId,
        ip: String,
        user_agent: String,
        text: String,
    ) -> DbResult<ApplicationId> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let id = loop {
                let candidate = ApplicationId::new(rand::rng().next_u64());
                let t = tx.open_table(&applications::TABLE)?;
                if t.get(&candidate)?.is_none() {
                    break candidate;
                }
            };
            let record = ApplicationRecord {
                ip,
                user_agent,
                text,
                user,
                created_at: now(),
                approved_at: None,
            };
            tx.open_table(&applications::TABLE)?.insert(&id, &record)?;
            Ok(id)
        })
        .await
    }

    pub async fn get_application(&self, id: ApplicationId) -> DbResult<Option<ApplicationRecord>> {
        self.read_with(|tx| {
            let t = tx.open_table(&applications::TABLE)?;
            Ok(t.get(&id)?.map(|g| g.value()))
        })
        .await
    }

    pub async fn list_pending_applications(&self) -> DbResult<Vec<(ApplicationId, ApplicationRecord)>> {
        self.read_with(|tx| {
            let t = tx.open_table(&applications::TABLE)?;
            let mut out = vec![];
            for entry in t.range(..)? {
                let (k, v) = entry?;
                let record = v.value();
                if record.approved_at.is_none() {
                    out.push((k.value(), record));
                }
            }
            out.sort_by_key(|(_, r)| r.created_at);
            Ok(out)
        })
        .await
    }

    pub async fn approve_application(&self, id: ApplicationId) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let mut t = tx.open_table(&applications::TABLE)?;
            let mut record = t
                .get(&id)?
                .map(|g| g.value())
                .ok_or_else(|| DbError::not_found("application"))?;
            record.approved_at = Some(now());
            let user = record.user;
            t.insert(&id, &record)?;
            drop(t);
            crate::user_ops::set_local_user_approved_tx(tx, user, true)?;
            Ok(())
        })
        .await
    }

    /// Rejects an application, deleting the record and leaving the
    /// applicant's local account unapproved (§9: rejection is out of scope
    /// for cascading into account deletion -- an admin decides separately
    /// whether to also remove the account).
    pub async fn reject_application(&self, id: ApplicationId) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            tx.open_table(&applications::TABLE)?.remove(&id)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site_ops::SiteConfig;

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn approve_application_marks_local_user_approved() {
        let db = Database::new_in_memory().await.unwrap();
        db.create_site(SiteConfig::default()).await.unwrap();
        let alice = db
            .create_local_user()
            .name("alice".to_string())
            .password("Passw0rd!".to_string())
            .call()
            .await
            .unwrap();

        assert!(!db.get_local_user(alice).await.unwrap().unwrap().approved);

        let app = db
            .create_application(alice, "127.0.0.1".to_string(), "test".to_string(), "please".to_string())
            .await
            .unwrap();
        db.approve_application(app).await.unwrap();

        assert!(db.get_local_user(alice).await.unwrap().unwrap().approved);
        assert!(db.list_pending_applications().await.unwrap().is_empty());
    }
}
