//! Invite create/accept (§3, §8 "invite-gated registration"). Invite ids are
//! random, not allocated from the monotonic entity-id counter, mirroring
//! sessions.

use ludwig_types::{InviteId, UserId};
use rand::RngCore as _;
use redb_bincode::ReadableTable as _;

use crate::error::DbResult;
use crate::tables::{invites, InviteRecord};
use crate::{now, DbError, Database, WritePriority};

impl Database {
    pub async fn create_invite(&self, from_user: UserId, ttl_secs: u64) -> DbResult<InviteId> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let created_at = now();
            let id = loop {
                let candidate = InviteId::new(rand::rng().next_u64());
                let t = tx.open_table(&invites::TABLE)?;
                if t.get(&candidate)?.is_none() {
                    break candidate;
                }
            };
            let record = InviteRecord {
                from_user,
                created_at,
                expires_at: created_at.saturating_add_secs(ttl_secs),
                accepted_at: None,
                to_user: None,
            };
            tx.open_table(&invites::TABLE)?.insert(&id, &record)?;
            Ok(id)
        })
        .await
    }

    pub async fn get_invite(&self, id: InviteId) -> DbResult<Option<InviteRecord>> {
        self.read_with(|tx| {
            let t = tx.open_table(&invites::TABLE)?;
            Ok(t.get(&id)?.map(|g| g.value()))
        })
        .await
    }

    /// Consumes an invite for a newly-registered user. Fails with
    /// `Conflict` if the invite has already been accepted or has expired
    /// (§3 `InviteRecord::is_usable`).
    pub(crate) fn accept_invite_tx(
        tx: &crate::WriteTransactionCtx,
        id: InviteId,
        to_user: UserId,
    ) -> DbResult<()> {
        let now = now();
        let mut t = tx.open_table(&invites::TABLE)?;
        let mut record = t
            .get(&id)?
            .map(|g| g.value())
            .ok_or_else(|| DbError::not_found("invite"))?;
        if !record.is_usable(now) {
            return Err(DbError::conflict("invite is expired or already accepted"));
        }
        record.accepted_at = Some(now);
        record.to_user = Some(to_user);
        t.insert(&id, &record)?;
        Ok(())
    }

    pub async fn delete_invite(&self, id: InviteId) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            tx.open_table(&invites::TABLE)?.remove(&id)?;
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
    async fn invite_cannot_be_accepted_twice() {
        let db = Database::new_in_memory().await.unwrap();
        db.create_site(SiteConfig::default()).await.unwrap();
        let alice = db
            .create_local_user()
            .name("alice".to_string())
            .password("Passw0rd!".to_string())
            .call()
            .await
            .unwrap();
        let bob = db
            .create_local_user()
            .name("bob".to_string())
            .password("Passw0rd!".to_string())
            .call()
            .await
            .unwrap();

        let invite = db.create_invite(alice, 3600).await.unwrap();
        db.write_with(WritePriority::UserInitiated, |tx| {
            Database::accept_invite_tx(tx, invite, bob)
        })
        .await
        .unwrap();

        let err = db
            .write_with(WritePriority::UserInitiated, |tx| {
                Database::accept_invite_tx(tx, invite, bob)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));
    }
}
