//! Session create/get/delete (§3, §5 "every Nth session creation also
//! sweeps expired sessions in the same transaction").

use ludwig_types::{SessionId, Timestamp, UserId};
use rand::RngCore as _;
use redb_bincode::ReadableTable as _;

use crate::error::DbResult;
use crate::tables::{sessions, SessionRecord};
use crate::{now, Database, WritePriority};

#[bon::bon]
impl Database {
    /// Creates a login session (§8 S1's "log in, get a session"). The id is
    /// a cryptographically random 64-bit value, not allocated from the
    /// monotonic entity-id counter (§3).
    #[builder]
    pub async fn create_session(
        &self,
        user: UserId,
        client_ip: String,
        user_agent: String,
        #[builder(default = false)] remember: bool,
        ttl_secs: u64,
    ) -> DbResult<SessionId> {
        let sweep = self.should_sweep_sessions();
        self.write_with(WritePriority::UserInitiated, |tx| {
            let created_at = now();
            let id = loop {
                let candidate = SessionId::new(rand::rng().next_u64());
                let t = tx.open_table(&sessions::TABLE)?;
                if t.get(&candidate)?.is_none() {
                    break candidate;
                }
            };

            let record = SessionRecord {
                user,
                client_ip,
                user_agent,
                created_at,
                expires_at: created_at.saturating_add_secs(ttl_secs),
                remember,
            };
            tx.open_table(&sessions::TABLE)?.insert(&id, &record)?;

            if sweep {
                sweep_expired_sessions_tx(tx, created_at)?;
            }
            Ok(id)
        })
        .await
    }

    pub async fn get_session(&self, id: SessionId) -> DbResult<Option<SessionRecord>> {
        self.read_with(|tx| {
            let t = tx.open_table(&sessions::TABLE)?;
            Ok(t.get(&id)?.map(|g| g.value()))
        })
        .await
    }

    /// `None` if the session does not exist or has expired (expired sessions
    /// are treated as already deleted by every caller-facing accessor, even
    /// before the next sweep physically removes the row).
    pub async fn get_live_session(&self, id: SessionId) -> DbResult<Option<SessionRecord>> {
        let now = now();
        self.read_with(move |tx| {
            let t = tx.open_table(&sessions::TABLE)?;
            Ok(t.get(&id)?
                .map(|g| g.value())
                .filter(|s| !s.is_expired(now)))
        })
        .await
    }

    pub async fn delete_session(&self, id: SessionId) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            tx.open_table(&sessions::TABLE)?.remove(&id)?;
            Ok(())
        })
        .await
    }
}

/// Full-table scan removing every session whose `expires_at` has passed.
/// There is no `sessions_by_expiry` index (§4.3 does not list one for
/// sessions), so the sweep cost is linear in the live session count; this is
/// why it only runs every Nth session creation rather than every time.
fn sweep_expired_sessions_tx(
    tx: &crate::WriteTransactionCtx,
    now: Timestamp,
) -> DbResult<()> {
    let expired: Vec<SessionId> = {
        let t = tx.open_table(&sessions::TABLE)?;
        t.range(..)?
            .filter_map(|entry| match entry {
                Ok((k, v)) if v.value().is_expired(now) => Some(Ok(k.value())),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
            .collect::<Result<_, _>>()?
    };
    let mut t = tx.open_table(&sessions::TABLE)?;
    for id in expired {
        t.remove(&id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site_ops::SiteConfig;

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn create_and_fetch_session() {
        let db = Database::new_in_memory().await.unwrap();
        db.create_site(SiteConfig::default()).await.unwrap();
        let alice = db
            .create_local_user()
            .name("alice".to_string())
            .password("Passw0rd!".to_string())
            .call()
            .await
            .unwrap();

        let session = db
            .create_session()
            .user(alice)
            .client_ip("127.0.0.1".to_string())
            .user_agent("test".to_string())
            .ttl_secs(3600)
            .call()
            .await
            .unwrap();

        let record = db.get_session(session).await.unwrap().unwrap();
        assert_eq!(record.user, alice);
        assert!(!record.is_expired(now()));
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn live_session_hides_expired_rows() {
        let db = Database::new_in_memory().await.unwrap();
        db.create_site(SiteConfig::default()).await.unwrap();
        let alice = db
            .create_local_user()
            .name("alice".to_string())
            .password("Passw0rd!".to_string())
            .call()
            .await
            .unwrap();

        let session = db
            .create_session()
            .user(alice)
            .client_ip("127.0.0.1".to_string())
            .user_agent("test".to_string())
            .ttl_secs(0)
            .call()
            .await
            .unwrap();

        assert!(db.get_live_session(session).await.unwrap().is_none());
        assert!(db.get_session(session).await.unwrap().is_some());
    }

    /// §8 S1: create the site, create admin alice, mark setup done, log in
    /// as alice, and open a session -- regular and "remembered" logins get
    /// the two TTLs the scenario names (1 day, 1 month).
    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn s1_setup_and_login_grants_expected_session_ttls() {
        use ludwig_types::{SESSION_TTL_DEFAULT_SECS, SESSION_TTL_REMEMBER_SECS};

        let db = Database::new_in_memory().await.unwrap();
        db.create_site(SiteConfig::default()).await.unwrap();
        let alice = db
            .create_local_user()
            .name("alice".to_string())
            .password("Passw0rd!".to_string())
            .call()
            .await
            .unwrap();
        db.set_admin(alice, true).await.unwrap();
        db.mark_setup_done().await.unwrap();
        assert!(db.site_detail().unwrap().setup_done);

        let logged_in = db
            .verify_local_login("alice", "Passw0rd!")
            .await
            .unwrap()
            .expect("correct credentials");
        assert_eq!(logged_in, alice);

        let plain = db
            .create_session()
            .user(alice)
            .client_ip("127.0.0.1".to_string())
            .user_agent("test".to_string())
            .ttl_secs(SESSION_TTL_DEFAULT_SECS)
            .call()
            .await
            .unwrap();
        let remembered = db
            .create_session()
            .user(alice)
            .client_ip("127.0.0.1".to_string())
            .user_agent("test".to_string())
            .remember(true)
            .ttl_secs(SESSION_TTL_REMEMBER_SECS)
            .call()
            .await
            .unwrap();

        let plain_record = db.get_session(plain).await.unwrap().unwrap();
        let remembered_record = db.get_session(remembered).await.unwrap().unwrap();
        assert_eq!(
            plain_record.expires_at.as_secs() - plain_record.created_at.as_secs(),
            SESSION_TTL_DEFAULT_SECS
        );
        assert_eq!(
            remembered_record.expires_at.as_secs() - remembered_record.created_at.as_secs(),
            SESSION_TTL_REMEMBER_SECS
        );
        assert!(!plain_record.remember);
        assert!(remembered_record.remember);
    }
}
