//! User create/set/delete (§4.2, §4.3, §4.4) and local-user authentication
//! (§3's `LocalUser` extension, PBKDF2 hashing in `crate::auth`).

use ludwig_types::{validate_name, InviteId, ModState, UserId};
use redb_bincode::ReadableTable as _;

use crate::auth::{generate_salt, hash_password, verify_password};
use crate::error::DbResult;
use crate::site_ops::{allocate_id_tx, get_setting};
use crate::tables::{
    local_users, local_users_by_email, settings, site::setting_keys, subscribed_boards,
    board_subscribers, user_stats, users, users_by_name, users_most_posts, users_new,
    users_new_posts, LocalUserRecord, UserRecord, UserStatsRecord,
};
use crate::{now, DbError, DbEvent, Database, WritePriority, WriteTransactionCtx};

#[bon::bon]
impl Database {
    /// Registers a local user (§8 S1). Rejects a name already taken,
    /// case-insensitively.
    #[builder]
    pub async fn create_local_user(
        &self,
        name: String,
        password: String,
        #[builder(default)] email: Option<String>,
        #[builder(default)] invite_id: Option<InviteId>,
    ) -> DbResult<UserId> {
        validate_name(&name)?;
        let name_key = name.to_lowercase();
        let email_key = email.as_ref().map(|e| e.to_lowercase());

        let id = self
            .write_with(WritePriority::UserInitiated, |tx| {
                let mut by_name_t = tx.open_table(&users_by_name::TABLE)?;
                if by_name_t.get(&name_key)?.is_some() {
                    return Err(DbError::conflict(format!("user name {name} taken")));
                }
                if let Some(email_key) = &email_key {
                    let mut by_email_t = tx.open_table(&local_users_by_email::TABLE)?;
                    if by_email_t.get(email_key)?.is_some() {
                        return Err(DbError::conflict("email already registered"));
                    }
                    drop(by_email_t);
                }

                let created_at = now();
                let mut settings_t = tx.open_table(&settings::TABLE)?;
                let id = UserId::new(allocate_id_tx(&mut settings_t)?);
                drop(settings_t);

                let record = UserRecord {
                    name: name.clone(),
                    display_name: None,
                    avatar_url: None,
                    banner_url: None,
                    bio: None,
                    bot: false,
                    created_at,
                    federation: None,
                    deleted_at: None,
                    mod_state: None,
                    mod_reason: None,
                };
                tx.open_table(&users::TABLE)?.insert(&id, &record)?;
                by_name_t.insert(&name_key, &id)?;
                drop(by_name_t);

                if let Some(invite_id) = invite_id {
                    Database::accept_invite_tx(tx, invite_id, id)?;
                }

                let settings_t = tx.open_table(&settings::TABLE)?;
                let application_required =
                    get_setting::<bool>(&settings_t, setting_keys::REGISTRATION_APPLICATION_REQUIRED)?
                        .unwrap_or(false);
                drop(settings_t);

                let salt = generate_salt();
                let password_hash = hash_password(&password, &salt);
                let local_record = LocalUserRecord {
                    email: email.clone(),
                    password_hash,
                    password_salt: salt,
                    approved: invite_id.is_some() || !application_required,
                    admin: false,
                    preferences: 0,
                    invite_id,
                };
                tx.open_table(&local_users::TABLE)?.insert(&id, &local_record)?;
                if let Some(email_key) = &email_key {
                    tx.open_table(&local_users_by_email::TABLE)?
                        .insert(email_key, &id)?;
                }

                tx.open_table(&user_stats::TABLE)?
                    .insert(&id, &UserStatsRecord::default())?;
                tx.open_table(&users_new::TABLE)?
                    .insert(&(created_at.as_secs(), id), &())?;
                tx.open_table(&users_new_posts::TABLE)?.insert(&(0u64, id), &())?;
                tx.open_table(&users_most_posts::TABLE)?.insert(&(0u64, id), &())?;

                Database::update_site_stats_tx(tx, |s| s.user_count += 1)?;
                tx.emit(DbEvent::SiteUpdate);
                Ok(id)
            })
            .await?;

        if let Some(detail) = self.read_with(Self::read_site_detail_tx).await? {
            self.refresh_site_detail_cache(detail);
        }
        Ok(id)
    }

    pub async fn get_user(&self, id: UserId) -> DbResult<Option<UserRecord>> {
        self.read_with(|tx| {
            let t = tx.open_table(&users::TABLE)?;
            Ok(t.get(&id)?.map(|g| g.value()))
        })
        .await
    }

    pub async fn get_user_by_name(&self, name: &str) -> DbResult<Option<UserRecord>> {
        let name_key = name.to_lowercase();
        self.read_with(|tx| {
            let by_name_t = tx.open_table(&users_by_name::TABLE)?;
            let Some(id) = by_name_t.get(&name_key)?.map(|g| g.value()) else {
                return Ok(None);
            };
            let users_t = tx.open_table(&users::TABLE)?;
            Ok(users_t.get(&id)?.map(|g| g.value()))
        })
        .await
    }

    pub async fn get_local_user(&self, id: UserId) -> DbResult<Option<LocalUserRecord>> {
        self.read_with(|tx| {
            let t = tx.open_table(&local_users::TABLE)?;
            Ok(t.get(&id)?.map(|g| g.value()))
        })
        .await
    }

    /// Verifies a login attempt by name and password. Returns the user id on
    /// success, `None` on any mismatch (unknown name, wrong password,
    /// deleted account) without distinguishing the reason to the caller.
    pub async fn verify_local_login(&self, name: &str, password: &str) -> DbResult<Option<UserId>> {
        let name_key = name.to_lowercase();
        self.read_with(|tx| {
            let by_name_t = tx.open_table(&users_by_name::TABLE)?;
            let Some(id) = by_name_t.get(&name_key)?.map(|g| g.value()) else {
                return Ok(None);
            };
            let users_t = tx.open_table(&users::TABLE)?;
            let Some(user) = users_t.get(&id)?.map(|g| g.value()) else {
                return Ok(None);
            };
            if user.is_deleted() {
                return Ok(None);
            }
            let local_t = tx.open_table(&local_users::TABLE)?;
            let Some(local) = local_t.get(&id)?.map(|g| g.value()) else {
                return Ok(None);
            };
            if !local.approved {
                return Ok(None);
            }
            if verify_password(password, &local.password_salt, &local.password_hash) {
                Ok(Some(id))
            } else {
                Ok(None)
            }
        })
        .await
    }

    /// Mutates a user's editable profile fields (§3 lifecycle).
    pub async fn set_user(
        &self,
        id: UserId,
        display_name: Option<String>,
        avatar_url: Option<String>,
        banner_url: Option<String>,
        bio: Option<String>,
    ) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let mut users_t = tx.open_table(&users::TABLE)?;
            let mut record = users_t
                .get(&id)?
                .map(|g| g.value())
                .ok_or_else(|| DbError::not_found(format!("user {id}")))?;
            record.display_name = display_name;
            record.avatar_url = avatar_url;
            record.banner_url = banner_url;
            record.bio = bio;
            users_t.insert(&id, &record)?;
            Ok(())
        })
        .await
    }

    pub async fn set_user_mod_state(
        &self,
        id: UserId,
        mod_state: Option<ModState>,
        reason: Option<String>,
    ) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let mut users_t = tx.open_table(&users::TABLE)?;
            let mut record = users_t
                .get(&id)?
                .map(|g| g.value())
                .ok_or_else(|| DbError::not_found(format!("user {id}")))?;
            record.mod_state = mod_state;
            record.mod_reason = reason;
            users_t.insert(&id, &record)?;
            Ok(())
        })
        .await
    }

    /// Tombstones a user (§3 lifecycle, §9 Open Question: "introduce the
    /// tombstone on rewrite; do not replicate the dangling-ref behavior").
    /// The primary record is kept -- with PII cleared and `deleted_at` set --
    /// so that threads/comments authored by this id keep resolving to a
    /// readable (if blanked) author, rather than a dangling id. Subscriptions
    /// and the user's own new/new_posts/most_posts index entries are removed;
    /// authored posts and their stats are left untouched.
    pub async fn delete_user(&self, id: UserId) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let mut users_t = tx.open_table(&users::TABLE)?;
            let Some(mut record) = users_t.get(&id)?.map(|g| g.value()) else {
                return Ok(());
            };
            if record.is_deleted() {
                return Ok(());
            }
            let created_at = record.created_at;

            record.deleted_at = Some(now());
            record.display_name = None;
            record.avatar_url = None;
            record.banner_url = None;
            record.bio = None;
            users_t.insert(&id, &record)?;
            drop(users_t);

            tx.open_table(&users_by_name::TABLE)?
                .remove(&record.name.to_lowercase())?;

            if let Some(local) = tx.open_table(&local_users::TABLE)?.get(&id)?.map(|g| g.value()) {
                if let Some(email) = &local.email {
                    tx.open_table(&local_users_by_email::TABLE)?
                        .remove(&email.to_lowercase())?;
                }
            }

            tx.open_table(&users_new::TABLE)?
                .remove(&(created_at.as_secs(), id))?;

            let stats = tx
                .open_table(&user_stats::TABLE)?
                .get(&id)?
                .map(|g| g.value())
                .unwrap_or_default();
            tx.open_table(&users_new_posts::TABLE)?
                .remove(&(stats.latest_post_time.as_secs(), id))?;
            tx.open_table(&users_most_posts::TABLE)?
                .remove(&(stats.thread_count + stats.comment_count, id))?;

            let subscribed: Vec<ludwig_types::BoardId> = {
                let t = tx.open_table(&subscribed_boards::TABLE)?;
                let lo = (id, ludwig_types::BoardId::new(0));
                let hi = (id, ludwig_types::BoardId::new(u64::MAX));
                t.range(&lo..=&hi)?
                    .map(|entry| entry.map(|(k, _)| k.value().1))
                    .collect::<Result<_, _>>()?
            };
            {
                let mut subs_t = tx.open_table(&subscribed_boards::TABLE)?;
                let mut rev_t = tx.open_table(&board_subscribers::TABLE)?;
                for board in subscribed {
                    subs_t.remove(&(id, board))?;
                    rev_t.remove(&(board, id))?;
                }
            }

            Database::update_site_stats_tx(tx, |s| s.user_count = s.user_count.saturating_sub(1))?;
            tx.emit(DbEvent::SiteUpdate);
            Ok(())
        })
        .await?;

        if let Some(detail) = self.read_with(Self::read_site_detail_tx).await? {
            self.refresh_site_detail_cache(detail);
        }
        Ok(())
    }
}

/// Sets or clears a local user's site-wide admin flag.
pub(crate) fn set_local_user_admin_flag_tx(
    tx: &WriteTransactionCtx,
    id: UserId,
    admin: bool,
) -> DbResult<()> {
    let mut t = tx.open_table(&local_users::TABLE)?;
    let Some(mut record) = t.get(&id)?.map(|g| g.value()) else {
        return Ok(());
    };
    record.admin = admin;
    t.insert(&id, &record)?;
    Ok(())
}

/// Sets a local user's `approved` flag (§8's application-gated registration
/// flow: an account exists but cannot log in until an admin approves it).
pub(crate) fn set_local_user_approved_tx(
    tx: &WriteTransactionCtx,
    id: UserId,
    approved: bool,
) -> DbResult<()> {
    let mut t = tx.open_table(&local_users::TABLE)?;
    let Some(mut record) = t.get(&id)?.map(|g| g.value()) else {
        return Ok(());
    };
    record.approved = approved;
    t.insert(&id, &record)?;
    Ok(())
}

/// Re-inserts a user record dumped by `dump::Database::dump`, preserving its
/// original id rather than allocating a new one from the counter. Used only
/// by restore, which is expected to process records in dependency order into
/// an empty store (so the name-uniqueness checks `create_local_user` performs
/// are unnecessary here).
pub(crate) fn restore_user_tx(tx: &WriteTransactionCtx, id: UserId, record: UserRecord) -> DbResult<()> {
    let name_key = record.name.to_lowercase();
    let created_at = record.created_at;
    tx.open_table(&users::TABLE)?.insert(&id, &record)?;
    tx.open_table(&users_by_name::TABLE)?.insert(&name_key, &id)?;
    tx.open_table(&user_stats::TABLE)?
        .insert(&id, &UserStatsRecord::default())?;
    tx.open_table(&users_new::TABLE)?
        .insert(&(created_at.as_secs(), id), &())?;
    tx.open_table(&users_new_posts::TABLE)?.insert(&(0u64, id), &())?;
    tx.open_table(&users_most_posts::TABLE)?.insert(&(0u64, id), &())?;
    Database::update_site_stats_tx(tx, |s| s.user_count += 1)?;
    Ok(())
}

/// Re-inserts a `LocalUserRecord` dumped alongside its `UserRecord`.
pub(crate) fn restore_local_user_tx(
    tx: &WriteTransactionCtx,
    id: UserId,
    record: LocalUserRecord,
) -> DbResult<()> {
    if let Some(email) = &record.email {
        tx.open_table(&local_users_by_email::TABLE)?
            .insert(&email.to_lowercase(), &id)?;
    }
    tx.open_table(&local_users::TABLE)?.insert(&id, &record)?;
    Ok(())
}

impl Database {
    /// The JWT secret generated at `create_site` time (§6), used by a caller
    /// layer above this crate to sign/verify session tokens.
    pub async fn jwt_secret(&self) -> DbResult<Vec<u8>> {
        self.read_with(|tx| {
            let t = tx.open_table(&settings::TABLE)?;
            get_setting::<Vec<u8>>(&t, setting_keys::JWT_SECRET)?
                .ok_or_else(|| DbError::invariant("jwt_secret missing; call create_site first"))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site_ops::SiteConfig;

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn create_local_user_rejects_duplicate_name_case_insensitively() {
        let db = Database::new_in_memory().await.unwrap();
        db.create_site(SiteConfig::default()).await.unwrap();
        db.create_local_user()
            .name("Alice".to_string())
            .password("Passw0rd!".to_string())
            .call()
            .await
            .unwrap();

        let err = db
            .create_local_user()
            .name("alice".to_string())
            .password("whatever".to_string())
            .call()
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn verify_local_login_accepts_correct_password_only() {
        let db = Database::new_in_memory().await.unwrap();
        db.create_site(SiteConfig::default()).await.unwrap();
        db.create_local_user()
            .name("alice".to_string())
            .password("Passw0rd!".to_string())
            .call()
            .await
            .unwrap();

        assert!(db
            .verify_local_login("alice", "Passw0rd!")
            .await
            .unwrap()
            .is_some());
        assert!(db.verify_local_login("alice", "wrong").await.unwrap().is_none());
        assert!(db.verify_local_login("bob", "whatever").await.unwrap().is_none());
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn delete_user_tombstones_and_frees_name() {
        let db = Database::new_in_memory().await.unwrap();
        db.create_site(SiteConfig::default()).await.unwrap();
        let alice = db
            .create_local_user()
            .name("alice".to_string())
            .password("Passw0rd!".to_string())
            .call()
            .await
            .unwrap();

        db.delete_user(alice).await.unwrap();

        let record = db.get_user(alice).await.unwrap().unwrap();
        assert!(record.is_deleted());
        assert!(db.get_user_by_name("alice").await.unwrap().is_none());

        let bob = db
            .create_local_user()
            .name("alice".to_string())
            .password("Passw0rd!".to_string())
            .call()
            .await
            .unwrap();
        assert_ne!(bob, alice);
    }
}
