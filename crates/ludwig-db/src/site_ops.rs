//! Site settings (§6 reserved keys), site-wide stats, admin list, and the
//! cached [`SiteDetail`] snapshot assembly.

use ludwig_types::{HomePageType, RegistrationMode, UserId};
use rand::RngCore as _;
use redb_bincode::{ReadTransaction, ReadableTable as _};

use crate::error::DbResult;
use crate::tables::site::setting_keys as keys;
use crate::tables::{settings, site_stats, SiteDetail, SiteStatsRecord};
use crate::{now, DbError, Database, DbEvent, WritePriority, WriteTransactionCtx};

const BINCODE_CONFIG: bincode::config::Configuration = bincode::config::standard();

fn encode_setting<T: bincode::Encode>(value: &T) -> Vec<u8> {
    bincode::encode_to_vec(value, BINCODE_CONFIG).expect("setting values always encode")
}

fn decode_setting<T: bincode::Decode<()>>(bytes: &[u8]) -> DbResult<T> {
    bincode::decode_from_slice(bytes, BINCODE_CONFIG)
        .map(|(v, _)| v)
        .map_err(|_| DbError::corrupt("setting payload"))
}

/// Typed accessors over the string-keyed `settings` table (§6). Every
/// reserved key has exactly one Rust type it is ever encoded as; callers are
/// expected to know it (spec: "values are stored as their natural bincode
/// encoding of whatever type the setting holds").
pub(crate) fn get_setting<T: bincode::Decode<()>>(
    table: &impl settings::ReadableTable,
    key: &str,
) -> DbResult<Option<T>> {
    match table.get(&key.to_string())? {
        Some(guard) => Ok(Some(decode_setting(&guard.value())?)),
        None => Ok(None),
    }
}

pub(crate) fn set_setting<T: bincode::Encode>(
    table: &mut settings::Table,
    key: &str,
    value: &T,
) -> DbResult<()> {
    table.insert(&key.to_string(), &encode_setting(value))?;
    Ok(())
}

/// Parameters accepted by [`Database::create_site`]; optional fields fall
/// back to the instance defaults a fresh Ludwig install ships with.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub name: String,
    pub description: Option<String>,
    pub base_url: String,
    pub post_max_length: u32,
    pub home_page_type: HomePageType,
    pub votes_enabled: bool,
    pub downvotes_enabled: bool,
    pub cws_enabled: bool,
    pub board_creation_admin_only: bool,
    pub registration_mode: RegistrationMode,
    pub infinite_scroll_enabled: bool,
    pub javascript_enabled: bool,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "Ludwig".to_string(),
            description: None,
            base_url: "http://localhost".to_string(),
            post_max_length: 100_000,
            home_page_type: HomePageType::Local,
            votes_enabled: true,
            downvotes_enabled: true,
            cws_enabled: true,
            board_creation_admin_only: false,
            registration_mode: RegistrationMode::Open,
            infinite_scroll_enabled: true,
            javascript_enabled: true,
        }
    }
}

/// Allocates the next id from the single monotonic counter stored under
/// `next_id` (§3: "ids are never reused", "the monotonic id counter never
/// regresses"). Every `create_*` operation calls this exactly once.
pub(crate) fn allocate_id_tx(settings_t: &mut settings::Table) -> DbResult<u64> {
    let current = get_setting::<u64>(settings_t, keys::NEXT_ID)?
        .ok_or_else(|| DbError::invariant("next_id not initialized; call create_site first"))?;
    let next = current
        .checked_add(1)
        .ok_or(DbError::Overflow)?;
    set_setting(settings_t, keys::NEXT_ID, &next)?;
    Ok(current)
}

impl Database {
    /// One-time instance bootstrap: generates the hash seed and JWT secret,
    /// writes every reserved setting (§6), and seeds an empty `SiteStats`.
    /// Idempotent guard: fails with `Conflict` if `next_id` already exists,
    /// since that would mean the site was already created.
    pub async fn create_site(&self, config: SiteConfig) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let mut settings_t = tx.open_table(&settings::TABLE)?;
            if get_setting::<u64>(&settings_t, keys::NEXT_ID)?.is_some() {
                return Err(DbError::conflict("site already created"));
            }

            let mut hash_seed = [0u8; 16];
            rand::rng().fill_bytes(&mut hash_seed);
            let mut jwt_secret = [0u8; 32];
            rand::rng().fill_bytes(&mut jwt_secret);

            set_setting(&mut settings_t, keys::NEXT_ID, &ludwig_types::ID_MIN_USER)?;
            set_setting(&mut settings_t, keys::HASH_SEED, &hash_seed.to_vec())?;
            set_setting(&mut settings_t, keys::JWT_SECRET, &jwt_secret.to_vec())?;
            set_setting(&mut settings_t, keys::NAME, &config.name)?;
            set_setting(&mut settings_t, keys::DESCRIPTION, &config.description)?;
            set_setting(&mut settings_t, keys::BASE_URL, &config.base_url)?;
            set_setting(&mut settings_t, keys::POST_MAX_LENGTH, &(config.post_max_length as u64))?;
            set_setting(&mut settings_t, keys::HOME_PAGE_TYPE, &(config.home_page_type as u64))?;
            set_setting(&mut settings_t, keys::VOTES_ENABLED, &config.votes_enabled)?;
            set_setting(&mut settings_t, keys::DOWNVOTES_ENABLED, &config.downvotes_enabled)?;
            set_setting(&mut settings_t, keys::CWS_ENABLED, &config.cws_enabled)?;
            set_setting(
                &mut settings_t,
                keys::BOARD_CREATION_ADMIN_ONLY,
                &config.board_creation_admin_only,
            )?;
            let (reg_enabled, reg_app, reg_invite) = match config.registration_mode {
                RegistrationMode::Open => (true, false, false),
                RegistrationMode::RequireApplication => (true, true, false),
                RegistrationMode::RequireInvite => (true, false, true),
                RegistrationMode::Closed => (false, false, false),
            };
            set_setting(&mut settings_t, keys::REGISTRATION_ENABLED, &reg_enabled)?;
            set_setting(&mut settings_t, keys::REGISTRATION_APPLICATION_REQUIRED, &reg_app)?;
            set_setting(&mut settings_t, keys::REGISTRATION_INVITE_REQUIRED, &reg_invite)?;
            set_setting(&mut settings_t, keys::INVITE_ADMIN_ONLY, &true)?;
            set_setting(&mut settings_t, keys::SETUP_DONE, &false)?;
            set_setting(&mut settings_t, keys::ADMINS, &Vec::<u64>::new())?;
            set_setting(&mut settings_t, keys::CREATED_AT, &now())?;
            set_setting(&mut settings_t, keys::INFINITE_SCROLL_ENABLED, &config.infinite_scroll_enabled)?;
            set_setting(&mut settings_t, keys::JAVASCRIPT_ENABLED, &config.javascript_enabled)?;

            drop(settings_t);
            let mut stats_t = tx.open_table(&site_stats::TABLE)?;
            stats_t.insert(&(), &SiteStatsRecord::default())?;
            drop(stats_t);

            tx.emit(DbEvent::SiteUpdate);
            Ok(())
        })
        .await?;

        if let Some(detail) = self.read_with(Self::read_site_detail_tx).await? {
            self.refresh_site_detail_cache(detail);
        }
        Ok(())
    }

    /// Marks initial setup complete (S1: "set setup_done=1").
    pub async fn mark_setup_done(&self) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let mut settings_t = tx.open_table(&settings::TABLE)?;
            set_setting(&mut settings_t, keys::SETUP_DONE, &true)?;
            tx.emit(DbEvent::SiteUpdate);
            Ok(())
        })
        .await?;
        if let Some(detail) = self.read_with(Self::read_site_detail_tx).await? {
            self.refresh_site_detail_cache(detail);
        }
        Ok(())
    }

    pub(crate) fn read_site_detail_tx(tx: &ReadTransaction) -> DbResult<Option<SiteDetail>> {
        let settings_t = tx.open_table(&settings::TABLE)?;
        let Some(name) = get_setting::<String>(&settings_t, keys::NAME)? else {
            return Ok(None);
        };
        let description = get_setting::<Option<String>>(&settings_t, keys::DESCRIPTION)?.flatten();
        let base_url = get_setting::<String>(&settings_t, keys::BASE_URL)?.unwrap_or_default();
        let votes_enabled = get_setting::<bool>(&settings_t, keys::VOTES_ENABLED)?.unwrap_or(true);
        let downvotes_enabled =
            get_setting::<bool>(&settings_t, keys::DOWNVOTES_ENABLED)?.unwrap_or(true);
        let cws_enabled = get_setting::<bool>(&settings_t, keys::CWS_ENABLED)?.unwrap_or(true);
        let board_creation_admin_only =
            get_setting::<bool>(&settings_t, keys::BOARD_CREATION_ADMIN_ONLY)?.unwrap_or(false);
        let registration_enabled =
            get_setting::<bool>(&settings_t, keys::REGISTRATION_ENABLED)?.unwrap_or(true);
        let setup_done = get_setting::<bool>(&settings_t, keys::SETUP_DONE)?.unwrap_or(false);

        let stats_t = tx.open_table(&site_stats::TABLE)?;
        let stats = stats_t.get(&())?.map(|g| g.value()).unwrap_or_default();

        Ok(Some(SiteDetail {
            name,
            description,
            base_url,
            votes_enabled,
            downvotes_enabled,
            cws_enabled,
            board_creation_admin_only,
            registration_enabled,
            setup_done,
            stats,
        }))
    }

    pub async fn get_site_stats(&self) -> DbResult<SiteStatsRecord> {
        self.read_with(|tx| {
            let stats_t = tx.open_table(&site_stats::TABLE)?;
            Ok(stats_t.get(&())?.map(|g| g.value()).unwrap_or_default())
        })
        .await
    }

    pub(crate) fn update_site_stats_tx(
        tx: &WriteTransactionCtx,
        f: impl FnOnce(&mut SiteStatsRecord),
    ) -> DbResult<()> {
        let mut stats_t = tx.open_table(&site_stats::TABLE)?;
        let mut stats = stats_t.get(&())?.map(|g| g.value()).unwrap_or_default();
        f(&mut stats);
        stats_t.insert(&(), &stats)?;
        Ok(())
    }

    pub async fn get_admins(&self) -> DbResult<Vec<UserId>> {
        self.read_with(|tx| {
            let settings_t = tx.open_table(&settings::TABLE)?;
            let ids = get_setting::<Vec<u64>>(&settings_t, keys::ADMINS)?.unwrap_or_default();
            Ok(ids.into_iter().map(UserId::new).collect())
        })
        .await
    }

    pub async fn set_admin(&self, user: UserId, is_admin: bool) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let mut settings_t = tx.open_table(&settings::TABLE)?;
            let mut ids = get_setting::<Vec<u64>>(&settings_t, keys::ADMINS)?.unwrap_or_default();
            if is_admin {
                if !ids.contains(&user.get()) {
                    ids.push(user.get());
                }
            } else {
                ids.retain(|&id| id != user.get());
            }
            set_setting(&mut settings_t, keys::ADMINS, &ids)?;
            drop(settings_t);
            crate::user_ops::set_local_user_admin_flag_tx(tx, user, is_admin)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn create_site_is_idempotent_guard() {
        let db = Database::new_in_memory().await.unwrap();
        db.create_site(SiteConfig::default()).await.unwrap();
        let err = db.create_site(SiteConfig::default()).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn registration_mode_derives_expected_flags() {
        let db = Database::new_in_memory().await.unwrap();
        db.create_site(SiteConfig {
            registration_mode: RegistrationMode::RequireInvite,
            ..SiteConfig::default()
        })
        .await
        .unwrap();

        let settings_t = db
            .read_with(|tx| {
                let t = tx.open_table(&settings::TABLE)?;
                Ok((
                    get_setting::<bool>(&t, keys::REGISTRATION_ENABLED)?.unwrap(),
                    get_setting::<bool>(&t, keys::REGISTRATION_APPLICATION_REQUIRED)?.unwrap(),
                    get_setting::<bool>(&t, keys::REGISTRATION_INVITE_REQUIRED)?.unwrap(),
                ))
            })
            .await
            .unwrap();
        assert_eq!(settings_t, (true, false, true));
    }

    /// §8 S1: create the site, mark setup done, confirm the cached
    /// [`SiteDetail`] snapshot reflects it without a direct table read.
    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn setup_flow_updates_cached_site_detail() {
        let db = Database::new_in_memory().await.unwrap();
        db.create_site(SiteConfig::default()).await.unwrap();
        assert!(!db.site_detail().unwrap().setup_done);

        db.mark_setup_done().await.unwrap();
        assert!(db.site_detail().unwrap().setup_done);
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn set_admin_toggles_membership_and_local_user_flag() {
        let db = Database::new_in_memory().await.unwrap();
        db.create_site(SiteConfig::default()).await.unwrap();
        let alice = db
            .create_local_user()
            .name("alice".to_string())
            .password("Passw0rd!".to_string())
            .call()
            .await
            .unwrap();

        assert!(db.get_admins().await.unwrap().is_empty());
        db.set_admin(alice, true).await.unwrap();
        assert_eq!(db.get_admins().await.unwrap(), vec![alice]);
        assert!(db.get_local_user(alice).await.unwrap().unwrap().admin);

        db.set_admin(alice, false).await.unwrap();
        assert!(db.get_admins().await.unwrap().is_empty());
        assert!(!db.get_local_user(alice).await.unwrap().unwrap().admin);
    }
}
