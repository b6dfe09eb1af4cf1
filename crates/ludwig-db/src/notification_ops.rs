//! Notification create/get/delete (§3, §4.2). No dedicated sort index is
//! defined for notifications (§4.3 does not list one); listing a user's
//! notifications is a bounded full-table scan, acceptable since
//! notification volume per instance is small relative to posts.

use ludwig_types::{NotificationId, NotificationType, UserId};
use rand::RngCore as _;
use redb_bincode::ReadableTable as _;

use crate::error::DbResult;
use crate::tables::{notifications, NotificationRecord};
use crate::{now, DbEvent, Database, WritePriority};

impl Database {
    pub async fn create_notification(
        &self,
        user: UserId,
        kind: NotificationType,
        subject: u64,
    ) -> DbResult<NotificationId> {
        self.write_with(WritePriority::Background, |tx| {
            let id = loop {
                let candidate = NotificationId::new(rand::rng().next_u64());
                let t = tx.open_table(&notifications::TABLE)?;
                if t.get(&candidate)?.is_none() {
                    break candidate;
                }
            };
            let record = NotificationRecord {
                user,
                created_at: now(),
                read_at: None,
                kind,
                subject,
            };
            tx.open_table(&notifications::TABLE)?.insert(&id, &record)?;
            tx.emit(DbEvent::Notification(id));
            Ok(id)
        })
        .await
    }

    pub async fn get_notification(&self, id: NotificationId) -> DbResult<Option<NotificationRecord>> {
        self.read_with(|tx| {
            let t = tx.open_table(&notifications::TABLE)?;
            Ok(t.get(&id)?.map(|g| g.value()))
        })
        .await
    }

    pub async fn list_notifications_for_user(
        &self,
        user: UserId,
    ) -> DbResult<Vec<(NotificationId, NotificationRecord)>> {
        self.read_with(|tx| {
            let t = tx.open_table(&notifications::TABLE)?;
            let mut out = vec![];
            for entry in t.range(..)? {
                let (k, v) = entry?;
                let record = v.value();
                if record.user == user {
                    out.push((k.value(), record));
                }
            }
            out.sort_by_key(|(_, r)| std::cmp::Reverse(r.created_at));
            Ok(out)
        })
        .await
    }

    pub async fn mark_notification_read(&self, id: NotificationId) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let mut t = tx.open_table(&notifications::TABLE)?;
            if let Some(mut record) = t.get(&id)?.map(|g| g.value()) {
                record.read_at = Some(now());
                t.insert(&id, &record)?;
            }
            Ok(())
        })
        .await
    }

    pub async fn delete_notification(&self, id: NotificationId) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            tx.open_table(&notifications::TABLE)?.remove(&id)?;
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
    async fn create_and_list_notifications_newest_first() {
        let db = Database::new_in_memory().await.unwrap();
        db.create_site(SiteConfig::default()).await.unwrap();
        let alice = db
            .create_local_user()
            .name("alice".to_string())
            .password("Passw0rd!".to_string())
            .call()
            .await
            .unwrap();

        db.create_notification(alice, NotificationType::ReplyToThread, 1)
            .await
            .unwrap();
        db.create_notification(alice, NotificationType::ReplyToComment, 2)
            .await
            .unwrap();

        let list = db.list_notifications_for_user(alice).await.unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|(_, r)| r.read_at.is_none()));
    }
}
