//! Link card cache, keyed by lowercased url (§3). Populated out-of-band by a
//! caller layer above this crate in response to `DbEvent::ThreadFetchLinkCard`
//! (emitted from `thread_ops::create_thread` when a thread carries a
//! `content_url`); this module only stores and serves the result.

use redb_bincode::ReadableTable as _;

use crate::error::DbResult;
use crate::tables::{link_cards, LinkCardRecord};
use crate::{Database, WritePriority};

impl Database {
    pub async fn get_link_card(&self, url: &str) -> DbResult<Option<LinkCardRecord>> {
        let key = url.to_lowercase();
        self.read_with(move |tx| {
            let t = tx.open_table(&link_cards::TABLE)?;
            Ok(t.get(&key)?.map(|g| g.value()))
        })
        .await
    }

    pub async fn set_link_card(&self, url: &str, card: LinkCardRecord) -> DbResult<()> {
        let key = url.to_lowercase();
        self.write_with(WritePriority::Background, move |tx| {
            tx.open_table(&link_cards::TABLE)?.insert(&key, &card)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn link_card_lookup_is_case_insensitive() {
        let db = Database::new_in_memory().await.unwrap();
        db.set_link_card(
            "HTTPS://Example.com/Article",
            LinkCardRecord {
                title: Some("An Article".to_string()),
                description: None,
                image_url: None,
            },
        )
        .await
        .unwrap();

        let card = db
            .get_link_card("https://example.com/article")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(card.title.as_deref(), Some("An Article"));
    }
}
