//! Persistence collaborator consumed by the router and the REST read-side.
//!
//! The trait is synchronous like rusqlite itself. Async callers go through
//! `tokio::task::spawn_blocking` with a cloned `Arc<dyn ChatStore>`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::MutexGuard;

use super::models::{
    normalize_pair, ChatId, ChatRoom, ChatSummary, Contact, Message, User, UserId,
};
use super::DbPool;
use crate::error::StoreError;

pub trait ChatStore: Send + Sync {
    /// Return the chat for the unordered pair `{a, b}`, creating it on first use.
    /// Calling it again with the same pair, in either order, yields the same chat.
    fn find_or_create_chat(&self, a: UserId, b: UserId) -> Result<ChatRoom, StoreError>;

    fn save_message(
        &self,
        chat_id: ChatId,
        sender_id: UserId,
        text: &str,
        seen: bool,
        sent_at: DateTime<Utc>,
    ) -> Result<Message, StoreError>;

    fn get_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Seed a user row. Registration flows live outside this server.
    fn insert_user(&self, username: &str) -> Result<User, StoreError>;

    fn get_chat(&self, chat_id: ChatId) -> Result<Option<ChatRoom>, StoreError>;

    fn get_user_chats(&self, user_id: UserId) -> Result<Vec<ChatSummary>, StoreError>;

    fn get_chat_messages(&self, chat_id: ChatId) -> Result<Vec<Message>, StoreError>;

    /// Flip `seen` to true on every message in the chat not sent by `reader`.
    /// Returns how many rows changed.
    fn mark_chat_seen(&self, chat_id: ChatId, reader: UserId) -> Result<usize, StoreError>;

    fn touch_last_online(&self, user_id: UserId, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Add `target` to `owner`'s contact list. Each pair is stored once.
    fn add_contact(&self, owner: UserId, target: UserId) -> Result<Contact, StoreError>;

    /// The owner's contacts in the order they were added.
    fn get_user_contacts(&self, owner: UserId) -> Result<Vec<Contact>, StoreError>;
}

/// SQLite-backed store over the shared connection.
#[derive(Clone)]
pub struct SqliteStore {
    db: DbPool,
}

impl SqliteStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

fn user_exists(conn: &Connection, id: UserId) -> Result<bool, StoreError> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE id = ?1", params![id.0], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<ChatRoom> {
    Ok(ChatRoom {
        id: ChatId(row.get(0)?),
        user_a: UserId(row.get(1)?),
        user_b: UserId(row.get(2)?),
        created_at: row.get(3)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        chat_id: ChatId(row.get(1)?),
        sender_id: UserId(row.get(2)?),
        text: row.get(3)?,
        sent_at: row.get(4)?,
        seen: row.get(5)?,
    })
}

fn contact_from_row(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        last_online: row.get(2)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        last_online: row.get(2)?,
        join_date: row.get(3)?,
    })
}

impl ChatStore for SqliteStore {
    fn find_or_create_chat(&self, a: UserId, b: UserId) -> Result<ChatRoom, StoreError> {
        if a == b {
            return Err(StoreError::SameUser(a));
        }
        let (user_a, user_b) = normalize_pair(a, b);
        let conn = self.conn()?;

        for id in [user_a, user_b] {
            if !user_exists(&conn, id)? {
                return Err(StoreError::UnknownUser(id));
            }
        }

        // UNIQUE(user_a, user_b) makes the insert a no-op for an existing pair
        conn.execute(
            "INSERT OR IGNORE INTO chats (user_a, user_b, created_at) VALUES (?1, ?2, ?3)",
            params![user_a.0, user_b.0, Utc::now()],
        )?;

        let chat = conn.query_row(
            "SELECT id, user_a, user_b, created_at FROM chats WHERE user_a = ?1 AND user_b = ?2",
            params![user_a.0, user_b.0],
            chat_from_row,
        )?;
        Ok(chat)
    }

    fn save_message(
        &self,
        chat_id: ChatId,
        sender_id: UserId,
        text: &str,
        seen: bool,
        sent_at: DateTime<Utc>,
    ) -> Result<Message, StoreError> {
        let conn = self.conn()?;

        let chat: Option<ChatRoom> = conn
            .query_row(
                "SELECT id, user_a, user_b, created_at FROM chats WHERE id = ?1",
                params![chat_id.0],
                chat_from_row,
            )
            .optional()?;
        match chat {
            None => return Err(StoreError::UnknownChat(chat_id)),
            Some(chat) if !chat.includes(sender_id) => {
                return Err(StoreError::UnknownUser(sender_id))
            }
            Some(_) => {}
        }

        conn.execute(
            "INSERT INTO messages (chat_id, sender_id, text, sent_at, is_seen)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![chat_id.0, sender_id.0, text, sent_at, seen],
        )?;

        Ok(Message {
            id: conn.last_insert_rowid(),
            chat_id,
            sender_id,
            text: text.to_string(),
            sent_at,
            seen,
        })
    }

    fn get_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, username, last_online, join_date FROM users WHERE id = ?1",
                params![id.0],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    fn insert_user(&self, username: &str) -> Result<User, StoreError> {
        let conn = self.conn()?;
        let join_date = Utc::now();
        conn.execute(
            "INSERT INTO users (username, join_date) VALUES (?1, ?2)",
            params![username, join_date],
        )?;
        Ok(User {
            id: UserId(conn.last_insert_rowid()),
            username: username.to_string(),
            last_online: None,
            join_date,
        })
    }

    fn get_chat(&self, chat_id: ChatId) -> Result<Option<ChatRoom>, StoreError> {
        let conn = self.conn()?;
        let chat = conn
            .query_row(
                "SELECT id, user_a, user_b, created_at FROM chats WHERE id = ?1",
                params![chat_id.0],
                chat_from_row,
            )
            .optional()?;
        Ok(chat)
    }

    fn get_user_chats(&self, user_id: UserId) -> Result<Vec<ChatSummary>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, u.id, u.username
             FROM chats c
             JOIN users u ON u.id = CASE WHEN c.user_a = ?1 THEN c.user_b ELSE c.user_a END
             WHERE c.user_a = ?1 OR c.user_b = ?1
             ORDER BY c.id ASC",
        )?;
        let chats = stmt
            .query_map(params![user_id.0], |row| {
                Ok(ChatSummary {
                    id: ChatId(row.get(0)?),
                    target_user_id: UserId(row.get(1)?),
                    target_username: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(chats)
    }

    fn get_chat_messages(&self, chat_id: ChatId) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, sender_id, text, sent_at, is_seen
             FROM messages WHERE chat_id = ?1
             ORDER BY id ASC",
        )?;
        let messages = stmt
            .query_map(params![chat_id.0], message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    fn mark_chat_seen(&self, chat_id: ChatId, reader: UserId) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE messages SET is_seen = 1
             WHERE chat_id = ?1 AND sender_id != ?2 AND is_seen = 0",
            params![chat_id.0, reader.0],
        )?;
        Ok(updated)
    }

    fn touch_last_online(&self, user_id: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE users SET last_online = ?1 WHERE id = ?2",
            params![at, user_id.0],
        )?;
        if updated == 0 {
            return Err(StoreError::UnknownUser(user_id));
        }
        Ok(())
    }

    fn add_contact(&self, owner: UserId, target: UserId) -> Result<Contact, StoreError> {
        if owner == target {
            return Err(StoreError::SameUser(owner));
        }
        let conn = self.conn()?;

        if !user_exists(&conn, owner)? {
            return Err(StoreError::UnknownUser(owner));
        }
        let contact = conn
            .query_row(
                "SELECT id, username, last_online FROM users WHERE id = ?1",
                params![target.0],
                contact_from_row,
            )
            .optional()?
            .ok_or(StoreError::UnknownUser(target))?;

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO contacts (owner_id, target_user_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![owner.0, target.0, Utc::now()],
        )?;
        if inserted == 0 {
            return Err(StoreError::DuplicateContact(target));
        }
        Ok(contact)
    }

    fn get_user_contacts(&self, owner: UserId) -> Result<Vec<Contact>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT u.id, u.username, u.last_online
             FROM contacts c
             JOIN users u ON u.id = c.target_user_id
             WHERE c.owner_id = ?1
             ORDER BY c.id ASC",
        )?;
        let contacts = stmt
            .query_map(params![owner.0], contact_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(contacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_db;

    fn store() -> SqliteStore {
        SqliteStore::new(init_memory_db().unwrap())
    }

    #[test]
    fn test_find_or_create_chat_is_idempotent_on_unordered_pair() {
        let store = store();
        let alice = store.insert_user("alice").unwrap();
        let bob = store.insert_user("bob").unwrap();

        let first = store.find_or_create_chat(alice.id, bob.id).unwrap();
        let second = store.find_or_create_chat(bob.id, alice.id).unwrap();
        let third = store.find_or_create_chat(alice.id, bob.id).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.id, third.id);
        assert!(first.user_a < first.user_b);
    }

    #[test]
    fn test_find_or_create_chat_rejects_unknown_user() {
        let store = store();
        let alice = store.insert_user("alice").unwrap();
        let err = store.find_or_create_chat(alice.id, UserId(999)).unwrap_err();
        assert!(matches!(err, StoreError::UnknownUser(UserId(999))));
    }

    #[test]
    fn test_find_or_create_chat_rejects_same_user() {
        let store = store();
        let alice = store.insert_user("alice").unwrap();
        let err = store.find_or_create_chat(alice.id, alice.id).unwrap_err();
        assert!(matches!(err, StoreError::SameUser(_)));
    }

    #[test]
    fn test_save_message_persists_unseen() {
        let store = store();
        let alice = store.insert_user("alice").unwrap();
        let bob = store.insert_user("bob").unwrap();
        let chat = store.find_or_create_chat(alice.id, bob.id).unwrap();

        let saved = store
            .save_message(chat.id, alice.id, "hi", false, Utc::now())
            .unwrap();
        assert!(!saved.seen);

        let messages = store.get_chat_messages(chat.id).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "hi");
        assert_eq!(messages[0].sender_id, alice.id);
        assert!(!messages[0].seen);
    }

    #[test]
    fn test_save_message_to_missing_chat_fails() {
        let store = store();
        let alice = store.insert_user("alice").unwrap();
        let err = store
            .save_message(ChatId(41), alice.id, "hi", false, Utc::now())
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownChat(ChatId(41))));
    }

    #[test]
    fn test_mark_chat_seen_only_touches_peer_messages_once() {
        let store = store();
        let alice = store.insert_user("alice").unwrap();
        let bob = store.insert_user("bob").unwrap();
        let chat = store.find_or_create_chat(alice.id, bob.id).unwrap();
        store.save_message(chat.id, alice.id, "one", false, Utc::now()).unwrap();
        store.save_message(chat.id, alice.id, "two", false, Utc::now()).unwrap();
        store.save_message(chat.id, bob.id, "three", false, Utc::now()).unwrap();

        assert_eq!(store.mark_chat_seen(chat.id, bob.id).unwrap(), 2);
        assert_eq!(store.mark_chat_seen(chat.id, bob.id).unwrap(), 0);

        let messages = store.get_chat_messages(chat.id).unwrap();
        let bobs = messages.iter().find(|m| m.sender_id == bob.id).unwrap();
        assert!(!bobs.seen);
        assert_eq!(messages.iter().filter(|m| m.seen).count(), 2);
    }

    #[test]
    fn test_get_user_chats_reports_the_other_participant() {
        let store = store();
        let alice = store.insert_user("alice").unwrap();
        let bob = store.insert_user("bob").unwrap();
        let carol = store.insert_user("carol").unwrap();
        store.find_or_create_chat(alice.id, bob.id).unwrap();
        store.find_or_create_chat(carol.id, alice.id).unwrap();

        let chats = store.get_user_chats(alice.id).unwrap();
        let peers: Vec<_> = chats.iter().map(|c| c.target_username.as_str()).collect();
        assert_eq!(peers, vec!["bob", "carol"]);

        let bobs = store.get_user_chats(bob.id).unwrap();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].target_user_id, alice.id);
    }

    #[test]
    fn test_touch_last_online() {
        let store = store();
        let alice = store.insert_user("alice").unwrap();
        assert!(alice.last_online.is_none());

        let now = Utc::now();
        store.touch_last_online(alice.id, now).unwrap();
        let reloaded = store.get_user_by_id(alice.id).unwrap().unwrap();
        assert!(reloaded.last_online.is_some());

        assert!(store.touch_last_online(UserId(77), now).is_err());
    }

    #[test]
    fn test_add_contact_rejects_unknown_and_duplicate_targets() {
        let store = store();
        let alice = store.insert_user("alice").unwrap();
        let bob = store.insert_user("bob").unwrap();

        let contact = store.add_contact(alice.id, bob.id).unwrap();
        assert_eq!(contact.id, bob.id);
        assert_eq!(contact.username, "bob");

        assert!(matches!(
            store.add_contact(alice.id, bob.id),
            Err(StoreError::DuplicateContact(id)) if id == bob.id
        ));
        assert!(matches!(
            store.add_contact(alice.id, UserId(404)),
            Err(StoreError::UnknownUser(UserId(404)))
        ));
        assert!(matches!(
            store.add_contact(alice.id, alice.id),
            Err(StoreError::SameUser(_))
        ));
    }

    #[test]
    fn test_contacts_are_one_directional_and_carry_last_online() {
        let store = store();
        let alice = store.insert_user("alice").unwrap();
        let bob = store.insert_user("bob").unwrap();
        let carol = store.insert_user("carol").unwrap();
        store.add_contact(alice.id, carol.id).unwrap();
        store.add_contact(alice.id, bob.id).unwrap();
        store.touch_last_online(bob.id, Utc::now()).unwrap();

        let contacts = store.get_user_contacts(alice.id).unwrap();
        let names: Vec<_> = contacts.iter().map(|c| c.username.as_str()).collect();
        assert_eq!(names, vec!["carol", "bob"]);
        assert!(contacts[0].last_online.is_none());
        assert!(contacts[1].last_online.is_some());

        assert!(store.get_user_contacts(bob.id).unwrap().is_empty());
        // Adding the reverse direction is a separate contact
        store.add_contact(bob.id, alice.id).unwrap();
    }

    #[test]
    fn test_duplicate_username_is_rejected() {
        let store = store();
        store.insert_user("alice").unwrap();
        assert!(matches!(
            store.insert_user("alice"),
            Err(StoreError::Sqlite(_))
        ));
    }
}
