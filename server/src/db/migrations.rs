use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses the SQLite user_version pragma for tracking, no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "-- Migration 1: users, chats, messages

CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    last_online TEXT,
    join_date TEXT NOT NULL
);

CREATE TABLE chats (
    id INTEGER PRIMARY KEY,
    user_a INTEGER NOT NULL,
    user_b INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    CHECK (user_a < user_b),
    UNIQUE (user_a, user_b),
    FOREIGN KEY (user_a) REFERENCES users(id),
    FOREIGN KEY (user_b) REFERENCES users(id)
);

CREATE INDEX idx_chats_user_b ON chats(user_b);

CREATE TABLE messages (
    id INTEGER PRIMARY KEY,
    chat_id INTEGER NOT NULL,
    sender_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    sent_at TEXT NOT NULL,
    is_seen INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (chat_id) REFERENCES chats(id),
    FOREIGN KEY (sender_id) REFERENCES users(id)
);

CREATE INDEX idx_messages_chat ON messages(chat_id, sent_at);
",
        ),
        M::up(
            "-- Migration 2: contacts

CREATE TABLE contacts (
    id INTEGER PRIMARY KEY,
    owner_id INTEGER NOT NULL,
    target_user_id INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (owner_id, target_user_id),
    FOREIGN KEY (owner_id) REFERENCES users(id),
    FOREIGN KEY (target_user_id) REFERENCES users(id)
);
",
        ),
    ])
}
