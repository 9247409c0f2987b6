pub const SCHEMA: &str = r#"
-- users table
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY NOT NULL,
    display_name TEXT NOT NULL DEFAULT '',
    email TEXT NOT NULL DEFAULT '',
    is_admin INTEGER NOT NULL DEFAULT 0
);

-- tabs table (layout is a JSON array of widget id columns)
CREATE TABLE IF NOT EXISTS tabs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    layout TEXT
);

-- tab_access table (which user sees which tab)
CREATE TABLE IF NOT EXISTS tab_access (
    user_id TEXT NOT NULL,
    tab_id INTEGER NOT NULL REFERENCES tabs(id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, tab_id)
);

CREATE INDEX IF NOT EXISTS idx_tab_access_user ON tab_access(user_id);

-- widgets table
CREATE TABLE IF NOT EXISTS widgets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tab_id INTEGER NOT NULL REFERENCES tabs(id) ON DELETE CASCADE,
    widget_type TEXT NOT NULL,
    config TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_widgets_tab_id ON widgets(tab_id);

-- feeds table
CREATE TABLE IF NOT EXISTS feeds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    next_retrieval TEXT NOT NULL,
    title TEXT
);

-- feed_items table (replaced wholesale on each refresh)
CREATE TABLE IF NOT EXISTS feed_items (
    feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
    guid TEXT NOT NULL,
    title TEXT NOT NULL,
    published TEXT NOT NULL,
    link TEXT NOT NULL,
    PRIMARY KEY (feed_id, guid)
);

CREATE INDEX IF NOT EXISTS idx_feed_items_published ON feed_items(feed_id, published DESC);

-- read_states table (absence means unread)
CREATE TABLE IF NOT EXISTS read_states (
    user_id TEXT NOT NULL,
    feed_id INTEGER NOT NULL,
    guid TEXT NOT NULL,
    read INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, feed_id, guid)
);

-- accounts table
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    provider TEXT NOT NULL,
    account_id TEXT NOT NULL,
    token TEXT NOT NULL,
    UNIQUE(user_id, provider, account_id)
);

-- temporary_codes table (OAuth2 state correlation)
CREATE TABLE IF NOT EXISTS temporary_codes (
    provider TEXT NOT NULL,
    code TEXT NOT NULL,
    user_id TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (provider, code)
);

-- email_items table (cache, versioned by the provider)
CREATE TABLE IF NOT EXISTS email_items (
    account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    guid TEXT NOT NULL,
    title TEXT NOT NULL,
    published TEXT NOT NULL,
    link TEXT NOT NULL,
    sender TEXT NOT NULL,
    snippet TEXT NOT NULL,
    read INTEGER NOT NULL DEFAULT 0,
    version INTEGER NOT NULL,
    PRIMARY KEY (account_id, guid)
);
"#;

pub const SELECT_TAB: &str = "SELECT id, title, layout FROM tabs WHERE id = ?1";

pub const SELECT_WIDGET: &str =
    "SELECT id, widget_type, config FROM widgets WHERE id = ?1 AND tab_id = ?2";

pub const INSERT_FEED_IF_MISSING: &str =
    "INSERT INTO feeds (url, next_retrieval) VALUES (?1, ?2) ON CONFLICT(url) DO NOTHING";

pub const UPSERT_EMAIL_ITEM: &str = r#"INSERT INTO email_items
       (account_id, guid, title, published, link, sender, snippet, read, version)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
       ON CONFLICT(account_id, guid) DO UPDATE SET
           title = excluded.title,
           published = excluded.published,
           link = excluded.link,
           sender = excluded.sender,
           snippet = excluded.snippet,
           read = excluded.read,
           version = excluded.version
       WHERE excluded.version > email_items.version"#;

pub const SELECT_EMAIL_ITEM: &str = r#"SELECT guid, title, published, link, sender, snippet, read
       FROM email_items WHERE account_id = ?1 AND guid = ?2 AND version >= ?3"#;

pub const UPSERT_ACCOUNT: &str = r#"INSERT INTO accounts (user_id, provider, account_id, token)
       VALUES (?1, ?2, ?3, ?4)
       ON CONFLICT(user_id, provider, account_id) DO UPDATE SET token = excluded.token
       RETURNING id"#;
