//! Database schema definitions

/// SQL statements creating the base tables, executed in order under init
/// pragmas. All statements are idempotent.
pub const CREATE_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS setup (
        key TEXT PRIMARY KEY,
        value TEXT DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        entity TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        article_id INTEGER,
        title TEXT,
        content TEXT,
        content_flate BLOB,
        pow INTEGER DEFAULT 0,
        FOREIGN KEY(article_id) REFERENCES articles(id)
    )",
    "CREATE VIRTUAL TABLE IF NOT EXISTS article_search USING fts5(title)",
    "CREATE VIRTUAL TABLE IF NOT EXISTS section_search USING fts5(title, content)",
    "CREATE VIRTUAL TABLE IF NOT EXISTS article_search_vocab
        USING fts5vocab('article_search', 'row')",
    "CREATE VIRTUAL TABLE IF NOT EXISTS section_search_vocab
        USING fts5vocab('section_search', 'row')",
    "CREATE TABLE IF NOT EXISTS vocabulary (
        term TEXT PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS vectors (
        id INTEGER PRIMARY KEY,
        embedding BLOB
    )",
    "CREATE TABLE IF NOT EXISTS vectors_ann_chunks (
        id INTEGER PRIMARY KEY,
        chunk BLOB
    )",
    "CREATE TABLE IF NOT EXISTS vectors_ann_index (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        vectors_id INTEGER NOT NULL,
        chunk_id INTEGER NOT NULL,
        chunk_position INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_vectors_ann_index_chunk_id_position
        ON vectors_ann_index (chunk_id, chunk_position)",
    "CREATE INDEX IF NOT EXISTS idx_sections_article_id ON sections(article_id)",
];

/// Pragmas for schema creation and bulk loading
pub const PRAGMA_INIT: &[&str] = &[
    "PRAGMA synchronous = OFF",
    "PRAGMA journal_mode = OFF",
    "PRAGMA foreign_keys = OFF",
    "PRAGMA cache_size = -10000",
    "PRAGMA mmap_size = 268435456",
    "PRAGMA temp_store = MEMORY",
];

/// Pragmas for serving queries
pub const PRAGMA_READ: &[&str] = &["PRAGMA locking_mode = NORMAL", "PRAGMA query_only = ON"];

/// Pragmas for imports and index building
pub const PRAGMA_IMPORT: &[&str] = &["PRAGMA locking_mode = EXCLUSIVE", "PRAGMA query_only = OFF"];
