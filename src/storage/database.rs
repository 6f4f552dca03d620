//! SQLite store for wikilite
//!
//! A single connection wraps one database file. Schema creation runs under
//! init pragmas (bulk-load friendly); afterwards the store sits in read
//! mode and callers toggle import mode around bulk writes. Every write
//! path is enclosed in a transaction.

use crate::error::{Result, WikiliteError};
use crate::ml::codec::bytes_to_float32;
use crate::storage::schema;
use crate::storage::{
    AnnEntry, Article, NewArticle, PendingSection, Section, SectionText, Settings,
};
use crate::utils::deflate_text;

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::{Duration, Instant};

/// Rows per transaction while compressing or rebuilding FTS tables.
const PROCESS_BATCH_SIZE: usize = 10_000;

/// Hit row from the title FTS index.
#[derive(Debug, Clone)]
pub struct TitleHit {
    pub article_id: i64,
    pub title: String,
    pub entity: String,
    pub relevance: f64,
}

/// Hit row from the content FTS index, joined to its article.
#[derive(Debug, Clone)]
pub struct ContentHit {
    pub section_id: i64,
    pub article_id: i64,
    pub article_title: String,
    pub entity: String,
    pub section_title: String,
    pub text: String,
    pub relevance: f64,
}

/// Article/section metadata for a vector id.
#[derive(Debug, Clone)]
pub struct VectorSectionInfo {
    pub article_id: i64,
    pub article_title: String,
    pub entity: String,
    pub section_title: String,
}

/// Database connection and operations
pub struct Store {
    conn: Connection,
    settings: Settings,
}

impl Store {
    /// Open (or create) the database at `path`, ensure the schema and load
    /// persisted setup values. The store is left in read mode.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::initialize(conn)
    }

    /// Create an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self> {
        Self::pragma(&conn, schema::PRAGMA_INIT)?;

        for statement in schema::CREATE_TABLES {
            conn.execute_batch(statement)?;
        }

        Self::pragma(&conn, schema::PRAGMA_READ)?;

        let settings = Self::load_settings(&conn)?;
        Ok(Self { conn, settings })
    }

    fn pragma(conn: &Connection, pragmas: &[&str]) -> Result<()> {
        for pragma in pragmas {
            conn.execute_batch(pragma)?;
        }
        Ok(())
    }

    /// Switch to exclusive locking for bulk writes.
    pub fn import_mode(&self) -> Result<()> {
        Self::pragma(&self.conn, schema::PRAGMA_IMPORT)
    }

    /// Switch back to shared, query-only operation.
    pub fn read_mode(&self) -> Result<()> {
        Self::pragma(&self.conn, schema::PRAGMA_READ)
    }

    // ============ Setup ============

    pub fn setup_get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM setup WHERE key = ? LIMIT 1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn setup_put(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO setup (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }

    fn load_settings(conn: &Connection) -> Result<Settings> {
        let get = |key: &str| -> Result<String> {
            let value: Option<String> = conn
                .query_row(
                    "SELECT value FROM setup WHERE key = ? LIMIT 1",
                    [key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value.unwrap_or_default())
        };

        Ok(Settings {
            language: get("language")?,
            model: get("model")?,
            ann_mode: get("annMode")?,
            ann_size: get("annSize")?.parse().unwrap_or(0),
            model_prefix_save: get("modelPrefixSave")?,
            model_prefix_search: get("modelPrefixSearch")?,
        })
    }

    /// Setup values as loaded at open (or last reload).
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Re-read setup values after they have been modified.
    pub fn reload_settings(&mut self) -> Result<()> {
        self.settings = Self::load_settings(&self.conn)?;
        Ok(())
    }

    // ============ Articles & sections ============

    /// Insert or replace an article together with all its sections, in one
    /// transaction. Any failure leaves the store unchanged.
    pub fn article_put(&mut self, article: &NewArticle) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT OR REPLACE INTO articles (id, title, entity) VALUES (?, ?, ?)",
            params![article.id, article.title, article.entity],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO sections (article_id, title, content, pow) VALUES (?, ?, ?, ?)",
            )?;
            for section in &article.sections {
                stmt.execute(params![
                    article.id,
                    section.title,
                    section.content,
                    section.pow
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Fetch an article with its sections in insertion order, transparently
    /// decompressing stored content. Fails with `NotFound` when the article
    /// has no sections.
    pub fn article_get(&self, article_id: i64) -> Result<Article> {
        let header: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT title, entity FROM articles WHERE id = ?",
                [article_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (title, entity) = header
            .ok_or_else(|| WikiliteError::NotFound(format!("article {}", article_id)))?;

        let mut stmt = self.conn.prepare(
            "SELECT id, title, content, content_flate, pow
             FROM sections WHERE article_id = ? ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([article_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<Vec<u8>>>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut sections = Vec::new();
        for row in rows {
            let (id, section_title, content, content_flate, pow) = row?;
            let text = SectionText::from_columns(content, content_flate).into_string()?;
            sections.push(Section {
                id,
                title: section_title,
                content: text,
                pow,
            });
        }

        if sections.is_empty() {
            return Err(WikiliteError::NotFound(format!(
                "article {} has no sections",
                article_id
            )));
        }

        Ok(Article {
            id: article_id,
            title,
            entity,
            sections,
        })
    }

    /// Delete duplicate sections (keeping the newest per article/title
    /// pair) and compact the file in place. Vectors and ANN data are left
    /// untouched.
    pub fn optimize(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;

        log::info!("Deleting duplicate sections");
        tx.execute(
            "DELETE FROM sections
             WHERE id NOT IN (
                 SELECT MAX(id)
                 FROM sections
                 GROUP BY article_id, title
             )",
            [],
        )?;

        tx.commit()?;

        log::info!("Running VACUUM");
        self.conn.execute_batch("VACUUM")?;

        Ok(())
    }

    /// Deflate every section whose compressed form is strictly smaller
    /// than the plain text; others are left unchanged.
    pub fn compress(&mut self) -> Result<()> {
        let total: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sections WHERE content IS NOT NULL AND content != ''",
            [],
            |row| row.get(0),
        )?;

        let started = Instant::now();
        let mut last_report = Instant::now();
        let mut processed: usize = 0;
        let mut compressed: usize = 0;
        let mut cursor: i64 = 0;

        loop {
            let batch: Vec<(i64, String)> = {
                let mut stmt = self.conn.prepare(
                    "SELECT id, content FROM sections
                     WHERE id > ? AND content IS NOT NULL AND content != ''
                     ORDER BY id ASC LIMIT ?",
                )?;
                let rows = stmt.query_map(params![cursor, PROCESS_BATCH_SIZE as i64], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })?;
                rows.collect::<std::result::Result<_, _>>()?
            };

            if batch.is_empty() {
                break;
            }

            let tx = self.conn.transaction()?;
            {
                let mut update = tx.prepare(
                    "UPDATE sections SET content_flate = ?, content = NULL WHERE id = ?",
                )?;
                for (id, content) in &batch {
                    cursor = *id;
                    processed += 1;

                    let deflated = deflate_text(content)?;
                    if deflated.len() < content.len() {
                        update.execute(params![deflated, id])?;
                        compressed += 1;
                    }

                    if processed % PROCESS_BATCH_SIZE == 0
                        || last_report.elapsed() > Duration::from_secs(5)
                    {
                        log::info!(
                            "Compression progress: {}/{} sections ({} compressed)",
                            processed,
                            total,
                            compressed
                        );
                        last_report = Instant::now();
                    }
                }
            }
            tx.commit()?;
        }

        log::info!(
            "Compressed {}/{} sections in {:?}",
            compressed,
            processed,
            started.elapsed()
        );
        Ok(())
    }

    // ============ Full-text indexes & vocabulary ============

    /// Rebuild the article title FTS index from the base table.
    pub fn process_titles(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM article_search", [])?;
        tx.execute(
            "INSERT INTO article_search(rowid, title) SELECT id, title FROM articles",
            [],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Rebuild the section FTS index from the base table, inflating
    /// compressed rows on the way.
    pub fn process_contents(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM section_search", [])?;

        {
            let mut select = tx.prepare(
                "SELECT id, title, content, content_flate FROM sections ORDER BY id ASC",
            )?;
            let mut insert =
                tx.prepare("INSERT INTO section_search(rowid, title, content) VALUES (?, ?, ?)")?;

            let rows = select.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<Vec<u8>>>(3)?,
                ))
            })?;

            for row in rows {
                let (id, title, content, content_flate) = row?;
                let text = SectionText::from_columns(content, content_flate).into_string()?;
                insert.execute(params![id, title, text])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Union the term sets of both FTS indexes into the vocabulary table.
    pub fn process_vocabulary(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM vocabulary", [])?;
        tx.execute(
            "INSERT OR IGNORE INTO vocabulary(term) SELECT term FROM article_search_vocab",
            [],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO vocabulary(term) SELECT term FROM section_search_vocab",
            [],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// One page of distinct vocabulary terms.
    pub fn vocabulary_page(&self, offset: usize, limit: usize) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT term FROM vocabulary ORDER BY term LIMIT ? OFFSET ?")?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], |row| row.get(0))?;
        let mut terms = Vec::new();
        for term in rows {
            terms.push(term?);
        }
        Ok(terms)
    }

    // ============ FTS search ============

    /// BM25-ranked title matches, best first.
    pub fn search_title_fts(&self, query: &str, limit: usize) -> Result<Vec<TitleHit>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.id, a.title, a.entity, bm25(article_search) AS relevance
             FROM article_search
             JOIN articles a ON a.id = article_search.rowid
             WHERE article_search MATCH ?
             ORDER BY relevance ASC
             LIMIT ?",
        )?;
        let rows = stmt.query_map(params![query, limit as i64], |row| {
            Ok(TitleHit {
                article_id: row.get(0)?,
                title: row.get(1)?,
                entity: row.get(2)?,
                relevance: row.get(3)?,
            })
        })?;

        let mut hits = Vec::new();
        for hit in rows {
            hits.push(hit?);
        }
        Ok(hits)
    }

    /// BM25-ranked section matches joined to their articles, best first.
    pub fn search_content_fts(&self, query: &str, limit: usize) -> Result<Vec<ContentHit>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, a.id, a.title, a.entity, s.title, s.content, s.content_flate,
                    bm25(section_search) AS relevance
             FROM section_search
             JOIN sections s ON s.id = section_search.rowid
             JOIN articles a ON a.id = s.article_id
             WHERE section_search MATCH ?
             ORDER BY relevance ASC
             LIMIT ?",
        )?;
        let rows = stmt.query_map(params![query, limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<Vec<u8>>>(6)?,
                row.get::<_, f64>(7)?,
            ))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            let (section_id, article_id, article_title, entity, section_title, content, flate, relevance) =
                row?;
            let text = SectionText::from_columns(content, flate).into_string()?;
            hits.push(ContentHit {
                section_id,
                article_id,
                article_title,
                entity,
                section_title,
                text,
                relevance,
            });
        }
        Ok(hits)
    }

    /// Text of the first section of an article, for title-hit previews.
    pub fn first_section_text(&self, article_id: i64) -> Result<Option<(String, String)>> {
        let row: Option<(String, Option<String>, Option<Vec<u8>>)> = self
            .conn
            .query_row(
                "SELECT title, content, content_flate FROM sections
                 WHERE article_id = ? ORDER BY id ASC LIMIT 1",
                [article_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match row {
            Some((title, content, flate)) => {
                let text = SectionText::from_columns(content, flate).into_string()?;
                Ok(Some((title, text)))
            }
            None => Ok(None),
        }
    }

    // ============ Vectors ============

    /// Number of sections still lacking an embedding, excluding `skip` ids.
    pub fn pending_embedding_count(&self, skip: &[i64]) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM sections s WHERE s.id NOT IN (SELECT id FROM vectors){}",
            Self::exclusion_clause(skip)
        );
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// Next batch of sections to embed, joined with their article titles,
    /// in ascending id order.
    pub fn pending_embedding_batch(&self, skip: &[i64], limit: usize) -> Result<Vec<PendingSection>> {
        let sql = format!(
            "SELECT s.id, a.title, s.title, s.content, s.content_flate
             FROM sections s
             JOIN articles a ON a.id = s.article_id
             WHERE s.id NOT IN (SELECT id FROM vectors){}
             ORDER BY s.id ASC
             LIMIT ?",
            Self::exclusion_clause(skip)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<Vec<u8>>>(4)?,
            ))
        })?;

        let mut pending = Vec::new();
        for row in rows {
            let (id, article_title, title, content, flate) = row?;
            let text = SectionText::from_columns(content, flate).into_string()?;
            pending.push(PendingSection {
                id,
                article_title,
                title,
                content: text,
            });
        }
        Ok(pending)
    }

    fn exclusion_clause(skip: &[i64]) -> String {
        if skip.is_empty() {
            String::new()
        } else {
            let ids: Vec<String> = skip.iter().map(|id| id.to_string()).collect();
            format!(" AND s.id NOT IN ({})", ids.join(", "))
        }
    }

    /// Persist one batch of embeddings in a single transaction.
    pub fn insert_vectors(&mut self, vectors: &[(i64, Vec<u8>)]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT OR REPLACE INTO vectors (id, embedding) VALUES (?, ?)")?;
            for (id, blob) in vectors {
                stmt.execute(params![id, blob])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Vectors not yet referenced by any ANN index entry, ascending by id.
    pub fn vectors_without_ann(&self, limit: usize) -> Result<Vec<(i64, Vec<f32>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, embedding FROM vectors
             WHERE id NOT IN (SELECT vectors_id FROM vectors_ann_index)
             ORDER BY id ASC
             LIMIT ?",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut vectors = Vec::new();
        for row in rows {
            let (id, blob) = row?;
            vectors.push((id, bytes_to_float32(&blob)?));
        }
        Ok(vectors)
    }

    /// Highest allocated ANN chunk id, 0 when the index is empty.
    pub fn max_ann_chunk_id(&self) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(MAX(id), 0) FROM vectors_ann_chunks",
            [],
            |row| row.get(0),
        )?)
    }

    /// Write a chunk and its index entries in one transaction, so a crash
    /// between batches leaves a consistent prefix.
    pub fn append_ann_chunk(&mut self, chunk_id: i64, chunk: &[u8], entries: &[AnnEntry]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO vectors_ann_chunks (id, chunk) VALUES (?, ?)",
            params![chunk_id, chunk],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO vectors_ann_index (vectors_id, chunk_id, chunk_position)
                 VALUES (?, ?, ?)",
            )?;
            for entry in entries {
                stmt.execute(params![entry.vectors_id, chunk_id, entry.chunk_position])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Stream every ANN chunk through `visit` without loading them all.
    pub fn for_each_ann_chunk<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(i64, &[u8]) -> Result<()>,
    {
        let mut stmt = self
            .conn
            .prepare("SELECT id, chunk FROM vectors_ann_chunks ORDER BY id ASC")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let chunk_id: i64 = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            visit(chunk_id, &blob)?;
        }
        Ok(())
    }

    /// The chunk slot assigned to a vector id, if any.
    pub fn ann_entry_for(&self, vectors_id: i64) -> Result<Option<(i64, i64)>> {
        let entry = self
            .conn
            .query_row(
                "SELECT chunk_id, chunk_position FROM vectors_ann_index
                 WHERE vectors_id = ? LIMIT 1",
                [vectors_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(entry)
    }

    /// Resolve a chunk slot back to its vector id.
    pub fn ann_resolve(&self, chunk_id: i64, chunk_position: i64) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT vectors_id FROM vectors_ann_index
                 WHERE chunk_id = ? AND chunk_position = ? LIMIT 1",
                params![chunk_id, chunk_position],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Full-precision embedding for a vector id.
    pub fn vector_get(&self, id: i64) -> Result<Option<Vec<f32>>> {
        let blob: Option<Vec<u8>> = self
            .conn
            .query_row("SELECT embedding FROM vectors WHERE id = ?", [id], |row| {
                row.get(0)
            })
            .optional()?;
        match blob {
            Some(blob) => Ok(Some(bytes_to_float32(&blob)?)),
            None => Ok(None),
        }
    }

    /// Stream every stored embedding through `visit` (exhaustive scan path
    /// when no ANN index exists).
    pub fn for_each_vector<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(i64, Vec<f32>) -> Result<()>,
    {
        let mut stmt = self
            .conn
            .prepare("SELECT id, embedding FROM vectors ORDER BY id ASC")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            visit(id, bytes_to_float32(&blob)?)?;
        }
        Ok(())
    }

    pub fn vector_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0))?)
    }

    pub fn ann_chunk_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM vectors_ann_chunks", [], |row| {
                row.get(0)
            })?)
    }

    pub fn ann_entry_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM vectors_ann_index", [], |row| {
                row.get(0)
            })?)
    }

    /// Article and section metadata for a vector id (vector ids are
    /// section ids).
    pub fn vector_section_info(&self, vectors_id: i64) -> Result<Option<VectorSectionInfo>> {
        let info = self
            .conn
            .query_row(
                "SELECT a.id, a.title, a.entity, s.title
                 FROM sections s
                 JOIN articles a ON a.id = s.article_id
                 WHERE s.id = ?",
                [vectors_id],
                |row| {
                    Ok(VectorSectionInfo {
                        article_id: row.get(0)?,
                        article_title: row.get(1)?,
                        entity: row.get(2)?,
                        section_title: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::codec::float32_to_bytes;
    use crate::storage::NewSection;

    fn sample_article(id: i64) -> NewArticle {
        NewArticle {
            id,
            title: format!("Article {}", id),
            entity: format!("Q{}", id),
            sections: vec![
                NewSection {
                    title: String::new(),
                    pow: 0,
                    content: "Prologue text about the subject.".to_string(),
                },
                NewSection {
                    title: "History".to_string(),
                    pow: 2,
                    content: "The subject has a long and storied history.".to_string(),
                },
            ],
        }
    }

    fn open_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.import_mode().unwrap();
        store
    }

    #[test]
    fn test_article_roundtrip() {
        let mut store = open_store();
        store.article_put(&sample_article(1)).unwrap();

        let article = store.article_get(1).unwrap();
        assert_eq!(article.title, "Article 1");
        assert_eq!(article.entity, "Q1");
        assert_eq!(article.sections.len(), 2);
        assert_eq!(article.sections[0].title, "");
        assert_eq!(article.sections[1].title, "History");
        assert!(article.sections[0].id < article.sections[1].id);
    }

    #[test]
    fn test_article_get_not_found() {
        let store = open_store();
        match store.article_get(42) {
            Err(WikiliteError::NotFound(_)) => (),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_setup_roundtrip() {
        let store = open_store();
        assert_eq!(store.setup_get("language").unwrap(), None);
        store.setup_put("language", "en").unwrap();
        store.setup_put("language", "it").unwrap();
        assert_eq!(store.setup_get("language").unwrap(), Some("it".to_string()));
    }

    #[test]
    fn test_settings_reload() {
        let mut store = open_store();
        store.setup_put("model", "all-minilm").unwrap();
        store.setup_put("annMode", "mrl").unwrap();
        store.setup_put("annSize", "128").unwrap();
        store.reload_settings().unwrap();

        assert_eq!(store.settings().model, "all-minilm");
        assert_eq!(store.settings().ann_mode, "mrl");
        assert_eq!(store.settings().ann_size, 128);
    }

    #[test]
    fn test_optimize_deduplicates_sections() {
        let mut store = open_store();
        // Importing the same article twice duplicates its sections.
        store.article_put(&sample_article(1)).unwrap();
        store.article_put(&sample_article(1)).unwrap();

        let before = store.article_get(1).unwrap();
        assert_eq!(before.sections.len(), 4);

        store.optimize().unwrap();

        let after = store.article_get(1).unwrap();
        assert_eq!(after.sections.len(), 2);

        // The newest copy of each (article, title) pair survives.
        let max_before = before.sections.iter().map(|s| s.id).max().unwrap();
        assert!(after.sections.iter().any(|s| s.id == max_before));
    }

    #[test]
    fn test_compress_replaces_only_when_smaller() {
        let mut store = open_store();
        let long_text = "Repetition compresses well. ".repeat(100);
        store
            .article_put(&NewArticle {
                id: 1,
                title: "Long".to_string(),
                entity: "Q1".to_string(),
                sections: vec![
                    NewSection {
                        title: "Body".to_string(),
                        pow: 2,
                        content: long_text.clone(),
                    },
                    NewSection {
                        title: "Stub".to_string(),
                        pow: 2,
                        content: "ab".to_string(),
                    },
                ],
            })
            .unwrap();

        store.compress().unwrap();

        // Reads are unaffected by the storage representation.
        let article = store.article_get(1).unwrap();
        assert_eq!(article.sections[0].content, long_text);
        assert_eq!(article.sections[1].content, "ab");

        let compressed_rows: i64 = store
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sections WHERE content_flate IS NOT NULL AND content IS NULL",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(compressed_rows, 1);
    }

    #[test]
    fn test_title_search() {
        let mut store = open_store();
        store.article_put(&sample_article(1)).unwrap();
        store
            .article_put(&NewArticle {
                id: 2,
                title: "Quantum mechanics".to_string(),
                entity: "Q2".to_string(),
                sections: vec![NewSection {
                    title: String::new(),
                    pow: 0,
                    content: "Physics of the very small.".to_string(),
                }],
            })
            .unwrap();
        store.process_titles().unwrap();

        let hits = store.search_title_fts("quantum", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].article_id, 2);
        assert!(hits[0].relevance < 0.0);

        let preview = store.first_section_text(2).unwrap().unwrap();
        assert_eq!(preview.1, "Physics of the very small.");
    }

    #[test]
    fn test_content_search_survives_compression() {
        let mut store = open_store();
        let body = "The uncertainty principle constrains simultaneous measurement. ".repeat(10);
        store
            .article_put(&NewArticle {
                id: 7,
                title: "Quantum mechanics".to_string(),
                entity: "Q7".to_string(),
                sections: vec![NewSection {
                    title: "Principles".to_string(),
                    pow: 2,
                    content: body.clone(),
                }],
            })
            .unwrap();
        store.process_contents().unwrap();
        store.compress().unwrap();

        let hits = store.search_content_fts("uncertainty", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].article_id, 7);
        assert_eq!(hits[0].section_title, "Principles");
        // Text comes back inflated even though the base row is compressed.
        assert_eq!(hits[0].text, body);
    }

    #[test]
    fn test_vocabulary_union() {
        let mut store = open_store();
        store
            .article_put(&NewArticle {
                id: 1,
                title: "kitten".to_string(),
                entity: "Q1".to_string(),
                sections: vec![NewSection {
                    title: String::new(),
                    pow: 0,
                    content: "sitting bitten".to_string(),
                }],
            })
            .unwrap();
        store.process_titles().unwrap();
        store.process_contents().unwrap();
        store.process_vocabulary().unwrap();

        let terms = store.vocabulary_page(0, 100).unwrap();
        assert!(terms.contains(&"kitten".to_string()));
        assert!(terms.contains(&"sitting".to_string()));
        assert!(terms.contains(&"bitten".to_string()));

        // Paging is stable and non-overlapping.
        let first = store.vocabulary_page(0, 2).unwrap();
        let second = store.vocabulary_page(2, 2).unwrap();
        assert!(first.iter().all(|t| !second.contains(t)));
    }

    #[test]
    fn test_vector_and_ann_lifecycle() {
        let mut store = open_store();
        store.article_put(&sample_article(1)).unwrap();

        let pending = store.pending_embedding_batch(&[], 10).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].article_title, "Article 1");

        // Quarantined ids are excluded from subsequent batches.
        let skipped = store.pending_embedding_batch(&[pending[0].id], 10).unwrap();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].id, pending[1].id);

        let vectors: Vec<(i64, Vec<u8>)> = pending
            .iter()
            .map(|p| (p.id, float32_to_bytes(&[p.id as f32, 1.0, -1.0, 0.5])))
            .collect();
        store.insert_vectors(&vectors).unwrap();

        assert_eq!(store.pending_embedding_count(&[]).unwrap(), 0);
        assert_eq!(store.vector_count().unwrap(), 2);

        let without_ann = store.vectors_without_ann(10).unwrap();
        assert_eq!(without_ann.len(), 2);
        assert_eq!(without_ann[0].1.len(), 4);

        let chunk_id = store.max_ann_chunk_id().unwrap() + 1;
        assert_eq!(chunk_id, 1);
        let entries: Vec<AnnEntry> = without_ann
            .iter()
            .enumerate()
            .map(|(position, (id, _))| AnnEntry {
                vectors_id: *id,
                chunk_position: position as i64,
            })
            .collect();
        store.append_ann_chunk(chunk_id, &[0xAA, 0xBB], &entries).unwrap();

        assert_eq!(store.ann_chunk_count().unwrap(), 1);
        assert_eq!(store.ann_entry_count().unwrap(), 2);
        assert!(store.vectors_without_ann(10).unwrap().is_empty());

        let resolved = store.ann_resolve(chunk_id, 1).unwrap();
        assert_eq!(resolved, Some(entries[1].vectors_id));
        assert_eq!(store.ann_resolve(chunk_id, 99).unwrap(), None);

        let embedding = store.vector_get(entries[0].vectors_id).unwrap().unwrap();
        assert_eq!(embedding[1], 1.0);

        let info = store
            .vector_section_info(entries[0].vectors_id)
            .unwrap()
            .unwrap();
        assert_eq!(info.article_id, 1);
        assert_eq!(info.article_title, "Article 1");
    }
}
