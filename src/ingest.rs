//! Ingestion pipelines: dump import, embedding generation, ANN build
//!
//! Embedding and ANN construction are resumable: work is found by
//! comparing base tables against the vector/ANN tables, and every batch
//! commits in its own transaction, so an interrupted run leaves a
//! consistent prefix and the next run continues where it stopped.

use crate::config::Config;
use crate::error::{Result, WikiliteError};
use crate::ml::codec::{extract_mrl, float32_to_bytes, quantize_binary};
use crate::ml::embedding::Embedder;
use crate::storage::{AnnEntry, AnnMode, Store};
use crate::text::extract_article;
use crate::utils::{calculate_progress, estimate_remaining, format_duration};

use flate2::read::GzDecoder;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Sections embedded per transaction.
const EMBEDDING_BATCH_SIZE: usize = 250;

/// Vectors quantized into one ANN chunk per transaction.
const ANN_BATCH_SIZE: usize = 250;

// ============ Dump import ============

/// One record of an enterprise HTML dump (JSONL stream).
#[derive(Debug, Default, Deserialize)]
struct DumpRecord {
    #[serde(default)]
    name: String,
    #[serde(default)]
    identifier: i64,
    #[serde(default)]
    main_entity: DumpEntity,
    #[serde(default)]
    article_body: DumpBody,
}

#[derive(Debug, Default, Deserialize)]
struct DumpEntity {
    #[serde(default)]
    identifier: String,
}

#[derive(Debug, Default, Deserialize)]
struct DumpBody {
    #[serde(default)]
    html: String,
}

/// Import a JSONL dump file (optionally gzip-compressed) of HTML
/// articles. Records that fail to extract are logged and skipped.
pub fn import_dump(store: &mut Store, path: &Path) -> Result<usize> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if path.extension().and_then(|ext| ext.to_str()) == Some("gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let stream = serde_json::Deserializer::from_reader(BufReader::new(reader))
        .into_iter::<DumpRecord>();

    let mut imported = 0usize;
    for record in stream {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Skipping malformed dump record: {}", e);
                break;
            }
        };

        if record.article_body.html.is_empty() {
            continue;
        }

        let article = match extract_article(
            &record.article_body.html,
            record.identifier,
            &record.name,
            &record.main_entity.identifier,
        ) {
            Some(article) => article,
            None => continue,
        };

        if let Err(e) = store.article_put(&article) {
            log::warn!("Error saving article {}: {}", record.identifier, e);
            continue;
        }

        imported += 1;
        if imported % 1000 == 0 {
            log::info!("Imported {} articles", imported);
        }
    }

    log::info!("Import finished: {} articles", imported);
    Ok(imported)
}

// ============ Embedding loop ============

/// Bring the `vectors` table in sync with `sections`, then rebuild any
/// missing ANN entries.
///
/// Sections whose embedding fails are quarantined for the rest of the run
/// and retried on the next one. Cancellation is observed between batches.
pub async fn process_embeddings(
    store: &mut Store,
    embedder: &dyn Embedder,
    config: &Config,
    cancel: &AtomicBool,
) -> Result<()> {
    store.setup_put("model", embedder.model_name())?;
    store.setup_put("modelPrefixSave", &config.model_prefix_save)?;
    store.setup_put("modelPrefixSearch", &config.model_prefix_search)?;
    store.reload_settings()?;

    let total = store.pending_embedding_count(&[])?;
    log::info!("Pending embeddings: {}", total);

    let started = Instant::now();
    let mut quarantine: HashSet<i64> = HashSet::new();
    let mut processed = 0usize;

    loop {
        if cancel.load(Ordering::Relaxed) {
            log::warn!("Embedding run cancelled after {} sections", processed);
            return Ok(());
        }

        let mut skip: Vec<i64> = quarantine.iter().copied().collect();
        skip.sort_unstable();
        let batch = store.pending_embedding_batch(&skip, EMBEDDING_BATCH_SIZE)?;
        if batch.is_empty() {
            break;
        }

        let mut vectors: Vec<(i64, Vec<u8>)> = Vec::with_capacity(batch.len());
        for section in &batch {
            let input = format!(
                "{}{} - {}\n\n{}",
                config.model_prefix_save, section.article_title, section.title, section.content
            );
            match embedder.embed(&input).await {
                Ok(embedding) => vectors.push((section.id, float32_to_bytes(&embedding))),
                Err(e) => {
                    log::warn!("Embedding error for section {}: {}", section.id, e);
                    quarantine.insert(section.id);
                }
            }
        }

        if !vectors.is_empty() {
            store.insert_vectors(&vectors)?;
        }

        processed += batch.len();
        let progress = calculate_progress(processed, total as usize);
        let elapsed = started.elapsed();
        let remaining = estimate_remaining(elapsed, progress)
            .map(format_duration)
            .unwrap_or_else(|| "?".to_string());
        log::info!(
            "Embedding progress: {:.2}%, elapsed: {}, remaining: {}",
            progress,
            format_duration(elapsed),
            remaining
        );
    }

    if !quarantine.is_empty() {
        log::warn!(
            "{} sections quarantined this run; they will be retried next time",
            quarantine.len()
        );
    }

    process_ann(store, config)
}

// ============ ANN build ============

/// Quantize every vector not yet referenced by the ANN index into
/// append-only chunks. Each chunk row commits together with its index
/// entries.
pub fn process_ann(store: &mut Store, config: &Config) -> Result<()> {
    let mode: AnnMode = config.ann_mode.parse()?;
    if mode == AnnMode::Mrl && config.ann_size == 0 {
        return Err(WikiliteError::InvalidAnnSize);
    }

    store.setup_put("annMode", mode.as_str())?;
    store.setup_put("annSize", &config.ann_size.to_string())?;
    store.reload_settings()?;

    let mut processed = 0usize;
    loop {
        let batch = store.vectors_without_ann(ANN_BATCH_SIZE)?;
        if batch.is_empty() {
            break;
        }

        let chunk_id = store.max_ann_chunk_id()? + 1;
        let mut chunk_bytes = Vec::new();
        let mut entries = Vec::with_capacity(batch.len());

        for (position, (vectors_id, embedding)) in batch.iter().enumerate() {
            let quantized = match mode {
                AnnMode::Binary => quantize_binary(embedding),
                AnnMode::Mrl => extract_mrl(embedding, config.ann_size),
            };
            chunk_bytes.extend_from_slice(&quantized);
            entries.push(AnnEntry {
                vectors_id: *vectors_id,
                chunk_position: position as i64,
            });
        }

        store.append_ann_chunk(chunk_id, &chunk_bytes, &entries)?;
        processed += batch.len();
        log::info!("ANN chunk {}: {} vectors indexed", chunk_id, processed);
    }

    Ok(())
}
