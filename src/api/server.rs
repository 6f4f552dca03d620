//! HTTP/JSON API
//!
//! Exposes search and article retrieval over a small JSON API:
//!
//! | Method | Path                   | Body                |
//! |--------|------------------------|---------------------|
//! | `POST` | `/api/search`          | `{query, limit?}`   |
//! | `POST` | `/api/search/title`    | `{query, limit?}`   |
//! | `POST` | `/api/search/lexical`  | `{query, limit?}`   |
//! | `POST` | `/api/search/semantic` | `{query, limit?}`   |
//! | `POST` | `/api/article`         | `{id}`              |
//!
//! Successful responses carry `{status: "ok", results|article, time}`;
//! failures carry `{status: "error", message}`.

use crate::config::Config;
use crate::error::{Result, WikiliteError};
use crate::ml::embedding::Embedder;
use crate::search::{Retriever, SearchResult};
use crate::storage::{Article, Store};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

/// Shared state for all route handlers.
#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<Store>>,
    embedder: Option<Arc<dyn Embedder>>,
    limit: usize,
}

/// Start the HTTP API and serve until the process terminates.
pub async fn run_server(
    config: &Config,
    store: Store,
    embedder: Option<Arc<dyn Embedder>>,
) -> Result<()> {
    let state = AppState {
        store: Arc::new(Mutex::new(store)),
        embedder,
        limit: config.limit,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/search", post(handle_search))
        .route("/api/search/title", post(handle_search_title))
        .route("/api/search/lexical", post(handle_search_lexical))
        .route("/api/search/semantic", post(handle_search_semantic))
        .route("/api/article", post(handle_article))
        .layer(cors)
        .with_state(state);

    let address = format!("{}:{}", config.web_host, config.web_port);
    log::info!("HTTP API listening on http://{}/", address);

    let listener = tokio::net::TcpListener::bind(&address).await?;
    axum::serve(listener, app)
        .await
        .map_err(WikiliteError::Io)?;

    Ok(())
}

// ============ Request / response bodies ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct ArticleRequest {
    id: i64,
}

#[derive(Serialize)]
struct SearchResponse {
    status: &'static str,
    results: Vec<SearchResult>,
    time: f64,
}

#[derive(Serialize)]
struct ArticleResponse {
    status: &'static str,
    article: ArticleBody,
    time: f64,
}

#[derive(Serialize)]
struct ArticleBody {
    id: i64,
    title: String,
    entity: String,
    sections: Vec<SectionBody>,
}

#[derive(Serialize)]
struct SectionBody {
    title: String,
    content: String,
    pow: i64,
}

impl From<Article> for ArticleBody {
    fn from(article: Article) -> Self {
        Self {
            id: article.id,
            title: article.title,
            entity: article.entity,
            sections: article
                .sections
                .into_iter()
                .map(|section| SectionBody {
                    title: section.title,
                    content: section.content,
                    pow: section.pow,
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    status: &'static str,
    message: String,
}

fn error_response(error: WikiliteError) -> Response {
    let status = match error {
        WikiliteError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            status: "error",
            message: error.to_string(),
        }),
    )
        .into_response()
}

fn search_response(results: Result<Vec<SearchResult>>, started: Instant) -> Response {
    match results {
        Ok(results) => Json(SearchResponse {
            status: "ok",
            results,
            time: started.elapsed().as_secs_f64(),
        })
        .into_response(),
        Err(error) => error_response(error),
    }
}

// ============ Handlers ============

/// Embed the query outside the store lock; the embedding network call
/// must not serialize concurrent lexical queries.
async fn query_embedding(state: &AppState, query: &str) -> Result<Option<Vec<f32>>> {
    let embedder = match &state.embedder {
        Some(embedder) => embedder,
        None => return Ok(None),
    };
    let prefix = {
        let store = state.store.lock().await;
        store.settings().model_prefix_search.clone()
    };
    let embedding = embedder.embed(&format!("{}{}", prefix, query)).await?;
    Ok(Some(embedding))
}

async fn handle_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Response {
    let started = Instant::now();
    let limit = request.limit.unwrap_or(state.limit);

    let embedding = match query_embedding(&state, &request.query).await {
        Ok(embedding) => embedding,
        Err(error) => return error_response(error),
    };

    let store = state.store.lock().await;
    let retriever = Retriever::new(&store, None);
    let results = retriever.search_combined_with(&request.query, embedding.as_deref(), limit);
    search_response(results, started)
}

async fn handle_search_title(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Response {
    let started = Instant::now();
    let limit = request.limit.unwrap_or(state.limit);

    let store = state.store.lock().await;
    let retriever = Retriever::new(&store, None);
    search_response(retriever.search_title(&request.query, limit), started)
}

async fn handle_search_lexical(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Response {
    let started = Instant::now();
    let limit = request.limit.unwrap_or(state.limit);

    let store = state.store.lock().await;
    let retriever = Retriever::new(&store, None);
    search_response(retriever.search_lexical(&request.query, limit), started)
}

async fn handle_search_semantic(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Response {
    let started = Instant::now();
    let limit = request.limit.unwrap_or(state.limit);

    let embedding = match query_embedding(&state, &request.query).await {
        Ok(embedding) => embedding,
        Err(error) => return error_response(error),
    };

    let store = state.store.lock().await;
    let retriever = Retriever::new(&store, None);
    let results = match embedding {
        Some(embedding) => retriever.vector_results(&embedding, limit),
        None => Ok(Vec::new()),
    };
    search_response(results, started)
}

async fn handle_article(
    State(state): State<AppState>,
    Json(request): Json<ArticleRequest>,
) -> Response {
    let started = Instant::now();

    let store = state.store.lock().await;
    match store.article_get(request.id) {
        Ok(article) => Json(ArticleResponse {
            status: "ok",
            article: article.into(),
            time: started.elapsed().as_secs_f64(),
        })
        .into_response(),
        Err(error) => error_response(error),
    }
}
