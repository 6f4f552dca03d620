//! Interactive terminal search
//!
//! Reads queries from stdin and prints a numbered result list; entering
//! one of the numbers prints the full article. An empty line exits.

use crate::error::Result;
use crate::ml::embedding::Embedder;
use crate::search::Retriever;
use crate::storage::Store;

use std::collections::HashMap;
use std::io::{self, BufRead, Write};

pub async fn run_repl(
    store: &Store,
    embedder: Option<&dyn Embedder>,
    limit: usize,
) -> Result<()> {
    let retriever = Retriever::new(store, embedder);
    let stdin = io::stdin();
    let mut articles: HashMap<usize, i64> = HashMap::new();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        let query = line.trim();
        if query.is_empty() {
            return Ok(());
        }

        if let Ok(index) = query.parse::<usize>() {
            if let Some(&article_id) = articles.get(&index) {
                print_article(store, article_id)?;
                continue;
            }
        }

        let results = retriever.search(query, limit).await?;

        articles.clear();
        for (i, result) in results.iter().enumerate() {
            articles.insert(i + 1, result.article_id);
            println!("{:3} [{}] {}", i + 1, result.kind.code(), result.title);
        }

        if results.is_empty() {
            let suggestions = retriever.search_word(query, limit)?;
            if suggestions.is_empty() {
                println!("no results");
            } else {
                let terms: Vec<&str> =
                    suggestions.iter().map(|s| s.title.as_str()).collect();
                println!("no results, did you mean: {}?", terms.join(", "));
            }
        }
    }
}

fn print_article(store: &Store, article_id: i64) -> Result<()> {
    let article = store.article_get(article_id)?;

    println!("{}\n", article.title);
    for section in &article.sections {
        if !section.title.is_empty() {
            println!("{}\n", section.title);
        }
        println!("{}\n", section.content);
    }
    Ok(())
}
