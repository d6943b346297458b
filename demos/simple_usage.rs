//! Minimal walk-through: ingest a few documents, run the three query
//! types, delete, and persist.
//!
//! Run with: cargo run --example simple_usage

use omesh::{Config, QueryType, SearchEngine};

fn main() -> omesh::Result<()> {
    let dir = std::env::temp_dir().join("omesh-simple-usage");
    let _ = std::fs::remove_dir_all(&dir);
    let mut engine = SearchEngine::open(Config::with_dir(&dir))?;

    let fox = engine.put(b"The quick brown fox jumps over the lazy dog")?;
    engine.put(b"Hello world, this is a test document")?;
    engine.put(b"Assembly is quick but Rust is quicker")?;
    println!("indexed 3 documents, first id {}", fox);

    let hits = engine.search("quick", QueryType::And, 10)?;
    println!("AND quick -> {} hits", hits.len());
    for hit in &hits {
        println!(
            "  doc {}  score {:.3}  first match at word {}",
            hit.doc_id,
            hit.score.to_f64(),
            hit.first_position
        );
    }

    let hits = engine.search("hello fox", QueryType::Or, 10)?;
    println!("OR hello fox -> {} hits", hits.len());

    let hits = engine.search("quick brown", QueryType::Phrase, 10)?;
    println!("PHRASE \"quick brown\" -> {} hits", hits.len());

    engine.delete(fox)?;
    let hits = engine.search("quick brown", QueryType::Phrase, 10)?;
    println!("after delete -> {} hits", hits.len());

    let stats = engine.stats();
    println!(
        "stats: {} docs, {} terms, {} tokens, cache hit rate {:.2}",
        stats.total_docs,
        stats.total_terms,
        stats.total_tokens,
        stats.cache.hit_rate()
    );

    engine.close()?;
    Ok(())
}
