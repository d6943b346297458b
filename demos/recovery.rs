//! Demonstrates WAL recovery: write without syncing, "crash", reopen.
//!
//! Run with: cargo run --example recovery

use omesh::{Config, DocId, QueryType, SearchEngine};

fn main() -> omesh::Result<()> {
    let dir = std::env::temp_dir().join("omesh-recovery-demo");
    let _ = std::fs::remove_dir_all(&dir);

    {
        let mut engine = SearchEngine::open(Config::with_dir(&dir))?;
        engine.put(b"this write is only in the WAL and the log")?;
        engine.put(b"so is this one")?;
        // Engine dropped without close(): no checkpoint, no index merge.
    }

    let mut engine = SearchEngine::open(Config::with_dir(&dir))?;
    println!("doc 1 after recovery: {:?}", String::from_utf8(engine.get(DocId(1))?));
    println!("doc 2 after recovery: {:?}", String::from_utf8(engine.get(DocId(2))?));
    let hits = engine.search("wal", QueryType::And, 10)?;
    println!("search for 'wal' -> {} hits", hits.len());
    engine.close()?;
    Ok(())
}
