use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::prelude::*;
use omesh::{Config, QueryType, SearchEngine};

const VOCAB: &[&str] = &[
    "quick", "brown", "fox", "jumps", "over", "lazy", "dog", "hello", "world",
    "search", "engine", "index", "posting", "term", "document", "storage",
    "query", "phrase", "ranked", "score", "merge", "buffer", "flush", "disk",
];

fn random_doc(rng: &mut StdRng, words: usize) -> String {
    (0..words)
        .map(|_| *VOCAB.choose(rng).expect("vocab not empty"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn seeded_engine(dir: &tempfile::TempDir, docs: usize) -> SearchEngine {
    let mut engine = SearchEngine::open(Config::with_dir(dir.path())).unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..docs {
        let doc = random_doc(&mut rng, 40);
        engine.put(doc.as_bytes()).unwrap();
    }
    engine.flush().unwrap();
    engine
}

fn bench_ingest(c: &mut Criterion) {
    c.bench_function("ingest_100_docs", |b| {
        let mut rng = StdRng::seed_from_u64(7);
        let docs: Vec<String> = (0..100).map(|_| random_doc(&mut rng, 40)).collect();
        b.iter_batched(
            || tempfile::tempdir().unwrap(),
            |dir| {
                let mut engine = SearchEngine::open(Config::with_dir(dir.path())).unwrap();
                for doc in &docs {
                    engine.put(black_box(doc.as_bytes())).unwrap();
                }
                engine.flush().unwrap();
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_queries(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = seeded_engine(&dir, 1000);

    c.bench_function("query_and_two_terms", |b| {
        b.iter(|| {
            engine
                .search(black_box("quick brown"), QueryType::And, 10)
                .unwrap()
        })
    });
    c.bench_function("query_or_two_terms", |b| {
        b.iter(|| {
            engine
                .search(black_box("hello storage"), QueryType::Or, 10)
                .unwrap()
        })
    });
    c.bench_function("query_phrase", |b| {
        b.iter(|| {
            engine
                .search(black_box("quick brown"), QueryType::Phrase, 10)
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_ingest, bench_queries);
criterion_main!(benches);
