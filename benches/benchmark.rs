// Micro-benchmarks for key encoding, tokenizing and in-memory queries
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use std::sync::Arc;
use zindex::prelude::*;
use zindex::{EncoderSet, IndexConfig, SimpleIndex, SortedSetStore, Tokenizer, WordTokenizer};

const WORDS: &[&str] = &[
    "hello", "world", "rust", "index", "redis", "sorted", "set", "query", "prefix", "range",
];

fn random_text(rng: &mut impl Rng, words: usize) -> String {
    (0..words)
        .map(|_| WORDS[rng.random_range(0..WORDS.len())])
        .collect::<Vec<_>>()
        .join(" ")
}

fn random_document(rng: &mut impl Rng, id: usize) -> Document {
    Document::with_score(format!("doc{}", id), rng.random::<f64>())
        .set("title", random_text(rng, 4))
        .set("n", rng.random_range(0..10_000i64))
}

fn benchmark_encode(c: &mut Criterion) {
    let spec = Spec::new(vec![Field::prefix("title", true), Field::numeric("n")]).unwrap();
    let encoders = EncoderSet::new(&spec);
    let value = Value::from("the quick brown fox jumps over the lazy dog");

    c.bench_function("encode_prefix_suffixes", |b| {
        b.iter(|| encoders.encode("title", black_box(&value)).unwrap())
    });
}

fn benchmark_tokenize(c: &mut Criterion) {
    let tokenizer = WordTokenizer::default();
    let mut rng = rand::rng();
    let text = random_text(&mut rng, 200);

    c.bench_function("tokenize_200_words", |b| b.iter(|| tokenizer.tokenize(black_box(&text))));
}

fn benchmark_simple_index(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("simple_index");

    for size in [1000, 10000].iter() {
        let store: Arc<dyn SortedSetStore> = Arc::new(MemoryStore::new());
        let spec = Spec::new(vec![Field::prefix("title", true), Field::numeric("n")]).unwrap();
        let index = SimpleIndex::new("bench", spec, store, &IndexConfig::default()).unwrap();

        let mut rng = rand::rng();
        let docs: Vec<Document> = (0..*size).map(|i| random_document(&mut rng, i)).collect();
        runtime.block_on(index.index(docs)).unwrap();

        group.bench_with_input(BenchmarkId::new("prefix_query", size), size, |b, _| {
            let query = Query::new("bench").filter_prefix("title", "rust").limit(0, 10);
            b.to_async(&runtime).iter(|| async { index.get(black_box(&query)).await.unwrap() });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_encode, benchmark_tokenize, benchmark_simple_index);
criterion_main!(benches);
