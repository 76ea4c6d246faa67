//! Deterministic NDJSON generator for manual benchmarking:
//! `gen_ndjson [count]` writes records to stdout.
use std::env;
use std::io::{self, BufWriter, Write};

fn main() {
    let args: Vec<String> = env::args().collect();
    let count: u64 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(100_000);

    let stdout = io::stdout();
    let mut out = BufWriter::with_capacity(1 << 20, stdout.lock());

    // Deterministic pseudo-random via a simple LCG, no external deps needed.
    let mut rng: u64 = 42;
    let mut next = move || {
        rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1);
        rng >> 32
    };

    let names = [
        "alice", "bob", "charlie", "diana", "eve", "frank", "grace", "heidi",
    ];
    let cities = [
        "New York", "London", "Tokyo", "Paris", "Berlin", "Sydney", "Toronto", "Mumbai",
    ];
    let tags = ["go", "rust", "zig", "c", "python"];

    for i in 0..count {
        let name = names[next() as usize % names.len()];
        let city = cities[next() as usize % cities.len()];
        let age = 18 + next() % 60;
        let score = next() as f64 / u32::MAX as f64 * 100.0;
        let t1 = tags[next() as usize % tags.len()];
        let t2 = tags[next() as usize % tags.len()];

        writeln!(
            out,
            r#"{{"id":{i},"name":"{name}","age":{age},"score":{score:.2},"active":{active},"tags":["{t1}","{t2}"],"u":{{"city":"{city}"}}}}"#,
            active = if i % 3 == 0 { "true" } else { "false" }
        )
        .unwrap();
    }
}
