use std::collections::HashSet;
use std::time::Instant;

use clap::Parser;
use cuckoo_map::ChainedMap;
use cuckoo_map::CuckooMap;
use cuckoo_map::KeyValueMap;
use cuckoo_map::LinearProbingMap;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

#[derive(Parser, Debug)]
struct Args {
    /// Number of keys inserted by the stress checks and timings.
    #[arg(short = 's', long = "size", default_value_t = 10_000)]
    size: usize,

    /// Initial capacity handed to every map.
    #[arg(short = 'c', long = "capacity", default_value_t = 20_000)]
    capacity: usize,

    /// Only run the correctness checks.
    #[arg(long, conflicts_with = "benchmarks")]
    correctness: bool,

    /// Only run the timing comparison.
    #[arg(long)]
    benchmarks: bool,

    /// Seed for key generation; random when omitted.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Default)]
struct Tally {
    passed: usize,
    total: usize,
}

impl Tally {
    fn check(&mut self, ok: bool, what: &str) {
        self.total += 1;
        if ok {
            self.passed += 1;
        } else {
            println!("    FAILED: {what}");
        }
    }

    fn absorb(&mut self, other: Tally) {
        self.passed += other.passed;
        self.total += other.total;
    }
}

fn distinct_keys(rng: &mut SmallRng, count: usize) -> Vec<u32> {
    let mut seen = HashSet::with_capacity(count);
    let mut keys = Vec::with_capacity(count);
    while keys.len() < count {
        let key = rng.random::<u32>();
        if seen.insert(key) {
            keys.push(key);
        }
    }
    keys
}

/// Basic insert, update, lookup and remove checks shared by every map.
fn basic_checks(map: &mut impl KeyValueMap<u32, u32>) -> Tally {
    let mut tally = Tally::default();

    tally.check(map.insert(42, 100).is_ok(), "insert 42");
    tally.check(map.get(42) == Some(100), "get 42 after insert");
    tally.check(
        matches!(map.insert(42, 200), Ok(Some(100))),
        "update returns previous value",
    );
    tally.check(map.get(42) == Some(200), "get 42 after update");
    tally.check(map.get(999).is_none(), "get absent key");
    tally.check(map.remove(42) == Some(200), "remove 42");
    tally.check(map.get(42).is_none(), "get 42 after remove");
    tally.check(map.remove(42).is_none(), "remove absent key");

    for k in 0..50 {
        tally.check(map.insert(k * 100, k).is_ok(), "bulk insert");
    }
    tally.check(map.len() == 50, "len after bulk insert");

    tally
}

fn stress(map: &mut impl KeyValueMap<u32, u32>, keys: &[u32]) -> Tally {
    let mut tally = Tally::default();

    let inserted = keys
        .iter()
        .enumerate()
        .all(|(i, &k)| map.insert(k, i as u32).is_ok());
    tally.check(inserted, "every insert succeeds");
    tally.check(map.len() == keys.len(), "len matches key count");

    let retrievable = keys
        .iter()
        .enumerate()
        .all(|(i, &k)| map.get(k) == Some(i as u32));
    tally.check(retrievable, "every key retrievable");

    tally
}

fn run_correctness(args: &Args, keys: &[u32]) -> bool {
    let mut total = Tally::default();

    println!("Testing chained map...");
    let mut chained = ChainedMap::try_with_capacity(args.capacity).unwrap();
    let tally = basic_checks(&mut chained);
    println!("  Chained: {}/{} checks passed", tally.passed, tally.total);
    total.absorb(tally);

    println!("Testing linear probing map...");
    let mut linear = LinearProbingMap::try_with_capacity(args.capacity).unwrap();
    let tally = basic_checks(&mut linear);
    println!(
        "  Linear probing: {}/{} checks passed",
        tally.passed, tally.total
    );
    total.absorb(tally);

    println!("Testing cuckoo map...");
    let mut cuckoo = CuckooMap::with_capacity(16);
    let mut tally = basic_checks(&mut cuckoo);
    tally.check(
        cuckoo.insert(5, 50).is_ok() && cuckoo.insert(21, 210).is_ok(),
        "insert colliding candidates",
    );
    tally.check(
        cuckoo.get(5) == Some(50) && cuckoo.get(21) == Some(210),
        "colliding candidates retrievable",
    );
    tally.check(
        cuckoo.load_factor() <= cuckoo.config().max_load_factor(),
        "load factor within threshold",
    );
    println!("  Cuckoo: {}/{} checks passed", tally.passed, tally.total);
    total.absorb(tally);

    let n = keys.len();

    println!("Stress testing chained map with {n} elements...");
    let mut chained = ChainedMap::try_with_capacity(n / 2).unwrap();
    let tally = stress(&mut chained, keys);
    println!(
        "  Stress: {}/{} checks passed (longest chain: {})",
        tally.passed,
        tally.total,
        chained.max_chain_length()
    );
    total.absorb(tally);

    println!("Stress testing linear probing map with {n} elements...");
    let mut linear = LinearProbingMap::try_with_capacity(n * 2).unwrap();
    let tally = stress(&mut linear, keys);
    let average_probes =
        keys.iter().map(|&k| linear.probe_count(k)).sum::<usize>() as f64 / n.max(1) as f64;
    println!(
        "  Stress: {}/{} checks passed (average probes: {average_probes:.2})",
        tally.passed, tally.total
    );
    total.absorb(tally);

    println!("Stress testing cuckoo map with {n} elements...");
    let mut cuckoo = CuckooMap::with_capacity(n);
    let mut tally = stress(&mut cuckoo, keys);
    tally.check(cuckoo.rehash_count() < 10, "fewer than 10 rehashes");
    println!(
        "  Stress: {}/{} checks passed (rehashes: {})",
        tally.passed,
        tally.total,
        cuckoo.rehash_count()
    );
    total.absorb(tally);
    cuckoo.stats().print();

    println!(
        "\nTotal: {}/{} correctness checks passed",
        total.passed, total.total
    );
    total.passed == total.total
}

fn time_inserts<M: KeyValueMap<u32, u32>>(mut map: M, keys: &[u32]) -> (f64, M) {
    let start = Instant::now();
    for (i, &k) in keys.iter().enumerate() {
        map.insert(k, i as u32).unwrap();
    }
    (start.elapsed().as_secs_f64() * 1000.0, map)
}

fn time_lookups(map: &impl KeyValueMap<u32, u32>, keys: &[u32]) -> f64 {
    let start = Instant::now();
    for &k in keys {
        std::hint::black_box(map.get(k));
    }
    start.elapsed().as_secs_f64() * 1000.0
}

fn run_benchmarks(args: &Args, keys: &[u32]) {
    println!("\nInsertion and lookup of {} keys:", keys.len());

    let (insert_ms, chained) =
        time_inserts(ChainedMap::try_with_capacity(args.capacity).unwrap(), keys);
    let lookup_ms = time_lookups(&chained, keys);
    println!(
        "  {:<16} insert {insert_ms:>9.3} ms  lookup {lookup_ms:>9.3} ms  memory {:>10} B",
        "chained",
        chained.memory_usage()
    );

    let (insert_ms, linear) = time_inserts(
        LinearProbingMap::try_with_capacity(args.capacity).unwrap(),
        keys,
    );
    let lookup_ms = time_lookups(&linear, keys);
    println!(
        "  {:<16} insert {insert_ms:>9.3} ms  lookup {lookup_ms:>9.3} ms  memory {:>10} B",
        "linear probing",
        linear.memory_usage()
    );

    let (insert_ms, cuckoo) = time_inserts(CuckooMap::with_capacity(args.capacity), keys);
    let lookup_ms = time_lookups(&cuckoo, keys);
    println!(
        "  {:<16} insert {insert_ms:>9.3} ms  lookup {lookup_ms:>9.3} ms  memory {:>10} B  rehashes {}",
        "cuckoo",
        cuckoo.memory_usage(),
        cuckoo.rehash_count()
    );
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    println!("========================================");
    println!("   Hash map comparison");
    println!("========================================");
    println!("Size: {} | Capacity: {}", args.size, args.capacity);

    let mut rng = match args.seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_os_rng(),
    };
    let keys = distinct_keys(&mut rng, args.size);

    if !args.benchmarks && !run_correctness(&args, &keys) {
        println!("\n*** WARNING: some correctness checks failed ***");
    }
    if !args.correctness {
        run_benchmarks(&args, &keys);
    }
}
