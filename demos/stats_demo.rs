use clap::Parser;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use two_way_hash::Squirrel3;
use two_way_hash::TwoWayTable;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'n', long = "entries", default_value_t = 1_000_000)]
    entries: usize,

    #[arg(short = 'l', long = "lookups", default_value_t = 1_000_000)]
    lookups: usize,

    #[arg(short = 's', long = "seed", default_value_t = 0x5eed)]
    seed: u64,
}

fn main() {
    let args = Args::parse();
    let mut rng = SmallRng::seed_from_u64(args.seed);

    println!("Filling TwoWayTable with {} random u64 keys", args.entries);

    let mut table = TwoWayTable::<Squirrel3<u64, u64>>::new();
    let mut keys = Vec::with_capacity(args.entries);
    let mut grows = 0;
    while keys.len() < args.entries {
        let key = rng.random::<u64>();
        let mut probes = 0;
        if key == u64::MAX || table.contains(key, &mut probes) {
            continue;
        }

        let capacity = table.capacity();
        table.insert(key, key);
        if table.capacity() != capacity {
            grows += 1;
        }
        keys.push(key);
    }

    println!(
        "Inserted {} entries into {} groups ({} grows)",
        table.size(),
        table.capacity(),
        grows
    );
    if keys.is_empty() {
        return;
    }
    println!(
        "Memory usage: {} bytes ({:.2} bytes per entry)",
        table.memory_usage(),
        table.memory_usage() as f64 / table.size() as f64
    );

    let expected_sum = keys.iter().fold(0u64, |acc, &k| acc.wrapping_add(k));
    let mut probes = 0;
    let mut sum = 0u64;
    for _ in 0..args.lookups {
        let key = keys[rng.random_range(0..keys.len())];
        let hash = table.prefetch(key);
        sum = sum.wrapping_add(table.find_indexed(key, hash, &mut probes));
    }
    println!(
        "{} lookups, {:.3} probes per lookup (checksum {:016x})",
        args.lookups,
        probes as f64 / args.lookups.max(1) as f64,
        sum
    );

    let mut table_sum = 0u64;
    for &key in &keys {
        table_sum = table_sum.wrapping_add(table.find(key, &mut 0));
    }
    assert_eq!(table_sum, expected_sum, "table lost entries");

    table.group_histogram().print();
    table.debug_stats().print();
}
