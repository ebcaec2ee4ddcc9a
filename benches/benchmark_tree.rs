use std::hint::black_box;

use criterion::{BatchSize, Criterion, SamplingMode};
use rand::Rng;

use ssz_tree::{Key, Schema, Value, View, decode, encode, merkle::hash_tree_root_of_value};

const BALANCES: usize = 1 << 16;

fn state_schema() -> Schema {
    Schema::container([
        ("slot", Schema::uint64()),
        ("latest_root", Schema::bytes32()),
        ("balances", Schema::list(Schema::uint64(), 1 << 40).unwrap()),
        ("participation", Schema::bitlist(1 << 20).unwrap()),
    ])
    .unwrap()
}

fn random_state<R: Rng>(rng: &mut R) -> Value {
    let balances: Vec<u64> = (0..BALANCES).map(|_| rng.random()).collect();
    let bits: Vec<bool> = (0..BALANCES).map(|_| rng.random()).collect();
    Value::Container(vec![
        Value::Uint(u128::from(rng.random::<u64>())),
        Value::bytes(&rng.random::<[u8; 32]>()),
        Value::uints(balances),
        Value::Bits(bits),
    ])
}

/// Full root computation of a fresh tree versus the tree-free reference.
pub fn bench_function_hashing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Hashing");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(10);

    let mut rng = rand::rng();
    let schema = state_schema();
    let value = random_state(&mut rng);

    group.bench_function("- fresh tree root", |b| {
        b.iter_batched(
            || View::from_value(&schema, &value).unwrap(),
            |view| black_box(view.hash_tree_root()),
            BatchSize::LargeInput,
        );
    });

    group.bench_function("- reference root", |b| {
        b.iter(|| black_box(hash_tree_root_of_value(&schema, &value).unwrap()));
    });

    group.finish();
}

/// Single-element update followed by rehashing only the touched spine.
pub fn bench_function_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("Updates");

    let mut rng = rand::rng();
    let schema = state_schema();
    let view = View::from_value(&schema, &random_state(&mut rng)).unwrap();
    // warm the hash cache
    let _ = view.hash_tree_root();
    let balances = view.field("balances").unwrap();

    group.bench_function("- set balance and rehash", |b| {
        b.iter(|| {
            let index = rng.random_range(0..BALANCES as u64);
            let updated = balances
                .set(Key::Index(index), &Value::Uint(u128::from(rng.random::<u64>())))
                .unwrap();
            let state = view.set_view(Key::Name("balances"), &updated).unwrap();
            black_box(state.hash_tree_root())
        });
    });

    group.bench_function("- builder commit", |b| {
        b.iter(|| {
            let state = view
                .builder()
                .unwrap()
                .set(Key::Name("slot"), &Value::Uint(u128::from(rng.random::<u64>())))
                .unwrap()
                .set(Key::Name("latest_root"), &Value::bytes(&rng.random::<[u8; 32]>()))
                .unwrap()
                .commit()
                .unwrap();
            black_box(state.hash_tree_root())
        });
    });

    group.finish();
}

pub fn bench_function_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("Codec");
    group.sample_size(20);

    let mut rng = rand::rng();
    let schema = state_schema();
    let view = View::from_value(&schema, &random_state(&mut rng)).unwrap();
    let bytes = encode(&view).unwrap();

    group.bench_function("- encode", |b| {
        b.iter(|| black_box(encode(black_box(&view)).unwrap()));
    });

    group.bench_function("- decode", |b| {
        b.iter(|| black_box(decode(black_box(&bytes), &schema).unwrap()));
    });

    group.finish();
}
