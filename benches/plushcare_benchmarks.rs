//! # plushcare Benchmarks
//!
//! Per-scan work has to stay small on a Raspberry Pi Zero: these cover the
//! code that runs on every tag read.
//!
//! ```bash
//! cargo bench
//! cargo bench tag_parsing
//! ```

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use plushcare::care::{choose_clip, CareEngine};
use plushcare::config::Config;
use plushcare::daemon::build_player;
use plushcare::reader::parse_uid;
use plushcare::tag::TagId;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::hint::black_box;
use std::sync::Arc;
use tempfile::TempDir;

const NFC_LIST_OUTPUT: &str = "nfc-list uses libnfc 1.8.0
NFC device: ACS / ACR122U PICC Interface opened
1 ISO14443A passive target(s) found:
ISO/IEC 14443A (106 kbps) target:
    ATQA (SENS_RES): 00  44
       UID (NFCID1): 04  d8  97  12  bd  2a  81
      SAK (SEL_RES): 00
";

fn benchmark_tag_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("tag_parsing");
    let raw = [0x04, 0xd8, 0x97, 0x12, 0xbd, 0x2a, 0x81];

    group.bench_function("from_bytes", |b| b.iter(|| TagId::from_bytes(black_box(&raw))));

    for text in ["04:D8:97:12:BD:2A:81", "04 d8 97 12 bd 2a 81", "04d89712bd2a81"] {
        group.bench_with_input(BenchmarkId::new("parse", text), text, |b, text| {
            b.iter(|| TagId::parse(black_box(text)))
        });
    }

    group.bench_function("nfc_list_output", |b| b.iter(|| parse_uid(black_box(NFC_LIST_OUTPUT))));

    group.finish();
}

fn benchmark_config(c: &mut Criterion) {
    let mut group = c.benchmark_group("config");
    let config = Config::default();
    let bread = TagId::parse("04:D8:97:12:BD:2A:81").expect("valid tag");

    group.bench_function("validate_defaults", |b| b.iter(|| black_box(&config).validate()));
    group.bench_function("action_lookup", |b| b.iter(|| config.action_for(black_box(&bread)).is_some()));

    group.finish();
}

fn benchmark_care(c: &mut Criterion) {
    let mut group = c.benchmark_group("care");
    let clips: Vec<String> = (1..=4).map(|n| format!("song/song_{n:02}.wav")).collect();
    let mut rng = StdRng::seed_from_u64(11);

    group.bench_function("choose_clip", |b| {
        b.iter(|| choose_clip(black_box(&clips), Some("song/song_02.wav"), &mut rng).map(str::len))
    });

    // Silent backend over an empty directory: every play fails fast, so this
    // measures the decision path of a tag read.
    let dir = TempDir::new().expect("Failed to create temp directory");
    let mut config = Config::default();
    config.audio_dir = dir.path().to_path_buf();
    config.audio.backend = plushcare::config::AudioKind::Silent;
    let config = Arc::new(config);
    let bread = TagId::parse("04:D8:97:12:BD:2A:81").expect("valid tag");

    group.bench_function("on_tag_read", |b| {
        b.iter_batched(
            || CareEngine::with_rng(Arc::clone(&config), build_player(&config), StdRng::seed_from_u64(3)),
            |engine| engine.on_tag_read(black_box(&bread)),
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(benches, benchmark_tag_parsing, benchmark_config, benchmark_care);

criterion_main!(benches);
