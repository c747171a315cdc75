//! Benchmarks for export throughput, archive open, and verified reads

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use parcel_rs::{Exporter, Importer};
use rand::RngCore;
use tempfile::TempDir;

const PART_SIZE: u64 = 4 * 1024 * 1024;

fn random_payload(size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

fn export_files(dir: &TempDir, files: usize, size: usize) {
    let data = random_payload(size);
    let mut exporter = Exporter::new(dir.path(), PART_SIZE).unwrap();
    for i in 0..files {
        exporter.add_bytes(&format!("file-{}", i), &data, None).unwrap();
    }
    exporter.commit().unwrap();
}

fn benchmark_export(c: &mut Criterion) {
    let mut group = c.benchmark_group("export");

    for size in [4 * 1024, 256 * 1024, 1024 * 1024].iter() {
        let files = 16;
        group.throughput(Throughput::Bytes((size * files) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                export_files(&dir, files, size);
            });
        });
    }

    group.finish();
}

fn benchmark_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("import_open");

    for files in [10, 1000].iter() {
        let dir = TempDir::new().unwrap();
        export_files(&dir, *files, 64 * 1024);

        group.bench_with_input(BenchmarkId::from_parameter(files), files, |b, _| {
            b.iter(|| black_box(Importer::open(dir.path()).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_verified_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("verified_read");

    for size in [4 * 1024, 1024 * 1024].iter() {
        let dir = TempDir::new().unwrap();
        export_files(&dir, 4, *size);
        let importer = Importer::open(dir.path()).unwrap();

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(importer.read_file("file-2").unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_export,
    benchmark_open,
    benchmark_verified_read
);
criterion_main!(benches);
