use criterion::{black_box, criterion_group, criterion_main, Criterion};
use idbscan::checksum;
use idbscan::record_log;
use idbscan::wire::{encode_varint, SliceReader};

fn bench_decode(c: &mut Criterion) {
    let varints: Vec<u8> = (0..10_000u64).flat_map(|n| encode_varint(n * 2654435761)).collect();
    c.bench_function("varint_decode_10k", |b| {
        b.iter(|| {
            let mut r = SliceReader::new(black_box(&varints));
            while !r.is_empty() {
                r.read_varint64().unwrap();
            }
        })
    });

    let block = vec![0xA5u8; 32 * 1024];
    c.bench_function("crc32c_32k", |b| b.iter(|| checksum::crc(black_box(&block))));

    let payload = vec![0x42u8; 4096];
    let masked = checksum::mask(checksum::crc_update(checksum::crc(&payload), &[1]));
    let mut record = masked.to_le_bytes().to_vec();
    record.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    record.push(1);
    record.extend_from_slice(&payload);
    let file: Vec<u8> = std::iter::repeat(record).take(7).flatten().collect();
    c.bench_function("record_log_reassembly", |b| {
        b.iter(|| record_log::read_records(black_box(&file)).unwrap())
    });
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
