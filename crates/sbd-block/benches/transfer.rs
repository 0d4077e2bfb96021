#![forbid(unsafe_code)]

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use sbd_block::{MemBackingStore, Segment, transfer};
use sbd_types::{Capacity, Direction, SECTOR_SIZE, SectorNumber};

const CAPACITY_MIB: u64 = 16;

fn bench_transfer(c: &mut Criterion) {
    let capacity = Capacity::from_mib(CAPACITY_MIB).expect("capacity");
    let store = MemBackingStore::zeroed(capacity.len_bytes()).expect("store");
    let sectors = capacity.sectors();

    let mut group = c.benchmark_group("transfer");
    for seg_sectors in [1_u64, 8, 256] {
        let mut buf = vec![0xA5_u8; usize::try_from(seg_sectors).expect("len") * SECTOR_SIZE];

        group.bench_function(format!("write_{seg_sectors}s"), |b| {
            let mut pos = 0_u64;
            b.iter(|| {
                let mut seg = Segment::new(&mut buf).expect("segment");
                let moved = transfer(
                    &store,
                    capacity,
                    &mut seg,
                    SectorNumber(pos),
                    Direction::Write,
                );
                pos = (pos + seg_sectors) % sectors;
                black_box(moved)
            });
        });

        group.bench_function(format!("read_{seg_sectors}s"), |b| {
            let mut pos = 0_u64;
            b.iter(|| {
                let mut seg = Segment::new(&mut buf).expect("segment");
                let moved = transfer(
                    &store,
                    capacity,
                    &mut seg,
                    SectorNumber(pos),
                    Direction::Read,
                );
                pos = (pos + seg_sectors) % sectors;
                black_box(moved)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_transfer);
criterion_main!(benches);
