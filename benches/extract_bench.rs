use criterion::{black_box, criterion_group, criterion_main, Criterion};
use disadiff::dpfs::{read_lvl4, read_lvl4_uncached, Lvl2Cache};
use disadiff::reader::resolve;

const PART_OFF: u64 = 0x1000;
const L3_SIZE: u64 = 0x100000; // 1 MiB per copy, 512-byte blocks
const LVL4_OFF: u64 = 0x200;
const LVL4_SIZE: u64 = 0xFF000;

fn w64(img: &mut [u8], off: usize, v: u64) {
    img[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

/// Single-partition DIFF image, 1 MiB duplex level 3.
fn build_container() -> Vec<u8> {
    let part_size = 0x440 + 2 * L3_SIZE;
    let mut img = vec![0u8; (PART_OFF + part_size) as usize];

    let h = 0x100;
    img[h..h + 8].copy_from_slice(b"DIFF\x00\x00\x03\x00");
    w64(&mut img, h + 0x10, 0x200); // table0, active
    w64(&mut img, h + 0x18, 0x130);
    w64(&mut img, h + 0x20, PART_OFF);
    w64(&mut img, h + 0x28, part_size);

    let t = 0x200;
    img[t..t + 8].copy_from_slice(b"DIFI\x00\x00\x01\x00");
    w64(&mut img, t + 0x08, 0x44);
    w64(&mut img, t + 0x10, 0x78);
    w64(&mut img, t + 0x18, 0xBC);
    w64(&mut img, t + 0x20, 0x50);
    w64(&mut img, t + 0x28, 0x10C);
    w64(&mut img, t + 0x30, 0x20);

    let v = t + 0x44;
    img[v..v + 8].copy_from_slice(b"IVFC\x00\x00\x02\x00");
    w64(&mut img, v + 0x08, 0x20);
    w64(&mut img, v + 0x18, 0x20);
    w64(&mut img, v + 0x28, 0x20);
    w64(&mut img, v + 0x30, 0x20);
    w64(&mut img, v + 0x40, 0x40);
    w64(&mut img, v + 0x48, 0x40);
    w64(&mut img, v + 0x58, LVL4_OFF);
    w64(&mut img, v + 0x60, LVL4_SIZE);
    w64(&mut img, v + 0x70, 0x78);

    let d = t + 0xBC;
    img[d..d + 8].copy_from_slice(b"DPFS\x00\x00\x01\x00");
    w64(&mut img, d + 0x08, 0x00);
    w64(&mut img, d + 0x10, 0x10); // lvl1
    w64(&mut img, d + 0x20, 0x20);
    w64(&mut img, d + 0x28, 0x200); // lvl2
    w64(&mut img, d + 0x30, 2);
    w64(&mut img, d + 0x38, 0x440);
    w64(&mut img, d + 0x40, L3_SIZE); // lvl3
    w64(&mut img, d + 0x48, 9);

    // Payload content that is cheap to generate but not constant.
    let l3 = (PART_OFF + 0x440) as usize;
    for (i, b) in img[l3..l3 + 2 * L3_SIZE as usize].iter_mut().enumerate() {
        *b = (i as u8).wrapping_mul(31);
    }
    img
}

fn set_lvl2_pattern(img: &mut [u8], stride: usize) {
    let l2 = (PART_OFF + 0x20) as usize;
    for b in img[l2..l2 + 0x200].iter_mut() {
        *b = 0;
    }
    for i in (0..0x200).step_by(stride) {
        img[l2 + i] = 0x80;
    }
}

fn bench_extract(c: &mut Criterion) {
    let mut img = build_container();

    // Sparse flips: long single-copy runs, the cached path's best case.
    set_lvl2_pattern(&mut img, 64);
    let ctx = resolve(&img, false).unwrap();
    let cache = Lvl2Cache::build(&ctx, &img).unwrap();
    let mut out = vec![0u8; LVL4_SIZE as usize];

    c.bench_function("extract_1mb_cached_sparse", |b| {
        b.iter(|| read_lvl4(black_box(&mut out), &img, &ctx, Some(&cache), 0).unwrap())
    });
    c.bench_function("extract_1mb_reference_sparse", |b| {
        b.iter(|| read_lvl4_uncached(black_box(&mut out), &img, &ctx, 0))
    });

    // Dense flips: copy switches every few blocks.
    set_lvl2_pattern(&mut img, 1);
    let ctx = resolve(&img, false).unwrap();
    let cache = Lvl2Cache::build(&ctx, &img).unwrap();

    c.bench_function("extract_1mb_cached_dense", |b| {
        b.iter(|| read_lvl4(black_box(&mut out), &img, &ctx, Some(&cache), 0).unwrap())
    });
}

fn bench_cache_build(c: &mut Criterion) {
    let img = build_container();
    let ctx = resolve(&img, false).unwrap();

    c.bench_function("build_lvl2_cache_1mb", |b| {
        b.iter(|| Lvl2Cache::build(black_box(&ctx), &img).unwrap())
    });
}

criterion_group!(benches, bench_extract, bench_cache_build);
criterion_main!(benches);
