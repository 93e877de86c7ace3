use std::hint::black_box;
use std::io;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use hw_decode_yuv::{FrameWriter, HostFrame, PixelFormat};

fn nv12_frame(width: usize, height: usize, padding: usize) -> HostFrame {
    let stride = width + padding;
    HostFrame {
        width,
        height,
        pixel_format: PixelFormat::Nv12,
        planes: vec![vec![16; stride * height], vec![128; stride * (height / 2)]],
        strides: vec![stride, stride],
    }
}

fn frame_writer_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_writer");
    group.sample_size(50);
    group.measurement_time(Duration::from_secs(5));
    group.warm_up_time(Duration::from_secs(1));

    for (width, height) in [(1280, 720), (1920, 1080), (3840, 2160)] {
        let label = format!("{width}x{height}");
        let bytes = (width * height + 2 * (width / 2) * (height / 2)) as u64;
        group.throughput(Throughput::Bytes(bytes));

        let planar = HostFrame::yuv420p_filled(width, height, 64, 16);
        group.bench_with_input(BenchmarkId::new("yuv420p", &label), &planar, |b, frame| {
            let mut writer = FrameWriter::new(io::sink());
            b.iter(|| writer.write_frame(black_box(frame)).unwrap());
        });

        let interleaved = nv12_frame(width, height, 64);
        group.bench_with_input(
            BenchmarkId::new("nv12", &label),
            &interleaved,
            |b, frame| {
                let mut writer = FrameWriter::new(io::sink());
                b.iter(|| writer.write_frame(black_box(frame)).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(benches, frame_writer_benchmark);
criterion_main!(benches);
