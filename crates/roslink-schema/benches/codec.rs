//! Codec benchmarks for roslink-schema.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use roslink_schema::{msgdef, Dialect, MessageCodec, WireFormat};
use serde_json::{json, Value};

const POINT_CLOUD: &str = "\
std_msgs/Header header
uint32 height
uint32 width
uint8[] data
bool is_dense
================================================================================
MSG: std_msgs/Header
builtin_interfaces/Time stamp
string frame_id
================================================================================
MSG: builtin_interfaces/Time
int32 sec
uint32 nanosec
";

fn cloud(len: usize) -> Value {
    json!({
        "header": {"stamp": {"sec": 1, "nanosec": 2}, "frame_id": "lidar"},
        "height": 1,
        "width": len,
        "data": vec![7u8; len],
        "is_dense": true
    })
}

fn codec(format: WireFormat) -> MessageCodec {
    let dialect = match format {
        WireFormat::Ros1 => Dialect::Ros1,
        WireFormat::Cdr => Dialect::Ros2,
    };
    let definition = msgdef::parse("sensor_msgs/PointCloud", POINT_CLOUD, dialect).unwrap();
    MessageCodec::new(definition, format)
}

fn bench_encode(c: &mut Criterion) {
    let value = cloud(1024);

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(1024));
    for format in [WireFormat::Cdr, WireFormat::Ros1] {
        let codec = codec(format);
        group.bench_function(format.encoding(), |b| {
            b.iter(|| codec.encode(black_box(&value)).unwrap())
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let value = cloud(1024);

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(1024));
    for format in [WireFormat::Cdr, WireFormat::Ros1] {
        let codec = codec(format);
        let encoded = codec.encode(&value).unwrap();
        group.bench_function(format.encoding(), |b| {
            b.iter(|| codec.decode(black_box(&encoded)).unwrap())
        });
    }
    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile_point_cloud", |b| {
        b.iter(|| msgdef::parse("sensor_msgs/PointCloud", black_box(POINT_CLOUD), Dialect::Ros2).unwrap())
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_compile);
criterion_main!(benches);
