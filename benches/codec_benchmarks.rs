use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dnsdrop::dns::{DnsMessage, MAX_PAYLOAD};
use dnsdrop::querier::{build_query, parse_doh_answer};
use dnsdrop::server::QueryHandler;
use dnsdrop::{decode_name, decode_payload, encode_name, encode_payload, RecordType};
use tokio::runtime::Runtime;

/// Query name encode and decode
fn bench_query_names(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_names");

    group.bench_function("encode", |b| {
        b.iter(|| encode_name(black_box(0x1234_5678), "payload", "files.example.com"))
    });

    let name = encode_name(0x1234_5678, "payload", "files.example.com");
    group.bench_function("decode", |b| b.iter(|| decode_name(black_box(&name)).unwrap()));

    group.finish();
}

/// Payload encode and decode per record type
fn bench_payloads(c: &mut Criterion) {
    let chunk = vec![0xa5u8; MAX_PAYLOAD];
    let mut group = c.benchmark_group("payloads");

    for rtype in [RecordType::A, RecordType::AAAA, RecordType::TXT] {
        let capacity = rtype.payload_capacity().unwrap();
        group.throughput(Throughput::Bytes(capacity as u64));

        group.bench_with_input(BenchmarkId::new("encode", rtype), &rtype, |b, &rtype| {
            b.iter(|| encode_payload(black_box(&chunk[..capacity]), rtype).unwrap())
        });

        let answer = encode_payload(&chunk[..capacity], rtype).unwrap().to_string();
        let mut buf = [0u8; MAX_PAYLOAD];
        group.bench_with_input(BenchmarkId::new("decode", rtype), &rtype, |b, &rtype| {
            b.iter(|| decode_payload(black_box(&answer), rtype, &mut buf).unwrap())
        });
    }

    group.finish();
}

/// DoH message building and answer parsing
fn bench_doh_messages(c: &mut Criterion) {
    let mut group = c.benchmark_group("doh_messages");
    let name = encode_name(4096, "payload", "files.example.com");

    group.bench_function("build_query", |b| {
        b.iter(|| build_query(black_box(&name), RecordType::TXT).unwrap())
    });

    let mut answer = DnsMessage::new_query(&name, RecordType::TXT);
    answer.header.set_response(true);
    let body = encode_payload(&[0x5au8; MAX_PAYLOAD], RecordType::TXT).unwrap();
    answer
        .answers
        .push(dnsdrop::dns::DnsRecord::new(&name, &body, 1, 60));
    let bytes = answer.to_bytes().unwrap();

    group.bench_function("parse_answer", |b| {
        b.iter(|| parse_doh_answer(black_box(&bytes), RecordType::TXT).unwrap())
    });

    group.finish();
}

/// Full server handling of one query against a file on disk
fn bench_handle_query(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("payload"), vec![7u8; 64 * 1024]).unwrap();
    let handler = QueryHandler::new(dir.path(), 1800);
    let peer = "127.0.0.1:5300".parse().unwrap();

    let mut group = c.benchmark_group("handle_query");
    for rtype in [RecordType::A, RecordType::TXT] {
        let query = DnsMessage::new_query(&encode_name(1600, "payload", "files.example.com"), rtype)
            .to_bytes()
            .unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(rtype), &query, |b, query| {
            b.iter(|| rt.block_on(handler.handle_query(black_box(query), peer)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_query_names,
    bench_payloads,
    bench_doh_messages,
    bench_handle_query
);
criterion_main!(benches);
