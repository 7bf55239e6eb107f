//! Command executor benchmark suite.
//!
//! Measures command execution against in-memory pages of growing size:
//! - List sizes: 10, 100, 1000 items
//! - Reads, batch writes, inspection, and a full bridge round trip
//!
//! Run with: cargo bench --bench executor
//! Results saved to: target/criterion/

use std::fmt::Write as _;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};
use tokio::runtime::Runtime;

use dom_bridge::{
    BridgeClient, BridgeConfig, CommandExecutor, DomCommand, LocalBus, MemoryDocument,
    MessagePort, PageListener,
};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const LIST_SIZES: &[usize] = &[10, 100, 1000];

fn page(items: usize) -> MemoryDocument {
    let mut html = String::from(r#"<main><h1 id="title">Catalog</h1><ul class="items">"#);
    for i in 0..items {
        let _ = write!(html, r#"<li class="item" data-sku="{i}"><span>Item {i}</span></li>"#);
    }
    html.push_str("</ul></main>");
    MemoryDocument::from_html(&html)
}

// ============================================================================
// Benchmark: Reads
// ============================================================================

fn bench_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");

    for &size in LIST_SIZES {
        let executor = CommandExecutor::new(page(size));
        let by_id: Value = json!({"action": "READ_TEXT", "selector": "#title"});
        let last: Value = json!({"action": "READ_ATTR", "selector": "ul.items > li", "index": size - 1, "attribute": "data-sku"});

        group.bench_with_input(BenchmarkId::new("by_id", size), &by_id, |b, command| {
            b.iter(|| executor.execute(command));
        });
        group.bench_with_input(BenchmarkId::new("last_of_list", size), &last, |b, command| {
            b.iter(|| executor.execute(command));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Batch Writes
// ============================================================================

fn bench_batch_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_write");

    for &size in LIST_SIZES {
        let executor = CommandExecutor::new(page(size));
        let command = json!({"action": "SET_ATTR", "selector": "li.item", "all": true, "attribute": "data-seen", "value": "1"});

        group.bench_with_input(BenchmarkId::new("set_attr_all", size), &command, |b, command| {
            b.iter(|| executor.execute(command));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Inspection
// ============================================================================

fn bench_query_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_all");

    for &size in LIST_SIZES {
        let executor = CommandExecutor::new(page(size));
        let command = json!({"action": "QUERY_ALL", "selector": "li.item", "limit": 20});

        group.bench_with_input(BenchmarkId::new("first_20", size), &command, |b, command| {
            b.iter(|| executor.execute(command));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Round Trip
// ============================================================================

fn bench_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let client = rt.block_on(async {
        let config = BridgeConfig::default();
        let bus = LocalBus::new();

        let (page_port, page_inbox) = bus.open("https://shop.test");
        let page_context = page_port.context();
        let executor = CommandExecutor::with_config(page(100), &config);
        PageListener::new(page_port, executor, &config).listen(page_inbox);

        let (ui_port, ui_inbox) = bus.open("https://ui.test");
        let client = BridgeClient::new(ui_port, config);
        client.attach(page_context, "https://shop.test").unwrap();
        client.listen(ui_inbox);
        client
    });

    let command = DomCommand::read_text("#title");
    c.bench_function("round_trip/read_text", |b| {
        b.to_async(&rt).iter(|| async { client.send(&command).await.unwrap() });
    });
}

criterion_group!(
    benches,
    bench_reads,
    bench_batch_writes,
    bench_query_all,
    bench_round_trip
);
criterion_main!(benches);
