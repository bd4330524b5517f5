//! Benchmarks for aggregate construction and event codec hot paths.

use chrono::NaiveDate;
use common::{FundId, SecurityId, TransactionId, TransactionSubTypeId};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use domain::{LedgerTransaction, TransactionCreated, TransactionDraft};
use rust_decimal::Decimal;

fn draft() -> TransactionDraft {
    TransactionDraft {
        fund_id: FundId::new(1),
        security_id: Some(SecurityId::new(10)),
        sub_type_id: TransactionSubTypeId::new(3),
        trade_date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
        settle_date: NaiveDate::from_ymd_opt(2026, 7, 3).unwrap(),
        quantity: Decimal::from(1000),
        price: "28.50".parse().unwrap(),
        amount: Decimal::from(28_500),
        currency: "BRL".to_string(),
        created_by: "bench-user".to_string(),
    }
}

fn bench_aggregate_create(c: &mut Criterion) {
    c.bench_function("aggregate_create", |b| {
        b.iter(|| {
            let tx =
                LedgerTransaction::create(TransactionId::new(), black_box(draft())).unwrap();
            black_box(tx)
        })
    });
}

fn bench_event_encode(c: &mut Criterion) {
    let tx = LedgerTransaction::create(TransactionId::new(), draft()).unwrap();
    let event = TransactionCreated::from_transaction(&tx, Some("corr".to_string()), None);

    c.bench_function("event_encode", |b| {
        b.iter(|| black_box(event.to_payload()))
    });
}

fn bench_event_decode(c: &mut Criterion) {
    let tx = LedgerTransaction::create(TransactionId::new(), draft()).unwrap();
    let event = TransactionCreated::from_transaction(&tx, Some("corr".to_string()), None);
    let payload = event.to_payload();

    c.bench_function("event_decode", |b| {
        b.iter(|| black_box(TransactionCreated::from_payload(&payload).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_aggregate_create,
    bench_event_encode,
    bench_event_decode
);
criterion_main!(benches);
