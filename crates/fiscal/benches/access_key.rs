use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::NaiveDate;
use einvoice_core::{IssuerId, TaxPayerId, TransactionId};
use einvoice_fiscal::{
    AccessKey, AccessKeyInput, DocumentType, EmissionType, Environment, Issuer, NumericCode,
    Sequential, TaxPayer, TaxRate, Transaction, TransactionItem, TransactionKind, map_invoice,
};
use rust_decimal::Decimal;

fn key_input(seq: u64) -> AccessKeyInput {
    AccessKeyInput {
        date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
        document_type: DocumentType::Invoice,
        ruc: "1790012345001".into(),
        environment: Environment::Test,
        establishment: "001".into(),
        point: "001".into(),
        sequential: Sequential::new(seq).unwrap(),
        numeric_code: NumericCode::new(12_345_678).unwrap(),
        emission_type: EmissionType::Normal,
    }
}

fn bench_access_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("access_key");
    group.throughput(Throughput::Elements(1));

    let input = key_input(1501);
    group.bench_function("generate", |b| {
        b.iter(|| AccessKey::generate(black_box(&input)).unwrap())
    });

    let key = AccessKey::generate(&input).unwrap();
    let raw = key.to_string();
    group.bench_function("parse_and_verify", |b| {
        b.iter(|| AccessKey::parse(black_box(&raw)).unwrap())
    });

    group.finish();
}

fn bench_invoice_mapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("invoice_mapping");

    let issuer = Issuer {
        id: IssuerId::new(),
        ruc: "1790012345001".into(),
        business_name: "ACME S.A.".into(),
        trade_name: None,
        main_address: "Av. Amazonas 123".into(),
        establishment_address: "Quito".into(),
        establishment_code: "001".into(),
        emission_point_code: "001".into(),
        environment: Environment::Test,
        keep_accounting: false,
        signature_path: "/certs/acme.p12".into(),
        is_active: true,
    };
    let buyer = TaxPayer::final_consumer();
    let key = AccessKey::generate(&key_input(1)).unwrap();

    for item_count in [0usize, 10, 100] {
        let tx_id = TransactionId::new();
        let items: Vec<TransactionItem> = (0..item_count)
            .map(|i| TransactionItem {
                transaction_id: tx_id,
                code: Some(format!("SKU-{i}")),
                description: format!("Item {i}"),
                quantity: Decimal::ONE,
                unit_price: Decimal::new(1000, 2),
                subtotal: Decimal::new(1000, 2),
                tax_rate: if i % 2 == 0 { TaxRate::Fifteen } else { TaxRate::Zero },
            })
            .collect();
        let tx = Transaction {
            id: tx_id,
            kind: TransactionKind::Income,
            description: "Venta".into(),
            date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            amount: Decimal::new(11500, 2),
            subtotal_15: Decimal::new(10000, 2),
            subtotal_0: Decimal::ZERO,
            tax_amount: Decimal::new(1500, 2),
            taxpayer_id: Some(TaxPayerId::new()),
            voids_transaction_id: None,
        };

        group.throughput(Throughput::Elements(item_count.max(1) as u64));
        group.bench_with_input(
            BenchmarkId::new("map_and_serialize", item_count),
            &items,
            |b, items| {
                b.iter(|| {
                    let doc = map_invoice(black_box(&tx), items, &issuer, &buyer, &key);
                    doc.to_xml().unwrap()
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_access_key, bench_invoice_mapping);
criterion_main!(benches);
