use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;
use sim_core::*;

fn plant(n_lines: usize) -> ScenarioConfig {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let lines = (0..n_lines)
        .map(|i| LineConfig {
            id: LineId(format!("LINE-{i}")),
            equipment: vec![
                EquipmentConfig {
                    id: EquipmentId(format!("FIL-{i}")),
                    kind: EquipmentKind::Filler,
                },
                EquipmentConfig {
                    id: EquipmentId(format!("PAC-{i}")),
                    kind: EquipmentKind::Packer,
                },
                EquipmentConfig {
                    id: EquipmentId(format!("PAL-{i}")),
                    kind: EquipmentKind::Palletizer,
                },
            ],
        })
        .collect();
    let mut efficiency = std::collections::BTreeMap::new();
    efficiency.insert(EquipmentKind::Filler, FactorBounds { min: 0.9, max: 1.0 });
    efficiency.insert(EquipmentKind::Packer, FactorBounds { min: 0.85, max: 1.0 });
    ScenarioConfig {
        horizon: Horizon {
            start,
            end: start + chrono::Duration::days(7),
        },
        interval_minutes: 5,
        rng_seed: 42,
        lines,
        products: vec![Product {
            id: ProductId::from("SKU-1"),
            name: "Sparkling 500ml".into(),
            target_rate: 500,
            unit_cost: Decimal::new(35, 2),
            unit_price: Decimal::new(99, 2),
            scrap_rate: 0.02,
            degraded_lines: vec![],
            quality_issue_scrap_rate: None,
        }],
        downtime_reasons: vec![DowntimeReason {
            code: "UNP-MICRO".into(),
            description: "Micro-stop".into(),
        }],
        schedule: ScheduleConfig {
            run_minutes: MinuteBounds { min: 240, max: 720 },
            changeover_minutes: MinuteBounds { min: 20, max: 60 },
        },
        anomalies: AnomalyConfig {
            micro_stops: Some(MicroStopConfig {
                equipment: vec![EquipmentId::from("PAC-0")],
                probability: 0.05,
                duration_minutes: MinuteBounds { min: 2, max: 15 },
                reason: "UNP-MICRO".into(),
            }),
            equipment_efficiency: efficiency,
            changeover_scrap: Some(ChangeoverScrapConfig {
                window_minutes: 30,
                multiplier: 2.5,
            }),
            ..AnomalyConfig::default()
        },
    }
}

fn bench_week(c: &mut Criterion) {
    let cfg = plant(4);
    c.bench_function("4 lines x 1 week @ 5min", |b| {
        b.iter(|| {
            let out = sim_runtime::run_seeded(black_box(&cfg), 42).unwrap();
            black_box(out.records.len())
        })
    });
}

criterion_group!(benches, bench_week);
criterion_main!(benches);
