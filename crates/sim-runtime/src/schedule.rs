//! Production schedule generation.

use chrono::{Duration, NaiveDateTime};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sim_core::{
    ConfigError, Horizon, LineId, MasterData, MinuteBounds, OrderId, ProductionOrder,
    ScheduleConfig,
};
use tracing::info;

/// Orders for every line plus the instants where a changeover ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    orders: Vec<ProductionOrder>,
    changeovers: Vec<NaiveDateTime>,
}

impl Schedule {
    /// Build a schedule from explicit orders.
    ///
    /// Orders are sorted by line (topology order) then start. Every order must
    /// reference a known line and product, have a non-empty window, and not
    /// overlap its predecessor on the same line.
    pub fn new(
        mut orders: Vec<ProductionOrder>,
        master: &MasterData,
    ) -> Result<Self, ConfigError> {
        let line_rank = |l: &LineId| master.lines().iter().position(|x| x == l);
        for o in &orders {
            if line_rank(&o.line).is_none() {
                return Err(ConfigError::UnknownLine(o.line.0.clone()));
            }
            if master.product(&o.product).is_none() {
                return Err(ConfigError::UnknownProduct(o.product.0.clone()));
            }
            if o.end <= o.start {
                return Err(ConfigError::EmptyHorizon {
                    start: o.start,
                    end: o.end,
                });
            }
        }
        orders.sort_by(|a, b| {
            line_rank(&a.line)
                .cmp(&line_rank(&b.line))
                .then(a.start.cmp(&b.start))
        });

        let mut changeovers = Vec::new();
        for pair in orders.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.line != next.line {
                continue;
            }
            if next.start < prev.end {
                return Err(ConfigError::OverlappingOrders(next.id.0.clone()));
            }
            changeovers.push(next.start);
        }
        changeovers.sort();
        Ok(Self {
            orders,
            changeovers,
        })
    }

    pub fn orders(&self) -> &[ProductionOrder] {
        &self.orders
    }

    /// Orders of one line in time order.
    pub fn orders_for_line<'a>(
        &'a self,
        line: &'a LineId,
    ) -> impl Iterator<Item = &'a ProductionOrder> + 'a {
        self.orders.iter().filter(move |o| &o.line == line)
    }

    /// Sorted start instants of orders that follow another order on their line.
    pub fn changeovers(&self) -> &[NaiveDateTime] {
        &self.changeovers
    }
}

fn check_bounds(field: &str, b: &MinuteBounds) -> Result<(), ConfigError> {
    if b.is_degenerate() {
        return Err(ConfigError::DegenerateRange {
            field: field.to_string(),
            min: f64::from(b.min),
            max: f64::from(b.max),
        });
    }
    Ok(())
}

fn minutes(m: u32) -> Duration {
    Duration::minutes(i64::from(m))
}

/// Generate back-to-back orders on every line across `[start, end)`.
///
/// Each order picks a product uniformly from the catalog and a run length
/// uniformly from `run_minutes`, clipped at the horizon end; the next order
/// starts after a gap drawn uniformly from `changeover_minutes`.
pub fn generate_schedule<R: Rng + ?Sized>(
    horizon: Horizon,
    bounds: &ScheduleConfig,
    master: &MasterData,
    rng: &mut R,
) -> Result<Schedule, ConfigError> {
    check_bounds("schedule.run_minutes", &bounds.run_minutes)?;
    check_bounds("schedule.changeover_minutes", &bounds.changeover_minutes)?;
    if bounds.run_minutes.min == 0 {
        return Err(ConfigError::ZeroRunDuration);
    }
    let products = master.products();
    if products.is_empty() {
        return Err(ConfigError::Empty("product catalog"));
    }

    let mut orders = Vec::new();
    for line in master.lines() {
        let mut cursor = horizon.start;
        while cursor < horizon.end {
            let product = &products[rng.gen_range(0..products.len())];
            let run = rng.gen_range(bounds.run_minutes.min..=bounds.run_minutes.max);
            let end = (cursor + minutes(run)).min(horizon.end);
            orders.push(ProductionOrder {
                id: OrderId(format!("ORD-{:05}", orders.len() + 1)),
                line: line.clone(),
                product: product.id.clone(),
                start: cursor,
                end,
            });
            let gap =
                rng.gen_range(bounds.changeover_minutes.min..=bounds.changeover_minutes.max);
            cursor = end + minutes(gap);
        }
    }
    let schedule = Schedule::new(orders, master)?;
    info!(
        lines = master.lines().len(),
        orders = schedule.orders().len(),
        changeovers = schedule.changeovers().len(),
        "generated production schedule"
    );
    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{at, scenario};
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use sim_core::{validate_scenario, ProductId};

    fn generate(run: MinuteBounds, gap: MinuteBounds, seed: u64) -> (Schedule, Horizon) {
        let mut cfg = scenario();
        cfg.schedule.run_minutes = run;
        cfg.schedule.changeover_minutes = gap;
        let master = validate_scenario(&cfg).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let s = generate_schedule(cfg.horizon, &cfg.schedule, &master, &mut rng).unwrap();
        (s, cfg.horizon)
    }

    #[test]
    fn degenerate_bounds_fail_fast() {
        let cfg = scenario();
        let master = validate_scenario(&cfg).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut bounds = cfg.schedule.clone();
        bounds.changeover_minutes = MinuteBounds { min: 20, max: 10 };
        assert!(matches!(
            generate_schedule(cfg.horizon, &bounds, &master, &mut rng),
            Err(ConfigError::DegenerateRange { .. })
        ));
        bounds.changeover_minutes = MinuteBounds { min: 0, max: 0 };
        bounds.run_minutes = MinuteBounds { min: 0, max: 0 };
        assert_eq!(
            generate_schedule(cfg.horizon, &bounds, &master, &mut rng).unwrap_err(),
            ConfigError::ZeroRunDuration
        );
    }

    #[test]
    fn contiguous_orders_tile_the_horizon() {
        let (s, h) = generate(
            MinuteBounds { min: 50, max: 70 },
            MinuteBounds { min: 0, max: 0 },
            4,
        );
        for line in ["LINE-1", "LINE-2"] {
            let line = LineId::from(line);
            let orders: Vec<_> = s.orders_for_line(&line).collect();
            assert_eq!(orders.first().unwrap().start, h.start);
            assert_eq!(orders.last().unwrap().end, h.end);
            for pair in orders.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
            }
        }
    }

    #[test]
    fn order_ids_are_sequential() {
        let (s, _) = generate(
            MinuteBounds { min: 120, max: 240 },
            MinuteBounds { min: 10, max: 20 },
            2,
        );
        let mut ids: Vec<_> = s.orders().iter().map(|o| o.id.0.clone()).collect();
        ids.sort();
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(id, &format!("ORD-{:05}", i + 1));
        }
    }

    #[test]
    fn explicit_orders_reject_overlap() {
        let cfg = scenario();
        let master = validate_scenario(&cfg).unwrap();
        let order = |id: &str, start, end| ProductionOrder {
            id: OrderId::from(id),
            line: LineId::from("LINE-1"),
            product: ProductId::from("SKU-1"),
            start,
            end,
        };
        let ok = Schedule::new(
            vec![order("B", at(8, 0), at(9, 0)), order("A", at(6, 0), at(7, 30))],
            &master,
        )
        .unwrap();
        assert_eq!(ok.orders()[0].id.0, "A");
        assert_eq!(ok.changeovers(), &[at(8, 0)]);

        let err = Schedule::new(
            vec![order("A", at(6, 0), at(8, 0)), order("B", at(7, 0), at(9, 0))],
            &master,
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::OverlappingOrders("B".to_string()));
    }

    proptest! {
        #[test]
        fn orders_never_overlap_and_stay_in_horizon(
            run_min in 5u32..200,
            run_extra in 0u32..200,
            gap_min in 0u32..60,
            gap_extra in 0u32..60,
            seed in any::<u64>(),
        ) {
            let (s, h) = generate(
                MinuteBounds { min: run_min, max: run_min + run_extra },
                MinuteBounds { min: gap_min, max: gap_min + gap_extra },
                seed,
            );
            for line in ["LINE-1", "LINE-2"] {
                let line = LineId::from(line);
                let orders: Vec<_> = s.orders_for_line(&line).collect();
                prop_assert!(!orders.is_empty());
                prop_assert_eq!(orders[0].start, h.start);
                for o in &orders {
                    prop_assert!(o.start < o.end);
                    prop_assert!(o.end <= h.end);
                    let len = (o.end - o.start).num_minutes();
                    prop_assert!(len <= i64::from(run_min + run_extra));
                    if o.end < h.end {
                        prop_assert!(len >= i64::from(run_min));
                    }
                }
                for pair in orders.windows(2) {
                    let gap = (pair[1].start - pair[0].end).num_minutes();
                    prop_assert!(gap >= i64::from(gap_min));
                    prop_assert!(gap <= i64::from(gap_min + gap_extra));
                }
                let last = orders.last().unwrap();
                let tail = (h.end - last.end).num_minutes();
                prop_assert!(last.end == h.end || tail <= i64::from(gap_min + gap_extra));
            }
        }
    }
}
