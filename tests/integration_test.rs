//! Integration tests across ranking, signals, rotation and the daily cycle.

mod common;

use approx::assert_relative_eq;
use common::*;
use rstrader::domain::error::RsTraderError;
use rstrader::domain::live::{run_daily_cycle, LiveConfig, LivePorts};
use rstrader::domain::portfolio::PositionBook;
use rstrader::domain::position::{Position, PositionStatus};
use rstrader::domain::ranking::{rank_assets, relative_strength, PriceMatrix};
use rstrader::domain::rotation::{
    AssetSnapshot, CloseReason, CycleInput, Recommendation, RotationEngine, SkipReason,
};
use rstrader::domain::structure::{detect_structure, detect_swings, StructureEvent, StructureKind, SwingKind};
use rstrader::domain::trend::{directional_trend_filled, rsi_ema_trend, DirectionalParams, TrendState};
use std::collections::BTreeMap;

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn falling(asset: &str, count: usize, start: f64) -> Vec<PricePoint> {
    rising(asset, count, start, -0.02)
}

fn histories(entries: Vec<(&str, Vec<PricePoint>)>) -> BTreeMap<String, Vec<PricePoint>> {
    entries.into_iter().map(|(a, h)| (a.to_string(), h)).collect()
}

/// Snapshot with a chosen trend and structure, trading at `open`/`close` today.
fn snapshot(
    asset: &str,
    when: chrono::NaiveDate,
    open: f64,
    close: f64,
    trend: TrendState,
    structure: Option<StructureKind>,
) -> AssetSnapshot {
    AssetSnapshot {
        asset_id: asset.to_string(),
        bar: bar(asset, when, open, open.max(close), open.min(close), close),
        lagged_trend: trend,
        structure: structure.map(|kind| StructureEvent {
            index: 10,
            kind,
            reference_level: open,
        }),
    }
}

mod ranking {
    use super::*;

    #[test]
    fn uptrend_ranks_above_flat_and_falling() {
        let days = 40;
        let universe = histories(vec![
            ("a", rising("a", days, 100.0, 0.02)),
            ("b", flat("b", days, 50.0)),
            ("c", falling("c", days, 80.0)),
        ]);
        let result = rank_assets(&universe, day(days - 1), 14);

        let order: Vec<(&str, u8)> = result
            .ranking
            .iter()
            .map(|r| (r.asset_id.as_str(), r.score))
            .collect();
        assert_eq!(order, vec![("a", 100), ("b", 50), ("c", 0)]);
        assert_eq!(result.top_assets(2), ids(&["a", "b"]));
        assert!(result.excluded.is_empty());
    }

    #[test]
    fn short_histories_are_excluded_not_fatal() {
        let universe = histories(vec![
            ("a", rising("a", 40, 100.0, 0.02)),
            ("b", flat("b", 40, 50.0)),
            ("new", flat("new", 5, 1.0)),
        ]);
        let result = rank_assets(&universe, day(39), 14);
        assert_eq!(result.ranking.len(), 2);
        assert_eq!(result.excluded.len(), 1);
        assert!(matches!(
            &result.excluded[0].1,
            RsTraderError::InsufficientHistory { bars: 5, minimum: 14, .. }
        ));
    }

    #[test]
    fn ranking_ignores_future_bars() {
        let mut a = rising("a", 30, 100.0, 0.02);
        let b = flat("b", 40, 50.0);
        // a collapses after day 29; ranking as of day 29 must not see it
        let mut last = a[29].close;
        for i in 30..40 {
            let next = last * 0.9;
            a.push(bar("a", day(i), last, last, next, next));
            last = next;
        }
        let cut = histories(vec![("a", a[..30].to_vec()), ("b", b[..30].to_vec())]);
        let full = histories(vec![("a", a), ("b", b)]);

        let before = rank_assets(&cut, day(29), 14);
        let as_of = rank_assets(&full, day(29), 14);
        assert_eq!(before.ranking, as_of.ranking);
        assert_eq!(as_of.top_assets(1), ids(&["a"]));
    }
}

mod rotation {
    use super::*;

    #[test]
    fn three_longs_are_sized_from_pre_trade_equity() {
        let today = day(20);
        let market: BTreeMap<String, AssetSnapshot> = [
            snapshot("a", today, 10.0, 11.0, TrendState::Up, None),
            snapshot("b", today, 20.0, 19.0, TrendState::Up, None),
            snapshot("c", today, 5.0, 5.0, TrendState::Up, None),
        ]
        .into_iter()
        .map(|s| (s.asset_id.clone(), s))
        .collect();

        let mut book = PositionBook::new(1000.0);
        let top = ids(&["a", "b", "c"]);
        let outcome = RotationEngine::default().evaluate_cycle(
            &mut book,
            &CycleInput {
                date: today,
                top_assets: &top,
                market: &market,
            },
        );

        assert_eq!(outcome.opens.len(), 3);
        assert_relative_eq!(book.get("a").unwrap().units, 1000.0 / 3.0 / 10.0, epsilon = 1e-9);
        assert_relative_eq!(book.get("b").unwrap().units, 1000.0 / 3.0 / 20.0, epsilon = 1e-9);
        assert_relative_eq!(book.cash, 0.0, epsilon = 1e-9);
        let expected = 1000.0 / 3.0 * (11.0 / 10.0 + 19.0 / 20.0 + 1.0);
        assert_relative_eq!(outcome.snapshot.equity, expected, epsilon = 1e-9);
    }

    #[test]
    fn rotation_across_days_keeps_the_cap() {
        let engine = RotationEngine::default();
        let mut book = PositionBook::new(900.0);

        let day1 = day(1);
        let m1: BTreeMap<String, AssetSnapshot> = ["a", "b", "c"]
            .iter()
            .map(|id| (id.to_string(), snapshot(id, day1, 10.0, 10.0, TrendState::Up, None)))
            .collect();
        let top1 = ids(&["a", "b", "c"]);
        engine.evaluate_cycle(
            &mut book,
            &CycleInput {
                date: day1,
                top_assets: &top1,
                market: &m1,
            },
        );
        assert_eq!(book.len(), 3);

        // c drops out of the top set and rises to 12; d becomes a long
        let day2 = day(2);
        let m2: BTreeMap<String, AssetSnapshot> = [
            snapshot("a", day2, 10.0, 10.0, TrendState::Up, None),
            snapshot("b", day2, 10.0, 10.0, TrendState::Up, None),
            snapshot("c", day2, 12.0, 12.0, TrendState::Up, None),
            snapshot("d", day2, 4.0, 4.0, TrendState::Up, None),
        ]
        .into_iter()
        .map(|s| (s.asset_id.clone(), s))
        .collect();
        let top2 = ids(&["d", "a", "b"]);
        let outcome = engine.evaluate_cycle(
            &mut book,
            &CycleInput {
                date: day2,
                top_assets: &top2,
                market: &m2,
            },
        );

        assert_eq!(outcome.closes.len(), 1);
        assert_eq!(outcome.closes[0].reason, CloseReason::RotatedOut);
        assert_relative_eq!(outcome.closes[0].position.realized_pnl.unwrap(), 60.0, epsilon = 1e-9);
        assert_eq!(outcome.opens.len(), 1);
        assert_eq!(outcome.opens[0].asset_id, "d");
        assert!(book.len() <= 3);
        // 960 equity at the open, a third of it into d
        assert_relative_eq!(outcome.opens[0].units, 320.0 / 4.0, epsilon = 1e-9);
        assert_relative_eq!(book.cash, 360.0 - 320.0, epsilon = 1e-9);
    }

    #[test]
    fn bearish_change_from_history_closes_a_held_position() {
        let mut history = rising("a", 30, 100.0, 0.02);
        let prev = history[29].close;
        history.push(bar("a", day(30), prev, prev, prev * 0.95, prev * 0.96));

        let params = DirectionalParams::default();
        let snap = AssetSnapshot::from_history("a", &history, day(30), &params).unwrap();
        assert_eq!(snap.lagged_trend, TrendState::Up);
        assert_eq!(snap.structure.map(|e| e.kind), Some(StructureKind::BearishChange));
        assert_eq!(snap.recommendation(), Recommendation::ExitBearish);

        let mut book = PositionBook::new(0.0);
        book.insert(Position::open("a", 100.0, day(10), 1.0));
        let market: BTreeMap<String, AssetSnapshot> = [("a".to_string(), snap)].into_iter().collect();
        let top = ids(&["a"]);
        let outcome = RotationEngine::default().evaluate_cycle(
            &mut book,
            &CycleInput {
                date: day(30),
                top_assets: &top,
                market: &market,
            },
        );
        assert_eq!(outcome.closes.len(), 1);
        assert_eq!(outcome.closes[0].reason, CloseReason::BearishChange);
        assert_relative_eq!(book.cash, prev, epsilon = 1e-9);
        assert!(book.is_empty());
    }

    #[test]
    fn bullish_change_in_uptrend_reenters() {
        let today = day(5);
        let market: BTreeMap<String, AssetSnapshot> = [(
            "a".to_string(),
            snapshot("a", today, 8.0, 9.0, TrendState::Up, Some(StructureKind::BullishChange)),
        )]
        .into_iter()
        .collect();
        let mut book = PositionBook::new(300.0);
        let top = ids(&["a"]);
        let outcome = RotationEngine::default().evaluate_cycle(
            &mut book,
            &CycleInput {
                date: today,
                top_assets: &top,
                market: &market,
            },
        );
        assert_eq!(outcome.decisions[0].recommendation, Recommendation::LongReentry);
        assert_eq!(outcome.opens.len(), 1);
        assert_relative_eq!(outcome.opens[0].units, 100.0 / 8.0, epsilon = 1e-9);
    }

    #[test]
    fn missing_bar_keeps_rotated_out_position() {
        let today = day(3);
        let mut book = PositionBook::new(0.0);
        book.insert(Position::open("gone", 10.0, day(1), 2.0));
        let market = BTreeMap::new();
        let top = ids(&["x"]);
        let outcome = RotationEngine::default().evaluate_cycle(
            &mut book,
            &CycleInput {
                date: today,
                top_assets: &top,
                market: &market,
            },
        );
        assert!(book.holds("gone"));
        assert!(outcome.closes.is_empty());
        assert!(outcome
            .skipped
            .iter()
            .any(|s| s.asset_id == "gone" && s.reason == SkipReason::MissingPrice));
    }
}

mod live_cycle {
    use super::*;

    const DAYS: usize = 40;

    fn prices() -> MockPrices {
        MockPrices::new()
            .with_bars("a", rising("a", DAYS, 100.0, 0.02))
            .with_bars("b", flat("b", DAYS, 50.0))
            .with_bars("c", falling("c", DAYS, 80.0))
            .with_name("a", "Alpha")
    }

    #[test]
    fn first_run_opens_the_uptrending_asset() {
        let prices = prices();
        let trades = MemoryTradeStore::new();
        let top_list = MemoryTopList::empty();
        let notifier = RecordingNotifier::new();
        let ports = LivePorts {
            prices: &prices,
            trades: &trades,
            top_list: &top_list,
            notifier: &notifier,
        };

        let report = run_daily_cycle(&ports, &ids(&["a", "b", "c"]), &LiveConfig::default(), None).unwrap();

        assert_eq!(report.date, day(DAYS - 1));
        assert_eq!(report.top_assets, ids(&["a", "b", "c"]));
        assert!(report.change.is_none());
        assert_eq!(*top_list.list.borrow(), Some(ids(&["a", "b", "c"])));

        let opens = &report.outcome.opens;
        assert_eq!(opens.len(), 1);
        assert_eq!(opens[0].asset_id, "a");
        let entry = prices.data["a"][DAYS - 1].open;
        assert_relative_eq!(opens[0].entry_price, entry);
        assert_relative_eq!(opens[0].units, 1000.0 / 3.0 / entry, epsilon = 1e-9);

        assert_eq!(trades.open_count(), 1);
        assert_eq!(trades.trades.borrow()[0].trade_id, Some(1));
        let snapshots = trades.snapshots.borrow();
        assert_eq!(snapshots.len(), 1);
        assert_relative_eq!(snapshots[0].cash, 1000.0 - 1000.0 / 3.0, epsilon = 1e-9);

        assert!(notifier.contains("No previous top list"));
        assert!(notifier.contains("Alpha (a)"));
        assert!(notifier.contains("Opened LONG"));
        assert!(notifier.contains("Portfolio equity"));
        assert_eq!(report.signals.len(), 3);
    }

    #[test]
    fn second_run_on_the_same_day_trades_nothing() {
        let prices = prices();
        let trades = MemoryTradeStore::new();
        let top_list = MemoryTopList::empty();
        let notifier = RecordingNotifier::new();
        let ports = LivePorts {
            prices: &prices,
            trades: &trades,
            top_list: &top_list,
            notifier: &notifier,
        };
        let assets = ids(&["a", "b", "c"]);
        let config = LiveConfig::default();

        run_daily_cycle(&ports, &assets, &config, None).unwrap();
        let again = run_daily_cycle(&ports, &assets, &config, None).unwrap();

        assert!(again.outcome.opens.is_empty());
        assert!(again.outcome.closes.is_empty());
        assert_eq!(again.outcome.holds, ids(&["a"]));
        assert!(again.change.as_ref().unwrap().is_unchanged());
        assert!(notifier.contains("Top list unchanged"));
        assert_eq!(trades.open_count(), 1);
        assert_eq!(trades.snapshots.borrow().len(), 2);
    }

    #[test]
    fn reloaded_book_closes_down_trending_holding() {
        let prices = prices();
        let trades = MemoryTradeStore::new()
            .with_trade(Position::open("c", 80.0, day(2), 2.0))
            .with_trade({
                let mut p = Position::open("b", 50.0, day(1), 1.0);
                p.close(60.0, day(2));
                p
            });
        let top_list = MemoryTopList::with(&["c", "b", "a"]);
        let notifier = RecordingNotifier::new();
        let ports = LivePorts {
            prices: &prices,
            trades: &trades,
            top_list: &top_list,
            notifier: &notifier,
        };

        let report = run_daily_cycle(&ports, &ids(&["a", "b", "c"]), &LiveConfig::default(), None).unwrap();
        let outcome = &report.outcome;

        // cash = 1000 + 10 realized - 160 open cost
        let exit = prices.data["c"][DAYS - 1].open;
        assert_relative_eq!(outcome.starting_equity, 850.0 + 2.0 * exit, epsilon = 1e-9);
        assert_eq!(outcome.closes.len(), 1);
        assert_eq!(outcome.closes[0].reason, CloseReason::TrendDown);
        assert_eq!(trades.open_count(), 1);

        let stored = trades.trades.borrow();
        let c = stored.iter().find(|p| p.asset_id == "c").unwrap();
        assert_eq!(c.status, PositionStatus::Closed);
        assert_relative_eq!(c.realized_pnl.unwrap(), (exit - 80.0) * 2.0, epsilon = 1e-9);
    }

    #[test]
    fn persistence_failure_is_surfaced() {
        let prices = prices();
        let trades = MemoryTradeStore::new();
        trades.fail_writes.set(true);
        let top_list = MemoryTopList::empty();
        let notifier = RecordingNotifier::new();
        let ports = LivePorts {
            prices: &prices,
            trades: &trades,
            top_list: &top_list,
            notifier: &notifier,
        };

        let err = run_daily_cycle(&ports, &ids(&["a", "b", "c"]), &LiveConfig::default(), None).unwrap_err();
        assert!(matches!(err, RsTraderError::PersistenceFailure { .. }));
        // the top list write is not rolled back
        assert!(top_list.list.borrow().is_some());
    }

    #[test]
    fn zero_unit_open_trade_is_a_data_integrity_error() {
        let prices = prices();
        let trades = MemoryTradeStore::new().with_trade(Position::open("a", 10.0, day(1), 0.0));
        let top_list = MemoryTopList::empty();
        let notifier = RecordingNotifier::new();
        let ports = LivePorts {
            prices: &prices,
            trades: &trades,
            top_list: &top_list,
            notifier: &notifier,
        };

        let err = run_daily_cycle(&ports, &ids(&["a", "b", "c"]), &LiveConfig::default(), None).unwrap_err();
        assert!(matches!(err, RsTraderError::DataIntegrity { .. }));
    }

    #[test]
    fn notification_failures_do_not_stop_the_cycle() {
        let prices = prices();
        let trades = MemoryTradeStore::new();
        let top_list = MemoryTopList::empty();
        let notifier = RecordingNotifier::failing();
        let ports = LivePorts {
            prices: &prices,
            trades: &trades,
            top_list: &top_list,
            notifier: &notifier,
        };

        let report = run_daily_cycle(&ports, &ids(&["a", "b", "c"]), &LiveConfig::default(), None).unwrap();
        assert_eq!(report.outcome.opens.len(), 1);
        assert!(notifier.messages.borrow().len() > 1);
    }

    #[test]
    fn unloadable_asset_is_skipped() {
        let prices = prices().with_error("broken", "connection reset");
        let trades = MemoryTradeStore::new();
        let top_list = MemoryTopList::empty();
        let notifier = RecordingNotifier::new();
        let ports = LivePorts {
            prices: &prices,
            trades: &trades,
            top_list: &top_list,
            notifier: &notifier,
        };

        // a storage error is not a per-asset skip
        let err = run_daily_cycle(&ports, &ids(&["a", "broken"]), &LiveConfig::default(), None).unwrap_err();
        assert!(matches!(err, RsTraderError::Database { .. }));

        let report = run_daily_cycle(&ports, &ids(&["a", "b", "missing"]), &LiveConfig::default(), None).unwrap();
        assert_eq!(report.top_assets, ids(&["a", "b"]));
    }
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    fn arb_bars(max_len: usize) -> impl Strategy<Value = Vec<PricePoint>> {
        prop::collection::vec((-0.05f64..0.05, 0.0f64..0.03, 0.0f64..0.03), 2..max_len).prop_map(|steps| {
            let mut close = 100.0;
            steps
                .into_iter()
                .enumerate()
                .map(|(i, (change, up, down))| {
                    let open = close;
                    close = open * (1.0 + change);
                    bar(
                        "p",
                        day(i),
                        open,
                        open.max(close) * (1.0 + up),
                        open.min(close) * (1.0 - down),
                        close,
                    )
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn signals_never_repaint(bars in arb_bars(60), cut in 1usize..60) {
            let cut = cut.min(bars.len());
            let prefix = &bars[..cut];
            let params = DirectionalParams::default();

            prop_assert_eq!(detect_swings(prefix), detect_swings(&bars)[..cut].to_vec());
            prop_assert_eq!(detect_structure(prefix), detect_structure(&bars)[..cut].to_vec());
            prop_assert_eq!(
                directional_trend_filled(prefix, &params),
                directional_trend_filled(&bars, &params)[..cut].to_vec()
            );

            let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
            prop_assert_eq!(rsi_ema_trend(&closes[..cut]), rsi_ema_trend(&closes)[..cut].to_vec());
        }

        #[test]
        fn structure_events_land_on_swings(bars in arb_bars(60)) {
            let swings = detect_swings(&bars);
            for (i, event) in detect_structure(&bars).iter().enumerate() {
                if let Some(event) = event {
                    prop_assert_eq!(event.index, i);
                    let swing = swings[i].unwrap();
                    match event.kind {
                        StructureKind::BullishChange => prop_assert_eq!(swing.kind, SwingKind::High),
                        StructureKind::BearishChange => prop_assert_eq!(swing.kind, SwingKind::Low),
                    }
                }
            }
        }

        #[test]
        fn pairwise_wins_never_exceed_pair_count(
            a in arb_bars(40), b in arb_bars(40), c in arb_bars(40)
        ) {
            let relabel = |bars: Vec<PricePoint>, id: &str| -> Vec<PricePoint> {
                bars.into_iter().map(|p| PricePoint { asset_id: id.to_string(), ..p }).collect()
            };
            let owned = histories(vec![("a", relabel(a, "a")), ("b", relabel(b, "b")), ("c", relabel(c, "c"))]);
            let view: BTreeMap<String, &[PricePoint]> =
                owned.iter().map(|(k, v)| (k.clone(), v.as_slice())).collect();
            let scores = relative_strength(&PriceMatrix::align(&view));
            for (row, wins) in scores.wins.iter().enumerate() {
                prop_assert!(wins.iter().sum::<u32>() <= 3);
                for (&w, &s) in wins.iter().zip(&scores.scores[row]) {
                    prop_assert!(w <= 2);
                    prop_assert_eq!(u32::from(s), w * 100 / 2);
                }
            }
        }

        #[test]
        fn engine_respects_cap_and_cash(
            days in prop::collection::vec(
                prop::collection::vec((0usize..6, 0usize..3, 1.0f64..50.0), 0..6),
                1..12
            )
        ) {
            let engine = RotationEngine::default();
            let mut book = PositionBook::new(1000.0);
            let trends = [TrendState::Up, TrendState::Down, TrendState::Undefined];

            for (d, entries) in days.into_iter().enumerate() {
                let when = day(d);
                let mut market = BTreeMap::new();
                let mut top = Vec::new();
                for (asset, trend, price) in entries {
                    let id = format!("x{asset}");
                    top.push(id.clone());
                    market.insert(id.clone(), snapshot(&id, when, price, price, trends[trend], None));
                }
                let outcome = engine.evaluate_cycle(&mut book, &CycleInput { date: when, top_assets: &top, market: &market });

                prop_assert!(book.len() <= 3);
                prop_assert!(book.cash >= -1e-6);
                prop_assert!(outcome.opens.len() + outcome.holds.len() <= 3);
                for position in book.positions.values() {
                    prop_assert!(position.units > 0.0);
                }
            }
        }
    }
}
