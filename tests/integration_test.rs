//! End-to-end backtests through the public API.

mod common;

use approx::assert_relative_eq;
use common::*;
use fundsim::adapters::synthetic_adapter::SyntheticAdapter;
use fundsim::domain::agents::{AgentParams, standard_pipeline};
use fundsim::domain::backtest::{BacktestConfig, BacktestEngine, EngineState, run_backtest};
use fundsim::domain::error::FundsimError;
use fundsim::domain::execution::ExecutionWarning;
use fundsim::domain::pipeline::{Pipeline, PipelineConfig};
use fundsim::domain::signal::{Action, Decision, StageId};
use std::time::Duration;

fn config(start: chrono::NaiveDate, end: chrono::NaiveDate) -> BacktestConfig {
    BacktestConfig {
        starting_cash: 100_000.0,
        lookback_days: 0,
        ..BacktestConfig::new("BTC", start, end)
    }
}

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn single_buy_keeps_equity_at_starting_cash() {
        let bars = daily_bars(day(0), &[42_000.0, 43_000.0, 41_000.0]);
        let data = MockDataPort::new().with_bars("BTC", bars);
        let pipeline = scripted_pipeline(vec![(day(0), Decision::buy(0.5))]);

        let result = run_backtest(&data, config(day(0), day(2)), &pipeline)
            .await
            .unwrap();

        assert_eq!(result.records.len(), 3);
        let first = &result.records[0];
        assert_eq!(first.action, Action::Buy);
        assert_relative_eq!(first.cash_after, 79_000.0);
        assert_relative_eq!(first.quantity_after, 0.5);
        assert_relative_eq!(first.equity_after, 100_000.0);

        for record in &result.records[1..] {
            assert_eq!(record.action, Action::Hold);
            assert_relative_eq!(record.cash_after, 79_000.0);
        }
        assert_relative_eq!(result.records[1].equity_after, 100_500.0);
        assert_relative_eq!(result.records[2].equity_after, 99_500.0);
    }

    #[tokio::test]
    async fn malformed_decisions_execute_as_holds() {
        let bars = daily_bars(day(0), &[100.0, 100.0, 100.0]);
        let data = MockDataPort::new().with_bars("BTC", bars);
        let pipeline = scripted_pipeline(vec![
            (
                day(0),
                Decision {
                    action: Action::Buy,
                    quantity: -5.0,
                },
            ),
            (
                day(1),
                Decision {
                    action: Action::Buy,
                    quantity: f64::NAN,
                },
            ),
            (
                day(2),
                Decision {
                    action: Action::Sell,
                    quantity: f64::INFINITY,
                },
            ),
        ]);
        let cfg = BacktestConfig {
            starting_cash: 1_000.0,
            ..config(day(0), day(2))
        };

        let result = run_backtest(&data, cfg, &pipeline).await.unwrap();

        for record in &result.records {
            assert_eq!(record.action, Action::Hold);
            assert_eq!(record.quantity, 0.0);
            assert_relative_eq!(record.cash_after, 1_000.0);
            assert_eq!(record.quantity_after, 0.0);
            assert_relative_eq!(record.equity_after, 1_000.0);
        }
    }

    #[tokio::test]
    async fn oversell_is_clamped_to_held_quantity() {
        let bars = daily_bars(day(0), &[100.0, 110.0, 120.0]);
        let data = MockDataPort::new().with_bars("BTC", bars);
        let pipeline = scripted_pipeline(vec![
            (day(0), Decision::buy(10.0)),
            (day(1), Decision::sell(25.0)),
        ]);

        let result = run_backtest(&data, config(day(0), day(2)), &pipeline)
            .await
            .unwrap();

        let sell = &result.records[1];
        assert_eq!(sell.action, Action::Sell);
        assert_eq!(sell.quantity, 10.0);
        assert_eq!(sell.quantity_after, 0.0);
        assert_eq!(
            sell.warning,
            Some(ExecutionWarning::SellClamped {
                requested: 25.0,
                executed: 10.0
            })
        );
        assert_relative_eq!(sell.realized_pnl.unwrap(), 100.0, epsilon = 1e-9);
        assert_relative_eq!(sell.cash_after, 100_100.0);
        assert_eq!(result.statistics.clamped_executions, 1);
        assert_eq!(result.statistics.profitable_sells, 1);
    }

    #[tokio::test]
    async fn all_hold_run_has_flat_statistics() {
        let bars = daily_bars(day(0), &wavy_closes(30, 100.0));
        let data = MockDataPort::new().with_bars("BTC", bars);
        let pipeline = scripted_pipeline(Vec::new());

        let result = run_backtest(&data, config(day(0), day(29)), &pipeline)
            .await
            .unwrap();

        let stats = &result.statistics;
        assert_eq!(stats.total_trades, 0);
        assert_eq!(stats.total_return_pct, 0.0);
        assert_eq!(stats.max_drawdown_pct, 0.0);
        assert_eq!(stats.sharpe_ratio, None);
        assert_eq!(stats.win_rate, None);
        assert_eq!(result.records.len(), 30);
    }

    #[tokio::test]
    async fn gap_in_series_fails_before_any_record() {
        let mut bars = daily_bars(day(0), &[100.0; 5]);
        bars.extend(daily_bars(day(20), &[100.0; 5]));
        let series = Series::new("BTC", bars).unwrap();
        let pipeline = scripted_pipeline(vec![(day(0), Decision::buy(1.0))]);

        let mut engine = BacktestEngine::new(config(day(0), day(24)), &pipeline);
        let err = engine.run_series(&series).await.unwrap_err();

        assert!(matches!(err, FundsimError::InvalidSeries { .. }));
        assert!(err.is_precondition());
        assert_eq!(engine.state(), EngineState::Failed);
    }

    #[tokio::test]
    async fn unavailable_symbol_fails_the_run() {
        let data = MockDataPort::new().with_error("BTC", "exchange offline");
        let pipeline = scripted_pipeline(Vec::new());

        let mut engine = BacktestEngine::new(config(day(0), day(9)), &pipeline);
        let err = engine.run(&data).await.unwrap_err();

        assert!(matches!(err, FundsimError::DataUnavailable { .. }));
        assert_eq!(engine.state(), EngineState::Failed);
    }

    #[tokio::test]
    async fn stage_failure_mid_run_holds_that_day_only() {
        let bars = daily_bars(day(0), &[100.0; 5]);
        let data = MockDataPort::new().with_bars("BTC", bars);
        let script = (0..5).map(|i| (day(i), Decision::buy(1.0))).collect();
        let pipeline = Pipeline::new(PipelineConfig::default())
            .then(ScriptedManager::new(script).failing_on(day(2)));

        let result = run_backtest(&data, config(day(0), day(4)), &pipeline)
            .await
            .unwrap();

        assert_eq!(result.records.len(), 5);
        assert_eq!(result.equity_curve.len(), 5);
        for (i, record) in result.records.iter().enumerate() {
            let expected = if i == 2 { Action::Hold } else { Action::Buy };
            assert_eq!(record.action, expected, "day {}", i);
        }
        assert_eq!(
            result.records[2].degraded_stages,
            vec![StageId::PortfolioManager]
        );
        assert_eq!(result.degraded_days, vec![day(2)]);
        assert_relative_eq!(result.final_portfolio.position.quantity, 4.0);
    }

    #[tokio::test]
    async fn strict_mode_holds_when_an_analyst_degrades() {
        let bars = daily_bars(day(0), &[100.0; 3]);
        let data = MockDataPort::new().with_bars("BTC", bars);
        let script = (0..3).map(|i| (day(i), Decision::buy(1.0))).collect();
        let config_strict = PipelineConfig {
            hold_on_degraded: true,
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(config_strict)
            .then(FailingStage(StageId::Sentiment))
            .then(ScriptedManager::new(script));

        let result = run_backtest(&data, config(day(0), day(2)), &pipeline)
            .await
            .unwrap();

        assert!(result.records.iter().all(|r| r.action == Action::Hold));
        assert_eq!(result.degraded_days.len(), 3);
    }
}

mod engine {
    use super::*;

    #[tokio::test]
    async fn lookback_bars_feed_history_but_are_not_simulated() {
        let bars = daily_bars(day(0), &wavy_closes(40, 100.0));
        let data = MockDataPort::new().with_bars("BTC", bars);
        let pipeline = scripted_pipeline(Vec::new());
        let cfg = BacktestConfig {
            lookback_days: 20,
            ..config(day(20), day(39))
        };

        let result = run_backtest(&data, cfg, &pipeline).await.unwrap();

        assert_eq!(result.records.len(), 20);
        assert_eq!(result.records[0].date, day(20));
        assert_eq!(result.equity_curve.last().map(|p| p.date), Some(day(39)));
    }

    #[tokio::test]
    async fn record_holds_false_keeps_only_trades() {
        let bars = daily_bars(day(0), &[100.0; 10]);
        let data = MockDataPort::new().with_bars("BTC", bars);
        let pipeline = scripted_pipeline(vec![
            (day(3), Decision::buy(1.0)),
            (day(7), Decision::sell(1.0)),
        ]);
        let cfg = BacktestConfig {
            record_holds: false,
            ..config(day(0), day(9))
        };

        let result = run_backtest(&data, cfg, &pipeline).await.unwrap();

        let dates: Vec<_> = result.records.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![day(3), day(7)]);
        assert_eq!(result.equity_curve.len(), 10);
    }

    #[tokio::test]
    async fn engine_cannot_be_reused() {
        let series = Series::new("BTC", daily_bars(day(0), &[100.0; 3])).unwrap();
        let pipeline = scripted_pipeline(Vec::new());
        let mut engine = BacktestEngine::new(config(day(0), day(2)), &pipeline);

        engine.run_series(&series).await.unwrap();
        assert_eq!(engine.state(), EngineState::Completed);
        assert!(engine.run_series(&series).await.is_err());
        assert_eq!(engine.state(), EngineState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_analyst_times_out_and_run_continues() {
        let bars = daily_bars(day(0), &[100.0; 4]);
        let data = MockDataPort::new().with_bars("BTC", bars);
        let script = (0..4).map(|i| (day(i), Decision::buy(1.0))).collect();
        let pipeline = Pipeline::new(PipelineConfig {
            stage_timeout: Duration::from_millis(10),
            ..PipelineConfig::default()
        })
        .then(SlowStage {
            id: StageId::Sentiment,
            delay: Duration::from_secs(60),
        })
        .then(ScriptedManager::new(script));

        let result = run_backtest(&data, config(day(0), day(3)), &pipeline)
            .await
            .unwrap();

        assert_eq!(result.records.len(), 4);
        assert!(result.records.iter().all(|r| r.action == Action::Buy));
        assert!(
            result
                .records
                .iter()
                .all(|r| r.degraded_stages == vec![StageId::Sentiment])
        );
    }

    #[tokio::test]
    async fn identical_inputs_give_identical_results() {
        let data = SyntheticAdapter::new(42);
        let pipeline = standard_pipeline(PipelineConfig::default(), &AgentParams::default(), None);
        let cfg = BacktestConfig {
            lookback_days: 60,
            ..config(date(2024, 1, 1), date(2024, 3, 31))
        };

        let first = run_backtest(&data, cfg.clone(), &pipeline).await.unwrap();
        let second = run_backtest(&data, cfg, &pipeline).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn future_bars_do_not_change_past_decisions() {
        let closes = wavy_closes(90, 100.0);
        let original = daily_bars(day(0), &closes);
        let mut altered = original.clone();
        for bar in altered.iter_mut().skip(60) {
            bar.close *= 3.0;
            bar.high *= 3.0;
            bar.open *= 3.0;
            bar.low *= 3.0;
            bar.volume *= 10.0;
        }

        let pipeline = standard_pipeline(PipelineConfig::default(), &AgentParams::default(), None);
        let cfg = config(day(30), day(89));

        let a = BacktestEngine::new(cfg.clone(), &pipeline)
            .run_series(&Series::new("BTC", original).unwrap())
            .await
            .unwrap();
        let b = BacktestEngine::new(cfg, &pipeline)
            .run_series(&Series::new("BTC", altered).unwrap())
            .await
            .unwrap();

        let cutoff = day(59);
        let before = |r: &&fundsim::domain::backtest::TradeRecord| r.date <= cutoff;
        let a_past: Vec<_> = a.records.iter().filter(before).collect();
        let b_past: Vec<_> = b.records.iter().filter(before).collect();
        assert_eq!(a_past.len(), 30);
        assert_eq!(a_past, b_past);
    }

    #[tokio::test]
    async fn standard_pipeline_over_synthetic_data() {
        let data = SyntheticAdapter::new(7);
        let pipeline = standard_pipeline(PipelineConfig::default(), &AgentParams::default(), None);
        let cfg = BacktestConfig {
            lookback_days: 60,
            ..BacktestConfig::new("ETH", date(2024, 1, 1), date(2024, 6, 30))
        };

        let result = run_backtest(&data, cfg, &pipeline).await.unwrap();

        assert_eq!(result.equity_curve.len(), 182);
        assert_eq!(result.records.len(), 182);
        assert!(result.degraded_days.is_empty());
        for r in &result.records {
            let stages: Vec<StageId> = r.signals.iter().map(|s| s.stage).collect();
            assert_eq!(
                stages,
                vec![
                    StageId::MarketData,
                    StageId::Sentiment,
                    StageId::Technical,
                    StageId::Risk,
                    StageId::PortfolioManager
                ]
            );
            assert!(r.signals[4].rationale.contains("combined score"));
            assert!(r.cash_after >= 0.0);
            assert!(r.quantity_after >= 0.0);
            let equity = r.cash_after + r.quantity_after * r.price;
            assert!((equity - r.equity_after).abs() < 1e-6 * r.equity_after.max(1.0));
        }
    }
}

mod invariants {
    use super::*;
    use proptest::prelude::*;

    fn decision_strategy() -> impl Strategy<Value = Decision> {
        prop_oneof![
            Just(Decision::hold()),
            (0.0f64..50.0).prop_map(Decision::buy),
            (0.0f64..50.0).prop_map(Decision::sell),
            (-50.0f64..0.0).prop_map(|quantity| Decision {
                action: Action::Buy,
                quantity,
            }),
            Just(Decision {
                action: Action::Buy,
                quantity: f64::NAN,
            }),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn portfolio_accounting_always_balances(
            closes in prop::collection::vec(1.0f64..5_000.0, 2..40),
            decisions in prop::collection::vec(decision_strategy(), 40),
            cash in 100.0f64..1_000_000.0,
        ) {
            let n = closes.len() as i64;
            let bars = daily_bars(day(0), &closes);
            let script = decisions
                .into_iter()
                .take(closes.len())
                .enumerate()
                .map(|(i, d)| (day(i as i64), d))
                .collect();
            let pipeline = scripted_pipeline(script);
            let cfg = BacktestConfig {
                starting_cash: cash,
                ..config(day(0), day(n - 1))
            };

            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let result = rt
                .block_on(
                    BacktestEngine::new(cfg, &pipeline)
                        .run_series(&Series::new("BTC", bars).unwrap()),
                )
                .unwrap();

            prop_assert_eq!(result.records.len(), closes.len());
            for r in &result.records {
                prop_assert!(r.cash_after >= 0.0);
                prop_assert!(r.quantity_after >= 0.0);
                let equity = r.cash_after + r.quantity_after * r.price;
                prop_assert!((equity - r.equity_after).abs() <= 1e-9 * r.equity_after.abs().max(1.0));
            }
        }
    }
}
