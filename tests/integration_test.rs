//! Integration tests over the public API with a mock data port and an
//! in-memory script store.
//!
//! Tests cover:
//! - Universe screens (code filters, error isolation, concurrency limits)
//! - Group composition (AND over every ordering, resolution errors)
//! - Registry replacement while readers and screens are running
//! - Single-security backtests through the service
//! - Universe backtests with a closing summary
//! - Script management and startup loading

mod common;

use approx::assert_relative_eq;
use common::*;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use strategist::domain::backtest::run_backtest;
use strategist::domain::builtin::RiseThreeByClose;
use strategist::domain::error::{ScriptError, StrategistError};
use strategist::domain::group::Group;
use strategist::domain::info::Info;
use strategist::domain::kline::TimeWindow;
use strategist::domain::position::ExitReason;
use strategist::domain::screener::Screener;
use strategist::domain::script::ScriptRecord;
use strategist::domain::settings::ExecutionSettings;
use strategist::domain::strategy::{Strategy as TradingStrategy, StrategyKind};
use strategist::ports::data_port::DataPort;
use strategist::ports::store_port::StrategyStorePort;
use strategist::service::{ScreenEvent, Service};

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn service_with(port: MockDataPort, concurrency: usize) -> Service {
    Service::new(
        registry(),
        Arc::new(port),
        Some(Arc::new(MemoryStore::new())),
        false,
        concurrency,
    )
}

mod screening {
    use super::*;

    fn universe() -> MockDataPort {
        let mut port = MockDataPort::new()
            .with_bars("bj920000", rising(5, 10.0))
            .with_bars("sh600000", rising(5, 20.0))
            .with_bars("sz000001", falling(5, 30.0))
            .with_name("sh600000", "PF Bank")
            .with_error("sh688001", "corrupt file");
        for (i, code) in filler_codes(12).iter().enumerate() {
            let bars = if i % 2 == 0 {
                rising(6, 5.0)
            } else {
                falling(6, 5.0)
            };
            port = port.with_bars(code, bars);
        }
        port
    }

    #[tokio::test]
    async fn three_codes_screen_matches_exactly_three() {
        let service = service_with(universe(), 4);
        let matches = service
            .screen(&names(&["three-codes"]), TimeWindow::all())
            .unwrap()
            .collect()
            .await;

        let codes: HashSet<String> = matches.iter().map(|m| m.info.code.clone()).collect();
        let expected: HashSet<String> = names(&["bj920000", "sh600000", "sz000001"])
            .into_iter()
            .collect();
        assert_eq!(codes, expected);
        let pf = matches.iter().find(|m| m.info.code == "sh600000").unwrap();
        assert_eq!(pf.info.name, "PF Bank");
        assert_eq!(pf.day.len(), 5);
    }

    #[tokio::test]
    async fn grouped_screen_is_intersection() {
        let service = service_with(universe(), 8);
        let codes: HashSet<String> = service
            .screen(
                &names(&["rise-three-by-close", "three-codes"]),
                TimeWindow::all(),
            )
            .unwrap()
            .collect()
            .await
            .into_iter()
            .map(|m| m.info.code)
            .collect();
        assert_eq!(codes, names(&["bj920000", "sh600000"]).into_iter().collect());
    }

    #[tokio::test]
    async fn window_restricts_loaded_bars() {
        let service = service_with(universe(), 2);
        let window = TimeWindow::new(
            date(2024, 1, 1).and_hms_opt(0, 0, 0).unwrap(),
            date(2024, 1, 2).and_hms_opt(23, 59, 59).unwrap(),
        );
        // two bars are not enough for three rising closes
        let matches = service
            .screen(&names(&["rise-three-by-close"]), window)
            .unwrap()
            .collect()
            .await;
        assert!(matches.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_limit_does_not_change_results() {
        let port: Arc<dyn DataPort> = Arc::new(universe());
        let strategy: Arc<dyn TradingStrategy> = Arc::new(RiseThreeByClose);

        let mut sets = Vec::new();
        for limit in [1, 50] {
            let screener = Screener::new(Arc::clone(&port), false);
            let codes: HashSet<String> = screener
                .screen(Arc::clone(&strategy), TimeWindow::all(), limit)
                .unwrap()
                .collect()
                .await
                .into_iter()
                .map(|m| m.info.code)
                .collect();
            sets.push(codes);
        }
        assert_eq!(sets[0], sets[1]);
        assert_eq!(sets[0].len(), 8);
    }

    #[tokio::test]
    async fn unknown_strategy_fails_before_screening() {
        let service = service_with(universe(), 4);
        let err = service
            .screen(&names(&["three-codes", "nope"]), TimeWindow::all())
            .err()
            .unwrap();
        assert!(matches!(err, StrategistError::UnknownStrategy { name } if name == "nope"));
    }

    #[tokio::test]
    async fn unlistable_universe_fails_screen_and_backtest_all() {
        let port = universe().with_list_error("data directory missing");
        let service = service_with(port, 4);

        let err = service
            .screen(&names(&["three-codes"]), TimeWindow::all())
            .err()
            .unwrap();
        assert!(matches!(err, StrategistError::Database { reason } if reason.contains("missing")));
        assert!(
            service
                .backtest_all(
                    &names(&["rise-three-by-close"]),
                    TimeWindow::all(),
                    &ExecutionSettings::default(),
                )
                .is_err()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_screen_yields_nothing_more() {
        let mut port = MockDataPort::new();
        for code in filler_codes(300) {
            port = port.with_bars(&code, rising(3, 1.0));
        }
        let service = service_with(port, 1);
        service.registry().register(Fixed::new("always", true));

        let mut stream = service
            .screen(&names(&["always"]), TimeWindow::all())
            .unwrap();
        assert!(stream.next().await.is_some());
        stream.cancel();
        assert!(stream.next().await.is_none());
    }
}

mod groups {
    use super::*;

    #[test]
    fn empty_and_unknown_names_fail() {
        let reg = registry();
        assert!(matches!(reg.group(&[]), Err(StrategistError::EmptyGroup)));
        let err = reg
            .group(&names(&["trend-up", "ghost", "phantom"]))
            .unwrap_err();
        assert!(matches!(err, StrategistError::UnknownStrategy { name } if name == "ghost"));
    }

    #[test]
    fn group_lookback_is_member_max() {
        let group = registry()
            .group(&names(&["rise-three-by-close", "bullish-alignment"]))
            .unwrap();
        assert_eq!(group.lookback(), 31);
        assert_eq!(group.name(), "rise-three-by-close+bullish-alignment");
        assert_eq!(group.kind(), StrategyKind::DayKline);
    }

    fn verdicts_and_order() -> impl Strategy<Value = (Vec<bool>, Vec<usize>)> {
        prop::collection::vec(any::<bool>(), 1..8).prop_flat_map(|verdicts| {
            let order: Vec<usize> = (0..verdicts.len()).collect();
            (Just(verdicts), Just(order).prop_shuffle())
        })
    }

    proptest! {
        #[test]
        fn group_is_and_for_every_ordering((verdicts, order) in verdicts_and_order()) {
            let members: Vec<Arc<dyn TradingStrategy>> = order
                .iter()
                .map(|&i| Fixed::new(&format!("m{i}"), verdicts[i]))
                .collect();
            let group = Group::new(members);
            let bars = rising(3, 1.0);
            let expected = verdicts.iter().all(|v| *v);
            prop_assert_eq!(group.signal(&Info::bare("sh600000"), &bars, &[]), expected);
        }
    }
}

mod replacement {
    use super::*;

    fn script(name: &str, body: &str) -> ScriptRecord {
        ScriptRecord::new(name, StrategyKind::DayKline, body, true)
    }

    #[test]
    fn readers_always_see_old_or_new() {
        let reg = registry();
        reg.register_script(&script("swap", "signal = TRUE")).unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let reg = Arc::clone(&reg);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                for i in 0..200 {
                    let body = if i % 2 == 0 { "signal = FALSE" } else { "signal = TRUE" };
                    reg.register_script(&script("swap", body)).unwrap();
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let reg = Arc::clone(&reg);
                let done = Arc::clone(&done);
                std::thread::spawn(move || {
                    let bars = rising(3, 1.0);
                    let mut seen = 0usize;
                    while !done.load(Ordering::SeqCst) || seen == 0 {
                        let strategy = reg.get("swap").expect("never unregistered mid-swap");
                        let _ = strategy.signal(&Info::bare("sh600000"), &bars, &[]);
                        seen += 1;
                    }
                    seen
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            assert!(reader.join().unwrap() > 0);
        }
    }

    #[tokio::test]
    async fn running_screen_keeps_resolved_strategy() {
        let mut port = MockDataPort::new();
        for code in filler_codes(40) {
            port = port.with_bars(&code, rising(3, 1.0));
        }
        let service = service_with(port, 2);
        service
            .registry()
            .register_script(&script("swap", "signal = TRUE"))
            .unwrap();

        let stream = service
            .screen(&names(&["swap"]), TimeWindow::all())
            .unwrap();
        service
            .registry()
            .register_script(&script("swap", "signal = FALSE"))
            .unwrap();

        assert_eq!(stream.collect().await.len(), 40);
        let after = service
            .screen(&names(&["swap"]), TimeWindow::all())
            .unwrap()
            .collect()
            .await;
        assert!(after.is_empty());
    }
}

mod backtests {
    use super::*;

    #[test]
    fn rising_closes_open_at_third_bar() {
        let port = MockDataPort::new().with_bars("sh600000", series(&[10.0, 11.0, 12.0]));
        let service = service_with(port, 1);
        let result = service
            .backtest(
                "sh600000",
                &names(&["rise-three-by-close"]),
                TimeWindow::all(),
                &ExecutionSettings::default(),
            )
            .unwrap();

        let open = result.open_position.as_ref().unwrap();
        assert_eq!(open.entry_index, 2);
        assert_eq!(open.shares, 8_300);
        assert!(open.unrealized_pnl(12.0) >= 0.0);
        // marked at the entry close, only the entry fee is lost
        assert_relative_eq!(result.total_return, -49.8 / 100_000.0, epsilon = 1e-9);
    }

    #[test]
    fn stop_loss_exits_below_threshold() {
        let service = service_with(MockDataPort::new(), 1);
        service.registry().register(Fixed::new("always", true));
        let settings = ExecutionSettings {
            slippage: 0.5,
            stop_loss: 0.05,
            ..ExecutionSettings::default()
        };
        let day = series(&[99.5, 97.0, 94.8, 96.0]);
        let result = service
            .backtest_bars(
                &Info::bare("sh600000"),
                &day,
                &[],
                &names(&["always"]),
                &settings,
            )
            .unwrap();

        let trade = &result.trades[0];
        assert_eq!(trade.reason, ExitReason::StopLoss);
        assert_eq!(trade.exit_index, 2);
        assert_relative_eq!(trade.entry_price, 100.0);
        assert_relative_eq!(trade.exit_price, 94.3);
        assert!(trade.exit_price < 100.0 * 0.95);
        assert_eq!(trade.shares, 900);
    }

    #[test]
    fn short_series_is_zero_result() {
        let port = MockDataPort::new().with_bars("sh600000", series(&[10.0, 11.0]));
        let service = service_with(port, 1);
        let result = service
            .backtest(
                "sh600000",
                &names(&["rise-three-by-close"]),
                TimeWindow::all(),
                &ExecutionSettings::default(),
            )
            .unwrap();
        assert_eq!(result.total_return, 0.0);
        assert_eq!(result.max_drawdown, 0.0);
        assert_eq!(result.sharpe, 0.0);
        assert!(result.trades.is_empty());
    }

    #[test]
    fn empty_window_is_zero_result() {
        let port = MockDataPort::new().with_bars("sh600000", rising(10, 10.0));
        let service = service_with(port, 1);
        let window = TimeWindow::new(
            date(2020, 1, 1).and_hms_opt(0, 0, 0).unwrap(),
            date(2020, 12, 31).and_hms_opt(0, 0, 0).unwrap(),
        );
        let result = service
            .backtest(
                "sh600000",
                &names(&["rise-three-by-close"]),
                window,
                &ExecutionSettings::default(),
            )
            .unwrap();
        assert_eq!(result.bars, 0);
        assert_eq!(result.total_return, 0.0);
    }

    #[test]
    fn missing_security_is_an_error() {
        let service = service_with(MockDataPort::new(), 1);
        let err = service
            .backtest(
                "sh600000",
                &names(&["trend-up"]),
                TimeWindow::all(),
                &ExecutionSettings::default(),
            )
            .unwrap_err();
        assert!(matches!(err, StrategistError::NoData { .. }));
    }

    proptest! {
        #[test]
        fn backtest_is_deterministic(
            closes in prop::collection::vec(1.0f64..100.0, 0..60),
            stop in 0.0f64..0.2,
            target in 0.0f64..0.3,
        ) {
            let day = series(&closes);
            let settings = ExecutionSettings {
                stop_loss: stop,
                take_profit: target,
                slippage: 0.01,
                ..ExecutionSettings::default()
            };
            let info = Info::bare("sz000001");
            let a = run_backtest(&info, &day, &[], &RiseThreeByClose, &settings);
            let b = run_backtest(&info, &day, &[], &RiseThreeByClose, &settings);
            prop_assert_eq!(&a, &b);
            prop_assert!(a.max_drawdown >= 0.0);
            prop_assert_eq!(a.equity.len(), closes.len());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn backtest_all_streams_items_then_summary() {
        let mut port = MockDataPort::new().with_error("sh688001", "unreadable");
        for code in filler_codes(5) {
            port = port.with_bars(&code, rising(10, 10.0));
        }
        let service = service_with(port, 3);
        let events = service
            .backtest_all(
                &names(&["rise-three-by-close"]),
                TimeWindow::all(),
                &ExecutionSettings::default(),
            )
            .unwrap()
            .collect()
            .await;

        assert_eq!(events.len(), 6);
        let items: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ScreenEvent::Item(item) => Some(item),
                ScreenEvent::Summary(_) => None,
            })
            .collect();
        assert_eq!(items.len(), 5);
        let ScreenEvent::Summary(summary) = events.last().unwrap() else {
            panic!("summary must come last");
        };
        assert_eq!(summary.count, 5);
        assert!(summary.avg_return > 0.0);
        assert_relative_eq!(summary.avg_return, items[0].total_return, epsilon = 1e-12);
    }
}

mod scripts {
    use super::*;

    #[test]
    fn lifecycle_keeps_store_and_registry_in_step() {
        let service = service_with(MockDataPort::new(), 1);

        let created = service
            .create_script("mine", Some("signal = RISING(close, 2)"), true)
            .unwrap();
        assert!(service.registry().get("mine").is_some());
        assert_eq!(service.list_scripts().unwrap().len(), 1);

        std::thread::sleep(std::time::Duration::from_millis(2));
        let updated = service
            .update_script("mine", "signal = ABOVE(close, SMA(5))", true)
            .unwrap();
        assert_ne!(updated.namespace, created.namespace);
        assert_eq!(service.registry().get("mine").unwrap().lookback(), 5);

        service.set_enabled("mine", false).unwrap();
        assert!(service.registry().get("mine").is_none());
        assert!(!service.list_scripts().unwrap()[0].enabled);

        service.set_enabled("mine", true).unwrap();
        assert!(service.registry().get("mine").is_some());

        service.delete_script("mine").unwrap();
        assert!(service.registry().get("mine").is_none());
        assert!(service.list_scripts().unwrap().is_empty());
    }

    #[test]
    fn broken_script_is_not_persisted() {
        let service = service_with(MockDataPort::new(), 1);
        let err = service
            .create_script("bad", Some("signal = SMA(5)"), true)
            .unwrap_err();
        assert!(matches!(
            err,
            StrategistError::Script(ScriptError::SignatureMismatch { .. })
        ));
        assert!(service.list_scripts().unwrap().is_empty());
        assert!(service.registry().get("bad").is_none());
    }

    #[test]
    fn failed_update_keeps_previous_version() {
        let service = service_with(MockDataPort::new(), 1);
        service
            .create_script("mine", Some("signal = TRUE"), true)
            .unwrap();
        assert!(service.update_script("mine", "signal = ", true).is_err());

        let stored = &service.list_scripts().unwrap()[0];
        assert_eq!(stored.script, "signal = TRUE");
        let strategy = service.registry().get("mine").unwrap();
        assert!(strategy.signal(&Info::bare("sh600000"), &rising(1, 1.0), &[]));
    }

    #[test]
    fn disabled_create_is_stored_not_registered() {
        let service = service_with(MockDataPort::new(), 1);
        service.create_script("later", None, false).unwrap();
        assert!(service.registry().get("later").is_none());
        assert_eq!(service.list_scripts().unwrap()[0].name, "later");
    }

    #[test]
    fn duplicate_create_fails() {
        let service = service_with(MockDataPort::new(), 1);
        service
            .create_script("twice", Some("signal = TRUE"), true)
            .unwrap();
        assert!(
            service
                .create_script("twice", Some("signal = FALSE"), true)
                .is_err()
        );
        let kept = service.registry().get("twice").unwrap();
        assert!(kept.signal(&Info::bare("sh600000"), &rising(1, 1.0), &[]));
    }

    fn failing_service() -> (Service, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = Service::new(
            registry(),
            Arc::new(MockDataPort::new()),
            Some(Arc::clone(&store) as Arc<dyn StrategyStorePort>),
            false,
            1,
        );
        (service, store)
    }

    #[test]
    fn failed_update_write_restores_registration() {
        let (service, store) = failing_service();
        service.create_script("s", Some("signal = TRUE"), true).unwrap();
        store.fail_writes(true);

        let err = service
            .update_script("s", "signal = FALSE", true)
            .unwrap_err();
        assert!(matches!(err, StrategistError::Database { .. }));

        let bars = rising(1, 1.0);
        let strategy = service.registry().get("s").unwrap();
        assert!(strategy.signal(&Info::bare("sh600000"), &bars, &[]));
        assert_eq!(store.get("s").unwrap().unwrap().script, "signal = TRUE");
    }

    #[test]
    fn failed_toggle_write_restores_registration() {
        let (service, store) = failing_service();
        service.create_script("on", Some("signal = TRUE"), true).unwrap();
        service.create_script("off", Some("signal = TRUE"), false).unwrap();
        store.fail_writes(true);

        assert!(service.set_enabled("on", false).is_err());
        assert!(service.registry().get("on").is_some());
        assert!(store.get("on").unwrap().unwrap().enabled);

        assert!(service.set_enabled("off", true).is_err());
        assert!(service.registry().get("off").is_none());
        assert!(!store.get("off").unwrap().unwrap().enabled);
    }

    #[test]
    fn failed_insert_keeps_existing_registration() {
        let (service, store) = failing_service();
        store.fail_writes(true);
        assert!(
            service
                .create_script("trend-up", Some("signal = FALSE"), true)
                .is_err()
        );
        assert_eq!(service.registry().get("trend-up").unwrap().lookback(), 30);
        assert!(service.create_script("fresh", None, true).is_err());
        assert!(service.registry().get("fresh").is_none());
    }

    #[test]
    fn missing_record_is_not_found() {
        let service = service_with(MockDataPort::new(), 1);
        assert!(matches!(
            service.set_enabled("ghost", true),
            Err(StrategistError::NotFound { .. })
        ));
        assert!(matches!(
            service.update_script("ghost", "signal = TRUE", true),
            Err(StrategistError::NotFound { .. })
        ));
    }

    #[test]
    fn startup_load_skips_failures() {
        let store = MemoryStore::new();
        for (name, body, enabled) in [
            ("good", "signal = TRUE", true),
            ("off", "signal = TRUE", false),
            ("broken", "signal = ABOVE(", true),
        ] {
            store
                .insert(&ScriptRecord::new(name, StrategyKind::DayKline, body, enabled))
                .unwrap();
        }
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("from_file.strategy"), "signal = FALSE\n").unwrap();
        std::fs::write(dir.path().join("typo.strategy"), "signl = TRUE\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a script").unwrap();

        let reg = registry();
        let builtins = reg.len();
        let report = reg.load(Some(&store), Some(dir.path())).unwrap();

        assert_eq!(report.loaded, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(reg.len(), builtins + 2);
        assert!(reg.get("good").is_some());
        assert!(reg.get("from_file").is_some());
        assert!(reg.get("off").is_none());
    }
}
