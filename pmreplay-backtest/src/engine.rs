//! Backtest engine: the control surface wiring tick source, scheduler,
//! strategy router and result sink together.

use crate::{
    config::BacktestRequest,
    error::{BacktestError, SchedulerError, StoreError},
    result::BacktestResult,
    router::StrategyRouter,
    scheduler::{PlaybackHandle, PlaybackScheduler, PlaybackSnapshot, TickHandler},
    sequencer::{MarketSequencer, resolve_markets},
    sink::ResultSink,
    speed::PlaybackSpeed,
    store::{ResultFilter, ResultsStore},
    strategy::{StrategyEvaluator, StrategyId},
    summary::RunSummary,
};
use async_trait::async_trait;
use chrono::Utc;
use pmreplay_data::{Tick, TickSource};
use tracing::info;

/// Replays recorded ticks through registered strategy evaluators and persists
/// what each would have signalled.
///
/// Control methods (`pause`, `resume`, `stop`, ...) act on the current session.
/// While [`BacktestEngine::start`] is running, drive them from another task
/// through a [`PlaybackHandle`] obtained beforehand with [`BacktestEngine::handle`].
pub struct BacktestEngine<Source, Store> {
    source: Source,
    router: StrategyRouter,
    sink: ResultSink<Store>,
    scheduler: PlaybackScheduler,
}

impl<Source, Store> std::fmt::Debug for BacktestEngine<Source, Store> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BacktestEngine")
            .field("router", &self.router)
            .field("session", &self.scheduler.handle().snapshot())
            .finish_non_exhaustive()
    }
}

impl<Source, Store> BacktestEngine<Source, Store>
where
    Source: TickSource,
    Store: ResultsStore,
{
    pub fn new(source: Source, store: Store) -> Self {
        info!("BacktestEngine initialized");
        Self {
            source,
            router: StrategyRouter::new(),
            sink: ResultSink::new(store),
            scheduler: PlaybackScheduler::new(PlaybackSpeed::default()),
        }
    }

    /// Register an evaluator, replacing any previously registered under the same id.
    pub fn register_strategy<E>(&mut self, strategy_id: impl Into<StrategyId>, evaluator: E)
    where
        E: StrategyEvaluator + 'static,
    {
        self.router.register(strategy_id, evaluator);
    }

    pub fn router_mut(&mut self) -> &mut StrategyRouter {
        &mut self.router
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn store(&self) -> &Store {
        self.sink.store()
    }

    /// Control handle for the current session.
    pub fn handle(&self) -> PlaybackHandle {
        self.scheduler.handle()
    }

    pub fn pause(&self) -> bool {
        self.scheduler.handle().pause()
    }

    pub fn resume(&self) -> bool {
        self.scheduler.handle().resume()
    }

    pub fn stop(&self) {
        self.scheduler.handle().stop()
    }

    pub fn is_playing(&self) -> bool {
        self.scheduler.handle().is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.scheduler.handle().is_paused()
    }

    /// Change the speed for subsequent delay computations.
    pub fn set_speed(&self, speed: PlaybackSpeed) {
        self.scheduler.handle().set_speed(speed)
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.scheduler.handle().snapshot()
    }

    /// Replace a stopped session with a fresh one, keeping the current speed.
    ///
    /// Handles obtained before the reset keep controlling the old session.
    pub fn reset_session(&mut self) {
        let speed = self.scheduler.handle().speed();
        self.scheduler = PlaybackScheduler::new(speed);
    }

    /// Run a backtest to completion, stop, or exhaustion of every selected market.
    ///
    /// Configuration errors, including unknown market ids, are returned before
    /// any tick is emitted. Per-market source failures, evaluator failures and
    /// failed writes are reported in the [`RunSummary`] instead.
    pub async fn start(&mut self, request: BacktestRequest) -> Result<RunSummary, BacktestError> {
        request.validate()?;
        let markets = resolve_markets(&self.source, &request.markets).await?;

        let handle = self.scheduler.handle();
        if handle.is_stopped() {
            return Err(SchedulerError::Stopped.into());
        }
        if handle.speed() != request.speed {
            handle.set_speed(request.speed);
        }

        self.router.reset();
        self.sink.reset_counters();

        let started_at = Utc::now();
        info!(
            markets = markets.len(),
            strategies = self.router.len(),
            speed = %request.speed,
            limit_per_market = request.limit_per_market,
            "Starting backtest"
        );

        let sequencer = MarketSequencer::new(&self.source, request.range, request.limit_per_market);
        let mut handler = RoutingHandler {
            router: &mut self.router,
            sink: &mut self.sink,
        };
        let report = sequencer.run(&self.scheduler, &markets, &mut handler).await?;

        let summary = RunSummary::new(
            request.speed,
            started_at,
            report,
            self.router.stats(),
            self.sink.written(),
            self.sink.failed_writes(),
        );

        info!(
            ticks_processed = summary.ticks_processed,
            markets_analyzed = summary.markets_analyzed,
            signals = summary.total_signals(),
            failed_writes = summary.failed_writes,
            stopped = summary.stopped,
            "Backtest complete"
        );
        Ok(summary)
    }

    /// Persisted results matching `filter`, oldest first.
    pub async fn query_results(
        &self,
        filter: &ResultFilter,
    ) -> Result<Vec<BacktestResult>, StoreError> {
        self.sink
            .store()
            .query(filter)
            .await?
            .into_iter()
            .map(|record| record.into_result())
            .collect()
    }
}

/// Routes each emitted tick through the strategies and persists the results.
struct RoutingHandler<'a, Store> {
    router: &'a mut StrategyRouter,
    sink: &'a mut ResultSink<Store>,
}

#[async_trait]
impl<'a, Store> TickHandler for RoutingHandler<'a, Store>
where
    Store: ResultsStore,
{
    async fn on_tick(&mut self, tick: &Tick) {
        for result in self.router.route(tick) {
            self.sink.persist(&result).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::MarketSelector,
        error::{ConfigError, EvaluatorError},
        store::memory::InMemoryResultsStore,
        strategy::Signal,
    };
    use chrono::{TimeZone, Utc};
    use pmreplay_data::InMemoryTickSource;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn engine() -> BacktestEngine<InMemoryTickSource, InMemoryResultsStore> {
        let source = InMemoryTickSource::from_ticks((0..5).map(|second| {
            Tick::new(
                "m1",
                Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, second).unwrap(),
                dec!(0.45),
                dec!(0.50),
                dec!(1),
            )
        }));
        BacktestEngine::new(source, InMemoryResultsStore::new())
    }

    fn always(_: &Tick) -> Result<Option<Signal>, EvaluatorError> {
        Ok(Some(Signal::new(json!({ "hit": true }))))
    }

    #[tokio::test]
    async fn test_start_routes_and_persists() {
        let mut engine = engine();
        engine.register_strategy("always", always);

        let summary = engine
            .start(BacktestRequest::new(MarketSelector::All, PlaybackSpeed::JumpToEvents))
            .await
            .unwrap();

        assert_eq!(summary.ticks_processed, 5);
        assert_eq!(summary.signals_for(&StrategyId::new("always")), 5);
        assert_eq!(summary.results_written, 5);
        assert_eq!(engine.store().len(), 5);
        assert!(!engine.is_playing());

        let results = engine
            .query_results(&ResultFilter::default().strategy("always"))
            .await
            .unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_config_errors_fail_fast() {
        let mut engine = engine();
        engine.register_strategy("always", always);

        let unknown = engine
            .start(BacktestRequest::new(
                MarketSelector::single("nope"),
                PlaybackSpeed::JumpToEvents,
            ))
            .await;
        assert!(matches!(
            unknown,
            Err(BacktestError::Config(ConfigError::UnknownMarket(_)))
        ));

        let zero_limit = engine
            .start(BacktestRequest::default().with_limit_per_market(0))
            .await;
        assert!(matches!(
            zero_limit,
            Err(BacktestError::Config(ConfigError::ZeroLimit))
        ));
        assert_eq!(engine.snapshot().processed, 0);
        assert!(engine.store().is_empty());
    }

    #[tokio::test]
    async fn test_stopped_session_requires_reset() {
        let mut engine = engine();
        engine.stop();

        let request = BacktestRequest::new(MarketSelector::All, PlaybackSpeed::JumpToEvents);
        assert!(matches!(
            engine.start(request.clone()).await,
            Err(BacktestError::Scheduler(SchedulerError::Stopped))
        ));

        engine.reset_session();
        let summary = engine.start(request).await.unwrap();
        assert_eq!(summary.ticks_processed, 5);
    }
}
