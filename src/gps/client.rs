use crate::app_config::Gpsd;
use crate::domain::{FixMode, FixState, FixTransition, GeoPoint, RawFix, TargetSource};
use crate::gps::averager::PositionAverager;
use crate::gps::report::{Report, SkyReport};
use crate::gps::source::{PositionSource, PositionSourceError};
use crate::observer_hub::ObserverHub;
use futures::StreamExt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, error, info, instrument, trace, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub min_satellites: usize,
    pub smoothing_window: usize,
    pub retry_interval: Duration,
    pub stale_timeout: Duration,
}

impl Config {
    pub fn new(gpsd: &Gpsd, min_satellites: usize, smoothing_window: usize) -> Self {
        Config {
            min_satellites,
            smoothing_window,
            retry_interval: gpsd.retry_interval(),
            stale_timeout: gpsd.stale_timeout(),
        }
    }
}

/// Everything the stream reader writes, kept under one lock so readers never observe a fix
/// mode from one report mixed with the position of another.
#[derive(Debug)]
struct FixData {
    state: FixState,
    averager: PositionAverager,
    last_good: Option<GeoPoint>,
}

/// Long-lived reader of a satellite fix stream.
///
/// `run` keeps a subscription to the position source alive for as long as the client is not
/// cancelled: every failure resets the fix to "no fix", waits `retry_interval` and reconnects.
#[derive(Debug)]
pub struct PositionSourceClient {
    source: Box<dyn PositionSource>,
    config: Config,
    data: Mutex<FixData>,
    observers: ObserverHub<FixTransition>,
    cancel_tx: watch::Sender<bool>,
}

impl PositionSourceClient {
    pub fn new(source: Box<dyn PositionSource>, config: Config) -> Self {
        let averager = PositionAverager::new(config.smoothing_window);
        let (cancel_tx, _) = watch::channel(false);

        PositionSourceClient {
            source,
            config,
            data: Mutex::new(FixData {
                state: FixState::default(),
                averager,
                last_good: None,
            }),
            observers: ObserverHub::new(),
            cancel_tx,
        }
    }

    /// Fix mode transitions are published here as `(previous, current)`.
    pub fn observers(&self) -> &ObserverHub<FixTransition> {
        &self.observers
    }

    pub fn fix_state(&self) -> FixState {
        self.lock().state
    }

    /// True for a 3D fix using strictly more than `min_satellites` satellites.
    pub fn has_fix(&self) -> bool {
        let state = self.fix_state();
        state.mode == FixMode::Fix3d && state.satellites_used > self.config.min_satellites
    }

    pub fn current_position(&self) -> Option<GeoPoint> {
        self.lock().averager.value()
    }

    pub fn last_good_raw_fix(&self) -> Option<GeoPoint> {
        self.lock().last_good
    }

    /// Asks `run` to stop at its next check point.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    #[instrument(skip_all)]
    pub async fn run(&self) {
        let retry_interval = self.config.retry_interval;
        let strategy = FixedInterval::new(retry_interval);

        info!("🛰️ Connecting to position source...");
        let result = Retry::spawn(strategy, || async move {
            if self.is_cancelled() {
                return Ok(());
            }

            let result = self.stream_reports().await;
            self.reset_fix();
            match result {
                Ok(()) => {
                    info!("🛰️ Position source client cancelled");
                    Ok(())
                }
                Err(e) => {
                    warn!("⚠️ Position source error: {}. Retrying in {:?}...", e, retry_interval);
                    Err(e)
                }
            }
        })
        .await;

        if let Err(e) = result {
            error!("❌ Position source client gave up: {}", e);
        }
    }

    /// Consumes one subscription. Returns `Ok` only when cancelled.
    async fn stream_reports(&self) -> Result<(), PositionSourceError> {
        let mut cancel_rx = self.cancel_tx.subscribe();
        let mut reports = self.source.connect().await?;
        info!("🛰️ Connecting to position source... OK");

        loop {
            if *cancel_rx.borrow_and_update() {
                return Ok(());
            }

            let next = tokio::select! {
                _ = cancel_rx.changed() => continue,
                next = timeout(self.config.stale_timeout, reports.next()) => next,
            };

            match next {
                Ok(Some(Ok(report))) => self.handle_report(report),
                Ok(Some(Err(PositionSourceError::Decode { source, line }))) => {
                    warn!(line = line.trim(), "⚠️ Skipping malformed report: {}", source);
                }
                Ok(Some(Err(e))) => return Err(e),
                Ok(None) => return Err(PositionSourceError::Closed),
                Err(_) => return Err(PositionSourceError::Stale(self.config.stale_timeout)),
            }
        }
    }

    fn handle_report(&self, report: Report) {
        match report {
            Report::Tpv(tpv) => self.set_fix(tpv.into()),
            Report::Sky(sky) => self.set_satellites(&sky),
            Report::Other => trace!("Ignoring report"),
        }
    }

    fn set_fix(&self, fix: RawFix) {
        let transition = Self::apply_fix(&mut self.lock(), fix);
        self.notify(transition);
    }

    /// Updates the fix under the caller's lock and returns the mode change, if any.
    fn apply_fix(data: &mut FixData, fix: RawFix) -> Option<FixTransition> {
        let previous = data.state.mode;
        data.state.mode = fix.mode;

        if fix.mode == FixMode::Fix3d {
            match (fix.lat, fix.lon) {
                (Some(lat), Some(lon)) => match GeoPoint::new(lat, lon) {
                    Ok(point) => {
                        let alt = fix.alt.unwrap_or_default();
                        data.averager.append(point.lat(), point.lon(), alt);
                        data.last_good = Some(point.with_altitude(alt));
                        trace!(time = ?fix.time, "Received 3D fix {}", point);
                    }
                    Err(e) => warn!("⚠️ Ignoring 3D fix with an invalid position: {}", e),
                },
                _ => debug!("3D fix without a position"),
            }
        }

        (previous != fix.mode).then_some(FixTransition { previous, current: fix.mode })
    }

    fn notify(&self, transition: Option<FixTransition>) {
        if let Some(transition) = transition {
            debug!("Notifying observers of fix change, {} -> {}", transition.previous, transition.current);
            self.observers.publish(&transition);
        }
    }

    fn set_satellites(&self, sky: &SkyReport) {
        let Some((visible, used)) = sky.satellite_counts() else {
            trace!("SKY report without satellite counts");
            return;
        };

        let mut data = self.lock();
        data.state.satellites_visible = visible;
        data.state.satellites_used = used;
    }

    fn reset_fix(&self) {
        let transition = {
            let mut data = self.lock();
            data.state.satellites_visible = 0;
            data.state.satellites_used = 0;
            Self::apply_fix(&mut data, RawFix::no_fix())
        };
        self.notify(transition);
    }

    fn lock(&self) -> MutexGuard<'_, FixData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TargetSource for PositionSourceClient {
    fn has_fix(&self) -> bool {
        PositionSourceClient::has_fix(self)
    }

    fn current_position(&self) -> Option<GeoPoint> {
        PositionSourceClient::current_position(self)
    }

    fn last_good_raw_fix(&self) -> Option<GeoPoint> {
        PositionSourceClient::last_good_raw_fix(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::report::{Satellite, TpvReport};
    use crate::gps::source::ReportStream;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Script = Vec<Result<Report, PositionSourceError>>;

    /// Replays one scripted subscription per `connect`, then refuses connections.
    #[derive(Debug)]
    struct ScriptedSource {
        scripts: Mutex<VecDeque<Script>>,
        connects: Arc<AtomicUsize>,
        hold_open: bool,
    }

    impl ScriptedSource {
        fn new(scripts: Vec<Script>) -> Self {
            ScriptedSource {
                scripts: Mutex::new(scripts.into()),
                connects: Arc::new(AtomicUsize::new(0)),
                hold_open: false,
            }
        }
    }

    #[async_trait]
    impl PositionSource for ScriptedSource {
        async fn connect(&self) -> Result<ReportStream, PositionSourceError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.lock().unwrap().pop_front();
            match script {
                Some(script) if self.hold_open => Ok(Box::pin(futures::stream::iter(script).chain(futures::stream::pending()))),
                Some(script) => Ok(Box::pin(futures::stream::iter(script))),
                None => Err(PositionSourceError::Connect(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))),
            }
        }
    }

    fn config(min_satellites: usize) -> Config {
        Config {
            min_satellites,
            smoothing_window: 5,
            retry_interval: Duration::from_millis(10),
            stale_timeout: Duration::from_secs(5),
        }
    }

    fn client(min_satellites: usize) -> PositionSourceClient {
        PositionSourceClient::new(Box::new(ScriptedSource::new(vec![])), config(min_satellites))
    }

    fn tpv(mode: u8, lat: f64, lon: f64, alt: f64) -> Report {
        Report::Tpv(TpvReport {
            mode,
            lat: Some(lat),
            lon: Some(lon),
            alt: Some(alt),
            ..TpvReport::default()
        })
    }

    fn sky(used: usize, unused: usize) -> Report {
        let satellites = (0..used)
            .map(|_| Satellite { prn: None, used: true })
            .chain((0..unused).map(|_| Satellite { prn: None, used: false }))
            .collect();
        Report::Sky(SkyReport {
            satellites: Some(satellites),
            ..SkyReport::default()
        })
    }

    fn record_transitions(client: &PositionSourceClient) -> Arc<Mutex<Vec<FixTransition>>> {
        let transitions = Arc::new(Mutex::new(Vec::new()));
        let transitions_clone = transitions.clone();
        client.observers().subscribe(move |t: &FixTransition| transitions_clone.lock().unwrap().push(*t));
        transitions
    }

    #[rstest]
    #[case(3, 4, false)]
    #[case(3, 5, true)]
    #[case(2, 10, false)]
    #[case(1, 10, false)]
    fn has_fix_requires_a_3d_fix_with_more_than_min_satellites(#[case] mode: u8, #[case] used: usize, #[case] expected: bool) {
        let client = client(4);
        client.handle_report(sky(used, 2));
        client.handle_report(tpv(mode, 10.0, 20.0, 30.0));

        assert_eq!(client.has_fix(), expected);
        assert_eq!(client.fix_state().satellites_visible, used + 2);
    }

    #[test]
    fn has_fix_is_false_with_exactly_min_satellites() {
        let client = client(4);
        client.handle_report(sky(4, 0));
        client.handle_report(tpv(3, 10.0, 20.0, 30.0));

        assert!(!client.has_fix());

        client.handle_report(sky(5, 0));
        assert!(client.has_fix());
    }

    #[test]
    fn current_position_is_none_before_any_fix() {
        let client = client(0);
        client.handle_report(tpv(2, 10.0, 20.0, 30.0));

        assert_eq!(client.current_position(), None);
        assert_eq!(client.last_good_raw_fix(), None);
    }

    #[test]
    fn current_position_is_smoothed_and_raw_fix_is_not() {
        let client = client(0);
        client.handle_report(tpv(3, 10.0, 20.0, 30.0));
        client.handle_report(tpv(3, 10.2, 20.2, 40.0));

        let smoothed = client.current_position().unwrap();
        assert!((smoothed.lat() - 10.1).abs() < 1e-9);
        assert!((smoothed.lon() - 20.1).abs() < 1e-9);
        assert_eq!(smoothed.alt(), Some(35.0));
        assert_eq!(client.last_good_raw_fix(), Some(GeoPoint::new(10.2, 20.2).unwrap().with_altitude(40.0)));
    }

    #[test]
    fn only_mode_changes_are_published() {
        let client = client(0);
        let transitions = record_transitions(&client);

        client.handle_report(tpv(2, 10.0, 20.0, 30.0));
        client.handle_report(tpv(3, 10.0, 20.0, 30.0));
        client.handle_report(tpv(3, 10.0, 20.0, 30.0));
        client.handle_report(sky(6, 0));
        client.handle_report(tpv(1, 0.0, 0.0, 0.0));

        assert_eq!(
            *transitions.lock().unwrap(),
            vec![
                FixTransition {
                    previous: FixMode::NoFix,
                    current: FixMode::Fix2d
                },
                FixTransition {
                    previous: FixMode::Fix2d,
                    current: FixMode::Fix3d
                },
                FixTransition {
                    previous: FixMode::Fix3d,
                    current: FixMode::NoFix
                },
            ]
        );
    }

    #[test]
    fn reset_clears_mode_and_satellites_together() {
        let client = client(3);

        std::thread::scope(|scope| {
            let reader = scope.spawn(|| {
                for _ in 0..10_000 {
                    let state = client.fix_state();
                    assert!(state.mode != FixMode::Fix3d || state.satellites_used == 6, "torn state {:?}", state);
                }
            });

            for _ in 0..1_000 {
                client.handle_report(sky(6, 2));
                client.handle_report(tpv(3, 10.0, 20.0, 30.0));
                client.reset_fix();
            }
            reader.join().unwrap();
        });

        assert_eq!(client.fix_state(), FixState::default());
    }

    #[test]
    fn invalid_3d_positions_are_not_averaged() {
        let client = client(0);
        client.handle_report(tpv(3, 95.0, 20.0, 30.0));

        assert_eq!(client.fix_state().mode, FixMode::Fix3d);
        assert_eq!(client.current_position(), None);
    }

    #[test_log::test(tokio::test)]
    async fn run_resets_the_fix_and_reconnects_after_a_stream_failure() {
        let first = vec![Ok(sky(6, 1)), Ok(tpv(3, 10.0, 20.0, 30.0))];
        let second = vec![
            Err(PositionSourceError::Decode {
                source: serde_json::from_str::<u8>("x").unwrap_err(),
                line: "x".to_string(),
            }),
            Ok(sky(6, 0)),
            Ok(tpv(3, 10.0, 20.0, 30.0)),
        ];
        let source = ScriptedSource::new(vec![first, second]);
        let connects = source.connects.clone();
        let client = Arc::new(PositionSourceClient::new(Box::new(source), config(4)));
        let transitions = record_transitions(&client);

        let runner = client.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        timeout(Duration::from_secs(2), async {
            while transitions.lock().unwrap().len() < 4 || connects.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("expected the client to reconnect");

        client.cancel();
        timeout(Duration::from_secs(2), handle).await.expect("run did not stop").unwrap();

        let modes = transitions.lock().unwrap().iter().map(|t| t.current).collect::<Vec<_>>();
        assert_eq!(&modes[..4], &[FixMode::Fix3d, FixMode::NoFix, FixMode::Fix3d, FixMode::NoFix]);
        assert!(!client.has_fix());
        assert_eq!(client.fix_state().satellites_used, 0);
        assert!(client.current_position().is_some());
    }

    #[test_log::test(tokio::test)]
    async fn cancel_stops_a_healthy_stream() {
        let mut source = ScriptedSource::new(vec![vec![Ok(sky(6, 0)), Ok(tpv(3, 10.0, 20.0, 30.0))]]);
        source.hold_open = true;
        let client = Arc::new(PositionSourceClient::new(Box::new(source), config(4)));

        let runner = client.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        timeout(Duration::from_secs(2), async {
            while !client.has_fix() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("expected a fix");

        client.cancel();
        timeout(Duration::from_secs(2), handle).await.expect("run did not stop").unwrap();

        assert!(client.is_cancelled());
        assert!(!client.has_fix());
    }

    #[test_log::test(tokio::test)]
    async fn silent_stream_is_treated_as_stale() {
        let mut source = ScriptedSource::new(vec![vec![Ok(sky(6, 0)), Ok(tpv(3, 10.0, 20.0, 30.0))]]);
        source.hold_open = true;
        let mut config = config(4);
        config.stale_timeout = Duration::from_millis(20);
        let client = PositionSourceClient::new(Box::new(source), config);

        let result = client.stream_reports().await;

        assert!(matches!(result, Err(PositionSourceError::Stale(_))));
        assert_eq!(client.fix_state().mode, FixMode::Fix3d);
    }
}
