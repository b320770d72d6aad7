//! Periodic refresh of every enabled provider.
//!
//! [`Refresher`] runs one cycle at a time: fan out to all enabled providers
//! concurrently, wait for every one of them, reduce the results and push
//! them to the display. A trigger that arrives while a cycle is running is
//! dropped. [`Scheduler`] owns the timer that drives the refresher and
//! reacts to configuration changes.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::{Config, ConfigChange};
use crate::display::{summarize, DisplaySink};
use crate::providers::{CreditError, CreditInfo, CreditProvider};

/// Shown when a cycle fails outside the per-provider guards.
pub const REFRESH_FAILED: &str = "Failed to refresh credits";

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Another cycle was already running.
    Skipped,
    /// No provider is enabled.
    Hidden,
    Completed(HashMap<String, CreditInfo>),
    Failed(String),
}

/// Clears the in-flight flag however the cycle ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Refresher {
    providers: Vec<Arc<dyn CreditProvider>>,
    config: Arc<Config>,
    sink: Arc<dyn DisplaySink>,
    in_flight: AtomicBool,
}

impl Refresher {
    pub fn new(
        providers: Vec<Arc<dyn CreditProvider>>,
        config: Arc<Config>,
        sink: Arc<dyn DisplaySink>,
    ) -> Self {
        Self {
            providers,
            config,
            sink,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one refresh cycle unless one is already in progress.
    pub async fn refresh(&self) -> RefreshOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("Update already in progress, skipping");
            return RefreshOutcome::Skipped;
        }
        let _guard = InFlight(&self.in_flight);

        if self.config.show_in_status_bar() {
            self.sink.show_loading();
        }
        tracing::info!("Starting credit refresh");

        let failure = match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
            Ok(Ok(outcome)) => {
                tracing::info!("Credit refresh completed");
                return outcome;
            }
            Ok(Err(err)) => format!("{:#}", err),
            Err(panic) => panic_message(panic.as_ref()),
        };

        tracing::error!("Critical error during refresh: {}", failure);
        if self.config.show_in_status_bar() {
            self.sink.show_error(REFRESH_FAILED);
        }
        RefreshOutcome::Failed(failure)
    }

    async fn run_cycle(&self) -> anyhow::Result<RefreshOutcome> {
        let enabled: Vec<Arc<dyn CreditProvider>> = self
            .providers
            .iter()
            .filter(|p| p.is_enabled())
            .cloned()
            .collect();

        if enabled.is_empty() {
            tracing::info!("No providers enabled");
            self.sink.hide();
            return Ok(RefreshOutcome::Hidden);
        }

        let results = collect_credits(&enabled).await;

        if self.config.show_in_status_bar() {
            let summary = summarize(&enabled, &results);
            self.sink.update_display(&summary)?;
            tracing::info!("Status bar updated: {}", summary.text);
        } else {
            self.sink.hide();
        }

        Ok(RefreshOutcome::Completed(results))
    }
}

/// Fetch from every provider concurrently and wait for all of them. A
/// provider that panics is recorded as an error under its own id.
pub async fn collect_credits(providers: &[Arc<dyn CreditProvider>]) -> HashMap<String, CreditInfo> {
    let fetches = providers.iter().map(|provider| async move {
        tracing::info!(provider = provider.id(), "Fetching credits from {}", provider.name());

        let credits = match AssertUnwindSafe(provider.get_credits()).catch_unwind().await {
            Ok(credits) => credits,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    provider = provider.id(),
                    "Error fetching credits from {}: {}",
                    provider.name(),
                    message
                );
                CreditInfo::from_error(&CreditError::Internal(message))
            }
        };

        match &credits.error {
            Some(error) => tracing::info!("{}: Error - {}", provider.name(), error),
            None => tracing::info!("{}: {}", provider.name(), credits.balance),
        }

        (provider.id().to_string(), credits)
    });

    join_all(fetches).await.into_iter().collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        CreditError::Unknown.to_string()
    }
}

#[derive(Default)]
struct TimerState {
    period: Option<Duration>,
    timer: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
}

/// Drives a [`Refresher`] from a timer and from configuration changes.
///
/// Cycles run in their own tasks, so stopping or restarting the timer never
/// cancels one that is already in flight.
pub struct Scheduler {
    refresher: Arc<Refresher>,
    config: Arc<Config>,
    sink: Arc<dyn DisplaySink>,
    state: Mutex<TimerState>,
}

impl Scheduler {
    pub fn new(refresher: Arc<Refresher>, config: Arc<Config>, sink: Arc<dyn DisplaySink>) -> Self {
        Self {
            refresher,
            config,
            sink,
            state: Mutex::new(TimerState::default()),
        }
    }

    pub fn refresher(&self) -> &Arc<Refresher> {
        &self.refresher
    }

    /// Start the timer at the configured interval (refreshing immediately)
    /// and begin listening for configuration changes.
    pub fn start(self: &Arc<Self>) {
        let interval = self.config.update_interval();
        tracing::info!("Starting periodic updates every {}", interval.label());
        self.restart(interval.period());

        let mut state = self.lock();
        if state.listener.is_none() {
            state.listener = Some(self.spawn_listener());
        }
    }

    /// Replace the timer with one firing every `period`. The new timer
    /// fires right away; that tick is dropped if a cycle is still running.
    pub fn restart(&self, period: Duration) {
        let mut state = self.lock();
        if let Some(handle) = state.timer.take() {
            handle.abort();
        }
        state.timer = Some(spawn_timer(self.refresher.clone(), period));
        state.period = Some(period);
    }

    /// Current timer period, `None` while stopped.
    pub fn period(&self) -> Option<Duration> {
        self.lock().period
    }

    /// Manual "refresh now" trigger.
    pub async fn refresh_now(&self) -> RefreshOutcome {
        self.refresher.refresh().await
    }

    /// Stop the periodic timer. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut state = self.lock();
        if let Some(handle) = state.timer.take() {
            handle.abort();
        }
        state.period = None;
    }

    /// Stop the timer and the configuration listener. Safe to call
    /// repeatedly.
    pub fn dispose(&self) {
        let listener = self.lock().listener.take();
        if listener.is_some() || self.period().is_some() {
            tracing::info!("Stopping credit refresh scheduler");
        }
        self.stop();
        if let Some(handle) = listener {
            handle.abort();
        }
    }

    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.config.subscribe();
        let scheduler = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                let change = match changes.recv().await {
                    Ok(change) => change,
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!("Missed {} configuration change events", missed);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(scheduler) = scheduler.upgrade() else {
                    break;
                };

                tracing::info!(?change, "Configuration changed");
                scheduler.apply_change(change);
            }
        })
    }

    fn apply_change(&self, change: ConfigChange) {
        match change {
            ConfigChange::UpdateInterval => {
                tracing::info!("Restarting periodic updates due to configuration change");
                self.restart(self.config.update_interval().period());
            }
            ConfigChange::StatusBar => {
                if self.config.show_in_status_bar() {
                    spawn_refresh(self.refresher.clone());
                } else {
                    self.sink.hide();
                }
            }
            ConfigChange::Providers => spawn_refresh(self.refresher.clone()),
            ConfigChange::RateWindow => {}
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Run one cycle detached from the caller.
fn spawn_refresh(refresher: Arc<Refresher>) {
    tokio::spawn(async move {
        refresher.refresh().await;
    });
}

fn spawn_timer(refresher: Arc<Refresher>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            // The first tick completes immediately
            ticker.tick().await;
            spawn_refresh(refresher.clone());
        }
    })
}
