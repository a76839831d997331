use std::{sync::Arc, time::Duration};

use anyhow::Result;
use log::{debug, info};
use tokio::{
    sync::{watch, Mutex, MutexGuard},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

use super::{FocusEvent, FocusEventSink, FocusSessionController, FocusSnapshot};

struct TimerCore {
    controller: FocusSessionController,
    /// Bumped whenever the tick task is replaced; a task only applies ticks
    /// while its generation is current.
    generation: u64,
}

/// Where transitions go once applied: the event sink and the snapshot channel.
/// Only ever used while the `TimerCore` lock is held, so subscribers and the
/// sink observe transitions in the order the controller made them.
#[derive(Clone)]
struct Outlet {
    sink: Arc<dyn FocusEventSink>,
    state_tx: Arc<watch::Sender<FocusSnapshot>>,
}

impl Outlet {
    /// Events go out before the snapshot, so a subscriber that sees a new
    /// state can rely on its events already being with the sink.
    fn publish(
        &self,
        _core: &MutexGuard<'_, TimerCore>,
        events: Vec<FocusEvent>,
        snapshot: FocusSnapshot,
    ) {
        for event in events {
            info!("dispatching {} for plan {}", event.name(), event.plan_id());
            self.sink.dispatch(event);
        }
        self.state_tx.send_replace(snapshot);
    }
}

/// Drives a [`FocusSessionController`] from a one-second tokio interval.
///
/// Every command cancels the outstanding tick task before touching the
/// controller, so at most one tick task exists per timer.
#[derive(Clone)]
pub struct FocusTimer {
    core: Arc<Mutex<TimerCore>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    tick_interval: Duration,
    outlet: Outlet,
}

impl FocusTimer {
    pub fn new(controller: FocusSessionController, sink: Arc<dyn FocusEventSink>) -> Self {
        Self::with_tick_interval(controller, sink, Duration::from_secs(1))
    }

    pub fn with_tick_interval(
        controller: FocusSessionController,
        sink: Arc<dyn FocusEventSink>,
        tick_interval: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(controller.snapshot());
        Self {
            core: Arc::new(Mutex::new(TimerCore {
                controller,
                generation: 0,
            })),
            ticker: Arc::new(Mutex::new(None)),
            tick_interval,
            outlet: Outlet {
                sink,
                state_tx: Arc::new(state_tx),
            },
        }
    }

    pub async fn snapshot(&self) -> FocusSnapshot {
        self.core.lock().await.controller.snapshot()
    }

    /// Receiver that sees every state change, including each tick.
    pub fn subscribe(&self) -> watch::Receiver<FocusSnapshot> {
        self.outlet.state_tx.subscribe()
    }

    pub async fn start_plan(&self, hours: u32) -> Result<FocusSnapshot> {
        self.cancel_ticker().await;

        let mut core = self.core.lock().await;
        let events = match core.controller.start_plan(hours) {
            Ok(events) => events,
            Err(err) => {
                drop(core);
                // A rejected plan leaves a running one untouched.
                self.respawn_if_running().await;
                return Err(err);
            }
        };
        let snapshot = core.controller.snapshot();
        self.outlet.publish(&core, events, snapshot.clone());
        drop(core);

        self.spawn_ticker().await;
        Ok(snapshot)
    }

    pub async fn pause(&self) -> FocusSnapshot {
        self.cancel_ticker().await;
        let mut core = self.core.lock().await;
        core.controller.pause();
        let snapshot = core.controller.snapshot();
        self.outlet.publish(&core, Vec::new(), snapshot.clone());
        snapshot
    }

    pub async fn resume(&self) -> FocusSnapshot {
        self.cancel_ticker().await;
        let snapshot = {
            let mut core = self.core.lock().await;
            core.controller.resume();
            let snapshot = core.controller.snapshot();
            self.outlet.publish(&core, Vec::new(), snapshot.clone());
            snapshot
        };
        if snapshot.state.is_running {
            self.spawn_ticker().await;
        }
        snapshot
    }

    pub async fn reset(&self) -> FocusSnapshot {
        self.cancel_ticker().await;
        let mut core = self.core.lock().await;
        let events = core.controller.reset();
        let snapshot = core.controller.snapshot();
        self.outlet.publish(&core, events, snapshot.clone());
        snapshot
    }

    /// Stops the tick task without changing controller state.
    pub async fn stop_ticking(&self) {
        self.cancel_ticker().await;
    }

    async fn respawn_if_running(&self) {
        let running = self.core.lock().await.controller.state().is_running;
        if running {
            self.spawn_ticker().await;
        }
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let generation = {
            let mut core = self.core.lock().await;
            core.generation = core.generation.wrapping_add(1);
            core.generation
        };

        let core = self.core.clone();
        let outlet = self.outlet.clone();
        let tick_interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            let start = time::Instant::now() + tick_interval;
            let mut interval = time::interval_at(start, tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

            loop {
                interval.tick().await;

                let mut guard = core.lock().await;
                if guard.generation != generation || !guard.controller.state().is_running {
                    break;
                }
                let events = guard.controller.tick();
                let snapshot = guard.controller.snapshot();
                let still_running = snapshot.state.is_running;
                outlet.publish(&guard, events, snapshot);
                drop(guard);

                if !still_running {
                    debug!("tick task {generation} finished");
                    break;
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        {
            let mut core = self.core.lock().await;
            core.generation = core.generation.wrapping_add(1);
        }
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }
}
