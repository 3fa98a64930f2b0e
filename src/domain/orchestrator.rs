//! Lifecycle driver for an incremental run.
//!
//! ```text
//! Uninitialized -> Configured -> Starting | Resuming -> Running -> Terminated
//! ```
//!
//! `configure` selects the backend, `start` reads the previous checkpoint and
//! plans the run, `attach` wires the guard and recorder into the bus, and
//! `events` hands the host its event sequence. `tear_down` persists only on
//! success, so a failed window is retried wholesale by the next invocation.

use crate::domain::checkpoint::{plan_run, CheckpointMeta, ResumePlan, RunMode};
use crate::domain::clock::SimClock;
use crate::domain::context::RunContext;
use crate::domain::error::IncrementalError;
use crate::domain::event::{Frequency, Signal};
use crate::domain::event_bus::{EventListener, Propagation};
use crate::domain::event_source::EventSource;
use crate::domain::guard::SettlementGuard;
use crate::domain::settings::RunSettings;
use crate::domain::window::{EventWindow, WindowResolver};
use crate::ports::persist_port::PersistStore;
use crate::ports::recorder_port::Recorder;
use chrono::{NaiveDate, NaiveDateTime};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{info, warn};

/// Persistence backend for one run: the raw store (shared with the host for
/// its own state) and the recorder writing through it.
pub struct Backend {
    pub store: Rc<dyn PersistStore>,
    pub recorder: Box<dyn Recorder>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointParams {
    pub strategy_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub frequency: Frequency,
}

impl CheckpointParams {
    pub fn from_settings(settings: &RunSettings, strategy_id: &str) -> Self {
        CheckpointParams {
            strategy_id: strategy_id.to_string(),
            start_date: settings.start_date,
            end_date: settings.end_date,
            frequency: settings.frequency,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Configured,
    Starting,
    Resuming,
    Running,
    Terminated(RunOutcome),
}

type SharedRecorder = Rc<RefCell<Box<dyn Recorder>>>;

pub struct Orchestrator {
    params: CheckpointParams,
    now: NaiveDateTime,
    state: LifecycleState,
    store: Option<Rc<dyn PersistStore>>,
    recorder: Option<SharedRecorder>,
    plan: Option<ResumePlan>,
    resolver: Option<WindowResolver>,
    guard: Option<Rc<RefCell<SettlementGuard>>>,
    events_issued: bool,
}

impl Orchestrator {
    /// `now` becomes the `last_run_time` of the checkpoint written by this run.
    pub fn new(params: CheckpointParams, now: NaiveDateTime) -> Self {
        Orchestrator {
            params,
            now,
            state: LifecycleState::Uninitialized,
            store: None,
            recorder: None,
            plan: None,
            resolver: None,
            guard: None,
            events_issued: false,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn params(&self) -> &CheckpointParams {
        &self.params
    }

    pub fn configure(&mut self, backend: Backend) -> Result<(), IncrementalError> {
        self.require_state(&[LifecycleState::Uninitialized], "configure")?;
        self.store = Some(backend.store);
        self.recorder = Some(Rc::new(RefCell::new(backend.recorder)));
        self.state = LifecycleState::Configured;
        Ok(())
    }

    /// Load the previous checkpoint and decide between a fresh start and a
    /// resume. Fails with `NoProgress` when the configured end date does not
    /// move past the previous run's end.
    pub fn start(&mut self) -> Result<RunMode, IncrementalError> {
        self.require_state(&[LifecycleState::Configured], "start")?;
        let recorder = self.recorder()?;

        let persisted = recorder.borrow().load_meta()?;
        if let Some(previous) = &persisted
            && previous.strategy_id != self.params.strategy_id
        {
            warn!(
                stored = %previous.strategy_id,
                configured = %self.params.strategy_id,
                "checkpoint was written under a different strategy id"
            );
        }

        let fresh = CheckpointMeta::fresh(
            &self.params.strategy_id,
            self.params.start_date,
            self.params.end_date,
            self.now,
        );
        let plan = plan_run(fresh, persisted)?;
        let mode = plan.mode();

        match mode {
            RunMode::Fresh => info!(
                strategy_id = %self.params.strategy_id,
                start = %plan.event_start,
                "no checkpoint found; starting fresh"
            ),
            RunMode::Resume => info!(
                strategy_id = %self.params.strategy_id,
                origin = %plan.meta.origin_start_date,
                resume_from = %plan.event_start,
                "resuming from checkpoint"
            ),
        }

        self.resolver = Some(WindowResolver::new(
            plan.event_start,
            self.params.end_date,
            self.params.frequency,
        ));
        self.plan = Some(plan);
        self.state = match mode {
            RunMode::Fresh => LifecycleState::Starting,
            RunMode::Resume => LifecycleState::Resuming,
        };
        Ok(mode)
    }

    /// Subscribe the settlement guard and the recorder to the run's bus.
    pub fn attach(&mut self, ctx: &mut RunContext) -> Result<(), IncrementalError> {
        self.require_state(&[LifecycleState::Starting, LifecycleState::Resuming], "attach")?;
        let recorder = self.recorder()?;

        let guard = Rc::new(RefCell::new(SettlementGuard::new(
            ctx.calendar.clone(),
            self.last_processed(),
        )));
        ctx.bus.subscribe(guard.clone());
        ctx.bus
            .subscribe(Rc::new(RefCell::new(RecordingListener { recorder })));

        self.guard = Some(guard);
        self.state = LifecycleState::Running;
        Ok(())
    }

    /// The run's event sequence. The window is resolved here, on first
    /// request, and the sequence can be taken only once per run.
    pub fn events(&mut self, ctx: &RunContext) -> Result<EventSource, IncrementalError> {
        self.require_state(&[LifecycleState::Running], "events")?;
        if self.events_issued {
            return Err(IncrementalError::Lifecycle {
                reason: "event sequence already consumed for this run".into(),
            });
        }
        let resolver = self.resolver.as_ref().ok_or_else(|| not_started("events"))?;
        let window = resolver.resolve(ctx.data.as_ref())?;
        self.events_issued = true;
        Ok(EventSource::new(
            ctx.calendar.clone(),
            window,
            resolver.frequency(),
        ))
    }

    pub fn window(&self) -> Option<EventWindow> {
        self.resolver.as_ref().and_then(|r| r.resolved())
    }

    /// First date this run produces events for.
    pub fn event_start(&self) -> Option<NaiveDate> {
        self.plan.as_ref().map(|p| p.event_start)
    }

    pub fn last_processed(&self) -> Option<NaiveDate> {
        self.plan.as_ref().and_then(|p| p.last_processed)
    }

    pub fn mode(&self) -> Option<RunMode> {
        self.plan.as_ref().map(|p| p.mode())
    }

    pub fn suppressed_settlements(&self) -> usize {
        self.guard.as_ref().map_or(0, |g| g.borrow().suppressed())
    }

    /// Store shared with the host for its own state.
    pub fn store(&self) -> Option<Rc<dyn PersistStore>> {
        self.store.clone()
    }

    /// Persist on success, then close the backend on every path.
    pub fn tear_down(&mut self, outcome: RunOutcome) -> Result<(), IncrementalError> {
        if let LifecycleState::Terminated(_) = self.state {
            return Err(IncrementalError::Lifecycle {
                reason: "tear_down called twice".into(),
            });
        }

        let persisted = match (outcome, self.state) {
            (RunOutcome::Success, LifecycleState::Running) => self.persist(),
            (RunOutcome::Success, state) => {
                warn!(?state, "run ended before it was running; nothing to checkpoint");
                Ok(())
            }
            (RunOutcome::Failure, _) => {
                warn!("run failed; checkpoint left unchanged so the window is retried");
                Ok(())
            }
        };

        let closed = match &self.recorder {
            Some(recorder) => recorder.borrow_mut().close(),
            None => Ok(()),
        };

        self.state = LifecycleState::Terminated(outcome);
        persisted.and(closed)
    }

    fn persist(&mut self) -> Result<(), IncrementalError> {
        let recorder = self.recorder()?;
        let plan = self.plan.as_ref().ok_or_else(|| not_started("tear_down"))?;

        let Some(window) = self.window().filter(|w| !w.is_empty()) else {
            info!("no dates processed in this run; checkpoint left unchanged");
            return Ok(());
        };

        let meta = CheckpointMeta {
            last_end_time: window.end,
            ..plan.meta.clone()
        };
        info!(last_end_time = %meta.last_end_time, "writing checkpoint");

        let mut recorder = recorder.borrow_mut();
        recorder.store_meta(meta);
        recorder.flush()
    }

    fn recorder(&self) -> Result<SharedRecorder, IncrementalError> {
        self.recorder.clone().ok_or_else(|| IncrementalError::Lifecycle {
            reason: "no backend configured".into(),
        })
    }

    fn require_state(&self, allowed: &[LifecycleState], op: &str) -> Result<(), IncrementalError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(IncrementalError::Lifecycle {
                reason: format!("{op} not allowed in state {:?}", self.state),
            })
        }
    }
}

fn not_started(op: &str) -> IncrementalError {
    IncrementalError::Lifecycle {
        reason: format!("{op} called before start"),
    }
}

/// Feeds trade and settlement signals into the recorder.
struct RecordingListener {
    recorder: SharedRecorder,
}

impl EventListener for RecordingListener {
    fn on_signal(
        &mut self,
        signal: &Signal,
        _clock: &mut SimClock,
    ) -> Result<Propagation, IncrementalError> {
        match signal {
            Signal::Trade(trade) => self.recorder.borrow_mut().append_trade(trade.clone()),
            Signal::PostSettlement {
                trading_date,
                portfolio,
                benchmark,
            } => self
                .recorder
                .borrow_mut()
                .append_portfolio(*trading_date, *portfolio, *benchmark),
            _ => {}
        }
        Ok(Propagation::Continue)
    }
}
