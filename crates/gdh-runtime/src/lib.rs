#![forbid(unsafe_code)]

pub mod rng;
pub mod stepping;

use gdh_state::{OutputBundle, PhysicalState, StateError};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use rng::DeterministicRng;
pub use stepping::{AdamsBashforth, AdamsBashforthFactory, IntegratorFactory};

pub const DEFAULT_TIMESTEP: Duration = Duration::from_secs(10);
pub const DEFAULT_SEED: u64 = 0;

/// What a component needs in order to be called, declared once per component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Instantaneous diagnostics from state alone.
    Stateless,
    /// Returns `(tendencies, diagnostics)`; implicit schemes also need the step.
    TendencyProducing { implicit: bool },
    /// Advances state itself and needs the step.
    SelfStepping,
}

impl Capability {
    #[must_use]
    pub const fn requires_timestep(self) -> bool {
        matches!(
            self,
            Self::SelfStepping | Self::TendencyProducing { implicit: true }
        )
    }

    #[must_use]
    pub const fn produces_tendencies(self) -> bool {
        matches!(self, Self::TendencyProducing { .. })
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stateless => "stateless",
            Self::TendencyProducing { implicit: false } => "tendency_producing",
            Self::TendencyProducing { implicit: true } => "implicit_tendency_producing",
            Self::SelfStepping => "self_stepping",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComponentError {
    MissingInput(String),
    InvalidInput { name: String, detail: String },
    InvalidOutput(String),
    TimestepRequired(String),
    TracerConflict { name: String, registered: String, requested: String },
    NotTendencyProducing(String),
    State(StateError),
}

impl ComponentError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::MissingInput(_) => "component_missing_input",
            Self::InvalidInput { .. } => "component_invalid_input",
            Self::InvalidOutput(_) => "component_invalid_output",
            Self::TimestepRequired(_) => "component_timestep_required",
            Self::TracerConflict { .. } => "component_tracer_conflict",
            Self::NotTendencyProducing(_) => "component_not_tendency_producing",
            Self::State(err) => err.reason_code(),
        }
    }
}

impl std::fmt::Display for ComponentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingInput(name) => write!(f, "required input {name} is missing from state"),
            Self::InvalidInput { name, detail } => write!(f, "input {name} is invalid: {detail}"),
            Self::InvalidOutput(msg) => write!(f, "{msg}"),
            Self::TimestepRequired(component) => {
                write!(f, "{component} requires a timestep but none was supplied")
            }
            Self::TracerConflict {
                name,
                registered,
                requested,
            } => write!(
                f,
                "tracer {name} already registered with units {registered}, requested {requested}"
            ),
            Self::NotTendencyProducing(component) => {
                write!(f, "{component} does not produce tendencies and cannot be time-stepped")
            }
            Self::State(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ComponentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::State(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StateError> for ComponentError {
    fn from(value: StateError) -> Self {
        Self::State(value)
    }
}

/// The component-under-test protocol.
pub trait Component {
    fn name(&self) -> &str;

    fn capability(&self) -> Capability;

    /// `timestep` is `Some` exactly when `capability().requires_timestep()`.
    fn call(
        &mut self,
        state: &PhysicalState,
        timestep: Option<Duration>,
        ctx: &mut InvocationContext,
    ) -> Result<OutputBundle, ComponentError>;
}

impl<C: Component + ?Sized> Component for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn capability(&self) -> Capability {
        (**self).capability()
    }

    fn call(
        &mut self,
        state: &PhysicalState,
        timestep: Option<Duration>,
        ctx: &mut InvocationContext,
    ) -> Result<OutputBundle, ComponentError> {
        (**self).call(state, timestep, ctx)
    }
}

/// Auxiliary transported quantities and their units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TracerRegistry {
    tracers: BTreeMap<String, String>,
}

impl TracerRegistry {
    pub fn register(&mut self, name: &str, units: &str) -> Result<(), ComponentError> {
        match self.tracers.get(name) {
            Some(registered) if registered != units => Err(ComponentError::TracerConflict {
                name: name.to_string(),
                registered: registered.clone(),
                requested: units.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.tracers.insert(name.to_string(), units.to_string());
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn units(&self, name: &str) -> Option<&str> {
        self.tracers.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tracers.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracers.is_empty()
    }

    pub fn clear(&mut self) {
        self.tracers.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackerEntry {
    pub owner: String,
    pub tracers: Vec<String>,
}

/// Which component packs which tracers into its working arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackerRegistry {
    entries: Vec<PackerEntry>,
}

impl PackerRegistry {
    pub fn register(&mut self, owner: &str, tracers: &[&str]) {
        self.entries.push(PackerEntry {
            owner: owner.to_string(),
            tracers: tracers.iter().map(ToString::to_string).collect(),
        });
    }

    #[must_use]
    pub fn entries(&self) -> &[PackerEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvocationEvent {
    pub ts_millis: u128,
    pub component: String,
    pub capability: Capability,
    pub timestep_seconds: Option<f64>,
    pub seed: u64,
    pub jit_disabled: bool,
    pub succeeded: bool,
}

#[derive(Debug, Default, Clone)]
pub struct InvocationLedger {
    events: Vec<InvocationEvent>,
}

impl InvocationLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: InvocationEvent) {
        self.events.push(event);
    }

    #[must_use]
    pub fn events(&self) -> &[InvocationEvent] {
        &self.events
    }

    #[must_use]
    pub fn last(&self) -> Option<&InvocationEvent> {
        self.events.last()
    }
}

/// Everything a component may mutate besides its own fields. One context per
/// scenario; `invoke` resets it before every call.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    seed: u64,
    jit_disabled: bool,
    rng: DeterministicRng,
    tracers: TracerRegistry,
    packers: PackerRegistry,
    ledger: InvocationLedger,
}

impl InvocationContext {
    #[must_use]
    pub fn new(seed: u64, jit_disabled: bool) -> Self {
        Self {
            seed,
            jit_disabled,
            rng: DeterministicRng::new(seed),
            tracers: TracerRegistry::default(),
            packers: PackerRegistry::default(),
            ledger: InvocationLedger::new(),
        }
    }

    /// Clears both registries and rewinds the random stream to the seed.
    pub fn reset(&mut self) {
        self.tracers.clear();
        self.packers.clear();
        self.rng.reseed(self.seed);
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn jit_disabled(&self) -> bool {
        self.jit_disabled
    }

    pub fn rng_mut(&mut self) -> &mut DeterministicRng {
        &mut self.rng
    }

    #[must_use]
    pub fn tracers(&self) -> &TracerRegistry {
        &self.tracers
    }

    pub fn tracers_mut(&mut self) -> &mut TracerRegistry {
        &mut self.tracers
    }

    #[must_use]
    pub fn packers(&self) -> &PackerRegistry {
        &self.packers
    }

    pub fn packers_mut(&mut self) -> &mut PackerRegistry {
        &mut self.packers
    }

    #[must_use]
    pub fn ledger(&self) -> &InvocationLedger {
        &self.ledger
    }
}

impl Default for InvocationContext {
    fn default() -> Self {
        Self::new(DEFAULT_SEED, true)
    }
}

/// Calls `component` on `state` after resetting `ctx`. The step is passed only
/// to components whose capability requires one.
pub fn invoke(
    component: &mut dyn Component,
    state: &PhysicalState,
    timestep: Duration,
    ctx: &mut InvocationContext,
) -> Result<OutputBundle, ComponentError> {
    ctx.reset();
    let capability = component.capability();
    let step = capability.requires_timestep().then_some(timestep);
    let result = component.call(state, step, ctx);

    let ts_millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis());
    ctx.ledger.record(InvocationEvent {
        ts_millis,
        component: component.name().to_string(),
        capability,
        timestep_seconds: step.map(|d| d.as_secs_f64()),
        seed: ctx.seed,
        jit_disabled: ctx.jit_disabled,
        succeeded: result.is_ok(),
    });
    result
}
