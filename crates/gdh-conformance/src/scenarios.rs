#![forbid(unsafe_code)]

use crate::comparison::{ComparisonError, compare_outputs};
use crate::reference::ReferenceStateFactory;
use crate::validity::{SkippedCheck, check_no_nans};
use crate::{HarnessConfig, SuiteReport, record_suite_check};
use gdh_cache::{CacheError, CacheStore};
use gdh_runtime::{
    AdamsBashforthFactory, Component, ComponentError, IntegratorFactory, InvocationContext, invoke,
};
use gdh_state::{GridSpec, OutputBundle, Permutation, PhysicalState, StateError, permute_spatial};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

pub const SCENARIO_LOG_ENV: &str = "GDH_SCENARIO_LOG_PATH";
const SUITE_NAME: &str = "component_scenarios";

static SCENARIO_LOG_PATH: OnceLock<Mutex<Option<PathBuf>>> = OnceLock::new();

/// Builds a fresh component under test; also names its cache files.
pub trait ComponentFactory {
    fn scenario_name(&self) -> &str;

    fn build(&self) -> Box<dyn Component>;
}

/// A named closure acting as a [`ComponentFactory`].
pub struct ComponentFn<F> {
    name: String,
    build: F,
}

impl<F> ComponentFn<F>
where
    F: Fn() -> Box<dyn Component>,
{
    pub fn new(name: impl Into<String>, build: F) -> Self {
        Self {
            name: name.into(),
            build,
        }
    }
}

impl<F> ComponentFactory for ComponentFn<F>
where
    F: Fn() -> Box<dyn Component>,
{
    fn scenario_name(&self) -> &str {
        &self.name
    }

    fn build(&self) -> Box<dyn Component> {
        (self.build)()
    }
}

/// Produces the default input state a component needs on a grid.
pub trait StateFactory {
    fn default_state(
        &self,
        component: &dyn Component,
        grid: GridSpec,
    ) -> Result<PhysicalState, StateError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Column,
    ColumnNoNan,
    ColumnStepping,
    Volume,
    VolumeStepping,
    VolumeNoNan,
    Reversed,
    Transposed,
}

impl Scenario {
    pub const ALL: [Self; 8] = [
        Self::Column,
        Self::ColumnNoNan,
        Self::ColumnStepping,
        Self::Volume,
        Self::VolumeStepping,
        Self::VolumeNoNan,
        Self::Reversed,
        Self::Transposed,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Column => "column_output_matches_cached_output",
            Self::ColumnNoNan => "no_nans_in_column_output",
            Self::ColumnStepping => "column_stepping_output_matches_cached_output",
            Self::Volume => "3d_output_matches_cached_output",
            Self::VolumeStepping => "3d_stepping_output_matches_cached_output",
            Self::VolumeNoNan => "no_nans_in_3d_output",
            Self::Reversed => "reversed_state_gives_same_output",
            Self::Transposed => "transposed_state_gives_same_output",
        }
    }

    /// Cache descriptor compared against, if the scenario uses the cache at all.
    #[must_use]
    pub const fn descriptor(self) -> Option<&'static str> {
        match self {
            Self::Column => Some("column"),
            Self::ColumnStepping => Some("column_stepping"),
            Self::Volume | Self::Reversed | Self::Transposed => Some("3d"),
            Self::VolumeStepping => Some("3d_stepping"),
            Self::ColumnNoNan | Self::VolumeNoNan => None,
        }
    }

    #[must_use]
    pub const fn is_column(self) -> bool {
        matches!(self, Self::Column | Self::ColumnNoNan | Self::ColumnStepping)
    }

    #[must_use]
    pub const fn is_stepping(self) -> bool {
        matches!(self, Self::ColumnStepping | Self::VolumeStepping)
    }

    /// Direct and stepping scenarios seed the cache on a miss; invariance
    /// scenarios only ever read it.
    #[must_use]
    pub const fn writes_on_miss(self) -> bool {
        matches!(
            self,
            Self::Column | Self::ColumnStepping | Self::Volume | Self::VolumeStepping
        )
    }

    const fn permutation(self) -> Option<Permutation> {
        match self {
            Self::Reversed => Some(Permutation::Reversed),
            Self::Transposed => Some(Permutation::Rotated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioError {
    /// No cache for `(scenario, descriptor)`; `written` lists what was saved.
    MissingCache {
        scenario: String,
        descriptor: String,
        written: Vec<PathBuf>,
    },
    NanProduced {
        variable: String,
        output_index: usize,
    },
    Comparison(ComparisonError),
    Invocation(ComponentError),
    Cache(CacheError),
    State(StateError),
    Log(String),
}

impl ScenarioError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::MissingCache { .. } => "scenario_missing_cache",
            Self::NanProduced { .. } => "scenario_nan_produced",
            Self::Comparison(err) => err.reason_code(),
            Self::Invocation(err) => err.reason_code(),
            Self::Cache(err) => err.reason_code(),
            Self::State(err) => err.reason_code(),
            Self::Log(_) => "scenario_log_failed",
        }
    }
}

impl std::fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCache {
                scenario,
                descriptor,
                written,
            } if written.is_empty() => {
                write!(f, "no cached output for {scenario}-{descriptor}")
            }
            Self::MissingCache {
                scenario,
                descriptor,
                written,
            } => write!(
                f,
                "no cached output for {scenario}-{descriptor}; cached current output to {} file(s)",
                written.len()
            ),
            Self::NanProduced {
                variable,
                output_index,
            } => write!(f, "NaN produced in output {variable} from state {output_index}"),
            Self::Comparison(err) => write!(f, "{err}"),
            Self::Invocation(err) => write!(f, "component call failed: {err}"),
            Self::Cache(err) => write!(f, "{err}"),
            Self::State(err) => write!(f, "{err}"),
            Self::Log(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ScenarioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Comparison(err) => Some(err),
            Self::Invocation(err) => Some(err),
            Self::Cache(err) => Some(err),
            Self::State(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ComparisonError> for ScenarioError {
    fn from(value: ComparisonError) -> Self {
        Self::Comparison(value)
    }
}

impl From<ComponentError> for ScenarioError {
    fn from(value: ComponentError) -> Self {
        Self::Invocation(value)
    }
}

impl From<CacheError> for ScenarioError {
    fn from(value: CacheError) -> Self {
        Self::Cache(value)
    }
}

impl From<StateError> for ScenarioError {
    fn from(value: StateError) -> Self {
        Self::State(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Passed,
    Skipped(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioRun {
    pub scenario: Scenario,
    pub status: RunStatus,
    pub cache_files: Vec<PathBuf>,
    /// Variables whose payload type has no NaN and went unchecked.
    pub unchecked: Vec<SkippedCheck>,
}

#[derive(Debug, Serialize)]
struct ScenarioLogEntry {
    suite: &'static str,
    scenario: &'static str,
    component: String,
    descriptor: Option<&'static str>,
    seed: u64,
    jit_disabled: bool,
    timestep_seconds: Option<f64>,
    cache_files: Vec<String>,
    unchecked_variables: Vec<String>,
    outcome: &'static str,
    reason_code: String,
    detail: String,
}

/// What `execute` observed, kept for the log entry.
#[derive(Debug, Default)]
struct CallRecord {
    timestep_seconds: Option<f64>,
    cache_files: Vec<PathBuf>,
    unchecked: Vec<SkippedCheck>,
}

pub fn set_scenario_log_path(path: Option<PathBuf>) {
    let cell = SCENARIO_LOG_PATH.get_or_init(|| Mutex::new(None));
    if let Ok(mut slot) = cell.lock() {
        *slot = path;
    }
}

/// Runs the regression scenarios for one component against one cache root.
pub struct ScenarioHarness {
    components: Box<dyn ComponentFactory>,
    states: Box<dyn StateFactory>,
    integrator: Box<dyn IntegratorFactory>,
    store: CacheStore,
    config: HarnessConfig,
}

impl ScenarioHarness {
    pub fn new(components: impl ComponentFactory + 'static, config: HarnessConfig) -> Self {
        Self {
            components: Box::new(components),
            states: Box::new(ReferenceStateFactory),
            integrator: Box::new(AdamsBashforthFactory::default()),
            store: CacheStore::new(config.cache_root.clone()),
            config,
        }
    }

    #[must_use]
    pub fn with_state_factory(mut self, states: impl StateFactory + 'static) -> Self {
        self.states = Box::new(states);
        self
    }

    #[must_use]
    pub fn with_integrator(mut self, integrator: impl IntegratorFactory + 'static) -> Self {
        self.integrator = Box::new(integrator);
        self
    }

    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Runs one scenario with a fresh component and context, then logs it.
    pub fn run(&self, scenario: Scenario) -> Result<ScenarioRun, ScenarioError> {
        let mut record = CallRecord::default();
        let result = self.execute(scenario, &mut record);

        let (outcome, reason_code, detail) = match &result {
            Ok(RunStatus::Passed) => ("pass", "ok".to_string(), String::new()),
            Ok(RunStatus::Skipped(why)) => {
                ("skipped", "scenario_skipped".to_string(), (*why).to_string())
            }
            Err(err) => ("fail", err.reason_code().to_string(), err.to_string()),
        };
        let cache_files = match (&result, scenario.descriptor()) {
            (Err(ScenarioError::MissingCache { written, .. }), _) => written.clone(),
            (Ok(RunStatus::Passed), Some(_)) => record.cache_files.clone(),
            _ => Vec::new(),
        };
        maybe_append_scenario_log(&ScenarioLogEntry {
            suite: SUITE_NAME,
            scenario: scenario.as_str(),
            component: self.components.scenario_name().to_string(),
            descriptor: scenario.descriptor(),
            seed: self.config.seed,
            jit_disabled: self.config.disable_jit,
            timestep_seconds: record.timestep_seconds,
            cache_files: cache_files.iter().map(|p| p.display().to_string()).collect(),
            unchecked_variables: record
                .unchecked
                .iter()
                .map(|skip| format!("{}[{}]:{}", skip.variable, skip.output_index, skip.dtype))
                .collect(),
            outcome,
            reason_code,
            detail,
        })
        .map_err(ScenarioError::Log)?;

        result.map(|status| ScenarioRun {
            scenario,
            status,
            cache_files,
            unchecked: record.unchecked,
        })
    }

    /// Runs every scenario; skipped scenarios count as passes.
    pub fn run_all(&self) -> Result<SuiteReport, String> {
        let mut report = SuiteReport::new(SUITE_NAME);
        for scenario in Scenario::ALL {
            match self.run(scenario) {
                Ok(_) => record_suite_check(&mut report, true, String::new()),
                Err(ScenarioError::Log(msg)) => return Err(msg),
                Err(err) => record_suite_check(
                    &mut report,
                    false,
                    format!(
                        "{}::{}: {err}",
                        self.components.scenario_name(),
                        scenario.as_str()
                    ),
                ),
            }
        }
        Ok(report)
    }

    fn execute(
        &self,
        scenario: Scenario,
        record: &mut CallRecord,
    ) -> Result<RunStatus, ScenarioError> {
        let mut component = self.components.build();
        if scenario.is_stepping() {
            if !component.capability().produces_tendencies() {
                return Ok(RunStatus::Skipped("component does not produce tendencies"));
            }
            component = self.integrator.wrap(component)?;
        }

        let grid = if scenario.is_column() {
            self.config.column_grid
        } else {
            self.config.volume_grid
        };
        let mut state = self.states.default_state(&*component, grid)?;
        if let Some(permutation) = scenario.permutation() {
            state = permute_spatial(&state, permutation)?;
        }

        let mut ctx = InvocationContext::new(self.config.seed, self.config.disable_jit);
        let output = invoke(&mut *component, &state, self.config.timestep, &mut ctx)?;
        record.timestep_seconds = ctx.ledger().last().and_then(|event| event.timestep_seconds);

        let validity = check_no_nans(&output)?;
        record.unchecked = validity.skipped;

        match scenario.descriptor() {
            Some(descriptor) => {
                record.cache_files =
                    self.compare_or_cache(&output, descriptor, scenario.writes_on_miss())?;
                Ok(RunStatus::Passed)
            }
            None => Ok(RunStatus::Passed),
        }
    }

    /// Compares against the cache and returns the files compared with. On a
    /// miss the output is saved first when `write_on_miss` is set.
    fn compare_or_cache(
        &self,
        output: &OutputBundle,
        descriptor: &str,
        write_on_miss: bool,
    ) -> Result<Vec<PathBuf>, ScenarioError> {
        let name = self.components.scenario_name();
        match self.store.load(name, descriptor)? {
            Some(cached) => {
                compare_outputs(output, &cached, self.config.tolerance)?;
                Ok(self.store.discover(name, descriptor)?)
            }
            None => {
                let written = if write_on_miss {
                    self.store.save(output, name, descriptor)?
                } else {
                    Vec::new()
                };
                Err(ScenarioError::MissingCache {
                    scenario: name.to_string(),
                    descriptor: descriptor.to_string(),
                    written,
                })
            }
        }
    }
}

fn maybe_append_scenario_log(entry: &ScenarioLogEntry) -> Result<(), String> {
    let configured = SCENARIO_LOG_PATH
        .get()
        .and_then(|cell| cell.lock().ok())
        .and_then(|slot| slot.clone());
    let from_env = std::env::var_os(SCENARIO_LOG_ENV).map(PathBuf::from);
    let Some(path) = configured.or(from_env) else {
        return Ok(());
    };
    append_jsonl(&path, entry)
}

fn append_jsonl(path: &Path, entry: &ScenarioLogEntry) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed creating {}: {err}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| format!("failed opening {}: {err}", path.display()))?;
    let line = serde_json::to_string(entry)
        .map_err(|err| format!("failed serializing scenario log entry: {err}"))?;
    let mut payload = line.into_bytes();
    payload.push(b'\n');
    file.write_all(&payload)
        .map_err(|err| format!("failed appending scenario log {}: {err}", path.display()))
}
