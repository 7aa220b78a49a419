#![forbid(unsafe_code)]

pub mod comparison;
pub mod reference;
pub mod scenarios;
pub mod validity;

use comparison::Tolerance;
use gdh_runtime::{DEFAULT_SEED, DEFAULT_TIMESTEP};
use gdh_state::GridSpec;
use std::path::PathBuf;
use std::time::Duration;

pub use comparison::{ComparisonError, compare_outputs};
pub use scenarios::{Scenario, ScenarioError, ScenarioHarness, set_scenario_log_path};

pub const CACHE_ROOT_ENV: &str = "GDH_CACHE_ROOT";
pub const DISABLE_JIT_ENV: &str = "GDH_DISABLE_JIT";

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub cache_root: PathBuf,
    pub column_grid: GridSpec,
    pub volume_grid: GridSpec,
    pub timestep: Duration,
    pub seed: u64,
    pub tolerance: Tolerance,
    pub disable_jit: bool,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        Self {
            cache_root: PathBuf::from(env!("CARGO_MANIFEST_DIR"))
                .join("fixtures/cached_component_output"),
            column_grid: GridSpec::column(30),
            volume_grid: GridSpec::volume(32, 16, 28),
            timestep: DEFAULT_TIMESTEP,
            seed: DEFAULT_SEED,
            tolerance: Tolerance::default(),
            disable_jit: true,
        }
    }

    /// Defaults with `GDH_CACHE_ROOT` and `GDH_DISABLE_JIT` applied.
    pub fn from_env() -> Result<Self, String> {
        Self::default_paths().with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        if let Some(root) = lookup(CACHE_ROOT_ENV).filter(|raw| !raw.trim().is_empty()) {
            self.cache_root = PathBuf::from(root.trim());
        }
        if let Some(raw) = lookup(DISABLE_JIT_ENV) {
            self.disable_jit = parse_toggle(&raw).ok_or_else(|| {
                format!("{DISABLE_JIT_ENV} must be one of 1/0/true/false/on/off, got {raw:?}")
            })?;
        }
        Ok(self)
    }

    #[must_use]
    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = root.into();
        self
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

fn parse_toggle(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteReport {
    pub suite: &'static str,
    pub case_count: usize,
    pub pass_count: usize,
    pub failures: Vec<String>,
}

impl SuiteReport {
    #[must_use]
    pub fn new(suite: &'static str) -> Self {
        Self {
            suite,
            case_count: 0,
            pass_count: 0,
            failures: Vec::new(),
        }
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.case_count == self.pass_count && self.failures.is_empty()
    }
}

pub(crate) fn record_suite_check(report: &mut SuiteReport, passed: bool, failure: String) {
    report.case_count += 1;
    if passed {
        report.pass_count += 1;
    } else {
        report.failures.push(failure);
    }
}
