#![forbid(unsafe_code)]

use gdh_conformance::reference::{NewtonianCooling, ReferenceDycore};
use gdh_conformance::scenarios::{ComponentFn, ScenarioHarness, set_scenario_log_path};
use gdh_conformance::{HarnessConfig, SuiteReport};
use gdh_runtime::Component;
use serde::Serialize;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

const USAGE: &str = "Usage: cargo run -p gdh-conformance --bin run_scenario_gate -- \
[--cache-root <dir>] [--log-path <path>] [--component <name>]...";

type BuildFn = fn() -> Box<dyn Component>;

/// Components the gate knows how to build, by scenario name.
const REFERENCE_COMPONENTS: [(&str, BuildFn); 2] = [
    ("ReferenceDycore", build_dycore),
    ("NewtonianCooling", build_cooling),
];

fn build_dycore() -> Box<dyn Component> {
    Box::new(ReferenceDycore::new())
}

fn build_cooling() -> Box<dyn Component> {
    Box::new(NewtonianCooling::default())
}

#[derive(Debug, Default, PartialEq)]
struct GateOptions {
    cache_root: Option<PathBuf>,
    log_path: Option<PathBuf>,
    components: Vec<String>,
}

impl GateOptions {
    /// `Ok(None)` means usage was requested.
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Option<Self>, String> {
        let mut options = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value_for = |flag: &str| {
                args.next()
                    .map(PathBuf::from)
                    .ok_or_else(|| format!("{flag} requires a value"))
            };
            match arg.as_str() {
                "--cache-root" => options.cache_root = Some(value_for("--cache-root")?),
                "--log-path" => options.log_path = Some(value_for("--log-path")?),
                "--component" => {
                    let name = value_for("--component")?.display().to_string();
                    if !REFERENCE_COMPONENTS.iter().any(|(known, _)| *known == name) {
                        return Err(format!("unknown component: {name}"));
                    }
                    options.components.push(name);
                }
                "--help" | "-h" => return Ok(None),
                unknown => return Err(format!("unknown argument: {unknown}")),
            }
        }
        Ok(Some(options))
    }

    fn selected(&self) -> impl Iterator<Item = (&'static str, BuildFn)> + '_ {
        REFERENCE_COMPONENTS
            .into_iter()
            .filter(|(name, _)| {
                self.components.is_empty() || self.components.iter().any(|c| c.as_str() == *name)
            })
    }
}

#[derive(Debug, Serialize)]
struct SuiteSummary {
    component: &'static str,
    case_count: usize,
    pass_count: usize,
    failures: Vec<String>,
}

impl SuiteSummary {
    fn new(component: &'static str, report: SuiteReport) -> Self {
        Self {
            component,
            case_count: report.case_count,
            pass_count: report.pass_count,
            failures: report.failures,
        }
    }
}

#[derive(Debug, Serialize)]
struct GateSummary {
    status: &'static str,
    cache_root: String,
    scenario_log: String,
    jit_disabled: bool,
    suites: Vec<SuiteSummary>,
}

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(err) => {
            eprintln!("run_scenario_gate failed: {err}");
            std::process::exit(1);
        }
    }
}

/// Returns whether every selected suite passed.
fn run() -> Result<bool, String> {
    let Some(options) = GateOptions::parse(std::env::args().skip(1))? else {
        println!("{USAGE}");
        return Ok(true);
    };

    let log_path = options.log_path.clone().unwrap_or_else(|| {
        let ts_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| duration.as_millis());
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../artifacts/logs")
            .join(format!("component_scenarios_{ts_millis}.jsonl"))
    });
    set_scenario_log_path(Some(log_path.clone()));

    let mut cfg = HarnessConfig::from_env()?;
    if let Some(root) = options.cache_root.clone() {
        cfg = cfg.with_cache_root(root);
    }

    let mut suites = Vec::new();
    for (name, build) in options.selected() {
        let harness = ScenarioHarness::new(ComponentFn::new(name, build), cfg.clone());
        suites.push(SuiteSummary::new(name, harness.run_all()?));
    }

    let passed = suites.iter().all(|suite| suite.failures.is_empty());
    let summary = GateSummary {
        status: if passed { "pass" } else { "fail" },
        cache_root: cfg.cache_root.display().to_string(),
        scenario_log: log_path.display().to_string(),
        jit_disabled: cfg.disable_jit,
        suites,
    };
    let summary_json = serde_json::to_string_pretty(&summary)
        .map_err(|err| format!("failed serializing summary: {err}"))?;
    println!("{summary_json}");
    Ok(passed)
}

#[cfg(test)]
mod tests {
    use super::GateOptions;
    use std::path::PathBuf;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn no_arguments_select_every_component() {
        let options = GateOptions::parse(args(&[])).expect("parse").expect("options");
        assert_eq!(options, GateOptions::default());
        let names: Vec<_> = options.selected().map(|(name, _)| name).collect();
        assert_eq!(names, ["ReferenceDycore", "NewtonianCooling"]);
    }

    #[test]
    fn flags_fill_options_and_filter_components() {
        let options = GateOptions::parse(args(&[
            "--cache-root",
            "/tmp/cache",
            "--component",
            "NewtonianCooling",
            "--log-path",
            "/tmp/log.jsonl",
        ]))
        .expect("parse")
        .expect("options");
        assert_eq!(options.cache_root, Some(PathBuf::from("/tmp/cache")));
        assert_eq!(options.log_path, Some(PathBuf::from("/tmp/log.jsonl")));
        let names: Vec<_> = options.selected().map(|(name, _)| name).collect();
        assert_eq!(names, ["NewtonianCooling"]);
    }

    #[test]
    fn bad_arguments_are_reported() {
        assert_eq!(GateOptions::parse(args(&["--help"])), Ok(None));
        assert_eq!(
            GateOptions::parse(args(&["--cache-root"])),
            Err("--cache-root requires a value".to_string())
        );
        assert_eq!(
            GateOptions::parse(args(&["--component", "Missing"])),
            Err("unknown component: Missing".to_string())
        );
        assert_eq!(
            GateOptions::parse(args(&["--verbose"])),
            Err("unknown argument: --verbose".to_string())
        );
    }
}
