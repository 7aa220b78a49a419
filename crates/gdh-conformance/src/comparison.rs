#![forbid(unsafe_code)]

use gdh_state::{ArrayData, LabeledArray, OutputBundle, PhysicalState, StateValue, TIME_KEY};

/// Closeness threshold on `current - cached`.
pub const DEFAULT_ABSOLUTE_TOLERANCE: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub absolute: f64,
}

impl Tolerance {
    #[must_use]
    pub const fn absolute(absolute: f64) -> Self {
        Self { absolute }
    }

    #[must_use]
    pub fn accepts(self, current: f64, cached: f64) -> bool {
        current == cached || (current - cached).abs() <= self.absolute
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::absolute(DEFAULT_ABSOLUTE_TOLERANCE)
    }
}

/// Why a single variable failed to match its cached counterpart.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableMismatch {
    MissingFromCached,
    MissingFromCurrent,
    KindMismatch {
        current: &'static str,
        cached: &'static str,
    },
    DimensionMismatch {
        current: Vec<String>,
        cached: Vec<String>,
    },
    ShapeMismatch {
        current: Vec<usize>,
        cached: Vec<usize>,
    },
    DtypeMismatch {
        current: &'static str,
        cached: &'static str,
    },
    ValuesDiffer {
        mismatched: usize,
        first_index: usize,
        max_abs_diff: f64,
        tolerance: f64,
    },
    TextDiffers {
        first_index: usize,
    },
    AttributeDiffers(String),
    AttributeMissingFromCurrent(String),
}

impl VariableMismatch {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::MissingFromCached => "compare_missing_from_cached",
            Self::MissingFromCurrent => "compare_missing_from_current",
            Self::KindMismatch { .. } => "compare_kind_mismatch",
            Self::DimensionMismatch { .. } => "compare_dimension_mismatch",
            Self::ShapeMismatch { .. } => "compare_shape_mismatch",
            Self::DtypeMismatch { .. } => "compare_dtype_mismatch",
            Self::ValuesDiffer { .. } | Self::TextDiffers { .. } => "compare_values_differ",
            Self::AttributeDiffers(_) | Self::AttributeMissingFromCurrent(_) => {
                "compare_attribute_mismatch"
            }
        }
    }
}

impl std::fmt::Display for VariableMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingFromCached => write!(f, "present in current output but not in cache"),
            Self::MissingFromCurrent => write!(f, "present in cache but not in current output"),
            Self::KindMismatch { current, cached } => {
                write!(f, "current holds a {current}, cache holds a {cached}")
            }
            Self::DimensionMismatch { current, cached } => {
                write!(f, "dimensions {current:?} do not match cached {cached:?}")
            }
            Self::ShapeMismatch { current, cached } => {
                write!(f, "shape {current:?} does not match cached {cached:?}")
            }
            Self::DtypeMismatch { current, cached } => {
                write!(f, "dtype {current} does not match cached {cached}")
            }
            Self::ValuesDiffer {
                mismatched,
                first_index,
                max_abs_diff,
                tolerance,
            } => write!(
                f,
                "{mismatched} values differ beyond {tolerance:e} (first at flat index {first_index}, max |diff| {max_abs_diff:e})"
            ),
            Self::TextDiffers { first_index } => {
                write!(f, "text values differ (first at flat index {first_index})")
            }
            Self::AttributeDiffers(attr) => write!(f, "attribute {attr} differs from cache"),
            Self::AttributeMissingFromCurrent(attr) => {
                write!(f, "cached attribute {attr} is missing from current output")
            }
        }
    }
}

impl std::error::Error for VariableMismatch {}

#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonError {
    ShapeMismatch { current: usize, cached: usize },
    Variable {
        output_index: usize,
        name: String,
        cause: VariableMismatch,
    },
}

impl ComparisonError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::ShapeMismatch { .. } => "compare_output_count_mismatch",
            Self::Variable { cause, .. } => cause.reason_code(),
        }
    }

    /// Name of the offending variable, if the failure is per-variable.
    #[must_use]
    pub fn variable(&self) -> Option<&str> {
        match self {
            Self::ShapeMismatch { .. } => None,
            Self::Variable { name, .. } => Some(name),
        }
    }
}

impl std::fmt::Display for ComparisonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShapeMismatch { current, cached } => write!(
                f,
                "different number of outputs returned than cached (current={current}, cached={cached})"
            ),
            Self::Variable { name, cause, .. } => write!(f, "Error for {name}: {cause}"),
        }
    }
}

impl std::error::Error for ComparisonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ShapeMismatch { .. } => None,
            Self::Variable { cause, .. } => Some(cause),
        }
    }
}

/// Compares a fresh bundle against a cached one. A single state never matches
/// a tuple, and tuples must agree in length.
pub fn compare_outputs(
    current: &OutputBundle,
    cached: &OutputBundle,
    tolerance: Tolerance,
) -> Result<(), ComparisonError> {
    if current.is_tuple() != cached.is_tuple() || current.arity() != cached.arity() {
        return Err(ComparisonError::ShapeMismatch {
            current: current.arity(),
            cached: cached.arity(),
        });
    }
    for (output_index, (now, then)) in current.states().iter().zip(cached.states()).enumerate() {
        compare_state_pair(now, then, tolerance).map_err(|(name, cause)| {
            ComparisonError::Variable {
                output_index,
                name,
                cause,
            }
        })?;
    }
    Ok(())
}

fn compare_state_pair(
    current: &PhysicalState,
    cached: &PhysicalState,
    tolerance: Tolerance,
) -> Result<(), (String, VariableMismatch)> {
    for (name, value) in current.iter() {
        let fail = |cause| (name.to_string(), cause);
        let Some(cached_value) = cached.get(name) else {
            return Err(fail(VariableMismatch::MissingFromCached));
        };
        // only presence matters for the timestamp
        if name == TIME_KEY {
            continue;
        }
        match (value, cached_value) {
            (StateValue::Time(now), StateValue::Time(then)) => {
                if now != then {
                    return Err(fail(VariableMismatch::TextDiffers { first_index: 0 }));
                }
            }
            (StateValue::Array(now), StateValue::Array(then)) => {
                compare_arrays(now, then, tolerance).map_err(fail)?;
            }
            (now, then) => {
                return Err(fail(VariableMismatch::KindMismatch {
                    current: value_kind(now),
                    cached: value_kind(then),
                }));
            }
        }
    }
    if let Some(name) = cached.keys().find(|name| !current.contains_key(name)) {
        return Err((name.to_string(), VariableMismatch::MissingFromCurrent));
    }
    Ok(())
}

fn value_kind(value: &StateValue) -> &'static str {
    match value {
        StateValue::Time(_) => "timestamp",
        StateValue::Array(_) => "array",
    }
}

fn compare_arrays(
    current: &LabeledArray,
    cached: &LabeledArray,
    tolerance: Tolerance,
) -> Result<(), VariableMismatch> {
    if current.dim_set() != cached.dim_set() {
        return Err(VariableMismatch::DimensionMismatch {
            current: current.dims().to_vec(),
            cached: cached.dims().to_vec(),
        });
    }
    let aligned = cached
        .aligned_to(current.dims())
        .map_err(|_| VariableMismatch::DimensionMismatch {
            current: current.dims().to_vec(),
            cached: cached.dims().to_vec(),
        })?;
    if aligned.shape() != current.shape() {
        return Err(VariableMismatch::ShapeMismatch {
            current: current.shape().to_vec(),
            cached: aligned.shape().to_vec(),
        });
    }

    compare_payloads(current.data(), aligned.data(), tolerance)?;

    for (attr, value) in current.attrs() {
        if !aligned.attrs().get(attr).is_some_and(|cached| value.same_as(cached)) {
            return Err(VariableMismatch::AttributeDiffers(attr.clone()));
        }
    }
    if let Some(attr) = aligned
        .attrs()
        .keys()
        .find(|attr| !current.attrs().contains_key(*attr))
    {
        return Err(VariableMismatch::AttributeMissingFromCurrent(attr.clone()));
    }
    Ok(())
}

fn compare_payloads(
    current: &ArrayData,
    cached: &ArrayData,
    tolerance: Tolerance,
) -> Result<(), VariableMismatch> {
    if let (ArrayData::Text(now), ArrayData::Text(then)) = (current, cached) {
        return match now.iter().zip(then).position(|(a, b)| a != b) {
            Some(first_index) => Err(VariableMismatch::TextDiffers { first_index }),
            None => Ok(()),
        };
    }
    // exact, without widening past 2^53
    if let (ArrayData::Int64(now), ArrayData::Int64(then)) = (current, cached) {
        let differing: Vec<(usize, u64)> = now
            .iter()
            .zip(then)
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(i, (&a, &b))| (i, a.abs_diff(b)))
            .collect();
        return match differing.first() {
            None => Ok(()),
            Some(&(first_index, _)) => Err(VariableMismatch::ValuesDiffer {
                mismatched: differing.len(),
                first_index,
                max_abs_diff: differing.iter().map(|&(_, d)| d as f64).fold(0.0, f64::max),
                tolerance: 0.0,
            }),
        };
    }
    let (Some(now), Some(then)) = (current.to_f64(), cached.to_f64()) else {
        return Err(VariableMismatch::DtypeMismatch {
            current: current.dtype_name(),
            cached: cached.dtype_name(),
        });
    };
    if now == then {
        return Ok(());
    }

    let mut mismatched = 0usize;
    let mut first_index = None;
    let mut max_abs_diff = 0.0f64;
    for (i, (&a, &b)) in now.iter().zip(&then).enumerate() {
        if !tolerance.accepts(a, b) {
            mismatched += 1;
            first_index.get_or_insert(i);
            let diff = (a - b).abs();
            if diff.is_nan() || diff > max_abs_diff {
                max_abs_diff = diff;
            }
        }
    }
    match first_index {
        None => Ok(()),
        Some(first_index) => Err(VariableMismatch::ValuesDiffer {
            mismatched,
            first_index,
            max_abs_diff,
            tolerance: tolerance.absolute,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{ComparisonError, Tolerance, VariableMismatch, compare_outputs};
    use gdh_state::{ArrayData, LabeledArray, OutputBundle, PhysicalState, Timestamp};
    use std::error::Error as _;

    fn column_state(values: Vec<f64>) -> PhysicalState {
        let mut state = PhysicalState::new();
        state.insert("time", Timestamp::parse("2020-01-01T00:00:00").expect("time"));
        state.insert(
            "air_temperature",
            LabeledArray::from_f64(&["mid_levels"], &[values.len()], values)
                .expect("temperature")
                .with_attr("units", "degK"),
        );
        state
    }

    fn profile() -> Vec<f64> {
        (0..30u8).map(|k| 290.0 - 2.0 * f64::from(k)).collect()
    }

    #[test]
    fn equal_within_tolerance_passes() {
        let cached = OutputBundle::Single(column_state(profile()));
        let mut nudged = profile();
        nudged[7] += 5e-9;
        let current = OutputBundle::Single(column_state(nudged));
        compare_outputs(&current, &cached, Tolerance::default()).expect("within tolerance");
    }

    #[test]
    fn altered_element_names_the_variable() {
        let cached = OutputBundle::Single(column_state(profile()));
        let mut altered = profile();
        altered[12] += 1e-3;
        let current = OutputBundle::Single(column_state(altered));
        let err = compare_outputs(&current, &cached, Tolerance::default()).expect_err("differs");
        assert_eq!(err.variable(), Some("air_temperature"));
        assert!(err.to_string().starts_with("Error for air_temperature"));
        assert_eq!(err.reason_code(), "compare_values_differ");
        let ComparisonError::Variable { cause, .. } = &err else {
            panic!("expected per-variable failure");
        };
        assert!(matches!(
            cause,
            VariableMismatch::ValuesDiffer {
                mismatched: 1,
                first_index: 12,
                ..
            }
        ));
        assert!(err.source().is_some());
    }

    #[test]
    fn nan_never_matches() {
        let mut with_nan = profile();
        with_nan[0] = f64::NAN;
        let bundle = OutputBundle::Single(column_state(with_nan));
        let err = compare_outputs(&bundle, &bundle.clone(), Tolerance::default())
            .expect_err("nan differs from itself");
        assert_eq!(err.reason_code(), "compare_values_differ");
    }

    #[test]
    fn dimension_order_is_irrelevant() {
        let values: Vec<f64> = (0..6u8).map(f64::from).collect();
        let array = LabeledArray::from_f64(&["lat", "lon"], &[2, 3], values).expect("array");
        let mut current = PhysicalState::new();
        current.insert("surface_air_pressure", array.clone());
        let mut cached = PhysicalState::new();
        cached.insert("surface_air_pressure", array.reversed());
        compare_outputs(
            &OutputBundle::Single(current),
            &OutputBundle::Single(cached),
            Tolerance::default(),
        )
        .expect("same labeled values");
    }

    #[test]
    fn missing_keys_fail_both_ways() {
        let full = column_state(profile());
        let mut partial = full.clone();
        partial.remove("air_temperature");

        let err = compare_outputs(
            &OutputBundle::Single(full.clone()),
            &OutputBundle::Single(partial.clone()),
            Tolerance::default(),
        )
        .expect_err("cache lacks variable");
        assert_eq!(err.reason_code(), "compare_missing_from_cached");

        let err = compare_outputs(
            &OutputBundle::Single(partial),
            &OutputBundle::Single(full),
            Tolerance::default(),
        )
        .expect_err("current lacks variable");
        assert_eq!(err.reason_code(), "compare_missing_from_current");
    }

    #[test]
    fn attributes_are_checked_in_both_directions() {
        let cached = column_state(profile());
        let mut current = cached.clone();
        if let Some(array) = current.array_mut("air_temperature") {
            array.attrs_mut().insert("units".to_string(), "K".into());
        }
        let err = compare_outputs(
            &OutputBundle::Single(current),
            &OutputBundle::Single(cached.clone()),
            Tolerance::default(),
        )
        .expect_err("units differ");
        assert_eq!(err.reason_code(), "compare_attribute_mismatch");

        let mut stripped = cached.clone();
        if let Some(array) = stripped.array_mut("air_temperature") {
            array.attrs_mut().clear();
        }
        let err = compare_outputs(
            &OutputBundle::Single(stripped),
            &OutputBundle::Single(cached),
            Tolerance::default(),
        )
        .expect_err("cached attr missing");
        assert!(matches!(
            err,
            ComparisonError::Variable {
                cause: VariableMismatch::AttributeMissingFromCurrent(_),
                ..
            }
        ));
    }

    #[test]
    fn single_vs_tuple_is_a_shape_mismatch() {
        let state = column_state(profile());
        let single = OutputBundle::Single(state.clone());
        let pair = OutputBundle::Tuple(vec![state.clone(), state]);
        let err = compare_outputs(&single, &pair, Tolerance::default()).expect_err("arity");
        assert!(matches!(
            err,
            ComparisonError::ShapeMismatch {
                current: 1,
                cached: 2
            }
        ));
        assert!(err.to_string().contains("different number of outputs"));
    }

    #[test]
    fn time_of_any_kind_only_needs_to_be_present() {
        let cached = OutputBundle::Single(column_state(profile()));
        let mut state = column_state(profile());
        state.insert(
            "time",
            LabeledArray::from_f64(&[] as &[&str], &[], vec![0.0]).expect("scalar"),
        );
        compare_outputs(&OutputBundle::Single(state), &cached, Tolerance::default())
            .expect("time kind is not compared");

        let mut without_time = column_state(profile());
        without_time.remove("time");
        let err = compare_outputs(&OutputBundle::Single(without_time), &cached, Tolerance::default())
            .expect_err("time must be present");
        assert_eq!(err.variable(), Some("time"));
    }

    #[test]
    fn large_integers_compare_without_widening() {
        let ints = |last: i64| {
            let mut state = PhysicalState::new();
            state.insert(
                "step_count",
                LabeledArray::new(
                    vec!["x".to_string()],
                    vec![2],
                    ArrayData::Int64(vec![1, last]),
                )
                .expect("ints"),
            );
            OutputBundle::Single(state)
        };
        let base = 1_i64 << 53;
        compare_outputs(&ints(base), &ints(base), Tolerance::default()).expect("equal");
        let err = compare_outputs(&ints(base + 1), &ints(base), Tolerance::default())
            .expect_err("differs by one above 2^53");
        let ComparisonError::Variable { cause, .. } = &err else {
            panic!("expected per-variable failure");
        };
        assert!(matches!(
            cause,
            VariableMismatch::ValuesDiffer {
                mismatched: 1,
                first_index: 1,
                ..
            }
        ));
    }

    #[test]
    fn non_finite_attributes_match_themselves() {
        let with_attrs = || {
            let mut state = column_state(profile());
            let t = state.array("air_temperature").expect("t").clone();
            state.insert(
                "air_temperature",
                t.with_attr("valid_max", f64::INFINITY)
                    .with_attr("fill", f64::NAN)
                    .with_attr("range", vec![f64::NEG_INFINITY, 0.0]),
            );
            OutputBundle::Single(state)
        };
        compare_outputs(&with_attrs(), &with_attrs(), Tolerance::default())
            .expect("inf and nan attributes compare equal");
    }
}
