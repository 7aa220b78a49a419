#![forbid(unsafe_code)]

use crate::scenarios::ScenarioError;
use gdh_state::{OutputBundle, StateValue, TIME_KEY};

/// A variable whose payload has no notion of NaN and was therefore not checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedCheck {
    pub output_index: usize,
    pub variable: String,
    pub dtype: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidityReport {
    pub checked: usize,
    pub skipped: Vec<SkippedCheck>,
}

/// Fails on the first NaN in any numeric output variable. Timestamps are
/// ignored and text payloads are recorded as skipped instead of failing.
pub fn check_no_nans(output: &OutputBundle) -> Result<ValidityReport, ScenarioError> {
    let mut report = ValidityReport::default();
    for (output_index, state) in output.states().iter().enumerate() {
        for (name, value) in state.iter() {
            let StateValue::Array(array) = value else {
                continue;
            };
            if name == TIME_KEY {
                continue;
            }
            match array.data().nan_count() {
                Some(0) => report.checked += 1,
                Some(_) => {
                    return Err(ScenarioError::NanProduced {
                        variable: name.to_string(),
                        output_index,
                    });
                }
                None => report.skipped.push(SkippedCheck {
                    output_index,
                    variable: name.to_string(),
                    dtype: array.data().dtype_name(),
                }),
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::check_no_nans;
    use crate::scenarios::ScenarioError;
    use gdh_state::{ArrayData, LabeledArray, OutputBundle, PhysicalState, Timestamp};

    fn state_with(values: Vec<f64>) -> PhysicalState {
        let mut state = PhysicalState::new();
        state.insert("time", Timestamp::parse("2020-01-01T00:00:00").expect("time"));
        state.insert(
            "eastward_wind",
            LabeledArray::from_f64(&["mid_levels"], &[values.len()], values).expect("wind"),
        );
        state
    }

    #[test]
    fn clean_output_passes() {
        let output = OutputBundle::Tuple(vec![state_with(vec![1.0, 2.0]), state_with(vec![0.0])]);
        let report = check_no_nans(&output).expect("no nan");
        assert_eq!(report.checked, 2);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn nan_reports_variable_and_output_index() {
        let output = OutputBundle::Tuple(vec![
            state_with(vec![1.0]),
            state_with(vec![1.0, f64::NAN]),
        ]);
        let err = check_no_nans(&output).expect_err("nan");
        assert_eq!(
            err,
            ScenarioError::NanProduced {
                variable: "eastward_wind".to_string(),
                output_index: 1,
            }
        );
        assert_eq!(err.reason_code(), "scenario_nan_produced");
    }

    #[test]
    fn text_payloads_are_skipped_not_failed() {
        let mut state = state_with(vec![1.0]);
        state.insert(
            "cloud_scheme",
            LabeledArray::new(
                vec!["scheme".to_string()],
                vec![1],
                ArrayData::Text(vec!["none".to_string()]),
            )
            .expect("text"),
        );
        let report = check_no_nans(&OutputBundle::Single(state)).expect("text is skipped");
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].variable, "cloud_scheme");
        assert_eq!(report.skipped[0].dtype, "str");
    }
}
