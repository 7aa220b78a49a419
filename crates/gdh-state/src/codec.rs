#![forbid(unsafe_code)]

//! Layout transforms over whole physical states. Timestamps pass through untouched.

use crate::{PhysicalState, StateError, StateValue, is_vertical_dim};

/// Collapses every array to a single column: each non-vertical axis is fixed at
/// index 0 and vertical axes keep their full extent.
pub fn reduce_to_column(state: &PhysicalState) -> Result<PhysicalState, StateError> {
    state
        .iter()
        .map(|(name, value)| {
            let reduced = match value {
                StateValue::Time(_) => value.clone(),
                StateValue::Array(array) => StateValue::Array(
                    array
                        .select_fixed(is_vertical_dim, 0)
                        .map_err(|err| err.for_variable(name))?,
                ),
            };
            Ok((name.to_string(), reduced))
        })
        .collect()
}

/// Permutes every array to `order`, or reverses its dims when no order is given.
pub fn transpose(state: &PhysicalState, order: Option<&[&str]>) -> Result<PhysicalState, StateError> {
    state
        .iter()
        .map(|(name, value)| {
            let permuted = match (value, order) {
                (StateValue::Time(_), _) => value.clone(),
                (StateValue::Array(array), None) => StateValue::Array(array.reversed()),
                (StateValue::Array(array), Some(order)) => StateValue::Array(
                    array
                        .transposed(order)
                        .map_err(|err| err.for_variable(name))?,
                ),
            };
            Ok((name.to_string(), permuted))
        })
        .collect()
}

/// The two fixed non-identity layouts used to probe order invariance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permutation {
    /// `(a, b, c) -> (c, b, a)`, `(a, b) -> (b, a)`
    Reversed,
    /// `(a, b, c) -> (c, a, b)`, `(a, b) -> (b, a)`
    Rotated,
}

impl Permutation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reversed => "reversed",
            Self::Rotated => "rotated",
        }
    }

    /// Axis indices for an array of `rank`, or `None` when the rank is left alone.
    #[must_use]
    pub const fn axes(self, rank: usize) -> Option<&'static [usize]> {
        match (self, rank) {
            (Self::Reversed, 3) => Some(&[2, 1, 0]),
            (Self::Rotated, 3) => Some(&[2, 0, 1]),
            (_, 2) => Some(&[1, 0]),
            _ => None,
        }
    }
}

/// Applies `permutation` to every rank-2 and rank-3 array.
pub fn permute_spatial(
    state: &PhysicalState,
    permutation: Permutation,
) -> Result<PhysicalState, StateError> {
    state
        .iter()
        .map(|(name, value)| {
            let permuted = match value {
                StateValue::Array(array) => match permutation.axes(array.ndim()) {
                    Some(axes) => {
                        let order: Vec<&str> =
                            axes.iter().map(|&axis| array.dims()[axis].as_str()).collect();
                        StateValue::Array(
                            array
                                .transposed(&order)
                                .map_err(|err| err.for_variable(name))?,
                        )
                    }
                    None => value.clone(),
                },
                StateValue::Time(_) => value.clone(),
            };
            Ok((name.to_string(), permuted))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{Permutation, permute_spatial, reduce_to_column, transpose};
    use crate::{LabeledArray, PhysicalState, StateValue, Timestamp};

    fn volume_state() -> PhysicalState {
        let mut state = PhysicalState::new();
        state.insert(
            "time",
            Timestamp::parse("2020-01-01T00:00:00").expect("timestamp"),
        );
        state.insert(
            "air_temperature",
            LabeledArray::from_f64(
                &["lon", "lat", "mid_levels"],
                &[2, 3, 4],
                (0..24u8).map(f64::from).collect(),
            )
            .expect("temperature")
            .with_attr("units", "K"),
        );
        state.insert(
            "surface_air_pressure",
            LabeledArray::from_f64(&["lon", "lat"], &[2, 3], vec![1e5; 6]).expect("ps"),
        );
        state
    }

    #[test]
    fn column_reduction_keeps_only_vertical_axes() {
        let column = reduce_to_column(&volume_state()).expect("reduce");
        let t = column.array("air_temperature").expect("temperature");
        assert_eq!(t.dims(), ["mid_levels"]);
        assert_eq!(t.values_f64().expect("floats"), [0.0, 1.0, 2.0, 3.0]);
        assert_eq!(t.attrs().len(), 1);

        let ps = column.array("surface_air_pressure").expect("ps");
        assert_eq!(ps.ndim(), 0);
        assert_eq!(ps.len(), 1);

        assert!(matches!(column.get("time"), Some(StateValue::Time(_))));
    }

    #[test]
    fn default_transpose_reverses_dims() {
        let t = transpose(&volume_state(), None).expect("transpose");
        assert_eq!(
            t.array("air_temperature").expect("temperature").dims(),
            ["mid_levels", "lat", "lon"]
        );
        assert_eq!(t.time(), volume_state().time());
    }

    #[test]
    fn explicit_order_errors_name_the_variable() {
        let err = transpose(&volume_state(), Some(&["lat", "lon", "mid_levels"]))
            .expect_err("surface pressure has no mid_levels");
        assert!(err.to_string().contains("surface_air_pressure"));
    }

    #[test]
    fn permutations_are_distinct_and_value_preserving() {
        let state = volume_state();
        let reversed = permute_spatial(&state, Permutation::Reversed).expect("reversed");
        let rotated = permute_spatial(&state, Permutation::Rotated).expect("rotated");

        let r = reversed.array("air_temperature").expect("r");
        let o = rotated.array("air_temperature").expect("o");
        assert_eq!(r.dims(), ["mid_levels", "lat", "lon"]);
        assert_eq!(o.dims(), ["mid_levels", "lon", "lat"]);

        let canonical = state.array("air_temperature").expect("t");
        assert_eq!(&o.transposed(canonical.dims()).expect("restore"), canonical);
        assert_eq!(
            reversed.array("surface_air_pressure").expect("ps").dims(),
            ["lat", "lon"]
        );
    }
}
