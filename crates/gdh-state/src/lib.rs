#![forbid(unsafe_code)]

pub mod codec;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub use codec::{Permutation, permute_spatial, reduce_to_column, transpose};

/// Key of the scalar timestamp entry in every physical state.
pub const TIME_KEY: &str = "time";

/// Axis names treated as vertical by column reduction.
pub const VERTICAL_DIMENSION_NAMES: [&str; 3] = ["interface_levels", "mid_levels", "full_levels"];

#[must_use]
pub fn is_vertical_dim(name: &str) -> bool {
    VERTICAL_DIMENSION_NAMES.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    DuplicateDimension(String),
    RankMismatch { dims: usize, shape: usize },
    PayloadLengthMismatch { expected: usize, actual: usize },
    Overflow,
    InvalidPermutation { dims: Vec<String>, order: Vec<String> },
    UnknownDimension(String),
    IndexOutOfBounds { dim: String, index: usize, extent: usize },
    InvalidTimestamp(String),
    Variable { name: String, cause: Box<StateError> },
}

impl StateError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::DuplicateDimension(_) => "state_duplicate_dimension",
            Self::RankMismatch { .. } => "state_rank_mismatch",
            Self::PayloadLengthMismatch { .. } => "state_payload_length_mismatch",
            Self::Overflow => "state_size_overflow",
            Self::InvalidPermutation { .. } => "state_invalid_permutation",
            Self::UnknownDimension(_) => "state_unknown_dimension",
            Self::IndexOutOfBounds { .. } => "state_index_out_of_bounds",
            Self::InvalidTimestamp(_) => "state_invalid_timestamp",
            Self::Variable { cause, .. } => cause.reason_code(),
        }
    }

    pub(crate) fn for_variable(self, name: &str) -> Self {
        Self::Variable {
            name: name.to_string(),
            cause: Box::new(self),
        }
    }
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateDimension(dim) => write!(f, "dimension {dim} appears more than once"),
            Self::RankMismatch { dims, shape } => {
                write!(f, "{dims} dimension names given for a rank-{shape} shape")
            }
            Self::PayloadLengthMismatch { expected, actual } => {
                write!(f, "payload length mismatch expected={expected} actual={actual}")
            }
            Self::Overflow => write!(f, "size arithmetic overflow"),
            Self::InvalidPermutation { dims, order } => {
                write!(f, "{order:?} is not a permutation of {dims:?}")
            }
            Self::UnknownDimension(dim) => write!(f, "unknown dimension {dim}"),
            Self::IndexOutOfBounds { dim, index, extent } => {
                write!(f, "index {index} out of bounds for {dim} with extent {extent}")
            }
            Self::InvalidTimestamp(raw) => {
                write!(f, "timestamp {raw:?} is not of the form YYYY-MM-DDTHH:MM:SS")
            }
            Self::Variable { name, cause } => write!(f, "Error for {name}: {cause}"),
        }
    }
}

impl std::error::Error for StateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Variable { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

pub fn element_count(shape: &[usize]) -> Result<usize, StateError> {
    shape.iter().try_fold(1usize, |acc, &dim| {
        acc.checked_mul(dim).ok_or(StateError::Overflow)
    })
}

/// Row-major strides in elements (not bytes).
pub fn contiguous_strides(shape: &[usize]) -> Result<Vec<usize>, StateError> {
    let mut strides = vec![0usize; shape.len()];
    let mut stride = 1usize;
    for (i, &dim) in shape.iter().enumerate().rev() {
        strides[i] = stride;
        stride = stride.checked_mul(dim).ok_or(StateError::Overflow)?;
    }
    Ok(strides)
}

/// Walks `out_shape` in row-major order and yields `base + sum(idx[k] * src_strides[k])`.
fn gather_offsets(out_shape: &[usize], src_strides: &[usize], base: usize) -> Vec<usize> {
    let count: usize = out_shape.iter().product();
    let mut offsets = Vec::with_capacity(count);
    if count == 0 {
        return offsets;
    }

    let mut multi = vec![0usize; out_shape.len()];
    for _ in 0..count {
        let offset = multi
            .iter()
            .zip(src_strides)
            .fold(base, |acc, (&idx, &stride)| acc + idx * stride);
        offsets.push(offset);

        for axis in (0..multi.len()).rev() {
            multi[axis] += 1;
            if multi[axis] < out_shape[axis] {
                break;
            }
            multi[axis] = 0;
        }
    }
    offsets
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Float64(Vec<f64>),
    Int64(Vec<i64>),
    Text(Vec<String>),
}

impl ArrayData {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Float64(values) => values.len(),
            Self::Int64(values) => values.len(),
            Self::Text(values) => values.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn dtype_name(&self) -> &'static str {
        match self {
            Self::Float64(_) => "f64",
            Self::Int64(_) => "i64",
            Self::Text(_) => "str",
        }
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Text(_))
    }

    /// Numeric payload widened to f64; `None` for text.
    #[must_use]
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            Self::Float64(values) => Some(values.clone()),
            Self::Int64(values) => Some(values.iter().map(|&v| v as f64).collect()),
            Self::Text(_) => None,
        }
    }

    /// Number of NaN elements, or `None` when the payload type has no notion of NaN.
    #[must_use]
    pub fn nan_count(&self) -> Option<usize> {
        match self {
            Self::Float64(values) => Some(values.iter().filter(|v| v.is_nan()).count()),
            Self::Int64(_) => Some(0),
            Self::Text(_) => None,
        }
    }

    fn gather(&self, offsets: &[usize]) -> Self {
        match self {
            Self::Float64(values) => Self::Float64(offsets.iter().map(|&i| values[i]).collect()),
            Self::Int64(values) => Self::Int64(offsets.iter().map(|&i| values[i]).collect()),
            Self::Text(values) => {
                Self::Text(offsets.iter().map(|&i| values[i].clone()).collect())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    Text(String),
    Float(#[serde(with = "float_repr")] f64),
    Int(i64),
    Bool(bool),
    FloatList(#[serde(with = "float_list_repr")] Vec<f64>),
    IntList(Vec<i64>),
}

impl AttrValue {
    /// Equality that treats NaN as equal to NaN, element-wise for lists.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        fn same_float(a: f64, b: f64) -> bool {
            a == b || (a.is_nan() && b.is_nan())
        }
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => same_float(*a, *b),
            (Self::FloatList(a), Self::FloatList(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| same_float(x, y))
            }
            _ => self == other,
        }
    }
}

/// Finite floats persist as JSON numbers; `inf`, `-inf` and `nan` as strings.
struct FloatRepr(f64);

impl Serialize for FloatRepr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = self.0;
        if value.is_finite() {
            serializer.serialize_f64(value)
        } else if value.is_nan() {
            serializer.serialize_str("nan")
        } else if value > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }
}

impl<'de> Deserialize<'de> for FloatRepr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FloatVisitor;

        impl serde::de::Visitor<'_> for FloatVisitor {
            type Value = FloatRepr;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a number or one of \"inf\", \"-inf\", \"nan\"")
            }

            fn visit_f64<E: serde::de::Error>(self, value: f64) -> Result<FloatRepr, E> {
                Ok(FloatRepr(value))
            }

            fn visit_i64<E: serde::de::Error>(self, value: i64) -> Result<FloatRepr, E> {
                Ok(FloatRepr(value as f64))
            }

            fn visit_u64<E: serde::de::Error>(self, value: u64) -> Result<FloatRepr, E> {
                Ok(FloatRepr(value as f64))
            }

            fn visit_str<E: serde::de::Error>(self, value: &str) -> Result<FloatRepr, E> {
                match value {
                    "inf" => Ok(FloatRepr(f64::INFINITY)),
                    "-inf" => Ok(FloatRepr(f64::NEG_INFINITY)),
                    "nan" => Ok(FloatRepr(f64::NAN)),
                    other => Err(E::invalid_value(serde::de::Unexpected::Str(other), &self)),
                }
            }
        }

        deserializer.deserialize_any(FloatVisitor)
    }
}

mod float_repr {
    use super::FloatRepr;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        FloatRepr(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        FloatRepr::deserialize(deserializer).map(|repr| repr.0)
    }
}

mod float_list_repr {
    use super::FloatRepr;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|&value| FloatRepr(value)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let reprs = Vec::<FloatRepr>::deserialize(deserializer)?;
        Ok(reprs.into_iter().map(|repr| repr.0).collect())
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<f64>> for AttrValue {
    fn from(value: Vec<f64>) -> Self {
        Self::FloatList(value)
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(value: Vec<i64>) -> Self {
        Self::IntList(value)
    }
}

/// A named-axis array: payload in row-major order over `shape`.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledArray {
    dims: Vec<String>,
    shape: Vec<usize>,
    data: ArrayData,
    attrs: BTreeMap<String, AttrValue>,
}

impl LabeledArray {
    pub fn new(dims: Vec<String>, shape: Vec<usize>, data: ArrayData) -> Result<Self, StateError> {
        if dims.len() != shape.len() {
            return Err(StateError::RankMismatch {
                dims: dims.len(),
                shape: shape.len(),
            });
        }
        let mut seen = BTreeSet::new();
        for dim in &dims {
            if !seen.insert(dim.as_str()) {
                return Err(StateError::DuplicateDimension(dim.clone()));
            }
        }
        let expected = element_count(&shape)?;
        if data.len() != expected {
            return Err(StateError::PayloadLengthMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            dims,
            shape,
            data,
            attrs: BTreeMap::new(),
        })
    }

    pub fn from_f64(dims: &[&str], shape: &[usize], values: Vec<f64>) -> Result<Self, StateError> {
        Self::new(
            dims.iter().map(ToString::to_string).collect(),
            shape.to_vec(),
            ArrayData::Float64(values),
        )
    }

    #[must_use]
    pub fn with_attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_attrs(mut self, attrs: BTreeMap<String, AttrValue>) -> Self {
        self.attrs = attrs;
        self
    }

    #[must_use]
    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    #[must_use]
    pub fn attrs(&self) -> &BTreeMap<String, AttrValue> {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut BTreeMap<String, AttrValue> {
        &mut self.attrs
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn dim_set(&self) -> BTreeSet<&str> {
        self.dims.iter().map(String::as_str).collect()
    }

    #[must_use]
    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    /// Float payload, if this array holds one.
    #[must_use]
    pub fn values_f64(&self) -> Option<&[f64]> {
        match &self.data {
            ArrayData::Float64(values) => Some(values),
            _ => None,
        }
    }

    /// Replaces a float payload in place, keeping dims and attrs.
    pub fn set_values_f64(&mut self, values: Vec<f64>) -> Result<(), StateError> {
        if values.len() != self.data.len() {
            return Err(StateError::PayloadLengthMismatch {
                expected: self.data.len(),
                actual: values.len(),
            });
        }
        self.data = ArrayData::Float64(values);
        Ok(())
    }

    /// Physically permutes the payload so that dims follow `order`.
    pub fn transposed<S: AsRef<str>>(&self, order: &[S]) -> Result<Self, StateError> {
        let invalid = || StateError::InvalidPermutation {
            dims: self.dims.clone(),
            order: order.iter().map(|d| d.as_ref().to_string()).collect(),
        };
        if order.len() != self.dims.len() {
            return Err(invalid());
        }

        let mut perm = Vec::with_capacity(order.len());
        for dim in order {
            let axis = self.axis_of(dim.as_ref()).ok_or_else(invalid)?;
            if perm.contains(&axis) {
                return Err(invalid());
            }
            perm.push(axis);
        }

        if perm.iter().enumerate().all(|(k, &axis)| k == axis) {
            return Ok(self.clone());
        }

        let src_strides = contiguous_strides(&self.shape)?;
        let out_shape: Vec<usize> = perm.iter().map(|&axis| self.shape[axis]).collect();
        let out_strides: Vec<usize> = perm.iter().map(|&axis| src_strides[axis]).collect();
        let offsets = gather_offsets(&out_shape, &out_strides, 0);

        Ok(Self {
            dims: perm.iter().map(|&axis| self.dims[axis].clone()).collect(),
            shape: out_shape,
            data: self.data.gather(&offsets),
            attrs: self.attrs.clone(),
        })
    }

    /// Same labeled values laid out in `dims` order. Fails with
    /// `UnknownDimension` when the dim sets differ.
    pub fn aligned_to<S: AsRef<str>>(&self, dims: &[S]) -> Result<Self, StateError> {
        if let Some(missing) = dims.iter().find(|dim| self.axis_of(dim.as_ref()).is_none()) {
            return Err(StateError::UnknownDimension(missing.as_ref().to_string()));
        }
        if let Some(extra) = self
            .dims
            .iter()
            .find(|dim| !dims.iter().any(|d| d.as_ref() == dim.as_str()))
        {
            return Err(StateError::UnknownDimension(extra.clone()));
        }
        self.transposed(dims)
    }

    /// Default transpose: all dimensions reversed.
    #[must_use]
    pub fn reversed(&self) -> Self {
        let order: Vec<&str> = self.dims.iter().rev().map(String::as_str).collect();
        // a reversal of our own dims is always a valid permutation
        self.transposed(&order).unwrap_or_else(|_| self.clone())
    }

    /// Keeps the axes named in `keep` (in their current order) and fixes every
    /// other axis at `index`.
    pub fn select_fixed(&self, keep: impl Fn(&str) -> bool, index: usize) -> Result<Self, StateError> {
        let src_strides = contiguous_strides(&self.shape)?;
        let mut base = 0usize;
        let mut dims = Vec::new();
        let mut shape = Vec::new();
        let mut strides = Vec::new();

        for (axis, dim) in self.dims.iter().enumerate() {
            if keep(dim) {
                dims.push(dim.clone());
                shape.push(self.shape[axis]);
                strides.push(src_strides[axis]);
            } else {
                if index >= self.shape[axis] {
                    return Err(StateError::IndexOutOfBounds {
                        dim: dim.clone(),
                        index,
                        extent: self.shape[axis],
                    });
                }
                base += index * src_strides[axis];
            }
        }

        let offsets = gather_offsets(&shape, &strides, base);
        Ok(Self {
            dims,
            shape,
            data: self.data.gather(&offsets),
            attrs: self.attrs.clone(),
        })
    }
}

/// ISO-8601 timestamp at second resolution, e.g. `2020-01-01T00:00:00`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp(String);

impl Timestamp {
    pub fn parse(raw: &str) -> Result<Self, StateError> {
        let raw = raw.trim();
        let bytes = raw.as_bytes();
        let digit_positions = [0, 1, 2, 3, 5, 6, 8, 9, 11, 12, 14, 15, 17, 18];
        let well_formed = bytes.len() == 19
            && bytes[4] == b'-'
            && bytes[7] == b'-'
            && bytes[10] == b'T'
            && bytes[13] == b':'
            && bytes[16] == b':'
            && digit_positions.iter().all(|&i| bytes[i].is_ascii_digit());
        if !well_formed {
            return Err(StateError::InvalidTimestamp(raw.to_string()));
        }

        let field = |start: usize, end: usize| raw[start..end].parse::<u32>().unwrap_or(u32::MAX);
        let in_range = (1..=12).contains(&field(5, 7))
            && (1..=31).contains(&field(8, 10))
            && field(11, 13) < 24
            && field(14, 16) < 60
            && field(17, 19) < 60;
        if !in_range {
            return Err(StateError::InvalidTimestamp(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Timestamp {
    type Error = StateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Timestamp> for String {
    fn from(value: Timestamp) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Time(Timestamp),
    Array(LabeledArray),
}

impl StateValue {
    #[must_use]
    pub fn as_array(&self) -> Option<&LabeledArray> {
        match self {
            Self::Array(array) => Some(array),
            Self::Time(_) => None,
        }
    }

    #[must_use]
    pub fn as_time(&self) -> Option<&Timestamp> {
        match self {
            Self::Time(time) => Some(time),
            Self::Array(_) => None,
        }
    }
}

impl From<LabeledArray> for StateValue {
    fn from(value: LabeledArray) -> Self {
        Self::Array(value)
    }
}

impl From<Timestamp> for StateValue {
    fn from(value: Timestamp) -> Self {
        Self::Time(value)
    }
}

/// Variable name -> timestamp or labeled array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhysicalState {
    entries: BTreeMap<String, StateValue>,
}

impl PhysicalState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<StateValue>) {
        self.entries.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StateValue> {
        self.entries.get(name)
    }

    #[must_use]
    pub fn array(&self, name: &str) -> Option<&LabeledArray> {
        self.entries.get(name).and_then(StateValue::as_array)
    }

    pub fn array_mut(&mut self, name: &str) -> Option<&mut LabeledArray> {
        match self.entries.get_mut(name) {
            Some(StateValue::Array(array)) => Some(array),
            _ => None,
        }
    }

    #[must_use]
    pub fn time(&self) -> Option<&Timestamp> {
        self.entries.get(TIME_KEY).and_then(StateValue::as_time)
    }

    #[must_use]
    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<StateValue> {
        self.entries.remove(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StateValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, StateValue)> for PhysicalState {
    fn from_iter<T: IntoIterator<Item = (String, StateValue)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for PhysicalState {
    type Item = (String, StateValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, StateValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// One state, or a fixed-arity tuple of logically distinct states.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputBundle {
    Single(PhysicalState),
    Tuple(Vec<PhysicalState>),
}

impl OutputBundle {
    /// Zero states yield `None`, one yields `Single`, more yield `Tuple`.
    #[must_use]
    pub fn from_states(mut states: Vec<PhysicalState>) -> Option<Self> {
        match states.len() {
            0 => None,
            1 => states.pop().map(Self::Single),
            _ => Some(Self::Tuple(states)),
        }
    }

    #[must_use]
    pub fn states(&self) -> &[PhysicalState] {
        match self {
            Self::Single(state) => std::slice::from_ref(state),
            Self::Tuple(states) => states,
        }
    }

    #[must_use]
    pub fn into_states(self) -> Vec<PhysicalState> {
        match self {
            Self::Single(state) => vec![state],
            Self::Tuple(states) => states,
        }
    }

    #[must_use]
    pub fn is_tuple(&self) -> bool {
        matches!(self, Self::Tuple(_))
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        self.states().len()
    }
}

/// Horizontal extents of `None` select single-column mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSpec {
    pub nx: Option<usize>,
    pub ny: Option<usize>,
    pub nz: usize,
}

impl GridSpec {
    #[must_use]
    pub const fn column(nz: usize) -> Self {
        Self {
            nx: None,
            ny: None,
            nz,
        }
    }

    #[must_use]
    pub const fn volume(nx: usize, ny: usize, nz: usize) -> Self {
        Self {
            nx: Some(nx),
            ny: Some(ny),
            nz,
        }
    }

    #[must_use]
    pub const fn is_column(&self) -> bool {
        self.nx.is_none() && self.ny.is_none()
    }
}
