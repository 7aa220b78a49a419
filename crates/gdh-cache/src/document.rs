#![forbid(unsafe_code)]

use crate::npy::{read_npy_bytes, write_npy_bytes};
use crate::{CacheError, sha256_hex};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use gdh_state::{ArrayData, AttrValue, LabeledArray, PhysicalState, StateValue, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CACHE_SCHEMA_VERSION: u8 = 1;

/// One persisted physical state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheDocument {
    pub schema_version: u8,
    pub scenario: String,
    pub descriptor: String,
    pub index: usize,
    pub variables: BTreeMap<String, CachedVariable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachedVariable {
    Time {
        value: Timestamp,
    },
    Array {
        dims: Vec<String>,
        shape: Vec<usize>,
        dtype: String,
        #[serde(default)]
        attrs: BTreeMap<String, AttrValue>,
        payload: CachedPayload,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "snake_case")]
pub enum CachedPayload {
    Npy { bytes_b64: String, sha256: String },
    Text { values: Vec<String> },
}

impl CacheDocument {
    pub fn from_state(
        state: &PhysicalState,
        scenario: &str,
        descriptor: &str,
        index: usize,
    ) -> Result<Self, CacheError> {
        let mut variables = BTreeMap::new();
        for (name, value) in state.iter() {
            let cached = match value {
                StateValue::Time(time) => CachedVariable::Time {
                    value: time.clone(),
                },
                StateValue::Array(array) => encode_array(array)?,
            };
            variables.insert(name.to_string(), cached);
        }
        Ok(Self {
            schema_version: CACHE_SCHEMA_VERSION,
            scenario: scenario.to_string(),
            descriptor: descriptor.to_string(),
            index,
            variables,
        })
    }

    pub fn into_state(self) -> Result<PhysicalState, CacheError> {
        if self.schema_version != CACHE_SCHEMA_VERSION {
            return Err(CacheError::SchemaVersion(self.schema_version));
        }
        let mut state = PhysicalState::new();
        for (name, cached) in self.variables {
            let value = match cached {
                CachedVariable::Time { value } => StateValue::Time(value),
                CachedVariable::Array {
                    dims,
                    shape,
                    dtype,
                    attrs,
                    payload,
                } => StateValue::Array(decode_array(&name, dims, shape, &dtype, attrs, payload)?),
            };
            state.insert(name, value);
        }
        Ok(state)
    }
}

fn encode_array(array: &LabeledArray) -> Result<CachedVariable, CacheError> {
    let payload = match array.data() {
        ArrayData::Text(values) => CachedPayload::Text {
            values: values.clone(),
        },
        numeric => {
            let bytes = write_npy_bytes(array.shape(), numeric)?;
            CachedPayload::Npy {
                sha256: sha256_hex(&bytes),
                bytes_b64: BASE64.encode(bytes),
            }
        }
    };
    Ok(CachedVariable::Array {
        dims: array.dims().to_vec(),
        shape: array.shape().to_vec(),
        dtype: array.data().dtype_name().to_string(),
        attrs: array.attrs().clone(),
        payload,
    })
}

fn decode_array(
    name: &str,
    dims: Vec<String>,
    shape: Vec<usize>,
    dtype: &str,
    attrs: BTreeMap<String, AttrValue>,
    payload: CachedPayload,
) -> Result<LabeledArray, CacheError> {
    let data = match payload {
        CachedPayload::Text { values } => ArrayData::Text(values),
        CachedPayload::Npy { bytes_b64, sha256 } => {
            let bytes = BASE64.decode(bytes_b64.as_bytes()).map_err(|err| {
                CacheError::Encoding(format!("{name}: base64 decode failed: {err}"))
            })?;
            let actual = sha256_hex(&bytes);
            if actual != sha256 {
                return Err(CacheError::DigestMismatch {
                    subject: name.to_string(),
                    expected: sha256,
                    actual,
                });
            }
            let (npy_shape, data) = read_npy_bytes(&bytes)?;
            if npy_shape != shape {
                return Err(CacheError::PayloadInvalid(
                    "npy header shape disagrees with recorded shape",
                ));
            }
            data
        }
    };
    if data.dtype_name() != dtype {
        return Err(CacheError::PayloadInvalid(
            "payload dtype disagrees with recorded dtype",
        ));
    }

    LabeledArray::new(dims, shape, data)
        .map(|array| array.with_attrs(attrs))
        .map_err(|cause| CacheError::State {
            name: name.to_string(),
            cause,
        })
}
