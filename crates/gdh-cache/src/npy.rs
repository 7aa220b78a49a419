#![forbid(unsafe_code)]

//! NPY v1.0 byte streams for numeric cache payloads.

use crate::CacheError;
use gdh_state::{ArrayData, element_count};

pub const NPY_MAGIC_PREFIX: [u8; 6] = [0x93, b'N', b'U', b'M', b'P', b'Y'];
pub const MAX_HEADER_BYTES: usize = 65_536;

const NPY_VERSION: (u8, u8) = (1, 0);
const NPY_HEADER_REQUIRED_KEYS: [&str; 3] = ["descr", "fortran_order", "shape"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericDescr {
    F64,
    I64,
}

impl NumericDescr {
    #[must_use]
    pub const fn descr(self) -> &'static str {
        match self {
            Self::F64 => "<f8",
            Self::I64 => "<i8",
        }
    }

    pub fn decode(descr: &str) -> Result<Self, CacheError> {
        match descr {
            "<f8" => Ok(Self::F64),
            "<i8" => Ok(Self::I64),
            _ => Err(CacheError::PayloadInvalid("dtype descriptor is unsupported")),
        }
    }

    #[must_use]
    pub const fn item_size(self) -> usize {
        8
    }
}

fn format_shape_tuple(shape: &[usize]) -> String {
    match shape {
        [] => "()".to_string(),
        [single] => format!("({single},)"),
        _ => {
            let joined = shape
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            format!("({joined},)")
        }
    }
}

fn encode_header_bytes(descr: NumericDescr, shape: &[usize]) -> Result<Vec<u8>, CacheError> {
    let dictionary = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        descr.descr(),
        format_shape_tuple(shape)
    );
    let prefix_len = NPY_MAGIC_PREFIX.len() + 2 + 2;
    let base_header_len = dictionary.len() + 1;
    let padding = (16 - ((prefix_len + base_header_len) % 16)) % 16;
    let header_len = base_header_len + padding;
    if header_len > MAX_HEADER_BYTES {
        return Err(CacheError::PayloadInvalid(
            "header bytes must be within bounded budget",
        ));
    }

    let mut header = Vec::with_capacity(header_len);
    header.extend_from_slice(dictionary.as_bytes());
    header.extend(std::iter::repeat_n(b' ', padding));
    header.push(b'\n');
    Ok(header)
}

/// Encodes a numeric payload; text payloads are not representable.
pub fn write_npy_bytes(shape: &[usize], data: &ArrayData) -> Result<Vec<u8>, CacheError> {
    let (descr, body) = match data {
        ArrayData::Float64(values) => (
            NumericDescr::F64,
            values.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>(),
        ),
        ArrayData::Int64(values) => (
            NumericDescr::I64,
            values.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>(),
        ),
        ArrayData::Text(_) => {
            return Err(CacheError::PayloadInvalid(
                "text payloads have no npy encoding",
            ));
        }
    };
    let expected = element_count(shape)
        .map_err(|_| CacheError::PayloadInvalid("shape element-count overflowed"))?;
    if expected != data.len() {
        return Err(CacheError::PayloadInvalid(
            "payload element count does not match shape",
        ));
    }

    let header = encode_header_bytes(descr, shape)?;
    let header_len = u16::try_from(header.len()).map_err(|_| {
        CacheError::PayloadInvalid("version 1.0 header length exceeds u16 boundary")
    })?;
    let mut encoded = Vec::with_capacity(NPY_MAGIC_PREFIX.len() + 4 + header.len() + body.len());
    encoded.extend_from_slice(&NPY_MAGIC_PREFIX);
    encoded.push(NPY_VERSION.0);
    encoded.push(NPY_VERSION.1);
    encoded.extend_from_slice(&header_len.to_le_bytes());
    encoded.extend_from_slice(&header);
    encoded.extend_from_slice(&body);
    Ok(encoded)
}

fn extract_after_key<'a>(dictionary: &'a str, key: &str) -> Result<&'a str, CacheError> {
    let quoted = format!("'{key}'");
    let key_start = dictionary
        .find(&quoted)
        .ok_or(CacheError::PayloadInvalid("required header field is missing"))?;
    let tail = dictionary[key_start + quoted.len()..].trim_start();
    let tail = tail
        .strip_prefix(':')
        .ok_or(CacheError::PayloadInvalid("header field is missing ':' separator"))?;
    Ok(tail.trim_start())
}

fn parse_shape_tuple(tuple_literal: &str) -> Result<Vec<usize>, CacheError> {
    tuple_literal
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<usize>()
                .map_err(|_| CacheError::PayloadInvalid("shape tuple entries must be usize"))
        })
        .collect()
}

fn parse_header(dictionary: &str) -> Result<(NumericDescr, Vec<usize>), CacheError> {
    let dictionary = dictionary.trim_end();
    if !(dictionary.starts_with('{') && dictionary.ends_with('}')) {
        return Err(CacheError::PayloadInvalid(
            "header dictionary must be wrapped in braces",
        ));
    }
    for key in NPY_HEADER_REQUIRED_KEYS {
        extract_after_key(dictionary, key)?;
    }

    let descr_tail = extract_after_key(dictionary, "descr")?;
    let descr_literal = descr_tail
        .strip_prefix('\'')
        .and_then(|tail| tail.split_once('\''))
        .map(|(literal, _)| literal)
        .ok_or(CacheError::PayloadInvalid("descr must be a quoted string"))?;
    let descr = NumericDescr::decode(descr_literal)?;

    if !extract_after_key(dictionary, "fortran_order")?.starts_with("False") {
        return Err(CacheError::PayloadInvalid(
            "only C-order payloads are supported",
        ));
    }

    let shape_tail = extract_after_key(dictionary, "shape")?
        .strip_prefix('(')
        .ok_or(CacheError::PayloadInvalid("shape field must begin with tuple syntax"))?;
    let shape_end = shape_tail
        .find(')')
        .ok_or(CacheError::PayloadInvalid("shape tuple missing closing ')'"))?;
    let shape = parse_shape_tuple(&shape_tail[..shape_end])?;
    Ok((descr, shape))
}

/// Decodes an NPY v1.0 stream back into `(shape, payload)`.
pub fn read_npy_bytes(payload: &[u8]) -> Result<(Vec<usize>, ArrayData), CacheError> {
    if payload.len() < 10 || payload[..6] != NPY_MAGIC_PREFIX {
        return Err(CacheError::PayloadInvalid("invalid npy magic"));
    }
    if (payload[6], payload[7]) != NPY_VERSION {
        return Err(CacheError::PayloadInvalid("unsupported npy version"));
    }
    let header_len = usize::from(u16::from_le_bytes([payload[8], payload[9]]));
    let header_end = 10 + header_len;
    if payload.len() < header_end {
        return Err(CacheError::PayloadInvalid(
            "payload truncated before declared header bytes",
        ));
    }
    let dictionary = std::str::from_utf8(&payload[10..header_end])
        .map_err(|_| CacheError::PayloadInvalid("header bytes must decode as utf-8"))?;
    let (descr, shape) = parse_header(dictionary)?;

    let body = &payload[header_end..];
    let count = element_count(&shape)
        .map_err(|_| CacheError::PayloadInvalid("shape element-count overflowed"))?;
    let expected_len = count
        .checked_mul(descr.item_size())
        .ok_or(CacheError::PayloadInvalid("payload byte length overflowed"))?;
    if body.len() != expected_len {
        return Err(CacheError::PayloadInvalid(
            "payload byte length does not match header shape",
        ));
    }

    let words = body.chunks_exact(8).map(|chunk| {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        word
    });
    let data = match descr {
        NumericDescr::F64 => ArrayData::Float64(words.map(f64::from_le_bytes).collect()),
        NumericDescr::I64 => ArrayData::Int64(words.map(i64::from_le_bytes).collect()),
    };
    Ok((shape, data))
}

#[cfg(test)]
mod tests {
    use super::{NPY_MAGIC_PREFIX, read_npy_bytes, write_npy_bytes};
    use crate::CacheError;
    use gdh_state::ArrayData;

    #[test]
    fn header_is_sixteen_byte_aligned() {
        let bytes = write_npy_bytes(&[2, 3], &ArrayData::Float64(vec![0.5; 6])).expect("write");
        assert_eq!(bytes[..6], NPY_MAGIC_PREFIX);
        let header_len = usize::from(u16::from_le_bytes([bytes[8], bytes[9]]));
        assert_eq!((10 + header_len) % 16, 0);
        assert_eq!(bytes.len(), 10 + header_len + 48);
    }

    #[test]
    fn negative_zero_and_extremes_survive_bit_exact() {
        let values = vec![-0.0, f64::MIN_POSITIVE, f64::MAX, 1.0 / 3.0];
        let bytes = write_npy_bytes(&[4], &ArrayData::Float64(values.clone())).expect("write");
        let (shape, data) = read_npy_bytes(&bytes).expect("read");
        assert_eq!(shape, vec![4]);
        let ArrayData::Float64(decoded) = data else {
            panic!("expected float payload");
        };
        let bits: Vec<u64> = decoded.iter().map(|v| v.to_bits()).collect();
        let expected: Vec<u64> = values.iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits, expected);
    }

    #[test]
    fn scalar_integer_payload() {
        let bytes = write_npy_bytes(&[], &ArrayData::Int64(vec![-7])).expect("write");
        let (shape, data) = read_npy_bytes(&bytes).expect("read");
        assert!(shape.is_empty());
        assert_eq!(data, ArrayData::Int64(vec![-7]));
    }

    #[test]
    fn truncated_body_is_rejected() {
        let mut bytes = write_npy_bytes(&[3], &ArrayData::Float64(vec![1.0; 3])).expect("write");
        bytes.truncate(bytes.len() - 4);
        let err = read_npy_bytes(&bytes).expect_err("truncated");
        assert!(matches!(err, CacheError::PayloadInvalid(_)));
    }

    #[test]
    fn text_has_no_npy_form() {
        let err = write_npy_bytes(&[1], &ArrayData::Text(vec!["a".to_string()]))
            .expect_err("text payload");
        assert_eq!(err.reason_code(), "cache_payload_invalid");
    }

    #[test]
    fn oversized_shape_is_rejected_without_overflow() {
        let dictionary = "{'descr': '<f8', 'fortran_order': False, 'shape': (2305843009213693953,), }";
        let mut payload = NPY_MAGIC_PREFIX.to_vec();
        payload.extend_from_slice(&[1, 0]);
        payload.extend_from_slice(&u16::try_from(dictionary.len()).expect("short").to_le_bytes());
        payload.extend_from_slice(dictionary.as_bytes());
        payload.extend_from_slice(&[0u8; 16]);

        let err = read_npy_bytes(&payload).expect_err("length overflows usize");
        assert!(matches!(err, CacheError::PayloadInvalid(_)), "{err}");
    }
}
