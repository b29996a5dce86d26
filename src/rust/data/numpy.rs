use ndarray::{ArrayD, IxDyn, ShapeBuilder};

use super::nested::NestedValue;
use super::pickle::{PickleError, PickleValue};

/// `numpy.core.<submodule>`, or `numpy._core.<submodule>` as written by numpy 2.
pub(super) fn is_numpy_module(module: &str, submodule: &str) -> bool {
    module
        .strip_prefix("numpy.core.")
        .or_else(|| module.strip_prefix("numpy._core."))
        .map_or(false, |rest| rest == submodule)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Float,
    Signed,
    Unsigned,
    Bool,
}

/// Element type of a numeric numpy array.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Dtype {
    kind: Kind,
    size: usize,
    big_endian: bool,
}

impl Dtype {
    /// Reads a reduced `numpy.dtype(code, ...)` object and its byte order state.
    fn from_value(value: &PickleValue) -> Result<Self, PickleError> {
        let (args, state) = match value {
            PickleValue::Object {
                module,
                name,
                args,
                state,
            } if module == "numpy" && name == "dtype" => (args, state),
            other => {
                return Err(PickleError::Malformed(format!(
                    "expected a numpy dtype, found {}",
                    other.kind()
                )))
            }
        };
        let code = match args.as_ref() {
            PickleValue::Tuple(items) => match items.first() {
                Some(PickleValue::Str(code)) => code.as_str(),
                _ => "",
            },
            _ => "",
        };
        let order = match state.as_deref() {
            Some(PickleValue::Tuple(items)) => match items.get(1) {
                Some(PickleValue::Str(order)) => order.as_str(),
                _ => "|",
            },
            _ => "|",
        };
        Self::parse(code, order)
    }

    fn parse(code: &str, order: &str) -> Result<Self, PickleError> {
        let unsupported = || PickleError::UnsupportedDtype(code.to_string());
        let (order, code_body) = match code.chars().next() {
            Some(c @ ('<' | '>' | '=' | '|')) => (&code[..c.len_utf8()], &code[c.len_utf8()..]),
            _ => (order, code),
        };
        let mut chars = code_body.chars();
        let kind = match chars.next() {
            Some('f') => Kind::Float,
            Some('i') => Kind::Signed,
            Some('u') => Kind::Unsigned,
            Some('b') => Kind::Bool,
            _ => return Err(unsupported()),
        };
        let size: usize = chars.as_str().parse().map_err(|_| unsupported())?;
        let supported = match kind {
            Kind::Float => size == 4 || size == 8,
            Kind::Signed | Kind::Unsigned => matches!(size, 1 | 2 | 4 | 8),
            Kind::Bool => size == 1,
        };
        if !supported {
            return Err(unsupported());
        }
        let big_endian = match order {
            ">" => true,
            "=" => cfg!(target_endian = "big"),
            _ => false,
        };
        Ok(Self {
            kind,
            size,
            big_endian,
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<f64>, PickleError> {
        if bytes.len() % self.size != 0 {
            return Err(PickleError::Malformed(format!(
                "buffer of {} bytes is not a multiple of the item size {}",
                bytes.len(),
                self.size
            )));
        }
        Ok(bytes.chunks_exact(self.size).map(|item| self.value(item)).collect())
    }

    fn value(&self, item: &[u8]) -> f64 {
        let mut buf = [0u8; 8];
        buf[..self.size].copy_from_slice(item);
        if self.big_endian {
            buf[..self.size].reverse();
        }
        match self.kind {
            Kind::Float if self.size == 4 => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]).into(),
            Kind::Float => f64::from_le_bytes(buf),
            Kind::Unsigned | Kind::Bool => u64::from_le_bytes(buf) as f64,
            Kind::Signed => {
                let shift = 64 - 8 * self.size as u32;
                ((i64::from_le_bytes(buf) << shift) >> shift) as f64
            }
        }
    }
}

fn shape(value: &PickleValue) -> Result<Vec<usize>, PickleError> {
    let dims = match value {
        PickleValue::Tuple(dims) | PickleValue::List(dims) => dims,
        other => {
            return Err(PickleError::Malformed(format!(
                "expected an array shape, found {}",
                other.kind()
            )))
        }
    };
    dims.iter()
        .map(|dim| match dim {
            PickleValue::Int(n) => usize::try_from(*n).ok(),
            _ => None,
        })
        .collect::<Option<Vec<usize>>>()
        .ok_or_else(|| PickleError::Malformed("array shape holds a non-integer".into()))
}

fn array(shape: Vec<usize>, values: Vec<f64>, fortran: bool) -> Result<PickleValue, PickleError> {
    let dim = IxDyn(&shape);
    let array = if fortran {
        ArrayD::from_shape_vec(dim.f(), values)
    } else {
        ArrayD::from_shape_vec(dim, values)
    }
    .map_err(|e| PickleError::Malformed(format!("array of shape {:?}: {}", shape, e)))?;
    Ok(PickleValue::Array(array.as_standard_layout().into_owned()))
}

/// Builds the array from the `ndarray.__setstate__` tuple
/// `(version, shape, dtype, is_fortran, data)` that follows `_reconstruct`.
pub(super) fn reconstruct(state: &PickleValue) -> Result<PickleValue, PickleError> {
    let items = match state {
        PickleValue::Tuple(items) if items.len() == 5 => items,
        other => {
            return Err(PickleError::Malformed(format!(
                "unexpected ndarray state {}",
                other.kind()
            )))
        }
    };
    let shape = shape(&items[1])?;
    let fortran = matches!(items[3], PickleValue::Bool(true));
    let values = match &items[4] {
        PickleValue::Bytes(bytes) => Dtype::from_value(&items[2])?.decode(bytes)?,
        // Object arrays carry their elements as a list
        PickleValue::List(elements) => elements
            .iter()
            .map(|element| match element {
                PickleValue::Int(n) => Some(*n as f64),
                PickleValue::Float(x) => Some(*x),
                _ => None,
            })
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(|| PickleError::UnsupportedDtype("object".into()))?,
        other => {
            return Err(PickleError::Malformed(format!(
                "unexpected ndarray data {}",
                other.kind()
            )))
        }
    };
    array(shape, values, fortran)
}

/// Builds the array from the `_frombuffer(buffer, dtype, shape, order)` call numpy
/// writes for pickle protocol 5.
pub(super) fn from_buffer(args: &PickleValue) -> Result<PickleValue, PickleError> {
    match args {
        PickleValue::Tuple(items) if items.len() == 4 => {
            let bytes = match &items[0] {
                PickleValue::Bytes(bytes) => bytes,
                other => {
                    return Err(PickleError::Malformed(format!(
                        "unexpected array buffer {}",
                        other.kind()
                    )))
                }
            };
            let values = Dtype::from_value(&items[1])?.decode(bytes)?;
            let fortran = matches!(&items[3], PickleValue::Str(order) if order == "F");
            array(shape(&items[2])?, values, fortran)
        }
        other => Err(PickleError::Malformed(format!(
            "unexpected _frombuffer arguments {}",
            other.kind()
        ))),
    }
}

/// Decodes a numpy scalar such as `np.float32(0.5)`.
pub(super) fn scalar(args: &PickleValue) -> Result<PickleValue, PickleError> {
    match args {
        PickleValue::Tuple(items) if items.len() == 2 => match &items[1] {
            PickleValue::Bytes(bytes) => {
                let decoded = Dtype::from_value(&items[0])?.decode(bytes)?;
                match decoded.as_slice() {
                    [value] => Ok(PickleValue::Float(*value)),
                    _ => Err(PickleError::Malformed(
                        "numpy scalar does not hold exactly one value".into(),
                    )),
                }
            }
            other => Err(PickleError::Malformed(format!(
                "unexpected numpy scalar data {}",
                other.kind()
            ))),
        },
        other => Err(PickleError::Malformed(format!(
            "unexpected numpy scalar arguments {}",
            other.kind()
        ))),
    }
}
