//! Typed extraction from values
//!
//! Each accessor checks the kind first and fails with
//! [`ClaspError::KindMismatch`] instead of reinterpreting the payload.

use crate::error::{ClaspError, ClaspResult};
use crate::value::{ExternalAddress, Value};
use clasp_types::ValueKind;

/// Text of a symbol or string
pub fn to_string(value: &Value) -> ClaspResult<&str> {
    value.as_str().ok_or_else(|| ClaspError::kind_mismatch("SYMBOL or STRING", value.kind()))
}

pub fn to_integer(value: &Value) -> ClaspResult<i64> {
    value.as_integer().ok_or_else(|| ClaspError::kind_mismatch(ValueKind::Integer.name(), value.kind()))
}

pub fn to_double(value: &Value) -> ClaspResult<f64> {
    value.as_float().ok_or_else(|| ClaspError::kind_mismatch(ValueKind::Float.name(), value.kind()))
}

/// Identity pointer of whatever object the value refers to
pub fn to_pointer(value: &Value) -> *const () {
    match value {
        Value::Float(n) => n.as_ptr(),
        Value::Integer(n) => n.as_ptr(),
        Value::Symbol(s) | Value::String(s) => s.as_ptr(),
        Value::Multifield(mf) => mf.as_ptr(),
        Value::ExternalAddress(address) => address.as_ptr(),
        Value::FactAddress(fact) => fact.as_ptr(),
    }
}

pub fn to_external_address(value: &Value) -> ClaspResult<&ExternalAddress> {
    value
        .as_external_address()
        .ok_or_else(|| ClaspError::kind_mismatch(ValueKind::ExternalAddress.name(), value.kind()))
}
