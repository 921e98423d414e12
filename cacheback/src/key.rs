//! Cache key derivation.
//!
//! Keys look like `job_type`, `job_type:H(args)` or
//! `job_type:H(args):H(kwarg names):H(kwarg values)` where `H` is a hex
//! SHA-256 of the canonical JSON encoding.

use crate::domain::CallArgs;
use serde::Serialize;
use sha2::{Digest, Sha256};
use shared::{Error, Result};

pub fn build_key(job_type: &str, call: &CallArgs) -> Result<String> {
    if call.is_empty() {
        return Ok(job_type.to_string());
    }

    let args_hash = hash_tuple(&call.args)?;
    if call.kwargs.is_empty() {
        return Ok(format!("{}:{}", job_type, args_hash));
    }

    // Names and values are hashed separately; both come out in name order.
    let names: Vec<&String> = call.kwargs.keys().collect();
    let values: Vec<&serde_json::Value> = call.kwargs.values().collect();

    Ok(format!(
        "{}:{}:{}:{}",
        job_type,
        args_hash,
        hash_tuple(&names)?,
        hash_tuple(&values)?
    ))
}

/// Hex digest of the canonical encoding of `value`.
pub fn hash_tuple<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let encoded = serde_json::to_vec(value).map_err(|e| Error::UnhashableInput(e.to_string()))?;
    Ok(hex::encode(Sha256::digest(&encoded)))
}
