//! Recording adapters that capture channel outcomes to cassettes.

pub mod channel;

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::cassette::recorder::CassetteRecorder;

/// Record an `Option<T>` outcome using the Ok/Err JSON convention.
///
/// Serialization or locking problems are logged and the interaction dropped;
/// recording must never change the outcome seen by the caller.
pub(crate) fn record_outcome<T, I>(
    recorder: &Arc<Mutex<CassetteRecorder>>,
    port: &str,
    method: &str,
    input: &I,
    outcome: Option<&T>,
) where
    T: Serialize,
    I: Serialize,
{
    let serialized = serde_json::to_value(input).and_then(|input_json| {
        let output_json = match outcome {
            Some(v) => serde_json::json!({ "Ok": serde_json::to_value(v)? }),
            None => serde_json::json!({ "Err": format!("{port} {method} failed") }),
        };
        Ok((input_json, output_json))
    });

    let (input_json, output_json) = match serialized {
        Ok(pair) => pair,
        Err(e) => {
            log::warn!("[{port}] not recorded, serialization failed: {e}");
            return;
        }
    };

    match recorder.lock() {
        Ok(mut guard) => guard.record(port, method, input_json, output_json),
        Err(e) => log::warn!("[{port}] not recorded, recorder lock poisoned: {e}"),
    }
}
