//! Replaying adapters that serve recorded outcomes from cassettes.

pub mod channel;

use std::sync::{Arc, Mutex};

use crate::cassette::replayer::CassetteReplayer;

/// Retrieve the next recorded output for a given port and method.
pub(crate) fn next_output(
    replayer: &Arc<Mutex<CassetteReplayer>>,
    port: &str,
    method: &str,
) -> Option<serde_json::Value> {
    let mut guard = match replayer.lock() {
        Ok(guard) => guard,
        Err(e) => {
            log::error!("[{port}] replayer lock poisoned: {e}");
            return None;
        }
    };
    let output = guard.next_interaction(port, method).map(|i| i.output);
    if output.is_none() {
        log::warn!("[{port}] cassette exhausted: no recorded {method} left");
    }
    output
}

/// Deserialize a replayed output; an `Err` entry replays as `None`.
pub(crate) fn replay_outcome<T: serde::de::DeserializeOwned>(
    output: serde_json::Value,
) -> Option<T> {
    if output.get("Err").or_else(|| output.get("err")).is_some() {
        return None;
    }
    let value = output.get("Ok").or_else(|| output.get("ok")).cloned().unwrap_or(output);
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            log::error!("replayed output does not deserialize: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::channel::UploadResult;
    use serde_json::json;

    #[test]
    fn ok_entries_deserialize() {
        let out = json!({"Ok": {"file_url": "https://x/y", "width": 1, "height": 2}});
        let result: Option<UploadResult> = replay_outcome(out);
        assert_eq!(result.map(|r| r.height), Some(2));
    }

    #[test]
    fn bare_values_deserialize() {
        let out = json!({"file_url": "https://x/y", "width": 0, "height": 0});
        assert!(replay_outcome::<UploadResult>(out).is_some());
    }

    #[test]
    fn err_and_garbage_replay_as_none() {
        assert!(replay_outcome::<UploadResult>(json!({"Err": "boom"})).is_none());
        assert!(replay_outcome::<UploadResult>(json!({"Ok": 42})).is_none());
    }
}
