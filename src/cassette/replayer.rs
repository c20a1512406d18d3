//! Serves recorded interactions back in order.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::Path;

use super::format::{Cassette, Interaction};
use crate::error::GatewayError;

/// Per-(port, method) FIFO queues built from a cassette.
///
/// Interleaving across ports does not matter; within one channel calls are
/// answered in the order they were recorded.
pub struct CassetteReplayer {
    queues: HashMap<(String, String), VecDeque<Interaction>>,
}

impl CassetteReplayer {
    #[must_use]
    pub fn new(cassette: &Cassette) -> Self {
        let mut queues: HashMap<(String, String), VecDeque<Interaction>> = HashMap::new();
        let mut ordered = cassette.interactions.clone();
        ordered.sort_by_key(|i| i.seq);
        for interaction in ordered {
            queues
                .entry((interaction.port.clone(), interaction.method.clone()))
                .or_default()
                .push_back(interaction);
        }
        Self { queues }
    }

    /// Load a cassette file and queue its interactions.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if the cassette cannot be loaded.
    pub fn open(path: &Path) -> Result<Self, GatewayError> {
        let cassette = Cassette::load(path)?;
        log::info!(
            "replaying cassette '{}' ({} interactions, commit {})",
            cassette.name,
            cassette.interactions.len(),
            cassette.commit
        );
        Ok(Self::new(&cassette))
    }

    /// Distinct ports that have recorded interactions, sorted.
    #[must_use]
    pub fn ports(&self) -> Vec<String> {
        self.queues
            .keys()
            .map(|(port, _)| port.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Pop the next interaction, or `None` once the queue is drained.
    pub fn next_interaction(&mut self, port: &str, method: &str) -> Option<Interaction> {
        self.queues.get_mut(&(port.to_string(), method.to_string()))?.pop_front()
    }
}
