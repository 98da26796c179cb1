//! Serves recorded interactions back by matching their inputs.
//!
//! Concurrent calls finish in any order, so replay cannot rely on sequence
//! alone. A request takes the earliest unconsumed interaction on the same
//! port and method whose recorded input fields all appear, with equal
//! values, in the request input. Repeated calls with the same input (e.g.
//! retries) consume matching interactions in recorded order.

use serde_json::Value;

use super::format::{Cassette, Interaction};

/// Replays interactions from a loaded cassette.
#[derive(Debug)]
pub struct CassetteReplayer {
    pending: Vec<Option<Interaction>>,
}

impl CassetteReplayer {
    /// Creates a replayer over every interaction in `cassette`.
    #[must_use]
    pub fn new(cassette: &Cassette) -> Self {
        Self { pending: cassette.interactions.iter().cloned().map(Some).collect() }
    }

    /// Takes the first unconsumed interaction matching `port`, `method` and
    /// `input`, or `None` when nothing matches.
    pub fn take_matching(&mut self, port: &str, method: &str, input: &Value) -> Option<Interaction> {
        self.pending
            .iter_mut()
            .find(|slot| {
                slot.as_ref().is_some_and(|recorded| {
                    recorded.port == port && recorded.method == method && contains(input, &recorded.input)
                })
            })
            .and_then(Option::take)
    }

    /// Interactions not yet served.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.pending.iter().filter(|slot| slot.is_some()).count()
    }
}

/// True when every field of `recorded` appears in `request` with an equal
/// value. Non-object values must be equal outright; `null` matches anything.
fn contains(request: &Value, recorded: &Value) -> bool {
    match (request, recorded) {
        (_, Value::Null) => true,
        (Value::Object(request), Value::Object(recorded)) => recorded
            .iter()
            .all(|(key, value)| request.get(key).is_some_and(|actual| contains(actual, value))),
        (request, recorded) => request == recorded,
    }
}
