use crate::shared_state::SharedStates;

/// Per-pipeline host context handed to every plugin call.
#[derive(Default)]
pub struct Context {
    shared_states: SharedStates,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared_states(&self) -> &SharedStates {
        &self.shared_states
    }
}
