/// A vBucket's lifecycle state (§3). `Dead -> *` is illegal except on a
/// fresh load at warmup, which constructs a new vBucket rather than
/// transitioning an existing one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Active,
    Replica,
    Pending,
    Dead,
}

impl LifecycleState {
    /// Whether `self -> next` is a legal transition (§3 invariants).
    pub fn can_transition_to(self, _next: LifecycleState) -> bool {
        !matches!(self, LifecycleState::Dead)
    }
}
