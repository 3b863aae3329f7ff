/// Which values the hash index keeps resident once warmup reaches steady
/// state, driving whether `KeyDump`/`LoadingKVPairs` run at all (§4.6
/// stages 4 and 7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictionPolicy {
    ValueOnly,
    Full,
}

/// Stages of the recovery pipeline (§4.6), in the order they run absent a
/// traffic-enable short-circuit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WarmupState {
    Initialize,
    CreateVBuckets,
    EstimateItemCount,
    KeyDump,
    CheckForAccessLog,
    LoadingAccessLog,
    LoadingKVPairs,
    LoadingData,
    Done,
}
