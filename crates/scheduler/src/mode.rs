/// Selects how work fans out across `DARC_CPU` workers. All three variants
/// are realized as tokio tasks on the shared multi-threaded runtime rather
/// than distinct OS processes — the distinction that matters is how many
/// entries are claimed and dispatched concurrently per iteration of the
/// main loop, not the underlying scheduling primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyMode {
    MultiProcess,
    MultiThread,
    Cooperative,
}

impl ConcurrencyMode {
    pub fn from_flags(multiprocessing: bool, multithreading: bool) -> Self {
        if multiprocessing {
            ConcurrencyMode::MultiProcess
        } else if multithreading {
            ConcurrencyMode::MultiThread
        } else {
            ConcurrencyMode::Cooperative
        }
    }

    /// How many entries the Scheduler claims and dispatches per iteration.
    pub fn batch_size(&self, cpu: usize) -> usize {
        match self {
            ConcurrencyMode::MultiProcess | ConcurrencyMode::MultiThread => cpu.max(1),
            ConcurrencyMode::Cooperative => 1,
        }
    }
}
