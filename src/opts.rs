/// Options that control an alignment run.
///
/// This struct represents *library-level configuration*, not CLI flags directly.
/// The CLI maps its arguments into this type so other frontends (services, tests, batch
/// jobs) can construct options programmatically.
///
/// The matching thresholds and boundary context widths are crate constants rather than
/// options: changing them changes which spans are accepted.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Compute the alignment without taking a lease or writing anything.
    pub dry_run: bool,

    /// Log an alignment summary after a persisted run.
    pub log_summary: bool,

    /// How many word updates of one sentence are issued concurrently.
    pub word_update_batch_size: usize,

    /// Provenance written into block and link metadata.
    pub alignment_method: String,
    pub algorithm_version: String,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            dry_run: false,
            log_summary: true,
            word_update_batch_size: 50,
            alignment_method: "string_similarity".to_string(),
            algorithm_version: "1.0".to_string(),
        }
    }
}
