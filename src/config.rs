#![forbid(unsafe_code)]

/// Size of the DEFLATE sliding window: back-references may reach this far.
pub const WINDOW_SIZE: usize = 32768;

/// Longest single back-reference copy.
pub const MAX_MATCH_LEN: usize = 258;

const DEFAULT_BUFFER_SIZE: usize = 100_000;
const MIN_INPUT_BUFFER_SIZE: usize = 33_000;

/// Buffer sizing and verification knobs.
///
/// All storage is allocated once, at reader construction, from these sizes.
#[derive(Debug, Clone)]
pub struct DecompressionConfig {
    /// Capacity of the compressed-byte input buffer.
    pub input_buffer_size: usize,
    /// Capacity of the output buffer; also the largest chunk a single
    /// `consume` can hand out.
    pub max_output_buffer_size: usize,
    /// How many trailing output bytes stay addressable across `consume`
    /// calls. Back-references reach up to [`WINDOW_SIZE`] bytes back, so
    /// anything below that breaks correctness on conforming streams.
    pub min_output_buffer_size: usize,
    /// Whether the gzip layer compares the trailer CRC-32 against the
    /// computed one.
    pub verify_checksum: bool,
}

impl Default for DecompressionConfig {
    fn default() -> Self {
        Self {
            input_buffer_size: DEFAULT_BUFFER_SIZE,
            max_output_buffer_size: DEFAULT_BUFFER_SIZE,
            min_output_buffer_size: WINDOW_SIZE,
            verify_checksum: true,
        }
    }
}

impl DecompressionConfig {
    /// Panics if the sizes cannot sustain decoding. Called by the readers
    /// at construction; a violation is a caller bug, not a data error.
    pub(crate) fn validate(&self) {
        assert!(
            self.max_output_buffer_size >= self.min_output_buffer_size + MAX_MATCH_LEN,
            "output buffer must hold the retained window plus one maximum-length copy"
        );
        assert!(
            self.min_output_buffer_size >= WINDOW_SIZE,
            "retained output below the sliding window breaks back-references"
        );
        assert!(
            self.input_buffer_size >= MIN_INPUT_BUFFER_SIZE,
            "input buffer too small"
        );
    }
}
