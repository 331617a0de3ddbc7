//! KAAS 4-bit ADPCM decoder.
//!
//! Each encoded byte carries two nibbles, low nibble first. Every nibble moves an 8-bit
//! predictor by a step taken from the IMA quantizer table and adapts the step index.
//! Decoding is stream-continuous: the state left by one buffer is the starting point
//! of the next.
//!
//! # Examples
//!
//! ```
//! use kaas::Decoder;
//!
//! let mut decoder = Decoder::new();
//! let pcm = decoder.decode_buffer(&[0xF0, 0x37]);
//! assert_eq!(pcm.len(), 4);
//! assert_eq!(pcm[1], 117);
//! ```

use crate::error::DecodeError;
use alloc::vec::Vec;
use arbitrary_int::u4;
pub use fixed::types::I1F15;
use winnow::binary::bits::{bits, take};
use winnow::error::{ContextError, ErrMode, ModalResult};
use winnow::Parser;

/// Index table for STEP_SIZE_TABLE.
const INDEX_TABLE: [i8; 16] = [-1, -1, -1, -1, 2, 4, 6, 8, -1, -1, -1, -1, 2, 4, 6, 8];

/// Quantizer lookup table.
const STEP_SIZE_TABLE: [i16; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408, 449,
    494, 544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066, 2272,
    2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630, 9493,
    10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794, 32767,
];

const MAX_STEP_INDEX: u8 = (STEP_SIZE_TABLE.len() - 1) as u8;

/// Running state of the decoder.
/// * 'predictor' - reconstructed signal value [-128~127]
/// * 'step_index' - index into STEP_SIZE_TABLE [0~88]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecoderState {
    predictor: i8,
    step_index: u8,
}

impl DecoderState {
    /// The running reconstructed signal value.
    #[must_use]
    pub fn predictor(&self) -> i8 {
        self.predictor
    }

    /// The current index into the quantizer step table.
    #[must_use]
    pub fn step_index(&self) -> u8 {
        self.step_index
    }
}

/// Decode one nibble.
///
/// # Arguments
///
/// * 'nibble' - 4bit unsigned int data
/// * 'predictor' - last reconstructed value [-128~127]
/// * 'step_index' - index into STEP_SIZE_TABLE [0~88]
///
/// # Returns
///
/// * 'predictor' - The new reconstructed value [-128~127]
/// * 'step_index' - The new index into STEP_SIZE_TABLE [0~88]
fn decode_sample(nibble: u4, predictor: i8, step_index: u8) -> (i8, u8) {
    let step = STEP_SIZE_TABLE[step_index as usize] as i32;
    let n = nibble.value();

    // diff = (nibble + 1/2) * step / 4, through shifts and adds
    let mut diff = step >> 3;
    if (n & 1) == 1 {
        diff += step >> 2;
    }
    if (n & 2) == 2 {
        diff += step >> 1;
    }
    if (n & 4) == 4 {
        diff += step;
    }

    // sign bit
    if (n & 8) == 8 {
        diff = -diff;
    }

    let predictor = (predictor as i32 + diff).clamp(i8::MIN as i32, i8::MAX as i32) as i8;
    (predictor, compute_step_index(nibble, step_index))
}

/// Adapt the step index to the nibble just decoded.
fn compute_step_index(nibble: u4, step_index: u8) -> u8 {
    let adjusted = step_index as i16 + INDEX_TABLE[nibble.value() as usize] as i16;
    adjusted.clamp(0, MAX_STEP_INDEX as i16) as u8
}

/// An encoded byte split into its (high, low) nibbles.
type PackedNibbles = (u8, u8);

/// Split one encoded byte into nibbles.
fn parse_packed_byte(input: &mut &[u8]) -> ModalResult<PackedNibbles> {
    bits::<_, _, ErrMode<ContextError>, _, _>((take(4usize), take(4usize))).parse_next(input)
}

/// Reading position inside an encoded buffer, at nibble granularity.
///
/// Yields the low nibble of each byte before its high nibble. The cursor does not own the
/// buffer, so a playhead can be parked between any two nibbles and picked up later.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NibbleCursor {
    offset: usize,
    high: Option<u4>,
}

impl NibbleCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes already split.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Next nibble of `data`, or `None` once every nibble has been read.
    pub fn next_nibble(&mut self, data: &[u8]) -> Option<u4> {
        if let Some(high) = self.high.take() {
            return Some(high);
        }

        let mut input = data.get(self.offset..)?;
        let (high, low) = parse_packed_byte(&mut input).ok()?;
        self.offset += 1;
        self.high = Some(u4::new(high));
        Some(u4::new(low))
    }
}

/// Stateful KAAS decoder.
#[derive(Debug, Default, Clone)]
pub struct Decoder {
    state: DecoderState,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current predictor and step index.
    #[must_use]
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Back to `{ predictor: 0, step_index: 0 }`.
    pub fn reset(&mut self) {
        self.state = DecoderState::default();
    }

    /// Decode one nibble and return the rebiased sample [0~255].
    pub fn decode_nibble(&mut self, nibble: u4) -> u8 {
        let (predictor, step_index) =
            decode_sample(nibble, self.state.predictor, self.state.step_index);
        self.state = DecoderState {
            predictor,
            step_index,
        };
        (predictor as i16 + 128) as u8
    }

    /// Decode both nibbles of `byte`, low nibble first.
    pub fn decode_byte(&mut self, byte: u8) -> [u8; 2] {
        let low = self.decode_nibble(u4::new(byte & 0x0F));
        let high = self.decode_nibble(u4::new(byte >> 4));
        [low, high]
    }

    /// Decode a whole buffer, two samples per byte, continuing from the current state.
    pub fn decode_buffer(&mut self, buf: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(buf.len() * 2);
        let mut cursor = NibbleCursor::new();
        while let Some(nibble) = cursor.next_nibble(buf) {
            out.push(self.decode_nibble(nibble));
        }
        out
    }

    /// Decode a whole buffer into fixed-capacity storage.
    ///
    /// # Errors
    ///
    /// * `DecodeError::OutputCapacity` - `N` cannot hold two samples per byte. The decoder state is left untouched.
    pub fn decode_bounded<const N: usize>(
        &mut self,
        buf: &[u8],
    ) -> Result<heapless::Vec<u8, N>, DecodeError> {
        let needed = buf.len() * 2;
        if needed > N {
            return Err(DecodeError::OutputCapacity {
                needed,
                capacity: N,
            });
        }

        let mut out = heapless::Vec::new();
        let mut cursor = NibbleCursor::new();
        while let Some(nibble) = cursor.next_nibble(buf) {
            out.push(self.decode_nibble(nibble))
                .map_err(|_| DecodeError::OutputCapacity {
                    needed,
                    capacity: N,
                })?;
        }
        Ok(out)
    }
}

/// Convert a rebiased 8-bit sample into signed Q1.15.
#[must_use]
pub fn pcm_to_q15(sample: u8) -> I1F15 {
    I1F15::from_bits((sample as i16 - 128) << 8)
}
