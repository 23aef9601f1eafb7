//! Difference hash over an 8×8 greyscale grid.

use super::Fingerprint;
use image::DynamicImage;
use image::imageops::FilterType;
use thiserror::Error;
use tracing::instrument;

/// Version of the traversal order implemented by [`DifferenceHasher`].
///
/// Fingerprints from different versions are not comparable. There is no
/// migration path; a corpus built under another version must be rebuilt.
pub const HASH_VERSION: u32 = 1;

/// Width and height of the sampled grid.
pub const GRID_SIZE: u32 = 8;

/// Largest media payload accepted by default (bytes).
pub const DEFAULT_MAX_MEDIA_BYTES: usize = 89_478_485;

const GRID: usize = GRID_SIZE as usize;

/// Why a payload could not be hashed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The payload was empty.
    #[error("empty payload")]
    Empty,

    /// The payload exceeds the configured size limit.
    #[error("payload of {size} bytes exceeds limit of {limit} bytes")]
    Oversized {
        /// Payload size in bytes.
        size: usize,
        /// Configured limit in bytes.
        limit: usize,
    },

    /// The payload is not a recognisable image format.
    #[error("not an image")]
    NotAnImage,

    /// The image format is recognised but not supported.
    #[error("unsupported image format: {0}")]
    Unsupported(String),

    /// The image data is truncated or malformed.
    #[error("corrupt image: {0}")]
    Corrupt(String),
}

impl From<image::ImageError> for DecodeError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Unsupported(e) => Self::Unsupported(e.to_string()),
            other => Self::Corrupt(other.to_string()),
        }
    }
}

/// Computes [`Fingerprint`]s from encoded image bytes.
///
/// Stateless apart from the payload limit; safe to share across threads.
#[derive(Debug, Clone, Copy)]
pub struct DifferenceHasher {
    max_bytes: usize,
}

impl Default for DifferenceHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl DifferenceHasher {
    /// Creates a hasher with the default payload limit.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_MEDIA_BYTES,
        }
    }

    /// Sets the largest payload accepted.
    #[must_use]
    pub const fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Returns the payload limit.
    #[must_use]
    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Decodes `bytes` and computes its fingerprint.
    ///
    /// Deterministic: identical bytes always give the identical fingerprint.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the payload is empty, too large, not an
    /// image, or fails to decode.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub fn hash_bytes(&self, bytes: &[u8]) -> Result<Fingerprint, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(DecodeError::Oversized {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }

        let format = image::guess_format(bytes).map_err(|_| DecodeError::NotAnImage)?;
        let image = image::load_from_memory_with_format(bytes, format)?;
        Ok(Self::hash_image(&image))
    }

    /// Computes the fingerprint of an already decoded image.
    #[must_use]
    pub fn hash_image(image: &DynamicImage) -> Fingerprint {
        let small = image
            .grayscale()
            .resize_exact(GRID_SIZE, GRID_SIZE, FilterType::Lanczos3)
            .to_luma8();

        let mut grid = [[0u8; GRID]; GRID];
        for (x, y, pixel) in small.enumerate_pixels() {
            grid[y as usize][x as usize] = pixel.0[0];
        }
        Self::hash_grid(&grid)
    }

    /// Computes the fingerprint of a sampled grid, indexed `grid[y][x]`.
    ///
    /// Even rows are walked left to right, odd rows right to left. Each
    /// visited cell contributes one bit, `cell >= previous`, with the
    /// previous cell seeded from `(x = 0, y = 7)`.
    #[must_use]
    pub fn hash_grid(grid: &[[u8; GRID]; GRID]) -> Fingerprint {
        let mut previous = grid[GRID - 1][0];
        let mut hash = 0u64;

        for (y, row) in grid.iter().enumerate() {
            let cells: Box<dyn Iterator<Item = &u8>> = if y % 2 == 0 {
                Box::new(row.iter())
            } else {
                Box::new(row.iter().rev())
            };
            for &cell in cells {
                hash = (hash << 1) | u64::from(cell >= previous);
                previous = cell;
            }
        }

        Fingerprint::new(hash)
    }
}
