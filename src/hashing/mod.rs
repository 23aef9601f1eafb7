//! Perceptual hash engine.
//!
//! Turns raw image bytes into a 64-bit difference hash ([`Fingerprint`]) or an
//! explicit [`DecodeError`]. A failed decode never produces a fingerprint, so
//! a legitimate all-zero hash is never confused with "could not hash".
//!
//! # Algorithm
//!
//! ```text
//! bytes ──decode──▶ greyscale ──Lanczos3──▶ 8×8 grid ──serpentine walk──▶ u64
//!
//!   row 0: ──────────▶        bit = cell >= previous cell
//!   row 1: ◀──────────        seed = cell (x=0, y=7)
//!   row 2: ──────────▶        first visited cell is the MSB
//!   ...
//! ```
//!
//! The traversal order is part of the corpus schema: fingerprints produced by
//! different orders are not comparable. [`HASH_VERSION`] identifies the order
//! implemented here.
//!
//! # Example
//!
//! ```rust
//! use reposentry::hashing::{Fingerprint, similarity};
//!
//! let a = Fingerprint::new(0xFFFF_FFFF_FFFF_FFFF);
//! let b = Fingerprint::new(0xFFFF_FFFF_FFFF_FF00); // 8 bits differ
//! assert_eq!(similarity(a, b), 87);
//! assert_eq!(similarity(a, a), 100);
//! ```

mod dhash;
mod fingerprint;

pub use dhash::{DEFAULT_MAX_MEDIA_BYTES, DecodeError, DifferenceHasher, GRID_SIZE, HASH_VERSION};
pub use fingerprint::{Fingerprint, similarity};
