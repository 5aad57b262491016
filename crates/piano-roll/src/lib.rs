//! Piano roll algebra over rational time and frequency.
//!
//! A [`PianoRoll`] is a dense frequency × time grid of small integers
//! (0 silent, 1 sustain, 2 onset) located in rational coordinates by an
//! origin, a time quantum (tatum) and a frequency quantum (step).
//! Grids combine by [`PianoRoll::supremum`], trim with [`PianoRoll::reduce`]
//! and interact with rhythmic patterns through [`erode`] and [`dilate`].
//!
//! # Example
//!
//! ```
//! use piano_roll::{dilate_stack, erode_texture, Activations, ActivationsStack,
//!                  FrequencyPoint, Hit, Rational, Rhythm, Texture, TimePoint};
//!
//! let texture = Texture::from_rhythms(vec![
//!     Rhythm::from_hits(&[Hit::from_literal((0, 1), (1, 2))]).unwrap(),
//!     Rhythm::from_hits(&[Hit::from_literal((1, 4), (1, 4))]).unwrap(),
//! ]);
//! let point = [(TimePoint::new(1, 1), FrequencyPoint::from_integer(60))];
//! let step = Rational::from_integer(1);
//! let voice = Activations::from_points(&point, texture.tatum(), step).unwrap();
//! let stack = ActivationsStack::new(vec![voice.clone(), voice]);
//!
//! let roll = dilate_stack(&stack, &texture).unwrap();
//! let eroded = erode_texture(&roll, &texture).unwrap();
//! assert_eq!(eroded.len(), 2);
//! ```

pub mod activations;
pub mod morphology;
pub mod roll;
pub mod texture;
pub mod time;

pub use activations::{Activations, ActivationsStack};
pub use morphology::{dilate, dilate_stack, erode, erode_texture};
pub use roll::{Extent, PianoRoll, RollKind, ONSET, SILENT, SUSTAIN};
pub use texture::{Chord, Harmony, Hit, Rhythm, Texture, Voice};
pub use time::{
    rational_gcd, rational_gcd_all, Axis, FrequencyPoint, FrequencyShift, Nature, Rational,
    TimePoint, TimeShift,
};

/// Errors from piano roll construction and algebra.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("cannot combine {axis} {left} with {right}")]
    MixedNature {
        axis: Axis,
        left: Nature,
        right: Nature,
    },

    #[error("quantum {from} is neither a multiple nor a divisor of {to}")]
    NonIntegerRatio { from: Rational, to: Rational },

    #[error("frequency steps {left} and {right} differ")]
    UnsupportedStep { left: Rational, right: Rational },

    #[error("unknown correspondence: {0}")]
    UnknownCorrespondence(String),

    #[error("invalid hit: {0}")]
    InvalidHit(String),
}

pub type Result<T> = std::result::Result<T, Error>;
