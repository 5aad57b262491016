use std::fmt;

use ndarray::{s, Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::time::{quanta, rational_gcd, Axis, Nature, Rational};
use crate::{Error, Result};

pub const SILENT: u8 = 0;
pub const SUSTAIN: u8 = 1;
pub const ONSET: u8 = 2;

/// Subkind of a grid, where resampling and rendering differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollKind {
    /// Notes on an absolute pitch axis.
    #[default]
    Plain,
    /// Notes folded into one octave of pitch classes.
    Chroma,
    /// Boolean onset table: each set cell is an instant, never held.
    Activation,
}

/// Half-open index ranges on both axes, counted in quanta from the rational zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent {
    pub frequency: (i64, i64),
    pub time: (i64, i64),
}

impl Extent {
    pub fn new(frequency: (i64, i64), time: (i64, i64)) -> Self {
        Self { frequency, time }
    }

    pub fn is_empty(&self) -> bool {
        self.frequency.1 <= self.frequency.0 || self.time.1 <= self.time.0
    }

    /// Smallest extent containing both. An empty side is ignored.
    pub fn union(&self, other: &Extent) -> Extent {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Extent {
            frequency: (
                self.frequency.0.min(other.frequency.0),
                self.frequency.1.max(other.frequency.1),
            ),
            time: (self.time.0.min(other.time.0), self.time.1.max(other.time.1)),
        }
    }

    pub fn contains(&self, frequency: i64, time: i64) -> bool {
        (self.frequency.0..self.frequency.1).contains(&frequency)
            && (self.time.0..self.time.1).contains(&time)
    }

    fn shape(&self) -> (usize, usize) {
        (
            (self.frequency.1 - self.frequency.0).max(0) as usize,
            (self.time.1 - self.time.0).max(0) as usize,
        )
    }

    fn origin(&self) -> (i64, i64) {
        (-self.frequency.0, -self.time.0)
    }
}

/// Dense frequency × time grid located in rational coordinates.
///
/// Array cell `(i, j)` sits at frequency `(i - origin.0) · step` and time
/// `(j - origin.1) · tatum`. Coordinates taken or returned by methods are
/// those integer quanta counts, not array indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PianoRoll {
    array: Array2<u8>,
    origin: (i64, i64),
    tatum: Rational,
    step: Rational,
    time_nature: Option<Nature>,
    frequency_nature: Option<Nature>,
    kind: RollKind,
}

impl PianoRoll {
    /// A grid with no cells.
    pub fn empty(tatum: Rational, step: Rational) -> Self {
        Self {
            array: Array2::<u8>::zeros((0, 0)),
            origin: (0, 0),
            tatum,
            step,
            time_nature: None,
            frequency_nature: None,
            kind: RollKind::Plain,
        }
    }

    /// Wrap an existing array whose `(0, 0)` coordinate sits at index `origin`.
    pub fn from_array(array: Array2<u8>, origin: (i64, i64), tatum: Rational, step: Rational) -> Self {
        Self {
            array,
            origin,
            tatum,
            step,
            time_nature: None,
            frequency_nature: None,
            kind: RollKind::Plain,
        }
    }

    /// Build the tightest grid holding `(frequency, time, value)` cells.
    /// Repeated coordinates keep the largest value.
    pub fn from_cells<I>(cells: I, tatum: Rational, step: Rational) -> Self
    where
        I: IntoIterator<Item = (i64, i64, u8)>,
    {
        let cells: Vec<(i64, i64, u8)> = cells.into_iter().filter(|c| c.2 > SILENT).collect();
        if cells.is_empty() {
            return Self::empty(tatum, step);
        }

        let mut extent = Extent::new((i64::MAX, i64::MIN), (i64::MAX, i64::MIN));
        for &(f, t, _) in &cells {
            extent.frequency.0 = extent.frequency.0.min(f);
            extent.frequency.1 = extent.frequency.1.max(f + 1);
            extent.time.0 = extent.time.0.min(t);
            extent.time.1 = extent.time.1.max(t + 1);
        }

        let mut array = Array2::<u8>::zeros(extent.shape());
        for (f, t, v) in cells {
            let cell = &mut array[[(f - extent.frequency.0) as usize, (t - extent.time.0) as usize]];
            *cell = (*cell).max(v);
        }

        Self::from_array(array, extent.origin(), tatum, step)
    }

    pub fn with_natures(mut self, time: Option<Nature>, frequency: Option<Nature>) -> Self {
        self.time_nature = time;
        self.frequency_nature = frequency;
        self
    }

    pub fn with_kind(mut self, kind: RollKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn array(&self) -> &Array2<u8> {
        &self.array
    }

    pub fn origin(&self) -> (i64, i64) {
        self.origin
    }

    pub fn tatum(&self) -> Rational {
        self.tatum
    }

    pub fn step(&self) -> Rational {
        self.step
    }

    pub fn time_nature(&self) -> Option<Nature> {
        self.time_nature
    }

    pub fn frequency_nature(&self) -> Option<Nature> {
        self.frequency_nature
    }

    pub fn kind(&self) -> RollKind {
        self.kind
    }

    pub fn extent(&self) -> Extent {
        let (rows, cols) = self.array.dim();
        Extent::new(
            (-self.origin.0, rows as i64 - self.origin.0),
            (-self.origin.1, cols as i64 - self.origin.1),
        )
    }

    /// True when no cell is set.
    pub fn is_empty(&self) -> bool {
        self.array.iter().all(|&v| v == SILENT)
    }

    /// Value at a coordinate; silent outside the grid.
    pub fn get(&self, frequency: i64, time: i64) -> u8 {
        let i = frequency + self.origin.0;
        let j = time + self.origin.1;
        if i < 0 || j < 0 {
            return SILENT;
        }
        self.array
            .get([i as usize, j as usize])
            .copied()
            .unwrap_or(SILENT)
    }

    /// Every set cell as `(frequency, time, value)` coordinates, ordered by frequency then time.
    pub fn active_cells(&self) -> impl Iterator<Item = (i64, i64, u8)> + '_ {
        let origin = self.origin;
        self.array
            .indexed_iter()
            .filter(|(_, v)| **v > SILENT)
            .map(move |((i, j), &v)| (i as i64 - origin.0, j as i64 - origin.1, v))
    }

    pub fn time_at(&self, time: i64) -> Rational {
        self.tatum * time
    }

    pub fn frequency_at(&self, frequency: i64) -> Rational {
        self.step * frequency
    }

    /// Re-quantize time to `tatum`, which must divide or be a multiple of the
    /// current tatum.
    ///
    /// Refining holds notes (an onset continues as sustain) except for
    /// activation tables, which are zero-filled. Coarsening keeps the largest
    /// value of each block, so an onset dominates a sustain.
    pub fn change_tatum(&self, tatum: Rational) -> Result<PianoRoll> {
        if tatum == self.tatum {
            return Ok(self.clone());
        }

        let refine = self.tatum / tatum;
        if refine.is_integer() && *refine.numer() > 0 {
            return Ok(self.upsample(refine.to_integer(), tatum));
        }

        let coarsen = tatum / self.tatum;
        if coarsen.is_integer() && *coarsen.numer() > 0 {
            return Ok(self.downsample(coarsen.to_integer(), tatum));
        }

        Err(Error::NonIntegerRatio {
            from: self.tatum,
            to: tatum,
        })
    }

    fn upsample(&self, factor: i64, tatum: Rational) -> PianoRoll {
        let (rows, cols) = self.array.dim();
        let k = factor as usize;
        let hold = self.kind != RollKind::Activation;
        let mut array = Array2::<u8>::zeros((rows, cols * k));

        for ((i, j), &v) in self.array.indexed_iter() {
            if v == SILENT {
                continue;
            }
            array[[i, j * k]] = v;
            if hold {
                for offset in 1..k {
                    array[[i, j * k + offset]] = SUSTAIN;
                }
            }
        }

        PianoRoll {
            array,
            origin: (self.origin.0, self.origin.1 * factor),
            tatum,
            ..self.clone()
        }
    }

    fn downsample(&self, factor: i64, tatum: Rational) -> PianoRoll {
        let extent = self.extent();
        let start = extent.time.0.div_euclid(factor);
        let end = (extent.time.1 + factor - 1).div_euclid(factor);
        let coarse = Extent::new(extent.frequency, (start, end.max(start)));

        let mut array = Array2::<u8>::zeros(coarse.shape());
        for (f, t, v) in self.active_cells() {
            let cell = &mut array[[
                (f - coarse.frequency.0) as usize,
                (t.div_euclid(factor) - start) as usize,
            ]];
            *cell = (*cell).max(v);
        }

        PianoRoll {
            array,
            origin: coarse.origin(),
            tatum,
            ..self.clone()
        }
    }

    /// Pad with silence or crop to exactly `extent`.
    pub fn change_extension(&self, extent: Extent) -> PianoRoll {
        let mut array = Array2::<u8>::zeros(extent.shape());
        for (f, t, v) in self.active_cells() {
            if extent.contains(f, t) {
                array[[(f - extent.frequency.0) as usize, (t - extent.time.0) as usize]] = v;
            }
        }

        PianoRoll {
            array,
            origin: extent.origin(),
            ..self.clone()
        }
    }

    /// Strip silent leading and trailing rows and columns.
    pub fn reduce(&self) -> PianoRoll {
        let mut bounds: Option<(usize, usize, usize, usize)> = None;
        for ((i, j), &v) in self.array.indexed_iter() {
            if v == SILENT {
                continue;
            }
            bounds = Some(match bounds {
                None => (i, i, j, j),
                Some((i0, i1, j0, j1)) => (i0.min(i), i1.max(i), j0.min(j), j1.max(j)),
            });
        }

        let Some((i0, i1, j0, j1)) = bounds else {
            return PianoRoll {
                array: Array2::<u8>::zeros((0, 0)),
                origin: (0, 0),
                ..self.clone()
            };
        };

        PianoRoll {
            array: self.array.slice(s![i0..=i1, j0..=j1]).to_owned(),
            origin: (self.origin.0 - i0 as i64, self.origin.1 - j0 as i64),
            ..self.clone()
        }
    }

    /// Least upper bound of two grids.
    ///
    /// Both sides are resampled to the rational gcd of their tatums, extended
    /// to the union of their extents and merged cell by cell with `max`.
    /// Silent grids are identities. Steps must agree; natures unify with an
    /// unset nature absorbed.
    pub fn supremum(&self, other: &PianoRoll) -> Result<PianoRoll> {
        if other.is_empty() {
            return Ok(self.clone());
        }
        if self.is_empty() {
            return Ok(other.clone());
        }
        if self.step != other.step {
            return Err(Error::UnsupportedStep {
                left: self.step,
                right: other.step,
            });
        }

        let time_nature = Nature::unify(self.time_nature, other.time_nature, Axis::Time)?;
        let frequency_nature =
            Nature::unify(self.frequency_nature, other.frequency_nature, Axis::Frequency)?;

        let tatum = rational_gcd(self.tatum, other.tatum);
        let left = self.change_tatum(tatum)?;
        let right = other.change_tatum(tatum)?;

        let extent = left.extent().union(&right.extent());
        let mut array = left.change_extension(extent).array;
        let right = right.change_extension(extent);
        Zip::from(&mut array)
            .and(&right.array)
            .for_each(|a, &b| *a = (*a).max(b));

        let kind = if self.kind == other.kind {
            self.kind
        } else {
            RollKind::Plain
        };

        Ok(PianoRoll {
            array,
            origin: extent.origin(),
            tatum,
            step: self.step,
            time_nature,
            frequency_nature,
            kind,
        })
    }

    /// True when every cell of `self` is at most the matching cell of `other`,
    /// compared at the gcd of both tatums.
    pub fn is_dominated_by(&self, other: &PianoRoll) -> Result<bool> {
        if self.is_empty() {
            return Ok(true);
        }
        if self.step != other.step {
            return Err(Error::UnsupportedStep {
                left: self.step,
                right: other.step,
            });
        }
        let tatum = rational_gcd(self.tatum, other.tatum);
        let lower = self.change_tatum(tatum)?;
        let upper = other.change_tatum(tatum)?;
        let dominated = lower.active_cells().all(|(f, t, v)| upper.get(f, t) >= v);
        Ok(dominated)
    }

    /// Fold pitches into a single octave of `12 / step` pitch-class rows.
    pub fn to_chroma(&self) -> Result<PianoRoll> {
        let octave = quanta(Rational::from_integer(12), self.step)?;
        let extent = self.extent();
        let chroma = Extent::new((0, octave), extent.time);

        let mut array = Array2::<u8>::zeros(chroma.shape());
        for (f, t, v) in self.active_cells() {
            let cell = &mut array[[f.rem_euclid(octave) as usize, (t - extent.time.0) as usize]];
            *cell = (*cell).max(v);
        }

        Ok(PianoRoll {
            array,
            origin: chroma.origin(),
            kind: RollKind::Chroma,
            ..self.clone()
        })
    }
}

/// ASCII rendering, highest frequency on top: `#` onset, `=` sustain, `.` rest.
/// Activation tables print `x` for set cells.
impl fmt::Display for PianoRoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let extent = self.extent();
        for frequency in (extent.frequency.0..extent.frequency.1).rev() {
            write!(f, "{:>6} ", self.frequency_at(frequency).to_string())?;
            for time in extent.time.0..extent.time.1 {
                let glyph = match (self.kind, self.get(frequency, time)) {
                    (_, SILENT) => '.',
                    (RollKind::Activation, _) => 'x',
                    (_, SUSTAIN) => '=',
                    _ => '#',
                };
                write!(f, "{glyph}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
