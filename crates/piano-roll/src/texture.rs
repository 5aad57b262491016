//! Declarative builders for rhythmic and harmonic patterns.
//!
//! A [`Rhythm`] is a one-row pattern over time built from [`Hit`]s; a
//! [`Voice`] pairs a rhythm with a [`Chord`] of pitch shifts; a [`Texture`]
//! is the ordered list of voices whose patterns erosion and dilation use.

use serde::{Deserialize, Serialize};

use crate::roll::{PianoRoll, ONSET, SUSTAIN};
use crate::time::{quanta, rational_gcd_all, FrequencyShift, Nature, Rational, TimeShift};
use crate::{Error, Result};

/// One struck note of a rhythm: onset at `start`, held for `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    pub start: TimeShift,
    pub duration: TimeShift,
}

impl Hit {
    pub fn new(start: TimeShift, duration: TimeShift) -> Self {
        Self { start, duration }
    }

    /// From `(numer, denom)` literals.
    pub fn from_literal(start: (i64, i64), duration: (i64, i64)) -> Self {
        Self::new(
            TimeShift::new(start.0, start.1),
            TimeShift::new(duration.0, duration.1),
        )
    }
}

/// A rhythmic pattern on a single frequency row at shift zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rhythm {
    roll: PianoRoll,
}

impl Rhythm {
    /// Build at the coarsest tatum dividing every start and duration.
    pub fn from_hits(hits: &[Hit]) -> Result<Self> {
        let tatum = rational_gcd_all(
            hits.iter()
                .flat_map(|h| [h.start.value(), h.duration.value()]),
        )
        .ok_or_else(|| Error::InvalidHit("a rhythm needs at least one hit".into()))?;
        Self::from_hits_with_tatum(hits, tatum)
    }

    pub fn from_hits_with_tatum(hits: &[Hit], tatum: Rational) -> Result<Self> {
        if *tatum.numer() <= 0 {
            return Err(Error::InvalidHit(format!("tatum {tatum} is not positive")));
        }

        let mut cells = Vec::new();
        for hit in hits {
            if *hit.duration.value().numer() <= 0 {
                return Err(Error::InvalidHit(format!(
                    "hit at {} has non-positive duration {}",
                    hit.start, hit.duration
                )));
            }
            if *hit.start.value().numer() < 0 {
                return Err(Error::InvalidHit(format!("hit starts before zero at {}", hit.start)));
            }
            let start = quanta(hit.start.value(), tatum)?;
            let length = quanta(hit.duration.value(), tatum)?;
            cells.push((0, start, ONSET));
            cells.extend((start + 1..start + length).map(|t| (0, t, SUSTAIN)));
        }

        let roll = PianoRoll::from_cells(cells, tatum, Rational::from_integer(1))
            .with_natures(Some(Nature::Shift), Some(Nature::Shift));
        Ok(Self { roll })
    }

    pub fn roll(&self) -> &PianoRoll {
        &self.roll
    }

    pub fn tatum(&self) -> Rational {
        self.roll.tatum()
    }

    /// Time from zero to the end of the last hit.
    pub fn length(&self) -> TimeShift {
        TimeShift(self.roll.time_at(self.roll.extent().time.1))
    }
}

/// Pitch shifts sounded together by one voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chord {
    shifts: Vec<FrequencyShift>,
}

impl Chord {
    pub fn new(semitones: &[i64]) -> Self {
        let mut shifts: Vec<_> = semitones.iter().map(|&s| FrequencyShift::from_integer(s)).collect();
        shifts.sort();
        shifts.dedup();
        Self { shifts }
    }

    pub fn unison() -> Self {
        Self::new(&[0])
    }

    /// From interval names: `P1 m2 M2 m3 M3 P4 TT P5 m6 M6 m7 M7 P8`.
    pub fn from_intervals(names: &[&str]) -> Result<Self> {
        let semitones = names
            .iter()
            .map(|name| {
                interval_semitones(name).ok_or_else(|| {
                    Error::UnknownCorrespondence(format!("chord factor '{name}' has no interval"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(&semitones))
    }

    pub fn shifts(&self) -> &[FrequencyShift] {
        &self.shifts
    }
}

fn interval_semitones(name: &str) -> Option<i64> {
    let semitones = match name {
        "P1" => 0,
        "m2" => 1,
        "M2" => 2,
        "m3" => 3,
        "M3" => 4,
        "P4" => 5,
        "TT" => 6,
        "P5" => 7,
        "m6" => 8,
        "M6" => 9,
        "m7" => 10,
        "M7" => 11,
        "P8" => 12,
        _ => return None,
    };
    Some(semitones)
}

/// Chords assigned to the voices of a texture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Harmony {
    /// The same chord for every voice.
    Uniform(Chord),
    /// One chord per voice, in voice order.
    PerVoice(Vec<Chord>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub rhythm: Rhythm,
    pub chord: Chord,
}

impl Voice {
    /// The rhythm stacked on every shift of the chord.
    pub fn pattern(&self) -> Result<PianoRoll> {
        let roll = self.rhythm.roll();
        let cells = self
            .chord
            .shifts()
            .iter()
            .map(|shift| quanta(shift.value(), roll.step()))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flat_map(move |df| roll.active_cells().map(move |(_, t, v)| (df, t, v)))
            .collect::<Vec<_>>();
        Ok(PianoRoll::from_cells(cells, roll.tatum(), roll.step())
            .with_natures(Some(Nature::Shift), Some(Nature::Shift)))
    }
}

/// Ordered collection of voices.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Texture {
    voices: Vec<Voice>,
}

impl Texture {
    pub fn new(voices: Vec<Voice>) -> Self {
        Self { voices }
    }

    /// Every rhythm at unison.
    pub fn from_rhythms(rhythms: Vec<Rhythm>) -> Self {
        let voices = rhythms
            .into_iter()
            .map(|rhythm| Voice {
                rhythm,
                chord: Chord::unison(),
            })
            .collect();
        Self { voices }
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Replace every voice's chord according to `harmony`.
    pub fn harmonize(&self, harmony: &Harmony) -> Result<Texture> {
        let chords: Vec<Chord> = match harmony {
            Harmony::Uniform(chord) => vec![chord.clone(); self.voices.len()],
            Harmony::PerVoice(chords) if chords.len() == self.voices.len() => chords.clone(),
            Harmony::PerVoice(chords) => {
                return Err(Error::UnknownCorrespondence(format!(
                    "{} chords for {} voices",
                    chords.len(),
                    self.voices.len()
                )))
            }
        };

        let voices = self
            .voices
            .iter()
            .zip(chords)
            .map(|(voice, chord)| Voice {
                rhythm: voice.rhythm.clone(),
                chord,
            })
            .collect();
        Ok(Texture { voices })
    }

    /// Per-voice patterns, each at its own tatum.
    pub fn patterns(&self) -> Result<Vec<PianoRoll>> {
        self.voices.iter().map(Voice::pattern).collect()
    }

    /// Per-voice patterns resampled to a common `tatum`.
    pub fn patterns_at(&self, tatum: Rational) -> Result<Vec<PianoRoll>> {
        self.voices
            .iter()
            .map(|voice| voice.pattern()?.change_tatum(tatum))
            .collect()
    }

    /// Coarsest tatum every voice can be expressed in.
    pub fn tatum(&self) -> Rational {
        rational_gcd_all(self.voices.iter().map(|v| v.rhythm.tatum()))
            .unwrap_or_else(|| Rational::from_integer(1))
    }

    /// End of the longest voice.
    pub fn length(&self) -> TimeShift {
        self.voices
            .iter()
            .map(|v| v.rhythm.length())
            .max()
            .unwrap_or_else(TimeShift::zero)
    }

    /// Latest time offset sounded by any voice with the patterns resampled
    /// to `tatum`: an onset at `t` has finished claiming cells once the scan
    /// passes `t + scope_lag`. Held notes reach into finer cells.
    pub fn scope_lag(&self, tatum: Rational) -> Result<TimeShift> {
        let latest = self
            .patterns_at(tatum)?
            .iter()
            .flat_map(|p| p.active_cells().map(|(_, t, _)| t).collect::<Vec<_>>())
            .max()
            .unwrap_or(0);
        Ok(TimeShift(tatum * latest))
    }

    /// Most voices sounding at the same time offset.
    pub fn max_simultaneous_voices(&self) -> Result<usize> {
        let tatum = self.tatum();
        let patterns = self.patterns_at(tatum)?;
        let mut counts = std::collections::BTreeMap::<i64, usize>::new();
        for pattern in &patterns {
            let mut times: Vec<i64> = pattern.active_cells().map(|(_, t, _)| t).collect();
            times.sort_unstable();
            times.dedup();
            for t in times {
                *counts.entry(t).or_default() += 1;
            }
        }
        Ok(counts.into_values().max().unwrap_or(0))
    }
}
