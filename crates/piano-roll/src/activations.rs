use serde::{Deserialize, Serialize};

use crate::roll::{Extent, PianoRoll, RollKind};
use crate::time::{quanta, FrequencyPoint, Nature, Rational, TimePoint};
use crate::Result;

/// Hypothesized onsets of one voice, stored as a boolean activation table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activations {
    roll: PianoRoll,
}

impl Activations {
    /// Binarize `roll`: every set cell becomes an activation.
    pub fn from_roll(roll: &PianoRoll) -> Self {
        let cells: Vec<_> = roll.active_cells().map(|(f, t, _)| (f, t, 1u8)).collect();
        let roll = PianoRoll::from_cells(cells, roll.tatum(), roll.step())
            .with_natures(roll.time_nature(), roll.frequency_nature())
            .with_kind(RollKind::Activation);
        Self { roll }
    }

    pub fn empty(tatum: Rational, step: Rational) -> Self {
        let roll = PianoRoll::empty(tatum, step)
            .with_natures(Some(Nature::Point), Some(Nature::Point))
            .with_kind(RollKind::Activation);
        Self { roll }
    }

    /// Activations at explicit `(time, frequency)` points, which must fall on
    /// the `tatum` × `step` lattice.
    pub fn from_points(
        points: &[(TimePoint, FrequencyPoint)],
        tatum: Rational,
        step: Rational,
    ) -> Result<Self> {
        let cells = points
            .iter()
            .map(|(t, f)| Ok((quanta(f.value(), step)?, quanta(t.value(), tatum)?, 1u8)))
            .collect::<Result<Vec<_>>>()?;
        let roll = PianoRoll::from_cells(cells, tatum, step)
            .with_natures(Some(Nature::Point), Some(Nature::Point))
            .with_kind(RollKind::Activation);
        Ok(Self { roll })
    }

    /// All activation points, ordered by time then frequency.
    pub fn points(&self) -> Vec<(TimePoint, FrequencyPoint)> {
        let mut points: Vec<_> = self
            .roll
            .active_cells()
            .map(|(f, t, _)| {
                (
                    TimePoint(self.roll.time_at(t)),
                    FrequencyPoint(self.roll.frequency_at(f)),
                )
            })
            .collect();
        points.sort();
        points
    }

    /// Whether the coordinate `(time, frequency)`, in this table's quanta, is set.
    pub fn contains(&self, time: i64, frequency: i64) -> bool {
        self.roll.get(frequency, time) > 0
    }

    pub fn roll(&self) -> &PianoRoll {
        &self.roll
    }

    pub fn tatum(&self) -> Rational {
        self.roll.tatum()
    }

    pub fn step(&self) -> Rational {
        self.roll.step()
    }

    pub fn len(&self) -> usize {
        self.roll.active_cells().count()
    }

    pub fn is_empty(&self) -> bool {
        self.roll.is_empty()
    }

    pub fn change_tatum(&self, tatum: Rational) -> Result<Self> {
        Ok(Self {
            roll: self.roll.change_tatum(tatum)?,
        })
    }

    pub fn change_extension(&self, extent: Extent) -> Self {
        Self {
            roll: self.roll.change_extension(extent),
        }
    }
}

/// One [`Activations`] per texture voice, in voice order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActivationsStack {
    voices: Vec<Activations>,
}

impl ActivationsStack {
    pub fn new(voices: Vec<Activations>) -> Self {
        Self { voices }
    }

    pub fn voices(&self) -> &[Activations] {
        &self.voices
    }

    pub fn voice(&self, index: usize) -> Option<&Activations> {
        self.voices.get(index)
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Activations> {
        self.voices.iter()
    }

    /// Activation count summed over voices.
    pub fn total(&self) -> usize {
        self.voices.iter().map(Activations::len).sum()
    }

    pub fn change_tatum(&self, tatum: Rational) -> Result<Self> {
        let voices = self
            .voices
            .iter()
            .map(|v| v.change_tatum(tatum))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { voices })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn r(numer: i64, denom: i64) -> Rational {
        Rational::new(numer, denom)
    }

    #[test]
    fn points_roundtrip_through_grid() {
        let points = vec![
            (TimePoint::new(3, 2), FrequencyPoint::from_integer(60)),
            (TimePoint::new(1, 1), FrequencyPoint::from_integer(63)),
            (TimePoint::new(1, 1), FrequencyPoint::from_integer(60)),
        ];
        let activations = Activations::from_points(&points, r(1, 2), r(1, 1)).unwrap();

        assert_eq!(activations.len(), 3);
        assert_eq!(activations.roll().kind(), RollKind::Activation);
        assert!(activations.contains(2, 63));
        assert!(!activations.contains(3, 63));
        assert_eq!(
            activations.points(),
            vec![
                (TimePoint::new(1, 1), FrequencyPoint::from_integer(60)),
                (TimePoint::new(1, 1), FrequencyPoint::from_integer(63)),
                (TimePoint::new(3, 2), FrequencyPoint::from_integer(60)),
            ]
        );
    }

    #[test]
    fn off_lattice_points_are_rejected() {
        let points = [(TimePoint::new(1, 3), FrequencyPoint::from_integer(60))];
        assert_eq!(
            Activations::from_points(&points, r(1, 2), r(1, 1)),
            Err(Error::NonIntegerRatio {
                from: r(1, 3),
                to: r(1, 2),
            })
        );
    }

    #[test]
    fn refining_keeps_instants() {
        let points = [(TimePoint::new(1, 1), FrequencyPoint::from_integer(60))];
        let activations = Activations::from_points(&points, r(1, 2), r(1, 1)).unwrap();
        let fine = activations.change_tatum(r(1, 4)).unwrap();
        assert_eq!(fine.len(), 1);
        assert_eq!(fine.points(), activations.points());
    }
}
