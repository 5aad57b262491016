//! Erosion and dilation of piano rolls by rhythmic patterns.
//!
//! Dilation places a copy of a pattern at every activation; erosion finds
//! every position where a pattern fits underneath a roll. Erosion returns a
//! superset of any activations whose dilation reproduces the roll, and
//! dilating an erosion never exceeds the eroded roll.

use crate::activations::{Activations, ActivationsStack};
use crate::roll::{PianoRoll, RollKind};
use crate::texture::Texture;
use crate::time::{rational_gcd, Axis, Nature, Rational};
use crate::{Error, Result};

fn check_step(left: Rational, right: Rational) -> Result<()> {
    if left == right {
        Ok(())
    } else {
        Err(Error::UnsupportedStep { left, right })
    }
}

/// Positions `x` where, for every set pattern cell `(d, v)`, `roll[x + d] >= v`.
pub fn erode(roll: &PianoRoll, pattern: &PianoRoll) -> Result<Activations> {
    check_step(roll.step(), pattern.step())?;
    let time_nature = Nature::sub_optional(roll.time_nature(), pattern.time_nature(), Axis::Time)?;
    let frequency_nature = Nature::sub_optional(
        roll.frequency_nature(),
        pattern.frequency_nature(),
        Axis::Frequency,
    )?;

    let tatum = rational_gcd(roll.tatum(), pattern.tatum());
    let roll = roll.change_tatum(tatum)?;
    let pattern = pattern.change_tatum(tatum)?;

    let support: Vec<(i64, i64, u8)> = pattern.active_cells().collect();
    // Anchor candidates on the strongest pattern cell; the roll has to
    // carry at least that value there.
    let Some(&(anchor_f, anchor_t, anchor_v)) = support.iter().max_by_key(|c| c.2) else {
        return Ok(Activations::empty(tatum, roll.step()));
    };

    let cells = roll
        .active_cells()
        .filter(|&(_, _, v)| v >= anchor_v)
        .map(|(f, t, _)| (f - anchor_f, t - anchor_t))
        .filter(|&(f, t)| support.iter().all(|&(df, dt, v)| roll.get(f + df, t + dt) >= v))
        .map(|(f, t)| (f, t, 1u8))
        .collect::<Vec<_>>();

    let activations = PianoRoll::from_cells(cells, tatum, roll.step())
        .with_natures(time_nature, frequency_nature)
        .with_kind(RollKind::Activation);
    Ok(Activations::from_roll(&activations))
}

/// Erode `roll` by every voice pattern of `texture`, in voice order.
pub fn erode_texture(roll: &PianoRoll, texture: &Texture) -> Result<ActivationsStack> {
    let voices = texture
        .patterns()?
        .iter()
        .map(|pattern| erode(roll, pattern))
        .collect::<Result<Vec<_>>>()?;
    Ok(ActivationsStack::new(voices))
}

/// Place `pattern` at every activation, keeping the largest overlapping value.
pub fn dilate(activations: &Activations, pattern: &PianoRoll) -> Result<PianoRoll> {
    let table = activations.roll();
    check_step(table.step(), pattern.step())?;
    let time_nature = Nature::add_optional(table.time_nature(), pattern.time_nature(), Axis::Time)?;
    let frequency_nature = Nature::add_optional(
        table.frequency_nature(),
        pattern.frequency_nature(),
        Axis::Frequency,
    )?;

    let tatum = rational_gcd(table.tatum(), pattern.tatum());
    let table = table.change_tatum(tatum)?;
    let pattern = pattern.change_tatum(tatum)?;

    let support: Vec<(i64, i64, u8)> = pattern.active_cells().collect();
    let cells = table
        .active_cells()
        .flat_map(|(f, t, _)| support.iter().map(move |&(df, dt, v)| (f + df, t + dt, v)))
        .collect::<Vec<_>>();

    Ok(PianoRoll::from_cells(cells, tatum, table.step())
        .with_natures(time_nature, frequency_nature))
}

/// Supremum of each voice's activations dilated by its pattern.
pub fn dilate_stack(stack: &ActivationsStack, texture: &Texture) -> Result<PianoRoll> {
    if stack.len() != texture.len() {
        return Err(Error::UnknownCorrespondence(format!(
            "{} activation tables for {} voices",
            stack.len(),
            texture.len()
        )));
    }

    let step = stack
        .voice(0)
        .map(Activations::step)
        .unwrap_or_else(|| Rational::from_integer(1));
    let patterns = texture.patterns()?;
    stack
        .iter()
        .zip(&patterns)
        .try_fold(PianoRoll::empty(texture.tatum(), step), |acc, (voice, pattern)| {
            acc.supremum(&dilate(voice, pattern)?)
        })
}
