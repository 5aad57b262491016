//! Declarative scenes: a texture, and the activations that play it.
//!
//! ```toml
//! name = "two-voice"
//!
//! [[voices]]
//! hits = [{ start = "0", duration = "1/2" }]
//!
//! [[activations]]
//! time = "1"
//! pitch = 60
//! chord = [0, 3]
//! ```
//!
//! Times are rationals in whole notes. An activation sounds every voice
//! unless `voices` lists a subset; its chord is given either as semitones
//! (`chord`) or interval names (`intervals`), unison by default.

use std::path::Path;

use anyhow::{Context, Result};
use piano_roll::{
    dilate_stack, rational_gcd_all, Activations, ActivationsStack, Chord, FrequencyPoint, Harmony,
    Hit, PianoRoll, Rational, Rhythm, Texture, TimePoint, TimeShift,
};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub name: Option<String>,
    pub voices: Vec<VoiceSpec>,
    #[serde(default)]
    pub activations: Vec<ActivationSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceSpec {
    pub hits: Vec<HitSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HitSpec {
    pub start: String,
    pub duration: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivationSpec {
    pub time: String,
    pub pitch: i64,
    #[serde(default)]
    pub chord: Option<Vec<i64>>,
    #[serde(default)]
    pub intervals: Option<Vec<String>>,
    #[serde(default)]
    pub voices: Option<Vec<usize>>,
}

fn rational(text: &str) -> Result<Rational> {
    text.trim()
        .parse::<Rational>()
        .map_err(|e| anyhow::anyhow!("'{text}' is not a rational: {e}"))
}

impl ActivationSpec {
    fn chord(&self) -> Result<Chord> {
        match (&self.chord, &self.intervals) {
            (Some(_), Some(_)) => anyhow::bail!("activation at {} gives both chord and intervals", self.time),
            (Some(semitones), None) => Ok(Chord::new(semitones)),
            (None, Some(names)) => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                Ok(Chord::from_intervals(&names)?)
            }
            (None, None) => Ok(Chord::unison()),
        }
    }

    fn sounds(&self, voice: usize) -> bool {
        self.voices.as_ref().map_or(true, |voices| voices.contains(&voice))
    }
}

impl Scene {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scene: {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("failed to parse scene: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let scene: Scene = toml::from_str(contents)?;
        if scene.voices.is_empty() {
            anyhow::bail!("scene has no voices");
        }
        Ok(scene)
    }

    /// Name for checkpoint runs: the declared name, else the file stem.
    pub fn run_name(&self, path: &Path) -> String {
        self.name.clone().unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "scene".to_string())
        })
    }

    /// One unison voice per declared rhythm.
    pub fn texture(&self) -> Result<Texture> {
        let rhythms = self
            .voices
            .iter()
            .enumerate()
            .map(|(i, voice)| {
                let hits = voice
                    .hits
                    .iter()
                    .map(|hit| {
                        Ok(Hit::new(
                            TimeShift(rational(&hit.start)?),
                            TimeShift(rational(&hit.duration)?),
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Rhythm::from_hits(&hits).with_context(|| format!("voice {i}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Texture::from_rhythms(rhythms))
    }

    /// The roll sounded by every activation, each dilated through the
    /// texture harmonized with its chord.
    pub fn roll(&self, texture: &Texture) -> Result<PianoRoll> {
        let step = Rational::from_integer(1);
        let times = self
            .activations
            .iter()
            .map(|a| rational(&a.time))
            .collect::<Result<Vec<_>>>()?;
        let tatum = rational_gcd_all(times.iter().copied().chain([texture.tatum()]))
            .unwrap_or_else(|| texture.tatum());

        let mut roll = PianoRoll::empty(tatum, step);
        for (activation, &time) in self.activations.iter().zip(&times) {
            let point = [(TimePoint(time), FrequencyPoint::from_integer(activation.pitch))];
            let voices = (0..texture.len())
                .map(|voice| {
                    let points: &[_] = if activation.sounds(voice) { &point } else { &[] };
                    Activations::from_points(points, tatum, step)
                })
                .collect::<piano_roll::Result<Vec<_>>>()?;

            let harmonized = texture.harmonize(&Harmony::Uniform(activation.chord()?))?;
            let placed = dilate_stack(&ActivationsStack::new(voices), &harmonized)
                .with_context(|| format!("placing activation at {}", activation.time))?;
            roll = roll.supremum(&placed)?;
        }

        if roll.is_empty() {
            anyhow::bail!("scene sounds no activations");
        }
        Ok(roll)
    }
}
