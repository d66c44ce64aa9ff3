//! Mode-ratio presets for common instruments.

use serde::Serialize;

/// Target ratios of the tuned modes to the fundamental.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TuningPreset {
    pub name: &'static str,
    pub ratios: &'static [f64],
    pub description: &'static str,
    pub instrument: &'static str,
}

const fn preset(
    name: &'static str,
    ratios: &'static [f64],
    description: &'static str,
    instrument: &'static str,
) -> TuningPreset {
    TuningPreset { name, ratios, description, instrument }
}

pub const TUNING_PRESETS: &[TuningPreset] = &[
    preset("1:2.76:5.40", &[1.0, 2.756, 5.404], "Natural uniform bar frequencies (no tuning needed)", "Uniform Bar"),
    preset("1:4:10", &[1.0, 4.0, 10.0], "Standard marimba tuning (triple tuning)", "Marimba"),
    preset("1:4:9", &[1.0, 4.0, 9.0], "Alternative marimba/vibraphone tuning", "Vibraphone"),
    preset("1:3:6", &[1.0, 3.0, 6.0], "Xylophone tuning", "Xylophone"),
    preset("1:3:6:12", &[1.0, 3.0, 6.0, 12.0], "Extended harmonic series (quadruple tuning)", "Custom"),
    preset("1:2:4:8", &[1.0, 2.0, 4.0, 8.0], "Octave series (demanding)", "Custom"),
    preset("1:2:4:8:16", &[1.0, 2.0, 4.0, 8.0, 16.0], "Extended octave series (5 modes)", "Custom"),
    preset("1:5:10:15", &[1.0, 5.0, 10.0, 15.0], "Unorthodox quintal tuning", "Custom"),
    preset("1:2:5:10", &[1.0, 2.0, 5.0, 10.0], "Mixed interval tuning", "Custom"),
    preset("1:3:5:7:9", &[1.0, 3.0, 5.0, 7.0, 9.0], "Odd harmonic series", "Custom"),
];

/// beta_n L of the first free-free bending modes of a uniform bar.
pub const UNIFORM_BAR_BETAS: [f64; 5] = [4.730041, 7.853205, 10.995608, 14.137165, 17.278760];

pub fn get_preset(name: &str) -> Option<&'static TuningPreset> {
    TUNING_PRESETS.iter().find(|p| p.name == name)
}

/// Target frequencies for a fundamental in Hz.
///
/// ```
/// use undercut_fem::presets::{get_preset, preset_target_frequencies};
///
/// let marimba = get_preset("1:4:10").unwrap();
/// assert_eq!(preset_target_frequencies(220.0, marimba.ratios), vec![220.0, 880.0, 2200.0]);
/// ```
pub fn preset_target_frequencies(fundamental: f64, ratios: &[f64]) -> Vec<f64> {
    ratios.iter().map(|r| r * fundamental).collect()
}

/// Frequency ratios of an untuned uniform bar, `(beta_n / beta_1)^2`.
pub fn uniform_bar_ratios() -> [f64; 5] {
    UNIFORM_BAR_BETAS.map(|b| (b / UNIFORM_BAR_BETAS[0]).powi(2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name() {
        let vib = get_preset("1:4:9").unwrap();
        assert_eq!(vib.instrument, "Vibraphone");
        assert!(get_preset("1:1").is_none());
    }

    #[test]
    fn presets_start_at_the_fundamental() {
        for p in TUNING_PRESETS {
            assert_eq!(p.ratios[0], 1.0, "{}", p.name);
            assert!(p.ratios.windows(2).all(|w| w[0] < w[1]), "{}", p.name);
        }
    }

    #[test]
    fn uniform_preset_matches_beam_theory() {
        let ratios = uniform_bar_ratios();
        let preset = get_preset("1:2.76:5.40").unwrap();
        for (r, p) in ratios.iter().zip(preset.ratios) {
            assert!((r - p).abs() < 1e-3, "{r} vs {p}");
        }
    }
}
