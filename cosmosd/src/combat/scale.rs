//! Combat scales
//!
//! Four power tiers with damage multipliers 1, 10, 100 and 1000. Damage
//! crossing tiers is scaled by the ratio of the two multipliers, so small
//! weapons barely scratch capital ships and capital guns obliterate people.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A power tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    #[default]
    Personal,
    Vehicle,
    Starship,
    Capital,
}

/// Reference data for a scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScaleInfo {
    pub scale: Scale,
    pub multiplier: u32,
    pub typical_damage: (u32, u32),
    pub typical_hp: (u32, u32),
    pub examples: &'static [&'static str],
}

impl Scale {
    /// All scales, smallest first
    pub fn all() -> &'static [Scale] {
        &[Scale::Personal, Scale::Vehicle, Scale::Starship, Scale::Capital]
    }

    /// Damage multiplier of this tier
    pub fn multiplier(&self) -> u32 {
        match self {
            Scale::Personal => 1,
            Scale::Vehicle => 10,
            Scale::Starship => 100,
            Scale::Capital => 1000,
        }
    }

    /// Reference ranges and examples
    pub fn info(&self) -> ScaleInfo {
        let (typical_damage, typical_hp, examples): ((u32, u32), (u32, u32), &'static [&'static str]) =
            match self {
                Scale::Personal => ((1, 20), (10, 200), &["Humans", "Robots", "Small creatures"]),
                Scale::Vehicle => ((10, 200), (20, 500), &["Cars", "Motorcycles", "Small mechs"]),
                Scale::Starship => (
                    (100, 2000),
                    (100, 5000),
                    &["Fighters", "Transports", "Corvettes"],
                ),
                Scale::Capital => (
                    (1000, 20000),
                    (1000, 50000),
                    &["Cruisers", "Carriers", "Stations"],
                ),
            };

        ScaleInfo {
            scale: *self,
            multiplier: self.multiplier(),
            typical_damage,
            typical_hp,
            examples,
        }
    }

    /// Guess a scale from a free-form entity description
    pub fn suggest(entity_type: &str) -> Scale {
        const KEYWORDS: &[(&str, Scale)] = &[
            ("person", Scale::Personal),
            ("human", Scale::Personal),
            ("robot", Scale::Personal),
            ("car", Scale::Vehicle),
            ("tank", Scale::Vehicle),
            ("mech", Scale::Vehicle),
            ("fighter", Scale::Starship),
            ("shuttle", Scale::Starship),
            ("transport", Scale::Starship),
            ("cruiser", Scale::Capital),
            ("battleship", Scale::Capital),
            ("station", Scale::Capital),
        ];

        let lowered = entity_type.to_lowercase();
        KEYWORDS
            .iter()
            .find(|(keyword, _)| lowered.contains(keyword))
            .map(|(_, scale)| *scale)
            .unwrap_or_default()
    }
}

impl FromStr for Scale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "personal" => Ok(Scale::Personal),
            "vehicle" => Ok(Scale::Vehicle),
            "starship" => Ok(Scale::Starship),
            "capital" => Ok(Scale::Capital),
            other => Err(format!("unknown scale: {}", other)),
        }
    }
}

impl std::fmt::Display for Scale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Scale::Personal => "Personal",
            Scale::Vehicle => "Vehicle",
            Scale::Starship => "Starship",
            Scale::Capital => "Capital",
        };
        write!(f, "{}", s)
    }
}

/// Multiplier applied to damage going from one scale to another
pub fn ratio(from: Scale, to: Scale) -> f64 {
    if from == to {
        return 1.0;
    }
    from.multiplier() as f64 / to.multiplier() as f64
}

/// Convert a damage amount between scales, rounded to one decimal place
pub fn convert(amount: f64, from: Scale, to: Scale) -> f64 {
    if from == to {
        return amount;
    }
    (amount * ratio(from, to) * 10.0).round() / 10.0
}

/// How dramatic a cross-scale hit is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleEffect {
    Apocalyptic,
    Catastrophic,
    Devastating,
    Normal,
    Minimal,
    Reduced,
    Negligible,
}

impl ScaleEffect {
    /// Classify a conversion ratio
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 100.0 {
            ScaleEffect::Apocalyptic
        } else if ratio >= 10.0 {
            ScaleEffect::Catastrophic
        } else if ratio > 1.0 {
            ScaleEffect::Devastating
        } else if ratio <= 0.01 {
            ScaleEffect::Negligible
        } else if ratio <= 0.1 {
            ScaleEffect::Reduced
        } else if ratio < 1.0 {
            ScaleEffect::Minimal
        } else {
            ScaleEffect::Normal
        }
    }
}

impl std::fmt::Display for ScaleEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScaleEffect::Apocalyptic => "apocalyptic",
            ScaleEffect::Catastrophic => "catastrophic",
            ScaleEffect::Devastating => "devastating",
            ScaleEffect::Normal => "normal",
            ScaleEffect::Minimal => "minimal",
            ScaleEffect::Reduced => "reduced",
            ScaleEffect::Negligible => "negligible",
        };
        write!(f, "{}", s)
    }
}

/// A conversion together with its ratio and effect label
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Conversion {
    pub original: f64,
    pub scaled: f64,
    pub from: Scale,
    pub to: Scale,
    pub ratio: f64,
    pub effect: ScaleEffect,
}

impl Conversion {
    pub fn new(amount: f64, from: Scale, to: Scale) -> Self {
        let ratio = ratio(from, to);
        Self {
            original: amount,
            scaled: convert(amount, from, to),
            from,
            to,
            ratio,
            effect: ScaleEffect::from_ratio(ratio),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipliers_ordered() {
        let multipliers: Vec<u32> = Scale::all().iter().map(|s| s.multiplier()).collect();
        assert_eq!(multipliers, vec![1, 10, 100, 1000]);
        assert!(Scale::Personal < Scale::Vehicle);
        assert!(Scale::Starship < Scale::Capital);
    }

    #[test]
    fn test_convert_examples() {
        assert_eq!(convert(100.0, Scale::Personal, Scale::Starship), 1.0);
        assert_eq!(convert(1.0, Scale::Starship, Scale::Personal), 100.0);
        assert_eq!(convert(10.0, Scale::Personal, Scale::Starship), 0.1);
        assert_eq!(convert(20.0, Scale::Vehicle, Scale::Personal), 200.0);
        assert_eq!(convert(100.0, Scale::Starship, Scale::Capital), 10.0);
        assert_eq!(convert(1000.0, Scale::Capital, Scale::Vehicle), 100000.0);
    }

    #[test]
    fn test_convert_rounds_to_one_decimal() {
        assert_eq!(convert(7.0, Scale::Personal, Scale::Starship), 0.1); // 0.07
        assert_eq!(convert(4.0, Scale::Personal, Scale::Starship), 0.0); // 0.04
        assert_eq!(convert(15.0, Scale::Personal, Scale::Vehicle), 1.5);
    }

    #[test]
    fn test_identity_is_exact() {
        for scale in Scale::all() {
            for amount in [0.0, 0.33333, 1.0, 12.345, 99999.9] {
                assert_eq!(convert(amount, *scale, *scale), amount);
            }
        }
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        for a in Scale::all() {
            for b in Scale::all() {
                for amount in [0.0, 1.0, 10.0, 150.0, 1000.0, 25000.0] {
                    let there = convert(amount, *a, *b);
                    let back = convert(there, *b, *a);
                    // Downscaling rounds to 0.1 before scaling back up
                    let tolerance = 0.05 * ratio(*b, *a).max(1.0) + 1e-9;
                    assert!(
                        (back - amount).abs() <= tolerance,
                        "{} {}->{}->{} gave {}",
                        amount,
                        a,
                        b,
                        a,
                        back
                    );
                }
            }
        }
    }

    #[test]
    fn test_effect_labels() {
        assert_eq!(ScaleEffect::from_ratio(1000.0), ScaleEffect::Apocalyptic);
        assert_eq!(ScaleEffect::from_ratio(100.0), ScaleEffect::Apocalyptic);
        assert_eq!(ScaleEffect::from_ratio(10.0), ScaleEffect::Catastrophic);
        assert_eq!(ScaleEffect::from_ratio(1.0), ScaleEffect::Normal);
        assert_eq!(ScaleEffect::from_ratio(0.1), ScaleEffect::Reduced);
        assert_eq!(ScaleEffect::from_ratio(0.01), ScaleEffect::Negligible);
        assert_eq!(ScaleEffect::from_ratio(0.001), ScaleEffect::Negligible);
    }

    #[test]
    fn test_conversion_record() {
        let conversion = Conversion::new(10.0, Scale::Personal, Scale::Starship);
        assert_eq!(conversion.scaled, 0.1);
        assert_eq!(conversion.ratio, 0.01);
        assert_eq!(conversion.effect, ScaleEffect::Negligible);
    }

    #[test]
    fn test_suggest() {
        assert_eq!(Scale::suggest("Human soldier"), Scale::Personal);
        assert_eq!(Scale::suggest("Heavy TANK"), Scale::Vehicle);
        assert_eq!(Scale::suggest("star fighter"), Scale::Starship);
        assert_eq!(Scale::suggest("Battleship"), Scale::Capital);
        assert_eq!(Scale::suggest("space station"), Scale::Capital);
        assert_eq!(Scale::suggest("amoeba"), Scale::Personal);
    }

    #[test]
    fn test_scale_parsing() {
        assert_eq!("starship".parse::<Scale>(), Ok(Scale::Starship));
        assert_eq!(" CAPITAL ".parse::<Scale>(), Ok(Scale::Capital));
        assert!("planetary".parse::<Scale>().is_err());
        assert_eq!(Scale::Vehicle.to_string(), "Vehicle");
    }

    #[test]
    fn test_info() {
        let info = Scale::Starship.info();
        assert_eq!(info.multiplier, 100);
        assert_eq!(info.typical_damage, (100, 2000));
        assert!(info.examples.contains(&"Corvettes"));
    }
}
