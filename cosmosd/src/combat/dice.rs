//! Dice resolution
//!
//! Implements the 2d10 core mechanic:
//! - Normal rolls (2d10)
//! - Advantage (3d10, keep highest 2) and disadvantage (3d10, keep lowest 2)
//! - Success margin and degree of success
//! - Critical (natural 20) and fumble (natural 2) flags

use std::collections::VecDeque;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Sides on the resolution die
pub const DIE_SIDES: u32 = 10;

/// Natural total that counts as a critical success
pub const CRITICAL_SUCCESS: u32 = 20;

/// Natural total that counts as a fumble
pub const CRITICAL_FAILURE: u32 = 2;

/// Default number of rolls kept in a [`RollHistory`]
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// How many dice are drawn and which are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollMode {
    /// 2d10, both kept
    #[default]
    Normal,
    /// 3d10, keep the highest two
    Advantage,
    /// 3d10, keep the lowest two
    Disadvantage,
}

impl RollMode {
    /// Number of dice drawn for this mode
    pub fn dice_count(&self) -> usize {
        match self {
            RollMode::Normal => 2,
            RollMode::Advantage | RollMode::Disadvantage => 3,
        }
    }
}

impl FromStr for RollMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" | "n" => Ok(RollMode::Normal),
            "advantage" | "adv" | "a" => Ok(RollMode::Advantage),
            "disadvantage" | "dis" | "d" => Ok(RollMode::Disadvantage),
            other => Err(format!("unknown roll mode: {}", other)),
        }
    }
}

impl std::fmt::Display for RollMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RollMode::Normal => "normal",
            RollMode::Advantage => "advantage",
            RollMode::Disadvantage => "disadvantage",
        };
        write!(f, "{}", s)
    }
}

/// Qualitative grade of a roll, derived from its margin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuccessDegree {
    /// Margin of 10 or more
    Legendary,
    /// Margin of 6 to 9
    Critical,
    /// Margin of 3 to 5
    Solid,
    /// Margin of 0 to 2
    Marginal,
    /// Margin of -1 to -2
    MarginalFailure,
    /// Margin of -3 to -5
    ClearFailure,
    /// Margin of -6 to -9
    CriticalFailure,
    /// Margin of -10 or less
    Catastrophic,
}

impl SuccessDegree {
    /// Grade a margin (total minus target number)
    pub fn from_margin(margin: i64) -> Self {
        if margin >= 0 {
            match margin {
                m if m >= 10 => SuccessDegree::Legendary,
                m if m >= 6 => SuccessDegree::Critical,
                m if m >= 3 => SuccessDegree::Solid,
                _ => SuccessDegree::Marginal,
            }
        } else {
            match margin {
                m if m <= -10 => SuccessDegree::Catastrophic,
                m if m <= -6 => SuccessDegree::CriticalFailure,
                m if m <= -3 => SuccessDegree::ClearFailure,
                _ => SuccessDegree::MarginalFailure,
            }
        }
    }

    /// Whether this degree is one of the success grades
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            SuccessDegree::Legendary
                | SuccessDegree::Critical
                | SuccessDegree::Solid
                | SuccessDegree::Marginal
        )
    }

    /// Display title, e.g. "Solid Success"
    pub fn title(&self) -> &'static str {
        match self {
            SuccessDegree::Legendary => "Legendary Success",
            SuccessDegree::Critical => "Critical Success",
            SuccessDegree::Solid => "Solid Success",
            SuccessDegree::Marginal => "Marginal Success",
            SuccessDegree::MarginalFailure => "Marginal Failure",
            SuccessDegree::ClearFailure => "Clear Failure",
            SuccessDegree::CriticalFailure => "Critical Failure",
            SuccessDegree::Catastrophic => "Catastrophic Failure",
        }
    }
}

impl std::fmt::Display for SuccessDegree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SuccessDegree::Legendary => "legendary",
            SuccessDegree::Critical => "critical",
            SuccessDegree::Solid => "solid",
            SuccessDegree::Marginal => "marginal",
            SuccessDegree::MarginalFailure => "marginal-failure",
            SuccessDegree::ClearFailure => "clear-failure",
            SuccessDegree::CriticalFailure => "critical-failure",
            SuccessDegree::Catastrophic => "catastrophic",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a single resolution roll
///
/// Built once by [`DiceRollResult::resolve`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiceRollResult {
    /// Every face drawn, in draw order
    pub dice: Vec<u32>,
    /// The two faces that count
    pub kept_dice: Vec<u32>,
    pub modifier: i32,
    /// Sum of the kept dice
    pub natural_total: u32,
    /// Natural total plus modifier, widened so extreme modifiers apply literally
    pub total: i64,
    pub target_number: i32,
    pub success: bool,
    /// Total minus target number
    pub margin: i64,
    pub degree: SuccessDegree,
    pub is_critical: bool,
    pub is_fumble: bool,
    pub mode: RollMode,
    pub rolled_at: DateTime<Utc>,
}

impl DiceRollResult {
    /// Grade a set of already-drawn faces
    ///
    /// `faces` must hold two dice for [`RollMode::Normal`] and three for the
    /// other modes.
    pub fn resolve(faces: &[u32], modifier: i32, target_number: i32, mode: RollMode) -> Self {
        debug_assert_eq!(faces.len(), mode.dice_count());

        let mut sorted = faces.to_vec();
        let kept_dice: Vec<u32> = match mode {
            RollMode::Normal => sorted.iter().take(2).copied().collect(),
            RollMode::Advantage => {
                sorted.sort_unstable_by(|a, b| b.cmp(a));
                sorted.iter().take(2).copied().collect()
            }
            RollMode::Disadvantage => {
                sorted.sort_unstable();
                sorted.iter().take(2).copied().collect()
            }
        };

        let natural_total: u32 = kept_dice.iter().sum();
        let total = i64::from(natural_total) + i64::from(modifier);
        let margin = total - i64::from(target_number);

        Self {
            dice: faces.to_vec(),
            kept_dice,
            modifier,
            natural_total,
            total,
            target_number,
            success: total >= i64::from(target_number),
            margin,
            degree: SuccessDegree::from_margin(margin),
            is_critical: natural_total == CRITICAL_SUCCESS,
            is_fumble: natural_total == CRITICAL_FAILURE,
            mode,
            rolled_at: Utc::now(),
        }
    }
}

impl std::fmt::Display for DiceRollResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kept: Vec<String> = self.kept_dice.iter().map(|d| d.to_string()).collect();
        write!(f, "{}", kept.join("+"))?;
        if self.modifier > 0 {
            write!(f, "+{}", self.modifier)?;
        } else if self.modifier < 0 {
            write!(f, "{}", self.modifier)?;
        }
        write!(
            f,
            " = {} vs TN {} ({:+}) {}",
            self.total,
            self.target_number,
            self.margin,
            self.degree.title()
        )?;
        if self.is_critical {
            write!(f, " Critical!")?;
        }
        if self.is_fumble {
            write!(f, " Fumble!")?;
        }
        Ok(())
    }
}

/// Source of randomness for every roll in a session
///
/// Each session or encounter owns its own engine; seeded engines give
/// reproducible sequences.
#[derive(Debug, Clone)]
pub struct DiceEngine {
    rng: ChaCha8Rng,
}

impl Default for DiceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DiceEngine {
    /// Create an engine seeded from the operating system
    pub fn new() -> Self {
        Self {
            rng: ChaCha8Rng::from_os_rng(),
        }
    }

    /// Create a deterministic engine
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Roll one die with the given number of sides
    pub fn roll_die(&mut self, sides: u32) -> u32 {
        self.rng.random_range(1..=sides.max(1))
    }

    /// Roll `count` dice with the given number of sides
    pub fn roll_many(&mut self, count: u32, sides: u32) -> Vec<u32> {
        (0..count).map(|_| self.roll_die(sides)).collect()
    }

    /// Perform a resolution roll
    pub fn roll(&mut self, modifier: i32, target_number: i32, mode: RollMode) -> DiceRollResult {
        let faces = self.roll_many(mode.dice_count() as u32, DIE_SIDES);
        DiceRollResult::resolve(&faces, modifier, target_number, mode)
    }
}

/// Bounded, newest-first roll history
#[derive(Debug, Clone)]
pub struct RollHistory {
    entries: VecDeque<DiceRollResult>,
    limit: usize,
}

impl Default for RollHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl RollHistory {
    /// Create an empty history holding at most `limit` rolls
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    /// Record a roll, dropping the oldest if full
    pub fn push(&mut self, result: DiceRollResult) {
        self.entries.push_front(result);
        self.entries.truncate(self.limit);
    }

    /// Most recent roll
    pub fn last(&self) -> Option<&DiceRollResult> {
        self.entries.front()
    }

    /// All rolls, newest first
    pub fn entries(&self) -> impl Iterator<Item = &DiceRollResult> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_roll_scenario() {
        let result = DiceRollResult::resolve(&[7, 8], 3, 14, RollMode::Normal);
        assert_eq!(result.kept_dice, vec![7, 8]);
        assert_eq!(result.natural_total, 15);
        assert_eq!(result.total, 18);
        assert!(result.success);
        assert_eq!(result.margin, 4);
        assert_eq!(result.degree, SuccessDegree::Solid);
        assert!(!result.is_critical);
        assert!(!result.is_fumble);
    }

    #[test]
    fn test_advantage_keeps_highest_two() {
        let result = DiceRollResult::resolve(&[2, 9, 6], 0, 11, RollMode::Advantage);
        assert_eq!(result.dice, vec![2, 9, 6]);
        assert_eq!(result.kept_dice, vec![9, 6]);
        assert_eq!(result.natural_total, 15);
        assert_eq!(result.total, 15);
        assert!(result.success);
        assert_eq!(result.margin, 4);
        assert_eq!(result.degree, SuccessDegree::Solid);
    }

    #[test]
    fn test_disadvantage_keeps_lowest_two() {
        let result = DiceRollResult::resolve(&[2, 9, 6], 0, 11, RollMode::Disadvantage);
        assert_eq!(result.kept_dice, vec![2, 6]);
        assert_eq!(result.natural_total, 8);
        assert!(!result.success);
        assert_eq!(result.margin, -3);
        assert_eq!(result.degree, SuccessDegree::ClearFailure);
    }

    #[test]
    fn test_critical_and_fumble() {
        let crit = DiceRollResult::resolve(&[10, 10], -5, 30, RollMode::Normal);
        assert!(crit.is_critical);
        assert!(!crit.success); // flag is about the dice, not the outcome

        let fumble = DiceRollResult::resolve(&[1, 1, 7], 20, 11, RollMode::Disadvantage);
        assert!(fumble.is_fumble);
        assert!(fumble.success);
    }

    #[test]
    fn test_degree_breakpoints() {
        let cases = [
            (15, SuccessDegree::Legendary),
            (10, SuccessDegree::Legendary),
            (9, SuccessDegree::Critical),
            (6, SuccessDegree::Critical),
            (5, SuccessDegree::Solid),
            (3, SuccessDegree::Solid),
            (2, SuccessDegree::Marginal),
            (0, SuccessDegree::Marginal),
            (-1, SuccessDegree::MarginalFailure),
            (-2, SuccessDegree::MarginalFailure),
            (-3, SuccessDegree::ClearFailure),
            (-5, SuccessDegree::ClearFailure),
            (-6, SuccessDegree::CriticalFailure),
            (-9, SuccessDegree::CriticalFailure),
            (-10, SuccessDegree::Catastrophic),
            (-25, SuccessDegree::Catastrophic),
        ];
        for (margin, expected) in cases {
            assert_eq!(SuccessDegree::from_margin(margin), expected, "margin {}", margin);
            assert_eq!(expected.is_success(), margin >= 0);
        }
    }

    #[test]
    fn test_roll_invariants() {
        let mut engine = DiceEngine::seeded(7);
        for i in 0..500 {
            let modifier = (i % 11) - 5;
            let target = 2 + (i % 20);
            let result = engine.roll(modifier, target, RollMode::Normal);
            assert_eq!(result.dice.len(), 2);
            assert!((2..=20).contains(&result.natural_total));
            assert_eq!(result.total, i64::from(result.natural_total) + i64::from(modifier));
            assert_eq!(result.success, result.total >= i64::from(target));
            assert_eq!(result.margin, result.total - i64::from(target));
        }
    }

    #[test]
    fn test_extreme_modifiers_apply_literally() {
        let mut engine = DiceEngine::seeded(1);

        let huge = engine.roll(i32::MAX, 10, RollMode::Normal);
        assert_eq!(huge.total, i64::from(i32::MAX) + i64::from(huge.natural_total));
        assert!(huge.success);
        assert_eq!(huge.degree, SuccessDegree::Legendary);

        let low_bar = engine.roll(0, i32::MIN, RollMode::Advantage);
        assert_eq!(low_bar.margin, low_bar.total - i64::from(i32::MIN));
        assert!(low_bar.success);

        let hopeless = engine.roll(i32::MIN, i32::MAX, RollMode::Disadvantage);
        assert!(!hopeless.success);
        assert_eq!(hopeless.degree, SuccessDegree::Catastrophic);
    }

    #[test]
    fn test_kept_dice_match_mode() {
        let mut engine = DiceEngine::seeded(99);
        for _ in 0..300 {
            let adv = engine.roll(0, 11, RollMode::Advantage);
            let mut sorted = adv.dice.clone();
            sorted.sort_unstable_by(|a, b| b.cmp(a));
            assert_eq!(adv.kept_dice, sorted[..2].to_vec());

            let dis = engine.roll(0, 11, RollMode::Disadvantage);
            let mut sorted = dis.dice.clone();
            sorted.sort_unstable();
            assert_eq!(dis.kept_dice, sorted[..2].to_vec());
        }
    }

    #[test]
    fn test_advantage_dominates_normal_dominates_disadvantage() {
        let mut engine = DiceEngine::seeded(2024);
        let trials = 20_000;
        let mean = |engine: &mut DiceEngine, mode: RollMode| {
            let sum: u64 = (0..trials)
                .map(|_| engine.roll(0, 11, mode).natural_total as u64)
                .sum();
            sum as f64 / trials as f64
        };

        let adv = mean(&mut engine, RollMode::Advantage);
        let normal = mean(&mut engine, RollMode::Normal);
        let dis = mean(&mut engine, RollMode::Disadvantage);

        // Expected values: ~13.5, 11, ~8.5
        assert!(adv > normal + 1.5, "adv {} vs normal {}", adv, normal);
        assert!(normal > dis + 1.5, "normal {} vs dis {}", normal, dis);
    }

    #[test]
    fn test_seeded_engines_repeat() {
        let mut a = DiceEngine::seeded(42);
        let mut b = DiceEngine::seeded(42);
        for _ in 0..20 {
            assert_eq!(a.roll_die(10), b.roll_die(10));
        }
    }

    #[test]
    fn test_roll_mode_parsing() {
        assert_eq!("ADV".parse::<RollMode>(), Ok(RollMode::Advantage));
        assert_eq!("disadvantage".parse::<RollMode>(), Ok(RollMode::Disadvantage));
        assert_eq!("normal".parse::<RollMode>(), Ok(RollMode::Normal));
        assert!("sideways".parse::<RollMode>().is_err());
    }

    #[test]
    fn test_display() {
        let result = DiceRollResult::resolve(&[7, 8], 3, 14, RollMode::Normal);
        assert_eq!(result.to_string(), "7+8+3 = 18 vs TN 14 (+4) Solid Success");

        let result = DiceRollResult::resolve(&[1, 1], -2, 11, RollMode::Normal);
        assert_eq!(
            result.to_string(),
            "1+1-2 = 0 vs TN 11 (-11) Catastrophic Failure Fumble!"
        );
    }

    #[test]
    fn test_history_bounded_newest_first() {
        let mut history = RollHistory::new(3);
        for target in 1..=5 {
            history.push(DiceRollResult::resolve(&[5, 5], 0, target, RollMode::Normal));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.last().unwrap().target_number, 5);
        let targets: Vec<i32> = history.entries().map(|r| r.target_number).collect();
        assert_eq!(targets, vec![5, 4, 3]);

        history.clear();
        assert!(history.is_empty());
        assert!(history.last().is_none());
    }

    #[test]
    fn test_degree_serializes_kebab_case() {
        let json = serde_json::to_string(&SuccessDegree::ClearFailure).unwrap();
        assert_eq!(json, "\"clear-failure\"");
        assert_eq!(SuccessDegree::CriticalFailure.to_string(), "critical-failure");
    }
}
