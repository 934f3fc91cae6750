//! Above-ground organs (leaves, stems, stolons), each made of four tissue
//! pools: emerging, developing, mature and dead.

use crate::error::{PastureError, Result};
use crate::params::EPSILON;
use crate::tissue::TissuePool;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const EMERGING: usize = 0;
pub const MATURE: usize = 2;
pub const DEAD: usize = 3;

/// Event that triggers a biomass removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BiomassRemovalType {
    Harvest,
    Graze,
    Cut,
}

impl FromStr for BiomassRemovalType {
    type Err = PastureError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "harvest" => Ok(Self::Harvest),
            "graze" => Ok(Self::Graze),
            "cut" => Ok(Self::Cut),
            _ => Err(PastureError::UnknownRemovalType(s.to_string())),
        }
    }
}

impl fmt::Display for BiomassRemovalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Harvest => "Harvest",
            Self::Graze => "Graze",
            Self::Cut => "Cut",
        };
        write!(f, "{}", name)
    }
}

/// Fractions of live and dead material taken off an organ, either removed
/// from the system or sent to the surface as residue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganBiomassRemoval {
    pub fraction_live_to_remove: f64,
    pub fraction_dead_to_remove: f64,
    pub fraction_live_to_residue: f64,
    pub fraction_dead_to_residue: f64,
}

impl OrganBiomassRemoval {
    pub fn new(live_to_remove: f64, dead_to_remove: f64) -> Self {
        OrganBiomassRemoval {
            fraction_live_to_remove: live_to_remove,
            fraction_dead_to_remove: dead_to_remove,
            ..Default::default()
        }
    }

    pub fn live_total(&self) -> f64 {
        (self.fraction_live_to_remove + self.fraction_live_to_residue).clamp(0.0, 1.0)
    }

    pub fn dead_total(&self) -> f64 {
        (self.fraction_dead_to_remove + self.fraction_dead_to_residue).clamp(0.0, 1.0)
    }

    pub(crate) fn live_residue_share(&self) -> f64 {
        share(self.fraction_live_to_residue, self.fraction_live_to_remove + self.fraction_live_to_residue)
    }

    pub(crate) fn dead_residue_share(&self) -> f64 {
        share(self.fraction_dead_to_residue, self.fraction_dead_to_remove + self.fraction_dead_to_residue)
    }
}

fn share(part: f64, whole: f64) -> f64 {
    if whole > 0.0 { (part / whole).clamp(0.0, 1.0) } else { 0.0 }
}

/// User supplied removal fractions, by organ name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemovalFractions {
    organs: HashMap<String, OrganBiomassRemoval>,
}

impl RemovalFractions {
    pub fn new() -> Self {
        RemovalFractions::default()
    }

    pub fn with_organ(mut self, organ: &str, fractions: OrganBiomassRemoval) -> Self {
        self.set_fractions_for_organ(organ, fractions);
        self
    }

    pub fn set_fractions_for_organ(&mut self, organ: &str, fractions: OrganBiomassRemoval) {
        self.organs.insert(organ.to_lowercase(), fractions);
    }

    pub fn get_fractions_for_organ(&self, organ: &str) -> Option<&OrganBiomassRemoval> {
        self.organs.get(&organ.to_lowercase())
    }
}

/// DM and N taken off an organ, split into what leaves the system and what
/// goes to surface residue.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RemovedMaterial {
    pub dm_removed: f64,
    pub n_removed: f64,
    pub dm_to_residue: f64,
    pub n_to_residue: f64,
}

impl RemovedMaterial {
    pub fn dm_total(&self) -> f64 {
        self.dm_removed + self.dm_to_residue
    }

    pub fn n_total(&self) -> f64 {
        self.n_removed + self.n_to_residue
    }

    pub fn add(&mut self, other: &RemovedMaterial) {
        self.dm_removed += other.dm_removed;
        self.n_removed += other.n_removed;
        self.dm_to_residue += other.dm_to_residue;
        self.n_to_residue += other.n_to_residue;
    }
}

#[derive(Debug, Clone)]
pub struct AboveGroundOrgan {
    pub name: String,
    pub tissues: [TissuePool; 4],
    pub n_conc_optimum: f64,
    pub n_conc_minimum: f64,
    pub n_conc_maximum: f64,
    pub minimum_live_dm: f64,   // [kg/ha]
    pub fraction_standing: f64, // [0-1]
    removal_defaults: HashMap<BiomassRemovalType, OrganBiomassRemoval>,
}

impl AboveGroundOrgan {
    /// `n_thresholds` is [optimum, minimum, maximum].
    pub fn new(name: &str, n_thresholds: [f64; 3]) -> Self {
        AboveGroundOrgan {
            name: name.to_string(),
            tissues: Default::default(),
            n_conc_optimum: n_thresholds[0],
            n_conc_minimum: n_thresholds[1],
            n_conc_maximum: n_thresholds[2],
            minimum_live_dm: 0.0,
            fraction_standing: 1.0,
            removal_defaults: HashMap::new(),
        }
    }

    pub fn dm_live(&self) -> f64 {
        self.tissues[..DEAD].iter().map(|t| t.dm).sum()
    }

    pub fn dm_dead(&self) -> f64 {
        self.tissues[DEAD].dm
    }

    pub fn dm_total(&self) -> f64 {
        self.dm_live() + self.dm_dead()
    }

    pub fn n_live(&self) -> f64 {
        self.tissues[..DEAD].iter().map(|t| t.n).sum()
    }

    pub fn n_dead(&self) -> f64 {
        self.tissues[DEAD].n
    }

    pub fn n_total(&self) -> f64 {
        self.n_live() + self.n_dead()
    }

    pub fn n_conc_live(&self) -> f64 {
        ratio(self.n_live(), self.dm_live())
    }

    pub fn n_conc_dead(&self) -> f64 {
        ratio(self.n_dead(), self.dm_dead())
    }

    pub fn n_conc_total(&self) -> f64 {
        ratio(self.n_total(), self.dm_total())
    }

    /// Live DM above the minimum, scaled by the standing fraction.
    pub fn dm_live_harvestable(&self) -> f64 {
        (self.dm_live() - self.minimum_live_dm).max(0.0) * self.fraction_standing
    }

    pub fn dm_dead_harvestable(&self) -> f64 {
        self.dm_dead() * self.fraction_standing
    }

    pub fn dm_detached(&self) -> f64 {
        self.tissues[DEAD].dm_transferred_out
    }

    pub fn n_detached(&self) -> f64 {
        self.tissues[DEAD].n_transferred_out
    }

    pub fn n_luxury_remobilisable(&self) -> f64 {
        self.tissues[..DEAD].iter().map(|t| t.n_remobilisable).sum()
    }

    pub fn n_senesced_remobilisable(&self) -> f64 {
        self.tissues[DEAD].n_remobilisable
    }

    pub fn n_remobilised(&self) -> f64 {
        self.tissues.iter().map(|t| t.n_remobilised).sum()
    }

    pub fn digestibility_live(&self) -> f64 {
        let weighted: f64 = self.tissues[..DEAD].iter().map(|t| t.digestibility() * t.dm).sum();
        ratio(weighted, self.dm_live())
    }

    pub fn digestibility_dead(&self) -> f64 {
        self.tissues[DEAD].digestibility()
    }

    pub fn digestibility_total(&self) -> f64 {
        let weighted = self.digestibility_live() * self.dm_live() + self.digestibility_dead() * self.dm_dead();
        ratio(weighted, self.dm_total())
    }

    pub fn set_tissue_parameters(&mut self, luxury_fractions: &[f64; 3], cell_wall: &[f64; 4], protein: f64, sugar_new_growth: f64) {
        for (t, tissue) in self.tissues.iter_mut().enumerate() {
            tissue.fraction_n_luxury_remobilisable = if t < DEAD { luxury_fractions[t] } else { 0.0 };
            tissue.digestibility_cell_wall = cell_wall[t];
            tissue.digestibility_protein = protein;
            tissue.fraction_sugar_new_growth = 0.0;
        }
        self.tissues[EMERGING].fraction_sugar_new_growth = sugar_new_growth;
    }

    /// Sets DM per tissue; N at optimum for live tissues and minimum for dead.
    pub fn set_state(&mut self, dm: [f64; 4], dead_at_optimum: bool) {
        for (t, tissue) in self.tissues.iter_mut().enumerate() {
            tissue.dm = dm[t];
            let n_conc = if t == DEAD && !dead_at_optimum { self.n_conc_minimum } else { self.n_conc_optimum };
            tissue.set_n_conc(n_conc);
        }
    }

    pub fn set_removal_fractions(&mut self, removal_type: BiomassRemovalType, fractions: OrganBiomassRemoval) {
        self.removal_defaults.insert(removal_type, fractions);
    }

    pub fn removal_fractions(&self, removal_type: BiomassRemovalType) -> Option<&OrganBiomassRemoval> {
        self.removal_defaults.get(&removal_type)
    }

    pub fn do_clean_transfer_amounts(&mut self) {
        for tissue in self.tissues.iter_mut() {
            tissue.clean_transfers();
        }
    }

    /// Moves tissue forward one age class at the given rates; the dead
    /// pool rate is the detachment rate.
    pub fn do_tissue_turnover(&mut self, rates: [f64; 4]) {
        for t in 0..DEAD {
            let (dm, n, _) = self.tissues[t].transfer_out(rates[t].clamp(0.0, 1.0));
            self.tissues[t + 1].receive(dm, n, None);
        }
        self.tissues[DEAD].transfer_out(rates[DEAD].clamp(0.0, 1.0));
        self.evaluate_remobilisable_n();
    }

    pub fn evaluate_remobilisable_n(&mut self) {
        let (n_opt, n_min) = (self.n_conc_optimum, self.n_conc_minimum);
        for tissue in self.tissues[..DEAD].iter_mut() {
            tissue.evaluate_luxury_n(n_opt);
        }
        self.tissues[DEAD].evaluate_senesced_n(n_min);
    }

    /// New growth goes into the emerging tissue.
    pub fn add_new_growth(&mut self, dm: f64, n: f64) {
        self.tissues[EMERGING].receive(dm, n, None);
    }

    /// Applies the day's transfers and checks the organ mass balance.
    pub fn do_organ_update(&mut self) -> Result<()> {
        let pre_dm = self.dm_total();
        let pre_n = self.n_total();
        let growth_dm = self.tissues[EMERGING].dm_transferred_in;
        let growth_n = self.tissues[EMERGING].n_transferred_in;
        let detached_dm = self.dm_detached();
        let detached_n = self.n_detached();
        let remobilised_n = self.n_remobilised();

        for tissue in self.tissues.iter_mut() {
            tissue.update();
        }

        let dm_diff = pre_dm + growth_dm - detached_dm - self.dm_total();
        if dm_diff.abs() > EPSILON {
            return Err(PastureError::mass_balance(
                format!("growth and tissue turnover of {}", self.name),
                "DM",
                dm_diff,
            ));
        }
        let n_diff = pre_n + growth_n - remobilised_n - detached_n - self.n_total();
        if n_diff.abs() > EPSILON {
            return Err(PastureError::mass_balance(
                format!("growth and tissue turnover of {}", self.name),
                "N",
                n_diff,
            ));
        }
        Ok(())
    }

    /// Moves a fraction of every live tissue into the dead pool.
    pub fn do_kill_organ(&mut self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        let (mut dm_killed, mut n_killed) = (0.0, 0.0);
        for tissue in self.tissues[..DEAD].iter_mut() {
            dm_killed += tissue.dm * fraction;
            n_killed += tissue.n * fraction;
            tissue.scale(1.0 - fraction);
        }
        self.tissues[DEAD].dm += dm_killed;
        self.tissues[DEAD].n += n_killed;
    }

    pub fn do_reset_organ(&mut self) {
        for tissue in self.tissues.iter_mut() {
            tissue.reset();
        }
    }

    /// Removes given amounts of live and dead DM, proportionally from each
    /// tissue. Returns the N removed.
    pub fn remove_dm_amounts(&mut self, live_dm: f64, dead_dm: f64) -> f64 {
        let pre_n = self.n_total();
        let remaining_live = 1.0 - ratio(live_dm, self.dm_live());
        for tissue in self.tissues[..DEAD].iter_mut() {
            tissue.scale(remaining_live);
        }
        let remaining_dead = 1.0 - ratio(dead_dm, self.dm_dead());
        self.tissues[DEAD].scale(remaining_dead);
        pre_n - self.n_total()
    }

    /// Removes fractions of the harvestable live and dead material.
    pub fn remove_biomass(&mut self, fractions: &OrganBiomassRemoval) -> RemovedMaterial {
        let live_dm = self.dm_live_harvestable() * fractions.live_total();
        let dead_dm = self.dm_dead_harvestable() * fractions.dead_total();
        let live_n = live_dm * self.n_conc_live();
        let dead_n = dead_dm * self.n_conc_dead();
        let n_taken = self.remove_dm_amounts(live_dm, dead_dm);

        let live_residue = fractions.live_residue_share();
        let dead_residue = fractions.dead_residue_share();
        let dm_to_residue = live_dm * live_residue + dead_dm * dead_residue;
        let n_to_residue = live_n * live_residue + dead_n * dead_residue;
        RemovedMaterial {
            dm_removed: live_dm + dead_dm - dm_to_residue,
            n_removed: n_taken - n_to_residue,
            dm_to_residue,
            n_to_residue,
        }
    }
}

pub(crate) fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 { numerator / denominator } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn leaves() -> AboveGroundOrgan {
        let mut organ = AboveGroundOrgan::new("Leaves", [0.04, 0.012, 0.05]);
        organ.set_tissue_parameters(&[0.1, 0.1, 0.1], &[0.6, 0.6, 0.6, 0.2], 1.0, 0.5);
        organ.set_state([300.0, 500.0, 500.0, 100.0], false);
        organ.minimum_live_dm = 80.0;
        organ
    }

    #[test]
    fn turnover_conserves_mass() {
        let mut organ = leaves();
        let pre = organ.dm_total();
        organ.do_tissue_turnover([0.1, 0.05, 0.05, 0.08]);
        organ.add_new_growth(30.0, 1.2);
        organ.do_organ_update().unwrap();
        assert_relative_eq!(organ.dm_total(), pre + 30.0 - 8.0, epsilon = 1e-9);
        assert_relative_eq!(organ.tissues[EMERGING].dm, 300.0 * 0.9 + 30.0, epsilon = 1e-9);
        assert_relative_eq!(organ.tissues[DEAD].dm, 100.0 * 0.92 + 25.0, epsilon = 1e-9);
    }

    #[test]
    fn senesced_n_goes_into_dead_pool() {
        let mut organ = leaves();
        organ.do_tissue_turnover([0.0, 0.0, 0.1, 0.0]);
        // 50 kg at 4% moves to dead, N above 1.2% is remobilisable
        assert_relative_eq!(organ.n_senesced_remobilisable(), 50.0 * (0.04 - 0.012), epsilon = 1e-12);
        assert_eq!(organ.n_luxury_remobilisable(), 0.0);
    }

    #[test]
    fn kill_moves_live_into_dead() {
        let mut organ = leaves();
        let (pre_dm, pre_n) = (organ.dm_total(), organ.n_total());
        organ.do_kill_organ(0.5);
        assert_relative_eq!(organ.dm_live(), 650.0);
        assert_relative_eq!(organ.dm_dead(), 750.0);
        assert_relative_eq!(organ.dm_total(), pre_dm);
        assert_relative_eq!(organ.n_total(), pre_n);
    }

    #[test]
    fn removal_respects_minimum_live_dm_and_residue_split() {
        let mut organ = leaves();
        let fractions = OrganBiomassRemoval {
            fraction_live_to_remove: 0.75,
            fraction_live_to_residue: 0.25,
            fraction_dead_to_remove: 0.5,
            fraction_dead_to_residue: 0.0,
        };
        let removed = organ.remove_biomass(&fractions);
        assert_relative_eq!(organ.dm_live(), 80.0, epsilon = 1e-9);
        assert_relative_eq!(removed.dm_total(), 1220.0 + 50.0, epsilon = 1e-9);
        assert_relative_eq!(removed.dm_to_residue, 305.0, epsilon = 1e-9);
        assert!(removed.n_removed > 0.0);
    }

    #[test]
    fn removal_type_parses_case_insensitively() {
        assert_eq!("graze".parse::<BiomassRemovalType>().unwrap(), BiomassRemovalType::Graze);
        assert!(matches!(
            "burn".parse::<BiomassRemovalType>(),
            Err(PastureError::UnknownRemovalType(_))
        ));
        let user = RemovalFractions::new().with_organ("Leaves", OrganBiomassRemoval::new(0.3, 0.1));
        assert!(user.get_fractions_for_organ("leaves").is_some());
        assert!(user.get_fractions_for_organ("stems").is_none());
    }
}
