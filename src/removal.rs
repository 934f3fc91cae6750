//! Biomass removal: grazing by amount, removal by organ fractions, canopy
//! reduction, and the removal paths that are not supported.

use crate::capabilities::{CanopyQuery, DamageableOrgan};
use crate::error::{PastureError, Result};
use crate::organ::{BiomassRemovalType, OrganBiomassRemoval, RemovalFractions, RemovedMaterial, ratio};
use crate::params::EPSILON;
use crate::species::PastureSpecies;
use tracing::{info, warn};

const MAX_REMOVAL_ITERATIONS: usize = 1000;

// Harvestable pools, in the order used for removal fractions
const LEAF_LIVE: usize = 0;
const STEM_LIVE: usize = 1;
const STOLON_LIVE: usize = 2;
const LEAF_DEAD: usize = 3;
const STEM_DEAD: usize = 4;

/// How the amount passed to [`PastureSpecies::graze`] is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrazeType {
    /// Remove down to this standing herbage [kg/ha].
    SetResidueAmount,
    /// Remove this much [kg/ha].
    SetRemoveAmount,
}

impl std::str::FromStr for GrazeType {
    type Err = PastureError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "setresidueamount" => Ok(Self::SetResidueAmount),
            "setremoveamount" => Ok(Self::SetRemoveAmount),
            _ => Err(PastureError::UnknownGrazeType(s.to_string())),
        }
    }
}

impl PastureSpecies {
    /// Grazes the sward by amount. Returns the DM removed [kg/ha].
    pub fn graze(&mut self, graze_type: &str, amount: f64) -> Result<f64> {
        let graze_type: GrazeType = graze_type.parse()?;
        let harvestable = self.harvestable_wt();
        if !self.is_alive() || harvestable <= EPSILON {
            warn!(
                species = %self.params.name,
                "could not graze: the plant is not alive or has no harvestable biomass"
            );
            return Ok(0.0);
        }
        let required = match graze_type {
            GrazeType::SetResidueAmount => (self.standing_herbage_wt() - amount).max(0.0),
            GrazeType::SetRemoveAmount => amount.max(0.0),
        };
        self.remove_dm(required.min(harvestable))
    }

    /// Removes an amount of DM [kg/ha] from the harvestable pools, split by
    /// the preferences for green over dead and for leaf over stem.
    pub fn remove_dm(&mut self, amount: f64) -> Result<f64> {
        let harvestable = self.harvestable_pools();
        let total_harvestable: f64 = harvestable.iter().sum();
        let amount = amount.clamp(0.0, total_harvestable);
        if amount <= EPSILON {
            return Ok(0.0);
        }

        let fractions = if amount >= total_harvestable - EPSILON {
            harvestable.map(|h| h / total_harvestable)
        } else {
            self.removal_split(&harvestable, amount)
        };
        let removed_dm = fractions.map(|f| f * amount);

        let digestibility = [
            self.leaves.digestibility_live(),
            self.stems.digestibility_live(),
            self.stolons.digestibility_live(),
            self.leaves.digestibility_dead(),
            self.stems.digestibility_dead(),
        ];
        let defoliated_digestibility =
            removed_dm.iter().zip(digestibility.iter()).map(|(dm, d)| dm * d).sum::<f64>() / amount;

        let pre_dm = self.above_ground_wt();
        let pre_n = self.above_ground_n();
        let mut removed_n = self.leaves.remove_dm_amounts(removed_dm[LEAF_LIVE], removed_dm[LEAF_DEAD]);
        removed_n += self.stems.remove_dm_amounts(removed_dm[STEM_LIVE], removed_dm[STEM_DEAD]);
        removed_n += self.stolons.remove_dm_amounts(removed_dm[STOLON_LIVE], 0.0);

        let removed_total: f64 = removed_dm.iter().sum();
        let dm_diff = pre_dm - removed_total - self.above_ground_wt();
        if dm_diff.abs() > EPSILON {
            return Err(PastureError::mass_balance(
                format!("removal of biomass from {}", self.params.name),
                "DM",
                dm_diff,
            ));
        }
        let n_diff = pre_n - removed_n - self.above_ground_n();
        if n_diff.abs() > EPSILON {
            return Err(PastureError::mass_balance(
                format!("removal of biomass from {}", self.params.name),
                "N",
                n_diff,
            ));
        }

        let fraction_defoliated = ratio(removed_total, total_harvestable);
        self.record_defoliation(removed_total, removed_n, fraction_defoliated, defoliated_digestibility);
        info!(
            species = %self.params.name,
            removed_dm = removed_total,
            removed_n,
            "biomass removed"
        );
        Ok(removed_total)
    }

    fn harvestable_pools(&self) -> [f64; 5] {
        [
            self.leaves.dm_live_harvestable(),
            self.stems.dm_live_harvestable(),
            self.stolons.dm_live_harvestable(),
            self.leaves.dm_dead_harvestable(),
            self.stems.dm_dead_harvestable(),
        ]
    }

    // Fractions of `amount` taken from each pool. Weights are the pool DM
    // times the preferences; a pool that would give more than it has is
    // capped and the rest is shared again among the others.
    fn removal_split(&self, harvestable: &[f64; 5], amount: f64) -> [f64; 5] {
        let pref_green = self.params.preference_for_green_over_dead;
        let pref_leaf = self.params.preference_for_leaf_over_stems;
        let preference = [pref_green * pref_leaf, pref_green, pref_green, pref_leaf, 1.0];
        let weights: Vec<f64> = harvestable.iter().zip(preference.iter()).map(|(h, p)| h * p).collect();
        let limits = harvestable.map(|h| h / amount);

        let mut fractions = [0.0; 5];
        let mut capped = [false; 5];
        let mut iterations = 0;
        loop {
            let assigned: f64 = (0..5).filter(|&i| capped[i]).map(|i| fractions[i]).sum();
            let free_weight: f64 = (0..5).filter(|&i| !capped[i]).map(|i| weights[i]).sum();
            if free_weight <= EPSILON {
                break;
            }
            let mut newly_capped = false;
            for i in 0..5 {
                if capped[i] {
                    continue;
                }
                fractions[i] = (1.0 - assigned) * weights[i] / free_weight;
                if fractions[i] > limits[i] {
                    fractions[i] = limits[i];
                    capped[i] = true;
                    newly_capped = true;
                }
            }
            iterations += 1;
            if !newly_capped || 1.0 - fractions.iter().sum::<f64>() <= EPSILON {
                break;
            }
            if iterations >= MAX_REMOVAL_ITERATIONS {
                warn!(
                    species = %self.params.name,
                    iterations,
                    "iteration limit reached while splitting the removal; removing the best estimate"
                );
                break;
            }
        }
        fractions
    }

    fn record_defoliation(&mut self, dm: f64, n: f64, fraction: f64, digestibility: f64) {
        let previous_dm = self.today.defoliated_dm;
        let today = &mut self.today;
        today.defoliated_digestibility = ratio(
            today.defoliated_digestibility * previous_dm + digestibility * dm,
            previous_dm + dm,
        );
        today.defoliated_dm += dm;
        today.defoliated_n += n;
        today.defoliated_fraction += fraction;
        self.defoliation.record(fraction);
    }

    /// Removes above-ground biomass using the given fractions, or the organ
    /// defaults for this removal type.
    pub fn remove_biomass(&mut self, removal_type: &str, fractions: Option<&RemovalFractions>) -> Result<RemovedMaterial> {
        let removal_type: BiomassRemovalType = removal_type.parse()?;
        let harvestable = self.harvestable_wt();
        let pre_digestibility = [
            self.leaves.digestibility_total(),
            self.stems.digestibility_total(),
            self.stolons.digestibility_total(),
        ];

        let mut organ_fractions = Vec::with_capacity(3);
        for organ in [&self.leaves, &self.stems, &self.stolons] {
            let chosen = fractions
                .and_then(|f| f.get_fractions_for_organ(&organ.name))
                .or_else(|| organ.removal_fractions(removal_type))
                .copied()
                .ok_or_else(|| PastureError::MissingRemovalDefaults {
                    removal_type: removal_type.to_string(),
                    organ: organ.name.clone(),
                })?;
            organ_fractions.push(chosen);
        }

        let mut total = RemovedMaterial::default();
        let mut weighted_digestibility = 0.0;
        for ((organ, chosen), digestibility) in [&mut self.leaves, &mut self.stems, &mut self.stolons]
            .into_iter()
            .zip(organ_fractions.iter())
            .zip(pre_digestibility.iter())
        {
            let removed = organ.remove_biomass(chosen);
            weighted_digestibility += removed.dm_total() * digestibility;
            total.add(&removed);
        }

        let fraction = ratio(total.dm_total(), harvestable);
        let digestibility = ratio(weighted_digestibility, total.dm_total());
        self.record_defoliation(total.dm_total(), total.n_total(), fraction, digestibility);
        info!(
            species = %self.params.name,
            removal_type = %removal_type,
            removed_dm = total.dm_removed,
            residue_dm = total.dm_to_residue,
            "biomass removed by fractions"
        );
        Ok(total)
    }

    /// Harvest with user supplied fractions.
    pub fn harvest(&mut self, fractions: &RemovalFractions) -> Result<RemovedMaterial> {
        self.remove_biomass("Harvest", Some(fractions))
    }

    /// Removes biomass from a single organ, by name.
    pub fn remove_organ_biomass(
        &mut self,
        organ_name: &str,
        removal_type: &str,
        fractions: Option<&OrganBiomassRemoval>,
    ) -> Result<RemovedMaterial> {
        let removal_type: BiomassRemovalType = removal_type.parse()?;
        let key = organ_name.to_lowercase();
        if !matches!(key.as_str(), "leaves" | "stems" | "stolons" | "roots") || self.roots.is_empty() {
            return Err(PastureError::UnknownOrgan(organ_name.to_string()));
        }
        let chosen = match fractions {
            Some(f) => *f,
            None => self.default_fractions(&key, removal_type)?,
        };
        let organ: &mut dyn DamageableOrgan = match key.as_str() {
            "leaves" => &mut self.leaves,
            "stems" => &mut self.stems,
            "stolons" => &mut self.stolons,
            _ => &mut self.roots[0],
        };
        let removed = organ.remove_biomass(&chosen);
        info!(
            species = %self.params.name,
            organ = organ_name,
            removal_type = %removal_type,
            removed_dm = removed.dm_total(),
            "biomass removed from organ"
        );
        Ok(removed)
    }

    // Defaults registered on an above-ground organ; roots have none
    fn default_fractions(&self, organ_name: &str, removal_type: BiomassRemovalType) -> Result<OrganBiomassRemoval> {
        let organ = match organ_name {
            "leaves" => Some(&self.leaves),
            "stems" => Some(&self.stems),
            "stolons" => Some(&self.stolons),
            _ => None,
        };
        organ
            .and_then(|o| o.removal_fractions(removal_type))
            .copied()
            .ok_or_else(|| PastureError::MissingRemovalDefaults {
                removal_type: removal_type.to_string(),
                organ: organ_name.to_string(),
            })
    }

    /// Removes live leaf in proportion to a reduction in green LAI.
    pub fn reduce_canopy(&mut self, delta_lai: f64) {
        let lai = self.lai_green();
        if lai <= EPSILON || delta_lai <= 0.0 {
            return;
        }
        let fraction = (delta_lai / lai).clamp(0.0, 1.0);
        let leaf_live = self.leaves.dm_live();
        self.leaves.remove_dm_amounts(leaf_live * fraction, 0.0);
        info!(species = %self.params.name, delta_lai, "canopy reduced");
    }

    pub fn reduce_root_length_density(&mut self, _delta_rld: f64) -> Result<()> {
        Err(PastureError::not_implemented("reduction of root length density"))
    }

    pub fn remove_assimilate(&mut self, _delta_assimilate: f64) -> Result<()> {
        Err(PastureError::not_implemented("removal of assimilate"))
    }

    pub fn reduce_population(&mut self, _new_plant_population: f64) -> Result<()> {
        Err(PastureError::not_implemented("reduction of plant population"))
    }

    /// Crop harvest without fractions; use [`PastureSpecies::harvest`] instead.
    pub fn harvest_crop(&mut self) -> Result<()> {
        Err(PastureError::not_implemented("harvest without removal fractions"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SpeciesParams;
    use crate::soil::SoilProfile;
    use approx::assert_relative_eq;

    fn ryegrass() -> PastureSpecies {
        PastureSpecies::new(SpeciesParams::default(), &[SoilProfile::default_silt_loam("field")]).unwrap()
    }

    #[test]
    fn graze_to_residue() {
        let mut species = ryegrass();
        assert_relative_eq!(species.standing_herbage_wt(), 2000.0, epsilon = 1e-9);
        let removed = species.graze("SetResidueAmount", 500.0).unwrap();
        assert_relative_eq!(removed, 1500.0, epsilon = 1e-6);
        assert_relative_eq!(species.standing_herbage_wt(), 500.0, epsilon = 1e-6);
        assert_relative_eq!(species.harvested_wt(), 1500.0, epsilon = 1e-6);
        assert!(species.harvested_digestibility() > 0.0);
        assert!(species.leaves.dm_live() >= species.leaves.minimum_live_dm - 1e-9);
    }

    #[test]
    fn graze_by_amount_and_unknown_type() {
        let mut species = ryegrass();
        let removed = species.graze("SetRemoveAmount", 300.0).unwrap();
        assert_relative_eq!(removed, 300.0, epsilon = 1e-9);
        assert!(matches!(species.graze("eat", 10.0), Err(PastureError::UnknownGrazeType(_))));
    }

    #[test]
    fn removing_more_than_harvestable_leaves_the_minimum() {
        let mut species = ryegrass();
        let removed = species.remove_dm(5000.0).unwrap();
        assert_relative_eq!(removed, 1900.0, epsilon = 1e-9);
        assert_relative_eq!(species.above_ground_live_wt(), 100.0, epsilon = 1e-9);
        assert_relative_eq!(species.above_ground_dead_wt(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn preference_for_green_takes_more_live() {
        let mut params = SpeciesParams::default();
        params.preference_for_green_over_dead = 4.0;
        let mut picky = PastureSpecies::new(params, &[SoilProfile::default_silt_loam("field")]).unwrap();
        let mut plain = ryegrass();
        picky.remove_dm(600.0).unwrap();
        plain.remove_dm(600.0).unwrap();
        assert!(picky.above_ground_live_wt() < plain.above_ground_live_wt());
        assert_relative_eq!(picky.above_ground_wt(), plain.above_ground_wt(), epsilon = 1e-9);
    }

    #[test]
    fn capped_pools_pass_their_share_to_the_others() {
        let mut params = SpeciesParams::default();
        params.preference_for_green_over_dead = 10.0;
        let mut species = PastureSpecies::new(params, &[SoilProfile::default_silt_loam("field")]).unwrap();
        let pre = species.above_ground_wt();
        let live_harvestable = species.leaves.dm_live_harvestable() + species.stems.dm_live_harvestable();
        let removed = species.remove_dm(1800.0).unwrap();
        assert_relative_eq!(removed, 1800.0, epsilon = 1e-6);
        assert_relative_eq!(species.above_ground_wt(), pre - removed, epsilon = 1e-9);
        // green pools run out first, dead material makes up the rest
        assert!(species.leaves.dm_live_harvestable() + species.stems.dm_live_harvestable() < 0.05 * live_harvestable);
        assert!(species.leaves.dm_live() >= species.leaves.minimum_live_dm - 1e-9);
    }

    #[test]
    fn removal_by_organ_defaults() {
        let mut species = ryegrass();
        let pre = species.above_ground_wt();
        let removed = species.remove_biomass("Graze", None).unwrap();
        // half of live above the minimum and half of dead, for leaves and stems
        assert_relative_eq!(removed.dm_total(), 0.5 * 1900.0, epsilon = 1e-9);
        assert_relative_eq!(species.above_ground_wt(), pre - removed.dm_total(), epsilon = 1e-9);
        assert!(species.defoliation.pending_fraction > 0.0);
        assert!(matches!(
            species.remove_biomass("Trample", None),
            Err(PastureError::UnknownRemovalType(_))
        ));
    }

    #[test]
    fn user_fractions_override_defaults() {
        let mut species = ryegrass();
        let fractions = RemovalFractions::new().with_organ(
            "Leaves",
            OrganBiomassRemoval {
                fraction_live_to_remove: 0.2,
                fraction_live_to_residue: 0.1,
                ..Default::default()
            },
        );
        let leaf_harvestable = species.leaves.dm_live_harvestable();
        let stem_harvestable = species.stems.dm_live_harvestable() + species.stems.dm_dead_harvestable();
        let removed = species.harvest(&fractions).unwrap();
        assert_relative_eq!(
            removed.dm_total(),
            0.3 * leaf_harvestable + 0.5 * stem_harvestable,
            epsilon = 1e-9
        );
        assert_relative_eq!(removed.dm_to_residue, 0.1 * leaf_harvestable, epsilon = 1e-9);
    }

    #[test]
    fn organ_removal_by_name() {
        let mut species = ryegrass();
        let removed = species
            .remove_organ_biomass("Roots", "Cut", Some(&OrganBiomassRemoval::new(0.2, 0.0)))
            .unwrap();
        assert_relative_eq!(removed.dm_total(), 100.0, epsilon = 1e-9);
        assert!(matches!(
            species.remove_organ_biomass("Roots", "Cut", None),
            Err(PastureError::MissingRemovalDefaults { .. })
        ));
        assert!(matches!(
            species.remove_organ_biomass("Flowers", "Cut", None),
            Err(PastureError::UnknownOrgan(_))
        ));
        species.remove_organ_biomass("stems", "Cut", None).unwrap();
    }

    #[test]
    fn canopy_reduction_and_unsupported_paths() {
        let mut species = ryegrass();
        let lai = species.lai_green();
        species.reduce_canopy(0.25 * lai);
        assert_relative_eq!(species.lai_green(), 0.75 * lai, epsilon = 1e-9);
        assert!(matches!(species.reduce_population(10.0), Err(PastureError::NotImplemented { .. })));
        assert!(species.harvest_crop().is_err());
        assert!(species.remove_assimilate(1.0).is_err());
        assert!(species.reduce_root_length_density(0.1).is_err());
    }
}
