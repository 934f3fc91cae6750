//! Read-only outputs of the species. Everything is derived from the tissue
//! pools on request; arrays are returned as owned copies.

use crate::capabilities::CanopyQuery;
use crate::factors::{height_from_dm, plant_cover};
use crate::organ::{AboveGroundOrgan, DEAD, ratio};
use crate::params::{EPSILON, NITROGEN_TO_PROTEIN_FACTOR, POTENTIAL_ME_OF_HERBAGE};
use crate::species::PastureSpecies;
use nalgebra::DVector;

impl PastureSpecies {
    fn shoot_organs(&self) -> [&AboveGroundOrgan; 3] {
        [&self.leaves, &self.stems, &self.stolons]
    }

    // -- DM [kg/ha] --

    pub fn above_ground_wt(&self) -> f64 {
        self.shoot_organs().iter().map(|o| o.dm_total()).sum()
    }

    pub fn above_ground_live_wt(&self) -> f64 {
        self.shoot_organs().iter().map(|o| o.dm_live()).sum()
    }

    pub fn above_ground_dead_wt(&self) -> f64 {
        self.shoot_organs().iter().map(|o| o.dm_dead()).sum()
    }

    pub fn below_ground_wt(&self) -> f64 {
        self.roots.iter().map(|r| r.dm_total()).sum()
    }

    pub fn below_ground_live_wt(&self) -> f64 {
        self.roots.iter().map(|r| r.dm_live()).sum()
    }

    pub fn total_wt(&self) -> f64 {
        self.above_ground_wt() + self.below_ground_wt()
    }

    /// Above-ground DM that stands above the soil surface.
    pub fn standing_herbage_wt(&self) -> f64 {
        self.leaves.dm_total() + self.stems.dm_total() + self.stolons.dm_total() * self.stolons.fraction_standing
    }

    pub fn standing_live_herbage_wt(&self) -> f64 {
        self.leaves.dm_live() + self.stems.dm_live() + self.stolons.dm_live() * self.stolons.fraction_standing
    }

    pub fn standing_dead_herbage_wt(&self) -> f64 {
        self.leaves.dm_dead() + self.stems.dm_dead() + self.stolons.dm_dead() * self.stolons.fraction_standing
    }

    /// DM available for removal: live above the minimum plus all standing dead.
    pub fn harvestable_wt(&self) -> f64 {
        self.shoot_organs()
            .iter()
            .map(|o| o.dm_live_harvestable() + o.dm_dead_harvestable())
            .sum()
    }

    /// Leaf DM by tissue: emerging, developing, mature, dead.
    pub fn leaf_wt_by_tissue(&self) -> [f64; 4] {
        self.leaves.tissues.each_ref().map(|t| t.dm)
    }

    pub fn stem_wt_by_tissue(&self) -> [f64; 4] {
        self.stems.tissues.each_ref().map(|t| t.dm)
    }

    pub fn stolon_wt_by_tissue(&self) -> [f64; 4] {
        self.stolons.tissues.each_ref().map(|t| t.dm)
    }

    /// Fraction of standing live DM that is leaf.
    pub fn leaf_live_fraction(&self) -> f64 {
        ratio(self.leaves.dm_live(), self.standing_live_herbage_wt())
    }

    pub fn dead_fraction(&self) -> f64 {
        ratio(self.leaves.tissues[DEAD].dm + self.stems.tissues[DEAD].dm, self.standing_herbage_wt())
    }

    // -- N [kg/ha] and N concentration [kg/kg] --

    pub fn above_ground_n(&self) -> f64 {
        self.shoot_organs().iter().map(|o| o.n_total()).sum()
    }

    pub fn above_ground_live_n(&self) -> f64 {
        self.shoot_organs().iter().map(|o| o.n_live()).sum()
    }

    pub fn above_ground_dead_n(&self) -> f64 {
        self.shoot_organs().iter().map(|o| o.n_dead()).sum()
    }

    pub fn below_ground_n(&self) -> f64 {
        self.roots.iter().map(|r| r.n_total()).sum()
    }

    pub fn total_n(&self) -> f64 {
        self.above_ground_n() + self.below_ground_n()
    }

    pub fn above_ground_n_conc(&self) -> f64 {
        ratio(self.above_ground_n(), self.above_ground_wt())
    }

    pub fn standing_herbage_n(&self) -> f64 {
        self.leaves.n_total() + self.stems.n_total() + self.stolons.n_total() * self.stolons.fraction_standing
    }

    pub fn standing_herbage_n_conc(&self) -> f64 {
        ratio(self.standing_herbage_n(), self.standing_herbage_wt())
    }

    /// Crude protein content of the standing herbage [kg/kg]
    pub fn herbage_crude_protein(&self) -> f64 {
        self.standing_herbage_n_conc() * NITROGEN_TO_PROTEIN_FACTOR
    }

    pub fn root_n_conc(&self) -> f64 {
        ratio(self.below_ground_n(), self.below_ground_wt())
    }

    // -- canopy --

    /// Green LAI: live leaves, a share of stolons and, for short non-legume
    /// swards, a share of the live stems.
    pub fn lai_green_estimate(&self) -> f64 {
        let params = &self.params;
        let mut green_dm = self.leaves.dm_live() + self.stolons.dm_live() * params.stolon_effect_on_lai;
        let above_live = self.above_ground_live_wt();
        if !params.is_legume() && above_live < params.shoot_max_effect_on_lai {
            let stem_share = params.max_stem_effect_on_lai * (1.0 - above_live / params.shoot_max_effect_on_lai).sqrt();
            green_dm += self.stems.dm_live() * stem_share;
        }
        green_dm / 10000.0 * params.specific_leaf_area
    }

    pub fn lai_dead(&self) -> f64 {
        self.leaves.dm_dead() / 10000.0 * self.params.specific_leaf_area
    }

    pub fn cover_dead(&self) -> f64 {
        plant_cover(&self.params, self.lai_dead())
    }

    pub fn intercepted_radiation(&self) -> f64 {
        self.intercepted_radn
    }

    pub fn effective_green_cover(&self) -> f64 {
        self.effective_green_cover
    }

    // -- digestibility and energy --

    pub fn herbage_digestibility(&self) -> f64 {
        let stolons = &self.stolons;
        let weighted = self.leaves.digestibility_total() * self.leaves.dm_total()
            + self.stems.digestibility_total() * self.stems.dm_total()
            + stolons.digestibility_total() * stolons.dm_total() * stolons.fraction_standing;
        ratio(weighted, self.standing_herbage_wt())
    }

    /// Metabolisable energy of the standing herbage [MJ/kg DM].
    pub fn herbage_me(&self) -> f64 {
        POTENTIAL_ME_OF_HERBAGE * self.herbage_digestibility()
    }

    pub fn harvested_wt(&self) -> f64 {
        self.today.defoliated_dm
    }

    pub fn harvested_n(&self) -> f64 {
        self.today.defoliated_n
    }

    pub fn harvested_n_conc(&self) -> f64 {
        ratio(self.today.defoliated_n, self.today.defoliated_dm)
    }

    pub fn harvested_digestibility(&self) -> f64 {
        self.today.defoliated_digestibility
    }

    pub fn harvested_me(&self) -> f64 {
        POTENTIAL_ME_OF_HERBAGE * self.today.defoliated_digestibility
    }

    pub fn harvested_fraction(&self) -> f64 {
        self.today.defoliated_fraction
    }

    // -- roots (home zone) --

    pub fn root_depth(&self) -> f64 {
        self.roots.first().map_or(0.0, |r| r.depth)
    }

    /// Index of the deepest layer with roots.
    pub fn root_frontier(&self) -> usize {
        self.roots.first().map_or(0, |r| r.bottom_layer)
    }

    pub fn root_wt_by_layer(&self) -> DVector<f64> {
        self.roots
            .first()
            .and_then(|r| r.live.dm_layer.clone())
            .unwrap_or_else(|| DVector::zeros(0))
    }

    pub fn root_wt_fraction_by_layer(&self) -> DVector<f64> {
        self.roots
            .first()
            .and_then(|r| r.live.fraction_by_layer())
            .unwrap_or_else(|| DVector::zeros(0))
    }

    pub fn root_length_density(&self) -> DVector<f64> {
        self.roots.first().map_or_else(|| DVector::zeros(0), |r| r.length_density())
    }

    /// Water taken up today from each layer of the home zone [mm].
    pub fn water_uptake_by_layer(&self) -> DVector<f64> {
        self.roots.first().map_or_else(|| DVector::zeros(0), |r| r.water_uptake.clone())
    }

    pub fn soil_nh4_available(&self) -> DVector<f64> {
        self.roots.first().map_or_else(|| DVector::zeros(0), |r| r.nh4_available.clone())
    }

    pub fn soil_no3_available(&self) -> DVector<f64> {
        self.roots.first().map_or_else(|| DVector::zeros(0), |r| r.no3_available.clone())
    }

    pub fn soil_nh4_uptake(&self) -> DVector<f64> {
        self.roots.first().map_or_else(|| DVector::zeros(0), |r| r.nh4_uptake.clone())
    }

    pub fn soil_no3_uptake(&self) -> DVector<f64> {
        self.roots.first().map_or_else(|| DVector::zeros(0), |r| r.no3_uptake.clone())
    }

    // -- growth and limiting factors --

    pub fn gross_primary_production(&self) -> f64 {
        self.today.gpp()
    }

    pub fn net_primary_production(&self) -> f64 {
        self.today.npp()
    }

    pub fn net_above_ground_primary_production(&self) -> f64 {
        self.today.napp()
    }

    pub fn net_below_ground_primary_production(&self) -> f64 {
        self.today.nbpp()
    }

    /// Most limiting of the water, water logging and N supply factors.
    pub fn glf_minimum(&self) -> f64 {
        let today = &self.today;
        today.glf_water_supply.min(today.glf_water_logging).min(today.glf_n_supply)
    }

    /// All factors reducing potential photosynthesis combined.
    pub fn glf_photosynthesis(&self) -> f64 {
        let today = &self.today;
        today.glf_radn_intercept
            * today.glf_co2
            * today.glf_n_content
            * today.glf_temperature
            * today.glf_heat.min(today.glf_cold)
            * self.params.glf_generic
    }

    pub fn n_fixation_rate(&self) -> f64 {
        ratio(self.today.n_fixed, self.today.n_demand_optimum)
    }
}

impl CanopyQuery for PastureSpecies {
    fn lai_green(&self) -> f64 {
        self.lai_green_estimate()
    }

    fn lai_total(&self) -> f64 {
        self.lai_green_estimate() + self.lai_dead()
    }

    fn cover_green(&self) -> f64 {
        plant_cover(&self.params, self.lai_green_estimate())
    }

    fn cover_total(&self) -> f64 {
        plant_cover(&self.params, self.lai_total())
    }

    fn height(&self) -> f64 {
        height_from_dm(&self.params, self.standing_herbage_wt())
    }

    fn depth(&self) -> f64 {
        self.height()
    }

    fn albedo(&self) -> f64 {
        self.params.albedo
    }

    fn gsmax(&self) -> f64 {
        self.params.gsmax
    }

    fn r50(&self) -> f64 {
        self.params.r50
    }

    fn frgr(&self) -> f64 {
        1.0
    }

    fn set_potential_ep(&mut self, ep: f64) {
        self.today.water_demand = ep.max(0.0);
    }

    fn set_light_profile(&mut self, intercepted_radn: f64) {
        self.intercepted_radn = intercepted_radn.max(0.0);
        let radn = self.weather.radn;
        self.effective_green_cover = if self.lai_green_estimate() > EPSILON && radn > 0.0 {
            (self.intercepted_radn / radn).clamp(0.0, 1.0)
        } else {
            0.0
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SpeciesParams;
    use crate::soil::SoilProfile;
    use approx::assert_relative_eq;

    fn species(params: SpeciesParams) -> PastureSpecies {
        PastureSpecies::new(params, &[SoilProfile::default_silt_loam("field")]).unwrap()
    }

    #[test]
    fn totals_add_up() {
        let ryegrass = species(SpeciesParams::default());
        assert_relative_eq!(ryegrass.total_wt(), 2500.0, epsilon = 1e-9);
        assert_relative_eq!(ryegrass.standing_herbage_wt(), 2000.0, epsilon = 1e-9);
        assert_relative_eq!(
            ryegrass.above_ground_live_wt() + ryegrass.above_ground_dead_wt(),
            ryegrass.above_ground_wt(),
            epsilon = 1e-9
        );
        // live above the minimum plus all dead
        assert_relative_eq!(ryegrass.harvestable_wt(), 2000.0 - 100.0, epsilon = 1e-9);
        assert_relative_eq!(ryegrass.root_wt_fraction_by_layer().sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn crude_protein_follows_herbage_n() {
        let ryegrass = species(SpeciesParams::default());
        assert_relative_eq!(
            ryegrass.herbage_crude_protein(),
            6.25 * ryegrass.standing_herbage_n() / ryegrass.standing_herbage_wt(),
            epsilon = 1e-12
        );
        assert!(ryegrass.herbage_crude_protein() > 0.0 && ryegrass.herbage_crude_protein() < 1.0);
    }

    #[test]
    fn stems_add_to_lai_of_short_grass_only() {
        let ryegrass = species(SpeciesParams::default());
        let leaf_only = ryegrass.leaves.dm_live() / 10000.0 * ryegrass.params.specific_leaf_area;
        // 1800 kg/ha live is above the threshold for a stem effect
        assert_relative_eq!(ryegrass.lai_green(), leaf_only, epsilon = 1e-12);

        let short = species(SpeciesParams {
            initial_shoot_dm: 600.0,
            ..SpeciesParams::default()
        });
        let leaf_only = short.leaves.dm_live() / 10000.0 * short.params.specific_leaf_area;
        assert!(short.lai_green() > leaf_only);
        assert!(short.cover_green() > 0.0 && short.cover_green() < 1.0);
    }

    #[test]
    fn light_profile_sets_effective_cover() {
        let mut ryegrass = species(SpeciesParams::default());
        ryegrass.set_light_profile(6.0);
        assert_relative_eq!(ryegrass.effective_green_cover(), 6.0 / 15.0);
        ryegrass.set_light_profile(30.0);
        assert_eq!(ryegrass.effective_green_cover(), 1.0);
    }

    #[test]
    fn clover_stolons_partly_stand() {
        let clover = species(SpeciesParams::white_clover());
        let stolon_dm = clover.stolons.dm_total();
        assert!(stolon_dm > 0.0);
        assert_relative_eq!(clover.standing_herbage_wt(), 500.0 - 0.9 * stolon_dm, epsilon = 1e-9);
        assert!(clover.herbage_digestibility() > 0.0 && clover.herbage_digestibility() <= 1.0);
        assert_relative_eq!(clover.herbage_me(), 16.0 * clover.herbage_digestibility());
    }
}
