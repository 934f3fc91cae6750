//! Species parameter set.
//!
//! Defaults describe a generic perennial ryegrass. Parameter files are TOML,
//! one table per species, e.g.
//!
//! ```toml
//! [white_clover]
//! family = "Legume"
//! fraction_to_stolon = 0.4
//! ```

use crate::error::{PastureError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tolerance used in every mass balance check.
pub const EPSILON: f64 = 1e-9;
pub const CARBON_FRACTION_IN_DM: f64 = 0.4;     // [kg C/kg DM]
pub const POTENTIAL_ME_OF_HERBAGE: f64 = 16.0;  // [MJ/kg DM]
pub const NITROGEN_TO_PROTEIN_FACTOR: f64 = 6.25;
pub const CN_RATIO_PROTEIN: f64 = 3.5;
pub const CN_RATIO_CELL_WALL: f64 = 100.0;

/// Family type for the species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PlantFamily {
    #[default]
    Grass,
    Legume,
    Forb,
}

/// Metabolic pathway for C fixation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PhotosynthesisPathway {
    #[default]
    C3,
    C4,
}

/// How plant available water is computed for each root zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WaterAvailableMethod {
    #[default]
    DefaultApsim,
    AlternativeKL,
    AlternativeKS,
}

/// How plant available mineral N is computed for each root zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NitrogenAvailableMethod {
    #[default]
    BasicAgPasture,
    DefaultApsim,
    AlternativeKNO3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeciesParams {
    pub name: String,
    pub family: PlantFamily,
    pub pathway: PhotosynthesisPathway,
    pub is_annual: bool,

    // Initial state
    pub initial_shoot_dm: f64,                      // [kg/ha], <0 not sown, 0 sown
    pub initial_root_dm: f64,                       // [kg/ha]
    pub initial_root_depth: f64,                    // [mm]
    pub initial_dm_fractions_grasses: [f64; 11],
    pub initial_dm_fractions_legumes: [f64; 11],
    pub initial_dm_fractions_forbs: [f64; 11],
    pub emergence_dm_fractions: [f64; 11],

    // Photosynthesis
    pub reference_photosynthetic_rate: f64,         // [mg CO2/m^2 leaf/s]
    pub photosynthetic_efficiency: f64,             // [mg CO2/J]
    pub photosynthesis_curve_factor: f64,           // [-]
    pub fraction_par: f64,                          // [-]
    pub light_extinction_coefficient: f64,          // [-]
    pub reference_co2: f64,                         // [ppm]
    pub co2_effect_scale_factor: f64,               // [ppm]
    pub co2_effect_offset_factor: f64,              // [ppm]
    pub co2_effect_minimum: f64,                    // [-]
    pub co2_effect_exponent: f64,                   // [-]

    // Temperature responses
    pub growth_t_minimum: f64,                      // [oC]
    pub growth_t_optimum: f64,                      // [oC]
    pub growth_t_effect_exponent: f64,              // [-]
    pub use_heat_stress_factor: bool,
    pub heat_onset_temperature: f64,                // [oC]
    pub heat_full_temperature: f64,                 // [oC]
    pub heat_recovery_sum_dd: f64,                  // [oCd]
    pub heat_recovery_t_reference: f64,             // [oC]
    pub use_cold_stress_factor: bool,
    pub cold_onset_temperature: f64,                // [oC]
    pub cold_full_temperature: f64,                 // [oC]
    pub cold_recovery_sum_dd: f64,                  // [oCd]
    pub cold_recovery_t_reference: f64,             // [oC]

    // Respiration
    pub maintenance_respiration_coefficient: f64,   // [-]
    pub growth_respiration_coefficient: f64,        // [-]
    pub respiration_t_reference: f64,               // [oC]
    pub respiration_exponent: f64,                  // [-]

    // N concentration thresholds: optimum, minimum, maximum [kg/kg]
    pub n_thresholds_leaves: [f64; 3],
    pub n_thresholds_stems: [f64; 3],
    pub n_thresholds_stolons: [f64; 3],
    pub n_thresholds_roots: [f64; 3],

    // Germination
    pub degrees_day_for_germination: f64,          // [oCd]

    // Allocation
    pub target_shoot_root_ratio: f64,
    pub max_root_allocation: f64,
    pub shoot_root_glf_factor: f64,
    pub use_repro_season_factor: bool,
    pub repro_season_reference_latitude: f64,      // [degrees]
    pub repro_season_timing_coeff: f64,
    pub repro_season_duration_coeff: f64,
    pub repro_season_shoulders_length_factor: f64,
    pub repro_season_onset_duration_factor: f64,
    pub repro_season_max_allocation_increase: f64,
    pub repro_season_allocation_coeff: f64,
    pub fraction_leaf_maximum: f64,
    pub fraction_leaf_minimum: f64,
    pub fraction_leaf_dm_threshold: f64,           // [kg/ha]
    pub fraction_leaf_dm_factor: f64,              // [kg/ha]
    pub fraction_leaf_exponent: f64,
    pub fraction_to_stolon: f64,

    // Canopy
    pub specific_leaf_area: f64,                   // [m^2/kg]
    pub specific_root_length: f64,                 // [m/g]
    pub stolon_effect_on_lai: f64,
    pub shoot_max_effect_on_lai: f64,              // [kg/ha]
    pub max_stem_effect_on_lai: f64,
    pub albedo: f64,
    pub gsmax: f64,                                // [m/s]
    pub r50: f64,                                  // [W/m^2]

    // Tissue turnover
    pub live_leaves_per_tiller: f64,
    pub tissue_turnover_rate_shoot: f64,           // [/day]
    pub tissue_turnover_rate_root: f64,            // [/day]
    pub relative_turnover_emerging: f64,
    pub detachment_rate_shoot: f64,                // [/day]
    pub turnover_temperature_min: f64,             // [oC]
    pub turnover_temperature_ref: f64,             // [oC]
    pub turnover_temperature_exponent: f64,
    pub turnover_drought_effect_max: f64,
    pub turnover_drought_threshold: f64,
    pub detachment_drought_coefficient: f64,
    pub detachment_drought_effect_min: f64,
    pub turnover_defoliation_coefficient: f64,
    pub turnover_defoliation_effect_min: f64,
    pub turnover_defoliation_root_effect: f64,
    pub fraction_n_luxury_remobilisable: [f64; 3], // emerging, developing, mature

    // N fixation
    pub minimum_n_fixation: f64,
    pub maximum_n_fixation: f64,
    pub symbiont_cost_factor: f64,
    pub n_fixing_cost_factor: f64,

    // Water logging, N dilution and generic limitations
    pub soil_saturation_effect_max: f64,
    pub minimum_water_free_porosity: f64,          // negative means use DUL
    pub soil_saturation_recovery_factor: f64,
    pub n_dilution_coefficient: f64,
    pub glf_generic: f64,
    pub glf_soil_fertility: f64,

    // Height
    pub plant_height_minimum: f64,                 // [mm]
    pub plant_height_maximum: f64,                 // [mm]
    pub plant_height_mass_for_max: f64,            // [kg/ha]
    pub plant_height_exponent: f64,

    // Roots
    pub root_depth_minimum: f64,                   // [mm]
    pub root_depth_maximum: f64,                   // [mm]
    pub root_elongation_rate: f64,                 // [mm/day]
    pub root_distribution_depth_param: f64,        // [mm]
    pub root_distribution_exponent: f64,
    pub root_bottom_distribution_factor: f64,

    // Digestibility
    pub digestibilities_cell_wall: [f64; 4],
    pub digestibility_protein: f64,
    pub sugar_fraction_new_growth: f64,

    // Minimum live DM and harvest preferences
    pub minimum_green_wt: f64,                     // [kg/ha]
    pub minimum_green_leaf_prop: f64,
    pub minimum_green_root_prop: f64,
    pub fraction_stolon_standing: f64,
    pub preference_for_green_over_dead: f64,
    pub preference_for_leaf_over_stems: f64,

    // Soil water and N availability
    pub water_available_method: WaterAvailableMethod,
    pub nitrogen_available_method: NitrogenAvailableMethod,
    pub maximum_fraction_available: f64,
    pub reference_rld: f64,                        // [mm/mm^3]
    pub exponent_soil_moisture: f64,
    pub reference_ks_uptake: f64,                  // [mm/day]
    pub n_uptake_sw_factor: f64,
    pub maximum_n_uptake: f64,                     // [kg/ha/day]
    pub knh4: f64,
    pub kno3: f64,
    pub ku_nh4: f64,
    pub ku_no3: f64,

    // Annual species
    pub doy_germination: u32,
    pub days_emergence_to_anthesis: u32,
    pub days_anthesis_to_maturity: u32,
    pub degrees_day_for_anthesis: f64,
    pub degrees_day_for_maturity: f64,
    pub days_annuals_factor: u32,
}

impl Default for SpeciesParams {
    fn default() -> Self {
        SpeciesParams {
            name: "ryegrass".to_string(),
            family: PlantFamily::Grass,
            pathway: PhotosynthesisPathway::C3,
            is_annual: false,

            initial_shoot_dm: 2000.0,
            initial_root_dm: 500.0,
            initial_root_depth: 500.0,
            initial_dm_fractions_grasses: [0.15, 0.25, 0.25, 0.05, 0.05, 0.10, 0.10, 0.05, 0.00, 0.00, 0.00],
            initial_dm_fractions_legumes: [0.16, 0.23, 0.22, 0.05, 0.03, 0.05, 0.05, 0.01, 0.04, 0.08, 0.08],
            initial_dm_fractions_forbs: [0.20, 0.20, 0.15, 0.05, 0.10, 0.15, 0.10, 0.05, 0.00, 0.00, 0.00],
            emergence_dm_fractions: [0.60, 0.25, 0.00, 0.00, 0.15, 0.00, 0.00, 0.00, 0.00, 0.00, 0.00],

            reference_photosynthetic_rate: 1.0,
            photosynthetic_efficiency: 0.01,
            photosynthesis_curve_factor: 0.8,
            fraction_par: 0.5,
            light_extinction_coefficient: 0.5,
            reference_co2: 380.0,
            co2_effect_scale_factor: 700.0,
            co2_effect_offset_factor: 600.0,
            co2_effect_minimum: 0.7,
            co2_effect_exponent: 2.0,

            growth_t_minimum: 1.0,
            growth_t_optimum: 20.0,
            growth_t_effect_exponent: 1.7,
            use_heat_stress_factor: true,
            heat_onset_temperature: 28.0,
            heat_full_temperature: 35.0,
            heat_recovery_sum_dd: 30.0,
            heat_recovery_t_reference: 25.0,
            use_cold_stress_factor: true,
            cold_onset_temperature: 1.0,
            cold_full_temperature: -5.0,
            cold_recovery_sum_dd: 25.0,
            cold_recovery_t_reference: 0.0,

            maintenance_respiration_coefficient: 0.03,
            growth_respiration_coefficient: 0.25,
            respiration_t_reference: 20.0,
            respiration_exponent: 1.5,

            n_thresholds_leaves: [0.04, 0.012, 0.05],
            n_thresholds_stems: [0.02, 0.006, 0.025],
            n_thresholds_stolons: [0.0, 0.0, 0.0],
            n_thresholds_roots: [0.02, 0.006, 0.025],

            degrees_day_for_germination: 125.0,

            target_shoot_root_ratio: 4.0,
            max_root_allocation: 0.25,
            shoot_root_glf_factor: 0.50,
            use_repro_season_factor: true,
            repro_season_reference_latitude: 41.0,
            repro_season_timing_coeff: 0.14,
            repro_season_duration_coeff: 2.0,
            repro_season_shoulders_length_factor: 1.0,
            repro_season_onset_duration_factor: 0.60,
            repro_season_max_allocation_increase: 0.50,
            repro_season_allocation_coeff: 0.10,
            fraction_leaf_maximum: 0.7,
            fraction_leaf_minimum: 0.7,
            fraction_leaf_dm_threshold: 500.0,
            fraction_leaf_dm_factor: 2000.0,
            fraction_leaf_exponent: 3.0,
            fraction_to_stolon: 0.0,

            specific_leaf_area: 25.0,
            specific_root_length: 100.0,
            stolon_effect_on_lai: 0.0,
            shoot_max_effect_on_lai: 1000.0,
            max_stem_effect_on_lai: 1.0,
            albedo: 0.26,
            gsmax: 0.011,
            r50: 200.0,

            live_leaves_per_tiller: 3.0,
            tissue_turnover_rate_shoot: 0.05,
            tissue_turnover_rate_root: 0.02,
            relative_turnover_emerging: 2.0,
            detachment_rate_shoot: 0.08,
            turnover_temperature_min: 2.0,
            turnover_temperature_ref: 20.0,
            turnover_temperature_exponent: 1.0,
            turnover_drought_effect_max: 1.0,
            turnover_drought_threshold: 0.5,
            detachment_drought_coefficient: 3.0,
            detachment_drought_effect_min: 0.1,
            turnover_defoliation_coefficient: 0.5,
            turnover_defoliation_effect_min: 0.025,
            turnover_defoliation_root_effect: 0.1,
            fraction_n_luxury_remobilisable: [0.1, 0.1, 0.1],

            minimum_n_fixation: 0.0,
            maximum_n_fixation: 0.0,
            symbiont_cost_factor: 0.0,
            n_fixing_cost_factor: 0.0,

            soil_saturation_effect_max: 0.1,
            minimum_water_free_porosity: -1.0,
            soil_saturation_recovery_factor: 0.25,
            n_dilution_coefficient: 0.5,
            glf_generic: 1.0,
            glf_soil_fertility: 1.0,

            plant_height_minimum: 25.0,
            plant_height_maximum: 600.0,
            plant_height_mass_for_max: 10000.0,
            plant_height_exponent: 2.8,

            root_depth_minimum: 50.0,
            root_depth_maximum: 750.0,
            root_elongation_rate: 25.0,
            root_distribution_depth_param: 90.0,
            root_distribution_exponent: 3.2,
            root_bottom_distribution_factor: 1.05,

            digestibilities_cell_wall: [0.6, 0.6, 0.6, 0.2],
            digestibility_protein: 1.0,
            sugar_fraction_new_growth: 0.5,

            minimum_green_wt: 100.0,
            minimum_green_leaf_prop: 0.8,
            minimum_green_root_prop: 0.5,
            fraction_stolon_standing: 0.0,
            preference_for_green_over_dead: 1.0,
            preference_for_leaf_over_stems: 1.0,

            water_available_method: WaterAvailableMethod::DefaultApsim,
            nitrogen_available_method: NitrogenAvailableMethod::BasicAgPasture,
            maximum_fraction_available: 0.999,
            reference_rld: 5.0,
            exponent_soil_moisture: 1.50,
            reference_ks_uptake: 15.0,
            n_uptake_sw_factor: 0.25,
            maximum_n_uptake: 10.0,
            knh4: 1.0,
            kno3: 1.0,
            ku_nh4: 0.50,
            ku_no3: 0.95,

            doy_germination: 275,
            days_emergence_to_anthesis: 120,
            days_anthesis_to_maturity: 85,
            degrees_day_for_anthesis: 1100.0,
            degrees_day_for_maturity: 900.0,
            days_annuals_factor: 45,
        }
    }
}

impl SpeciesParams {
    /// A white clover parameter set (legume with stolons and N fixation).
    pub fn white_clover() -> Self {
        SpeciesParams {
            name: "whiteclover".to_string(),
            family: PlantFamily::Legume,
            initial_shoot_dm: 500.0,
            initial_root_dm: 150.0,
            initial_root_depth: 300.0,
            growth_t_minimum: 4.0,
            growth_t_optimum: 22.0,
            growth_t_effect_exponent: 1.6,
            n_thresholds_leaves: [0.045, 0.016, 0.055],
            n_thresholds_stems: [0.03, 0.008, 0.035],
            n_thresholds_stolons: [0.03, 0.008, 0.035],
            n_thresholds_roots: [0.03, 0.008, 0.035],
            target_shoot_root_ratio: 3.0,
            fraction_leaf_maximum: 0.65,
            fraction_leaf_minimum: 0.5,
            fraction_to_stolon: 0.25,
            stolon_effect_on_lai: 0.3,
            specific_leaf_area: 30.0,
            minimum_n_fixation: 0.1,
            maximum_n_fixation: 0.6,
            symbiont_cost_factor: 0.001,
            n_fixing_cost_factor: 0.9,
            fraction_stolon_standing: 0.1,
            minimum_green_leaf_prop: 0.6,
            root_depth_maximum: 400.0,
            ..SpeciesParams::default()
        }
    }

    /// Parse a parameter set from a TOML document holding a single species.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let params: SpeciesParams = toml::from_str(toml_str)?;
        params.validate()?;
        Ok(params)
    }

    /// Parse a named species table out of a multi-species TOML document.
    pub fn from_toml_table(toml_str: &str, species_name: &str) -> Result<Self> {
        let doc: toml::Table = toml::from_str(toml_str)?;
        let key = species_name.to_lowercase();
        let table = doc
            .get(&key)
            .ok_or_else(|| PastureError::config(format!("no parameter table for species '{}'", species_name)))?
            .clone();
        let mut params: SpeciesParams = table.try_into()?;
        if params.name == SpeciesParams::default().name {
            params.name = key;
        }
        params.validate()?;
        Ok(params)
    }

    pub fn from_toml_file(path: impl AsRef<Path>, species_name: &str) -> Result<Self> {
        let path = path.as_ref();
        let toml_str = fs::read_to_string(path).map_err(|source| PastureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_table(&toml_str, species_name)
    }

    pub fn is_legume(&self) -> bool {
        self.family == PlantFamily::Legume
    }

    /// Initial DM split over the eleven above-ground pools for this family.
    pub fn initial_dm_fractions(&self) -> &[f64; 11] {
        match self.family {
            PlantFamily::Grass => &self.initial_dm_fractions_grasses,
            PlantFamily::Legume => &self.initial_dm_fractions_legumes,
            PlantFamily::Forb => &self.initial_dm_fractions_forbs,
        }
    }

    /// Setup-time consistency checks.
    pub fn validate(&self) -> Result<()> {
        if self.initial_root_depth > self.root_depth_maximum {
            return Err(PastureError::config(
                "the value for the initial root depth is greater than the value set for maximum depth",
            ));
        }
        if self.root_depth_minimum > self.root_depth_maximum {
            return Err(PastureError::config("minimum root depth is greater than maximum root depth"));
        }
        for (organ, t) in [
            ("leaves", &self.n_thresholds_leaves),
            ("stems", &self.n_thresholds_stems),
            ("stolons", &self.n_thresholds_stolons),
            ("roots", &self.n_thresholds_roots),
        ] {
            // [optimum, minimum, maximum]
            if t[1] > t[0] || t[0] > t[2] || t[1] < 0.0 {
                return Err(PastureError::config(format!(
                    "N thresholds for {} must satisfy 0 <= minimum <= optimum <= maximum",
                    organ
                )));
            }
        }
        if self.live_leaves_per_tiller <= 0.0 {
            return Err(PastureError::config("live leaves per tiller must be positive"));
        }
        if self.growth_t_optimum <= self.growth_t_minimum {
            return Err(PastureError::config("optimum growth temperature must exceed the minimum"));
        }
        if self.turnover_temperature_ref <= self.turnover_temperature_min {
            return Err(PastureError::config("turnover reference temperature must exceed the minimum"));
        }
        if self.heat_full_temperature <= self.heat_onset_temperature
            || self.cold_full_temperature >= self.cold_onset_temperature
        {
            return Err(PastureError::config("temperature stress thresholds are inverted"));
        }
        let unit_fractions = [
            ("max_root_allocation", self.max_root_allocation),
            ("fraction_leaf_maximum", self.fraction_leaf_maximum),
            ("fraction_leaf_minimum", self.fraction_leaf_minimum),
            ("fraction_to_stolon", self.fraction_to_stolon),
            ("minimum_green_leaf_prop", self.minimum_green_leaf_prop),
            ("minimum_green_root_prop", self.minimum_green_root_prop),
            ("fraction_stolon_standing", self.fraction_stolon_standing),
            ("detachment_drought_effect_min", self.detachment_drought_effect_min),
            ("minimum_n_fixation", self.minimum_n_fixation),
            ("maximum_n_fixation", self.maximum_n_fixation),
            ("maximum_fraction_available", self.maximum_fraction_available),
        ];
        for (field, value) in unit_fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(PastureError::config(format!("{} must be within [0, 1], got {}", field, value)));
            }
        }
        if self.fraction_leaf_maximum + self.fraction_to_stolon > 1.0 {
            return Err(PastureError::config("fraction_leaf_maximum + fraction_to_stolon exceeds one"));
        }
        if self.minimum_n_fixation > self.maximum_n_fixation {
            return Err(PastureError::config("minimum N fixation is greater than maximum N fixation"));
        }
        if self.shoot_root_glf_factor <= 0.0 {
            return Err(PastureError::config("shoot_root_glf_factor must be positive"));
        }
        Ok(())
    }
}
