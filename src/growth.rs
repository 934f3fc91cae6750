//! Daily computation context and the potential growth calculations
//! (photosynthesis, respiration, N fixation costs).

use crate::factors::{temperature_effect_on_respiration, temperature_limiting_factor};
use crate::params::{CARBON_FRACTION_IN_DM, EPSILON, SpeciesParams};
use crate::weather::DailyWeather;

/// Everything computed for one plant during one day.
///
/// Zeroed at daily initialisation, filled in by the potential and actual
/// growth steps and kept until the next day for reporting. The water and N
/// supply factors are the exception: they carry over, since tomorrow's
/// turnover is driven by today's water status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyGrowth {
    // Carbon fluxes [kg C/ha]
    pub base_photosynthesis: f64,
    pub gross_photosynthesis: f64,
    pub respiration_maintenance: f64,
    pub respiration_growth: f64,
    pub n_fixation_cost: f64,
    pub remobilised_c: f64,

    // Growth at each level of limitation [kg DM/ha]
    pub growth_potential: f64,
    pub growth_after_water: f64,
    pub growth_after_nutrients: f64,
    pub growth_net: f64,
    pub growth_shoot_dm: f64,
    pub growth_shoot_n: f64,
    pub growth_root_dm: f64,
    pub growth_root_n: f64,

    // Detached today
    pub detached_shoot_dm: f64,
    pub detached_shoot_n: f64,
    pub detached_root_dm: f64,
    pub detached_root_n: f64,

    // Growth limiting factors [0-1]
    pub glf_radn_intercept: f64,
    pub glf_co2: f64,
    pub glf_n_content: f64,
    pub glf_temperature: f64,
    pub glf_heat: f64,
    pub glf_cold: f64,
    pub glf_water_supply: f64,
    pub glf_water_logging: f64,
    pub glf_n_supply: f64,
    pub temperature_factor_respiration: f64,

    // Allocation of new growth
    pub fraction_to_shoot: f64,
    pub fraction_to_leaf: f64, // within the shoot
    pub fraction_to_stolon: f64,

    // Turnover rates [/day]
    pub turnover_live_shoot: f64,
    pub turnover_dead_shoot: f64,
    pub turnover_stolons: f64,
    pub turnover_roots: f64,
    pub ttf_temperature: f64,
    pub ttf_moisture_shoot: f64,

    // Nitrogen [kg/ha]
    pub n_demand_optimum: f64,
    pub n_demand_luxury: f64,
    pub n_fixed: f64,
    pub n_senesced_remobilised: f64,
    pub n_luxury_remobilised: f64,
    pub soil_n_demand: f64,
    pub soil_n_available: f64,
    pub soil_n_uptake: f64,
    pub n_new_growth: f64,

    // Water [mm]
    pub water_demand: f64,
    pub water_available: f64,
    pub water_uptake: f64,

    // Defoliation today
    pub defoliated_dm: f64,
    pub defoliated_n: f64,
    pub defoliated_fraction: f64,
    pub defoliated_digestibility: f64,
}

impl Default for DailyGrowth {
    fn default() -> Self {
        DailyGrowth {
            base_photosynthesis: 0.0,
            gross_photosynthesis: 0.0,
            respiration_maintenance: 0.0,
            respiration_growth: 0.0,
            n_fixation_cost: 0.0,
            remobilised_c: 0.0,
            growth_potential: 0.0,
            growth_after_water: 0.0,
            growth_after_nutrients: 0.0,
            growth_net: 0.0,
            growth_shoot_dm: 0.0,
            growth_shoot_n: 0.0,
            growth_root_dm: 0.0,
            growth_root_n: 0.0,
            detached_shoot_dm: 0.0,
            detached_shoot_n: 0.0,
            detached_root_dm: 0.0,
            detached_root_n: 0.0,
            glf_radn_intercept: 1.0,
            glf_co2: 1.0,
            glf_n_content: 1.0,
            glf_temperature: 1.0,
            glf_heat: 1.0,
            glf_cold: 1.0,
            glf_water_supply: 1.0,
            glf_water_logging: 1.0,
            glf_n_supply: 1.0,
            temperature_factor_respiration: 1.0,
            fraction_to_shoot: 1.0,
            fraction_to_leaf: 1.0,
            fraction_to_stolon: 0.0,
            turnover_live_shoot: 0.0,
            turnover_dead_shoot: 0.0,
            turnover_stolons: 0.0,
            turnover_roots: 0.0,
            ttf_temperature: 0.0,
            ttf_moisture_shoot: 1.0,
            n_demand_optimum: 0.0,
            n_demand_luxury: 0.0,
            n_fixed: 0.0,
            n_senesced_remobilised: 0.0,
            n_luxury_remobilised: 0.0,
            soil_n_demand: 0.0,
            soil_n_available: 0.0,
            soil_n_uptake: 0.0,
            n_new_growth: 0.0,
            water_demand: 0.0,
            water_available: 0.0,
            water_uptake: 0.0,
            defoliated_dm: 0.0,
            defoliated_n: 0.0,
            defoliated_fraction: 0.0,
            defoliated_digestibility: 0.0,
        }
    }
}

impl DailyGrowth {
    /// Fresh context for a new day. Water and N supply factors, the
    /// allocation fractions and the water demand are kept from yesterday.
    pub fn start_new_day(&self) -> Self {
        DailyGrowth {
            glf_water_supply: self.glf_water_supply,
            glf_water_logging: self.glf_water_logging,
            glf_n_supply: self.glf_n_supply,
            fraction_to_shoot: self.fraction_to_shoot,
            fraction_to_leaf: self.fraction_to_leaf,
            fraction_to_stolon: self.fraction_to_stolon,
            water_demand: self.water_demand,
            ..DailyGrowth::default()
        }
    }

    /// Gross primary production [kg DM/ha].
    pub fn gpp(&self) -> f64 {
        self.gross_photosynthesis / CARBON_FRACTION_IN_DM
    }

    /// Net primary production [kg DM/ha].
    pub fn npp(&self) -> f64 {
        (self.gross_photosynthesis - self.respiration_growth - self.respiration_maintenance) / CARBON_FRACTION_IN_DM
    }

    /// Net above-ground primary production [kg DM/ha].
    pub fn napp(&self) -> f64 {
        self.npp() * self.fraction_to_shoot
    }

    /// Net below-ground primary production [kg DM/ha].
    pub fn nbpp(&self) -> f64 {
        self.npp() * (1.0 - self.fraction_to_shoot)
    }

    pub fn respiration_loss(&self) -> f64 {
        self.respiration_growth + self.respiration_maintenance
    }
}

/// Result of the daily canopy photosynthesis integral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Photosynthesis {
    pub base: f64,             // [kg C/ha/day], before stress factors
    pub glf_radn_intercept: f64,
    pub glf_temperature: f64,
}

/// Rectangular hyperbola light response of a single leaf [mg CO2/m^2 leaf/s].
pub fn single_leaf_photosynthesis(params: &SpeciesParams, irradiance: f64, p_max: f64) -> f64 {
    let theta = params.photosynthesis_curve_factor;
    let alpha_i = params.photosynthetic_efficiency * irradiance;
    let aux1 = alpha_i + p_max;
    let aux2 = 4.0 * theta * alpha_i * p_max;
    (0.5 / theta) * (aux1 - (aux1.powi(2) - aux2).max(0.0).sqrt())
}

/// Canopy photosynthesis for the day.
///
/// The daily integral is approximated with two points: dawn and dusk at
/// half irradiance and mean temperature, midday at full irradiance and a
/// temperature weighted towards the maximum.
pub fn daily_potential_photosynthesis(
    params: &SpeciesParams,
    weather: &DailyWeather,
    effective_green_cover: f64,
    glf_co2: f64,
    glf_n_content: f64,
) -> Photosynthesis {
    let temp_glf1 = temperature_limiting_factor(params, weather.tmean(0.5));
    let temp_glf2 = temperature_limiting_factor(params, weather.tmean(0.75));
    let glf_temperature = 0.25 * temp_glf1 + 0.75 * temp_glf2;

    let p_max1 = params.reference_photosynthetic_rate * temp_glf1 * glf_co2 * glf_n_content;
    let p_max2 = params.reference_photosynthetic_rate * temp_glf2 * glf_co2 * glf_n_content;

    let day_length = 3600.0 * weather.day_length(-6.0); // [s]
    let mut par = if day_length > 0.0 {
        params.fraction_par * weather.radn * 1.0e6 / day_length
    } else {
        0.0
    };
    par *= params.light_extinction_coefficient * (4.0 / 3.0);

    let pl1 = single_leaf_photosynthesis(params, 0.5 * par, p_max1);
    let pl2 = single_leaf_photosynthesis(params, par, p_max2);
    let pl_daily = day_length * (pl1 + pl2) * 0.5;

    let p_ref = 0.25 * p_max1 + 0.75 * p_max2;
    let glf_radn_intercept = if p_ref > 0.0 { (0.25 * pl1 + 0.75 * pl2) / p_ref } else { 1.0 };

    let pc_daily = if params.light_extinction_coefficient > 0.0 {
        pl_daily * effective_green_cover / params.light_extinction_coefficient
    } else {
        0.0
    };
    // mg CO2/m^2 -> g C/m^2 -> kg C/ha
    let base = pc_daily * 0.001 * (12.0 / 44.0) * 10.0;

    Photosynthesis {
        base,
        glf_radn_intercept,
        glf_temperature,
    }
}

/// Maintenance respiration of live tissue [kg C/ha].
pub fn maintenance_respiration(params: &SpeciesParams, live_dm: f64, temperature_factor: f64, glf_n_content: f64) -> f64 {
    let live_c = live_dm * CARBON_FRACTION_IN_DM;
    (live_c * params.maintenance_respiration_coefficient * temperature_factor * glf_n_content).max(0.0)
}

pub fn growth_respiration(params: &SpeciesParams, gross_photosynthesis: f64) -> f64 {
    gross_photosynthesis * params.growth_respiration_coefficient
}

/// Carbon spent on N fixation [kg C/ha]: symbiont maintenance, proportional
/// to live roots, plus fixing activity, proportional to yesterday's fixed N.
pub fn n_fixation_cost(params: &SpeciesParams, weather: &DailyWeather, root_live_dm: f64, fixed_n: f64) -> f64 {
    if params.symbiont_cost_factor <= EPSILON && params.n_fixing_cost_factor <= EPSILON {
        return 0.0;
    }
    let t_factor = temperature_effect_on_respiration(params, weather.tmean(0.5));
    let maintenance = root_live_dm * CARBON_FRACTION_IN_DM * params.symbiont_cost_factor * t_factor;
    let activity = fixed_n * params.n_fixing_cost_factor;
    maintenance + activity
}

/// Net potential growth [kg DM/ha] from the day's carbon balance.
pub fn net_potential_growth(gross: f64, respiration_growth: f64, remobilised_c: f64, respiration_maintenance: f64) -> f64 {
    (gross - respiration_growth + remobilised_c - respiration_maintenance).max(0.0) / CARBON_FRACTION_IN_DM
}

/// N supply growth limiting factor and the growth it allows.
///
/// Returns (glf_n_supply, growth after nutrient limitations). Dilution lets
/// growth carry on at reduced N concentration when the exponent is below one.
pub fn growth_after_nutrients(params: &SpeciesParams, growth_after_water: f64, new_growth_n: f64, demand_optimum: f64) -> (f64, f64) {
    let mut glf_n_supply = 1.0;
    let mut glf_n = 1.0;
    if growth_after_water > EPSILON {
        if new_growth_n > EPSILON {
            glf_n_supply = if demand_optimum > 0.0 {
                (new_growth_n / demand_optimum).clamp(0.0, 1.0)
            } else {
                1.0
            };
            glf_n = glf_n_supply.powf(params.n_dilution_coefficient);
        } else {
            glf_n_supply = 0.0;
            glf_n = 0.0;
        }
    }
    (glf_n_supply, growth_after_water * glf_n.min(params.glf_soil_fertility))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn new_day_keeps_water_and_n_status() {
        let yesterday = DailyGrowth {
            glf_water_supply: 0.4,
            glf_n_supply: 0.7,
            gross_photosynthesis: 55.0,
            n_fixed: 3.0,
            ..DailyGrowth::default()
        };
        let today = yesterday.start_new_day();
        assert_eq!(today.glf_water_supply, 0.4);
        assert_eq!(today.glf_n_supply, 0.7);
        assert_eq!(today.gross_photosynthesis, 0.0);
        assert_eq!(today.n_fixed, 0.0);
    }

    #[test]
    fn single_leaf_response_saturates_at_pmax() {
        let params = SpeciesParams::default();
        assert_eq!(single_leaf_photosynthesis(&params, 0.0, 1.0), 0.0);
        let low = single_leaf_photosynthesis(&params, 50.0, 1.0);
        let high = single_leaf_photosynthesis(&params, 5000.0, 1.0);
        assert!(low < high);
        assert!(high <= 1.0 + 1e-12);
        assert_relative_eq!(single_leaf_photosynthesis(&params, 1e9, 1.0), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn no_radiation_means_no_photosynthesis() {
        let params = SpeciesParams::default();
        let weather = DailyWeather {
            radn: 0.0,
            ..Default::default()
        };
        let p = daily_potential_photosynthesis(&params, &weather, 0.9, 1.0, 1.0);
        assert_eq!(p.base, 0.0);
    }

    #[test]
    fn full_cover_summer_day_is_in_a_sensible_range() {
        let params = SpeciesParams::default();
        let weather = DailyWeather {
            max_t: 22.0,
            min_t: 12.0,
            radn: 20.0,
            day_of_year: 15,
            ..Default::default()
        };
        let p = daily_potential_photosynthesis(&params, &weather, 0.95, 1.0, 1.0);
        // a few tens of kg C/ha/day for a ryegrass sward
        assert!(p.base > 20.0 && p.base < 300.0, "base photosynthesis {}", p.base);
        assert!(p.glf_radn_intercept > 0.0 && p.glf_radn_intercept <= 1.0);
    }

    #[test]
    fn n_limitation_with_dilution() {
        let params = SpeciesParams::default();
        let (glf, growth) = growth_after_nutrients(&params, 100.0, 1.0, 4.0);
        assert_relative_eq!(glf, 0.25);
        assert_relative_eq!(growth, 50.0);
        let (glf, growth) = growth_after_nutrients(&params, 100.0, 0.0, 4.0);
        assert_eq!((glf, growth), (0.0, 0.0));
        let (glf, growth) = growth_after_nutrients(&params, 0.0, 0.0, 0.0);
        assert_eq!((glf, growth), (1.0, 0.0));
    }

    #[test]
    fn net_growth_never_negative() {
        assert_eq!(net_potential_growth(1.0, 0.25, 0.0, 5.0), 0.0);
        assert_relative_eq!(net_potential_growth(10.0, 2.5, 0.0, 1.5), 15.0);
    }
}
