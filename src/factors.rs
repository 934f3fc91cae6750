//! Growth limiting factors and the turnover modifiers.
//!
//! Most are pure functions of today's weather and plant state. Heat and
//! cold stress, water logging, defoliation and the reproductive season
//! carry memory from one day to the next and are kept as small state
//! structs owned by the species.

use crate::params::{PhotosynthesisPathway, SpeciesParams};
use crate::weather::DailyWeather;

// Relative effect of atmospheric CO2 on photosynthesis
pub fn co2_effect_on_photosynthesis(params: &SpeciesParams, co2: f64) -> f64 {
    if (co2 - params.reference_co2).abs() < 0.01 {
        return 1.0;
    }
    let term_actual = co2 / (co2 + params.co2_effect_scale_factor);
    let term_reference = (params.reference_co2 + params.co2_effect_scale_factor) / params.reference_co2;
    term_actual * term_reference
}

// Variation in the optimum leaf N concentration due to CO2 (plants need less N at high CO2)
pub fn n_optimum_variation_due_to_co2(params: &SpeciesParams, co2: f64) -> f64 {
    if (co2 - params.reference_co2).abs() < 0.01 {
        return 1.0;
    }
    let factor = ((params.co2_effect_offset_factor - params.reference_co2) / (co2 - params.reference_co2))
        .powf(params.co2_effect_exponent);
    if !factor.is_finite() {
        return 1.0;
    }
    (params.co2_effect_minimum + factor) / (1.0 + factor)
}

// Effect of live leaf N concentration on photosynthesis
pub fn n_conc_effect_on_photosynthesis(
    n_conc_live: f64,
    n_conc_optimum: f64,
    n_conc_minimum: f64,
    n_optimum_variation: f64,
) -> f64 {
    let adjusted_optimum = n_conc_optimum * n_optimum_variation;
    if n_conc_live <= n_conc_minimum {
        0.0
    } else if n_conc_live < adjusted_optimum {
        let range = adjusted_optimum - n_conc_minimum;
        if range > 0.0 { ((n_conc_live - n_conc_minimum) / range).clamp(0.0, 1.0) } else { 1.0 }
    } else {
        1.0
    }
}

/// Temperature growth limiting factor. Zero at or below the minimum, one
/// at the optimum; C4 plants stay at one above the optimum.
pub fn temperature_limiting_factor(params: &SpeciesParams, temperature: f64) -> f64 {
    let t_min = params.growth_t_minimum;
    let t_opt = params.growth_t_optimum;
    let exponent = params.growth_t_effect_exponent;
    let t_max = t_opt + (t_opt - t_min) / exponent;
    let temperature = match params.pathway {
        PhotosynthesisPathway::C3 => temperature,
        PhotosynthesisPathway::C4 => temperature.min(t_opt),
    };
    if temperature <= t_min || temperature >= t_max {
        return 0.0;
    }
    let val1 = (temperature - t_min).powf(exponent) * (t_max - temperature);
    let val2 = (t_opt - t_min).powf(exponent) * (t_max - t_opt);
    (val1 / val2).max(0.0)
}

pub fn temperature_effect_on_respiration(params: &SpeciesParams, temperature: f64) -> f64 {
    if temperature <= 0.0 {
        return 0.0;
    }
    let scale = 1.0 - (-1.0_f64).exp();
    let base = 1.0 - (-(temperature / params.respiration_t_reference).powf(params.respiration_exponent)).exp();
    base / scale
}

pub fn temperature_factor_for_turnover(params: &SpeciesParams, temperature: f64) -> f64 {
    let t_min = params.turnover_temperature_min;
    let t_ref = params.turnover_temperature_ref;
    if temperature > t_ref {
        1.0
    } else if temperature > t_min {
        ((temperature - t_min) / (t_ref - t_min)).powf(params.turnover_temperature_exponent)
    } else {
        0.0
    }
}

// Turnover increases under drought or water logging
pub fn moisture_effect_on_turnover(params: &SpeciesParams, glf_water_supply: f64, glf_water_logging: f64) -> f64 {
    let water = glf_water_supply.min(glf_water_logging);
    let threshold = params.turnover_drought_threshold;
    if threshold > 0.0 && water < threshold {
        1.0 + params.turnover_drought_effect_max * (threshold - water) / threshold
    } else {
        1.0
    }
}

// Drought slows down the detachment of dead material
pub fn moisture_effect_on_detachment(params: &SpeciesParams, glf_water_supply: f64) -> f64 {
    let min = params.detachment_drought_effect_min;
    let effect = glf_water_supply.clamp(0.0, 1.0).powf(params.detachment_drought_coefficient) * (1.0 - min).max(0.0);
    min + effect
}

// Soil water uptake over demand
pub fn water_deficit_factor(water_uptake: f64, water_demand: f64) -> f64 {
    if water_demand <= 0.0 {
        return 1.0;
    }
    (water_uptake / water_demand).clamp(0.0, 1.0)
}

pub fn plant_cover(params: &SpeciesParams, lai: f64) -> f64 {
    if lai < crate::params::EPSILON {
        return 0.0;
    }
    1.0 - (-params.light_extinction_coefficient * lai).exp()
}

// Plant height from standing herbage [mm]
pub fn height_from_dm(params: &SpeciesParams, standing_dm: f64) -> f64 {
    if standing_dm > params.plant_height_mass_for_max || params.plant_height_mass_for_max <= 0.0 {
        return params.plant_height_maximum;
    }
    let exponent = params.plant_height_exponent;
    let mass_ratio = (standing_dm / params.plant_height_mass_for_max).max(0.0);
    let height_factor = (exponent - exponent * mass_ratio + mass_ratio) * mass_ratio.powf(exponent - 1.0);
    (params.plant_height_maximum * height_factor).max(params.plant_height_minimum)
}

/// Damage to photosynthesis from hot days, with recovery driven by cool
/// degree-days since the last hot day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatStress {
    pub stress: f64,
    pub cumulative_dd: f64,
}

impl Default for HeatStress {
    fn default() -> Self {
        HeatStress {
            stress: 1.0,
            cumulative_dd: 0.0,
        }
    }
}

impl HeatStress {
    pub fn evaluate(&mut self, params: &SpeciesParams, weather: &DailyWeather) -> f64 {
        if !params.use_heat_stress_factor {
            return 1.0;
        }
        let onset = params.heat_onset_temperature;
        let full = params.heat_full_temperature;
        let heat_factor = if weather.max_t > full {
            self.cumulative_dd = 0.0;
            0.0
        } else if weather.max_t > onset {
            self.cumulative_dd = 0.0;
            self.stress * (full - weather.max_t) / (full - onset)
        } else {
            self.stress
        };

        let recovery = if weather.max_t <= onset && params.heat_recovery_sum_dd > 0.0 {
            (1.0 - heat_factor) * (self.cumulative_dd / params.heat_recovery_sum_dd)
        } else {
            0.0
        };
        self.cumulative_dd += (params.heat_recovery_t_reference - weather.tmean(0.5)).max(0.0);
        self.stress = (heat_factor + recovery).min(1.0);
        self.stress
    }
}

/// Frost damage to photosynthesis, with recovery driven by warm degree-days.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColdStress {
    pub stress: f64,
    pub cumulative_dd: f64,
}

impl Default for ColdStress {
    fn default() -> Self {
        ColdStress {
            stress: 1.0,
            cumulative_dd: 0.0,
        }
    }
}

impl ColdStress {
    pub fn evaluate(&mut self, params: &SpeciesParams, weather: &DailyWeather) -> f64 {
        if !params.use_cold_stress_factor {
            return 1.0;
        }
        let onset = params.cold_onset_temperature;
        let full = params.cold_full_temperature;
        let cold_factor = if weather.min_t < full {
            self.cumulative_dd = 0.0;
            0.0
        } else if weather.min_t < onset {
            self.cumulative_dd = 0.0;
            self.stress * (weather.min_t - full) / (onset - full)
        } else {
            self.stress
        };

        let recovery = if weather.min_t >= onset && params.cold_recovery_sum_dd > 0.0 {
            (1.0 - cold_factor) * (self.cumulative_dd / params.cold_recovery_sum_dd)
        } else {
            0.0
        };
        self.cumulative_dd += (weather.tmean(0.5) - params.cold_recovery_t_reference).max(0.0);
        self.stress = (cold_factor + recovery).min(1.0);
        self.stress
    }
}

/// Water contents over the root zone, weighted by the fraction of each
/// layer with roots [mm].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RootZoneWater {
    pub water: f64,
    pub saturation: f64,
    pub minimum_porosity: f64, // water content at the minimum water-free porosity
}

/// Cumulative water logging; persists between days and recovers when the
/// soil is below the water-free porosity threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WaterLogging {
    pub cumulative: f64,
}

impl WaterLogging {
    pub fn evaluate(&mut self, params: &SpeciesParams, zone: &RootZoneWater) -> f64 {
        let range = zone.saturation - zone.minimum_porosity;
        let todays_effect = if zone.water > zone.minimum_porosity && range > 0.0 {
            let effect = params.soil_saturation_effect_max * (zone.water - zone.minimum_porosity) / range;
            effect - params.soil_saturation_recovery_factor * (zone.saturation - zone.water) / range * self.cumulative
        } else {
            -params.soil_saturation_recovery_factor
        };
        self.cumulative = (self.cumulative + todays_effect).clamp(0.0, 1.0);
        1.0 - self.cumulative
    }
}

/// Spreads the effect of a defoliation over the following days.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DefoliationMemory {
    pub cumulative: f64,
    pub pending_fraction: f64, // defoliated since last evaluation
}

impl DefoliationMemory {
    pub fn record(&mut self, fraction: f64) {
        self.pending_fraction += fraction.max(0.0);
    }

    pub fn evaluate(&mut self, params: &SpeciesParams) -> f64 {
        let mut effect = 0.0;
        self.cumulative += self.pending_fraction;
        self.pending_fraction = 0.0;
        if self.cumulative > 0.0 {
            let c = params.turnover_defoliation_coefficient + 1.0;
            let todays = self.cumulative.powf(c) / c;
            if self.cumulative - todays < params.turnover_defoliation_effect_min {
                effect = self.cumulative;
                self.cumulative = 0.0;
            } else {
                effect = self.cumulative - todays;
                self.cumulative = todays;
            }
        }
        effect
    }
}

/// Increase in shoot allocation over the reproductive season of perennials.
///
/// The season has an onset, a main phase and an outset. Its timing and
/// length depend on latitude, and it may wrap around the end of the year.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReproSeason {
    pub doy_start: f64,
    pub intervals: [f64; 3], // onset, main phase, outset [days]
    pub allocation_increase: f64,
}

impl ReproSeason {
    pub fn new(params: &SpeciesParams, latitude: f64) -> Self {
        let abs_lat = latitude.abs();
        let doy_winter_solstice = if latitude < 0.0 { 172.0 } else { 355.0 };
        let aux = (-params.repro_season_timing_coeff * (abs_lat - params.repro_season_reference_latitude)).exp();
        let doy_ini_plateau = doy_winter_solstice + 0.5 * 365.25 / (1.0 + aux);

        let main_phase = 365.25 / 24.0
            + (365.25 * 11.0 / 24.0) * (1.0 - abs_lat / 90.0).powf(params.repro_season_duration_coeff);
        let shoulders = f64::min(365.25 / 2.0, main_phase * params.repro_season_shoulders_length_factor);
        let onset = shoulders * params.repro_season_onset_duration_factor;
        let outset = shoulders * (1.0 - params.repro_season_onset_duration_factor);

        let mut doy_start = doy_ini_plateau - onset;
        if doy_start < 0.0 {
            doy_start += 365.25;
        }
        let aux = (-params.repro_season_allocation_coeff * (abs_lat - params.repro_season_reference_latitude)).exp();
        ReproSeason {
            doy_start,
            intervals: [onset, main_phase, outset],
            allocation_increase: params.repro_season_max_allocation_increase / (1.0 + aux),
        }
    }

    pub fn factor(&self, day_of_year: u32, year: i32) -> f64 {
        let year_length = if is_leap_year(year) { 366.0 } else { 365.0 };
        let doy = day_of_year as f64;
        let doy_a = self.doy_start;
        let doy_b = doy_a + self.intervals[0];
        let doy_c = doy_b + self.intervals[1];
        let doy_d = doy_c + self.intervals[2];
        let increase = self.allocation_increase;

        let extra = if doy > doy_a {
            if doy <= doy_b {
                increase * (doy - doy_a) / (doy_b - doy_a)
            } else if doy <= doy_c {
                increase
            } else if doy <= doy_d {
                increase * (1.0 - (doy - doy_c) / (doy_d - doy_c))
            } else {
                0.0
            }
        } else if doy_c > year_length && doy <= doy_c - year_length {
            increase
        } else if doy_d > year_length && doy <= doy_d - year_length {
            increase * (1.0 - (year_length + doy - doy_c) / (doy_d - doy_c))
        } else {
            0.0
        };
        1.0 + extra
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn co2_effect_is_one_at_reference_and_increases() {
        let p = SpeciesParams::default();
        assert_eq!(co2_effect_on_photosynthesis(&p, 380.0), 1.0);
        let mut last = 0.0;
        for co2 in [200.0, 300.0, 380.0, 500.0, 760.0, 1000.0] {
            let effect = co2_effect_on_photosynthesis(&p, co2);
            assert!(effect >= last);
            last = effect;
        }
        assert!(n_optimum_variation_due_to_co2(&p, 760.0) < 1.0);
    }

    #[test]
    fn temperature_factor_peaks_at_optimum() {
        let p = SpeciesParams::default();
        assert_relative_eq!(temperature_limiting_factor(&p, 20.0), 1.0);
        assert_eq!(temperature_limiting_factor(&p, 0.5), 0.0);
        assert!(temperature_limiting_factor(&p, 28.0) < 1.0);
        let c4 = SpeciesParams {
            pathway: PhotosynthesisPathway::C4,
            ..SpeciesParams::default()
        };
        assert_relative_eq!(temperature_limiting_factor(&c4, 28.0), 1.0);
    }

    #[test]
    fn respiration_is_one_at_reference_temperature() {
        let p = SpeciesParams::default();
        assert_relative_eq!(temperature_effect_on_respiration(&p, 20.0), 1.0, epsilon = 1e-12);
        assert_eq!(temperature_effect_on_respiration(&p, -2.0), 0.0);
    }

    #[test]
    fn heat_stress_recovers_after_hot_day() {
        let p = SpeciesParams::default();
        let mut heat = HeatStress::default();
        let hot = DailyWeather {
            max_t: 36.0,
            min_t: 20.0,
            ..Default::default()
        };
        assert_eq!(heat.evaluate(&p, &hot), 0.0);
        let mild = DailyWeather {
            max_t: 20.0,
            min_t: 10.0,
            ..Default::default()
        };
        let mut previous = 0.0;
        for _ in 0..10 {
            let today = heat.evaluate(&p, &mild);
            assert!(today >= previous);
            previous = today;
        }
        assert_relative_eq!(previous, 1.0);
    }

    #[test]
    fn frost_stress_is_partial_between_thresholds() {
        let p = SpeciesParams::default();
        let mut cold = ColdStress::default();
        let frost = DailyWeather {
            max_t: 8.0,
            min_t: -2.0,
            ..Default::default()
        };
        assert_relative_eq!(cold.evaluate(&p, &frost), 0.5);
    }

    #[test]
    fn water_logging_accumulates_and_recovers() {
        let p = SpeciesParams::default();
        let mut logging = WaterLogging::default();
        let saturated = RootZoneWater {
            water: 450.0,
            saturation: 450.0,
            minimum_porosity: 330.0,
        };
        assert_relative_eq!(logging.evaluate(&p, &saturated), 0.9);
        assert_relative_eq!(logging.evaluate(&p, &saturated), 0.8);
        let drained = RootZoneWater {
            water: 330.0,
            ..saturated
        };
        assert_relative_eq!(logging.evaluate(&p, &drained), 1.0);
    }

    #[test]
    fn defoliation_effect_decays_to_zero() {
        let p = SpeciesParams::default();
        let mut memory = DefoliationMemory::default();
        memory.record(0.8);
        let first = memory.evaluate(&p);
        assert!(first > 0.0 && first <= 0.8);
        let mut total = first;
        for _ in 0..50 {
            total += memory.evaluate(&p);
        }
        assert_relative_eq!(total, 0.8, epsilon = 1e-9);
        assert_eq!(memory.cumulative, 0.0);
    }

    #[test]
    fn repro_season_boosts_allocation_in_spring() {
        let p = SpeciesParams::default();
        let season = ReproSeason::new(&p, -37.8);
        let plateau = season.doy_start + season.intervals[0] + 1.0;
        let doy = (plateau as u32 - 1) % 365 + 1;
        assert_relative_eq!(season.factor(doy, 2001), 1.0 + season.allocation_increase);
        let off_season = (season.doy_start as u32 + 200) % 365;
        assert_eq!(season.factor(off_season, 2001), 1.0);
    }

    #[test]
    fn repro_shoulders_never_exceed_half_a_year() {
        let p = SpeciesParams {
            repro_season_shoulders_length_factor: 10.0,
            ..SpeciesParams::default()
        };
        let season = ReproSeason::new(&p, -37.8);
        assert_relative_eq!(season.intervals[0] + season.intervals[2], 365.25 / 2.0, epsilon = 1e-9);
        assert!(season.doy_start >= 0.0);
    }

    #[test]
    fn moisture_effects_are_bounded() {
        let p = SpeciesParams::default();
        assert_relative_eq!(moisture_effect_on_turnover(&p, 0.0, 1.0), 2.0);
        assert_eq!(moisture_effect_on_turnover(&p, 1.0, 1.0), 1.0);
        assert_relative_eq!(moisture_effect_on_detachment(&p, 0.0), 0.1);
        assert_relative_eq!(moisture_effect_on_detachment(&p, 1.0), 1.0);
        assert_eq!(water_deficit_factor(1.0, 0.0), 1.0);
    }
}
