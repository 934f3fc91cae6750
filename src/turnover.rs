//! Daily tissue turnover rates for shoot, stolons, roots and dead material.

use crate::error::{PastureError, Result};
use crate::factors::{moisture_effect_on_detachment, moisture_effect_on_turnover, temperature_factor_for_turnover};
use crate::organ::ratio;
use crate::params::{CARBON_FRACTION_IN_DM, SpeciesParams};
use crate::phenology::PhenologicStage;

/// Environmental and plant drivers of today's turnover.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnoverDrivers {
    pub temperature: f64,        // mean temperature [oC]
    pub glf_water_supply: f64,   // yesterday's value
    pub glf_water_logging: f64,  // yesterday's value
    pub defoliation_factor: f64,
    pub digestibility_dead: f64, // of standing dead leaves and stems
    pub stage: PhenologicStage,
    pub pheno_factor: f64,
}

/// Leaf and stem DM used to keep live shoot above its minimum.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShootTurnoverState {
    pub green_dm: f64,          // live leaves and stems
    pub mature_dm: f64,         // mature tissue of leaves and stems
    pub minimum_standing_live: f64,
}

/// Today's turnover rates [/day].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TurnoverRates {
    pub live_shoot: f64,  // leaves and stems
    pub stolons: f64,
    pub roots: Vec<f64>,  // one per root zone
    pub dead_shoot: f64,  // detachment
    pub ttf_temperature: f64,
    pub ttf_moisture_shoot: f64,
}

impl TurnoverRates {
    /// Per-tissue rates for leaves and stems: emerging, developing, mature, dead.
    pub fn leaf_and_stem(&self, params: &SpeciesParams) -> [f64; 4] {
        [
            (self.live_shoot * params.relative_turnover_emerging).min(1.0),
            self.live_shoot,
            self.live_shoot,
            self.dead_shoot,
        ]
    }

    /// Stolons have no standing dead pool; all dead stolon detaches.
    pub fn stolon(&self, params: &SpeciesParams) -> [f64; 4] {
        [
            (self.stolons * params.relative_turnover_emerging).min(1.0),
            self.stolons,
            self.stolons,
            1.0,
        ]
    }
}

/// Computes the turnover rates for every organ.
///
/// `roots` holds (live DM, minimum live DM) for each root zone. Rates that
/// fall outside [0, 1] before any phenology adjustment or bounding are an
/// error; after the adjustments every rate is bounded to [0, 1].
pub fn evaluate_turnover_rates(
    params: &SpeciesParams,
    drivers: &TurnoverDrivers,
    shoot: &ShootTurnoverState,
    roots: &[(f64, f64)],
) -> Result<TurnoverRates> {
    let ttf_temperature = temperature_factor_for_turnover(params, drivers.temperature);
    let ttf_moisture_shoot = moisture_effect_on_turnover(params, drivers.glf_water_supply, drivers.glf_water_logging);
    let ttf_moisture_litter = moisture_effect_on_detachment(params, drivers.glf_water_supply);
    let ttf_leaf_number = 3.0 / params.live_leaves_per_tiller;
    let ttf_moisture_root = 2.0 - drivers.glf_water_supply.min(drivers.glf_water_logging);
    let defoliation = drivers.defoliation_factor;

    let mut gama = params.tissue_turnover_rate_shoot * ttf_temperature * ttf_moisture_shoot * ttf_leaf_number;
    let mut gama_s = if params.is_legume() { gama + defoliation * (1.0 - gama) } else { 0.0 };
    let mut gama_r = params.tissue_turnover_rate_root * ttf_temperature * ttf_moisture_root;
    gama_r += params.turnover_defoliation_root_effect * defoliation * (1.0 - gama_r);
    let mut gama_d = params.detachment_rate_shoot * ttf_moisture_litter * drivers.digestibility_dead / CARBON_FRACTION_IN_DM;

    for (name, value) in [("gama", gama), ("gama_s", gama_s), ("gama_r", gama_r), ("gama_d", gama_d)] {
        if !(0.0..=1.0).contains(&value) {
            return Err(PastureError::TurnoverRateOutOfRange {
                species: params.name.clone(),
                name,
                value,
            });
        }
    }

    if params.is_annual {
        let pf = drivers.pheno_factor;
        match drivers.stage {
            PhenologicStage::Vegetative => {
                // turnover is zero at emergence and increases with age
                gama *= pf.powf(0.5);
                gama_r *= pf.powi(2);
                gama_d *= pf.powi(2);
            }
            PhenologicStage::Reproductive => {
                // increases with age, reaching one at maturity
                gama += (1.0 - gama) * pf.powi(2);
                gama_r += (1.0 - gama_r) * pf.powi(3);
                gama_d += (1.0 - gama_d) * pf.powi(3);
            }
            _ => {}
        }
    }

    // senescence must not take live leaves and stems below their minimum
    if gama > 0.0 {
        let green_to_be = shoot.green_dm - shoot.mature_dm * gama;
        if green_to_be < shoot.minimum_standing_live {
            let gama_base = gama;
            gama = ratio(shoot.green_dm - shoot.minimum_standing_live, shoot.mature_dm);
            // stolons and roots get half of the reduction
            let dm_factor = 0.5 * (gama_base + gama) / gama_base;
            gama_s *= dm_factor;
            gama_r *= dm_factor;
        }
    }

    let root_rates = roots
        .iter()
        .map(|&(live, minimum)| {
            let rate = if live * (1.0 - gama_r) < minimum {
                if live <= minimum { 0.0 } else { ratio(live - minimum, live) }
            } else {
                gama_r
            };
            rate.clamp(0.0, 1.0)
        })
        .collect();

    Ok(TurnoverRates {
        live_shoot: gama.clamp(0.0, 1.0),
        stolons: gama_s.clamp(0.0, 1.0),
        roots: root_rates,
        dead_shoot: gama_d.clamp(0.0, 1.0),
        ttf_temperature,
        ttf_moisture_shoot,
    })
}
