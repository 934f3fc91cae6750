//! The pasture species: owns the organs, the phenology and the stress
//! memory, and runs the daily growth cycle.
//!
//! A day goes through these calls, in this order:
//! `on_daily_initialisation`, canopy setters (`set_potential_ep`,
//! `set_light_profile`), water arbitration, `do_potential_growth`, N
//! arbitration and finally `do_actual_growth`, which applies the day's
//! transfers, checks the mass balance and sends detached material to the
//! litter sink.

use crate::allocation::{OrganFractions, fraction_to_leaf, fraction_to_shoot};
use crate::capabilities::{CanopyQuery, LitterSink, NitrogenUptakeParticipant, WaterUptakeParticipant};
use crate::error::{PastureError, Result};
use crate::factors::{
    ColdStress, DefoliationMemory, HeatStress, ReproSeason, RootZoneWater, WaterLogging, co2_effect_on_photosynthesis,
    n_conc_effect_on_photosynthesis, n_optimum_variation_due_to_co2, temperature_effect_on_respiration,
    temperature_limiting_factor, water_deficit_factor,
};
use crate::growth::{
    DailyGrowth, daily_potential_photosynthesis, growth_after_nutrients, growth_respiration, maintenance_respiration,
    n_fixation_cost, net_potential_growth,
};
use crate::organ::{AboveGroundOrgan, BiomassRemovalType, DEAD, MATURE, OrganBiomassRemoval, ratio};
use crate::params::{EPSILON, SpeciesParams};
use crate::phenology::{PhenologicStage, Phenology, PhenologyEvent};
use crate::root::{RootOrgan, RootParams};
use crate::soil::{SoilProfile, ZoneWaterAndN};
use crate::turnover::{ShootTurnoverState, TurnoverDrivers, evaluate_turnover_rates};
use crate::weather::DailyWeather;
use tracing::{debug, info, warn};

/// Who computes the soil water and N uptake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UptakeSource {
    /// An external arbitrator shares the soil between plants.
    #[default]
    Arbitrator,
    /// The species takes up water and N by itself.
    Species,
    /// Uptake is supplied by another model.
    External,
}

// Root zone registered on top of the home zone
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ZoneSetup {
    pub zone_name: String,
    pub root_depth: f64, // [mm]
    pub root_dm: f64,    // [kg/ha]
}

#[derive(Debug, Clone)]
pub struct PastureSpecies {
    pub params: SpeciesParams,
    pub leaves: AboveGroundOrgan,
    pub stems: AboveGroundOrgan,
    pub stolons: AboveGroundOrgan,
    /// One root organ per zone; the first is the home zone.
    pub roots: Vec<RootOrgan>,
    pub phenology: Phenology,
    /// Scratch values of the current day, kept for reporting.
    pub today: DailyGrowth,
    pub(crate) weather: DailyWeather,
    pub(crate) is_sown: bool,

    pub(crate) soils: Vec<SoilProfile>,
    pub(crate) extra_zones: Vec<ZoneSetup>,

    pub(crate) heat: HeatStress,
    pub(crate) cold: ColdStress,
    pub(crate) water_logging: WaterLogging,
    pub(crate) defoliation: DefoliationMemory,
    pub(crate) repro_season: ReproSeason,
    repro_latitude: f64,

    pub(crate) intercepted_radn: f64,     // [MJ/m^2]
    pub(crate) effective_green_cover: f64,
    fixed_n_yesterday: f64,
    uptake_source: UptakeSource,
}

impl PastureSpecies {
    /// Builds the species over the given soil zones; the first zone is the
    /// home zone of the roots.
    pub fn new(params: SpeciesParams, soils: &[SoilProfile]) -> Result<Self> {
        params.validate()?;
        let home = soils
            .first()
            .ok_or_else(|| PastureError::config("at least one soil zone is needed to grow roots"))?;
        for soil in soils {
            soil.validate()?;
        }

        let mut leaves = AboveGroundOrgan::new("Leaves", params.n_thresholds_leaves);
        let mut stems = AboveGroundOrgan::new("Stems", params.n_thresholds_stems);
        let mut stolons = AboveGroundOrgan::new("Stolons", params.n_thresholds_stolons);
        for organ in [&mut leaves, &mut stems, &mut stolons] {
            organ.set_tissue_parameters(
                &params.fraction_n_luxury_remobilisable,
                &params.digestibilities_cell_wall,
                params.digestibility_protein,
                params.sugar_fraction_new_growth,
            );
        }
        leaves.minimum_live_dm = params.minimum_green_wt * params.minimum_green_leaf_prop;
        stems.minimum_live_dm = params.minimum_green_wt * (1.0 - params.minimum_green_leaf_prop);
        stolons.minimum_live_dm = 0.0;
        stolons.fraction_standing = params.fraction_stolon_standing;

        // removal defaults; stolons only lose live tissue
        for removal_type in [BiomassRemovalType::Harvest, BiomassRemovalType::Graze, BiomassRemovalType::Cut] {
            leaves.set_removal_fractions(removal_type, OrganBiomassRemoval::new(0.5, 0.5));
            stems.set_removal_fractions(removal_type, OrganBiomassRemoval::new(0.5, 0.5));
            stolons.set_removal_fractions(removal_type, OrganBiomassRemoval::new(0.5, 0.0));
        }

        let root = new_root(&params, home);
        let weather = DailyWeather::default();
        let repro_season = ReproSeason::new(&params, weather.latitude);

        let mut species = PastureSpecies {
            leaves,
            stems,
            stolons,
            roots: vec![root],
            phenology: Phenology::default(),
            today: DailyGrowth::default(),
            repro_latitude: weather.latitude,
            weather,
            is_sown: false,
            soils: soils.to_vec(),
            extra_zones: Vec::new(),
            heat: HeatStress::default(),
            cold: ColdStress::default(),
            water_logging: WaterLogging::default(),
            defoliation: DefoliationMemory::default(),
            repro_season,
            intercepted_radn: 0.0,
            effective_green_cover: 0.0,
            fixed_n_yesterday: 0.0,
            uptake_source: UptakeSource::default(),
            params,
        };
        species.set_initial_state();
        info!(
            species = %species.params.name,
            shoot_dm = species.above_ground_wt(),
            root_dm = species.below_ground_wt(),
            "pasture species initialised"
        );
        Ok(species)
    }

    /// Registers roots in another soil zone.
    pub fn add_zone(&mut self, zone_name: &str, root_depth: f64, root_dm: f64) -> Result<()> {
        let soil = self
            .soils
            .iter()
            .find(|s| s.zone_name == zone_name)
            .ok_or_else(|| PastureError::ZoneNotFound {
                zone: zone_name.to_string(),
            })?;
        if self.roots.iter().any(|r| r.zone_name == zone_name) {
            return Err(PastureError::config(format!("roots already exist in zone {}", zone_name)));
        }
        if root_depth > self.params.root_depth_maximum {
            return Err(PastureError::config(format!(
                "root depth for zone {} is greater than the maximum root depth",
                zone_name
            )));
        }
        let mut root = new_root(&self.params, soil);
        if self.is_alive() {
            root.set_state(root_depth, root_dm);
        }
        self.roots.push(root);
        self.extra_zones.push(ZoneSetup {
            zone_name: zone_name.to_string(),
            root_depth,
            root_dm,
        });
        info!(species = %self.params.name, zone = zone_name, root_depth, root_dm, "added root zone");
        Ok(())
    }

    pub fn set_uptake_source(&mut self, source: UptakeSource) {
        self.uptake_source = source;
    }

    pub fn uptake_source(&self) -> UptakeSource {
        self.uptake_source
    }

    // Initial DM and N of every organ, from the parameter set
    pub(crate) fn set_initial_state(&mut self) {
        let shoot_dm = self.params.initial_shoot_dm;
        if shoot_dm > EPSILON {
            let f = *self.params.initial_dm_fractions();
            self.leaves.set_state([f[0] * shoot_dm, f[1] * shoot_dm, f[2] * shoot_dm, f[3] * shoot_dm], false);
            self.stems.set_state([f[4] * shoot_dm, f[5] * shoot_dm, f[6] * shoot_dm, f[7] * shoot_dm], false);
            self.stolons.set_state([f[8] * shoot_dm, f[9] * shoot_dm, f[10] * shoot_dm, 0.0], false);
            let (depth, dm) = (self.params.initial_root_depth, self.params.initial_root_dm);
            self.roots[0].set_state(depth, dm);
            for (root, setup) in self.roots[1..].iter_mut().zip(self.extra_zones.iter()) {
                root.set_state(setup.root_depth, setup.root_dm);
            }
            self.phenology = Phenology::new(PhenologicStage::Vegetative);
            self.is_sown = true;
        } else {
            for organ in [&mut self.leaves, &mut self.stems, &mut self.stolons] {
                organ.do_reset_organ();
            }
            for root in self.roots.iter_mut() {
                root.do_reset_organ();
                root.set_depth(0.0);
            }
            if shoot_dm < 0.0 {
                self.phenology = Phenology::new(PhenologicStage::NotGrowing);
                self.is_sown = false;
            } else {
                self.phenology = Phenology::new(PhenologicStage::Germinating);
                self.is_sown = true;
            }
        }
    }

    /// Plant DM at emergence: a minimum of green shoot and roots at the
    /// minimum rooting depth.
    pub fn set_emergence_state(&mut self) {
        let dm = self.params.minimum_green_wt;
        let f = self.params.emergence_dm_fractions;
        self.leaves.set_state([f[0] * dm, f[1] * dm, f[2] * dm, f[3] * dm], true);
        self.stems.set_state([f[4] * dm, f[5] * dm, f[6] * dm, f[7] * dm], true);
        self.stolons.set_state([f[8] * dm, f[9] * dm, f[10] * dm, 0.0], true);
        let root_dm = self.roots[0].minimum_live_dm;
        self.roots[0].set_state(self.params.root_depth_minimum, root_dm);
        self.phenology.set_emergence();
        info!(species = %self.params.name, shoot_dm = self.above_ground_wt(), "plant emerged");
    }

    pub fn is_sown(&self) -> bool {
        self.is_sown
    }

    /// Sown and past germination.
    pub fn is_alive(&self) -> bool {
        self.is_sown && self.phenology.stage >= PhenologicStage::Vegetative
    }

    pub fn phenologic_stage(&self) -> PhenologicStage {
        self.phenology.stage
    }

    /// Sows the species; germination starts on the next day.
    pub fn sow(&mut self) {
        if self.is_sown {
            warn!(species = %self.params.name, "sowing was requested but the species is already sown");
            return;
        }
        self.is_sown = true;
        self.phenology = Phenology::new(PhenologicStage::Germinating);
        info!(species = %self.params.name, "species sown");
    }

    /// Starts a new day: zeroes the daily values and the organ transfers.
    pub fn on_daily_initialisation(&mut self, weather: &DailyWeather) {
        if (weather.latitude - self.repro_latitude).abs() > EPSILON {
            self.repro_season = ReproSeason::new(&self.params, weather.latitude);
            self.repro_latitude = weather.latitude;
        }
        self.weather = *weather;
        self.fixed_n_yesterday = self.today.n_fixed;
        self.today = self.today.start_new_day();
        for organ in [&mut self.leaves, &mut self.stems, &mut self.stolons] {
            organ.do_clean_transfer_amounts();
        }
        for root in self.roots.iter_mut() {
            root.do_clean_transfer_amounts();
            root.clear_uptake();
        }
        // used unless a light profile is supplied
        self.effective_green_cover = self.cover_green();
        self.intercepted_radn = self.effective_green_cover * weather.radn;
    }

    /// Phenology, tissue turnover, potential growth and the water-limited growth.
    pub fn do_potential_growth(&mut self, litter: &mut dyn LitterSink) -> Result<()> {
        if self.params.is_annual {
            match self.phenology.evaluate_annual(&self.params, &self.weather) {
                PhenologyEvent::GerminationStarted => {
                    self.is_sown = true;
                    info!(species = %self.params.name, "germination started");
                }
                PhenologyEvent::Anthesis => info!(species = %self.params.name, "anthesis"),
                PhenologyEvent::Maturity => {
                    info!(species = %self.params.name, "maturity reached");
                    return self.end_crop(litter);
                }
                PhenologyEvent::None => {}
            }
        }
        if !self.is_sown {
            return Ok(());
        }
        if self.phenology.stage == PhenologicStage::Germinating {
            if self.phenology.daily_germination_progress(&self.params, &self.weather) >= 1.0 {
                self.set_emergence_state();
            } else {
                return Ok(());
            }
        }
        if self.phenology.stage < PhenologicStage::Vegetative {
            return Ok(());
        }

        self.evaluate_tissue_turnover()?;
        self.evaluate_potential_growth();
        self.evaluate_allocation_fractions();
        self.evaluate_water_limitation();
        self.evaluate_n_demand();
        Ok(())
    }

    fn evaluate_tissue_turnover(&mut self) -> Result<()> {
        let dead_dm = self.leaves.dm_dead() + self.stems.dm_dead();
        let digestibility_dead = ratio(
            self.leaves.digestibility_dead() * self.leaves.dm_dead() + self.stems.digestibility_dead() * self.stems.dm_dead(),
            dead_dm,
        );
        let drivers = TurnoverDrivers {
            temperature: self.weather.tmean(0.5),
            glf_water_supply: self.today.glf_water_supply,
            glf_water_logging: self.today.glf_water_logging,
            defoliation_factor: self.defoliation.evaluate(&self.params),
            digestibility_dead,
            stage: self.phenology.stage,
            pheno_factor: self.phenology.pheno_factor,
        };
        let shoot = ShootTurnoverState {
            green_dm: self.leaves.dm_live() + self.stems.dm_live(),
            mature_dm: self.leaves.tissues[MATURE].dm + self.stems.tissues[MATURE].dm,
            minimum_standing_live: self.leaves.minimum_live_dm + self.stems.minimum_live_dm,
        };
        let root_state: Vec<(f64, f64)> = self.roots.iter().map(|r| (r.dm_live(), r.minimum_live_dm)).collect();
        let rates = evaluate_turnover_rates(&self.params, &drivers, &shoot, &root_state)?;

        let shoot_rates = rates.leaf_and_stem(&self.params);
        self.leaves.do_tissue_turnover(shoot_rates);
        self.stems.do_tissue_turnover(shoot_rates);
        if self.params.is_legume() {
            self.stolons.do_tissue_turnover(rates.stolon(&self.params));
        }
        for (root, rate) in self.roots.iter_mut().zip(rates.roots.iter()) {
            root.do_tissue_turnover(*rate, 1.0);
        }

        let today = &mut self.today;
        today.turnover_live_shoot = rates.live_shoot;
        today.turnover_dead_shoot = rates.dead_shoot;
        today.turnover_stolons = rates.stolons;
        today.turnover_roots = rates.roots.first().copied().unwrap_or(0.0);
        today.ttf_temperature = rates.ttf_temperature;
        today.ttf_moisture_shoot = rates.ttf_moisture_shoot;
        today.detached_shoot_dm = self.leaves.dm_detached() + self.stems.dm_detached() + self.stolons.dm_detached();
        today.detached_shoot_n = self.leaves.n_detached() + self.stems.n_detached() + self.stolons.n_detached();
        today.detached_root_dm = self.roots.iter().map(|r| r.dm_detached()).sum();
        today.detached_root_n = self.roots.iter().map(|r| r.n_detached()).sum();
        Ok(())
    }

    fn evaluate_potential_growth(&mut self) {
        let params = &self.params;
        let weather = &self.weather;
        let n_variation = n_optimum_variation_due_to_co2(params, weather.co2);
        let glf_co2 = co2_effect_on_photosynthesis(params, weather.co2);
        let glf_n_content = n_conc_effect_on_photosynthesis(
            self.leaves.n_conc_live(),
            self.leaves.n_conc_optimum,
            self.leaves.n_conc_minimum,
            n_variation,
        );
        let photosynthesis =
            daily_potential_photosynthesis(params, weather, self.effective_green_cover, glf_co2, glf_n_content);
        let glf_heat = self.heat.evaluate(params, weather);
        let glf_cold = self.cold.evaluate(params, weather);

        let mut base = photosynthesis.base;
        if params.is_annual {
            base *= self.phenology.annual_growth_factor(params);
        }
        let gross = base * glf_heat.min(glf_cold) * params.glf_generic;

        let temperature_factor = temperature_effect_on_respiration(params, weather.tmean(0.5));
        let live_dm = self.above_ground_live_wt() + self.below_ground_live_wt();
        let respiration_maintenance = maintenance_respiration(params, live_dm, temperature_factor, glf_n_content);
        let respiration_growth = growth_respiration(params, gross);
        let fixation_cost = if params.is_legume() {
            n_fixation_cost(params, weather, self.below_ground_live_wt(), self.fixed_n_yesterday)
        } else {
            0.0
        };

        let today = &mut self.today;
        today.glf_co2 = glf_co2;
        today.glf_n_content = glf_n_content;
        today.glf_radn_intercept = photosynthesis.glf_radn_intercept;
        today.glf_temperature = photosynthesis.glf_temperature;
        today.glf_heat = glf_heat;
        today.glf_cold = glf_cold;
        today.base_photosynthesis = base;
        today.gross_photosynthesis = gross;
        today.temperature_factor_respiration = temperature_factor;
        today.respiration_maintenance = respiration_maintenance;
        today.respiration_growth = respiration_growth;
        today.n_fixation_cost = fixation_cost;
        today.remobilised_c = 0.0;
        today.growth_potential = net_potential_growth(gross, respiration_growth, 0.0, respiration_maintenance);
    }

    // Uses yesterday's limiting factors, still held in the daily context
    fn evaluate_allocation_fractions(&mut self) {
        let params = &self.params;
        let glf_min = self
            .today
            .glf_water_supply
            .min(self.today.glf_water_logging)
            .min(self.today.glf_n_supply);
        let repro_factor = if params.use_repro_season_factor && !params.is_annual {
            self.repro_season.factor(self.weather.day_of_year, self.weather.year)
        } else {
            1.0
        };
        let above_live = self.above_ground_live_wt();
        let f_shoot = fraction_to_shoot(params, glf_min, above_live, self.below_ground_live_wt(), repro_factor);
        let f_leaf = fraction_to_leaf(
            params,
            above_live,
            self.leaves.dm_live(),
            self.stems.dm_live() + self.stolons.dm_live(),
        );
        self.today.fraction_to_shoot = f_shoot;
        self.today.fraction_to_leaf = f_leaf;
        self.today.fraction_to_stolon = params.fraction_to_stolon;
    }

    fn evaluate_water_limitation(&mut self) {
        self.today.glf_water_supply = water_deficit_factor(self.today.water_uptake, self.today.water_demand);

        let home = &self.roots[0];
        let soil = home.soil();
        let mut zone = RootZoneWater::default();
        for (layer, soil_layer) in soil.layers.iter().enumerate().take(home.bottom_layer + 1) {
            let f = home.fraction_layer_with_roots(layer);
            zone.water += soil_layer.water * f;
            zone.saturation += soil_layer.sat * f;
            zone.minimum_porosity += if self.params.minimum_water_free_porosity <= -EPSILON {
                soil_layer.dul * f
            } else {
                soil_layer.sat * (1.0 - self.params.minimum_water_free_porosity) * f
            };
        }
        self.today.glf_water_logging = self.water_logging.evaluate(&self.params, &zone);
        self.today.growth_after_water =
            self.today.growth_potential * self.today.glf_water_supply.min(self.today.glf_water_logging);
    }

    fn evaluate_n_demand(&mut self) {
        let fractions = self.organ_fractions();
        let growth = self.today.growth_after_water;
        self.today.n_demand_optimum = fractions.n_demand(growth, self.n_conc_optimum_today());
        self.today.n_demand_luxury = fractions.n_demand(growth, self.n_conc_maximum());
    }

    pub(crate) fn organ_fractions(&self) -> OrganFractions {
        OrganFractions::new(self.today.fraction_to_shoot, self.today.fraction_to_leaf, self.today.fraction_to_stolon)
    }

    // Optimum N concentrations adjusted for today's CO2
    fn n_conc_optimum_today(&self) -> [f64; 4] {
        let variation = n_optimum_variation_due_to_co2(&self.params, self.weather.co2);
        [
            self.leaves.n_conc_optimum * variation,
            self.stems.n_conc_optimum * variation,
            self.stolons.n_conc_optimum * variation,
            self.roots[0].n_conc_optimum * variation,
        ]
    }

    fn n_conc_maximum(&self) -> [f64; 4] {
        [
            self.leaves.n_conc_maximum,
            self.stems.n_conc_maximum,
            self.stolons.n_conc_maximum,
            self.roots[0].n_conc_maximum,
        ]
    }

    fn check_uptake_source(&self, what: &str) -> Result<()> {
        match self.uptake_source {
            UptakeSource::Arbitrator => Ok(()),
            other => Err(PastureError::not_implemented(format!("{} with uptake source {:?}", what, other))),
        }
    }

    // N fixation and remobilisation of senesced N; returns the N still
    // needed from the soil
    fn evaluate_n_supply_before_soil(&mut self) -> f64 {
        let params = &self.params;
        let demand_optimum = self.today.n_demand_optimum * params.glf_soil_fertility;
        let mut fixed = 0.0;
        if params.is_legume() && demand_optimum > EPSILON {
            fixed = params.minimum_n_fixation * demand_optimum;
            let shortfall = demand_optimum - fixed;
            let n_stress = if shortfall > EPSILON {
                (self.today.soil_n_available / shortfall).max(0.0)
            } else {
                1.0
            };
            if n_stress < 0.99 {
                fixed += (params.maximum_n_fixation - params.minimum_n_fixation) * (1.0 - n_stress) * demand_optimum;
            }
        }
        self.today.n_fixed = fixed;

        let demand_luxury = self.today.n_demand_luxury * params.glf_soil_fertility;
        let senesced_available = self.leaves.n_senesced_remobilisable()
            + self.stems.n_senesced_remobilisable()
            + self.stolons.n_senesced_remobilisable()
            + self.roots.iter().map(|r| r.n_senesced_remobilisable()).sum::<f64>();

        let (fraction, soil_demand) = if demand_luxury - fixed < EPSILON {
            (0.0, 0.0)
        } else if demand_luxury - (fixed + senesced_available) < EPSILON {
            (ratio(demand_luxury - fixed, senesced_available), 0.0)
        } else {
            (1.0, demand_luxury - fixed - senesced_available)
        };

        let mut remobilised = 0.0;
        if fraction > 0.0 {
            for organ in [&mut self.leaves, &mut self.stems, &mut self.stolons] {
                remobilised += organ.tissues[DEAD].remobilise_n(fraction);
            }
            for root in self.roots.iter_mut() {
                remobilised += root.dead.remobilise_n(fraction);
            }
        }
        self.today.n_senesced_remobilised = remobilised;
        self.today.soil_n_demand = soil_demand;
        soil_demand
    }

    /// N uptake, luxury N remobilisation, growth after nutrient limitation,
    /// allocation and the organ update; detached material goes to `litter`.
    pub fn do_actual_growth(&mut self, litter: &mut dyn LitterSink) -> Result<()> {
        if !self.is_sown || self.phenology.stage < PhenologicStage::Vegetative {
            return Ok(());
        }
        self.check_uptake_source("actual growth")?;

        self.today.n_luxury_remobilised = self.remobilise_luxury_n();
        let today = &mut self.today;
        today.n_new_growth = today.n_fixed + today.n_senesced_remobilised + today.soil_n_uptake + today.n_luxury_remobilised;
        let (glf_n_supply, growth) =
            growth_after_nutrients(&self.params, today.growth_after_water, today.n_new_growth, today.n_demand_optimum);
        today.glf_n_supply = glf_n_supply;
        today.growth_after_nutrients = growth;

        if growth > EPSILON {
            self.allocate_new_growth(growth)?;
        } else {
            let today = &mut self.today;
            today.growth_shoot_dm = 0.0;
            today.growth_shoot_n = 0.0;
            today.growth_root_dm = 0.0;
            today.growth_root_n = 0.0;
        }
        self.today.growth_net = self.today.growth_after_nutrients - self.today.detached_shoot_dm - self.today.detached_root_dm;

        self.update_organs()?;
        self.send_detached_material(litter);

        debug!(
            species = %self.params.name,
            gross_photosynthesis = self.today.gross_photosynthesis,
            growth_potential = self.today.growth_potential,
            growth_after_water = self.today.growth_after_water,
            growth_after_nutrients = self.today.growth_after_nutrients,
            n_fixed = self.today.n_fixed,
            soil_n_uptake = self.today.soil_n_uptake,
            detached_shoot_dm = self.today.detached_shoot_dm,
            "daily growth"
        );
        Ok(())
    }

    // Takes luxury N, oldest tissue first, while new growth is short of the
    // optimum demand
    fn remobilise_luxury_n(&mut self) -> f64 {
        let today = &self.today;
        let mut missing = today.n_demand_optimum * self.params.glf_soil_fertility
            - (today.n_fixed + today.n_senesced_remobilised + today.soil_n_uptake);
        if missing <= EPSILON {
            return 0.0;
        }

        let luxury_available = self.leaves.n_luxury_remobilisable()
            + self.stems.n_luxury_remobilisable()
            + self.stolons.n_luxury_remobilisable()
            + self.roots.iter().map(|r| r.n_luxury_remobilisable()).sum::<f64>();
        if luxury_available <= EPSILON {
            return 0.0;
        }

        let mut remobilised = 0.0;
        if missing >= luxury_available {
            for organ in [&mut self.leaves, &mut self.stems, &mut self.stolons] {
                for tissue in organ.tissues[..DEAD].iter_mut() {
                    remobilised += tissue.remobilise_n(1.0);
                }
            }
            for root in self.roots.iter_mut() {
                remobilised += root.live.remobilise_n(1.0);
            }
            return remobilised;
        }

        for t in (0..DEAD).rev() {
            let mut available: f64 = [&self.leaves, &self.stems, &self.stolons]
                .iter()
                .map(|o| o.tissues[t].n_remobilisable)
                .sum();
            if t == 0 {
                available += self.roots.iter().map(|r| r.live.n_remobilisable).sum::<f64>();
            }
            if available <= EPSILON {
                continue;
            }
            let fraction = available.min(missing) / available;
            let mut taken = 0.0;
            for organ in [&mut self.leaves, &mut self.stems, &mut self.stolons] {
                taken += organ.tissues[t].remobilise_n(fraction);
            }
            if t == 0 {
                for root in self.roots.iter_mut() {
                    taken += root.live.remobilise_n(fraction);
                }
            }
            remobilised += taken;
            missing -= taken;
            if missing <= EPSILON {
                break;
            }
        }
        remobilised
    }

    fn allocate_new_growth(&mut self, growth: f64) -> Result<()> {
        let fractions = self.organ_fractions();
        let n_conc = if self.today.n_new_growth > self.today.n_demand_optimum {
            self.n_conc_maximum()
        } else {
            self.n_conc_optimum_today()
        };
        let n_split = fractions.split_n(&self.params.name, self.today.n_new_growth, n_conc)?;

        self.leaves.add_new_growth(growth * fractions.leaves, n_split[0]);
        self.stems.add_new_growth(growth * fractions.stems, n_split[1]);
        self.stolons.add_new_growth(growth * fractions.stolons, n_split[2]);

        // roots grow in each zone in proportion to their live DM
        let root_dm = growth * fractions.roots;
        let root_n = n_split[3];
        let live_total: f64 = self.roots.iter().map(|r| r.dm_live()).sum();
        let temperature_factor = 0.5 + 0.5 * temperature_limiting_factor(&self.params, self.weather.tmean(0.5));
        for (z, root) in self.roots.iter_mut().enumerate() {
            let share = if live_total > EPSILON {
                root.dm_live() / live_total
            } else if z == 0 {
                1.0
            } else {
                0.0
            };
            let zone_dm = share * root_dm;
            let net_root_growth = zone_dm - root.dm_detached();
            if net_root_growth > EPSILON {
                root.evaluate_root_elongation(net_root_growth, temperature_factor);
            }
            root.add_new_growth(zone_dm, share * root_n);
        }

        let today = &mut self.today;
        today.growth_shoot_dm = growth * fractions.shoot();
        today.growth_shoot_n = n_split[0] + n_split[1] + n_split[2];
        today.growth_root_dm = root_dm;
        today.growth_root_n = root_n;
        Ok(())
    }

    // Applies the day's transfers to every organ and checks the whole-plant balance
    fn update_organs(&mut self) -> Result<()> {
        let pre_dm = self.total_wt();
        let pre_n = self.total_n();

        self.leaves.do_organ_update()?;
        self.stems.do_organ_update()?;
        self.stolons.do_organ_update()?;
        for root in self.roots.iter_mut() {
            root.do_organ_update()?;
        }

        let today = &self.today;
        let context = format!("growth and tissue turnover of {}", self.params.name);
        let dm_in = today.growth_shoot_dm + today.growth_root_dm;
        let dm_diff = pre_dm + dm_in - today.detached_shoot_dm - today.detached_root_dm - self.total_wt();
        if dm_diff.abs() > EPSILON {
            return Err(PastureError::mass_balance(context, "DM", dm_diff));
        }
        let n_in = today.growth_shoot_n + today.growth_root_n;
        let n_diff = pre_n + n_in
            - today.n_senesced_remobilised
            - today.n_luxury_remobilised
            - today.detached_shoot_n
            - today.detached_root_n
            - self.total_n();
        if n_diff.abs() > EPSILON {
            return Err(PastureError::mass_balance(context, "N", n_diff));
        }
        Ok(())
    }

    fn send_detached_material(&self, litter: &mut dyn LitterSink) {
        let (dm, n) = (self.today.detached_shoot_dm, self.today.detached_shoot_n);
        if dm + n > 0.0 {
            litter.add_surface_litter(dm, n, &self.material_type());
        }
        for root in self.roots.iter() {
            let (dm, n) = root.detached_by_layer();
            if dm.sum() > 0.0 {
                litter.add_root_fom(&root.zone_name, &dm, &n);
            }
        }
    }

    pub(crate) fn material_type(&self) -> String {
        format!("{:?}", self.params.family)
    }

    /// Ends the crop: all shoot DM and N goes to surface litter in one
    /// deposit, roots go to the soil, and the organs are emptied.
    pub fn end_crop(&mut self, litter: &mut dyn LitterSink) -> Result<()> {
        let (dm, n) = (self.above_ground_wt(), self.above_ground_n());
        litter.add_surface_litter(dm, n, &self.material_type());
        for root in self.roots.iter_mut() {
            let (root_dm, root_n) = root.take_all();
            if root_dm.sum() > 0.0 {
                litter.add_root_fom(&root.zone_name, &root_dm, &root_n);
            }
            root.set_depth(0.0);
        }
        for organ in [&mut self.leaves, &mut self.stems, &mut self.stolons] {
            organ.do_reset_organ();
        }
        self.today = DailyGrowth::default();
        self.is_sown = false;
        self.phenology = Phenology::new(PhenologicStage::NotGrowing);
        info!(species = %self.params.name, shoot_dm = dm, shoot_n = n, "crop ended");
        Ok(())
    }

    /// Kills a fraction of all live tissue; killing it all ends the crop.
    pub fn kill_crop(&mut self, fraction: f64, litter: &mut dyn LitterSink) -> Result<()> {
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction >= 1.0 {
            return self.end_crop(litter);
        }
        for organ in [&mut self.leaves, &mut self.stems, &mut self.stolons] {
            organ.do_kill_organ(fraction);
        }
        for root in self.roots.iter_mut() {
            root.do_kill_organ(fraction);
        }
        info!(species = %self.params.name, fraction, "killed a fraction of the live plant");
        Ok(())
    }

    /// Restores the initial state and clears the stress memory.
    pub fn reset(&mut self) {
        for organ in [&mut self.leaves, &mut self.stems, &mut self.stolons] {
            organ.do_reset_organ();
        }
        for root in self.roots.iter_mut() {
            root.do_reset_organ();
        }
        self.set_initial_state();
        self.today = DailyGrowth::default();
        self.heat = HeatStress::default();
        self.cold = ColdStress::default();
        self.water_logging = WaterLogging::default();
        self.defoliation = DefoliationMemory::default();
        self.fixed_n_yesterday = 0.0;
        info!(species = %self.params.name, "species reset to its initial state");
    }
}

fn new_root(params: &SpeciesParams, soil: &SoilProfile) -> RootOrgan {
    let mut root = RootOrgan::new(soil, params.n_thresholds_roots, RootParams::new(params));
    root.minimum_live_dm = params.minimum_green_wt * params.minimum_green_root_prop;
    root.live.fraction_n_luxury_remobilisable = params.fraction_n_luxury_remobilisable[0];
    root.live.digestibility_cell_wall = params.digestibilities_cell_wall[0];
    root.live.digestibility_protein = params.digestibility_protein;
    root
}

impl WaterUptakeParticipant for PastureSpecies {
    /// Water the species would take from each zone: what it can reach,
    /// scaled down to the demand.
    fn water_uptake_estimates(&mut self, zones: &[ZoneWaterAndN]) -> Result<Option<Vec<ZoneWaterAndN>>> {
        self.check_uptake_source("water uptake estimates")?;
        if !self.is_alive() {
            return Ok(None);
        }
        let mut available = Vec::new();
        for zone in zones {
            if let Some(root) = self.roots.iter_mut().find(|r| r.zone_name == zone.zone_name) {
                root.update_soil_state(zone);
                available.push((zone.zone_name.clone(), root.evaluate_soil_water_available(zone)));
            }
        }
        let supply: f64 = available.iter().map(|(_, w)| w.sum()).sum();
        self.today.water_available = supply;
        let fraction_used = if supply > EPSILON {
            (self.today.water_demand / supply).min(1.0)
        } else {
            0.0
        };
        let estimates = available
            .into_iter()
            .map(|(zone_name, water)| {
                let mut estimate = ZoneWaterAndN::zeros(&zone_name, water.len());
                estimate.water = water * fraction_used;
                estimate
            })
            .collect();
        Ok(Some(estimates))
    }

    fn set_actual_water_uptake(&mut self, zones: &[ZoneWaterAndN]) -> Result<()> {
        self.check_uptake_source("setting water uptake")?;
        for root in self.roots.iter_mut() {
            root.water_uptake.fill(0.0);
        }
        let mut total = 0.0;
        for zone in zones {
            if let Some(root) = self.roots.iter_mut().find(|r| r.zone_name == zone.zone_name) {
                root.set_water_uptake(&zone.water);
                total += zone.water.sum();
            }
        }
        self.today.water_uptake = total;
        Ok(())
    }
}

impl NitrogenUptakeParticipant for PastureSpecies {
    /// N the species would take from each zone, after fixation and the
    /// remobilisation of senesced N have been accounted for.
    fn nitrogen_uptake_estimates(&mut self, zones: &[ZoneWaterAndN]) -> Result<Option<Vec<ZoneWaterAndN>>> {
        self.check_uptake_source("N uptake estimates")?;
        if !self.is_alive() {
            return Ok(None);
        }
        let mut supply = 0.0;
        let mut reached = Vec::new();
        for zone in zones {
            if let Some(root) = self.roots.iter_mut().find(|r| r.zone_name == zone.zone_name) {
                let water_uptake = root.water_uptake.clone();
                root.evaluate_soil_nitrogen_available(zone, &water_uptake);
                supply += root.nh4_available.sum() + root.no3_available.sum();
                reached.push(zone.zone_name.clone());
            }
        }
        self.today.soil_n_available = supply;

        let soil_demand = self.evaluate_n_supply_before_soil();
        let fraction_used = if supply > EPSILON { (soil_demand / supply).min(1.0) } else { 0.0 };
        let estimates = reached
            .iter()
            .filter_map(|name| self.roots.iter().find(|r| &r.zone_name == name))
            .map(|root| {
                let mut estimate = ZoneWaterAndN::zeros(&root.zone_name, root.n_layers());
                estimate.no3n = &root.no3_available * fraction_used;
                estimate.nh4n = &root.nh4_available * fraction_used;
                estimate
            })
            .collect();
        Ok(Some(estimates))
    }

    fn set_actual_nitrogen_uptakes(&mut self, zones: &[ZoneWaterAndN]) -> Result<()> {
        self.check_uptake_source("setting N uptake")?;
        for root in self.roots.iter_mut() {
            root.no3_uptake.fill(0.0);
            root.nh4_uptake.fill(0.0);
        }
        let mut total = 0.0;
        for zone in zones {
            if let Some(root) = self.roots.iter_mut().find(|r| r.zone_name == zone.zone_name) {
                root.set_nitrogen_uptake(&zone.no3n, &zone.nh4n);
                total += zone.no3n.sum() + zone.nh4n.sum();
            }
        }
        self.today.soil_n_uptake = total;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::LitterLedger;
    use approx::assert_relative_eq;

    fn ryegrass() -> PastureSpecies {
        let soil = SoilProfile::default_silt_loam("field");
        PastureSpecies::new(SpeciesParams::default(), &[soil]).unwrap()
    }

    // One day with an arbitrator that grants every estimate
    fn run_day(species: &mut PastureSpecies, weather: &DailyWeather, litter: &mut LitterLedger) {
        species.on_daily_initialisation(weather);
        let ep = species.cover_green() * weather.radn * 0.3;
        species.set_potential_ep(ep);
        let zone = species.roots[0].soil().zone_state();
        if let Some(water) = species.water_uptake_estimates(std::slice::from_ref(&zone)).unwrap() {
            species.set_actual_water_uptake(&water).unwrap();
        }
        species.do_potential_growth(litter).unwrap();
        if let Some(n) = species.nitrogen_uptake_estimates(std::slice::from_ref(&zone)).unwrap() {
            species.set_actual_nitrogen_uptakes(&n).unwrap();
        }
        species.do_actual_growth(litter).unwrap();
    }

    #[test]
    fn initial_state_follows_parameters() {
        let species = ryegrass();
        assert!(species.is_alive());
        assert_relative_eq!(species.above_ground_wt(), 2000.0, epsilon = 1e-9);
        assert_relative_eq!(species.below_ground_wt(), 500.0, epsilon = 1e-9);
        assert_relative_eq!(species.roots[0].depth, 500.0);
        assert_relative_eq!(species.leaves.n_conc_live(), 0.04, epsilon = 1e-12);
        assert_relative_eq!(species.leaves.n_conc_dead(), 0.012, epsilon = 1e-12);
    }

    #[test]
    fn no_soil_is_a_configuration_error() {
        let result = PastureSpecies::new(SpeciesParams::default(), &[]);
        assert!(matches!(result, Err(PastureError::Config { .. })));
    }

    #[test]
    fn zones_must_exist_in_the_soil_set() {
        let soils = [SoilProfile::default_silt_loam("field"), SoilProfile::default_silt_loam("paddock")];
        let mut species = PastureSpecies::new(SpeciesParams::default(), &soils).unwrap();
        assert!(matches!(species.add_zone("river", 300.0, 50.0), Err(PastureError::ZoneNotFound { .. })));
        species.add_zone("paddock", 300.0, 100.0).unwrap();
        assert_eq!(species.roots.len(), 2);
        assert_relative_eq!(species.below_ground_wt(), 600.0, epsilon = 1e-9);
        assert!(species.add_zone("paddock", 300.0, 100.0).is_err());
    }

    #[test]
    fn a_day_of_growth_keeps_mass_balance() {
        let mut species = ryegrass();
        let mut litter = LitterLedger::new();
        let weather = DailyWeather::default();
        let pre = species.total_wt();
        run_day(&mut species, &weather, &mut litter);
        let today = species.today;
        assert!(today.growth_potential > 0.0);
        assert!(today.growth_after_nutrients <= today.growth_after_water + 1e-12);
        assert_relative_eq!(
            species.total_wt(),
            pre + today.growth_after_nutrients - today.detached_shoot_dm - today.detached_root_dm,
            epsilon = 1e-9
        );
        assert_relative_eq!(litter.surface_dm(), today.detached_shoot_dm, epsilon = 1e-12);
    }

    #[test]
    fn other_uptake_sources_fail_loudly() {
        let mut species = ryegrass();
        species.set_uptake_source(UptakeSource::Species);
        let zone = species.roots[0].soil().zone_state();
        let result = species.water_uptake_estimates(&[zone]);
        assert!(matches!(result, Err(PastureError::NotImplemented { .. })));
        let mut litter = LitterLedger::new();
        assert!(species.do_actual_growth(&mut litter).is_err());
    }

    #[test]
    fn legumes_fix_nitrogen_when_soil_n_is_short() {
        let mut soil = SoilProfile::default_silt_loam("field");
        for layer in soil.layers.iter_mut() {
            layer.no3 = 0.0;
            layer.nh4 = 0.0;
        }
        let mut clover = PastureSpecies::new(SpeciesParams::white_clover(), &[soil]).unwrap();
        let mut litter = LitterLedger::new();
        run_day(&mut clover, &DailyWeather::default(), &mut litter);
        let today = clover.today;
        assert!(today.n_fixed > 0.0);
        assert_relative_eq!(today.n_fixed, clover.params.maximum_n_fixation * today.n_demand_optimum, epsilon = 1e-9);
        assert_eq!(today.soil_n_uptake, 0.0);
    }

    #[test]
    fn sow_of_unsown_species_starts_germination() {
        let params = SpeciesParams {
            initial_shoot_dm: -1.0,
            ..SpeciesParams::default()
        };
        let mut species = PastureSpecies::new(params, &[SoilProfile::default_silt_loam("field")]).unwrap();
        assert!(!species.is_sown());
        assert_eq!(species.phenologic_stage().code(), -1);
        species.sow();
        assert_eq!(species.phenologic_stage(), PhenologicStage::Germinating);
        assert!(!species.is_alive());
    }

    #[test]
    fn reset_restores_initial_state_and_memory() {
        let mut species = ryegrass();
        let mut litter = LitterLedger::new();
        let hot = DailyWeather {
            max_t: 38.0,
            min_t: 22.0,
            ..DailyWeather::default()
        };
        run_day(&mut species, &hot, &mut litter);
        assert!(species.heat.stress < 1.0);
        species.kill_crop(0.5, &mut litter).unwrap();
        species.reset();
        assert_relative_eq!(species.above_ground_wt(), 2000.0, epsilon = 1e-9);
        assert_eq!(species.heat.stress, 1.0);
        assert!(species.is_alive());
    }
}
