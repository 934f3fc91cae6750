use crate::capabilities::{CanopyQuery, LitterLedger, NitrogenUptakeParticipant, WaterUptakeParticipant};
use crate::error::Result;
use crate::params::SpeciesParams;
use crate::soil::SoilProfile;
use crate::species::PastureSpecies;
use crate::weather::WeatherSeries;
use tracing::debug;

// Potential transpiration per unit of radiation intercepted by green cover [mm/(MJ/m^2)]
const EP_PER_RADIATION: f64 = 0.3;

/// Main outputs of one simulated day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyRecord {
    pub day: usize,
    pub day_of_year: u32,
    pub stage: i32,
    pub above_ground_wt: f64,      // [kg/ha]
    pub below_ground_wt: f64,      // [kg/ha]
    pub above_ground_n: f64,       // [kg/ha]
    pub lai_green: f64,            // [m^2/m^2]
    pub height: f64,               // [mm]
    pub root_depth: f64,           // [mm]
    pub gross_photosynthesis: f64, // [kg C/ha]
    pub growth: f64,               // [kg/ha]
    pub detached: f64,             // [kg/ha]
    pub glf_water: f64,
    pub glf_n: f64,
    pub water_uptake: f64,  // [mm]
    pub soil_n_uptake: f64, // [kg/ha]
    pub n_fixed: f64,       // [kg/ha]
    pub digestibility: f64,
}

impl DailyRecord {
    pub fn csv_header() -> &'static str {
        "Day, DOY, Stage, Shoot DM [kg/ha], Root DM [kg/ha], Shoot N [kg/ha], Green LAI [-], Height [mm], Root Depth [mm], Gross Photosynthesis [kg C/ha], Growth [kg/ha], Detached [kg/ha], GLF Water [-], GLF N [-], Water Uptake [mm], Soil N Uptake [kg/ha], N Fixed [kg/ha], Digestibility [-]"
    }

    pub fn to_csv_row(&self) -> String {
        format!(
            "{}, {}, {}, {:.1}, {:.1}, {:.2}, {:.3}, {:.1}, {:.1}, {:.2}, {:.2}, {:.2}, {:.3}, {:.3}, {:.3}, {:.3}, {:.3}, {:.3}",
            self.day,
            self.day_of_year,
            self.stage,
            self.above_ground_wt,
            self.below_ground_wt,
            self.above_ground_n,
            self.lai_green,
            self.height,
            self.root_depth,
            self.gross_photosynthesis,
            self.growth,
            self.detached,
            self.glf_water,
            self.glf_n,
            self.water_uptake,
            self.soil_n_uptake,
            self.n_fixed,
            self.digestibility
        )
    }
}

/// One species growing on one soil zone, with an arbitrator that grants
/// every uptake estimate.
pub struct Simulation {
    pub species: PastureSpecies,
    pub soil: SoilProfile,
    pub weather: WeatherSeries,
    pub litter: LitterLedger,
    /// Water added to the top of the profile every day [mm]
    pub daily_rain: f64,
    day: usize,
}

impl Simulation {
    pub fn new(params: SpeciesParams, soil: SoilProfile, weather: WeatherSeries) -> Result<Self> {
        let species = PastureSpecies::new(params, std::slice::from_ref(&soil))?;
        Ok(Simulation {
            species,
            soil,
            weather,
            litter: LitterLedger::new(),
            daily_rain: 0.0,
            day: 0,
        })
    }

    pub fn day(&self) -> usize {
        self.day
    }

    // Advances one day and returns its outputs
    pub fn step(&mut self) -> Result<DailyRecord> {
        let weather = self.weather.get_daily_value(self.day as f64);
        if self.daily_rain > 0.0 {
            self.soil.add_water(self.daily_rain);
            self.soil.drain_to_dul();
        }

        let species = &mut self.species;
        species.on_daily_initialisation(&weather);
        let ep = species.cover_green() * weather.radn * EP_PER_RADIATION;
        species.set_potential_ep(ep);
        species.set_light_profile(species.cover_green() * weather.radn);

        // both arbitrations see the soil as it was at the start of the day
        let zone = self.soil.zone_state();
        if let Some(water) = species.water_uptake_estimates(std::slice::from_ref(&zone))? {
            species.set_actual_water_uptake(&water)?;
            for estimate in &water {
                self.soil.remove_water(&estimate.water);
            }
        }
        species.do_potential_growth(&mut self.litter)?;
        if let Some(nitrogen) = species.nitrogen_uptake_estimates(std::slice::from_ref(&zone))? {
            species.set_actual_nitrogen_uptakes(&nitrogen)?;
            for estimate in &nitrogen {
                self.soil.remove_nitrogen(&estimate.no3n, &estimate.nh4n);
            }
        }
        species.do_actual_growth(&mut self.litter)?;

        let today = species.today;
        let record = DailyRecord {
            day: self.day,
            day_of_year: weather.day_of_year,
            stage: species.phenologic_stage().code(),
            above_ground_wt: species.above_ground_wt(),
            below_ground_wt: species.below_ground_wt(),
            above_ground_n: species.above_ground_n(),
            lai_green: species.lai_green(),
            height: species.height(),
            root_depth: species.root_depth(),
            gross_photosynthesis: today.gross_photosynthesis,
            growth: today.growth_after_nutrients,
            detached: today.detached_shoot_dm + today.detached_root_dm,
            glf_water: today.glf_water_supply,
            glf_n: today.glf_n_supply,
            water_uptake: today.water_uptake,
            soil_n_uptake: today.soil_n_uptake,
            n_fixed: today.n_fixed,
            digestibility: species.herbage_digestibility(),
        };
        debug!(day = self.day, shoot_dm = record.above_ground_wt, growth = record.growth, "day simulated");
        self.day += 1;
        Ok(record)
    }

    // Runs the given number of days and prints the outputs as CSV
    pub fn run(&mut self, n_days: usize) -> Result<()> {
        println!("{}", DailyRecord::csv_header());
        for _ in 0..n_days {
            let record = self.step()?;
            println!("{}", record.to_csv_row());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::DailyWeather;
    use approx::assert_relative_eq;

    fn simulation(params: SpeciesParams) -> Simulation {
        let weather = WeatherSeries::constant(DailyWeather::default(), 30);
        Simulation::new(params, SoilProfile::default_silt_loam("field"), weather).unwrap()
    }

    #[test]
    fn uptake_is_removed_from_the_soil() {
        let mut sim = simulation(SpeciesParams::default());
        let water_before = sim.soil.water().sum();
        let n_before = sim.soil.no3().sum() + sim.soil.nh4().sum();
        let record = sim.step().unwrap();
        assert_eq!(sim.day(), 1);
        assert!(record.water_uptake > 0.0);
        assert_relative_eq!(sim.soil.water().sum(), water_before - record.water_uptake, epsilon = 1e-9);
        assert_relative_eq!(
            sim.soil.no3().sum() + sim.soil.nh4().sum(),
            n_before - record.soil_n_uptake,
            epsilon = 1e-9
        );
    }

    #[test]
    fn rain_refills_the_profile() {
        let mut sim = simulation(SpeciesParams::default());
        sim.daily_rain = 50.0;
        let dul: f64 = sim.soil.layers.iter().map(|l| l.dul).sum();
        let record = sim.step().unwrap();
        assert_relative_eq!(sim.soil.water().sum(), dul - record.water_uptake, epsilon = 1e-9);
    }

    #[test]
    fn rows_have_one_value_per_column() {
        let mut sim = simulation(SpeciesParams::white_clover());
        let record = sim.step().unwrap();
        let columns = DailyRecord::csv_header().split(", ").count();
        assert_eq!(record.to_csv_row().split(", ").count(), columns);
        assert_eq!(record.stage, 1);
    }
}
