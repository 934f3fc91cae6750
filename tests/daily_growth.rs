use approx::assert_relative_eq;
use pasture_species::{
    CanopyQuery, DailyWeather, LitterLedger, NitrogenUptakeParticipant, PastureSpecies, PhenologicStage, Simulation,
    SoilProfile, SpeciesParams, WaterUptakeParticipant, WeatherSeries,
};

fn simulation(params: SpeciesParams, weather: DailyWeather, days: usize) -> Simulation {
    let series = WeatherSeries::constant(weather, days);
    Simulation::new(params, SoilProfile::default_silt_loam("field"), series).unwrap()
}

// One day where the arbitrator grants every estimate against the given soil
fn run_day(species: &mut PastureSpecies, soil: &SoilProfile, weather: &DailyWeather, litter: &mut LitterLedger) {
    species.on_daily_initialisation(weather);
    species.set_potential_ep(species.cover_green() * weather.radn * 0.3);
    let zone = soil.zone_state();
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
fn dm_and_n_balance_over_a_season() {
    for params in [SpeciesParams::default(), SpeciesParams::white_clover()] {
        let mut sim = simulation(params, DailyWeather::default(), 120);
        sim.daily_rain = 3.0;
        for _ in 0..120 {
            let pre_dm = sim.species.total_wt();
            let pre_n = sim.species.total_n();
            sim.step().unwrap();
            let today = sim.species.today;
            assert_relative_eq!(
                sim.species.total_wt(),
                pre_dm + today.growth_shoot_dm + today.growth_root_dm - today.detached_shoot_dm - today.detached_root_dm,
                epsilon = 1e-6
            );
            assert_relative_eq!(
                sim.species.total_n(),
                pre_n + today.growth_shoot_n + today.growth_root_n
                    - today.n_senesced_remobilised
                    - today.n_luxury_remobilised
                    - today.detached_shoot_n
                    - today.detached_root_n,
                epsilon = 1e-6
            );
            assert_relative_eq!(
                today.growth_shoot_dm + today.growth_root_dm,
                today.growth_after_nutrients,
                epsilon = 1e-9
            );
        }
        // whatever left the plant reached the litter
        assert!(sim.litter.surface_dm() > 0.0);
        assert!(sim.litter.root_dm() > 0.0);
    }
}

#[test]
fn turnover_rates_stay_bounded_in_harsh_weather() {
    let harsh = [
        DailyWeather {
            max_t: 42.0,
            min_t: 26.0,
            radn: 30.0,
            ..DailyWeather::default()
        },
        DailyWeather {
            max_t: 3.0,
            min_t: -8.0,
            radn: 4.0,
            ..DailyWeather::default()
        },
        DailyWeather {
            max_t: 30.0,
            min_t: 15.0,
            radn: 28.0,
            co2: 900.0,
            ..DailyWeather::default()
        },
    ];
    for weather in harsh {
        let mut sim = simulation(SpeciesParams::white_clover(), weather, 60);
        for _ in 0..60 {
            sim.step().unwrap();
            let today = sim.species.today;
            for rate in [today.turnover_live_shoot, today.turnover_dead_shoot, today.turnover_stolons, today.turnover_roots] {
                assert!((0.0..=1.0).contains(&rate), "turnover rate {} out of range", rate);
            }
            for organ in [&sim.species.leaves, &sim.species.stems, &sim.species.stolons] {
                assert!(organ.tissues.iter().all(|t| t.dm >= 0.0 && t.n >= 0.0));
            }
            assert!(sim.species.below_ground_live_wt() >= 0.0);
        }
    }
}

#[test]
fn live_n_concentration_never_exceeds_the_maximum() {
    let mut sim = simulation(SpeciesParams::default(), DailyWeather::default(), 60);
    sim.daily_rain = 5.0;
    for _ in 0..60 {
        sim.step().unwrap();
        let species = &sim.species;
        for organ in [&species.leaves, &species.stems] {
            assert!(organ.n_conc_live() <= organ.n_conc_maximum + 1e-9);
            assert!(organ.n_conc_live() > 0.0);
        }
        assert!(species.today.glf_n_supply >= 0.0 && species.today.glf_n_supply <= 1.0);
    }
}

#[test]
fn nothing_changes_without_light_or_turnover() {
    let params = SpeciesParams {
        detachment_rate_shoot: 0.0,
        ..SpeciesParams::default()
    };
    let dark_and_cold = DailyWeather {
        max_t: 1.0,
        min_t: -1.0,
        radn: 0.0,
        ..DailyWeather::default()
    };
    let mut sim = simulation(params, dark_and_cold, 10);
    let leaves = sim.species.leaf_wt_by_tissue();
    let (shoot_dm, root_dm, total_n) = (sim.species.above_ground_wt(), sim.species.below_ground_wt(), sim.species.total_n());
    for _ in 0..10 {
        sim.step().unwrap();
    }
    assert_eq!(sim.species.today.growth_after_nutrients, 0.0);
    assert_relative_eq!(sim.species.above_ground_wt(), shoot_dm, epsilon = 1e-12);
    assert_relative_eq!(sim.species.below_ground_wt(), root_dm, epsilon = 1e-12);
    assert_relative_eq!(sim.species.total_n(), total_n, epsilon = 1e-12);
    for (now, before) in sim.species.leaf_wt_by_tissue().iter().zip(leaves.iter()) {
        assert_relative_eq!(*now, *before, epsilon = 1e-12);
    }
    assert!(sim.litter.events.is_empty());
}

#[test]
fn growth_is_split_over_organs_without_loss() {
    let mut sim = simulation(SpeciesParams::white_clover(), DailyWeather::default(), 20);
    for _ in 0..20 {
        sim.step().unwrap();
        let today = sim.species.today;
        assert!(today.fraction_to_shoot > 0.0 && today.fraction_to_shoot <= 1.0);
        assert!(today.fraction_to_leaf <= 1.0 - today.fraction_to_stolon + 1e-12);
        let stems = today.fraction_to_shoot * (1.0 - today.fraction_to_stolon - today.fraction_to_leaf);
        assert!(stems >= -1e-12);
    }
}

#[test]
fn sown_species_germinates_then_grows() {
    let params = SpeciesParams {
        initial_shoot_dm: -1.0,
        ..SpeciesParams::default()
    };
    let mut sim = simulation(params, DailyWeather::default(), 30);
    sim.species.sow();

    // 14 oCd per day against 125 oCd needed
    for _ in 0..8 {
        let record = sim.step().unwrap();
        assert_eq!(record.stage, 0);
        assert_eq!(record.above_ground_wt, 0.0);
    }
    let record = sim.step().unwrap();
    assert_eq!(sim.species.phenologic_stage(), PhenologicStage::Vegetative);
    assert!(sim.species.is_alive());
    assert!(record.above_ground_wt > 0.0);
    assert!(sim.species.root_depth() >= sim.species.params.root_depth_minimum);

    for _ in 0..20 {
        sim.step().unwrap();
    }
    assert!(sim.species.above_ground_wt() > record.above_ground_wt);
}

#[test]
fn more_co2_means_more_photosynthesis() {
    let soil = SoilProfile::default_silt_loam("field");
    let mut previous = (0.0, 0.0);
    for co2 in [380.0, 500.0, 700.0, 900.0] {
        let mut species = PastureSpecies::new(SpeciesParams::default(), std::slice::from_ref(&soil)).unwrap();
        let mut litter = LitterLedger::new();
        let weather = DailyWeather {
            co2,
            ..DailyWeather::default()
        };
        run_day(&mut species, &soil, &weather, &mut litter);
        let today = species.today;
        assert!(today.glf_co2 > previous.0);
        assert!(today.gross_photosynthesis > previous.1);
        previous = (today.glf_co2, today.gross_photosynthesis);
    }
}

#[test]
fn defoliation_speeds_up_root_turnover() {
    let soil = SoilProfile::default_silt_loam("field");
    let mut litter = LitterLedger::new();
    let weather = DailyWeather::default();
    let mut ungrazed = PastureSpecies::new(SpeciesParams::default(), std::slice::from_ref(&soil)).unwrap();
    run_day(&mut ungrazed, &soil, &weather, &mut litter);

    let mut grazed = ungrazed.clone();
    grazed.graze("SetResidueAmount", 1000.0).unwrap();
    assert!(grazed.harvested_fraction() > 0.0);

    run_day(&mut ungrazed, &soil, &weather, &mut litter);
    run_day(&mut grazed, &soil, &weather, &mut litter);
    assert!(grazed.today.turnover_roots > ungrazed.today.turnover_roots);
}

#[test]
fn emergence_sets_the_minimum_green_weight() {
    let params = SpeciesParams {
        initial_shoot_dm: 0.0,
        ..SpeciesParams::default()
    };
    let mut species = PastureSpecies::new(params, &[SoilProfile::default_silt_loam("field")]).unwrap();
    assert_eq!(species.phenologic_stage().code(), 0);
    assert!(species.is_sown());
    assert!(!species.is_alive());

    species.set_emergence_state();
    assert_eq!(species.phenologic_stage().code(), 1);
    assert!(species.is_alive());
    assert_relative_eq!(species.above_ground_wt(), species.params.minimum_green_wt, epsilon = 1e-9);
    assert_relative_eq!(species.root_depth(), species.params.root_depth_minimum, epsilon = 1e-9);
}
