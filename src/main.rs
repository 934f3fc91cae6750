use clap::Parser;
use pasture_species::{DailyWeather, Result, Simulation, SoilProfile, SpeciesParams, WeatherSeries};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Daily growth of one pasture species on one soil, printed as CSV
#[derive(Parser, Debug)]
#[command(name = "pasture-sim")]
#[command(about = "Pasture species growth demo", long_about = None)]
struct Args {
    /// TOML file with species parameter tables
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Table to read from the parameter file
    #[arg(short, long, default_value = "perennial_ryegrass")]
    species: String,

    /// TOML file with soil tables (a generic silt loam if absent)
    #[arg(long)]
    soils: Option<PathBuf>,

    /// Table to read from the soil file
    #[arg(long, default_value = "silt_loam")]
    soil: String,

    /// Number of days to simulate
    #[arg(short, long, default_value_t = 365)]
    days: usize,

    /// Latitude in degrees, negative south
    #[arg(long, default_value_t = -37.8, allow_hyphen_values = true)]
    latitude: f64,

    /// First day of year
    #[arg(long, default_value_t = 1)]
    day_of_year: u32,

    /// Maximum air temperature in oC
    #[arg(long, default_value_t = 20.0, allow_hyphen_values = true)]
    max_t: f64,

    /// Minimum air temperature in oC
    #[arg(long, default_value_t = 10.0, allow_hyphen_values = true)]
    min_t: f64,

    /// Solar radiation in MJ/m^2/day
    #[arg(long, default_value_t = 15.0)]
    radn: f64,

    /// Atmospheric CO2 in ppm
    #[arg(long, default_value_t = 380.0)]
    co2: f64,

    /// Rain added to the soil every day in mm
    #[arg(long, default_value_t = 0.0)]
    rain: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();

    let params = match &args.params {
        Some(path) => SpeciesParams::from_toml_file(path, &args.species)?,
        None if args.species == "white_clover" => SpeciesParams::white_clover(),
        None => SpeciesParams::default(),
    };
    let soil = match &args.soils {
        Some(path) => SoilProfile::from_toml_file(path, &args.soil, "field")?,
        None => SoilProfile::default_silt_loam("field"),
    };
    let template = DailyWeather {
        max_t: args.max_t,
        min_t: args.min_t,
        radn: args.radn,
        co2: args.co2,
        latitude: args.latitude,
        day_of_year: args.day_of_year,
        ..DailyWeather::default()
    };
    let weather = WeatherSeries::constant(template, args.days);

    info!(species = %params.name, soil = %soil.soil_name, days = args.days, "starting simulation");
    let mut simulation = Simulation::new(params, soil, weather)?;
    simulation.daily_rain = args.rain;
    simulation.run(args.days)?;
    info!(
        surface_litter = simulation.litter.surface_dm(),
        root_litter = simulation.litter.root_dm(),
        "simulation finished"
    );
    Ok(())
}
