mod allocation;
mod capabilities;
mod error;
mod factors;
mod growth;
mod organ;
mod outputs;
mod params;
mod phenology;
mod removal;
mod root;
mod simulation;
mod soil;
mod species;
mod tissue;
mod turnover;
mod weather;

pub use allocation::OrganFractions;
pub use capabilities::{
    CanopyQuery, DamageableOrgan, LitterEvent, LitterLedger, LitterSink, NitrogenUptakeParticipant,
    WaterUptakeParticipant,
};
pub use error::{PastureError, Result};
pub use growth::DailyGrowth;
pub use organ::{AboveGroundOrgan, BiomassRemovalType, OrganBiomassRemoval, RemovalFractions, RemovedMaterial};
pub use params::{
    EPSILON, NitrogenAvailableMethod, PhotosynthesisPathway, PlantFamily, SpeciesParams, WaterAvailableMethod,
};
pub use phenology::{PhenologicStage, Phenology, PhenologyEvent};
pub use removal::GrazeType;
pub use root::{RootOrgan, RootParams};
pub use simulation::{DailyRecord, Simulation};
pub use soil::{SoilLayer, SoilProfile, ZoneWaterAndN};
pub use species::{PastureSpecies, UptakeSource};
pub use tissue::TissuePool;
pub use weather::{DailyWeather, WeatherSeries};
