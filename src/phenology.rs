use crate::params::SpeciesParams;
use crate::weather::DailyWeather;

/// Development stage of the plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PhenologicStage {
    #[default]
    NotGrowing,
    Germinating,
    Vegetative,
    Reproductive,
}

impl PhenologicStage {
    /// Numeric stage: -1 not growing, 0 germinating, 1 vegetative, 2 reproductive.
    pub fn code(&self) -> i32 {
        match self {
            Self::NotGrowing => -1,
            Self::Germinating => 0,
            Self::Vegetative => 1,
            Self::Reproductive => 2,
        }
    }
}

/// What happened to an annual plant today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhenologyEvent {
    None,
    GerminationStarted,
    Anthesis,
    Maturity,
}

// Phenology state: stage plus thermal time and day counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Phenology {
    pub stage: PhenologicStage,
    pub days_since_emergence: f64,
    pub cumulative_dd_vegetative: f64, // [oCd]
    pub cumulative_dd_germination: f64, // [oCd]
    pub pheno_factor: f64,             // Fraction of the current phase completed
}

impl Phenology {
    pub fn new(stage: PhenologicStage) -> Self {
        Phenology {
            stage,
            ..Default::default()
        }
    }

    /// Accumulates thermal time towards germination; returns the progress (0-1).
    pub fn daily_germination_progress(&mut self, params: &SpeciesParams, weather: &DailyWeather) -> f64 {
        self.cumulative_dd_germination += (weather.tmean(0.5) - params.growth_t_minimum).max(0.0);
        if params.degrees_day_for_germination <= 0.0 {
            return 1.0;
        }
        (self.cumulative_dd_germination / params.degrees_day_for_germination).clamp(0.0, 1.0)
    }

    pub fn set_emergence(&mut self) {
        self.stage = PhenologicStage::Vegetative;
        self.days_since_emergence = 0.0;
        self.cumulative_dd_vegetative = 0.0;
        self.cumulative_dd_germination = 0.0;
        self.pheno_factor = 0.0;
    }

    /// Advances the development of an annual plant by one day.
    pub fn evaluate_annual(&mut self, params: &SpeciesParams, weather: &DailyWeather) -> PhenologyEvent {
        let mut event = PhenologyEvent::None;
        if weather.day_of_year == params.doy_germination && self.stage == PhenologicStage::NotGrowing {
            self.stage = PhenologicStage::Germinating;
            self.cumulative_dd_germination = 0.0;
            return PhenologyEvent::GerminationStarted;
        }
        if self.stage < PhenologicStage::Vegetative {
            return event;
        }

        self.days_since_emergence += 1.0;
        self.cumulative_dd_vegetative += (weather.tmean(0.5) - params.growth_t_minimum).max(0.0);

        let days_to_anthesis = params.days_emergence_to_anthesis as f64;
        let days_to_maturity = params.days_anthesis_to_maturity as f64;
        let dd_anthesis = params.degrees_day_for_anthesis;
        let dd_maturity = params.degrees_day_for_maturity;

        if self.stage == PhenologicStage::Vegetative
            && (self.days_since_emergence >= days_to_anthesis || self.cumulative_dd_vegetative >= dd_anthesis)
        {
            self.stage = PhenologicStage::Reproductive;
            self.cumulative_dd_vegetative = self.cumulative_dd_vegetative.max(dd_anthesis);
            event = PhenologyEvent::Anthesis;
        }

        let (factor_days, factor_dd) = if self.stage == PhenologicStage::Reproductive {
            if self.days_since_emergence >= days_to_anthesis + days_to_maturity
                || self.cumulative_dd_vegetative >= dd_anthesis + dd_maturity
            {
                self.cumulative_dd_vegetative = self.cumulative_dd_vegetative.max(dd_anthesis + dd_maturity);
                event = PhenologyEvent::Maturity;
            }
            (
                divide_or_one(self.days_since_emergence - days_to_anthesis, days_to_maturity),
                divide_or_one(self.cumulative_dd_vegetative - dd_anthesis, dd_maturity),
            )
        } else {
            (
                divide_or_one(self.days_since_emergence, days_to_anthesis),
                divide_or_one(self.cumulative_dd_vegetative, dd_anthesis),
            )
        };
        self.pheno_factor = factor_days.max(factor_dd).clamp(0.0, 1.0);
        event
    }

    /// Reduction of photosynthesis of annuals early after emergence and
    /// when approaching maturity.
    pub fn annual_growth_factor(&self, params: &SpeciesParams) -> f64 {
        let days_factor = params.days_annuals_factor as f64;
        match self.stage {
            PhenologicStage::Vegetative if self.days_since_emergence < days_factor => {
                1.0 - 0.5 * (1.0 - self.days_since_emergence / days_factor)
            }
            PhenologicStage::Reproductive => {
                let into_phase = self.days_since_emergence - params.days_emergence_to_anthesis as f64;
                (1.0 - divide_or_one(into_phase, params.days_anthesis_to_maturity as f64)).max(0.0)
            }
            _ => 1.0,
        }
    }
}

fn divide_or_one(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 { numerator / denominator } else { 1.0 }
}
