use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

// Daily weather facts supplied to the plant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyWeather {
    pub max_t: f64,    // Maximum air temperature [oC]
    pub min_t: f64,    // Minimum air temperature [oC]
    pub radn: f64,     // Solar radiation [MJ/m^2/day]
    pub co2: f64,      // Atmospheric CO2 [ppm]
    pub vp: f64,       // Vapour pressure [hPa]
    pub latitude: f64, // [degrees], negative south
    pub day_of_year: u32,
    pub year: i32,
}

impl Default for DailyWeather {
    fn default() -> Self {
        DailyWeather {
            max_t: 20.0,
            min_t: 10.0,
            radn: 15.0,
            co2: 380.0,
            vp: 12.0,
            latitude: -37.8,
            day_of_year: 1,
            year: 2000,
        }
    }
}

impl DailyWeather {
    // Weighted mean temperature, weight applied to max_t
    pub fn tmean(&self, w_tmax: f64) -> f64 {
        w_tmax * self.max_t + (1.0 - w_tmax) * self.min_t
    }

    // Astronomical day length including twilight [hours]
    pub fn day_length(&self, twilight: f64) -> f64 {
        let lat = self.latitude.clamp(-89.9, 89.9).to_radians();
        let doy = self.day_of_year as f64;
        let dec = (23.45_f64).to_radians() * (2.0 * PI * (284.0 + doy) / 365.0).sin();
        let cos_h = (twilight.to_radians().sin() - lat.sin() * dec.sin()) / (lat.cos() * dec.cos());
        let hour_angle = cos_h.clamp(-1.0, 1.0).acos();
        2.0 * hour_angle.to_degrees() / 15.0
    }

    // Saturated vapour pressure [hPa]
    pub fn svp(temp: f64) -> f64 {
        6.1078 * (17.269 * temp / (237.3 + temp)).exp()
    }

    // Vapour pressure deficit, weighted towards the afternoon [hPa]
    pub fn vpd(&self) -> f64 {
        let vpd_min_t = (Self::svp(self.min_t) - self.vp).max(0.0);
        let vpd_max_t = (Self::svp(self.max_t) - self.vp).max(0.0);
        0.66 * vpd_max_t + 0.34 * vpd_min_t
    }
}

// Daily weather records with last-value fallback past the end of the series
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeatherSeries {
    pub days: Vec<DailyWeather>,
}

impl WeatherSeries {
    pub fn new(days: Vec<DailyWeather>) -> Self {
        WeatherSeries { days }
    }

    // Repeats the same day for n days, advancing day of year and year
    pub fn constant(template: DailyWeather, n_days: usize) -> Self {
        let mut days = Vec::with_capacity(n_days);
        let mut today = template;
        for _ in 0..n_days {
            days.push(today);
            today.day_of_year += 1;
            if today.day_of_year > 365 {
                today.day_of_year = 1;
                today.year += 1;
            }
        }
        WeatherSeries { days }
    }

    // Weather for a given day (floor of time in days)
    pub fn get_daily_value(&self, time: f64) -> DailyWeather {
        let day = time.max(0.0).floor() as usize;
        if day < self.days.len() {
            self.days[day]
        } else {
            self.days.last().copied().unwrap_or_default()
        }
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn tmean_weights_max_temperature() {
        let w = DailyWeather {
            max_t: 24.0,
            min_t: 8.0,
            ..Default::default()
        };
        assert_relative_eq!(w.tmean(0.5), 16.0);
        assert_relative_eq!(w.tmean(0.75), 20.0);
    }

    #[test]
    fn day_length_is_longer_in_local_summer() {
        let summer = DailyWeather {
            latitude: -40.0,
            day_of_year: 355,
            ..Default::default()
        };
        let winter = DailyWeather {
            day_of_year: 172,
            ..summer
        };
        assert!(summer.day_length(-6.0) > 14.0);
        assert!(winter.day_length(-6.0) < 11.0);
        // twilight lengthens the day
        assert!(summer.day_length(-6.0) > summer.day_length(0.0));
    }

    #[test]
    fn vpd_is_never_negative() {
        let humid = DailyWeather {
            max_t: 10.0,
            min_t: 5.0,
            vp: 30.0,
            ..Default::default()
        };
        assert_eq!(humid.vpd(), 0.0);
        assert_relative_eq!(DailyWeather::svp(0.0), 6.1078);
    }

    #[test]
    fn series_falls_back_to_last_day() {
        let series = WeatherSeries::constant(DailyWeather::default(), 3);
        assert_eq!(series.get_daily_value(1.7).day_of_year, 2);
        assert_eq!(series.get_daily_value(10.0).day_of_year, 3);
        assert_eq!(WeatherSeries::default().get_daily_value(0.0), DailyWeather::default());
    }
}
