//! Root system of one soil zone: live and dead tissue distributed over
//! soil layers, rooting depth, and the soil water and N the roots can reach.

use crate::error::{PastureError, Result};
use crate::organ::ratio;
use crate::params::{EPSILON, NitrogenAvailableMethod, SpeciesParams, WaterAvailableMethod};
use crate::soil::{SoilProfile, ZoneWaterAndN};
use crate::tissue::TissuePool;
use nalgebra::DVector;

// Root traits used by the organ (taken from the species parameters)
#[derive(Debug, Clone, Copy)]
pub struct RootParams {
    pub depth_minimum: f64,          // [mm]
    pub depth_maximum: f64,          // [mm]
    pub elongation_rate: f64,        // [mm/day]
    pub distribution_depth: f64,     // Depth with constant distribution [mm]
    pub distribution_exponent: f64,  // Curvature of the distribution below that depth
    pub bottom_factor: f64,          // Where the distribution reaches zero, relative to depth
    pub specific_root_length: f64,   // [m/g]
    pub water_method: WaterAvailableMethod,
    pub nitrogen_method: NitrogenAvailableMethod,
    pub maximum_fraction_available: f64,
    pub reference_rld: f64,          // [cm/cm^3]
    pub exponent_soil_moisture: f64,
    pub reference_ks_uptake: f64,    // [mm/day]
    pub n_uptake_sw_factor: f64,
    pub maximum_n_uptake: f64,       // [kg/ha/day]
    pub knh4: f64,
    pub kno3: f64,
    pub ku_nh4: f64,
    pub ku_no3: f64,
}

impl RootParams {
    pub fn new(params: &SpeciesParams) -> Self {
        RootParams {
            depth_minimum: params.root_depth_minimum,
            depth_maximum: params.root_depth_maximum,
            elongation_rate: params.root_elongation_rate,
            distribution_depth: params.root_distribution_depth_param,
            distribution_exponent: params.root_distribution_exponent,
            bottom_factor: params.root_bottom_distribution_factor,
            specific_root_length: params.specific_root_length,
            water_method: params.water_available_method,
            nitrogen_method: params.nitrogen_available_method,
            maximum_fraction_available: params.maximum_fraction_available,
            reference_rld: params.reference_rld,
            exponent_soil_moisture: params.exponent_soil_moisture,
            reference_ks_uptake: params.reference_ks_uptake,
            n_uptake_sw_factor: params.n_uptake_sw_factor,
            maximum_n_uptake: params.maximum_n_uptake,
            knh4: params.knh4,
            kno3: params.kno3,
            ku_nh4: params.ku_nh4,
            ku_no3: params.ku_no3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RootOrgan {
    pub zone_name: String,
    pub live: TissuePool,
    pub dead: TissuePool,
    pub n_conc_optimum: f64,
    pub n_conc_minimum: f64,
    pub n_conc_maximum: f64,
    pub minimum_live_dm: f64,
    pub depth: f64,           // [mm]
    pub bottom_layer: usize,
    pub params: RootParams,
    soil: SoilProfile,

    // Soil resources for today [mm, kg/ha]
    pub water_available: DVector<f64>,
    pub water_uptake: DVector<f64>,
    pub no3_available: DVector<f64>,
    pub nh4_available: DVector<f64>,
    pub no3_uptake: DVector<f64>,
    pub nh4_uptake: DVector<f64>,
    detached_dm_layer: DVector<f64>,
}

impl RootOrgan {
    /// `n_thresholds` is [optimum, minimum, maximum].
    pub fn new(soil: &SoilProfile, n_thresholds: [f64; 3], params: RootParams) -> Self {
        let n = soil.n_layers();
        RootOrgan {
            zone_name: soil.zone_name.clone(),
            live: TissuePool::layered(n),
            dead: TissuePool::layered(n),
            n_conc_optimum: n_thresholds[0],
            n_conc_minimum: n_thresholds[1],
            n_conc_maximum: n_thresholds[2],
            minimum_live_dm: 0.0,
            depth: 0.0,
            bottom_layer: 0,
            params,
            soil: soil.clone(),
            water_available: DVector::zeros(n),
            water_uptake: DVector::zeros(n),
            no3_available: DVector::zeros(n),
            nh4_available: DVector::zeros(n),
            no3_uptake: DVector::zeros(n),
            nh4_uptake: DVector::zeros(n),
            detached_dm_layer: DVector::zeros(n),
        }
    }

    pub fn n_layers(&self) -> usize {
        self.soil.n_layers()
    }

    pub fn soil(&self) -> &SoilProfile {
        &self.soil
    }

    pub fn dm_live(&self) -> f64 {
        self.live.dm
    }

    pub fn dm_dead(&self) -> f64 {
        self.dead.dm
    }

    pub fn dm_total(&self) -> f64 {
        self.live.dm + self.dead.dm
    }

    pub fn n_live(&self) -> f64 {
        self.live.n
    }

    pub fn n_dead(&self) -> f64 {
        self.dead.n
    }

    pub fn n_total(&self) -> f64 {
        self.live.n + self.dead.n
    }

    pub fn n_conc_live(&self) -> f64 {
        self.live.n_conc()
    }

    pub fn dm_detached(&self) -> f64 {
        self.dead.dm_transferred_out
    }

    pub fn n_detached(&self) -> f64 {
        self.dead.n_transferred_out
    }

    pub fn n_luxury_remobilisable(&self) -> f64 {
        self.live.n_remobilisable
    }

    pub fn n_senesced_remobilisable(&self) -> f64 {
        self.dead.n_remobilisable
    }

    /// Sets depth, bottom layer and live DM laid out on the target distribution.
    pub fn set_state(&mut self, depth: f64, live_dm: f64) {
        self.set_depth(depth);
        let target = self.current_distribution_target();
        self.live.set_dm_by_layer(live_dm, &target);
        self.live.set_n_conc(self.n_conc_optimum);
    }

    pub fn set_depth(&mut self, depth: f64) {
        self.depth = depth;
        self.bottom_layer = self.soil.layer_index_at_depth(depth);
    }

    /// Fraction of a layer explored by roots, considering depth only.
    pub fn fraction_layer_with_roots(&self, layer: usize) -> f64 {
        if layer < self.bottom_layer {
            1.0
        } else if layer == self.bottom_layer {
            let top = self.soil.depth_to_layer_top(layer);
            ((self.depth - top) / self.soil.layers[layer].thickness).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Target fraction of root DM in each layer for the current depth.
    ///
    /// Root density is constant down to the distribution depth, then falls
    /// as a power function reaching zero at depth x bottom factor.
    pub fn current_distribution_target(&self) -> DVector<f64> {
        let n = self.n_layers();
        let mut target = DVector::zeros(n);
        if self.depth <= 0.0 {
            return target;
        }
        let flat = self.params.distribution_depth;
        let max_depth = self.depth * self.params.bottom_factor;
        let exponent = self.params.distribution_exponent;
        let cumulative = |z: f64| -> f64 {
            // integral of the density from the surface to z
            if z <= flat || max_depth <= flat {
                return z;
            }
            let span = max_depth - flat;
            let z = z.min(max_depth);
            flat + span / (exponent + 1.0) * (1.0 - ((max_depth - z) / span).powf(exponent + 1.0))
        };
        for layer in 0..=self.bottom_layer.min(n - 1) {
            let top = self.soil.depth_to_layer_top(layer);
            let bottom = (top + self.soil.layers[layer].thickness).min(self.depth);
            if bottom > top {
                target[layer] = cumulative(bottom) - cumulative(top);
            }
        }
        let total = target.sum();
        if total > 0.0 {
            target /= total;
        }
        target
    }

    /// Root length density of live roots per layer [mm/mm^3].
    pub fn length_density(&self) -> DVector<f64> {
        let n = self.n_layers();
        let mut rld = DVector::zeros(n);
        if let Some(layers) = self.live.dm_layer.as_ref() {
            for layer in 0..n {
                rld[layer] = layers[layer] * self.params.specific_root_length * 1e-4 / self.soil.layers[layer].thickness;
            }
        }
        rld
    }

    // Effect of root length density on uptake, with RLD converted to cm/cm^3
    fn rld_factor(&self, rld: f64) -> f64 {
        if self.params.reference_rld <= 0.0 {
            return 1.0;
        }
        (rld * 100.0 / self.params.reference_rld).min(1.0)
    }

    fn relative_moisture(&self, layer: usize, water: f64) -> f64 {
        let l = &self.soil.layers[layer];
        ratio(water - l.ll, l.dul - l.ll).clamp(0.0, 1.0)
    }

    /// Copies the zone's water and N into the soil snapshot.
    pub fn update_soil_state(&mut self, zone: &ZoneWaterAndN) {
        self.soil.update_from_zone(zone);
    }

    /// Plant available water in each layer of the root zone [mm].
    pub fn evaluate_soil_water_available(&mut self, zone: &ZoneWaterAndN) -> DVector<f64> {
        let n = self.n_layers();
        let rld = self.length_density();
        let mut available = DVector::zeros(n);
        for layer in 0..=self.bottom_layer.min(n - 1) {
            let soil_layer = &self.soil.layers[layer];
            let water = zone.water.get(layer).copied().unwrap_or(soil_layer.water);
            let extractable = (water - soil_layer.ll).max(0.0);
            let fraction_root = self.fraction_layer_with_roots(layer);
            let amount = match self.params.water_method {
                WaterAvailableMethod::DefaultApsim => extractable * soil_layer.kl,
                WaterAvailableMethod::AlternativeKL => extractable * soil_layer.kl * self.rld_factor(rld[layer]),
                WaterAvailableMethod::AlternativeKS => {
                    let moisture = self.relative_moisture(layer, water).powf(self.params.exponent_soil_moisture);
                    let conductivity = if self.params.reference_ks_uptake > 0.0 {
                        1.0 - (-soil_layer.ksat / self.params.reference_ks_uptake).exp()
                    } else {
                        1.0
                    };
                    extractable * moisture * conductivity * self.rld_factor(rld[layer])
                }
            };
            available[layer] = (amount * fraction_root).min(extractable * self.params.maximum_fraction_available);
        }
        self.water_available = available.clone();
        available
    }

    /// Plant available NH4 and NO3 in each layer of the root zone [kg/ha],
    /// given the water taken up today.
    pub fn evaluate_soil_nitrogen_available(&mut self, zone: &ZoneWaterAndN, water_uptake: &DVector<f64>) {
        let n = self.n_layers();
        let rld = self.length_density();
        let mut nh4 = DVector::zeros(n);
        let mut no3 = DVector::zeros(n);
        for layer in 0..=self.bottom_layer.min(n - 1) {
            let fraction_root = self.fraction_layer_with_roots(layer);
            let zone_nh4 = zone.nh4n.get(layer).copied().unwrap_or(0.0).max(0.0);
            let zone_no3 = zone.no3n.get(layer).copied().unwrap_or(0.0).max(0.0);
            let water = zone.water.get(layer).copied().unwrap_or(self.soil.layers[layer].water)
                - water_uptake.get(layer).copied().unwrap_or(0.0);
            let moisture = self.relative_moisture(layer, water);
            let (f_nh4, f_no3) = match self.params.nitrogen_method {
                NitrogenAvailableMethod::BasicAgPasture => (1.0, 1.0),
                NitrogenAvailableMethod::DefaultApsim => {
                    ((self.params.knh4 * moisture).min(1.0), (self.params.kno3 * moisture).min(1.0))
                }
                NitrogenAvailableMethod::AlternativeKNO3 => {
                    let sw_factor = moisture.powf(self.params.n_uptake_sw_factor);
                    let rld_factor = self.rld_factor(rld[layer]);
                    (
                        (self.params.ku_nh4 * rld_factor * sw_factor).min(1.0),
                        (self.params.ku_no3 * rld_factor * sw_factor).min(1.0),
                    )
                }
            };
            let cap = self.params.maximum_fraction_available;
            nh4[layer] = zone_nh4 * (f_nh4 * fraction_root).min(cap);
            no3[layer] = zone_no3 * (f_no3 * fraction_root).min(cap);
        }

        let total = nh4.sum() + no3.sum();
        if total > self.params.maximum_n_uptake && total > 0.0 {
            let scale = self.params.maximum_n_uptake / total;
            nh4 *= scale;
            no3 *= scale;
        }
        self.nh4_available = nh4;
        self.no3_available = no3;
    }

    pub fn clear_uptake(&mut self) {
        self.water_uptake.fill(0.0);
        self.no3_uptake.fill(0.0);
        self.nh4_uptake.fill(0.0);
    }

    /// Records water taken from this zone and removes it from the snapshot.
    pub fn set_water_uptake(&mut self, uptake: &DVector<f64>) {
        for (acc, amount) in self.water_uptake.iter_mut().zip(uptake.iter()) {
            *acc += amount;
        }
        self.soil.remove_water(uptake);
    }

    /// Records N taken from this zone and removes it from the snapshot.
    pub fn set_nitrogen_uptake(&mut self, no3: &DVector<f64>, nh4: &DVector<f64>) {
        for (acc, amount) in self.no3_uptake.iter_mut().zip(no3.iter()) {
            *acc += amount;
        }
        for (acc, amount) in self.nh4_uptake.iter_mut().zip(nh4.iter()) {
            *acc += amount;
        }
        self.soil.remove_nitrogen(no3, nh4);
    }

    pub fn do_clean_transfer_amounts(&mut self) {
        self.live.clean_transfers();
        self.dead.clean_transfers();
        self.detached_dm_layer.fill(0.0);
    }

    /// Live roots senesce at `rate_live`; dead roots detach at `rate_dead`.
    pub fn do_tissue_turnover(&mut self, rate_live: f64, rate_dead: f64) {
        let (dm, n, layers) = self.live.transfer_out(rate_live.clamp(0.0, 1.0));
        self.dead.receive(dm, n, layers.as_ref());
        let (_, _, detached) = self.dead.transfer_out(rate_dead.clamp(0.0, 1.0));
        if let Some(detached) = detached {
            self.detached_dm_layer = detached;
        }
        self.live.evaluate_luxury_n(self.n_conc_optimum);
        self.dead.evaluate_senesced_n(self.n_conc_minimum);
    }

    /// DM and N detached today, per layer.
    pub fn detached_by_layer(&self) -> (DVector<f64>, DVector<f64>) {
        let dm = self.detached_dm_layer.clone();
        let n = split_by(&dm, self.n_detached());
        (dm, n)
    }

    /// Splits new growth between layers: the average of the current and the
    /// target distributions, so the profile shifts gradually as roots deepen.
    pub fn add_new_growth(&mut self, dm: f64, n: f64) {
        if dm <= EPSILON {
            return;
        }
        let target = self.current_distribution_target();
        let current = self.live.fraction_by_layer().unwrap_or_else(|| target.clone());
        let mut fractions = if current.sum() > 0.0 {
            (&current + &target) * 0.5
        } else {
            target
        };
        let total = fractions.sum();
        if total > 0.0 {
            fractions /= total;
        }
        let layers = fractions * dm;
        self.live.receive(dm, n, Some(&layers));
    }

    /// Deepens the roots if there was net root growth today.
    pub fn evaluate_root_elongation(&mut self, net_root_growth: f64, temperature_factor: f64) -> f64 {
        if net_root_growth <= EPSILON || self.depth >= self.params.depth_maximum {
            return 0.0;
        }
        let previous = self.depth;
        let depth = (self.depth + self.params.elongation_rate * temperature_factor)
            .clamp(self.params.depth_minimum, self.params.depth_maximum);
        self.set_depth(depth);
        self.depth - previous
    }

    pub fn do_organ_update(&mut self) -> Result<()> {
        let pre_dm = self.dm_total();
        let pre_n = self.n_total();
        let growth_dm = self.live.dm_transferred_in;
        let growth_n = self.live.n_transferred_in;
        let detached_dm = self.dm_detached();
        let detached_n = self.n_detached();
        let remobilised = self.live.n_remobilised + self.dead.n_remobilised;

        self.live.update();
        self.dead.update();

        let dm_diff = pre_dm + growth_dm - detached_dm - self.dm_total();
        if dm_diff.abs() > EPSILON {
            return Err(PastureError::mass_balance(
                format!("growth and tissue turnover of roots in {}", self.zone_name),
                "DM",
                dm_diff,
            ));
        }
        let n_diff = pre_n + growth_n - remobilised - detached_n - self.n_total();
        if n_diff.abs() > EPSILON {
            return Err(PastureError::mass_balance(
                format!("growth and tissue turnover of roots in {}", self.zone_name),
                "N",
                n_diff,
            ));
        }
        Ok(())
    }

    pub fn do_kill_organ(&mut self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        let dm = self.live.dm * fraction;
        let n = self.live.n * fraction;
        let layers = self.live.dm_layer.as_ref().map(|l| l * fraction);
        self.live.scale(1.0 - fraction);
        self.dead.dm += dm;
        self.dead.n += n;
        if let (Some(dead_layers), Some(killed)) = (self.dead.dm_layer.as_mut(), layers) {
            *dead_layers += killed;
        }
    }

    /// Removes fractions of live and dead roots; returns the DM and N per layer removed.
    pub fn remove_fractions(&mut self, fraction_live: f64, fraction_dead: f64) -> (DVector<f64>, DVector<f64>) {
        let n = self.n_layers();
        let mut dm_out = DVector::zeros(n);
        let mut n_out = DVector::zeros(n);
        for (tissue, fraction) in [(&mut self.live, fraction_live), (&mut self.dead, fraction_dead)] {
            let fraction = fraction.clamp(0.0, 1.0);
            if let Some(layers) = tissue.dm_layer.as_ref() {
                let removed = layers * fraction;
                n_out += split_by(&removed, tissue.n * fraction);
                dm_out += removed;
            }
            tissue.scale(1.0 - fraction);
        }
        (dm_out, n_out)
    }

    /// Empties the organ; returns all DM and N per layer.
    pub fn take_all(&mut self) -> (DVector<f64>, DVector<f64>) {
        let removed = self.remove_fractions(1.0, 1.0);
        self.do_reset_organ();
        removed
    }

    pub fn do_reset_organ(&mut self) {
        self.live.reset();
        self.dead.reset();
    }
}

// Distributes an amount over layers in proportion to the given weights
fn split_by(weights: &DVector<f64>, amount: f64) -> DVector<f64> {
    let total = weights.sum();
    if total > 0.0 {
        weights * (amount / total)
    } else {
        DVector::zeros(weights.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn roots() -> RootOrgan {
        let soil = SoilProfile::default_silt_loam("field");
        let params = SpeciesParams::default();
        let mut root = RootOrgan::new(&soil, params.n_thresholds_roots, RootParams::new(&params));
        root.set_state(450.0, 500.0);
        root
    }

    #[test]
    fn target_distribution_covers_root_zone_only() {
        let root = roots();
        let target = root.current_distribution_target();
        assert_relative_eq!(target.sum(), 1.0, epsilon = 1e-12);
        assert_eq!(root.bottom_layer, 4);
        assert_eq!(target[5], 0.0);
        // constant density near the surface, decreasing below
        assert!(target[0] > target[1]);
        assert!(target[1] > target[3]);
        assert_relative_eq!(root.fraction_layer_with_roots(4), 0.5);
    }

    #[test]
    fn layers_sum_to_live_dm() {
        let mut root = roots();
        root.do_tissue_turnover(0.02, 1.0);
        root.add_new_growth(40.0, 0.8);
        root.do_organ_update().unwrap();
        let layers = root.live.dm_layer.as_ref().unwrap();
        assert_relative_eq!(layers.sum(), root.live.dm, epsilon = 1e-9);
        assert_relative_eq!(root.live.dm, 500.0 * 0.98 + 40.0, epsilon = 1e-9);
    }

    #[test]
    fn dead_roots_detach_to_layers() {
        let mut root = roots();
        root.do_tissue_turnover(0.1, 1.0);
        root.do_organ_update().unwrap();
        root.do_clean_transfer_amounts();
        root.do_tissue_turnover(0.0, 1.0);
        let (dm, n) = root.detached_by_layer();
        assert_relative_eq!(dm.sum(), 50.0, epsilon = 1e-9);
        assert_relative_eq!(n.sum(), root.n_detached(), epsilon = 1e-12);
    }

    #[test]
    fn elongation_is_bounded_by_maximum_depth() {
        let mut root = roots();
        assert_eq!(root.evaluate_root_elongation(0.0, 1.0), 0.0);
        for _ in 0..100 {
            root.evaluate_root_elongation(10.0, 1.0);
        }
        assert_relative_eq!(root.depth, 750.0);
        assert_eq!(root.bottom_layer, 7);
    }

    #[test]
    fn water_available_is_capped_by_extractable_water() {
        let mut root = roots();
        let zone = root.soil().zone_state();
        let available = root.evaluate_soil_water_available(&zone);
        // 21 mm extractable, KL 0.08 in the top layer
        assert_relative_eq!(available[0], 21.0 * 0.08, epsilon = 1e-9);
        assert_eq!(available[6], 0.0);
        for layer in 0..root.n_layers() {
            assert!(available[layer] <= 21.0 * 0.999 + 1e-12);
        }
    }

    #[test]
    fn nitrogen_available_is_limited_to_maximum_uptake() {
        let mut root = roots();
        let zone = root.soil().zone_state();
        let uptake = DVector::zeros(root.n_layers());
        root.evaluate_soil_nitrogen_available(&zone, &uptake);
        let total = root.nh4_available.sum() + root.no3_available.sum();
        assert_relative_eq!(total, 10.0, epsilon = 1e-9);
    }
}
