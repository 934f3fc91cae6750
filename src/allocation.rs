//! Partitioning of new growth: shoot and root, leaf, stem and stolon, and
//! the N that goes with it.

use crate::error::{PastureError, Result};
use crate::params::{EPSILON, SpeciesParams};

/// Fraction of new growth allocated to the shoot.
///
/// The partition pushes the current shoot:root ratio towards the target,
/// which is lowered when water or N limit growth. Allocation to roots is
/// capped at the maximum root allocation.
pub fn fraction_to_shoot(params: &SpeciesParams, glf_min: f64, above_live: f64, below_live: f64, repro_factor: f64) -> f64 {
    let mut fraction = 1.0;
    if below_live > EPSILON {
        let factor = params.shoot_root_glf_factor;
        let glf_factor = 1.0 - factor * (1.0 - glf_min.clamp(0.0, 1.0).powf(1.0 / factor));
        let current_sr = above_live / below_live;
        let target_sr = params.target_shoot_root_ratio * repro_factor;
        fraction = if current_sr > 0.0 {
            let growth_sr = target_sr * glf_factor * target_sr / current_sr;
            growth_sr / (1.0 + growth_sr)
        } else {
            1.0
        };
    }
    fraction.max(1.0 - params.max_root_allocation)
}

/// Target fraction of shoot growth going to leaves; it declines from the
/// maximum towards the minimum as the shoot gets heavier.
pub fn target_fraction_leaf(params: &SpeciesParams, above_live: f64) -> f64 {
    let mut target = params.fraction_leaf_maximum;
    if params.fraction_leaf_minimum < params.fraction_leaf_maximum && above_live > params.fraction_leaf_dm_threshold {
        let aux = ((above_live - params.fraction_leaf_dm_threshold)
            / (params.fraction_leaf_dm_factor - params.fraction_leaf_dm_threshold))
            .powf(params.fraction_leaf_exponent);
        target = params.fraction_leaf_minimum + (params.fraction_leaf_maximum - params.fraction_leaf_minimum) / (1.0 + aux);
    }
    target
}

/// Fraction of shoot growth allocated to leaves, smoothed against the
/// current leaf:stem ratio so heavy grazing of leaves is compensated.
///
/// Bounded so that leaves and stolons never take more than the whole shoot.
pub fn fraction_to_leaf(params: &SpeciesParams, above_live: f64, leaf_live: f64, stem_and_stolon_live: f64) -> f64 {
    let target = target_fraction_leaf(params, above_live);
    let fraction = if leaf_live > 0.0 {
        if stem_and_stolon_live <= 0.0 || target >= 1.0 {
            target
        } else {
            let current_ls = leaf_live / stem_and_stolon_live;
            let target_ls = target / (1.0 - target);
            let new_ls = target_ls * target_ls / current_ls;
            new_ls / (1.0 + new_ls)
        }
    } else {
        params.fraction_leaf_maximum
    };
    fraction.clamp(0.0, 1.0 - params.fraction_to_stolon)
}

/// Fractions of total new growth going to each organ.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrganFractions {
    pub leaves: f64,
    pub stems: f64,
    pub stolons: f64,
    pub roots: f64,
}

impl OrganFractions {
    pub fn new(fraction_to_shoot: f64, fraction_to_leaf: f64, fraction_to_stolon: f64) -> Self {
        OrganFractions {
            leaves: fraction_to_shoot * fraction_to_leaf,
            stems: fraction_to_shoot * (1.0 - fraction_to_stolon - fraction_to_leaf),
            stolons: fraction_to_shoot * fraction_to_stolon,
            roots: 1.0 - fraction_to_shoot,
        }
    }

    pub fn shoot(&self) -> f64 {
        self.leaves + self.stems + self.stolons
    }

    /// N needed to grow `growth` kg DM at the given N concentrations
    /// (leaves, stems, stolons, roots).
    pub fn n_demand(&self, growth: f64, n_conc: [f64; 4]) -> f64 {
        growth * self.weights(n_conc).iter().sum::<f64>()
    }

    fn weights(&self, n_conc: [f64; 4]) -> [f64; 4] {
        [
            self.leaves * n_conc[0],
            self.stems * n_conc[1],
            self.stolons * n_conc[2],
            self.roots * n_conc[3],
        ]
    }

    /// Splits the new growth N between organs in proportion to DM fraction
    /// times N concentration. Returns N for leaves, stems, stolons, roots.
    pub fn split_n(&self, species: &str, new_growth_n: f64, n_conc: [f64; 4]) -> Result<[f64; 4]> {
        let weights = self.weights(n_conc);
        let n_sum: f64 = weights.iter().sum();
        if n_sum <= EPSILON {
            return Err(PastureError::AllocationFailed {
                species: species.to_string(),
            });
        }
        Ok(weights.map(|w| new_growth_n * w / n_sum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn shoot_fraction_moves_ratio_towards_target() {
        let params = SpeciesParams::default();
        // at the target ratio with no stress the fraction matches the target
        assert_relative_eq!(fraction_to_shoot(&params, 1.0, 4000.0, 1000.0, 1.0), 0.8);
        // too much shoot: more goes to roots, up to the cap
        assert_relative_eq!(fraction_to_shoot(&params, 1.0, 8000.0, 1000.0, 1.0), 0.75);
        // too much root: more goes to shoot
        assert!(fraction_to_shoot(&params, 1.0, 2000.0, 1000.0, 1.0) > 0.8);
        // stress lowers the shoot fraction
        assert!(fraction_to_shoot(&params, 0.3, 3000.0, 1000.0, 1.0) < fraction_to_shoot(&params, 1.0, 3000.0, 1000.0, 1.0));
        assert_eq!(fraction_to_shoot(&params, 1.0, 100.0, 0.0, 1.0), 1.0);
    }

    #[test]
    fn leaf_fraction_declines_with_shoot_mass() {
        let params = SpeciesParams {
            fraction_leaf_minimum: 0.3,
            ..SpeciesParams::default()
        };
        assert_relative_eq!(target_fraction_leaf(&params, 400.0), 0.7);
        assert_relative_eq!(target_fraction_leaf(&params, 2000.0), 0.5);
        assert!(target_fraction_leaf(&params, 6000.0) < 0.35);
    }

    #[test]
    fn leaf_fraction_compensates_for_leaf_loss() {
        let params = SpeciesParams::default();
        let at_target = fraction_to_leaf(&params, 1000.0, 700.0, 300.0);
        assert_relative_eq!(at_target, 0.7, epsilon = 1e-12);
        assert!(fraction_to_leaf(&params, 1000.0, 200.0, 800.0) > at_target);
        assert_eq!(fraction_to_leaf(&params, 1000.0, 0.0, 800.0), 0.7);
    }

    #[test]
    fn organ_fractions_sum_to_one() {
        let clover = SpeciesParams::white_clover();
        let f_leaf = fraction_to_leaf(&clover, 600.0, 50.0, 500.0);
        assert!(f_leaf <= 1.0 - clover.fraction_to_stolon);
        let fractions = OrganFractions::new(0.8, f_leaf, clover.fraction_to_stolon);
        assert!(fractions.stems >= 0.0);
        assert_relative_eq!(fractions.shoot(), 0.8, epsilon = 1e-12);
        assert_relative_eq!(fractions.shoot() + fractions.roots, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn new_n_goes_where_the_demand_is() {
        let fractions = OrganFractions::new(0.8, 0.7, 0.0);
        let n_conc = [0.04, 0.02, 0.0, 0.02];
        let split = fractions.split_n("ryegrass", 2.0, n_conc).unwrap();
        assert_relative_eq!(split.iter().sum::<f64>(), 2.0, epsilon = 1e-12);
        assert!(split[0] > split[1]);
        assert_eq!(split[2], 0.0);
        assert_relative_eq!(fractions.n_demand(100.0, n_conc), 100.0 * (0.56 * 0.04 + 0.24 * 0.02 + 0.2 * 0.02));

        let none = OrganFractions::new(1.0, 1.0, 0.0);
        assert!(matches!(
            none.split_n("ryegrass", 1.0, [0.0; 4]),
            Err(PastureError::AllocationFailed { .. })
        ));
    }
}
