//! Narrow interfaces through which the rest of a simulation talks to a
//! plant: canopy queries, soil water and N uptake, organ damage, and the
//! sinks that receive detached material.

use crate::error::Result;
use crate::organ::{AboveGroundOrgan, OrganBiomassRemoval, RemovedMaterial};
use crate::root::RootOrgan;
use crate::soil::ZoneWaterAndN;
use nalgebra::DVector;

/// What a micro-climate or radiation model needs from a canopy.
pub trait CanopyQuery {
    fn lai_green(&self) -> f64;
    fn lai_total(&self) -> f64;
    fn cover_green(&self) -> f64;
    fn cover_total(&self) -> f64;
    /// Canopy height [mm].
    fn height(&self) -> f64;
    /// Canopy depth [mm].
    fn depth(&self) -> f64;
    fn albedo(&self) -> f64;
    /// Maximum stomatal conductance [m/s].
    fn gsmax(&self) -> f64;
    /// Solar radiation at which stomatal conductance halves [W/m^2].
    fn r50(&self) -> f64;
    /// Relative growth rate factor used to scale conductance.
    fn frgr(&self) -> f64;
    /// Potential transpiration [mm], which becomes the water demand.
    fn set_potential_ep(&mut self, ep: f64);
    /// Radiation intercepted by this canopy [MJ/m^2].
    fn set_light_profile(&mut self, intercepted_radn: f64);
}

/// Participation in the arbitration of soil water.
///
/// Estimates are `None` when the plant is not taking up water.
pub trait WaterUptakeParticipant {
    fn water_uptake_estimates(&mut self, zones: &[ZoneWaterAndN]) -> Result<Option<Vec<ZoneWaterAndN>>>;
    fn set_actual_water_uptake(&mut self, zones: &[ZoneWaterAndN]) -> Result<()>;
}

/// Participation in the arbitration of soil mineral N.
pub trait NitrogenUptakeParticipant {
    fn nitrogen_uptake_estimates(&mut self, zones: &[ZoneWaterAndN]) -> Result<Option<Vec<ZoneWaterAndN>>>;
    fn set_actual_nitrogen_uptakes(&mut self, zones: &[ZoneWaterAndN]) -> Result<()>;
}

/// An organ that external events (grazing, pests, cutting) can damage.
pub trait DamageableOrgan {
    fn name(&self) -> &str;
    fn remove_biomass(&mut self, fractions: &OrganBiomassRemoval) -> RemovedMaterial;
}

impl DamageableOrgan for AboveGroundOrgan {
    fn name(&self) -> &str {
        &self.name
    }

    fn remove_biomass(&mut self, fractions: &OrganBiomassRemoval) -> RemovedMaterial {
        AboveGroundOrgan::remove_biomass(self, fractions)
    }
}

impl DamageableOrgan for RootOrgan {
    fn name(&self) -> &str {
        "Roots"
    }

    // Root material taken off is split the same way; the residue share is
    // what stays in the soil.
    fn remove_biomass(&mut self, fractions: &OrganBiomassRemoval) -> RemovedMaterial {
        let live_fraction = fractions.live_total();
        let dead_fraction = fractions.dead_total();
        let live_dm = self.dm_live() * live_fraction;
        let dead_dm = self.dm_dead() * dead_fraction;
        let live_n = self.n_live() * live_fraction;
        let dead_n = self.n_dead() * dead_fraction;
        self.remove_fractions(live_fraction, dead_fraction);

        let live_residue = fractions.live_residue_share();
        let dead_residue = fractions.dead_residue_share();
        let dm_to_residue = live_dm * live_residue + dead_dm * dead_residue;
        let n_to_residue = live_n * live_residue + dead_n * dead_residue;
        RemovedMaterial {
            dm_removed: live_dm + dead_dm - dm_to_residue,
            n_removed: live_n + dead_n - n_to_residue,
            dm_to_residue,
            n_to_residue,
        }
    }
}

/// Receiver of detached plant material.
pub trait LitterSink {
    /// Detached shoot material, deposited on the soil surface.
    fn add_surface_litter(&mut self, dm: f64, n: f64, material_type: &str);
    /// Detached roots, added to the fresh organic matter of a soil zone.
    fn add_root_fom(&mut self, zone_name: &str, dm: &DVector<f64>, n: &DVector<f64>);
}

#[derive(Debug, Clone, PartialEq)]
pub enum LitterEvent {
    Surface {
        dm: f64,
        n: f64,
        material_type: String,
    },
    RootFom {
        zone_name: String,
        dm: DVector<f64>,
        n: DVector<f64>,
    },
}

/// A sink that keeps every deposit, used by the demo driver and tests.
#[derive(Debug, Clone, Default)]
pub struct LitterLedger {
    pub events: Vec<LitterEvent>,
}

impl LitterLedger {
    pub fn new() -> Self {
        LitterLedger::default()
    }

    pub fn surface_events(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, LitterEvent::Surface { .. }))
            .count()
    }

    pub fn surface_dm(&self) -> f64 {
        self.events
            .iter()
            .map(|e| match e {
                LitterEvent::Surface { dm, .. } => *dm,
                _ => 0.0,
            })
            .sum()
    }

    pub fn surface_n(&self) -> f64 {
        self.events
            .iter()
            .map(|e| match e {
                LitterEvent::Surface { n, .. } => *n,
                _ => 0.0,
            })
            .sum()
    }

    pub fn root_dm(&self) -> f64 {
        self.events
            .iter()
            .map(|e| match e {
                LitterEvent::RootFom { dm, .. } => dm.sum(),
                _ => 0.0,
            })
            .sum()
    }

    pub fn root_n(&self) -> f64 {
        self.events
            .iter()
            .map(|e| match e {
                LitterEvent::RootFom { n, .. } => n.sum(),
                _ => 0.0,
            })
            .sum()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl LitterSink for LitterLedger {
    fn add_surface_litter(&mut self, dm: f64, n: f64, material_type: &str) {
        self.events.push(LitterEvent::Surface {
            dm,
            n,
            material_type: material_type.to_string(),
        });
    }

    fn add_root_fom(&mut self, zone_name: &str, dm: &DVector<f64>, n: &DVector<f64>) {
        self.events.push(LitterEvent::RootFom {
            zone_name: zone_name.to_string(),
            dm: dm.clone(),
            n: n.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SpeciesParams;
    use crate::root::RootParams;
    use crate::soil::SoilProfile;
    use approx::assert_relative_eq;

    #[test]
    fn ledger_totals_by_kind() {
        let mut ledger = LitterLedger::new();
        ledger.add_surface_litter(120.0, 2.4, "Grass");
        ledger.add_surface_litter(30.0, 0.6, "Grass");
        ledger.add_root_fom("field", &DVector::from_vec(vec![5.0, 3.0]), &DVector::from_vec(vec![0.1, 0.06]));
        assert_eq!(ledger.surface_events(), 2);
        assert_relative_eq!(ledger.surface_dm(), 150.0);
        assert_relative_eq!(ledger.surface_n(), 3.0);
        assert_relative_eq!(ledger.root_dm(), 8.0);
        assert_relative_eq!(ledger.root_n(), 0.16);
        ledger.clear();
        assert!(ledger.events.is_empty());
    }

    #[test]
    fn roots_can_be_damaged_through_the_trait() {
        let soil = SoilProfile::default_silt_loam("field");
        let params = SpeciesParams::default();
        let mut root = RootOrgan::new(&soil, params.n_thresholds_roots, RootParams::new(&params));
        root.set_state(300.0, 400.0);
        let organ: &mut dyn DamageableOrgan = &mut root;
        assert_eq!(organ.name(), "Roots");
        let removed = organ.remove_biomass(&OrganBiomassRemoval {
            fraction_live_to_remove: 0.1,
            fraction_live_to_residue: 0.1,
            ..Default::default()
        });
        assert_relative_eq!(removed.dm_total(), 80.0, epsilon = 1e-9);
        assert_relative_eq!(removed.dm_to_residue, 40.0, epsilon = 1e-9);
        assert_relative_eq!(root.dm_live(), 320.0, epsilon = 1e-9);
    }
}
