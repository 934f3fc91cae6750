//! A single age class of plant tissue: DM and N with the day's transfers.

use crate::params::{CARBON_FRACTION_IN_DM, CN_RATIO_CELL_WALL, CN_RATIO_PROTEIN, EPSILON};
use nalgebra::DVector;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TissuePool {
    pub dm: f64,                                // [kg/ha]
    pub n: f64,                                 // [kg/ha]
    pub dm_layer: Option<DVector<f64>>,         // per soil layer, roots only [kg/ha]

    pub dm_transferred_in: f64,
    pub dm_transferred_out: f64,
    pub n_transferred_in: f64,
    pub n_transferred_out: f64,
    pub dm_layers_transferred_in: Option<DVector<f64>>,

    pub n_remobilisable: f64,                   // available for remobilisation today
    pub n_remobilised: f64,                     // taken today
    pub fraction_n_luxury_remobilisable: f64,

    pub digestibility_cell_wall: f64,
    pub digestibility_protein: f64,
    pub fraction_sugar_new_growth: f64,
}

impl TissuePool {
    pub fn new() -> Self {
        TissuePool::default()
    }

    /// A pool that keeps its DM distributed over soil layers.
    pub fn layered(n_layers: usize) -> Self {
        TissuePool {
            dm_layer: Some(DVector::zeros(n_layers)),
            dm_layers_transferred_in: Some(DVector::zeros(n_layers)),
            ..TissuePool::default()
        }
    }

    pub fn n_conc(&self) -> f64 {
        if self.dm > 0.0 { self.n / self.dm } else { 0.0 }
    }

    pub fn set_n_conc(&mut self, n_conc: f64) {
        self.n = self.dm * n_conc;
    }

    /// Sets the DM of a layered pool, distributed by the given fractions.
    pub fn set_dm_by_layer(&mut self, dm: f64, fractions: &DVector<f64>) {
        self.dm = dm;
        self.dm_layer = Some(fractions * dm);
    }

    /// Share of the pool DM in each layer (zeros if empty).
    pub fn fraction_by_layer(&self) -> Option<DVector<f64>> {
        self.dm_layer.as_ref().map(|layers| {
            let total = layers.sum();
            if total > 0.0 { layers / total } else { DVector::zeros(layers.len()) }
        })
    }

    pub fn clean_transfers(&mut self) {
        self.dm_transferred_in = 0.0;
        self.dm_transferred_out = 0.0;
        self.n_transferred_in = 0.0;
        self.n_transferred_out = 0.0;
        self.n_remobilisable = 0.0;
        self.n_remobilised = 0.0;
        if let Some(layers) = self.dm_layers_transferred_in.as_mut() {
            layers.fill(0.0);
        }
    }

    /// Marks a fraction of today's standing DM and N to leave the pool.
    /// Returns the DM, N and per-layer DM leaving.
    pub fn transfer_out(&mut self, fraction: f64) -> (f64, f64, Option<DVector<f64>>) {
        let dm_out = self.dm * fraction;
        let n_out = self.n * fraction;
        self.dm_transferred_out += dm_out;
        self.n_transferred_out += n_out;
        let layers_out = self.dm_layer.as_ref().map(|layers| layers * fraction);
        (dm_out, n_out, layers_out)
    }

    pub fn receive(&mut self, dm: f64, n: f64, layers: Option<&DVector<f64>>) {
        self.dm_transferred_in += dm;
        self.n_transferred_in += n;
        if let (Some(incoming), Some(acc)) = (layers, self.dm_layers_transferred_in.as_mut()) {
            *acc += incoming;
        }
    }

    /// Luxury N that live tissue may give up: N above optimum after today's outflow.
    pub fn evaluate_luxury_n(&mut self, n_conc_optimum: f64) {
        let n_left = self.n - self.n_transferred_out;
        let dm_left = self.dm - self.dm_transferred_out;
        self.n_remobilisable = self.fraction_n_luxury_remobilisable * (n_left - dm_left * n_conc_optimum).max(0.0);
    }

    /// Senesced N that dead tissue may give up: N above minimum in today's inflow.
    pub fn evaluate_senesced_n(&mut self, n_conc_minimum: f64) {
        self.n_remobilisable = (self.n_transferred_in - self.dm_transferred_in * n_conc_minimum).max(0.0);
    }

    /// Takes a fraction of the remobilisable N; returns the amount taken.
    pub fn remobilise_n(&mut self, fraction: f64) -> f64 {
        let amount = self.n_remobilisable * fraction.clamp(0.0, 1.0);
        self.n_remobilised += amount;
        self.n_remobilisable -= amount;
        amount
    }

    /// Applies the day's transfers.
    pub fn update(&mut self) {
        let fraction_out = if self.dm > 0.0 {
            (self.dm_transferred_out / self.dm).min(1.0)
        } else {
            0.0
        };
        self.dm += self.dm_transferred_in - self.dm_transferred_out;
        self.n += self.n_transferred_in - self.n_transferred_out - self.n_remobilised;
        if let Some(layers) = self.dm_layer.as_mut() {
            *layers *= 1.0 - fraction_out;
            if let Some(incoming) = self.dm_layers_transferred_in.as_ref() {
                *layers += incoming;
            }
        }
        self.clamp_round_off();
    }

    /// Scales DM, N and remobilisable N by the fraction remaining.
    pub fn scale(&mut self, fraction_remaining: f64) {
        let f = fraction_remaining.max(0.0);
        self.dm *= f;
        self.n *= f;
        self.n_remobilisable *= f;
        if let Some(layers) = self.dm_layer.as_mut() {
            *layers *= f;
        }
    }

    pub fn reset(&mut self) {
        self.dm = 0.0;
        self.n = 0.0;
        if let Some(layers) = self.dm_layer.as_mut() {
            layers.fill(0.0);
        }
        self.clean_transfers();
    }

    /// Digestibility from sugar, protein and cell wall fractions.
    pub fn digestibility(&self) -> f64 {
        if self.dm < EPSILON {
            return 0.0;
        }
        let f_sugar = (self.fraction_sugar_new_growth * self.dm_transferred_in / self.dm).clamp(0.0, 1.0);
        let f_protein = if self.n > 0.0 {
            let cn_tissue = self.dm * CARBON_FRACTION_IN_DM / self.n;
            let f = (CN_RATIO_CELL_WALL / cn_tissue - (1.0 - f_sugar)) / (CN_RATIO_CELL_WALL / CN_RATIO_PROTEIN - 1.0);
            f.clamp(0.0, 1.0 - f_sugar)
        } else {
            0.0
        };
        let f_wall = 1.0 - f_sugar - f_protein;
        f_sugar + f_protein * self.digestibility_protein + f_wall * self.digestibility_cell_wall
    }

    // Round-off can leave tiny negatives after a full transfer out
    fn clamp_round_off(&mut self) {
        if self.dm.abs() < EPSILON * 1e-3 {
            self.dm = 0.0;
        }
        if self.n.abs() < EPSILON * 1e-3 {
            self.n = 0.0;
        }
    }
}
