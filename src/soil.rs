use crate::error::{PastureError, Result};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// Soil layer state seen by the plant (all water amounts in mm, N in kg/ha)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoilLayer {
    pub thickness: f64, // Layer thickness [mm]
    pub water: f64,     // Current water content [mm]
    pub sat: f64,       // Water content at saturation [mm]
    pub dul: f64,       // Drained upper limit [mm]
    pub ll: f64,        // Plant lower limit [mm]
    pub kl: f64,        // Water extraction coefficient [/day]
    pub ksat: f64,      // Saturated hydraulic conductivity [mm/day]
    pub nh4: f64,       // Ammonium N [kg/ha]
    pub no3: f64,       // Nitrate N [kg/ha]
}

impl SoilLayer {
    // Creates a layer from volumetric fractions, filled to the drained upper limit
    pub fn from_volumetric(thickness: f64, sat: f64, dul: f64, ll: f64, kl: f64, ksat: f64) -> Self {
        SoilLayer {
            thickness,
            water: dul * thickness,
            sat: sat * thickness,
            dul: dul * thickness,
            ll: ll * thickness,
            kl,
            ksat,
            nh4: 0.0,
            no3: 0.0,
        }
    }

    // Relative water content between LL (0) and DUL (1)
    pub fn relative_moisture(&self) -> f64 {
        let range = self.dul - self.ll;
        if range <= 0.0 {
            return 0.0;
        }
        ((self.water - self.ll) / range).clamp(0.0, 1.0)
    }
}

// Water and mineral N per layer for one zone, exchanged with the uptake arbitrator
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneWaterAndN {
    pub zone_name: String,
    pub water: DVector<f64>, // [mm]
    pub no3n: DVector<f64>,  // [kg/ha]
    pub nh4n: DVector<f64>,  // [kg/ha]
}

impl ZoneWaterAndN {
    pub fn zeros(zone_name: &str, n_layers: usize) -> Self {
        ZoneWaterAndN {
            zone_name: zone_name.to_string(),
            water: DVector::zeros(n_layers),
            no3n: DVector::zeros(n_layers),
            nh4n: DVector::zeros(n_layers),
        }
    }
}

// Soil profile of one zone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoilProfile {
    pub zone_name: String,
    #[serde(default)]
    pub soil_name: String, // name of soils like "Templeton silt loam"
    pub layers: Vec<SoilLayer>,
}

impl SoilProfile {
    pub fn new(zone_name: &str, layers: Vec<SoilLayer>) -> Self {
        SoilProfile {
            zone_name: zone_name.to_string(),
            soil_name: String::new(),
            layers,
        }
    }

    // A generic silt loam, ten 100 mm layers with KL decreasing with depth
    pub fn default_silt_loam(zone_name: &str) -> Self {
        let layers = (0..10)
            .map(|i| {
                let kl = 0.08 - 0.006 * i as f64;
                let mut layer = SoilLayer::from_volumetric(100.0, 0.45, 0.33, 0.12, kl, 500.0);
                layer.nh4 = 1.0;
                layer.no3 = if i < 3 { 8.0 } else { 2.0 };
                layer
            })
            .collect();
        SoilProfile {
            zone_name: zone_name.to_string(),
            soil_name: "silt loam".to_string(),
            layers,
        }
    }

    // Reads a named profile table, e.g. [silt_loam] with a `layers` array of tables
    pub fn from_toml_table(toml_str: &str, soil_name: &str, zone_name: &str) -> Result<Self> {
        let doc: toml::Table = toml::from_str(toml_str)?;
        let mut key = soil_name.to_lowercase();
        if key.is_empty() {
            key = "silt_loam".to_string();
        }
        let table = doc
            .get(&key)
            .ok_or_else(|| PastureError::config(format!("no soil table named '{}'", soil_name)))?;
        let layers: Vec<SoilLayer> = table
            .get("layers")
            .cloned()
            .ok_or_else(|| PastureError::config(format!("soil table '{}' has no layers", soil_name)))?
            .try_into()?;
        let profile = SoilProfile {
            zone_name: zone_name.to_string(),
            soil_name: key,
            layers,
        };
        profile.validate()?;
        Ok(profile)
    }

    pub fn from_toml_file(path: impl AsRef<Path>, soil_name: &str, zone_name: &str) -> Result<Self> {
        let path = path.as_ref();
        let toml_str = fs::read_to_string(path).map_err(|source| PastureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_table(&toml_str, soil_name, zone_name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(PastureError::config(format!("soil in zone '{}' has no layers", self.zone_name)));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.thickness <= 0.0 || layer.ll > layer.dul || layer.dul > layer.sat {
                return Err(PastureError::config(format!(
                    "soil layer {} in zone '{}' must have positive thickness and LL <= DUL <= SAT",
                    i, self.zone_name
                )));
            }
        }
        Ok(())
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn thickness(&self) -> DVector<f64> {
        DVector::from_iterator(self.n_layers(), self.layers.iter().map(|l| l.thickness))
    }

    pub fn water(&self) -> DVector<f64> {
        DVector::from_iterator(self.n_layers(), self.layers.iter().map(|l| l.water))
    }

    pub fn no3(&self) -> DVector<f64> {
        DVector::from_iterator(self.n_layers(), self.layers.iter().map(|l| l.no3))
    }

    pub fn nh4(&self) -> DVector<f64> {
        DVector::from_iterator(self.n_layers(), self.layers.iter().map(|l| l.nh4))
    }

    pub fn total_depth(&self) -> f64 {
        self.layers.iter().map(|l| l.thickness).sum()
    }

    // Depth from the surface to the top of a layer [mm]
    pub fn depth_to_layer_top(&self, layer: usize) -> f64 {
        self.layers.iter().take(layer).map(|l| l.thickness).sum()
    }

    // Index of the layer containing the given depth (deepest layer if beyond the profile)
    pub fn layer_index_at_depth(&self, depth: f64) -> usize {
        let mut result = 0;
        let mut current_depth = 0.0;
        for (layer, l) in self.layers.iter().enumerate() {
            if depth > current_depth {
                result = layer;
                current_depth += l.thickness;
            } else {
                break;
            }
        }
        result
    }

    // Current water and N state of this zone
    pub fn zone_state(&self) -> ZoneWaterAndN {
        ZoneWaterAndN {
            zone_name: self.zone_name.clone(),
            water: self.water(),
            no3n: self.no3(),
            nh4n: self.nh4(),
        }
    }

    // Copies water and N amounts from an arbitrator record
    pub fn update_from_zone(&mut self, zone: &ZoneWaterAndN) {
        for (i, layer) in self.layers.iter_mut().enumerate() {
            if i < zone.water.len() {
                layer.water = zone.water[i];
                layer.no3 = zone.no3n[i];
                layer.nh4 = zone.nh4n[i];
            }
        }
    }

    pub fn remove_water(&mut self, amounts: &DVector<f64>) {
        for (layer, amount) in self.layers.iter_mut().zip(amounts.iter()) {
            layer.water = (layer.water - amount).max(0.0);
        }
    }

    pub fn remove_nitrogen(&mut self, no3: &DVector<f64>, nh4: &DVector<f64>) {
        for ((layer, a), b) in self.layers.iter_mut().zip(no3.iter()).zip(nh4.iter()) {
            layer.no3 = (layer.no3 - a).max(0.0);
            layer.nh4 = (layer.nh4 - b).max(0.0);
        }
    }

    pub fn set_no3(&mut self, values: &DVector<f64>) {
        for (layer, value) in self.layers.iter_mut().zip(values.iter()) {
            layer.no3 = value.max(0.0);
        }
    }

    pub fn set_nh4(&mut self, values: &DVector<f64>) {
        for (layer, value) in self.layers.iter_mut().zip(values.iter()) {
            layer.nh4 = value.max(0.0);
        }
    }

    // Adds water to the profile from the top, filling each layer up to saturation
    pub fn add_water(&mut self, mut amount: f64) -> f64 {
        for layer in self.layers.iter_mut() {
            if amount <= 0.0 {
                break;
            }
            let room = (layer.sat - layer.water).max(0.0);
            let added = room.min(amount);
            layer.water += added;
            amount -= added;
        }
        amount.max(0.0)
    }

    // Drains each layer above DUL into the layer below, the bottom layer drains out
    pub fn drain_to_dul(&mut self) -> f64 {
        let mut excess = 0.0;
        for layer in self.layers.iter_mut() {
            layer.water += excess;
            excess = (layer.water - layer.dul).max(0.0);
            layer.water -= excess;
        }
        excess
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn layer_index_follows_depth() {
        let soil = SoilProfile::default_silt_loam("field");
        assert_eq!(soil.layer_index_at_depth(50.0), 0);
        assert_eq!(soil.layer_index_at_depth(100.0), 0);
        assert_eq!(soil.layer_index_at_depth(101.0), 1);
        assert_eq!(soil.layer_index_at_depth(5000.0), 9);
        assert_relative_eq!(soil.depth_to_layer_top(3), 300.0);
    }

    #[test]
    fn water_is_removed_and_never_negative() {
        let mut soil = SoilProfile::default_silt_loam("field");
        let mut uptake = DVector::zeros(soil.n_layers());
        uptake[0] = 5.0;
        uptake[1] = 1000.0;
        soil.remove_water(&uptake);
        assert_relative_eq!(soil.layers[0].water, 28.0);
        assert_eq!(soil.layers[1].water, 0.0);
    }

    #[test]
    fn rain_fills_then_drains() {
        let mut soil = SoilProfile::default_silt_loam("field");
        let runoff = soil.add_water(20.0);
        assert_eq!(runoff, 0.0);
        assert_relative_eq!(soil.layers[0].water, 45.0);
        assert_relative_eq!(soil.layers[1].water, 41.0);
        let drainage = soil.drain_to_dul();
        assert_relative_eq!(drainage, 20.0, epsilon = 1e-9);
        assert_relative_eq!(soil.layers[0].water, 33.0);
    }

    #[test]
    fn profile_is_read_from_named_table() {
        let doc = r#"
            [clay]
            layers = [
                { thickness = 150.0, water = 60.0, sat = 75.0, dul = 60.0, ll = 30.0, kl = 0.06, ksat = 50.0, nh4 = 1.0, no3 = 5.0 },
                { thickness = 150.0, water = 55.0, sat = 75.0, dul = 60.0, ll = 33.0, kl = 0.04, ksat = 20.0, nh4 = 0.5, no3 = 2.0 },
            ]
        "#;
        let soil = SoilProfile::from_toml_table(doc, "Clay", "paddock").unwrap();
        assert_eq!(soil.n_layers(), 2);
        assert_eq!(soil.zone_name, "paddock");
        assert_relative_eq!(soil.total_depth(), 300.0);
        assert!(SoilProfile::from_toml_table(doc, "sand", "paddock").is_err());
    }
}
