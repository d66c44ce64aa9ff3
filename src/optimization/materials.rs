//! Bar stock commonly used for tuned percussion.
//!
//! Properties are nominal handbook values; real wood varies by tens of
//! percent between boards, so measure when it matters.

use serde::{Deserialize, Serialize};

use super::types::Material;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialCategory {
    Metal,
    Wood,
}

/// A row of the materials table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialEntry {
    pub key: &'static str,
    pub name: &'static str,
    pub category: MaterialCategory,
    /// Young's modulus (Pa)
    pub e: f64,
    /// Density (kg/m^3)
    pub rho: f64,
    pub nu: f64,
}

impl MaterialEntry {
    pub fn material(&self) -> Material {
        Material::new(self.name, self.e, self.rho, self.nu)
    }
}

const fn entry(key: &'static str, name: &'static str, category: MaterialCategory, e: f64, rho: f64, nu: f64) -> MaterialEntry {
    MaterialEntry { key, name, category, e, rho, nu }
}

use MaterialCategory::{Metal, Wood};

pub const MATERIALS: &[MaterialEntry] = &[
    entry("aluminum", "Aluminum 6061", Metal, 68.9e9, 2700.0, 0.33),
    entry("aluminum7075", "Aluminum 7075", Metal, 71.7e9, 2810.0, 0.33),
    entry("brass", "Brass C260", Metal, 110e9, 8530.0, 0.35),
    entry("steel", "Steel 1018", Metal, 205e9, 7870.0, 0.29),
    entry("stainless_steel", "Stainless Steel 304", Metal, 193e9, 8000.0, 0.29),
    entry("bronze", "Phosphor Bronze", Metal, 110e9, 8800.0, 0.34),
    entry("bell_bronze", "Bell Bronze (B20)", Metal, 100e9, 8600.0, 0.34),
    entry("fiberglass", "Fiberglass Composite", Metal, 17e9, 1800.0, 0.30),
    entry("rosewood", "Honduran Rosewood", Wood, 12.5e9, 850.0, 0.37),
    entry("african_rosewood", "African Rosewood (Bubinga)", Wood, 15.8e9, 890.0, 0.36),
    entry("padauk", "African Padauk", Wood, 11.7e9, 750.0, 0.35),
    entry("sapele", "Sapele", Wood, 12e9, 640.0, 0.35),
    entry("bubinga", "Bubinga", Wood, 15.8e9, 890.0, 0.36),
    entry("maple", "Hard Maple", Wood, 12.6e9, 705.0, 0.35),
    entry("purpleheart", "Purpleheart", Wood, 17e9, 880.0, 0.35),
    entry("wenge", "Wenge", Wood, 14e9, 870.0, 0.35),
    entry("bocote", "Bocote", Wood, 14.1e9, 930.0, 0.36),
    entry("zebrawood", "Zebrawood", Wood, 15.2e9, 780.0, 0.35),
    entry("cocobolo", "Cocobolo", Wood, 14.1e9, 1100.0, 0.36),
    entry("ebony", "African Ebony", Wood, 17.4e9, 1050.0, 0.38),
    entry("teak", "Teak", Wood, 12.3e9, 630.0, 0.35),
];

/// Looks a material up by key.
///
/// # Example
/// ```
/// use undercut_fem::optimization::materials::get_material;
///
/// let sapele = get_material("sapele").unwrap();
/// assert_eq!(sapele.name, "Sapele");
/// assert!((sapele.e - 12.0e9).abs() < 1.0);
/// ```
pub fn get_material(key: &str) -> Option<Material> {
    MATERIALS.iter().find(|m| m.key == key).map(MaterialEntry::material)
}

/// Every material as `(key, material)`, metals first.
pub fn get_all_materials() -> Vec<(&'static str, Material)> {
    MATERIALS.iter().map(|m| (m.key, m.material())).collect()
}

pub fn get_materials_by_category(category: MaterialCategory) -> Vec<(&'static str, Material)> {
    MATERIALS
        .iter()
        .filter(|m| m.category == category)
        .map(|m| (m.key, m.material()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sapele_properties() {
        let m = get_material("sapele").unwrap();
        assert_eq!(m, Material::sapele());
        assert!(m.validate().is_ok());
    }

    #[test]
    fn aluminum_matches_constructor() {
        assert_eq!(get_material("aluminum").unwrap(), Material::aluminum());
    }

    #[test]
    fn unknown_key() {
        assert!(get_material("unobtainium").is_none());
        assert!(get_material("").is_none());
    }

    #[test]
    fn categories_split_the_table() {
        assert_eq!(get_materials_by_category(MaterialCategory::Metal).len(), 8);
        assert_eq!(get_materials_by_category(MaterialCategory::Wood).len(), 13);
        assert_eq!(get_all_materials().len(), MATERIALS.len());
    }

    #[test]
    fn every_entry_is_physical_and_unique() {
        for (i, m) in MATERIALS.iter().enumerate() {
            assert!(m.material().validate().is_ok(), "{}", m.key);
            assert!(MATERIALS[i + 1..].iter().all(|other| other.key != m.key));
        }
    }
}
