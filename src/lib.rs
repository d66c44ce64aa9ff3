//! Frequency model and evolutionary optimizer for undercut percussion bars.
//!
//! A bar of rectangular section is thinned by nested, symmetric rectangular
//! cuts on its underside. Two finite-element models predict its free-free
//! bending frequencies:
//!
//! * a Timoshenko beam with banded storage ([`beam2d_solver`]), fast enough to
//!   sit inside the optimizer;
//! * a solid Hex8 mesh ([`solver`]) whose modes are classified into vertical
//!   bending, torsional, lateral and axial families.
//!
//! [`optimization`] searches cut geometries whose lowest bending modes hit a
//! set of target frequencies.
//!
//! ```no_run
//! use undercut_fem::optimization::{run_evolution_with_seed, BarParameters, Material, RunRequest};
//!
//! let request = RunRequest::new(
//!     BarParameters::new(0.35, 0.04, 0.02, 0.002),
//!     Material::sapele(),
//!     vec![350.0, 1400.0, 3500.0],
//!     2,
//! );
//! let result = run_evolution_with_seed(&request, 7)?;
//! println!("{result}");
//! # Ok::<(), undercut_fem::FemError>(())
//! ```

pub mod assembly;
pub mod banded;
pub mod beam2d;
pub mod beam2d_solver;
pub mod cuts;
pub mod eigen;
pub mod element;
pub mod error;
pub mod lanczos;
pub mod length_finder;
pub mod mesh;
pub mod modes;
pub mod notes;
pub mod optimization;
pub mod presets;
pub mod resolution;
pub mod solver;
pub mod types;

pub use beam2d_solver::{compute_frequencies_2d, compute_frequencies_2d_adaptive, compute_frequencies_2d_with_shapes};
pub use cuts::{cuts_to_genes, generate_element_heights, genes_to_cuts, Cut};
pub use error::{FemError, Result};
pub use mesh::{generate_bar_mesh_3d, Mesh3d};
pub use resolution::{analyze_mesh_resolution, check_mesh_resolution};
pub use solver::{
    compute_frequencies_3d, compute_frequencies_3d_classified, get_bending_frequencies_3d, SolidOptions,
};
pub use types::{EigenSolver, ModeType};
