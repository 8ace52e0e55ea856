//! elmer-export: Translate electric machine descriptions to Elmer FEA decks
//!
//! This crate provides:
//! - Parsing of serialized machine descriptions (JSON)
//! - Material index assignment and magnetization modeling for magnet bodies
//! - Emission of the `.sif` simulation deck and `.pmf` material property files
//!
//! The mesh itself comes from an external mesher; ElmerGrid converts it and
//! writes the `mesh.names` mapping this crate consumes.

pub mod codegen;
pub mod elmer;
pub mod error;
pub mod machine;
pub mod material;
pub mod mesher;

pub use codegen::generate_sif_deck;
pub use elmer::{ElmerDeck, MeshEntities};
pub use error::{ExportError, ExportResult};
pub use machine::{Machine, MagnetizationKind, OperatingPoint, SimulationInput, Surface};

use std::fs;
use std::path::{Path, PathBuf};

/// Version tag written into generated file headers
pub fn generator_tag() -> String {
    format!("elmer-export v{}", env!("CARGO_PKG_VERSION"))
}

/// Main entry point: parse a serialized simulation input and generate the
/// Elmer project (mesh conversion plus deck files)
pub fn translate(json: &str, config: &DeckConfig, project: &Path) -> ExportResult<DeckPaths> {
    let input: SimulationInput = serde_json::from_str(json)?;
    generate_project(&input, config, project)
}

/// Run the external mesh converter, then generate the deck files.
/// Nothing is written when the converter fails.
pub fn generate_project(
    input: &SimulationInput,
    config: &DeckConfig,
    project: &Path,
) -> ExportResult<DeckPaths> {
    generate_project_with(mesher::ELMERGRID_BIN, input, config, project)
}

/// Same as [`generate_project`] with an explicit converter binary
pub fn generate_project_with(
    converter: &str,
    input: &SimulationInput,
    config: &DeckConfig,
    project: &Path,
) -> ExportResult<DeckPaths> {
    mesher::convert_mesh_with(converter, project)?;
    generate_decks(input, config, project)
}

/// Generate the deck files against an already converted Elmer mesh
pub fn generate_decks(
    input: &SimulationInput,
    config: &DeckConfig,
    project: &Path,
) -> ExportResult<DeckPaths> {
    let entities = MeshEntities::parse(&project.join(elmer::MESH_NAMES_FILE))?;
    let rendered = render_decks(
        &input.machine,
        &input.operating_point,
        config,
        &entities,
        project,
    )?;
    rendered.write(project)
}

/// Render all three deck files in memory. Files only hit the disk in
/// [`RenderedDecks::write`], after every render succeeded.
pub fn render_decks(
    machine: &Machine,
    op: &OperatingPoint,
    config: &DeckConfig,
    entities: &MeshEntities,
    project: &Path,
) -> ExportResult<RenderedDecks> {
    let deck = ElmerDeck::from_machine(machine, op, config, entities, project)?;
    let rotor_name = machine.rotor.mat_type.name.as_deref().unwrap_or("unnamed");
    let stator_name = machine.stator.mat_type.name.as_deref().unwrap_or("unnamed");
    Ok(RenderedDecks {
        sif: codegen::generate_sif_deck(&deck, entities, config)?,
        rotor_pmf: material::render_bh_property_file(
            rotor_name,
            "Rotor",
            &machine.rotor.bh_curve,
            &deck.generator,
        ),
        stator_pmf: material::render_bh_property_file(
            stator_name,
            "Stator",
            &machine.stator.bh_curve,
            &deck.generator,
        ),
    })
}

/// The three deck texts, ready to write
#[derive(Debug, Clone)]
pub struct RenderedDecks {
    pub sif: String,
    pub rotor_pmf: String,
    pub stator_pmf: String,
}

impl RenderedDecks {
    pub fn write(&self, project: &Path) -> ExportResult<DeckPaths> {
        let paths = DeckPaths {
            sif: project.join(elmer::SIF_FILE),
            rotor_pmf: project.join(elmer::ROTOR_MATERIAL_FILE),
            stator_pmf: project.join(elmer::STATOR_MATERIAL_FILE),
        };
        fs::write(&paths.rotor_pmf, &self.rotor_pmf)?;
        fs::write(&paths.stator_pmf, &self.stator_pmf)?;
        fs::write(&paths.sif, &self.sif)?;
        Ok(paths)
    }
}

/// Paths of the written deck files
#[derive(Debug, Clone)]
pub struct DeckPaths {
    pub sif: PathBuf,
    pub rotor_pmf: PathBuf,
    pub stator_pmf: PathBuf,
}

/// Periodicity of the modeled machine sector, selecting between plain and
/// anti-periodic mortar projectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Periodicity {
    Even,
    Odd,
}

/// Configuration for deck generation
#[derive(Debug, Clone)]
pub struct DeckConfig {
    /// Magnet temperature [degC]
    pub magnet_temperature: f64,
    /// Winding temperature [degC]
    pub winding_temperature: f64,
    /// Remanence temperature coefficient [%/degC]
    pub br_temperature_coeff: f64,
    /// Resistivity temperature coefficient [1/degC]
    pub rho_temperature_coeff: f64,
    /// Rotor step per timestep [deg]
    pub step_degrees: f64,
    /// Steps skipped before the first output
    pub skipped_steps: u32,
    /// Number of timesteps
    pub n_steps: u32,
    pub conductors_per_coil: u32,
    pub parallel_paths: u32,
    /// Coil A axis [deg]
    pub coil_axis_deg: f64,
    /// Coil side conductor area [m2]
    pub conductor_area_m2: f64,
    /// Initial rotor angular shift [deg]
    pub rotor_shift_deg: f64,
    /// Initial stator angular shift [deg]
    pub stator_shift_deg: f64,
    pub coordinate_scaling: f64,
    pub periodicity: Periodicity,
    /// Emit body force, body, solver and boundary condition blocks in
    /// addition to the material blocks
    pub full_deck: bool,
    pub solver: SolverSettings,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            magnet_temperature: 20.0,
            winding_temperature: 20.0,
            br_temperature_coeff: 0.01,
            rho_temperature_coeff: 0.01,
            step_degrees: 1.0,
            skipped_steps: 1,
            n_steps: 2,
            conductors_per_coil: 1,
            parallel_paths: 1,
            coil_axis_deg: 0.0,
            conductor_area_m2: 1.0,
            rotor_shift_deg: 0.0,
            stator_shift_deg: 0.0,
            coordinate_scaling: 1.0,
            periodicity: Periodicity::Even,
            full_deck: false,
            solver: SolverSettings::default(),
        }
    }
}

/// Numerical settings for the full-deck solver blocks. Logical-valued
/// keywords are kept as literal deck text ("Logical True" etc.)
#[derive(Debug, Clone)]
pub struct SolverSettings {
    pub nonlinear_tolerance: f64,
    pub nonlinear_max_iterations: u32,
    pub nonlinear_min_iterations: u32,
    pub newton_after_iterations: u32,
    pub nonlinear_relaxation: f64,
    pub converge_without_constraints: String,
    pub export_lagrange_multiplier: String,
    pub linear_abort_not_converged: String,
    pub linear_solver: String,
    pub linear_direct_method: String,
    pub optimize_bandwidth: String,
    pub linear_preconditioning: String,
    pub linear_max_iterations: u32,
    pub linear_residual_output: u32,
    pub linear_tolerance: f64,
    pub mortar_bcs_additive: String,
    pub output_file: String,
    pub line_file: String,
    pub scalars_file: String,
    /// Per-body equation/material assignments for the Body blocks
    pub bodies: Vec<BodyAssignment>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            nonlinear_tolerance: 1e-6,
            nonlinear_max_iterations: 20,
            nonlinear_min_iterations: 1,
            newton_after_iterations: 10,
            nonlinear_relaxation: 1.0,
            converge_without_constraints: "Logical True".to_string(),
            export_lagrange_multiplier: "Logical False".to_string(),
            linear_abort_not_converged: "Logical False".to_string(),
            linear_solver: "Iterative".to_string(),
            linear_direct_method: "umfpack".to_string(),
            optimize_bandwidth: "True".to_string(),
            linear_preconditioning: "ILU2".to_string(),
            linear_max_iterations: 5000,
            linear_residual_output: 20,
            linear_tolerance: 1e-7,
            mortar_bcs_additive: "Logical True".to_string(),
            output_file: "results".to_string(),
            line_file: "lines.dat".to_string(),
            scalars_file: "scalars.dat".to_string(),
            bodies: Vec::new(),
        }
    }
}

/// Assignment of solver resources to one named mesh body; zero means
/// "no body force" / "no torque group"
#[derive(Debug, Clone)]
pub struct BodyAssignment {
    pub name: String,
    pub equation: u32,
    pub material: u32,
    pub body_force: u32,
    pub torque_group: u32,
}
