//! Elmer deck model: mesh entity maps and material index assignment

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{ExportError, ExportResult};
use crate::machine::{
    magnetization_angle, Machine, MagnetizationAngle, MagnetizationKind, OperatingPoint,
};
use crate::{material, DeckConfig};

pub const MESH_NAMES_FILE: &str = "mesh.names";
pub const ROTOR_MATERIAL_FILE: &str = "rotor_material.pmf";
pub const STATOR_MATERIAL_FILE: &str = "stator_material.pmf";
pub const SIF_FILE: &str = "machine.sif";

/// First material index available for permanent magnets; 1-5 are the fixed
/// air / insulation / stator steel / rotor steel / copper slots
pub const PM_MATERIAL_OFFSET: u32 = 6;

/// A named mesh entity from the converter's name-mapping file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedEntity {
    pub name: String,
    pub id: u32,
}

/// Boundaries and bodies parsed from `mesh.names`, in file order
#[derive(Debug, Clone, Default)]
pub struct MeshEntities {
    pub boundaries: Vec<NamedEntity>,
    pub bodies: Vec<NamedEntity>,
}

impl MeshEntities {
    /// Parse the name-mapping file written by ElmerGrid. Lines carrying
    /// `$ NAME = ID` map a named geometric entity to its integer id; names
    /// containing `BOUNDARY` are boundaries, everything else is a body.
    pub fn parse(path: &Path) -> ExportResult<Self> {
        let text = fs::read_to_string(path)?;
        let mut entities = Self::default();
        for (idx, line) in text.lines().enumerate() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.first() != Some(&"$") {
                continue;
            }
            let (name, id) = match (fields.get(1), fields.get(3)) {
                (Some(name), Some(id)) => (*name, *id),
                _ => {
                    return Err(ExportError::MeshNames {
                        path: path.to_path_buf(),
                        line: idx + 1,
                        reason: "expected `$ NAME = ID`".to_string(),
                    })
                }
            };
            let id: u32 = id.parse().map_err(|_| ExportError::MeshNames {
                path: path.to_path_buf(),
                line: idx + 1,
                reason: format!("entity id `{}` is not an integer", id),
            })?;
            let entity = NamedEntity {
                name: name.to_string(),
                id,
            };
            if name.contains("BOUNDARY") {
                entities.boundaries.push(entity);
            } else {
                entities.bodies.push(entity);
            }
        }
        Ok(entities)
    }

    pub fn body(&self, name: &str) -> Option<&NamedEntity> {
        self.bodies.iter().find(|b| b.name == name)
    }

    pub fn boundary(&self, name: &str) -> Option<&NamedEntity> {
        self.boundaries.iter().find(|b| b.name == name)
    }
}

/// One permanent-magnet material block of the deck
#[derive(Debug, Clone)]
pub struct MagnetMaterial {
    /// Material index in the deck (starts at [`PM_MATERIAL_OFFSET`])
    pub index: u32,
    /// 1-based magnet number, used for the `MangleN` symbol
    pub ordinal: u32,
    /// Mesh body label this material is assigned to
    pub body: String,
    pub kind: MagnetizationKind,
    pub angle: MagnetizationAngle,
    pub permeability: f64,
    pub conductivity: f64,
    /// Pole offset `(m-1) / magnets_per_pole` entering the time-variable
    /// magnetization phase
    pub pole_offset: u32,
    /// Per-magnet polarity flip `(m-1)` entering the radial magnetization
    pub pole_flip: u32,
}

/// Everything the deck template needs, derived from the machine description,
/// the operating point and the mesh entity maps
#[derive(Debug, Clone)]
pub struct ElmerDeck {
    pub generator: String,
    /// Mesh DB / results directory written into the Header block
    pub mesh_dir: String,
    pub speed_rpm: f64,
    pub pole_pairs: u32,
    /// Magnet coercivity H_PM [A/m]
    pub coercivity: f64,
    /// Temperature-corrected remanence [T], when the magnet material has one
    pub remanence: Option<f64>,
    /// Current angle Gamma [deg]
    pub current_angle_deg: f64,
    pub conductors_per_coil: u32,
    pub parallel_paths: u32,
    pub stator_current: f64,
    /// Coil A axis [deg]
    pub coil_axis_deg: f64,
    /// Coil side conductor area [m2]
    pub conductor_area_m2: f64,
    pub n_steps: u32,
    pub step_degrees: f64,
    pub rotor_init_pos_deg: f64,
    pub coordinate_scaling: f64,
    pub stator_material_file: String,
    pub rotor_material_file: String,
    pub winding_conductivity: f64,
    pub magnets: Vec<MagnetMaterial>,
    /// Sliding-band annulus (rotor outer radius, stator inner radius) [m]
    pub rotor_band: Option<(f64, f64)>,
}

impl ElmerDeck {
    /// Build the deck model. Magnet bodies get material indices assigned
    /// sequentially in surface order, starting at [`PM_MATERIAL_OFFSET`];
    /// unrecognized magnetization labels and magnet surfaces without a
    /// matching mesh body do not consume an index.
    pub fn from_machine(
        machine: &Machine,
        op: &OperatingPoint,
        config: &DeckConfig,
        entities: &MeshEntities,
        project: &Path,
    ) -> ExportResult<Self> {
        let winding = machine
            .stator
            .winding
            .as_ref()
            .ok_or(ExportError::MissingData("stator winding"))?;
        let conductor = winding
            .conductor
            .as_ref()
            .ok_or(ExportError::MissingData("winding conductor"))?;
        let rho20 = conductor
            .rho
            .ok_or(ExportError::MissingData("winding conductor resistivity"))?;
        let winding_conductivity = material::conductivity_at(
            rho20,
            config.rho_temperature_coeff,
            config.winding_temperature,
        );

        let rotor_slots = machine.rotor.slot.as_ref().map(|s| s.zs);
        let mut selected = Vec::new();
        for surf in &machine.surfaces {
            if !surf.is_magnet() {
                continue;
            }
            let Some((kind, polarity)) = surf.magnetization_kind() else {
                warn!(label = %surf.label, "unrecognized magnetization label, skipping");
                continue;
            };
            let zs = if kind == MagnetizationKind::Halbach {
                rotor_slots.ok_or(ExportError::MissingData("rotor slot count"))?
            } else {
                rotor_slots.unwrap_or(0)
            };
            if entities.body(&surf.label).is_none() {
                debug!(label = %surf.label, "magnet surface has no mesh body, skipping");
                continue;
            }
            let angle = magnetization_angle(kind, polarity, surf.ref_point(), zs);
            selected.push((surf.label.clone(), kind, angle));
        }

        let (coercivity, remanence, magnets) = if selected.is_empty() {
            (0.0, None, Vec::new())
        } else {
            let magnet0 = machine
                .rotor
                .holes
                .first()
                .and_then(|h| h.magnets.first())
                .ok_or(ExportError::MissingData("rotor hole magnets"))?;
            let coercivity = magnet0
                .mat_type
                .hc
                .ok_or(ExportError::MissingData("magnet coercivity"))?;
            let rho_m = magnet0
                .mat_type
                .rho
                .ok_or(ExportError::MissingData("magnet resistivity"))?;
            let permeability = magnet0.mat_type.mur_lin.unwrap_or(1.0);
            let conductivity = material::conductivity_at(
                rho_m,
                config.rho_temperature_coeff,
                config.magnet_temperature,
            );
            let alpha_br = magnet0
                .mat_type
                .alpha_br
                .unwrap_or(config.br_temperature_coeff);
            let remanence = magnet0
                .mat_type
                .brm20
                .map(|b| material::remanence_at(b, alpha_br, config.magnet_temperature));

            // One symmetry sector is drawn, so every enumerated magnet
            // belongs to the same pole
            let magnets_per_pole = selected.len() as u32;
            let magnets = selected
                .into_iter()
                .enumerate()
                .map(|(i, (body, kind, angle))| {
                    let m = i as u32 + 1;
                    MagnetMaterial {
                        index: PM_MATERIAL_OFFSET + i as u32,
                        ordinal: m,
                        body,
                        kind,
                        angle,
                        permeability,
                        conductivity,
                        pole_offset: (m - 1) / magnets_per_pole,
                        pole_flip: m - 1,
                    }
                })
                .collect();
            (coercivity, remanence, magnets)
        };

        let step = config.step_degrees * config.skipped_steps as f64;
        let current_angle_deg = -(winding.pole_pairs as f64 * step);
        let rotor_init_pos_deg = (config.rotor_shift_deg - config.stator_shift_deg) - step;

        Ok(Self {
            generator: crate::generator_tag(),
            mesh_dir: project.display().to_string(),
            speed_rpm: op.speed_rpm,
            pole_pairs: winding.pole_pairs,
            coercivity,
            remanence,
            current_angle_deg,
            conductors_per_coil: config.conductors_per_coil,
            parallel_paths: config.parallel_paths,
            stator_current: op.stator_current,
            coil_axis_deg: config.coil_axis_deg,
            conductor_area_m2: config.conductor_area_m2,
            n_steps: config.n_steps,
            step_degrees: config.step_degrees,
            rotor_init_pos_deg,
            coordinate_scaling: config.coordinate_scaling,
            stator_material_file: project.join(STATOR_MATERIAL_FILE).display().to_string(),
            rotor_material_file: project.join(ROTOR_MATERIAL_FILE).display().to_string(),
            winding_conductivity,
            magnets,
            rotor_band: machine.rotor.rext.zip(machine.stator.rint),
        })
    }
}
