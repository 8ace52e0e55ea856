//! Deck text generation for Elmer simulations

use minijinja::{context, Environment};
use tracing::warn;

use crate::elmer::{ElmerDeck, MeshEntities, NamedEntity};
use crate::error::ExportResult;
use crate::{DeckConfig, Periodicity, SolverSettings};

const SIF_TEMPLATE: &str = r##"! File Generated by {{ generator }}
! {{ timestamp }}
{% if remanence %}
! Magnet remanence at {{ "%.1f"|format(magnet_temperature) }} C = {{ "%.3f"|format(remanence) }} T
{% endif %}
$ WM = 2*pi*{{ speed }}/60        ! Mechanical Frequency [rad/s]
$ PP = {{ pp }}                ! Pole pairs
$ WE = PP*WM              ! Electrical Frequency [Hz]
$ H_PM = {{ "%.2f"|format(h_pm) }}              ! Magnetization [A/m]
$ Shift = 2*pi/3          ! Three-phase machine [rad]
$ Gamma = {{ "%.2f"|format(gamma) }}*pi/180      ! Current Angle [rad]
$ Ncond = {{ ncond }}             ! Conductors per coil
$ Cp = {{ cp }}                ! Parallel paths
$ Is = {{ "%.1f"|format(stator_current) }}                ! Stator current [A]
$ Aaxis = {{ "%.1f"|format(aaxis) }}             ! Axis Coil A [deg]
$ Carea = {{ "%.1f"|format(carea) }}             ! Coil Side Conductor Area [m2]
{% for mag in magnets %}
$ Mangle{{ mag.ordinal }} = {{ mag.angle }}      ! Magnetization Angle [deg]
{% endfor %}
$ Nsteps = {{ nsteps }}            !
$ StepDegrees = {{ step_degrees }}       !
$ DegreesPerSec = WM*180.0/pi  !
$ RotorInitPos = Aaxis - 360 / (4*PP) + {{ "%.2f"|format(rotor_init_pos) }}!

Header
	CHECK KEYWORDS Warn
	Mesh DB "{{ mesh_dir }}"
	Include Path "."
	Results Directory "{{ mesh_dir }}"
End

Constants
	Permittivity of Vacuum = 8.8542e-12
End

Simulation
	Max Output Level = 4
	Coordinate System = Cartesian 2D
	Coordinate Scaling = {{ "%.1f"|format(coordinate_scaling) }}
	Simulation Type = Transient
	Timestepping Method = BDF
	BDF Order = 2
	Timestep Sizes = $ (StepDegrees / DegreesPerSec)  ! sampling time
	Timestep Intervals = $ Nsteps              ! steps
	Output Intervals = 1
	Use Mesh Names = Logical True
End

!--- MATERIALS ---
Material 1
	Name = "Air"
	Relative Permeability = 1
	Electric Conductivity = 0
End

Material 2
	Name = "Insulation"
	Relative Permeability = 1
	Electric Conductivity = 0
End

Material 3
	Name = "StatorMaterial"
	Include "{{ stator_material_file }}"
End

Material 4
	Name = "RotorMaterial"
	Include "{{ rotor_material_file }}"
End

Material 5
	Name = "Copper"
	Relative Permeability = 1
	Electric Conductivity = {{ "%.2f"|format(winding_conductivity) }}
End
{% for mag in magnets %}

Material {{ mag.index }}
	Name = "PM_{{ mag.ordinal }}"
	Relative Permeability = {{ mag.permeability }}
{% if mag.model == "parallel" or mag.model == "perpendicular" %}
	Magnetization 1 = Variable time, timestep size
		Real MATC  "H_PM*cos(WM*(tx(0)-tx(1)) + {{ mag.pole_offset }}*pi/PP + {{ mag.pole_offset }}*pi + Aaxis*pi/180 + (Mangle{{ mag.ordinal }}*pi/180))"
	Magnetization 2 = Variable time, timestep size
		Real MATC "H_PM*sin(WM*(tx(0)-tx(1)) + {{ mag.pole_offset }}*pi/PP + {{ mag.pole_offset }}*pi + Aaxis*pi/180 + (Mangle{{ mag.ordinal }}*pi/180))"
{% elif mag.model == "radial" %}
	Magnetization 1 = Variable Coordinate
		Real MATC  "H_PM*cos(atan2(tx(1),tx(0)) + {{ mag.pole_flip }}*pi)"
	Magnetization 2 = Variable Coordinate
		Real MATC "H_PM*sin(atan2(tx(1),tx(0)) + {{ mag.pole_flip }}*pi)"
{% endif %}
	Electric Conductivity = {{ "%.2f"|format(mag.conductivity) }}
End
{% endfor %}
{% if full_deck %}

!--- BODY FORCES ---
Body Force 1
	Name = "BodyForce_Rotation"
	$omega = (180/pi)*WM
	Mesh Rotate 3 = Variable time, timestep size
		Real MATC "omega*(tx(0)-tx(1)) + RotorInitPos"
End
{% for bf in body_forces %}

Body Force {{ bf.index }}
	Name = "{{ bf.name }}"
	Current Density = Variable time, timestep size
		Real MATC "{{ bf.expr }}"
End
{% endfor %}

!--- BODIES ---
{% for body in bodies %}
Body {{ body.id }}
	Name = {{ body.name }}
	Equation = {{ body.equation }}
	Material = {{ body.material }}
{% if body.body_force %}
	Body Force = {{ body.body_force }}
{% endif %}
{% if body.torque_group %}
	Torque Groups = Integer {{ body.torque_group }}
{% endif %}
{% if body.r_inner %}
	R Inner = Real {{ body.r_inner }}
	R Outer = Real {{ body.r_outer }}
{% endif %}
End
{% endfor %}

Equation 1
	Name = "Model_Domain"
	Active Solvers(6) = 1 2 3 4 5 6
End

!--- SOLVERS ---
Solver 1
	Exec Solver = Before Timestep
	Equation = MeshDeform
	Procedure = "RigidMeshMapper" "RigidMeshMapper"
End

Solver 2
	Equation = MgDyn2D
	Procedure = "MagnetoDynamics2D" "MagnetoDynamics2D"
	Exec Solver = Always
	Variable = A
	Nonlinear System Convergence Tolerance = {{ "%.1e"|format(solver.nonlinear_tolerance) }}
	Nonlinear System Max Iterations = {{ solver.nonlinear_max_iterations }}
	Nonlinear System Min Iterations = {{ solver.nonlinear_min_iterations }}
	Nonlinear System Newton After Iterations = {{ solver.newton_after_iterations }}
	Nonlinear System Relaxation Factor = {{ solver.nonlinear_relaxation }}
	Nonlinear System Convergence Without Constraints = {{ solver.converge_without_constraints }}
	Export Lagrange Multiplier = {{ solver.export_lagrange_multiplier }}
	Linear System Abort Not Converged = {{ solver.linear_abort_not_converged }}
	Linear System Solver = {{ solver.linear_solver }}
	Linear System Direct Method = {{ solver.linear_direct_method }}
	Optimize Bandwidth = {{ solver.optimize_bandwidth }}
	Linear System Preconditioning =  {{ solver.linear_preconditioning }}
	Linear System Max Iterations =  {{ solver.linear_max_iterations }}
	Linear System Residual Output =  {{ solver.linear_residual_output }}
	Linear System Convergence Tolerance =  {{ "%.1e"|format(solver.linear_tolerance) }}
	Mortar BCs Additive =  {{ solver.mortar_bcs_additive }}
End

Solver 3
	Exec Solver = Always
	Equation = CalcFields
	Potential Variable = "A"
	Procedure = "MagnetoDynamics" "MagnetoDynamicsCalcFields"
	Calculate Nodal Forces = Logical True
	Calculate Magnetic Vector Potential = Logical True
	Calculate Winding Voltage = Logical True
	Calculate Current Density = Logical True
	Calculate Maxwell Stress = Logical True
	Calculate JxB = Logical True
	Calculate Magnetic Field Strength = Logical True
End

Solver 4
	Exec Solver = After Timestep
	Procedure = "ResultOutputSolve" "ResultOutputSolver"
	Output File Name = "{{ solver.output_file }}"
	Vtu Format = True
	Binary Output = True
	Single Precision = True
	Save Geometry Ids = True
	Show Variables = True
End

Solver 5
	Exec Solver = After Timestep
	Equation = SaveLine
	Filename = "{{ solver.line_file }}"
	Procedure = "SaveData" "SaveLine"
	Variable 1 = Magnetic Flux Density 1
	Variable 2 = Magnetic Flux Density 2
	Variable 3 = Magnetic Flux Density 3
	Variable 4 = Magnetic Flux Density e 1
	Variable 5 = Magnetic Flux Density e 2
	Variable 6 = Magnetic Flux Density e 3
End

Solver 6
	Exec Solver = After Timestep
	Filename = "{{ solver.scalars_file }}"
	Procedure = "SaveData" "SaveScalars"
	Show Norm Index = 1
End

!--- BOUNDARIES ---
{% for bc in boundaries %}
Boundary Condition {{ bc.id }}
	Name = {{ bc.name }}
{% if bc.kind == "potential" %}
	A = Real 0
{% elif bc.kind == "mortar_radial" %}
	Mortar BC = Integer {{ bc.slave_id }}
	Mortar BC Static = Logical True
{% if bc.anti %}
	Anti Radial Projector = Logical True
{% else %}
	Radial Projector = Logical True
{% endif %}
	Galerkin Projector = Logical True
{% elif bc.kind == "mortar_rotational" %}
	Mortar BC = Integer {{ bc.slave_id }}
{% if bc.anti %}
	Anti Rotational Projector = Logical True
{% else %}
	Rotational Projector = Logical True
{% endif %}
	Galerkin Projector = Logical True
{% elif bc.kind == "save_line" %}
	Save Line = True
{% endif %}
End
{% endfor %}
{% endif %}
"##;

/// MATC current-density expression for one winding phase.
/// Phases are shifted by multiples of the `Shift` symbol; the return
/// conductor of each coil side gets the negated expression.
fn phase_current_expression(shift_multiple: usize, negative: bool) -> String {
    let sign = if negative { "-" } else { "" };
    let shift = match shift_multiple {
        0 => String::new(),
        1 => " - Shift".to_string(),
        n => format!(" - {}*Shift", n),
    };
    format!("{sign}(Is/Carea) * (Ncond/Cp) * sin(WE * (tx(0)-tx(1)){shift} + Gamma)")
}

fn body_force_context() -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    for (i, phase) in ["A", "B", "C", "D", "E", "F"].iter().enumerate() {
        for (suffix, negative) in [("PLUS", false), ("MINUS", true)] {
            out.push(serde_json::json!({
                "index": 2 + i * 2 + negative as usize,
                "name": format!("J_{}_{}", phase, suffix),
                "expr": phase_current_expression(i, negative),
            }));
        }
    }
    out
}

fn body_context(
    deck: &ElmerDeck,
    entities: &MeshEntities,
    settings: &SolverSettings,
) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    for assignment in &settings.bodies {
        let Some(entity) = entities.body(&assignment.name) else {
            warn!(body = %assignment.name, "body assignment has no mesh body, skipping");
            continue;
        };
        let mut value = serde_json::json!({
            "id": entity.id,
            "name": assignment.name,
            "equation": assignment.equation,
            "material": assignment.material,
            "body_force": assignment.body_force,
            "torque_group": assignment.torque_group,
        });
        // The sliding band needs the airgap annulus radii
        if assignment.name == "RotorSB" {
            if let Some((r_inner, r_outer)) = deck.rotor_band {
                value["r_inner"] = serde_json::json!(r_inner);
                value["r_outer"] = serde_json::json!(r_outer);
            }
        }
        out.push(value);
    }
    out
}

fn boundary_context(entities: &MeshEntities, periodicity: Periodicity) -> Vec<serde_json::Value> {
    let anti = periodicity == Periodicity::Odd;
    let mortar = |b: &NamedEntity, slave: &str, kind: &str| -> serde_json::Value {
        match entities.boundary(slave) {
            Some(s) => serde_json::json!({
                "id": b.id,
                "name": b.name,
                "kind": kind,
                "slave_id": s.id,
                "anti": anti,
            }),
            None => {
                warn!(boundary = %b.name, slave, "mortar slave boundary missing, emitting plain block");
                serde_json::json!({"id": b.id, "name": b.name, "kind": "plain"})
            }
        }
    };
    entities
        .boundaries
        .iter()
        .map(|b| match b.name.as_str() {
            "VP0_BOUNDARY" => {
                serde_json::json!({"id": b.id, "name": b.name, "kind": "potential"})
            }
            "MASTER_STATOR_BOUNDARY" => mortar(b, "SLAVE_STATOR_BOUNDARY", "mortar_radial"),
            "MASTER_ROTOR_BOUNDARY" => mortar(b, "SLAVE_ROTOR_BOUNDARY", "mortar_radial"),
            "SB_STATOR_BOUNDARY" => mortar(b, "SB_ROTOR_BOUNDARY", "mortar_rotational"),
            "AIRGAP_ARC_BOUNDARY" => {
                serde_json::json!({"id": b.id, "name": b.name, "kind": "save_line"})
            }
            _ => serde_json::json!({"id": b.id, "name": b.name, "kind": "plain"}),
        })
        .collect()
}

/// Render the `.sif` simulation deck from a deck model
pub fn generate_sif_deck(
    deck: &ElmerDeck,
    entities: &MeshEntities,
    config: &DeckConfig,
) -> ExportResult<String> {
    let mut env = Environment::new();
    env.add_template("sif", SIF_TEMPLATE)?;
    let template = env.get_template("sif")?;

    let magnets: Vec<_> = deck
        .magnets
        .iter()
        .map(|m| {
            serde_json::json!({
                "index": m.index,
                "ordinal": m.ordinal,
                "model": m.kind.as_str(),
                "angle": m.angle.to_string(),
                "permeability": m.permeability,
                "conductivity": m.conductivity,
                "pole_offset": m.pole_offset,
                "pole_flip": m.pole_flip,
            })
        })
        .collect();

    let (body_forces, bodies, boundaries) = if config.full_deck {
        (
            body_force_context(),
            body_context(deck, entities, &config.solver),
            boundary_context(entities, config.periodicity),
        )
    } else {
        (Vec::new(), Vec::new(), Vec::new())
    };

    let solver = serde_json::json!({
        "nonlinear_tolerance": config.solver.nonlinear_tolerance,
        "nonlinear_max_iterations": config.solver.nonlinear_max_iterations,
        "nonlinear_min_iterations": config.solver.nonlinear_min_iterations,
        "newton_after_iterations": config.solver.newton_after_iterations,
        "nonlinear_relaxation": config.solver.nonlinear_relaxation,
        "converge_without_constraints": config.solver.converge_without_constraints,
        "export_lagrange_multiplier": config.solver.export_lagrange_multiplier,
        "linear_abort_not_converged": config.solver.linear_abort_not_converged,
        "linear_solver": config.solver.linear_solver,
        "linear_direct_method": config.solver.linear_direct_method,
        "optimize_bandwidth": config.solver.optimize_bandwidth,
        "linear_preconditioning": config.solver.linear_preconditioning,
        "linear_max_iterations": config.solver.linear_max_iterations,
        "linear_residual_output": config.solver.linear_residual_output,
        "linear_tolerance": config.solver.linear_tolerance,
        "mortar_bcs_additive": config.solver.mortar_bcs_additive,
        "output_file": config.solver.output_file,
        "line_file": config.solver.line_file,
        "scalars_file": config.solver.scalars_file,
    });

    let output = template.render(context! {
        generator => deck.generator,
        timestamp => chrono::Utc::now().to_rfc3339(),
        remanence => deck.remanence,
        magnet_temperature => config.magnet_temperature,
        speed => deck.speed_rpm,
        pp => deck.pole_pairs,
        h_pm => deck.coercivity,
        gamma => deck.current_angle_deg,
        ncond => deck.conductors_per_coil,
        cp => deck.parallel_paths,
        stator_current => deck.stator_current,
        aaxis => deck.coil_axis_deg,
        carea => deck.conductor_area_m2,
        magnets => magnets,
        nsteps => deck.n_steps,
        step_degrees => deck.step_degrees,
        rotor_init_pos => deck.rotor_init_pos_deg,
        mesh_dir => deck.mesh_dir,
        coordinate_scaling => deck.coordinate_scaling,
        stator_material_file => deck.stator_material_file,
        rotor_material_file => deck.rotor_material_file,
        winding_conductivity => deck.winding_conductivity,
        full_deck => config.full_deck,
        body_forces => body_forces,
        bodies => bodies,
        boundaries => boundaries,
        solver => solver,
    })?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elmer::MagnetMaterial;
    use crate::machine::{MagnetizationAngle, MagnetizationKind};
    use crate::BodyAssignment;

    fn test_deck(magnets: Vec<MagnetMaterial>) -> ElmerDeck {
        ElmerDeck {
            generator: "elmer-export test".to_string(),
            mesh_dir: "proj".to_string(),
            speed_rpm: 3000.0,
            pole_pairs: 4,
            coercivity: 900_000.0,
            remanence: Some(1.26),
            current_angle_deg: -4.0,
            conductors_per_coil: 1,
            parallel_paths: 1,
            stator_current: 0.0,
            coil_axis_deg: 0.0,
            conductor_area_m2: 1.0,
            n_steps: 2,
            step_degrees: 1.0,
            rotor_init_pos_deg: -1.0,
            coordinate_scaling: 1.0,
            stator_material_file: "proj/stator_material.pmf".to_string(),
            rotor_material_file: "proj/rotor_material.pmf".to_string(),
            winding_conductivity: 5.95e7,
            magnets,
            rotor_band: Some((0.079, 0.08)),
        }
    }

    fn magnet(index: u32, kind: MagnetizationKind, angle: MagnetizationAngle) -> MagnetMaterial {
        MagnetMaterial {
            index,
            ordinal: index - 5,
            body: format!("ROTOR_MAGNET_{}", index),
            kind,
            angle,
            permeability: 1.05,
            conductivity: 714285.71,
            pole_offset: 0,
            pole_flip: index - 6,
        }
    }

    #[test]
    fn test_minimal_deck_renders() {
        let deck = test_deck(vec![magnet(
            6,
            MagnetizationKind::Parallel,
            MagnetizationAngle::Degrees(11.31),
        )]);
        let entities = MeshEntities::default();
        let sif = generate_sif_deck(&deck, &entities, &DeckConfig::default()).unwrap();

        assert!(sif.contains("$ PP = 4"));
        assert!(sif.contains("$ H_PM = 900000.00"));
        assert!(sif.contains("$ Mangle1 = 11.31"));
        assert!(sif.contains("Coordinate System = Cartesian 2D"));
        assert!(sif.contains("Material 5"));
        assert!(sif.contains("Material 6"));
        assert!(sif.contains("Name = \"PM_1\""));
        assert!(sif.contains("Magnetization 1 = Variable time, timestep size"));
        assert!(sif.contains("Mangle1*pi/180"));
        assert!(sif.contains("Include \"proj/stator_material.pmf\""));
        // No solver/boundary sections without the full deck
        assert!(!sif.contains("Boundary Condition"));
        assert!(!sif.contains("Solver 2"));
    }

    #[test]
    fn test_radial_magnetization_tracks_coordinates() {
        let deck = test_deck(vec![
            magnet(
                6,
                MagnetizationKind::Radial,
                MagnetizationAngle::Expression("theta".to_string()),
            ),
            magnet(
                7,
                MagnetizationKind::Radial,
                MagnetizationAngle::Expression("theta + 180".to_string()),
            ),
        ]);
        let entities = MeshEntities::default();
        let sif = generate_sif_deck(&deck, &entities, &DeckConfig::default()).unwrap();

        assert!(sif.contains("$ Mangle1 = theta "));
        assert!(sif.contains("$ Mangle2 = theta + 180"));
        assert!(sif.contains("Magnetization 1 = Variable Coordinate"));
        assert!(sif.contains("H_PM*cos(atan2(tx(1),tx(0)) + 0*pi)"));
        assert!(sif.contains("H_PM*sin(atan2(tx(1),tx(0)) + 1*pi)"));
    }

    #[test]
    fn test_halbach_magnet_has_no_magnetization_keys() {
        let deck = test_deck(vec![magnet(
            6,
            MagnetizationKind::Halbach,
            MagnetizationAngle::Expression("-3 * theta + 90".to_string()),
        )]);
        let entities = MeshEntities::default();
        let sif = generate_sif_deck(&deck, &entities, &DeckConfig::default()).unwrap();

        assert!(sif.contains("$ Mangle1 = -3 * theta + 90"));
        assert!(sif.contains("Name = \"PM_1\""));
        assert!(!sif.contains("Magnetization 1"));
    }

    #[test]
    fn test_phase_current_expressions() {
        assert_eq!(
            phase_current_expression(0, false),
            "(Is/Carea) * (Ncond/Cp) * sin(WE * (tx(0)-tx(1)) + Gamma)"
        );
        assert_eq!(
            phase_current_expression(1, true),
            "-(Is/Carea) * (Ncond/Cp) * sin(WE * (tx(0)-tx(1)) - Shift + Gamma)"
        );
        assert_eq!(
            phase_current_expression(2, false),
            "(Is/Carea) * (Ncond/Cp) * sin(WE * (tx(0)-tx(1)) - 2*Shift + Gamma)"
        );
    }

    #[test]
    fn test_full_deck_sections() {
        let deck = test_deck(vec![]);
        let entities = MeshEntities {
            boundaries: vec![
                NamedEntity {
                    name: "VP0_BOUNDARY".to_string(),
                    id: 1,
                },
                NamedEntity {
                    name: "MASTER_STATOR_BOUNDARY".to_string(),
                    id: 2,
                },
                NamedEntity {
                    name: "SLAVE_STATOR_BOUNDARY".to_string(),
                    id: 3,
                },
                NamedEntity {
                    name: "SB_STATOR_BOUNDARY".to_string(),
                    id: 4,
                },
                NamedEntity {
                    name: "SB_ROTOR_BOUNDARY".to_string(),
                    id: 5,
                },
                NamedEntity {
                    name: "AIRGAP_ARC_BOUNDARY".to_string(),
                    id: 6,
                },
            ],
            bodies: vec![
                NamedEntity {
                    name: "ROTOR_LAM".to_string(),
                    id: 1,
                },
                NamedEntity {
                    name: "RotorSB".to_string(),
                    id: 2,
                },
            ],
        };
        let mut config = DeckConfig::default();
        config.full_deck = true;
        config.periodicity = Periodicity::Odd;
        config.solver.bodies = vec![
            BodyAssignment {
                name: "ROTOR_LAM".to_string(),
                equation: 1,
                material: 4,
                body_force: 1,
                torque_group: 0,
            },
            BodyAssignment {
                name: "RotorSB".to_string(),
                equation: 1,
                material: 1,
                body_force: 0,
                torque_group: 1,
            },
        ];

        let sif = generate_sif_deck(&deck, &entities, &config).unwrap();

        assert!(sif.contains("Body Force 1"));
        assert!(sif.contains("Name = \"J_C_MINUS\""));
        assert!(sif.contains("- 2*Shift + Gamma"));
        assert!(sif.contains("Body 1"));
        assert!(sif.contains("Body Force = 1"));
        assert!(sif.contains("Torque Groups = Integer 1"));
        assert!(sif.contains("R Inner = Real 0.079"));
        assert!(sif.contains("R Outer = Real 0.08"));
        assert!(sif.contains("Equation 1"));
        assert!(sif.contains("Procedure = \"MagnetoDynamics2D\" \"MagnetoDynamics2D\""));
        assert!(sif.contains("Boundary Condition 1"));
        assert!(sif.contains("A = Real 0"));
        // Odd periodicity flips the projectors
        assert!(sif.contains("Mortar BC = Integer 3"));
        assert!(sif.contains("Anti Radial Projector = Logical True"));
        assert!(sif.contains("Mortar BC = Integer 5"));
        assert!(sif.contains("Anti Rotational Projector = Logical True"));
        assert!(sif.contains("Save Line = True"));
        // The slave side still gets a plain block
        assert!(sif.contains("Name = SLAVE_STATOR_BOUNDARY"));
    }
}
