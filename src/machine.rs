//! Machine description types matching the serialized input format
//!
//! Geometry construction happens upstream: the input carries a pre-built
//! surface list (one symmetry sector) with labels and reference points,
//! alongside the lamination, winding and material data the deck needs.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Top-level input: machine plus electrical operating point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationInput {
    pub machine: Machine,
    pub operating_point: OperatingPoint,
}

/// Electrical operating point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatingPoint {
    /// Mechanical speed [rpm]
    pub speed_rpm: f64,
    /// Stator current magnitude [A]
    #[serde(default)]
    pub stator_current: f64,
    /// Rotor current magnitude [A] (zero for PM rotors)
    #[serde(default)]
    pub rotor_current: f64,
}

/// A rotating machine: two laminations plus the built geometry surfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    #[serde(default)]
    pub name: Option<String>,
    pub stator: Lamination,
    pub rotor: Lamination,
    /// Pre-built geometry surfaces for one symmetry sector
    #[serde(default)]
    pub surfaces: Vec<Surface>,
}

/// Stator or rotor lamination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lamination {
    pub mat_type: MaterialRef,
    /// B(H) curve rows as (H, B) pairs [A/m, T]
    #[serde(default)]
    pub bh_curve: Vec<[f64; 2]>,
    #[serde(default)]
    pub winding: Option<Winding>,
    #[serde(default)]
    pub slot: Option<SlotRef>,
    #[serde(default)]
    pub holes: Vec<Hole>,
    /// Bore radius [m]
    #[serde(default)]
    pub rint: Option<f64>,
    /// Outer radius [m]
    #[serde(default)]
    pub rext: Option<f64>,
}

/// Winding summary: the deck only needs the pole-pair count and the
/// conductor material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Winding {
    pub pole_pairs: u32,
    #[serde(default)]
    pub conductor: Option<MaterialRef>,
}

/// Slot summary (slot count drives the Halbach magnetization expression)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SlotRef {
    pub zs: u32,
}

/// A rotor hole holding permanent magnets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hole {
    #[serde(default)]
    pub magnets: Vec<Magnet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Magnet {
    pub mat_type: MaterialRef,
}

/// Material reference with the properties the deck consumes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialRef {
    pub name: Option<String>,
    /// Linear relative permeability
    pub mur_lin: Option<f64>,
    /// Coercivity [A/m]
    pub hc: Option<f64>,
    /// Remanence at 20 degC [T]
    pub brm20: Option<f64>,
    /// Remanence temperature coefficient [%/degC]
    pub alpha_br: Option<f64>,
    /// Electrical resistivity at 20 degC [Ohm m]
    pub rho: Option<f64>,
}

/// A named geometry surface from the built machine sector
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Surface {
    pub label: String,
    /// Reference point inside the surface [m]
    #[serde(default)]
    pub point_ref: [f64; 2],
}

/// Geometric model for the permanent-magnet field direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagnetizationKind {
    Radial,
    Parallel,
    Halbach,
    Perpendicular,
}

impl MagnetizationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MagnetizationKind::Radial => "radial",
            MagnetizationKind::Parallel => "parallel",
            MagnetizationKind::Halbach => "halbach",
            MagnetizationKind::Perpendicular => "perpendicular",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    North,
    South,
}

/// Magnetization angle as written into the deck preamble: either a fixed
/// angle in degrees or a MATC expression in the rotor angle `theta`
#[derive(Debug, Clone, PartialEq)]
pub enum MagnetizationAngle {
    Degrees(f64),
    Expression(String),
}

impl std::fmt::Display for MagnetizationAngle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MagnetizationAngle::Degrees(deg) => write!(f, "{:.2}", deg),
            MagnetizationAngle::Expression(expr) => f.write_str(expr),
        }
    }
}

impl Surface {
    /// Check if this surface is a permanent magnet
    pub fn is_magnet(&self) -> bool {
        self.label.contains("MAGNET")
    }

    /// Classify the magnetization model from the surface label.
    /// Returns None for non-magnet surfaces and unrecognized magnet labels.
    pub fn magnetization_kind(&self) -> Option<(MagnetizationKind, Polarity)> {
        if !self.is_magnet() {
            return None;
        }
        let polarity = if self.label.contains("_N_") {
            Polarity::North
        } else {
            Polarity::South
        };
        let kind = if self.label.contains("RAD") {
            MagnetizationKind::Radial
        } else if self.label.contains("PAR") {
            MagnetizationKind::Parallel
        } else if self.label.contains("HALL") {
            MagnetizationKind::Halbach
        } else if self.label.contains("PERP") {
            MagnetizationKind::Perpendicular
        } else {
            return None;
        };
        Some((kind, polarity))
    }

    pub fn ref_point(&self) -> Vector2<f64> {
        Vector2::from(self.point_ref)
    }
}

/// Compute the magnetization angle for one magnet surface.
///
/// Radial magnets track the local radial direction (`theta`), parallel and
/// perpendicular magnets are fixed along the reference-point direction, and
/// Halbach arrays sweep with the slot count. South poles are flipped 180 deg.
pub fn magnetization_angle(
    kind: MagnetizationKind,
    polarity: Polarity,
    point_ref: Vector2<f64>,
    rotor_slot_count: u32,
) -> MagnetizationAngle {
    match kind {
        MagnetizationKind::Radial => MagnetizationAngle::Expression(match polarity {
            Polarity::North => "theta".to_string(),
            Polarity::South => "theta + 180".to_string(),
        }),
        MagnetizationKind::Parallel | MagnetizationKind::Perpendicular => {
            let mut deg = point_ref.y.atan2(point_ref.x).to_degrees();
            if polarity == Polarity::South {
                deg += 180.0;
            }
            MagnetizationAngle::Degrees(deg)
        }
        MagnetizationKind::Halbach => MagnetizationAngle::Expression(format!(
            "{} * theta + 90",
            -(rotor_slot_count as f64 / 2.0 - 1.0)
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(label: &str, point_ref: [f64; 2]) -> Surface {
        Surface {
            label: label.to_string(),
            point_ref,
        }
    }

    #[test]
    fn test_label_classification() {
        let north_radial = surface("ROTOR_MAGNET_RAD_N_R0_T0_S0", [0.0, 0.0]);
        assert_eq!(
            north_radial.magnetization_kind(),
            Some((MagnetizationKind::Radial, Polarity::North))
        );

        let south_parallel = surface("ROTOR_MAGNET_PAR_R0_T1_S0", [0.0, 0.0]);
        assert_eq!(
            south_parallel.magnetization_kind(),
            Some((MagnetizationKind::Parallel, Polarity::South))
        );

        let halbach = surface("ROTOR_MAGNET_HALL_R0_T0_S0", [0.0, 0.0]);
        assert_eq!(
            halbach.magnetization_kind(),
            Some((MagnetizationKind::Halbach, Polarity::South))
        );

        let perpendicular = surface("ROTOR_MAGNET_PERP_N_R0_T0_S0", [0.0, 0.0]);
        assert_eq!(
            perpendicular.magnetization_kind(),
            Some((MagnetizationKind::Perpendicular, Polarity::North))
        );

        // Magnet with an unknown model is skipped, not defaulted
        let unknown = surface("ROTOR_MAGNET_XYZ_R0_T0_S0", [0.0, 0.0]);
        assert_eq!(unknown.magnetization_kind(), None);

        let lamination = surface("ROTOR_LAM", [0.0, 0.0]);
        assert!(!lamination.is_magnet());
        assert_eq!(lamination.magnetization_kind(), None);
    }

    #[test]
    fn test_radial_angles_are_symbolic() {
        let north = magnetization_angle(
            MagnetizationKind::Radial,
            Polarity::North,
            Vector2::new(1.0, 0.0),
            0,
        );
        assert_eq!(north, MagnetizationAngle::Expression("theta".to_string()));

        let south = magnetization_angle(
            MagnetizationKind::Radial,
            Polarity::South,
            Vector2::new(1.0, 0.0),
            0,
        );
        assert_eq!(
            south,
            MagnetizationAngle::Expression("theta + 180".to_string())
        );
    }

    #[test]
    fn test_parallel_angle_from_reference_point() {
        // Reference point at 45 deg
        let north = magnetization_angle(
            MagnetizationKind::Parallel,
            Polarity::North,
            Vector2::new(1.0, 1.0),
            0,
        );
        match north {
            MagnetizationAngle::Degrees(deg) => assert!((deg - 45.0).abs() < 1e-10),
            _ => panic!("expected a fixed angle"),
        }

        let south = magnetization_angle(
            MagnetizationKind::Parallel,
            Polarity::South,
            Vector2::new(1.0, 1.0),
            0,
        );
        match south {
            MagnetizationAngle::Degrees(deg) => assert!((deg - 225.0).abs() < 1e-10),
            _ => panic!("expected a fixed angle"),
        }
    }

    #[test]
    fn test_halbach_angle_uses_slot_count() {
        let angle = magnetization_angle(
            MagnetizationKind::Halbach,
            Polarity::North,
            Vector2::new(0.0, 0.0),
            8,
        );
        assert_eq!(
            angle,
            MagnetizationAngle::Expression("-3 * theta + 90".to_string())
        );
    }

    #[test]
    fn test_parse_machine_json() {
        let json = r#"{
            "machine": {
                "name": "test_ipmsm",
                "stator": {
                    "mat_type": {"name": "M400-50A"},
                    "bh_curve": [[0.0, 0.0], [100.0, 0.5], [1000.0, 1.4]],
                    "winding": {
                        "pole_pairs": 4,
                        "conductor": {"name": "Copper", "rho": 1.68e-8}
                    },
                    "rint": 0.08
                },
                "rotor": {
                    "mat_type": {"name": "M400-50A"},
                    "bh_curve": [[0.0, 0.0], [1000.0, 1.4]],
                    "slot": {"zs": 8},
                    "holes": [{"magnets": [{"mat_type": {
                        "name": "N40", "mur_lin": 1.05, "hc": 900000.0,
                        "brm20": 1.26, "rho": 1.6e-6
                    }}]}],
                    "rext": 0.079
                },
                "surfaces": [
                    {"label": "ROTOR_MAGNET_PAR_N_R0_T0_S0", "point_ref": [0.05, 0.01]}
                ]
            },
            "operating_point": {"speed_rpm": 3000.0}
        }"#;

        let input: SimulationInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.machine.stator.winding.as_ref().unwrap().pole_pairs, 4);
        assert_eq!(input.machine.rotor.slot.unwrap().zs, 8);
        assert_eq!(input.machine.surfaces.len(), 1);
        assert!(input.machine.surfaces[0].is_magnet());
        assert_eq!(input.operating_point.speed_rpm, 3000.0);
        assert_eq!(input.operating_point.stator_current, 0.0);
    }
}
