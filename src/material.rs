//! Material property modeling and Elmer property-file emission

use std::fmt::Write as _;

/// Remanent flux density corrected for magnet temperature.
/// The coefficient is given in %/degC, hence the extra factor 0.01.
pub fn remanence_at(brm20: f64, alpha_br: f64, temperature: f64) -> f64 {
    brm20 * (1.0 + alpha_br * 0.01 * (temperature - 20.0))
}

/// Electrical conductivity at temperature, from the 20 degC resistivity
/// and a linear resistivity coefficient [1/degC]
pub fn conductivity_at(rho20: f64, alpha_rho: f64, temperature: f64) -> f64 {
    1.0 / (rho20 * (1.0 + alpha_rho * (temperature - 20.0)))
}

/// Render a `.pmf` material property file holding a lamination B-H curve.
///
/// Elmer wants the table as (B, H) rows while the machine description
/// stores (H, B) pairs, so the columns are swapped on output.
pub fn render_bh_property_file(
    material_name: &str,
    role: &str,
    bh_curve: &[[f64; 2]],
    generator: &str,
) -> String {
    let mut out = String::with_capacity(256 + bh_curve.len() * 32);
    writeln!(out, "! File Generated by {}", generator).unwrap();
    writeln!(out, "! Material Name: {}", material_name).unwrap();
    writeln!(out, "! B-H Curve {} Material", role).unwrap();
    out.push_str("Electric Conductivity = 0\n");
    out.push_str("H-B Curve = Variable coupled iter\n");
    out.push_str(" Real\t\tCubic Monotone\n");
    for row in bh_curve {
        writeln!(out, "   {}\t\t{}", row[1], row[0]).unwrap();
    }
    out.push_str("End\n");
    out
}
