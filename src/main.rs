//! machine-to-elmer: CLI tool for generating Elmer simulation decks

use anyhow::{Context, Result};
use clap::Parser;
use elmer_export::{
    elmer, mesher, render_decks, DeckConfig, MeshEntities, OperatingPoint, Periodicity,
    SimulationInput,
};
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "machine-to-elmer")]
#[command(about = "Translate electric machine descriptions to Elmer FEA simulation decks")]
#[command(version)]
struct Args {
    /// Input JSON file (machine description plus operating point)
    #[arg(short, long)]
    input: PathBuf,

    /// Project path: expects <project>.msh next to it, decks are written
    /// into the <project> directory
    #[arg(short, long)]
    project: PathBuf,

    /// Override the mechanical speed [rpm]
    #[arg(long)]
    speed: Option<f64>,

    /// Override the stator current magnitude [A]
    #[arg(long)]
    stator_current: Option<f64>,

    /// Override the rotor current magnitude [A]
    #[arg(long)]
    rotor_current: Option<f64>,

    /// Magnet temperature [degC]
    #[arg(long, default_value = "20")]
    magnet_temp: f64,

    /// Winding temperature [degC]
    #[arg(long, default_value = "20")]
    winding_temp: f64,

    /// Rotor step per timestep [deg]
    #[arg(long, default_value = "1")]
    step_degrees: f64,

    /// Number of timesteps
    #[arg(long, default_value = "2")]
    steps: u32,

    /// Initial rotor angular shift [deg]
    #[arg(long, default_value = "0")]
    rotor_shift: f64,

    /// Initial stator angular shift [deg]
    #[arg(long, default_value = "0")]
    stator_shift: f64,

    /// Sector periodicity (even, odd)
    #[arg(long, default_value = "even")]
    periodicity: String,

    /// Emit body force, body, solver and boundary condition blocks
    #[arg(long)]
    full_deck: bool,

    /// Skip the ElmerGrid call and use an existing Elmer mesh directory
    #[arg(long)]
    skip_meshing: bool,

    /// Print the generated .sif deck to stdout instead of writing files
    #[arg(long)]
    stdout: bool,
}

fn apply_overrides(op: &mut OperatingPoint, args: &Args) {
    if let Some(rpm) = args.speed {
        op.speed_rpm = rpm;
    }
    if let Some(is) = args.stator_current {
        op.stator_current = is;
    }
    if let Some(ir) = args.rotor_current {
        op.rotor_current = ir;
    }
}

fn parse_periodicity(s: &str) -> Result<Periodicity> {
    match s.to_lowercase().as_str() {
        "even" => Ok(Periodicity::Even),
        "odd" => Ok(Periodicity::Odd),
        _ => anyhow::bail!("Unknown periodicity: {}. Use: even or odd", s),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    // Read input
    let json = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read input file: {:?}", args.input))?;
    let mut input: SimulationInput =
        serde_json::from_str(&json).context("Failed to parse machine description")?;
    apply_overrides(&mut input.operating_point, &args);

    // Build config
    let config = DeckConfig {
        magnet_temperature: args.magnet_temp,
        winding_temperature: args.winding_temp,
        step_degrees: args.step_degrees,
        n_steps: args.steps,
        rotor_shift_deg: args.rotor_shift,
        stator_shift_deg: args.stator_shift,
        periodicity: parse_periodicity(&args.periodicity)?,
        full_deck: args.full_deck,
        ..Default::default()
    };

    // Convert the mesh, then render
    if !args.skip_meshing {
        mesher::convert_mesh(&args.project).context("Mesh conversion failed")?;
    }
    let entities = MeshEntities::parse(&args.project.join(elmer::MESH_NAMES_FILE))
        .context("Failed to read mesh name mapping")?;
    let decks = render_decks(
        &input.machine,
        &input.operating_point,
        &config,
        &entities,
        &args.project,
    )
    .context("Deck generation failed")?;

    // Output
    if args.stdout {
        println!("{}", decks.sif);
    } else {
        let paths = decks
            .write(&args.project)
            .context("Failed to write deck files")?;
        eprintln!("Generated Elmer deck: {:?}", paths.sif);
        eprintln!("Material files: {:?}, {:?}", paths.stator_pmf, paths.rotor_pmf);
    }

    Ok(())
}
