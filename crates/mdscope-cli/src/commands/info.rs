use crate::cli::InfoArgs;
use crate::error::Result;
use mdscope::loader::Loader;
use tracing::info;

pub fn run(args: InfoArgs) -> Result<()> {
    let loader = Loader::default();

    let mol_id = loader.open_molecule(&args.structure)?;
    let molecule = loader.molecule(mol_id)?;
    info!(path = %args.structure.display(), "Opened structure");

    println!("Structure: {}", args.structure.display());
    println!("  atoms:      {}", molecule.atom_count());
    println!("  residues:   {}", molecule.residues().len());
    println!("  structures: {}", molecule.structures().len());

    if let Some(trajectory) = &args.trajectory {
        let traj_id = loader.open_trajectory(trajectory, molecule.clone(), false)?;
        println!("Trajectory: {}", trajectory.display());
        println!("  frames:       {}", loader.num_frames(traj_id)?);
        println!("  cache frames: {}", loader.num_cache_frames(traj_id)?);
        loader.close(traj_id)?;
    }

    let extensions: Vec<&str> = loader.formats().supported_extensions().collect();
    println!("Supported extensions: {}", extensions.join(", "));

    loader.close_molecule(mol_id)?;
    Ok(())
}
