use crate::cli::AnalyzeArgs;
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use mdscope::core::models::{Molecule, MoleculeDynamic, TrajectoryBuffer};
use mdscope::loader::{Loader, LoaderConfig};
use mdscope::stats::persist::StatsDocument;
use mdscope::stats::{ProgressReporter, PropertyId, StatsEngine};
use std::path::Path;
use tracing::{info, warn};

pub fn run(args: AnalyzeArgs) -> Result<()> {
    let config = AnalysisConfig::load(&args.config)?;

    let mut loader_config = LoaderConfig::default();
    if let Some(mib) = config.cache_budget_mib {
        loader_config.cache_budget_bytes = mib * 1024 * 1024;
    }
    let loader = Loader::new(loader_config);

    let mol_id = loader.open_molecule(&args.structure)?;
    let molecule = loader.molecule(mol_id)?;
    let traj_id = loader.open_trajectory(&args.trajectory, molecule.clone(), config.deperiodize)?;
    let num_frames = loader.num_frames(traj_id)?;
    let cache_frames = loader.num_cache_frames(traj_id)?;
    info!(
        atoms = molecule.atom_count(),
        frames = num_frames,
        cache_frames,
        "Opened dynamic"
    );

    if let Some(resnames) = &config.recenter_resnames {
        let mask = recenter_mask(&molecule, resnames);
        if mask.is_empty() {
            warn!("Recenter residue names matched no atoms; skipping recentering");
        } else {
            loader.set_recenter_target(traj_id, Some(&mask))?;
        }
    }

    let buffer = loader.materialize(traj_id)?;
    let dynamic = MoleculeDynamic::new(&molecule, &buffer);

    let mut engine = StatsEngine::new();
    StatsDocument {
        groups: config.groups.clone(),
        properties: config.properties.clone(),
    }
    .apply(&mut engine);

    let progress = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress.get_callback());
    engine.compute_stats_with_progress(&dynamic, &reporter)?;
    progress.finish();

    std::fs::create_dir_all(&args.output)?;
    let mut exported = 0usize;
    for id in engine.property_ids().collect::<Vec<_>>() {
        if engine.property_data_count(id) == 0 {
            warn!(
                property = engine.property_name(id).unwrap_or("?"),
                "No data was computed; skipping export"
            );
            continue;
        }
        let name = engine.property_name(id).unwrap_or("property").to_string();
        let path = args.output.join(format!("{name}.csv"));
        write_series_csv(&path, &engine, id, &buffer)?;
        exported += 1;
    }

    println!(
        "Exported {} of {} properties to {}",
        exported,
        engine.property_count(),
        args.output.display()
    );

    loader.close(traj_id)?;
    loader.close_molecule(mol_id)?;
    Ok(())
}

/// Atom indices of every residue whose name appears in `resnames`.
fn recenter_mask(molecule: &Molecule, resnames: &[String]) -> Vec<u32> {
    molecule
        .residues()
        .iter()
        .filter(|res| resnames.iter().any(|name| name == &res.name))
        .flat_map(|res| res.atoms.iter().map(|i| i as u32))
        .collect()
}

/// One CSV per property: frame index, frame time, one column per instance
/// series, and the averaged series.
fn write_series_csv(
    path: &Path,
    engine: &StatsEngine,
    id: PropertyId,
    buffer: &TrajectoryBuffer,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    let instance_count = engine.property_data_count(id);
    let mut header = vec!["frame".to_string(), "time".to_string()];
    header.extend((0..instance_count).map(|i| format!("instance_{i}")));
    header.push("avg".to_string());
    writer.write_record(&header)?;

    let avg = engine.property_avg_data(id).unwrap_or(&[]);
    for (frame_idx, frame) in buffer.frames().iter().enumerate() {
        let mut record = vec![frame_idx.to_string(), frame.header.time.to_string()];
        for instance in 0..instance_count {
            let value = engine
                .property_data(id, instance)
                .and_then(|series| series.get(frame_idx))
                .copied()
                .unwrap_or(f32::NAN);
            record.push(value.to_string());
        }
        record.push(
            avg.get(frame_idx)
                .copied()
                .unwrap_or(f32::NAN)
                .to_string(),
        );
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}
