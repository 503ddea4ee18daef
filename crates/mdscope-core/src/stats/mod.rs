//! # Statistics Engine
//!
//! Registry of named property and group commands, plus the user-defined
//! groups and properties evaluated against a loaded dynamic.
//!
//! A *group* is a rule that resolves into zero or more atom-range instances
//! within a molecule (`resname ALA` matches every alanine residue). A
//! *property* is a scalar time series computed per group instance across all
//! trajectory frames, bound to its group by the first argument token
//! (`dist g1 0 1`). Evaluation is lazy and memoized: [`StatsEngine::compute_stats`]
//! resolves unresolved groups and computes data only for properties that
//! have none, so repeated calls are idempotent until a group or property is
//! explicitly cleared.
//!
//! Malformed definitions never poison the engine: they are logged, the
//! entity stays in its defined-but-empty state, and consumers treat "no
//! data yet" as a valid, displayable condition.

pub mod commands;
pub mod error;
pub mod histogram;
pub mod persist;
pub mod progress;

pub use commands::{
    GroupExtractFn, GroupKind, PropertyCommand, PropertyComputeFn, PropertyDescriptor,
    PropertyKind,
};
pub use error::StatsError;
pub use histogram::{Histogram, compute_histogram, compute_histogram_with_range};
pub use progress::{Progress, ProgressCallback, ProgressReporter};

use crate::core::models::{AtomRange, MoleculeDynamic};
use slotmap::{SlotMap, new_key_type};
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

new_key_type! {
    pub struct GroupId;
    pub struct PropertyId;
}

/// Default filter range for newly created properties.
const DEFAULT_FILTER: (f32, f32) = (0.0, 1.0);

struct Group {
    name: String,
    command: String,
    args: String,
    /// Empty while the group is defined but unresolved.
    instances: Vec<AtomRange>,
}

struct Property {
    name: String,
    command: String,
    args: String,
    filter: (f32, f32),
    /// One series per group instance; empty while the property is defined
    /// but uncomputed.
    data: Vec<Vec<f32>>,
    /// Synthetic series averaged across instances.
    avg: Option<Vec<f32>>,
}

/// Parses `"<keyword> <args...>"` into the keyword and the joined argument
/// string.
fn split_command(command_and_args: &str) -> Result<(String, String), StatsError> {
    let mut tokens = command_and_args.split_whitespace();
    let keyword = tokens.next().ok_or(StatsError::MissingCommand)?;
    let args = tokens.collect::<Vec<_>>().join(" ");
    Ok((keyword.to_string(), args))
}

/// Owns groups, properties and their command registries.
///
/// Created with the built-in commands (`dist`/`bond`/`angle`/`dihedral`,
/// `resname`) registered; embedding applications extend both registries at
/// runtime.
pub struct StatsEngine {
    groups: SlotMap<GroupId, Group>,
    properties: SlotMap<PropertyId, Property>,
    property_commands: HashMap<String, PropertyCommand>,
    group_commands: HashMap<String, GroupKind>,
}

impl Default for StatsEngine {
    fn default() -> Self {
        let mut engine = Self {
            groups: SlotMap::with_key(),
            properties: SlotMap::with_key(),
            property_commands: HashMap::new(),
            group_commands: HashMap::new(),
        };
        for (keyword, command) in commands::builtin_property_commands() {
            engine
                .property_commands
                .insert(keyword.to_string(), command);
        }
        for (keyword, kind) in commands::builtin_group_commands() {
            engine.group_commands.insert(keyword.to_string(), kind);
        }
        engine
    }
}

impl StatsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- command registries -------------------------------------------

    /// Registers a property command; a keyword collision is rejected and
    /// leaves the registry unchanged.
    pub fn register_property_command(
        &mut self,
        keyword: &str,
        command: PropertyCommand,
    ) -> Result<(), StatsError> {
        if self.property_commands.contains_key(keyword) {
            warn!(keyword, "Property command already registered");
            return Err(StatsError::DuplicateRegistration {
                name: keyword.to_string(),
            });
        }
        self.property_commands.insert(keyword.to_string(), command);
        Ok(())
    }

    /// Registers a group command; a keyword collision is rejected and
    /// leaves the registry unchanged.
    pub fn register_group_command(
        &mut self,
        keyword: &str,
        kind: GroupKind,
    ) -> Result<(), StatsError> {
        if self.group_commands.contains_key(keyword) {
            warn!(keyword, "Group command already registered");
            return Err(StatsError::DuplicateRegistration {
                name: keyword.to_string(),
            });
        }
        self.group_commands.insert(keyword.to_string(), kind);
        Ok(())
    }

    pub fn property_command_keywords(&self) -> impl Iterator<Item = &str> {
        self.property_commands.keys().map(|k| k.as_str())
    }

    pub fn group_command_keywords(&self) -> impl Iterator<Item = &str> {
        self.group_commands.keys().map(|k| k.as_str())
    }

    // ---- groups -------------------------------------------------------

    /// Creates a group from a name and a `"<command> <args...>"` string.
    pub fn create_group(
        &mut self,
        name: &str,
        command_and_args: &str,
    ) -> Result<GroupId, StatsError> {
        if self.group(name).is_some() {
            return Err(StatsError::DuplicateRegistration {
                name: name.to_string(),
            });
        }
        let (command, args) = split_command(command_and_args)?;
        if !self.group_commands.contains_key(&command) {
            return Err(StatsError::UnknownCommand { keyword: command });
        }
        Ok(self.groups.insert(Group {
            name: name.to_string(),
            command,
            args,
            instances: Vec::new(),
        }))
    }

    pub fn remove_group(&mut self, id: GroupId) -> Result<(), StatsError> {
        self.groups
            .remove(id)
            .map(|_| ())
            .ok_or(StatsError::GroupNotFound)
    }

    /// Drops a group's instances, returning it to the defined state so the
    /// next [`Self::compute_stats`] re-resolves it.
    pub fn clear_group(&mut self, id: GroupId) -> Result<(), StatsError> {
        let group = self.groups.get_mut(id).ok_or(StatsError::GroupNotFound)?;
        group.instances.clear();
        Ok(())
    }

    pub fn clear_groups(&mut self) {
        self.groups.clear();
    }

    pub fn group(&self, name: &str) -> Option<GroupId> {
        self.groups
            .iter()
            .find(|(_, g)| g.name == name)
            .map(|(id, _)| id)
    }

    pub fn group_ids(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.groups.keys()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn group_name(&self, id: GroupId) -> Option<&str> {
        self.groups.get(id).map(|g| g.name.as_str())
    }

    /// The full `"<command> <args...>"` string the group was created with.
    pub fn group_command(&self, id: GroupId) -> Option<String> {
        self.groups
            .get(id)
            .map(|g| format!("{} {}", g.command, g.args).trim_end().to_string())
    }

    pub fn group_instance_count(&self, id: GroupId) -> usize {
        self.groups.get(id).map_or(0, |g| g.instances.len())
    }

    pub fn group_instances(&self, id: GroupId) -> Option<&[AtomRange]> {
        self.groups.get(id).map(|g| g.instances.as_slice())
    }

    // ---- properties ---------------------------------------------------

    /// Creates a property from a name and a `"<command> <group> <args...>"`
    /// string.
    pub fn create_property(
        &mut self,
        name: &str,
        command_and_args: &str,
    ) -> Result<PropertyId, StatsError> {
        if self.property(name).is_some() {
            return Err(StatsError::DuplicateRegistration {
                name: name.to_string(),
            });
        }
        let (command, args) = split_command(command_and_args)?;
        if !self.property_commands.contains_key(&command) {
            return Err(StatsError::UnknownCommand { keyword: command });
        }
        Ok(self.properties.insert(Property {
            name: name.to_string(),
            command,
            args,
            filter: DEFAULT_FILTER,
            data: Vec::new(),
            avg: None,
        }))
    }

    /// Removes a property together with all of its data series.
    pub fn remove_property(&mut self, id: PropertyId) -> Result<(), StatsError> {
        self.properties
            .remove(id)
            .map(|_| ())
            .ok_or(StatsError::PropertyNotFound)
    }

    /// Drops a property's computed data, returning it to the defined state.
    pub fn clear_property(&mut self, id: PropertyId) -> Result<(), StatsError> {
        let property = self
            .properties
            .get_mut(id)
            .ok_or(StatsError::PropertyNotFound)?;
        property.data.clear();
        property.avg = None;
        Ok(())
    }

    pub fn clear_properties(&mut self) {
        self.properties.clear();
    }

    pub fn property(&self, name: &str) -> Option<PropertyId> {
        self.properties
            .iter()
            .find(|(_, p)| p.name == name)
            .map(|(id, _)| id)
    }

    pub fn property_ids(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.properties.keys()
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn property_name(&self, id: PropertyId) -> Option<&str> {
        self.properties.get(id).map(|p| p.name.as_str())
    }

    /// The full `"<command> <args...>"` string the property was created
    /// with.
    pub fn property_command(&self, id: PropertyId) -> Option<String> {
        self.properties
            .get(id)
            .map(|p| format!("{} {}", p.command, p.args).trim_end().to_string())
    }

    fn property_descriptor(&self, id: PropertyId) -> Option<&PropertyDescriptor> {
        let property = self.properties.get(id)?;
        self.property_commands
            .get(&property.command)
            .map(|c| &c.descriptor)
    }

    pub fn property_unit(&self, id: PropertyId) -> Option<&str> {
        self.property_descriptor(id).map(|d| d.unit.as_str())
    }

    pub fn property_periodic(&self, id: PropertyId) -> Option<bool> {
        self.property_descriptor(id).map(|d| d.periodic)
    }

    pub fn property_value_range(&self, id: PropertyId) -> Option<(f32, f32)> {
        self.property_descriptor(id).map(|d| d.value_range)
    }

    pub fn property_filter(&self, id: PropertyId) -> Option<(f32, f32)> {
        self.properties.get(id).map(|p| p.filter)
    }

    pub fn set_property_filter(
        &mut self,
        id: PropertyId,
        filter: (f32, f32),
    ) -> Result<(), StatsError> {
        self.properties
            .get_mut(id)
            .map(|p| p.filter = filter)
            .ok_or(StatsError::PropertyNotFound)
    }

    // ---- property data ------------------------------------------------

    /// Number of per-instance series the property holds; zero while the
    /// property is uncomputed.
    pub fn property_data_count(&self, id: PropertyId) -> usize {
        self.properties.get(id).map_or(0, |p| p.data.len())
    }

    pub fn property_data(&self, id: PropertyId, instance: usize) -> Option<&[f32]> {
        self.properties
            .get(id)
            .and_then(|p| p.data.get(instance))
            .map(|d| d.as_slice())
    }

    pub fn property_avg_data(&self, id: PropertyId) -> Option<&[f32]> {
        self.properties
            .get(id)
            .and_then(|p| p.avg.as_deref())
    }

    pub fn property_histogram(
        &self,
        id: PropertyId,
        instance: usize,
        num_bins: usize,
    ) -> Option<Histogram> {
        self.property_data(id, instance)
            .map(|data| compute_histogram(num_bins, data))
    }

    pub fn property_avg_histogram(&self, id: PropertyId, num_bins: usize) -> Option<Histogram> {
        self.property_avg_data(id)
            .map(|data| compute_histogram(num_bins, data))
    }

    /// Drops all computed property data, keeping the definitions.
    pub fn clear_property_data(&mut self) {
        for (_, property) in self.properties.iter_mut() {
            property.data.clear();
            property.avg = None;
        }
    }

    // ---- evaluation ---------------------------------------------------

    /// Lazily evaluates all groups and properties against a dynamic.
    ///
    /// Groups without instances are resolved first; properties without data
    /// are then computed, one series per instance of their bound group plus
    /// an averaged series. Validation failures are logged and skipped,
    /// leaving the offending entity unchanged. A second call without
    /// intervening edits does no work.
    pub fn compute_stats(&mut self, dynamic: &MoleculeDynamic) -> Result<(), StatsError> {
        self.compute_stats_with_progress(dynamic, &ProgressReporter::new())
    }

    #[instrument(skip_all, name = "compute_stats")]
    pub fn compute_stats_with_progress(
        &mut self,
        dynamic: &MoleculeDynamic,
        reporter: &ProgressReporter<'_>,
    ) -> Result<(), StatsError> {
        self.resolve_groups(dynamic);
        self.compute_properties(dynamic, reporter);
        Ok(())
    }

    fn resolve_groups(&mut self, dynamic: &MoleculeDynamic) {
        for (_, group) in self.groups.iter_mut() {
            if !group.instances.is_empty() {
                continue;
            }
            let Some(command) = self.group_commands.get(&group.command) else {
                warn!(
                    group = %group.name,
                    command = %group.command,
                    "Group command disappeared"
                );
                continue;
            };
            let args: Vec<&str> = group.args.split_whitespace().collect();
            match command.extract(&args, dynamic.molecule) {
                Ok(instances) if instances.is_empty() => {
                    warn!(
                        group = %group.name,
                        "{}",
                        StatsError::NoMatchingInstances {
                            group: group.name.clone()
                        }
                    );
                }
                Ok(instances) => {
                    debug!(
                        group = %group.name,
                        instances = instances.len(),
                        "Resolved group"
                    );
                    group.instances = instances;
                }
                Err(err) => {
                    warn!(group = %group.name, error = %err, "Group resolution failed");
                }
            }
        }
    }

    fn compute_properties(&mut self, dynamic: &MoleculeDynamic, reporter: &ProgressReporter<'_>) {
        let num_frames = dynamic.num_frames();
        let pending: Vec<PropertyId> = self
            .properties
            .iter()
            .filter(|(_, p)| p.data.is_empty())
            .map(|(id, _)| id)
            .collect();

        reporter.report(Progress::ComputeStart {
            total_properties: pending.len() as u64,
        });

        for id in pending {
            let property = &self.properties[id];
            let name = property.name.clone();
            reporter.report(Progress::PropertyStart { name: name.clone() });

            if let Err(err) = self.compute_property(id, dynamic, num_frames) {
                warn!(property = %name, error = %err, "Property evaluation failed");
            }
            reporter.report(Progress::PropertyFinish);
        }

        reporter.report(Progress::ComputeFinish);
    }

    /// Computes one property's per-instance and averaged series. Any
    /// failure leaves the property untouched in its defined state.
    fn compute_property(
        &mut self,
        id: PropertyId,
        dynamic: &MoleculeDynamic,
        num_frames: usize,
    ) -> Result<(), StatsError> {
        let property = &self.properties[id];
        let command = self
            .property_commands
            .get(&property.command)
            .ok_or_else(|| StatsError::UnknownCommand {
                keyword: property.command.clone(),
            })?;

        let args: Vec<&str> = property.args.split_whitespace().collect();
        let (group_name, compute_args) = args.split_first().ok_or(StatsError::MissingArguments)?;

        let group_id = self
            .group(group_name)
            .ok_or_else(|| StatsError::UnknownGroup {
                name: group_name.to_string(),
            })?;
        let instances = self.groups[group_id].instances.clone();
        if instances.is_empty() {
            return Err(StatsError::NoMatchingInstances {
                group: group_name.to_string(),
            });
        }

        let compute_one = |range: &AtomRange| -> Result<Vec<f32>, StatsError> {
            let mut series = vec![0.0f32; num_frames];
            command.compute(&mut series, compute_args, dynamic, *range)?;
            Ok(series)
        };

        #[cfg(feature = "parallel")]
        let results: Result<Vec<Vec<f32>>, StatsError> =
            instances.par_iter().map(compute_one).collect();

        #[cfg(not(feature = "parallel"))]
        let results: Result<Vec<Vec<f32>>, StatsError> =
            instances.iter().map(compute_one).collect();

        let data = results?;

        // Post-reduction average across instances.
        let mut avg = vec![0.0f32; num_frames];
        let weight = 1.0 / data.len() as f32;
        for series in &data {
            for (acc, value) in avg.iter_mut().zip(series) {
                *acc += value * weight;
            }
        }

        let property = &mut self.properties[id];
        property.data = data;
        property.avg = Some(avg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Frame, FrameHeader, Molecule, Residue, TrajectoryBuffer};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Three alanine residues of 2 atoms each, plus one water. Atom `i`
    /// sits at `x = i * spacing` with spacing growing per frame.
    fn test_molecule() -> Molecule {
        Molecule::new(
            vec!["C".to_string(); 8],
            vec![
                Residue::new("ALA", AtomRange::new(0, 2)),
                Residue::new("ALA", AtomRange::new(2, 4)),
                Residue::new("ALA", AtomRange::new(4, 6)),
                Residue::new("HOH", AtomRange::new(6, 8)),
            ],
            vec![],
        )
    }

    fn test_trajectory(num_frames: usize) -> TrajectoryBuffer {
        let mut buffer = TrajectoryBuffer::default();
        for frame_idx in 0..num_frames {
            let header = FrameHeader {
                num_atoms: 8,
                time: frame_idx as f32,
                unit_cell: None,
            };
            let mut frame = Frame::zeroed(header);
            let spacing = 1.0 + frame_idx as f32;
            for atom in 0..8 {
                frame.x[atom] = atom as f32 * spacing;
            }
            buffer.push(frame);
        }
        buffer
    }

    mod definitions {
        use super::*;

        #[test]
        fn duplicate_group_name_is_rejected() {
            let mut engine = StatsEngine::new();
            engine.create_group("g1", "resname ALA").unwrap();
            assert!(matches!(
                engine.create_group("g1", "resname GLY"),
                Err(StatsError::DuplicateRegistration { .. })
            ));
            assert_eq!(engine.group_count(), 1);
        }

        #[test]
        fn unknown_group_command_is_rejected() {
            let mut engine = StatsEngine::new();
            assert!(matches!(
                engine.create_group("g1", "resid 42"),
                Err(StatsError::UnknownCommand { .. })
            ));
            assert_eq!(engine.group_count(), 0);
        }

        #[test]
        fn empty_command_string_is_rejected() {
            let mut engine = StatsEngine::new();
            assert!(matches!(
                engine.create_group("g1", "   "),
                Err(StatsError::MissingCommand)
            ));
            assert!(matches!(
                engine.create_property("p1", ""),
                Err(StatsError::MissingCommand)
            ));
        }

        #[test]
        fn duplicate_command_registration_is_rejected() {
            let mut engine = StatsEngine::new();
            let err = engine
                .register_group_command("resname", GroupKind::ResName)
                .unwrap_err();
            assert!(matches!(err, StatsError::DuplicateRegistration { .. }));

            let command = PropertyCommand {
                kind: PropertyKind::Distance,
                descriptor: PropertyDescriptor {
                    value_range: (0.0, 1.0),
                    unit: String::new(),
                    periodic: false,
                },
            };
            let err = engine
                .register_property_command("dist", command)
                .unwrap_err();
            assert!(matches!(err, StatsError::DuplicateRegistration { .. }));
        }

        #[test]
        fn command_strings_round_trip() {
            let mut engine = StatsEngine::new();
            let group = engine.create_group("g1", "resname ALA GLY").unwrap();
            let property = engine.create_property("p1", "dist g1 0 1").unwrap();

            assert_eq!(engine.group_command(group).unwrap(), "resname ALA GLY");
            assert_eq!(engine.property_command(property).unwrap(), "dist g1 0 1");
            assert_eq!(engine.group_name(group).unwrap(), "g1");
            assert_eq!(engine.property_name(property).unwrap(), "p1");
        }
    }

    mod evaluation {
        use super::*;

        #[test]
        fn groups_resolve_and_properties_compute() {
            let molecule = test_molecule();
            let trajectory = test_trajectory(5);
            let dynamic = MoleculeDynamic::new(&molecule, &trajectory);

            let mut engine = StatsEngine::new();
            let group = engine.create_group("g1", "resname ALA").unwrap();
            let property = engine.create_property("p1", "dist g1 0 1").unwrap();

            engine.compute_stats(&dynamic).unwrap();

            assert_eq!(engine.group_instance_count(group), 3);
            assert_eq!(engine.property_data_count(property), 3);

            // Every series has one value per frame.
            for instance in 0..3 {
                let data = engine.property_data(property, instance).unwrap();
                assert_eq!(data.len(), 5);
                // Adjacent atoms: distance equals the per-frame spacing.
                for (frame, &value) in data.iter().enumerate() {
                    let spacing = 1.0 + frame as f32;
                    assert!((value - spacing).abs() < 1e-4);
                }
            }

            // All instances have identical series, so the average matches.
            let avg = engine.property_avg_data(property).unwrap();
            assert_eq!(avg.len(), 5);
            assert!((avg[2] - 3.0).abs() < 1e-4);
        }

        #[test]
        fn compute_is_idempotent_until_cleared() {
            let molecule = test_molecule();
            let trajectory = test_trajectory(3);
            let dynamic = MoleculeDynamic::new(&molecule, &trajectory);

            let calls = Arc::new(AtomicUsize::new(0));
            let counter = calls.clone();

            let mut engine = StatsEngine::new();
            engine
                .register_property_command(
                    "counted",
                    PropertyCommand {
                        kind: PropertyKind::Custom(Box::new(move |data, _, _, _| {
                            counter.fetch_add(1, Ordering::SeqCst);
                            data.fill(1.0);
                            Ok(())
                        })),
                        descriptor: PropertyDescriptor {
                            value_range: (0.0, 1.0),
                            unit: String::new(),
                            periodic: false,
                        },
                    },
                )
                .unwrap();

            engine.create_group("g1", "resname HOH").unwrap();
            let property = engine.create_property("p1", "counted g1").unwrap();

            engine.compute_stats(&dynamic).unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), 1);

            // Second run performs no recomputation.
            engine.compute_stats(&dynamic).unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), 1);

            // Clearing invalidates the memoization.
            engine.clear_property(property).unwrap();
            engine.compute_stats(&dynamic).unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), 2);
        }

        #[test]
        fn property_bound_to_nonexistent_group_stays_defined() {
            let molecule = test_molecule();
            let trajectory = test_trajectory(3);
            let dynamic = MoleculeDynamic::new(&molecule, &trajectory);

            let mut engine = StatsEngine::new();
            let property = engine.create_property("p1", "dist nosuch 0 1").unwrap();

            engine.compute_stats(&dynamic).unwrap();

            assert_eq!(engine.property_data_count(property), 0);
            assert!(engine.property_avg_data(property).is_none());
            assert_eq!(engine.property_count(), 1, "the property stays listed");
        }

        #[test]
        fn arity_mismatch_writes_no_data() {
            let molecule = test_molecule();
            let trajectory = test_trajectory(3);
            let dynamic = MoleculeDynamic::new(&molecule, &trajectory);

            let mut engine = StatsEngine::new();
            engine.create_group("g1", "resname ALA").unwrap();
            let property = engine.create_property("p1", "dist g1 0").unwrap();

            engine.compute_stats(&dynamic).unwrap();
            assert_eq!(engine.property_data_count(property), 0);
        }

        #[test]
        fn group_with_no_matches_stays_defined_and_resolves_later() {
            let molecule = test_molecule();
            let trajectory = test_trajectory(2);
            let dynamic = MoleculeDynamic::new(&molecule, &trajectory);

            let mut engine = StatsEngine::new();
            let group = engine.create_group("g1", "resname TRP").unwrap();

            engine.compute_stats(&dynamic).unwrap();
            assert_eq!(engine.group_instance_count(group), 0);

            // A molecule that does contain tryptophan resolves the group.
            let with_trp = Molecule::new(
                vec!["C".to_string(); 4],
                vec![Residue::new("TRP", AtomRange::new(0, 4))],
                vec![],
            );
            let dynamic = MoleculeDynamic::new(&with_trp, &trajectory);
            engine.compute_stats(&dynamic).unwrap();
            assert_eq!(engine.group_instance_count(group), 1);
        }

        #[test]
        fn resolution_happens_once_until_cleared() {
            let molecule = test_molecule();
            let trajectory = test_trajectory(2);
            let dynamic = MoleculeDynamic::new(&molecule, &trajectory);

            let calls = Arc::new(AtomicUsize::new(0));
            let counter = calls.clone();

            let mut engine = StatsEngine::new();
            engine
                .register_group_command(
                    "tracked",
                    GroupKind::Custom(Box::new(move |_, _| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(vec![AtomRange::new(0, 2)])
                    })),
                )
                .unwrap();
            let group = engine.create_group("g1", "tracked").unwrap();

            engine.compute_stats(&dynamic).unwrap();
            engine.compute_stats(&dynamic).unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), 1);

            engine.clear_group(group).unwrap();
            engine.compute_stats(&dynamic).unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), 2);
        }
    }

    mod removal {
        use super::*;

        #[test]
        fn remove_property_drops_all_series() {
            let molecule = test_molecule();
            let trajectory = test_trajectory(4);
            let dynamic = MoleculeDynamic::new(&molecule, &trajectory);

            let mut engine = StatsEngine::new();
            engine.create_group("g1", "resname ALA").unwrap();
            let property = engine.create_property("p1", "dist g1 0 1").unwrap();
            engine.compute_stats(&dynamic).unwrap();
            assert_eq!(engine.property_data_count(property), 3);

            engine.remove_property(property).unwrap();
            assert_eq!(engine.property_count(), 0);
            assert_eq!(engine.property_data_count(property), 0);
            assert!(engine.property_data(property, 0).is_none());

            // Stale handles fail, they do not resurrect.
            assert!(matches!(
                engine.remove_property(property),
                Err(StatsError::PropertyNotFound)
            ));
        }

        #[test]
        fn remove_group_by_stale_handle_fails() {
            let mut engine = StatsEngine::new();
            let group = engine.create_group("g1", "resname ALA").unwrap();
            engine.remove_group(group).unwrap();
            assert!(matches!(
                engine.remove_group(group),
                Err(StatsError::GroupNotFound)
            ));
        }
    }

    mod metadata {
        use super::*;

        #[test]
        fn descriptor_metadata_is_exposed() {
            let mut engine = StatsEngine::new();
            let property = engine.create_property("p1", "dihedral g1 0 1 2 3").unwrap();

            assert_eq!(engine.property_unit(property).unwrap(), "rad");
            assert_eq!(engine.property_periodic(property), Some(true));
            let (lo, hi) = engine.property_value_range(property).unwrap();
            assert!(lo < 0.0 && hi > 0.0);
        }

        #[test]
        fn filter_round_trips() {
            let mut engine = StatsEngine::new();
            let property = engine.create_property("p1", "dist g1 0 1").unwrap();

            assert_eq!(engine.property_filter(property), Some(DEFAULT_FILTER));
            engine.set_property_filter(property, (0.2, 0.8)).unwrap();
            assert_eq!(engine.property_filter(property), Some((0.2, 0.8)));
        }

        #[test]
        fn histograms_come_from_computed_data() {
            let molecule = test_molecule();
            let trajectory = test_trajectory(4);
            let dynamic = MoleculeDynamic::new(&molecule, &trajectory);

            let mut engine = StatsEngine::new();
            engine.create_group("g1", "resname ALA").unwrap();
            let property = engine.create_property("p1", "dist g1 0 1").unwrap();

            assert!(engine.property_histogram(property, 0, 4).is_none());
            engine.compute_stats(&dynamic).unwrap();

            let hist = engine.property_histogram(property, 0, 4).unwrap();
            assert_eq!(hist.num_samples, 4);
            let avg_hist = engine.property_avg_histogram(property, 4).unwrap();
            assert_eq!(avg_hist.num_samples, 4);
        }
    }
}
