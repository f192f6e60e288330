//! Loading a predefined event configuration, and writing one back out.
//!
//! Records are resolved and validated in full before the first one is
//! applied, so a bad file leaves the model exactly as it was.

use std::path::Path;

use tracing::info;

use crate::error::ModelError;
use crate::event::BranchEvent;
use crate::event_data::{EventDataError, EventRecord, format_record, parse_event_data};
use crate::model::Model;
use crate::rate::RateModel;
use crate::tree::NodeId;

/// A record resolved against the tree, ready to apply.
struct Placement<P> {
    node: NodeId,
    map_time: f64,
    params: P,
}

impl<M: RateModel> Model<M> {
    /// Load the event-data file named in the model's settings.
    ///
    /// Returns the number of records read.
    ///
    /// # Errors
    ///
    /// - [`ModelError::InvalidSettings`] if no file is configured.
    /// - [`ModelError::EventDataUnreadable`] if the file cannot be read.
    /// - Any error from [`Model::initialize_from_event_data`].
    pub fn initialize_model_from_event_data_file(&mut self) -> Result<usize, ModelError> {
        let Some(path) = self.event_data_infile.clone() else {
            return Err(ModelError::InvalidSettings(
                "event_data_infile is not set".to_string(),
            ));
        };
        self.initialize_from_path(&path)
    }

    /// # Errors
    ///
    /// See [`Model::initialize_model_from_event_data_file`].
    pub fn initialize_from_path(&mut self, path: &Path) -> Result<usize, ModelError> {
        info!("Initializing model from <<{}>>", path.display());
        let input = std::fs::read_to_string(path).map_err(|source| {
            ModelError::EventDataUnreadable {
                path: path.to_path_buf(),
                source,
            }
        })?;
        self.initialize_from_event_data(&input)
    }

    /// Apply event-data records to the tree. Root records replace the root
    /// event's parameters; every other record becomes a new event.
    ///
    /// # Errors
    ///
    /// - [`ModelError::ProposalPending`] if a proposal is outstanding.
    /// - [`ModelError::EventData`] for malformed records or parameters.
    /// - [`ModelError::Tree`] for species names not in the tree.
    /// - [`ModelError::EventTimeOffBranch`] if a time is outside its branch.
    pub fn initialize_from_event_data(&mut self, input: &str) -> Result<usize, ModelError> {
        self.require_clean()?;

        let records = parse_event_data(input)?;
        info!("Read a total of {} events", records.len());

        let mut root_params = None;
        let mut placements = Vec::with_capacity(records.len());
        for record in &records {
            let node = self.resolve_node(record)?;
            let params = self.read_record_parameters(record)?;
            if node == self.tree.root() {
                root_params = Some(params);
                continue;
            }
            let map_time = self.tree.map_time_for(node, record.event_time);
            if !self.tree.node(node).covers(map_time) {
                return Err(ModelError::EventTimeOffBranch {
                    node,
                    event_time: record.event_time,
                });
            }
            placements.push(Placement {
                node,
                map_time,
                params,
            });
        }

        if let Some(params) = root_params {
            self.root_event.set_params(params);
        }
        let added = placements.len();
        for Placement {
            node,
            map_time,
            params,
        } in placements
        {
            let id = self.registry.allocate_id();
            self.insert_event(BranchEvent::new(id, &self.tree, node, map_time, params));
        }
        self.set_mean_branch_parameters();

        info!("Added {added} pre-defined events to tree, plus root event");
        Ok(records.len())
    }

    /// Render the current configuration in event-data format: the root event
    /// first, then every other event in registry order.
    #[must_use]
    pub fn write_event_data(&self) -> String {
        let mut out = String::new();
        let root = self.tree.root();
        let (species1, species2) = self.species_pair(root);
        out.push_str(&format_record(
            &species1,
            species2.as_deref(),
            0.0,
            &self.rate_model.write_parameters(self.root_event.params()),
        ));

        for event in self.registry.iter() {
            let (species1, species2) = self.species_pair(event.event_node());
            out.push_str(&format_record(
                &species1,
                species2.as_deref(),
                event.absolute_time(),
                &self.rate_model.write_parameters(event.params()),
            ));
        }
        out
    }

    fn resolve_node(&self, record: &EventRecord) -> Result<NodeId, ModelError> {
        let node = match &record.species2 {
            Some(species2) => self.tree.node_mrca(&record.species1, species2)?,
            None => self.tree.node_by_name(&record.species1)?,
        };
        Ok(node)
    }

    fn read_record_parameters(&self, record: &EventRecord) -> Result<M::Params, ModelError> {
        let fields: Vec<&str> = record.params.iter().map(String::as_str).collect();
        self.rate_model
            .read_parameters(&fields)
            .map_err(|source| {
                EventDataError::Parameters {
                    line: record.line,
                    source,
                }
                .into()
            })
    }

    /// Species names that resolve back to `node`.
    fn species_pair(&self, node: NodeId) -> (String, Option<String>) {
        let n = self.tree.node(node);
        match (n.lf_desc(), n.rt_desc()) {
            (Some(lf), Some(rt)) => (self.tip_name(lf), Some(self.tip_name(rt))),
            _ => (n.name().unwrap_or_default().to_string(), None),
        }
    }

    fn tip_name(&self, node: NodeId) -> String {
        let tip = self.tree.leftmost_tip(node);
        self.tree
            .node(tip)
            .name()
            .unwrap_or_default()
            .to_string()
    }
}
