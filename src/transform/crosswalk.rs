//! Hand-maintained links between FERC Form 1 respondents and plants and
//! their EIA counterparts.
//!
//! Read from `<data_root>/mappings/utilities.csv`
//! (`respondent_id,utility_id_eia`) and `<data_root>/mappings/plants.csv`
//! (`respondent_id,plant_name,plant_id_eia`). Either file may be absent.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::transform::normalize::name_key;

/// Directory under the data root holding the mapping files.
pub const MAPPINGS_DIR: &str = "mappings";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrosswalkMatch {
    Unmapped,
    Mapped(i64),
    /// More than one target, or a target shared with another respondent.
    Ambiguous(Vec<i64>),
}

#[derive(Debug, Deserialize)]
struct UtilityLink {
    respondent_id: i64,
    utility_id_eia: i64,
}

#[derive(Debug, Deserialize)]
struct PlantLink {
    respondent_id: i64,
    plant_name: String,
    plant_id_eia: i64,
}

#[derive(Debug, Clone, Default)]
pub struct Crosswalk {
    utilities: BTreeMap<i64, BTreeSet<i64>>,
    plants: BTreeMap<(i64, String), BTreeSet<i64>>,
}

impl Crosswalk {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the mapping files under `mappings_dir`.
    pub fn load(mappings_dir: &Path) -> Result<Self> {
        let mut crosswalk = Self::default();

        let utilities = mappings_dir.join("utilities.csv");
        if utilities.exists() {
            let mut reader = csv::ReaderBuilder::new()
                .trim(csv::Trim::All)
                .from_reader(File::open(&utilities)?);
            for link in reader.deserialize::<UtilityLink>() {
                let link = link?;
                crosswalk.link_utility(link.respondent_id, link.utility_id_eia);
            }
        } else {
            debug!("No utility crosswalk at {}", utilities.display());
        }

        let plants = mappings_dir.join("plants.csv");
        if plants.exists() {
            let mut reader = csv::ReaderBuilder::new()
                .trim(csv::Trim::All)
                .from_reader(File::open(&plants)?);
            for link in reader.deserialize::<PlantLink>() {
                let link = link?;
                crosswalk.link_plant(link.respondent_id, &link.plant_name, link.plant_id_eia);
            }
        } else {
            debug!("No plant crosswalk at {}", plants.display());
        }

        info!(
            "Loaded crosswalk: {} respondents, {} plants",
            crosswalk.utilities.len(),
            crosswalk.plants.len()
        );
        Ok(crosswalk)
    }

    pub fn link_utility(&mut self, respondent_id: i64, utility_id_eia: i64) -> &mut Self {
        self.utilities.entry(respondent_id).or_default().insert(utility_id_eia);
        self
    }

    pub fn link_plant(&mut self, respondent_id: i64, plant_name: &str, plant_id_eia: i64) -> &mut Self {
        self.plants
            .entry((respondent_id, name_key(plant_name)))
            .or_default()
            .insert(plant_id_eia);
        self
    }

    /// The EIA utility a respondent is, if the mapping is unambiguous in
    /// both directions.
    pub fn utility(&self, respondent_id: i64) -> CrosswalkMatch {
        let Some(targets) = self.utilities.get(&respondent_id) else {
            return CrosswalkMatch::Unmapped;
        };
        let shared = targets.iter().any(|target| {
            self.utilities
                .iter()
                .any(|(other, ids)| *other != respondent_id && ids.contains(target))
        });
        match (targets.len(), shared) {
            (1, false) => targets
                .iter()
                .next()
                .map_or(CrosswalkMatch::Unmapped, |id| CrosswalkMatch::Mapped(*id)),
            _ => {
                warn!("Respondent {} maps ambiguously to EIA utilities {:?}", respondent_id, targets);
                CrosswalkMatch::Ambiguous(targets.iter().copied().collect())
            }
        }
    }

    /// The EIA plant a respondent's named plant is. Only one direction is
    /// checked: co-owners of a plant each report it, so several respondents
    /// may link to the same EIA plant.
    pub fn plant(&self, respondent_id: i64, plant_name: &str) -> CrosswalkMatch {
        match self.plants.get(&(respondent_id, name_key(plant_name))) {
            None => CrosswalkMatch::Unmapped,
            Some(targets) if targets.len() == 1 => targets
                .iter()
                .next()
                .map_or(CrosswalkMatch::Unmapped, |id| CrosswalkMatch::Mapped(*id)),
            Some(targets) => CrosswalkMatch::Ambiguous(targets.iter().copied().collect()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.utilities.is_empty() && self.plants.is_empty()
    }
}
