//! Static game-balance tables: buildings and units keyed by name.
//!
//! The catalog is loaded from `catalog.yaml` at startup and treated as
//! read-only afterwards. [`SharedCatalog`] holds the current version behind
//! an [`Arc`] so an operator can swap in a reloaded table without stopping
//! the scheduler; work already in flight keeps the version it started with.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use rust_decimal::Decimal;
use serde::Deserialize;
use stronghold_types::{CombatBucket, Resource, ResourceAmounts};

use crate::error::WorldError;

// ---------------------------------------------------------------------------
// Buildings
// ---------------------------------------------------------------------------

/// Stats of one building level.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuildingLevel {
    /// Resources spent to reach this level.
    #[serde(default)]
    pub cost: ResourceAmounts,
    /// Seconds needed to reach this level.
    #[serde(default)]
    pub build_time_secs: u64,
    /// Hourly production bonus granted by a production building.
    #[serde(default)]
    pub production: Decimal,
    /// Storage capacity granted by the storage building.
    #[serde(default)]
    pub capacity: Option<Decimal>,
    /// Defense multiplier granted by the wall.
    #[serde(default)]
    pub defense_bonus: Option<Decimal>,
}

/// A building and its per-level table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuildingDef {
    /// `levels[0]` describes level 1, `levels[1]` level 2, and so on.
    pub levels: Vec<BuildingLevel>,
}

impl BuildingDef {
    /// Highest level this building can reach.
    pub fn max_level(&self) -> usize {
        self.levels.len()
    }
}

/// Names of the buildings that drive production, storage, and defense.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductionBuildings {
    /// Building producing wood.
    pub wood: String,
    /// Building producing clay.
    pub clay: String,
    /// Building producing iron.
    pub iron: String,
}

impl ProductionBuildings {
    /// The building producing a resource.
    pub fn get(&self, resource: Resource) -> &str {
        match resource {
            Resource::Wood => &self.wood,
            Resource::Clay => &self.clay,
            Resource::Iron => &self.iron,
        }
    }
}

impl Default for ProductionBuildings {
    fn default() -> Self {
        Self {
            wood: String::from("timber_camp"),
            clay: String::from("clay_pit"),
            iron: String::from("iron_mine"),
        }
    }
}

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// Defense rating of a unit against each combat bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DefenseStats {
    /// Defense against infantry.
    #[serde(default)]
    pub general: u32,
    /// Defense against cavalry.
    #[serde(default)]
    pub cavalry: u32,
    /// Defense against archers.
    #[serde(default)]
    pub archer: u32,
}

impl DefenseStats {
    /// Defense against a single bucket.
    pub const fn against(&self, bucket: CombatBucket) -> u32 {
        match bucket {
            CombatBucket::General => self.general,
            CombatBucket::Cavalry => self.cavalry,
            CombatBucket::Archer => self.archer,
        }
    }
}

/// Stats of one unit type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnitDef {
    /// Attack value per unit.
    pub attack: u32,
    /// Bucket the unit attacks in.
    pub attack_type: CombatBucket,
    /// Defense values per unit.
    #[serde(default)]
    pub defense: DefenseStats,
    /// Seconds needed to cross one map field.
    #[serde(default)]
    pub speed_secs_per_field: u64,
    /// Resources one unit can carry.
    #[serde(default)]
    pub haul: u32,
    /// Recruitment cost per unit.
    #[serde(default)]
    pub cost: ResourceAmounts,
    /// Recruitment time per unit in seconds.
    #[serde(default)]
    pub recruit_time_secs: u64,
}

// ---------------------------------------------------------------------------
// WorldCatalog
// ---------------------------------------------------------------------------

/// Read-only building and unit tables for one world.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldCatalog {
    /// Hourly production every town gets per resource, before building bonuses.
    #[serde(default = "default_base_production")]
    pub base_production: Decimal,
    /// Storage capacity of a town without a storage building.
    #[serde(default = "default_base_storage_capacity")]
    pub base_storage_capacity: Decimal,
    /// Which building produces which resource.
    #[serde(default)]
    pub production_buildings: ProductionBuildings,
    /// Building whose level sets the storage capacity.
    #[serde(default = "default_storage_building")]
    pub storage_building: String,
    /// Building whose level sets the defense multiplier.
    #[serde(default = "default_wall_building")]
    pub wall_building: String,
    /// Building tables keyed by name.
    #[serde(default)]
    pub buildings: BTreeMap<String, BuildingDef>,
    /// Unit tables keyed by name.
    #[serde(default)]
    pub units: BTreeMap<String, UnitDef>,
}

impl WorldCatalog {
    /// Load and validate a catalog from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Io`] if the file cannot be read,
    /// [`WorldError::Yaml`] if it is not valid YAML, or
    /// [`WorldError::InvalidCatalog`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, WorldError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate a catalog from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Yaml`] or [`WorldError::InvalidCatalog`].
    pub fn parse(yaml: &str) -> Result<Self, WorldError> {
        let catalog: Self = serde_yml::from_str(yaml)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Check cross-references and value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidCatalog`] describing the first problem.
    pub fn validate(&self) -> Result<(), WorldError> {
        if self.base_production.is_sign_negative() {
            return Err(invalid("base_production must not be negative"));
        }
        if self.base_storage_capacity.is_sign_negative() {
            return Err(invalid("base_storage_capacity must not be negative"));
        }

        for resource in Resource::ALL {
            let name = self.production_buildings.get(resource);
            if !self.buildings.contains_key(name) {
                return Err(invalid(&format!(
                    "production building {name} for {} is not defined",
                    resource.as_str()
                )));
            }
        }
        for name in [&self.storage_building, &self.wall_building] {
            if !self.buildings.contains_key(name) {
                return Err(invalid(&format!("building {name} is not defined")));
            }
        }

        for (name, def) in &self.buildings {
            for level in &def.levels {
                if level.production.is_sign_negative() {
                    return Err(invalid(&format!("{name}: negative production")));
                }
                if level.capacity.is_some_and(|c| c.is_sign_negative()) {
                    return Err(invalid(&format!("{name}: negative capacity")));
                }
                if level.defense_bonus.is_some_and(|b| b < Decimal::ONE) {
                    return Err(invalid(&format!("{name}: defense bonus below 1")));
                }
            }
        }

        Ok(())
    }

    /// Look up a building by name.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::UnknownBuilding`] if the name is not defined.
    pub fn building(&self, name: &str) -> Result<&BuildingDef, WorldError> {
        self.buildings
            .get(name)
            .ok_or_else(|| WorldError::UnknownBuilding(name.to_owned()))
    }

    /// Stats of a building at a level; `None` for level 0.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::UnknownBuilding`] or
    /// [`WorldError::LevelOutOfRange`].
    pub fn building_level(&self, name: &str, level: u32) -> Result<Option<&BuildingLevel>, WorldError> {
        let def = self.building(name)?;
        let Some(index) = level.checked_sub(1) else {
            return Ok(None);
        };
        let out_of_range = || WorldError::LevelOutOfRange {
            building: name.to_owned(),
            level,
            max: def.max_level(),
        };
        let index = usize::try_from(index).map_err(|_err| out_of_range())?;
        def.levels.get(index).map(Some).ok_or_else(out_of_range)
    }

    /// Look up a unit by name.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::UnknownUnit`] if the name is not defined.
    pub fn unit(&self, name: &str) -> Result<&UnitDef, WorldError> {
        self.units
            .get(name)
            .ok_or_else(|| WorldError::UnknownUnit(name.to_owned()))
    }

    /// Whether a building contributes to production.
    pub fn is_production_building(&self, name: &str) -> bool {
        Resource::ALL
            .iter()
            .any(|r| self.production_buildings.get(*r) == name)
    }
}

fn invalid(reason: &str) -> WorldError {
    WorldError::InvalidCatalog {
        reason: reason.to_owned(),
    }
}

fn default_base_production() -> Decimal {
    Decimal::from(30)
}

fn default_base_storage_capacity() -> Decimal {
    Decimal::from(1000)
}

fn default_storage_building() -> String {
    String::from("warehouse")
}

fn default_wall_building() -> String {
    String::from("wall")
}

// ---------------------------------------------------------------------------
// SharedCatalog
// ---------------------------------------------------------------------------

/// The current catalog, swappable at runtime.
#[derive(Debug)]
pub struct SharedCatalog {
    current: RwLock<Arc<WorldCatalog>>,
    source: Option<PathBuf>,
}

impl SharedCatalog {
    /// Wrap an in-memory catalog. [`Self::reload`] is a no-op without a source file.
    pub fn new(catalog: WorldCatalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
            source: None,
        }
    }

    /// Load a catalog from disk and remember the path for later reloads.
    ///
    /// # Errors
    ///
    /// Returns any error from [`WorldCatalog::from_file`].
    pub fn from_file(path: &Path) -> Result<Self, WorldError> {
        let catalog = WorldCatalog::from_file(path)?;
        tracing::info!(
            path = %path.display(),
            buildings = catalog.buildings.len(),
            units = catalog.units.len(),
            "World catalog loaded"
        );
        Ok(Self {
            current: RwLock::new(Arc::new(catalog)),
            source: Some(path.to_path_buf()),
        })
    }

    /// The catalog in effect right now.
    pub fn current(&self) -> Arc<WorldCatalog> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Swap in a new catalog.
    pub fn replace(&self, catalog: WorldCatalog) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(catalog);
    }

    /// Re-read the source file. The old catalog stays in effect on error.
    ///
    /// # Errors
    ///
    /// Returns any error from [`WorldCatalog::from_file`].
    pub fn reload(&self) -> Result<(), WorldError> {
        let Some(path) = &self.source else {
            return Ok(());
        };
        let catalog = WorldCatalog::from_file(path)?;
        tracing::info!(
            path = %path.display(),
            buildings = catalog.buildings.len(),
            units = catalog.units.len(),
            "World catalog reloaded"
        );
        self.replace(catalog);
        Ok(())
    }
}
