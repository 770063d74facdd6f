//! Hierarchical location index
//!
//! A hierarchy is read once from a nested JSON payload and is immutable
//! afterwards. Locations live in an arena owned by the hierarchy; parents and
//! children refer to each other by [`LocationId`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::types::ValueType;
use crate::CoreError;

/// Numeric level of a location, e.g. 0 = country, 1 = state
pub type LocationLevel = usize;

/// Number of levels indexed when no explicit limit is given
pub const DEFAULT_LOCATION_LEVELS: usize = 4;

const PATH_SEPARATOR: &str = ">";
const PADDED_PATH_SEPARATOR: &str = " > ";

/// Index of a location within its hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocationId(usize);

/// A single location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    id: LocationId,
    level: LocationLevel,
    name: String,
    path: String,
    aliases: Vec<String>,
    parent: Option<LocationId>,
    children: Vec<LocationId>,
}

impl Location {
    /// Identifier of this location within its hierarchy
    pub fn id(&self) -> LocationId {
        self.id
    }

    /// Level of this location
    pub fn level(&self) -> LocationLevel {
        self.level
    }

    /// Name of this location
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full path of this location, e.g. `Rwanda > Kigali City > Gasabo`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Alternative names of this location
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Parent of this location, if it isn't the root
    pub fn parent(&self) -> Option<LocationId> {
        self.parent
    }

    /// Children of this location in declared order
    pub fn children(&self) -> &[LocationId] {
        &self.children
    }
}

impl ValueType for Location {
    fn to_text(&self) -> String {
        self.path.clone()
    }

    fn to_boolean(&self) -> bool {
        true
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::String(self.path.clone())
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}

// names aren't unique within a level, e.g. two wards with the same name under different districts
type NameLookup = HashMap<String, Vec<LocationId>>;

/// A hierarchical tree of locations
#[derive(Debug, Clone)]
pub struct LocationHierarchy {
    locations: Vec<Location>,
    path_lookup: HashMap<String, LocationId>,
    level_lookups: Vec<NameLookup>,
}

#[derive(Debug, Deserialize, Serialize)]
struct LocationEnvelope {
    name: String,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    children: Vec<LocationEnvelope>,
}

/// Read a location hierarchy indexing [`DEFAULT_LOCATION_LEVELS`] levels
pub fn read_location_hierarchy(data: &serde_json::Value) -> Result<LocationHierarchy, CoreError> {
    LocationHierarchy::read(data, DEFAULT_LOCATION_LEVELS)
}

impl LocationHierarchy {
    /// Read a hierarchy from its nested JSON representation
    ///
    /// Locations deeper than `max_levels` are not represented.
    pub fn read(data: &serde_json::Value, max_levels: usize) -> Result<Self, CoreError> {
        if max_levels == 0 {
            return Err(CoreError::ParseError(
                "location hierarchy needs at least one level".to_string(),
            ));
        }

        let envelope: LocationEnvelope = serde_json::from_value(data.clone())
            .map_err(|e| CoreError::ParseError(format!("invalid location: {}", e)))?;

        Self::build(envelope, max_levels)
    }

    fn build(root: LocationEnvelope, max_levels: usize) -> Result<Self, CoreError> {
        let mut hierarchy = Self {
            locations: Vec::new(),
            path_lookup: HashMap::new(),
            level_lookups: vec![NameLookup::new(); max_levels],
        };

        // depth-first so that every parent is allocated before its children
        let mut pending: Vec<(LocationEnvelope, LocationLevel, Option<LocationId>)> =
            vec![(root, 0, None)];

        while let Some((envelope, level, parent)) = pending.pop() {
            if envelope.name.trim().is_empty() {
                return Err(CoreError::ParseError(format!(
                    "location at level {} is missing a name",
                    level
                )));
            }

            let id = LocationId(hierarchy.locations.len());
            let path = match parent {
                Some(parent_id) => format!(
                    "{}{}{}",
                    hierarchy.locations[parent_id.0].path, PADDED_PATH_SEPARATOR, envelope.name
                ),
                None => envelope.name.clone(),
            };

            hierarchy.locations.push(Location {
                id,
                level,
                name: envelope.name,
                path,
                aliases: envelope.aliases,
                parent,
                children: Vec::new(),
            });
            if let Some(parent_id) = parent {
                hierarchy.locations[parent_id.0].children.push(id);
            }
            hierarchy.index(id);

            if level + 1 >= max_levels {
                if !envelope.children.is_empty() {
                    debug!(
                        location = %hierarchy.locations[id.0].path,
                        dropped = envelope.children.len(),
                        "Ignoring locations below the deepest indexed level"
                    );
                }
                continue;
            }

            // reversed so children pop off in declared order
            for child in envelope.children.into_iter().rev() {
                pending.push((child, level + 1, Some(id)));
            }
        }

        Ok(hierarchy)
    }

    fn index(&mut self, id: LocationId) {
        let location = &self.locations[id.0];
        self.path_lookup
            .insert(normalize_path(&location.path), id);

        let lookup = &mut self.level_lookups[location.level];
        lookup.entry(location.name.to_lowercase()).or_default().push(id);
        for alias in &location.aliases {
            let ids = lookup.entry(alias.to_lowercase()).or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    /// The root location (typically a country)
    pub fn root(&self) -> &Location {
        &self.locations[0]
    }

    /// Look up a location by identifier
    pub fn get(&self, id: LocationId) -> Option<&Location> {
        self.locations.get(id.0)
    }

    /// The parent of the given location
    pub fn parent_of(&self, location: &Location) -> Option<&Location> {
        location.parent.and_then(|id| self.get(id))
    }

    /// The children of the given location
    pub fn children_of<'a>(&'a self, location: &Location) -> Vec<&'a Location> {
        location
            .children
            .iter()
            .filter_map(|id| self.get(*id))
            .collect()
    }

    /// Number of locations in the hierarchy
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether the hierarchy is empty (never true for a successfully read hierarchy)
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Number of indexed levels
    pub fn num_levels(&self) -> usize {
        self.level_lookups.len()
    }

    /// Find all locations with the given level and name, alias or path
    ///
    /// Paths are tried first when `level` is 0 or the name contains a path
    /// separator. When `parent` is given, name matches are narrowed to that
    /// parent's children.
    pub fn find_by_name(
        &self,
        name: &str,
        level: LocationLevel,
        parent: Option<LocationId>,
    ) -> Vec<&Location> {
        if level == 0 || name.contains(PATH_SEPARATOR) {
            if let Some(id) = self.path_lookup.get(&normalize_path(name)) {
                return vec![&self.locations[id.0]];
            }
        }

        let Some(lookup) = self.level_lookups.get(level) else {
            return Vec::new();
        };
        let Some(matches) = lookup.get(&name.trim().to_lowercase()) else {
            return Vec::new();
        };

        matches
            .iter()
            .map(|id| &self.locations[id.0])
            .filter(|location| parent.map_or(true, |p| location.parent == Some(p)))
            .collect()
    }
}

fn normalize_path(path: &str) -> String {
    path.split(PATH_SEPARATOR)
        .map(|part| part.trim().to_lowercase())
        .collect::<Vec<_>>()
        .join(PADDED_PATH_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_hierarchy() -> LocationHierarchy {
        read_location_hierarchy(&json!({
            "name": "Rwanda",
            "aliases": ["Rwa"],
            "children": [
                {
                    "name": "Kigali City",
                    "aliases": ["Kigali", "Kigari"],
                    "children": [
                        {
                            "name": "Gasabo",
                            "children": [
                                {"name": "Central", "aliases": ["Centre"]},
                                {"name": "Gisozi"}
                            ]
                        },
                        {
                            "name": "Nyarugenge",
                            "children": [
                                {"name": "Central"},
                                {"name": "Kigali", "children": [{"name": "Too Deep"}]}
                            ]
                        }
                    ]
                },
                {"name": "Eastern Province"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_paths_are_computed_from_parents() {
        let hierarchy = test_hierarchy();

        assert_eq!(hierarchy.root().path(), "Rwanda");
        assert_eq!(hierarchy.root().level(), 0);

        let gasabo = hierarchy.find_by_name("Gasabo", 2, None);
        assert_eq!(gasabo.len(), 1);
        assert_eq!(gasabo[0].path(), "Rwanda > Kigali City > Gasabo");

        let parent = hierarchy.parent_of(gasabo[0]).unwrap();
        assert_eq!(parent.name(), "Kigali City");

        let children: Vec<&str> = hierarchy
            .children_of(gasabo[0])
            .iter()
            .map(|l| l.name())
            .collect();
        assert_eq!(children, vec!["Central", "Gisozi"]);
    }

    #[test]
    fn test_find_by_name_disambiguates_with_parent() {
        let hierarchy = test_hierarchy();
        let gasabo = hierarchy.find_by_name("Gasabo", 2, None)[0].id();
        let nyarugenge = hierarchy.find_by_name("nyarugenge", 2, None)[0].id();

        let both = hierarchy.find_by_name("Central", 3, None);
        assert_eq!(both.len(), 2);

        let in_gasabo = hierarchy.find_by_name("Central", 3, Some(gasabo));
        assert_eq!(in_gasabo.len(), 1);
        assert_eq!(in_gasabo[0].path(), "Rwanda > Kigali City > Gasabo > Central");

        let in_nyarugenge = hierarchy.find_by_name("CENTRAL", 3, Some(nyarugenge));
        assert_eq!(in_nyarugenge.len(), 1);
        assert_eq!(
            in_nyarugenge[0].path(),
            "Rwanda > Kigali City > Nyarugenge > Central"
        );
    }

    #[test]
    fn test_find_by_name_uses_aliases() {
        let hierarchy = test_hierarchy();

        let states = hierarchy.find_by_name("kigari", 1, None);
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].name(), "Kigali City");

        let wards = hierarchy.find_by_name("centre", 3, None);
        assert_eq!(wards.len(), 1);
        assert_eq!(wards[0].aliases(), ["Centre".to_string()]);
    }

    #[test]
    fn test_find_by_name_exact_path_bypass() {
        let hierarchy = test_hierarchy();

        let matches = hierarchy.find_by_name("Rwanda > Kigali City > Gasabo", 0, None);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name(), "Gasabo");
        assert_eq!(matches[0].level(), 2);

        // separator without padding and mixed case still resolves
        let matches = hierarchy.find_by_name("rwanda>kigali city>nyarugenge>central", 3, None);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].path(), "Rwanda > Kigali City > Nyarugenge > Central");

        let countries = hierarchy.find_by_name("rwanda", 0, None);
        assert_eq!(countries.len(), 1);
        assert_eq!(countries[0].id(), hierarchy.root().id());
    }

    #[test]
    fn test_find_by_name_no_match() {
        let hierarchy = test_hierarchy();

        assert!(hierarchy.find_by_name("Atlantis", 1, None).is_empty());
        assert!(hierarchy.find_by_name("Gasabo", 1, None).is_empty());
        assert!(hierarchy.find_by_name("Gasabo", 9, None).is_empty());
    }

    #[test]
    fn test_levels_beyond_max_are_dropped() {
        let hierarchy = test_hierarchy();

        assert_eq!(hierarchy.num_levels(), 4);
        assert_eq!(hierarchy.len(), 10);
        assert!(hierarchy.find_by_name("Too Deep", 4, None).is_empty());
        assert!(hierarchy
            .find_by_name("Rwanda > Kigali City > Nyarugenge > Kigali > Too Deep", 0, None)
            .is_empty());

        let shallow = LocationHierarchy::read(
            &json!({"name": "Rwanda", "children": [{"name": "Kigali City"}]}),
            1,
        )
        .unwrap();
        assert_eq!(shallow.len(), 1);
    }

    #[test]
    fn test_read_rejects_malformed_nesting() {
        assert!(matches!(
            read_location_hierarchy(&json!({"aliases": []})),
            Err(CoreError::ParseError(_))
        ));
        assert!(matches!(
            read_location_hierarchy(&json!({"name": "Rwanda", "children": {"name": "x"}})),
            Err(CoreError::ParseError(_))
        ));
        assert!(matches!(
            read_location_hierarchy(&json!({"name": "Rwanda", "children": [{"name": ""}]})),
            Err(CoreError::ParseError(_))
        ));
    }

    #[test]
    fn test_location_value_type() {
        let hierarchy = test_hierarchy();
        let gisozi = hierarchy.find_by_name("Gisozi", 3, None)[0];

        assert_eq!(gisozi.to_text(), "Rwanda > Kigali City > Gasabo > Gisozi");
        assert_eq!(gisozi.to_json(), json!("Rwanda > Kigali City > Gasabo > Gisozi"));
        assert!(gisozi.to_boolean());
        assert_eq!(gisozi.to_string(), gisozi.path());
    }
}
