use std::fs;
use std::path::Path;

use crate::*;

/// A business object that chain steps may reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogObject {
    #[serde(deserialize_with = "deserialize_object_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CatalogObject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The longer of id and name; this is what a node box has to fit.
    pub fn longest_text(&self) -> &str {
        match &self.name {
            Some(name) if name.chars().count() > self.id.chars().count() => name,
            _ => &self.id,
        }
    }

    fn matches(&self, needle: &str) -> bool {
        let contains = |value: &str| value.to_lowercase().contains(needle);
        contains(self.id.as_str())
            || self.name.as_deref().is_some_and(contains)
            || self.description.as_deref().is_some_and(contains)
    }
}

/// Id to object lookup supplied once per editing session.
#[derive(Debug, Clone, Default)]
pub struct ObjectCatalog {
    objects: HashMap<String, CatalogObject>,
    order: Vec<String>,
}

impl ObjectCatalog {
    pub fn new(objects: impl IntoIterator<Item = CatalogObject>) -> Self {
        let mut catalog = Self::default();
        for object in objects {
            catalog.insert(object);
        }
        catalog
    }

    pub fn insert(&mut self, object: CatalogObject) {
        if !self.objects.contains_key(&object.id) {
            self.order.push(object.id.clone());
        }
        self.objects.insert(object.id.clone(), object);
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let objects: Vec<CatalogObject> =
            serde_json::from_str(json).context("failed to parse object catalog")?;
        Ok(Self::new(objects))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        Self::from_json(&contents)
    }

    pub fn get(&self, id: &str) -> Option<&CatalogObject> {
        self.objects.get(id)
    }

    /// Looks up `id`, falling back to an id-only object for unknown refs.
    pub fn resolve(&self, id: &str) -> CatalogObject {
        self.get(id)
            .cloned()
            .unwrap_or_else(|| CatalogObject::new(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogObject> {
        self.order.iter().filter_map(|id| self.objects.get(id))
    }

    /// Case-insensitive palette search over id, name and description.
    pub fn search<'a>(&'a self, query: &str) -> Vec<&'a CatalogObject> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.iter().collect();
        }
        self.iter().filter(|object| object.matches(&needle)).collect()
    }
}

fn deserialize_object_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Integer(value) => value.to_string(),
        RawId::Float(value) => value.to_string(),
    })
}
