use core::fmt;

use indexmap::{IndexMap, map::Entry};

use crate::resource::{ResId, Resource};

/// Resources keyed by id, in insertion order.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ResourceMap {
    resources: IndexMap<ResId, Resource>,
}

impl fmt::Debug for ResourceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.resources.values()).finish()
    }
}

impl ResourceMap {
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn get(&self, id: &ResId) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn insert(&mut self, resource: Resource) -> Result<(), Conflict> {
        match self.resources.entry(resource.id().clone()) {
            Entry::Occupied(_) => Err(Conflict { resource }),
            Entry::Vacant(entry) => {
                entry.insert(resource);
                Ok(())
            }
        }
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Resource> + DoubleEndedIterator {
        self.resources.values()
    }

    pub fn iter_mut(
        &mut self,
    ) -> impl ExactSizeIterator<Item = &mut Resource> + DoubleEndedIterator {
        self.resources.values_mut()
    }

    /// In-place merge of two `ResourceMap`s, any conflicting resources will be an error
    pub fn merge(&mut self, other: ResourceMap) -> Result<(), Conflict> {
        for (_, resource) in other.resources {
            self.insert(resource)?;
        }
        Ok(())
    }

    /// Writes the resources as a `---` separated yaml stream.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        let mut out = String::new();
        for resource in self.iter() {
            if !out.is_empty() {
                out.push_str("---\n");
            }
            out.push_str(&crate::yaml::to_string(resource)?);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub resource: Resource,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "may not add resource with an already registered id `{}`",
            self.resource.id()
        )
    }
}

impl std::error::Error for Conflict {}
