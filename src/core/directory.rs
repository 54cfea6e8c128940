//! Named resources and the derivation edges between them.
//!
//! Resources live in an arena of slots addressed by [`ResourceId`]; names map
//! to ids and adjacency is kept as id lists in both directions. An edge
//! `parent -> child` means the child's current is sourced from the parent.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::core::resource::Resource;
use crate::core::sequence::{SequenceGenerator, SequenceSource};
use crate::core::{BosError, BosResult};

/// Stable arena handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub usize);

#[derive(Debug)]
struct Slot {
    name: String,
    resource: Arc<Resource>,
}

#[derive(Debug, Default)]
struct Graph {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    by_name: HashMap<String, ResourceId>,
    children: HashMap<ResourceId, Vec<ResourceId>>,
    parents: HashMap<ResourceId, Vec<ResourceId>>,
}

impl Graph {
    fn id(&self, name: &str) -> BosResult<ResourceId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| BosError::UnknownName(name.to_string()))
    }

    fn name(&self, id: ResourceId) -> Option<&str> {
        self.slots
            .get(id.0)
            .and_then(Option::as_ref)
            .map(|slot| slot.name.as_str())
    }

    fn names(&self, ids: Option<&Vec<ResourceId>>) -> Vec<String> {
        ids.map(|ids| {
            ids.iter()
                .filter_map(|id| self.name(*id).map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
    }

    fn insert(&mut self, resource: Arc<Resource>) -> ResourceId {
        let slot = Slot {
            name: resource.name().to_string(),
            resource,
        };
        let id = if let Some(index) = self.free.pop() {
            self.slots[index] = Some(slot);
            ResourceId(index)
        } else {
            self.slots.push(Some(slot));
            ResourceId(self.slots.len() - 1)
        };
        if let Some(name) = self.name(id).map(str::to_string) {
            self.by_name.insert(name, id);
        }
        id
    }

    fn is_free_source(&self, id: ResourceId) -> bool {
        self.children.get(&id).map_or(true, Vec::is_empty)
    }

    // whether `to` is reachable from `from` along child edges
    fn reaches(&self, from: ResourceId, to: ResourceId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if seen.insert(id) {
                if let Some(children) = self.children.get(&id) {
                    stack.extend(children.iter().copied());
                }
            }
        }
        false
    }

    fn link(&mut self, parent: ResourceId, child: ResourceId) -> BosResult<()> {
        if parent == child || self.reaches(child, parent) {
            return Err(BosError::CycleDetected {
                parent: self.name(parent).unwrap_or_default().to_string(),
                child: self.name(child).unwrap_or_default().to_string(),
            });
        }
        let children = self.children.entry(parent).or_default();
        if !children.contains(&child) {
            children.push(child);
        }
        let parents = self.parents.entry(child).or_default();
        if !parents.contains(&parent) {
            parents.push(parent);
        }
        Ok(())
    }

    fn unlink(&mut self, parent: ResourceId, child: ResourceId) {
        if let Some(children) = self.children.get_mut(&parent) {
            children.retain(|c| *c != child);
        }
        if let Some(parents) = self.parents.get_mut(&child) {
            parents.retain(|p| *p != parent);
        }
    }

    // descendants first, each id once
    fn post_order(&self, root: ResourceId) -> Vec<ResourceId> {
        fn visit(graph: &Graph, id: ResourceId, seen: &mut HashSet<ResourceId>, out: &mut Vec<ResourceId>) {
            if !seen.insert(id) {
                return;
            }
            if let Some(children) = graph.children.get(&id) {
                for child in children {
                    visit(graph, *child, seen, out);
                }
            }
            out.push(id);
        }
        let mut out = Vec::new();
        visit(self, root, &mut HashSet::new(), &mut out);
        out
    }

    fn detach(&mut self, id: ResourceId) -> Option<Slot> {
        if let Some(children) = self.children.remove(&id) {
            for child in children {
                if let Some(parents) = self.parents.get_mut(&child) {
                    parents.retain(|p| *p != id);
                }
            }
        }
        if let Some(parents) = self.parents.remove(&id) {
            for parent in parents {
                if let Some(children) = self.children.get_mut(&parent) {
                    children.retain(|c| *c != id);
                }
            }
        }
        let slot = self.slots.get_mut(id.0).and_then(Option::take)?;
        self.by_name.remove(&slot.name);
        self.free.push(id.0);
        Some(slot)
    }
}

/// Owner of every resource, by name.
#[derive(Debug)]
pub struct Directory {
    graph: RwLock<Graph>,
    sequences: Arc<dyn SequenceSource>,
}

impl Default for Directory {
    fn default() -> Self {
        Self::new(Arc::new(SequenceGenerator::default()))
    }
}

impl Directory {
    /// Empty directory handing out sequence numbers from `sequences`.
    #[must_use]
    pub fn new(sequences: Arc<dyn SequenceSource>) -> Self {
        Self {
            graph: RwLock::new(Graph::default()),
            sequences,
        }
    }

    /// Sequence source shared with every resource created for this directory.
    #[must_use]
    pub fn sequences(&self) -> Arc<dyn SequenceSource> {
        Arc::clone(&self.sequences)
    }

    /// Register a resource under its own name.
    ///
    /// # Errors
    ///
    /// `DuplicateName` if the name is taken.
    pub fn add(&self, resource: Arc<Resource>) -> BosResult<ResourceId> {
        let mut graph = self.graph.write();
        if graph.by_name.contains_key(resource.name()) {
            return Err(BosError::DuplicateName(resource.name().to_string()));
        }
        let name = resource.name().to_string();
        let id = graph.insert(resource);
        info!(name = %name, id = id.0, "resource registered");
        Ok(id)
    }

    /// Record `parent -> child`.
    ///
    /// # Errors
    ///
    /// `UnknownName` if either end is missing, `CycleDetected` if the child
    /// already reaches the parent.
    pub fn add_edge(&self, parent: &str, child: &str) -> BosResult<()> {
        let mut graph = self.graph.write();
        let (p, c) = (graph.id(parent)?, graph.id(child)?);
        graph.link(p, c)?;
        debug!(parent, child, "edge added");
        Ok(())
    }

    /// Register several resources and edges as one step. Either everything
    /// is applied or nothing is.
    ///
    /// Edge ends may name resources from `resources` or ones already
    /// registered. Every name in `sources` must still be free to source a
    /// composition; the check runs under the same lock as the insert.
    ///
    /// # Errors
    ///
    /// `DuplicateName`, `UnknownName`, `AlreadySourced` or `CycleDetected`.
    pub fn add_all<S: AsRef<str>>(
        &self,
        resources: Vec<Arc<Resource>>,
        edges: &[(String, String)],
        sources: &[S],
    ) -> BosResult<Vec<ResourceId>> {
        let mut graph = self.graph.write();

        for source in sources {
            let source = source.as_ref();
            if !graph.is_free_source(graph.id(source)?) {
                return Err(BosError::AlreadySourced(source.to_string()));
            }
        }

        let mut fresh = HashSet::new();
        for r in &resources {
            if graph.by_name.contains_key(r.name()) || !fresh.insert(r.name().to_string()) {
                return Err(BosError::DuplicateName(r.name().to_string()));
            }
        }
        for (parent, child) in edges {
            for end in [parent, child] {
                if !fresh.contains(end) && !graph.by_name.contains_key(end) {
                    return Err(BosError::UnknownName(end.clone()));
                }
            }
        }

        let ids: Vec<ResourceId> = resources.into_iter().map(|r| graph.insert(r)).collect();
        let mut linked = Vec::with_capacity(edges.len());
        for (parent, child) in edges {
            let (p, c) = (graph.id(parent)?, graph.id(child)?);
            if let Err(e) = graph.link(p, c) {
                for (p, c) in linked {
                    graph.unlink(p, c);
                }
                for id in &ids {
                    graph.detach(*id);
                }
                return Err(e);
            }
            linked.push((p, c));
        }
        for id in &ids {
            info!(name = graph.name(*id).unwrap_or_default(), id = id.0, "resource registered");
        }
        Ok(ids)
    }

    /// Look up a resource.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Resource>> {
        let graph = self.graph.read();
        let id = graph.by_name.get(name)?;
        graph
            .slots
            .get(id.0)
            .and_then(Option::as_ref)
            .map(|slot| Arc::clone(&slot.resource))
    }

    /// Look up a resource or fail with `UnknownName`.
    ///
    /// # Errors
    ///
    /// `UnknownName`.
    pub fn require(&self, name: &str) -> BosResult<Arc<Resource>> {
        self.get(name)
            .ok_or_else(|| BosError::UnknownName(name.to_string()))
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.graph.read().by_name.contains_key(name)
    }

    /// Handle of `name`.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<ResourceId> {
        self.graph.read().by_name.get(name).copied()
    }

    /// Resources sourced from `name`; empty for an unknown name.
    #[must_use]
    pub fn children(&self, name: &str) -> Vec<String> {
        let graph = self.graph.read();
        let Ok(id) = graph.id(name) else {
            debug!(name, "children of unknown resource");
            return Vec::new();
        };
        graph.names(graph.children.get(&id))
    }

    /// Resources `name` is sourced from; empty for an unknown name.
    #[must_use]
    pub fn parents(&self, name: &str) -> Vec<String> {
        let graph = self.graph.read();
        let Ok(id) = graph.id(name) else {
            debug!(name, "parents of unknown resource");
            return Vec::new();
        };
        graph.names(graph.parents.get(&id))
    }

    /// Whether `name` exists and does not source a composition yet.
    #[must_use]
    pub fn can_be_source(&self, name: &str) -> bool {
        let graph = self.graph.read();
        graph.id(name).is_ok_and(|id| graph.is_free_source(id))
    }

    /// Remove `name` and everything derived from it, descendants first.
    ///
    /// Each removed resource's scheduler is stopped before it is detached.
    /// Returns the removed names in removal order.
    ///
    /// # Errors
    ///
    /// `UnknownName`.
    pub fn remove(&self, name: &str) -> BosResult<Vec<String>> {
        let mut graph = self.graph.write();
        let root = graph.id(name)?;
        let mut removed = Vec::new();
        for id in graph.post_order(root) {
            if let Some(slot) = graph.slots.get(id.0).and_then(Option::as_ref) {
                slot.resource.quit();
            }
            if let Some(slot) = graph.detach(id) {
                info!(name = %slot.name, id = id.0, "resource removed");
                removed.push(slot.name);
            }
        }
        Ok(removed)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.graph.read().by_name.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.read().by_name.len()
    }

    /// No resources registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every scheduler and drop every resource.
    pub fn shutdown(&self) {
        let mut graph = self.graph.write();
        let count = graph.by_name.len();
        for slot in graph.slots.iter().flatten() {
            slot.resource.quit();
        }
        *graph = Graph::default();
        info!(count, "directory shut down");
    }
}
