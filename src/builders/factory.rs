//! Typed factory: the only way resources enter a directory.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{AggregateConfig, ResourceConfig};
use crate::core::{
    Aggregate, BosError, BosResult, DeviceDriver, Directory, DriverBackend, Leaf, Partition,
    PartitionChild, PartitionPolicy, Resource, ResourceLink, Scale, CURRENT_EPSILON_MA,
};

/// Creates and removes resources in a [`Directory`].
///
/// Creation either registers the resource together with its edges or leaves
/// the directory unchanged.
#[derive(Debug)]
pub struct ResourceFactory {
    directory: Arc<Directory>,
    partitions: AtomicU64,
}

impl ResourceFactory {
    /// Factory over `directory`.
    #[must_use]
    pub const fn new(directory: Arc<Directory>) -> Self {
        Self {
            directory,
            partitions: AtomicU64::new(0),
        }
    }

    /// The directory resources are registered in.
    #[must_use]
    pub const fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    fn ensure_free(&self, name: &str) -> BosResult<()> {
        if self.directory.contains(name) {
            return Err(BosError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    // a source must exist, source nothing yet and carry no current; the
    // directory re-checks the first condition when the edges are written
    fn claim_source(&self, name: &str) -> BosResult<Arc<Resource>> {
        let resource = self.directory.require(name)?;
        if !self.directory.can_be_source(name) {
            return Err(BosError::AlreadySourced(name.to_string()));
        }
        let status = resource.get_status()?;
        if status.current_ma.abs() > CURRENT_EPSILON_MA {
            return Err(BosError::SourceNotIdle {
                name: name.to_string(),
                current: status.current_ma,
            });
        }
        Ok(resource)
    }

    /// Create a physical resource driven by `driver`.
    ///
    /// # Errors
    ///
    /// `DuplicateName` or `Config`.
    pub fn create_physical(
        &self,
        name: &str,
        driver: Box<dyn DeviceDriver>,
        config: ResourceConfig,
    ) -> BosResult<Arc<Resource>> {
        self.ensure_free(name)?;
        let driver_type = driver.type_name();
        let leaf = Leaf::spawn(name, DriverBackend::new(driver), config, self.directory.sequences())?;
        let resource = Arc::new(Resource::Leaf(leaf));
        if let Err(e) = self.directory.add(Arc::clone(&resource)) {
            resource.quit();
            return Err(e);
        }
        info!(name, driver = driver_type, "physical resource created");
        Ok(resource)
    }

    /// Aggregate `parents` into one resource.
    ///
    /// # Errors
    ///
    /// `Config` for an empty or repeated parent list, `DuplicateName`,
    /// `UnknownName`, `AlreadySourced` or `SourceNotIdle`.
    pub fn create_aggregate<S: AsRef<str>>(
        &self,
        name: &str,
        parents: &[S],
        config: &AggregateConfig,
    ) -> BosResult<Arc<Resource>> {
        if parents.is_empty() {
            return Err(BosError::Config(format!("aggregate `{name}` needs at least one parent")));
        }
        let mut seen = HashSet::new();
        for parent in parents {
            let parent = parent.as_ref();
            if !seen.insert(parent) {
                return Err(BosError::Config(format!("aggregate `{name}` lists `{parent}` twice")));
            }
        }
        config.validate().map_err(BosError::Config)?;
        self.ensure_free(name)?;

        let links = parents
            .iter()
            .map(|p| self.claim_source(p.as_ref()).map(|r| ResourceLink::new(&r)))
            .collect::<BosResult<Vec<_>>>()?;

        let aggregate = Aggregate::new(name, links, config, self.directory.sequences())?;
        let resource = Arc::new(Resource::Aggregate(aggregate));
        let edges: Vec<(String, String)> = parents
            .iter()
            .map(|p| (p.as_ref().to_string(), name.to_string()))
            .collect();
        if let Err(e) = self.directory.add_all(vec![Arc::clone(&resource)], &edges, parents) {
            resource.quit();
            return Err(e);
        }
        info!(name, parents = parents.len(), "aggregate created");
        Ok(resource)
    }

    fn next_manager_name(&self, source: &str) -> String {
        loop {
            let n = self.partitions.fetch_add(1, Ordering::Relaxed);
            let candidate = format!("{source}/partition-{n}");
            if !self.directory.contains(&candidate) {
                return candidate;
            }
        }
    }

    /// Split `source` into named children.
    ///
    /// A hidden manager named `<source>/partition-<n>` is wired between the
    /// source and the children. Returns the children in the given order.
    ///
    /// # Errors
    ///
    /// `InvalidScale`, `Config`, `DuplicateName`, `UnknownName`,
    /// `AlreadySourced` or `SourceNotIdle`.
    pub fn create_partition(
        &self,
        source: &str,
        policy: PartitionPolicy,
        children: &[(String, Scale)],
        config: ResourceConfig,
    ) -> BosResult<Vec<Arc<Resource>>> {
        let scales: Vec<Scale> = children.iter().map(|(_, s)| *s).collect();
        Scale::validate_set(&scales)?;
        let mut seen = HashSet::new();
        for (child, _) in children {
            if child.is_empty() {
                return Err(BosError::Config("partition child names must not be empty".into()));
            }
            if !seen.insert(child.as_str()) {
                return Err(BosError::DuplicateName(child.clone()));
            }
            self.ensure_free(child)?;
        }

        let source_resource = self.claim_source(source)?;
        let source_status = source_resource.get_status()?;
        let manager_name = self.next_manager_name(source);

        let partition = Partition::new(
            manager_name.clone(),
            policy,
            ResourceLink::new(&source_resource),
            &source_status,
            children,
            config,
            self.directory.sequences(),
        )?;
        let manager = Arc::new(Resource::Partition(partition));
        let link = ResourceLink::new(&manager);
        let child_resources: Vec<Arc<Resource>> = children
            .iter()
            .map(|(child, _)| Arc::new(Resource::PartitionChild(PartitionChild::new(child.clone(), link.clone()))))
            .collect();

        let mut edges = vec![(source.to_string(), manager_name.clone())];
        edges.extend(children.iter().map(|(child, _)| (manager_name.clone(), child.clone())));
        let mut resources = vec![Arc::clone(&manager)];
        resources.extend(child_resources.iter().cloned());

        if let Err(e) = self.directory.add_all(resources, &edges, &[source]) {
            manager.quit();
            return Err(e);
        }
        info!(
            source,
            manager = %manager_name,
            ?policy,
            children = children.len(),
            "partition created"
        );
        Ok(child_resources)
    }

    /// Remove `name` and everything derived from it.
    ///
    /// Removing a partition child removes its manager and with it every
    /// sibling.
    ///
    /// # Errors
    ///
    /// `UnknownName`.
    pub fn remove(&self, name: &str) -> BosResult<Vec<String>> {
        let resource = self.directory.require(name)?;
        let target = match resource.as_ref() {
            Resource::PartitionChild(child) => {
                warn!(name, manager = child.manager_name(), "removing whole partition");
                child.manager_name().to_string()
            }
            _ => name.to_string(),
        };
        drop(resource);
        self.directory.remove(&target)
    }
}
