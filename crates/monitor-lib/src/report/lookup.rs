//! Resource size lookup
//!
//! When jobs never reported a resource's size, the aggregator asks a
//! [`SizeLookup`] for it, passing along the project the resource's jobs were
//! logged in. Lookups go through a [`SizeCache`] owned by a single
//! run so each resource is asked for at most once and nothing leaks between
//! runs.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::LookupError;
use crate::models::gib_to_bytes;

/// Source of authoritative resource sizes
pub trait SizeLookup: Send + Sync {
    /// Size in bytes of `resource_name`. `Ok(0)` means the resource type is
    /// not sized by this lookup. `project_id` is the project the resource's
    /// jobs were logged in; a project named in the resource path wins over it.
    fn lookup(
        &self,
        resource_name: &str,
        resource_type: &str,
        project_id: Option<&str>,
    ) -> Result<u64, LookupError>;
}

/// Lookup that knows nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl SizeLookup for NoLookup {
    fn lookup(&self, _: &str, _: &str, _: Option<&str>) -> Result<u64, LookupError> {
        Ok(0)
    }
}

/// Inventory category a resource type maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    ComputeInstance,
    Disk,
    CloudSql,
}

impl ResourceKind {
    /// Classify a free-form resource type. VMware and unrecognised types are
    /// not sized.
    pub fn classify(resource_type: &str) -> Option<Self> {
        let lowered = resource_type.to_lowercase();
        if lowered.contains("vmware") {
            None
        } else if ["gce", "compute", "vm"].iter().any(|k| lowered.contains(k)) {
            Some(ResourceKind::ComputeInstance)
        } else if lowered.contains("disk") {
            Some(ResourceKind::Disk)
        } else if lowered.contains("cloud sql") || lowered.contains("cloudsql") {
            Some(ResourceKind::CloudSql)
        } else {
            None
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::ComputeInstance => write!(f, "compute instance"),
            ResourceKind::Disk => write!(f, "disk"),
            ResourceKind::CloudSql => write!(f, "Cloud SQL instance"),
        }
    }
}

/// A parsed cloud resource path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRef<'a> {
    /// `projects/{project}/zones/{zone}/instances/{name}`
    Instance { project: &'a str, zone: &'a str, name: &'a str },
    /// `projects/{project}/zones/{zone}/disks/{name}`
    Disk { project: &'a str, zone: &'a str, name: &'a str },
    /// `projects/{project}/instances/{name}`
    SqlInstance { project: &'a str, name: &'a str },
}

impl<'a> ResourceRef<'a> {
    /// Parse a resource path; any prefix before `projects/` is ignored
    pub fn parse(resource_name: &'a str) -> Option<Self> {
        let segments: Vec<&'a str> = resource_name.split('/').collect();
        let start = segments.iter().position(|s| *s == "projects")?;

        match segments[start + 1..] {
            [project, "zones", zone, "instances", name, ..] if !name.is_empty() => {
                Some(ResourceRef::Instance { project, zone, name })
            }
            [project, "zones", zone, "disks", name, ..] if !name.is_empty() => {
                Some(ResourceRef::Disk { project, zone, name })
            }
            [project, "instances", name, ..] if !name.is_empty() => {
                Some(ResourceRef::SqlInstance { project, name })
            }
            _ => None,
        }
    }

    pub fn project(&self) -> &'a str {
        match self {
            ResourceRef::Instance { project, .. }
            | ResourceRef::Disk { project, .. }
            | ResourceRef::SqlInstance { project, .. } => *project,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceRef::Instance { .. } => ResourceKind::ComputeInstance,
            ResourceRef::Disk { .. } => ResourceKind::Disk,
            ResourceRef::SqlInstance { .. } => ResourceKind::CloudSql,
        }
    }

    pub fn name(&self) -> &'a str {
        match self {
            ResourceRef::Instance { name, .. }
            | ResourceRef::Disk { name, .. }
            | ResourceRef::SqlInstance { name, .. } => *name,
        }
    }
}

/// Resource sizes in GiB, keyed by short resource name per category.
///
/// A key may be scoped to a project as `{project}/{name}`. Scoped keys are
/// tried first, then the bare name.
///
/// ```json
/// {
///   "instances": { "web-server-1": 120, "staging/web-server-1": 40 },
///   "disks": { "data-disk-1": 500 },
///   "sql_instances": { "prod-sql-db-1": 250 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InventoryFile {
    #[serde(default)]
    instances: BTreeMap<String, f64>,
    #[serde(default)]
    disks: BTreeMap<String, f64>,
    #[serde(default)]
    sql_instances: BTreeMap<String, f64>,
}

impl InventoryFile {
    pub fn from_json(json: &str) -> Result<Self, LookupError> {
        serde_json::from_str(json)
            .map_err(|e| LookupError::Unavailable(format!("invalid inventory: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self, LookupError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            LookupError::Unavailable(format!("cannot read {}: {}", path.display(), e))
        })?;
        let inventory = Self::from_json(&contents)?;
        debug!(
            path = %path.display(),
            instances = inventory.instances.len(),
            disks = inventory.disks.len(),
            sql_instances = inventory.sql_instances.len(),
            "Loaded size inventory"
        );
        Ok(inventory)
    }

    fn table(&self, kind: ResourceKind) -> &BTreeMap<String, f64> {
        match kind {
            ResourceKind::ComputeInstance => &self.instances,
            ResourceKind::Disk => &self.disks,
            ResourceKind::CloudSql => &self.sql_instances,
        }
    }

    fn size_gib(&self, kind: ResourceKind, project: Option<&str>, name: &str) -> Option<f64> {
        let table = self.table(kind);
        project
            .and_then(|project| table.get(&format!("{}/{}", project, name)))
            .or_else(|| table.get(name))
            .copied()
    }
}

/// Project and short name a resource is filed under
fn address<'n>(
    resource_name: &'n str,
    project_id: Option<&'n str>,
    kind: ResourceKind,
) -> Result<(Option<&'n str>, &'n str), LookupError> {
    match ResourceRef::parse(resource_name) {
        Some(reference) if reference.kind() != kind => Err(LookupError::Unaddressable {
            name: resource_name.to_string(),
            reason: format!("path names a {}, type says {}", reference.kind(), kind),
        }),
        Some(reference) => Ok((Some(reference.project()), reference.name())),
        None => {
            let name = resource_name.rsplit('/').next().unwrap_or(resource_name);
            match project_id {
                Some(project) if !name.is_empty() => Ok((Some(project), name)),
                _ => Err(LookupError::Unaddressable {
                    name: resource_name.to_string(),
                    reason: format!("not a {} path and no project known", kind),
                }),
            }
        }
    }
}

impl SizeLookup for InventoryFile {
    fn lookup(
        &self,
        resource_name: &str,
        resource_type: &str,
        project_id: Option<&str>,
    ) -> Result<u64, LookupError> {
        let Some(kind) = ResourceKind::classify(resource_type) else {
            return Ok(0);
        };

        let (project, name) = address(resource_name, project_id, kind)?;
        self.size_gib(kind, project, name)
            .map(gib_to_bytes)
            .ok_or_else(|| LookupError::NotFound {
                name: resource_name.to_string(),
            })
    }
}

/// Per-run memo over a [`SizeLookup`], keyed by resource and project.
/// Failures are cached as 0 and counted.
pub struct SizeCache<'l> {
    lookup: &'l dyn SizeLookup,
    sizes: HashMap<(String, Option<String>), u64>,
    failures: usize,
}

impl<'l> SizeCache<'l> {
    pub fn new(lookup: &'l dyn SizeLookup) -> Self {
        Self {
            lookup,
            sizes: HashMap::new(),
            failures: 0,
        }
    }

    /// Size of a resource, asking the lookup only on first use
    pub fn resolve(
        &mut self,
        resource_name: &str,
        resource_type: &str,
        project_id: Option<&str>,
    ) -> u64 {
        let key = (resource_name.to_string(), project_id.map(str::to_string));
        if let Some(size) = self.sizes.get(&key) {
            return *size;
        }

        let size = match self.lookup.lookup(resource_name, resource_type, project_id) {
            Ok(size) => size,
            Err(error) => {
                self.failures += 1;
                warn!(
                    resource = %resource_name,
                    resource_type = %resource_type,
                    project = project_id.unwrap_or_default(),
                    error = %error,
                    "Size lookup failed"
                );
                0
            }
        };
        self.sizes.insert(key, size);
        size
    }

    pub fn failures(&self) -> usize {
        self.failures
    }
}
