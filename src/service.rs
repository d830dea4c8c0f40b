//! Descriptor value objects for services, primitive services, and SLAs.
//!
//! These are built by the frontend and consumed read-only by code
//! generation; the lowering pass never touches them.


pub mod extract;

pub use extract::{extract_spec, extract_spec_into, ExtractError};

use ecow::EcoString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Read/write ordering guarantee of a primitive service.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum ConsistencyLevel {
    #[default]
    Any,
    Eventual,
    Causal,
    Strong,
}

impl std::fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsistencyLevel::Any => write!(f, "any"),
            ConsistencyLevel::Eventual => write!(f, "eventual"),
            ConsistencyLevel::Causal => write!(f, "causal"),
            ConsistencyLevel::Strong => write!(f, "strong"),
        }
    }
}

/// How a service's state space is divided across machines.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum PartitionKind {
    #[default]
    None,
    Fixed,
    Dynamic,
}

impl std::fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartitionKind::None => write!(f, "none"),
            PartitionKind::Fixed => write!(f, "fixed"),
            PartitionKind::Dynamic => write!(f, "dynamic"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum WorkflowConsistency {
    #[default]
    Any,
    Atomic,
    Acid,
}

impl std::fmt::Display for WorkflowConsistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowConsistency::Any => write!(f, "any"),
            WorkflowConsistency::Atomic => write!(f, "atomic"),
            WorkflowConsistency::Acid => write!(f, "acid"),
        }
    }
}

/// A named performance or correctness target attached to a composition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum SlaMetric {
    Latency99Percentile,
    Latency95Percentile,
    Latency90Percentile,
    Latency50Percentile,
    WorkflowConsistency,
}

impl std::fmt::Display for SlaMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlaMetric::Latency99Percentile => write!(f, "latency-p99"),
            SlaMetric::Latency95Percentile => write!(f, "latency-p95"),
            SlaMetric::Latency90Percentile => write!(f, "latency-p90"),
            SlaMetric::Latency50Percentile => write!(f, "latency-p50"),
            SlaMetric::WorkflowConsistency => write!(f, "workflow-consistency"),
        }
    }
}

/// Metric set framing a composition; values are kept stringified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sla {
    metrics: BTreeMap<SlaMetric, String>,
}

impl Sla {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, metric: SlaMetric, value: impl ToString) {
        self.metrics.insert(metric, value.to_string());
    }

    pub fn get(&self, metric: SlaMetric) -> Option<&str> {
        self.metrics.get(&metric).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// Optional tri-state deployment attributes of a service; unset means the
/// frontend has not decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProperties {
    pub is_deployed_already: Option<bool>,
    pub is_primitive: Option<bool>,
    pub is_partitioned: Option<bool>,
    pub is_stateful: Option<bool>,
    pub is_replicated: Option<bool>,
}

/// Location of a service's spec files. An empty `directory` means the spec
/// has not been materialised on disk yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecRecord {
    pub directory: String,
    pub main_file: String,
    pub referenced_files: Vec<String>,
}

impl SpecRecord {
    pub fn new(main_file: impl Into<String>) -> Self {
        Self {
            directory: String::new(),
            main_file: main_file.into(),
            referenced_files: Vec::new(),
        }
    }

    pub fn with_references(mut self, files: impl IntoIterator<Item = String>) -> Self {
        self.referenced_files.extend(files);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub package_name: EcoString,
    pub url: EcoString,
    pub display_name: EcoString,
    pub properties: ServiceProperties,
    pub spec: SpecRecord,
}

impl Service {
    pub fn new(
        package_name: impl Into<EcoString>,
        url: impl Into<EcoString>,
        display_name: impl Into<EcoString>,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            url: url.into(),
            display_name: display_name.into(),
            properties: ServiceProperties::default(),
            spec: SpecRecord::default(),
        }
    }

    pub fn with_spec(mut self, spec: SpecRecord) -> Self {
        self.spec = spec;
        self
    }
}

/// A deployable primitive service with its replication, consistency, and
/// partitioning attributes. Built fluently:
///
/// ```
/// use braid::service::{ConsistencyLevel, PrimitiveService};
///
/// let svc = PrimitiveService::new("cart", "shop.cart.CartService", "CartService")
///     .replicate(2, 5)
///     .partition("string")
///     .data_source("postgres://carts");
/// assert_eq!(svc.read_consistency, ConsistencyLevel::Any);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimitiveService {
    pub name: EcoString,
    pub class_name: EcoString,
    pub short_class_name: EcoString,
    pub min_degree: u32,
    pub max_degree: u32,
    pub read_consistency: ConsistencyLevel,
    pub write_consistency: ConsistencyLevel,
    pub partition_key_type: Option<EcoString>,
    pub partition_kind: PartitionKind,
    pub partition_count: u32,
    pub data_source: Option<EcoString>,
    pub configuration: Option<EcoString>,
}

impl PrimitiveService {
    pub fn new(
        name: impl Into<EcoString>,
        class_name: impl Into<EcoString>,
        short_class_name: impl Into<EcoString>,
    ) -> Self {
        Self {
            name: name.into(),
            class_name: class_name.into(),
            short_class_name: short_class_name.into(),
            min_degree: 1,
            max_degree: 1,
            read_consistency: ConsistencyLevel::Any,
            write_consistency: ConsistencyLevel::Any,
            partition_key_type: None,
            partition_kind: PartitionKind::None,
            partition_count: 1,
            data_source: None,
            configuration: None,
        }
    }

    /// Replication degree with both consistency levels left at `Any`.
    pub fn replicate(self, min: u32, max: u32) -> Self {
        self.replicate_with(min, max, ConsistencyLevel::Any, ConsistencyLevel::Any)
    }

    pub fn replicate_with(
        mut self,
        min: u32,
        max: u32,
        read: ConsistencyLevel,
        write: ConsistencyLevel,
    ) -> Self {
        self.min_degree = min;
        self.max_degree = max;
        self.read_consistency = read;
        self.write_consistency = write;
        self
    }

    /// Dynamic partitioning over `key_type` with a single partition.
    pub fn partition(self, key_type: impl Into<EcoString>) -> Self {
        self.partition_with(key_type, PartitionKind::Dynamic, 1)
    }

    pub fn partition_with(
        mut self,
        key_type: impl Into<EcoString>,
        kind: PartitionKind,
        count: u32,
    ) -> Self {
        self.partition_key_type = Some(key_type.into());
        self.partition_kind = kind;
        self.partition_count = count;
        self
    }

    pub fn data_source(mut self, uri: impl Into<EcoString>) -> Self {
        self.data_source = Some(uri.into());
        self
    }

    pub fn configuration(mut self, uri: impl Into<EcoString>) -> Self {
        self.configuration = Some(uri.into());
        self
    }
}
