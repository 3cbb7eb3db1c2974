//! Cluster registry, active-cluster state and the cluster-access seam.
//!
//! Callers build a [`ClusterRegistry`] from kubeconfig contexts, hand it to a
//! [`ClusterRouter`] together with a [`ClusterBackend`], and reach the backend
//! only through [`ClusterSession`] handles.

pub mod backend;
pub mod error;
pub mod kube_backend;
pub mod registry;
pub mod router;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use backend::{ClusterBackend, ResourceKind};
pub use error::ClusterError;
pub use kube_backend::{load_kubeconfig, map_kube_error, KubeBackend};
pub use registry::{ClusterContextEntry, ClusterDescriptor, ClusterRegistry};
pub use router::{
    ClusterRouter, ClusterSession, RouterConfig, SwitchReport, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_SYSTEM_NAMESPACE,
};
