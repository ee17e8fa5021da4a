//! Pure, Kubernetes-API-client-free helpers shared by the control plane binary.

pub mod naming;
pub mod quantity;
