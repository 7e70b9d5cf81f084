//! Reconciles the operator's stored input datatypes with the datatypes the
//! graph annotates on the tensors actually connected to it.
//!
//! Upstream transformations may change the datatype of a tensor after the
//! operator was configured. Every such change is reported as a
//! [`DatatypeDrift`] and adopted, so emission always sees the datatypes the
//! hardware will receive. The output datatype flows the other way: the
//! operator decides it and asserts it onto the graph.

use std::fmt;

use datatype::DataType;

use super::graph::ModelGraph;
use crate::core::{AttentionError, OperatorConfig, Result, TensorRole};

/// A stored role datatype that disagreed with the graph annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatatypeDrift {
    pub node: String,
    pub role: TensorRole,
    pub stored: DataType,
    pub observed: DataType,
}

impl fmt::Display for DatatypeDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} changing for {}: {} -> {}",
            self.role.type_alias(),
            self.node,
            self.stored,
            self.observed
        )
    }
}

/// Adopts the graph datatypes of every input role and annotates the output.
///
/// `inputs` lists the node's input tensor names in role order (query, key,
/// value, then the mask in input mask mode). Inputs the graph has no
/// annotation for are left as configured.
pub fn infer_node_datatype<G: ModelGraph + ?Sized>(
    config: &mut OperatorConfig,
    node: &str,
    inputs: &[String],
    output: &str,
    graph: &mut G,
) -> Result<Vec<DatatypeDrift>> {
    let roles = config.input_roles();
    if inputs.len() < roles.len() {
        return Err(AttentionError::invalid_config(
            "inputs",
            format!(
                "node {node} has {} inputs but mask mode '{}' needs {}",
                inputs.len(),
                config.mask_mode(),
                roles.len()
            ),
        ));
    }

    let mut drifts = Vec::new();
    for (role, tensor) in roles.into_iter().zip(inputs) {
        let Some(observed) = graph.tensor_datatype(tensor) else {
            log::debug!("attention::consistency {node}: no datatype annotated on {tensor}");
            continue;
        };
        let stored = config.datatype(role);
        if observed != stored {
            let drift = DatatypeDrift {
                node: node.to_string(),
                role,
                stored,
                observed,
            };
            log::warn!("{drift}");
            drifts.push(drift);
            config.set_datatype(role, observed);
        }
    }

    graph.set_tensor_datatype(output, config.datatype(TensorRole::Output));
    Ok(drifts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Folds, MaskMode, RoleTypes, Shapes};
    use crate::interop::InMemoryGraph;

    fn config(mask_mode: MaskMode) -> OperatorConfig {
        OperatorConfig::new(
            Shapes {
                qk_dim: 8,
                q_len: 4,
                v_dim: 8,
                kv_len: 4,
            },
            Folds {
                emb_fold: 2,
                seq_fold: 2,
            },
            RoleTypes::new(
                DataType::UInt(8),
                DataType::UInt(8),
                DataType::UInt(8),
                DataType::UInt(16),
            ),
        )
        .with_mask_mode(mask_mode)
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn matching_annotations_produce_no_drift() {
        let mut cfg = config(MaskMode::None);
        let mut graph = InMemoryGraph::new()
            .with_datatype("q", DataType::UInt(8))
            .with_datatype("k", DataType::UInt(8))
            .with_datatype("v", DataType::UInt(8));
        let drifts =
            infer_node_datatype(&mut cfg, "sdpa", &names(&["q", "k", "v"]), "o", &mut graph)
                .unwrap();
        assert!(drifts.is_empty());
        assert_eq!(graph.tensor_datatype("o"), Some(DataType::UInt(16)));
    }

    #[test]
    fn drift_message_names_the_alias_and_node() {
        let drift = DatatypeDrift {
            node: "sdpa".to_string(),
            role: TensorRole::Key,
            stored: DataType::UInt(8),
            observed: DataType::Int(4),
        };
        assert_eq!(drift.to_string(), "KType changing for sdpa: UINT8 -> INT4");
    }

    #[test]
    fn unannotated_inputs_keep_their_datatype() {
        let mut cfg = config(MaskMode::None);
        let mut graph = InMemoryGraph::new().with_datatype("v", DataType::Int(4));
        let drifts =
            infer_node_datatype(&mut cfg, "sdpa", &names(&["q", "k", "v"]), "o", &mut graph)
                .unwrap();
        assert_eq!(drifts.len(), 1);
        assert_eq!(drifts[0].role, TensorRole::Value);
        assert_eq!(cfg.datatype(TensorRole::Query), DataType::UInt(8));
        assert_eq!(cfg.datatype(TensorRole::Value), DataType::Int(4));
    }

    #[test]
    fn causal_mask_is_not_a_graph_input() {
        let mut cfg = config(MaskMode::Causal);
        let mut graph = InMemoryGraph::new().with_datatype("m", DataType::Int(8));
        let drifts = infer_node_datatype(
            &mut cfg,
            "sdpa",
            &names(&["q", "k", "v", "m"]),
            "o",
            &mut graph,
        )
        .unwrap();
        assert!(drifts.is_empty());
        assert_eq!(cfg.datatype(TensorRole::Mask), DataType::Binary);
    }

    #[test]
    fn short_input_list_is_invalid() {
        let mut cfg = config(MaskMode::Input);
        let mut graph = InMemoryGraph::new();
        let err = infer_node_datatype(&mut cfg, "sdpa", &names(&["q", "k", "v"]), "o", &mut graph)
            .unwrap_err();
        assert!(matches!(
            err,
            AttentionError::InvalidConfig {
                field: "inputs",
                ..
            }
        ));
        assert!(graph.tensor_datatype("o").is_none());
    }
}
