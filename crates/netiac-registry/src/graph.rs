use std::collections::{HashMap, HashSet};

use netiac_domain::{Resource, ResourceId};
use petgraph::algo::{is_cyclic_directed, kosaraju_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::error::RegistryError;

/// A built dependency DAG plus its topological layering.
#[derive(Debug)]
pub struct ResolvedGraph {
    /// Flattened topological order (waves concatenated, each wave sorted
    /// ascending by id).
    pub topo_order: Vec<ResourceId>,
    /// Wave `k` contains exactly the resources whose predecessors all lie
    /// in waves `< k`.
    pub waves: Vec<Vec<ResourceId>>,
}

/// Builds a dependency DAG from a resource set's declared dependencies and
/// returns its topological wave layering.
///
/// A dependency target outside this resource set (e.g. a pre-existing
/// appliance object, or a `Delete` target not itself present in the desired
/// set passed here) produces no edge — it is resolved at apply time by the
/// engine instead, not during graph construction.
pub fn build_graph(resources: &[Resource]) -> Result<ResolvedGraph, RegistryError> {
    let mut graph: DiGraph<ResourceId, ()> = DiGraph::new();
    let mut index_of: HashMap<ResourceId, NodeIndex> = HashMap::new();

    for resource in resources {
        let id = resource.id();
        let idx = graph.add_node(id.clone());
        index_of.insert(id, idx);
    }

    for resource in resources {
        let from = index_of[&resource.id()];
        for dep in &resource.dependencies {
            if let Some(&to) = index_of.get(&dep.target_id) {
                // Edge points target -> dependent: the target must finish
                // before the dependent starts.
                graph.add_edge(to, from, ());
            }
        }
    }

    if is_cyclic_directed(&graph) {
        let mut participants: Vec<ResourceId> = Vec::new();
        for scc in kosaraju_scc(&graph) {
            if scc.len() > 1 {
                participants.extend(scc.into_iter().map(|n| graph[n].clone()));
            }
        }
        participants.sort();
        participants.dedup();
        return Err(RegistryError::Cycle { participants });
    }

    let waves = layer_waves(&graph);
    let topo_order = waves.iter().flatten().cloned().collect();
    Ok(ResolvedGraph { topo_order, waves })
}

/// Kahn's algorithm with an ascending-id tie-break within each wave, so
/// plans over a fixed input are reproducible byte-for-byte.
fn layer_waves(graph: &DiGraph<ResourceId, ()>) -> Vec<Vec<ResourceId>> {
    let mut indegree: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|n| (n, graph.neighbors_directed(n, Direction::Incoming).count()))
        .collect();
    let mut remaining: HashSet<NodeIndex> = graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
        let mut ready: Vec<NodeIndex> = remaining
            .iter()
            .copied()
            .filter(|n| indegree[n] == 0)
            .collect();
        ready.sort_by(|a, b| graph[*a].cmp(&graph[*b]));

        for n in &ready {
            remaining.remove(n);
        }
        for n in &ready {
            for succ in graph.neighbors_directed(*n, Direction::Outgoing) {
                if let Some(d) = indegree.get_mut(&succ) {
                    *d = d.saturating_sub(1);
                }
            }
        }
        waves.push(ready.into_iter().map(|n| graph[n].clone()).collect());
    }
    waves
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use netiac_domain::*;

    fn vlan(name: &str, tag: u16) -> Resource {
        Resource::new(
            name,
            ResourceKind::NetworkVlan(VlanProperties { interface: "igc1".into(), tag, description: None }),
            Utc::now(),
        )
    }

    fn haproxy_backend(name: &str) -> Resource {
        Resource::new(
            name,
            ResourceKind::ServicesHaproxyBackend(HaproxyBackendProperties {
                mode: HaproxyMode::Http,
                balance: HaproxyBalance::Roundrobin,
            }),
            Utc::now(),
        )
    }

    fn haproxy_server(name: &str, backend: &str) -> Resource {
        Resource::new(
            name,
            ResourceKind::ServicesHaproxyServer(HaproxyServerProperties {
                backend: backend.into(),
                address: "10.0.0.5".into(),
                port: 8080,
                ssl: false,
                check_enabled: true,
            }),
            Utc::now(),
        )
    }

    #[test]
    fn independent_resources_share_a_wave() {
        let resources = vec![vlan("a", 10), vlan("b", 20)];
        let resolved = build_graph(&resources).unwrap();
        assert_eq!(resolved.waves.len(), 1);
        assert_eq!(resolved.waves[0].len(), 2);
    }

    #[test]
    fn dependent_resources_land_in_successive_waves() {
        let resources = vec![haproxy_server("web-1", "web"), haproxy_backend("web")];
        let resolved = build_graph(&resources).unwrap();
        assert_eq!(resolved.waves.len(), 2);
        assert_eq!(resolved.waves[0], vec![ResourceId::new("services:haproxy:backend", "web")]);
        assert_eq!(resolved.waves[1], vec![ResourceId::new("services:haproxy:server", "web-1")]);
    }

    #[test]
    fn wave_members_are_sorted_ascending_by_id() {
        let resources = vec![vlan("z", 10), vlan("a", 20), vlan("m", 30)];
        let resolved = build_graph(&resources).unwrap();
        let ids: Vec<&str> = resolved.waves[0].iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["network:vlan/a", "network:vlan/m", "network:vlan/z"]);
    }

    #[test]
    fn cycle_names_every_participant() {
        let mut a = vlan("a", 10);
        let mut b = vlan("b", 20);
        a.dependencies.push(Dependency { target_id: b.id(), kind: DependencyKind::Hard });
        b.dependencies.push(Dependency { target_id: a.id(), kind: DependencyKind::Hard });
        let err = build_graph(&[a, b]).unwrap_err();
        match err {
            RegistryError::Cycle { participants } => {
                assert_eq!(participants.len(), 2);
                assert!(participants.contains(&ResourceId::new("network:vlan", "a")));
                assert!(participants.contains(&ResourceId::new("network:vlan", "b")));
            }
            other => panic!("expected Cycle, got {other:?}"),
        }
    }

    #[test]
    fn topo_order_is_deterministic_across_runs() {
        let resources = vec![haproxy_server("web-1", "web"), haproxy_backend("web"), vlan("guest", 100)];
        let first = build_graph(&resources).unwrap().topo_order;
        let second = build_graph(&resources).unwrap().topo_order;
        assert_eq!(first, second);
    }
}
