use std::collections::{HashMap, HashSet, VecDeque};

use std::fmt;

use thiserror::Error;

/// The dependency graph over service names (spec §4.5).
///
/// An edge is stored as `name -> depends_on` exactly as declared in
/// configuration. Per §9's canonical resolution of the source material's
/// ambiguity: `u.depends_on = [v]` means `v` is a prerequisite of `u`, i.e.
/// `u` enters `Starting` only after `v` has reached `Healthy`.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    depends_on: HashMap<String, Vec<String>>,
}

#[derive(Error, Debug, PartialEq)]
pub enum GraphError {
    /// Names one edge set of a cycle found in the graph (spec §4.5 step 1,
    /// §8 scenario 5).
    Cycle(Vec<(String, String)>),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::Cycle(edges) => {
                write!(f, "dependency cycle detected: ")?;
                let rendered = edges
                    .iter()
                    .map(|(from, to)| format!("{from} -> {to}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                f.write_str(&rendered)
            }
        }
    }
}

impl Graph {
    pub fn new(depends_on: HashMap<String, Vec<String>>) -> Self {
        Self { depends_on }
    }

    pub fn prerequisites(&self, name: &str) -> &[String] {
        self.depends_on
            .get(name)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.depends_on.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.depends_on.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depends_on.is_empty()
    }

    /// Nodes `name` is itself a prerequisite of.
    pub fn dependents_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.depends_on
            .iter()
            .filter(move |(_, deps)| deps.iter().any(|d| d == name))
            .map(|(node, _)| node.as_str())
    }

    /// Kahn's algorithm: returns nodes in an order where every prerequisite
    /// precedes its dependents (spec §4.5 step 2). Ties are broken
    /// alphabetically for deterministic output. Errors with one cycle's edge
    /// set if the graph is not a DAG.
    pub fn topo_order(&self) -> Result<Vec<String>, GraphError> {
        let mut in_degree: HashMap<&str, usize> = self
            .depends_on
            .keys()
            .map(|k| (k.as_str(), self.depends_on[k].len()))
            .collect();

        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for (node, deps) in &self.depends_on {
            for dep in deps {
                dependents.entry(dep.as_str()).or_default().push(node);
            }
        }

        let mut ready: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &c)| c == 0)
            .map(|(&k, _)| k)
            .collect();
        ready.sort_unstable();
        let mut queue: VecDeque<&str> = ready.into();

        let mut order = Vec::with_capacity(self.depends_on.len());
        while let Some(node) = queue.pop_front() {
            order.push(node.to_string());

            if let Some(downstream) = dependents.get(node) {
                let mut newly_ready: Vec<&str> = Vec::new();
                for &d in downstream {
                    let entry = in_degree.get_mut(d).expect("dependent is a known node");
                    *entry -= 1;
                    if *entry == 0 {
                        newly_ready.push(d);
                    }
                }
                newly_ready.sort_unstable();
                queue.extend(newly_ready);
            }
        }

        if order.len() != self.depends_on.len() {
            let stuck: Vec<String> = in_degree
                .iter()
                .filter(|(_, &c)| c > 0)
                .map(|(&k, _)| k.to_string())
                .collect();
            return Err(GraphError::Cycle(self.find_one_cycle(&stuck)));
        }

        Ok(order)
    }

    /// DFS over the subgraph induced by `candidates` (every node still owing
    /// an unresolved prerequisite after Kahn's algorithm stalls) to recover
    /// one concrete cycle's edges for the error message.
    fn find_one_cycle(&self, candidates: &[String]) -> Vec<(String, String)> {
        let candidate_set: HashSet<&str> = candidates.iter().map(String::as_str).collect();
        let mut visited: HashSet<&str> = HashSet::new();

        for start in candidates {
            if visited.contains(start.as_str()) {
                continue;
            }
            let mut path: Vec<&str> = Vec::new();
            let mut on_path: HashSet<&str> = HashSet::new();
            if let Some(cycle) =
                self.dfs_find_cycle(start, &candidate_set, &mut visited, &mut on_path, &mut path)
            {
                return cycle;
            }
        }
        Vec::new()
    }

    fn dfs_find_cycle<'a>(
        &'a self,
        node: &'a str,
        candidates: &HashSet<&'a str>,
        visited: &mut HashSet<&'a str>,
        on_path: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<(String, String)>> {
        visited.insert(node);
        on_path.insert(node);
        path.push(node);

        for dep in self.prerequisites(node) {
            let dep = dep.as_str();
            if !candidates.contains(dep) {
                continue;
            }
            if on_path.contains(dep) {
                let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                let mut edges = Vec::new();
                for window in path[start..].windows(2) {
                    edges.push((window[0].to_string(), window[1].to_string()));
                }
                edges.push((
                    path.last().copied().unwrap_or(dep).to_string(),
                    dep.to_string(),
                ));
                return Some(edges);
            }
            if !visited.contains(dep) {
                if let Some(cycle) = self.dfs_find_cycle(dep, candidates, visited, on_path, path) {
                    return Some(cycle);
                }
            }
        }

        path.pop();
        on_path.remove(node);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> Graph {
        let map = edges
            .iter()
            .map(|(name, deps)| {
                (
                    name.to_string(),
                    deps.iter().map(|d| d.to_string()).collect(),
                )
            })
            .collect();
        Graph::new(map)
    }

    #[test]
    fn linear_chain_orders_prerequisites_first() {
        // A <- B <- C: C depends on B depends on A.
        let g = graph(&[("a", &[]), ("b", &["a"]), ("c", &["b"])]);
        assert_eq!(g.topo_order().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn fan_out_keeps_independent_branches_unordered_between_each_other() {
        let g = graph(&[("a", &[]), ("b", &["a"]), ("c", &["a"]), ("d", &["a"])]);
        let order = g.topo_order().unwrap();
        assert_eq!(order[0], "a");
        let mut rest = order[1..].to_vec();
        rest.sort();
        assert_eq!(rest, vec!["b", "c", "d"]);
    }

    #[test]
    fn direct_cycle_is_rejected() {
        let g = graph(&[("a", &["b"]), ("b", &["a"])]);
        let err = g.topo_order().unwrap_err();
        let GraphError::Cycle(edges) = err;
        assert_eq!(edges.len(), 2);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let g = graph(&[("a", &["a"])]);
        assert!(matches!(g.topo_order(), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn dependents_of_reports_reverse_edges() {
        let g = graph(&[("a", &[]), ("b", &["a"]), ("c", &["a"])]);
        let mut dependents: Vec<&str> = g.dependents_of("a").collect();
        dependents.sort_unstable();
        assert_eq!(dependents, vec!["b", "c"]);
    }
}
