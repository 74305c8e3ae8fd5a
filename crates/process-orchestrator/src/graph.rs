//! Dependency validation and launch ordering
//!
//! The launch order is computed with Kahn's algorithm. Among services whose
//! dependencies have all been placed, the one declared first wins, so the
//! order is deterministic and matches the declaration order whenever the
//! declarations are already topologically sorted.

use crate::error::ConfigError;
use crate::spec::ServiceSpec;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Validate a service set and return its launch order as indices into `specs`
pub fn launch_order(specs: &[ServiceSpec]) -> Result<Vec<usize>, ConfigError> {
    let mut index = HashMap::with_capacity(specs.len());
    for (i, spec) in specs.iter().enumerate() {
        if index.insert(spec.name.as_str(), i).is_some() {
            return Err(ConfigError::DuplicateName(spec.name.clone()));
        }
    }

    // dependents[d] lists the services waiting on d
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];
    let mut in_degree = vec![0usize; specs.len()];
    for (i, spec) in specs.iter().enumerate() {
        for dep in &spec.depends_on {
            let &d = index
                .get(dep.as_str())
                .ok_or_else(|| ConfigError::UnknownDependency {
                    service: spec.name.clone(),
                    dependency: dep.clone(),
                })?;
            dependents[d].push(i);
            in_degree[i] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(specs.len());

    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for &dependent in &dependents[node] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() != specs.len() {
        return Err(ConfigError::DependencyCycle(find_cycle(
            specs, &index, &in_degree,
        )));
    }

    Ok(order)
}

/// Walk unresolved dependency edges until a node repeats.
///
/// Every service left with a positive in-degree after Kahn's pass still has
/// at least one unresolved dependency, so the walk always closes a loop.
fn find_cycle(
    specs: &[ServiceSpec],
    index: &HashMap<&str, usize>,
    in_degree: &[usize],
) -> Vec<String> {
    let Some(start) = in_degree.iter().position(|degree| *degree > 0) else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut seen = HashSet::from([start]);
    let mut current = start;

    loop {
        let next = specs[current]
            .depends_on
            .iter()
            .filter_map(|dep| index.get(dep.as_str()).copied())
            .find(|&d| in_degree[d] > 0);

        let Some(next) = next else {
            break;
        };

        if !seen.insert(next) {
            let begin = path.iter().position(|&n| n == next).unwrap_or(0);
            let mut cycle: Vec<String> = path[begin..]
                .iter()
                .map(|&n| specs[n].name.clone())
                .collect();
            cycle.push(specs[next].name.clone());
            return cycle;
        }

        path.push(next);
        current = next;
    }

    path.into_iter().map(|n| specs[n].name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, deps: &[&str]) -> ServiceSpec {
        deps.iter()
            .fold(ServiceSpec::builder(name, "true"), |b, d| b.depends_on(*d))
            .build()
    }

    fn names(specs: &[ServiceSpec], order: &[usize]) -> Vec<String> {
        order.iter().map(|&i| specs[i].name.clone()).collect()
    }

    fn assert_topological(specs: &[ServiceSpec], order: &[usize]) {
        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(pos, &i)| (specs[i].name.as_str(), pos))
            .collect();
        assert_eq!(position.len(), specs.len());
        for s in specs {
            for dep in &s.depends_on {
                assert!(
                    position[dep.as_str()] < position[s.name.as_str()],
                    "{} must launch before {}",
                    dep,
                    s.name
                );
            }
        }
    }

    #[test]
    fn test_declaration_order_is_kept_when_valid() {
        let specs = vec![
            spec("cache", &[]),
            spec("worker", &["cache"]),
            spec("backend", &["cache"]),
            spec("frontend", &["backend"]),
        ];
        let order = launch_order(&specs).unwrap();
        assert_eq!(
            names(&specs, &order),
            vec!["cache", "worker", "backend", "frontend"]
        );
    }

    #[test]
    fn test_dependencies_are_hoisted() {
        let specs = vec![
            spec("frontend", &["backend"]),
            spec("backend", &["cache", "worker"]),
            spec("worker", &["cache"]),
            spec("cache", &[]),
            spec("standalone", &[]),
        ];
        let order = launch_order(&specs).unwrap();
        assert_topological(&specs, &order);
        assert_eq!(
            names(&specs, &order),
            vec!["cache", "worker", "backend", "frontend", "standalone"]
        );
    }

    #[test]
    fn test_diamond() {
        let specs = vec![
            spec("d", &["b", "c"]),
            spec("b", &["a"]),
            spec("c", &["a"]),
            spec("a", &[]),
        ];
        let order = launch_order(&specs).unwrap();
        assert_topological(&specs, &order);
    }

    #[test]
    fn test_empty_set() {
        assert!(launch_order(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_name() {
        let specs = vec![spec("api", &[]), spec("api", &[])];
        assert_eq!(
            launch_order(&specs),
            Err(ConfigError::DuplicateName("api".to_string()))
        );
    }

    #[test]
    fn test_two_node_cycle() {
        let specs = vec![spec("a", &["b"]), spec("b", &["a"])];
        match launch_order(&specs) {
            Err(ConfigError::DependencyCycle(cycle)) => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 3);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let specs = vec![spec("a", &["a"])];
        assert_eq!(
            launch_order(&specs),
            Err(ConfigError::DependencyCycle(vec![
                "a".to_string(),
                "a".to_string()
            ]))
        );
    }

    #[test]
    fn test_cycle_behind_valid_prefix() {
        let specs = vec![
            spec("root", &[]),
            spec("x", &["root", "z"]),
            spec("y", &["x"]),
            spec("z", &["y"]),
        ];
        match launch_order(&specs) {
            Err(ConfigError::DependencyCycle(cycle)) => {
                assert!(!cycle.contains(&"root".to_string()));
                assert_eq!(cycle.len(), 4);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_dependency() {
        let specs = vec![spec("worker", &["redis"])];
        assert_eq!(
            launch_order(&specs),
            Err(ConfigError::UnknownDependency {
                service: "worker".to_string(),
                dependency: "redis".to_string(),
            })
        );
    }
}
