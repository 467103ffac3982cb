use std::collections::HashMap;

use thiserror::Error;

use super::model::ServiceConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first topological sort over `depends_on`.
///
/// Independent services keep their declaration order. Dependencies naming a
/// service outside `services` are ignored.
pub fn start_order(services: &[ServiceConfig]) -> Result<Vec<ServiceConfig>, OrderError> {
    let index: HashMap<&str, usize> = services
        .iter()
        .enumerate()
        .map(|(position, service)| (service.name.as_str(), position))
        .collect();
    let mut marks: Vec<Option<Mark>> = vec![None; services.len()];
    let mut path = Vec::new();
    let mut ordered = Vec::with_capacity(services.len());
    for position in 0..services.len() {
        visit(position, services, &index, &mut marks, &mut path, &mut ordered)?;
    }
    Ok(ordered.into_iter().map(|i| services[i].clone()).collect())
}

/// Teardown order: the exact reverse of [`start_order`].
pub fn stop_order(services: &[ServiceConfig]) -> Result<Vec<ServiceConfig>, OrderError> {
    let mut ordered = start_order(services)?;
    ordered.reverse();
    Ok(ordered)
}

fn visit(
    position: usize,
    services: &[ServiceConfig],
    index: &HashMap<&str, usize>,
    marks: &mut [Option<Mark>],
    path: &mut Vec<usize>,
    ordered: &mut Vec<usize>,
) -> Result<(), OrderError> {
    match marks[position] {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = path.iter().position(|&p| p == position).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..]
                .iter()
                .map(|&p| services[p].name.clone())
                .collect();
            cycle.push(services[position].name.clone());
            return Err(OrderError::Cycle(cycle));
        }
        None => {}
    }
    marks[position] = Some(Mark::Visiting);
    path.push(position);
    for dependency in &services[position].depends_on {
        match index.get(dependency.as_str()) {
            Some(&target) => visit(target, services, index, marks, path, ordered)?,
            None => log::debug!(
                "'{}' depends on '{}' which is not part of this profile",
                services[position].name,
                dependency
            ),
        }
    }
    path.pop();
    marks[position] = Some(Mark::Done);
    ordered.push(position);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(services: &[ServiceConfig]) -> Vec<&str> {
        services.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn dependency_moves_after_its_target() {
        let services = vec![
            ServiceConfig::new("A"),
            ServiceConfig::new("B").depends_on(&["A"]),
            ServiceConfig::new("C"),
        ];
        assert_eq!(names(&start_order(&services).unwrap()), vec!["A", "B", "C"]);
    }

    #[test]
    fn forward_dependency_is_started_first() {
        let services = vec![
            ServiceConfig::new("A").depends_on(&["B"]),
            ServiceConfig::new("B"),
        ];
        assert_eq!(names(&start_order(&services).unwrap()), vec!["B", "A"]);
    }

    #[test]
    fn unknown_dependencies_are_ignored() {
        let services = vec![
            ServiceConfig::new("A").depends_on(&["external"]),
            ServiceConfig::new("B"),
        ];
        assert_eq!(names(&start_order(&services).unwrap()), vec!["A", "B"]);
    }

    #[test]
    fn diamond_keeps_declaration_order_for_ties() {
        let services = vec![
            ServiceConfig::new("app").depends_on(&["cache", "db"]),
            ServiceConfig::new("db").depends_on(&["net"]),
            ServiceConfig::new("cache").depends_on(&["net"]),
            ServiceConfig::new("net"),
        ];
        assert_eq!(
            names(&start_order(&services).unwrap()),
            vec!["net", "cache", "db", "app"]
        );
    }

    #[test]
    fn stop_order_is_reverse_of_start_order() {
        let services = vec![
            ServiceConfig::new("driver"),
            ServiceConfig::new("planner").depends_on(&["driver", "map"]),
            ServiceConfig::new("map"),
            ServiceConfig::new("ui"),
        ];
        let mut start = names(&start_order(&services).unwrap())
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        start.reverse();
        let stop = stop_order(&services).unwrap();
        assert_eq!(names(&stop), start);
    }

    #[test]
    fn cycles_are_reported() {
        let services = vec![
            ServiceConfig::new("A").depends_on(&["B"]),
            ServiceConfig::new("B").depends_on(&["C"]),
            ServiceConfig::new("C").depends_on(&["A"]),
        ];
        assert_eq!(
            start_order(&services).unwrap_err(),
            OrderError::Cycle(vec!["A".into(), "B".into(), "C".into(), "A".into()])
        );
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let services = vec![ServiceConfig::new("A").depends_on(&["A"])];
        assert!(start_order(&services).is_err());
    }

    #[test]
    fn empty_input_orders_to_empty() {
        assert!(start_order(&[]).unwrap().is_empty());
    }
}
