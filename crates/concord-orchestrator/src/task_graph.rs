use crate::types::{Priority, Task};
use concord_core::{ConcordError, ConcordResult};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// A validated batch of tasks with its dependency edges.
///
/// Building the graph rejects duplicate IDs, dependencies on tasks outside
/// the batch, and cycles, so a graph that exists can always be ordered.
#[derive(Debug)]
pub struct TaskGraph<'a> {
    tasks: &'a [Task],
    /// Distinct dependency indices per task.
    deps: Vec<Vec<usize>>,
}

impl<'a> TaskGraph<'a> {
    /// Validate a batch: unique IDs, known dependencies, no cycles.
    pub fn build(tasks: &'a [Task]) -> ConcordResult<Self> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            if index.insert(task.id.as_str(), i).is_some() {
                return Err(ConcordError::DuplicateTask(task.id.clone()));
            }
        }

        let mut deps = Vec::with_capacity(tasks.len());
        for task in tasks {
            let mut seen = HashSet::new();
            let mut edges = Vec::with_capacity(task.dependencies.len());
            for dep in &task.dependencies {
                let Some(&d) = index.get(dep.as_str()) else {
                    return Err(ConcordError::UnknownDependency {
                        task_id: task.id.clone(),
                        dependency: dep.clone(),
                    });
                };
                if seen.insert(d) {
                    edges.push(d);
                }
            }
            deps.push(edges);
        }

        let graph = Self { tasks, deps };
        if let Some(at) = graph.find_cycle() {
            return Err(ConcordError::CyclicDependency {
                task_id: tasks[at].id.clone(),
            });
        }
        Ok(graph)
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the batch has no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Index of a task on a dependency cycle, if any.
    fn find_cycle(&self) -> Option<usize> {
        let mut marks = vec![0u8; self.tasks.len()];
        (0..self.tasks.len()).find_map(|i| self.dfs_cycle(i, &mut marks))
    }

    fn dfs_cycle(&self, i: usize, marks: &mut [u8]) -> Option<usize> {
        match marks[i] {
            1 => return Some(i), // back edge
            2 => return None,
            _ => {}
        }
        marks[i] = 1;
        for &d in &self.deps[i] {
            if let Some(at) = self.dfs_cycle(d, marks) {
                return Some(at);
            }
        }
        marks[i] = 2;
        None
    }

    /// Topological order; among tasks whose dependencies are all placed, the
    /// highest priority goes first and input order breaks ties.
    pub fn execution_order(&self) -> Vec<&'a Task> {
        let n = self.tasks.len();
        let mut pending: Vec<usize> = self.deps.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, edges) in self.deps.iter().enumerate() {
            for &d in edges {
                dependents[d].push(i);
            }
        }

        let mut ready: BinaryHeap<(Priority, Reverse<usize>)> = pending
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count == 0)
            .map(|(i, _)| (self.tasks[i].priority, Reverse(i)))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some((_, Reverse(i))) = ready.pop() {
            order.push(&self.tasks[i]);
            for &next in &dependents[i] {
                pending[next] -= 1;
                if pending[next] == 0 {
                    ready.push((self.tasks[next].priority, Reverse(next)));
                }
            }
        }
        order
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn task(id: &str) -> Task {
        Task::new(id, "agent", format!("do {id}"))
    }

    fn ids(order: &[&Task]) -> Vec<String> {
        order.iter().map(|t| t.id.clone()).collect()
    }

    #[test]
    fn test_empty_batch() {
        let tasks: Vec<Task> = Vec::new();
        let graph = TaskGraph::build(&tasks).unwrap();
        assert!(graph.is_empty());
        assert!(graph.execution_order().is_empty());
    }

    #[test]
    fn test_chain_order() {
        let tasks = vec![
            task("t3").with_dependencies(["t2"]),
            task("t1"),
            task("t2").with_dependencies(["t1"]),
        ];
        let graph = TaskGraph::build(&tasks).unwrap();
        assert_eq!(ids(&graph.execution_order()), vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn test_priority_breaks_ties() {
        let tasks = vec![
            task("low").with_priority(Priority::Low),
            task("crit").with_priority(Priority::Critical),
            task("med-a"),
            task("med-b"),
            task("high").with_priority(Priority::High),
        ];
        let graph = TaskGraph::build(&tasks).unwrap();
        assert_eq!(
            ids(&graph.execution_order()),
            vec!["crit", "high", "med-a", "med-b", "low"]
        );
    }

    #[test]
    fn test_dependency_beats_priority() {
        let tasks = vec![
            task("base").with_priority(Priority::Low),
            task("urgent")
                .with_priority(Priority::Critical)
                .with_dependencies(["base"]),
            task("other").with_priority(Priority::Medium),
        ];
        let graph = TaskGraph::build(&tasks).unwrap();
        // "urgent" only becomes ready after "base", then outranks "other".
        assert_eq!(ids(&graph.execution_order()), vec!["other", "base", "urgent"]);
    }

    #[test]
    fn test_diamond_each_task_once() {
        let tasks = vec![
            task("a"),
            task("b").with_dependencies(["a"]),
            task("c").with_dependencies(["a"]),
            task("d").with_dependencies(["b", "c", "b"]),
        ];
        let order = TaskGraph::build(&tasks).unwrap().execution_order();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0].id, "a");
        assert_eq!(order[3].id, "d");
    }

    #[test]
    fn test_cycle_rejected() {
        let tasks = vec![
            task("a").with_dependencies(["c"]),
            task("b").with_dependencies(["a"]),
            task("c").with_dependencies(["b"]),
        ];
        assert!(matches!(
            TaskGraph::build(&tasks),
            Err(ConcordError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let tasks = vec![task("a").with_dependencies(["a"])];
        match TaskGraph::build(&tasks) {
            Err(ConcordError::CyclicDependency { task_id }) => assert_eq!(task_id, "a"),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let tasks = vec![task("a").with_dependencies(["ghost"])];
        match TaskGraph::build(&tasks) {
            Err(ConcordError::UnknownDependency {
                task_id,
                dependency,
            }) => {
                assert_eq!(task_id, "a");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("expected unknown dependency, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let tasks = vec![task("a"), task("a")];
        assert!(matches!(
            TaskGraph::build(&tasks),
            Err(ConcordError::DuplicateTask(id)) if id == "a"
        ));
    }
}
