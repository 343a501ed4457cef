//! Task dependency graph.
//!
//! A graph is built once from `(name, action, upstream names)` entries and
//! validated at construction: names are unique, every dependency exists and
//! there is no cycle. Nodes are stored in a deterministic topological order
//! (Kahn's algorithm, ties broken by declaration order), so a node's index is
//! also its execution rank.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::pipeline::task::TaskAction;

/// One task in the graph.
pub struct TaskNode {
    name: String,
    upstream: Vec<usize>,
    downstream: Vec<usize>,
    action: Arc<dyn TaskAction>,
}

impl TaskNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Indices of direct upstream tasks
    pub fn upstream(&self) -> &[usize] {
        &self.upstream
    }

    /// Indices of direct downstream tasks
    pub fn downstream(&self) -> &[usize] {
        &self.downstream
    }

    pub fn action(&self) -> Arc<dyn TaskAction> {
        Arc::clone(&self.action)
    }

    /// A node with more than one upstream task waits for all of them
    pub fn is_join_point(&self) -> bool {
        self.upstream.len() > 1
    }
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("name", &self.name)
            .field("upstream", &self.upstream)
            .field("downstream", &self.downstream)
            .finish()
    }
}

/// A validated, topologically ordered task graph
#[derive(Debug)]
pub struct TaskGraph {
    name: String,
    nodes: Vec<TaskNode>,
    index: HashMap<String, usize>,
}

impl TaskGraph {
    pub fn builder(name: impl Into<String>) -> TaskGraphBuilder {
        TaskGraphBuilder {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in execution order
    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &TaskNode {
        &self.nodes[index]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Names of a node's direct upstream tasks
    pub fn upstream_names(&self, index: usize) -> Vec<String> {
        self.nodes[index]
            .upstream
            .iter()
            .map(|&u| self.nodes[u].name.clone())
            .collect()
    }

    /// Every task reachable from `name` through downstream edges, excluding itself
    pub fn descendants(&self, name: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let Some(start) = self.index_of(name) else {
            return seen;
        };
        let mut stack: Vec<usize> = self.nodes[start].downstream.clone();
        while let Some(i) = stack.pop() {
            if seen.insert(self.nodes[i].name.clone()) {
                stack.extend(self.nodes[i].downstream.iter().copied());
            }
        }
        seen
    }
}

struct Entry {
    name: String,
    dependencies: Vec<String>,
    action: Arc<dyn TaskAction>,
}

/// Collects task declarations; validation happens in [`TaskGraphBuilder::build`].
pub struct TaskGraphBuilder {
    name: String,
    entries: Vec<Entry>,
}

impl TaskGraphBuilder {
    /// Declare a task with its upstream dependencies.
    pub fn task<A>(self, name: impl Into<String>, action: A, dependencies: &[&str]) -> Self
    where
        A: TaskAction + 'static,
    {
        self.task_arc(name, Arc::new(action), dependencies)
    }

    pub fn task_arc(
        mut self,
        name: impl Into<String>,
        action: Arc<dyn TaskAction>,
        dependencies: &[&str],
    ) -> Self {
        self.entries.push(Entry {
            name: name.into(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            action,
        });
        self
    }

    pub fn build(self) -> Result<TaskGraph> {
        let mut position: HashMap<String, usize> = HashMap::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if position.insert(entry.name.clone(), i).is_some() {
                return Err(PipelineError::DuplicateTask(entry.name.clone()));
            }
        }

        // Declaration-index adjacency
        let n = self.entries.len();
        let mut upstream: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, entry) in self.entries.iter().enumerate() {
            for dep in &entry.dependencies {
                let &d = position.get(dep).ok_or_else(|| PipelineError::UnknownDependency {
                    task: entry.name.clone(),
                    dependency: dep.clone(),
                })?;
                if !upstream[i].contains(&d) {
                    upstream[i].push(d);
                    downstream[d].push(i);
                }
            }
        }

        // Kahn: repeatedly take the earliest-declared node with no unresolved upstream
        let mut in_degree: Vec<usize> = upstream.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &d in &downstream[i] {
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    ready.insert(d);
                }
            }
        }

        if order.len() < n {
            let tasks = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.entries[i].name.clone())
                .collect();
            return Err(PipelineError::Cycle { tasks });
        }

        // Re-index so that node index == topological rank
        let mut rank = vec![0usize; n];
        for (r, &i) in order.iter().enumerate() {
            rank[i] = r;
        }
        let mut slots: Vec<Option<Entry>> = self.entries.into_iter().map(Some).collect();
        let mut nodes = Vec::with_capacity(n);
        for &i in &order {
            let Some(entry) = slots[i].take() else {
                continue;
            };
            let mut up: Vec<usize> = upstream[i].iter().map(|&u| rank[u]).collect();
            let mut down: Vec<usize> = downstream[i].iter().map(|&d| rank[d]).collect();
            up.sort_unstable();
            down.sort_unstable();
            nodes.push(TaskNode {
                name: entry.name,
                upstream: up,
                downstream: down,
                action: entry.action,
            });
        }

        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.name.clone(), i))
            .collect();

        Ok(TaskGraph {
            name: self.name,
            nodes,
            index,
        })
    }
}
