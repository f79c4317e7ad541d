//! 节点依赖图和拓扑排序
//!
//! 边表的形式为 `节点 -> [上游节点]`，排序使用 Kahn 算法，
//! 入度为 0 的节点按插入顺序进入队列，因此结果是确定的。

use std::collections::VecDeque;

use indexmap::IndexMap;

use crate::error::{GraphError, GraphResult};

/// 以节点索引表示的依赖图
pub struct DependencyGraph {
    node_count: usize,
    /// 出边：producer -> [consumer]
    adjacency: Vec<Vec<usize>>,
    in_degrees: Vec<usize>,
}

impl DependencyGraph {
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            adjacency: vec![Vec::new(); node_count],
            in_degrees: vec![0; node_count],
        }
    }

    /// 由名字形式的边表构建
    ///
    /// # 参数
    /// - `nodes`: 所有节点的名字，顺序即插入顺序
    /// - `edges`: 节点 -> 它依赖的上游节点
    pub fn from_edges(nodes: &[&str], edges: &IndexMap<String, Vec<String>>) -> GraphResult<Self> {
        let index_of = |name: &str| nodes.iter().position(|node| *node == name);

        let mut graph = Self::new(nodes.len());
        for (node, dependencies) in edges {
            let consumer = index_of(node).ok_or_else(|| GraphError::UnknownNode(node.clone()))?;
            for dependency in dependencies {
                let producer = index_of(dependency).ok_or_else(|| GraphError::UnknownDependency {
                    node: node.clone(),
                    dependency: dependency.clone(),
                })?;
                graph.add_edge(producer, consumer);
            }
        }
        Ok(graph)
    }

    /// 添加依赖边，producer 先于 consumer 执行
    pub fn add_edge(&mut self, producer: usize, consumer: usize) {
        // 避免重复边
        if !self.adjacency[producer].contains(&consumer) {
            self.adjacency[producer].push(consumer);
            self.in_degrees[consumer] += 1;
        }
    }

    /// # 返回
    /// - `Ok(order)`: 拓扑排序后的节点索引
    /// - `Err(remaining)`: 存在环，返回没能进入排序结果的节点
    pub fn topological_sort(&self) -> Result<Vec<usize>, Vec<usize>> {
        let mut in_degrees = self.in_degrees.clone();
        let mut queue: VecDeque<usize> = (0..self.node_count).filter(|&i| in_degrees[i] == 0).collect();
        let mut result = Vec::with_capacity(self.node_count);

        while let Some(node) = queue.pop_front() {
            result.push(node);
            for &next in &self.adjacency[node] {
                in_degrees[next] -= 1;
                if in_degrees[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if result.len() == self.node_count {
            Ok(result)
        } else {
            Err((0..self.node_count).filter(|&i| in_degrees[i] > 0).collect())
        }
    }
}

/// 名字形式的拓扑排序，环会被转换为 [`GraphError::Cycle`]
pub fn topological_order(nodes: &[&str], edges: &IndexMap<String, Vec<String>>) -> GraphResult<Vec<usize>> {
    DependencyGraph::from_edges(nodes, edges)?
        .topological_sort()
        .map_err(|remaining| GraphError::Cycle(remaining.into_iter().map(|i| nodes[i].to_string()).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(pairs: &[(&str, &[&str])]) -> IndexMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(node, deps)| (node.to_string(), deps.iter().map(|d| d.to_string()).collect()))
            .collect()
    }

    #[test]
    fn fire_graph_order() {
        let nodes = ["FireObject", "Field", "HDRToSDR", "UI", "Record"];
        let edges = edges(&[
            ("Field", &["FireObject"]),
            ("HDRToSDR", &["Field"]),
            ("Record", &["HDRToSDR"]),
            ("UI", &["Record", "HDRToSDR"]),
        ]);

        let order = topological_order(&nodes, &edges).unwrap();
        let names: Vec<_> = order.iter().map(|&i| nodes[i]).collect();
        assert_eq!(names, vec!["FireObject", "Field", "HDRToSDR", "Record", "UI"]);
    }

    #[test]
    fn every_dependency_runs_first() {
        let nodes = ["d", "c", "b", "a"];
        let edges = edges(&[("d", &["c", "b"]), ("c", &["a"]), ("b", &["a"])]);

        let order = topological_order(&nodes, &edges).unwrap();
        let position = |name: &str| order.iter().position(|&i| nodes[i] == name).unwrap();
        for (node, deps) in &edges {
            for dep in deps {
                assert!(position(dep) < position(node), "{dep} must run before {node}");
            }
        }
        assert_eq!(order.len(), nodes.len());
    }

    #[test]
    fn frontier_keeps_insertion_order() {
        let nodes = ["second", "first", "last"];
        let edges = edges(&[("last", &["first", "second"])]);
        let order = topological_order(&nodes, &edges).unwrap();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn cycle_fails() {
        let nodes = ["root", "a", "b", "c"];
        let edges = edges(&[("a", &["c", "root"]), ("b", &["a"]), ("c", &["b"])]);

        let err = topological_order(&nodes, &edges).unwrap_err();
        let GraphError::Cycle(remaining) = err else {
            panic!("expected a cycle error, got {err:?}");
        };
        assert_eq!(remaining, vec!["a", "b", "c"]);
    }

    #[test]
    fn unknown_names_fail() {
        let nodes = ["a"];
        assert!(matches!(
            topological_order(&nodes, &edges(&[("a", &["ghost"])])),
            Err(GraphError::UnknownDependency { .. })
        ));
        assert!(matches!(topological_order(&nodes, &edges(&[("ghost", &["a"])])), Err(GraphError::UnknownNode(_))));
    }
}
