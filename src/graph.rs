use crate::constants::{PATH_GRAPH_DOT, PATH_GRAPH_PNG};
use crate::error::{ErrorFieldExt, ErrorKind, Result, ResultExt};
use crate::manifest::{AciManifest, FullyQualifiedName};
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeClass {
    Dependency,
    Builder,
    BuilderDependency,
    Tester,
    TesterDependency,
}

impl fmt::Display for EdgeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Dependency => "dependency",
            Self::Builder => "builder",
            Self::BuilderDependency => "builder dependency",
            Self::Tester => "tester builder",
            Self::TesterDependency => "tester dependency",
        };
        f.write_str(label)
    }
}

/// Image → dependency edges of one build manifest
pub struct DependencyGraph {
    graph: DiGraph<String, EdgeClass>,
    nodes: HashMap<String, NodeIndex>,
    root: NodeIndex,
}

impl DependencyGraph {
    pub fn from_manifest(manifest: &AciManifest, default_builder: &FullyQualifiedName) -> Self {
        let mut graph = DiGraph::new();
        let root_name = manifest.name_and_version.to_string();
        let root = graph.add_node(root_name.clone());
        let mut this = Self {
            graph,
            nodes: HashMap::from([(root_name, root)]),
            root,
        };

        for dep in &manifest.aci.dependencies {
            this.link(dep, EdgeClass::Dependency);
        }
        this.link(&manifest.builder.image_or(default_builder), EdgeClass::Builder);
        for dep in &manifest.builder.dependencies {
            this.link(dep, EdgeClass::BuilderDependency);
        }
        if let Some(tester) = &manifest.tester {
            this.link(&tester.builder.image_or(default_builder), EdgeClass::Tester);
            for dep in tester
                .builder
                .dependencies
                .iter()
                .chain(&tester.aci.dependencies)
            {
                this.link(dep, EdgeClass::TesterDependency);
            }
        }
        this
    }

    fn link(&mut self, target: &FullyQualifiedName, class: EdgeClass) {
        let name = target.to_string();
        let graph = &mut self.graph;
        let node = *self
            .nodes
            .entry(name.clone())
            .or_insert_with(|| graph.add_node(name));
        self.graph.add_edge(self.root, node, class);
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn to_dot(&self) -> String {
        format!("{}", Dot::new(&self.graph))
    }

    /// Write `graph.dot` into `dir`, then render `graph.png` with graphviz when available.
    pub async fn write(&self, dir: &Path) -> Result<PathBuf> {
        let dot_path = dir.join(PATH_GRAPH_DOT);
        tokio::fs::write(&dot_path, self.to_dot())
            .await
            .err_ctx(ErrorKind::Filesystem, "Failed to write graph")
            .field("path", dot_path.display())?;

        let png_path = dir.join(PATH_GRAPH_PNG);
        let rendered = tokio::process::Command::new("dot")
            .arg("-Tpng")
            .arg(&dot_path)
            .arg("-o")
            .arg(&png_path)
            .status()
            .await;
        match rendered {
            Ok(status) if status.success() => {
                tracing::debug!(path = %png_path.display(), "Graph rendered")
            }
            Ok(status) => {
                tracing::warn!(status = %status, "Graphviz failed to render graph")
            }
            Err(e) => tracing::warn!(error = %e, "Graphviz not available, graph.png not rendered"),
        }
        Ok(dot_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::render;

    #[test]
    fn test_edges_by_class_with_shared_nodes() {
        let manifest = render(
            "name: example.com/app:1\naci:\n  dependencies: ['example.com/base:2']\nbuilder:\n  dependencies: ['example.com/base:2', 'example.com/go:1.21']\n",
        )
        .unwrap();
        let builder: FullyQualifiedName = "acibuild.io/aci-builder".parse().unwrap();
        let graph = DependencyGraph::from_manifest(&manifest, &builder);

        // app, base, builder, go
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 4);
        let dot = graph.to_dot();
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("builder dependency"));
        assert!(dot.contains("example.com/go:1.21"));
    }
}
