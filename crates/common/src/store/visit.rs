//! Tree walks over the node arena
//!
//! Both walks visit children in key order. Neither includes the synthetic
//!  root: starting at the root yields every real node.

use std::collections::HashMap;

use crate::path::Path;

use super::node::Node;

/// Parents before children
pub(crate) fn pre_order(nodes: &HashMap<Path, Node>, start: &Path) -> Vec<Path> {
    let mut out = Vec::new();
    let mut stack = vec![start.clone()];
    while let Some(path) = stack.pop() {
        let Some(node) = nodes.get(&path) else {
            continue;
        };
        // reversed so the smallest key is popped first
        let mut children: Vec<Path> = node.children().collect();
        children.reverse();
        stack.extend(children);
        if !path.is_root() {
            out.push(path);
        }
    }
    out
}

/// Children before parents, deepest first within each branch
pub(crate) fn post_order(nodes: &HashMap<Path, Node>, start: &Path) -> Vec<Path> {
    let mut out = Vec::new();
    let mut stack = vec![(start.clone(), false)];
    while let Some((path, expanded)) = stack.pop() {
        if expanded {
            if !path.is_root() {
                out.push(path);
            }
            continue;
        }
        let Some(node) = nodes.get(&path) else {
            continue;
        };
        let mut children: Vec<(Path, bool)> = node.children().map(|c| (c, false)).collect();
        children.reverse();
        stack.push((path, true));
        stack.extend(children);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Token;
    use crate::value::Value;

    fn arena(paths: &[&str]) -> HashMap<Path, Node> {
        let mut nodes = HashMap::new();
        nodes.insert(
            Path::root(),
            Node::new(Path::root(), Token::INVALID, Value::structure()),
        );
        for (i, raw) in paths.iter().enumerate() {
            let path = Path::new(raw);
            nodes.insert(
                path.clone(),
                Node::new(path.clone(), Token::new(1, i as u32), Value::structure()),
            );
            let parent = path.parent();
            if let Some(parent) = nodes.get_mut(&parent) {
                parent.attach(path.leaf());
            }
        }
        nodes
    }

    #[test]
    fn test_pre_order() {
        let nodes = arena(&["a", "b", "a.y", "a.x", "a.x.deep"]);
        let order = pre_order(&nodes, &Path::root());
        let order: Vec<&str> = order.iter().map(Path::as_str).collect();
        assert_eq!(order, vec!["a", "a.x", "a.x.deep", "a.y", "b"]);

        let order = pre_order(&nodes, &Path::new("a.x"));
        assert_eq!(order, vec![Path::new("a.x"), Path::new("a.x.deep")]);

        assert!(pre_order(&nodes, &Path::new("missing")).is_empty());
    }

    #[test]
    fn test_post_order() {
        let nodes = arena(&["a", "a.y", "a.x", "a.x.deep"]);
        let order = post_order(&nodes, &Path::new("a"));
        let order: Vec<&str> = order.iter().map(Path::as_str).collect();
        assert_eq!(order, vec!["a.x.deep", "a.x", "a.y", "a"]);
    }
}
