//! Element lookup over an `xmltree` document
//!
//! The document owns every node. Lookups return either shared references or
//! an [`ElementPath`] (child indices from the start element) that can later be
//! resolved to a mutable reference, so several matches can be edited one after
//! another without holding overlapping borrows.

use xmltree::{Element, XMLNode};

/// Child indices leading from a start element to one of its descendants.
/// The empty path is the start element itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ElementPath(Vec<usize>);

impl ElementPath {
    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

/// All elements named `name` at or below `root`, in document order
pub fn elements_by_name<'a>(root: &'a Element, name: &str) -> Vec<&'a Element> {
    let mut matches = Vec::new();
    collect_by_name(root, name, &mut matches);
    matches
}

fn collect_by_name<'a>(element: &'a Element, name: &str, matches: &mut Vec<&'a Element>) {
    if element.name == name {
        matches.push(element);
    }
    for child in &element.children {
        if let XMLNode::Element(child) = child {
            collect_by_name(child, name, matches);
        }
    }
}

/// Paths to all elements named `name` at or below `root`, in document order
pub fn paths_by_name(root: &Element, name: &str) -> Vec<ElementPath> {
    let mut paths = Vec::new();
    let mut current = Vec::new();
    collect_paths(root, name, &mut current, &mut paths);
    paths
}

fn collect_paths(
    element: &Element,
    name: &str,
    current: &mut Vec<usize>,
    paths: &mut Vec<ElementPath>,
) {
    if element.name == name {
        paths.push(ElementPath(current.clone()));
    }
    for (index, child) in element.children.iter().enumerate() {
        if let XMLNode::Element(child) = child {
            current.push(index);
            collect_paths(child, name, current, paths);
            current.pop();
        }
    }
}

/// Resolve a path produced by [`paths_by_name`] on the same, structurally
/// unchanged, tree.
pub fn element_at_mut<'a>(root: &'a mut Element, path: &ElementPath) -> Option<&'a mut Element> {
    let mut element = root;
    for &index in &path.0 {
        element = match element.children.get_mut(index) {
            Some(XMLNode::Element(child)) => child,
            _ => return None,
        };
    }
    Some(element)
}

/// First element named `name` at or below `root`, mutably
pub fn first_by_name_mut<'a>(root: &'a mut Element, name: &str) -> Option<&'a mut Element> {
    let path = paths_by_name(root, name).into_iter().next()?;
    element_at_mut(root, &path)
}

/// Build an element carrying the given attributes, in order
pub fn element_with_attributes(name: &str, attributes: &[(&str, &str)]) -> Element {
    let mut element = Element::new(name);
    for (key, value) in attributes {
        element
            .attributes
            .insert((*key).to_string(), (*value).to_string());
    }
    element
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<Server>
  <Service name="Catalina">
    <Connector port="8080"/>
    <!-- <Connector port="8443"/> -->
    <Engine name="Catalina">
      <Connector port="9000"><Certificate/></Connector>
    </Engine>
  </Service>
</Server>"#;

    #[test]
    fn test_finds_nested_elements_in_order() {
        let root = Element::parse(DOC.as_bytes()).unwrap();
        let ports: Vec<_> = elements_by_name(&root, "Connector")
            .iter()
            .map(|c| c.attributes.get("port").cloned().unwrap_or_default())
            .collect();
        assert_eq!(ports, vec!["8080", "9000"]);
        assert_eq!(elements_by_name(&root, "Server").len(), 1);
        assert!(elements_by_name(&root, "Missing").is_empty());
    }

    #[test]
    fn test_paths_resolve_mutably() {
        let mut root = Element::parse(DOC.as_bytes()).unwrap();
        let paths = paths_by_name(&root, "Connector");
        assert_eq!(paths.len(), 2);
        assert!(paths[1].depth() > paths[0].depth());

        for path in &paths {
            let connector = element_at_mut(&mut root, path).unwrap();
            connector
                .attributes
                .insert("touched".to_string(), "yes".to_string());
        }
        assert!(elements_by_name(&root, "Connector")
            .iter()
            .all(|c| c.attributes.get("touched").map(String::as_str) == Some("yes")));

        assert!(element_at_mut(&mut root, &ElementPath(vec![99])).is_none());
        assert_eq!(
            element_at_mut(&mut root, &ElementPath::default()).unwrap().name,
            "Server"
        );
    }

    #[test]
    fn test_first_by_name_mut() {
        let mut root = Element::parse(DOC.as_bytes()).unwrap();
        let cert = first_by_name_mut(&mut root, "Certificate").unwrap();
        cert.attributes.insert("type".to_string(), "RSA".to_string());
        assert_eq!(
            elements_by_name(&root, "Certificate")[0]
                .attributes
                .get("type")
                .map(String::as_str),
            Some("RSA")
        );
        assert!(first_by_name_mut(&mut root, "Nope").is_none());
    }
}
