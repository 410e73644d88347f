//! Element tree shared by the HTML and XML decoders.

/// A node of a decoded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with its attributes and children, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Element name without a namespace prefix.
    #[must_use]
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    /// Attribute value by name (ASCII case-insensitive).
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Direct child elements.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Direct child elements with the given local name.
    pub fn children_named<'s>(&'s self, name: &str) -> impl Iterator<Item = &'s Element> + use<'s> {
        let name = name.to_owned();
        self.elements()
            .filter(move |e| e.local_name().eq_ignore_ascii_case(&name))
    }

    /// First direct child element with the given local name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children_named(name).next()
    }

    /// Trimmed text of the first child with the given name; `None` if absent or blank.
    #[must_use]
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name)
            .map(Element::text_trimmed)
            .filter(|t| !t.is_empty())
    }

    /// All descendants (excluding `self`) with the given local name, pre-order.
    #[must_use]
    pub fn descendants_named(&self, name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        collect_named(self, name, &mut found);
        found
    }

    /// Concatenated text of all descendant text nodes.
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        push_text(self, &mut out);
        out
    }

    /// Text with runs of whitespace collapsed and ends trimmed.
    #[must_use]
    pub fn text_trimmed(&self) -> String {
        self.text().split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn collect_named<'a>(el: &'a Element, name: &str, out: &mut Vec<&'a Element>) {
    for child in el.elements() {
        if child.local_name().eq_ignore_ascii_case(name) {
            out.push(child);
        }
        collect_named(child, name, out);
    }
}

fn push_text(el: &Element, out: &mut String) {
    for node in &el.children {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => push_text(e, out),
        }
    }
}
