//! Layout-agnostic document vocabulary.
//!
//! Diagnostics and printed terms are built from these combinators and handed
//! to an external pretty-printer. `Display` gives a plain rendering without
//! any width-aware line breaking.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Doc {
    Text(String),
    /// Children laid out side by side.
    HCat(Vec<Doc>),
    /// Children on separate lines.
    VCat(Vec<Doc>),
    /// Indent continuation lines of the child.
    Nest(usize, Box<Doc>),
    /// A unit the layout engine may flatten onto one line.
    Group(Box<Doc>),
}

impl Doc {
    pub fn text(s: impl Into<String>) -> Doc {
        Doc::Text(s.into())
    }

    pub fn empty() -> Doc {
        Doc::HCat(Vec::new())
    }

    pub fn hcat(docs: impl IntoIterator<Item = Doc>) -> Doc {
        Doc::HCat(docs.into_iter().collect())
    }

    pub fn vcat(docs: impl IntoIterator<Item = Doc>) -> Doc {
        Doc::VCat(docs.into_iter().collect())
    }

    /// Horizontal concatenation with single spaces in between.
    pub fn hsep(docs: impl IntoIterator<Item = Doc>) -> Doc {
        let mut out = Vec::new();
        for (i, doc) in docs.into_iter().enumerate() {
            if i > 0 {
                out.push(Doc::text(" "));
            }
            out.push(doc);
        }
        Doc::HCat(out)
    }

    pub fn nest(indent: usize, doc: Doc) -> Doc {
        Doc::Nest(indent, Box::new(doc))
    }

    pub fn group(doc: Doc) -> Doc {
        Doc::Group(Box::new(doc))
    }

    pub fn parens(doc: Doc) -> Doc {
        Doc::hcat([Doc::text("("), doc, Doc::text(")")])
    }

    pub fn braces(doc: Doc) -> Doc {
        Doc::hcat([Doc::text("{"), doc, Doc::text("}")])
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(0, &mut out);
        out
    }

    fn render_into(&self, indent: usize, out: &mut String) {
        match self {
            Doc::Text(s) => out.push_str(s),
            Doc::HCat(docs) => {
                for doc in docs {
                    doc.render_into(indent, out);
                }
            }
            Doc::VCat(docs) => {
                for (i, doc) in docs.iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                        out.extend(std::iter::repeat(' ').take(indent));
                    }
                    doc.render_into(indent, out);
                }
            }
            Doc::Nest(extra, doc) => doc.render_into(indent + extra, out),
            Doc::Group(doc) => doc.render_into(indent, out),
        }
    }
}

impl fmt::Display for Doc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for Doc {
    fn from(s: &str) -> Self {
        Doc::text(s)
    }
}

impl From<String> for Doc {
    fn from(s: String) -> Self {
        Doc::Text(s)
    }
}
