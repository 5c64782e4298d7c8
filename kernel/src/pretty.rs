//! Rendering of core terms into documents.
//!
//! Binders whose display name is already in scope are renamed (`x`, `x1`,
//! `x2`, ...) so printed terms never show a captured variable, and values of
//! the form `succ (... zero)` over `Nat` are printed as numerals.

use crate::ast::{CaseTree, Field, Name, Term};
use crate::doc::Doc;
use crate::level::Level;
use std::fmt;
use std::sync::Arc;

const PREC_TOP: u8 = 0;
const PREC_ARROW: u8 = 1;
const PREC_APP: u8 = 2;
const PREC_ATOM: u8 = 3;

/// Render `term` in a context whose variables are named `names`, outermost first.
pub fn term_doc(term: &Term, names: &[Name]) -> Doc {
    let mut printer = Printer {
        names: names.iter().map(|n| n.to_string()).collect(),
    };
    printer.term(term, PREC_TOP)
}

pub fn render_term(term: &Term, names: &[Name]) -> String {
    term_doc(term, names).render()
}

pub fn level_doc(level: &Level) -> Doc {
    Doc::text(level.to_string())
}

struct Printer {
    names: Vec<String>,
}

impl Printer {
    fn var_name(&self, idx: usize) -> String {
        match self.names.len().checked_sub(idx + 1) {
            Some(pos) => self.names[pos].clone(),
            None => format!("#{}", idx),
        }
    }

    fn fresh(&self, hint: &str, used: bool) -> String {
        let base = if hint == "_" {
            if !used {
                return "_".to_string();
            }
            "x"
        } else {
            hint
        };
        if !self.names.iter().any(|n| n == base) {
            return base.to_string();
        }
        (1..)
            .map(|i| format!("{}{}", base, i))
            .find(|candidate| !self.names.iter().any(|n| n == candidate))
            .unwrap_or_else(|| base.to_string())
    }

    fn under<T>(&mut self, name: String, f: impl FnOnce(&mut Self) -> T) -> T {
        self.names.push(name);
        let result = f(self);
        self.names.pop();
        result
    }

    fn wrap(doc: Doc, prec: u8, needed: u8) -> Doc {
        if prec > needed {
            Doc::parens(doc)
        } else {
            doc
        }
    }

    fn term(&mut self, term: &Term, prec: u8) -> Doc {
        if let Some(n) = numeral(term) {
            return Doc::text(n.to_string());
        }
        match term {
            Term::Var(idx) => Doc::text(self.var_name(*idx)),
            Term::Sort(level) => match level.to_nat() {
                Some(0) => Doc::text("Type"),
                Some(n) => Self::wrap(Doc::text(format!("Type {}", n)), prec, PREC_APP),
                None => Self::wrap(
                    Doc::hsep([Doc::text("Type"), Doc::parens(level_doc(level))]),
                    prec,
                    PREC_APP,
                ),
            },
            Term::Pi(binder, dom, cod) => {
                let dom_doc = self.term(dom, PREC_ARROW + 1);
                let used = cod.has_loose_var(0);
                let doc = if !used && !binder.is_implicit() {
                    let name = self.fresh(&binder.name, false);
                    let cod_doc = self.under(name, |p| p.term(cod, PREC_ARROW));
                    Doc::hsep([dom_doc, Doc::text("->"), cod_doc])
                } else {
                    let name = self.fresh(&binder.name, true);
                    let head = Doc::hsep([
                        Doc::text(name.clone()),
                        Doc::text(":"),
                        self.term(dom, PREC_TOP),
                    ]);
                    let head = if binder.is_implicit() {
                        Doc::braces(head)
                    } else {
                        Doc::parens(head)
                    };
                    let cod_doc = self.under(name, |p| p.term(cod, PREC_ARROW));
                    Doc::hsep([head, Doc::text("->"), cod_doc])
                };
                Self::wrap(Doc::group(doc), prec, PREC_ARROW)
            }
            Term::Sigma(binder, fst, snd) => {
                let used = snd.has_loose_var(0);
                let name = self.fresh(&binder.name, used);
                let head = if used {
                    Doc::parens(Doc::hsep([
                        Doc::text(name.clone()),
                        Doc::text(":"),
                        self.term(fst, PREC_TOP),
                    ]))
                } else {
                    self.term(fst, PREC_APP)
                };
                let snd_doc = self.under(name, |p| p.term(snd, PREC_ARROW));
                Self::wrap(Doc::hsep([head, Doc::text("*"), snd_doc]), prec, PREC_ARROW)
            }
            Term::Lam(binder, _, body) => {
                let name = self.fresh(&binder.name, body.has_loose_var(0));
                let shown = if binder.is_implicit() {
                    format!("{{{}}}", name)
                } else {
                    name.clone()
                };
                let body_doc = self.under(name, |p| p.term(body, PREC_TOP));
                Self::wrap(
                    Doc::group(Doc::hsep([Doc::text(format!("\\{}", shown)), Doc::text("=>"), body_doc])),
                    prec,
                    PREC_TOP,
                )
            }
            Term::Let(binder, ty, value, body) => {
                let name = self.fresh(&binder.name, true);
                let ty_doc = self.term(ty, PREC_TOP);
                let value_doc = self.term(value, PREC_TOP);
                let body_doc = self.under(name.clone(), |p| p.term(body, PREC_TOP));
                let doc = Doc::vcat([
                    Doc::hsep([
                        Doc::text("let"),
                        Doc::text(name),
                        Doc::text(":"),
                        ty_doc,
                        Doc::text(":="),
                        value_doc,
                        Doc::text("in"),
                    ]),
                    body_doc,
                ]);
                Self::wrap(doc, prec, PREC_TOP)
            }
            Term::App(..) => {
                let mut args = Vec::new();
                let mut head = term;
                while let Term::App(fun, arg) = head {
                    args.push(arg);
                    head = &**fun;
                }
                let mut docs = vec![self.term(head, PREC_APP)];
                for arg in args.into_iter().rev() {
                    docs.push(self.term(arg, PREC_ATOM));
                }
                Self::wrap(Doc::group(Doc::hsep(docs)), prec, PREC_APP)
            }
            Term::Pair(first, second) => Doc::parens(Doc::hcat([
                self.term(first, PREC_TOP),
                Doc::text(", "),
                self.term(second, PREC_TOP),
            ])),
            Term::Proj(field, inner) => {
                let suffix = match field {
                    Field::First => ".1",
                    Field::Second => ".2",
                };
                Doc::hcat([self.term(inner, PREC_ATOM), Doc::text(suffix)])
            }
            Term::Ind(def) | Term::Const(def) => Doc::text(def.name.to_string()),
            Term::Ctor(ctor) => Doc::text(ctor.name.to_string()),
            Term::Meta(id, _) => Doc::text(format!("?{}", id.0)),
            Term::Case(case) => {
                let scrutinees: Vec<Doc> = case
                    .scrutinees
                    .iter()
                    .map(|s| self.term(s, PREC_APP))
                    .collect();
                let slots: Vec<String> = (0..case.scrutinees.len())
                    .map(|i| self.fresh(&format!("s{}", i), true))
                    .collect();
                let tree = self.tree(&case.tree, &slots);
                let header = Doc::hsep([Doc::text("case"), comma_sep(scrutinees), Doc::text("of")]);
                Self::wrap(Doc::nest(2, Doc::vcat([header, tree])), prec, PREC_TOP)
            }
        }
    }

    fn tree(&mut self, tree: &CaseTree, slots: &[String]) -> Doc {
        match tree {
            CaseTree::Leaf { rhs, .. } => {
                let saved = self.names.len();
                self.names.extend(slots.iter().cloned());
                let doc = self.term(rhs, PREC_TOP);
                self.names.truncate(saved);
                doc
            }
            CaseTree::Split { slot, arms, .. } => {
                let Some(scrutinee) = slots.get(*slot).cloned() else {
                    return Doc::text("<ill-formed case>");
                };
                if arms.is_empty() {
                    return Doc::text(format!("absurd {}", scrutinee));
                }
                let mut lines = Vec::new();
                for arm in arms {
                    let fields: Vec<String> = (0..arm.fields)
                        .map(|i| {
                            let candidate = format!("{}_{}", scrutinee, i);
                            self.fresh(&candidate, true)
                        })
                        .collect();
                    let mut pattern = vec![Doc::text(arm.ctor.name.to_string())];
                    pattern.extend(fields.iter().map(|f| Doc::text(f.clone())));
                    let mut inner = slots[..*slot].to_vec();
                    inner.extend(fields);
                    inner.extend_from_slice(&slots[*slot + 1..]);
                    let body = self.tree(&arm.tree, &inner);
                    lines.push(Doc::nest(
                        2,
                        Doc::hsep([
                            Doc::text("|"),
                            Doc::text(scrutinee.clone()),
                            Doc::text("="),
                            Doc::hsep(pattern),
                            Doc::text("=>"),
                            body,
                        ]),
                    ));
                }
                Doc::vcat(lines)
            }
        }
    }
}

fn comma_sep(docs: Vec<Doc>) -> Doc {
    let mut out = Vec::new();
    for (i, doc) in docs.into_iter().enumerate() {
        if i > 0 {
            out.push(Doc::text(", "));
        }
        out.push(doc);
    }
    Doc::HCat(out)
}

/// `succ^n zero` over a data type named `Nat`.
fn numeral(term: &Term) -> Option<u64> {
    match term {
        Term::Ctor(ctor) if &*ctor.data.name == "Nat" && &*ctor.name == "zero" => Some(0),
        Term::App(fun, arg) => match &**fun {
            Term::Ctor(ctor) if &*ctor.data.name == "Nat" && &*ctor.name == "succ" => {
                numeral(arg).map(|n| n + 1)
            }
            _ => None,
        },
        _ => None,
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_term(self, &[]))
    }
}

/// Convenience for `Arc<Term>` call sites that only have names as strings.
pub fn render_in(term: &Arc<Term>, names: &[&str]) -> String {
    let names: Vec<Name> = names.iter().map(|n| Name::from(*n)).collect();
    render_term(term, &names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Binder;
    use crate::test_support::{add_ref, nat, numeral as num, succ};

    #[test]
    fn numerals_are_collapsed() {
        assert_eq!(num(3).to_string(), "3");
        assert_eq!(render_in(&succ(Term::var(0)), &["n"]), "succ n");
    }

    #[test]
    fn arrows_and_dependent_functions() {
        let arrow = Term::arrow(nat(), nat());
        assert_eq!(arrow.to_string(), "Nat -> Nat");
        let poly = Term::pi(
            Binder::implicit("A"),
            Term::sort(Level::Zero),
            Term::arrow(Term::var(0), Term::var(0)),
        );
        assert_eq!(poly.to_string(), "{A : Type} -> A -> A");
    }

    #[test]
    fn colliding_binder_is_renamed() {
        // \x => x applied under an outer x that is also used
        let term = Term::lam(
            Binder::explicit("x"),
            nat(),
            Term::apps(Term::constant(add_ref()), vec![Term::var(0), Term::var(1)]),
        );
        assert_eq!(render_in(&term, &["x"]), "\\x1 => add x1 x");
    }

    #[test]
    fn nested_applications_are_parenthesized() {
        let term = Term::apps(
            Term::constant(add_ref()),
            vec![Term::apps(Term::constant(add_ref()), vec![Term::var(0), num(1)]), num(2)],
        );
        assert_eq!(render_in(&term, &["n"]), "add (add n 1) 2");
    }
}
